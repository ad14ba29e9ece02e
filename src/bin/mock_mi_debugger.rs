//! Mock MI debugger binary for integration testing
//!
//! Speaks enough GDB/MI to drive the conformance scenarios without a real
//! managed runtime. The debuggee is a JSON program model named by
//! `-exec-arguments`: functions made of sequence points, some of which call
//! other functions. Points are listed in execution order, which need not be
//! line order.
//!
//! Invoked with `--emit-delta` the binary acts as a delta generator instead:
//! the updated program text becomes the `.metadata` fragment and the other
//! fragments are written as placeholders.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::Deserialize;

use conformance::breakpoints::{file_name, same_source};
use conformance::matcher::OUTDATED_MARKER;
use conformance::mi::codec::{decode_request, encode_record, encode_result};
use conformance::mi::{AsyncClass, AsyncKind, MiValue, OutOfBandRecord, ResultClass, StreamKind, Tuple};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--emit-delta") {
        std::process::exit(emit_delta(&args));
    }

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let reader = BufReader::new(stdin.lock());
    let mut out = Output {
        writer: stdout.lock(),
    };

    let mut state = MockState::default();
    out.prompt();

    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let (token, command) = decode_request(&line);
        if !state.process_command(token, command, &mut out) {
            break;
        }
        out.prompt();
    }
}

/// Delta generator mode: `--emit-delta ... --source <file> --output <base>`
fn emit_delta(args: &[String]) -> i32 {
    let value = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };
    let (Some(source), Some(output)) = (value("--source"), value("--output")) else {
        eprintln!("usage: mock_mi_debugger --emit-delta --source <file> --output <base>");
        return 2;
    };

    let text = match std::fs::read_to_string(&source) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("cannot read {}: {}", source, e);
            return 1;
        }
    };
    // An update that does not describe a program is a compile error
    if let Err(e) = serde_json::from_str::<Model>(&text) {
        eprintln!("error CS1002: {}", e);
        return 1;
    }

    let write = |ext: &str, bytes: &[u8]| std::fs::write(format!("{}.{}", output, ext), bytes);
    let written = write("metadata", text.as_bytes())
        .and_then(|_| write("il", b"IL"))
        .and_then(|_| write("pdb", b"PDB"))
        .and_then(|_| write("bin", b"BIN"));
    match written {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("cannot write delta: {}", e);
            1
        }
    }
}

struct Output<W: Write> {
    writer: W,
}

impl<W: Write> Output<W> {
    fn line(&mut self, line: &str) {
        writeln!(self.writer, "{}", line).ok();
        self.writer.flush().ok();
    }

    fn prompt(&mut self) {
        self.line("(gdb)");
    }

    fn result(&mut self, token: Option<u64>, class: ResultClass, fields: Tuple) {
        self.line(&encode_result(token, class, &fields));
    }

    fn done(&mut self, token: Option<u64>) {
        self.result(token, ResultClass::Done, Tuple::new());
    }

    fn error(&mut self, token: Option<u64>, msg: &str) {
        self.result(token, ResultClass::Error, tuple([("msg", text(msg))]));
    }

    fn exec(&mut self, class: AsyncClass, output: Tuple) {
        self.record(OutOfBandRecord::Async {
            kind: AsyncKind::Exec,
            token: None,
            class,
            output,
        });
    }

    fn notify(&mut self, class: &str, output: Tuple) {
        self.record(OutOfBandRecord::Async {
            kind: AsyncKind::Notify,
            token: None,
            class: AsyncClass::Other(class.to_string()),
            output,
        });
    }

    fn target(&mut self, message: &str) {
        self.record(OutOfBandRecord::Stream {
            kind: StreamKind::Target,
            text: format!("{}\n", message),
        });
    }

    fn record(&mut self, record: OutOfBandRecord) {
        self.line(&encode_record(&record));
    }
}

fn text(value: impl ToString) -> MiValue {
    MiValue::Const(value.to_string())
}

fn tuple<const N: usize>(fields: [(&str, MiValue); N]) -> Tuple {
    let mut t = Tuple::new();
    for (name, value) in fields {
        t.push(name, value);
    }
    t
}

#[derive(Debug, Clone, Deserialize)]
struct Model {
    /// Full path of the program's main source file
    source: String,
    entry: String,
    #[serde(default)]
    exit_code: i64,
    /// Types marked as non-user code as a whole
    #[serde(default)]
    non_user_types: Vec<String>,
    /// Types an update replaces outright rather than extends
    #[serde(default)]
    replaced_types: Vec<String>,
    functions: Vec<Function>,
}

#[derive(Debug, Clone, Deserialize)]
struct Function {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    non_user: bool,
    points: Vec<Point>,
}

#[derive(Debug, Clone, Deserialize)]
struct Point {
    line: u32,
    #[serde(default = "default_col")]
    col: u32,
    /// Last line of a statement spanning several lines
    #[serde(default)]
    end_line: Option<u32>,
    #[serde(default)]
    call: Option<String>,
    #[serde(default)]
    output: Option<String>,
}

fn default_col() -> u32 {
    9
}

impl Point {
    fn end_line(&self) -> u32 {
        self.end_line.unwrap_or(self.line).max(self.line)
    }
}

impl Model {
    fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("invalid program model: {}", e))
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }

    fn source_of(&self, func: usize) -> &str {
        self.functions[func].source.as_deref().unwrap_or(&self.source)
    }

    fn is_user(&self, func: usize) -> bool {
        let f = &self.functions[func];
        !f.non_user && !self.non_user_types.contains(&f.type_name)
    }

    /// Every point of a source matching `path` whose statement reaches `line`
    fn points_reaching<'a>(
        &'a self,
        path: &'a str,
        line: u32,
    ) -> impl Iterator<Item = (usize, usize, &'a Point)> + 'a {
        self.functions
            .iter()
            .enumerate()
            .filter(move |(fi, _)| same_source(path, self.source_of(*fi), false))
            .flat_map(|(fi, f)| f.points.iter().enumerate().map(move |(pi, p)| (fi, pi, p)))
            .filter(move |(_, _, p)| p.end_line() >= line)
    }

    /// Sequence points a line breakpoint binds to
    ///
    /// The target is the earliest point, by line then column, whose statement
    /// ends at or after `line`. Every function with a point at exactly that
    /// position is bound: a field initializer is part of each constructor.
    fn resolve_line(&self, path: &str, line: u32) -> Vec<(usize, usize)> {
        let Some(target) = self
            .points_reaching(path, line)
            .map(|(_, _, p)| (p.line, p.col))
            .min()
        else {
            return Vec::new();
        };
        self.points_reaching(path, line)
            .filter(|(_, _, p)| (p.line, p.col) == target)
            .map(|(fi, pi, _)| (fi, pi))
            .collect()
    }

    /// Function breakpoints accept the name with or without its signature
    fn resolve_function(&self, name: &str) -> Vec<(usize, usize)> {
        self.functions
            .iter()
            .position(|f| {
                f.name == name
                    || f.name
                        .strip_prefix(name)
                        .is_some_and(|rest| rest.starts_with('('))
            })
            .filter(|&fi| !self.functions[fi].points.is_empty())
            .map(|fi| (fi, 0))
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Location {
    Line { path: String, line: u32 },
    Function(String),
}

#[derive(Debug, Clone)]
struct Bkpt {
    id: u32,
    location: Location,
}

#[derive(Debug, Clone, Copy)]
struct StackFrame {
    func: usize,
    /// Index of the next point to execute
    point: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Continue,
    Next,
    StepIn,
    Finish,
}

struct MockState {
    model: Option<Model>,
    just_my_code: bool,
    hot_reload: bool,
    breakpoints: Vec<Bkpt>,
    next_bkpt: u32,
    stack: Vec<StackFrame>,
    started: bool,
    exited: bool,
    outdated: HashSet<String>,
    next_var: u32,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            model: None,
            just_my_code: true,
            hot_reload: false,
            breakpoints: Vec::new(),
            next_bkpt: 1,
            stack: Vec::new(),
            started: false,
            exited: false,
            outdated: HashSet::new(),
            next_var: 1,
        }
    }
}

impl MockState {
    /// Handle one request; false once the debugger should exit
    fn process_command<W: Write>(&mut self, token: Option<u64>, command: &str, out: &mut Output<W>) -> bool {
        let mut parts = command.split_whitespace();
        let name = parts.next().unwrap_or("");
        let args: Vec<&str> = parts.collect();

        match name {
            "-gdb-exit" => {
                out.result(token, ResultClass::Exit, Tuple::new());
                return false;
            }
            "-gdb-set" => {
                let enabled = args.get(1).is_some_and(|v| *v == "1");
                match args.first().copied() {
                    Some("just-my-code") => self.just_my_code = enabled,
                    Some("enable-hot-reload") => self.hot_reload = enabled,
                    _ => {}
                }
                out.done(token);
            }
            "-file-exec-and-symbols" | "-environment-cd" => out.done(token),
            "-exec-arguments" => match args.first() {
                Some(path) => match Model::load(Path::new(path)) {
                    Ok(model) => {
                        self.model = Some(model);
                        out.done(token);
                    }
                    Err(e) => out.error(token, &e),
                },
                None => out.error(token, "missing program path"),
            },
            "-exec-run" => self.run(token, out),
            "-exec-continue" => self.resume(token, Resume::Continue, out),
            "-exec-next" => self.resume(token, Resume::Next, out),
            "-exec-step" => self.resume(token, Resume::StepIn, out),
            "-exec-finish" => self.resume(token, Resume::Finish, out),
            "-break-insert" => self.break_insert(token, &args, out),
            "-break-delete" => self.break_delete(token, &args, out),
            "-var-create" => self.var_create(token, &args, out),
            "-apply-deltas" => match self.apply_deltas(&args) {
                Ok(()) => out.done(token),
                Err(e) => out.error(token, &e),
            },
            _ => out.error(token, &format!("Unknown command: {}", name)),
        }
        true
    }

    fn run<W: Write>(&mut self, token: Option<u64>, out: &mut Output<W>) {
        if self.started {
            out.error(token, "process is already running");
            return;
        }
        let Some(entry) = self.model.as_ref().and_then(|m| m.find(&m.entry)) else {
            out.error(token, "no program loaded");
            return;
        };

        self.started = true;
        self.stack = vec![StackFrame { func: entry, point: 0 }];
        out.result(token, ResultClass::Running, Tuple::new());
        out.notify("thread-created", tuple([("id", text(1))]));
        out.exec(AsyncClass::Running, tuple([("thread-id", text("all"))]));
        self.stop(out, "entry-point-hit", None);
    }

    fn resume<W: Write>(&mut self, token: Option<u64>, mode: Resume, out: &mut Output<W>) {
        if !self.started || self.exited || self.stack.is_empty() {
            out.error(token, "process is not running");
            return;
        }
        out.result(token, ResultClass::Running, Tuple::new());
        out.exec(AsyncClass::Running, tuple([("thread-id", text("all"))]));

        let depth = self.stack.len();
        loop {
            if !self.advance(out) {
                self.exit(out);
                return;
            }
            let now = self.stack.len();
            let user = !self.just_my_code || self.top_is_user();
            let finished = match mode {
                Resume::Continue => false,
                Resume::StepIn => user,
                Resume::Next => user && now <= depth,
                Resume::Finish => user && now < depth,
            };
            if finished {
                self.stop(out, "end-stepping-range", None);
                return;
            }
            if let Some(id) = self.breakpoint_here() {
                self.stop(out, "breakpoint-hit", Some(id));
                return;
            }
        }
    }

    /// Execute the current point; false once the program has returned
    fn advance<W: Write>(&mut self, out: &mut Output<W>) -> bool {
        let Some(model) = self.model.as_ref() else {
            return false;
        };
        let Some(top) = self.stack.last_mut() else {
            return false;
        };

        let point = &model.functions[top.func].points[top.point];
        if let Some(message) = &point.output {
            out.target(message);
        }
        top.point += 1;
        if let Some(callee) = point.call.as_deref().and_then(|c| model.find(c)) {
            self.stack.push(StackFrame { func: callee, point: 0 });
        }

        while let Some(top) = self.stack.last() {
            if top.point < model.functions[top.func].points.len() {
                break;
            }
            self.stack.pop();
        }
        !self.stack.is_empty()
    }

    fn top_is_user(&self) -> bool {
        match (self.model.as_ref(), self.stack.last()) {
            (Some(model), Some(top)) => model.is_user(top.func),
            _ => false,
        }
    }

    /// Resolve a breakpoint against the current program
    fn resolve(&self, location: &Location) -> Vec<(usize, usize)> {
        let Some(model) = self.model.as_ref() else {
            return Vec::new();
        };
        match location {
            Location::Line { path, line } => model.resolve_line(path, *line),
            Location::Function(name) => model.resolve_function(name),
        }
    }

    /// Lowest breakpoint id bound to the point about to execute
    ///
    /// Several breakpoints resolving to one point collapse into a single stop.
    fn breakpoint_here(&self) -> Option<u32> {
        let model = self.model.as_ref()?;
        let top = self.stack.last()?;
        if self.just_my_code && !model.is_user(top.func) {
            return None;
        }
        let here = (top.func, top.point);
        self.breakpoints
            .iter()
            .filter(|bp| self.resolve(&bp.location).contains(&here))
            .map(|bp| bp.id)
            .min()
    }

    fn frame(&self) -> Option<Tuple> {
        let model = self.model.as_ref()?;
        let top = self.stack.last()?;
        let func = &model.functions[top.func];
        let point = &func.points[top.point];
        let source = model.source_of(top.func);
        let name = if self.outdated.contains(&func.name) {
            format!("{}{}", OUTDATED_MARKER, func.name)
        } else {
            func.name.clone()
        };
        Some(tuple([
            ("level", text(0)),
            ("func", text(name)),
            ("file", text(file_name(source))),
            ("fullname", text(source)),
            ("line", text(point.line)),
            ("col", text(point.col)),
        ]))
    }

    fn stop<W: Write>(&mut self, out: &mut Output<W>, reason: &str, bkptno: Option<u32>) {
        let mut fields = tuple([
            ("reason", text(reason)),
            ("thread-id", text(1)),
            ("stopped-threads", text("all")),
        ]);
        if let Some(id) = bkptno {
            fields.push("bkptno", text(id));
            fields.push("times", text(1));
        }
        if let Some(frame) = self.frame() {
            fields.push("frame", MiValue::Tuple(frame));
        }
        out.exec(AsyncClass::Stopped, fields);
    }

    fn exit<W: Write>(&mut self, out: &mut Output<W>) {
        self.exited = true;
        let code = self.model.as_ref().map_or(0, |m| m.exit_code);
        out.notify("thread-exited", tuple([("id", text(1))]));
        out.exec(
            AsyncClass::Stopped,
            tuple([("reason", text("exited")), ("exit-code", text(code))]),
        );
    }

    fn break_insert<W: Write>(&mut self, token: Option<u64>, args: &[&str], out: &mut Output<W>) {
        let Some(location_arg) = args.iter().find(|a| !a.starts_with('-')) else {
            out.error(token, "missing location");
            return;
        };
        let location = match location_arg.rsplit_once(':') {
            Some((path, line)) if line.parse::<u32>().is_ok() => Location::Line {
                path: path.to_string(),
                line: line.parse().unwrap_or(0),
            },
            _ => Location::Function(location_arg.to_string()),
        };

        let id = self.next_bkpt;
        self.next_bkpt += 1;
        let resolved = self.resolve(&location);
        self.breakpoints.push(Bkpt { id, location });

        let mut bkpt = tuple([
            ("number", text(id)),
            ("type", text("breakpoint")),
            ("disp", text("keep")),
            ("enabled", text("y")),
        ]);
        match (resolved.first(), self.model.as_ref()) {
            (Some(&(f, p)), Some(model)) => {
                let source = model.source_of(f);
                bkpt.push("func", text(&model.functions[f].name));
                bkpt.push("file", text(file_name(source)));
                bkpt.push("fullname", text(source));
                bkpt.push("line", text(model.functions[f].points[p].line));
            }
            _ => bkpt.push(
                "warning",
                text("No executable code of the debugger's target code type is associated with this line."),
            ),
        }
        out.result(token, ResultClass::Done, tuple([("bkpt", MiValue::Tuple(bkpt))]));
    }

    fn break_delete<W: Write>(&mut self, token: Option<u64>, args: &[&str], out: &mut Output<W>) {
        let ids: Vec<u32> = args.iter().filter_map(|a| a.parse().ok()).collect();
        if ids.is_empty() {
            out.error(token, "missing breakpoint number");
            return;
        }
        for id in &ids {
            if !self.breakpoints.iter().any(|bp| bp.id == *id) {
                out.error(token, &format!("No breakpoint number {}.", id));
                return;
            }
        }
        self.breakpoints.retain(|bp| !ids.contains(&bp.id));
        out.done(token);
    }

    fn var_create<W: Write>(&mut self, token: Option<u64>, args: &[&str], out: &mut Output<W>) {
        if !self.started || self.exited {
            out.error(token, "process is not stopped");
            return;
        }
        // -var-create <name> <frame> <expression>
        let expression = args.get(2..).map(|e| e.join(" ")).unwrap_or_default();
        if !expression.contains(">=") {
            out.error(token, &format!("cannot evaluate '{}'", expression));
            return;
        }
        let name = format!("var{}", self.next_var);
        self.next_var += 1;
        out.result(
            token,
            ResultClass::Done,
            tuple([
                ("name", text(name)),
                ("value", text("true")),
                ("attributes", text("editable")),
                ("exp", text(&expression)),
                ("numchild", text(0)),
                ("type", text("bool")),
                ("thread-id", text(1)),
            ]),
        );
    }

    /// `-apply-deltas <assembly> <metadata> <il> <pdb> <bin>`
    fn apply_deltas(&mut self, args: &[&str]) -> Result<(), String> {
        if !self.hot_reload {
            return Err("hot reload is disabled".to_string());
        }
        let [_assembly, metadata, il, pdb, bin] = args else {
            return Err(format!("expected 5 arguments, got {}", args.len()));
        };
        for fragment in [il, pdb, bin] {
            if !Path::new(fragment).is_file() {
                return Err(format!("cannot read {}", fragment));
            }
        }
        let old = self.model.as_ref().ok_or("no program loaded")?;
        let new = Model::load(Path::new(metadata))?;

        let old_types: HashSet<&str> = old.functions.iter().map(|f| f.type_name.as_str()).collect();
        for f in &new.functions {
            let added = old.find(&f.name).is_none();
            if added
                && old_types.contains(f.type_name.as_str())
                && !new.replaced_types.contains(&f.type_name)
            {
                self.outdated.insert(f.name.clone());
            }
        }

        // Live frames continue in the updated bodies at the same line
        let mut stack = Vec::with_capacity(self.stack.len());
        for frame in &self.stack {
            let func = &old.functions[frame.func];
            let line = func.points[frame.point].line;
            let index = new
                .find(&func.name)
                .ok_or_else(|| format!("active method {} was removed", func.name))?;
            let points = &new.functions[index].points;
            if points.is_empty() {
                return Err(format!("active method {} has no body", func.name));
            }
            let point = points
                .iter()
                .position(|p| p.line >= line)
                .unwrap_or(points.len() - 1);
            stack.push(StackFrame { func: index, point });
        }

        self.stack = stack;
        self.model = Some(new);
        Ok(())
    }
}
