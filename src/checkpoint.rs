//! Checkpoint state machine
//!
//! A scenario is a chain of named phases. Each phase runs an async action
//! against the scenario context and names its successor; an empty successor
//! ends the run. Chains are validated when built, before any debugger
//! traffic, so a typo in a successor name fails fast instead of midway
//! through a debugging session.

use std::collections::{HashMap, HashSet};

use futures_util::future::BoxFuture;
use tracing::Instrument;

use crate::common::{Error, Result};

/// Where to go after an action completes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Follow the declared successor
    Next,
    /// Jump to a declared branch target instead
    Goto(String),
}

type Action<C> = Box<dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<Flow>> + Send + Sync>;

struct Checkpoint<C> {
    name: String,
    next: String,
    branches: Vec<String>,
    action: Action<C>,
}

/// Builder for a [`CheckpointChain`]
pub struct ChainBuilder<C> {
    entry: String,
    checkpoints: Vec<Checkpoint<C>>,
}

impl<C: Send + 'static> ChainBuilder<C> {
    /// Add a phase that always continues with `next` (empty for terminal)
    pub fn checkpoint<F>(mut self, name: &str, next: &str, action: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        let action = flow_action(move |ctx: &mut C| {
            let fut = action(ctx);
            Box::pin(async move { fut.await.map(|()| Flow::Next) })
        });
        self.checkpoints.push(Checkpoint {
            name: name.to_string(),
            next: next.to_string(),
            branches: Vec::new(),
            action: Box::new(action),
        });
        self
    }

    /// Add a phase whose action may divert to one of `branches`
    pub fn branching<F>(mut self, name: &str, next: &str, branches: &[&str], action: F) -> Self
    where
        F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<Flow>> + Send + Sync + 'static,
    {
        self.checkpoints.push(Checkpoint {
            name: name.to_string(),
            next: next.to_string(),
            branches: branches.iter().map(|b| b.to_string()).collect(),
            action: Box::new(action),
        });
        self
    }

    /// Validate and freeze the chain
    pub fn build(self) -> Result<CheckpointChain<C>> {
        let mut order = Vec::with_capacity(self.checkpoints.len());
        let mut by_name = HashMap::with_capacity(self.checkpoints.len());

        for checkpoint in self.checkpoints {
            if checkpoint.name.is_empty() {
                return Err(Error::InvalidChain("checkpoint with empty name".to_string()));
            }
            if by_name.contains_key(&checkpoint.name) {
                return Err(Error::InvalidChain(format!(
                    "duplicate checkpoint '{}'",
                    checkpoint.name
                )));
            }
            order.push(checkpoint.name.clone());
            by_name.insert(checkpoint.name.clone(), checkpoint);
        }

        if !by_name.contains_key(&self.entry) {
            return Err(Error::InvalidChain(format!(
                "entry checkpoint '{}' is not defined",
                self.entry
            )));
        }

        for name in &order {
            let checkpoint = &by_name[name];
            for target in successors(checkpoint) {
                if !by_name.contains_key(target) {
                    return Err(Error::InvalidChain(format!(
                        "checkpoint '{}' continues with undefined '{}'",
                        name, target
                    )));
                }
            }
        }

        if !by_name.values().any(|c| c.next.is_empty()) {
            return Err(Error::InvalidChain("no terminal checkpoint".to_string()));
        }

        let reachable = check_acyclic(&self.entry, &by_name)?;
        if let Some(orphan) = order.iter().find(|name| !reachable.contains(name.as_str())) {
            return Err(Error::InvalidChain(format!(
                "checkpoint '{}' is unreachable from '{}'",
                orphan, self.entry
            )));
        }

        Ok(CheckpointChain {
            entry: self.entry,
            order,
            checkpoints: by_name,
        })
    }
}

/// Pins a closure to the higher-ranked action signature
fn flow_action<C, F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, Result<Flow>> + Send + Sync + 'static,
{
    f
}

fn successors<C>(checkpoint: &Checkpoint<C>) -> impl Iterator<Item = &String> {
    std::iter::once(&checkpoint.next)
        .filter(|n| !n.is_empty())
        .chain(checkpoint.branches.iter())
}

/// Depth-first walk from `entry`; returns every reachable name
fn check_acyclic<'a, C>(
    entry: &'a str,
    checkpoints: &'a HashMap<String, Checkpoint<C>>,
) -> Result<HashSet<&'a str>> {
    enum Visit<'a> {
        Enter(&'a str),
        Leave(&'a str),
    }

    let mut done: HashSet<&str> = HashSet::new();
    let mut on_path: HashSet<&str> = HashSet::new();
    let mut stack = vec![Visit::Enter(entry)];

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(name) => {
                if done.contains(name) {
                    continue;
                }
                if !on_path.insert(name) {
                    return Err(Error::InvalidChain(format!(
                        "cycle through checkpoint '{}'",
                        name
                    )));
                }
                stack.push(Visit::Leave(name));
                if let Some(checkpoint) = checkpoints.get(name) {
                    for target in successors(checkpoint) {
                        if on_path.contains(target.as_str()) {
                            return Err(Error::InvalidChain(format!(
                                "cycle through checkpoint '{}'",
                                target
                            )));
                        }
                        stack.push(Visit::Enter(target.as_str()));
                    }
                }
            }
            Visit::Leave(name) => {
                on_path.remove(name);
                done.insert(name);
            }
        }
    }

    Ok(done)
}

/// A validated sequence of checkpoints over a context `C`
pub struct CheckpointChain<C> {
    entry: String,
    /// Declaration order, for listings
    order: Vec<String>,
    checkpoints: HashMap<String, Checkpoint<C>>,
}

impl<C: Send + 'static> CheckpointChain<C> {
    pub fn builder(entry: &str) -> ChainBuilder<C> {
        ChainBuilder {
            entry: entry.to_string(),
            checkpoints: Vec::new(),
        }
    }
}

impl<C> CheckpointChain<C> {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Checkpoint names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Declared successor of `name` (empty at a terminal)
    pub fn next_of(&self, name: &str) -> Option<&str> {
        self.checkpoints.get(name).map(|c| c.next.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Run from the entry to a terminal checkpoint
    ///
    /// Returns the names of the checkpoints visited, in order.
    pub async fn run(&self, ctx: &mut C) -> Result<Vec<String>> {
        self.run_observed(ctx, |_| {}).await
    }

    /// [`run`](Self::run), calling `passed` as each checkpoint completes
    pub async fn run_observed<F>(&self, ctx: &mut C, mut passed: F) -> Result<Vec<String>>
    where
        F: FnMut(&str),
    {
        let mut visited = Vec::new();
        let mut current = self.entry.clone();

        while !current.is_empty() {
            let checkpoint = self
                .checkpoints
                .get(&current)
                .ok_or_else(|| Error::UnknownCheckpoint(current.clone()))?;

            let span = tracing::info_span!("checkpoint", name = %checkpoint.name);
            let flow = (checkpoint.action)(ctx)
                .instrument(span)
                .await
                .map_err(|e| Error::in_checkpoint(&checkpoint.name, e))?;
            passed(&checkpoint.name);
            visited.push(checkpoint.name.clone());

            current = match flow {
                Flow::Next => checkpoint.next.clone(),
                Flow::Goto(target) => {
                    if !checkpoint.branches.contains(&target) {
                        return Err(Error::UnknownCheckpoint(target));
                    }
                    target
                }
            };
            tracing::debug!(from = %checkpoint.name, to = %current, "Checkpoint passed");
        }

        Ok(visited)
    }
}
