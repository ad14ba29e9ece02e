//! Source breakpoint resolution
//!
//! Breakpoints are placed by `Label.Breakpoint` alias and requested under
//! several spellings of the same source path. The scenario checks that:
//!
//! - aliases resolving to one line stop there once, whether they were set
//!   before the program loaded or while it runs
//! - ids keep increasing, including across deletes and re-inserts
//! - a line with no sequence point binds to the next executable line, and a
//!   continuation line binds to the statement it belongs to
//! - a request naming a different directory does not bind at all
//! - lines inside and around nested local functions bind to the right method
//! - a field initializer and the constructor body are separate stops, and the
//!   initializer stops again for every constructor that runs it
//! - sequence points not ordered by line number still bind

use futures_util::future::BoxFuture;

use crate::checkpoint::CheckpointChain;
use crate::common::{Error, Result};

use super::Context;

/// Field initializer of `test_constructors`; carries no label
const FIELD_INITIALIZER: &str = "int test_field = 5;";
/// Body of the parameterless `test_constructors` constructor
const CONSTRUCTOR_BODY: &str = "int i = 5;";

/// Stops inside and around the nested local functions, in program order
const NESTED_STOPS: [&str; 13] = [
    "resloved_bp10",
    "resloved_bp11",
    "resloved_bp12",
    "bp13",
    "resloved_bp14",
    "bp15",
    "bp16",
    "bp17",
    "bp18",
    "resloved_bp19",
    "bp20",
    "bp21",
    "bp22",
];

pub fn chain() -> Result<CheckpointChain<Context>> {
    CheckpointChain::builder("init")
        .checkpoint("init", "bp_test1", init)
        .checkpoint("bp_test1", "bp_test2", bp_test1)
        .checkpoint("bp_test2", "bp_test3", bp_test2)
        .checkpoint("bp_test3", "bp_test4", bp_test3)
        .checkpoint("bp_test4", "bp_test_nested", bp_test4)
        .checkpoint("bp_test_nested", "bp_test_constructor", bp_test_nested)
        .checkpoint(
            "bp_test_constructor",
            "bp_test_not_ordered_line_num",
            bp_test_constructor,
        )
        .checkpoint("bp_test_not_ordered_line_num", "finish", bp_test_not_ordered_line_num)
        .checkpoint("finish", "", finish)
        .build()
}

/// `<test_name>/Program.cs`
fn project_relative(ctx: &Context) -> String {
    format!("{}/{}", ctx.control().test_name, ctx.control().source_file_name())
}

/// `./<test_name>/folder/../Program.cs`
fn dotted(ctx: &Context) -> String {
    format!(
        "./{}/folder/../{}",
        ctx.control().test_name,
        ctx.control().source_file_name()
    )
}

fn expect_unresolved(ctx: &Context, alias: &str, id: u32) -> Result<()> {
    match ctx.resolved_line(id)? {
        None => Ok(()),
        Some(line) => Err(Error::TestAssertion(format!(
            "{} (breakpoint {}) in a different directory resolved to line {}",
            alias, id, line
        ))),
    }
}

fn expect_resolved_to(ctx: &mut Context, alias: &str, id: u32, target: &str) -> Result<()> {
    let expected = ctx.label_line(target)?;
    match ctx.resolved_line(id)? {
        Some(line) if line == expected => Ok(()),
        other => Err(Error::TestAssertion(format!(
            "{} on line {} resolved to {:?}, expected line {} ({})",
            alias,
            ctx.label_line(alias)?,
            other,
            expected,
            target
        ))),
    }
}

fn init(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        // Set before the process starts, so they resolve during module load
        let id1 = ctx.enable_breakpoint("bp0_delete_test1").await?;
        let id2 = ctx.enable_breakpoint("bp0_delete_test2").await?;
        ctx.enable_breakpoint("bp1").await?;
        ctx.enable_breakpoint_as("bp2", "../Program.cs").await?;
        let path = project_relative(ctx);
        ctx.enable_breakpoint_as("bp3", &path).await?;
        let path = dotted(ctx);
        ctx.enable_breakpoint_as("bp4", &path).await?;

        ctx.delete_breakpoint(id1).await?;

        ctx.prepare().await?;
        ctx.was_entry_point_hit().await?;

        ctx.delete_breakpoint(id2).await?;
        ctx.continue_execution().await
    })
}

fn bp_test1(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.was_breakpoint_hit("resolved_bp1").await?;

        // A deleted alias comes back under a fresh id, not a re-created one
        let id = ctx.enable_breakpoint("bp0_delete_test1").await?;
        ctx.delete_breakpoint(id).await?;

        let wrong = ctx
            .enable_breakpoint_as("bp5_resolve_wrong_source", "../wrong_folder/./Program.cs")
            .await?;
        expect_unresolved(ctx, "bp5_resolve_wrong_source", wrong)?;
        ctx.remember("bp5_resolve_wrong_source", wrong);

        // bp5 sits on a line holding only comments
        let id = ctx.enable_breakpoint("bp5").await?;
        expect_resolved_to(ctx, "bp5", id, "resolved_bp2")?;
        ctx.remember("bp5", id);

        ctx.continue_execution().await
    })
}

fn bp_test2(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        // The four aliases on resolved_bp1 must not have stopped twice
        ctx.next_stop_is_breakpoint("resolved_bp2").await?;

        let id = ctx.remembered("bp5")?;
        ctx.delete_breakpoint(id).await?;
        let id = ctx.remembered("bp5_resolve_wrong_source")?;
        ctx.delete_breakpoint(id).await?;

        let wrong = ctx
            .enable_breakpoint_as("bp6_resolve_wrong_source", "./wrong_folder/Program.cs")
            .await?;
        expect_unresolved(ctx, "bp6_resolve_wrong_source", wrong)?;
        ctx.remember("bp6_resolve_wrong_source", wrong);

        // bp6 is the continuation line of the statement at resolved_bp3
        let id = ctx.enable_breakpoint("bp6").await?;
        expect_resolved_to(ctx, "bp6", id, "resolved_bp3")?;
        ctx.remember("bp6", id);

        ctx.continue_execution().await
    })
}

fn bp_test3(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.next_stop_is_breakpoint("resolved_bp3").await?;

        let id = ctx.remembered("bp6")?;
        ctx.delete_breakpoint(id).await?;
        let id = ctx.remembered("bp6_resolve_wrong_source")?;
        ctx.delete_breakpoint(id).await?;

        // Same line again, this time with the program running
        let mut ids = vec![ctx.enable_breakpoint("resolved_bp4").await?];
        ids.push(ctx.enable_breakpoint_as("bp7", "Program.cs").await?);
        let path = project_relative(ctx);
        ids.push(ctx.enable_breakpoint_as("bp8", &path).await?);
        let path = dotted(ctx);
        ids.push(ctx.enable_breakpoint_as("bp9", &path).await?);

        for (alias, id) in ["resolved_bp4", "bp7", "bp8", "bp9"].into_iter().zip(ids) {
            expect_resolved_to(ctx, alias, id, "resolved_bp4")?;
        }

        ctx.continue_execution().await
    })
}

fn bp_test4(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.next_stop_is_breakpoint("resolved_bp4").await?;

        for n in 10..=25 {
            let alias = format!("bp{}", n);
            ctx.enable_breakpoint(&alias).await?;
        }

        ctx.continue_execution().await
    })
}

fn bp_test_nested(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        // Strict order: a second stop for one of the four resolved_bp4
        // aliases, or a stop bound to the wrong method, fails here
        for alias in NESTED_STOPS {
            ctx.next_stop_is_breakpoint(alias).await?;
            ctx.continue_execution().await?;
        }
        Ok(())
    })
}

fn bp_test_constructor(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.was_breakpoint_hit("bp23").await?;

        let file = ctx.control().source_file_name();
        let field = ctx.statement_line(FIELD_INITIALIZER)?;
        let body = ctx.statement_line(CONSTRUCTOR_BODY)?;
        ctx.enable_line_breakpoint(&file, field).await?;
        ctx.enable_line_breakpoint(&file, body).await?;

        ctx.continue_execution().await?;
        ctx.was_line_breakpoint_hit(&file, field).await?;
        ctx.continue_execution().await?;
        ctx.was_line_breakpoint_hit(&file, body).await?;
        ctx.continue_execution().await?;
        // The second constructor runs the initializer too
        ctx.was_line_breakpoint_hit(&file, field).await?;
        ctx.continue_execution().await
    })
}

fn bp_test_not_ordered_line_num(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.was_breakpoint_hit("bp24").await?;
        ctx.continue_execution().await?;
        ctx.was_breakpoint_hit("bp25").await?;
        ctx.continue_execution().await
    })
}

fn finish(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.was_exit().await?;
        ctx.debugger_exit().await
    })
}
