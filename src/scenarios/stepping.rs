//! Step in, over and out of a helper called from `Main`
//!
//! The program stops at a breakpoint on the call (line 15), steps into the
//! helper (18), over three statements (19, 20, 21), back out to the caller
//! (16) and runs to a clean exit.

use futures_util::future::BoxFuture;

use crate::checkpoint::CheckpointChain;
use crate::common::Result;

use super::Context;

const SOURCE: &str = "Program.cs";
const CALL_LINE: u32 = 15;

pub fn chain() -> Result<CheckpointChain<Context>> {
    CheckpointChain::builder("init")
        .checkpoint("init", "bp_test", init)
        .checkpoint("bp_test", "step_in", bp_test)
        .checkpoint("step_in", "step_over", step_in)
        .checkpoint("step_over", "step_out", step_over)
        .checkpoint("step_out", "finish", step_out)
        .checkpoint("finish", "", finish)
        .build()
}

fn init(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.prepare().await?;
        ctx.was_entry_point_hit().await?;
        ctx.enable_line_breakpoint(SOURCE, CALL_LINE).await?;
        ctx.continue_execution().await
    })
}

fn bp_test(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.was_line_breakpoint_hit(SOURCE, CALL_LINE).await?;
        ctx.step_in().await
    })
}

fn step_in(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move { ctx.was_step(18).await })
}

fn step_over(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for line in [19, 20, 21] {
            ctx.step_over().await?;
            ctx.was_step(line).await?;
        }
        Ok(())
    })
}

fn step_out(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.step_out().await?;
        ctx.was_step(16).await?;
        ctx.continue_execution().await
    })
}

fn finish(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.was_exit().await?;
        ctx.debugger_exit().await
    })
}
