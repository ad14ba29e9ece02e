//! Scenarios that patch the running program
//!
//! Both start from a program whose `Main` does almost nothing, apply one
//! delta at the entry stop and then debug the code the delta added. The
//! updated program text is read from the scenario's `updates/1/Program.cs`.

use futures_util::future::BoxFuture;

use crate::checkpoint::CheckpointChain;
use crate::common::Result;

use super::Context;

const SOURCE: &str = "Program.cs";
const DELTA: &str = "tmp_delta1";

/// Common opening: verify prerequisites, run to entry, apply the delta
async fn patch_at_entry(ctx: &mut Context) -> Result<()> {
    ctx.check_host_runtime_version().await?;
    ctx.check_host_os()?;
    ctx.prepare_hot_reload().await?;
    ctx.was_entry_point_hit().await?;
    // Only answerable once the debuggee has stopped
    ctx.check_target_runtime_version().await?;
    ctx.start_delta_session().await?;

    ctx.get_delta(SOURCE).await?;
    ctx.write_deltas(DELTA).await?;
    ctx.apply_deltas(DELTA).await
}

fn finish(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.end_delta_session().await?;
        ctx.was_exit().await?;
        ctx.debugger_exit().await
    })
}

/// Just-my-code stepping over methods the delta marked as non-user code
///
/// Lines 15-23 of the update call five methods hidden from the debugger:
/// three through method attributes, two through type attributes. Their
/// bodies (28, 33, 38, 46, 54) carry breakpoints that must never fire and
/// stepping in from 19 must land on each following line of the caller.
pub fn jmc_chain() -> Result<CheckpointChain<Context>> {
    CheckpointChain::builder("init")
        .checkpoint("init", "test_breakpoints", jmc_init)
        .checkpoint("test_breakpoints", "test_stepping", jmc_breakpoints)
        .checkpoint("test_stepping", "finish", jmc_stepping)
        .checkpoint("finish", "", finish)
        .build()
}

fn jmc_init(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        patch_at_entry(ctx).await?;
        ctx.enable_line_breakpoint(SOURCE, 19).await?;
        Ok(())
    })
}

fn jmc_breakpoints(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for line in [28, 33, 38, 46, 54] {
            ctx.enable_line_breakpoint(SOURCE, line).await?;
        }
        ctx.continue_execution().await
    })
}

fn jmc_stepping(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.was_line_breakpoint_hit(SOURCE, 19).await?;
        for line in 20..=24 {
            ctx.step_in().await?;
            ctx.was_step(line).await?;
        }
        ctx.continue_execution().await
    })
}

/// Stepping through async methods added by the delta
///
/// The breakpoint sits on an `await` of a newly added method (15). Stepping
/// in lands on its first line (18), tagged as outdated code because its
/// type predates the delta; three step-overs follow (19, 20, 21) and a
/// step-out returns to the caller (16).
pub fn async_stepping_chain() -> Result<CheckpointChain<Context>> {
    CheckpointChain::builder("init")
        .checkpoint("init", "test_stepin_new_code", async_init)
        .checkpoint("test_stepin_new_code", "test_stepover_new_code", async_step_in)
        .checkpoint("test_stepover_new_code", "test_stepout_new_code", async_step_over)
        .checkpoint("test_stepout_new_code", "finish", async_step_out)
        .checkpoint("finish", "", finish)
        .build()
}

fn async_init(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        patch_at_entry(ctx).await?;
        ctx.enable_line_breakpoint(SOURCE, 15).await?;
        ctx.continue_execution().await
    })
}

fn async_step_in(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.was_line_breakpoint_hit(SOURCE, 15).await?;
        ctx.step_in().await?;
        ctx.was_step_in_outdated_code(18).await
    })
}

fn async_step_over(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        for line in [19, 20, 21] {
            ctx.step_over().await?;
            ctx.was_step(line).await?;
        }
        Ok(())
    })
}

fn async_step_out(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.step_out().await?;
        ctx.was_step(16).await?;
        ctx.continue_execution().await
    })
}
