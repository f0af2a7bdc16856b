use crate::error::AppError;
use crate::instruction::Instruction;
use crate::registry::ExecutionOutcome;
use crate::state::ClientContext;

pub async fn connect(
    ctx: &ClientContext,
    _instruction: &Instruction,
) -> Result<ExecutionOutcome, AppError> {
    if ctx.transport.is_connected() {
        return Ok(ExecutionOutcome::succeeded("Is already connected!"));
    }
    ctx.transport.connect(&ctx.cancel).await;
    if ctx.transport.is_connected() {
        Ok(ExecutionOutcome::succeeded("Connected!"))
    } else {
        Ok(ExecutionOutcome::failed("Failed to establish connection!"))
    }
}

pub async fn disconnect(
    ctx: &ClientContext,
    _instruction: &Instruction,
) -> Result<ExecutionOutcome, AppError> {
    if !ctx.transport.is_connected() {
        return Ok(ExecutionOutcome::succeeded("Is already disconnected!"));
    }
    ctx.transport.disconnect();
    tokio::task::yield_now().await;
    if ctx.transport.is_connected() {
        Ok(ExecutionOutcome::failed("Couldn't disconnect!"))
    } else {
        Ok(ExecutionOutcome::succeeded("Disconnected!"))
    }
}
