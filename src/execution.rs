//! Editor-peer side: takes one received frame per tick and acts on it.
//! Instructions are run through the remote executors and always answered
//! with exactly one response frame.

use std::sync::Arc;
use std::time::Duration;

use crate::instruction::Instruction;
use crate::protocol::{PeerSettings, Response};
use crate::registry::ExecutorRegistry;
use crate::state::ServerContext;
use crate::transport::{FrameKind, Pump};
use crate::util::CancelToken;

pub const NO_EXECUTOR_MESSAGE: &str = "No appropriate executor was found!";

/// Handle the oldest received frame, if any. Returns its kind.
pub async fn execute_next(
    ctx: &ServerContext,
    executors: &ExecutorRegistry<ServerContext>,
) -> Option<FrameKind> {
    let frame = ctx.transport.dequeue_received()?;
    let kind = frame.kind();
    match kind {
        FrameKind::SettingsPayload => match serde_json::from_str::<PeerSettings>(frame.payload()) {
            Ok(settings) => {
                tracing::info!(root = ?settings.asset_library_root_path, "received peer settings");
                ctx.set_peer_settings(settings);
            }
            Err(e) => tracing::warn!(error = %e, "ignoring malformed settings"),
        },
        FrameKind::InstructionPayload => {
            let response = answer(ctx, executors, frame.payload()).await;
            reply(ctx, FrameKind::ResponsePayload, serde_json::to_string(&response));
        }
        FrameKind::PlainMessage => {
            reply(
                ctx,
                FrameKind::PlainMessage,
                Ok(format!("Received message: {}", frame.payload())),
            );
        }
        FrameKind::ResponsePayload | FrameKind::Void => {
            tracing::debug!(?kind, "ignoring frame");
        }
    }
    Some(kind)
}

async fn answer(
    ctx: &ServerContext,
    executors: &ExecutorRegistry<ServerContext>,
    payload: &str,
) -> Response {
    let instruction: Instruction = match serde_json::from_str(payload) {
        Ok(instruction) => instruction,
        Err(e) => return Response::new(false, format!("Invalid instruction: {e}")),
    };
    if !executors.contains(&instruction.action) {
        tracing::warn!(action = %instruction.action, "no executor for instruction");
        return Response::new(false, NO_EXECUTOR_MESSAGE).for_request(instruction.request_id);
    }
    let outcome = executors.dispatch(ctx, &instruction).await;
    Response {
        succeeded: outcome.succeeded,
        message: outcome.message,
        request_id: instruction.request_id,
    }
}

fn reply(ctx: &ServerContext, kind: FrameKind, payload: Result<String, serde_json::Error>) {
    let sent = payload
        .map_err(crate::error::AppError::from)
        .and_then(|payload| ctx.transport.enqueue_send(kind, payload));
    if let Err(e) = sent {
        tracing::warn!(?kind, error = %e, "reply dropped");
    }
}

/// Pump the server transport and handle one frame per `tick` until
/// `cancel` fires.
pub async fn run_server(
    ctx: Arc<ServerContext>,
    executors: ExecutorRegistry<ServerContext>,
    tick: Duration,
    cancel: CancelToken,
) {
    let mut interval = tokio::time::interval(tick.max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    while !cancel.is_cancelled() {
        interval.tick().await;
        ctx.transport.pump();
        execute_next(&ctx, &executors).await;
    }
    ctx.transport.stop();
}
