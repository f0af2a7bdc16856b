//! Instruction pipeline: walks an instruction list with an explicit cursor,
//! running Local instructions in-process and sending Resolved ones to the
//! editor peer. Follow-ups are spliced in right after the current position.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::AppError;
use crate::instruction::{Instruction, InstructionState};
use crate::protocol::Response;
use crate::registry::{ExecutionOutcome, ExecutorRegistry};
use crate::resolution;
use crate::settings::LinkSettings;
use crate::state::ClientContext;
use crate::transport::FrameKind;
use crate::translation::Cascade;

pub const RESPONSE_TIMEOUT_MESSAGE: &str = "Timeout waiting for the response!";
pub const DISCONNECTED_MESSAGE: &str = "Disconnected while waiting for the response!";

/// Bounds of the wait for a peer response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseWait {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for ResponseWait {
    fn default() -> Self {
        Self::from_settings(&LinkSettings::default())
    }
}

impl ResponseWait {
    pub fn from_settings(link: &LinkSettings) -> Self {
        Self {
            timeout: Duration::from_millis(link.response_timeout_ms),
            poll: Duration::from_millis(link.response_poll_ms.max(1)),
        }
    }
}

/// Result of sending one instruction to the peer. `responded` is false for
/// timeouts, disconnects and frames that never left the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteOutcome {
    pub responded: bool,
    pub succeeded: bool,
    pub message: String,
}

impl RemoteOutcome {
    fn no_response(message: impl Into<String>) -> Self {
        Self {
            responded: false,
            succeeded: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub action: String,
    pub state: InstructionState,
    pub succeeded: bool,
    pub message: Option<String>,
}

/// Outcome of a whole run: the AND of every step plus the transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub succeeded: bool,
    pub transcript: Vec<String>,
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn text(&self) -> String {
        self.transcript.join("\n")
    }
}

/// Insert `items` after `cursor`, or append them when `cursor` is the last
/// index.
pub fn splice_after(list: &mut Vec<Instruction>, cursor: usize, items: Vec<Instruction>) {
    if items.is_empty() {
        return;
    }
    if cursor + 1 < list.len() {
        let at = cursor + 1;
        list.splice(at..at, items);
    } else {
        list.extend(items);
    }
}

struct Step {
    succeeded: bool,
    message: Option<String>,
    additional: Vec<Instruction>,
}

impl From<ExecutionOutcome> for Step {
    fn from(outcome: ExecutionOutcome) -> Self {
        Self {
            succeeded: outcome.succeeded,
            message: outcome.message,
            additional: outcome.additional,
        }
    }
}

impl Step {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: Some(message.into()),
            additional: Vec::new(),
        }
    }
}

pub struct Pipeline<'a> {
    ctx: &'a ClientContext,
    executors: &'a ExecutorRegistry<ClientContext>,
    wait: ResponseWait,
    halt_on_failure: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(ctx: &'a ClientContext, executors: &'a ExecutorRegistry<ClientContext>) -> Self {
        let wait = ctx.with_settings(|s| ResponseWait::from_settings(&s.link));
        Self {
            ctx,
            executors,
            wait,
            halt_on_failure: true,
        }
    }

    pub fn with_wait(mut self, wait: ResponseWait) -> Self {
        self.wait = wait;
        self
    }

    /// Keep walking after a failed step instead of stopping there.
    pub fn continue_on_failure(mut self) -> Self {
        self.halt_on_failure = false;
        self
    }

    pub async fn run(&self, instructions: Vec<Instruction>) -> RunReport {
        let mut list = instructions;
        let mut report = RunReport {
            succeeded: true,
            ..RunReport::default()
        };

        let mut cursor = 0;
        while cursor < list.len() {
            if self.halt_on_failure && !report.succeeded {
                break;
            }
            let Some(mut instruction) = list.get(cursor).cloned() else {
                break;
            };

            let step = self.process(&mut instruction).await;
            report.succeeded &= step.succeeded;
            if let Some(message) = &step.message {
                report.transcript.push(message.clone());
            }
            report.steps.push(StepRecord {
                action: instruction.action.clone(),
                state: instruction.state,
                succeeded: step.succeeded,
                message: step.message,
            });

            splice_after(&mut list, cursor, step.additional);
            splice_after(&mut list, cursor, std::mem::take(&mut instruction.instructions));
            cursor += 1;
        }
        report
    }

    async fn process(&self, instruction: &mut Instruction) -> Step {
        match instruction.state {
            InstructionState::Local => {
                let outcome = self.executors.dispatch(self.ctx, instruction).await;
                let mut step = Step::from(outcome);
                if !step.succeeded && step.message.is_none() {
                    step.message = Some(format!(
                        "No local executor handles '{}'.",
                        instruction.action
                    ));
                }
                step
            }
            InstructionState::Batch => Step {
                succeeded: true,
                message: None,
                additional: Vec::new(),
            },
            InstructionState::Raw | InstructionState::Resolved => {
                if let Err(e) = resolution::resolve_instruction(self.ctx.resolver.as_ref(), instruction).await
                {
                    tracing::warn!(action = %instruction.action, error = %e, "resolution failed");
                    return Step::failed(format!(
                        "Failed to resolve the '{}' instruction!",
                        instruction.action
                    ));
                }
                let remote = self.send_and_wait(instruction).await;
                Step {
                    succeeded: remote.responded && remote.succeeded,
                    message: Some(remote.message),
                    additional: Vec::new(),
                }
            }
            InstructionState::Init | InstructionState::Invalid => Step::failed(format!(
                "Failed to resolve the '{}' instruction!",
                instruction.action
            )),
        }
    }

    /// Send a Resolved instruction and wait for its response.
    pub async fn send_and_wait(&self, instruction: &mut Instruction) -> RemoteOutcome {
        let transport = &self.ctx.transport;
        transport.clear_received();
        let request_id = self.ctx.next_request_id();
        instruction.request_id = Some(request_id);

        let sent = instruction
            .to_json()
            .map_err(AppError::from)
            .and_then(|json| transport.enqueue_send(FrameKind::InstructionPayload, json));
        if let Err(e) = sent {
            tracing::warn!(action = %instruction.action, error = %e, "instruction not sent");
            return RemoteOutcome::no_response(e.to_string());
        }
        tracing::debug!(action = %instruction.action, request_id, "instruction queued");
        self.wait_for_response(Some(request_id)).await
    }

    async fn wait_for_response(&self, request_id: Option<u64>) -> RemoteOutcome {
        let transport = &self.ctx.transport;
        let epoch = transport.disconnect_count();
        let deadline = Instant::now() + self.wait.timeout;

        loop {
            while let Some(frame) = transport.dequeue_received() {
                if frame.kind() != FrameKind::ResponsePayload {
                    tracing::debug!(kind = ?frame.kind(), "ignoring frame while waiting for a response");
                    continue;
                }
                match serde_json::from_str::<Response>(frame.payload()) {
                    Ok(response) if response.answers(request_id) => {
                        return RemoteOutcome {
                            responded: true,
                            succeeded: response.succeeded,
                            message: response.message.unwrap_or_default(),
                        };
                    }
                    Ok(response) => {
                        tracing::debug!(got = ?response.request_id, want = ?request_id, "dropping stale response");
                    }
                    Err(e) => {
                        return RemoteOutcome {
                            responded: true,
                            succeeded: false,
                            message: format!("Invalid response: {e}"),
                        };
                    }
                }
            }
            if transport.disconnect_count() != epoch {
                return RemoteOutcome::no_response(DISCONNECTED_MESSAGE);
            }
            if Instant::now() >= deadline {
                return RemoteOutcome::no_response(RESPONSE_TIMEOUT_MESSAGE);
            }
            tokio::time::sleep(self.wait.poll).await;
        }
    }
}

/// Translate one free-text entry and run the result.
pub async fn process_intent(
    ctx: &ClientContext,
    cascade: &Cascade,
    executors: &ExecutorRegistry<ClientContext>,
    text: &str,
) -> Result<RunReport, AppError> {
    let instructions = cascade.translate(text).await?;
    Ok(Pipeline::new(ctx, executors).run(instructions).await)
}
