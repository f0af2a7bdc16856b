//! JSON payloads carried inside frames, other than instructions.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::instruction::Instruction;
use crate::transport::{Frame, FrameKind};

/// Peer's answer to one dispatched instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    #[serde(default)]
    pub succeeded: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Echo of the instruction's `requestId`. Older peers omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl Response {
    pub fn new(succeeded: bool, message: impl Into<String>) -> Self {
        Self {
            succeeded,
            message: Some(message.into()),
            request_id: None,
        }
    }

    pub fn for_request(mut self, request_id: Option<u64>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Whether this response may answer the request `awaited`.
    /// Responses without an id are accepted for any request.
    pub fn answers(&self, awaited: Option<u64>) -> bool {
        match (self.request_id, awaited) {
            (Some(got), Some(want)) => got == want,
            _ => true,
        }
    }
}

/// Settings pushed to the peer right after connecting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeerSettings {
    #[serde(default)]
    pub asset_library_root_path: Option<String>,
}

pub fn instruction_frame(instruction: &Instruction) -> Result<Frame, AppError> {
    Frame::new(FrameKind::InstructionPayload, instruction.to_json()?)
}

pub fn response_frame(response: &Response) -> Result<Frame, AppError> {
    Frame::new(FrameKind::ResponsePayload, serde_json::to_string(response)?)
}

pub fn settings_frame(settings: &PeerSettings) -> Result<Frame, AppError> {
    Frame::new(FrameKind::SettingsPayload, serde_json::to_string(settings)?)
}
