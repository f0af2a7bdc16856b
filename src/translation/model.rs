//! Model-backed translator: one chat exchange, then extract, parse,
//! normalize and validate the reply. Replies that cannot be parsed get a
//! bounded number of repair exchanges.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::extract::extract_first_json;
use super::llm::CompletionClient;
use super::{prompt, Translator};
use crate::error::AppError;
use crate::instruction::{Instruction, INSTRUCTION_LIST_TAG, INSTRUCTION_TAG};
use crate::registry::catalog::{self, UNKNOWN_ACTION};

pub struct ModelTranslator {
    client: Arc<dyn CompletionClient>,
    max_repair_attempts: u32,
}

impl ModelTranslator {
    pub fn new(client: Arc<dyn CompletionClient>, max_repair_attempts: u32) -> Self {
        Self {
            client,
            max_repair_attempts,
        }
    }

    async fn repair(&self, original_output: String) -> Result<Vec<Instruction>, AppError> {
        let mut output = original_output;
        let mut parse_error = String::new();
        for attempt in 1..=self.max_repair_attempts {
            tracing::info!(attempt, "repairing model output");
            output = self
                .client
                .complete(
                    prompt::repair_system_prompt(),
                    &prompt::repair_user_prompt(&output),
                )
                .await?;
            match parse_payload(&output) {
                Ok(mut instructions) => {
                    normalize(&mut instructions);
                    return match validate(&instructions) {
                        Ok(()) => Ok(instructions),
                        Err(e) => Err(AppError::Validation {
                            message: format!("{e} (after repair)\nRepaired output:\n{output}"),
                        }),
                    };
                }
                Err(e) => parse_error = e,
            }
        }
        Err(AppError::Parse {
            message: format!("Parse failed after repair.\n{parse_error}"),
            raw_output: output,
        })
    }
}

#[async_trait]
impl Translator for ModelTranslator {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn translate(&self, text: &str) -> Result<Vec<Instruction>, AppError> {
        if text.trim().is_empty() {
            return Err(AppError::Validation {
                message: "Prompt is empty.".to_string(),
            });
        }

        let content = self
            .client
            .complete(&prompt::system_prompt(), text)
            .await?;

        match parse_payload(&content) {
            Ok(mut instructions) => {
                normalize(&mut instructions);
                validate(&instructions).map_err(|e| AppError::Validation {
                    message: format!("{e}\nRaw output:\n{content}"),
                })?;
                Ok(instructions)
            }
            Err(e) if self.max_repair_attempts == 0 => Err(AppError::Parse {
                message: e,
                raw_output: content,
            }),
            Err(e) => {
                tracing::debug!(error = %e, "model output did not parse");
                self.repair(content).await
            }
        }
    }
}

// ── Parse / normalize / validate ────────────────────────────────

/// Decode the first JSON object in `text` as an instruction or an
/// instruction list. A single instruction becomes a one-element list.
pub fn parse_payload(text: &str) -> Result<Vec<Instruction>, String> {
    let json = extract_first_json(text)
        .ok_or_else(|| "Could not find JSON in model output.".to_string())?;

    let root: Value = serde_json::from_str(&json)
        .map_err(|e| format!("Invalid JSON after extraction: {e}\nExtracted:\n{json}"))?;
    let Value::Object(map) = root else {
        return Err(format!(
            "Invalid JSON after extraction: expected an object\nExtracted:\n{json}"
        ));
    };

    let kind = map
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("type"))
        .and_then(|(_, value)| value.as_str())
        .map(str::to_string);

    match kind.as_deref() {
        Some(t) if t.eq_ignore_ascii_case(INSTRUCTION_LIST_TAG) => {
            let items = map
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("instructions"))
                .map(|(_, value)| value.clone())
                .unwrap_or(Value::Null);
            let items = match items {
                Value::Null => Vec::new(),
                Value::Array(items) => items,
                _ => return Err("Failed to parse InstructionList: instructions must be an array".to_string()),
            };
            items
                .into_iter()
                .filter(|item| !item.is_null())
                .map(|item| {
                    Instruction::try_from(item)
                        .map_err(|e| format!("Failed to parse InstructionList: {e}"))
                })
                .collect()
        }
        Some(t) if t.eq_ignore_ascii_case(INSTRUCTION_TAG) => Instruction::try_from(Value::Object(map))
            .map(|ins| vec![ins])
            .map_err(|e| format!("Failed to parse Instruction: {e}")),
        other => Err(format!(
            "Unknown payload type '{}'.",
            other.unwrap_or("(null)")
        )),
    }
}

/// Fill missing type tags on the instructions and their direct children.
pub fn normalize(instructions: &mut [Instruction]) {
    for instruction in instructions {
        instruction
            .kind
            .get_or_insert_with(|| INSTRUCTION_TAG.to_string());
        for child in &mut instruction.instructions {
            child.kind.get_or_insert_with(|| INSTRUCTION_TAG.to_string());
        }
    }
}

/// Every instruction must be tagged `Instruction` and carry an allowed
/// action. `unknown` is always accepted.
pub fn validate(instructions: &[Instruction]) -> Result<(), String> {
    for (i, instruction) in instructions.iter().enumerate() {
        let kind = instruction.kind.as_deref().unwrap_or("");
        if !kind.eq_ignore_ascii_case(INSTRUCTION_TAG) {
            return Err(format!("Instruction[{i}] has invalid type '{kind}'."));
        }
        let action = instruction.action.trim();
        if action.is_empty() {
            return Err(format!("Instruction[{i}] missing action."));
        }
        if action.eq_ignore_ascii_case(UNKNOWN_ACTION) {
            continue;
        }
        if !catalog::is_allowed(action) {
            return Err(format!(
                "Instruction[{i}] action '{}' is not allowed.",
                instruction.action
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::*;
    use crate::instruction::InstructionState;

    /// Replays canned replies and records every prompt pair.
    struct Scripted {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        async fn complete(&self, system: &str, user: &str) -> Result<String, AppError> {
            self.calls.lock().push((system.to_string(), user.to_string()));
            self.replies.lock().pop_front().ok_or_else(|| AppError::Api {
                message: "no scripted reply".to_string(),
            })
        }
    }

    #[test]
    fn single_instruction_is_wrapped() {
        let out = parse_payload(
            "Sure! ```json\n{\"type\":\"Instruction\",\"action\":\"connect\",\"state\":\"Local\"}\n```",
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, "connect");
        assert_eq!(out[0].state, InstructionState::Local);
    }

    #[test]
    fn instruction_list_parses_with_lenient_keys() {
        let out = parse_payload(
            r#"{"type":"instructionlist","instructions":[
                {"action":"goto_space","state":"Resolved","params":[{"name":"spaceName","value":"Lobby"}]},
                null
            ]}"#,
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, None);
        assert_eq!(out[0].param("spaceName").as_str_or(""), "Lobby");
    }

    #[test]
    fn parse_errors_are_descriptive() {
        assert_eq!(
            parse_payload("no json here").unwrap_err(),
            "Could not find JSON in model output."
        );
        assert!(parse_payload("{\"type\": }")
            .unwrap_err()
            .starts_with("Invalid JSON after extraction:"));
        assert_eq!(
            parse_payload(r#"{"action":"connect"}"#).unwrap_err(),
            "Unknown payload type '(null)'."
        );
        assert_eq!(
            parse_payload(r#"{"type":"Plan"}"#).unwrap_err(),
            "Unknown payload type 'Plan'."
        );
    }

    #[test]
    fn normalize_fills_tags_one_level_deep() {
        let mut list = parse_payload(
            r#"{"type":"InstructionList","instructions":[{"action":"connect","instructions":[{"action":"disconnect"}]}]}"#,
        )
        .unwrap();
        normalize(&mut list);
        assert_eq!(list[0].kind.as_deref(), Some(INSTRUCTION_TAG));
        assert_eq!(list[0].instructions[0].kind.as_deref(), Some(INSTRUCTION_TAG));
        assert!(list[0].parameters.is_empty());
        assert!(list[0].assets.is_empty());
    }

    #[test]
    fn validation_rules() {
        let drop_table = parse_payload(r#"{"type":"Instruction","action":"drop_table"}"#).unwrap();
        assert_eq!(
            validate(&drop_table).unwrap_err(),
            "Instruction[0] action 'drop_table' is not allowed."
        );

        let unknown = parse_payload(r#"{"type":"Instruction","action":"unknown"}"#).unwrap();
        assert!(validate(&unknown).is_ok());

        let blank = vec![Instruction::local("  ")];
        assert_eq!(validate(&blank).unwrap_err(), "Instruction[0] missing action.");

        let mut wrong = Instruction::local("connect");
        wrong.kind = Some("Command".into());
        assert_eq!(
            validate(&[Instruction::local("connect"), wrong]).unwrap_err(),
            "Instruction[1] has invalid type 'Command'."
        );
    }

    #[tokio::test]
    async fn valid_reply_needs_one_exchange() {
        let client = Scripted::new(&[r#"{"type":"Instruction","action":"save_space","state":"Resolved"}"#]);
        let translator = ModelTranslator::new(client.clone(), 1);
        let out = translator.translate("save the space").await.unwrap();
        assert_eq!(out[0].action, "save_space");

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.contains("Allowed actions"));
        assert_eq!(calls[0].1, "save the space");
    }

    #[tokio::test]
    async fn unparsable_reply_is_repaired() {
        let client = Scripted::new(&[
            "I think you want to connect.",
            r#"{"type":"Instruction","action":"connect","state":"Local"}"#,
        ]);
        let translator = ModelTranslator::new(client.clone(), 1);
        let out = translator.translate("hook me up").await.unwrap();
        assert_eq!(out[0].action, "connect");

        let calls = client.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0.starts_with("You are a JSON repair tool."));
        assert!(calls[1].1.ends_with("I think you want to connect."));
    }

    #[tokio::test]
    async fn validation_failure_is_not_repaired() {
        let client = Scripted::new(&[r#"{"type":"Instruction","action":"drop_table"}"#]);
        let translator = ModelTranslator::new(client.clone(), 3);
        let err = translator.translate("drop it").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert!(err.to_string().contains("Raw output:"));
        assert_eq!(client.calls().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_repairs_surface_last_output() {
        let client = Scripted::new(&["nope", "still nope", "nope again"]);
        let translator = ModelTranslator::new(client.clone(), 2);
        let err = translator.translate("do a thing").await.unwrap_err();
        let AppError::Parse {
            message,
            raw_output,
        } = err
        else {
            panic!("expected a parse error");
        };
        assert!(message.starts_with("Parse failed after repair."));
        assert_eq!(raw_output, "nope again");
        assert_eq!(client.calls().len(), 3);
    }

    #[tokio::test]
    async fn zero_repair_attempts_fail_immediately() {
        let client = Scripted::new(&["nope"]);
        let translator = ModelTranslator::new(client.clone(), 0);
        let err = translator.translate("do a thing").await.unwrap_err();
        assert_eq!(
            err,
            AppError::Parse {
                message: "Could not find JSON in model output.".into(),
                raw_output: "nope".into(),
            }
        );
        assert!(translator.translate("   ").await.is_err());
    }
}
