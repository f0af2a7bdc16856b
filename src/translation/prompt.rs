//! Prompts sent to the completion endpoint.

use crate::registry::catalog;

const SYSTEM_PREAMBLE: &str = r#"You translate user requests into JSON instructions for game-editor tooling.

CRITICAL OUTPUT RULES (STRICT):
- Output ONLY the JSON payload.
- Do NOT include explanations, comments, or prose.
- Do NOT wrap JSON in ``` code fences.
- Do NOT prepend text like 'Here is the JSON'.
- If you output anything other than raw JSON, the system will fail.

ACTION SELECTION RULES (very important):
- Use create_project ONLY when the user explicitly asks for a NEW project (keywords: 'new', 'create').
- Use init_project when the user asks to initialize / set up / configure an existing project (keywords: 'init', 'initialize', 'configure').
- If the user says 'initialize' but also says 'new project', choose create_project.

Return either:
(A) InstructionList:
{ "type": "InstructionList", "instructions": [ Instruction, ... ] }

OR

(B) Instruction:
{
  "type": "Instruction",
  "action": "...",
  "state": "Init|Local|Raw|Resolved",
  "desc": "...",
  "parameters": [ { "name": "", "value": ... } ],
  "assets": [ { "name": "", "value": ... } ],
  "instructions": [ ... ]
}

SCHEMA RULES:
- 'parameters' MUST be an array of { name, value }.
- 'assets' MUST be an array of { name, value } (use [] if none).
- value may be string, number, boolean, array, or object.

NORMALIZATION:
- Treat '|' as '\' in Windows paths (C:|Games → C:\Games).
- Escape backslashes in JSON strings (C:\\Games).

ACTION MUST be one of the allowed actions:
"#;

const UNKNOWN_FALLBACK: &str = r#"If the request cannot be mapped, output:
{
  "type": "Instruction",
  "action": "unknown",
  "state": "Invalid",
  "desc": "Unsupported request",
  "parameters": [ { "name": "reason", "value": "..." } ],
  "assets": [],
  "instructions": []
}"#;

const REPAIR_SYSTEM: &str = r#"You are a JSON repair tool.

Return ONLY valid JSON.
No prose, no explanations, no markdown, no ``` fences.
Output must be either an InstructionList or Instruction, using keys:
type, action, state, desc, parameters, assets, instructions.

parameters/assets must be arrays of { name, value }.
value may be string, number, boolean, array, or object."#;

const REPAIR_USER_PREFIX: &str = "Fix the following content so that the final output is ONLY a valid JSON payload (InstructionList or Instruction).
Remove any prose, remove ``` fences, and ensure JSON is valid.

CONTENT TO FIX:
";

/// Instruction-schema contract plus the allowed-action list.
pub fn system_prompt() -> String {
    format!(
        "{SYSTEM_PREAMBLE}{}\n\n{UNKNOWN_FALLBACK}",
        catalog::prompt_spec()
    )
}

pub fn repair_system_prompt() -> &'static str {
    REPAIR_SYSTEM
}

/// Repair request embedding the malformed output verbatim.
pub fn repair_user_prompt(original_output: &str) -> String {
    format!("{REPAIR_USER_PREFIX}{original_output}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_embeds_catalog_and_fallback() {
        let prompt = system_prompt();
        assert!(prompt.contains("Allowed actions (choose only from this list):"));
        assert!(prompt.contains("- set_object_scale(state: Resolved, params: { name, scale })"));
        assert!(prompt.contains(r#""action": "unknown""#));
    }

    #[test]
    fn repair_prompt_keeps_original_output() {
        let prompt = repair_user_prompt("Sure! {broken");
        assert!(prompt.ends_with("CONTENT TO FIX:\nSure! {broken"));
        assert!(repair_system_prompt().starts_with("You are a JSON repair tool."));
    }
}
