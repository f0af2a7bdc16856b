//! Instruction data model and its JSON envelope.
//!
//! Decoding is lenient because instructions arrive from language models:
//! keys match case-insensitively, `params` stands in for `parameters`, null
//! lists read as empty, and `state` may be a name or its numeric code.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Type tag carried by every instruction.
pub const INSTRUCTION_TAG: &str = "Instruction";
/// Type tag of the list envelope.
pub const INSTRUCTION_LIST_TAG: &str = "InstructionList";

// ── State ────────────────────────────────────────────────────────

/// Lifecycle of an instruction. Only `Local` and `Resolved` instructions are
/// dispatchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, JsonSchema)]
pub enum InstructionState {
    Invalid,
    #[default]
    Init,
    Local,
    Raw,
    Resolved,
    Batch,
}

impl InstructionState {
    pub const ALL: [InstructionState; 6] = [
        InstructionState::Invalid,
        InstructionState::Init,
        InstructionState::Local,
        InstructionState::Raw,
        InstructionState::Resolved,
        InstructionState::Batch,
    ];

    pub fn code(self) -> i64 {
        match self {
            InstructionState::Invalid => -1,
            InstructionState::Init => 0,
            InstructionState::Local => 1,
            InstructionState::Raw => 2,
            InstructionState::Resolved => 3,
            InstructionState::Batch => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.code() == code)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|state| format!("{state:?}").eq_ignore_ascii_case(name))
    }
}

impl<'de> Deserialize<'de> for InstructionState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Name(String),
            Code(i64),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Name(name) => Self::from_name(&name)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown state '{name}'"))),
            Repr::Code(code) => Self::from_code(code)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown state code {code}"))),
        }
    }
}

// ── ValuePair ────────────────────────────────────────────────────

/// A named, dynamically typed parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValuePair {
    #[serde(default, alias = "Name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, alias = "Value")]
    pub value: Value,
}

impl ValuePair {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Typed view of one parameter lookup. Every accessor takes the value to use
/// when the parameter is missing or has the wrong shape.
#[derive(Debug, Clone, Copy)]
pub struct Param<'a>(Option<&'a Value>);

impl<'a> Param<'a> {
    pub fn raw(self) -> Option<&'a Value> {
        self.0
    }

    pub fn is_present(self) -> bool {
        self.0.is_some_and(|v| !v.is_null())
    }

    pub fn as_str_or(self, fallback: &str) -> String {
        match self.0 {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => fallback.to_string(),
        }
    }

    /// Non-empty string, or `None`.
    pub fn as_non_empty_str(self) -> Option<String> {
        Some(self.as_str_or("")).filter(|s| !s.trim().is_empty())
    }

    pub fn as_bool_or(self, fallback: bool) -> bool {
        match self.0 {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => fallback,
            },
            Some(Value::Number(n)) => n.as_f64().map_or(fallback, |f| f != 0.0),
            _ => fallback,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn as_i64_or(self, fallback: i64) -> i64 {
        match self.0 {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .unwrap_or(fallback),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(fallback),
            _ => fallback,
        }
    }

    pub fn as_f64_or(self, fallback: f64) -> f64 {
        match self.0 {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(fallback),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(fallback),
            _ => fallback,
        }
    }

    /// Accepts `[x, y, z]`, `{"x":..,"y":..,"z":..}` and `"(x, y, z)"`.
    pub fn as_vec3_or(self, fallback: [f64; 3]) -> [f64; 3] {
        let parts: Option<Vec<f64>> = match self.0 {
            Some(Value::Array(items)) => items.iter().map(Value::as_f64).collect(),
            Some(Value::Object(map)) => ["x", "y", "z"]
                .iter()
                .map(|axis| {
                    map.iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(axis))
                        .and_then(|(_, v)| v.as_f64())
                })
                .collect(),
            Some(Value::String(s)) => s
                .trim()
                .trim_start_matches('(')
                .trim_end_matches(')')
                .split(',')
                .map(|part| part.trim().parse().ok())
                .collect(),
            _ => None,
        };
        match parts.as_deref() {
            Some(&[x, y, z]) => [x, y, z],
            _ => fallback,
        }
    }
}

// ── Instruction ──────────────────────────────────────────────────

/// One unit of intended action.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Instruction {
    /// Envelope tag, `"Instruction"` once normalized.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub action: String,
    pub state: InstructionState,
    pub desc: String,
    pub parameters: Vec<ValuePair>,
    pub assets: Vec<String>,
    pub instructions: Vec<Instruction>,
    /// Correlates an outgoing instruction with its response.
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
}

impl Default for Instruction {
    fn default() -> Self {
        Self {
            kind: Some(INSTRUCTION_TAG.to_string()),
            action: String::new(),
            state: InstructionState::Init,
            desc: String::new(),
            parameters: Vec::new(),
            assets: Vec::new(),
            instructions: Vec::new(),
            request_id: None,
        }
    }
}

impl Instruction {
    pub fn new(action: impl Into<String>, state: InstructionState) -> Self {
        Self {
            action: action.into(),
            state,
            ..Self::default()
        }
    }

    pub fn local(action: impl Into<String>) -> Self {
        Self::new(action, InstructionState::Local)
    }

    pub fn resolved(action: impl Into<String>) -> Self {
        Self::new(action, InstructionState::Resolved)
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_param(name, value);
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Case-insensitive lookup; the last pair with a matching name wins.
    pub fn param(&self, name: &str) -> Param<'_> {
        Param(
            self.parameters
                .iter()
                .rev()
                .find(|pair| pair.name.eq_ignore_ascii_case(name))
                .map(|pair| &pair.value),
        )
    }

    /// Replace the value of an existing (case-insensitive) name or append.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self
            .parameters
            .iter_mut()
            .rev()
            .find(|pair| pair.name.eq_ignore_ascii_case(&name))
        {
            Some(pair) => pair.value = value,
            None => self.parameters.push(ValuePair { name, value }),
        }
    }

    pub fn is_dispatchable(&self) -> bool {
        matches!(
            self.state,
            InstructionState::Local | InstructionState::Resolved
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<'de> Deserialize<'de> for Instruction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Instruction::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<Value> for Instruction {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(serde::de::Error::custom("instruction must be a JSON object"));
        };
        let wire: WireInstruction = serde_json::from_value(Value::Object(canonical_keys(map)))?;
        Ok(Instruction {
            kind: wire.kind,
            action: wire.action.trim().to_string(),
            state: wire.state.unwrap_or_default(),
            desc: wire.desc,
            parameters: wire.parameters,
            assets: wire.assets,
            instructions: wire.instructions,
            request_id: wire.request_id,
        })
    }
}

#[derive(Deserialize)]
struct WireInstruction {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    action: String,
    #[serde(default)]
    state: Option<InstructionState>,
    #[serde(default, deserialize_with = "null_as_default")]
    desc: String,
    #[serde(default, deserialize_with = "null_as_default")]
    parameters: Vec<ValuePair>,
    #[serde(default, deserialize_with = "lenient_assets")]
    assets: Vec<String>,
    #[serde(default, deserialize_with = "non_null_children")]
    instructions: Vec<Instruction>,
    #[serde(rename = "requestId", default)]
    request_id: Option<u64>,
}

/// Canonical key for every accepted spelling. Exact names beat aliases.
fn canonical_name(key: &str) -> Option<(&'static str, bool)> {
    let lower = key.to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "type" => ("type", true),
        "action" => ("action", true),
        "state" => ("state", true),
        "desc" => ("desc", true),
        "description" => ("desc", false),
        "parameters" => ("parameters", true),
        "params" => ("parameters", false),
        "assets" => ("assets", true),
        "instructions" => ("instructions", true),
        "requestid" => ("requestId", true),
        "request_id" => ("requestId", false),
        _ => return None,
    };
    Some(canonical)
}

fn canonical_keys(map: Map<String, Value>) -> Map<String, Value> {
    let mut exact = Map::new();
    let mut aliased = Map::new();
    for (key, value) in map {
        if let Some((canonical, is_exact)) = canonical_name(&key) {
            let target = if is_exact { &mut exact } else { &mut aliased };
            target.entry(canonical).or_insert(value);
        }
    }
    for (key, value) in aliased {
        exact.entry(key).or_insert(value);
    }
    exact
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Assets are plain strings, but models also emit `{name, value}` pairs.
fn lenient_assets<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let items: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(map) => map
                .get("value")
                .and_then(Value::as_str)
                .or_else(|| map.get("name").and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        })
        .collect())
}

fn non_null_children<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<Instruction>, D::Error> {
    let items: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    items
        .unwrap_or_default()
        .into_iter()
        .filter(|item| !item.is_null())
        .map(|item| Instruction::try_from(item).map_err(serde::de::Error::custom))
        .collect()
}

// ── Envelope ─────────────────────────────────────────────────────

/// Serialized form of an instruction list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionList {
    #[serde(rename = "type")]
    pub kind: String,
    pub instructions: Vec<Instruction>,
}

impl InstructionList {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            kind: INSTRUCTION_LIST_TAG.to_string(),
            instructions,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn state_accepts_names_in_any_case_and_codes() {
        let parse = |v: Value| serde_json::from_value::<InstructionState>(v).unwrap();
        assert_eq!(parse(json!("resolved")), InstructionState::Resolved);
        assert_eq!(parse(json!("LOCAL")), InstructionState::Local);
        assert_eq!(parse(json!(-1)), InstructionState::Invalid);
        assert_eq!(parse(json!(2)), InstructionState::Raw);
        assert!(serde_json::from_value::<InstructionState>(json!("pending")).is_err());
        assert_eq!(
            serde_json::to_value(InstructionState::Batch).unwrap(),
            json!("Batch")
        );
    }

    #[test]
    fn decodes_aliases_and_nulls() {
        let ins: Instruction = serde_json::from_value(json!({
            "Type": "Instruction",
            "Action": " goto_space ",
            "state": "Resolved",
            "desc": null,
            "params": [{"name": "spaceName", "value": "Lobby"}],
            "Assets": null,
            "instructions": [null, {"action": "save_space", "parameters": null}]
        }))
        .unwrap();
        assert_eq!(ins.kind.as_deref(), Some("Instruction"));
        assert_eq!(ins.action, "goto_space");
        assert_eq!(ins.desc, "");
        assert_eq!(ins.param("SPACENAME").as_str_or(""), "Lobby");
        assert!(ins.assets.is_empty());
        assert_eq!(ins.instructions.len(), 1);
        assert_eq!(ins.instructions[0].state, InstructionState::Init);
        assert_eq!(ins.instructions[0].kind, None);
    }

    #[test]
    fn exact_key_beats_alias() {
        let ins: Instruction = serde_json::from_value(json!({
            "params": [{"name": "a", "value": 1}],
            "parameters": [{"name": "b", "value": 2}]
        }))
        .unwrap();
        assert_eq!(ins.parameters.len(), 1);
        assert_eq!(ins.parameters[0].name, "b");
    }

    #[test]
    fn assets_accept_strings_and_pairs() {
        let ins: Instruction = serde_json::from_value(json!({
            "action": "create_object",
            "assets": ["Assets/Tree.prefab", {"name": "rock", "value": "Assets/Rock.prefab"}, {"name": "bush"}, true]
        }))
        .unwrap();
        assert_eq!(
            ins.assets,
            vec!["Assets/Tree.prefab", "Assets/Rock.prefab", "bush"]
        );
    }

    #[test]
    fn param_lookup_is_case_insensitive_last_write_wins() {
        let mut ins = Instruction::local("x");
        ins.parameters.push(ValuePair::new("Speed", 1));
        ins.parameters.push(ValuePair::new("speed", 5));
        assert_eq!(ins.param("SPEED").as_i64_or(0), 5);
        assert_eq!(ins.param("missing").as_i64_or(42), 42);
        assert!(!ins.param("missing").is_present());

        ins.set_param("SPEED", 9);
        assert_eq!(ins.parameters.len(), 2);
        assert_eq!(ins.param("speed").as_i64_or(0), 9);
    }

    #[test]
    fn typed_accessors_coerce_sensibly() {
        let ins = Instruction::local("x")
            .with_param("flag", "TRUE")
            .with_param("count", "12")
            .with_param("ratio", 2.5)
            .with_param("pos", "(1, 2.5, -3)")
            .with_param("rot", json!([0, 90, 0]))
            .with_param("scale", json!({"X": 2, "y": 2, "z": 2}))
            .with_param("bad", json!([1, 2]));
        assert!(ins.param("flag").as_bool_or(false));
        assert_eq!(ins.param("count").as_i64_or(0), 12);
        assert_eq!(ins.param("ratio").as_i64_or(0), 2);
        assert!((ins.param("ratio").as_f64_or(0.0) - 2.5).abs() < f64::EPSILON);
        assert_eq!(ins.param("pos").as_vec3_or([0.0; 3]), [1.0, 2.5, -3.0]);
        assert_eq!(ins.param("rot").as_vec3_or([0.0; 3]), [0.0, 90.0, 0.0]);
        assert_eq!(ins.param("scale").as_vec3_or([0.0; 3]), [2.0, 2.0, 2.0]);
        assert_eq!(ins.param("bad").as_vec3_or([7.0; 3]), [7.0; 3]);
        assert_eq!(ins.param("count").as_str_or(""), "12");
        assert_eq!(ins.param("ratio").as_str_or(""), "2.5");
    }

    #[test]
    fn serializes_envelope_shape() {
        let mut ins = Instruction::resolved("goto_space").with_param("spaceName", "Lobby");
        ins.request_id = Some(7);
        let json = serde_json::to_value(&ins).unwrap();
        assert_eq!(json["type"], "Instruction");
        assert_eq!(json["state"], "Resolved");
        assert_eq!(json["parameters"][0]["name"], "spaceName");
        assert_eq!(json["requestId"], 7);

        let back: Instruction = serde_json::from_value(json).unwrap();
        assert_eq!(back, ins);
    }

    #[test]
    fn non_object_is_rejected() {
        assert!(serde_json::from_value::<Instruction>(json!([1, 2])).is_err());
    }
}
