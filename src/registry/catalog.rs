#![allow(clippy::needless_pass_by_value)]

use schemars::schema_for;
use serde::Serialize;
use serde_json::Value;

use super::params::{
    AddComponentParams, AttachParams, CreateObjectParams, DetachParams, ObjectNameParams,
    ObjectPositionParams, ObjectRotationParams, ObjectScaleParams, ProjectParams,
    PropertyValueParams, RemoveComponentParams, SpaceParams,
};
use crate::instruction::InstructionState;

/// Action a model may emit when it cannot map a request.
pub const UNKNOWN_ACTION: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionCategory {
    Project,
    Connection,
    Space,
    Objects,
    Components,
}

impl ActionCategory {
    pub fn title(self) -> &'static str {
        match self {
            ActionCategory::Project => "Project",
            ActionCategory::Connection => "Connection",
            ActionCategory::Space => "Space (scene/level)",
            ActionCategory::Objects => "Objects",
            ActionCategory::Components => "Components",
        }
    }

    pub fn all() -> &'static [ActionCategory] {
        &[
            ActionCategory::Project,
            ActionCategory::Connection,
            ActionCategory::Space,
            ActionCategory::Objects,
            ActionCategory::Components,
        ]
    }
}

/// One allowed action: the state a translator should give it, a short
/// parameter summary for prompts and the JSON schema of its parameters.
#[derive(Debug, Clone, Serialize)]
pub struct ActionEntry {
    pub name: &'static str,
    pub category: ActionCategory,
    pub state: InstructionState,
    pub params: &'static str,
    pub param_schema: Value,
}

pub(super) fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub(super) fn schema_value<T: schemars::JsonSchema>() -> Value {
    let root = schema_for!(T);
    serde_json::to_value(root).unwrap_or(empty_object_schema())
}

fn entry(
    name: &'static str,
    category: ActionCategory,
    state: InstructionState,
    params: &'static str,
    param_schema: Value,
) -> ActionEntry {
    ActionEntry {
        name,
        category,
        state,
        params,
        param_schema,
    }
}

/// Every action a translator may produce, in prompt order.
pub fn action_catalog() -> Vec<ActionEntry> {
    use ActionCategory::{Components, Connection, Objects, Project, Space};
    use InstructionState::{Local, Raw, Resolved};

    vec![
        entry("create_project", Project, Local, "path, projectName", schema_value::<ProjectParams>()),
        entry("init_project", Project, Local, "path, projectName", schema_value::<ProjectParams>()),
        entry("open_project", Project, Local, "path, projectName", schema_value::<ProjectParams>()),
        entry("connect", Connection, Local, "", empty_object_schema()),
        entry("disconnect", Connection, Local, "", empty_object_schema()),
        entry("create_space", Space, Resolved, "spaceName", schema_value::<SpaceParams>()),
        entry("goto_space", Space, Resolved, "spaceName", schema_value::<SpaceParams>()),
        entry("save_space", Space, Resolved, "spaceName", schema_value::<SpaceParams>()),
        entry(
            "create_object",
            Objects,
            Raw,
            "name, primitiveType?, position?, rotation?, scale?, parent?",
            schema_value::<CreateObjectParams>(),
        ),
        entry("set_object_position", Objects, Resolved, "name, position", schema_value::<ObjectPositionParams>()),
        entry("set_object_rotation", Objects, Resolved, "name, rotation", schema_value::<ObjectRotationParams>()),
        entry("set_object_scale", Objects, Resolved, "name, scale", schema_value::<ObjectScaleParams>()),
        entry("destroy_object", Objects, Resolved, "name", schema_value::<ObjectNameParams>()),
        entry("select_object", Objects, Resolved, "name", schema_value::<ObjectNameParams>()),
        entry(
            "set_property_value",
            Objects,
            Resolved,
            "name, propertyPath, value",
            schema_value::<PropertyValueParams>(),
        ),
        entry("attach_object_to", Objects, Resolved, "childName, parentName", schema_value::<AttachParams>()),
        entry("detach_object_from", Objects, Resolved, "childName", schema_value::<DetachParams>()),
        entry(
            "add_component",
            Components,
            Raw,
            "name, componentType, properties?",
            schema_value::<AddComponentParams>(),
        ),
        entry(
            "remove_component",
            Components,
            Resolved,
            "name, componentType",
            schema_value::<RemoveComponentParams>(),
        ),
    ]
}

/// Case-insensitive membership in the catalog.
pub fn is_allowed(action: &str) -> bool {
    let action = action.trim();
    action_catalog()
        .iter()
        .any(|e| e.name.eq_ignore_ascii_case(action))
}

pub fn find(action: &str) -> Option<ActionEntry> {
    let action = action.trim();
    action_catalog()
        .into_iter()
        .find(|e| e.name.eq_ignore_ascii_case(action))
}

/// Compact action list for the model's system prompt.
pub fn prompt_spec() -> String {
    let catalog = action_catalog();
    let mut lines = vec!["Allowed actions (choose only from this list):".to_string()];
    for category in ActionCategory::all() {
        lines.push(format!("{}:", category.title()));
        for e in catalog.iter().filter(|e| e.category == *category) {
            if e.params.is_empty() {
                lines.push(format!("- {}(state: {:?})", e.name, e.state));
            } else {
                lines.push(format!(
                    "- {}(state: {:?}, params: {{ {} }})",
                    e.name, e.state, e.params
                ));
            }
        }
        lines.push(String::new());
    }
    lines.join("\n").trim_end().to_string()
}

/// Catalog as JSON (for `intent-relay actions --json`).
pub fn to_json_schema() -> Value {
    Value::Array(
        action_catalog()
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "category": e.category,
                    "state": e.state,
                    "inputSchema": e.param_schema,
                })
            })
            .collect(),
    )
}
