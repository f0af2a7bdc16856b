//! Typed parameter shapes for the catalog actions.
//!
//! The same structs describe the parameters to the model (via their JSON
//! schema) and are read back out of an instruction's name/value list by the
//! executors that consume them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::instruction::Instruction;

// ── Project ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectParams {
    /// Directory that contains (or will contain) the project folder.
    pub path: String,
    pub project_name: String,
}

impl ProjectParams {
    pub fn from_instruction(instruction: &Instruction) -> Self {
        Self {
            path: instruction.param("path").as_str_or("").trim().to_string(),
            project_name: instruction
                .param("projectName")
                .as_str_or("")
                .trim()
                .to_string(),
        }
    }

    pub fn to_instruction(&self, action: &str) -> Instruction {
        Instruction::local(action)
            .with_param("path", self.path.clone())
            .with_param("projectName", self.project_name.clone())
    }
}

// ── Space ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SpaceParams {
    pub space_name: String,
}

impl SpaceParams {
    pub fn from_instruction(instruction: &Instruction) -> Self {
        Self {
            space_name: instruction
                .param("spaceName")
                .as_str_or("")
                .trim()
                .to_string(),
        }
    }
}

// ── Objects ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateObjectParams {
    pub name: String,
    #[serde(default)]
    pub primitive_type: Option<String>,
    #[serde(default)]
    pub position: Option<[f64; 3]>,
    #[serde(default)]
    pub rotation: Option<[f64; 3]>,
    #[serde(default)]
    pub scale: Option<[f64; 3]>,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectNameParams {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectPositionParams {
    pub name: String,
    pub position: [f64; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectRotationParams {
    pub name: String,
    pub rotation: [f64; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectScaleParams {
    pub name: String,
    pub scale: [f64; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValueParams {
    pub name: String,
    /// Dotted path of the property, optionally prefixed by a component type.
    pub property_path: String,
    pub value: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachParams {
    pub child_name: String,
    pub parent_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetachParams {
    pub child_name: String,
}

// ── Components ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddComponentParams {
    pub name: String,
    pub component_type: String,
    #[serde(default)]
    pub properties: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveComponentParams {
    pub name: String,
    pub component_type: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn project_params_read_case_insensitively() {
        let ins = Instruction::local("open_project")
            .with_param("PATH", " C:\\Games ")
            .with_param("projectname", "Maze");
        let params = ProjectParams::from_instruction(&ins);
        assert_eq!(params.path, "C:\\Games");
        assert_eq!(params.project_name, "Maze");

        let back = params.to_instruction("init_project");
        assert_eq!(back.action, "init_project");
        assert_eq!(back.param("projectName").as_str_or(""), "Maze");
    }

    #[test]
    fn missing_space_name_is_empty() {
        let params = SpaceParams::from_instruction(&Instruction::resolved("goto_space"));
        assert!(params.space_name.is_empty());
    }

    #[test]
    fn schemas_use_wire_names() {
        let schema = serde_json::to_value(schemars::schema_for!(AttachParams)).unwrap();
        let props = schema["properties"].as_object().unwrap();
        assert!(props.contains_key("childName"));
        assert!(props.contains_key("parentName"));
    }
}
