//! Turns the captures of a matched rule into instructions.

use serde_json::Value;

use super::rules::{unquote, RuleArgs};
use crate::instruction::{Instruction, InstructionState};
use crate::registry::params::ProjectParams;

/// Builds instructions from rule captures. `None` rejects the captures.
pub type Shape = fn(&RuleArgs) -> Option<Vec<Instruction>>;

/// Shaping step for a rule key. Keys without one are not translatable by
/// the rule table.
pub fn shaper(key: &str) -> Option<Shape> {
    let shape: Shape = match key {
        "connect" => |_| Some(vec![Instruction::local("connect")]),
        "disconnect" => |_| Some(vec![Instruction::local("disconnect")]),
        "create_project" => |args| project("create_project", args),
        "init_project" => |args| project("init_project", args),
        "open_project" => |args| project("open_project", args),
        "create_space" => |args| space("create_space", args),
        "goto_space" => |args| space("goto_space", args),
        "save_space" => |_| Some(vec![Instruction::resolved("save_space")]),
        "create_object" => create_object,
        "select_object" => |args| named("select_object", args),
        "delete_object" => |args| named("destroy_object", args),
        "set_value" => set_value,
        "set_position" => |args| vector("set_object_position", "position", args.get("position"), args),
        "set_rotation" => |args| vector("set_object_rotation", "rotation", args.get("eulerAngles"), args),
        "set_scale" => |args| vector("set_object_scale", "scale", args.get("scale"), args),
        "add_behavior" => add_component,
        "remove_behavior" => remove_component,
        "attach_to" => attach,
        "detach_from" => detach,
        _ => return None,
    };
    Some(shape)
}

/// `path` plus optional `name`. Without a name the last path segment is the
/// project and its parent the location.
fn project(action: &str, args: &RuleArgs) -> Option<Vec<Instruction>> {
    let path = args.get("path").trim();
    if path.is_empty() {
        return None;
    }
    let name = args.unquoted("name");
    let (path, project_name) = if name.is_empty() {
        split_project_path(path)?
    } else {
        (path.to_string(), name)
    };
    let params = ProjectParams {
        path,
        project_name,
    };
    Some(vec![params.to_instruction(action)])
}

fn split_project_path(path: &str) -> Option<(String, String)> {
    let trimmed = path.trim_end_matches(['\\', '/']);
    let cut = trimmed.rfind(['\\', '/'])?;
    let (parent, name) = trimmed.split_at(cut);
    let name = name.get(1..)?;
    if name.is_empty() {
        return None;
    }
    // `C:` on its own names the drive root.
    let parent = if parent.ends_with(':') {
        trimmed.get(..=cut)?
    } else {
        parent
    };
    Some((parent.to_string(), name.to_string()))
}

fn space(action: &str, args: &RuleArgs) -> Option<Vec<Instruction>> {
    Some(vec![
        Instruction::resolved(action).with_param("spaceName", args.unquoted("name"))
    ])
}

fn named(action: &str, args: &RuleArgs) -> Option<Vec<Instruction>> {
    let name = args.unquoted("name");
    if name.is_empty() {
        return None;
    }
    Some(vec![Instruction::resolved(action).with_param("name", name)])
}

/// Object creation needs asset resolution, so it leaves the rule table Raw
/// with the requested type as the lookup description.
fn create_object(args: &RuleArgs) -> Option<Vec<Instruction>> {
    let name = args.unquoted("name");
    let kind = args.get("type").trim().to_string();
    if name.is_empty() || kind.is_empty() {
        return None;
    }
    Some(vec![Instruction::new("create_object", InstructionState::Raw)
        .with_desc(kind.clone())
        .with_param("name", name)
        .with_param("primitiveType", kind)])
}

fn set_value(args: &RuleArgs) -> Option<Vec<Instruction>> {
    let name = args.unquoted("objName");
    let property = args.get("property").trim();
    if name.is_empty() || property.is_empty() {
        return None;
    }
    let script = args.get("script").trim();
    let property_path = if script.is_empty() {
        property.to_string()
    } else {
        format!("{script}.{property}")
    };
    Some(vec![Instruction::resolved("set_property_value")
        .with_param("name", name)
        .with_param("propertyPath", property_path)
        .with_param("value", parse_value(args.get("value")))])
}

fn vector(action: &str, param: &str, raw: &str, args: &RuleArgs) -> Option<Vec<Instruction>> {
    let name = args.unquoted("name");
    if name.is_empty() {
        return None;
    }
    let values = parse_vector(raw)?;
    if values.len() != 3 {
        return None;
    }
    Some(vec![Instruction::resolved(action)
        .with_param("name", name)
        .with_param(param, values)])
}

fn add_component(args: &RuleArgs) -> Option<Vec<Instruction>> {
    let object = args.unquoted("object");
    let component = args.get("name").trim().to_string();
    if object.is_empty() || component.is_empty() {
        return None;
    }
    Some(vec![Instruction::new("add_component", InstructionState::Raw)
        .with_desc(component.clone())
        .with_param("name", object)
        .with_param("componentType", component)])
}

fn remove_component(args: &RuleArgs) -> Option<Vec<Instruction>> {
    let object = args.unquoted("object");
    let component = args.get("name").trim().to_string();
    if object.is_empty() || component.is_empty() {
        return None;
    }
    Some(vec![Instruction::resolved("remove_component")
        .with_param("name", object)
        .with_param("componentType", component)])
}

fn attach(args: &RuleArgs) -> Option<Vec<Instruction>> {
    let child = args.unquoted("source");
    let parent = args.unquoted("target");
    if child.is_empty() || parent.is_empty() {
        return None;
    }
    Some(vec![Instruction::resolved("attach_object_to")
        .with_param("childName", child)
        .with_param("parentName", parent)])
}

fn detach(args: &RuleArgs) -> Option<Vec<Instruction>> {
    let child = args.unquoted("source");
    if child.is_empty() {
        return None;
    }
    Some(vec![
        Instruction::resolved("detach_object_from").with_param("childName", child)
    ])
}

/// `(1, 2.5, -3)` or `1,2.5,-3` into numbers.
fn parse_vector(raw: &str) -> Option<Vec<f64>> {
    let inner = raw.trim().trim_start_matches('(').trim_end_matches(')');
    inner
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect()
}

/// Quoted text stays a string; vectors, numbers and booleans are typed.
fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    let unquoted = unquote(raw);
    if unquoted.len() != raw.len() {
        return Value::from(unquoted);
    }
    if raw.starts_with('(') {
        if let Some(values) = parse_vector(raw) {
            return Value::from(values);
        }
    }
    if let Ok(number) = raw.parse::<i64>() {
        return Value::from(number);
    }
    if let Ok(number) = raw.parse::<f64>() {
        return Value::from(number);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::from(raw),
    }
}
