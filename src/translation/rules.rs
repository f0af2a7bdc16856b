//! Rule table translator.
//!
//! Each rule is an anchored, case-insensitive pattern paired with a rule
//! key. Rules are tried in table order and the first match wins; rules
//! overlap, so the order is part of the behavior. A match whose key has no
//! shaping step (see [`super::shaping`]) fails the translator outright.

use async_trait::async_trait;
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};

use super::shaping;
use super::Translator;
use crate::error::AppError;
use crate::instruction::Instruction;

const RULES: &[(&str, &str)] = &[
    (
        r"^create\s+project\s+(?P<path>[A-Za-z]:\\[^\s]+|\\\\[^\s]+)(?:\s+(?P<name>[^\s]+))?$",
        "create_project",
    ),
    (
        r"^(init|initialize)\s+project\s+(?P<path>[A-Za-z]:\\[^\s]+|\\\\[^\s]+)(?:\s+(?P<name>[^\s]+))?$",
        "init_project",
    ),
    (
        r"^open\s+project\s+(?P<path>[A-Za-z]:\\[^\s]+|\\\\[^\s]+)(?:\s+(?P<name>[^\s]+))?$",
        "open_project",
    ),
    (r"^connect$", "connect"),
    (r"^disconnect$", "disconnect"),
    (r"^create\s+space\s+(?P<name>[^\s]+)$", "create_space"),
    (r"^(goto|enter|open)\s+space\s+(?P<name>[^\s]+)$", "goto_space"),
    (r"^save space$", "save_space"),
    (
        r"^generate\s+(?:game\s+)?(?:from\s+)?(?P<path>[a-zA-Z]:[\\/][^\s]+(?:[\\/][^\s]+)*)?(?:\.)?$",
        "generate_game",
    ),
    (
        r#"^(?:\w+\s+)?(create|add)\s+(?:a\s+|an\s+)?(?P<type>[\w\s\-]+?)\s+(?:called|named|with\s+the\s+name)\s+(?P<name>"[^"]+"|[\w\s\-]+)(?:\.)?$"#,
        "create_object",
    ),
    (
        r#"^(?:\w+\s+)?(select)(?:\s+(?:object))?\s+(?P<name>"[^"]+"|'[^']+'|[\w\-\s]+?)(?:\.)?$"#,
        "select_object",
    ),
    (
        r#"^(?:\w+\s+)?(delete)(?:\s+(?:object))?\s+(?P<name>"[^"]+"|'[^']+'|[\w\-\s]+?)(?:\.)?$"#,
        "delete_object",
    ),
    (
        r#"^(?:place|put)\s+(?P<objectName>"[^"]+"|'[^']+'|[\w\-\s]+?)\s+(?:at|on)\s+(?P<spawnpointNames>(?:\s*("[^"]+"|'[^']+'|[\w\-]+)\s*,?)+)\s*(?:spawn\s+point)?(?:\.)?$"#,
        "place_at_spawnpoint",
    ),
    (
        r#"^set\s+(?P<objName>"[^"]+"|'[^']+'|[\w\-\s]+?)(?:\s+(property|attribute))\s+(?P<property>\w+)\s+(to|to be)\s+(?P<value>("[^"]+"|'[^']+'|[\w\.\-/]+|\(\s*-?\d+(?:\.\d+)?(?:\s*,\s*-?\d+(?:\.\d+)?)*\s*\)))(?:\s+for\s+(?P<script>\w+))?\s*$"#,
        "set_value",
    ),
    (
        r#"^(?:\w+\s+)?set(?:\s+object)?\s+(?P<name>"[^"]+"|'[^']+'|[\w\-\s]+?)\s+(position|location)\s+(?:at\s+)?(?P<position>\(?\s*-?\d+(?:\.\d+)?\s*,\s*-?\d+(?:\.\d+)?\s*,\s*-?\d+(?:\.\d+)?\s*\)?)\.?\s*$"#,
        "set_position",
    ),
    (
        r#"^(?:\w+\s+)?set(?:\s+object)?\s+(?P<name>"[^"]+"|'[^']+'|[\w\-\s]+?)\s+rotation\s+(?P<eulerAngles>\(?\s*-?\d+(?:\.\d+)?\s*,\s*-?\d+(?:\.\d+)?\s*,\s*-?\d+(?:\.\d+)?\s*\)?)\.?\s*$"#,
        "set_rotation",
    ),
    (
        r#"^(?:\w+\s+)?set(?:\s+object)?\s+(?P<name>"[^"]+"|'[^']+'|[\w\-\s]+?)\s+scale\s+((to|to be)\s+)?(?P<scale>\(?\s*\d+(?:\.\d+)?\s*,\s*\d+(?:\.\d+)?\s*,\s*\d+(?:\.\d+)?\s*\)?)\.?\s*$"#,
        "set_scale",
    ),
    (
        r#"^spin(?:\s+(?P<name>"[^"]+"|'[^']+'|[\w\-\s]+?))?(?:\s+(?P<speed>[+-]?\d+(?:\.\d+)?))?$"#,
        "spin_object",
    ),
    (
        r#"^add\s+script\s+(?P<filepath>[a-zA-Z]:[\\/][^\s]+(?:[\\/][^\s]+)*)?(?:\s+to\s+(?P<object>"[^"]+"|'[^']+'|[\w\-\s]+))?\s*$"#,
        "add_script",
    ),
    (
        r#"^(add|modify)\s+(behavior|behaviour|component)\s+(?P<name>[^\s]+)\s+to\s+(?P<object>"[^"]+"|'[^']+'|[\w\- ]+)\s*$"#,
        "add_behavior",
    ),
    (
        r#"^remove\s+(behavior|behaviour|script)\s+(?P<name>[^\s]+)\s+from\s+(?P<object>"[^"]+"|'[^']+'|[\w\- ]+)\s*$"#,
        "remove_behavior",
    ),
    (
        r#"^(print|display|write)\s+(?P<text>("[^"]+")|('[^']+')|([\w\-_]+(?:\s+[\w\-_]+)*))\s+at\s+(?P<position>center|top[-\s]?(left|mid|right)|bottom[-\s]?(left|mid|right)|\(\s*-?\d+(?:\.\d+)?\s*,\s*-?\d+(?:\.\d+)?\s*\))\s*$"#,
        "print_text",
    ),
    (
        r"^font\s+(?P<attrib>\w+)\s+(?P<value>-?\d+(?:\.\d+)?|#[0-9a-fA-F]{3,6}|\w+)\s*$",
        "set_font",
    ),
    (
        r"^build\s+(?P<shape>circle|square|rectangle)\s+(?P<structure>wall)\s+with\s+(?P<element>\w+)\s*(?:named|with the name\s+)?(?P<name>.+?)(?:\.)?$",
        "build_structure",
    ),
    (
        r#"^attach\s+(?P<source>"[^"]+"|'[^']+'|[\w\-\s]+?)\s+to\s+(?P<target>"[^"]+"|'[^']+'|[\w\-\s]+?)\s*$"#,
        "attach_to",
    ),
    (
        r#"^detach\s+(?P<source>"[^"]+"|'[^']+'|[\w\-\s]+?)\s+from\s+(?P<target>"[^"]+"|'[^']+'|[\w\-\s]+?)\s*$"#,
        "detach_from",
    ),
    (
        r#"^(make|create)\s+prefab\s+from\s+(?P<name>"[^"]+"|'[^']+'|[\w\-\s]+?)\s*$"#,
        "make_prefab",
    ),
];

/// Named captures of a matched rule. Groups that did not take part in the
/// match read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleArgs(IndexMap<String, String>);

impl RuleArgs {
    pub fn get(&self, name: &str) -> &str {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map_or("", |(_, value)| value.as_str())
    }

    /// Capture with surrounding quotes and whitespace removed.
    pub fn unquoted(&self, name: &str) -> String {
        unquote(self.get(name)).to_string()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }
}

impl<const N: usize> From<[(&str, &str); N]> for RuleArgs {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

pub fn unquote(text: &str) -> &str {
    let text = text.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.trim();
        }
    }
    text
}

struct Rule {
    key: &'static str,
    pattern: Regex,
}

pub struct RuleTranslator {
    rules: Vec<Rule>,
}

impl RuleTranslator {
    pub fn new() -> Result<Self, AppError> {
        let rules = RULES
            .iter()
            .map(|&(pattern, key)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|pattern| Rule { key, pattern })
                    .map_err(|e| AppError::Settings {
                        message: format!("rule '{key}' does not compile: {e}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Key and captures of the first matching rule.
    pub fn match_rule(&self, text: &str) -> Option<(&'static str, RuleArgs)> {
        let text = text.trim();
        self.rules.iter().find_map(|rule| {
            let captures = rule.pattern.captures(text)?;
            let mut args = RuleArgs::default();
            for name in rule.pattern.capture_names().flatten() {
                if let Some(m) = captures.name(name) {
                    args.insert(name, m.as_str());
                }
            }
            Some((rule.key, args))
        })
    }
}

#[async_trait]
impl Translator for RuleTranslator {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn translate(&self, text: &str) -> Result<Vec<Instruction>, AppError> {
        let Some((key, args)) = self.match_rule(text) else {
            return Err(AppError::Validation {
                message: "No rule matches the request.".to_string(),
            });
        };
        let Some(shape) = shaping::shaper(key) else {
            return Err(AppError::Validation {
                message: format!("Rule '{key}' has no instruction shape."),
            });
        };
        shape(&args).ok_or_else(|| AppError::Validation {
            message: format!("Rule '{key}' matched but its arguments are unusable."),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::instruction::InstructionState;

    fn rules() -> RuleTranslator {
        RuleTranslator::new().unwrap()
    }

    #[test]
    fn every_rule_compiles() {
        assert_eq!(rules().rules.len(), RULES.len());
    }

    #[tokio::test]
    async fn connect_is_a_bare_local_instruction() {
        let out = rules().translate("connect").await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action, "connect");
        assert_eq!(out[0].state, InstructionState::Local);
        assert!(out[0].parameters.is_empty());

        let out = rules().translate("  DISCONNECT ").await.unwrap();
        assert_eq!(out[0].action, "disconnect");
    }

    #[test]
    fn first_matching_rule_wins() {
        let rules = rules();
        assert_eq!(rules.match_rule("open space Lobby").unwrap().0, "goto_space");
        // "create a cube named Box" must not reach the later rules.
        let (key, args) = rules.match_rule("create a cube named Box").unwrap();
        assert_eq!(key, "create_object");
        assert_eq!(args.get("type"), "cube");
        assert_eq!(args.get("name"), "Box");
        assert!(rules.match_rule("hello there").is_none());
    }

    #[test]
    fn unmatched_optional_groups_read_empty() {
        let (key, args) = rules().match_rule(r"open project C:\Games\Shooter").unwrap();
        assert_eq!(key, "open_project");
        assert_eq!(args.get("path"), r"C:\Games\Shooter");
        assert_eq!(args.get("name"), "");
    }

    #[tokio::test]
    async fn rule_without_shape_fails_translation() {
        let err = rules().translate("spin Cube 30").await.unwrap_err();
        assert!(err.to_string().contains("spin_object"));
        let err = rules().translate("tell me a joke").await.unwrap_err();
        assert!(err.to_string().contains("No rule matches"));
    }

    #[test]
    fn quotes_are_stripped() {
        assert_eq!(unquote("\"Big Box\""), "Big Box");
        assert_eq!(unquote(" 'crate' "), "crate");
        assert_eq!(unquote("plain"), "plain");
        assert_eq!(unquote("\"open"), "\"open");
    }
}
