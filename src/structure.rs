// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structural rules of the blueprint format.
//!
//! These checks look at the shape of the document tree: required keys,
//! section types, selectors, triggers, conditions and actions. Template
//! contents are left to the analyzer passes run by the engine.

mod automation;
mod inputs;

pub use automation::{check_actions, check_conditions, check_triggers, join_variables};
pub use inputs::{check_hysteresis, check_input_references, collect_inputs, InputKind, Inputs};

use crate::diagnostics::{Category, Diagnostics};
use crate::value::Value;

use lazy_static::lazy_static;
use regex::Regex;

const REQUIRED_BLUEPRINT_KEYS: &[&str] = &["name", "description", "domain", "input"];
const VALID_DOMAINS: &[&str] = &["automation", "script"];
const VALID_MODES: &[&str] = &["single", "restart", "queued", "parallel"];

/// Root sections that accept a singular and a plural key.
pub const TRIGGERS: (&str, &str) = ("trigger", "triggers");
pub const CONDITIONS: (&str, &str) = ("condition", "conditions");
pub const ACTIONS: (&str, &str) = ("action", "actions");

lazy_static! {
    static ref NAME_VERSION: Regex =
        Regex::new(r"v?(\d+\.\d+(?:\.\d+)?)\s*$").expect("invalid pattern");
}

/// The key under which a section is present along with its value.
pub(crate) fn section<'v>(root: &'v Value, names: (&'static str, &'static str)) -> Option<(&'static str, &'v Value)> {
    [names.0, names.1]
        .into_iter()
        .find(|k| root.has_key(k))
        .map(|k| (k, &root[k]))
}

fn one_of(values: &[&str]) -> String {
    format!("[{}]", values.join(", "))
}

fn check_root(root: &Value, sink: &mut Diagnostics) {
    for names in [("blueprint", "blueprint"), TRIGGERS, ACTIONS] {
        if section(root, names).is_none() {
            sink.error(
                Category::Schema,
                "",
                format!("Missing required root key: '{}'", names.0),
            );
        }
    }

    if root["blueprint"].has_key("variables") {
        sink.error(
            Category::Schema,
            "",
            "'variables' must be at root level, not nested under 'blueprint'",
        );
    }
}

fn check_blueprint(root: &Value, sink: &mut Diagnostics) {
    let blueprint = &root["blueprint"];
    if blueprint.is_undefined() || blueprint.is_null() {
        return;
    }
    if blueprint.as_object().is_err() {
        sink.error(Category::Schema, "", "'blueprint' must be a dictionary");
        return;
    }

    for key in REQUIRED_BLUEPRINT_KEYS {
        if !blueprint.has_key(key) {
            sink.error(
                Category::Schema,
                "",
                format!("Missing required blueprint key: '{key}'"),
            );
        }
    }

    match &blueprint["domain"] {
        Value::Undefined | Value::Null => (),
        Value::String(d) if VALID_DOMAINS.contains(&d.as_ref()) => (),
        other => sink.error(
            Category::Schema,
            "blueprint.domain",
            format!(
                "Invalid domain '{}', must be one of: {}",
                display_scalar(other),
                one_of(VALID_DOMAINS)
            ),
        ),
    }
}

fn check_mode(root: &Value, sink: &mut Diagnostics) {
    let mode = match &root["mode"] {
        Value::Undefined | Value::Null => return,
        Value::String(m) => m.as_ref(),
        // `mode: !input run_mode` is resolved at import time.
        Value::Input(_) => return,
        _ => {
            sink.error(Category::Schema, "", "'mode' must be a string");
            return;
        }
    };

    if !VALID_MODES.contains(&mode) {
        sink.error(
            Category::Schema,
            "",
            format!("Invalid mode '{mode}', must be one of: {}", one_of(VALID_MODES)),
        );
    }

    if mode == "queued" || mode == "parallel" {
        let ok = match &root["max"] {
            Value::Undefined | Value::Null | Value::Input(_) => true,
            Value::Number(n) => n.as_i64().is_some_and(|m| m >= 1),
            _ => false,
        };
        if !ok {
            sink.error(
                Category::Schema,
                "",
                format!("'max' must be a positive integer when mode is '{mode}'"),
            );
        }
    }
}

fn check_variables(root: &Value, sink: &mut Diagnostics) {
    let variables = &root["variables"];
    if variables.is_undefined() || variables.is_null() {
        sink.warning(Category::Schema, "", "No variables section defined");
        return;
    }
    if variables.as_object().is_err() {
        sink.error(Category::Schema, "", "'variables' must be a dictionary");
        return;
    }
    if !variables.has_key("blueprint_version") {
        sink.warning(Category::Schema, "", "No 'blueprint_version' variable defined");
    }
}

// Scalars print without JSON quoting in messages.
fn display_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// `blueprint_version` must agree with the version suffix of the name.
fn check_version(root: &Value, sink: &mut Diagnostics) {
    let Ok(name) = root["blueprint"]["name"].as_string() else {
        return;
    };
    let version = &root["variables"]["blueprint_version"];
    if version.is_undefined() || version.is_null() {
        return;
    }
    let version = display_scalar(version);
    let version = version.trim_matches(|c: char| c == '"' || c == '\'');

    match NAME_VERSION.captures(name) {
        Some(caps) => {
            let in_name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if in_name != version {
                sink.error(
                    Category::Schema,
                    "variables.blueprint_version",
                    format!(
                        "Version mismatch: blueprint name has 'v{in_name}' but \
                         blueprint_version is '{version}'"
                    ),
                );
            }
        }
        None => sink.warning(
            Category::Schema,
            "blueprint.name",
            format!(
                "Could not extract version from blueprint name: '{name}'. Expected format: \
                 'Blueprint Name vX.Y.Z'"
            ),
        ),
    }
}

/// Run every structural rule and return the inputs the document defines.
pub fn check_structure(root: &Value, sink: &mut Diagnostics) -> Inputs {
    check_root(root, sink);
    check_blueprint(root, sink);
    check_mode(root, sink);

    let inputs = collect_inputs(root, sink);
    check_hysteresis(&inputs, sink);

    check_variables(root, sink);
    check_version(root, sink);

    check_triggers(root, sink);
    check_conditions(root, sink);
    check_actions(root, &join_variables(root), sink);
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(yaml: &str) -> Vec<String> {
        let root = Value::from_yaml_str(yaml).unwrap();
        let mut sink = Diagnostics::new();
        check_structure(&root, &mut sink);
        sink.iter().map(|d| d.to_string()).collect()
    }

    const MINIMAL: &str = r#"
blueprint:
  name: Demo v1.2.0
  description: demo
  domain: automation
  input:
    door:
      selector:
        entity: {}
variables:
  blueprint_version: "1.2.0"
  door: !input door
trigger:
  - platform: state
    entity_id: !input door
action:
  - service: light.turn_on
    target:
      entity_id: light.hall
"#;

    #[test]
    fn minimal_document_is_clean() {
        assert!(run(MINIMAL).is_empty(), "{:?}", run(MINIMAL));
    }

    #[test]
    fn missing_root_keys() {
        let msgs = run("blueprint:\n  name: x\n");
        assert!(msgs.contains(&"Missing required root key: 'trigger'".to_string()));
        assert!(msgs.contains(&"Missing required root key: 'action'".to_string()));
        assert!(msgs.contains(&"Missing required blueprint key: 'domain'".to_string()));
        assert!(msgs.contains(&"No variables section defined".to_string()));
    }

    #[test]
    fn plural_sections_accepted() {
        let doc = MINIMAL.replace("trigger:", "triggers:").replace("action:", "actions:");
        assert!(run(&doc).is_empty());
    }

    #[test]
    fn domain_and_mode() {
        let doc = format!("{MINIMAL}mode: queued\nmax: 0\n").replace("domain: automation", "domain: scene");
        let msgs = run(&doc);
        assert!(msgs.iter().any(|m| m.contains("Invalid domain 'scene', must be one of: [automation, script]")));
        assert!(msgs.iter().any(|m| m == "'max' must be a positive integer when mode is 'queued'"));
    }

    #[test]
    fn version_sync() {
        let msgs = run(&MINIMAL.replace("\"1.2.0\"", "\"1.3.0\""));
        assert_eq!(
            msgs,
            vec!["variables.blueprint_version: Version mismatch: blueprint name has 'v1.2.0' but blueprint_version is '1.3.0'"]
        );

        let msgs = run(&MINIMAL.replace("Demo v1.2.0", "Demo"));
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].starts_with("blueprint.name: Could not extract version"));
    }

    #[test]
    fn nested_variables() {
        let msgs = run(&MINIMAL.replace("  domain: automation\n", "  domain: automation\n  variables: {}\n"));
        assert_eq!(msgs, vec!["'variables' must be at root level, not nested under 'blueprint'"]);
    }
}
