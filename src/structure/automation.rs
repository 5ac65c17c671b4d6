// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Triggers, conditions and actions.

use super::{section, ACTIONS, CONDITIONS, TRIGGERS};
use crate::diagnostics::{Category, Diagnostics};
use crate::lexer::{is_templated, scan, RegionKind};
use crate::scheduler::check_concatenation;
use crate::value::Value;

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

const CONDITION_TYPES: &[&str] = &[
    "and",
    "or",
    "not",
    "state",
    "numeric_state",
    "template",
    "time",
    "zone",
    "trigger",
    "sun",
    "device",
];

const DELAY_KEYS: &[&str] = &["days", "hours", "milliseconds", "minutes", "seconds"];

lazy_static! {
    static ref ENTITY_ID: Regex = Regex::new(r"^[a-z_][a-z0-9_]*\.[a-z0-9_]+$").expect("invalid pattern");
    static ref SERVICE: Regex =
        Regex::new(r"^[a-z_][a-z0-9_]*\.[a-z_][a-z0-9_]*$").expect("invalid pattern");
    static ref DELAY: Regex = Regex::new(r"^\d{1,2}:\d{2}(:\d{2})?$").expect("invalid pattern");
    static ref JOIN_WORD: Regex = Regex::new(r"\bjoin\b").expect("invalid pattern");
    static ref JOIN_BUILT: Regex = Regex::new(r"\|\s*join\b|\bjoin\s*\(").expect("invalid pattern");
}

// Both delimiters of an expression are present.
fn has_template(s: &str) -> bool {
    s.contains("{{") && s.contains("}}")
}

fn is_absent(v: &Value) -> bool {
    matches!(v, Value::Undefined | Value::Null)
}

/// Root variables whose template builds a string with `join`.
pub fn join_variables(root: &Value) -> BTreeSet<String> {
    let Ok(variables) = root["variables"].as_object() else {
        return BTreeSet::new();
    };
    variables
        .iter()
        .filter(|(_, v)| v.as_string().is_ok_and(|s| JOIN_BUILT.is_match(s)))
        .map(|(n, _)| n.to_string())
        .collect()
}

fn has_trigger_type(trigger: &Value) -> bool {
    trigger.has_key("platform") || trigger.has_key("trigger")
}

fn check_trigger_entity_id(value: &Value, path: &str, variables: &BTreeSet<&str>, sink: &mut Diagnostics) {
    let text = match value {
        Value::Array(items) => {
            for (idx, item) in items.iter().enumerate() {
                check_trigger_entity_id(item, &format!("{path}[{idx}]"), variables, sink);
            }
            return;
        }
        Value::String(s) => s.trim(),
        _ => return,
    };

    if text.is_empty() {
        sink.error(Category::Triggers, path, "entity_id cannot be empty");
    } else if text.contains("{{") || text.contains("}}") {
        sink.error(
            Category::Triggers,
            path,
            "entity_id cannot use templates; provide a concrete entity reference or !input \
             value. Trigger entity_id must be resolvable at automation load time.",
        );
    } else if !text.contains('.') && variables.contains(text) {
        sink.error(
            Category::Triggers,
            path,
            format!(
                "'{text}' appears to be a variable reference. Trigger entity_id cannot reference \
                 automation variables. Use !input or a static entity ID instead. Variables are \
                 not available until the automation runs, but trigger entity_id must be known at \
                 load time."
            ),
        );
    } else if !text.contains('.') {
        sink.error(
            Category::Triggers,
            path,
            format!(
                "'{text}' is not a valid entity ID format. Entity IDs must be \
                 'domain.entity_name' (e.g., sensor.temperature). For dynamic entity selection, \
                 use !input with an entity selector."
            ),
        );
    } else if !ENTITY_ID.is_match(text) {
        sink.warning(
            Category::Triggers,
            path,
            format!(
                "Entity ID '{text}' should be in format 'domain.entity_name' (lowercase letters, \
                 numbers, underscores only)"
            ),
        );
    }
}

// Template triggers are rendered before the variables section exists.
fn check_template_trigger(template: &str, variables: &BTreeSet<&str>, path: &str, sink: &mut Diagnostics) {
    let mut reported = BTreeSet::new();
    for region in scan(template).filter(|r| r.kind == RegionKind::Expression) {
        let tokens = region.tokens();
        let Some(first) = tokens.first() else {
            continue;
        };
        if variables.contains(first.text) && reported.insert(first.text) {
            sink.error(
                Category::Triggers,
                path,
                format!(
                    "Template trigger references automation variable '{}'. Template triggers \
                     cannot access automation variables - use state triggers instead.",
                    first.text
                ),
            );
        }
    }
}

fn check_for_duration(trigger: &Value, path: &str, sink: &mut Diagnostics) {
    const MESSAGE: &str = "Templates in trigger 'for:' duration are not supported. Variables \
                           aren't available at trigger compile time. Use !input or a static \
                           value instead.";
    match &trigger["for"] {
        Value::String(s) if has_template(s) => {
            sink.error(Category::Triggers, format!("{path}.for"), MESSAGE)
        }
        Value::Object(parts) => {
            for (key, value) in parts.iter() {
                if value.as_string().is_ok_and(|s| has_template(s)) {
                    sink.error(Category::Triggers, format!("{path}.for.{key}"), MESSAGE);
                }
            }
        }
        _ => (),
    }
}

pub fn check_triggers(root: &Value, sink: &mut Diagnostics) {
    let Some((key, triggers)) = section(root, TRIGGERS) else {
        return;
    };
    if is_absent(triggers) || matches!(triggers, Value::Input(_)) {
        return;
    }
    let Ok(triggers) = triggers.as_array() else {
        sink.error(Category::Triggers, "", format!("'{key}' must be a list"));
        return;
    };

    let variables: BTreeSet<&str> = root["variables"]
        .as_object()
        .map(|m| m.keys().map(|k| k.as_ref()).collect())
        .unwrap_or_default();

    for (i, trigger) in triggers.iter().enumerate() {
        let path = format!("{key}[{i}]");
        if trigger.as_object().is_err() {
            sink.error(Category::Triggers, path, "Must be a dictionary");
            continue;
        }
        if !has_trigger_type(trigger) {
            sink.error(Category::Triggers, path.as_str(), "Missing 'platform' or 'trigger' key");
        }

        check_trigger_entity_id(&trigger["entity_id"], &format!("{path}.entity_id"), &variables, sink);

        let is_template = [&trigger["platform"], &trigger["trigger"]]
            .iter()
            .any(|t| t.as_string().is_ok_and(|t| t.as_ref() == "template"));
        if is_template {
            if let Ok(template) = trigger["value_template"].as_string() {
                check_template_trigger(template, &variables, &path, sink);
            }
        }

        check_for_duration(trigger, &path, sink);
    }
}

/// Validate one condition, descending into `and`/`or`/`not`.
pub(crate) fn check_condition(condition: &Value, path: &str, sink: &mut Diagnostics) {
    match condition {
        // Shorthand template conditions.
        Value::String(s) if is_templated(s) => return,
        Value::Input(_) => return,
        Value::Object(_) => (),
        _ => {
            sink.error(Category::Conditions, path, "Condition must be a dictionary");
            return;
        }
    }

    let nested = &condition["conditions"];
    let kind = match &condition["condition"] {
        Value::Undefined | Value::Null => {
            if let Ok(nested) = nested.as_array() {
                for (j, c) in nested.iter().enumerate() {
                    check_condition(c, &format!("{path}.conditions[{j}]"), sink);
                }
            }
            return;
        }
        Value::String(kind) => kind.as_ref(),
        _ => {
            sink.error(Category::Conditions, format!("{path}.condition"), "Must be a string");
            return;
        }
    };

    if !CONDITION_TYPES.contains(&kind) {
        sink.warning(
            Category::Conditions,
            path,
            format!("Unknown condition type '{kind}'"),
        );
    }

    if matches!(kind, "and" | "or" | "not") {
        match nested {
            Value::Undefined | Value::Null => sink.error(
                Category::Conditions,
                path,
                format!("'{kind}' condition requires 'conditions' key"),
            ),
            Value::Array(items) => {
                for (j, c) in items.iter().enumerate() {
                    check_condition(c, &format!("{path}.conditions[{j}]"), sink);
                }
            }
            Value::Input(_) => (),
            _ => sink.error(Category::Conditions, format!("{path}.conditions"), "Must be a list"),
        }
    }
}

pub fn check_conditions(root: &Value, sink: &mut Diagnostics) {
    let Some((key, conditions)) = section(root, CONDITIONS) else {
        return;
    };
    if is_absent(conditions) || matches!(conditions, Value::Input(_)) {
        return;
    }
    let Ok(conditions) = conditions.as_array() else {
        sink.error(Category::Conditions, "", format!("'{key}' must be a list"));
        return;
    };
    for (i, condition) in conditions.iter().enumerate() {
        check_condition(condition, &format!("{key}[{i}]"), sink);
    }
}

struct ActionChecker<'s> {
    join_vars: &'s BTreeSet<String>,
    sink: &'s mut Diagnostics,
}

impl ActionChecker<'_> {
    fn sequence(&mut self, actions: &Value, path: &str) {
        let Ok(actions) = actions.as_array() else {
            return;
        };
        if actions.is_empty() {
            self.sink.warning(Category::Actions, path, "Empty sequence");
        }
        for (j, action) in actions.iter().enumerate() {
            self.action(action, &format!("{path}[{j}]"));
        }
    }

    fn conditions(&mut self, conditions: &Value, path: &str) {
        match conditions {
            Value::Array(items) => {
                for (k, c) in items.iter().enumerate() {
                    check_condition(c, &format!("{path}[{k}]"), self.sink);
                }
            }
            Value::Undefined | Value::Null => (),
            single => check_condition(single, path, self.sink),
        }
    }

    fn service(&mut self, action: &Value, key: &str, path: &str) {
        let Ok(service) = action[key].as_string() else {
            return;
        };
        if !has_template(service) && !SERVICE.is_match(service) {
            self.sink.warning(
                Category::Actions,
                format!("{path}.{key}"),
                format!(
                    "Service '{service}' should be in format 'domain.service_name' (lowercase \
                     letters, numbers, underscores only)"
                ),
            );
        }

        match &action["data"] {
            Value::Null => self.sink.error(Category::Actions, format!("{path}.data"), "Cannot be None/empty"),
            Value::Undefined | Value::Object(_) | Value::Input(_) => (),
            Value::String(s) if is_templated(s) => (),
            _ => self.sink.error(Category::Actions, format!("{path}.data"), "Must be a dictionary"),
        }

        self.entity_id(&action["target"]["entity_id"], &format!("{path}.target.entity_id"));
        self.entity_id(&action["entity_id"], &format!("{path}.entity_id"));
    }

    // A service call needs one entity per list item, never a joined string.
    fn entity_id(&mut self, value: &Value, path: &str) {
        let text = match value {
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if !matches!(item, Value::String(_) | Value::Input(_)) {
                        self.sink.error(
                            Category::Actions,
                            format!("{path}[{idx}]"),
                            "entity_id entries must be strings",
                        );
                    }
                }
                return;
            }
            Value::String(s) => s.trim(),
            _ => return,
        };
        if text.is_empty() {
            return;
        }

        if text.contains(',') && !text.contains("{{") && !text.starts_with('[') {
            self.sink.error(
                Category::Actions,
                path,
                "Multiple entity IDs must be provided as a YAML list or loop, not a \
                 comma-separated string",
            );
        }

        if !has_template(text) {
            return;
        }
        if JOIN_WORD.is_match(text) {
            self.sink.error(
                Category::Actions,
                path,
                "entity_id template uses 'join', which produces an invalid comma-separated \
                 string; iterate over entities instead",
            );
        }
        let leading = scan(text)
            .next()
            .filter(|r| r.kind == RegionKind::Expression)
            .and_then(|r| r.tokens().first().map(|t| t.text));
        if let Some(var) = leading.filter(|v| self.join_vars.contains(*v)) {
            self.sink.error(
                Category::Actions,
                path,
                format!(
                    "References variable '{var}' built with join(); entity_id templates cannot \
                     combine multiple entities"
                ),
            );
        }
    }

    fn delay(&mut self, delay: &Value, path: &str) {
        match delay {
            Value::String(s) if has_template(s) => (),
            Value::String(s) if !DELAY.is_match(s) => self.sink.warning(
                Category::Actions,
                path,
                format!("Delay string '{s}' should be in HH:MM:SS format or a template"),
            ),
            Value::Object(parts) => {
                for key in parts.keys().filter(|k| !DELAY_KEYS.contains(&k.as_ref())) {
                    self.sink.warning(
                        Category::Actions,
                        format!("{path}.{key}"),
                        format!("Unknown delay key. Valid keys: {}", DELAY_KEYS.join(", ")),
                    );
                }
            }
            Value::Number(n) if n.as_f64().is_some_and(|n| n < 0.0) => {
                self.sink.error(Category::Actions, path, "Delay cannot be negative")
            }
            _ => (),
        }
    }

    fn timeout(&mut self, action: &Value, kind: &str, path: &str) {
        if is_absent(&action["timeout"]) {
            self.sink.warning(
                Category::Actions,
                path,
                format!("{kind} without 'timeout' may wait indefinitely"),
            );
        }
    }

    fn wait_template(&mut self, action: &Value, path: &str) {
        match &action["wait_template"] {
            Value::String(s) => {
                if !has_template(s) {
                    self.sink.warning(
                        Category::Actions,
                        format!("{path}.wait_template"),
                        "Should contain a Jinja2 template expression",
                    );
                }
            }
            Value::Input(_) => (),
            _ => {
                self.sink.error(
                    Category::Actions,
                    format!("{path}.wait_template"),
                    "Must be a string template",
                );
                return;
            }
        }
        self.timeout(action, "wait_template", path);
    }

    fn wait_for_trigger(&mut self, action: &Value, path: &str) {
        let triggers = match &action["wait_for_trigger"] {
            Value::Array(items) => items,
            Value::Input(_) => return self.timeout(action, "wait_for_trigger", path),
            _ => {
                self.sink.error(
                    Category::Actions,
                    format!("{path}.wait_for_trigger"),
                    "Must be a list of triggers",
                );
                return;
            }
        };
        if triggers.is_empty() {
            self.sink
                .error(Category::Actions, format!("{path}.wait_for_trigger"), "Cannot be empty");
            return;
        }
        for (i, trigger) in triggers.iter().enumerate() {
            let tpath = format!("{path}.wait_for_trigger[{i}]");
            if trigger.as_object().is_err() {
                self.sink.error(Category::Actions, tpath, "Must be a dictionary");
            } else if !has_trigger_type(trigger) {
                self.sink
                    .error(Category::Actions, tpath, "Missing 'platform' or 'trigger' key");
            }
        }
        self.timeout(action, "wait_for_trigger", path);
    }

    fn if_then_else(&mut self, action: &Value, path: &str) {
        self.conditions(&action["if"], &format!("{path}.if"));
        if is_absent(&action["then"]) {
            self.sink.error(Category::Actions, path, "'if' requires 'then' block");
        }
        self.sequence(&action["then"], &format!("{path}.then"));
        self.sequence(&action["else"], &format!("{path}.else"));
    }

    fn repeat(&mut self, repeat: &Value, path: &str) {
        let path = format!("{path}.repeat");
        if is_absent(&repeat["sequence"]) {
            self.sink.error(Category::Actions, path.as_str(), "Missing 'sequence' key");
        }
        self.sequence(&repeat["sequence"], &format!("{path}.sequence"));
        self.conditions(&repeat["while"], &format!("{path}.while"));
        self.conditions(&repeat["until"], &format!("{path}.until"));

        if repeat["for_each"].as_string().is_ok_and(|s| s.contains("join")) {
            self.sink.warning(
                Category::Actions,
                format!("{path}.for_each"),
                "uses 'join' which may not produce a valid list; ensure it returns a sequence",
            );
        }
    }

    fn choose(&mut self, action: &Value, choices: &[Value], path: &str) {
        for (j, choice) in choices.iter().enumerate() {
            if choice.as_object().is_err() {
                continue;
            }
            let cpath = format!("{path}.choose[{j}]");
            self.conditions(&choice["conditions"], &format!("{cpath}.conditions"));
            if is_absent(&choice["sequence"]) {
                self.sink.error(Category::Actions, cpath.as_str(), "Missing 'sequence' key");
            }
            self.sequence(&choice["sequence"], &format!("{cpath}.sequence"));
        }
        self.sequence(&action["default"], &format!("{path}.default"));
    }

    fn action(&mut self, action: &Value, path: &str) {
        match action {
            Value::Object(_) => (),
            Value::Input(_) => return,
            _ => {
                self.sink.error(Category::Actions, path, "Must be a dictionary");
                return;
            }
        }

        if let Ok(variables) = action["variables"].as_object() {
            let block: Vec<(&str, &str)> = variables
                .iter()
                .filter_map(|(n, v)| v.as_string().ok().map(|s| (n.as_ref(), s.as_ref())))
                .collect();
            check_concatenation(&block, &format!("{path}.variables"), self.sink);
        }

        // `action:` is the current spelling of `service:`.
        for key in ["service", "action"] {
            self.service(action, key, path);
        }

        if !is_absent(&action["delay"]) {
            self.delay(&action["delay"], &format!("{path}.delay"));
        }
        if !is_absent(&action["wait_template"]) {
            self.wait_template(action, path);
        }
        if !is_absent(&action["wait_for_trigger"]) {
            self.wait_for_trigger(action, path);
        }
        if action.has_key("if") {
            self.if_then_else(action, path);
        }
        if let Value::Object(_) = &action["repeat"] {
            self.repeat(&action["repeat"], path);
        }
        if let Ok(choices) = action["choose"].as_array() {
            self.choose(action, choices, path);
        }
        if let Ok(branches) = action["parallel"].as_array() {
            for (j, branch) in branches.iter().enumerate() {
                let bpath = format!("{path}.parallel[{j}]");
                match branch {
                    Value::Array(_) => self.sequence(branch, &bpath),
                    _ => self.action(branch, &bpath),
                }
            }
        }
        if !action.has_key("repeat") && !action.has_key("choose") {
            self.sequence(&action["sequence"], &format!("{path}.sequence"));
        }
    }
}

pub fn check_actions(root: &Value, join_vars: &BTreeSet<String>, sink: &mut Diagnostics) {
    let Some((key, actions)) = section(root, ACTIONS) else {
        return;
    };
    if is_absent(actions) || matches!(actions, Value::Input(_)) {
        return;
    }
    let Ok(items) = actions.as_array() else {
        sink.error(Category::Actions, "", format!("'{key}' must be a list"));
        return;
    };
    let mut checker = ActionChecker { join_vars, sink };
    for (i, action) in items.iter().enumerate() {
        checker.action(action, &format!("{key}[{i}]"));
    }
}
