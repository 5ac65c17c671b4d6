// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::diagnostics::{Category, Diagnostics};
use crate::typing::Type;
use crate::value::Value;

use std::collections::BTreeSet;

use indexmap::IndexMap;

const SELECTOR_TYPES: &[&str] = &[
    "action",
    "addon",
    "area",
    "attribute",
    "boolean",
    "color_rgb",
    "color_temp",
    "condition",
    "conversation_agent",
    "country",
    "date",
    "datetime",
    "device",
    "duration",
    "entity",
    "file",
    "floor",
    "icon",
    "label",
    "language",
    "location",
    "media",
    "navigation",
    "number",
    "object",
    "select",
    "state",
    "target",
    "template",
    "text",
    "theme",
    "time",
    "trigger",
    "ui_action",
    "ui_color",
];

// (on suffix, off suffix, what the pair bounds)
const HYSTERESIS_PAIRS: &[(&str, &str, &str)] = &[
    ("_on", "_off", "threshold"),
    ("_high", "_low", "boundary"),
    ("_upper", "_lower", "limit"),
    ("_start", "_stop", "trigger point"),
    ("_enable", "_disable", "activation point"),
];

/// Coarse classification of an input from its selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Entity,
    // Entity selector restricted to the `input_datetime` domain.
    DateTimeEntity,
    Number,
    Boolean,
    Text,
    DateTime,
    Other,
}

fn is_datetime_domain(domain: &Value) -> bool {
    match domain {
        Value::String(d) => d.as_ref() == "input_datetime",
        Value::Array(ds) => ds.iter().any(is_datetime_domain),
        _ => false,
    }
}

impl InputKind {
    pub fn from_selector(selector: &Value) -> InputKind {
        let Ok(selector) = selector.as_object() else {
            return InputKind::Other;
        };
        for (kind, config) in selector.iter() {
            match kind.as_ref() {
                "entity" if is_datetime_domain(&config["domain"]) => {
                    return InputKind::DateTimeEntity
                }
                "entity" => return InputKind::Entity,
                "number" => return InputKind::Number,
                "boolean" => return InputKind::Boolean,
                "text" | "select" => return InputKind::Text,
                "datetime" | "date" | "time" => return InputKind::DateTime,
                _ => (),
            }
        }
        InputKind::Other
    }

    /// Type of a variable bound directly to an input of this kind.
    pub fn type_hint(self) -> Option<Type> {
        match self {
            InputKind::Number => Some(Type::Number),
            InputKind::Boolean => Some(Type::Boolean),
            InputKind::Entity | InputKind::DateTimeEntity | InputKind::Text | InputKind::DateTime => {
                Some(Type::String)
            }
            InputKind::Other => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputDef {
    // Dotted location of the definition, e.g. `blueprint.input.group.name`.
    pub path: String,
    pub kind: InputKind,
    pub default: Option<Value>,
}

/// Inputs defined under `blueprint.input`, groups flattened, in document order.
#[derive(Debug, Clone, Default)]
pub struct Inputs {
    defs: IndexMap<String, InputDef>,
}

impl Inputs {
    pub fn get(&self, name: &str) -> Option<&InputDef> {
        self.defs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.defs.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<InputKind> {
        self.get(name).map(|d| d.kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputDef)> {
        self.defs.iter().map(|(n, d)| (n.as_str(), d))
    }
}

fn label_text(label: &Value) -> String {
    match label {
        Value::String(s) => s.to_string(),
        Value::Undefined | Value::Null => "none".to_string(),
        other => other.to_string(),
    }
}

fn check_select_options(select: &Value, path: &str, sink: &mut Diagnostics) {
    let options = &select["options"];
    if options.is_undefined() || options.is_null() || select.as_object().is_err() {
        return;
    }
    let options_path = format!("{path}.selector.select.options");
    let Ok(options) = options.as_array() else {
        sink.error(Category::Inputs, options_path, "Must be a list");
        return;
    };

    for (i, option) in options.iter().enumerate() {
        let path = format!("{options_path}[{i}]");
        match option {
            Value::Null => sink.error(
                Category::Inputs,
                path,
                "Option cannot be None. Select options must be strings or label/value dicts \
                 with non-empty values.",
            ),
            Value::Object(_) => {
                let label = &option["label"];
                match &option["value"] {
                    Value::Undefined | Value::Null => sink.error(
                        Category::Inputs,
                        path.as_str(),
                        format!(
                            "Option value is None. Label/value options must have a non-empty \
                             'value' field. Label: '{}'",
                            label_text(label)
                        ),
                    ),
                    Value::String(v) if v.is_empty() => sink.error(
                        Category::Inputs,
                        path.as_str(),
                        format!(
                            "Option value cannot be empty string. Home Assistant treats empty \
                             values as None during import. Label: '{}'. Use a placeholder value \
                             like '---' or remove this option.",
                            label_text(label)
                        ),
                    ),
                    Value::String(_) => (),
                    other => sink.error(
                        Category::Inputs,
                        path.as_str(),
                        format!(
                            "Option value must be a string, got {}. Label: '{}'",
                            other.type_name(),
                            label_text(label)
                        ),
                    ),
                }
                if !matches!(label, Value::Undefined | Value::Null | Value::String(_)) {
                    sink.warning(
                        Category::Inputs,
                        path,
                        format!("Option label should be a string, got {}", label.type_name()),
                    );
                }
            }
            Value::String(s) if s.is_empty() => sink.warning(
                Category::Inputs,
                path,
                "Empty string option. Consider using a meaningful value.",
            ),
            Value::String(_) => (),
            other => sink.error(
                Category::Inputs,
                path,
                format!(
                    "Option must be a string or label/value dict, got {}",
                    other.type_name()
                ),
            ),
        }
    }
}

fn define(inputs: &mut Inputs, name: &str, def: &Value, path: String, sink: &mut Diagnostics) {
    let default = match &def["default"] {
        Value::Undefined | Value::Null => None,
        v => Some(v.clone()),
    };
    let selector = &def["selector"];
    let mut kind = InputKind::Other;

    if selector.is_undefined() || selector.is_null() {
        sink.warning(
            Category::Inputs,
            path.as_str(),
            "No selector defined (inputs should have selectors)",
        );
    } else if let Ok(types) = selector.as_object() {
        for selector_type in types.keys() {
            if !SELECTOR_TYPES.contains(&selector_type.as_ref()) {
                sink.warning(
                    Category::Inputs,
                    format!("{path}.selector"),
                    format!("Unknown selector type '{selector_type}'"),
                );
            }
        }
        if selector.has_key("select") {
            check_select_options(&selector["select"], &path, sink);
        }
        kind = InputKind::from_selector(selector);
    } else {
        sink.error(Category::Inputs, format!("{path}.selector"), "Must be a dictionary");
    }

    inputs.defs.insert(name.to_string(), InputDef { path, kind, default });
}

fn walk(inputs: &mut Inputs, section: &Value, path: &str, sink: &mut Diagnostics) {
    let Ok(section) = section.as_object() else {
        return;
    };
    for (key, value) in section.iter() {
        let path = format!("{path}.{key}");
        if value.as_object().is_err() {
            sink.error(Category::Inputs, path, "Input must be a dictionary");
            continue;
        }
        match &value["input"] {
            Value::Undefined | Value::Null => define(inputs, key, value, path, sink),
            nested @ Value::Object(_) => walk(inputs, nested, &path, sink),
            _ => sink.error(Category::Inputs, format!("{path}.input"), "Must be a dictionary"),
        }
    }
}

/// Record every input under `blueprint.input`, validating selectors on the way.
pub fn collect_inputs(root: &Value, sink: &mut Diagnostics) -> Inputs {
    let mut inputs = Inputs::default();
    let section = &root["blueprint"]["input"];
    match section {
        Value::Undefined | Value::Null => (),
        Value::Object(_) => walk(&mut inputs, section, "blueprint.input", sink),
        _ => sink.error(Category::Inputs, "", "'blueprint.input' must be a dictionary"),
    }
    inputs
}

fn numeric_default(def: &InputDef) -> Option<f64> {
    match def.default.as_ref()? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Paired on/off inputs must keep a gap with ON above OFF.
pub fn check_hysteresis(inputs: &Inputs, sink: &mut Diagnostics) {
    for (on_suffix, off_suffix, what) in HYSTERESIS_PAIRS {
        for (on_name, on_def) in inputs.iter() {
            let Some(stem) = on_name.strip_suffix(on_suffix) else {
                continue;
            };
            let off_name = format!("{stem}{off_suffix}");
            let Some(off_def) = inputs.get(&off_name) else {
                continue;
            };
            let (Some(on), Some(off)) = (numeric_default(on_def), numeric_default(off_def)) else {
                continue;
            };

            let path = on_def.path.as_str();
            if on < off {
                sink.error(
                    Category::Inputs,
                    path,
                    format!(
                        "Hysteresis {what} inversion: '{on_name}' (default={on:?}) should be \
                         greater than '{off_name}' (default={off:?}). With ON < OFF, the system \
                         will chatter rapidly. Swap the values or adjust thresholds."
                    ),
                );
            } else if on == off {
                sink.warning(
                    Category::Inputs,
                    path,
                    format!(
                        "Hysteresis {what} has no gap: '{on_name}' and '{off_name}' both default \
                         to {on:?}. Without a gap between ON and OFF thresholds, there's no \
                         hysteresis protection against oscillation."
                    ),
                );
            } else if on != 0.0 && (on - off) / on.abs() < 0.1 {
                sink.warning(
                    Category::Inputs,
                    path,
                    format!(
                        "Hysteresis {what} gap may be too small: '{on_name}' (default={on:?}) \
                         minus '{off_name}' (default={off:?}) = {:?}. A larger gap provides \
                         better oscillation protection.",
                        on - off
                    ),
                );
            }
        }
    }
}

fn collect_references(value: &Value, used: &mut BTreeSet<String>) {
    match value {
        Value::Input(name) => {
            used.insert(name.to_string());
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, used)),
        Value::Object(fields) => fields.values().for_each(|v| collect_references(v, used)),
        _ => (),
    }
}

/// Every `!input` in the document must name a defined input.
pub fn check_input_references(root: &Value, inputs: &Inputs, sink: &mut Diagnostics) {
    let mut used = BTreeSet::new();
    collect_references(root, &mut used);
    for name in used.iter().filter(|n| !inputs.contains(n)) {
        sink.error(
            Category::References,
            "",
            format!(
                "Undefined input reference: '!input {name}' - no matching input defined in \
                 blueprint.input"
            ),
        );
    }
}
