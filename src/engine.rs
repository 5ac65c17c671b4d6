// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::balance::check_balance;
use crate::builtins;
use crate::config::Config;
use crate::diagnostics::{Category, Diagnostics};
use crate::document::{Document, LoadError};
use crate::lexer::*;
use crate::numeric::{check_guards, GuardPolicy};
use crate::params::{check_datetime_states, check_entity_booleans};
use crate::pitfalls::{check_attribute_access, check_bare_booleans, check_document_text};
use crate::report::Report;
use crate::scheduler::*;
use crate::scope::Scope;
use crate::structure::{self, InputKind, Inputs};
use crate::typing::{check_pipelines, infer_pipeline_types, matching, Type};
use crate::value::Value;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

// Per-document facts shared by the field checks.
struct Context {
    // Variables bound to `input_datetime` entity inputs.
    datetime_vars: BTreeSet<String>,
    // Variables bound to entity inputs.
    entity_vars: BTreeSet<String>,
    guards: GuardPolicy,
}

/// The blueprint validation engine.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Config,
}

/// Create an engine with the default configuration.
impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

// Whether a template applies `| float(N)` or `| int(N)` with N > 0.
fn positive_default(fragments: &[Fragment]) -> bool {
    fragments.iter().any(|frag| {
        frag.tokens.windows(4).any(|w| {
            w[0].kind == TokenKind::Pipe
                && builtins::CONVERSION_FILTERS.iter().any(|f| w[1].is_ident(f))
                && w[2].is_punct("(")
                && w[3].number().is_some_and(|n| n > 0.0)
        })
    })
}

// Type of a template consisting of one expression ending in a known filter.
fn template_hint(text: &str) -> Option<Type> {
    let regions: Vec<Region> = scan(text.trim()).collect();
    let [region] = regions.as_slice() else {
        return None;
    };
    if region.kind != RegionKind::Expression {
        return None;
    }
    let tokens = region.tokens();

    let mut depth = 0usize;
    let mut last_pipe = None;
    for (idx, tok) in tokens.iter().enumerate() {
        match tok.text {
            "(" | "[" | "{" if tok.kind == TokenKind::Punct => depth += 1,
            ")" | "]" | "}" if tok.kind == TokenKind::Punct => depth = depth.saturating_sub(1),
            _ if tok.kind == TokenKind::Pipe && depth == 0 => last_pipe = Some(idx),
            _ => (),
        }
    }
    let pipe = last_pipe?;
    let filter = tokens.get(pipe + 1).filter(|t| t.kind == TokenKind::Ident)?;
    let end = match tokens.get(pipe + 2) {
        None => pipe + 1,
        Some(t) if t.is_punct("(") => matching(&tokens, pipe + 2)?,
        Some(_) => return None,
    };
    if end + 1 != tokens.len() {
        return None;
    }
    builtins::filter_output(filter.text)
}

fn variable_hint(value: &Value, inputs: &Inputs) -> Option<Type> {
    match value {
        Value::Number(_) => Some(Type::Number),
        Value::Bool(_) => Some(Type::Boolean),
        Value::Array(_) => Some(Type::List),
        Value::Input(name) => inputs.kind(name).and_then(InputKind::type_hint),
        Value::String(s) if !is_templated(s) => Some(Type::String),
        Value::String(s) => template_hint(s),
        _ => None,
    }
}

// Names bound outside the root variables section: action-level
// `variables` blocks and `response_variable` targets.
fn collect_locals(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(fields) => {
            for (key, v) in fields.iter() {
                match (key.as_ref(), v) {
                    ("variables", Value::Object(vars)) => {
                        out.extend(vars.keys().map(|n| n.to_string()))
                    }
                    ("response_variable", Value::String(n)) => {
                        out.insert(n.to_string());
                    }
                    _ => (),
                }
                collect_locals(v, out);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_locals(v, out)),
        _ => (),
    }
}

fn collect_fields<'v>(value: &'v Value, path: String, out: &mut Vec<(String, &'v str)>) {
    match value {
        Value::String(s) if is_templated(s) => out.push((path, s.as_ref())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_fields(item, format!("{path}[{i}]"), out);
            }
        }
        Value::Object(fields) => {
            for (key, v) in fields.iter() {
                collect_fields(v, format!("{path}.{key}"), out);
            }
        }
        _ => (),
    }
}

// Root sections that are neither metadata nor the root variables.
fn automation_sections(root: &Value) -> impl Iterator<Item = (&str, &Value)> {
    root.as_object()
        .into_iter()
        .flat_map(|m| m.iter())
        .map(|(k, v)| (k.as_ref(), v))
        .filter(|(k, _)| *k != "blueprint" && *k != "variables")
}

fn section_keys(root: &Value, key: &str) -> Vec<String> {
    root[key]
        .as_object()
        .map(|m| m.keys().map(|k| k.to_string()).collect())
        .unwrap_or_default()
}

fn check_documentation(path: &Path, sink: &mut Diagnostics) {
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string());
    for file in ["README.md", "CHANGELOG.md"] {
        if !dir.join(file).exists() {
            sink.warning(
                Category::Documentation,
                "",
                format!("No {file} found in {dir_name}/ directory"),
            );
        }
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Validate a document held in memory. Documentation checks are skipped
    /// since there is no directory to look in.
    pub fn validate_str(&self, name: &str, contents: impl Into<String>) -> Report {
        match Document::from_contents(name, contents.into()) {
            Ok(doc) => self.validate_document(&doc),
            Err(e) => Self::load_failure(name, e),
        }
    }

    /// Validate a file. Only failing to read it is an `Err`; YAML errors are
    /// reported as diagnostics.
    pub fn validate_file<P: AsRef<Path>>(&self, path: P) -> Result<Report> {
        let path = path.as_ref();
        match Document::from_file(path) {
            Ok(doc) => Ok(self.validate_document(&doc)),
            Err(LoadError::Io(e)) => {
                Err(e).with_context(|| format!("Failed to load file: {}", path.display()))
            }
            Err(e) => Ok(Self::load_failure(&path.to_string_lossy(), e)),
        }
    }

    fn load_failure(name: &str, e: LoadError) -> Report {
        tracing::debug!(name, error = %e, "document failed to load");
        let mut sink = Diagnostics::new();
        sink.error(Category::Syntax, "", e.to_string());
        Report::new(name, sink)
    }

    pub fn validate_document(&self, doc: &Document) -> Report {
        let _span = tracing::debug_span!("validate", name = %doc.name()).entered();
        let mut sink = Diagnostics::new();
        let root = &doc.root;

        let inputs = structure::check_structure(root, &mut sink);

        let variables: Vec<(&str, &Value)> = root["variables"]
            .as_object()
            .map(|m| m.iter().map(|(k, v)| (k.as_ref(), v)).collect())
            .unwrap_or_default();
        let ctx = self.context(&variables, &inputs);
        let hints: BTreeMap<String, Type> = variables
            .iter()
            .filter_map(|(n, v)| variable_hint(v, &inputs).map(|t| (n.to_string(), t)))
            .collect();
        let scope = Scope::build(variables.iter().map(|(n, _)| *n), &hints)
            .with_ambient(&self.config.extra_builtins)
            .with_ambient(section_keys(root, "trigger_variables"))
            .with_ambient(section_keys(root, "fields"));

        self.check_variables(&variables, &scope, &ctx, &mut sink);

        let mut locals = BTreeSet::new();
        let mut fields = vec![];
        for (key, value) in automation_sections(root) {
            collect_locals(value, &mut locals);
            collect_fields(value, key.to_string(), &mut fields);
        }
        let field_scope = scope.clone().with_ambient(&locals);
        for (path, text) in &fields {
            self.check_field(text, path, &field_scope, &ctx, &mut sink);
        }

        check_balance(&doc.source, &mut sink);
        check_document_text(&doc.source, &mut sink);
        structure::check_input_references(root, &inputs, &mut sink);

        if self.config.check_documentation {
            if let Some(path) = &doc.path {
                check_documentation(path, &mut sink);
            }
        }

        tracing::debug!(
            errors = sink.errors().count(),
            warnings = sink.warnings().count(),
            "validated"
        );
        Report::new(doc.name(), sink)
    }

    fn context(&self, variables: &[(&str, &Value)], inputs: &Inputs) -> Context {
        let mut ctx = Context {
            datetime_vars: BTreeSet::new(),
            entity_vars: BTreeSet::new(),
            guards: GuardPolicy {
                nonzero_constants: self.config.nonzero_constant_set(),
                nonzero_defaults: BTreeSet::new(),
            },
        };
        for (name, value) in variables {
            match value {
                Value::Input(input) => match inputs.kind(input) {
                    Some(InputKind::DateTimeEntity) => {
                        ctx.datetime_vars.insert(name.to_string());
                        ctx.entity_vars.insert(name.to_string());
                    }
                    Some(InputKind::Entity) => {
                        ctx.entity_vars.insert(name.to_string());
                    }
                    _ => (),
                },
                Value::String(text) if positive_default(&fragments(text)) => {
                    ctx.guards.nonzero_defaults.insert(name.to_string());
                }
                _ => (),
            }
        }
        ctx
    }

    // Root variables: ordering and helper chains across the section, then
    // the per-field checks in declaration order.
    fn check_variables(
        &self,
        variables: &[(&str, &Value)],
        scope: &Scope,
        ctx: &Context,
        sink: &mut Diagnostics,
    ) {
        let texts: Vec<(usize, &str, &str)> = variables
            .iter()
            .enumerate()
            .filter_map(|(i, (n, v))| v.as_string().ok().map(|s| (i, *n, s.as_ref())))
            .collect();

        let mut defs = vec![];
        for &(index, var, text) in &texts {
            let frags = fragments(text);
            let field = scope.field(&frags, text.len());
            defs.push(Definition {
                var,
                index,
                used_vars: references(&frags, &field),
            });
        }
        check_forward_references(scope, &defs, sink);
        check_helper_chains(&defs, &self.config.helper_policy(), sink);

        for &(_, var, text) in &texts {
            self.check_field(text, &format!("variables.{var}"), scope, ctx, sink);
        }
    }

    fn check_field(&self, text: &str, path: &str, scope: &Scope, ctx: &Context, sink: &mut Diagnostics) {
        tracing::trace!(path, "checking field");
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());

        check_attribute_access(&frags, path, sink);
        check_datetime_states(&frags, &ctx.datetime_vars, path, sink);
        check_bare_booleans(text, path, sink);
        check_guards(&frags, &ctx.guards, path, sink);
        check_entity_booleans(&frags, &ctx.entity_vars, path, sink);
        check_undefined(&frags, &field, path, sink);

        let pipelines = infer_pipeline_types(text, &frags, &field);
        check_pipelines(&pipelines, path, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hints_from_values() {
        let inputs = Inputs::default();
        let hint = |yaml: &str| variable_hint(&Value::from_yaml_str(yaml).unwrap(), &inputs);
        assert_eq!(hint("3"), Some(Type::Number));
        assert_eq!(hint("'{{ states(\"sensor.x\") | float(0) }}'"), Some(Type::Number));
        assert_eq!(hint("'{{ xs | join(\", \") }}'"), Some(Type::String));
        assert_eq!(hint("'{{ (a | float) + b }}'"), None);
        assert_eq!(hint("'{{ a | int if b else c }}'"), None);
        assert_eq!(hint("plain"), Some(Type::String));
    }

    #[test]
    fn positive_defaults() {
        assert!(positive_default(&fragments("{{ state_attr(e, 'x') | float(1.5) }}")));
        assert!(!positive_default(&fragments("{{ x | float(0) }}")));
        assert!(!positive_default(&fragments("{{ x | float }}")));
    }

    #[test]
    fn load_failure_is_a_report() {
        let report = Engine::new().validate_str("bad.yaml", "a: [1,\n");
        assert!(!report.is_valid());
        assert_eq!(report.diagnostics.len(), 1);
        let d = report.diagnostics.iter().next().unwrap();
        assert_eq!(d.category, Category::Syntax);
        assert!(d.message.starts_with("YAML syntax error"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Engine::new().validate_file("/nonexistent/blueprint.yaml").unwrap_err();
        assert!(err.to_string().starts_with("Failed to load file"));
    }
}
