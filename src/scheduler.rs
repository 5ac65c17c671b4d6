// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::diagnostics::{Category, Diagnostics};
use crate::lexer::*;
use crate::scope::{roles, FieldScope, Role, Scope, Symbol};

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub struct Definition<'a> {
    // The variable being defined.
    pub var: &'a str,

    // Position of the variable in the variables section.
    pub index: usize,

    // Other declared variables used to compute the value of this variable.
    pub used_vars: BTreeSet<&'a str>,
}

/// Naming policy for private helper variables.
#[derive(Debug, Clone)]
pub struct HelperPolicy {
    pub prefix: String,
    // Helpers meant to be read by several templates.
    pub persistent_prefixes: Vec<String>,
    pub min_chain: usize,
}

impl Default for HelperPolicy {
    fn default() -> Self {
        Self {
            prefix: "_".to_string(),
            persistent_prefixes: vec!["_raw_".into(), "_is_".into(), "_has_".into()],
            min_chain: 2,
        }
    }
}

impl HelperPolicy {
    pub fn is_helper(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
            && !self
                .persistent_prefixes
                .iter()
                .any(|p| name.starts_with(p.as_str()))
    }
}

/// Declared variables a field reads in expression position.
pub fn references<'a>(fragments: &[Fragment<'a>], field: &FieldScope) -> BTreeSet<&'a str> {
    let mut used = BTreeSet::new();
    for frag in fragments {
        for (tok, role) in frag.tokens.iter().zip(roles(frag)) {
            if role != Some(Role::Reference) {
                continue;
            }
            if let Some(Symbol::Declared { .. }) = field.resolve(tok.text, tok.offset) {
                used.insert(tok.text);
            }
        }
    }
    used
}

/// Report every reference from a variable to one declared after it.
pub fn check_forward_references(scope: &Scope, defs: &[Definition], sink: &mut Diagnostics) {
    for defn in defs {
        for used in &defn.used_vars {
            let Some(index) = scope.index_of(used) else {
                continue;
            };
            let symbol = Symbol::Declared { index, hint: None };
            if !scope.is_forward_reference(defn.index, &symbol) {
                continue;
            }
            sink.error(
                Category::References,
                format!("variables.{}", defn.var),
                format!(
                    "Variable '{var}' references '{used}' which is defined later in the \
                     variables section. Variables are evaluated in order - move '{used}' \
                     before '{var}' or restructure to avoid the dependency.",
                    var = defn.var
                ),
            );
        }
    }
}

/// Warn when a variable is fed by a chain of single-use helpers.
pub fn check_helper_chains(defs: &[Definition], policy: &HelperPolicy, sink: &mut Diagnostics) {
    // Mapping from each var to the variables that read it.
    let mut consumers: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for defn in defs {
        for used in &defn.used_vars {
            if *used != defn.var {
                consumers.entry(*used).or_default().insert(defn.var);
            }
        }
    }

    let single_use: BTreeSet<&str> = defs
        .iter()
        .map(|d| d.var)
        .filter(|v| policy.is_helper(v) && consumers.get(v).is_some_and(|c| c.len() == 1))
        .collect();
    let by_name: BTreeMap<&str, &Definition> = defs.iter().map(|d| (d.var, d)).collect();
    let feeds = |var: &str| {
        by_name
            .get(var)
            .map(|d| {
                d.used_vars
                    .iter()
                    .filter(|u| single_use.contains(*u) && **u != var)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    };

    for defn in defs.iter().filter(|d| !single_use.contains(d.var)) {
        let mut chain = BTreeSet::new();
        let mut stack = feeds(defn.var);
        while let Some(helper) = stack.pop() {
            // Bounded by the number of declared variables.
            if chain.insert(helper) {
                stack.extend(feeds(helper));
            }
        }

        let nested = chain.iter().any(|h| !feeds(*h).is_empty());
        if chain.len() < policy.min_chain || !nested {
            continue;
        }
        let mut ordered: Vec<&Definition> = chain.iter().filter_map(|h| by_name.get(h).cloned()).collect();
        ordered.sort_by_key(|d| d.index);
        let names: Vec<&str> = ordered.iter().map(|d| d.var).collect();
        sink.warning(
            Category::References,
            format!("variables.{}", defn.var),
            format!(
                "Variable '{}' depends on a chain of helper variables ({}). Consider \
                 consolidating into a single self-contained template to avoid potential \
                 'UndefinedError' at runtime.",
                defn.var,
                names.join(", ")
            ),
        );
    }
}

/// Report names read in expression position that resolve to nothing.
/// Called names are assumed to be runtime functions.
pub fn check_undefined(fragments: &[Fragment], field: &FieldScope, path: &str, sink: &mut Diagnostics) {
    let mut reported = BTreeSet::new();
    for frag in fragments {
        for (tok, role) in frag.tokens.iter().zip(roles(frag)) {
            if role != Some(Role::Reference) || field.resolve(tok.text, tok.offset).is_some() {
                continue;
            }
            if reported.insert(tok.text) {
                sink.error(
                    Category::References,
                    path,
                    format!("Undefined reference to '{}'.", tok.text),
                );
            }
        }
    }
}

// Whether `tokens[idx]` is an operand of `+`, directly or through parentheses.
fn added(tokens: &[Token], idx: usize) -> bool {
    let before = |n: usize| idx.checked_sub(n).map(|i| &tokens[i]);
    let after = |n: usize| tokens.get(idx + n);
    before(1).is_some_and(|t| t.is_op("+"))
        || after(1).is_some_and(|t| t.is_op("+"))
        || (before(1).is_some_and(|t| t.is_punct("(")) && before(2).is_some_and(|t| t.is_op("+")))
        || (after(1).is_some_and(|t| t.is_punct(")")) && after(2).is_some_and(|t| t.is_op("+")))
}

/// Inside an action-level `variables` block every value is rendered to a
/// string, so `+` between two of them concatenates instead of adding.
pub fn check_concatenation(block: &[(&str, &str)], path: &str, sink: &mut Diagnostics) {
    let templated: BTreeSet<&str> = block
        .iter()
        .filter(|(_, v)| v.contains("{{"))
        .map(|(n, _)| *n)
        .collect();

    for (name, value) in block {
        let frags = fragments(value);
        let hit = frags.iter().find_map(|frag| {
            frag.tokens.iter().enumerate().find_map(|(idx, tok)| {
                let other = tok.kind == TokenKind::Ident
                    && tok.text != *name
                    && templated.contains(tok.text)
                    && !(idx > 0 && frag.tokens[idx - 1].is_punct("."));
                (other && added(&frag.tokens, idx)).then_some(tok.text)
            })
        });
        if let Some(other) = hit {
            sink.error(
                Category::Actions,
                format!("{path}.{name}"),
                format!(
                    "Uses '+' with '{other}' which is defined earlier in the same variables \
                     block. In action-block variables, each value becomes a STRING, so \
                     '{other} + x' performs string concatenation, not addition. Fix: compute \
                     all values in a single template using {{% set %}} statements, or use \
                     '| float' on the variable: '({other} | float) + x'."
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions<'a>(scope: &Scope, vars: &[(&'a str, &'a str)]) -> Vec<Definition<'a>> {
        vars.iter()
            .enumerate()
            .map(|(index, (var, text))| {
                let frags = fragments(*text);
                let field = scope.field(&frags, text.len());
                Definition {
                    var: *var,
                    index,
                    used_vars: references(&frags, &field),
                }
            })
            .collect()
    }

    fn scope_of(vars: &[(&str, &str)]) -> Scope {
        Scope::build(vars.iter().map(|(n, _)| *n), &BTreeMap::new())
    }

    #[test]
    fn forward_reference_names_both_variables() {
        let vars = [("a", "{{ b | float(0) }}"), ("b", "{{ 1 }}")];
        let scope = scope_of(&vars);
        let defs = definitions(&scope, &vars);
        let mut sink = Diagnostics::new();
        check_forward_references(&scope, &defs, &mut sink);
        assert_eq!(sink.len(), 1);
        let d = sink.iter().next().unwrap();
        assert_eq!(d.path, "variables.a");
        assert!(d.message.starts_with("Variable 'a' references 'b'"));
    }

    #[test]
    fn loop_iterable_is_read_before_the_binding() {
        let vars = [("a", "{% for b in b %}{{ b }}{% endfor %}"), ("b", "{{ [1] }}")];
        let scope = scope_of(&vars);
        let defs = definitions(&scope, &vars);
        let mut sink = Diagnostics::new();
        check_forward_references(&scope, &defs, &mut sink);
        assert_eq!(sink.len(), 1);
        let d = sink.iter().next().unwrap();
        assert!(d.message.starts_with("Variable 'a' references 'b'"));
    }

    #[test]
    fn set_reads_its_own_target() {
        let scope = Scope::build(["known"], &BTreeMap::new());
        let text = "{% set n = n + 1 %}{{ n }}";
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        let mut sink = Diagnostics::new();
        check_undefined(&frags, &field, "variables.v", &mut sink);
        let names: Vec<_> = sink.iter().map(|d| d.message.clone()).collect();
        assert_eq!(names, vec!["Undefined reference to 'n'.".to_string()]);
    }

    #[test]
    fn backward_reference_is_fine() {
        let vars = [("a", "{{ 1 }}"), ("b", "{{ a + 1 }}")];
        let scope = scope_of(&vars);
        let defs = definitions(&scope, &vars);
        let mut sink = Diagnostics::new();
        check_forward_references(&scope, &defs, &mut sink);
        assert!(sink.is_empty());
        assert_eq!(defs[1].used_vars, BTreeSet::from(["a"]));
    }

    #[test]
    fn quoted_names_are_not_references() {
        let vars = [("a", "{{ states('b') }}"), ("b", "{{ 1 }}")];
        let scope = scope_of(&vars);
        let defs = definitions(&scope, &vars);
        assert!(defs[0].used_vars.is_empty());
    }

    #[test]
    fn helper_chain() {
        let vars = [
            ("_a", "{{ 1 }}"),
            ("_b", "{{ _a + 1 }}"),
            ("_raw_c", "{{ 2 }}"),
            ("result", "{{ _b * _raw_c }}"),
            ("other", "{{ _raw_c }}"),
        ];
        let scope = scope_of(&vars);
        let defs = definitions(&scope, &vars);
        let mut sink = Diagnostics::new();
        check_helper_chains(&defs, &HelperPolicy::default(), &mut sink);
        assert_eq!(sink.len(), 1);
        let d = sink.iter().next().unwrap();
        assert_eq!(d.path, "variables.result");
        assert!(d.message.contains("(_a, _b)"), "{}", d.message);
    }

    #[test]
    fn flat_helpers_are_not_a_chain() {
        let vars = [
            ("_a", "{{ 1 }}"),
            ("_b", "{{ 2 }}"),
            ("result", "{{ _a + _b }}"),
        ];
        let scope = scope_of(&vars);
        let defs = definitions(&scope, &vars);
        let mut sink = Diagnostics::new();
        check_helper_chains(&defs, &HelperPolicy::default(), &mut sink);
        assert!(sink.is_empty());
    }

    #[test]
    fn undefined_reported_once_per_field() {
        let scope = Scope::build(["known"], &BTreeMap::new());
        let text = "{% for x in items %}{{ x ~ known ~ ghost ~ ghost }}{% endfor %}{{ my_func(1) }}";
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        let mut sink = Diagnostics::new();
        check_undefined(&frags, &field, "variables.v", &mut sink);
        let names: Vec<_> = sink.iter().map(|d| d.message.clone()).collect();
        assert_eq!(
            names,
            vec![
                "Undefined reference to 'items'.".to_string(),
                "Undefined reference to 'ghost'.".to_string()
            ]
        );
    }

    #[test]
    fn concatenation_between_block_variables() {
        let block = [
            ("_now", "{{ as_timestamp(now()) | float(0) }}"),
            ("_dur", "{{ 60 * 5 }}"),
            ("_until", "{{ (_now + _dur) | int }}"),
            ("_ok", "{{ (_now | float) - _dur }}"),
        ];
        let mut sink = Diagnostics::new();
        check_concatenation(&block, "action[0].variables", &mut sink);
        assert_eq!(sink.len(), 1);
        let d = sink.iter().next().unwrap();
        assert_eq!(d.path, "action[0].variables._until");
        assert!(d.message.contains("'_now'"));
    }
}
