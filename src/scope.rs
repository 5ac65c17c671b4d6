// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::lexer::*;
use crate::typing::Type;

use core::ops::Range;
use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    // Document-level variable with its position in declaration order.
    Declared { index: usize, hint: Option<Type> },
    Builtin,
    // Byte range of the field in which a `set`/`for`/`macro` binding is visible.
    Local { window: Range<usize> },
}

/// How an identifier occurrence is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Reference,
    Attribute,
    KeywordArg,
    Call,
    Filter,
    Test,
    Binding,
}

/// Names visible to every template of one document.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    declared: IndexMap<String, Option<Type>>,
    // Names supplied by the runtime or configuration; resolve as builtins.
    ambient: BTreeSet<String>,
}

impl Scope {
    pub fn build<I, S>(names: I, hints: &BTreeMap<String, Type>) -> Scope
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let declared = names
            .into_iter()
            .map(|n| {
                let n = n.as_ref();
                (n.to_string(), hints.get(n).cloned())
            })
            .collect();
        Scope {
            declared,
            ambient: BTreeSet::new(),
        }
    }

    pub fn with_ambient<I, S>(mut self, names: I) -> Scope
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ambient
            .extend(names.into_iter().map(|n| n.as_ref().to_string()));
        self
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.declared.get_index_of(name)
    }

    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.declared.keys().map(|k| k.as_str())
    }

    /// Collect the local bindings of one field.
    pub fn field<'s, 'a>(&'s self, fragments: &[Fragment<'a>], len: usize) -> FieldScope<'s, 'a> {
        let mut locals = vec![];
        for frag in fragments.iter().filter(|f| f.is_control()) {
            let start = visible_from(frag);
            for (idx, role) in roles(frag).iter().enumerate() {
                if *role == Some(Role::Binding) {
                    locals.push((frag.tokens[idx].text, start..len));
                }
            }
        }
        FieldScope {
            scope: self,
            locals,
        }
    }

    pub fn is_forward_reference(&self, from_index: usize, symbol: &Symbol) -> bool {
        matches!(symbol, Symbol::Declared { index, .. } if *index > from_index)
    }
}

/// A [`Scope`] extended with the local bindings of one templated field.
#[derive(Debug, Clone)]
pub struct FieldScope<'s, 'a> {
    scope: &'s Scope,
    locals: Vec<(&'a str, Range<usize>)>,
}

impl<'a> FieldScope<'_, 'a> {
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn locals(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.locals.iter().map(|(n, _)| *n)
    }

    /// A local binding shadows a declared variable of the same name from the
    /// binding point to the end of the field.
    pub fn resolve(&self, name: &str, offset: usize) -> Option<Symbol> {
        if let Some((_, window)) = self
            .locals
            .iter()
            .rev()
            .find(|(n, w)| *n == name && w.contains(&offset))
        {
            return Some(Symbol::Local {
                window: window.clone(),
            });
        }
        if let Some((index, _, hint)) = self.scope.declared.get_full(name) {
            return Some(Symbol::Declared {
                index,
                hint: hint.clone(),
            });
        }
        if builtins::is_builtin(name) || self.scope.ambient.contains(name) {
            return Some(Symbol::Builtin);
        }
        None
    }

    pub fn hint(&self, name: &str, offset: usize) -> Option<Type> {
        match self.resolve(name, offset) {
            Some(Symbol::Declared { hint, .. }) => hint,
            _ => None,
        }
    }
}

// Token indices of binding targets in a control fragment.
fn binding_targets(tokens: &[Token]) -> BTreeSet<usize> {
    let mut targets = BTreeSet::new();
    let Some(first) = tokens.first() else {
        return targets;
    };
    match first.text {
        "set" if first.kind == TokenKind::Ident => {
            // `set ns.attr = v` assigns into an existing object.
            if tokens.get(2).is_some_and(|t| t.is_punct(".")) {
                return targets;
            }
            for (idx, tok) in tokens.iter().enumerate().skip(1) {
                match tok.kind {
                    TokenKind::Ident => {
                        targets.insert(idx);
                    }
                    TokenKind::Punct if tok.text == "," => (),
                    _ => break,
                }
            }
        }
        "for" if first.kind == TokenKind::Ident => {
            for (idx, tok) in tokens.iter().enumerate().skip(1) {
                if tok.is_ident("in") {
                    break;
                }
                if tok.kind == TokenKind::Ident {
                    targets.insert(idx);
                }
            }
        }
        "macro" if first.kind == TokenKind::Ident => {
            let mut depth = 0;
            for (idx, tok) in tokens.iter().enumerate().skip(1) {
                match tok.text {
                    "(" | "[" => depth += 1,
                    ")" | "]" => depth -= 1,
                    _ if tok.kind != TokenKind::Ident => (),
                    // Parameter names, not default values.
                    _ if depth == 1 => {
                        let prev = &tokens[idx - 1];
                        if prev.is_punct("(") || prev.is_punct(",") {
                            targets.insert(idx);
                        }
                    }
                    _ if idx == 1 => {
                        targets.insert(idx);
                    }
                    _ => (),
                }
            }
        }
        "with" if first.kind == TokenKind::Ident => {
            for (idx, tok) in tokens.iter().enumerate().skip(1) {
                if tok.kind == TokenKind::Ident && tokens.get(idx + 1).is_some_and(|t| t.is_op("="))
                {
                    targets.insert(idx);
                }
            }
        }
        "import" | "from" if first.kind == TokenKind::Ident => {
            let mut after_import = false;
            for (idx, tok) in tokens.iter().enumerate().skip(1) {
                if tok.kind != TokenKind::Ident {
                    continue;
                }
                match tok.text {
                    "import" | "as" => after_import = true,
                    "with" | "without" | "context" => break,
                    _ if after_import || tokens[idx - 1].is_ident("as") => {
                        targets.insert(idx);
                    }
                    _ => (),
                }
            }
        }
        _ => (),
    }
    targets
}

// First offset at which the bindings of a control fragment are visible. The
// statement's own expressions see the outer names, except the filter clause
// of `for x in xs if x`.
fn visible_from(frag: &Fragment) -> usize {
    let tokens = &frag.tokens;
    if tokens.first().is_some_and(|t| t.is_ident("for")) {
        let mut depth = 0i32;
        let mut after_in = false;
        for tok in tokens.iter().skip(1) {
            match tok.text {
                "(" | "[" | "{" if tok.kind == TokenKind::Punct => depth += 1,
                ")" | "]" | "}" if tok.kind == TokenKind::Punct => depth -= 1,
                "in" if tok.kind == TokenKind::Ident => after_in = true,
                "if" if after_in && depth == 0 && tok.kind == TokenKind::Ident => return tok.offset,
                _ => (),
            }
        }
    }
    frag.region.end
}

/// Classify every identifier of a fragment. Non-identifier tokens map to `None`.
pub fn roles(frag: &Fragment) -> Vec<Option<Role>> {
    let tokens = &frag.tokens;
    let targets = match frag.is_control() {
        true => binding_targets(tokens),
        false => BTreeSet::new(),
    };

    let mut depth = 0i32;
    let mut roles = Vec::with_capacity(tokens.len());
    for (idx, tok) in tokens.iter().enumerate() {
        if tok.kind == TokenKind::Punct {
            match tok.text {
                "(" => depth += 1,
                ")" => depth -= 1,
                _ => (),
            }
        }
        if tok.kind != TokenKind::Ident {
            roles.push(None);
            continue;
        }

        let prev = idx.checked_sub(1).and_then(|i| tokens.get(i));
        let next = tokens.get(idx + 1);
        let role = if prev.is_some_and(|p| p.is_punct(".")) {
            Role::Attribute
        } else if targets.contains(&idx) {
            Role::Binding
        } else if prev.is_some_and(|p| p.kind == TokenKind::Pipe) {
            Role::Filter
        } else if prev.is_some_and(|p| p.is_ident("is"))
            || (prev.is_some_and(|p| p.is_ident("not"))
                && idx >= 2
                && tokens[idx - 2].is_ident("is"))
        {
            Role::Test
        } else if depth > 0 && next.is_some_and(|n| n.is_op("=")) {
            Role::KeywordArg
        } else if next.is_some_and(|n| n.is_punct("(")) {
            Role::Call
        } else {
            Role::Reference
        };
        roles.push(Some(role));
    }
    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles_of(text: &str) -> Vec<(String, Role)> {
        let frags = fragments(text);
        let mut out = vec![];
        for frag in &frags {
            for (tok, role) in frag.tokens.iter().zip(roles(frag)) {
                if let Some(role) = role {
                    out.push((tok.text.to_string(), role));
                }
            }
        }
        out
    }

    #[test]
    fn classify_identifiers() {
        let r = roles_of("{{ ns.found | default(x) is number and f(a=b) }}");
        assert_eq!(
            r,
            vec![
                ("ns".to_string(), Role::Reference),
                ("found".to_string(), Role::Attribute),
                ("default".to_string(), Role::Filter),
                ("x".to_string(), Role::Reference),
                ("is".to_string(), Role::Reference),
                ("number".to_string(), Role::Test),
                ("and".to_string(), Role::Reference),
                ("f".to_string(), Role::Call),
                ("a".to_string(), Role::KeywordArg),
                ("b".to_string(), Role::Reference),
            ]
        );
    }

    #[test]
    fn bindings() {
        let r = roles_of("{% for k, v in d.items() %}{% set total = total + v %}{% set ns.x = 1 %}");
        let bound: Vec<_> = r
            .iter()
            .filter(|(_, role)| *role == Role::Binding)
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(bound, vec!["k", "v", "total"]);
    }

    #[test]
    fn macro_parameters() {
        let r = roles_of("{% macro fmt(value, digits=2) %}");
        let bound: Vec<_> = r
            .iter()
            .filter(|(_, role)| *role == Role::Binding)
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(bound, vec!["fmt", "value", "digits"]);
    }

    #[test]
    fn local_shadows_declared_after_binding() {
        let scope = Scope::build(["x", "y"], &BTreeMap::new());
        let text = "{{ x }}{% for x in [1] %}{{ x }}{% endfor %}";
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        assert_eq!(
            field.resolve("x", 3),
            Some(Symbol::Declared {
                index: 0,
                hint: None
            })
        );
        assert!(matches!(field.resolve("x", 30), Some(Symbol::Local { .. })));
        assert_eq!(field.resolve("states", 3), Some(Symbol::Builtin));
        assert_eq!(field.resolve("nope", 3), None);
    }

    #[test]
    fn binding_statement_reads_outer_names() {
        let scope = Scope::build(["a", "b"], &BTreeMap::new());
        let text = "{% for b in b %}{{ b }}{% endfor %}";
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        assert_eq!(
            field.resolve("b", 12),
            Some(Symbol::Declared {
                index: 1,
                hint: None
            })
        );
        assert!(matches!(field.resolve("b", 19), Some(Symbol::Local { .. })));

        let text = "{% set n = n + 1 %}{{ n }}";
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        assert_eq!(field.resolve("n", 11), None);
        assert!(matches!(field.resolve("n", 22), Some(Symbol::Local { .. })));
    }

    #[test]
    fn loop_filter_sees_loop_variable() {
        let scope = Scope::build(["xs"], &BTreeMap::new());
        let text = "{% for x in xs if x > 0 %}{{ x }}{% endfor %}";
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        assert_eq!(field.resolve("x", 7), None);
        assert!(matches!(field.resolve("x", 18), Some(Symbol::Local { .. })));
    }

    #[test]
    fn forward_reference() {
        let scope = Scope::build(["a", "b"], &BTreeMap::new());
        let text = "{{ b }}";
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        let sym = field.resolve("b", 3).unwrap();
        assert!(scope.is_forward_reference(0, &sym));
        assert!(!scope.is_forward_reference(1, &sym));
    }
}
