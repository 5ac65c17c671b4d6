// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::diagnostics::{Category, Diagnostics};
use crate::lexer::*;

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

// Objects whose `.attributes` mapping is safe to read directly.
const ATTRIBUTE_OWNERS: &[&str] = &["to_state", "from_state", "trigger"];

/// `state.attributes.x` raises on the read-only attribute mapping at runtime.
pub fn check_attribute_access(fragments: &[Fragment], path: &str, sink: &mut Diagnostics) {
    let mut seen = BTreeSet::new();
    for frag in fragments {
        let t = &frag.tokens;
        for i in 0..t.len().saturating_sub(4) {
            let hit = t[i].kind == TokenKind::Ident
                && t[i + 1].is_punct(".")
                && t[i + 2].is_ident("attributes")
                && t[i + 3].is_punct(".")
                && t[i + 4].kind == TokenKind::Ident;
            if !hit || ATTRIBUTE_OWNERS.contains(&t[i].text) {
                continue;
            }
            let (owner, attr) = (t[i].text, t[i + 4].text);
            if seen.insert((owner, attr)) {
                sink.warning(
                    Category::Templates,
                    path,
                    format!(
                        "Direct attribute access '{owner}.attributes.{attr}' may fail with \
                         ReadOnlyDict error. Consider using state_attr(entity_id, '{attr}') instead."
                    ),
                );
            }
        }
    }
}

/// A bare `true` or `false` line outside any expression renders as a
/// non-empty, and therefore truthy, string.
pub fn check_bare_booleans(text: &str, path: &str, sink: &mut Diagnostics) {
    if !is_templated(text) {
        return;
    }
    let literals: Vec<Region> = scan(text).filter(|r| r.kind == RegionKind::Literal).collect();
    let mut found = BTreeSet::new();
    let mut offset = 0;
    for line in text.split('\n') {
        let start = offset;
        offset += line.len() + 1;

        let word = line.trim();
        if word != "true" && word != "false" {
            continue;
        }
        let at = start + (line.len() - line.trim_start().len());
        let outside = literals.iter().any(|r| r.start <= at && at + word.len() <= r.end);
        if !outside || !found.insert(word) {
            continue;
        }
        let message = match word {
            "true" => "Bare 'true' outputs STRING \"true\", not boolean. Use '{{ true }}' to \
                       output actual boolean. (String \"false\" is truthy, causing subtle bugs \
                       in conditionals.)",
            _ => "Bare 'false' outputs STRING \"false\", not boolean. The string \"false\" is \
                  TRUTHY (non-empty), so '{% if var %}' passes unexpectedly. Use '{{ false }}' \
                  instead.",
        };
        sink.warning(Category::Templates, path, message);
    }
}

lazy_static! {
    static ref INPUT_IN_EXPRESSION: Regex = Regex::new(r"\{\{[^}]*!input").expect("invalid pattern");

    static ref UNSUPPORTED: Vec<(&'static str, Regex)> = [
        ("import math", r"import\s+math"),
        ("math.", r"math\."),
        ("pow(", r"pow\("),
        ("| hypot", r"\|\s*hypot"),
        ("| clip", r"\|\s*clip\b"),
    ]
    .iter()
    .map(|(name, p)| (*name, Regex::new(p).expect("invalid pattern")))
    .collect();

    static ref LIST_METHODS: Vec<(&'static str, &'static str, Regex)> = [
        (".min()", "| min", "min"),
        (".max()", "| max", "max"),
        (".sort()", "| sort", "sort"),
        (".append()", "cannot modify lists in Jinja2", "append"),
        (".extend()", "cannot modify lists in Jinja2", "extend"),
    ]
    .iter()
    .map(|(method, fix, name)| {
        let re = Regex::new(&format!(r"\[[^\]]+\]\.{name}\s*\(")).expect("invalid pattern");
        (*method, *fix, re)
    })
    .collect();
}

/// Checks over the raw document text.
pub fn check_document_text(source: &Source, sink: &mut Diagnostics) {
    let text = source.contents();

    if let Some(m) = INPUT_IN_EXPRESSION.find(text) {
        sink.error(
            Category::Syntax,
            "",
            format!(
                "Found !input tag inside {{{{ }}}} template at line {} - bind to variable first",
                source.line_of(m.start())
            ),
        );
    }

    for (name, re) in UNSUPPORTED.iter() {
        if let Some(m) = re.find(text) {
            sink.warning(
                Category::Templates,
                "",
                format!(
                    "Possible use of unsupported function/filter '{name}' at line {}.",
                    source.line_of(m.start())
                ),
            );
        }
    }

    for (method, fix, re) in LIST_METHODS.iter() {
        if let Some(m) = re.find(text) {
            sink.error(
                Category::Templates,
                "",
                format!(
                    "Python-style list method '{method}' does not work in Jinja2 (line {}). \
                     Use '{fix}' instead.",
                    source.line_of(m.start())
                ),
            );
        }
    }
}
