// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::builtins;
use crate::diagnostics::{Category, Diagnostics};
use crate::lexer::*;
use crate::scope::FieldScope;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Coarse value type propagated through filter pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Number,
    String,
    Boolean,
    List,
    Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage<'a> {
    pub filter: &'a str,
    pub offset: usize,
    pub input: Type,
    pub output: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline<'a> {
    pub head: &'a str,
    pub head_type: Type,
    // Set when the head is a call to an accessor returning a state string.
    pub accessor: Option<&'a str>,
    pub stages: Vec<Stage<'a>>,
}

fn is_opener(t: &Token) -> bool {
    t.kind == TokenKind::Punct && matches!(t.text, "(" | "[" | "{")
}

fn is_closer(t: &Token) -> bool {
    t.kind == TokenKind::Punct && matches!(t.text, ")" | "]" | "}")
}

// Index of the token closing the group opened at `open`.
pub(crate) fn matching(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0;
    for (idx, tok) in tokens.iter().enumerate().skip(open) {
        if is_opener(tok) {
            depth += 1;
        } else if is_closer(tok) {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

// First token of the operand a pipe at `pipe` applies to.
pub(crate) fn head_start(tokens: &[Token], pipe: usize) -> usize {
    let mut depth = 0;
    let mut idx = pipe;
    while idx > 0 {
        let tok = &tokens[idx - 1];
        if is_closer(tok) {
            depth += 1;
        } else if is_opener(tok) {
            if depth == 0 {
                break;
            }
            depth -= 1;
        } else if depth == 0 {
            let boundary = match tok.kind {
                TokenKind::Operator => true,
                TokenKind::Punct => matches!(tok.text, "," | ":"),
                TokenKind::Ident => {
                    builtins::is_keyword(tok.text)
                        && !matches!(tok.text, "true" | "false" | "none" | "True" | "False" | "None")
                }
                _ => false,
            };
            if boundary {
                break;
            }
        }
        idx -= 1;
    }
    idx
}

fn top_level<'t, 'a>(tokens: &'t [Token<'a>]) -> impl Iterator<Item = &'t Token<'a>> {
    let mut depth = 0i32;
    tokens.iter().filter(move |t| {
        if is_opener(t) {
            depth += 1;
            return false;
        }
        if is_closer(t) {
            depth -= 1;
            return false;
        }
        depth == 0
    })
}

fn infer_expr(tokens: &[Token], field: &FieldScope) -> Type {
    if tokens.is_empty() {
        return Type::Any;
    }
    let top: Vec<&Token> = top_level(tokens).collect();
    let has_op = |ops: &[&str]| {
        top.iter()
            .any(|t| t.kind == TokenKind::Operator && ops.contains(&t.text))
    };
    let has_word = |words: &[&str]| {
        top.iter()
            .any(|t| t.kind == TokenKind::Ident && words.contains(&t.text))
    };

    if has_word(&["if"]) {
        return Type::Any;
    }
    if has_op(&["==", "!=", "<", ">", "<=", ">="]) || has_word(&["and", "or", "not", "is", "in"])
    {
        return Type::Boolean;
    }
    if has_op(&["~"]) {
        return Type::String;
    }
    // The minus of a negative literal is unary.
    let binary_minus = top
        .iter()
        .enumerate()
        .any(|(i, t)| t.is_op("-") && i > 0 && top[i - 1].kind != TokenKind::Operator);
    if has_op(&["*", "/", "//", "%", "**"]) || binary_minus {
        return Type::Number;
    }
    if has_op(&["+"]) {
        let numeric = top.iter().any(|t| t.kind == TokenKind::Number);
        return match numeric {
            true => Type::Number,
            false => Type::Any,
        };
    }
    if let Some(pipe) = tokens.iter().rposition(|t| t.kind == TokenKind::Pipe) {
        if top.iter().any(|t| t.kind == TokenKind::Pipe) {
            let name = tokens.get(pipe + 1).map(|t| t.text).unwrap_or_default();
            return builtins::filter_output(name).unwrap_or(Type::Any);
        }
    }
    infer_primary(tokens, field)
}

fn infer_primary(tokens: &[Token], field: &FieldScope) -> Type {
    let first = &tokens[0];
    let whole_group = |open: usize| matching(tokens, open) == Some(tokens.len() - 1);
    match first.kind {
        TokenKind::Operator if first.text == "-" && tokens.len() == 2 => {
            match tokens[1].kind {
                TokenKind::Number => Type::Number,
                _ => Type::Any,
            }
        }
        TokenKind::Number if tokens.len() == 1 => Type::Number,
        TokenKind::String if tokens.len() == 1 => Type::String,
        TokenKind::Punct if first.text == "[" && whole_group(0) => Type::List,
        TokenKind::Punct if first.text == "(" && whole_group(0) => {
            infer_expr(&tokens[1..tokens.len() - 1], field)
        }
        TokenKind::Ident if tokens.len() == 1 => match first.text {
            "true" | "false" | "True" | "False" => Type::Boolean,
            name if builtins::NONZERO_CONSTANTS.contains(&name) || name == "inf" => {
                match field.resolve(name, first.offset) {
                    Some(crate::scope::Symbol::Builtin) => Type::Number,
                    _ => field.hint(name, first.offset).unwrap_or(Type::Any),
                }
            }
            name => field.hint(name, first.offset).unwrap_or(Type::Any),
        },
        TokenKind::Ident if tokens.len() > 2 && tokens[1].is_punct("(") && whole_group(1) => {
            builtins::call_output(first.text).unwrap_or(Type::Any)
        }
        _ => Type::Any,
    }
}

fn string_accessor<'a>(head: &[Token<'a>]) -> Option<&'a str> {
    let first = head.first()?;
    let call = first.kind == TokenKind::Ident
        && builtins::is_string_accessor(first.text)
        && head.get(1).is_some_and(|t| t.is_punct("("))
        && matching(head, 1) == Some(head.len() - 1);
    call.then_some(first.text)
}

fn span_text<'a>(text: &'a str, tokens: &[Token]) -> &'a str {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => text
            .get(first.offset..last.offset + last.text.len())
            .unwrap_or_default(),
        _ => "",
    }
}

/// Walk every `expr | f1 | f2 ...` chain of a field, propagating types left to right.
pub fn infer_pipeline_types<'a>(
    text: &'a str,
    fragments: &[Fragment<'a>],
    field: &FieldScope,
) -> Vec<Pipeline<'a>> {
    let mut pipelines = vec![];
    for frag in fragments {
        let tokens = &frag.tokens;
        let mut consumed = BTreeSet::new();
        for (idx, tok) in tokens.iter().enumerate() {
            if tok.kind != TokenKind::Pipe || consumed.contains(&idx) {
                continue;
            }
            let start = head_start(tokens, idx);
            let head = &tokens[start..idx];
            let head_type = infer_expr(head, field);
            let mut pipeline = Pipeline {
                head: span_text(text, head),
                head_type,
                accessor: string_accessor(head),
                stages: vec![],
            };

            let mut input = head_type;
            let mut pipe = idx;
            while tokens.get(pipe).is_some_and(|t| t.kind == TokenKind::Pipe) {
                consumed.insert(pipe);
                let Some(name) = tokens.get(pipe + 1).filter(|t| t.kind == TokenKind::Ident)
                else {
                    break;
                };
                let output = builtins::filter_output(name.text).unwrap_or(Type::Any);
                pipeline.stages.push(Stage {
                    filter: name.text,
                    offset: name.offset,
                    input,
                    output,
                });
                input = output;
                pipe += 2;
                if tokens.get(pipe).is_some_and(|t| t.is_punct("(")) {
                    match matching(tokens, pipe) {
                        Some(close) => pipe = close + 1,
                        None => break,
                    }
                }
            }
            pipelines.push(pipeline);
        }
    }
    pipelines
}

/// Flag string-only filters applied to numbers and numeric filters applied
/// to accessor strings.
pub fn check_pipelines(pipelines: &[Pipeline], path: &str, sink: &mut Diagnostics) {
    let mut seen = BTreeSet::new();
    for pipeline in pipelines {
        for (idx, stage) in pipeline.stages.iter().enumerate() {
            if stage.input == Type::Number
                && builtins::STRING_ONLY_FILTERS.contains(&stage.filter)
                && seen.insert(("string", stage.filter))
            {
                let source = match idx {
                    0 => format!("'{}'", pipeline.head),
                    _ => format!("filter '{}'", pipeline.stages[idx - 1].filter),
                };
                sink.warning(
                    Category::Templates,
                    path,
                    format!(
                        "Filter '{f}' expects a string but {source} produces a number. \
                         Add '| string' before '| {f}'.",
                        f = stage.filter
                    ),
                );
            }

            if let Some(accessor) = pipeline.accessor {
                if stage.input == Type::String
                    && builtins::NUMERIC_ONLY_FILTERS.contains(&stage.filter)
                    && seen.insert(("number", stage.filter))
                {
                    sink.warning(
                        Category::Templates,
                        path,
                        format!(
                            "'{accessor}(...)' returns a string, but '| {f}' expects a number. \
                             Use '| float(0)' before '| {f}'.",
                            f = stage.filter
                        ),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;
    use std::collections::BTreeMap;

    fn run(text: &str, hints: &[(&str, Type)]) -> Diagnostics {
        let hints: BTreeMap<String, Type> =
            hints.iter().map(|(n, t)| (n.to_string(), *t)).collect();
        let scope = Scope::build(hints.keys(), &hints);
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        let pipelines = infer_pipeline_types(text, &frags, &field);
        let mut sink = Diagnostics::new();
        check_pipelines(&pipelines, "variables.v", &mut sink);
        sink
    }

    #[test]
    fn stages_propagate_types() {
        let text = "{{ (a + 1) | round(2) | string | lower }}";
        let scope = Scope::default();
        let frags = fragments(text);
        let field = scope.field(&frags, text.len());
        let p = infer_pipeline_types(text, &frags, &field);
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].head, "(a + 1)");
        let types: Vec<_> = p[0].stages.iter().map(|s| (s.filter, s.input, s.output)).collect();
        assert_eq!(
            types,
            vec![
                ("round", Type::Number, Type::Number),
                ("string", Type::Number, Type::String),
                ("lower", Type::String, Type::String),
            ]
        );
    }

    #[test]
    fn string_filter_after_number() {
        let sink = run("{{ x | float(0) | lower }}", &[]);
        assert_eq!(sink.len(), 1);
        let msg = &sink.iter().next().unwrap().message;
        assert!(msg.contains("Add '| string' before '| lower'"), "{msg}");
    }

    #[test]
    fn declared_hint_seeds_head() {
        assert_eq!(run("{{ level | upper }}", &[("level", Type::Number)]).len(), 1);
        assert_eq!(run("{{ level | upper }}", &[("level", Type::String)]).len(), 0);
    }

    #[test]
    fn accessor_into_round() {
        let sink = run("{{ states('sensor.x') | round }}", &[]);
        assert_eq!(sink.len(), 1);
        assert!(sink.iter().next().unwrap().message.contains("float(0)"));
        assert!(run("{{ states('sensor.x') | float(0) | round }}", &[]).is_empty());
        assert_eq!(run("{{ state_attr('sun.sun', 'elevation') | abs }}", &[]).len(), 1);
    }

    #[test]
    fn unknown_filter_stops_checks() {
        assert!(run("{{ x | int | custom | lower }}", &[]).is_empty());
    }

    #[test]
    fn head_stops_at_operator() {
        // round applies to `b`, not to `a + b`.
        let sink = run("{{ states('a') ~ b | round }}", &[]);
        assert!(sink.is_empty());
    }
}
