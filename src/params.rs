// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Misuse of variables bound to entity-typed external parameters.

use crate::diagnostics::{Category, Diagnostics};
use crate::lexer::*;

use std::collections::BTreeSet;

// Whether `tokens[idx..]` reads `name ( arg )`.
fn call_with(tokens: &[&Token], idx: usize, name: &str, arg: &str) -> bool {
    tokens.get(idx).is_some_and(|t| t.is_ident(name))
        && tokens.get(idx + 1).is_some_and(|t| t.is_punct("("))
        && tokens.get(idx + 2).is_some_and(|t| t.is_ident(arg))
        && tokens.get(idx + 3).is_some_and(|t| t.is_punct(")"))
}

/// `input_datetime` states look like `YYYY-MM-DD HH:MM:SS`, which
/// `as_timestamp` cannot parse.
pub fn check_datetime_states(
    fragments: &[Fragment],
    datetime_vars: &BTreeSet<String>,
    path: &str,
    sink: &mut Diagnostics,
) {
    let tokens: Vec<&Token> = fragments.iter().flat_map(|f| f.tokens.iter()).collect();
    for var in datetime_vars {
        let direct = (0..tokens.len()).any(|i| {
            tokens[i].is_ident("as_timestamp")
                && tokens.get(i + 1).is_some_and(|t| t.is_punct("("))
                && call_with(&tokens, i + 2, "states", var)
        });
        if direct {
            sink.error(
                Category::Inputs,
                path,
                format!(
                    "as_timestamp(states({var})) won't work for input_datetime entities. \
                     The state format 'YYYY-MM-DD HH:MM:SS' isn't parseable by as_timestamp(). \
                     Use state_attr({var}, 'timestamp') instead to get the Unix timestamp directly."
                ),
            );
        }

        // `state = states(var)` followed by `as_timestamp(state)`.
        let holders: BTreeSet<&str> = (1..tokens.len())
            .filter(|&i| {
                tokens[i].is_op("=")
                    && tokens[i - 1].kind == TokenKind::Ident
                    && call_with(&tokens, i + 1, "states", var)
            })
            .map(|i| tokens[i - 1].text)
            .collect();
        for holder in holders {
            if (0..tokens.len()).any(|i| call_with(&tokens, i, "as_timestamp", holder)) {
                sink.error(
                    Category::Inputs,
                    path,
                    format!(
                        "as_timestamp({holder}) won't work when {holder} is from \
                         states({var}) (an input_datetime). Use state_attr({var}, \
                         'timestamp') instead."
                    ),
                );
            }
        }
    }
}

// `var | string | length`, `var | length`, `var != '...'` or `len(var)`.
fn has_explicit_check(tokens: &[&Token], var: &str) -> bool {
    (0..tokens.len()).any(|i| {
        let at = |n: usize| tokens.get(i + n);
        let piped = |n: usize, f: &str| {
            at(n).is_some_and(|t| t.kind == TokenKind::Pipe) && at(n + 1).is_some_and(|t| t.is_ident(f))
        };
        if call_with(tokens, i, "len", var) {
            return true;
        }
        if !tokens[i].is_ident(var) {
            return false;
        }
        (piped(1, "string") && piped(3, "length"))
            || piped(1, "length")
            || (at(1).is_some_and(|t| t.is_op("!=")) && at(2).is_some_and(|t| t.kind == TokenKind::String))
    })
}

/// An entity id used as a bare `and` operand relies on string truthiness.
pub fn check_entity_booleans(
    fragments: &[Fragment],
    entity_vars: &BTreeSet<String>,
    path: &str,
    sink: &mut Diagnostics,
) {
    let all: Vec<&Token> = fragments.iter().flat_map(|f| f.tokens.iter()).collect();
    for var in entity_vars {
        let bare = fragments.iter().any(|frag| {
            let t = &frag.tokens;
            (1..t.len()).any(|i| {
                t[i - 1].is_ident("and")
                    && t[i].is_ident(var)
                    && t.get(i + 1).map_or(true, |n| n.is_ident("and") || n.is_ident("or"))
            })
        });
        if bare && !has_explicit_check(&all, var) {
            sink.warning(
                Category::Inputs,
                path,
                format!(
                    "Entity ID variable '{var}' used in boolean context without explicit \
                     check. String truthiness can be unreliable. Consider using \
                     '({var} | string | length > 0)' instead of just '{var}'."
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn datetime_state_into_timestamp() {
        let vars = names(&["alarm"]);
        let mut sink = Diagnostics::new();
        check_datetime_states(
            &fragments("{{ as_timestamp(states(alarm)) }}"),
            &vars,
            "variables.t",
            &mut sink,
        );
        assert_eq!(sink.len(), 1);

        let mut sink = Diagnostics::new();
        check_datetime_states(
            &fragments("{% set s = states(alarm) %}{{ as_timestamp(s) }}"),
            &vars,
            "variables.t",
            &mut sink,
        );
        assert_eq!(sink.len(), 1);
        assert!(sink.iter().next().unwrap().message.starts_with("as_timestamp(s)"));

        let mut sink = Diagnostics::new();
        check_datetime_states(
            &fragments("{{ state_attr(alarm, 'timestamp') }}"),
            &vars,
            "variables.t",
            &mut sink,
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn entity_in_boolean_context() {
        let vars = names(&["door"]);
        let run = |text: &str| {
            let mut sink = Diagnostics::new();
            check_entity_booleans(&fragments(text), &vars, "variables.ok", &mut sink);
            sink.len()
        };
        assert_eq!(run("{{ enabled and door }}"), 1);
        assert_eq!(run("{% if enabled and door %}x{% endif %}"), 1);
        assert_eq!(run("{{ enabled and door and other }}"), 1);
        assert_eq!(run("{{ enabled and door | string | length > 0 }}"), 0);
        assert_eq!(run("{{ enabled and (door | length > 0) }}"), 0);
        assert_eq!(run("{{ door != '' and enabled and door }}"), 0);
        assert_eq!(run("{{ enabled and door_count }}"), 0);
    }
}
