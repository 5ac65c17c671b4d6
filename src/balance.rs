// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::diagnostics::{Category, Diagnostics};
use crate::lexer::Source;

use lazy_static::lazy_static;
use regex::Regex;

const DELIMITERS: &[(&str, &str, &str)] = &[
    ("{{", "}}", "Jinja expressions"),
    ("{%", "%}", "Jinja control blocks"),
    ("{#", "#}", "Jinja comments"),
];

const KEYWORD_PAIRS: &[(&str, &str)] = &[
    ("if", "endif"),
    ("for", "endfor"),
    ("macro", "endmacro"),
    ("call", "endcall"),
    ("filter", "endfilter"),
    ("block", "endblock"),
    ("raw", "endraw"),
];

fn keyword_regex(kw: &str) -> Regex {
    Regex::new(&format!(r"\{{%[-+]?\s*{kw}\b")).expect("invalid keyword pattern")
}

lazy_static! {
    static ref KEYWORD_REGEXES: Vec<(&'static str, &'static str, Regex, Regex)> = KEYWORD_PAIRS
        .iter()
        .map(|(open, close)| (*open, *close, keyword_regex(open), keyword_regex(close)))
        .collect();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Imbalance {
    // Offset of the first closer with nothing open.
    Orphan(usize),
    // Offset of the earliest opener left unclosed.
    Unclosed(usize),
}

// Replay opener and closer offsets in document order.
fn replay(opens: &[usize], closes: &[usize]) -> Option<Imbalance> {
    let mut events: Vec<(usize, bool)> = opens
        .iter()
        .map(|o| (*o, true))
        .chain(closes.iter().map(|c| (*c, false)))
        .collect();
    events.sort();

    let mut stack = vec![];
    for (offset, is_open) in events {
        if is_open {
            stack.push(offset);
        } else if stack.pop().is_none() {
            return Some(Imbalance::Orphan(offset));
        }
    }
    stack.first().map(|o| Imbalance::Unclosed(*o))
}

fn check_delimiters(source: &Source, sink: &mut Diagnostics) {
    let text = source.contents();
    for (open, close, name) in DELIMITERS {
        let opens: Vec<usize> = text.match_indices(open).map(|(i, _)| i).collect();
        let closes: Vec<usize> = text.match_indices(close).map(|(i, _)| i).collect();
        if opens.len() == closes.len() {
            continue;
        }
        let counts = format!(
            "Unbalanced {name}: {open} appears {} times, {close} appears {} times.",
            opens.len(),
            closes.len()
        );
        let message = match replay(&opens, &closes) {
            Some(Imbalance::Orphan(at)) => {
                format!("{counts} Check around line {}.", source.line_of(at))
            }
            Some(Imbalance::Unclosed(at)) => format!(
                "{counts} Missing closing delimiter(s): unclosed '{open}' near line {}.",
                source.line_of(at)
            ),
            None => counts,
        };
        sink.error(Category::Syntax, "", message);
    }
}

fn check_triple_braces(source: &Source, sink: &mut Diagnostics) {
    let text = source.contents();
    if let Some(at) = text.find("{{{") {
        sink.error(
            Category::Syntax,
            "",
            format!(
                "Triple opening brace '{{{{{{' found at line {}. Did you mean '{{{{' \
                 (expression) or '{{%' (control block)?",
                source.line_of(at)
            ),
        );
    }
    if let Some(at) = text.find("}}}") {
        sink.error(
            Category::Syntax,
            "",
            format!(
                "Triple closing brace '}}}}}}' found at line {}. Did you mean '}}}}' \
                 (expression) or '%}}' (control block)?",
                source.line_of(at)
            ),
        );
    }
}

fn check_keyword_pairs(source: &Source, sink: &mut Diagnostics) {
    let text = source.contents();
    for (open, close, open_re, close_re) in KEYWORD_REGEXES.iter() {
        let opens: Vec<usize> = open_re.find_iter(text).map(|m| m.start()).collect();
        let closes: Vec<usize> = close_re.find_iter(text).map(|m| m.start()).collect();
        if opens.len() == closes.len() {
            continue;
        }
        let (n_open, n_close) = (opens.len(), closes.len());
        match replay(&opens, &closes) {
            Some(Imbalance::Orphan(at)) => sink.error(
                Category::Syntax,
                "",
                format!(
                    "Orphan '{{% {close} %}}' at line {}: found {n_close} '{close}' but only \
                     {n_open} '{open}'. Remove the extra '{{% {close} %}}' or add missing \
                     '{{% {open} %}}'.",
                    source.line_of(at)
                ),
            ),
            Some(Imbalance::Unclosed(at)) => sink.error(
                Category::Syntax,
                "",
                format!(
                    "Unclosed '{{% {open} %}}' block: found {n_open} '{open}' but only \
                     {n_close} '{close}'. Missing '{{% {close} %}}' for block starting near \
                     line {}.",
                    source.line_of(at)
                ),
            ),
            None => (),
        }
    }
}

/// Whole-document delimiter and control-block balance.
pub fn check_balance(source: &Source, sink: &mut Diagnostics) {
    check_delimiters(source, sink);
    check_triple_braces(source, sink);
    check_keyword_pairs(source, sink);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(text: &str) -> Vec<String> {
        let source = Source::from_contents("test.yaml".to_string(), text.to_string()).unwrap();
        let mut sink = Diagnostics::new();
        check_balance(&source, &mut sink);
        sink.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn balanced_document() {
        assert!(run("a: \"{{ x }}\"\nb: >\n  {% if y %}{{ y }}{% endif %}\n").is_empty());
    }

    #[test]
    fn unmatched_opener_line() {
        let msgs = run("a: \"{{ x }}\"\nb: \"{{ y\"\nc: \"{{ z }}\"\n");
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("{{ appears 3 times, }} appears 2 times"));
        assert!(msgs[0].ends_with("near line 2."), "{}", msgs[0]);
    }

    #[test]
    fn orphan_closer_line() {
        let msgs = run("a: \"x }}\"\nb: \"{{ y }}\"\n");
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].ends_with("Check around line 1."));
    }

    #[test]
    fn keyword_pairs() {
        let msgs = run("a: >\n  {% if x %}\n  {%- for i in y %}{{ i }}{% endfor %}\n");
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].starts_with("Unclosed '{% if %}' block"));
        assert!(msgs[0].contains("near line 2"));

        let msgs = run("a: \"{% endif %}\"\n");
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].starts_with("Orphan '{% endif %}' at line 1"));
    }

    #[test]
    fn elif_is_not_an_opener() {
        assert!(run("{% if a %}1{% elif b %}2{% else %}3{% endif %}").is_empty());
    }

    #[test]
    fn triple_braces() {
        let msgs = run("a: \"{{{ x }}\"\n");
        assert!(msgs.iter().any(|m| m.starts_with("Triple opening brace '{{{' found at line 1")));
    }
}
