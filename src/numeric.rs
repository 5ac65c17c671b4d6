// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::diagnostics::{Category, Diagnostics};
use crate::lexer::*;
use crate::typing::matching;

use std::collections::{BTreeMap, BTreeSet};

/// Facts that make an operand statically safe.
#[derive(Debug, Clone, Default)]
pub struct GuardPolicy {
    pub nonzero_constants: BTreeSet<String>,
    // Declared variables whose template converts with a positive default.
    pub nonzero_defaults: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Guard {
    Cmp(&'static str, f64),
    NotNone,
    IsNumber,
}

fn normalize(op: &str) -> Option<&'static str> {
    Some(match op {
        ">" => ">",
        ">=" => ">=",
        "<" => "<",
        "<=" => "<=",
        "==" => "==",
        "!=" => "!=",
        _ => return None,
    })
}

fn flip(op: &'static str) -> &'static str {
    match op {
        ">" => "<",
        ">=" => "<=",
        "<" => ">",
        "<=" => ">=",
        op => op,
    }
}

// Numeric value of a literal at `idx`, with an optional leading minus.
fn literal_at(tokens: &[&Token], idx: usize) -> Option<(f64, usize)> {
    match tokens.get(idx) {
        Some(t) if t.is_op("-") => tokens
            .get(idx + 1)
            .and_then(|n| n.number())
            .map(|n| (-n, idx + 2)),
        Some(t) => t.number().map(|n| (n, idx + 1)),
        None => None,
    }
}

fn literal_value(tokens: &[&Token]) -> Option<f64> {
    match literal_at(tokens, 0) {
        Some((n, end)) if end == tokens.len() => Some(n),
        _ => None,
    }
}

// Skip `| filter(args)` stages following an operand.
fn skip_filters(tokens: &[&Token], mut idx: usize) -> usize {
    while tokens.get(idx).is_some_and(|t| t.kind == TokenKind::Pipe) {
        idx += 2;
        if tokens.get(idx).is_some_and(|t| t.is_punct("(")) {
            match close_of(tokens, idx) {
                Some(close) => idx = close + 1,
                None => return tokens.len(),
            }
        }
    }
    idx
}

fn close_of(tokens: &[&Token], open: usize) -> Option<usize> {
    let mut depth = 0;
    for (idx, tok) in tokens.iter().enumerate().skip(open) {
        if tok.kind != TokenKind::Punct {
            continue;
        }
        match tok.text {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => (),
        }
    }
    None
}

fn comparison_at(tokens: &[&Token], idx: usize) -> Option<Guard> {
    let tok = tokens.get(idx)?;
    if tok.kind == TokenKind::Operator {
        let op = normalize(tok.text)?;
        if let Some((n, _)) = literal_at(tokens, idx + 1) {
            return Some(Guard::Cmp(op, n));
        }
        let next = tokens.get(idx + 1)?;
        if op == "!=" && (next.is_ident("none") || next.is_ident("None")) {
            return Some(Guard::NotNone);
        }
        return None;
    }
    if tok.is_ident("is") {
        let next = tokens.get(idx + 1)?;
        if next.is_ident("number") {
            return Some(Guard::IsNumber);
        }
        if next.is_ident("not")
            && tokens
                .get(idx + 2)
                .is_some_and(|t| t.is_ident("none") || t.is_ident("None"))
        {
            return Some(Guard::NotNone);
        }
    }
    None
}

// Every comparison or test the field applies to `name`.
fn guards_for(tokens: &[&Token], name: &str) -> Vec<Guard> {
    let mut guards = vec![];
    for (idx, tok) in tokens.iter().enumerate() {
        if !tok.is_ident(name) || (idx > 0 && tokens[idx - 1].is_punct(".")) {
            continue;
        }
        if let Some(g) = comparison_at(tokens, skip_filters(tokens, idx + 1)) {
            guards.push(g);
        }
        // `(name - 1) > 0`
        if idx > 0 && tokens[idx - 1].is_punct("(") {
            if let Some(close) = close_of(tokens, idx - 1) {
                if let Some(g) = comparison_at(tokens, skip_filters(tokens, close + 1)) {
                    guards.push(g);
                }
            }
        }
        // `0 < name`
        if idx >= 2 && tokens[idx - 1].kind == TokenKind::Operator {
            if let (Some(op), Some(n)) = (normalize(tokens[idx - 1].text), tokens[idx - 2].number())
            {
                guards.push(Guard::Cmp(flip(op), n));
            }
        }
    }
    guards
}

fn nonzero_guard(g: &Guard) -> bool {
    match *g {
        Guard::Cmp(">", n) => n >= 0.0,
        Guard::Cmp(">=", n) => n > 0.0,
        // Early-return and explicit zero checks.
        Guard::Cmp("!=" | "==" | "<=", n) => n == 0.0,
        Guard::Cmp(_, _) => false,
        Guard::NotNone | Guard::IsNumber => true,
    }
}

fn positive_guard(g: &Guard) -> bool {
    match *g {
        Guard::Cmp(">", n) => n >= 0.0,
        Guard::Cmp(">=", n) => n > 0.0,
        Guard::IsNumber => true,
        _ => false,
    }
}

fn nonnegative_guard(g: &Guard) -> bool {
    matches!(*g, Guard::Cmp(">" | ">=", n) if n >= 0.0)
}

// Right-hand sides of `set name = ...`, first binding wins.
fn set_sources<'t, 'a>(fragments: &'t [Fragment<'a>]) -> BTreeMap<&'a str, Vec<&'t Token<'a>>> {
    let mut sources = BTreeMap::new();
    for frag in fragments.iter().filter(|f| f.is_control()) {
        let t = &frag.tokens;
        if t.len() > 3
            && t[0].is_ident("set")
            && t[1].kind == TokenKind::Ident
            && t[2].is_op("=")
        {
            sources
                .entry(t[1].text)
                .or_insert_with(|| t[3..].iter().collect());
        }
    }
    sources
}

// Split call arguments at top-level commas.
fn arguments<'t, 'a>(tokens: &[&'t Token<'a>]) -> Vec<Vec<&'t Token<'a>>> {
    let mut args = vec![vec![]];
    let mut depth = 0;
    for tok in tokens {
        if tok.kind == TokenKind::Punct {
            match tok.text {
                "(" | "[" | "{" => depth += 1,
                ")" | "]" | "}" => depth -= 1,
                "," if depth == 0 => {
                    args.push(vec![]);
                    continue;
                }
                _ => (),
            }
        }
        if let Some(last) = args.last_mut() {
            last.push(*tok);
        }
    }
    args
}

// Arguments of `tokens` when it is exactly one call to `name`.
fn call_args<'t, 'a>(tokens: &[&'t Token<'a>], names: &[&str]) -> Option<(&'a str, Vec<Vec<&'t Token<'a>>>)> {
    let first = tokens.first()?;
    if first.kind != TokenKind::Ident || !names.contains(&first.text) {
        return None;
    }
    if !tokens.get(1).is_some_and(|t| t.is_punct("(")) || close_of(tokens, 1)? != tokens.len() - 1 {
        return None;
    }
    Some((first.text, arguments(&tokens[2..tokens.len() - 1])))
}

fn has_literal(args: &[Vec<&Token>], pred: impl Fn(f64) -> bool) -> bool {
    args.iter().any(|a| literal_value(a).is_some_and(&pred))
}

// `max(-1, min(1, x))` or `min(1, max(-1, x))`, operands in any order.
fn is_clamp(tokens: &[&Token]) -> bool {
    let Some((outer, args)) = call_args(tokens, &["max", "min"]) else {
        return false;
    };
    let (bound, inner_name, inner_bound) = match outer {
        "max" => (-1.0, "min", 1.0),
        _ => (1.0, "max", -1.0),
    };
    has_literal(&args, |n| n == bound)
        && args.iter().any(|a| {
            call_args(a, &[inner_name])
                .is_some_and(|(_, inner)| has_literal(&inner, |n| n == inner_bound))
        })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Domain {
    Log,
    Sqrt,
    Unit,
}

impl Domain {
    fn literal_ok(&self, n: f64) -> bool {
        match self {
            Domain::Log => n > 0.0,
            Domain::Sqrt => n >= 0.0,
            Domain::Unit => (-1.0..=1.0).contains(&n),
        }
    }

    fn wrapped(&self, tokens: &[&Token]) -> bool {
        match self {
            Domain::Log => call_args(tokens, &["max"]).is_some_and(|(_, a)| has_literal(&a, |n| n > 0.0)),
            Domain::Sqrt => {
                call_args(tokens, &["abs"]).is_some()
                    || call_args(tokens, &["max"]).is_some_and(|(_, a)| has_literal(&a, |n| n >= 0.0))
            }
            Domain::Unit => is_clamp(tokens),
        }
    }

    fn guarded(&self, g: &Guard) -> bool {
        match self {
            Domain::Log => positive_guard(g),
            Domain::Sqrt => nonnegative_guard(g),
            Domain::Unit => false,
        }
    }
}

// First identifier of an operand that is a plain reference.
fn operand_name<'a>(tokens: &[&Token<'a>]) -> Option<&'a str> {
    tokens.iter().enumerate().find_map(|(idx, t)| {
        let prev = idx.checked_sub(1).map(|i| tokens[i]);
        let plain = t.kind == TokenKind::Ident
            && !crate::builtins::is_keyword(t.text)
            && !tokens.get(idx + 1).is_some_and(|n| n.is_punct("("))
            && !prev.is_some_and(|p| p.is_punct(".") || p.kind == TokenKind::Pipe);
        plain.then_some(t.text)
    })
}

fn render(tokens: &[&Token]) -> String {
    let mut out = String::new();
    for (idx, tok) in tokens.iter().enumerate() {
        let tight = idx == 0
            || matches!(tok.text, "(" | ")" | "," | "." | "]" | "[")
            || tokens[idx - 1].is_punct("(")
            || tokens[idx - 1].is_punct(".")
            || tokens[idx - 1].is_punct("[");
        if !tight {
            out.push(' ');
        }
        out.push_str(tok.text);
        if tok.is_punct(",") {
            out.push(' ');
        }
    }
    out
}

struct Checker<'p, 'f, 'a> {
    policy: &'p GuardPolicy,
    all: Vec<&'f Token<'a>>,
    sets: BTreeMap<&'a str, Vec<&'f Token<'a>>>,
    seen: BTreeSet<(String, String)>,
}

impl<'a> Checker<'_, '_, 'a> {
    fn has_positive_default(&self, name: &str) -> bool {
        let t = &self.all;
        (0..t.len()).any(|i| {
            t[i].is_ident(name)
                && t.get(i + 1).is_some_and(|p| p.kind == TokenKind::Pipe)
                && t.get(i + 2).is_some_and(|f| f.is_ident("float") || f.is_ident("int"))
                && t.get(i + 3).is_some_and(|p| p.is_punct("("))
                && t.get(i + 4).and_then(|n| n.number()).is_some_and(|n| n > 0.0)
        })
    }

    fn guarded_by(&self, name: &str, pred: impl Fn(&Guard) -> bool) -> bool {
        guards_for(&self.all, name).iter().any(pred)
    }

    fn divisor_exempt(&self, name: &str) -> bool {
        if self.policy.nonzero_constants.contains(name) || self.policy.nonzero_defaults.contains(name) {
            return true;
        }
        if let Some(source) = self.sets.get(name) {
            if source.first().is_some_and(|t| t.kind == TokenKind::Number)
                && source.get(1).is_some_and(|t| t.is_op("+"))
            {
                return true;
            }
            if literal_value(source).is_some_and(|n| n != 0.0) {
                return true;
            }
            let idents: Vec<&str> = source
                .iter()
                .enumerate()
                .filter(|(i, t)| {
                    t.kind == TokenKind::Ident
                        && !crate::builtins::is_keyword(t.text)
                        && !(*i > 0 && (source[i - 1].is_punct(".") || source[i - 1].kind == TokenKind::Pipe))
                })
                .map(|(_, t)| t.text)
                .collect();
            if !idents.is_empty()
                && idents
                    .iter()
                    .all(|v| self.guarded_by(v, |g| *g == Guard::IsNumber))
            {
                return true;
            }
        }
        self.has_positive_default(name) || self.guarded_by(name, nonzero_guard)
    }

    fn check_divisor(&mut self, tokens: &[Token<'a>], op: usize, path: &str, sink: &mut Diagnostics) {
        // `'%s' % value` is string formatting.
        if op > 0 && tokens[op - 1].kind == TokenKind::String {
            return;
        }
        let kind = match tokens[op].text {
            "%" => "Modulo",
            _ => "Division",
        };
        let mut idx = op + 1;
        while tokens.get(idx).is_some_and(|t| t.is_punct("(")) {
            idx += 1;
        }
        let Some(operand) = tokens.get(idx) else {
            return;
        };
        match operand.kind {
            TokenKind::Number if operand.number() == Some(0.0) => {
                if self.seen.insert((kind.to_string(), "0".to_string())) {
                    sink.warning(
                        Category::Templates,
                        path,
                        format!("{kind} by a literal zero always fails."),
                    );
                }
            }
            TokenKind::Ident => {
                let name = operand.text;
                if tokens.get(idx + 1).is_some_and(|t| t.is_punct("(")) {
                    return;
                }
                if self.divisor_exempt(name)
                    || !self.seen.insert((kind.to_string(), name.to_string()))
                {
                    return;
                }
                let advice = match kind {
                    "Modulo" => format!("Add a guard such as 'if {name} != 0'."),
                    _ => format!(
                        "Add a guard such as 'if {name} != 0' or a non-zero default like '| float(1)'."
                    ),
                };
                sink.warning(
                    Category::Templates,
                    path,
                    format!("{kind} by '{name}' may fail if it is zero or not a number. {advice}"),
                );
            }
            _ => (),
        }
    }

    fn check_domain(&mut self, func: &str, domain: Domain, arg: &[&Token<'a>], path: &str, sink: &mut Diagnostics) {
        if arg.is_empty() {
            return;
        }
        if let Some(n) = literal_value(arg) {
            if domain.literal_ok(n) {
                return;
            }
        } else if domain.wrapped(arg) {
            return;
        }
        let name = operand_name(arg);
        if let Some(name) = name {
            if domain != Domain::Unit && self.policy.nonzero_constants.contains(name) {
                return;
            }
            if let Some(source) = self.sets.get(name) {
                if domain.wrapped(source) {
                    return;
                }
            }
            if self.guarded_by(name, |g| domain.guarded(g)) {
                return;
            }
        }

        let text = render(arg);
        if !self.seen.insert((func.to_string(), text.clone())) {
            return;
        }
        let var = name.unwrap_or("x");
        let message = match domain {
            Domain::Log => format!(
                "{func}({text}) may fail if the argument is not positive. Add a guard such as 'if {var} > 0'."
            ),
            Domain::Sqrt => format!(
                "{func}({text}) may fail if the argument is negative. Use 'sqrt(max(0, {var}))' or guard with 'if {var} >= 0'."
            ),
            Domain::Unit => format!(
                "{func}({text}) requires an argument in [-1, 1]. Clamp it with '{func}(max(-1, min(1, {var})))'."
            ),
        };
        sink.warning(Category::Templates, path, message);
    }
}

/// Warn about division, modulo, `log`, `sqrt`, `asin` and `acos` whose
/// operand is neither statically safe nor guarded anywhere in the field.
pub fn check_guards(fragments: &[Fragment], policy: &GuardPolicy, path: &str, sink: &mut Diagnostics) {
    let mut checker = Checker {
        policy,
        all: fragments.iter().flat_map(|f| f.tokens.iter()).collect(),
        sets: set_sources(fragments),
        seen: BTreeSet::new(),
    };

    for frag in fragments {
        let tokens = &frag.tokens;
        for (idx, tok) in tokens.iter().enumerate() {
            if tok.kind == TokenKind::Operator && matches!(tok.text, "/" | "//" | "%") {
                checker.check_divisor(tokens, idx, path, sink);
                continue;
            }
            if tok.kind != TokenKind::Ident || (idx > 0 && tokens[idx - 1].is_punct(".")) {
                continue;
            }
            let domain = match tok.text {
                "log" => Domain::Log,
                "sqrt" => Domain::Sqrt,
                "asin" | "acos" => Domain::Unit,
                _ => continue,
            };
            let refs: Vec<&Token> = tokens.iter().collect();
            if tokens.get(idx + 1).is_some_and(|t| t.is_punct("(")) {
                let Some(close) = matching(tokens, idx + 1) else {
                    continue;
                };
                let args = arguments(&refs[idx + 2..close]);
                if let Some(first) = args.first() {
                    checker.check_domain(tok.text, domain, first, path, sink);
                }
            } else if idx > 0 && tokens[idx - 1].kind == TokenKind::Pipe {
                // Filter form: `x | log`.
                let start = crate::typing::head_start(tokens, idx - 1);
                checker.check_domain(tok.text, domain, &refs[start..idx - 1], path, sink);
            }
        }
    }
}
