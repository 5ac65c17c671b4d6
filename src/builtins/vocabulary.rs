// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeSet;

/// Reserved words of the template language.
pub const KEYWORDS: &[&str] = &[
    "true", "false", "none", "True", "False", "None", "if", "else", "elif", "endif", "for",
    "endfor", "in", "not", "and", "or", "is", "set", "endset", "macro", "endmacro", "call",
    "endcall", "filter", "endfilter", "block", "endblock", "extends", "include", "import",
    "from", "as", "with", "endwith", "without", "context", "do", "continue", "break", "raw",
    "endraw", "recursive", "ignore", "missing",
];

// Names usable after `is`.
const TESTS: &[&str] = &[
    "defined", "undefined", "number", "string", "mapping", "iterable", "callable", "sequence",
    "sameas", "escaped", "even", "odd", "divisibleby", "lower", "upper", "boolean", "integer",
    "float", "list", "datetime", "match", "search", "eq", "ne", "lt", "gt", "le", "ge",
    "equalto", "greaterthan", "lessthan", "has_value", "is_state", "is_state_attr",
];

const CONSTANTS: &[&str] = &["e", "pi", "tau", "inf"];

// Names available inside loops and the automation run.
const RUNTIME_NAMES: &[&str] = &[
    "item", "loop", "index", "index0", "revindex", "revindex0", "first", "last", "length",
    "cycle", "depth", "depth0", "previtem", "nextitem", "changed", "trigger", "this",
    "context", "repeat", "wait", "value", "value_json", "namespace", "range", "dict",
    "lipsum", "joiner", "self", "caller", "varargs", "kwargs",
];

pub fn register(s: &mut BTreeSet<&'static str>) {
    s.extend(KEYWORDS);
    s.extend(TESTS);
    s.extend(CONSTANTS);
    s.extend(RUNTIME_NAMES);
}
