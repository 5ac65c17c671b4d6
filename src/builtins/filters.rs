// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::typing::Type;

use std::collections::{BTreeSet, HashMap};

const FILTERS: &[&str] = &[
    "abs", "attr", "batch", "bool", "capitalize", "center", "count", "default", "d",
    "dictsort", "escape", "e", "filesizeformat", "first", "float", "forceescape", "format",
    "groupby", "indent", "int", "items", "join", "last", "length", "list", "lower", "map",
    "max", "min", "pprint", "random", "reject", "rejectattr", "replace", "reverse", "round",
    "safe", "select", "selectattr", "slice", "sort", "split", "string", "striptags", "strip",
    "sum", "title", "tojson", "to_json", "from_json", "trim", "truncate", "unique", "upper",
    "urlencode", "urlize", "wordcount", "wordwrap", "xmlattr", "average", "median",
    "statistical_mode", "slugify", "regex_match", "regex_search", "regex_replace",
    "regex_findall", "regex_findall_index", "base64_encode", "base64_decode", "ord", "pack",
    "unpack", "as_timestamp", "as_datetime", "as_local", "as_timedelta", "timestamp_custom",
    "timestamp_local", "timestamp_utc", "multiply", "add", "contains", "is_defined",
    "iif", "log", "sin", "cos", "tan", "asin", "acos", "atan", "atan2", "sqrt", "bitwise_and",
    "bitwise_or", "bitwise_xor", "md5", "sha1", "sha256", "sha512", "shuffle", "flatten",
    "intersect", "difference", "symmetric_difference", "union", "combine", "typeof",
];

pub fn register(s: &mut BTreeSet<&'static str>) {
    s.extend(FILTERS);
}

pub fn register_types(m: &mut HashMap<&'static str, Type>) {
    for f in [
        "int",
        "float",
        "length",
        "count",
        "round",
        "abs",
        "sum",
        "max",
        "min",
        "average",
        "median",
        "as_timestamp",
        "multiply",
        "log",
        "sqrt",
        "sin",
        "cos",
        "tan",
        "asin",
        "acos",
        "atan",
    ] {
        m.insert(f, Type::Number);
    }
    for f in [
        "string",
        "join",
        "lower",
        "upper",
        "title",
        "capitalize",
        "trim",
        "strip",
        "replace",
        "slugify",
        "tojson",
        "to_json",
        "format",
        "timestamp_custom",
        "timestamp_local",
        "timestamp_utc",
        "regex_replace",
        "urlencode",
        "base64_encode",
    ] {
        m.insert(f, Type::String);
    }
    for f in ["bool", "is_defined", "regex_match", "regex_search", "contains"] {
        m.insert(f, Type::Boolean);
    }
    for f in [
        "list",
        "split",
        "sort",
        "unique",
        "select",
        "reject",
        "selectattr",
        "rejectattr",
        "map",
        "batch",
        "slice",
        "regex_findall",
        "flatten",
    ] {
        m.insert(f, Type::List);
    }
    for f in ["first", "last", "from_json", "default", "random"] {
        m.insert(f, Type::Any);
    }
}
