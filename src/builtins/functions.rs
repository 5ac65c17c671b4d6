// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::typing::Type;

use std::collections::{BTreeSet, HashMap};

// Functions provided by the automation runtime.
const FUNCTIONS: &[&str] = &[
    "states", "is_state", "state_attr", "is_state_attr", "has_value", "expand",
    "device_entities", "area_entities", "area_devices", "integration_entities",
    "label_entities", "floor_areas", "device_attr", "is_device_attr", "device_id",
    "device_name", "area_name", "area_id", "floor_id", "floor_name", "label_id",
    "label_name", "labels", "relative_time", "time_since", "time_until", "timedelta",
    "strptime", "strftime", "as_timestamp", "as_datetime", "as_local", "as_timedelta",
    "today_at", "now", "utcnow", "distance", "closest", "iif", "log", "sin", "cos", "tan",
    "asin", "acos", "atan", "atan2", "sqrt", "average", "median", "statistical_mode", "min",
    "max", "float", "int", "bool", "str", "pack", "unpack", "ord", "base64_encode",
    "base64_decode", "slugify", "regex_match", "regex_search", "regex_replace",
    "regex_findall", "regex_findall_index", "urlencode", "from_json", "to_json", "zip",
    "merge_response", "state_translated", "is_hidden_entity", "config_entry_id",
    "config_entry_attr",
];

/// Accessors that return the state as a string.
pub const STRING_ACCESSORS: &[&str] = &["states", "state_attr"];

pub fn register(s: &mut BTreeSet<&'static str>) {
    s.extend(FUNCTIONS);
}

pub fn register_types(m: &mut HashMap<&'static str, Type>) {
    m.insert("states", Type::String);
    m.insert("state_attr", Type::String);
    m.insert("state_translated", Type::String);
    m.insert("area_name", Type::String);
    m.insert("device_name", Type::String);
    m.insert("relative_time", Type::String);
    m.insert("slugify", Type::String);
    m.insert("str", Type::String);

    m.insert("is_state", Type::Boolean);
    m.insert("is_state_attr", Type::Boolean);
    m.insert("has_value", Type::Boolean);
    m.insert("bool", Type::Boolean);

    m.insert("float", Type::Number);
    m.insert("int", Type::Number);
    m.insert("as_timestamp", Type::Number);
    m.insert("distance", Type::Number);
    m.insert("log", Type::Number);
    m.insert("sqrt", Type::Number);
    m.insert("sin", Type::Number);
    m.insert("cos", Type::Number);
    m.insert("tan", Type::Number);
    m.insert("asin", Type::Number);
    m.insert("acos", Type::Number);
    m.insert("atan", Type::Number);
    m.insert("atan2", Type::Number);
    m.insert("average", Type::Number);
    m.insert("median", Type::Number);

    m.insert("expand", Type::List);
    m.insert("device_entities", Type::List);
    m.insert("area_entities", Type::List);
    m.insert("integration_entities", Type::List);
    m.insert("label_entities", Type::List);
    m.insert("range", Type::List);
    m.insert("zip", Type::List);
}
