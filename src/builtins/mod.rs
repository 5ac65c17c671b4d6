// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod filters;
pub mod functions;
pub mod vocabulary;

use crate::typing::Type;

use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;

#[rustfmt::skip]
lazy_static! {
    /// Every name a template can use without declaring it.
    pub static ref BUILTINS: BTreeSet<&'static str> = {
	let mut s : BTreeSet<&'static str> = BTreeSet::new();

	vocabulary::register(&mut s);
	filters::register(&mut s);
	functions::register(&mut s);

	s
    };

    /// Result type of filters whose effect on the value type is known.
    pub static ref FILTER_TYPES: HashMap<&'static str, Type> = {
	let mut m : HashMap<&'static str, Type> = HashMap::new();
	filters::register_types(&mut m);
	m
    };

    /// Result type of functions whose return type is known.
    pub static ref CALL_TYPES: HashMap<&'static str, Type> = {
	let mut m : HashMap<&'static str, Type> = HashMap::new();
	functions::register_types(&mut m);
	m
    };
}

/// Filters that only make sense on strings.
pub const STRING_ONLY_FILTERS: &[&str] = &[
    "lower",
    "upper",
    "capitalize",
    "title",
    "split",
    "replace",
    "strip",
    "trim",
];

/// Filters that only make sense on numbers.
pub const NUMERIC_ONLY_FILTERS: &[&str] = &["round", "abs"];

/// Filters converting their input to a number.
pub const CONVERSION_FILTERS: &[&str] = &["float", "int"];

/// Named constants that are never zero.
pub const NONZERO_CONSTANTS: &[&str] = &["pi", "e", "tau"];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(name)
}

pub fn is_keyword(name: &str) -> bool {
    vocabulary::KEYWORDS.contains(&name)
}

pub fn filter_output(name: &str) -> Option<Type> {
    FILTER_TYPES.get(name).cloned()
}

pub fn call_output(name: &str) -> Option<Type> {
    CALL_TYPES.get(name).cloned()
}

/// Accessors whose result is a state string regardless of the entity.
pub fn is_string_accessor(name: &str) -> bool {
    functions::STRING_ACCESSORS.contains(&name)
}
