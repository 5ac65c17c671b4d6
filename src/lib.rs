// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

// Use README.md as crate documentation.
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod balance;
mod builtins;
mod config;
mod diagnostics;
mod discover;
mod document;
mod engine;
mod lexer;
mod numeric;
mod params;
mod pitfalls;
mod report;
mod scheduler;
mod scope;
mod structure;
mod typing;
mod value;

pub use config::{Config, ConfigError};
pub use diagnostics::{Category, Diagnostic, Diagnostics, Severity};
pub use discover::find_blueprints;
pub use document::{Document, LoadError};
pub use engine::Engine;
pub use report::{Report, Summary};
pub use value::Value;

/// Items in `unstable` are likely to change.
pub mod unstable {
    pub use crate::balance::*;
    pub use crate::builtins::*;
    pub use crate::lexer::*;
    pub use crate::numeric::*;
    pub use crate::params::*;
    pub use crate::pitfalls::*;
    pub use crate::scheduler::*;
    pub use crate::scope::*;
    pub use crate::typing::*;
}

#[cfg(test)]
mod tests;
