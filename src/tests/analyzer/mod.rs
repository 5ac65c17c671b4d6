// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::indexing_slicing
)] // analyzer tests rely on asserts and panics

use crate::*;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use test_generator::test_resources;

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct TestCase {
    note: String,
    document: String,
    // Only diagnostics in these categories are compared. All when absent.
    #[serde(default)]
    categories: Option<Vec<Category>>,
    // Each entry must be a prefix of the diagnostic at the same position,
    // rendered as `path: message`.
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Debug)]
struct YamlTest {
    cases: Vec<TestCase>,
}

fn rendered<'a>(items: impl Iterator<Item = &'a Diagnostic>, case: &TestCase) -> Vec<String> {
    items
        .filter(|d| {
            case.categories
                .as_ref()
                .map_or(true, |c| c.contains(&d.category))
        })
        .map(|d| d.to_string())
        .collect()
}

fn match_diagnostics(kind: &str, computed: &[String], expected: &[String]) -> Result<()> {
    let ok = computed.len() == expected.len()
        && computed
            .iter()
            .zip(expected.iter())
            .all(|(c, e)| c.starts_with(e.as_str()));
    if !ok {
        let computed = computed.join("\n");
        let expected = expected.join("\n");
        bail!(
            "{kind} mismatch\nexpected:\n{expected}\ncomputed:\n{computed}\ndiff:\n{}",
            prettydiff::diff_chars(&expected, &computed)
        );
    }
    Ok(())
}

fn analyze(case: &TestCase) -> Result<()> {
    let engine = Engine::new();
    let report = engine.validate_str(&case.note, case.document.as_str());

    // Analysis has no hidden state.
    let again = engine.validate_str(&case.note, case.document.as_str());
    if report != again {
        bail!("second run produced different diagnostics");
    }

    match_diagnostics("errors", &rendered(report.errors(), case), &case.errors)?;
    match_diagnostics("warnings", &rendered(report.warnings(), case), &case.warnings)
}

fn yaml_test_impl(file: &str) -> Result<()> {
    println!("running {file}");

    let yaml_str = std::fs::read_to_string(file)?;
    let test: YamlTest = serde_yaml::from_str(&yaml_str)?;

    for case in &test.cases {
        print!("case {} ", case.note);
        analyze(case)?;
        println!("passed");
    }

    println!("{} cases passed.", test.cases.len());
    Ok(())
}

fn yaml_test(file: &str) -> Result<()> {
    match yaml_test_impl(file) {
        Ok(_) => Ok(()),
        Err(e) => {
            // If Err is returned, it doesn't always get printed by cargo test.
            // Therefore, panic with the error.
            panic!("{}", e);
        }
    }
}

#[test_resources("tests/analyzer/**/*.yaml")]
fn run(path: &str) {
    yaml_test(path).unwrap()
}
