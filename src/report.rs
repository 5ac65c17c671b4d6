// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::diagnostics::{Diagnostic, Diagnostics, Severity};

use core::fmt::Write;

use anyhow::Result;
use serde::Serialize;

/// Outcome of validating one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub name: String,
    pub diagnostics: Diagnostics,
}

// Shape of a report in JSON output.
#[derive(Serialize)]
struct JsonReport<'a> {
    name: &'a str,
    valid: bool,
    errors: Vec<&'a Diagnostic>,
    warnings: Vec<&'a Diagnostic>,
}

impl Report {
    pub fn new(name: impl Into<String>, diagnostics: Diagnostics) -> Self {
        Self {
            name: name.into(),
            diagnostics,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.errors()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.warnings()
    }

    /// A document is valid when it has no errors. Warnings do not count.
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Errors first, then warnings, then the verdict.
    pub fn render_text(&self) -> String {
        let mut out = format!("Validating: {}\n", self.name);
        for (severity, title) in [(Severity::Error, "ERRORS:"), (Severity::Warning, "WARNINGS:")] {
            let items: Vec<&Diagnostic> = self
                .diagnostics
                .iter()
                .filter(|d| d.severity == severity)
                .collect();
            if items.is_empty() {
                continue;
            }
            let _ = writeln!(out, "\n{title}");
            for d in items {
                let _ = writeln!(out, "  - {d}");
            }
        }

        let errors = self.errors().count();
        let warnings = self.warnings().count();
        let verdict = match (errors, warnings) {
            (0, 0) => "Blueprint is valid!".to_string(),
            (0, w) => format!("Blueprint is valid (with {w} warnings)"),
            (e, _) => format!("Blueprint validation failed with {e} errors"),
        };
        let _ = writeln!(out, "\n{verdict}");
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.json())?)
    }

    fn json(&self) -> JsonReport<'_> {
        JsonReport {
            name: &self.name,
            valid: self.is_valid(),
            errors: self.errors().collect(),
            warnings: self.warnings().collect(),
        }
    }
}

/// Pass/fail tally over a batch of documents.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    results: Vec<(String, bool)>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, report: &Report) {
        self.results.push((report.name.clone(), report.is_valid()));
    }

    /// Record a document that could not be read at all.
    pub fn add_failure(&mut self, name: impl Into<String>) {
        self.results.push((name.into(), false));
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|(_, ok)| *ok).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn render_text(&self) -> String {
        let mut out = String::from("SUMMARY\n");
        for (name, ok) in &self.results {
            let _ = writeln!(out, "  {} {name}", if *ok { "PASS" } else { "FAIL" });
        }
        let _ = writeln!(
            out,
            "\nTotal: {} | Passed: {} | Failed: {}",
            self.total(),
            self.passed(),
            self.failed()
        );
        out
    }

    /// Reports and tally as one JSON document.
    pub fn to_json(&self, reports: &[Report]) -> Result<String> {
        let value = serde_json::json!({
            "reports": reports.iter().map(|r| r.json()).collect::<Vec<_>>(),
            "total": self.total(),
            "passed": self.passed(),
            "failed": self.failed(),
        });
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Category;

    fn sample() -> Report {
        let mut sink = Diagnostics::new();
        sink.warning(Category::Schema, "", "No 'blueprint_version' variable defined");
        sink.error(Category::References, "variables.a", "Undefined reference to 'b'.");
        Report::new("demo.yaml", sink)
    }

    #[test]
    fn text_lists_errors_before_warnings() {
        let text = sample().render_text();
        let errors = text.find("ERRORS:").unwrap();
        let warnings = text.find("WARNINGS:").unwrap();
        assert!(errors < warnings);
        assert!(text.contains("  - variables.a: Undefined reference to 'b'.\n"));
        assert!(text.ends_with("Blueprint validation failed with 1 errors\n"));
    }

    #[test]
    fn valid_with_warnings() {
        let mut sink = Diagnostics::new();
        sink.warning(Category::Schema, "", "No variables section defined");
        let report = Report::new("ok.yaml", sink);
        assert!(report.is_valid());
        assert!(report.render_text().ends_with("Blueprint is valid (with 1 warnings)\n"));
    }

    #[test]
    fn json_shape() {
        let v: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(v["valid"], serde_json::json!(false));
        assert_eq!(v["errors"][0]["category"], "references");
        assert_eq!(v["errors"][0]["path"], "variables.a");
        assert_eq!(v["warnings"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn summary_counts() {
        let mut summary = Summary::new();
        summary.add(&sample());
        summary.add(&Report::new("clean.yaml", Diagnostics::new()));
        assert_eq!((summary.total(), summary.passed(), summary.failed()), (2, 1, 1));
        assert!(!summary.is_success());
        assert!(summary.render_text().ends_with("Total: 2 | Passed: 1 | Failed: 1\n"));
        assert!(summary.render_text().contains("  FAIL demo.yaml\n"));
    }
}
