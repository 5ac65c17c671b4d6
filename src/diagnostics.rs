// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Area of the document a diagnostic concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Syntax,
    Schema,
    References,
    Templates,
    Inputs,
    Triggers,
    Conditions,
    Actions,
    Documentation,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Category::Syntax => "syntax",
            Category::Schema => "schema",
            Category::References => "references",
            Category::Templates => "templates",
            Category::Inputs => "inputs",
            Category::Triggers => "triggers",
            Category::Conditions => "conditions",
            Category::Actions => "actions",
            Category::Documentation => "documentation",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    // Dotted locator such as `variables.x` or `action[0].delay`. May be empty.
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.path.is_empty() {
            true => f.write_str(&self.message),
            false => write!(f, "{}: {}", self.path, self.message),
        }
    }
}

/// Ordered, append-only collection of diagnostics for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, category: Category, path: impl Into<String>, message: impl Into<String>) {
        self.push(Diagnostic {
            severity: Severity::Error,
            category,
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn warning(
        &mut self,
        category: Category,
        path: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.push(Diagnostic {
            severity: Severity::Warning,
            category,
            path: path.into(),
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.items.extend(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_and_without_path() {
        let mut sink = Diagnostics::new();
        sink.error(Category::Schema, "", "Missing required root key: 'action'");
        sink.warning(Category::Templates, "variables.x", "Division by 'y' is unguarded");
        let shown: Vec<String> = sink.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            shown,
            vec![
                "Missing required root key: 'action'".to_string(),
                "variables.x: Division by 'y' is unguarded".to_string()
            ]
        );
        assert_eq!(sink.errors().count(), 1);
        assert_eq!(sink.warnings().count(), 1);
    }
}
