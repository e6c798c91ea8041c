//! Diagnostic classification of raw engine stderr.
//!
//! Classification is a pure function over the text: each non-blank line is
//! tested against an ordered rule table for the selected engine, first match
//! wins, and lines matching no rule are dropped (informational engine chatter
//! must not pollute diagnostics).

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A single classification rule: pattern and the category it assigns.
#[derive(Debug)]
pub struct Rule {
    pattern: Regex,
    severity: Severity,
}

impl Rule {
    fn new(pattern: &str, severity: Severity) -> Self {
        Self {
            // Patterns are fixed at compile time; a failure here is a bug
            // in the rule table itself.
            pattern: Regex::new(pattern).unwrap_or_else(|err| {
                panic!("invalid diagnostic rule pattern {pattern:?}: {err}")
            }),
            severity,
        }
    }
}

/// Ordered rule table for one engine. Error rules come before warning rules,
/// so a line mentioning both classifies as an error.
#[derive(Debug)]
pub struct Ruleset {
    /// Engine name, for logs and evidence reporting.
    pub name: &'static str,
    rules: Vec<Rule>,
}

impl Ruleset {
    fn severity_of(&self, line: &str) -> Option<Severity> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(line))
            .map(|rule| rule.severity)
    }
}

/// Classified stderr lines, in original line order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    /// Whether no errors were classified.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Rules for the CadQuery/python interpreter: tracebacks, exception tokens,
/// and interpreter frame markers are errors; deprecations are warnings.
pub fn cadquery_ruleset() -> &'static Ruleset {
    static RULESET: LazyLock<Ruleset> = LazyLock::new(|| Ruleset {
        name: "cadquery",
        rules: vec![
            Rule::new(r"(?i)Traceback", Severity::Error),
            Rule::new(r"(?i)Error:", Severity::Error),
            Rule::new(r"(?i)Exception:", Severity::Error),
            Rule::new(r#"(?i)^  File ""#, Severity::Error),
            Rule::new(r"(?i)warning", Severity::Warning),
            Rule::new(r"(?i)deprecat", Severity::Warning),
        ],
    });
    &RULESET
}

/// Rules for the OpenSCAD compiler: ERROR/parser/syntax markers are errors,
/// WARNING markers are warnings.
pub fn openscad_ruleset() -> &'static Ruleset {
    static RULESET: LazyLock<Ruleset> = LazyLock::new(|| Ruleset {
        name: "openscad",
        rules: vec![
            Rule::new(r"(?i)error", Severity::Error),
            Rule::new(r"(?i)^Parser error", Severity::Error),
            Rule::new(r"(?i)syntax error", Severity::Error),
            Rule::new(r"(?i)warning", Severity::Warning),
        ],
    });
    &RULESET
}

/// Classify raw stderr text into errors and warnings.
///
/// Pure and idempotent: the same text always yields the same lists, in the
/// original line order. Blank lines are skipped; unmatched lines dropped.
pub fn classify(text: &str, ruleset: &Ruleset) -> Diagnostics {
    let mut diagnostics = Diagnostics::default();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match ruleset.severity_of(line) {
            Some(Severity::Error) => diagnostics.errors.push(line.trim().to_string()),
            Some(Severity::Warning) => diagnostics.warnings.push(line.trim().to_string()),
            None => {}
        }
    }
    diagnostics
}
