//! The diagnostics sink.
//!
//! A [`Report`] is built fresh for every validation run. Errors are plain
//! strings, warnings are templated [`Message`]s so hosts can localize or
//! restyle them, and infos are statistics grouped by category.

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DocumentError;

/// Key for diagnostics about the `<tw-storydata>` container and its metadata.
pub const STORY_KEY: &str = "story";
/// Key for diagnostics about the passage containers as a whole.
pub const PASSAGES_KEY: &str = "passages";
/// Key for diagnostics about the embedded user script.
pub const USER_SCRIPT_KEY: &str = "user-script";
/// Key for diagnostics about the embedded user stylesheet.
pub const STYLESHEET_KEY: &str = "user-stylesheet";
/// Info category for story statistics.
pub const STATISTICS: &str = "Statistics";

/// A templated message: `template` contains `$$1`, `$$2`, … placeholders
/// that are filled from `args` when rendered.
///
/// Serializes as a flat JSON array `[template, arg1, arg2, …]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub template: String,
    pub args: Vec<String>,
}

impl Message {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: impl ToString) -> Self {
        self.args.push(value.to_string());
        self
    }

    /// Substitute all placeholders.
    pub fn render(&self) -> String {
        let mut out = self.template.clone();
        // Highest index first so `$$1` never eats the prefix of `$$10`.
        for (i, value) in self.args.iter().enumerate().rev() {
            out = out.replace(&format!("$${}", i + 1), value);
        }
        out
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.args.len() + 1))?;
        seq.serialize_element(&self.template)?;
        for arg in &self.args {
            seq.serialize_element(arg)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut parts = Vec::<String>::deserialize(deserializer)?.into_iter();
        let template = parts
            .next()
            .ok_or_else(|| D::Error::custom("templated message must not be empty"))?;
        Ok(Self {
            template,
            args: parts.collect(),
        })
    }
}

/// Outcome of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Passage header (or fixed key) → error messages.
    pub errors: BTreeMap<String, Vec<String>>,
    /// Passage header (or fixed key) → templated warnings.
    pub warnings: BTreeMap<String, Vec<Message>>,
    /// Category → informational messages.
    pub infos: BTreeMap<String, Vec<String>>,
    /// Some `Macro.add` / legacy macro declarations could not be interpreted.
    pub unresolved_macros: bool,
    /// Some widget declarations could not be resolved statically.
    pub unresolved_widgets: bool,
}

impl Report {
    /// Wrap a document-level failure so hosts can render it like any other report.
    pub fn from_document_error(err: &DocumentError) -> Self {
        let mut report = Self::default();
        report.add_error(err.key(), err.to_string());
        report
    }

    pub(crate) fn add_error(&mut self, key: &str, message: impl AsRef<str>) {
        let message = message.as_ref().replace('\n', "\\n").replace('\t', "\\t");
        self.errors.entry(key.to_string()).or_default().push(message);
    }

    pub(crate) fn add_warning(&mut self, key: &str, message: Message) {
        self.warnings
            .entry(key.to_string())
            .or_default()
            .push(message);
    }

    pub(crate) fn add_info(&mut self, category: &str, message: impl Into<String>) {
        self.infos
            .entry(category.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|v| !v.is_empty())
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.values().map(Vec::len).sum()
    }

    /// No errors and no warnings (infos do not count).
    pub fn is_clean(&self) -> bool {
        self.error_count() == 0 && self.warning_count() == 0
    }

    /// Flatten into rendered diagnostics, errors first, then warnings, then infos.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        for (key, messages) in &self.errors {
            out.extend(messages.iter().map(|m| Diagnostic {
                severity: Severity::Error,
                key: key.clone(),
                message: m.clone(),
            }));
        }
        for (key, messages) in &self.warnings {
            out.extend(messages.iter().map(|m| Diagnostic {
                severity: Severity::Warning,
                key: key.clone(),
                message: m.render(),
            }));
        }
        for (key, messages) in &self.infos {
            out.extend(messages.iter().map(|m| Diagnostic {
                severity: Severity::Info,
                key: key.clone(),
                message: m.clone(),
            }));
        }
        out
    }
}

/// A rendered, flattened diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub key: String,
    pub message: String,
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}
