/// Structural failures that abort a whole validation run.
///
/// Only a malformed story or passage *container* produces one of these;
/// malformed passage content is always reported through the [`Report`]
/// instead.
///
/// [`Report`]: crate::report::Report
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("No story data found (missing '<tw-storydata')")]
    MissingStory,

    #[error("Unclosed story data found: {excerpt}")]
    UnclosedStory { excerpt: String },

    #[error("Unclosed passage found: {excerpt}")]
    UnclosedPassage { excerpt: String },

    #[error("Passage found outside of the story data: {excerpt}")]
    PassageOutsideStory { excerpt: String },
}

impl DocumentError {
    /// The diagnostic key this error is reported under.
    pub fn key(&self) -> &'static str {
        match self {
            DocumentError::MissingStory | DocumentError::UnclosedStory { .. } => "story",
            DocumentError::UnclosedPassage { .. } | DocumentError::PassageOutsideStory { .. } => {
                "passages"
            }
        }
    }
}

/// A passage-fatal condition.
///
/// Raised with `?` at the point of detection and caught once at the
/// per-passage boundary, where it is recorded as an error for that passage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PassageFault {
    pub message: String,
}

impl PassageFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised while loading a caller-supplied macro override table.
#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("Invalid macro override table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Macro override '{name}' has an empty sub-tag parent")]
    EmptyParent { name: String },
}
