use serde::{Deserialize, Deserializer, Serialize};

use crate::cursor;

/// Story-level metadata read from the `<tw-storydata>` opening tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryMeta {
    pub name: Option<String>,
    pub ifid: Option<String>,
    /// `startnode` attribute: the pid of the start passage.
    pub start: Option<String>,
}

/// An extracted story: metadata plus passages in document order.
#[derive(Debug, Clone)]
pub struct Story {
    pub meta: StoryMeta,
    pub passages: Vec<Passage>,
}

/// One `<tw-passagedata>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    /// Raw opening tag, used as the diagnostic key for this passage.
    pub header: String,
    pub pid: Option<String>,
    pub name: Option<String>,
    pub tags: Vec<String>,
    /// Entity-decoded passage text with all exclusion zones cut out.
    pub content: String,
    /// Cut-out zones, ordered by strictly increasing `offset`.
    pub exclusions: Vec<Exclusion>,
    /// 1-based document line of the opening tag.
    pub line: usize,
}

/// A span of passage text whose markup is not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub kind: ExclusionKind,
    /// Byte offset in [`Passage::content`] where the zone was cut out.
    pub offset: usize,
    /// The zone exactly as it appears in the document, delimiters included.
    pub raw: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionKind {
    Script,
    MarkupEscape,
    Verbatim,
    TripleBrace,
    BlockComment,
    PercentComment,
    HtmlComment,
}

impl Exclusion {
    pub fn decoded(&self) -> String {
        crate::extract::decode_entities(&self.raw)
    }
}

impl Passage {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_widget(&self) -> bool {
        self.has_tag("widget")
    }

    /// Visible content with every exclusion zone re-inserted (decoded).
    pub fn display_text(&self) -> String {
        let mut out = String::with_capacity(self.content.len());
        let mut last = 0;
        for ex in &self.exclusions {
            out.push_str(&self.content[last..ex.offset]);
            out.push_str(&ex.decoded());
            last = ex.offset;
        }
        out.push_str(&self.content[last..]);
        out
    }

    /// Map an offset in [`Passage::content`] to the matching offset in
    /// [`Passage::display_text`].
    pub fn display_offset(&self, pos: usize) -> usize {
        pos + self
            .exclusions
            .iter()
            .take_while(|ex| ex.offset <= pos)
            .map(|ex| ex.decoded().len())
            .sum::<usize>()
    }

    /// Diagnostic excerpt starting at content offset `pos`.
    pub fn excerpt_at(&self, pos: usize) -> String {
        if self.exclusions.is_empty() {
            return cursor::excerpt(&self.content, pos).to_string();
        }
        let display = self.display_text();
        cursor::excerpt(&display, self.display_offset(pos)).to_string()
    }

    /// A passage without exclusions, for unit tests.
    #[cfg(test)]
    pub(crate) fn inline(name: &str, tags: &str, content: &str) -> Self {
        Self {
            header: format!("<tw-passagedata pid=\"1\" name=\"{name}\" tags=\"{tags}\">"),
            pid: Some("1".into()),
            name: Some(name.into()),
            tags: tags.split_whitespace().map(String::from).collect(),
            content: content.into(),
            exclusions: Vec::new(),
            line: 1,
        }
    }

    /// Decoded text of every embedded `<<script>>` zone.
    pub fn script_zones(&self) -> impl Iterator<Item = String> + '_ {
        self.exclusions
            .iter()
            .filter(|ex| ex.kind == ExclusionKind::Script)
            .map(Exclusion::decoded)
    }
}

/// How a macro behaves in passage markup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroDescriptor {
    #[serde(default)]
    pub name: String,
    /// A matching `<</name>>` is required.
    #[serde(default, deserialize_with = "truthy")]
    pub closed: bool,
    /// Enclosing macros this name continues (e.g. `else` inside `if`).
    #[serde(default, alias = "ctx", skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<SubtagContext>,
    /// Deprecated alias that acts as the close tag of the named macro.
    #[serde(default, alias = "replacend", skip_serializing_if = "Option::is_none")]
    pub replaces_as: Option<String>,
}

/// One enclosing macro a sub-tag may continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtagContext {
    #[serde(alias = "main")]
    pub parent: String,
    /// Must directly continue the innermost open frame (branch stages).
    #[serde(default, deserialize_with = "truthy")]
    pub ordered: bool,
    /// Moves the parent frame into its terminal stage.
    #[serde(default, deserialize_with = "truthy")]
    pub last: bool,
}

impl MacroDescriptor {
    pub fn simple(name: &str, closed: bool) -> Self {
        Self {
            name: name.to_string(),
            closed,
            ..Self::default()
        }
    }

    pub fn deprecated_end(name: &str, replaces: &str) -> Self {
        Self {
            name: name.to_string(),
            replaces_as: Some(replaces.to_string()),
            ..Self::default()
        }
    }

    pub fn is_subtag(&self) -> bool {
        !self.closed && !self.contexts.is_empty()
    }
}

/// Override tables written by older hosts store flags as `1`/`0`.
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Null => false,
        _ => true,
    })
}
