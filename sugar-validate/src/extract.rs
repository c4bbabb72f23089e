//! Story extraction from a compiled Twine 2 HTML file.
//!
//! Locates the `<tw-storydata>` container and every `<tw-passagedata>`
//! element inside it, decodes passage text, and cuts out exclusion zones
//! (embedded scripts, verbatim markup, comments) so later checks only see
//! markup that SugarCube would actually interpret.

use crate::cursor::{self, Cursor};
use crate::error::DocumentError;
use crate::report::{Message, Report};
use crate::types::{Exclusion, ExclusionKind, Passage, Story, StoryMeta};

const STORY_OPEN: &str = "<tw-storydata";
const STORY_CLOSE: &str = "</tw-storydata>";
const PASSAGE_OPEN: &str = "<tw-passagedata";
const PASSAGE_CLOSE: &str = "</tw-passagedata>";

const USER_SCRIPT_ID: &str = "id=\"twine-user-script\"";
const USER_STYLESHEET_ID: &str = "id=\"twine-user-stylesheet\"";

/// Exclusion delimiters in decoded form; matching happens on the encoded text.
const ZONES: &[(ExclusionKind, &str, &str, Option<&str>)] = &[
    (ExclusionKind::Script, "<<script>>", "<</script>>", Some("<<endscript>>")),
    (ExclusionKind::MarkupEscape, "\"\"\"", "\"\"\"", None),
    (ExclusionKind::Verbatim, "<nowiki>", "</nowiki>", None),
    (ExclusionKind::TripleBrace, "{{{", "}}}", None),
    (ExclusionKind::BlockComment, "/*", "*/", None),
    (ExclusionKind::PercentComment, "/%", "%/", None),
    (ExclusionKind::HtmlComment, "<!--", "-->", None),
];

struct ZoneMarker {
    kind: ExclusionKind,
    open: String,
    close: String,
    legacy_close: Option<String>,
    display_open: &'static str,
    display_close: &'static str,
}

fn zone_markers() -> Vec<ZoneMarker> {
    ZONES
        .iter()
        .map(|&(kind, open, close, legacy)| ZoneMarker {
            kind,
            open: encode(open),
            close: encode(close),
            legacy_close: legacy.map(encode),
            display_open: open,
            display_close: close,
        })
        .collect()
}

fn encode(s: &str) -> String {
    html_escape::encode_double_quoted_attribute(s).into_owned()
}

/// Decode HTML entities the way passage text is displayed; tabs become two spaces.
pub fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).replace('\t', "  ")
}

/// Extract story metadata and all passages.
///
/// Unterminated exclusion zones are reported as warnings on `report`;
/// malformed containers abort with a [`DocumentError`].
pub fn extract_story(document: &str, report: &mut Report) -> Result<Story, DocumentError> {
    let story_start = document.find(STORY_OPEN).ok_or(DocumentError::MissingStory)?;
    let story_end = Cursor::at(document, story_start)
        .find(STORY_CLOSE)
        .ok_or_else(|| DocumentError::UnclosedStory {
            excerpt: short(document, story_start),
        })?;

    let story_tag = opening_tag(document, story_start);
    let meta = StoryMeta {
        name: attr(story_tag, "name"),
        ifid: attr(story_tag, "ifid"),
        start: attr(story_tag, "startnode"),
    };

    let markers = zone_markers();
    let mut passages = Vec::new();
    let mut search = Cursor::new(document);

    while let Some(start) = search.find(PASSAGE_OPEN) {
        if start < story_start || start > story_end {
            return Err(DocumentError::PassageOutsideStory {
                excerpt: short(document, start),
            });
        }
        let end = Cursor::at(document, start)
            .find(PASSAGE_CLOSE)
            .filter(|&end| end <= story_end)
            .ok_or_else(|| DocumentError::UnclosedPassage {
                excerpt: short(document, start),
            })?;
        let header = opening_tag(document, start);
        let content_start = start + header.len();
        if content_start > end {
            return Err(DocumentError::UnclosedPassage {
                excerpt: short(document, start),
            });
        }

        let (content, exclusions) =
            carve_exclusions(&document[content_start..end], header, &markers, report);
        passages.push(Passage {
            header: header.to_string(),
            pid: attr(header, "pid"),
            name: attr(header, "name"),
            tags: attr(header, "tags")
                .map(|t| t.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            content,
            exclusions,
            line: cursor::line_of(document, start),
        });
        search.set_pos(end + PASSAGE_CLOSE.len());
    }

    log::debug!("extracted {} passages", passages.len());
    Ok(Story { meta, passages })
}

/// Split raw passage text into decoded visible content and exclusion zones.
fn carve_exclusions(
    raw: &str,
    header: &str,
    markers: &[ZoneMarker],
    report: &mut Report,
) -> (String, Vec<Exclusion>) {
    let mut content = String::with_capacity(raw.len());
    let mut exclusions: Vec<Exclusion> = Vec::new();
    let mut cursor = Cursor::new(raw);

    loop {
        let earliest = markers
            .iter()
            .filter_map(|m| cursor.find(&m.open).map(|at| (at, m)))
            .min_by_key(|&(at, _)| at);
        let Some((start, marker)) = earliest else {
            break;
        };

        let body = Cursor::at(raw, start + marker.open.len());
        let close = body
            .find(&marker.close)
            .map(|at| at + marker.close.len())
            .or_else(|| {
                let legacy = marker.legacy_close.as_deref()?;
                body.find(legacy).map(|at| at + legacy.len())
            });
        let Some(close_end) = close else {
            report.add_warning(
                header,
                Message::new("Found opening '$$1' without closing '$$2' at $$3")
                    .arg(marker.display_open)
                    .arg(marker.display_close)
                    .arg(cursor::excerpt(&decode_entities(&raw[start..]), 0)),
            );
            break;
        };

        content.push_str(&decode_entities(&raw[cursor.pos()..start]));
        let zone = &raw[start..close_end];
        match exclusions.last_mut() {
            // Back-to-back zones share an anchor; keep offsets strictly increasing.
            Some(prev) if prev.offset == content.len() => {
                prev.raw.push_str(zone);
                if marker.kind == ExclusionKind::Script {
                    prev.kind = ExclusionKind::Script;
                }
            }
            _ => exclusions.push(Exclusion {
                kind: marker.kind,
                offset: content.len(),
                raw: zone.to_string(),
            }),
        }
        cursor.set_pos(close_end);
    }

    content.push_str(&decode_entities(cursor.rest()));
    (content, exclusions)
}

/// The opening tag starting at `start`, through its `>` (or to the end of text).
fn opening_tag(document: &str, start: usize) -> &str {
    let end = Cursor::at(document, start)
        .find(">")
        .map_or(document.len(), |i| i + 1);
    &document[start..end]
}

fn short(document: &str, pos: usize) -> String {
    Cursor::at(document, pos).rest().chars().take(200).collect()
}

/// Value of `name="…"` inside a tag, entity-decoded.
pub(crate) fn attr(tag: &str, name: &str) -> Option<String> {
    let pattern = format!("{name}=\"");
    let mut search = Cursor::new(tag);
    while let Some(at) = search.find(&pattern) {
        let boundary = Cursor::at(tag, at)
            .char_before()
            .is_none_or(char::is_whitespace);
        let value_start = at + pattern.len();
        if boundary {
            let value_end = Cursor::at(tag, value_start).find("\"")?;
            return Some(decode_entities(&tag[value_start..value_end]));
        }
        search.set_pos(value_start);
    }
    None
}

/// Contents of the embedded user script, with its byte offset in the document.
pub fn user_script(document: &str) -> Option<(usize, &str)> {
    tagged_block(document, USER_SCRIPT_ID, "</script>")
}

/// Contents of the embedded user stylesheet.
pub fn user_stylesheet(document: &str) -> Option<&str> {
    tagged_block(document, USER_STYLESHEET_ID, "</style>").map(|(_, css)| css)
}

fn tagged_block<'a>(document: &'a str, id: &str, close: &str) -> Option<(usize, &'a str)> {
    let id_at = document.find(id)?;
    let content_start = Cursor::at(document, id_at).find(">")? + 1;
    let content_end = Cursor::at(document, content_start).find(close)?;
    Some((content_start, &document[content_start..content_end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn story(passages: &str) -> String {
        format!(
            "<html><tw-storydata name=\"Test\" startnode=\"1\" ifid=\"ABC\">{passages}</tw-storydata></html>"
        )
    }

    fn extract(doc: &str) -> (Story, Report) {
        let mut report = Report::default();
        let story = extract_story(doc, &mut report).unwrap();
        (story, report)
    }

    #[test]
    fn extracts_metadata_and_passages() {
        let doc = story(
            "<tw-passagedata pid=\"1\" name=\"Start\" tags=\"a b\">Hello &amp; welcome</tw-passagedata>\n\
             <tw-passagedata pid=\"2\" name=\"Two &#39;s\" tags=\"\">x</tw-passagedata>",
        );
        let (story, report) = extract(&doc);
        assert!(report.is_clean());
        assert_eq!(story.meta.name.as_deref(), Some("Test"));
        assert_eq!(story.meta.ifid.as_deref(), Some("ABC"));
        assert_eq!(story.meta.start.as_deref(), Some("1"));
        assert_eq!(story.passages.len(), 2);
        assert_eq!(story.passages[0].content, "Hello & welcome");
        assert_eq!(story.passages[0].tags, vec!["a", "b"]);
        assert_eq!(story.passages[1].name.as_deref(), Some("Two 's"));
        assert_eq!(story.passages[1].line, 2);
    }

    #[test]
    fn cuts_out_exclusion_zones() {
        let doc = story(
            "<tw-passagedata pid=\"1\" name=\"A\" tags=\"\">a/* &lt;&lt;if&gt;&gt; */b&lt;&lt;script&gt;&gt;State.x&lt;&lt;/script&gt;&gt;c</tw-passagedata>",
        );
        let (story, _) = extract(&doc);
        let p = &story.passages[0];
        assert_eq!(p.content, "abc");
        assert_eq!(p.exclusions.len(), 2);
        assert_eq!(p.exclusions[0].kind, ExclusionKind::BlockComment);
        assert_eq!(p.exclusions[0].offset, 1);
        assert_eq!(p.exclusions[1].kind, ExclusionKind::Script);
        assert_eq!(p.exclusions[1].offset, 2);
        assert_eq!(
            p.script_zones().collect::<Vec<_>>(),
            vec!["<<script>>State.x<</script>>".to_string()]
        );
    }

    #[test]
    fn legacy_script_closer_is_accepted() {
        let doc = story(
            "<tw-passagedata pid=\"1\" name=\"A\" tags=\"\">&lt;&lt;script&gt;&gt;x&lt;&lt;endscript&gt;&gt;y</tw-passagedata>",
        );
        let (story, report) = extract(&doc);
        assert!(report.is_clean());
        assert_eq!(story.passages[0].content, "y");
    }

    #[test]
    fn unterminated_zone_warns_and_stops_excluding() {
        let doc = story(
            "<tw-passagedata pid=\"1\" name=\"A\" tags=\"\">a&lt;!-- b /* c */</tw-passagedata>",
        );
        let (story, report) = extract(&doc);
        assert_eq!(story.passages[0].content, "a<!-- b /* c */");
        assert!(story.passages[0].exclusions.is_empty());
        let warnings: Vec<_> = report.warnings.values().flatten().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].args[0], "<!--");
    }

    #[test]
    fn adjacent_zones_share_one_record() {
        let doc = story(
            "<tw-passagedata pid=\"1\" name=\"A\" tags=\"\">x/*a*//%b%/y</tw-passagedata>",
        );
        let (story, _) = extract(&doc);
        let p = &story.passages[0];
        assert_eq!(p.content, "xy");
        assert_eq!(p.exclusions.len(), 1);
        assert_eq!(p.exclusions[0].raw, "/*a*//%b%/");
    }

    #[test]
    fn unclosed_passage_is_document_error() {
        let doc = "<tw-storydata name=\"T\"><tw-passagedata pid=\"1\" name=\"A\">oops</tw-storydata>";
        let err = extract_story(doc, &mut Report::default()).unwrap_err();
        assert!(matches!(err, DocumentError::UnclosedPassage { .. }));
        assert_eq!(err.key(), "passages");
    }

    #[test]
    fn unclosed_story_is_document_error() {
        let err = extract_story("<tw-storydata name=\"T\">", &mut Report::default()).unwrap_err();
        assert!(matches!(err, DocumentError::UnclosedStory { .. }));
    }

    #[test]
    fn passage_outside_story_is_document_error() {
        let doc = "<tw-passagedata pid=\"9\">x</tw-passagedata><tw-storydata name=\"T\"></tw-storydata>";
        let err = extract_story(doc, &mut Report::default()).unwrap_err();
        assert!(matches!(err, DocumentError::PassageOutsideStory { .. }));
    }

    #[test]
    fn missing_story_is_document_error() {
        let err = extract_story("<html></html>", &mut Report::default()).unwrap_err();
        assert_eq!(err, DocumentError::MissingStory);
    }

    #[test]
    fn attr_requires_word_boundary() {
        let tag = "<tw-storydata format-name=\"x\" name=\"Real\">";
        assert_eq!(attr(tag, "name").as_deref(), Some("Real"));
        assert_eq!(attr(tag, "missing"), None);
    }

    #[test]
    fn finds_user_script_and_stylesheet() {
        let doc = "<style role=\"stylesheet\" id=\"twine-user-stylesheet\" type=\"text/twine-css\">a{}</style>\
                   <script role=\"script\" id=\"twine-user-script\" type=\"text/twine-javascript\">Macro.add();</script>";
        assert_eq!(user_stylesheet(doc), Some("a{}"));
        let (_, script) = user_script(doc).unwrap();
        assert_eq!(script, "Macro.add();");
    }
}
