//! Cross-passage references, story metadata checks and reachability.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::cursor::{Cursor, is_name_char};
use crate::report::{Message, Report, STATISTICS, STORY_KEY};
use crate::types::Story;

/// Passages SugarCube renders or runs without being linked to.
pub const RESERVED_PASSAGES: &[&str] = &[
    "StoryInit",
    "StoryCaption",
    "StoryMenu",
    "StoryBanner",
    "StorySubtitle",
    "StoryAuthor",
    "StoryTitle",
    "StoryDisplayTitle",
    "StoryShare",
    "StoryInterface",
    "PassageReady",
    "PassageDone",
    "PassageHeader",
    "PassageFooter",
    "StoryData",
];

/// Macros whose first argument names a passage.
const TARGET_FIRST: &[&str] = &["include", "display", "goto", "popup"];
/// Macros whose second argument names a passage. A `[[…]]` first argument, or a
/// lone argument, is the target instead.
const TARGET_SECOND: &[&str] = &["link", "button"];

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://").expect("static pattern compiles")
});
static DATA_PASSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-passage\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static pattern compiles")
});

/// Where a link points. Dynamic and external targets are never followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LinkTarget {
    Passage(usize),
    External,
}

/// How a reference was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A passage-name argument of the named macro.
    Macro(String),
    /// `[[…]]` or `[img[…][…]]` markup.
    Bracket,
    /// A `data-passage` attribute.
    Attribute,
}

/// One reference found in passage text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// `None` for dynamic targets (`$var`, `_tmp`, template literals) and URLs.
    pub target: Option<String>,
    pub source: Source,
    pub pos: usize,
}

/// A node of the link graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassageInfo {
    pub index: usize,
    pub name: String,
    pub is_widget: bool,
    /// Target → content offsets of the references.
    pub links: BTreeMap<LinkTarget, Vec<usize>>,
}

enum Arg {
    Literal(String),
    Link(Option<String>),
    Dynamic,
}

fn classify_target(raw: &str) -> Option<String> {
    let target = raw.trim();
    let dynamic = target.starts_with(['$', '_', '`']);
    (!dynamic && !target.is_empty() && !URL.is_match(target)).then(|| target.to_string())
}

/// Parse `[[…]]` or `[img[…]…]` at the cursor. Returns the link target
/// (`None` if there is none or it is dynamic) and leaves the cursor after
/// the markup. `Err(())` if the markup is not terminated.
fn bracket_link(cur: &mut Cursor<'_>) -> Result<Option<String>, ()> {
    if cur.eat("[[") {
        let end = cur.find("]").ok_or(())?;
        let inner = &cur.text()[cur.pos()..end];
        cur.set_pos(end + 1);
        // optional setter component
        if cur.eat("[") {
            let setter_end = cur.find("]").ok_or(())?;
            cur.set_pos(setter_end + 1);
        }
        if !cur.eat("]") {
            return Err(());
        }
        let target = if let Some((_, t)) = inner.split_once('|') {
            t
        } else if let Some((_, t)) = inner.rsplit_once("->") {
            t
        } else if let Some((t, _)) = inner.split_once("<-") {
            t
        } else {
            inner
        };
        return Ok(classify_target(target));
    }
    if cur.eat("[img[") {
        let end = cur.find("]").ok_or(())?;
        cur.set_pos(end + 1);
        let mut target = None;
        if cur.eat("[") {
            let link_end = cur.find("]").ok_or(())?;
            target = classify_target(&cur.text()[cur.pos()..link_end]);
            cur.set_pos(link_end + 1);
        }
        if !cur.eat("]") {
            return Err(());
        }
        return Ok(target);
    }
    Err(())
}

/// Next macro argument, or `None` at `>>` / end of text.
fn next_arg(cur: &mut Cursor<'_>) -> Option<Arg> {
    cur.skip_whitespace();
    if cur.is_eof() || cur.starts_with(">>") {
        return None;
    }
    match cur.peek()? {
        q @ ('"' | '\'') => {
            cur.bump();
            let mut value = String::new();
            loop {
                match cur.bump()? {
                    '\\' => value.push(cur.bump()?),
                    c if c == q => return Some(Arg::Literal(value)),
                    c => value.push(c),
                }
            }
        }
        '`' => {
            cur.bump();
            let end = cur.find("`")?;
            cur.set_pos(end + 1);
            Some(Arg::Dynamic)
        }
        '[' if cur.starts_with("[[") || cur.starts_with("[img[") => {
            bracket_link(cur).ok().map(Arg::Link)
        }
        _ => {
            let token = cur.eat_while(|c| !c.is_whitespace() && c != '>');
            if token.is_empty() {
                // a lone '>' inside the arguments
                cur.bump();
                return Some(Arg::Dynamic);
            }
            if token.chars().all(is_name_char) && !token.starts_with('_') {
                Some(Arg::Literal(token.to_string()))
            } else {
                Some(Arg::Dynamic)
            }
        }
    }
}

fn macro_references(text: &str, out: &mut Vec<Reference>) {
    let mut search = Cursor::new(text);
    while let Some(at) = search.find("<<") {
        search.set_pos(at + 2);
        let mut cur = search;
        cur.skip_whitespace();
        let name = cur.eat_name();
        if name.is_empty() {
            continue;
        }
        let mut args = Vec::new();
        while let Some(arg) = next_arg(&mut cur) {
            args.push(arg);
        }
        search.set_pos(cur.pos());

        let source = Source::Macro(name.to_string());
        let picked = if TARGET_FIRST.contains(&name) {
            args.first()
        } else if TARGET_SECOND.contains(&name) {
            match args.first() {
                Some(Arg::Link(_)) => args.first(),
                _ => args.get(1).or(args.first()),
            }
        } else {
            // bracket links passed to any other macro
            for arg in &args {
                if let Arg::Link(target) = arg {
                    out.push(Reference {
                        target: target.clone(),
                        source: Source::Bracket,
                        pos: at,
                    });
                }
            }
            None
        };
        match picked {
            Some(Arg::Literal(target)) => out.push(Reference {
                target: classify_target(target),
                source,
                pos: at,
            }),
            Some(Arg::Link(target)) => out.push(Reference {
                target: target.clone(),
                source,
                pos: at,
            }),
            Some(Arg::Dynamic) => out.push(Reference {
                target: None,
                source,
                pos: at,
            }),
            None => {}
        }
    }
}

/// `true` if `pos` lies after a `<<` that has not been closed yet.
///
/// Best-effort: `>>` inside string arguments ends the region early.
fn inside_macro(text: &str, pos: usize) -> bool {
    let before = &text[..pos];
    match (before.rfind("<<"), before.rfind(">>")) {
        (Some(open), Some(close)) => open > close,
        (Some(_), None) => true,
        _ => false,
    }
}

fn bracket_references(text: &str, out: &mut Vec<Reference>) {
    let mut search = Cursor::new(text);
    while let Some(at) = search.find("[") {
        search.set_pos(at);
        if !(search.starts_with("[[") || search.starts_with("[img[")) || inside_macro(text, at) {
            search.set_pos(at + 1);
            continue;
        }
        let mut cur = search;
        match bracket_link(&mut cur) {
            Ok(target) => {
                out.push(Reference {
                    target,
                    source: Source::Bracket,
                    pos: at,
                });
                search.set_pos(cur.pos());
            }
            Err(()) => search.set_pos(at + 1),
        }
    }
}

fn attribute_references(text: &str, out: &mut Vec<Reference>) {
    for caps in DATA_PASSAGE.captures_iter(text) {
        let (Some(whole), Some(value)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        out.push(Reference {
            target: classify_target(value.as_str()),
            source: Source::Attribute,
            pos: whole.start(),
        });
    }
}

/// All references in passage text, ordered by position.
pub fn collect_references(text: &str) -> Vec<Reference> {
    let mut refs = Vec::new();
    macro_references(text, &mut refs);
    bracket_references(text, &mut refs);
    attribute_references(text, &mut refs);
    refs.sort_by_key(|r| r.pos);
    refs
}

/// Passage indices reachable from `entries` over non-external edges.
pub fn reachable(graph: &[PassageInfo], entries: impl IntoIterator<Item = usize>) -> BTreeSet<usize> {
    let mut seen = BTreeSet::new();
    let mut pending: Vec<usize> = entries.into_iter().collect();
    while let Some(index) = pending.pop() {
        if index >= graph.len() || !seen.insert(index) {
            continue;
        }
        for target in graph[index].links.keys() {
            if let LinkTarget::Passage(next) = target {
                pending.push(*next);
            }
        }
    }
    seen
}

fn check_metadata(story: &Story, report: &mut Report) -> BTreeMap<String, usize> {
    let meta = &story.meta;
    if meta.name.as_deref().is_none_or(str::is_empty) {
        report.add_error(STORY_KEY, "Story has no name");
    }
    if meta.ifid.as_deref().is_none_or(str::is_empty) {
        report.add_error(STORY_KEY, "Story has no IFID");
    }

    let mut names = BTreeMap::new();
    let mut pids = BTreeSet::new();
    for (index, passage) in story.passages.iter().enumerate() {
        match passage.pid.as_deref() {
            None | Some("") => report.add_warning(&passage.header, Message::new("Passage has no pid")),
            Some(pid) if !pids.insert(pid) => report.add_warning(
                &passage.header,
                Message::new("Duplicate passage pid '$$1'").arg(pid),
            ),
            Some(_) => {}
        }
        match passage.name.as_deref() {
            None | Some("") => {
                report.add_warning(&passage.header, Message::new("Passage has no name"))
            }
            Some(name) if names.contains_key(name) => report.add_warning(
                &passage.header,
                Message::new("Duplicate passage name '$$1'").arg(name),
            ),
            Some(name) => {
                names.insert(name.to_string(), index);
            }
        }
    }
    names
}

fn start_index(story: &Story, report: &mut Report) -> Option<usize> {
    let Some(start) = story.meta.start.as_deref().filter(|s| !s.is_empty()) else {
        report.add_warning(STORY_KEY, Message::new("Story has no start passage"));
        return None;
    };
    let index = story
        .passages
        .iter()
        .position(|p| p.pid.as_deref() == Some(start));
    if index.is_none() {
        report.add_warning(
            STORY_KEY,
            Message::new("Start passage with pid '$$1' does not exist").arg(start),
        );
    }
    index
}

/// Resolve references, validate story metadata and report reachability.
pub fn check_links(story: &Story, report: &mut Report) -> Vec<PassageInfo> {
    let names = check_metadata(story, report);
    let start = start_index(story, report);

    let mut graph = Vec::with_capacity(story.passages.len());
    for (index, passage) in story.passages.iter().enumerate() {
        let mut links: BTreeMap<LinkTarget, Vec<usize>> = BTreeMap::new();
        for reference in collect_references(&passage.content) {
            let target = match &reference.target {
                None => LinkTarget::External,
                Some(name) => match names.get(name) {
                    Some(&i) => LinkTarget::Passage(i),
                    None => {
                        match &reference.source {
                            Source::Macro(macro_name) => report.add_error(
                                &passage.header,
                                format!(
                                    "Passage '{name}' referenced by <<{macro_name}>> does not exist"
                                ),
                            ),
                            Source::Bracket | Source::Attribute => report.add_warning(
                                &passage.header,
                                Message::new("Link target '$$1' does not exist").arg(name),
                            ),
                        }
                        continue;
                    }
                },
            };
            links.entry(target).or_default().push(reference.pos);
        }
        graph.push(PassageInfo {
            index,
            name: passage.name.clone().unwrap_or_default(),
            is_widget: passage.is_widget(),
            links,
        });
    }

    let entries = story
        .passages
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            p.is_widget()
                || p.has_tag("start")
                || p.name.as_deref().is_some_and(|n| RESERVED_PASSAGES.contains(&n))
        })
        .map(|(i, _)| i)
        .chain(start);
    let seen = reachable(&graph, entries);
    log::debug!("{} of {} passages reachable", seen.len(), graph.len());

    if !seen.is_empty() && seen.len() < graph.len() {
        let unreachable: Vec<&str> = graph
            .iter()
            .filter(|info| !seen.contains(&info.index))
            .map(|info| info.name.as_str())
            .collect();
        let message = if unreachable.len() <= seen.len() {
            format!(
                "Unreachable passages ({}): {}",
                unreachable.len(),
                unreachable.join(", ")
            )
        } else {
            let reached: Vec<&str> = seen.iter().map(|&i| graph[i].name.as_str()).collect();
            format!("Reachable passages ({}): {}", reached.len(), reached.join(", "))
        };
        report.add_info(STATISTICS, message);
    }
    graph
}
