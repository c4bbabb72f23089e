//! Macro and HTML tag nesting.
//!
//! A single left-to-right scan over the visible passage content drives a
//! stack of open frames. Macro frames are strict: closing or continuing them
//! out of order is fatal for the passage. HTML frames are lenient: they are
//! discarded with a warning whenever a macro needs to see past them.

use crate::cursor::Cursor;
use crate::error::PassageFault;
use crate::registry::Registry;
use crate::report::{Message, Report};
use crate::types::{Passage, SubtagContext};

/// HTML elements whose nesting is tracked.
pub const HTML_TAGS: &[&str] = &[
    "div", "b", "strong", "strike", "u", "i", "li", "ul", "h1", "h2", "h3", "p", "table", "tbody",
    "th", "tr", "td", "label", "span", "a", "link", "button", "center",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Html,
    Macro,
}

/// How far a multi-stage macro (`if`, `switch`, …) has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Mid,
    Terminal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub name: String,
    pub kind: FrameKind,
    pub stage: Stage,
    /// Content offset of the latest tag that opened or continued this frame.
    pub pos: usize,
}

impl StackFrame {
    fn new(name: &str, kind: FrameKind, pos: usize) -> Self {
        Self {
            name: name.to_string(),
            kind,
            stage: Stage::Open,
            pos,
        }
    }

    fn is_macro(&self, name: &str) -> bool {
        self.kind == FrameKind::Macro && self.name == name
    }
}

/// Outcome of choosing which enclosing macro a sub-tag continues.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The tag has no contexts and stands alone.
    Free,
    Use(&'a SubtagContext),
    /// An ordered parent is open, but not on top: the order is not enforced.
    SkipOrderCheck,
}

/// Pick the context a sub-tag continues, in rank order:
///
/// 1. the only context
/// 2. an ordered context whose parent is the top frame
/// 3. an unordered context whose parent is open anywhere
/// 4. an ordered context whose parent is open below the top
/// 5. the first context, which will then fail as missing
pub fn resolve_context<'a>(contexts: &'a [SubtagContext], stack: &[StackFrame]) -> Resolution<'a> {
    let Some(first) = contexts.first() else {
        return Resolution::Free;
    };
    if contexts.len() == 1 {
        return Resolution::Use(first);
    }
    let top = stack.last();
    let open = |parent: &str| stack.iter().any(|f| f.is_macro(parent));

    if let Some(ctx) = contexts
        .iter()
        .find(|c| c.ordered && top.is_some_and(|t| t.is_macro(&c.parent)))
    {
        return Resolution::Use(ctx);
    }
    if let Some(ctx) = contexts.iter().find(|c| !c.ordered && open(&c.parent)) {
        return Resolution::Use(ctx);
    }
    if contexts.iter().any(|c| c.ordered && open(&c.parent)) {
        return Resolution::SkipOrderCheck;
    }
    Resolution::Use(first)
}

/// One recognized tag in the content.
enum Event<'a> {
    Open(&'a str, FrameKind),
    Continue { parent: &'a str, ordered: bool, last: bool },
    CloseMacro(&'a str),
    CloseHtml(&'a str),
}

struct Matcher<'a, 'r> {
    passage: &'a Passage,
    registry: &'a Registry,
    report: &'r mut Report,
    stack: Vec<StackFrame>,
}

/// Check macro and HTML nesting for one passage.
pub fn check_nesting(
    passage: &Passage,
    registry: &Registry,
    report: &mut Report,
) -> Result<(), PassageFault> {
    let mut matcher = Matcher {
        passage,
        registry,
        report,
        stack: Vec::new(),
    };
    matcher.scan()?;
    matcher.finish()
}

impl<'a, 'r> Matcher<'a, 'r> {
    fn at(&self, pos: usize) -> String {
        self.passage.excerpt_at(pos)
    }

    fn fault(&self, prefix: &str, pos: usize) -> PassageFault {
        PassageFault::new(format!("{prefix}{}", self.at(pos)))
    }

    fn warn(&mut self, message: Message) {
        self.report.add_warning(&self.passage.header, message);
    }

    fn scan(&mut self) -> Result<(), PassageFault> {
        let passage = self.passage;
        let mut cursor = Cursor::new(&passage.content);

        while let Some(lt) = cursor.find("<") {
            cursor.set_pos(lt + 1);
            let event = if cursor.eat("<") {
                self.macro_event(&mut cursor, lt)?
            } else {
                html_event(&mut cursor).map_err(|()| self.fault("Broken closing tag at ", lt))?
            };
            if let Some(event) = event {
                self.apply(event, lt)?;
            }
        }
        Ok(())
    }

    /// Classify the tag after `<<`; `None` for tags that do not touch the stack.
    fn macro_event(
        &mut self,
        cursor: &mut Cursor<'a>,
        lt: usize,
    ) -> Result<Option<Event<'a>>, PassageFault> {
        let closing = cursor.eat("/");
        let mut probe = *cursor;
        probe.skip_whitespace();
        let name = probe.eat_name();

        if name.is_empty() {
            if closing {
                return Err(self.fault("Unrecognized closing at ", lt));
            }
            if !matches!(probe.peek(), Some('-' | '=')) {
                return Err(self.fault("Invalid macro at ", lt));
            }
            return Ok(None);
        }
        if closing && !probe.starts_with(">>") {
            return Err(self.fault("Broken closing macro at ", lt));
        }
        *cursor = probe;

        let registry = self.registry;
        let Some(descriptor) = registry.get(name) else {
            let prefix = if closing {
                "Unrecognized macro close at "
            } else {
                "Unrecognized macro at "
            };
            return Err(self.fault(prefix, lt));
        };

        if descriptor.closed {
            return Ok(Some(if closing {
                Event::CloseMacro(name)
            } else {
                Event::Open(name, FrameKind::Macro)
            }));
        }
        if closing {
            return Err(self.fault("Macro should not be closed, but was at ", lt));
        }
        if let Some(replaced) = descriptor.replaces_as.as_deref() {
            return Ok(Some(Event::CloseMacro(replaced)));
        }
        match resolve_context(&descriptor.contexts, &self.stack) {
            Resolution::Free => Ok(None),
            Resolution::Use(ctx) => Ok(Some(Event::Continue {
                parent: &ctx.parent,
                ordered: ctx.ordered,
                last: ctx.last,
            })),
            Resolution::SkipOrderCheck => {
                let at = self.at(lt);
                self.warn(Message::new("Skipping order check of $$1").arg(at));
                Ok(None)
            }
        }
    }

    fn apply(&mut self, event: Event<'_>, pos: usize) -> Result<(), PassageFault> {
        match event {
            Event::Open(name, kind) => self.stack.push(StackFrame::new(name, kind, pos)),
            Event::Continue {
                parent,
                ordered: false,
                ..
            } => {
                if !self.stack.iter().any(|f| f.is_macro(parent)) {
                    return Err(self.fault(&format!("Missing '{parent}' before "), pos));
                }
            }
            Event::Continue {
                parent,
                ordered: true,
                last,
            } => {
                self.expose(parent, pos, &format!("Missing '{parent}' before "))?;
                let terminal = self
                    .stack
                    .last()
                    .is_some_and(|frame| frame.stage == Stage::Terminal);
                if terminal {
                    return Err(self.fault("Branch already in its last stage at ", pos));
                }
                if let Some(frame) = self.stack.last_mut() {
                    frame.stage = if last { Stage::Terminal } else { Stage::Mid };
                    frame.pos = pos;
                }
            }
            Event::CloseMacro(name) => {
                self.expose(name, pos, "Unmatched tag at ")?;
                self.stack.pop();
            }
            Event::CloseHtml(name) => match self.stack.last() {
                Some(top) if top.kind == FrameKind::Html && top.name == name => {
                    self.stack.pop();
                }
                _ => {
                    let at = self.at(pos);
                    self.warn(Message::new("Unmatched tag at $$1").arg(at));
                }
            },
        }
        Ok(())
    }

    /// Discard HTML frames until the macro frame `name` is on top.
    ///
    /// Any other macro frame is a boundary. If `name` is open further down
    /// the tag is mangled; otherwise it fails with `missing_prefix`.
    fn expose(&mut self, name: &str, pos: usize, missing_prefix: &str) -> Result<(), PassageFault> {
        while let Some(top) = self.stack.last() {
            if top.is_macro(name) {
                return Ok(());
            }
            if top.kind == FrameKind::Macro {
                break;
            }
            let message = Message::new("Closing unmatched tag $$1 before $$2")
                .arg(self.at(top.pos))
                .arg(self.at(pos));
            self.warn(message);
            self.stack.pop();
        }

        match self.stack.last() {
            Some(hider) if self.stack.iter().any(|f| f.is_macro(name)) => {
                Err(PassageFault::new(format!(
                    "Mangled tag at {}, after unmatched tag at {}",
                    self.at(pos),
                    self.at(hider.pos)
                )))
            }
            _ => Err(self.fault(missing_prefix, pos)),
        }
    }

    fn finish(mut self) -> Result<(), PassageFault> {
        while let Some(top) = self.stack.last() {
            if top.kind == FrameKind::Macro {
                return Err(PassageFault::new(format!(
                    "'{}' should be closed, but was not, at {}",
                    top.name,
                    self.at(top.pos)
                )));
            }
            let at = self.at(top.pos);
            self.warn(Message::new("Passage ended with an unmatched tag at $$1").arg(at));
            self.stack.pop();
        }
        Ok(())
    }
}

/// Classify the tag after a single `<`. `Err` for a broken closing tag.
fn html_event<'a>(cursor: &mut Cursor<'a>) -> Result<Option<Event<'a>>, ()> {
    let closing = cursor.eat("/");
    let mut probe = *cursor;
    let name = probe.eat_name();
    if !HTML_TAGS.contains(&name) {
        return Ok(None);
    }
    if closing {
        if !probe.starts_with(">") {
            return Err(());
        }
        *cursor = probe;
        return Ok(Some(Event::CloseHtml(name)));
    }
    let self_closing = probe
        .find(">")
        .is_some_and(|gt| probe.text()[..gt].ends_with('/'));
    *cursor = probe;
    Ok((!self_closing).then_some(Event::Open(name, FrameKind::Html)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(parent: &str, ordered: bool) -> SubtagContext {
        SubtagContext {
            parent: parent.into(),
            ordered,
            last: false,
        }
    }

    fn frames(names: &[(&str, FrameKind)]) -> Vec<StackFrame> {
        names
            .iter()
            .enumerate()
            .map(|(i, (name, kind))| StackFrame::new(name, *kind, i))
            .collect()
    }

    fn check(content: &str) -> (Result<(), PassageFault>, Report) {
        let passage = Passage::inline("Start", "", content);
        let registry = Registry::builtin();
        let mut report = Report::default();
        let result = check_nesting(&passage, &registry, &mut report);
        (result, report)
    }

    fn fault(content: &str) -> String {
        check(content).0.unwrap_err().message
    }

    fn warnings(report: &Report) -> Vec<String> {
        report
            .warnings
            .values()
            .flatten()
            .map(Message::render)
            .collect()
    }

    #[test]
    fn single_context_is_used_as_is() {
        let contexts = [ctx("if", true)];
        assert_eq!(resolve_context(&contexts, &[]), Resolution::Use(&contexts[0]));
    }

    #[test]
    fn ordered_context_on_top_outranks_unordered() {
        let contexts = [ctx("for", false), ctx("if", true)];
        let stack = frames(&[("for", FrameKind::Macro), ("if", FrameKind::Macro)]);
        assert_eq!(resolve_context(&contexts, &stack), Resolution::Use(&contexts[1]));
    }

    #[test]
    fn unordered_context_open_anywhere() {
        let contexts = [ctx("cycle", false), ctx("listbox", false)];
        let stack = frames(&[("listbox", FrameKind::Macro), ("div", FrameKind::Html)]);
        assert_eq!(resolve_context(&contexts, &stack), Resolution::Use(&contexts[1]));
    }

    #[test]
    fn ordered_context_below_top_skips_the_check() {
        let contexts = [ctx("if", true), ctx("switch", true)];
        let stack = frames(&[("switch", FrameKind::Macro), ("for", FrameKind::Macro)]);
        assert_eq!(resolve_context(&contexts, &stack), Resolution::SkipOrderCheck);
    }

    #[test]
    fn html_frames_do_not_count_as_parents() {
        let contexts = [ctx("link", false), ctx("button", false)];
        let stack = frames(&[("button", FrameKind::Html)]);
        assert_eq!(resolve_context(&contexts, &stack), Resolution::Use(&contexts[0]));
    }

    #[test]
    fn nothing_open_falls_back_to_the_first() {
        let contexts = [ctx("cycle", false), ctx("listbox", false)];
        assert_eq!(resolve_context(&contexts, &[]), Resolution::Use(&contexts[0]));
    }

    #[test]
    fn well_formed_nesting_passes() {
        let (result, report) = check(
            "<<if $a>>A<<elseif $b>>B<<else>><<for _i to 0; _i lt 3; _i++>><<if _i is 1>><<break>><</if>><</for>><</if>>\
             <<switch $c>><<case 1>>one<<default>>other<</switch>>\
             <div class=\"x\"><span>t</span><br/><div/></div><<set $x to 1>><<= $x>><<- $y>>",
        );
        assert!(result.is_ok(), "{result:?}");
        assert!(report.is_clean(), "{report:?}");
    }

    #[test]
    fn missing_close_names_the_macro() {
        assert_eq!(
            fault("<<if $a>>text"),
            "'if' should be closed, but was not, at <<if $a>>text"
        );
    }

    #[test]
    fn terminal_stage_rejects_continuations() {
        for content in [
            "<<if $a>>x<<else>>y<<else>>z<</if>>",
            "<<if $a>>x<<else>>y<<elseif $b>>z<</if>>",
            "<<switch $a>><<default>>y<<case 1>>z<</switch>>",
        ] {
            assert!(
                fault(content).starts_with("Branch already in its last stage at <<"),
                "{content}"
            );
        }
    }

    #[test]
    fn orphan_subtag_is_missing_its_parent() {
        assert_eq!(fault("<<else>>x"), "Missing 'if' before <<else>>x");
        assert_eq!(fault("<<break>>"), "Missing 'for' before <<break>>");
    }

    #[test]
    fn subtag_behind_another_macro_is_mangled() {
        assert_eq!(
            fault("<<if $a>><<nobr>><<else>><</nobr>><</if>>"),
            "Mangled tag at <<else>><</nobr>><</if>>, after unmatched tag at <<nobr>><<else>><</nobr>><</if>>"
        );
    }

    #[test]
    fn unmatched_macro_close() {
        assert_eq!(fault("x<</if>>"), "Unmatched tag at <</if>>");
    }

    #[test]
    fn deprecated_end_closes_its_macro() {
        let (result, _) = check("<<if $a>>x<<endif>>");
        assert!(result.is_ok());
    }

    #[test]
    fn malformed_macros_are_fatal() {
        assert!(fault("<<nosuch>>").starts_with("Unrecognized macro at <<nosuch"));
        assert!(fault("<</nosuch>>").starts_with("Unrecognized macro close at"));
        assert!(fault("<</set>>").starts_with("Macro should not be closed, but was at"));
        assert!(fault("<< 5>>").starts_with("Invalid macro at"));
        assert!(fault("<</>>").starts_with("Unrecognized closing at"));
        assert!(fault("<<if 1>><</if >>").starts_with("Broken closing macro at <</if >>"));
        assert!(fault("<div>x</div").starts_with("Broken closing tag at </div"));
    }

    #[test]
    fn html_frames_are_discarded_with_warnings() {
        let (result, report) = check("<<if $a>><span>x<</if>>");
        assert!(result.is_ok());
        assert_eq!(
            warnings(&report),
            vec!["Closing unmatched tag <span>x<</if>> before <</if>>"]
        );
    }

    #[test]
    fn stray_html_close_and_trailing_html_warn() {
        let (result, report) = check("<div><<if $a>></div><</if>>");
        assert!(result.is_ok());
        assert_eq!(
            warnings(&report),
            vec![
                "Unmatched tag at </div><</if>>",
                "Passage ended with an unmatched tag at <div><<if $a>></div><</if>>",
            ]
        );
    }

    #[test]
    fn shared_subtags_follow_the_open_parent() {
        let (result, report) =
            check("<<listbox \"$x\">><<option \"a\">><<optionsfrom $list>><</listbox>>");
        assert!(result.is_ok(), "{result:?}");
        assert!(report.is_clean());
    }
}
