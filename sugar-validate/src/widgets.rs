//! Widget discovery in `widget`-tagged passages.

use crate::cursor::{Cursor, is_name_char};
use crate::error::PassageFault;
use crate::registry::Registry;
use crate::report::{Message, Report};
use crate::types::Passage;

const WIDGET_MARKER: &str = "<<widget ";

enum WidgetName<'a> {
    Static { name: &'a str, container: bool },
    Dynamic,
    Invalid,
}

/// Register every `<<widget NAME>>` definition of a widget passage.
///
/// A redefinition fails the whole passage: it is returned as a fault and
/// the passage is skipped by the remaining checks.
pub fn discover(
    passage: &Passage,
    registry: &mut Registry,
    report: &mut Report,
) -> Result<(), PassageFault> {
    if !passage.is_widget() {
        return Ok(());
    }
    let content = passage.content.as_str();
    let mut search = Cursor::new(content);

    while let Some(at) = search.find("<<") {
        search.set_pos(at + 2);
        let mut probe = search;
        probe.skip_whitespace();
        if probe.eat_name() != "widget" {
            continue;
        }
        search = probe;

        match widget_name(&mut search) {
            WidgetName::Static { name, container } => {
                if !registry.define_widget(name, container) {
                    return Err(PassageFault::new(format!(
                        "Widget/macro '{name}' redefinition at {}",
                        passage.excerpt_at(at)
                    )));
                }
                log::trace!("widget <<{name}>> (container: {container})");
            }
            WidgetName::Dynamic => {
                report.unresolved_widgets = true;
                report.add_warning(
                    &passage.header,
                    Message::new("Could not resolve widget name at $$1").arg(passage.excerpt_at(at)),
                );
            }
            WidgetName::Invalid => report.add_error(
                &passage.header,
                format!("Invalid widget definition at {}", passage.excerpt_at(at)),
            ),
        }
    }
    Ok(())
}

/// Story (`$`) and temporary (`_`) variable prefixes.
fn is_sigil(c: char) -> bool {
    c == '$' || c == '_'
}

/// Parse the widget name (bare or quoted) and an optional `container` keyword.
fn widget_name<'a>(cur: &mut Cursor<'a>) -> WidgetName<'a> {
    cur.skip_whitespace();
    let quote = cur.peek().filter(|c| matches!(c, '"' | '\''));
    if let Some(q) = quote {
        cur.bump();
        if cur.peek().is_some_and(is_sigil) {
            return WidgetName::Dynamic;
        }
        let name = cur.eat_while(is_name_char);
        if name.is_empty() || cur.bump() != Some(q) {
            return WidgetName::Invalid;
        }
        return finish(cur, name);
    }
    if cur.peek().is_some_and(is_sigil) {
        return WidgetName::Dynamic;
    }
    let name = cur.eat_while(is_name_char);
    if name.is_empty() {
        return WidgetName::Invalid;
    }
    finish(cur, name)
}

fn finish<'a>(cur: &mut Cursor<'a>, name: &'a str) -> WidgetName<'a> {
    if !cur.peek().is_some_and(|c| c.is_whitespace() || c == '>') {
        return WidgetName::Invalid;
    }
    let mut probe = *cur;
    probe.skip_whitespace();
    let container = probe.eat_name() == "container"
        && probe.peek().is_some_and(|c| c.is_whitespace() || c == '>');
    if container {
        *cur = probe;
    }
    WidgetName::Static { name, container }
}

/// `<<widget …>>` outside a widget passage.
pub fn check_misplaced(passage: &Passage, report: &mut Report) {
    if passage.is_widget() {
        return;
    }
    if let Some(at) = passage.content.find(WIDGET_MARKER) {
        report.add_error(
            &passage.header,
            format!("Widget without a widget tag at {}", passage.excerpt_at(at)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(content: &str) -> (Registry, Report, Result<(), PassageFault>) {
        let passage = Passage::inline("Widgets", "widget", content);
        let mut registry = Registry::builtin();
        let mut report = Report::default();
        let result = discover(&passage, &mut registry, &mut report);
        (registry, report, result)
    }

    #[test]
    fn bare_and_quoted_names() {
        let (registry, report, result) =
            run("<<widget \"hud\">>x<</widget>> <<widget status-bar>>y<</widget>>");
        assert!(result.is_ok());
        assert!(report.is_clean());
        assert!(!registry.get("hud").unwrap().closed);
        assert!(registry.get("status-bar").is_some());
        assert_eq!(registry.widgets(), 2);
    }

    #[test]
    fn container_widgets_are_closed() {
        let (registry, _, _) = run("<<widget \"panel\" container>><<_contents>><</widget>>");
        assert!(registry.get("panel").unwrap().closed);
    }

    #[test]
    fn dynamic_names_are_flagged() {
        let (registry, report, result) = run("<<widget $name>><</widget>>");
        assert!(result.is_ok());
        assert!(report.unresolved_widgets);
        assert_eq!(registry.widgets(), 0);
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn quoted_variable_names_are_dynamic() {
        let (registry, report, result) =
            run("<<widget \"_tmp\">>x<</widget>> <<widget '$name'>>y<</widget>>");
        assert!(result.is_ok());
        assert!(report.unresolved_widgets);
        assert_eq!(registry.widgets(), 0);
        assert_eq!(report.warning_count(), 2);
    }

    #[test]
    fn malformed_definitions_are_errors() {
        let (_, report, result) = run("<<widget \"open>><</widget>>");
        assert!(result.is_ok());
        let errors = report.errors.values().next().unwrap();
        assert!(errors[0].starts_with("Invalid widget definition at <<widget"));
    }

    #[test]
    fn redefinition_fails_the_passage() {
        let (_, _, result) = run("<<widget \"print\">><</widget>>");
        let fault = result.unwrap_err();
        assert!(fault.message.starts_with("Widget/macro 'print' redefinition at <<widget"));
    }

    #[test]
    fn untagged_passages_define_nothing() {
        let passage = Passage::inline("Plain", "", "<<widget \"hud\">><</widget>>");
        let mut registry = Registry::builtin();
        let mut report = Report::default();
        discover(&passage, &mut registry, &mut report).unwrap();
        assert!(registry.get("hud").is_none());

        check_misplaced(&passage, &mut report);
        assert_eq!(report.error_count(), 1);
        assert!(report.errors[&passage.header][0].starts_with("Widget without a widget tag at"));
    }
}
