//! Duplicate and overwritten rules in the embedded user stylesheet.
//!
//! Only braces, selectors and property names are tracked. Values, nesting
//! and at-rule bodies are never interpreted.

use std::collections::{BTreeMap, BTreeSet};

use crate::extract;
use crate::report::{Message, Report, STYLESHEET_KEY};

/// One earlier rule that mentioned a selector.
#[derive(Debug)]
struct Declared {
    properties: BTreeSet<String>,
    grouped: bool,
}

/// A top-level rule: its selector list and the property names of its body.
#[derive(Debug, PartialEq, Eq)]
struct Rule {
    selector: String,
    properties: Vec<String>,
}

/// Check the stylesheet embedded in `document`, if there is one.
pub fn check_stylesheet(document: &str, report: &mut Report) {
    if let Some(css) = extract::user_stylesheet(document) {
        check_css(css, report);
    }
}

/// Check raw stylesheet text.
pub fn check_css(css: &str, report: &mut Report) {
    let css = strip_comments(css);
    let mut seen: BTreeMap<String, Vec<Declared>> = BTreeMap::new();

    for rule in top_level_rules(&css) {
        let mut unique = BTreeSet::new();
        for property in &rule.properties {
            if !unique.insert(property.clone()) {
                report.add_warning(
                    STYLESHEET_KEY,
                    Message::new("Property '$$1' is declared more than once for '$$2'")
                        .arg(property)
                        .arg(&rule.selector),
                );
            }
        }

        let selectors: Vec<&str> = rule
            .selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        let grouped = selectors.len() > 1;

        for selector in selectors {
            let earlier = seen.entry(selector.to_string()).or_default();
            if let Some(message) = earlier
                .iter()
                .find_map(|prev| compare(selector, prev, &unique, grouped))
            {
                report.add_warning(STYLESHEET_KEY, message);
            }
            earlier.push(Declared {
                properties: unique.clone(),
                grouped,
            });
        }
    }
}

fn compare(
    selector: &str,
    prev: &Declared,
    properties: &BTreeSet<String>,
    grouped: bool,
) -> Option<Message> {
    if prev.properties == *properties {
        return Some(
            Message::new("Rule for '$$1' overwrites an earlier identical declaration").arg(selector),
        );
    }
    if !prev.grouped && !grouped {
        return Some(Message::new("Rules for '$$1' could be merged").arg(selector));
    }
    let overlap: Vec<&str> = prev
        .properties
        .intersection(properties)
        .map(String::as_str)
        .collect();
    (!overlap.is_empty()).then(|| {
        Message::new("Attribute(s) $$2 of '$$1' overwritten")
            .arg(selector)
            .arg(overlap.join(", "))
    })
}

/// Remove `/* … */` comments; an unterminated comment runs to the end.
fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        rest = match rest[start + 2..].find("*/") {
            Some(end) => &rest[start + 2 + end + 2..],
            None => "",
        };
    }
    out.push_str(rest);
    out
}

/// Split a comment-free stylesheet into its top-level rules. At-rules are
/// dropped along with their nested blocks, and only depth-1 text of a rule
/// body is read for property names.
fn top_level_rules(css: &str) -> Vec<Rule> {
    let mut rules = Vec::new();
    let mut depth = 0usize;
    let mut segment_start = 0;
    let mut selector = "";
    let mut body = String::new();

    for (i, c) in css.char_indices() {
        match c {
            '{' => {
                match depth {
                    0 => {
                        selector = css[segment_start..i].trim();
                        body.clear();
                    }
                    // drop the nested block's selector
                    1 => body.truncate(body.rfind(';').map_or(0, |at| at + 1)),
                    _ => {}
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 1 {
                    body.push(';');
                } else if depth == 0 {
                    if !selector.starts_with('@') {
                        rules.push(Rule {
                            selector: selector.to_string(),
                            properties: property_names(&body),
                        });
                    }
                    segment_start = i + 1;
                }
            }
            // statement at-rules such as `@import …;`
            ';' if depth == 0 => segment_start = i + 1,
            _ if depth == 1 => body.push(c),
            _ => {}
        }
    }
    rules
}

fn property_names(body: &str) -> Vec<String> {
    body.split(';')
        .filter_map(|decl| decl.split_once(':'))
        .map(|(name, _)| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn warnings(css: &str) -> Vec<String> {
        let mut report = Report::default();
        check_css(css, &mut report);
        report
            .warnings
            .get(STYLESHEET_KEY)
            .map(|w| w.iter().map(Message::render).collect())
            .unwrap_or_default()
    }

    #[test]
    fn identical_redeclaration_overwrites() {
        assert_eq!(
            warnings("a{color:red} a{color:blue}"),
            vec!["Rule for 'a' overwrites an earlier identical declaration"]
        );
    }

    #[test]
    fn single_selector_rules_could_merge() {
        assert_eq!(
            warnings("a{color:red} a{font-size:1em}"),
            vec!["Rules for 'a' could be merged"]
        );
    }

    #[test]
    fn grouped_rules_report_overlap() {
        assert_eq!(
            warnings("a, b { color: red; margin: 0 }\nb { color: blue; padding: 0 }"),
            vec!["Attribute(s) color of 'b' overwritten"]
        );
        assert!(warnings("a, b { color: red }\nb { padding: 0 }").is_empty());
    }

    #[test]
    fn repeated_property_in_one_rule() {
        assert_eq!(
            warnings(".box { color: red; COLOR: blue; }"),
            vec!["Property 'color' is declared more than once for '.box'"]
        );
    }

    #[test]
    fn at_rules_and_comments_are_skipped() {
        let css = "@import url(x.css);\n/* a{color:red} */\na { color: red }\n\
                   @media (max-width: 10px) { a { color: blue } }\n\
                   @font-face { font-family: x; }";
        assert!(warnings(css).is_empty());
    }

    #[test]
    fn nested_blocks_do_not_leak_properties() {
        let rules = top_level_rules("a { color: red; &:hover { color: blue } margin: 0 }");
        assert_eq!(
            rules,
            vec![Rule {
                selector: "a".into(),
                properties: vec!["color".into(), "margin".into()],
            }]
        );
    }

    #[test]
    fn stylesheet_is_read_from_the_document() {
        let doc = "<style role=\"stylesheet\" id=\"twine-user-stylesheet\" type=\"text/twine-css\">\
                   a{color:red} a{color:blue}</style>";
        let mut report = Report::default();
        check_stylesheet(doc, &mut report);
        assert_eq!(report.warning_count(), 1);
    }
}
