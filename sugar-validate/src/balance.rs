//! Cheap whole-passage checks that run before the matching engine.

use crate::cursor::Cursor;
use crate::error::PassageFault;
use crate::report::{Message, Report};
use crate::types::Passage;

/// Markers whose count should be even in a well-formed passage.
const PAIRED: &[(&str, &str)] = &[
    ("\"", "Uneven number of double-quotes in passage"),
    ("''", "Uneven number of dual-quotes in passage"),
    ("//", "Uneven number of dual-slashes in passage"),
];

/// Warn about odd counts of quote-like markers.
pub fn check_quote_parity(passage: &Passage, report: &mut Report) {
    for (marker, warning) in PAIRED {
        if passage.content.matches(marker).count() % 2 == 1 {
            report.add_warning(&passage.header, Message::new(*warning));
        }
    }
}

/// Every `<<` must be closed by a later `>>` and vice versa.
pub fn check_macro_brackets(passage: &Passage) -> Result<(), PassageFault> {
    let mut cursor = Cursor::new(&passage.content);
    let mut open = Vec::new();

    loop {
        let next_open = cursor.find("<<");
        let next_close = cursor.find(">>");
        match (next_open, next_close) {
            (Some(o), c) if c.is_none_or(|c| o < c) => {
                open.push(o);
                cursor.set_pos(o + 2);
            }
            (_, Some(c)) => {
                if open.pop().is_none() {
                    return Err(PassageFault::new(format!(
                        "Found a closing '>>' without matching '<<' at {}",
                        passage.excerpt_at(c)
                    )));
                }
                cursor.set_pos(c + 2);
            }
            _ => break,
        }
    }

    match open.last() {
        Some(&o) => Err(PassageFault::new(format!(
            "Found an opening '<<' without matching '>>' at {}",
            passage.excerpt_at(o)
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn passage(content: &str) -> Passage {
        Passage::inline("Start", "", content)
    }

    #[test]
    fn balanced_brackets_pass() {
        assert!(check_macro_brackets(&passage("<<if $x>>a<<else>>b<</if>>")).is_ok());
        assert!(check_macro_brackets(&passage("no macros > here")).is_ok());
    }

    #[test]
    fn stray_close_is_reported_at_its_position() {
        let err = check_macro_brackets(&passage("text >> more")).unwrap_err();
        assert_eq!(err.message, "Found a closing '>>' without matching '<<' at >> more");
    }

    #[test]
    fn leftover_open_reports_the_innermost() {
        let err = check_macro_brackets(&passage("<<set $a to 1>> <<print $a")).unwrap_err();
        assert_eq!(err.message, "Found an opening '<<' without matching '>>' at <<print $a");
    }

    #[test]
    fn quote_parity_warnings() {
        let p = passage("\"odd ''and'' http://x");
        let mut report = Report::default();
        check_quote_parity(&p, &mut report);
        let rendered: Vec<_> = report.warnings[&p.header].iter().map(Message::render).collect();
        assert_eq!(
            rendered,
            vec![
                "Uneven number of double-quotes in passage",
                "Uneven number of dual-slashes in passage",
            ]
        );
    }
}
