//! Heuristic checks for expressions inside macros.
//!
//! Nothing here parses TwineScript. Conditions are matched with a handful
//! of patterns; `<<set>>` bodies are reduced by a fixed chain of textual
//! rewrites until a well-formed assignment collapses to `x=x`. Whatever
//! does not collapse is reported as a warning.

use std::sync::LazyLock;

use regex::Regex;

use crate::cursor::Cursor;
use crate::error::PassageFault;
use crate::report::{Message, Report};
use crate::types::Passage;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

/// An ordered rewrite: every match of the pattern is replaced.
struct Rewrite {
    pattern: Regex,
    replacement: &'static str,
}

impl Rewrite {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: re(pattern),
            replacement,
        }
    }

    fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, self.replacement).into_owned()
    }
}

fn apply_all(rewrites: &[Rewrite], text: String) -> String {
    rewrites.iter().fold(text, |acc, rw| rw.apply(&acc))
}

static MIXED_COMPARATOR: LazyLock<Regex> =
    LazyLock::new(|| re(r"<<[^>]* (is(not)?|not) (gt|gte|lt|lte|eq|neq|def|ndef) [^>]*>>"));
static IS_NOT: LazyLock<Regex> = LazyLock::new(|| re(r"<<[^>]* is not [^>]*>>"));
static BARE_COMPARISON: LazyLock<Regex> =
    LazyLock::new(|| re(r"<<[^>]*([^<]<[^<]|[^>=]>[^>])[^>]*>>"));
static BRANCH: LazyLock<Regex> = LazyLock::new(|| re(r"<<\s*(?:if|elseif)\s[^>]*>>"));

/// Replace string literals with ` x ` and block comments with a space.
///
/// An unterminated literal or comment leaves the rest of the text as is.
pub fn strip_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = Cursor::new(text);

    while let Some(c) = cursor.peek() {
        match c {
            '\'' | '"' | '`' => {
                let Some(end) = Cursor::at(text, cursor.pos() + 1).find(&c.to_string()) else {
                    out.push_str(cursor.rest());
                    break;
                };
                out.push_str(" x ");
                cursor.set_pos(end + 1);
            }
            '/' if cursor.starts_with("/*") => {
                let Some(end) = Cursor::at(text, cursor.pos() + 2).find("*/") else {
                    out.push_str(cursor.rest());
                    break;
                };
                out.truncate(out.trim_end_matches(' ').len());
                out.push(' ');
                cursor.set_pos(end + 2);
                cursor.eat_while(|c| c == ' ');
            }
            _ => {
                out.push(c);
                cursor.bump();
            }
        }
    }
    out
}

/// Matches of `pattern` that contain no nested macro and still match once
/// literals are stripped.
fn suspicious<'t>(pattern: &'t Regex, text: &'t str) -> impl Iterator<Item = &'t str> + 't {
    pattern
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|m| !m[1..].contains("<<"))
        .filter(move |m| pattern.is_match(&strip_literals(m)))
}

/// Comparator misuse in macro arguments.
///
/// Mixing `is`/`isnot`/`not` with another comparator is fatal; the other
/// findings are warnings.
pub fn check_conditions(passage: &Passage, report: &mut Report) -> Result<(), PassageFault> {
    let text = passage.content.as_str();

    if let Some(m) = suspicious(&MIXED_COMPARATOR, text).next() {
        return Err(PassageFault::new(format!(
            "Invalid condition found: '{m}', is/isnot should not be used in combination with other comparators"
        )));
    }
    for m in suspicious(&IS_NOT, text) {
        report.add_warning(
            &passage.header,
            Message::new("Unexpected condition found: '$$1'. Is this intended?").arg(m),
        );
    }
    for m in suspicious(&BARE_COMPARISON, text) {
        report.add_warning(
            &passage.header,
            Message::new("Non-standard condition found: '$$1'. Use [lte|lt|gte|gt] instead?").arg(m),
        );
    }
    for m in BRANCH.find_iter(text).map(|m| m.as_str()) {
        if m[1..].contains("<<") {
            continue;
        }
        let stripped = strip_literals(m);
        if stripped.contains("&&") || stripped.contains("||") {
            report.add_warning(
                &passage.header,
                Message::new("Non-standard logical operator found: '$$1'. Use [and|or] instead?")
                    .arg(m),
            );
        }
    }
    Ok(())
}

/// Operator canonicalization and identifier collapse, in order.
static CANONICALIZE: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    vec![
        // allocations and unary operators
        Rewrite::new(r"([^\w$.^)}\]])new ", "${1}"),
        Rewrite::new(r"([^\w$.^)}\]])([!~^])([^.)}\]])", "${1} ${3}"),
        // TwineScript keywords
        Rewrite::new(r" to ", " ="),
        Rewrite::new(r" (or|and) ", " & "),
        Rewrite::new(r"([^\w$])(not|def|ndef) ", "${1} "),
        Rewrite::new(r" (isnot|is|lte|gte|gt|lt|eq|neq) ", " < "),
        // signs
        Rewrite::new(r"[+-][ ]*[+-]", "+"),
        Rewrite::new(r"([<:?,=({\[])[ ]*[+-]", "${1}0+"),
        // operands
        Rewrite::new(r"[$_]?[a-zA-Z]\w*", "x"),
        Rewrite::new(r"[0-9]*[\.]?[0-9]+", "x"),
        // operators
        Rewrite::new(r"(===|!==|==|!=|<=|>=|&&|\|\|)", "&"),
        Rewrite::new(r"[<%|+-]", "&"),
        Rewrite::new(r"([^/])\*([^/])", "${1}&${2}"),
        Rewrite::new(r"([^*])/([^*])", "${1}&${2}"),
        Rewrite::new(r"&=", " ="),
    ]
});

static COSMETIC: LazyLock<Regex> = LazyLock::new(|| re(r"(x[\s]+\(|\.[\s]+x)"));

static EMPTY_ELEMENTS: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    vec![
        Rewrite::new(r",[\s]*([,})\]])", "${1}"),
        Rewrite::new(r"([{\[])[\s]*,", "${1}"),
    ]
});

static SPACING: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    vec![
        Rewrite::new(r"[ ]+", " "),
        Rewrite::new(r"[ ]*([^ x])[ ]*", "${1}"),
    ]
});

/// Structural reductions, applied until nothing changes.
static REDUCE: LazyLock<Vec<Rewrite>> = LazyLock::new(|| {
    vec![
        // member access
        Rewrite::new(r"([x})\]])\.x(\(\)|$)", "${1}"),
        Rewrite::new(r"([x})\]])\.x([^(])", "${1}${2}"),
        // binary and ternary operators
        Rewrite::new(
            r"(x|x\(\)|x?\(x\)|x?\[\])[ ]*&[ ]*(x|x\(\)|\(x\)|\[\])",
            "x",
        ),
        Rewrite::new(
            r"(x|x\(\)|x?\(x\)|x?\[\])\?(x|x\(\)|\(x\)|\[\]|\{\}):(x|x\(\)|\(x\)|\[\]|\{\})",
            "x",
        ),
        // argument lists and literals
        Rewrite::new(r"([({\[])x,[ ]*x", "${1}x"),
        Rewrite::new(r"x\(x\)", "x()"),
        Rewrite::new(r"\[x\]", "[]"),
        Rewrite::new(r"\{x\}", "{}"),
        // groups
        Rewrite::new(r"([ &=])[ ]*\(x\)", "${1}x"),
        Rewrite::new(r"\(x\)[ ]*&", "x&"),
        // nested calls
        Rewrite::new(r"([,({\[])(x\(\)|\[\]|\{\})([)},\]])", "${1}x${3}"),
        Rewrite::new(r"([&=])[ ]*x(\(\)|\[\])", "${1}x"),
        Rewrite::new(r"\[([^\]]*)x\(\)([^\]]*)\]", "[${1}x${2}]"),
        Rewrite::new(r"\{([^}]*)x\(\)([^}]*)\}", "{${1}x${2}}"),
        Rewrite::new(
            r"([{,])x[ ]*:[ ]*(x|x\(\)|\(x\)|\[\]|\{\})[ ]*([,}])",
            "${1}x${3}",
        ),
        // index access
        Rewrite::new(r"([x)}\]])\[\]", "${1}"),
    ]
});

static EMPTY_LITERAL_ASSIGN: LazyLock<Rewrite> =
    LazyLock::new(|| Rewrite::new(r"=[ ]*(\[\]|\{\})", "=x"));
static SIMPLE_ASSIGN: LazyLock<Regex> = LazyLock::new(|| re(r"^x[ ]*=[ ]*x$"));
static MULTI_ASSIGN: LazyLock<Regex> = LazyLock::new(|| re(r"^x([ ]*=[ ]*x)+$"));

fn until_stable(rewrites: &[Rewrite], mut text: String) -> String {
    loop {
        let next = apply_all(rewrites, text.clone());
        if next == text {
            return text;
        }
        text = next;
    }
}

/// Problems found in one `<<set>>` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetterIssue {
    Empty,
    EmptyMidAssignment,
    MultiAssign,
    NotAnAssignment,
    Unparsed,
}

impl SetterIssue {
    fn template(self) -> &'static str {
        match self {
            SetterIssue::Empty => "Empty assignment at $$1",
            SetterIssue::EmptyMidAssignment => "Empty mid-assignment at $$1",
            SetterIssue::MultiAssign => "Multi-assign at $$1",
            SetterIssue::NotAnAssignment => "Not an assignment at $$1",
            SetterIssue::Unparsed => "Could not parse assignment at $$1",
        }
    }
}

/// Outcome of reducing one setter body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetterVerdict {
    /// The fully reduced form, e.g. `x=x`.
    pub reduced: String,
    pub issue: Option<SetterIssue>,
    /// `x (` or `. x` spacing.
    pub cosmetic: bool,
}

/// Reduce a `<<set>>` body and classify the result.
pub fn classify_setter(body: &str) -> SetterVerdict {
    let stripped = strip_literals(body);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return SetterVerdict {
            reduced: String::new(),
            issue: Some(SetterIssue::Empty),
            cosmetic: false,
        };
    }
    let spaced: String = trimmed
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();

    let canonical = apply_all(&CANONICALIZE, spaced);
    let cosmetic = COSMETIC.is_match(&canonical);
    let compact = apply_all(&SPACING, until_stable(&EMPTY_ELEMENTS, canonical));
    let reduced = EMPTY_LITERAL_ASSIGN.apply(&until_stable(&REDUCE, compact));

    let segments: Vec<&str> = reduced.split([',', ';']).collect();
    let mut issue = None;
    for (i, segment) in segments.iter().enumerate() {
        if SIMPLE_ASSIGN.is_match(segment) {
            continue;
        }
        if segment.is_empty() {
            if issue.is_none() && i + 1 != segments.len() {
                issue = Some(SetterIssue::EmptyMidAssignment);
            }
            continue;
        }
        issue = Some(if MULTI_ASSIGN.is_match(segment) {
            SetterIssue::MultiAssign
        } else if *segment == "x()" {
            SetterIssue::NotAnAssignment
        } else {
            SetterIssue::Unparsed
        });
        break;
    }

    SetterVerdict {
        reduced,
        issue,
        cosmetic,
    }
}

/// Classify every `<<set …>>` in the passage.
pub fn check_setters(passage: &Passage, report: &mut Report) {
    let text = passage.content.as_str();
    let mut search = Cursor::new(text);

    while let Some(at) = search.find("<<set") {
        let body_start = at + "<<set".len();
        search.set_pos(body_start);
        // an unterminated setter is reported by the bracket check
        let Some(body_end) = search.find(">>") else {
            continue;
        };
        let body = &text[body_start..body_end];
        if !(body.is_empty() || body.starts_with(char::is_whitespace)) {
            continue;
        }

        let verdict = classify_setter(body);
        log::trace!("<<set{body}>> reduced to {:?}", verdict.reduced);
        let excerpt = passage.excerpt_at(at);
        if verdict.cosmetic {
            report.add_warning(
                &passage.header,
                Message::new("Cosmetic issue at $$1").arg(&excerpt),
            );
        }
        if let Some(issue) = verdict.issue {
            report.add_warning(&passage.header, Message::new(issue.template()).arg(excerpt));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn issue(body: &str) -> Option<SetterIssue> {
        classify_setter(body).issue
    }

    #[test]
    fn literals_and_comments_are_blanked() {
        assert_eq!(strip_literals("a 'b' \"c\" `d` e"), "a  x   x   x  e");
        assert_eq!(strip_literals("a  /* c */  b"), "a b");
        assert_eq!(strip_literals("a 'open"), "a 'open");
    }

    #[test]
    fn plain_assignments_reduce_to_x_eq_x() {
        for body in [
            " $a to 1",
            " $a to $b + 1, $c to \"s\"",
            " _i = -1",
            " $list to [1, 2, 3]; $map to {a: 1, b: [2]}",
            " $a to Math.max(1, $b.length)",
            " $x to $y is 2 and not $z",
            " $n to $flag ? 1 : 2",
            " $obj to new Map()",
            " $a to ($b * 2) / 3",
            " $a to []",
            " $a += 1",
            " $a to 1;",
        ] {
            let verdict = classify_setter(body);
            assert_eq!(verdict.issue, None, "{body} reduced to {}", verdict.reduced);
            assert!(!verdict.cosmetic, "{body}");
        }
    }

    #[test]
    fn classification_of_broken_setters() {
        assert_eq!(issue(" "), Some(SetterIssue::Empty));
        assert_eq!(issue(""), Some(SetterIssue::Empty));
        assert_eq!(issue(" $a to 1;; $b to 2"), Some(SetterIssue::EmptyMidAssignment));
        assert_eq!(issue(" $a to $b to 2"), Some(SetterIssue::MultiAssign));
        assert_eq!(issue(" doThing()"), Some(SetterIssue::NotAnAssignment));
        assert_eq!(issue(" $a to"), Some(SetterIssue::Unparsed));
        assert_eq!(issue(" $x to 5, $y"), Some(SetterIssue::Unparsed));
    }

    #[test]
    fn cosmetic_spacing_is_independent() {
        let verdict = classify_setter(" $a to Math.max (1, 2)");
        assert!(verdict.cosmetic);
        assert_eq!(verdict.issue, None);
    }

    fn passage(content: &str) -> Passage {
        Passage::inline("Start", "", content)
    }

    fn rendered(report: &Report) -> Vec<String> {
        report
            .warnings
            .values()
            .flatten()
            .map(Message::render)
            .collect()
    }

    #[test]
    fn setters_in_passages() {
        let p = passage("<<set $a to 1>><<set doThing()>><<setplaylist \"x\">><<set>>");
        let mut report = Report::default();
        check_setters(&p, &mut report);
        assert_eq!(
            rendered(&report),
            vec![
                "Not an assignment at <<set doThing()>><<setplaylist \"x\">><<set>>",
                "Empty assignment at <<set>>",
            ]
        );
    }

    #[test]
    fn mixed_comparators_are_fatal() {
        let err = check_conditions(&passage("<<if $a is gt 2>>x<</if>>"), &mut Report::default())
            .unwrap_err();
        assert_eq!(
            err.message,
            "Invalid condition found: '<<if $a is gt 2>>', is/isnot should not be used in combination with other comparators"
        );
    }

    #[test]
    fn condition_warnings() {
        let p = passage(
            "<<if $a is not 2>>x<</if>><<if $b > 3>>y<</if>><<if $c && $d>>z<</if>><<if $e is \"a > b\">>w<</if>>",
        );
        let mut report = Report::default();
        check_conditions(&p, &mut report).unwrap();
        assert_eq!(
            rendered(&report),
            vec![
                "Unexpected condition found: '<<if $a is not 2>>'. Is this intended?",
                "Non-standard condition found: '<<if $b > 3>>'. Use [lte|lt|gte|gt] instead?",
                "Non-standard logical operator found: '<<if $c && $d>>'. Use [and|or] instead?",
            ]
        );
    }

    #[test]
    fn conditions_inside_strings_are_ignored() {
        let p = passage("<<print \"x is not y\">><<link \"a is gt b\">><</link>>");
        let mut report = Report::default();
        assert!(check_conditions(&p, &mut report).is_ok());
        assert!(report.is_clean());
    }
}
