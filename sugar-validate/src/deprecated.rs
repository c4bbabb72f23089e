//! Obsolete SugarCube markup and script APIs.

use crate::cursor::{self, Cursor, is_ident_char};
use crate::extract;
use crate::report::{Message, Report, USER_SCRIPT_KEY};
use crate::types::{ExclusionKind, Passage};

/// A deprecated token and what to use instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deprecation {
    pub token: &'static str,
    pub replacement: &'static str,
}

const fn dep(token: &'static str, replacement: &'static str) -> Deprecation {
    Deprecation { token, replacement }
}

/// Passage markup; reported once per passage.
pub const MARKUP: &[Deprecation] = &[
    dep("<<click", "<<link"),
    dep("<<endclick>>", "<</link>>"),
    dep("<</click>>", "<</link>>"),
    dep("<<endif>>", "<</if>>"),
    dep("<<endnobr>>", "<</nobr>>"),
    dep("<<endsilently>>", "<</silently>>"),
    dep("<<endfor>>", "<</for>>"),
    dep("<<endscript>>", "<</script>>"),
    dep("<<endbutton>>", "<</button>>"),
    dep("<<endappend>>", "<</append>>"),
    dep("<<endprepend>>", "<</prepend>>"),
    dep("<<endreplace>>", "<</replace>>"),
    dep("<<endwidget>>", "<</widget>>"),
    dep("<<setplaylist", "<<createplaylist"),
    dep("<<stopallaudio>>", "<<audio \":all\" stop>>"),
    dep("<<display", "<<include"),
    dep("<<forget", "forget()"),
    dep("<<remember", "memorize()/recall()"),
];

/// Script APIs; checked in passages, `<<script>>` zones and the user script.
pub const SCRIPT: &[Deprecation] = &[
    dep("state.active.variables", "State.variables"),
    dep("State.initPRNG(", "State.prng.init("),
    dep(".containsAll(", ".includesAll("),
    dep(".containsAny(", ".includesAny("),
    dep(".flatten(", ".flat("),
    dep("macros.", "Macro.add("),
];

const LEGACY_SCRIPT_CLOSE: &str = "<<endscript>>";

/// Next occurrence of `token` at or after `from`. Tokens that start like an
/// identifier must not continue a longer identifier or member access.
pub fn find_token(text: &str, token: &str, from: usize) -> Option<usize> {
    let bounded = token.starts_with(is_ident_char);
    let mut cursor = Cursor::at(text, from);
    while let Some(at) = cursor.find(token) {
        let glued = Cursor::at(text, at)
            .char_before()
            .is_some_and(|c| is_ident_char(c) || c == '.');
        if !bounded || !glued {
            return Some(at);
        }
        cursor.set_pos(at + token.len());
    }
    None
}

fn deprecated_at(dep: &Deprecation, excerpt: &str) -> Message {
    Message::new("Deprecated '$$1' (should be '$$2') found at $$3")
        .arg(dep.token)
        .arg(dep.replacement)
        .arg(excerpt)
}

/// Report the first occurrence of every deprecated token in a passage.
pub fn check_passage(passage: &Passage, report: &mut Report) {
    let zones: Vec<String> = passage.script_zones().collect();

    for dep in MARKUP {
        let hit = find_token(&passage.content, dep.token, 0)
            .map(|at| passage.excerpt_at(at))
            .or_else(|| {
                // `<<script>>` zones closed the old way
                let legacy_close = dep.token == LEGACY_SCRIPT_CLOSE
                    && zones.iter().any(|z| z.ends_with(LEGACY_SCRIPT_CLOSE));
                legacy_close.then(|| LEGACY_SCRIPT_CLOSE.to_string())
            });
        if let Some(excerpt) = hit {
            report.add_warning(&passage.header, deprecated_at(dep, &excerpt));
        }
    }

    for dep in SCRIPT {
        let hit = find_token(&passage.content, dep.token, 0)
            .map(|at| passage.excerpt_at(at))
            .or_else(|| {
                zones.iter().find_map(|zone| {
                    find_token(zone, dep.token, 0).map(|at| cursor::excerpt(zone, at).to_string())
                })
            });
        if let Some(excerpt) = hit {
            report.add_warning(&passage.header, deprecated_at(dep, &excerpt));
        }
    }
}

/// Report every deprecated API use in the embedded user script, with its
/// document line. Commented-out lines are skipped.
pub fn check_user_script(document: &str, report: &mut Report) {
    let Some((script_start, script)) = extract::user_script(document) else {
        return;
    };
    for dep in SCRIPT {
        let mut from = 0;
        while let Some(at) = find_token(script, dep.token, from) {
            from = at + dep.token.len();
            let line_start = script[..at].rfind('\n').map_or(0, |nl| nl + 1);
            let line_end = Cursor::at(script, at).find("\n").unwrap_or(script.len());
            let line = script[line_start..line_end].trim();
            if line.starts_with("//") || line.starts_with("/*") {
                continue;
            }
            report.add_warning(
                USER_SCRIPT_KEY,
                Message::new("Line $$1: $$2 ('$$3' should be '$$4')")
                    .arg(cursor::line_of(document, script_start + at))
                    .arg(line)
                    .arg(dep.token)
                    .arg(dep.replacement),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Exclusion;
    use pretty_assertions::assert_eq;

    fn rendered(report: &Report) -> Vec<String> {
        report
            .warnings
            .values()
            .flatten()
            .map(Message::render)
            .collect()
    }

    #[test]
    fn first_occurrence_only() {
        let p = Passage::inline("A", "", "<<if $a>>x<<endif>> <<if $b>>y<<endif>>");
        let mut report = Report::default();
        check_passage(&p, &mut report);
        assert_eq!(
            rendered(&report),
            vec!["Deprecated '<<endif>>' (should be '<</if>>') found at <<endif>> <<if $b>>y<<endif>>"]
        );
    }

    #[test]
    fn identifier_tokens_need_a_boundary() {
        assert_eq!(find_token("mymacros.x macros.y", "macros.", 0), Some(11));
        assert_eq!(find_token("a.state.active.variables", "state.active.variables", 0), None);
        assert_eq!(find_token("x.containsAll(1)", ".containsAll(", 0), Some(1));
        assert_eq!(find_token("x<<click", "<<click", 0), Some(1));
    }

    #[test]
    fn script_zones_are_searched() {
        let mut p = Passage::inline("A", "", "before after");
        p.exclusions.push(Exclusion {
            kind: ExclusionKind::Script,
            offset: 7,
            raw: "<<script>>state.active.variables.x = 1;<<endscript>>".into(),
        });
        let mut report = Report::default();
        check_passage(&p, &mut report);
        let warnings = rendered(&report);
        assert_eq!(warnings.len(), 2);
        assert_eq!(
            warnings[0],
            "Deprecated '<<endscript>>' (should be '<</script>>') found at <<endscript>>"
        );
        assert!(warnings[1].starts_with(
            "Deprecated 'state.active.variables' (should be 'State.variables') found at state.active.variables.x"
        ));
    }

    #[test]
    fn user_script_reports_every_line() {
        let doc = "<tw-storydata>\n<script role=\"script\" id=\"twine-user-script\">\nvar a = list.flatten();\n// old: list.flatten()\nvar b = other.flatten();\n</script>";
        let mut report = Report::default();
        check_user_script(doc, &mut report);
        assert_eq!(
            rendered(&report),
            vec![
                "Line 3: var a = list.flatten(); ('.flatten(' should be '.flat(')",
                "Line 5: var b = other.flatten(); ('.flatten(' should be '.flat(')",
            ]
        );
    }
}
