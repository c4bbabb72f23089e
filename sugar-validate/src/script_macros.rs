//! Discovery of custom macro declarations in the embedded user script.
//!
//! Recognized shapes:
//! ```js
//! Macro.add("name", { tags: ["sub"], handler() { … } });
//! Macro.add(["a", "b"], { handler: function () { … } });
//! macros.name = { handler: function () { … } };      // legacy
//! macros["name"] = { tags: null, handler() { … } };  // legacy
//! ```
//!
//! Nothing is evaluated. A candidate span is grown to each successive
//! closing delimiter and handed to a small recursive-descent parser for the
//! narrow "names + options object" grammar; object property values other
//! than `tags` are skipped as balanced token runs. Giving up after
//! [`MAX_ATTEMPTS`] candidates marks the declaration as unresolved.

use crate::cursor::{Cursor, is_ident_char};

/// How many closing delimiters a declaration may span before giving up.
pub const MAX_ATTEMPTS: usize = 256;

const MODERN_CALL: &str = "Macro.add(";
const LEGACY_ROOT: &str = "macros";

/// A statically understood macro declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub names: Vec<String>,
    /// `None` when the options object has no `tags` key (simple macro).
    pub tags: Option<Vec<String>>,
    /// Byte offset of the declaration in the script.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    Declared(Declaration),
    Unresolved { offset: usize },
}

/// Find all `Macro.add(…)` declarations.
pub fn scan_modern(script: &str) -> Vec<Scan> {
    let mut found = Vec::new();
    let mut search = Cursor::new(script);

    while let Some(at) = search.find(MODERN_CALL) {
        if Cursor::at(script, at)
            .char_before()
            .is_some_and(|c| is_ident_char(c) || c == '.')
        {
            search.set_pos(at + MODERN_CALL.len());
            continue;
        }
        let parsed = grow(script, at, at + MODERN_CALL.len(), ')', |span| {
            LiteralParser::new(span).modern_call()
        });
        match parsed {
            Some(((names, tags), end)) => {
                found.push(Scan::Declared(Declaration {
                    names,
                    tags,
                    offset: at,
                }));
                search.set_pos(end);
            }
            None => {
                found.push(Scan::Unresolved { offset: at });
                search.set_pos(at + 1);
            }
        }
    }
    found
}

/// Find legacy `macros.name = {…}` / `macros["name"] = {…}` assignments.
pub fn scan_legacy(script: &str) -> Vec<Scan> {
    let mut found = Vec::new();
    let mut search = Cursor::new(script);

    while let Some(at) = search.find(LEGACY_ROOT) {
        search.set_pos(at + LEGACY_ROOT.len());
        if Cursor::at(script, at).char_before().is_some_and(is_ident_char) {
            continue;
        }
        let mut head = LiteralParser::new(script);
        head.cur.set_pos(at + LEGACY_ROOT.len());
        let Some(name) = head.legacy_target() else {
            continue;
        };
        let object_start = head.cur.pos();
        let parsed = grow(script, object_start, object_start + 1, '}', |span| {
            LiteralParser::new(span).whole_object()
        });
        match parsed {
            Some((tags, end)) => {
                found.push(Scan::Declared(Declaration {
                    names: vec![name],
                    tags,
                    offset: at,
                }));
                search.set_pos(end);
            }
            None => found.push(Scan::Unresolved { offset: at }),
        }
    }
    found
}

/// Grow the candidate span `script[start..=delimiter]` one closing delimiter
/// at a time until `parse` accepts it. Returns the parse result and the
/// offset just past the accepted span.
fn grow<T>(
    script: &str,
    start: usize,
    search_from: usize,
    delimiter: char,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<(T, usize)> {
    let mut cursor = Cursor::at(script, search_from);
    for _ in 0..MAX_ATTEMPTS {
        let close = cursor.rest().find(delimiter)? + cursor.pos();
        let end = close + delimiter.len_utf8();
        if let Some(parsed) = parse(&script[start..end]) {
            return Some((parsed, end));
        }
        cursor.set_pos(end);
    }
    None
}

struct LiteralParser<'a> {
    cur: Cursor<'a>,
}

impl<'a> LiteralParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            cur: Cursor::new(text),
        }
    }

    /// `Macro.add( names , { … } )` spanning the whole input.
    fn modern_call(mut self) -> Option<(Vec<String>, Option<Vec<String>>)> {
        if !self.cur.eat(MODERN_CALL) {
            return None;
        }
        self.ws();
        let names = self.names()?;
        self.ws();
        if !self.cur.eat(",") {
            return None;
        }
        self.ws();
        let tags = self.object()?;
        self.ws();
        if self.cur.eat(",") {
            self.ws();
        }
        if !self.cur.eat(")") {
            return None;
        }
        self.cur.is_eof().then_some((names, tags))
    }

    /// A single `{ … }` spanning the whole input.
    fn whole_object(mut self) -> Option<Option<Vec<String>>> {
        let tags = self.object()?;
        self.cur.is_eof().then_some(tags)
    }

    /// After `macros`: `.name = {` or `[ "name" ] = {`; stops on the `{`.
    fn legacy_target(&mut self) -> Option<String> {
        let name = if self.cur.eat(".") {
            let name = self.cur.eat_while(is_ident_char);
            if name.is_empty() {
                return None;
            }
            name.to_string()
        } else if self.cur.eat("[") {
            self.ws();
            let name = self.string()?;
            self.ws();
            if !self.cur.eat("]") {
                return None;
            }
            name
        } else {
            return None;
        };
        self.ws();
        if !self.cur.eat("=") || self.cur.starts_with("=") {
            return None;
        }
        self.ws();
        self.cur.starts_with("{").then_some(name)
    }

    fn names(&mut self) -> Option<Vec<String>> {
        if !self.cur.eat("[") {
            return Some(vec![self.string()?]);
        }
        let mut names = Vec::new();
        loop {
            self.ws();
            if self.cur.eat("]") {
                return Some(names);
            }
            names.push(self.string()?);
            self.ws();
            if !self.cur.eat(",") {
                self.ws();
                return self.cur.eat("]").then_some(names);
            }
        }
    }

    /// Parse an object literal; returns the `tags` value if the key is present.
    fn object(&mut self) -> Option<Option<Vec<String>>> {
        if !self.cur.eat("{") {
            return None;
        }
        let mut tags = None;
        loop {
            self.ws();
            if self.cur.eat("}") {
                return Some(tags);
            }
            if self.cur.eat("...") {
                self.skip_value()?;
            } else {
                let key = self.key()?;
                self.ws();
                if self.cur.eat(":") {
                    self.ws();
                    if key == "tags" {
                        tags = Some(self.tags_value()?);
                    } else {
                        self.skip_value()?;
                    }
                } else if self.cur.starts_with("(") {
                    // method shorthand: handler(args) { body }
                    self.skip_balanced()?;
                    self.ws();
                    if !self.cur.starts_with("{") {
                        return None;
                    }
                    self.skip_balanced()?;
                } else if key == "tags" {
                    // `{ tags }` shorthand: present, contents unknown
                    tags = Some(Vec::new());
                }
            }
            self.ws();
            if !self.cur.eat(",") {
                self.ws();
                return self.cur.eat("}").then_some(tags);
            }
        }
    }

    fn key(&mut self) -> Option<String> {
        match self.cur.peek()? {
            '"' | '\'' => self.string(),
            '[' => {
                self.skip_balanced()?;
                Some(String::new())
            }
            c if is_ident_char(c) => {
                let word = self.cur.eat_while(is_ident_char);
                if matches!(word, "async" | "get" | "set") {
                    let mut look = Cursor::at(self.cur.text(), self.cur.pos());
                    look.skip_whitespace();
                    if look.peek().is_some_and(is_ident_char) {
                        self.cur = look;
                        return Some(self.cur.eat_while(is_ident_char).to_string());
                    }
                }
                Some(word.to_string())
            }
            '*' => {
                // generator method
                self.cur.bump();
                self.ws();
                Some(self.cur.eat_while(is_ident_char).to_string())
            }
            _ => None,
        }
    }

    /// `null`, `undefined`, or an array of string literals. Any other
    /// expression still declares the macro closed, with unknown sub-tags.
    fn tags_value(&mut self) -> Option<Vec<String>> {
        let mut probe = LiteralParser { cur: self.cur };
        if probe.cur.starts_with("[")
            && let Some(list) = probe.names()
        {
            probe.ws();
            if matches!(probe.cur.peek(), Some(',' | '}')) {
                self.cur = probe.cur;
                return Some(list);
            }
        }
        self.skip_value()?;
        Some(Vec::new())
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.cur.peek().filter(|c| matches!(c, '"' | '\'' | '`'))?;
        self.cur.bump();
        let mut out = String::new();
        loop {
            match self.cur.bump()? {
                '\\' => out.push(self.cur.bump()?),
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    /// Skip a property value up to (not including) the `,` or `}` that ends it.
    fn skip_value(&mut self) -> Option<()> {
        loop {
            self.ws();
            match self.cur.peek()? {
                ',' | '}' => return Some(()),
                ')' | ']' => return None,
                '(' | '[' | '{' => self.skip_balanced()?,
                '"' | '\'' | '`' => {
                    self.string()?;
                }
                _ => {
                    self.cur.bump();
                }
            }
        }
    }

    /// Skip a bracketed group starting at the cursor, tracking nesting,
    /// strings and comments.
    fn skip_balanced(&mut self) -> Option<()> {
        let mut expected = Vec::new();
        loop {
            self.ws();
            match self.cur.peek()? {
                '(' => expected.push(')'),
                '[' => expected.push(']'),
                '{' => expected.push('}'),
                c @ (')' | ']' | '}') => {
                    if expected.pop()? != c {
                        return None;
                    }
                    if expected.is_empty() {
                        self.cur.bump();
                        return Some(());
                    }
                }
                '"' | '\'' | '`' => {
                    self.string()?;
                    continue;
                }
                _ => {}
            }
            self.cur.bump();
        }
    }

    /// Skip whitespace and comments.
    fn ws(&mut self) {
        loop {
            self.cur.skip_whitespace();
            if self.cur.eat("//") {
                match self.cur.find("\n") {
                    Some(nl) => self.cur.set_pos(nl + 1),
                    None => self.cur.set_pos(usize::MAX),
                }
            } else if self.cur.eat("/*") {
                match self.cur.find("*/") {
                    Some(end) => self.cur.set_pos(end + 2),
                    None => self.cur.set_pos(usize::MAX),
                }
            } else {
                return;
            }
        }
    }
}
