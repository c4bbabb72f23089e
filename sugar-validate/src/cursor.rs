//! Byte cursor over passage or script text.
//!
//! Every movement saturates at the end of the text and lands on a char
//! boundary, so callers never deal with "not found" or past-the-end
//! sentinel positions. Searches return `Option<usize>` absolute offsets.

/// Number of characters shown after a position in diagnostic excerpts.
pub const EXCERPT_CHARS: usize = 80;

#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Create a cursor at `pos`, clamped into the text.
    pub fn at(text: &'a str, pos: usize) -> Self {
        let mut cursor = Self::new(text);
        cursor.set_pos(pos);
        cursor
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = ceil_boundary(self.text, pos);
    }

    pub fn advance(&mut self, bytes: usize) {
        self.set_pos(self.pos.saturating_add(bytes));
    }

    /// Step over the next character, if any.
    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Character `bytes` past the cursor, if that offset is a char boundary.
    pub fn peek_at(&self, bytes: usize) -> Option<char> {
        let at = self.pos.checked_add(bytes)?;
        self.text.get(at..)?.chars().next()
    }

    pub fn char_before(&self) -> Option<char> {
        self.text[..self.pos].chars().next_back()
    }

    pub fn starts_with(&self, pat: &str) -> bool {
        self.rest().starts_with(pat)
    }

    /// Consume `pat` if the text continues with it.
    pub fn eat(&mut self, pat: &str) -> bool {
        if self.starts_with(pat) {
            self.pos += pat.len();
            true
        } else {
            false
        }
    }

    /// Absolute offset of the next occurrence of `pat` at or after the cursor.
    pub fn find(&self, pat: &str) -> Option<usize> {
        self.rest().find(pat).map(|i| self.pos + i)
    }

    pub fn skip_whitespace(&mut self) {
        self.eat_while(char::is_whitespace);
    }

    /// Consume characters while `pred` holds and return them.
    pub fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        let len = self
            .rest()
            .find(|c: char| !pred(c))
            .unwrap_or(self.rest().len());
        self.pos += len;
        &self.text[start..self.pos]
    }

    /// Consume a macro or tag name (`[a-zA-Z][\w-]*`); empty if none starts here.
    pub fn eat_name(&mut self) -> &'a str {
        if !self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            return "";
        }
        self.eat_while(is_name_char)
    }
}

/// Smallest char boundary at or after `pos`, clamped to the text length.
pub fn ceil_boundary(text: &str, pos: usize) -> usize {
    let mut pos = pos.min(text.len());
    while !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Up to [`EXCERPT_CHARS`] characters of `text` starting at `pos`.
pub fn excerpt(text: &str, pos: usize) -> &str {
    let start = ceil_boundary(text, pos);
    let rest = &text[start..];
    let end = rest
        .char_indices()
        .nth(EXCERPT_CHARS)
        .map_or(rest.len(), |(i, _)| i);
    &rest[..end]
}

/// `true` for characters that may appear inside a JS/SugarCube identifier.
pub fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// `true` for characters allowed in macro and widget names (`[\w-]`).
pub fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// 1-based line number of byte offset `pos` within `text`.
pub fn line_of(text: &str, pos: usize) -> usize {
    let pos = ceil_boundary(text, pos);
    text[..pos].matches('\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn movement_saturates() {
        let mut cursor = Cursor::new("abc");
        cursor.advance(10);
        assert!(cursor.is_eof());
        assert_eq!(cursor.pos(), 3);
        assert_eq!(cursor.peek(), None);
        assert_eq!(cursor.bump(), None);
    }

    #[test]
    fn positions_land_on_char_boundaries() {
        let cursor = Cursor::at("é<<if>>", 1);
        assert_eq!(cursor.pos(), 2);
        assert!(cursor.starts_with("<<if"));
    }

    #[test]
    fn find_returns_absolute_offsets() {
        let mut cursor = Cursor::new("<<a>> <<b>>");
        cursor.advance(2);
        assert_eq!(cursor.find("<<"), Some(6));
        assert_eq!(cursor.find("zz"), None);
    }

    #[test]
    fn eat_while_collects_names() {
        let mut cursor = Cursor::new("  elseif $x");
        cursor.skip_whitespace();
        assert_eq!(cursor.eat_while(is_name_char), "elseif");
        assert_eq!(cursor.peek(), Some(' '));
        assert_eq!(cursor.char_before(), Some('f'));
    }

    #[test]
    fn names_start_with_a_letter() {
        let mut cursor = Cursor::new("link-to>>");
        assert_eq!(cursor.eat_name(), "link-to");
        let mut cursor = Cursor::new("=$x>>");
        assert_eq!(cursor.eat_name(), "");
        assert_eq!(cursor.pos(), 0);
    }

    #[test]
    fn excerpt_is_char_limited() {
        let text = "x".repeat(100);
        assert_eq!(excerpt(&text, 10).len(), EXCERPT_CHARS);
        assert_eq!(excerpt("short", 2), "ort");
        assert_eq!(excerpt("short", 99), "");
    }

    #[test]
    fn lines_are_one_based() {
        assert_eq!(line_of("a\nb\nc", 0), 1);
        assert_eq!(line_of("a\nb\nc", 2), 2);
        assert_eq!(line_of("a\nb\nc", 4), 3);
    }
}
