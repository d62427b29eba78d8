// Heavily inspired by the cursor in `rustc_lexer`, cut down to walk a single word.
// See https://doc.rust-lang.org/beta/nightly-rustc/src/rustc_lexer/cursor.rs.html

/// Forward-only view into one whitespace-free word of a source line.
pub struct Cursor<'a> {
    /// Byte index that the cursor is pointing to in the word
    curr_pt: usize,
    chars: &'a str,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Cursor<'a> {
        Cursor {
            curr_pt: 0,
            chars: input,
        }
    }

    /// Word is finished
    pub fn is_eof(&self) -> bool {
        self.curr_pt >= self.chars.len()
    }

    /// Return slice of input starting at the current point of the cursor
    pub fn at_curr_pt(&self) -> &'a str {
        &self.chars[self.curr_pt..]
    }

    /// Move cursor ahead in the input by given amount of bytes
    pub fn advance(&mut self, amt: usize) {
        self.curr_pt = (self.curr_pt + amt).min(self.chars.len());
    }

    /// Consume the rest of the word
    pub fn take_rest(&mut self) -> &'a str {
        let rest = self.at_curr_pt();
        self.curr_pt = self.chars.len();
        rest
    }
}
