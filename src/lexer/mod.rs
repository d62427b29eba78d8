use crate::error::AddressingFault;
use crate::lexer::cursor::Cursor;
use crate::symbol::Keyword;

pub mod cursor;

/// Starts a comment which runs to the end of the line.
pub const COMMENT_MARKER: char = '/';
/// Separates a label from the instruction it names.
pub const LABEL_SEPARATOR: char = ',';

/// Non-blank source line after normalisation.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourceLine {
    /// 1-indexed position in the original file, blank lines included
    pub number: usize,
    /// Upper-cased, comment-stripped and trimmed text
    pub text: String,
}

impl SourceLine {
    /// Split off an optional `label,` prefix, returning `(label, body)`.
    pub fn split_label(&self) -> Result<(Option<&str>, &str), AddressingFault> {
        let mut parts = self.text.split(LABEL_SEPARATOR);
        let first = parts.next().unwrap_or_default();
        let Some(body) = parts.next() else {
            return Ok((None, first));
        };
        if parts.next().is_some() {
            return Err(AddressingFault::MultipleMarkers);
        }
        let label = first.trim();
        if label.is_empty() {
            return Err(AddressingFault::MissingLabel);
        }
        Ok((Some(label), body.trim()))
    }
}

/// Iterate over the non-blank lines of `src`, keeping their original line numbers.
pub fn lines(src: &str) -> impl Iterator<Item = SourceLine> + '_ {
    src.lines().enumerate().filter_map(|(i, line)| {
        let line = line.trim().to_uppercase();
        let text = match line.find(COMMENT_MARKER) {
            Some(idx) => line[..idx].trim_end(),
            None => line.as_str(),
        };
        if text.is_empty() {
            return None;
        }
        Some(SourceLine {
            number: i + 1,
            text: text.to_string(),
        })
    })
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Token {
    Keyword(Keyword),
    /// Label, skip condition or literal digits
    Operand(String),
}

/// Split an instruction body into keywords and operands.
///
/// Words are matched left to right against the keyword table, longest keyword first. Anything
/// left of a word once no keyword matches is an operand. Once an instruction mnemonic is read,
/// only `HEX`/`DEC` are still treated as keywords, and the text following `HEX`/`DEC` is always
/// taken verbatim as the literal.
pub fn tokenize(body: &str) -> Vec<Token> {
    let mut toks = Vec::new();
    let mut seen_instr = false;
    let mut expect_literal = false;

    for word in body.split_whitespace() {
        let mut cur = Cursor::new(word);
        while !cur.is_eof() {
            if expect_literal {
                toks.push(Token::Operand(cur.take_rest().to_string()));
                expect_literal = false;
                break;
            }
            match Keyword::prefix_of(cur.at_curr_pt()) {
                Some((spelling, kw @ Keyword::Literal(_))) => {
                    toks.push(Token::Keyword(kw));
                    cur.advance(spelling.len());
                    expect_literal = true;
                }
                Some((spelling, kw @ Keyword::Instr(_))) if !seen_instr => {
                    toks.push(Token::Keyword(kw));
                    cur.advance(spelling.len());
                    seen_instr = true;
                }
                _ => {
                    toks.push(Token::Operand(cur.take_rest().to_string()));
                }
            }
        }
    }
    toks
}
