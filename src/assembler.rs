use crate::{
    error::{AddressingFault, AssemblyError, AssemblyErrorKind, MemoryError},
    lexer::{self, SourceLine, Token},
    memory::Memory,
    symbol::{AddressBook, Keyword, Opcode, Radix, SkipCondition, MEMORY_MAX},
};

/// Two-pass assembler writing instruction words into a caller-owned memory store.
pub struct Assembler<'m> {
    mem: &'m mut Memory,
    book: AddressBook,
    /// Line numbers of label declarations, parallel to the address book
    declared_at: Vec<usize>,
}

type Result<T> = std::result::Result<T, AssemblyError>;

impl<'m> Assembler<'m> {
    pub fn new(mem: &'m mut Memory) -> Self {
        Assembler {
            mem,
            book: AddressBook::new(),
            declared_at: Vec::new(),
        }
    }

    /// Assemble `src` into memory, starting at address 0.
    ///
    /// Stops at the first error. Memory contents are unspecified after a failure.
    /// On success, returns the label table used to resolve operands.
    pub fn assemble(mut self, src: &str) -> Result<AddressBook> {
        for (addr, line) in lexer::lines(src).enumerate() {
            self.scan(&line, addr)?;
        }
        for (addr, line) in lexer::lines(src).enumerate() {
            let word = self.interpret(&line)?;
            // Address bounds were checked while scanning
            self.mem
                .store(word as u32, addr as u16)
                .map_err(|err| fail(&line, AssemblyErrorKind::Memory(err)))?;
        }
        Ok(self.book)
    }

    /// First pass: record labels and make sure each line has a keyword.
    fn scan(&mut self, line: &SourceLine, addr: usize) -> Result<()> {
        if addr >= MEMORY_MAX {
            return Err(fail(
                line,
                AssemblyErrorKind::Memory(MemoryError::AddressOutOfBounds(addr as u16)),
            ));
        }
        let (label, body) = line
            .split_label()
            .map_err(|fault| fail(line, AssemblyErrorKind::Addressing(fault)))?;

        if let Some(label) = label {
            if self.book.declare(label, addr as u16).is_some() {
                let first_line = self
                    .book
                    .iter()
                    .position(|(name, _)| name == label)
                    .map(|idx| self.declared_at[idx])
                    .unwrap_or_default();
                return Err(fail(
                    line,
                    AssemblyErrorKind::Addressing(AddressingFault::DuplicateLabel {
                        label: label.to_string(),
                        first_line,
                    }),
                ));
            }
            self.declared_at.push(line.number);
        }

        let has_keyword = lexer::tokenize(body)
            .iter()
            .any(|tok| matches!(tok, Token::Keyword(_)));
        if !has_keyword {
            return Err(fail(line, AssemblyErrorKind::KeywordMissing));
        }
        Ok(())
    }

    /// Second pass: fold a line's tokens into one instruction or data word.
    fn interpret(&self, line: &SourceLine) -> Result<u16> {
        let (_, body) = line
            .split_label()
            .map_err(|fault| fail(line, AssemblyErrorKind::Addressing(fault)))?;

        let mut opcode: Option<Opcode> = None;
        let mut operand: Option<u16> = None;
        let mut literal: Option<Radix> = None;

        for tok in lexer::tokenize(body) {
            match tok {
                Token::Keyword(Keyword::Literal(radix)) => {
                    if literal.is_some() || operand.is_some() {
                        return Err(fail(
                            line,
                            AssemblyErrorKind::UnexpectedToken {
                                token: format!("{:?}", radix).to_uppercase(),
                            },
                        ));
                    }
                    literal = Some(radix);
                }
                Token::Keyword(Keyword::Instr(op)) => {
                    if opcode.is_some() {
                        return Err(fail(
                            line,
                            AssemblyErrorKind::UnexpectedToken {
                                token: op.to_string(),
                            },
                        ));
                    }
                    opcode = Some(op);
                }
                Token::Operand(text) => {
                    if operand.is_some() {
                        return Err(fail(line, AssemblyErrorKind::UnexpectedToken { token: text }));
                    }
                    let value = match literal.take() {
                        Some(radix) => parse_literal(&text, radix)
                            .ok_or_else(|| fail(line, AssemblyErrorKind::IntegerExpected { token: text }))?,
                        None => self.resolve(&text).ok_or_else(|| {
                            fail(line, AssemblyErrorKind::SkipcondInvalid { token: text })
                        })?,
                    };
                    operand = Some(value);
                }
            }
        }

        // `HEX`/`DEC` with nothing after it
        if literal.is_some() {
            return Err(fail(
                line,
                AssemblyErrorKind::IntegerExpected {
                    token: String::new(),
                },
            ));
        }

        let operand = operand.unwrap_or(0);
        Ok(match opcode {
            Some(op) => op.encode(operand),
            // Data word, kept at full width
            None => operand,
        })
    }

    /// Resolve a bare operand as a label, or failing that as a `SKIPCOND` condition.
    fn resolve(&self, text: &str) -> Option<u16> {
        if let Some(addr) = self.book.resolve(text) {
            return Some(addr);
        }
        let value = u16::from_str_radix(text, 16).ok()?;
        SkipCondition::try_from(value).ok().map(|cond| cond as u16)
    }
}

/// Parse a `HEX`/`DEC` literal into a 16-bit two's complement word.
fn parse_literal(text: &str, radix: Radix) -> Option<u16> {
    let value = i32::from_str_radix(text, radix.base()).ok()?;
    if !(i16::MIN as i32..=u16::MAX as i32).contains(&value) {
        return None;
    }
    Some(value as u16)
}

fn fail(line: &SourceLine, kind: AssemblyErrorKind) -> AssemblyError {
    AssemblyError {
        line: line.number,
        kind,
    }
}

/// Assemble `src` into a fresh memory store.
pub fn assemble(src: &str) -> Result<Memory> {
    let mut mem = Memory::new();
    Assembler::new(&mut mem).assemble(src)?;
    Ok(mem)
}
