use std::fmt;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;

type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// MARIE can address 4096 words of memory.
pub const MEMORY_MAX: usize = 0x1000;

/// Mask for the 12-bit operand field of an instruction word.
pub const OPERAND_MASK: u16 = 0x0FFF;

/// Label -> address (line index) mapping built during the first assembler pass.
#[derive(Debug, Default)]
pub struct AddressBook {
    table: FxMap<String, u16>,
}

impl AddressBook {
    pub fn new() -> Self {
        AddressBook {
            table: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Record a label. Returns the previous address if the label was already declared.
    pub fn declare(&mut self, label: &str, addr: u16) -> Option<u16> {
        self.table.insert(label.to_string(), addr)
    }

    pub fn resolve(&self, label: &str) -> Option<u16> {
        self.table.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Labels in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.table.iter().map(|(label, addr)| (label.as_str(), *addr))
    }
}

/// The 13 MARIE instructions, numbered by their 4-bit opcode.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Opcode {
    Jns = 0x0,
    Load = 0x1,
    Store = 0x2,
    Add = 0x3,
    Subt = 0x4,
    Input = 0x5,
    Output = 0x6,
    Halt = 0x7,
    Skipcond = 0x8,
    Jump = 0x9,
    Clear = 0xA,
    Addi = 0xB,
    Jumpi = 0xC,
}

impl Opcode {
    pub const ALL: [Opcode; 13] = [
        Opcode::Jns,
        Opcode::Load,
        Opcode::Store,
        Opcode::Add,
        Opcode::Subt,
        Opcode::Input,
        Opcode::Output,
        Opcode::Halt,
        Opcode::Skipcond,
        Opcode::Jump,
        Opcode::Clear,
        Opcode::Addi,
        Opcode::Jumpi,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Jns => "JNS",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Add => "ADD",
            Opcode::Subt => "SUBT",
            Opcode::Input => "INPUT",
            Opcode::Output => "OUTPUT",
            Opcode::Halt => "HALT",
            Opcode::Skipcond => "SKIPCOND",
            Opcode::Jump => "JUMP",
            Opcode::Clear => "CLEAR",
            Opcode::Addi => "ADDI",
            Opcode::Jumpi => "JUMPI",
        }
    }

    /// Place the opcode in bits 15-12 of an instruction word.
    pub fn encode(self, operand: u16) -> u16 {
        (self as u16) << 12 | (operand & OPERAND_MASK)
    }
}

impl TryFrom<u16> for Opcode {
    type Error = u16;

    /// Decode bits 15-12 of an instruction word. Unused opcodes are returned as the error.
    fn try_from(instr: u16) -> Result<Self, Self::Error> {
        let opcode = instr >> 12;
        match opcode {
            0x0 => Ok(Opcode::Jns),
            0x1 => Ok(Opcode::Load),
            0x2 => Ok(Opcode::Store),
            0x3 => Ok(Opcode::Add),
            0x4 => Ok(Opcode::Subt),
            0x5 => Ok(Opcode::Input),
            0x6 => Ok(Opcode::Output),
            0x7 => Ok(Opcode::Halt),
            0x8 => Ok(Opcode::Skipcond),
            0x9 => Ok(Opcode::Jump),
            0xA => Ok(Opcode::Clear),
            0xB => Ok(Opcode::Addi),
            0xC => Ok(Opcode::Jumpi),
            _ => Err(opcode),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

/// Radix of a literal introduced by `HEX` or `DEC`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Radix {
    Hex,
    Dec,
}

impl Radix {
    pub fn base(self) -> u32 {
        match self {
            Radix::Hex => 16,
            Radix::Dec => 10,
        }
    }
}

/// Any reserved word of the assembly language.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Keyword {
    Instr(Opcode),
    Literal(Radix),
}

impl Keyword {
    /// Every keyword, longest spelling first so that prefix matching is greedy.
    pub const TABLE: [(&'static str, Keyword); 15] = [
        ("SKIPCOND", Keyword::Instr(Opcode::Skipcond)),
        ("OUTPUT", Keyword::Instr(Opcode::Output)),
        ("STORE", Keyword::Instr(Opcode::Store)),
        ("INPUT", Keyword::Instr(Opcode::Input)),
        ("CLEAR", Keyword::Instr(Opcode::Clear)),
        ("JUMPI", Keyword::Instr(Opcode::Jumpi)),
        ("LOAD", Keyword::Instr(Opcode::Load)),
        ("SUBT", Keyword::Instr(Opcode::Subt)),
        ("HALT", Keyword::Instr(Opcode::Halt)),
        ("JUMP", Keyword::Instr(Opcode::Jump)),
        ("ADDI", Keyword::Instr(Opcode::Addi)),
        ("JNS", Keyword::Instr(Opcode::Jns)),
        ("ADD", Keyword::Instr(Opcode::Add)),
        ("HEX", Keyword::Literal(Radix::Hex)),
        ("DEC", Keyword::Literal(Radix::Dec)),
    ];

    /// Longest keyword which `text` starts with.
    pub fn prefix_of(text: &str) -> Option<(&'static str, Keyword)> {
        Self::TABLE
            .iter()
            .find(|(spelling, _)| text.starts_with(spelling))
            .copied()
    }
}

/// Condition field of a `SKIPCOND` instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SkipCondition {
    /// Skip if AC < 0
    Negative = 0x000,
    /// Skip if AC == 0
    Zero = 0x400,
    /// Skip if AC > 0
    Positive = 0x800,
}

impl TryFrom<u16> for SkipCondition {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x000 => Ok(SkipCondition::Negative),
            0x400 => Ok(SkipCondition::Zero),
            0x800 => Ok(SkipCondition::Positive),
            _ => Err(()),
        }
    }
}

impl SkipCondition {
    pub fn holds(self, ac: u16) -> bool {
        let ac = ac as i16;
        match self {
            SkipCondition::Negative => ac < 0,
            SkipCondition::Zero => ac == 0,
            SkipCondition::Positive => ac > 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_table() {
        let expected = [
            ("JNS", 0x0),
            ("LOAD", 0x1),
            ("STORE", 0x2),
            ("ADD", 0x3),
            ("SUBT", 0x4),
            ("INPUT", 0x5),
            ("OUTPUT", 0x6),
            ("HALT", 0x7),
            ("SKIPCOND", 0x8),
            ("JUMP", 0x9),
            ("CLEAR", 0xA),
            ("ADDI", 0xB),
            ("JUMPI", 0xC),
        ];
        for (op, (name, code)) in Opcode::ALL.iter().zip(expected) {
            assert_eq!(op.mnemonic(), name);
            assert_eq!(*op as u16, code);
            assert_eq!(Opcode::try_from((code as u16) << 12), Ok(*op));
        }
    }

    #[test]
    fn undefined_opcodes() {
        for code in 0xDu16..=0xF {
            assert_eq!(Opcode::try_from(code << 12 | 0x123), Err(code));
        }
    }

    #[test]
    fn greedy_prefix() {
        assert_eq!(
            Keyword::prefix_of("ADDIX"),
            Some(("ADDI", Keyword::Instr(Opcode::Addi)))
        );
        assert_eq!(
            Keyword::prefix_of("JUMPX"),
            Some(("JUMP", Keyword::Instr(Opcode::Jump)))
        );
        assert_eq!(Keyword::prefix_of("X"), None);
        // Every keyword must be reachable despite shorter prefixes
        for (spelling, keyword) in Keyword::TABLE {
            assert_eq!(Keyword::prefix_of(spelling), Some((spelling, keyword)));
        }
    }

    #[test]
    fn skip_conditions() {
        assert!(SkipCondition::Negative.holds(0xFFFF));
        assert!(!SkipCondition::Negative.holds(0));
        assert!(SkipCondition::Zero.holds(0));
        assert!(SkipCondition::Positive.holds(1));
        assert!(!SkipCondition::Positive.holds(0x8000));
        assert!(SkipCondition::try_from(0x200).is_err());
    }

    #[test]
    fn address_book_redeclare() {
        let mut book = AddressBook::new();
        assert_eq!(book.declare("A", 5), None);
        assert_eq!(book.declare("A", 6), Some(5));
        assert_eq!(book.resolve("A"), Some(6));
        assert_eq!(book.resolve("B"), None);
    }
}
