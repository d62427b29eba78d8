use std::cell::RefCell;
use std::fmt::Write as _;
use std::str::Chars;

use colored::Colorize;

use crate::memory::Memory;
use crate::runtime::Registers;

/// Words per row of the memory grid.
const ROW_WIDTH: usize = 16;

/// Where a piece of text is headed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    /// Program results, printed to stdout
    Normal,
    /// Machine state and prompts, printed to stderr
    Debugger,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    pub fn print_str(&self, string: &str) {
        match self {
            // Program output never carries color
            Self::Normal => print!("{}", string),
            Self::Debugger => {
                if Self::is_minimal() {
                    eprint_colorless(string);
                } else {
                    eprint!("{}", string);
                }
            }
        }
    }

    pub fn print_registers(&self, regs: &Registers) {
        self.print_str(&format_registers(regs, Self::is_minimal()));
    }

    pub fn print_memory(&self, mem: &Memory) {
        self.print_str(&format_memory(mem, Self::is_minimal()));
    }

    pub fn print_trace(&self, trace: &[String]) {
        for line in trace {
            if Self::is_minimal() {
                self.print_str(&format!("{}\n", line));
            } else {
                self.print_str(&format!("{}\n", line.blue()));
            }
        }
    }

    pub fn print_outputs(&self, outputs: &[u16], hex: bool) {
        if !Self::is_minimal() {
            self.print_str(&format!("\n{}\n", "Output:".cyan().bold()));
        }
        for value in outputs {
            let value = format_value(*value, hex);
            if Self::is_minimal() {
                self.print_str(&format!("{}\n", value));
            } else {
                self.print_str(&format!("\t{}\n", value));
            }
        }
    }
}

/// Render one word as hex, or as a signed decimal.
pub fn format_value(value: u16, hex: bool) -> String {
    if hex {
        format!("0x{:04X}", value)
    } else {
        format!("{}", value as i16)
    }
}

pub fn format_registers(regs: &Registers, minimal: bool) -> String {
    let rows = [
        ("AC", regs.ac),
        ("MAR", regs.mar),
        ("MBR", regs.mbr),
        ("PC", regs.pc),
        ("IR", regs.ir),
        ("InReg", regs.in_reg),
        ("OutReg", regs.out_reg),
    ];
    let mut out = String::new();
    if minimal {
        for (name, value) in rows {
            let _ = writeln!(out, "{} {:04X}", name, value);
        }
        return out;
    }

    out.push_str("\x1b[2m┌───────────────────────┐\x1b[0m\n");
    let _ = writeln!(
        out,
        "\x1b[2m│\x1b[0m \x1b[3m{:<6} {:>6} {:>7}\x1b[0m \x1b[2m│\x1b[0m",
        "", "hex", "int"
    );
    for (name, value) in rows {
        let _ = writeln!(
            out,
            "\x1b[2m│\x1b[0m \x1b[1m{:<6}\x1b[0m 0x{:04X} {:>7} \x1b[2m│\x1b[0m",
            name, value, value as i16
        );
    }
    out.push_str("\x1b[2m└───────────────────────┘\x1b[0m\n");
    out
}

/// Grid of memory words, 16 per row, up to the row containing the head marker.
pub fn format_memory(mem: &Memory, minimal: bool) -> String {
    let rows = mem.head() as usize / ROW_WIDTH + 1;
    let mut out = String::new();

    let mut header = format!("{:<6}|", "");
    for col in 0..ROW_WIDTH {
        let _ = write!(header, " 0x{:<4X}", col);
    }
    if minimal {
        let _ = writeln!(out, "{}", header.trim_end());
    } else {
        let _ = writeln!(out, "\x1b[2m{}\x1b[0m", header.trim_end());
    }

    for (row, words) in mem.as_slice().chunks(ROW_WIDTH).take(rows).enumerate() {
        let _ = write!(out, "0x{:03X} |", row * ROW_WIDTH);
        for word in words {
            let _ = write!(out, " {:04X}  ", word);
        }
        out.truncate(out.trim_end().len());
        out.push('\n');
    }
    out
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn eprint_colorless(string: &str) {
    eprint!("{}", Decolored::new(string).collect::<String>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decolored() {
        assert_eq!(Decolored::new("abcdef").collect::<String>(), "abcdef");
        assert_eq!(
            Decolored::new("abc\x1b[0;2mdef\x1b[0m").collect::<String>(),
            "abcdef"
        );
        assert_eq!(Decolored::new("abc\x1b[0xyz").collect::<String>(), "abc");
    }

    #[test]
    fn values() {
        assert_eq!(format_value(7, false), "7");
        assert_eq!(format_value(0xFFFE, false), "-2");
        assert_eq!(format_value(0xFFFE, true), "0xFFFE");
        assert_eq!(format_value(0x1F, true), "0x001F");
    }

    #[test]
    fn minimal_registers() {
        let regs = Registers {
            ac: 0x7,
            pc: 0x10,
            ir: 0x7000,
            ..Default::default()
        };
        assert_eq!(
            format_registers(&regs, true),
            "AC 0007\nMAR 0000\nMBR 0000\nPC 0010\nIR 7000\nInReg 0000\nOutReg 0000\n"
        );
    }

    #[test]
    fn boxed_registers_are_aligned() {
        let boxed = format_registers(&Registers::default(), false);
        let widths: Vec<_> = boxed
            .lines()
            .map(|line| Decolored::new(line).count())
            .collect();
        assert_eq!(widths.len(), 10);
        assert!(widths.iter().all(|w| *w == widths[0]));
    }

    #[test]
    fn memory_grid_stops_at_head_row() {
        let mut mem = Memory::new();
        mem.store(0x5000, 0).unwrap();
        mem.store(0xABCD, 17).unwrap();
        let grid = format_memory(&mem, true);
        let lines: Vec<_> = grid.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("      | 0x0"));
        assert!(lines[1].starts_with("0x000 | 5000   0000"));
        assert!(lines[2].starts_with("0x010 | 0000   ABCD"));
        assert_eq!(lines[1].split_whitespace().count(), 2 + ROW_WIDTH);
    }
}
