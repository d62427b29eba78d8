use crate::error::{ImageError, ImageErrorKind, MemoryError};
use crate::symbol::MEMORY_MAX;

/// Bounded word-addressed memory with a high-water mark.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Memory {
    /// System memory - 4096 words.
    words: Box<[u16; MEMORY_MAX]>,
    /// Highest address ever written
    head: u16,
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            words: Box::new([0; MEMORY_MAX]),
            head: 0,
        }
    }

    /// Build a store from the text of a persisted program image.
    pub fn from_image(image: &str) -> Result<Memory, ImageError> {
        let mut words = Vec::new();
        for (i, line) in image.lines().enumerate() {
            let word = line.trim();
            let value = u32::from_str_radix(word, 16).map_err(|_| ImageError {
                line: i + 1,
                kind: ImageErrorKind::NotHex(word.to_string()),
            })?;
            if value > u16::MAX as u32 {
                return Err(ImageError {
                    line: i + 1,
                    kind: ImageErrorKind::Memory(MemoryError::ValueOverflow(value)),
                });
            }
            words.push(value as u16);
        }
        let mut mem = Memory::new();
        // Only an over-long image can fail here
        mem.load_range(words).map_err(|err| ImageError {
            line: MEMORY_MAX + 1,
            kind: ImageErrorKind::Memory(err),
        })?;
        Ok(mem)
    }

    #[inline]
    fn check_bounds(addr: u16) -> Result<usize, MemoryError> {
        let idx = addr as usize;
        if idx >= MEMORY_MAX {
            return Err(MemoryError::AddressOutOfBounds(addr));
        }
        Ok(idx)
    }

    /// Write `value` at `addr`. A failed store leaves memory untouched.
    pub fn store(&mut self, value: u32, addr: u16) -> Result<(), MemoryError> {
        let idx = Self::check_bounds(addr)?;
        let value = u16::try_from(value).map_err(|_| MemoryError::ValueOverflow(value))?;
        self.words[idx] = value;
        self.head = self.head.max(addr);
        Ok(())
    }

    pub fn load(&self, addr: u16) -> Result<u16, MemoryError> {
        let idx = Self::check_bounds(addr)?;
        Ok(self.words[idx])
    }

    pub fn head(&self) -> u16 {
        self.head
    }

    /// Every word of memory.
    pub fn as_slice(&self) -> &[u16] {
        &self.words[..]
    }

    /// Words from address 0 up to and including the head marker.
    pub fn used(&self) -> &[u16] {
        &self.words[..=self.head as usize]
    }

    /// Image lines for addresses `0..=head`. Call again to restart.
    pub fn serialize_range(&self) -> impl Iterator<Item = String> + Clone + '_ {
        self.used().iter().map(|word| format!("{:04X}", word))
    }

    /// Persisted program image text.
    pub fn to_image(&self) -> String {
        self.serialize_range().collect::<Vec<_>>().join("\n")
    }

    /// Reset the head marker and write `words` sequentially from address 0.
    pub fn load_range<I>(&mut self, words: I) -> Result<(), MemoryError>
    where
        I: IntoIterator<Item = u16>,
    {
        self.head = 0;
        for (addr, word) in words.into_iter().enumerate() {
            let addr = u16::try_from(addr).unwrap_or(u16::MAX);
            self.store(word as u32, addr)?;
        }
        Ok(())
    }
}
