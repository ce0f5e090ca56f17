//! Byte-addressable, word-expanding EVM memory.

use crate::errors::VmError;

/// Per SPEC_FULL.md's hard memory ceiling, independent of gas cost.
pub const MAX_MEMORY_SIZE: usize = 16 * 1024 * 1024;

pub const WORD_SIZE: usize = 32;

#[derive(Clone, Debug, Default)]
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn word_size(&self) -> usize {
        self.data.len().div_ceil(WORD_SIZE)
    }

    /// Expands memory to at least `size` bytes, rounded up to a word boundary.
    /// Returns the number of new words added, for gas accounting.
    pub fn expand(&mut self, size: usize) -> Result<usize, VmError> {
        if size <= self.data.len() {
            return Ok(0);
        }
        if size > MAX_MEMORY_SIZE {
            return Err(VmError::MemoryLimitExceeded {
                requested: size,
                max: MAX_MEMORY_SIZE,
            });
        }
        let new_word_size = size.div_ceil(WORD_SIZE);
        let new_byte_size = new_word_size * WORD_SIZE;
        let old_word_size = self.word_size();
        self.data.resize(new_byte_size, 0);
        Ok(new_word_size.saturating_sub(old_word_size))
    }

    pub fn read_byte(&self, offset: usize) -> Result<u8, VmError> {
        if offset >= self.data.len() {
            return Err(VmError::MemoryOutOfBounds { offset, size: 1 });
        }
        Ok(self.data[offset])
    }

    /// Zero-padded past the allocated length.
    #[must_use]
    pub fn read_word(&self, offset: usize) -> [u8; 32] {
        let mut result = [0u8; 32];
        let len = self.data.len();
        for (i, byte) in result.iter_mut().enumerate() {
            let pos = offset.saturating_add(i);
            if pos < len {
                *byte = self.data[pos];
            }
        }
        result
    }

    /// Zero-padded past the allocated length.
    #[must_use]
    pub fn read_bytes(&self, offset: usize, size: usize) -> Vec<u8> {
        let mut result = vec![0u8; size];
        let len = self.data.len();
        for (i, byte) in result.iter_mut().enumerate() {
            let pos = offset.saturating_add(i);
            if pos < len {
                *byte = self.data[pos];
            }
        }
        result
    }

    pub fn write_byte(&mut self, offset: usize, value: u8) -> Result<usize, VmError> {
        let words_added = self.expand(offset + 1)?;
        self.data[offset] = value;
        Ok(words_added)
    }

    pub fn write_word(&mut self, offset: usize, value: &[u8; 32]) -> Result<usize, VmError> {
        let words_added = self.expand(offset + 32)?;
        self.data[offset..offset + 32].copy_from_slice(value);
        Ok(words_added)
    }

    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) -> Result<usize, VmError> {
        if data.is_empty() {
            return Ok(0);
        }
        let words_added = self.expand(offset + data.len())?;
        self.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(words_added)
    }

    /// In-memory copy, handling overlapping regions. Not an opcode in this
    /// fork range (MCOPY is rejected, see `opcodes.rs`) but shared by CODECOPY
    /// and the call-return-data copy paths.
    pub fn copy(&mut self, dest: usize, src: usize, size: usize) -> Result<usize, VmError> {
        if size == 0 {
            return Ok(0);
        }
        let max_offset = dest.max(src) + size;
        let words_added = self.expand(max_offset)?;
        if src < dest && src + size > dest {
            for i in (0..size).rev() {
                self.data[dest + i] = self.data[src + i];
            }
        } else {
            self.data.copy_within(src..src + size, dest);
        }
        Ok(words_added)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Cumulative memory cost for a given word size: `word_size^2/512 + 3*word_size`.
#[must_use]
pub fn memory_gas_cost(word_size: usize) -> u64 {
    let word_size = word_size as u64;
    (word_size * word_size / 512) + (3 * word_size)
}

#[must_use]
pub fn memory_expansion_cost(old_word_size: usize, new_word_size: usize) -> u64 {
    if new_word_size <= old_word_size {
        return 0;
    }
    memory_gas_cost(new_word_size) - memory_gas_cost(old_word_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_rounds_up_to_word_boundary() {
        let mut mem = Memory::new();
        let words = mem.expand(10).unwrap();
        assert!(words > 0);
        assert_eq!(mem.len(), 32);
    }

    #[test]
    fn read_write_byte_round_trips() {
        let mut mem = Memory::new();
        mem.write_byte(10, 0x42).unwrap();
        assert_eq!(mem.read_byte(10).unwrap(), 0x42);
    }

    #[test]
    fn read_write_word_round_trips() {
        let mut mem = Memory::new();
        let word = [0x11u8; 32];
        mem.write_word(0, &word).unwrap();
        assert_eq!(mem.read_word(0), word);
    }

    #[test]
    fn read_word_past_end_is_zero_padded() {
        let mem = Memory::new();
        assert_eq!(mem.read_word(0), [0u8; 32]);
    }

    #[test]
    fn copy_handles_overlap() {
        let mut mem = Memory::new();
        mem.write_bytes(0, &[1, 2, 3, 4, 5]).unwrap();
        mem.copy(2, 0, 4).unwrap();
        assert_eq!(mem.read_bytes(0, 6), vec![1, 2, 1, 2, 3, 4]);
    }

    #[test]
    fn expand_past_cap_is_rejected() {
        let mut mem = Memory::new();
        assert!(mem.expand(MAX_MEMORY_SIZE + 1).is_err());
    }

    #[test]
    fn memory_gas_cost_matches_yellow_paper_formula() {
        assert_eq!(memory_gas_cost(0), 0);
        assert_eq!(memory_gas_cost(1), 3);
        assert_eq!(memory_gas_cost(32), 98);
    }

    #[test]
    fn expansion_cost_is_marginal() {
        assert_eq!(memory_expansion_cost(1, 1), 0);
        assert_eq!(
            memory_expansion_cost(1, 2),
            memory_gas_cost(2) - memory_gas_cost(1)
        );
    }
}
