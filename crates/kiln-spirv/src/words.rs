//! Instruction walker over a SPIR-V word stream.

use spirv::Op;

use crate::ParseError;

/// One decoded instruction. `words` includes the opcode word.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Instruction<'w> {
    pub op: Op,
    /// Word offset of the opcode word in the module.
    pub offset: usize,
    pub words: &'w [u32],
}

impl<'w> Instruction<'w> {
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Operands after the opcode word.
    pub fn operands(&self) -> &'w [u32] {
        &self.words[1..]
    }

    /// Operand `index`, counting from the word after the opcode.
    pub fn operand(&self, index: usize) -> Result<u32, ParseError> {
        self.operands()
            .get(index)
            .copied()
            .ok_or(ParseError::InvalidOperands(self.op))
    }

    /// Operands from `index` on; empty past the end.
    pub fn operands_from(&self, index: usize) -> &'w [u32] {
        self.operands().get(index..).unwrap_or_default()
    }

    /// Decodes the literal string starting at operand `index`, returning it
    /// with the number of words it occupies.
    pub fn string(&self, index: usize) -> Result<(String, usize), ParseError> {
        let mut bytes = Vec::new();
        for (used, word) in self.operands_from(index).iter().enumerate() {
            let chars = word.to_le_bytes();
            let end = chars.iter().position(|&c| c == 0).unwrap_or(4);
            bytes.extend_from_slice(&chars[..end]);
            if end < 4 {
                let text =
                    String::from_utf8(bytes).map_err(|_| ParseError::BadString(self.offset))?;
                return Ok((text, used + 1));
            }
        }
        Err(ParseError::BadString(self.offset))
    }
}

/// Walks the instructions in `words[start..end]`, calling `handler` on each.
///
/// The handler returns `false` to stop early; the walk then returns the
/// offset of the instruction it stopped at. Otherwise the whole range must be
/// consumed exactly and `end` is returned.
pub(crate) fn walk<'w, F>(
    words: &'w [u32],
    start: usize,
    end: usize,
    mut handler: F,
) -> Result<usize, ParseError>
where
    F: FnMut(Instruction<'w>) -> Result<bool, ParseError>,
{
    let end = end.min(words.len());
    let mut offset = start;
    while offset < end {
        let first = words[offset];
        let count = (first >> 16) as usize;
        let opcode = first & 0xffff;
        if count == 0 {
            return Err(ParseError::InvalidWordCount { offset });
        }
        if count > end - offset {
            return Err(ParseError::InstructionOverrun {
                offset,
                count,
                remaining: end - offset,
            });
        }
        let op = Op::from_u32(opcode).ok_or(ParseError::UnknownOpcode { opcode, offset })?;
        let instr = Instruction {
            op,
            offset,
            words: &words[offset..offset + count],
        };
        if !handler(instr)? {
            return Ok(offset);
        }
        offset += count;
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(op: Op, count: u32) -> u32 {
        (count << 16) | op as u32
    }

    #[test]
    fn walks_whole_range() {
        let words = [word(Op::Nop, 1), word(Op::TypeVoid, 2), 1, word(Op::Nop, 1)];
        let mut seen = Vec::new();
        let end = walk(&words, 0, words.len(), |instr| {
            seen.push((instr.op, instr.word_count()));
            Ok(true)
        })
        .unwrap();
        assert_eq!(end, 4);
        assert_eq!(seen, vec![(Op::Nop, 1), (Op::TypeVoid, 2), (Op::Nop, 1)]);
    }

    #[test]
    fn early_stop_returns_offset() {
        let words = [word(Op::Nop, 1), word(Op::Function, 5), 1, 2, 0, 3];
        let stop = walk(&words, 0, words.len(), |instr| Ok(instr.op != Op::Function)).unwrap();
        assert_eq!(stop, 1);
    }

    #[test]
    fn zero_word_count_is_fatal() {
        let words = [word(Op::Nop, 0)];
        assert!(matches!(
            walk(&words, 0, 1, |_| Ok(true)),
            Err(ParseError::InvalidWordCount { offset: 0 })
        ));
    }

    #[test]
    fn overrun_is_fatal() {
        let words = [word(Op::TypeVector, 4), 1, 2];
        assert!(matches!(
            walk(&words, 0, 3, |_| Ok(true)),
            Err(ParseError::InstructionOverrun {
                offset: 0,
                count: 4,
                remaining: 3
            })
        ));
    }

    #[test]
    fn unknown_opcode_is_fatal() {
        let words = [(1 << 16) | 0xfffe];
        assert!(matches!(
            walk(&words, 0, 1, |_| Ok(true)),
            Err(ParseError::UnknownOpcode { opcode: 0xfffe, .. })
        ));
    }

    #[test]
    fn strings_are_nul_terminated() {
        // "main" fills one word, so the terminator takes a second.
        let words = [
            word(Op::Name, 4),
            7,
            u32::from_le_bytes(*b"main"),
            0,
        ];
        let instr = Instruction {
            op: Op::Name,
            offset: 0,
            words: &words,
        };
        assert_eq!(instr.string(1).unwrap(), ("main".to_string(), 2));
        let unterminated = Instruction {
            op: Op::Name,
            offset: 0,
            words: &words[..3],
        };
        assert!(matches!(
            unterminated.string(1),
            Err(ParseError::BadString(0))
        ));
    }
}
