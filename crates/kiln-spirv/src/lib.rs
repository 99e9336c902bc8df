//! SPIR-V frontend for kiln.
//!
//! Decodes a SPIR-V word stream into a [`kiln_ir::Module`]. Translation runs
//! in four passes over the stream:
//!
//! 1. the preamble (types, constants, decorations, global variables),
//! 2. a CFG prepass registering every function and block,
//! 3. a structured walk of each function's blocks emitting IR,
//! 4. a second walk of each function resolving phi sources.
//!
//! Failure anywhere aborts the whole translation; no partial module is
//! returned.

mod alu;
pub mod assembler;
mod cfg;
mod composite;
mod constant;
mod decoration;
mod glsl;
mod matrix;
mod phi;
mod ssa;
mod texture;
mod translate;
mod types;
mod value;
mod variable;
mod words;

pub use value::ValueKind;

/// The only SPIR-V version word this frontend accepts.
pub const SUPPORTED_VERSION: u32 = 99;

/// Number of words in the module header.
pub const HEADER_WORDS: usize = 5;

/// How `OpFwidth*` is expanded.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub enum FwidthExpansion {
    /// `|ddx(p)| + |ddx(p)|`, the historical expansion.
    #[default]
    Legacy,
    /// `|ddx(p)| + |ddy(p)|`.
    Derivatives,
}

/// Translation options.
#[derive(Clone, Copy, Debug, Default)]
pub struct Options {
    pub fwidth: FwidthExpansion,
}

/// The five header words of a module.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub version: u32,
    pub generator: u32,
    /// Every id in the module is below this.
    pub bound: u32,
    pub schema: u32,
}

/// Checks and returns the module header.
pub fn read_header(words: &[u32]) -> Result<Header, ParseError> {
    if words.len() < HEADER_WORDS {
        return Err(ParseError::IncompleteHeader(words.len()));
    }
    if words[0] != spirv::MAGIC_NUMBER {
        return Err(ParseError::InvalidMagic(words[0]));
    }
    let header = Header {
        version: words[1],
        generator: words[2],
        bound: words[3],
        schema: words[4],
    };
    if header.version != SUPPORTED_VERSION {
        return Err(ParseError::UnsupportedVersion(header.version));
    }
    if header.schema != 0 {
        return Err(ParseError::InvalidSchema(header.schema));
    }
    Ok(header)
}

/// Translate a SPIR-V word stream with default options.
pub fn parse(words: &[u32]) -> Result<kiln_ir::Module, ParseError> {
    parse_with_options(words, &Options::default())
}

pub fn parse_with_options(
    words: &[u32],
    options: &Options,
) -> Result<kiln_ir::Module, ParseError> {
    translate::translate(words, options)
}

/// Translate a SPIR-V binary held as bytes.
///
/// The byte order is detected from the magic number; a buffer that does
/// not start with the magic in either order is rejected.
pub fn parse_bytes(bytes: &[u8]) -> Result<kiln_ir::Module, ParseError> {
    parse_bytes_with_options(bytes, &Options::default())
}

pub fn parse_bytes_with_options(
    bytes: &[u8],
    options: &Options,
) -> Result<kiln_ir::Module, ParseError> {
    let words = bytes_to_words(bytes)?;
    parse_with_options(&words, options)
}

/// Splits `bytes` into words, detecting the byte order from the magic number.
pub fn bytes_to_words(bytes: &[u8]) -> Result<Vec<u32>, ParseError> {
    if bytes.len() % 4 != 0 {
        return Err(ParseError::InvalidByteLength(bytes.len()));
    }
    let chunks = bytes.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]);
    let Some(first) = bytes.first_chunk::<4>() else {
        return Err(ParseError::IncompleteHeader(0));
    };
    let words = if u32::from_le_bytes(*first) == spirv::MAGIC_NUMBER {
        chunks.map(u32::from_le_bytes).collect()
    } else if u32::from_be_bytes(*first) == spirv::MAGIC_NUMBER {
        chunks.map(u32::from_be_bytes).collect()
    } else {
        return Err(ParseError::InvalidMagic(u32::from_le_bytes(*first)));
    };
    Ok(words)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid magic number {0:#010x}")]
    InvalidMagic(u32),
    #[error("unsupported SPIR-V version {0}, expected {SUPPORTED_VERSION}")]
    UnsupportedVersion(u32),
    #[error("invalid schema {0}, expected 0")]
    InvalidSchema(u32),
    #[error("module of {0} words is shorter than its header")]
    IncompleteHeader(usize),
    #[error("byte length {0} is not a multiple of four")]
    InvalidByteLength(usize),
    #[error("instruction at word {offset} has a word count of zero")]
    InvalidWordCount { offset: usize },
    #[error("instruction at word {offset} needs {count} words but only {remaining} remain")]
    InstructionOverrun {
        offset: usize,
        count: usize,
        remaining: usize,
    },
    #[error("region starting at word {offset} is not terminated")]
    RegionMismatch { offset: usize },
    #[error("unknown opcode {opcode} at word {offset}")]
    UnknownOpcode { opcode: u32, offset: usize },
    #[error("unsupported opcode {0:?}")]
    UnsupportedOpcode(spirv::Op),
    #[error("id %{id} is out of bounds (bound {bound})")]
    IdOutOfBounds { id: u32, bound: u32 },
    #[error("id %{0} is defined twice")]
    IdRedefined(u32),
    #[error("id %{id} is a {found}, expected a {expected}")]
    WrongKind {
        id: u32,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("id %{0} is used before it is defined")]
    UndefinedId(u32),
    #[error("struct index %{0} is not a constant")]
    NonConstantStructIndex(u32),
    #[error("unsupported storage class {0:?}")]
    UnsupportedStorageClass(spirv::StorageClass),
    #[error("invalid operands for {0:?}")]
    InvalidOperands(spirv::Op),
    #[error("block %{0} ends in a two-way branch without a selection merge")]
    MissingSelectionMerge(u32),
    #[error("malformed literal string in instruction at word {0}")]
    BadString(usize),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("lowering: {0}")]
    Lowering(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(version: u32, schema: u32) -> Vec<u32> {
        vec![spirv::MAGIC_NUMBER, version, 0, 8, schema]
    }

    #[test]
    fn header_round_trip() {
        let h = read_header(&header(SUPPORTED_VERSION, 0)).unwrap();
        assert_eq!(h.bound, 8);
        assert_eq!(h.version, SUPPORTED_VERSION);
    }

    #[test]
    fn header_rejects_bad_fields() {
        assert!(matches!(
            read_header(&[0xdead_beef, 99, 0, 1, 0]),
            Err(ParseError::InvalidMagic(0xdead_beef))
        ));
        assert!(matches!(
            read_header(&header(0x0001_0000, 0)),
            Err(ParseError::UnsupportedVersion(0x0001_0000))
        ));
        assert!(matches!(
            read_header(&header(SUPPORTED_VERSION, 1)),
            Err(ParseError::InvalidSchema(1))
        ));
        assert!(matches!(
            read_header(&[spirv::MAGIC_NUMBER]),
            Err(ParseError::IncompleteHeader(1))
        ));
    }

    #[test]
    fn byte_order_is_detected() {
        let words = header(SUPPORTED_VERSION, 0);
        let le: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let be: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        assert_eq!(bytes_to_words(&le).unwrap(), words);
        assert_eq!(bytes_to_words(&be).unwrap(), words);
        assert!(matches!(
            bytes_to_words(&le[..7]),
            Err(ParseError::InvalidByteLength(7))
        ));
        assert!(matches!(
            bytes_to_words(&[0, 0, 0, 0]),
            Err(ParseError::InvalidMagic(0))
        ));
    }
}
