use super::class_file::{ConstantIndex, ConstantPoolOverflow};
use super::code::Label;
use super::MalformedDescriptor;
use std::fmt;

/// Everything that can go wrong reading, rewriting, or writing a class file
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Class files start with `0xCAFEBABE`
    BadMagic(u32),

    UnknownConstantTag(u8),
    MalformedConstantPool(String),
    ConstantPoolOverflow(ConstantPoolOverflow),

    /// A constant index that is out of bounds or points to the wrong kind of constant
    BadConstantIndex {
        index: u16,
        expected: &'static str,
    },

    /// UTF-8 constant that has no string representation (eg. an unpaired surrogate)
    InvalidModifiedUtf8(u16),

    MalformedAttribute {
        attribute: &'static str,
        reason: String,
    },

    /// Input had unconsumed bytes after the last structure
    TrailingBytes(usize),

    BadDescriptor(MalformedDescriptor),

    UnknownOpcode {
        offset: u32,
        opcode: u8,
    },

    /// Valid opcodes that the rewriter refuses to handle (`jsr`, `ret`)
    UnsupportedOpcode {
        offset: u32,
        opcode: u8,
    },

    /// Instruction at this offset runs past the end of the code array
    TruncatedInstruction(u32),

    /// Jump to an offset which is not the start of an instruction
    InvalidBranchTarget {
        offset: u32,
        target: i64,
    },

    /// Jump whose relative offset does not fit in the encoding of its instruction
    JumpOutOfRange {
        offset: u32,
        target: u32,
    },

    /// Code array is larger than 65535 bytes
    MethodCodeOverflow(usize),

    /// Operand stack would be deeper than 65535 slots
    MethodCodeMaxStackOverflow(usize),

    /// A label is jumped to but never placed
    UnplacedLabel(Label),

    /// A label is placed twice (indicates a bug)
    DuplicateLabel(Label),

    /// Error trying to simulate the frame at an instruction
    VerifierError {
        offset: u32,
        kind: VerifierErrorKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    NotArrayType,
    InvalidLocal(u16),
    InvalidType,
    NotLoadableConstant(ConstantIndex),

    /// A constant referenced by the instruction is missing or malformed
    UnresolvableConstant(ConstantIndex),

    /// No stack map frame could be found for a point in the code
    MissingFrame,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::BadMagic(magic) => write!(f, "bad magic number {:#010x}", magic),
            Error::UnknownConstantTag(tag) => write!(f, "unknown constant tag {}", tag),
            Error::MalformedConstantPool(reason) => write!(f, "malformed constant pool: {}", reason),
            Error::ConstantPoolOverflow(overflow) => write!(
                f,
                "constant pool overflow inserting {:?} at {}",
                overflow.constant, overflow.offset
            ),
            Error::BadConstantIndex { index, expected } => {
                write!(f, "constant #{} is not a valid {}", index, expected)
            }
            Error::InvalidModifiedUtf8(index) => {
                write!(f, "constant #{} is not valid modified UTF-8", index)
            }
            Error::MalformedAttribute { attribute, reason } => {
                write!(f, "malformed {} attribute: {}", attribute, reason)
            }
            Error::TrailingBytes(count) => write!(f, "{} unexpected trailing bytes", count),
            Error::BadDescriptor(err) => fmt::Display::fmt(err, f),
            Error::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode {:#04x} at {}", opcode, offset)
            }
            Error::UnsupportedOpcode { offset, opcode } => {
                write!(f, "unsupported opcode {:#04x} at {}", opcode, offset)
            }
            Error::TruncatedInstruction(offset) => {
                write!(f, "instruction at {} is truncated", offset)
            }
            Error::InvalidBranchTarget { offset, target } => write!(
                f,
                "branch at {} targets {}, which is not an instruction",
                offset, target
            ),
            Error::JumpOutOfRange { offset, target } => write!(
                f,
                "jump from {} to {} does not fit in its encoding",
                offset, target
            ),
            Error::MethodCodeOverflow(len) => write!(f, "method code is too long ({} bytes)", len),
            Error::MethodCodeMaxStackOverflow(depth) => {
                write!(f, "operand stack is too deep ({} slots)", depth)
            }
            Error::UnplacedLabel(label) => write!(f, "label {:?} is never placed", label),
            Error::DuplicateLabel(label) => write!(f, "label {:?} is placed twice", label),
            Error::VerifierError { offset, kind } => {
                write!(f, "cannot compute frame at {}: {:?}", offset, kind)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            Error::BadDescriptor(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow(overflow)
    }
}

impl From<MalformedDescriptor> for Error {
    fn from(err: MalformedDescriptor) -> Error {
        Error::BadDescriptor(err)
    }
}
