//! Reading, editing, and writing JVM class files
//!
//! Everything here works on the binary class file format directly: a [`class_file::ClassFile`]
//! is parsed from bytes, edited in place, and serialized again. Methods that are not touched keep
//! their attributes byte-for-byte, so rewriting a class only changes what was actually rewritten.
//!
//!   - [`class_file`] holds the structures of the format and the constant pool
//!   - [`code`] decodes method bodies into instructions and assembles them back into bytes
//!   - [`verifier`] tracks the types on the stack and in locals (for stack map frames)

mod access_flags;
pub mod class_file;
pub mod code;
mod descriptors;
mod errors;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
