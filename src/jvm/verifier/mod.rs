//! Bytecode verification utilities
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other
//! words: although the values on the stack and in the locals may obviously be different, the
//! types and order of the stack and local variables cannot. This information is referred to as
//! the _stack map frame_ (represented using [`Frame`]) and the set of stack map frames for all
//! possible jump targets in a method is the _stack map table_.
//!
//! Since the JVM [verifies by type-checking][0], editing a method body means keeping its
//! [`crate::jvm::class_file::StackMapTable`] in sync. Frames from the existing table are expanded
//! into absolute [`Frame`]s, the frame at any other instruction is recovered by simulating the
//! straight-line code since the closest preceding frame (see [`Frame::execute`]), and the
//! resulting frames get compressed back into a table.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod frame;
mod types;

pub use frame::*;
pub use types::*;
