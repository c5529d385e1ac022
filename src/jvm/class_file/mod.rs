//! Structures of the [`class` file format][0]
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html

mod annotation;
mod attribute;
mod binary_format;
mod class;
mod constants;
mod field;
mod method;
mod version;

pub use annotation::*;
pub use attribute::*;
pub use binary_format::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use version::*;
