//! Late-bound access to a running program's objects, for handlers
//!
//! The host supplies a [`Runtime`] (class lookup, member lookup, field access, calls). On top of
//! that, a [`Reflector`] reads and writes fields and calls methods by name and exact descriptor,
//! without handler code depending on the classes it manipulates.

mod errors;
mod handler;
mod reflector;
mod runtime;

pub use errors::*;
pub use handler::*;
pub use reflector::*;
pub use runtime::*;
