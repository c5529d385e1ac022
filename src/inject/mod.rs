//! Registering insertions and splicing them into classes
//!
//! Startup goes [`Scanner`] → [`Registry`] → [`Registry::freeze`]. After that, a [`Transformer`]
//! holding the frozen registry is consulted for every class the host defines. Matching methods
//! get calls to their handlers spliced in; everything else passes through untouched.

pub mod context;
mod errors;
mod insertion;
mod registry;
mod scanner;
mod settings;
mod splice;
mod transformer;

pub use errors::*;
pub use insertion::*;
pub use registry::*;
pub use scanner::*;
pub use settings::*;
pub use transformer::*;
