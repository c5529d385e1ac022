//! Splice calls to handler methods into JVM classes as they are defined
//!
//! Handler classes are annotated with the class they edit and, per handler method, the method and
//! location (`HEAD`, `RETURN`, or `TAIL`) to call them from. At startup these annotations are
//! scanned into a registry. Afterwards, every class the host defines goes through a transformer
//! that rewrites the matching methods, and passes everything else through untouched.

pub mod agent;
pub mod inject;
pub mod jvm;
pub mod reflect;
pub mod util;
