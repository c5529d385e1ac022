use crate::jvm::MalformedDescriptor;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    MalformedDescriptor(MalformedDescriptor),

    /// No class, field, method, or constructor with this exact name and signature
    MemberNotFound(String),

    /// Instance member used through a static view
    NotStatic(String),

    /// The member was found but the host failed to access it
    Access {
        member: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Handler argument index out of range (indices start at 1)
    ArgumentIndex { index: usize, count: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MalformedDescriptor(err) => fmt::Display::fmt(err, f),
            Error::MemberNotFound(member) => write!(f, "could not find {}", member),
            Error::NotStatic(member) => write!(f, "{} is not static", member),
            Error::Access { member, source } => write!(f, "failed to access {}: {}", member, source),
            Error::ArgumentIndex { index, count } => write!(
                f,
                "invalid argument index {} (there are {} arguments)",
                index, count
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MalformedDescriptor(err) => Some(err),
            Error::Access { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<MalformedDescriptor> for Error {
    fn from(err: MalformedDescriptor) -> Error {
        Error::MalformedDescriptor(err)
    }
}
