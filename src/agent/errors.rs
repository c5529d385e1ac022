use crate::inject;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    /// Bad agent configuration string
    Config(String),

    /// Mod manifest that could not be understood
    Manifest { archive: PathBuf, reason: String },

    Inject(inject::Error),

    /// The host refused to do something the agent needs
    Host(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(reason) => write!(f, "invalid agent configuration: {}", reason),
            Error::Manifest { archive, reason } => {
                write!(f, "invalid manifest in {}: {}", archive.display(), reason)
            }
            Error::Inject(err) => fmt::Display::fmt(err, f),
            Error::Host(err) => write!(f, "host error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Inject(err) => Some(err),
            Error::Host(err) => Some(err),
            _ => None,
        }
    }
}

impl From<inject::Error> for Error {
    fn from(err: inject::Error) -> Error {
        Error::Inject(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Host(err)
    }
}
