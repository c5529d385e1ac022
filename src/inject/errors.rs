use crate::jvm;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    BytecodeGen(jvm::Error),
    MalformedDescriptor(jvm::MalformedDescriptor),

    /// Class or method name that is not valid in a class file
    MalformedName(String),

    /// The registry no longer accepts insertions
    RegistryFrozen,

    /// An insertion targets a method the class does not declare
    TargetNotFound {
        class: String,
        method: String,
        descriptor: String,
    },

    /// An insertion targets an `abstract` or `native` method
    NoMethodBody {
        class: String,
        method: String,
        descriptor: String,
    },

    /// Annotated handler method that rewritten code cannot call
    InvalidHandler(String),

    /// Rewriting a class failed, so it is left as it was
    RewriteAbandoned { class: String, cause: Box<Error> },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BytecodeGen(err) => fmt::Display::fmt(err, f),
            Error::MalformedDescriptor(err) => fmt::Display::fmt(err, f),
            Error::MalformedName(reason) => f.write_str(reason),
            Error::RegistryFrozen => f.write_str("registry is frozen"),
            Error::TargetNotFound {
                class,
                method,
                descriptor,
            } => write!(f, "{} does not declare {}{}", class, method, descriptor),
            Error::NoMethodBody {
                class,
                method,
                descriptor,
            } => write!(f, "{}.{}{} has no code", class, method, descriptor),
            Error::InvalidHandler(reason) => write!(f, "invalid handler: {}", reason),
            Error::RewriteAbandoned { class, cause } => {
                write!(f, "abandoned rewrite of {}: {}", class, cause)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BytecodeGen(err) => Some(err),
            Error::MalformedDescriptor(err) => Some(err),
            Error::RewriteAbandoned { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::BytecodeGen(err)
    }
}

impl From<jvm::MalformedDescriptor> for Error {
    fn from(err: jvm::MalformedDescriptor) -> Error {
        Error::MalformedDescriptor(err)
    }
}

impl From<jvm::class_file::ConstantPoolOverflow> for Error {
    fn from(err: jvm::class_file::ConstantPoolOverflow) -> Error {
        Error::BytecodeGen(jvm::Error::from(err))
    }
}
