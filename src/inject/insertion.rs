use super::{Error, Settings};
use crate::jvm::{
    BinaryName, MethodDescriptor, Name, ParseDescriptor, RenderDescriptor, UnqualifiedName,
};
use std::fmt;

/// Where in the target method the handler gets called
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    /// On entry, before the first original instruction
    Head,

    /// Before every return instruction
    Return,

    /// At the end of a method which never returns explicitly
    Tail,
}

impl Location {
    /// Parse the name of the enum constant used in annotations
    pub fn from_constant_name(name: &str) -> Option<Location> {
        match name {
            "HEAD" => Some(Location::Head),
            "RETURN" => Some(Location::Return),
            "TAIL" => Some(Location::Tail),
            _ => None,
        }
    }

    pub fn constant_name(&self) -> &'static str {
        match self {
            Location::Head => "HEAD",
            Location::Return => "RETURN",
            Location::Tail => "TAIL",
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.constant_name())
    }
}

/// One handler call to splice into one method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertionSpec {
    pub target_class: BinaryName,
    pub target_method: UnqualifiedName,
    pub target_descriptor: MethodDescriptor<BinaryName>,
    pub location: Location,
    pub handler_class: BinaryName,

    /// Static method of `handler_class` taking the context object and returning nothing
    pub handler_method: UnqualifiedName,
}

/// Fields that distinguish one insertion from another (the handler class is implied by the
/// annotated class, so it is not part of this)
pub type InsertionIdentity<'a> = (
    &'a BinaryName,
    &'a UnqualifiedName,
    &'a MethodDescriptor<BinaryName>,
    Location,
    &'a UnqualifiedName,
);

impl InsertionSpec {
    /// Build a spec out of names in their textual form
    ///
    /// Class names may be dotted or use `/` separators.
    pub fn new(
        target_class: &str,
        target_method: &str,
        target_descriptor: &str,
        location: Location,
        handler_class: &str,
        handler_method: &str,
    ) -> Result<InsertionSpec, Error> {
        Ok(InsertionSpec {
            target_class: Settings::class_name(target_class)?,
            target_method: method_name(target_method)?,
            target_descriptor: MethodDescriptor::parse(target_descriptor)?,
            location,
            handler_class: Settings::class_name(handler_class)?,
            handler_method: method_name(handler_method)?,
        })
    }

    pub fn identity(&self) -> InsertionIdentity<'_> {
        (
            &self.target_class,
            &self.target_method,
            &self.target_descriptor,
            self.location,
            &self.handler_method,
        )
    }

    /// Does this spec apply to the method with this name and descriptor?
    pub fn targets(&self, name: &str, descriptor: &str) -> bool {
        self.target_method.as_str() == name && self.target_descriptor.render() == descriptor
    }
}

impl fmt::Display for InsertionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} at {} of {}.{}{}",
            self.handler_class,
            self.handler_method,
            self.location,
            self.target_class,
            self.target_method,
            self.target_descriptor.render()
        )
    }
}

fn method_name(name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(name.to_owned()).map_err(Error::MalformedName)
}
