use super::Error;
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, RenderDescriptor};

#[derive(Debug, Clone)]
pub struct Settings {
    /// Class of the object handed to every handler, written as `my/hooks/Context`
    ///
    /// The rewritten code constructs it and calls its accessors by name, so the class defined at
    /// runtime must match what [`super::context::generate`] produces for these settings.
    pub context_class: BinaryName,

    /// Class-level annotation naming the class a handler class edits
    pub edit_class_annotation: BinaryName,

    /// Method-level annotation marking a handler method
    pub inject_annotation: BinaryName,

    /// Enum used by the `at` element of the insertion annotation
    pub location_enum: BinaryName,

    /// Log every rewritten method body (at `debug` level)
    pub debug_dump: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            context_class: BinaryName::HANDLER_CONTEXT,
            edit_class_annotation: BinaryName::EDIT_CLASS,
            inject_annotation: BinaryName::INJECT,
            location_enum: BinaryName::AT,
            debug_dump: false,
        }
    }

    /// Parse a class name given in either `a.b.C` or `a/b/C` form
    pub fn class_name(name: &str) -> Result<BinaryName, Error> {
        BinaryName::canonicalize(name).map_err(Error::MalformedName)
    }

    /// Descriptor every handler method must have: `(L<context class>;)V`
    pub fn handler_descriptor(&self) -> String {
        MethodDescriptor {
            parameters: vec![FieldType::object(self.context_class.clone())],
            return_type: None,
        }
        .render()
    }

    /// Type descriptor of an annotation class, as it is recorded in class files
    pub fn annotation_descriptor(annotation: &BinaryName) -> String {
        FieldType::object(annotation.clone()).render()
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
