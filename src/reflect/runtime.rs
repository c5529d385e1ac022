use crate::jvm::{parse_parameter_list, BinaryName, FieldType, MalformedDescriptor, RenderDescriptor};
use std::fmt::Debug;

/// Set of classes that descriptors can be resolved against
pub trait TypeUniverse {
    /// Handle for a loaded class
    type Class: Clone + Debug + PartialEq;

    fn resolve_class(&self, name: &BinaryName) -> Option<Self::Class>;
}

/// Value passed to or read from the host runtime
///
/// Primitives are carried unboxed. `Null` is the null reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Value<O> {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(O),
}

impl<O> Value<O> {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_object(&self) -> Option<&O> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }
}

/// Field declared by a class
#[derive(Clone, Debug, PartialEq)]
pub struct FieldInfo<C> {
    pub field_type: FieldType<C>,
    pub is_static: bool,
}

/// Method declared by a class
#[derive(Clone, Debug, PartialEq)]
pub struct MethodInfo<C> {
    /// `None` for `void` methods
    pub return_type: Option<FieldType<C>>,
    pub is_static: bool,
}

/// Late-bound access to the objects of a running program
///
/// Lookups only see members a class declares itself, and match parameter types exactly.
/// Receivers are `None` for static access.
pub trait Runtime: TypeUniverse {
    /// Handle for an object on the host heap
    type Object: Clone + Debug;

    /// Error the host reports when an access fails (eg. the called method threw)
    type Failure: std::error::Error + Send + Sync + 'static;

    fn class_of(&self, object: &Self::Object) -> Self::Class;

    /// Contents of a `java.lang.String` object
    fn string_value(&self, object: &Self::Object) -> Option<String>;

    fn declared_field(&self, class: &Self::Class, name: &str) -> Option<FieldInfo<Self::Class>>;

    fn declared_method(
        &self,
        class: &Self::Class,
        name: &str,
        parameters: &[FieldType<Self::Class>],
    ) -> Option<MethodInfo<Self::Class>>;

    fn has_constructor(&self, class: &Self::Class, parameters: &[FieldType<Self::Class>]) -> bool;

    fn read_field(
        &self,
        class: &Self::Class,
        name: &str,
        receiver: Option<&Self::Object>,
    ) -> Result<Value<Self::Object>, Self::Failure>;

    fn write_field(
        &self,
        class: &Self::Class,
        name: &str,
        receiver: Option<&Self::Object>,
        value: Value<Self::Object>,
    ) -> Result<(), Self::Failure>;

    fn call_method(
        &self,
        class: &Self::Class,
        name: &str,
        parameters: &[FieldType<Self::Class>],
        receiver: Option<&Self::Object>,
        args: &[Value<Self::Object>],
    ) -> Result<Value<Self::Object>, Self::Failure>;

    fn construct(
        &self,
        class: &Self::Class,
        parameters: &[FieldType<Self::Class>],
        args: &[Value<Self::Object>],
    ) -> Result<Self::Object, Self::Failure>;
}

/// Replace every class name in a type with the universe's handle for it
pub fn resolve_field_type<U: TypeUniverse + ?Sized>(
    universe: &U,
    field_type: &FieldType<BinaryName>,
) -> Result<FieldType<U::Class>, MalformedDescriptor> {
    field_type.try_map(|name| {
        universe.resolve_class(name).ok_or_else(|| MalformedDescriptor {
            descriptor: field_type.render(),
            reason: format!("Unknown class {}", name),
        })
    })
}

/// Parse a parameter list (see [`parse_parameter_list`]) and resolve the classes it mentions
pub fn resolve_parameter_list<U: TypeUniverse + ?Sized>(
    universe: &U,
    descriptor: &str,
) -> Result<Vec<FieldType<U::Class>>, MalformedDescriptor> {
    parse_parameter_list(descriptor)?
        .iter()
        .map(|parameter| {
            resolve_field_type(universe, parameter).map_err(|err| MalformedDescriptor {
                descriptor: descriptor.to_owned(),
                reason: err.reason,
            })
        })
        .collect()
}
