use super::{resolve_parameter_list, Error, Runtime, Value};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};

/// Late-bound handle on a value of the running program
///
/// A reflector pairs a value with the type it was declared as. Members are looked up on the
/// declared type: a reflector over a field of type `Animal` holding a `Dog` only sees what
/// `Animal` declares. A reflector holding `null` is a static view of its class.
pub struct Reflector<'r, R: Runtime> {
    runtime: &'r R,

    /// `None` for the result of a `void` method
    declared: Option<FieldType<R::Class>>,
    value: Value<R::Object>,
}

impl<'r, R: Runtime> Reflector<'r, R> {
    pub fn new(runtime: &'r R, declared: FieldType<R::Class>, value: Value<R::Object>) -> Self {
        Reflector {
            runtime,
            declared: Some(declared),
            value,
        }
    }

    /// Static view of a class, named as `a.b.C` or `a/b/C`
    pub fn for_class(runtime: &'r R, class_name: &str) -> Result<Self, Error> {
        let class = BinaryName::canonicalize(class_name)
            .ok()
            .and_then(|name| runtime.resolve_class(&name))
            .ok_or_else(|| Error::MemberNotFound(format!("class {}", class_name)))?;
        Ok(Reflector::new(runtime, FieldType::object(class), Value::Null))
    }

    /// View of an object through its runtime class
    pub fn for_object(runtime: &'r R, object: R::Object) -> Self {
        let class = runtime.class_of(&object);
        Reflector::new(runtime, FieldType::object(class), Value::Object(object))
    }

    pub fn get(&self) -> &Value<R::Object> {
        &self.value
    }

    pub fn into_value(self) -> Value<R::Object> {
        self.value
    }

    pub fn declared_type(&self) -> Option<&FieldType<R::Class>> {
        self.declared.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn as_object(&self) -> Option<&R::Object> {
        self.value.as_object()
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self.value {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> Option<i8> {
        match self.value {
            Value::Byte(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<u16> {
        match self.value {
            Value::Char(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_short(&self) -> Option<i16> {
        match self.value {
            Value::Short(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self.value {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self.value {
            Value::Long(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self.value {
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.value {
            Value::Double(d) => Some(d),
            _ => None,
        }
    }

    /// Contents of the value, if it is a string object
    pub fn as_string(&self) -> Option<String> {
        self.as_object()
            .and_then(|object| self.runtime.string_value(object))
    }

    /// Read a field declared by the declared class
    pub fn get_field(&self, name: &str) -> Result<Reflector<'r, R>, Error> {
        let class = self.class(name)?;
        let field = self
            .runtime
            .declared_field(class, name)
            .ok_or_else(|| Error::MemberNotFound(format!("field {}", name)))?;
        let receiver = self.receiver(name, field.is_static)?;
        let value = self
            .runtime
            .read_field(class, name, receiver)
            .map_err(|err| access(format!("field {}", name), err))?;
        Ok(Reflector::new(self.runtime, field.field_type, value))
    }

    /// Write a field declared by the declared class
    pub fn set_field(&self, name: &str, value: Value<R::Object>) -> Result<(), Error> {
        let class = self.class(name)?;
        let field = self
            .runtime
            .declared_field(class, name)
            .ok_or_else(|| Error::MemberNotFound(format!("field {}", name)))?;
        let receiver = self.receiver(name, field.is_static)?;
        self.runtime
            .write_field(class, name, receiver, value)
            .map_err(|err| access(format!("field {}", name), err))
    }

    /// Call a method, with parameter types given as a descriptor (eg. `(ILjava/lang/String;)V`)
    pub fn invoke(
        &self,
        name: &str,
        descriptor: &str,
        args: &[Value<R::Object>],
    ) -> Result<Reflector<'r, R>, Error> {
        let parameters = resolve_parameter_list(self.runtime, descriptor)?;
        self.invoke_raw(name, &parameters, args)
    }

    /// Call the method whose parameter types are exactly `parameters`
    pub fn invoke_raw(
        &self,
        name: &str,
        parameters: &[FieldType<R::Class>],
        args: &[Value<R::Object>],
    ) -> Result<Reflector<'r, R>, Error> {
        let class = self.class(name)?;
        let method = self
            .runtime
            .declared_method(class, name, parameters)
            .ok_or_else(|| Error::MemberNotFound(format!("method {}", name)))?;
        let receiver = self.receiver(name, method.is_static)?;
        let value = self
            .runtime
            .call_method(class, name, parameters, receiver, args)
            .map_err(|err| access(format!("method {}", name), err))?;
        Ok(Reflector {
            runtime: self.runtime,
            declared: method.return_type,
            value,
        })
    }

    /// Construct an instance of the declared class
    pub fn new_instance(
        &self,
        descriptor: &str,
        args: &[Value<R::Object>],
    ) -> Result<Reflector<'r, R>, Error> {
        let parameters = resolve_parameter_list(self.runtime, descriptor)?;
        self.new_instance_raw(&parameters, args)
    }

    pub fn new_instance_raw(
        &self,
        parameters: &[FieldType<R::Class>],
        args: &[Value<R::Object>],
    ) -> Result<Reflector<'r, R>, Error> {
        let class = self.class("<init>")?;
        if !self.runtime.has_constructor(class, parameters) {
            return Err(Error::MemberNotFound(format!(
                "constructor with {} parameter(s)",
                parameters.len()
            )));
        }
        let object = self
            .runtime
            .construct(class, parameters, args)
            .map_err(|err| access(String::from("constructor"), err))?;
        Ok(Reflector::new(
            self.runtime,
            FieldType::object(class.clone()),
            Value::Object(object),
        ))
    }

    /// Declared class, if members can be looked up on it
    fn class(&self, member: &str) -> Result<&R::Class, Error> {
        match &self.declared {
            Some(FieldType::Ref(RefType::Object(class))) => Ok(class),
            Some(FieldType::Base(base)) => Err(Error::MemberNotFound(format!(
                "{} on a value of primitive type {}",
                member,
                base_type_name(*base)
            ))),
            Some(FieldType::Ref(_)) => Err(Error::MemberNotFound(format!(
                "{} on an array",
                member
            ))),
            None => Err(Error::MemberNotFound(format!("{} on void", member))),
        }
    }

    /// Receiver for an access, checking a static view only touches static members
    fn receiver(&self, member: &str, is_static: bool) -> Result<Option<&R::Object>, Error> {
        match (&self.value, is_static) {
            (_, true) => Ok(None),
            (Value::Object(object), false) => Ok(Some(object)),
            (_, false) => Err(Error::NotStatic(member.to_owned())),
        }
    }
}

impl<'r, R: Runtime> Clone for Reflector<'r, R> {
    fn clone(&self) -> Self {
        Reflector {
            runtime: self.runtime,
            declared: self.declared.clone(),
            value: self.value.clone(),
        }
    }
}

fn access<E: std::error::Error + Send + Sync + 'static>(member: String, err: E) -> Error {
    Error::Access {
        member,
        source: Box::new(err),
    }
}

fn base_type_name(base: BaseType) -> &'static str {
    match base {
        BaseType::Boolean => "boolean",
        BaseType::Byte => "byte",
        BaseType::Char => "char",
        BaseType::Short => "short",
        BaseType::Int => "int",
        BaseType::Long => "long",
        BaseType::Float => "float",
        BaseType::Double => "double",
    }
}
