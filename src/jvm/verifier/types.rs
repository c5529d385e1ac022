use crate::jvm::class_file::{ClassConstantIndex, ConstantsPool, Parse, Serialize};
use crate::jvm::{BaseType, BinaryName, Error, FieldType, RefType};
use crate::util::Width;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot (a local that was never written, or the upper half of a `long`/`double`)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    /// The `U` identifies the `new` instruction: in a class file, it is the offset of that
    /// instruction from the start of the method body.
    Uninitialized(U),
}

/// Verification type used while simulating code: classes are kept by name and uninitialized
/// objects by the offset of their `new` in the method being simulated
pub type VerifierType = VerificationType<RefType<BinaryName>, u32>;

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Is this a reference to a fully constructed object (or `null`)?
    pub fn is_initialized_reference(&self) -> bool {
        matches!(self, VerificationType::Null | VerificationType::Object(_))
    }

    pub fn map<C2, U2>(
        &self,
        map_class: impl Fn(&Cls) -> C2,
        map_uninitialized: impl Fn(&U) -> U2,
    ) -> VerificationType<C2, U2> {
        match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit))
            }
        }
    }
}

impl<U> From<FieldType<BinaryName>> for VerificationType<RefType<BinaryName>, U> {
    fn from(field_type: FieldType<BinaryName>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl VerifierType {
    /// Could a value of this type be read as a value of the given field type?
    ///
    /// Primitives must match exactly (modulo the `int`-like types all being `Integer`). For
    /// references, only initialization is checked: there is no class hierarchy to consult.
    pub fn fits(&self, field_type: &FieldType<BinaryName>) -> bool {
        match field_type {
            FieldType::Ref(_) => self.is_initialized_reference(),
            FieldType::Base(_) => *self == VerifierType::from(field_type.clone()),
        }
    }

    /// Convert a type read out of a `StackMapTable`
    pub fn resolve(
        serialized: &VerificationType<ClassConstantIndex, u16>,
        constants: &ConstantsPool,
    ) -> Result<VerifierType, Error> {
        Ok(match serialized {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(constants.class_type(*cls)?),
            VerificationType::Uninitialized(offset) => {
                VerificationType::Uninitialized(*offset as u32)
            }
        })
    }

    /// Convert back into a type that can be written into a `StackMapTable`
    ///
    /// Class constants are looked up (or added) as needed. `relocate` maps the offset of a `new`
    /// instruction to its offset in the code being written out.
    pub fn into_serializable(
        &self,
        constants: &mut ConstantsPool,
        relocate: &impl Fn(u32) -> Option<u16>,
    ) -> Result<VerificationType<ClassConstantIndex, u16>, Error> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(ref_type) => {
                VerificationType::Object(constants.get_class_for_type(ref_type)?)
            }
            VerificationType::Uninitialized(offset) => match relocate(*offset) {
                Some(relocated) => VerificationType::Uninitialized(relocated),
                None => {
                    return Err(Error::MalformedAttribute {
                        attribute: "StackMapTable",
                        reason: format!("no `new` instruction at offset {}", offset),
                    })
                }
            },
        })
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Parse for VerificationType<ClassConstantIndex, u16> {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(match u8::parse(reader)? {
            0 => VerificationType::Top,
            1 => VerificationType::Integer,
            2 => VerificationType::Float,
            3 => VerificationType::Double,
            4 => VerificationType::Long,
            5 => VerificationType::Null,
            6 => VerificationType::UninitializedThis,
            7 => VerificationType::Object(ClassConstantIndex::parse(reader)?),
            8 => VerificationType::Uninitialized(u16::parse(reader)?),
            tag => {
                return Err(Error::MalformedAttribute {
                    attribute: "StackMapTable",
                    reason: format!("unknown verification type tag {}", tag),
                })
            }
        })
    }
}

impl<Cls, A> Width for VerificationType<Cls, A> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}
