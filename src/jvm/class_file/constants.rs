use crate::jvm::class_file::{parse_raw_bytes, Attribute, AttributeLike, Parse, Serialize};
use crate::jvm::descriptors::RefType;
use crate::jvm::{BinaryName, Error};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fmt;
use std::result::Result;

/// Class file constants pool
///
/// Pools are either parsed out of an existing class file or built up from scratch. Either way,
/// new constants are only ever appended, so every index handed out stays valid. Lookups for
/// commonly inserted constants (UTF-8 strings, classes, member references) are deduplicated
/// against what is already in the pool.
#[derive(Clone)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    utf8s: HashMap<Vec<u8>, Utf8ConstantIndex>,
    classes: HashMap<Utf8ConstantIndex, ClassConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
}

/// Class, name, and descriptor of a field or method reference, resolved to strings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRef {
    pub class: String,
    pub name: String,
    pub descriptor: String,
    pub is_interface: bool,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            strings: HashMap::new(),
            integers: HashMap::new(),
            name_and_types: HashMap::new(),
            fieldrefs: HashMap::new(),
            methodrefs: HashMap::new(),
        }
    }

    /// Remember where existing constants are so that later insertions reuse them
    fn index_constant(&mut self, index: ConstantIndex, constant: &Constant) {
        match constant {
            Constant::Utf8(bytes) => {
                self.utf8s
                    .entry(bytes.clone())
                    .or_insert(Utf8ConstantIndex(index));
            }
            Constant::Class(name) => {
                self.classes
                    .entry(*name)
                    .or_insert(ClassConstantIndex(index));
            }
            Constant::String(utf8) => {
                self.strings
                    .entry(*utf8)
                    .or_insert(StringConstantIndex(index));
            }
            Constant::Integer(integer) => {
                self.integers.entry(*integer).or_insert(index);
            }
            Constant::NameAndType { name, descriptor } => {
                self.name_and_types
                    .entry((*name, *descriptor))
                    .or_insert(NameAndTypeConstantIndex(index));
            }
            Constant::FieldRef(class, name_and_type) => {
                self.fieldrefs
                    .entry((*class, *name_and_type))
                    .or_insert(FieldRefConstantIndex(index));
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                self.methodrefs
                    .entry((*class, *name_and_type, *is_interface))
                    .or_insert(MethodRefConstantIndex(index));
            }
            _ => (),
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: `constant_pool_count` is a `u16` that is one more than the largest index, indexing
    /// starts at 1, and some constants take two spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow { constant, offset });
        }

        let index = ConstantIndex(offset as u16);
        self.index_constant(index, &constant);
        self.constants.push(constant);
        Ok(index)
    }

    /// Number of slots used (this is what gets written as `constant_pool_count`)
    pub fn count(&self) -> u16 {
        self.constants.offset_len().0 as u16
    }

    /// Iterate over the constants and their indices
    pub fn iter(&self) -> impl Iterator<Item = (ConstantIndex, &Constant)> + '_ {
        self.constants
            .iter()
            .map(|(off, constant)| (ConstantIndex(off.0 as u16), constant))
    }

    /// Look up any constant
    pub fn get(&self, index: impl Into<ConstantIndex>) -> Result<&Constant, Error> {
        let index = index.into();
        self.constants
            .get_offset(Offset(index.0 as usize))
            .ok_or(Error::BadConstantIndex {
                index: index.0,
                expected: "constant",
            })
    }

    /// Raw (modified UTF-8) bytes of a UTF-8 constant
    pub fn utf8_bytes(&self, index: Utf8ConstantIndex) -> Result<&[u8], Error> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(Error::BadConstantIndex {
                index: (index.0).0,
                expected: "Utf8",
            }),
        }
    }

    /// Decoded contents of a UTF-8 constant
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<String, Error> {
        decode_modified_utf8(self.utf8_bytes(index)?).ok_or(Error::InvalidModifiedUtf8((index.0).0))
    }

    /// Name stored in a class constant
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<String, Error> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(Error::BadConstantIndex {
                index: (index.0).0,
                expected: "Class",
            }),
        }
    }

    /// Type named by a class constant (which may be an array type)
    pub fn class_type(&self, index: ClassConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let name = self.class_name(index)?;
        Ok(RefType::from_class_constant(&name)?)
    }

    /// Name and descriptor stored in a name and type constant
    pub fn name_and_type(
        &self,
        index: NameAndTypeConstantIndex,
    ) -> Result<(String, String), Error> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::BadConstantIndex {
                index: (index.0).0,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolve a field, method, or interface method reference
    pub fn member_ref(&self, index: impl Into<ConstantIndex>) -> Result<MemberRef, Error> {
        let index = index.into();
        let (class, name_and_type, is_interface) = match self.get(index)? {
            Constant::FieldRef(class, name_and_type) => (*class, *name_and_type, false),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => (*class, *name_and_type, *is_interface),
            _ => {
                return Err(Error::BadConstantIndex {
                    index: index.0,
                    expected: "Fieldref or Methodref",
                })
            }
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            class: self.class_name(class)?,
            name,
            descriptor,
            is_interface,
        })
    }

    /// Name and descriptor of an `invokedynamic` or dynamic constant
    pub fn dynamic_name_and_type(
        &self,
        index: impl Into<ConstantIndex>,
    ) -> Result<(String, String), Error> {
        let index = index.into();
        match self.get(index)? {
            Constant::InvokeDynamic {
                method_descriptor, ..
            } => self.name_and_type(*method_descriptor),
            Constant::Dynamic { name_and_type, .. } => self.name_and_type(*name_and_type),
            _ => Err(Error::BadConstantIndex {
                index: index.0,
                expected: "InvokeDynamic or Dynamic",
            }),
        }
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8(&mut self, utf8: impl AsRef<str>) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        let bytes = encode_modified_utf8(utf8.as_ref());
        if let Some(idx) = self.utf8s.get(&bytes) {
            Ok(*idx)
        } else {
            Ok(Utf8ConstantIndex(self.push_constant(Constant::Utf8(bytes))?))
        }
    }

    /// Get or insert a class constant
    ///
    /// Array classes are named by their descriptor (see [`RefType::class_constant_name`]).
    pub fn get_class(&mut self, name: impl AsRef<str>) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        if let Some(idx) = self.classes.get(&name) {
            Ok(*idx)
        } else {
            Ok(ClassConstantIndex(self.push_constant(Constant::Class(name))?))
        }
    }

    /// Get or insert a class constant for a reference type
    pub fn get_class_for_type(
        &mut self,
        ref_type: &RefType<BinaryName>,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        self.get_class(ref_type.class_constant_name())
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(&mut self, string: impl AsRef<str>) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        let utf8 = self.get_utf8(string)?;
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            Ok(StringConstantIndex(self.push_constant(Constant::String(utf8))?))
        }
    }

    /// Get or insert an integer constant
    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.integers.get(&integer) {
            Ok(*idx)
        } else {
            self.push_constant(Constant::Integer(integer))
        }
    }

    /// Insert a long constant (these are not deduplicated)
    pub fn push_long(&mut self, long: i64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        self.push_constant(Constant::Long(long))
    }

    /// Insert a double constant (these are not deduplicated)
    pub fn push_double(&mut self, double: f64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        self.push_constant(Constant::Double(double))
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: impl AsRef<str>,
        descriptor: impl AsRef<str>,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.name_and_types.get(&(name, descriptor)) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            Ok(NameAndTypeConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Get or insert a `CONSTANT_Fieldref_info`
    pub fn get_field_ref(
        &mut self,
        class: impl AsRef<str>,
        name: impl AsRef<str>,
        descriptor: impl AsRef<str>,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(idx) = self.fieldrefs.get(&(class, name_and_type)) {
            Ok(*idx)
        } else {
            let constant = Constant::FieldRef(class, name_and_type);
            Ok(FieldRefConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Get or insert a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
    pub fn get_method_ref(
        &mut self,
        class: impl AsRef<str>,
        name: impl AsRef<str>,
        descriptor: impl AsRef<str>,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class = self.get_class(class)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        if let Some(idx) = self.methodrefs.get(&(class, name_and_type, is_interface)) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            };
            Ok(MethodRefConstantIndex(self.push_constant(constant)?))
        }
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: &A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let info = attribute.to_bytes()?;
        Ok(Attribute { name_index, info })
    }

    /// Find the attribute with a given name (if there are several, the first one)
    pub fn find_attribute<'a>(&self, attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
        attributes
            .iter()
            .find(|attr| self.utf8_bytes(attr.name_index).ok() == Some(name.as_bytes()))
    }

    /// Find and decode the attribute of a given type
    pub fn decode_attribute<A: AttributeLike>(
        &self,
        attributes: &[Attribute],
    ) -> Result<Option<A>, Error> {
        self.find_attribute(attributes, A::NAME)
            .map(A::from_attribute)
            .transpose()
    }
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

impl fmt::Debug for ConstantsPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.constants, f)
    }
}

impl Serialize for ConstantsPool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.count().serialize(writer)?;
        for constant in self.constants.values() {
            constant.serialize(writer)?;
        }
        Ok(())
    }
}

impl Parse for ConstantsPool {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let count = u16::parse(reader)? as usize;
        let mut pool = ConstantsPool::new();
        while pool.constants.offset_len().0 < count {
            let constant = Constant::parse(reader)?;
            pool.push_constant(constant)?;
        }
        if pool.constants.offset_len().0 != count {
            return Err(Error::MalformedConstantPool(format!(
                "wide constant overflows declared count {}",
                count
            )));
        }
        Ok(pool)
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: usize,
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant string in the class file's modified UTF-8 encoding
    ///
    /// The raw bytes are kept (rather than a decoded `String`) since Java strings may contain
    /// unpaired surrogates, and existing constants must be written back exactly as they came.
    Utf8(Vec<u8>),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    Module(Utf8ConstantIndex),

    Package(Utf8ConstantIndex),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(bytes) => {
                1u8.serialize(writer)?;
                (bytes.len() as u16).serialize(writer)?;
                writer.write_all(bytes)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Parse for Constant {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let utf8 = |reader: &mut R| -> Result<Utf8ConstantIndex, Error> {
            Ok(Utf8ConstantIndex(ConstantIndex::parse(reader)?))
        };
        let name_and_type = |reader: &mut R| -> Result<NameAndTypeConstantIndex, Error> {
            Ok(NameAndTypeConstantIndex(ConstantIndex::parse(reader)?))
        };
        let class = |reader: &mut R| -> Result<ClassConstantIndex, Error> {
            Ok(ClassConstantIndex(ConstantIndex::parse(reader)?))
        };

        let constant = match u8::parse(reader)? {
            1 => {
                let len = u16::parse(reader)? as usize;
                Constant::Utf8(parse_raw_bytes(reader, len)?)
            }
            3 => Constant::Integer(i32::parse(reader)?),
            4 => Constant::Float(f32::parse(reader)?),
            5 => Constant::Long(i64::parse(reader)?),
            6 => Constant::Double(f64::parse(reader)?),
            7 => Constant::Class(utf8(reader)?),
            8 => Constant::String(utf8(reader)?),
            9 => Constant::FieldRef(class(reader)?, name_and_type(reader)?),
            tag @ (10 | 11) => Constant::MethodRef {
                class: class(reader)?,
                name_and_type: name_and_type(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: utf8(reader)?,
                descriptor: utf8(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::parse(reader)?,
                member: ConstantIndex::parse(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: utf8(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::parse(reader)?,
                name_and_type: name_and_type(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::parse(reader)?,
                method_descriptor: name_and_type(reader)?,
            },
            19 => Constant::Module(utf8(reader)?),
            20 => Constant::Package(utf8(reader)?),
            tag => return Err(Error::UnknownConstantTag(tag)),
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = vec![];
    let mut units = [0u16; 2];
    for c in string.chars() {
        // Supplementary characters are written out as two encoded surrogates
        for unit in c.encode_utf16(&mut units).iter() {
            let code = *unit as u32;
            match code {
                0x0001..=0x007F => buffer.push(code as u8),
                0x0000 | 0x0080..=0x07FF => {
                    buffer.push((code >> 6 & 0x1F) as u8 | 0b1100_0000);
                    buffer.push((code & 0x3F) as u8 | 0b1000_0000);
                }
                _ => {
                    buffer.push((code >> 12 & 0x0F) as u8 | 0b1110_0000);
                    buffer.push((code >> 6 & 0x3F) as u8 | 0b1000_0000);
                    buffer.push((code & 0x3F) as u8 | 0b1000_0000);
                }
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Returns `None` for malformed byte sequences and for unpaired surrogates (which have no `str`
/// representation).
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    let continuation = |byte: Option<u8>| -> Option<u16> {
        match byte {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Some((b & 0x3F) as u16),
            _ => None,
        }
    };
    while let Some(first) = iter.next() {
        let unit = match first {
            0x01..=0x7F => first as u16,
            0xC0..=0xDF => ((first & 0x1F) as u16) << 6 | continuation(iter.next())?,
            0xE0..=0xEF => {
                let second = continuation(iter.next())?;
                let third = continuation(iter.next())?;
                ((first & 0x0F) as u16) << 12 | second << 6 | third
            }
            _ => return None,
        };
        units.push(unit);
    }
    String::from_utf16(&units).ok()
}



/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVMS:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct ConstantIndex(pub u16);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct Utf8ConstantIndex(pub ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct StringConstantIndex(pub(crate) ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct NameAndTypeConstantIndex(pub(crate) ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ClassConstantIndex(pub(crate) ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct FieldRefConstantIndex(pub(crate) ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct MethodRefConstantIndex(pub(crate) ConstantIndex);

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct InvokeDynamicConstantIndex(pub(crate) ConstantIndex);

/// Typed indices are thin wrappers: they convert to a raw index and serialize as one
macro_rules! typed_constant_index {
    ($($index:ident),*) => {
        $(
            impl From<$index> for ConstantIndex {
                fn from(index: $index) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $index {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Parse for $index {
                fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
                    Ok($index(ConstantIndex::parse(reader)?))
                }
            }
        )*
    };
}

typed_constant_index!(
    Utf8ConstantIndex,
    StringConstantIndex,
    NameAndTypeConstantIndex,
    ClassConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex,
    InvokeDynamicConstantIndex
);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for ConstantIndex {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ConstantIndex(u16::parse(reader)?))
    }
}

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Parse for HandleKind {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(match u8::parse(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                return Err(Error::MalformedConstantPool(format!(
                    "unknown method handle kind {}",
                    other
                )))
            }
        })
    }
}
