use crate::jvm::class_file::{
    encode_modified_utf8, Attribute, ClassConstantIndex, ConstantIndex, ConstantsPool, Field,
    Method, Parse, Serialize, Version,
};
use crate::jvm::{ClassAccessFlags, Error};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub version: Version,
    pub constants: ConstantsPool,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` has no superclass
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a complete class file
    pub fn parse_bytes(bytes: &[u8]) -> Result<ClassFile, Error> {
        ClassFile::from_bytes(bytes)
    }

    /// Internal name of the class (eg. `java/lang/String`)
    pub fn this_class_name(&self) -> Result<String, Error> {
        self.constants.class_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Result<Option<String>, Error> {
        self.super_class
            .map(|super_class| self.constants.class_name(super_class))
            .transpose()
    }

    /// Find the position of the method with this exact name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        let name = encode_modified_utf8(name);
        let descriptor = encode_modified_utf8(descriptor);
        self.methods.iter().position(|method| {
            self.constants.utf8_bytes(method.name_index).ok() == Some(&name[..])
                && self.constants.utf8_bytes(method.descriptor_index).ok() == Some(&descriptor[..])
        })
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for ClassFile {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        let magic = u32::parse(reader)?;
        if magic.to_be_bytes() != ClassFile::MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let version = Version::parse(reader)?;
        let constants = ConstantsPool::parse(reader)?;
        let access_flags = ClassAccessFlags::parse(reader)?;
        let this_class = ClassConstantIndex::parse(reader)?;
        let super_class = match u16::parse(reader)? {
            0 => None,
            index => Some(ClassConstantIndex(ConstantIndex(index))),
        };
        let interfaces = Vec::<ClassConstantIndex>::parse(reader)?;
        let fields = Vec::<Field>::parse(reader)?;
        let methods = Vec::<Method>::parse(reader)?;
        let attributes = Vec::<Attribute>::parse(reader)?;
        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}
