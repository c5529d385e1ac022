use crate::jvm::class_file::{
    Attribute, AttributeLike, Code, ConstantsPool, Parse, Serialize, Utf8ConstantIndex,
};
use crate::jvm::{Error, MethodAccessFlags};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Method declared by a class or interface
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.6
#[derive(Debug, Clone)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Method {
    pub fn name(&self, constants: &ConstantsPool) -> Result<String, Error> {
        constants.utf8(self.name_index)
    }

    pub fn descriptor(&self, constants: &ConstantsPool) -> Result<String, Error> {
        constants.utf8(self.descriptor_index)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Abstract and native methods have no code to edit
    pub fn has_body(&self) -> bool {
        !self
            .access_flags
            .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    }

    /// Position in `attributes` of the `Code` attribute, if there is one
    pub fn code_attribute_position(&self, constants: &ConstantsPool) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attr| constants.utf8_bytes(attr.name_index).ok() == Some(Code::NAME.as_bytes()))
    }

    /// Decode the `Code` attribute, if there is one
    pub fn code(&self, constants: &ConstantsPool) -> Result<Option<Code>, Error> {
        match self.code_attribute_position(constants) {
            None => Ok(None),
            Some(position) => Ok(Some(Code::from_attribute(&self.attributes[position])?)),
        }
    }
}

impl Serialize for Method {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.access_flags.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Parse for Method {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Method {
            access_flags: MethodAccessFlags::parse(reader)?,
            name_index: Utf8ConstantIndex::parse(reader)?,
            descriptor_index: Utf8ConstantIndex::parse(reader)?,
            attributes: Vec::<Attribute>::parse(reader)?,
        })
    }
}
