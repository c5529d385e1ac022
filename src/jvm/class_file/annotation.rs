use crate::jvm::class_file::{
    AttributeLike, ConstantIndex, ConstantsPool, Parse, Serialize, Utf8ConstantIndex,
};
use crate::jvm::Error;
use byteorder::{ReadBytesExt, WriteBytesExt};

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeVisibleAnnotations(pub Vec<Annotation>);

/// Annotations with `CLASS` retention end up here (they are in the class file, but reflection
/// does not see them)
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.17
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeInvisibleAnnotations(pub Vec<Annotation>);

impl AttributeLike for RuntimeVisibleAnnotations {
    const NAME: &'static str = "RuntimeVisibleAnnotations";
}

impl AttributeLike for RuntimeInvisibleAnnotations {
    const NAME: &'static str = "RuntimeInvisibleAnnotations";
}

impl Serialize for RuntimeVisibleAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for RuntimeVisibleAnnotations {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(RuntimeVisibleAnnotations(Vec::parse(reader)?))
    }
}

impl Serialize for RuntimeInvisibleAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Parse for RuntimeInvisibleAnnotations {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(RuntimeInvisibleAnnotations(Vec::parse(reader)?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface (eg. `Ljava/lang/Deprecated;`)
    pub type_index: Utf8ConstantIndex,
    pub pairs: Vec<ElementValuePair>,
}

impl Annotation {
    /// Find the value of an element, if it was given explicitly
    ///
    /// Elements left at their defaults are not recorded in the class file.
    pub fn element<'a>(&'a self, constants: &ConstantsPool, name: &str) -> Option<&'a ElementValue> {
        self.pairs
            .iter()
            .find(|pair| constants.utf8_bytes(pair.name_index).ok() == Some(name.as_bytes()))
            .map(|pair| &pair.value)
    }
}

impl Serialize for Annotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.type_index.serialize(writer)?;
        self.pairs.serialize(writer)
    }
}

impl Parse for Annotation {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(Annotation {
            type_index: Utf8ConstantIndex::parse(reader)?,
            pairs: Vec::parse(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementValuePair {
    pub name_index: Utf8ConstantIndex,
    pub value: ElementValue,
}

impl Serialize for ElementValuePair {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        self.value.serialize(writer)
    }
}

impl Parse for ElementValuePair {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(ElementValuePair {
            name_index: Utf8ConstantIndex::parse(reader)?,
            value: ElementValue::parse(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html#jvms-4.7.16.1
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant
    ///
    /// The tag is one of `BCDFIJSZ` (pointing at a numeric constant) or `s` (pointing at a UTF-8
    /// constant).
    Const(u8, ConstantIndex),

    /// Enum constant
    Enum {
        /// Field descriptor of the enum type
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },

    /// Class literal, as a return descriptor (eg. `V` for `void.class`)
    Class(Utf8ConstantIndex),

    Annotation(Annotation),

    Array(Vec<ElementValue>),
}

impl ElementValue {
    /// If this is a string constant, read it
    pub fn as_string(&self, constants: &ConstantsPool) -> Option<String> {
        match self {
            ElementValue::Const(b's', index) => {
                constants.utf8(Utf8ConstantIndex(*index)).ok()
            }
            _ => None,
        }
    }

    /// If this is an enum constant, read its type descriptor and constant name
    pub fn as_enum(&self, constants: &ConstantsPool) -> Option<(String, String)> {
        match self {
            ElementValue::Enum {
                type_name,
                const_name,
            } => Some((
                constants.utf8(*type_name).ok()?,
                constants.utf8(*const_name).ok()?,
            )),
            _ => None,
        }
    }
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            ElementValue::Const(tag, index) => {
                tag.serialize(writer)?;
                index.serialize(writer)?;
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                b'e'.serialize(writer)?;
                type_name.serialize(writer)?;
                const_name.serialize(writer)?;
            }
            ElementValue::Class(class) => {
                b'c'.serialize(writer)?;
                class.serialize(writer)?;
            }
            ElementValue::Annotation(annotation) => {
                b'@'.serialize(writer)?;
                annotation.serialize(writer)?;
            }
            ElementValue::Array(values) => {
                b'['.serialize(writer)?;
                values.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Parse for ElementValue {
    fn parse<R: ReadBytesExt>(reader: &mut R) -> Result<Self, Error> {
        Ok(match u8::parse(reader)? {
            tag @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's') => {
                ElementValue::Const(tag, ConstantIndex::parse(reader)?)
            }
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::parse(reader)?,
                const_name: Utf8ConstantIndex::parse(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::parse(reader)?),
            b'@' => ElementValue::Annotation(Annotation::parse(reader)?),
            b'[' => ElementValue::Array(Vec::parse(reader)?),
            other => {
                return Err(Error::MalformedAttribute {
                    attribute: RuntimeVisibleAnnotations::NAME,
                    reason: format!("unknown element value tag {:?}", other as char),
                })
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nested_element_values() {
        let mut pool = ConstantsPool::new();
        let annotation = Annotation {
            type_index: pool.get_utf8("Lhooks/Inject;").unwrap(),
            pairs: vec![
                ElementValuePair {
                    name_index: pool.get_utf8("method").unwrap(),
                    value: ElementValue::Const(b's', pool.get_utf8("tick").unwrap().0),
                },
                ElementValuePair {
                    name_index: pool.get_utf8("at").unwrap(),
                    value: ElementValue::Enum {
                        type_name: pool.get_utf8("Lhooks/At;").unwrap(),
                        const_name: pool.get_utf8("RETURN").unwrap(),
                    },
                },
                ElementValuePair {
                    name_index: pool.get_utf8("tags").unwrap(),
                    value: ElementValue::Array(vec![]),
                },
            ],
        };
        let attribute = RuntimeVisibleAnnotations(vec![annotation]);
        let parsed = RuntimeVisibleAnnotations::from_bytes(&attribute.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, attribute);

        let annotation = &parsed.0[0];
        assert_eq!(
            annotation
                .element(&pool, "method")
                .and_then(|v| v.as_string(&pool)),
            Some(String::from("tick"))
        );
        assert_eq!(
            annotation.element(&pool, "at").and_then(|v| v.as_enum(&pool)),
            Some((String::from("Lhooks/At;"), String::from("RETURN")))
        );
        assert!(annotation.element(&pool, "descriptor").is_none());
    }
}
