use jarhook::jvm::class_file::{
    Annotation, Attribute, BytecodeArray, ClassFile, Code, ConstantsPool, ElementValue,
    ElementValuePair, ExceptionHandler, BytecodeIndex, Method, RuntimeInvisibleAnnotations,
    RuntimeVisibleAnnotations, Serialize, Version,
};
use jarhook::jvm::code::{CodeBuffer, Label};
use jarhook::jvm::verifier::{encode_stack_map_table, VerifierFrame};
use jarhook::jvm::{
    BinaryName, ClassAccessFlags, MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor,
};

/// Element of an annotation built for a test
pub enum Element<'a> {
    Str(&'a str),

    /// Enum type descriptor and constant name
    Enum(&'a str, &'a str),
}

/// Method body assembled from a [`CodeBuffer`]
pub struct Body {
    pub code: CodeBuffer,
    pub max_stack: u16,
    pub max_locals: u16,

    /// Stack map frames to record, at the labels they belong to
    pub frames: Vec<(Label, VerifierFrame)>,

    /// `(start, end, handler)` ranges, catching anything
    pub catch_all: Vec<(Label, Label, Label)>,
}

impl Body {
    pub fn new(code: CodeBuffer, max_stack: u16, max_locals: u16) -> Body {
        Body {
            code,
            max_stack,
            max_locals,
            frames: vec![],
            catch_all: vec![],
        }
    }

    pub fn frame(mut self, label: Label, frame: VerifierFrame) -> Body {
        self.frames.push((label, frame));
        self
    }
}

pub struct ClassBuilder {
    name: BinaryName,
    version: Version,
    pub constants: ConstantsPool,
    methods: Vec<Method>,
    attributes: Vec<Attribute>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> ClassBuilder {
        ClassBuilder::with_version(name, Version::JAVA8)
    }

    pub fn with_version(name: &str, version: Version) -> ClassBuilder {
        ClassBuilder {
            name: BinaryName::from_string(name.to_owned()).unwrap(),
            version,
            constants: ConstantsPool::new(),
            methods: vec![],
            attributes: vec![],
        }
    }

    pub fn name(&self) -> &BinaryName {
        &self.name
    }

    /// Entry frame of a method of this class
    pub fn initial_frame(&self, name: &str, descriptor: &str, is_static: bool) -> VerifierFrame {
        let descriptor = MethodDescriptor::parse(descriptor).unwrap();
        VerifierFrame::initial(&self.name, name, is_static, &descriptor)
    }

    pub fn annotation(&mut self, descriptor: &str, elements: &[(&str, Element)]) -> Annotation {
        let type_index = self.constants.get_utf8(descriptor).unwrap();
        let pairs = elements
            .iter()
            .map(|(name, element)| {
                let name_index = self.constants.get_utf8(name).unwrap();
                let value = match element {
                    Element::Str(value) => {
                        ElementValue::Const(b's', self.constants.get_utf8(value).unwrap().0)
                    }
                    Element::Enum(type_name, const_name) => ElementValue::Enum {
                        type_name: self.constants.get_utf8(type_name).unwrap(),
                        const_name: self.constants.get_utf8(const_name).unwrap(),
                    },
                };
                ElementValuePair { name_index, value }
            })
            .collect();
        Annotation { type_index, pairs }
    }

    pub fn annotate(&mut self, annotation: Annotation) {
        let attribute = visible_annotations(&mut self.constants, annotation);
        self.attributes.push(attribute);
    }

    pub fn method(&mut self, flags: MethodAccessFlags, name: &str, descriptor: &str, body: Body) {
        self.method_with(flags, name, descriptor, Some(body), vec![]);
    }

    /// Add a method, with an optional body and annotations
    ///
    /// Annotations are recorded as visible, except those whose descriptor mentions `Invisible`.
    pub fn method_with(
        &mut self,
        flags: MethodAccessFlags,
        name: &str,
        descriptor: &str,
        body: Option<Body>,
        annotations: Vec<Annotation>,
    ) {
        let mut attributes = vec![];
        if let Some(body) = body {
            let assembled = body.code.assemble().unwrap();
            let offset = |label: &Label| assembled.label_offsets[label];

            let mut code_attributes = vec![];
            if !body.frames.is_empty() {
                let initial =
                    self.initial_frame(name, descriptor, flags.contains(MethodAccessFlags::STATIC));
                let mut frames: Vec<(u32, VerifierFrame)> = body
                    .frames
                    .iter()
                    .map(|(label, frame)| (offset(label), frame.clone()))
                    .collect();
                frames.sort_by_key(|(offset, _)| *offset);
                let table =
                    encode_stack_map_table(&initial, &frames, &mut self.constants, |_| None)
                        .unwrap();
                code_attributes.push(self.constants.get_attribute(&table).unwrap());
            }

            let exception_table = body
                .catch_all
                .iter()
                .map(|(start, end, handler)| ExceptionHandler {
                    start_pc: BytecodeIndex(offset(start) as u16),
                    end_pc: BytecodeIndex(offset(end) as u16),
                    handler_pc: BytecodeIndex(offset(handler) as u16),
                    catch_type: None,
                })
                .collect();

            let code = Code {
                max_stack: body.max_stack,
                max_locals: body.max_locals,
                code_array: BytecodeArray(assembled.code.clone()),
                exception_table,
                attributes: code_attributes,
            };
            attributes.push(self.constants.get_attribute(&code).unwrap());
        }

        for annotation in annotations {
            let invisible = self
                .constants
                .utf8(annotation.type_index)
                .unwrap()
                .contains("Invisible");
            let attribute = if invisible {
                let annotations = RuntimeInvisibleAnnotations(vec![annotation]);
                self.constants.get_attribute(&annotations).unwrap()
            } else {
                visible_annotations(&mut self.constants, annotation)
            };
            attributes.push(attribute);
        }

        self.methods.push(Method {
            access_flags: flags,
            name_index: self.constants.get_utf8(name).unwrap(),
            descriptor_index: self.constants.get_utf8(descriptor).unwrap(),
            attributes,
        });
    }

    pub fn build(mut self) -> Vec<u8> {
        let this_class = self.constants.get_class(&self.name).unwrap();
        let super_class = self.constants.get_class(&BinaryName::OBJECT).unwrap();
        let class = ClassFile {
            version: self.version,
            constants: self.constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class: Some(super_class),
            interfaces: vec![],
            fields: vec![],
            methods: self.methods,
            attributes: self.attributes,
        };
        class.to_bytes().unwrap()
    }
}

fn visible_annotations(constants: &mut ConstantsPool, annotation: Annotation) -> Attribute {
    constants
        .get_attribute(&RuntimeVisibleAnnotations(vec![annotation]))
        .unwrap()
}

pub const PUBLIC_STATIC: MethodAccessFlags = MethodAccessFlags::from_bits_truncate(0x0009);
