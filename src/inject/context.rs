//! Runtime class of the object passed to handlers
//!
//! Rewritten methods construct one context object per handler call, hand it to the handler, and
//! then ask it whether the handler cancelled the method. The class is generated rather than
//! shipped so that its name can follow [`Settings::context_class`]. Hosts define it (see
//! [`generate`]) before the first rewritten class runs.
//!
//! The Java equivalent of the generated class is:
//!
//! ```java
//! public class HandlerContext {
//!     private Object instance;
//!     private Object[] args;
//!     private boolean cancelled;
//!     private Object returnValue;
//!
//!     public HandlerContext(Object instance, Object[] args) { ... }
//!     public Object getSelf() { return instance; }
//!     public Object getArg(int index) { ... } // 1-based
//!     public Object[] getArgs() { return args; }
//!     public int getArgCount() { return args.length; }
//!     public void setCancelled(boolean cancelled) { ... }
//!     public boolean isCancelled() { return cancelled; }
//!     public void setReturnValue(Object value) { ... }
//!     public Object getReturnValue() { return returnValue; }
//! }
//! ```

use super::{Error, Settings};
use crate::jvm::class_file::{
    BytecodeArray, ClassFile, Code, ConstantsPool, Field, Method, Serialize, Version,
};
use crate::jvm::code::{
    BranchInstruction, CodeBuffer, Instruction, InvokeType, Label, OrdComparison,
};
use crate::jvm::verifier::{encode_stack_map_table, VerifierFrame};
use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, MethodDescriptor, Name,
    ParseDescriptor, UnqualifiedName,
};

/// Descriptor of the constructor called by rewritten code
pub(crate) const CONSTRUCTOR_DESCRIPTOR: &str = "(Ljava/lang/Object;[Ljava/lang/Object;)V";

pub(crate) const IS_CANCELLED: (&str, &str) = ("isCancelled", "()Z");
pub(crate) const GET_RETURN_VALUE: (&str, &str) = ("getReturnValue", "()Ljava/lang/Object;");

const INSTANCE: (&str, &str) = ("instance", "Ljava/lang/Object;");
const ARGS: (&str, &str) = ("args", "[Ljava/lang/Object;");
const CANCELLED: (&str, &str) = ("cancelled", "Z");
const RETURN_VALUE: (&str, &str) = ("returnValue", "Ljava/lang/Object;");

/// Serialized context class for these settings
pub fn generate(settings: &Settings) -> Result<Vec<u8>, Error> {
    let class = generate_class(&settings.context_class)?;
    Ok(class.to_bytes().map_err(crate::jvm::Error::from)?)
}

fn generate_class(name: &BinaryName) -> Result<ClassFile, Error> {
    let mut builder = ContextBuilder {
        class: name,
        constants: ConstantsPool::new(),
        methods: vec![],
    };

    let mut fields = vec![];
    for (field_name, descriptor) in [INSTANCE, ARGS, CANCELLED, RETURN_VALUE] {
        fields.push(Field {
            access_flags: FieldAccessFlags::PRIVATE,
            name_index: builder.constants.get_utf8(field_name)?,
            descriptor_index: builder.constants.get_utf8(descriptor)?,
            attributes: vec![],
        });
    }

    // Constructor
    let mut code = CodeBuffer::new();
    let object_init = builder.constants.get_method_ref(
        &BinaryName::OBJECT,
        &UnqualifiedName::INIT,
        "()V",
        false,
    )?;
    code.push_instruction(Instruction::ALoad(0));
    code.push_instruction(Instruction::Invoke(InvokeType::Special, object_init));
    builder.store_field(&mut code, INSTANCE, Instruction::ALoad(1))?;
    builder.store_field(&mut code, ARGS, Instruction::ALoad(2))?;
    code.push_branch_instruction(BranchInstruction::Return);
    builder.add_method(UnqualifiedName::INIT.as_str(), CONSTRUCTOR_DESCRIPTOR, 2, code, &[])?;

    // Plain accessors
    let getters = [
        ("getSelf", INSTANCE, BranchInstruction::AReturn),
        ("getArgs", ARGS, BranchInstruction::AReturn),
        (IS_CANCELLED.0, CANCELLED, BranchInstruction::IReturn),
        (GET_RETURN_VALUE.0, RETURN_VALUE, BranchInstruction::AReturn),
    ];
    for (method_name, field, ret) in getters {
        let mut code = CodeBuffer::new();
        builder.load_field(&mut code, field)?;
        code.push_branch_instruction(ret);
        builder.add_method(method_name, &format!("(){}", field.1), 1, code, &[])?;
    }

    let setters = [
        ("setCancelled", CANCELLED, Instruction::ILoad(1)),
        ("setReturnValue", RETURN_VALUE, Instruction::ALoad(1)),
    ];
    for (method_name, field, load) in setters {
        let mut code = CodeBuffer::new();
        builder.store_field(&mut code, field, load)?;
        code.push_branch_instruction(BranchInstruction::Return);
        builder.add_method(method_name, &format!("({})V", field.1), 2, code, &[])?;
    }

    let mut code = CodeBuffer::new();
    builder.load_field(&mut code, ARGS)?;
    code.push_instruction(Instruction::ArrayLength);
    code.push_branch_instruction(BranchInstruction::IReturn);
    builder.add_method("getArgCount", "()I", 1, code, &[])?;

    builder.add_get_arg()?;

    let this_class = builder.constants.get_class(name)?;
    let super_class = builder.constants.get_class(&BinaryName::OBJECT)?;
    Ok(ClassFile {
        version: Version::JAVA8,
        constants: builder.constants,
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        this_class,
        super_class: Some(super_class),
        interfaces: vec![],
        fields,
        methods: builder.methods,
        attributes: vec![],
    })
}

struct ContextBuilder<'a> {
    class: &'a BinaryName,
    constants: ConstantsPool,
    methods: Vec<Method>,
}

impl<'a> ContextBuilder<'a> {
    fn load_field(&mut self, code: &mut CodeBuffer, field: (&str, &str)) -> Result<(), Error> {
        let field_ref = self.constants.get_field_ref(self.class, field.0, field.1)?;
        code.push_instruction(Instruction::ALoad(0));
        code.push_instruction(Instruction::GetField(field_ref));
        Ok(())
    }

    fn store_field(
        &mut self,
        code: &mut CodeBuffer,
        field: (&str, &str),
        load_value: Instruction,
    ) -> Result<(), Error> {
        let field_ref = self.constants.get_field_ref(self.class, field.0, field.1)?;
        code.push_instruction(Instruction::ALoad(0));
        code.push_instruction(load_value);
        code.push_instruction(Instruction::PutField(field_ref));
        Ok(())
    }

    /// `getArg(int)`, which counts arguments from 1 and throws on anything out of range
    fn add_get_arg(&mut self) -> Result<(), Error> {
        let mut code = CodeBuffer::new();
        let out_of_range = code.fresh_label();

        code.push_instruction(Instruction::ILoad(1));
        code.push_instruction(Instruction::IConst1);
        code.push_branch_instruction(BranchInstruction::IfICmp(OrdComparison::LT, out_of_range));
        code.push_instruction(Instruction::ILoad(1));
        self.load_field(&mut code, ARGS)?;
        code.push_instruction(Instruction::ArrayLength);
        code.push_branch_instruction(BranchInstruction::IfICmp(OrdComparison::GT, out_of_range));
        self.load_field(&mut code, ARGS)?;
        code.push_instruction(Instruction::ILoad(1));
        code.push_instruction(Instruction::IConst1);
        code.push_instruction(Instruction::ISub);
        code.push_instruction(Instruction::AALoad);
        code.push_branch_instruction(BranchInstruction::AReturn);

        // throw new IndexOutOfBoundsException("Invalid argument index: " + index)
        let exception = self
            .constants
            .get_class(&BinaryName::INDEXOUTOFBOUNDSEXCEPTION)?;
        let builder_class = self.constants.get_class(&BinaryName::STRINGBUILDER)?;
        let builder_init = self.constants.get_method_ref(
            &BinaryName::STRINGBUILDER,
            &UnqualifiedName::INIT,
            "()V",
            false,
        )?;
        let append_string = self.constants.get_method_ref(
            &BinaryName::STRINGBUILDER,
            &UnqualifiedName::APPEND,
            "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
            false,
        )?;
        let append_int = self.constants.get_method_ref(
            &BinaryName::STRINGBUILDER,
            &UnqualifiedName::APPEND,
            "(I)Ljava/lang/StringBuilder;",
            false,
        )?;
        let to_string = self.constants.get_method_ref(
            &BinaryName::STRINGBUILDER,
            &UnqualifiedName::TOSTRING,
            "()Ljava/lang/String;",
            false,
        )?;
        let exception_init = self.constants.get_method_ref(
            &BinaryName::INDEXOUTOFBOUNDSEXCEPTION,
            &UnqualifiedName::INIT,
            "(Ljava/lang/String;)V",
            false,
        )?;
        let message = self.constants.get_string("Invalid argument index: ")?;

        code.place_label(out_of_range);
        code.push_instruction(Instruction::New(exception));
        code.push_instruction(Instruction::Dup);
        code.push_instruction(Instruction::New(builder_class));
        code.push_instruction(Instruction::Dup);
        code.push_instruction(Instruction::Invoke(InvokeType::Special, builder_init));
        code.push_instruction(Instruction::Ldc(message.into()));
        code.push_instruction(Instruction::Invoke(InvokeType::Virtual, append_string));
        code.push_instruction(Instruction::ILoad(1));
        code.push_instruction(Instruction::Invoke(InvokeType::Virtual, append_int));
        code.push_instruction(Instruction::Invoke(InvokeType::Virtual, to_string));
        code.push_instruction(Instruction::Invoke(InvokeType::Special, exception_init));
        code.push_branch_instruction(BranchInstruction::AThrow);

        self.add_method("getArg", "(I)Ljava/lang/Object;", 4, code, &[out_of_range])
    }

    /// Assemble a public instance method
    ///
    /// Every label in `frame_labels` gets a stack map frame identical to the one on method entry,
    /// which is all the branching methods of this class need.
    fn add_method(
        &mut self,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        code: CodeBuffer,
        frame_labels: &[Label],
    ) -> Result<(), Error> {
        let parsed = MethodDescriptor::parse(descriptor)?;
        let max_locals = parsed.parameter_length(true) as u16;
        let assembled = code.assemble()?;

        let mut attributes = vec![];
        if !frame_labels.is_empty() {
            let initial = VerifierFrame::initial(self.class, name, false, &parsed);
            let mut frames = vec![];
            for label in frame_labels {
                let offset = assembled
                    .label_offsets
                    .get(label)
                    .copied()
                    .ok_or(crate::jvm::Error::UnplacedLabel(*label))?;
                frames.push((offset, initial.clone()));
            }
            let table = encode_stack_map_table(&initial, &frames, &mut self.constants, |_| None)?;
            attributes.push(self.constants.get_attribute(&table)?);
        }

        let code = Code {
            max_stack,
            max_locals,
            code_array: BytecodeArray(assembled.code),
            exception_table: vec![],
            attributes,
        };
        let code_attribute = self.constants.get_attribute(&code)?;
        self.methods.push(Method {
            access_flags: MethodAccessFlags::PUBLIC,
            name_index: self.constants.get_utf8(name)?,
            descriptor_index: self.constants.get_utf8(descriptor)?,
            attributes: vec![code_attribute],
        });
        Ok(())
    }
}
