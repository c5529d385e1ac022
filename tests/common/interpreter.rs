//! Small bytecode interpreter for running rewritten classes
//!
//! It is nowhere near a JVM, but it is strict about the things a rewrite can get wrong: the
//! operand stack may never exceed `max_stack`, locals must stay under `max_locals` and be read
//! with the kind they were written with, and at every offset with a stack map frame the actual
//! stack depth and local kinds must match the frame.

use jarhook::jvm::class_file::{ClassFile, Code, Constant, ConstantsPool, StackMapTable};
use jarhook::jvm::class_file::ClassConstantIndex;
use jarhook::jvm::code::{
    decode_code, AnyInstruction, BranchInstruction, EqComparison, Instruction, InvokeType,
    OrdComparison,
};
use jarhook::jvm::verifier::{decode_stack_map_table, VerificationType, VerifierFrame};
use jarhook::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor};
use std::collections::HashMap;
use std::rc::Rc;

pub const CONTEXT: &str = "jarhook/util/HandlerContext";
const STEP_LIMIT: usize = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Val {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Ref(usize),
}

impl Val {
    fn width(&self) -> usize {
        match self {
            Val::Long(_) | Val::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    Instance {
        class: String,
        fields: HashMap<String, Val>,
    },
    Array(Vec<Val>),
    Boxed {
        class: String,
        value: Val,
    },
    Str(String),
}

/// Abrupt end of a call
#[derive(Clone, Debug, PartialEq)]
pub enum Trap {
    /// Exception that handlers may catch
    Exception(Val),

    /// Bug in the code being run (or something the interpreter does not support)
    Fault(String),
}

impl From<String> for Trap {
    fn from(message: String) -> Trap {
        Trap::Fault(message)
    }
}

impl From<&str> for Trap {
    fn from(message: &str) -> Trap {
        Trap::Fault(message.to_owned())
    }
}

pub type Outcome = Result<Option<Val>, Trap>;

type Native = Rc<dyn Fn(&mut Jvm, &[Val]) -> Outcome>;

const WRAPPERS: [(&str, BaseType, &str); 8] = [
    ("java/lang/Boolean", BaseType::Boolean, "booleanValue"),
    ("java/lang/Byte", BaseType::Byte, "byteValue"),
    ("java/lang/Character", BaseType::Char, "charValue"),
    ("java/lang/Short", BaseType::Short, "shortValue"),
    ("java/lang/Integer", BaseType::Int, "intValue"),
    ("java/lang/Long", BaseType::Long, "longValue"),
    ("java/lang/Float", BaseType::Float, "floatValue"),
    ("java/lang/Double", BaseType::Double, "doubleValue"),
];

pub struct Jvm {
    classes: HashMap<String, Rc<ClassFile>>,
    natives: HashMap<(String, String, String), Native>,
    statics: HashMap<(String, String), Val>,
    pub heap: Vec<Object>,

    /// Events recorded by natives, in order
    pub trace: Vec<String>,
}

impl Jvm {
    pub fn new() -> Jvm {
        let mut jvm = Jvm {
            classes: HashMap::new(),
            natives: HashMap::new(),
            statics: HashMap::new(),
            heap: vec![],
            trace: vec![],
        };
        jvm.native("java/lang/Object", "<init>", "()V", |_, _| Ok(None));
        jvm.native("java/lang/StringBuilder", "<init>", "()V", |jvm, args| {
            let empty = jvm.string("");
            jvm.set_field(args[0], "value", empty)?;
            Ok(None)
        });
        for descriptor in ["(Ljava/lang/String;)Ljava/lang/StringBuilder;", "(I)Ljava/lang/StringBuilder;"] {
            jvm.native("java/lang/StringBuilder", "append", descriptor, |jvm, args| {
                let mut text = jvm.text(jvm.field(args[0], "value").unwrap_or(Val::Null))?;
                match args[1] {
                    Val::Int(i) => text.push_str(&i.to_string()),
                    other => text.push_str(&jvm.text(other)?),
                }
                let text = jvm.string(&text);
                jvm.set_field(args[0], "value", text)?;
                Ok(Some(args[0]))
            });
        }
        jvm.native("java/lang/StringBuilder", "toString", "()Ljava/lang/String;", |jvm, args| {
            Ok(jvm.field(args[0], "value"))
        });
        for exception in ["java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"] {
            jvm.native(exception, "<init>", "(Ljava/lang/String;)V", |jvm, args| {
                jvm.set_field(args[0], "message", args[1])?;
                Ok(None)
            });
        }
        for (class, base, unbox) in WRAPPERS {
            let descriptor = format!("({})L{};", base_code(base), class);
            jvm.native(class, "valueOf", &descriptor, move |jvm, args| {
                Ok(Some(jvm.boxed(class, args[0])))
            });
            let descriptor = format!("(){}", base_code(base));
            jvm.native(class, unbox, &descriptor, move |jvm, args| {
                match jvm.object(args[0])? {
                    Object::Boxed { class: boxed, value } if boxed == class => Ok(Some(*value)),
                    other => Err(Trap::Fault(format!("cannot unbox {:?} as {}", other, class))),
                }
            });
        }
        jvm
    }

    /// Load a class file (replacing any class with the same name)
    pub fn load(&mut self, bytes: &[u8]) {
        let class = ClassFile::parse_bytes(bytes).expect("class should parse");
        let name = class.this_class_name().unwrap();
        self.classes.insert(name, Rc::new(class));
    }

    pub fn native(
        &mut self,
        class: &str,
        name: &str,
        descriptor: &str,
        body: impl Fn(&mut Jvm, &[Val]) -> Outcome + 'static,
    ) {
        self.natives.insert(
            (class.to_owned(), name.to_owned(), descriptor.to_owned()),
            Rc::new(body),
        );
    }

    pub fn record(&mut self, event: impl Into<String>) {
        self.trace.push(event.into());
    }

    pub fn take_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace)
    }

    pub fn alloc(&mut self, object: Object) -> Val {
        self.heap.push(object);
        Val::Ref(self.heap.len() - 1)
    }

    pub fn string(&mut self, value: &str) -> Val {
        self.alloc(Object::Str(value.to_owned()))
    }

    pub fn boxed(&mut self, class: &str, value: Val) -> Val {
        self.alloc(Object::Boxed {
            class: class.to_owned(),
            value,
        })
    }

    pub fn object(&self, value: Val) -> Result<&Object, Trap> {
        match value {
            Val::Ref(index) => Ok(&self.heap[index]),
            other => Err(Trap::Fault(format!("expected a reference, found {:?}", other))),
        }
    }

    pub fn static_field(&self, class: &str, name: &str) -> Option<Val> {
        self.statics.get(&(class.to_owned(), name.to_owned())).copied()
    }

    pub fn field(&self, object: Val, name: &str) -> Option<Val> {
        match self.object(object) {
            Ok(Object::Instance { fields, .. }) => fields.get(name).copied(),
            _ => None,
        }
    }

    pub fn set_field(&mut self, object: Val, name: &str, value: Val) -> Result<(), Trap> {
        match object {
            Val::Ref(index) => match &mut self.heap[index] {
                Object::Instance { fields, .. } => {
                    fields.insert(name.to_owned(), value);
                    Ok(())
                }
                other => Err(Trap::Fault(format!("cannot set {} on {:?}", name, other))),
            },
            other => Err(Trap::Fault(format!("cannot set {} on {:?}", name, other))),
        }
    }

    /// Contents of a string object
    pub fn text(&self, value: Val) -> Result<String, Trap> {
        match self.object(value)? {
            Object::Str(string) => Ok(string.clone()),
            other => Err(Trap::Fault(format!("expected a string, found {:?}", other))),
        }
    }

    /// Class of an instance (or wrapper) object
    pub fn class_of(&self, value: Val) -> Option<String> {
        match self.object(value).ok()? {
            Object::Instance { class, .. } | Object::Boxed { class, .. } => Some(class.clone()),
            Object::Str(_) => Some(String::from("java/lang/String")),
            Object::Array(_) => None,
        }
    }

    /// Unboxed value of a wrapper object, or the string it holds
    pub fn describe(&self, value: Val) -> String {
        match value {
            Val::Null => String::from("null"),
            Val::Ref(_) => match self.object(value) {
                Ok(Object::Boxed { value, .. }) => self.describe(*value),
                Ok(Object::Str(string)) => format!("{:?}", string),
                Ok(Object::Instance { class, .. }) => format!("<{}>", class),
                Ok(Object::Array(items)) => format!("<array of {}>", items.len()),
                Err(_) => unreachable!(),
            },
            Val::Int(i) => i.to_string(),
            Val::Long(l) => format!("{}L", l),
            Val::Float(f) => format!("{}F", f),
            Val::Double(d) => format!("{}D", d),
        }
    }

    // Accessors of the generated context class, called the way a handler would

    pub fn ctx_self(&mut self, ctx: Val) -> Result<Val, Trap> {
        self.call_ret(CONTEXT, "getSelf", "()Ljava/lang/Object;", vec![ctx])
    }

    pub fn ctx_arg(&mut self, ctx: Val, index: i32) -> Result<Val, Trap> {
        self.call_ret(CONTEXT, "getArg", "(I)Ljava/lang/Object;", vec![ctx, Val::Int(index)])
    }

    pub fn ctx_arg_count(&mut self, ctx: Val) -> Result<Val, Trap> {
        self.call_ret(CONTEXT, "getArgCount", "()I", vec![ctx])
    }

    /// Cancel the edited method, making it return `value`
    pub fn ctx_cancel(&mut self, ctx: Val, value: Val) -> Result<(), Trap> {
        self.invoke(
            CONTEXT,
            "setReturnValue",
            "(Ljava/lang/Object;)V",
            vec![ctx, value],
        )?;
        self.invoke(CONTEXT, "setCancelled", "(Z)V", vec![ctx, Val::Int(1)])?;
        Ok(())
    }

    fn call_ret(&mut self, class: &str, name: &str, descriptor: &str, args: Vec<Val>) -> Result<Val, Trap> {
        self.invoke(class, name, descriptor, args)?
            .ok_or_else(|| Trap::Fault(format!("{}.{} returned nothing", class, name)))
    }

    /// Call a method, natives first
    pub fn invoke(&mut self, class: &str, name: &str, descriptor: &str, args: Vec<Val>) -> Outcome {
        let key = (class.to_owned(), name.to_owned(), descriptor.to_owned());
        if let Some(native) = self.natives.get(&key).cloned() {
            return native(self, &args);
        }
        let class_file = self
            .classes
            .get(class)
            .cloned()
            .ok_or_else(|| Trap::Fault(format!("unknown method {}.{}{}", class, name, descriptor)))?;
        let index = class_file
            .find_method(name, descriptor)
            .ok_or_else(|| Trap::Fault(format!("unknown method {}.{}{}", class, name, descriptor)))?;
        self.run(&class_file, index, args)
    }

    fn run(&mut self, class: &ClassFile, method_index: usize, args: Vec<Val>) -> Outcome {
        let method = &class.methods[method_index];
        let constants = &class.constants;
        let name = method.name(constants).unwrap();
        let descriptor_str = method.descriptor(constants).unwrap();
        let descriptor = MethodDescriptor::parse(&descriptor_str).unwrap();
        let code: Code = method
            .code(constants)
            .unwrap()
            .ok_or_else(|| Trap::Fault(format!("{} has no code", name)))?;
        let this_class = BinaryName::from_string(class.this_class_name().unwrap()).unwrap();

        let decoded = decode_code(&code.code_array.0).map_err(|err| err.to_string())?;
        let index_of: HashMap<u32, usize> = decoded
            .iter()
            .enumerate()
            .map(|(index, (offset, _))| (*offset, index))
            .collect();

        let frames: HashMap<u32, VerifierFrame> = if class.version.uses_stack_map_frames() {
            let initial = VerifierFrame::initial(&this_class, &name, method.is_static(), &descriptor);
            match constants.decode_attribute::<StackMapTable>(&code.attributes).unwrap() {
                Some(table) => decode_stack_map_table(&initial, &table, constants)
                    .map_err(|err| err.to_string())?
                    .into_iter()
                    .collect(),
                None => HashMap::new(),
            }
        } else {
            HashMap::new()
        };
        for offset in frames.keys() {
            if !index_of.contains_key(offset) {
                return Err(Trap::Fault(format!("{}: frame at {} is mid-instruction", name, offset)));
            }
        }

        let mut locals: Vec<Option<Val>> = vec![None; code.max_locals as usize];
        let mut slot = 0;
        for arg in args {
            if slot + arg.width() > locals.len() {
                return Err(Trap::Fault(format!("{}: arguments overflow max_locals", name)));
            }
            locals[slot] = Some(arg);
            slot += arg.width();
        }

        let mut machine = Machine {
            name: &name,
            max_stack: code.max_stack as usize,
            stack: vec![],
            locals,
        };

        let mut pc = 0;
        let mut steps = 0;
        loop {
            steps += 1;
            if steps > STEP_LIMIT {
                return Err(Trap::Fault(format!("{}: step limit exceeded", name)));
            }
            let (offset, insn) = &decoded[pc];
            if let Some(frame) = frames.get(offset) {
                machine.check_frame(*offset, frame)?;
            }

            let result = self.step(&mut machine, constants, insn);
            let next = match result {
                Ok(Step::Next) => pc + 1,
                Ok(Step::Jump(target)) => index_of[&target],
                Ok(Step::Return(value)) => {
                    check_return(&name, &descriptor, value)?;
                    return Ok(value);
                }
                Err(Trap::Exception(exception)) => {
                    let handler = code.exception_table.iter().find(|handler| {
                        (handler.start_pc.0 as u32) <= *offset
                            && *offset < handler.end_pc.0 as u32
                            && self.catches(constants, handler.catch_type, exception)
                    });
                    match handler {
                        Some(handler) => {
                            machine.stack.clear();
                            machine.push(exception)?;
                            index_of[&(handler.handler_pc.0 as u32)]
                        }
                        None => return Err(Trap::Exception(exception)),
                    }
                }
                Err(fault) => return Err(fault),
            };
            pc = next;
            if pc >= decoded.len() {
                return Err(Trap::Fault(format!("{}: fell off the end of the code", name)));
            }
        }
    }

    fn catches(
        &self,
        constants: &ConstantsPool,
        catch_type: Option<ClassConstantIndex>,
        exception: Val,
    ) -> bool {
        match catch_type {
            None => true,
            Some(index) => {
                let name = constants.class_name(index).unwrap();
                matches!(self.object(exception), Ok(Object::Instance { class, .. }) if *class == name)
            }
        }
    }

    fn step(
        &mut self,
        m: &mut Machine,
        constants: &ConstantsPool,
        insn: &AnyInstruction<u32>,
    ) -> Result<Step, Trap> {
        let insn = match insn {
            AnyInstruction::Branch(branch) => return self.branch(m, branch),
            AnyInstruction::Regular(insn) => insn,
        };
        use Instruction as I;
        match insn {
            I::Nop => (),
            I::AConstNull => m.push(Val::Null)?,
            I::IConstM1 => m.push(Val::Int(-1))?,
            I::IConst0 => m.push(Val::Int(0))?,
            I::IConst1 => m.push(Val::Int(1))?,
            I::IConst2 => m.push(Val::Int(2))?,
            I::IConst3 => m.push(Val::Int(3))?,
            I::IConst4 => m.push(Val::Int(4))?,
            I::IConst5 => m.push(Val::Int(5))?,
            I::LConst0 => m.push(Val::Long(0))?,
            I::LConst1 => m.push(Val::Long(1))?,
            I::DConst0 => m.push(Val::Double(0.0))?,
            I::DConst1 => m.push(Val::Double(1.0))?,
            I::BiPush(b) => m.push(Val::Int(*b as i32))?,
            I::SiPush(s) => m.push(Val::Int(*s as i32))?,
            I::Ldc(index) | I::Ldc2(index) => {
                let value = match constants.get(*index).map_err(|err| err.to_string())? {
                    Constant::Integer(i) => Val::Int(*i),
                    Constant::Float(f) => Val::Float(*f),
                    Constant::Long(l) => Val::Long(*l),
                    Constant::Double(d) => Val::Double(*d),
                    Constant::String(utf8) => {
                        let string = constants.utf8(*utf8).unwrap();
                        self.string(&string)
                    }
                    other => return Err(Trap::Fault(format!("unsupported ldc of {:?}", other))),
                };
                m.push(value)?;
            }
            I::ILoad(n) => m.load(*n, "int")?,
            I::LLoad(n) => m.load(*n, "long")?,
            I::FLoad(n) => m.load(*n, "float")?,
            I::DLoad(n) => m.load(*n, "double")?,
            I::ALoad(n) => m.load(*n, "reference")?,
            I::IStore(n) | I::LStore(n) | I::FStore(n) | I::DStore(n) | I::AStore(n) => {
                let value = m.pop()?;
                m.store(*n, value)?;
            }
            I::IInc(n, delta) => match m.local(*n)? {
                Val::Int(i) => m.store(*n, Val::Int(i.wrapping_add(*delta as i32)))?,
                other => return Err(Trap::Fault(format!("iinc on {:?}", other))),
            },
            I::Pop => {
                m.pop()?;
            }
            I::Pop2 => {
                if m.pop()?.width() == 1 {
                    m.pop()?;
                }
            }
            I::Dup => {
                let value = m.pop()?;
                m.push(value)?;
                m.push(value)?;
            }
            I::DupX1 => {
                let a = m.pop()?;
                let b = m.pop()?;
                m.push(a)?;
                m.push(b)?;
                m.push(a)?;
            }
            I::Swap => {
                let a = m.pop()?;
                let b = m.pop()?;
                m.push(a)?;
                m.push(b)?;
            }
            I::IAdd | I::ISub | I::IMul | I::IDiv | I::IRem | I::IAnd | I::IOr | I::IXor => {
                let b = m.pop_int()?;
                let a = m.pop_int()?;
                let result = match insn {
                    I::IAdd => a.wrapping_add(b),
                    I::ISub => a.wrapping_sub(b),
                    I::IMul => a.wrapping_mul(b),
                    I::IDiv | I::IRem if b == 0 => {
                        let exception = self.alloc(Object::Instance {
                            class: String::from("java/lang/ArithmeticException"),
                            fields: HashMap::new(),
                        });
                        return Err(Trap::Exception(exception));
                    }
                    I::IDiv => a.wrapping_div(b),
                    I::IRem => a.wrapping_rem(b),
                    I::IAnd => a & b,
                    I::IOr => a | b,
                    _ => a ^ b,
                };
                m.push(Val::Int(result))?;
            }
            I::INeg => {
                let a = m.pop_int()?;
                m.push(Val::Int(a.wrapping_neg()))?;
            }
            I::LAdd | I::LSub | I::LMul => {
                let b = m.pop_long()?;
                let a = m.pop_long()?;
                m.push(Val::Long(match insn {
                    I::LAdd => a.wrapping_add(b),
                    I::LSub => a.wrapping_sub(b),
                    _ => a.wrapping_mul(b),
                }))?;
            }
            I::I2L => {
                let a = m.pop_int()?;
                m.push(Val::Long(a as i64))?;
            }
            I::L2I => {
                let a = m.pop_long()?;
                m.push(Val::Int(a as i32))?;
            }
            I::LCmp => {
                let b = m.pop_long()?;
                let a = m.pop_long()?;
                m.push(Val::Int(a.cmp(&b) as i32))?;
            }
            I::GetStatic(index) => {
                let member = constants.member_ref(*index).unwrap();
                let value = self
                    .statics
                    .get(&(member.class, member.name))
                    .copied()
                    .unwrap_or_else(|| default_value(&member.descriptor));
                m.push(value)?;
            }
            I::PutStatic(index) => {
                let member = constants.member_ref(*index).unwrap();
                let value = m.pop()?;
                self.statics.insert((member.class, member.name), value);
            }
            I::GetField(index) => {
                let member = constants.member_ref(*index).unwrap();
                let object = m.pop()?;
                let value = self
                    .field(object, &member.name)
                    .unwrap_or_else(|| default_value(&member.descriptor));
                m.push(value)?;
            }
            I::PutField(index) => {
                let member = constants.member_ref(*index).unwrap();
                let value = m.pop()?;
                let object = m.pop()?;
                self.set_field(object, &member.name, value)?;
            }
            I::Invoke(kind, index) => {
                let member = constants.member_ref(*index).unwrap();
                let descriptor: MethodDescriptor<BinaryName> = MethodDescriptor::parse(&member.descriptor).unwrap();
                let mut count = descriptor.parameters.len();
                if *kind != InvokeType::Static {
                    count += 1;
                }
                let mut args = vec![];
                for _ in 0..count {
                    args.push(m.pop()?);
                }
                args.reverse();
                if *kind != InvokeType::Static && args[0] == Val::Null {
                    return Err(Trap::Fault(format!("{}: call on null", member.name)));
                }
                let result = self.invoke(&member.class, &member.name, &member.descriptor, args)?;
                match (result, &descriptor.return_type) {
                    (Some(value), Some(_)) => m.push(value)?,
                    (None, None) => (),
                    (result, _) => {
                        return Err(Trap::Fault(format!(
                            "{} returned {:?} for {}",
                            member.name, result, member.descriptor
                        )))
                    }
                }
            }
            I::New(index) => {
                let class = constants.class_name(*index).unwrap();
                let object = self.alloc(Object::Instance {
                    class,
                    fields: HashMap::new(),
                });
                m.push(object)?;
            }
            I::ANewArray(_) => {
                let length = m.pop_int()?;
                if length < 0 {
                    return Err(Trap::Fault(String::from("negative array size")));
                }
                let array = self.alloc(Object::Array(vec![Val::Null; length as usize]));
                m.push(array)?;
            }
            I::AAStore => {
                let value = m.pop()?;
                let index = m.pop_int()?;
                let array = m.pop()?;
                match array {
                    Val::Ref(array) => match &mut self.heap[array] {
                        Object::Array(items) if (index as usize) < items.len() => {
                            items[index as usize] = value
                        }
                        other => return Err(Trap::Fault(format!("aastore into {:?}", other))),
                    },
                    other => return Err(Trap::Fault(format!("aastore into {:?}", other))),
                }
            }
            I::AALoad => {
                let index = m.pop_int()?;
                let array = m.pop()?;
                let value = match self.object(array)? {
                    Object::Array(items) if index >= 0 && (index as usize) < items.len() => {
                        items[index as usize]
                    }
                    other => return Err(Trap::Fault(format!("aaload from {:?}", other))),
                };
                m.push(value)?;
            }
            I::ArrayLength => {
                let array = m.pop()?;
                let length = match self.object(array)? {
                    Object::Array(items) => items.len() as i32,
                    other => return Err(Trap::Fault(format!("arraylength of {:?}", other))),
                };
                m.push(Val::Int(length))?;
            }
            I::CheckCast(index) => {
                let class = constants.class_name(*index).unwrap();
                let value = m.pop()?;
                if !self.is_instance(value, &class) {
                    return Err(Trap::Fault(format!(
                        "cannot cast {} to {}",
                        self.describe(value),
                        class
                    )));
                }
                m.push(value)?;
            }
            other => return Err(Trap::Fault(format!("unsupported instruction {:?}", other))),
        }
        Ok(Step::Next)
    }

    fn branch(&mut self, m: &mut Machine, branch: &BranchInstruction<u32>) -> Result<Step, Trap> {
        use BranchInstruction as B;
        Ok(match branch {
            B::If(cmp, target) => {
                let a = m.pop_int()?;
                if compare(*cmp, a, 0) {
                    Step::Jump(*target)
                } else {
                    Step::Next
                }
            }
            B::IfICmp(cmp, target) => {
                let b = m.pop_int()?;
                let a = m.pop_int()?;
                if compare(*cmp, a, b) {
                    Step::Jump(*target)
                } else {
                    Step::Next
                }
            }
            B::IfACmp(cmp, target) => {
                let b = m.pop()?;
                let a = m.pop()?;
                if (a == b) == (*cmp == EqComparison::EQ) {
                    Step::Jump(*target)
                } else {
                    Step::Next
                }
            }
            B::IfNull(cmp, target) => {
                let a = m.pop()?;
                if (a == Val::Null) == (*cmp == EqComparison::EQ) {
                    Step::Jump(*target)
                } else {
                    Step::Next
                }
            }
            B::Goto(target) | B::GotoW(target) => Step::Jump(*target),
            B::TableSwitch {
                default,
                low,
                targets,
                ..
            } => {
                let key = m.pop_int()?;
                let index = key.wrapping_sub(*low);
                match targets.get(index as usize) {
                    Some(target) if index >= 0 => Step::Jump(*target),
                    _ => Step::Jump(*default),
                }
            }
            B::LookupSwitch {
                default, targets, ..
            } => {
                let key = m.pop_int()?;
                match targets.iter().find(|(value, _)| *value == key) {
                    Some((_, target)) => Step::Jump(*target),
                    None => Step::Jump(*default),
                }
            }
            B::IReturn | B::LReturn | B::FReturn | B::DReturn | B::AReturn => {
                Step::Return(Some(m.pop()?))
            }
            B::Return => Step::Return(None),
            B::AThrow => {
                let exception = m.pop()?;
                return Err(Trap::Exception(exception));
            }
        })
    }

    fn is_instance(&self, value: Val, class: &str) -> bool {
        if value == Val::Null || class == "java/lang/Object" {
            return true;
        }
        match self.object(value) {
            Ok(Object::Instance { class: actual, .. }) => actual == class,
            Ok(Object::Boxed { class: actual, .. }) => actual == class,
            Ok(Object::Str(_)) => class == "java/lang/String",
            Ok(Object::Array(_)) => class.starts_with('['),
            Err(_) => false,
        }
    }
}

enum Step {
    Next,
    Jump(u32),
    Return(Option<Val>),
}

/// Operand stack and locals of one call
struct Machine<'a> {
    name: &'a str,
    max_stack: usize,
    stack: Vec<Val>,
    locals: Vec<Option<Val>>,
}

impl<'a> Machine<'a> {
    fn depth(&self) -> usize {
        self.stack.iter().map(Val::width).sum()
    }

    fn push(&mut self, value: Val) -> Result<(), Trap> {
        self.stack.push(value);
        if self.depth() > self.max_stack {
            return Err(Trap::Fault(format!(
                "{}: stack depth {} exceeds max_stack {}",
                self.name,
                self.depth(),
                self.max_stack
            )));
        }
        Ok(())
    }

    fn pop(&mut self) -> Result<Val, Trap> {
        self.stack
            .pop()
            .ok_or_else(|| Trap::Fault(format!("{}: stack underflow", self.name)))
    }

    fn pop_int(&mut self) -> Result<i32, Trap> {
        match self.pop()? {
            Val::Int(i) => Ok(i),
            other => Err(Trap::Fault(format!("{}: expected int, found {:?}", self.name, other))),
        }
    }

    fn pop_long(&mut self) -> Result<i64, Trap> {
        match self.pop()? {
            Val::Long(l) => Ok(l),
            other => Err(Trap::Fault(format!("{}: expected long, found {:?}", self.name, other))),
        }
    }

    fn local(&self, index: u16) -> Result<Val, Trap> {
        self.locals
            .get(index as usize)
            .copied()
            .flatten()
            .ok_or_else(|| Trap::Fault(format!("{}: local {} is unset or out of range", self.name, index)))
    }

    fn load(&mut self, index: u16, kind: &str) -> Result<(), Trap> {
        let value = self.local(index)?;
        let matches = match (kind, value) {
            ("int", Val::Int(_)) | ("long", Val::Long(_)) => true,
            ("float", Val::Float(_)) | ("double", Val::Double(_)) => true,
            ("reference", Val::Null | Val::Ref(_)) => true,
            _ => false,
        };
        if !matches {
            return Err(Trap::Fault(format!(
                "{}: local {} holds {:?}, not {}",
                self.name, index, value, kind
            )));
        }
        self.push(value)
    }

    fn store(&mut self, index: u16, value: Val) -> Result<(), Trap> {
        let index = index as usize;
        if index + value.width() > self.locals.len() {
            return Err(Trap::Fault(format!(
                "{}: store to local {} exceeds max_locals {}",
                self.name,
                index,
                self.locals.len()
            )));
        }
        self.locals[index] = Some(value);
        if value.width() == 2 {
            self.locals[index + 1] = None;
        }
        Ok(())
    }

    fn check_frame(&self, offset: u32, frame: &VerifierFrame) -> Result<(), Trap> {
        if frame.stack_depth() != self.depth() {
            return Err(Trap::Fault(format!(
                "{}: frame at {} has stack depth {}, actual depth is {}",
                self.name,
                offset,
                frame.stack_depth(),
                self.depth()
            )));
        }
        if frame.locals.len() > self.locals.len() {
            return Err(Trap::Fault(format!(
                "{}: frame at {} has more locals than max_locals",
                self.name, offset
            )));
        }
        for (slot, expected) in frame.locals.iter().enumerate() {
            let actual = self.locals[slot];
            let fits = match (expected, actual) {
                (VerificationType::Integer, Some(Val::Int(_))) => true,
                (VerificationType::Long, Some(Val::Long(_))) => true,
                (VerificationType::Float, Some(Val::Float(_))) => true,
                (VerificationType::Double, Some(Val::Double(_))) => true,
                (VerificationType::Null, Some(Val::Null)) => true,
                (VerificationType::Object(_), Some(Val::Null | Val::Ref(_))) => true,
                (VerificationType::Uninitialized(_), Some(Val::Ref(_))) => true,
                (VerificationType::UninitializedThis, Some(Val::Ref(_))) => true,
                (VerificationType::Top, _) => true,
                _ => false,
            };
            if !fits {
                return Err(Trap::Fault(format!(
                    "{}: frame at {} expects {:?} in local {}, found {:?}",
                    self.name, offset, expected, slot, actual
                )));
            }
        }
        Ok(())
    }
}

fn compare(cmp: OrdComparison, a: i32, b: i32) -> bool {
    match cmp {
        OrdComparison::EQ => a == b,
        OrdComparison::NE => a != b,
        OrdComparison::LT => a < b,
        OrdComparison::GE => a >= b,
        OrdComparison::GT => a > b,
        OrdComparison::LE => a <= b,
    }
}

fn check_return(name: &str, descriptor: &MethodDescriptor<BinaryName>, value: Option<Val>) -> Result<(), Trap> {
    let fits = match (&descriptor.return_type, value) {
        (None, None) => true,
        (Some(FieldType::Base(BaseType::Long)), Some(Val::Long(_))) => true,
        (Some(FieldType::Base(BaseType::Double)), Some(Val::Double(_))) => true,
        (Some(FieldType::Base(BaseType::Float)), Some(Val::Float(_))) => true,
        (Some(FieldType::Base(_)), Some(Val::Int(_))) => true,
        (Some(FieldType::Ref(_)), Some(Val::Null | Val::Ref(_))) => true,
        _ => false,
    };
    if fits {
        Ok(())
    } else {
        Err(Trap::Fault(format!("{} returned {:?}", name, value)))
    }
}

fn default_value(descriptor: &str) -> Val {
    match descriptor {
        "J" => Val::Long(0),
        "F" => Val::Float(0.0),
        "D" => Val::Double(0.0),
        "Z" | "B" | "C" | "S" | "I" => Val::Int(0),
        _ => Val::Null,
    }
}

fn base_code(base: BaseType) -> char {
    match base {
        BaseType::Boolean => 'Z',
        BaseType::Byte => 'B',
        BaseType::Char => 'C',
        BaseType::Short => 'S',
        BaseType::Int => 'I',
        BaseType::Long => 'J',
        BaseType::Float => 'F',
        BaseType::Double => 'D',
    }
}

