//! Splicing handler calls into a method body
//!
//! The original code is decoded and replayed into a [`CodeBuffer`] with one label per original
//! instruction, so every jump, exception range, and debug table entry can be carried over onto
//! the new layout. Handler blocks are pushed straight into the buffer as the original
//! instructions stream past; they never go through the decoder, so nothing that gets inserted is
//! ever looked at again for return sites.
//!
//! Each handler block has this shape:
//!
//! ```text
//! new Context; dup
//! aload_0 | aconst_null                  // receiver
//! <n>; anewarray Object                  // arguments, boxed
//! dup; <i>; <load arg i>; <box>; aastore   (for every parameter)
//! invokespecial Context.<init>(Object, Object[])
//! dup; invokestatic Handler.method(Context)
//! dup; invokevirtual Context.isCancelled(); ifeq RESUME
//! <return the override value>
//! RESUME: pop
//! ```
//!
//! The context object only ever lives on the operand stack, so no locals are added.

use super::context::{CONSTRUCTOR_DESCRIPTOR, GET_RETURN_VALUE, IS_CANCELLED};
use super::{Error, InsertionSpec, Location, Settings};
use crate::jvm;
use crate::jvm::class_file::{
    AttributeLike, BytecodeArray, BytecodeIndex, ClassFile, Code, ConstantsPool,
    ExceptionHandler, LineNumberTable, LocalVariable, LocalVariableTable,
    LocalVariableTypeTable, StackMapTable,
};
use crate::jvm::code::{
    decode_code, AnyInstruction, BranchInstruction, CodeBuffer, DecodedInstruction, Instruction,
    InvokeType, Label, OrdComparison,
};
use crate::jvm::verifier::{
    decode_stack_map_table, encode_stack_map_table, VerificationType, VerifierFrame,
};
use crate::jvm::{
    BaseType, BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor, RefType,
    RenderDescriptor, UnqualifiedName,
};
use crate::util::Width;
use log::debug;
use std::cmp::max;
use std::collections::HashMap;
use std::convert::TryFrom;

/// Code-level attributes holding raw offsets we do not know how to remap
const DROPPED_ATTRIBUTES: [&str; 2] = [
    "RuntimeVisibleTypeAnnotations",
    "RuntimeInvisibleTypeAnnotations",
];

/// Rewrite one method of the class in place
///
/// `specs` must all target this method and are applied in order.
pub(crate) fn rewrite_method(
    class: &mut ClassFile,
    method_index: usize,
    specs: &[&InsertionSpec],
    settings: &Settings,
) -> Result<(), Error> {
    let this_class =
        BinaryName::from_string(class.this_class_name()?).map_err(Error::MalformedName)?;
    let method = &class.methods[method_index];
    let name = method.name(&class.constants)?;
    let descriptor = method.descriptor(&class.constants)?;
    let code_position = match method.code_attribute_position(&class.constants) {
        Some(position) => position,
        None => {
            return Err(Error::NoMethodBody {
                class: this_class.to_string(),
                method: name,
                descriptor,
            })
        }
    };
    let code = Code::from_attribute(&method.attributes[code_position])?;

    let shape = MethodShape {
        descriptor: MethodDescriptor::parse(&descriptor)?,
        is_static: method.is_static(),
        uses_frames: class.version.uses_stack_map_frames(),
        this_class,
        name,
    };
    debug!(
        "Rewriting {}.{}{} with {} insertion(s)",
        shape.this_class,
        shape.name,
        descriptor,
        specs.len()
    );

    let rewritten = splice_code(&shape, &code, specs, settings, &mut class.constants)?;
    let attribute = class.constants.get_attribute(&rewritten)?;
    class.methods[method_index].attributes[code_position] = attribute;
    Ok(())
}

/// What the splicer needs to know about the method being rewritten
struct MethodShape {
    this_class: BinaryName,
    name: String,
    descriptor: MethodDescriptor<BinaryName>,
    is_static: bool,

    /// Class file version requires a `StackMapTable`
    uses_frames: bool,
}

impl MethodShape {
    fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT.as_str()
    }

    /// Parameters, along with the first local slot of each one
    fn parameter_slots(&self) -> Vec<(u16, &FieldType<BinaryName>)> {
        let mut slot: u16 = if self.is_static { 0 } else { 1 };
        self.descriptor
            .parameters
            .iter()
            .map(|parameter| {
                let start = slot;
                slot += parameter.width() as u16;
                (start, parameter)
            })
            .collect()
    }

    /// Most stack slots a handler block uses on top of whatever was already on the stack
    ///
    /// With parameters, the peak is while storing one into the arguments array: two context
    /// references, the receiver, the array, its copy, the index, and the argument itself.
    /// Without, it is the four slots before the context constructor runs (which is also enough
    /// for unboxing a `long` or `double` override).
    fn block_peak(&self) -> usize {
        match self.descriptor.parameters.iter().map(Width::width).max() {
            None => 4,
            Some(widest) => 6 + widest,
        }
    }
}

#[derive(Copy, Clone)]
enum Receiver {
    This,
    Null,
}

/// How a handler block ends
enum Ending<'f> {
    /// Return the override if the handler cancelled, else resume (with a frame at the resume
    /// point if the class file uses frames)
    CancelCheck(Option<&'f VerifierFrame>),

    /// Resume unconditionally
    Resume,

    /// Unconditionally return the override
    Return,
}

struct Splicer<'a> {
    method: &'a MethodShape,
    settings: &'a Settings,
    constants: &'a mut ConstantsPool,
    code: CodeBuffer,

    /// Frames to write out, keyed by the label they are at
    frames: Vec<(Label, VerifierFrame)>,
}

fn splice_code(
    method: &MethodShape,
    code: &Code,
    specs: &[&InsertionSpec],
    settings: &Settings,
    constants: &mut ConstantsPool,
) -> Result<Code, Error> {
    let decoded = decode_code(&code.code_array.0)?;
    let code_len = code.code_array.0.len() as u32;

    let heads = located_at(specs, Location::Head);
    let returns = located_at(specs, Location::Return);
    let tails = located_at(specs, Location::Tail);

    let initial = VerifierFrame::initial(
        &method.this_class,
        &method.name,
        method.is_static,
        &method.descriptor,
    );
    let original_frames = if method.uses_frames {
        match constants.decode_attribute::<StackMapTable>(&code.attributes)? {
            Some(table) => decode_stack_map_table(&initial, &table, constants)?,
            None => vec![],
        }
    } else {
        vec![]
    };
    let return_frames = if method.uses_frames && !returns.is_empty() {
        simulate_return_sites(
            &decoded,
            &initial,
            &original_frames,
            constants,
            &method.this_class,
        )?
    } else {
        HashMap::new()
    };

    let mut splicer = Splicer {
        method,
        settings,
        constants,
        code: CodeBuffer::new(),
        frames: vec![],
    };

    // Every original instruction gets a label, and so does the end of the code
    let labels: Vec<Label> = decoded.iter().map(|_| splicer.code.fresh_label()).collect();
    let end_label = splicer.code.fresh_label();
    let label_at = |offset: u32| -> Result<Label, Error> {
        if offset == code_len {
            return Ok(end_label);
        }
        decoded
            .binary_search_by_key(&offset, |(at, _)| *at)
            .map(|index| labels[index])
            .map_err(|_| {
                Error::from(jvm::Error::MalformedAttribute {
                    attribute: Code::NAME,
                    reason: format!("offset {} is not the start of an instruction", offset),
                })
            })
    };

    for (offset, frame) in &original_frames {
        splicer.frames.push((label_at(*offset)?, frame.clone()));
    }

    let peak = method.block_peak();
    let mut max_stack = code.max_stack as usize;

    // HEAD blocks go in front of the first label, so jumps back to the start skip them
    if !heads.is_empty() {
        max_stack = max(max_stack, peak);
        let receiver = if method.is_static || method.is_constructor() {
            Receiver::Null
        } else {
            Receiver::This
        };
        for spec in &heads {
            // Nothing may be returned before the super constructor call
            let ending = if method.is_constructor() {
                Ending::Resume
            } else if method.uses_frames {
                Ending::CancelCheck(Some(&initial))
            } else {
                Ending::CancelCheck(None)
            };
            splicer.emit_block(spec, receiver, None, ending)?;
        }
    }

    let mut has_returns = false;
    for (index, (offset, insn)) in decoded.iter().enumerate() {
        splicer.code.place_label(labels[index]);
        match insn {
            AnyInstruction::Regular(insn) => splicer.code.push_instruction(insn.clone()),
            AnyInstruction::Branch(branch) => {
                if branch.is_return() {
                    has_returns = true;
                    if !returns.is_empty() {
                        let site = return_frames.get(offset);
                        let depth = match site {
                            Some(frame) => frame.stack_depth(),
                            None => code.max_stack as usize,
                        };
                        max_stack = max(max_stack, depth + peak);

                        let receiver = match site {
                            _ if method.is_static => Receiver::Null,
                            Some(frame) if !matches!(frame.local(0), VerificationType::Object(_)) => {
                                Receiver::Null
                            }
                            _ => Receiver::This,
                        };
                        for spec in &returns {
                            splicer.emit_block(spec, receiver, site, Ending::CancelCheck(site))?;
                        }
                    }
                }
                let branch = branch.try_map_labels(|target| label_at(*target))?;
                splicer.code.push_branch_instruction(branch);
            }
        }
    }
    splicer.code.place_label(end_label);

    // TAIL blocks sit after the last instruction, which never falls through
    if !tails.is_empty() {
        if has_returns {
            debug!(
                "{}.{} returns explicitly, so its {} TAIL insertion(s) are not applied",
                method.this_class,
                method.name,
                tails.len()
            );
        } else {
            max_stack = max(max_stack, peak);
            let mut tail_frame = initial.clone();
            for local in &mut tail_frame.locals {
                if *local == VerificationType::UninitializedThis {
                    *local = VerificationType::Object(RefType::Object(method.this_class.clone()));
                }
            }
            let receiver = if method.is_static {
                Receiver::Null
            } else {
                Receiver::This
            };
            for spec in &tails {
                let start = splicer.code.fresh_label();
                splicer.code.place_label(start);
                if method.uses_frames {
                    splicer.frames.push((start, tail_frame.clone()));
                }
                splicer.emit_block(spec, receiver, None, Ending::Return)?;
            }
        }
    }

    if max_stack > u16::MAX as usize {
        return Err(Error::from(jvm::Error::MethodCodeMaxStackOverflow(max_stack)));
    }

    if settings.debug_dump {
        debug!(
            "Spliced body of {}.{}{}:",
            method.this_class,
            method.name,
            method.descriptor.render()
        );
        for item in splicer.code.items() {
            debug!("    {:?}", item);
        }
    }

    let Splicer {
        code: buffer,
        frames,
        constants,
        ..
    } = splicer;
    let assembled = buffer.assemble()?;
    let offsets = &assembled.label_offsets;
    let offset_of = |label: Label| -> Result<u32, Error> {
        offsets
            .get(&label)
            .copied()
            .ok_or_else(|| Error::from(jvm::Error::UnplacedLabel(label)))
    };
    let remap = |offset: u16| -> Result<BytecodeIndex, Error> {
        let relocated = offset_of(label_at(offset as u32)?)?;
        Ok(BytecodeIndex(relocated as u16))
    };

    let exception_table = code
        .exception_table
        .iter()
        .map(|handler| {
            Ok(ExceptionHandler {
                start_pc: remap(handler.start_pc.0)?,
                end_pc: remap(handler.end_pc.0)?,
                handler_pc: remap(handler.handler_pc.0)?,
                catch_type: handler.catch_type,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let mut attributes = Vec::with_capacity(code.attributes.len() + 1);
    for attribute in &code.attributes {
        let name = constants.utf8(attribute.name_index)?;
        if name == StackMapTable::NAME {
            continue;
        } else if name == LineNumberTable::NAME {
            let mut table = LineNumberTable::from_attribute(attribute)?;
            for line in &mut table.0 {
                line.start_pc = remap(line.start_pc.0)?;
            }
            attributes.push(constants.get_attribute(&table)?);
        } else if name == LocalVariableTable::NAME {
            let mut table = LocalVariableTable::from_attribute(attribute)?;
            remap_local_variables(&mut table.0, &remap)?;
            attributes.push(constants.get_attribute(&table)?);
        } else if name == LocalVariableTypeTable::NAME {
            let mut table = LocalVariableTypeTable::from_attribute(attribute)?;
            remap_local_variables(&mut table.0, &remap)?;
            attributes.push(constants.get_attribute(&table)?);
        } else if DROPPED_ATTRIBUTES.contains(&name.as_str()) {
            debug!("Dropping {} of {}.{}", name, method.this_class, method.name);
        } else {
            attributes.push(attribute.clone());
        }
    }

    if method.uses_frames {
        let mut placed = frames
            .into_iter()
            .map(|(label, frame)| Ok((offset_of(label)?, frame)))
            .collect::<Result<Vec<_>, Error>>()?;
        placed.sort_by_key(|(offset, _)| *offset);
        placed.dedup_by_key(|(offset, _)| *offset);

        if !placed.is_empty() {
            let relocate = |original: u32| {
                let label = label_at(original).ok()?;
                offsets
                    .get(&label)
                    .and_then(|offset| u16::try_from(*offset).ok())
            };
            let table = encode_stack_map_table(&initial, &placed, constants, relocate)?;
            attributes.push(constants.get_attribute(&table)?);
        }
    }

    Ok(Code {
        max_stack: max_stack as u16,
        max_locals: code.max_locals,
        code_array: BytecodeArray(assembled.code),
        exception_table,
        attributes,
    })
}

fn located_at<'s>(specs: &[&'s InsertionSpec], location: Location) -> Vec<&'s InsertionSpec> {
    specs
        .iter()
        .copied()
        .filter(|spec| spec.location == location)
        .collect()
}

/// Ranges are given as start and length, so both ends get remapped
fn remap_local_variables(
    variables: &mut [LocalVariable],
    remap: &impl Fn(u16) -> Result<BytecodeIndex, Error>,
) -> Result<(), Error> {
    for variable in variables {
        let end = variable.start_pc.0 as u32 + variable.length as u32;
        let end = u16::try_from(end).map_err(|_| jvm::Error::MalformedAttribute {
            attribute: LocalVariableTable::NAME,
            reason: format!("variable range ends past {}", u16::MAX),
        })?;
        let start = remap(variable.start_pc.0)?;
        let end = remap(end)?;
        variable.start_pc = start;
        variable.length = end.0 - start.0;
    }
    Ok(())
}

/// Frame right before every return instruction
///
/// Straight-line code is simulated from the closest preceding frame of the table (or the entry
/// frame). Code after an unconditional jump must start with a frame from the table.
fn simulate_return_sites(
    decoded: &[DecodedInstruction],
    initial: &VerifierFrame,
    table: &[(u32, VerifierFrame)],
    constants: &ConstantsPool,
    this_class: &BinaryName,
) -> Result<HashMap<u32, VerifierFrame>, Error> {
    let table: HashMap<u32, &VerifierFrame> =
        table.iter().map(|(offset, frame)| (*offset, frame)).collect();
    let mut sites = HashMap::new();
    let mut current = Some(initial.clone());

    for (offset, insn) in decoded {
        if let Some(frame) = table.get(offset) {
            current = Some((*frame).clone());
        }
        let frame = current.as_mut().ok_or(jvm::Error::VerifierError {
            offset: *offset,
            kind: jvm::VerifierErrorKind::MissingFrame,
        })?;
        match insn {
            AnyInstruction::Regular(insn) => frame.execute(insn, *offset, constants, this_class)?,
            AnyInstruction::Branch(branch) => {
                if branch.is_return() {
                    sites.insert(*offset, frame.clone());
                }
                frame.execute_branch(branch, *offset)?;
                if !branch.falls_through() {
                    current = None;
                }
            }
        }
    }

    Ok(sites)
}

impl<'a> Splicer<'a> {
    /// Emit the code calling one handler
    ///
    /// `site` is the frame at the insertion point, if known. Arguments whose slot no longer holds
    /// a value of the declared type are passed as `null`.
    fn emit_block(
        &mut self,
        spec: &InsertionSpec,
        receiver: Receiver,
        site: Option<&VerifierFrame>,
        ending: Ending,
    ) -> Result<(), Error> {
        let method = self.method;
        let settings = self.settings;
        let context_class = self.constants.get_class(&settings.context_class)?;
        let context_init = self.constants.get_method_ref(
            &settings.context_class,
            &UnqualifiedName::INIT,
            CONSTRUCTOR_DESCRIPTOR,
            false,
        )?;
        let object_class = self.constants.get_class(&BinaryName::OBJECT)?;
        let handler = self.constants.get_method_ref(
            &spec.handler_class,
            &spec.handler_method,
            settings.handler_descriptor(),
            false,
        )?;

        self.code.push_instruction(Instruction::New(context_class));
        self.code.push_instruction(Instruction::Dup);
        self.code.push_instruction(match receiver {
            Receiver::This => Instruction::ALoad(0),
            Receiver::Null => Instruction::AConstNull,
        });

        let parameters = method.parameter_slots();
        self.push_int(parameters.len() as i32)?;
        self.code.push_instruction(Instruction::ANewArray(object_class));
        for (index, (slot, parameter)) in parameters.into_iter().enumerate() {
            self.code.push_instruction(Instruction::Dup);
            self.push_int(index as i32)?;
            if site.map_or(true, |frame| frame.local(slot).fits(parameter)) {
                self.load_boxed(slot, parameter)?;
            } else {
                self.code.push_instruction(Instruction::AConstNull);
            }
            self.code.push_instruction(Instruction::AAStore);
        }
        self.code
            .push_instruction(Instruction::Invoke(InvokeType::Special, context_init));

        self.code.push_instruction(Instruction::Dup);
        self.code
            .push_instruction(Instruction::Invoke(InvokeType::Static, handler));

        match ending {
            Ending::Resume => self.code.push_instruction(Instruction::Pop),
            Ending::Return => self.return_override()?,
            Ending::CancelCheck(frame) => {
                let is_cancelled = self.constants.get_method_ref(
                    &settings.context_class,
                    IS_CANCELLED.0,
                    IS_CANCELLED.1,
                    false,
                )?;
                let resume = self.code.fresh_label();
                self.code.push_instruction(Instruction::Dup);
                self.code
                    .push_instruction(Instruction::Invoke(InvokeType::Virtual, is_cancelled));
                self.code
                    .push_branch_instruction(BranchInstruction::If(OrdComparison::EQ, resume));
                self.return_override()?;

                self.code.place_label(resume);
                if let Some(frame) = frame {
                    let mut frame = frame.clone();
                    frame.stack.push(VerificationType::Object(RefType::Object(
                        settings.context_class.clone(),
                    )));
                    self.frames.push((resume, frame));
                }
                self.code.push_instruction(Instruction::Pop);
            }
        }
        Ok(())
    }

    /// With the context on top of the stack, return its override value from the method
    fn return_override(&mut self) -> Result<(), Error> {
        let method = self.method;
        match &method.descriptor.return_type {
            None => {
                self.code.push_instruction(Instruction::Pop);
                self.code.push_branch_instruction(BranchInstruction::Return);
            }
            Some(return_type) => {
                let get_return_value = self.constants.get_method_ref(
                    &self.settings.context_class,
                    GET_RETURN_VALUE.0,
                    GET_RETURN_VALUE.1,
                    false,
                )?;
                self.code
                    .push_instruction(Instruction::Invoke(InvokeType::Virtual, get_return_value));
                self.unbox(return_type)?;
                self.code
                    .push_branch_instruction(return_instruction(return_type));
            }
        }
        Ok(())
    }

    /// Push the argument in `slot`, boxing primitives with their `valueOf`
    fn load_boxed(&mut self, slot: u16, parameter: &FieldType<BinaryName>) -> Result<(), Error> {
        let base = match parameter {
            FieldType::Ref(_) => {
                self.code.push_instruction(Instruction::ALoad(slot));
                return Ok(());
            }
            FieldType::Base(base) => *base,
        };

        self.code.push_instruction(match base {
            BaseType::Int | BaseType::Char | BaseType::Short | BaseType::Byte | BaseType::Boolean => {
                Instruction::ILoad(slot)
            }
            BaseType::Long => Instruction::LLoad(slot),
            BaseType::Float => Instruction::FLoad(slot),
            BaseType::Double => Instruction::DLoad(slot),
        });

        let boxed = base.boxed_class();
        let value_of = MethodDescriptor {
            parameters: vec![FieldType::Base(base)],
            return_type: Some(FieldType::object(boxed.clone())),
        };
        let value_of = self.constants.get_method_ref(
            &boxed,
            &UnqualifiedName::VALUEOF,
            value_of.render(),
            false,
        )?;
        self.code
            .push_instruction(Instruction::Invoke(InvokeType::Static, value_of));
        Ok(())
    }

    /// Turn the `Object` on top of the stack into a value of the given type
    fn unbox(&mut self, field_type: &FieldType<BinaryName>) -> Result<(), Error> {
        match field_type {
            FieldType::Base(base) => {
                let boxed = base.boxed_class();
                let boxed_class = self.constants.get_class(&boxed)?;
                let unboxed = MethodDescriptor::<BinaryName> {
                    parameters: vec![],
                    return_type: Some(FieldType::Base(*base)),
                };
                let unbox = self.constants.get_method_ref(
                    &boxed,
                    unbox_method(*base),
                    unboxed.render(),
                    false,
                )?;
                self.code.push_instruction(Instruction::CheckCast(boxed_class));
                self.code
                    .push_instruction(Instruction::Invoke(InvokeType::Virtual, unbox));
            }
            FieldType::Ref(RefType::Object(class)) if *class == BinaryName::OBJECT => (),
            FieldType::Ref(ref_type) => {
                let class = self.constants.get_class_for_type(ref_type)?;
                self.code.push_instruction(Instruction::CheckCast(class));
            }
        }
        Ok(())
    }

    /// Push an `int` constant using the shortest encoding
    fn push_int(&mut self, value: i32) -> Result<(), Error> {
        let insn = match value {
            -1 => Instruction::IConstM1,
            0 => Instruction::IConst0,
            1 => Instruction::IConst1,
            2 => Instruction::IConst2,
            3 => Instruction::IConst3,
            4 => Instruction::IConst4,
            5 => Instruction::IConst5,
            _ => {
                if let Ok(byte) = i8::try_from(value) {
                    Instruction::BiPush(byte)
                } else if let Ok(short) = i16::try_from(value) {
                    Instruction::SiPush(short)
                } else {
                    Instruction::Ldc(self.constants.get_integer(value)?)
                }
            }
        };
        self.code.push_instruction(insn);
        Ok(())
    }
}

fn unbox_method(base: BaseType) -> UnqualifiedName {
    match base {
        BaseType::Boolean => UnqualifiedName::BOOLEANVALUE,
        BaseType::Byte => UnqualifiedName::BYTEVALUE,
        BaseType::Char => UnqualifiedName::CHARVALUE,
        BaseType::Double => UnqualifiedName::DOUBLEVALUE,
        BaseType::Float => UnqualifiedName::FLOATVALUE,
        BaseType::Int => UnqualifiedName::INTVALUE,
        BaseType::Long => UnqualifiedName::LONGVALUE,
        BaseType::Short => UnqualifiedName::SHORTVALUE,
    }
}

fn return_instruction(return_type: &FieldType<BinaryName>) -> BranchInstruction<Label> {
    match return_type {
        FieldType::Base(BaseType::Long) => BranchInstruction::LReturn,
        FieldType::Base(BaseType::Float) => BranchInstruction::FReturn,
        FieldType::Base(BaseType::Double) => BranchInstruction::DReturn,
        FieldType::Base(_) => BranchInstruction::IReturn,
        FieldType::Ref(_) => BranchInstruction::AReturn,
    }
}
