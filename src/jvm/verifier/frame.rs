use super::*;
use crate::jvm::class_file::{
    ClassConstantIndex, Constant, ConstantIndex, ConstantsPool, FieldRefConstantIndex,
    SerializableVerificationType, StackMapFrame, StackMapTable,
};
use crate::jvm::code::{BranchInstruction, Instruction, InvokeType};
use crate::jvm::{
    BinaryName, Error, FieldType, MethodDescriptor, Name, ParseDescriptor, RefType,
    UnqualifiedName, VerifierErrorKind,
};
use crate::util::{OffsetVec, Width};
use std::convert::TryFrom;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Locals are stored one entry per slot, so the slot following a `long` or `double` holds `Top`.
/// This differs from the stack map table encoding (where wide locals take a single entry), but it
/// makes stores to arbitrary slots straightforward.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    /// Local variables, by slot
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

/// Frame tracked while simulating a method body
pub type VerifierFrame = Frame<RefType<BinaryName>, u32>;

impl<Cls: Clone, U: Clone> Frame<Cls, U> {
    /// Build a frame from locals in their stack map table encoding
    pub fn from_encoded(
        locals: &[VerificationType<Cls, U>],
        stack: impl IntoIterator<Item = VerificationType<Cls, U>>,
    ) -> Self {
        let mut slots = Vec::with_capacity(locals.len());
        for local in locals {
            slots.push(local.clone());
            if local.width() == 2 {
                slots.push(VerificationType::Top);
            }
        }
        Frame {
            locals: slots,
            stack: stack.into_iter().collect(),
        }
    }

    /// Locals in their stack map table encoding, without any trailing `Top`
    pub fn encoded_locals(&self) -> Vec<VerificationType<Cls, U>> {
        let mut encoded = vec![];
        let mut slot = 0;
        while let Some(local) = self.locals.get(slot) {
            encoded.push(local.clone());
            slot += local.width();
        }
        while let Some(VerificationType::Top) = encoded.last() {
            encoded.pop();
        }
        encoded
    }

    /// Type in a local variable slot (slots past the end are unusable)
    pub fn local(&self, index: u16) -> VerificationType<Cls, U> {
        self.locals
            .get(index as usize)
            .cloned()
            .unwrap_or(VerificationType::Top)
    }

    /// Number of stack slots in use
    pub fn stack_depth(&self) -> usize {
        self.stack.offset_len().0
    }
}

impl VerifierFrame {
    /// Frame on entry to a method
    ///
    /// In a constructor, `this` starts out uninitialized (except in `java/lang/Object` itself,
    /// whose constructor has no super constructor to call).
    pub fn initial(
        this_class: &BinaryName,
        method_name: &str,
        is_static: bool,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> VerifierFrame {
        let mut locals = vec![];
        if !is_static {
            if method_name == UnqualifiedName::INIT.as_str() && *this_class != BinaryName::OBJECT {
                locals.push(VerificationType::UninitializedThis);
            } else {
                locals.push(VerificationType::Object(RefType::Object(this_class.clone())));
            }
        }
        for parameter in &descriptor.parameters {
            let local = VerifierType::from(parameter.clone());
            let is_wide = local.width() == 2;
            locals.push(local);
            if is_wide {
                locals.push(VerificationType::Top);
            }
        }
        Frame {
            locals,
            stack: OffsetVec::new(),
        }
    }

    /// Update the frame to reflect the effects of the given (non-branching) instruction
    ///
    /// `offset` is the position of the instruction in the method body and `this_class` the class
    /// declaring the method (both are needed to track object initialization).
    pub fn execute(
        &mut self,
        insn: &Instruction,
        offset: u32,
        constants: &ConstantsPool,
        this_class: &BinaryName,
    ) -> Result<(), Error> {
        execute_instruction(self, insn, offset, constants, this_class)
            .map_err(|kind| Error::VerifierError { offset, kind })
    }

    /// Update the frame to reflect the operands consumed by the given branching instruction
    pub fn execute_branch<Lbl>(
        &mut self,
        insn: &BranchInstruction<Lbl>,
        offset: u32,
    ) -> Result<(), Error> {
        execute_branch_instruction(self, insn).map_err(|kind| Error::VerifierError { offset, kind })
    }
}

/// Expand a `StackMapTable` into absolute frames, keyed by bytecode offset
///
/// `initial` is the implicit frame on method entry (see [`VerifierFrame::initial`]), which is what
/// the first entry of the table is relative to.
pub fn decode_stack_map_table(
    initial: &VerifierFrame,
    table: &StackMapTable,
    constants: &ConstantsPool,
) -> Result<Vec<(u32, VerifierFrame)>, Error> {
    let resolve_all = |types: &[SerializableVerificationType]| {
        types
            .iter()
            .map(|vtype| VerifierType::resolve(vtype, constants))
            .collect::<Result<Vec<_>, Error>>()
    };

    let mut frames = Vec::with_capacity(table.0.len());
    let mut locals = initial.encoded_locals();
    let mut previous_offset: Option<u32> = None;

    for entry in &table.0 {
        let offset_delta = entry.offset_delta() as u32;
        let offset = match previous_offset {
            None => offset_delta,
            Some(previous) => previous + offset_delta + 1,
        };

        let stack = match entry {
            StackMapFrame::SameLocalsNoStack { .. } => vec![],
            StackMapFrame::SameLocalsOneStack { stack, .. } => {
                vec![VerifierType::resolve(stack, constants)?]
            }
            StackMapFrame::ChopLocalsNoStack { chopped_k, .. } => {
                let chopped_k = *chopped_k as usize;
                if chopped_k > locals.len() {
                    return Err(Error::MalformedAttribute {
                        attribute: "StackMapTable",
                        reason: format!(
                            "frame at {} chops {} locals but only {} are defined",
                            offset,
                            chopped_k,
                            locals.len()
                        ),
                    });
                }
                locals.truncate(locals.len() - chopped_k);
                vec![]
            }
            StackMapFrame::AppendLocalsNoStack {
                locals: appended, ..
            } => {
                locals.extend(resolve_all(appended)?);
                vec![]
            }
            StackMapFrame::Full {
                locals: full_locals,
                stack,
                ..
            } => {
                locals = resolve_all(full_locals)?;
                resolve_all(stack)?
            }
        };

        frames.push((offset, Frame::from_encoded(&locals, stack)));
        previous_offset = Some(offset);
    }

    Ok(frames)
}

/// Compress absolute frames back into a `StackMapTable`
///
/// Frames must be sorted by strictly increasing offset. Class constants are added to the pool as
/// needed and `relocate` maps the offset of every `new` instruction mentioned by an uninitialized
/// type to its final position.
pub fn encode_stack_map_table(
    initial: &VerifierFrame,
    frames: &[(u32, VerifierFrame)],
    constants: &mut ConstantsPool,
    relocate: impl Fn(u32) -> Option<u16>,
) -> Result<StackMapTable, Error> {
    let mut entries = Vec::with_capacity(frames.len());
    let mut previous_locals = initial.encoded_locals();
    let mut previous_offset: Option<u32> = None;

    for (offset, frame) in frames {
        let offset_delta = match previous_offset {
            None => Some(*offset),
            Some(previous) => offset.checked_sub(previous + 1),
        };
        let offset_delta = offset_delta
            .and_then(|delta| u16::try_from(delta).ok())
            .ok_or_else(|| Error::MalformedAttribute {
                attribute: "StackMapTable",
                reason: format!("frame at {} is out of order", offset),
            })?;

        let locals = frame.encoded_locals();
        entries.push(stack_map_frame(
            offset_delta,
            &locals,
            &frame.stack,
            &previous_locals,
            constants,
            &relocate,
        )?);
        previous_locals = locals;
        previous_offset = Some(*offset);
    }

    Ok(StackMapTable(entries))
}

/// Compute a stack map frame for this frame, given the locals of the previous frame
///
/// This will fall back to the `Full` option only if none of the other stack map frame variants
/// are enough to encode the transition.
fn stack_map_frame(
    offset_delta: u16,
    locals: &[VerifierType],
    stack: &OffsetVec<VerifierType>,
    previous_locals: &[VerifierType],
    constants: &mut ConstantsPool,
    relocate: &impl Fn(u32) -> Option<u16>,
) -> Result<StackMapFrame, Error> {
    match stack.len() {
        0 => {
            if locals.len() <= previous_locals.len() {
                let len_difference = previous_locals.len() - locals.len();
                if len_difference < 4 && previous_locals.starts_with(locals) {
                    if len_difference == 0 {
                        return Ok(StackMapFrame::SameLocalsNoStack { offset_delta });
                    } else {
                        return Ok(StackMapFrame::ChopLocalsNoStack {
                            offset_delta,
                            chopped_k: len_difference as u8,
                        });
                    }
                }
            } else if locals.len() - previous_locals.len() < 4
                && locals.starts_with(previous_locals)
            {
                return Ok(StackMapFrame::AppendLocalsNoStack {
                    offset_delta,
                    locals: serialize_all(&locals[previous_locals.len()..], constants, relocate)?,
                });
            }
        }
        1 if locals == previous_locals => {
            if let Some(top) = stack.last() {
                return Ok(StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: top.into_serializable(constants, relocate)?,
                });
            }
        }
        _ => (),
    }

    let stack: Vec<VerifierType> = stack.values().cloned().collect();
    Ok(StackMapFrame::Full {
        offset_delta,
        locals: serialize_all(locals, constants, relocate)?,
        stack: serialize_all(&stack, constants, relocate)?,
    })
}

fn serialize_all(
    types: &[VerifierType],
    constants: &mut ConstantsPool,
    relocate: &impl Fn(u32) -> Option<u16>,
) -> Result<Vec<SerializableVerificationType>, Error> {
    types
        .iter()
        .map(|vtype| vtype.into_serializable(constants, relocate))
        .collect()
}

fn execute_instruction(
    frame: &mut VerifierFrame,
    insn: &Instruction,
    offset: u32,
    constants: &ConstantsPool,
    this_class: &BinaryName,
) -> Result<(), VerifierErrorKind> {
    use Instruction::*;
    use VerificationType::*;

    let Frame {
        ref mut stack,
        ref mut locals,
    } = frame;

    match insn {
        Nop => (),
        AConstNull => {
            stack.push(Null);
        }
        IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 => {
            stack.push(Integer);
        }
        LConst0 | LConst1 => {
            stack.push(Long);
        }
        FConst0 | FConst1 | FConst2 => {
            stack.push(Float);
        }
        DConst0 | DConst1 => {
            stack.push(Double);
        }
        BiPush(_) | SiPush(_) => {
            stack.push(Integer);
        }
        Ldc(index) => {
            let loaded = loadable_constant(constants, *index)?;
            if loaded.width() != 1 {
                return Err(VerifierErrorKind::InvalidWidth(loaded.width()));
            }
            stack.push(loaded);
        }
        Ldc2(index) => {
            let loaded = loadable_constant(constants, *index)?;
            if loaded.width() != 2 {
                return Err(VerifierErrorKind::InvalidWidth(loaded.width()));
            }
            stack.push(loaded);
        }

        ILoad(index) => {
            get_local_expecting_type(locals, *index, Integer)?;
            stack.push(Integer);
        }
        LLoad(index) => {
            get_local_expecting_type(locals, *index, Long)?;
            stack.push(Long);
        }
        FLoad(index) => {
            get_local_expecting_type(locals, *index, Float)?;
            stack.push(Float);
        }
        DLoad(index) => {
            get_local_expecting_type(locals, *index, Double)?;
            stack.push(Double);
        }
        ALoad(index) => {
            let typ = get_local(locals, *index)?;
            if !typ.is_reference() {
                return Err(VerifierErrorKind::InvalidType);
            }
            stack.push(typ);
        }

        IALoad | BALoad | CALoad | SALoad => {
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
            stack.push(Integer);
        }
        LALoad => {
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
            stack.push(Long);
        }
        FALoad => {
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
            stack.push(Float);
        }
        DALoad => {
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
            stack.push(Double);
        }
        AALoad => {
            pop_expecting_type(stack, Integer)?;
            match pop_array(stack)? {
                None => {
                    stack.push(Null);
                }
                Some(array_type) => match array_type.array_element() {
                    Some(FieldType::Ref(element_type)) => {
                        stack.push(Object(element_type));
                    }
                    _ => return Err(VerifierErrorKind::NotArrayType),
                },
            }
        }

        IStore(index) => {
            pop_expecting_type(stack, Integer)?;
            set_local(locals, *index, Integer);
        }
        LStore(index) => {
            pop_expecting_type(stack, Long)?;
            set_local(locals, *index, Long);
        }
        FStore(index) => {
            pop_expecting_type(stack, Float)?;
            set_local(locals, *index, Float);
        }
        DStore(index) => {
            pop_expecting_type(stack, Double)?;
            set_local(locals, *index, Double);
        }
        AStore(index) => {
            // Also covers return addresses, which cannot occur since `jsr` is rejected earlier
            let popped_type = pop_reference(stack)?;
            set_local(locals, *index, popped_type);
        }

        IAStore | BAStore | CAStore | SAStore => {
            pop_expecting_type(stack, Integer)?;
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
        }
        LAStore => {
            pop_expecting_type(stack, Long)?;
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
        }
        FAStore => {
            pop_expecting_type(stack, Float)?;
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
        }
        DAStore => {
            pop_expecting_type(stack, Double)?;
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
        }
        AAStore => {
            pop_reference(stack)?;
            pop_expecting_type(stack, Integer)?;
            pop_array(stack)?;
        }

        Pop => {
            pop_expecting_width(stack, 1)?;
        }

        Pop2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    pop_expecting_width(stack, 1)?;
                }

                // Form 2
                2 => (),

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup => {
            let arg1 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }

        DupX1 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }

        DupX2 => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop(stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X1 => {
            let arg1 = pop(stack)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg3 = pop_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X2 => {
            let arg1 = pop(stack)?;
            match arg1.width() {
                1 => {
                    let arg2 = pop_expecting_width(stack, 1)?;
                    let arg3 = pop(stack)?;
                    match arg3.width() {
                        // Form 1
                        1 => {
                            let arg4 = pop_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg4);
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 3
                        2 => {
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(VerifierErrorKind::InvalidWidth(other)),
                    }
                }

                2 => {
                    let arg2 = pop(stack)?;
                    match arg2.width() {
                        // Form 2
                        1 => {
                            let arg3 = pop_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 4
                        2 => {
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(VerifierErrorKind::InvalidWidth(other)),
                    }
                }

                other => return Err(VerifierErrorKind::InvalidWidth(other)),
            }
        }

        Swap => {
            let arg1 = pop_expecting_width(stack, 1)?;
            let arg2 = pop_expecting_width(stack, 1)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        IAdd | ISub | IDiv | IMul | IRem | IAnd | IOr | IXor | ISh(_) => {
            pop_expecting_type(stack, Integer)?;
            pop_expecting_type(stack, Integer)?;
            stack.push(Integer);
        }

        LAdd | LSub | LDiv | LMul | LRem | LAnd | LOr | LXor => {
            pop_expecting_type(stack, Long)?;
            pop_expecting_type(stack, Long)?;
            stack.push(Long);
        }

        FAdd | FSub | FDiv | FMul | FRem => {
            pop_expecting_type(stack, Float)?;
            pop_expecting_type(stack, Float)?;
            stack.push(Float);
        }

        DAdd | DSub | DDiv | DMul | DRem => {
            pop_expecting_type(stack, Double)?;
            pop_expecting_type(stack, Double)?;
            stack.push(Double);
        }

        INeg | I2B | I2C | I2S => {
            pop_expecting_type(stack, Integer)?;
            stack.push(Integer);
        }

        LNeg => {
            pop_expecting_type(stack, Long)?;
            stack.push(Long);
        }

        FNeg => {
            pop_expecting_type(stack, Float)?;
            stack.push(Float);
        }

        DNeg => {
            pop_expecting_type(stack, Double)?;
            stack.push(Double);
        }

        LSh(_) => {
            pop_expecting_type(stack, Integer)?;
            pop_expecting_type(stack, Long)?;
            stack.push(Long);
        }

        IInc(index, _) => {
            get_local_expecting_type(locals, *index, Integer)?;
        }

        I2L => {
            pop_expecting_type(stack, Integer)?;
            stack.push(Long);
        }
        I2F => {
            pop_expecting_type(stack, Integer)?;
            stack.push(Float);
        }
        I2D => {
            pop_expecting_type(stack, Integer)?;
            stack.push(Double);
        }

        L2I => {
            pop_expecting_type(stack, Long)?;
            stack.push(Integer);
        }
        L2F => {
            pop_expecting_type(stack, Long)?;
            stack.push(Float);
        }
        L2D => {
            pop_expecting_type(stack, Long)?;
            stack.push(Double);
        }

        F2I => {
            pop_expecting_type(stack, Float)?;
            stack.push(Integer);
        }
        F2L => {
            pop_expecting_type(stack, Float)?;
            stack.push(Long);
        }
        F2D => {
            pop_expecting_type(stack, Float)?;
            stack.push(Double);
        }

        D2I => {
            pop_expecting_type(stack, Double)?;
            stack.push(Integer);
        }
        D2L => {
            pop_expecting_type(stack, Double)?;
            stack.push(Long);
        }
        D2F => {
            pop_expecting_type(stack, Double)?;
            stack.push(Float);
        }

        LCmp => {
            pop_expecting_type(stack, Long)?;
            pop_expecting_type(stack, Long)?;
            stack.push(Integer);
        }
        FCmp(_) => {
            pop_expecting_type(stack, Float)?;
            pop_expecting_type(stack, Float)?;
            stack.push(Integer);
        }
        DCmp(_) => {
            pop_expecting_type(stack, Double)?;
            pop_expecting_type(stack, Double)?;
            stack.push(Integer);
        }

        GetStatic(field) => {
            let field_type = field_type(constants, *field)?;
            stack.push(field_type.into());
        }
        PutStatic(field) => {
            let field_type = field_type(constants, *field)?;
            pop_value(stack, &field_type)?;
        }
        GetField(field) => {
            let field_type = field_type(constants, *field)?;
            pop_reference(stack)?;
            stack.push(field_type.into());
        }
        PutField(field) => {
            let field_type = field_type(constants, *field)?;
            pop_value(stack, &field_type)?;
            pop_reference(stack)?;
        }

        Invoke(invoke_type, method) => {
            let unresolvable = || VerifierErrorKind::UnresolvableConstant((*method).into());
            let member = constants.member_ref(*method).map_err(|_| unresolvable())?;
            let descriptor = MethodDescriptor::<BinaryName>::parse(&member.descriptor)
                .map_err(|_| unresolvable())?;

            for parameter in descriptor.parameters.iter().rev() {
                pop_value(stack, parameter)?;
            }

            if *invoke_type == InvokeType::Special && member.name == UnqualifiedName::INIT.as_str()
            {
                // Initialize
                let receiver = pop(stack)?;
                let initialized = match receiver {
                    UninitializedThis => Object(RefType::Object(this_class.clone())),
                    Uninitialized(_) => Object(
                        RefType::from_class_constant(&member.class)
                            .map_err(|_| unresolvable())?,
                    ),
                    _ => return Err(VerifierErrorKind::InvalidType),
                };
                replace_all(stack, locals, &receiver, &initialized);
            } else {
                if *invoke_type != InvokeType::Static {
                    pop_reference(stack)?;
                }
                if let Some(return_type) = descriptor.return_type {
                    stack.push(return_type.into());
                }
            }
        }

        InvokeDynamic(call_site) => {
            let unresolvable = || VerifierErrorKind::UnresolvableConstant((*call_site).into());
            let (_, descriptor) = constants
                .dynamic_name_and_type(*call_site)
                .map_err(|_| unresolvable())?;
            let descriptor =
                MethodDescriptor::<BinaryName>::parse(&descriptor).map_err(|_| unresolvable())?;

            for parameter in descriptor.parameters.iter().rev() {
                pop_value(stack, parameter)?;
            }
            if let Some(return_type) = descriptor.return_type {
                stack.push(return_type.into());
            }
        }

        New(_) => {
            stack.push(Uninitialized(offset));
        }
        NewArray(base_type) => {
            pop_expecting_type(stack, Integer)?;
            stack.push(Object(RefType::array(FieldType::Base(*base_type))));
        }
        ANewArray(class) => {
            pop_expecting_type(stack, Integer)?;
            let element_type = class_type(constants, *class)?;
            stack.push(Object(RefType::array(FieldType::Ref(element_type))));
        }
        MultiANewArray(class, dimensions) => {
            for _ in 0..*dimensions {
                pop_expecting_type(stack, Integer)?;
            }
            stack.push(Object(class_type(constants, *class)?));
        }
        ArrayLength => {
            pop_array(stack)?;
            stack.push(Integer);
        }

        CheckCast(class) => {
            pop_reference(stack)?;
            stack.push(Object(class_type(constants, *class)?));
        }
        InstanceOf(_) => {
            pop_reference(stack)?;
            stack.push(Integer);
        }

        MonitorEnter | MonitorExit => {
            pop_reference(stack)?;
        }
    }

    Ok(())
}

fn execute_branch_instruction<Lbl>(
    frame: &mut VerifierFrame,
    insn: &BranchInstruction<Lbl>,
) -> Result<(), VerifierErrorKind> {
    use BranchInstruction::*;

    let stack = &mut frame.stack;

    match insn {
        If(_, _) => pop_expecting_type(stack, VerificationType::Integer)?,
        IfICmp(_, _) => {
            pop_expecting_type(stack, VerificationType::Integer)?;
            pop_expecting_type(stack, VerificationType::Integer)?;
        }
        IfACmp(_, _) => {
            pop_reference(stack)?;
            pop_reference(stack)?;
        }
        IfNull(_, _) => {
            pop_reference(stack)?;
        }
        Goto(_) | GotoW(_) => (),
        TableSwitch { .. } | LookupSwitch { .. } => {
            pop_expecting_type(stack, VerificationType::Integer)?
        }
        IReturn => pop_expecting_type(stack, VerificationType::Integer)?,
        LReturn => pop_expecting_type(stack, VerificationType::Long)?,
        FReturn => pop_expecting_type(stack, VerificationType::Float)?,
        DReturn => pop_expecting_type(stack, VerificationType::Double)?,
        AReturn | AThrow => {
            pop_reference(stack)?;
        }
        Return => (),
    }

    Ok(())
}

/// Type pushed by `ldc`, `ldc_w`, or `ldc2_w`
fn loadable_constant(
    constants: &ConstantsPool,
    index: ConstantIndex,
) -> Result<VerifierType, VerifierErrorKind> {
    let unresolvable = || VerifierErrorKind::UnresolvableConstant(index);
    let object = |name: BinaryName| VerificationType::Object(RefType::Object(name));

    Ok(match constants.get(index).map_err(|_| unresolvable())? {
        Constant::Integer(_) => VerificationType::Integer,
        Constant::Float(_) => VerificationType::Float,
        Constant::Long(_) => VerificationType::Long,
        Constant::Double(_) => VerificationType::Double,
        Constant::String(_) => object(BinaryName::STRING),
        Constant::Class(_) => object(BinaryName::CLASS),
        Constant::MethodHandle { .. } => object(BinaryName::METHODHANDLE),
        Constant::MethodType { .. } => object(BinaryName::METHODTYPE),
        Constant::Dynamic { .. } => {
            let (_, descriptor) = constants
                .dynamic_name_and_type(index)
                .map_err(|_| unresolvable())?;
            FieldType::<BinaryName>::parse(&descriptor)
                .map_err(|_| unresolvable())?
                .into()
        }
        _ => return Err(VerifierErrorKind::NotLoadableConstant(index)),
    })
}

fn field_type(
    constants: &ConstantsPool,
    field: FieldRefConstantIndex,
) -> Result<FieldType<BinaryName>, VerifierErrorKind> {
    let unresolvable = || VerifierErrorKind::UnresolvableConstant(field.into());
    let member = constants.member_ref(field).map_err(|_| unresolvable())?;
    FieldType::parse(&member.descriptor).map_err(|_| unresolvable())
}

fn class_type(
    constants: &ConstantsPool,
    class: ClassConstantIndex,
) -> Result<RefType<BinaryName>, VerifierErrorKind> {
    constants
        .class_type(class)
        .map_err(|_| VerifierErrorKind::UnresolvableConstant(class.into()))
}

/// Swap every occurrence of an uninitialized type for its initialized counterpart
fn replace_all(
    stack: &mut OffsetVec<VerifierType>,
    locals: &mut [VerifierType],
    original: &VerifierType,
    updated: &VerifierType,
) {
    for typ in stack.values_mut().chain(locals.iter_mut()) {
        if typ == original {
            *typ = updated.clone();
        }
    }
}

fn get_local(locals: &[VerifierType], index: u16) -> Result<VerifierType, VerifierErrorKind> {
    match locals.get(index as usize) {
        None | Some(VerificationType::Top) => Err(VerifierErrorKind::InvalidLocal(index)),
        Some(typ) => Ok(typ.clone()),
    }
}

fn get_local_expecting_type(
    locals: &[VerifierType],
    index: u16,
    expected_type: VerifierType,
) -> Result<(), VerifierErrorKind> {
    if get_local(locals, index)? == expected_type {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

/// Store into a local, growing the locals if needed
///
/// Writing over either half of a `long` or `double` makes the other half unusable.
fn set_local(locals: &mut Vec<VerifierType>, index: u16, new_type: VerifierType) {
    let index = index as usize;
    let width = new_type.width();
    if locals.len() < index + width {
        locals.resize(index + width, VerificationType::Top);
    }
    if index > 0 && locals[index - 1].width() == 2 {
        locals[index - 1] = VerificationType::Top;
    }
    locals[index] = new_type;
    if width == 2 {
        locals[index + 1] = VerificationType::Top;
    }
}

fn pop(stack: &mut OffsetVec<VerifierType>) -> Result<VerifierType, VerifierErrorKind> {
    stack.pop().ok_or(VerifierErrorKind::EmptyStack)
}

fn pop_expecting_width(
    stack: &mut OffsetVec<VerifierType>,
    expected_width: usize,
) -> Result<VerifierType, VerifierErrorKind> {
    let typ = pop(stack)?;
    let found_width = typ.width();
    if found_width == expected_width {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidWidth(found_width))
    }
}

fn pop_expecting_type(
    stack: &mut OffsetVec<VerifierType>,
    expected_type: VerifierType,
) -> Result<(), VerifierErrorKind> {
    if pop(stack)? == expected_type {
        Ok(())
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

fn pop_reference(stack: &mut OffsetVec<VerifierType>) -> Result<VerifierType, VerifierErrorKind> {
    let typ = pop(stack)?;
    if typ.is_reference() {
        Ok(typ)
    } else {
        Err(VerifierErrorKind::InvalidType)
    }
}

/// Pop an array reference, returning its type (`None` means the reference is `null`)
fn pop_array(
    stack: &mut OffsetVec<VerifierType>,
) -> Result<Option<RefType<BinaryName>>, VerifierErrorKind> {
    match pop(stack)? {
        VerificationType::Null => Ok(None),
        VerificationType::Object(
            array_type @ (RefType::ObjectArray(_) | RefType::PrimitiveArray(_)),
        ) => Ok(Some(array_type)),
        VerificationType::Object(_) => Err(VerifierErrorKind::NotArrayType),
        _ => Err(VerifierErrorKind::InvalidType),
    }
}

/// Pop a value that is about to be stored or passed somewhere of the given type
fn pop_value(
    stack: &mut OffsetVec<VerifierType>,
    expected: &FieldType<BinaryName>,
) -> Result<(), VerifierErrorKind> {
    match expected {
        FieldType::Ref(_) => pop_reference(stack).map(|_| ()),
        FieldType::Base(_) => pop_expecting_type(stack, VerifierType::from(expected.clone())),
    }
}
