//! This module contains the AST of JVM bytecode. The representation is slightly different from
//! the usual presentation to make it more convenient to edit bytecode. For instance:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify (and re-appears only when an operand needs it)
//!
//!   - Short and long forms (`iload_0` vs. `iload 0`, `ldc` vs. `ldc_w`) are merged too. The
//!     most compact form is picked when encoding.
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches.
//!
//!   - `jsr` and `ret` are omitted. Class files from Java 7 onwards cannot contain them.

use crate::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, FieldRefConstantIndex, InvokeDynamicConstantIndex,
    MethodRefConstantIndex, Serialize,
};
use crate::jvm::BaseType;
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::TryFrom;
use std::io::Result;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(ConstantIndex), // covers both `ldc` and `ldc_w`
    Ldc2(ConstantIndex),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRefConstantIndex),
    PutStatic(FieldRefConstantIndex),
    GetField(FieldRefConstantIndex),
    PutField(FieldRefConstantIndex),
    Invoke(InvokeType, MethodRefConstantIndex),
    InvokeDynamic(InvokeDynamicConstantIndex),
    New(ClassConstantIndex),
    NewArray(BaseType),
    ANewArray(ClassConstantIndex),
    ArrayLength,
    CheckCast(ClassConstantIndex),
    InstanceOf(ClassConstantIndex),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(ClassConstantIndex, u8),
}

/// Width of a load or store to a local (short form, normal form, or wide form)
fn load_or_store_width(idx: u16) -> usize {
    match idx {
        0..=3 => 1,
        4..=255 => 2,
        _ => 4,
    }
}

impl Width for Instruction {
    fn width(&self) -> usize {
        match self {
            Instruction::ILoad(idx)
            | Instruction::LLoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::LStore(idx)
            | Instruction::FStore(idx)
            | Instruction::DStore(idx)
            | Instruction::AStore(idx) => load_or_store_width(*idx),

            Instruction::BiPush(_) | Instruction::NewArray(_) => 2,

            Instruction::Ldc(idx) => {
                if idx.0 <= u8::MAX as u16 {
                    2
                } else {
                    3
                }
            }

            Instruction::SiPush(_)
            | Instruction::Ldc2(_)
            | Instruction::GetStatic(_)
            | Instruction::PutStatic(_)
            | Instruction::GetField(_)
            | Instruction::PutField(_)
            | Instruction::Invoke(InvokeType::Special, _)
            | Instruction::Invoke(InvokeType::Static, _)
            | Instruction::Invoke(InvokeType::Virtual, _)
            | Instruction::New(_)
            | Instruction::ANewArray(_)
            | Instruction::CheckCast(_)
            | Instruction::InstanceOf(_) => 3,

            Instruction::IInc(idx, diff) => {
                if u8::try_from(*idx).is_ok() && i8::try_from(*diff).is_ok() {
                    3
                } else {
                    6
                }
            }

            Instruction::MultiANewArray(_, _) => 4,

            Instruction::Invoke(InvokeType::Interface(_), _) | Instruction::InvokeDynamic(_) => 5,

            _ => 1,
        }
    }
}

impl Serialize for Instruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        /* The load/store instructions follow the same pattern:
         *
         *   - short form (0-3) have special bytes
         *   - normal form (0-255) use `iload` plus a byte operand
         *   - wide form (255-65535) use `wide iload` plus two byte operands
         */
        fn serialize_load_or_store<W: WriteBytesExt>(
            idx: u16,
            short_form_start: u8,
            normal_form: u8,
            writer: &mut W,
        ) -> Result<()> {
            match u8::try_from(idx) {
                Ok(n @ 0..=3) => (short_form_start + n).serialize(writer),
                Ok(n) => {
                    normal_form.serialize(writer)?;
                    n.serialize(writer)
                }
                Err(_) => {
                    0xC4u8.serialize(writer)?;
                    normal_form.serialize(writer)?;
                    idx.serialize(writer)
                }
            }
        }

        let opcode: u8 = match self {
            Instruction::Nop => 0x00,
            Instruction::AConstNull => 0x01,
            Instruction::IConstM1 => 0x02,
            Instruction::IConst0 => 0x03,
            Instruction::IConst1 => 0x04,
            Instruction::IConst2 => 0x05,
            Instruction::IConst3 => 0x06,
            Instruction::IConst4 => 0x07,
            Instruction::IConst5 => 0x08,
            Instruction::LConst0 => 0x09,
            Instruction::LConst1 => 0x0a,
            Instruction::FConst0 => 0x0b,
            Instruction::FConst1 => 0x0c,
            Instruction::FConst2 => 0x0d,
            Instruction::DConst0 => 0x0e,
            Instruction::DConst1 => 0x0f,
            Instruction::BiPush(b) => {
                0x10u8.serialize(writer)?;
                return b.serialize(writer);
            }
            Instruction::SiPush(s) => {
                0x11u8.serialize(writer)?;
                return s.serialize(writer);
            }
            Instruction::Ldc(idx) => {
                return match u8::try_from(idx.0) {
                    Ok(short_idx) => {
                        0x12u8.serialize(writer)?;
                        short_idx.serialize(writer)
                    }
                    Err(_) => {
                        0x13u8.serialize(writer)?;
                        idx.serialize(writer)
                    }
                };
            }
            Instruction::Ldc2(idx) => {
                0x14u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::ILoad(idx) => return serialize_load_or_store(*idx, 0x1a, 0x15, writer),
            Instruction::LLoad(idx) => return serialize_load_or_store(*idx, 0x1e, 0x16, writer),
            Instruction::FLoad(idx) => return serialize_load_or_store(*idx, 0x22, 0x17, writer),
            Instruction::DLoad(idx) => return serialize_load_or_store(*idx, 0x26, 0x18, writer),
            Instruction::ALoad(idx) => return serialize_load_or_store(*idx, 0x2a, 0x19, writer),
            Instruction::IALoad => 0x2e,
            Instruction::LALoad => 0x2f,
            Instruction::FALoad => 0x30,
            Instruction::DALoad => 0x31,
            Instruction::AALoad => 0x32,
            Instruction::BALoad => 0x33,
            Instruction::CALoad => 0x34,
            Instruction::SALoad => 0x35,
            Instruction::IStore(idx) => return serialize_load_or_store(*idx, 0x3b, 0x36, writer),
            Instruction::LStore(idx) => return serialize_load_or_store(*idx, 0x3f, 0x37, writer),
            Instruction::FStore(idx) => return serialize_load_or_store(*idx, 0x43, 0x38, writer),
            Instruction::DStore(idx) => return serialize_load_or_store(*idx, 0x47, 0x39, writer),
            Instruction::AStore(idx) => return serialize_load_or_store(*idx, 0x4b, 0x3a, writer),
            Instruction::IAStore => 0x4f,
            Instruction::LAStore => 0x50,
            Instruction::FAStore => 0x51,
            Instruction::DAStore => 0x52,
            Instruction::AAStore => 0x53,
            Instruction::BAStore => 0x54,
            Instruction::CAStore => 0x55,
            Instruction::SAStore => 0x56,
            Instruction::Pop => 0x57,
            Instruction::Pop2 => 0x58,
            Instruction::Dup => 0x59,
            Instruction::DupX1 => 0x5a,
            Instruction::DupX2 => 0x5b,
            Instruction::Dup2 => 0x5c,
            Instruction::Dup2X1 => 0x5d,
            Instruction::Dup2X2 => 0x5e,
            Instruction::Swap => 0x5f,
            Instruction::IAdd => 0x60,
            Instruction::LAdd => 0x61,
            Instruction::FAdd => 0x62,
            Instruction::DAdd => 0x63,
            Instruction::ISub => 0x64,
            Instruction::LSub => 0x65,
            Instruction::FSub => 0x66,
            Instruction::DSub => 0x67,
            Instruction::IMul => 0x68,
            Instruction::LMul => 0x69,
            Instruction::FMul => 0x6a,
            Instruction::DMul => 0x6b,
            Instruction::IDiv => 0x6c,
            Instruction::LDiv => 0x6d,
            Instruction::FDiv => 0x6e,
            Instruction::DDiv => 0x6f,
            Instruction::IRem => 0x70,
            Instruction::LRem => 0x71,
            Instruction::FRem => 0x72,
            Instruction::DRem => 0x73,
            Instruction::INeg => 0x74,
            Instruction::LNeg => 0x75,
            Instruction::FNeg => 0x76,
            Instruction::DNeg => 0x77,
            Instruction::ISh(ShiftType::Left) => 0x78,
            Instruction::LSh(ShiftType::Left) => 0x79,
            Instruction::ISh(ShiftType::ArithmeticRight) => 0x7a,
            Instruction::LSh(ShiftType::ArithmeticRight) => 0x7b,
            Instruction::ISh(ShiftType::LogicalRight) => 0x7c,
            Instruction::LSh(ShiftType::LogicalRight) => 0x7d,
            Instruction::IAnd => 0x7e,
            Instruction::LAnd => 0x7f,
            Instruction::IOr => 0x80,
            Instruction::LOr => 0x81,
            Instruction::IXor => 0x82,
            Instruction::LXor => 0x83,
            Instruction::IInc(idx, diff) => {
                return match (u8::try_from(*idx), i8::try_from(*diff)) {
                    (Ok(idx), Ok(diff)) => {
                        0x84u8.serialize(writer)?;
                        idx.serialize(writer)?;
                        diff.serialize(writer)
                    }
                    _ => {
                        0xc4u8.serialize(writer)?;
                        0x84u8.serialize(writer)?;
                        idx.serialize(writer)?;
                        diff.serialize(writer)
                    }
                };
            }
            Instruction::I2L => 0x85,
            Instruction::I2F => 0x86,
            Instruction::I2D => 0x87,
            Instruction::L2I => 0x88,
            Instruction::L2F => 0x89,
            Instruction::L2D => 0x8a,
            Instruction::F2I => 0x8b,
            Instruction::F2L => 0x8c,
            Instruction::F2D => 0x8d,
            Instruction::D2I => 0x8e,
            Instruction::D2L => 0x8f,
            Instruction::D2F => 0x90,
            Instruction::I2B => 0x91,
            Instruction::I2C => 0x92,
            Instruction::I2S => 0x93,
            Instruction::LCmp => 0x94,
            Instruction::FCmp(CompareMode::L) => 0x95,
            Instruction::FCmp(CompareMode::G) => 0x96,
            Instruction::DCmp(CompareMode::L) => 0x97,
            Instruction::DCmp(CompareMode::G) => 0x98,
            Instruction::GetStatic(idx) => {
                0xb2u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::PutStatic(idx) => {
                0xb3u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::GetField(idx) => {
                0xb4u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::PutField(idx) => {
                0xb5u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::Invoke(InvokeType::Virtual, idx) => {
                0xb6u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::Invoke(InvokeType::Special, idx) => {
                0xb7u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::Invoke(InvokeType::Static, idx) => {
                0xb8u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::Invoke(InvokeType::Interface(cnt), idx) => {
                0xb9u8.serialize(writer)?;
                idx.serialize(writer)?;
                cnt.serialize(writer)?;
                return 0u8.serialize(writer);
            }
            Instruction::InvokeDynamic(idx) => {
                0xbau8.serialize(writer)?;
                idx.serialize(writer)?;
                return 0u16.serialize(writer);
            }
            Instruction::New(idx) => {
                0xbbu8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::NewArray(base_type) => {
                0xbcu8.serialize(writer)?;
                return array_type_code(*base_type).serialize(writer);
            }
            Instruction::ANewArray(idx) => {
                0xbdu8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::ArrayLength => 0xbe,
            Instruction::CheckCast(idx) => {
                0xc0u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::InstanceOf(idx) => {
                0xc1u8.serialize(writer)?;
                return idx.serialize(writer);
            }
            Instruction::MonitorEnter => 0xc2,
            Instruction::MonitorExit => 0xc3,
            Instruction::MultiANewArray(idx, dimensions) => {
                0xc5u8.serialize(writer)?;
                idx.serialize(writer)?;
                return dimensions.serialize(writer);
            }
        };
        opcode.serialize(writer)
    }
}

/// `atype` operand of `newarray`
pub fn array_type_code(base_type: BaseType) -> u8 {
    match base_type {
        BaseType::Boolean => 4,
        BaseType::Char => 5,
        BaseType::Float => 6,
        BaseType::Double => 7,
        BaseType::Byte => 8,
        BaseType::Short => 9,
        BaseType::Int => 10,
        BaseType::Long => 11,
    }
}

/// Inverse of [`array_type_code`]
pub fn array_type_from_code(code: u8) -> Option<BaseType> {
    Some(match code {
        4 => BaseType::Boolean,
        5 => BaseType::Char,
        6 => BaseType::Float,
        7 => BaseType::Double,
        8 => BaseType::Byte,
        9 => BaseType::Short,
        10 => BaseType::Int,
        11 => BaseType::Long,
        _ => return None,
    })
}

/// Branching JVM bytecode instruction
///
/// The type parameter abstracts over the representation of jump targets:
///
///   * __absolute offsets__ (`u32`) when decoded out of an existing code array
///   * __labels__ while code is being edited in a [`super::CodeBuffer`]
///   * __relative offsets__ (`i32`) right before serialization
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),
    GotoW(Lbl),
    TableSwitch {
        /// `default` must be at a multiple of four bytes from the start of the current method, so
        /// there must be a 0-3 inclusive byte padding
        padding: u8,

        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// `default` must be at a multiple of four bytes from the start of the current method, so
        /// there must be a 0-3 inclusive byte padding
        padding: u8,

        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

impl<Lbl> BranchInstruction<Lbl> {
    /// Can execution continue to the next instruction?
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(_, _)
                | BranchInstruction::IfICmp(_, _)
                | BranchInstruction::IfACmp(_, _)
                | BranchInstruction::IfNull(_, _)
        )
    }

    /// Is this one of the six return instructions?
    pub fn is_return(&self) -> bool {
        matches!(
            self,
            BranchInstruction::IReturn
                | BranchInstruction::LReturn
                | BranchInstruction::FReturn
                | BranchInstruction::DReturn
                | BranchInstruction::AReturn
                | BranchInstruction::Return
        )
    }

    /// Jump targets (not including the fallthrough)
    pub fn jump_targets(&self) -> Vec<&Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl)
            | BranchInstruction::GotoW(lbl) => vec![lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![default];
                ts.extend(targets.iter());
                ts
            }
            BranchInstruction::LookupSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![default];
                ts.extend(targets.iter().map(|(_, target)| target));
                ts
            }
            _ => vec![],
        }
    }

    pub fn try_map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> std::result::Result<Lbl2, E>,
    ) -> std::result::Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            GotoW(lbl) => GotoW(map_label(lbl)?),
            TableSwitch {
                padding,
                default,
                low,
                targets,
            } => TableSwitch {
                padding: *padding,
                default: map_label(default)?,
                low: *low,
                targets: targets
                    .iter()
                    .map(&mut map_label)
                    .collect::<std::result::Result<_, _>>()?,
            },
            LookupSwitch {
                padding,
                default,
                targets,
            } => LookupSwitch {
                padding: *padding,
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| -> std::result::Result<(i32, Lbl2), E> {
                        Ok((*key, map_label(lbl)?))
                    })
                    .collect::<std::result::Result<_, _>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
        })
    }

    /// Does the jump offset of this instruction only have 16 bits?
    pub fn has_short_offset(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(_, _)
                | BranchInstruction::IfICmp(_, _)
                | BranchInstruction::IfACmp(_, _)
                | BranchInstruction::IfNull(_, _)
                | BranchInstruction::Goto(_)
        )
    }
}

impl<Lbl> Width for BranchInstruction<Lbl> {
    fn width(&self) -> usize {
        match self {
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => 1,

            BranchInstruction::Goto(_)
            | BranchInstruction::If(_, _)
            | BranchInstruction::IfICmp(_, _)
            | BranchInstruction::IfACmp(_, _)
            | BranchInstruction::IfNull(_, _) => 3,

            BranchInstruction::GotoW(_) => 5,

            BranchInstruction::TableSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 4 * (3 + targets.len()),

            BranchInstruction::LookupSwitch {
                padding, targets, ..
            } => 1 + *padding as usize + 8 * (1 + targets.len()),
        }
    }
}

/// Serialization expects relative offsets that have already been checked to fit
impl Serialize for BranchInstruction<i32> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            BranchInstruction::If(comp, lbl) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => 0x99,
                    OrdComparison::NE => 0x9a,
                    OrdComparison::LT => 0x9b,
                    OrdComparison::GE => 0x9c,
                    OrdComparison::GT => 0x9d,
                    OrdComparison::LE => 0x9e,
                };
                opcode.serialize(writer)?;
                (*lbl as i16).serialize(writer)?;
            }
            BranchInstruction::IfICmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    OrdComparison::EQ => 0x9f,
                    OrdComparison::NE => 0xa0,
                    OrdComparison::LT => 0xa1,
                    OrdComparison::GE => 0xa2,
                    OrdComparison::GT => 0xa3,
                    OrdComparison::LE => 0xa4,
                };
                opcode.serialize(writer)?;
                (*lbl as i16).serialize(writer)?;
            }
            BranchInstruction::IfACmp(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xa5,
                    EqComparison::NE => 0xa6,
                };
                opcode.serialize(writer)?;
                (*lbl as i16).serialize(writer)?;
            }
            BranchInstruction::IfNull(comp, lbl) => {
                let opcode: u8 = match comp {
                    EqComparison::EQ => 0xc6,
                    EqComparison::NE => 0xc7,
                };
                opcode.serialize(writer)?;
                (*lbl as i16).serialize(writer)?;
            }
            BranchInstruction::Goto(lbl) => {
                0xa7u8.serialize(writer)?;
                (*lbl as i16).serialize(writer)?;
            }
            BranchInstruction::GotoW(lbl) => {
                0xc8u8.serialize(writer)?;
                lbl.serialize(writer)?;
            }
            BranchInstruction::TableSwitch {
                padding,
                default,
                low,
                targets,
            } => {
                0xaau8.serialize(writer)?;
                for _ in 0..*padding {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                low.serialize(writer)?;
                (low + targets.len() as i32 - 1).serialize(writer)?;
                for target in targets {
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::LookupSwitch {
                padding,
                default,
                targets,
            } => {
                0xabu8.serialize(writer)?;
                for _ in 0..*padding {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                (targets.len() as i32).serialize(writer)?;
                for (key, target) in targets {
                    key.serialize(writer)?;
                    target.serialize(writer)?;
                }
            }
            BranchInstruction::IReturn => 0xacu8.serialize(writer)?,
            BranchInstruction::LReturn => 0xadu8.serialize(writer)?,
            BranchInstruction::FReturn => 0xaeu8.serialize(writer)?,
            BranchInstruction::DReturn => 0xafu8.serialize(writer)?,
            BranchInstruction::AReturn => 0xb0u8.serialize(writer)?,
            BranchInstruction::Return => 0xb1u8.serialize(writer)?,
            BranchInstruction::AThrow => 0xbfu8.serialize(writer)?,
        }
        Ok(())
    }
}

/// Either kind of instruction
#[derive(Clone, Debug, PartialEq)]
pub enum AnyInstruction<Lbl> {
    Regular(Instruction),
    Branch(BranchInstruction<Lbl>),
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because the constant argument it expects is not to a
/// `Constant::MethodRef`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}
