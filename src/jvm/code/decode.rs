use super::{
    array_type_from_code, AnyInstruction, BranchInstruction, CompareMode, EqComparison,
    Instruction, InvokeType, OrdComparison, ShiftType,
};
use crate::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, FieldRefConstantIndex, InvokeDynamicConstantIndex,
    MethodRefConstantIndex, Parse,
};
use crate::jvm::Error;
use std::collections::HashSet;
use std::io::Cursor;

/// Instruction decoded out of a code array, along with its offset
///
/// Jump targets are absolute offsets into the same code array.
pub type DecodedInstruction = (u32, AnyInstruction<u32>);

/// Decode a whole code array
///
/// Every jump target is checked to land on the start of a decoded instruction.
pub fn decode_code(code: &[u8]) -> Result<Vec<DecodedInstruction>, Error> {
    let mut cursor = Cursor::new(code);
    let mut decoded = vec![];
    while (cursor.position() as usize) < code.len() {
        let offset = cursor.position() as u32;
        let insn = decode_instruction(&mut cursor, offset).map_err(|err| match err {
            Error::IoError(_) => Error::TruncatedInstruction(offset),
            other => other,
        })?;
        decoded.push((offset, insn));
    }

    let starts: HashSet<u32> = decoded.iter().map(|(offset, _)| *offset).collect();
    for (offset, insn) in &decoded {
        if let AnyInstruction::Branch(branch) = insn {
            for target in branch.jump_targets() {
                if !starts.contains(target) {
                    return Err(Error::InvalidBranchTarget {
                        offset: *offset,
                        target: *target as i64,
                    });
                }
            }
        }
    }

    Ok(decoded)
}

/// Turn a relative jump into an absolute one
fn jump_target(offset: u32, relative: i64) -> Result<u32, Error> {
    let target = offset as i64 + relative;
    if target < 0 || target > u16::MAX as i64 {
        Err(Error::InvalidBranchTarget { offset, target })
    } else {
        Ok(target as u32)
    }
}

fn short_jump(cursor: &mut Cursor<&[u8]>, offset: u32) -> Result<u32, Error> {
    jump_target(offset, i16::parse(cursor)? as i64)
}

fn wide_jump(cursor: &mut Cursor<&[u8]>, offset: u32) -> Result<u32, Error> {
    jump_target(offset, i32::parse(cursor)? as i64)
}

fn decode_instruction(
    cursor: &mut Cursor<&[u8]>,
    offset: u32,
) -> Result<AnyInstruction<u32>, Error> {
    use Instruction::*;

    let opcode = u8::parse(cursor)?;
    let insn = match opcode {
        0x00 => Nop,
        0x01 => AConstNull,
        0x02 => IConstM1,
        0x03 => IConst0,
        0x04 => IConst1,
        0x05 => IConst2,
        0x06 => IConst3,
        0x07 => IConst4,
        0x08 => IConst5,
        0x09 => LConst0,
        0x0a => LConst1,
        0x0b => FConst0,
        0x0c => FConst1,
        0x0d => FConst2,
        0x0e => DConst0,
        0x0f => DConst1,
        0x10 => BiPush(i8::parse(cursor)?),
        0x11 => SiPush(i16::parse(cursor)?),
        0x12 => Ldc(ConstantIndex(u8::parse(cursor)? as u16)),
        0x13 => Ldc(ConstantIndex::parse(cursor)?),
        0x14 => Ldc2(ConstantIndex::parse(cursor)?),
        0x15 => ILoad(u8::parse(cursor)? as u16),
        0x16 => LLoad(u8::parse(cursor)? as u16),
        0x17 => FLoad(u8::parse(cursor)? as u16),
        0x18 => DLoad(u8::parse(cursor)? as u16),
        0x19 => ALoad(u8::parse(cursor)? as u16),
        n @ 0x1a..=0x1d => ILoad((n - 0x1a) as u16),
        n @ 0x1e..=0x21 => LLoad((n - 0x1e) as u16),
        n @ 0x22..=0x25 => FLoad((n - 0x22) as u16),
        n @ 0x26..=0x29 => DLoad((n - 0x26) as u16),
        n @ 0x2a..=0x2d => ALoad((n - 0x2a) as u16),
        0x2e => IALoad,
        0x2f => LALoad,
        0x30 => FALoad,
        0x31 => DALoad,
        0x32 => AALoad,
        0x33 => BALoad,
        0x34 => CALoad,
        0x35 => SALoad,
        0x36 => IStore(u8::parse(cursor)? as u16),
        0x37 => LStore(u8::parse(cursor)? as u16),
        0x38 => FStore(u8::parse(cursor)? as u16),
        0x39 => DStore(u8::parse(cursor)? as u16),
        0x3a => AStore(u8::parse(cursor)? as u16),
        n @ 0x3b..=0x3e => IStore((n - 0x3b) as u16),
        n @ 0x3f..=0x42 => LStore((n - 0x3f) as u16),
        n @ 0x43..=0x46 => FStore((n - 0x43) as u16),
        n @ 0x47..=0x4a => DStore((n - 0x47) as u16),
        n @ 0x4b..=0x4e => AStore((n - 0x4b) as u16),
        0x4f => IAStore,
        0x50 => LAStore,
        0x51 => FAStore,
        0x52 => DAStore,
        0x53 => AAStore,
        0x54 => BAStore,
        0x55 => CAStore,
        0x56 => SAStore,
        0x57 => Pop,
        0x58 => Pop2,
        0x59 => Dup,
        0x5a => DupX1,
        0x5b => DupX2,
        0x5c => Dup2,
        0x5d => Dup2X1,
        0x5e => Dup2X2,
        0x5f => Swap,
        0x60 => IAdd,
        0x61 => LAdd,
        0x62 => FAdd,
        0x63 => DAdd,
        0x64 => ISub,
        0x65 => LSub,
        0x66 => FSub,
        0x67 => DSub,
        0x68 => IMul,
        0x69 => LMul,
        0x6a => FMul,
        0x6b => DMul,
        0x6c => IDiv,
        0x6d => LDiv,
        0x6e => FDiv,
        0x6f => DDiv,
        0x70 => IRem,
        0x71 => LRem,
        0x72 => FRem,
        0x73 => DRem,
        0x74 => INeg,
        0x75 => LNeg,
        0x76 => FNeg,
        0x77 => DNeg,
        0x78 => ISh(ShiftType::Left),
        0x79 => LSh(ShiftType::Left),
        0x7a => ISh(ShiftType::ArithmeticRight),
        0x7b => LSh(ShiftType::ArithmeticRight),
        0x7c => ISh(ShiftType::LogicalRight),
        0x7d => LSh(ShiftType::LogicalRight),
        0x7e => IAnd,
        0x7f => LAnd,
        0x80 => IOr,
        0x81 => LOr,
        0x82 => IXor,
        0x83 => LXor,
        0x84 => IInc(u8::parse(cursor)? as u16, i8::parse(cursor)? as i16),
        0x85 => I2L,
        0x86 => I2F,
        0x87 => I2D,
        0x88 => L2I,
        0x89 => L2F,
        0x8a => L2D,
        0x8b => F2I,
        0x8c => F2L,
        0x8d => F2D,
        0x8e => D2I,
        0x8f => D2L,
        0x90 => D2F,
        0x91 => I2B,
        0x92 => I2C,
        0x93 => I2S,
        0x94 => LCmp,
        0x95 => FCmp(CompareMode::L),
        0x96 => FCmp(CompareMode::G),
        0x97 => DCmp(CompareMode::L),
        0x98 => DCmp(CompareMode::G),
        0x99..=0xa7 | 0xaa..=0xb1 | 0xbf | 0xc6..=0xc8 => {
            return decode_branch(cursor, offset, opcode).map(AnyInstruction::Branch)
        }
        0xa8 | 0xa9 | 0xc9 => return Err(Error::UnsupportedOpcode { offset, opcode }),
        0xb2 => GetStatic(FieldRefConstantIndex::parse(cursor)?),
        0xb3 => PutStatic(FieldRefConstantIndex::parse(cursor)?),
        0xb4 => GetField(FieldRefConstantIndex::parse(cursor)?),
        0xb5 => PutField(FieldRefConstantIndex::parse(cursor)?),
        0xb6 => Invoke(InvokeType::Virtual, MethodRefConstantIndex::parse(cursor)?),
        0xb7 => Invoke(InvokeType::Special, MethodRefConstantIndex::parse(cursor)?),
        0xb8 => Invoke(InvokeType::Static, MethodRefConstantIndex::parse(cursor)?),
        0xb9 => {
            let index = MethodRefConstantIndex::parse(cursor)?;
            let count = u8::parse(cursor)?;
            let _zero = u8::parse(cursor)?;
            Invoke(InvokeType::Interface(count), index)
        }
        0xba => {
            let index = InvokeDynamicConstantIndex::parse(cursor)?;
            let _zero = u16::parse(cursor)?;
            InvokeDynamic(index)
        }
        0xbb => New(ClassConstantIndex::parse(cursor)?),
        0xbc => {
            let code = u8::parse(cursor)?;
            match array_type_from_code(code) {
                Some(base_type) => NewArray(base_type),
                None => return Err(Error::UnknownOpcode { offset, opcode }),
            }
        }
        0xbd => ANewArray(ClassConstantIndex::parse(cursor)?),
        0xbe => ArrayLength,
        0xc0 => CheckCast(ClassConstantIndex::parse(cursor)?),
        0xc1 => InstanceOf(ClassConstantIndex::parse(cursor)?),
        0xc2 => MonitorEnter,
        0xc3 => MonitorExit,
        0xc4 => {
            let wide_opcode = u8::parse(cursor)?;
            let idx = u16::parse(cursor)?;
            match wide_opcode {
                0x15 => ILoad(idx),
                0x16 => LLoad(idx),
                0x17 => FLoad(idx),
                0x18 => DLoad(idx),
                0x19 => ALoad(idx),
                0x36 => IStore(idx),
                0x37 => LStore(idx),
                0x38 => FStore(idx),
                0x39 => DStore(idx),
                0x3a => AStore(idx),
                0x84 => IInc(idx, i16::parse(cursor)?),
                0xa9 => {
                    return Err(Error::UnsupportedOpcode {
                        offset,
                        opcode: wide_opcode,
                    })
                }
                _ => {
                    return Err(Error::UnknownOpcode {
                        offset,
                        opcode: wide_opcode,
                    })
                }
            }
        }
        0xc5 => MultiANewArray(ClassConstantIndex::parse(cursor)?, u8::parse(cursor)?),
        _ => return Err(Error::UnknownOpcode { offset, opcode }),
    };
    Ok(AnyInstruction::Regular(insn))
}

fn decode_branch(
    cursor: &mut Cursor<&[u8]>,
    offset: u32,
    opcode: u8,
) -> Result<BranchInstruction<u32>, Error> {
    use BranchInstruction::*;

    let ord = |op: u8| match op {
        0 => OrdComparison::EQ,
        1 => OrdComparison::NE,
        2 => OrdComparison::LT,
        3 => OrdComparison::GE,
        4 => OrdComparison::GT,
        _ => OrdComparison::LE,
    };
    let eq = |op: u8| match op {
        0 => EqComparison::EQ,
        _ => EqComparison::NE,
    };

    let branch = match opcode {
        0x99..=0x9e => If(ord(opcode - 0x99), short_jump(cursor, offset)?),
        0x9f..=0xa4 => IfICmp(ord(opcode - 0x9f), short_jump(cursor, offset)?),
        0xa5..=0xa6 => IfACmp(eq(opcode - 0xa5), short_jump(cursor, offset)?),
        0xa7 => Goto(short_jump(cursor, offset)?),
        0xaa | 0xab => {
            // Operands start at the next multiple of 4 from the start of the code
            let padding = ((4 - (offset + 1) % 4) % 4) as u8;
            for _ in 0..padding {
                let _ = u8::parse(cursor)?;
            }
            let default = wide_jump(cursor, offset)?;
            if opcode == 0xaa {
                let low = i32::parse(cursor)?;
                let high = i32::parse(cursor)?;
                if high < low {
                    return Err(Error::UnknownOpcode { offset, opcode });
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                let mut targets = Vec::with_capacity(count.min(u16::MAX as usize));
                for _ in 0..count {
                    targets.push(wide_jump(cursor, offset)?);
                }
                TableSwitch {
                    padding,
                    default,
                    low,
                    targets,
                }
            } else {
                let count = i32::parse(cursor)?;
                if count < 0 {
                    return Err(Error::UnknownOpcode { offset, opcode });
                }
                let mut targets = Vec::with_capacity((count as usize).min(u16::MAX as usize));
                for _ in 0..count {
                    let key = i32::parse(cursor)?;
                    targets.push((key, wide_jump(cursor, offset)?));
                }
                LookupSwitch {
                    padding,
                    default,
                    targets,
                }
            }
        }
        0xac => IReturn,
        0xad => LReturn,
        0xae => FReturn,
        0xaf => DReturn,
        0xb0 => AReturn,
        0xb1 => Return,
        0xbf => AThrow,
        0xc6..=0xc7 => IfNull(eq(opcode - 0xc6), short_jump(cursor, offset)?),
        0xc8 => GotoW(wide_jump(cursor, offset)?),
        _ => return Err(Error::UnknownOpcode { offset, opcode }),
    };
    Ok(branch)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_offsets_and_targets() {
        // iload_0; ifeq +5; iconst_1; ireturn; iconst_0; ireturn
        let code = [0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac];
        let decoded = decode_code(&code).unwrap();
        let offsets: Vec<u32> = decoded.iter().map(|(off, _)| *off).collect();
        assert_eq!(offsets, vec![0, 1, 4, 5, 6, 7]);
        assert_eq!(
            decoded[1].1,
            AnyInstruction::Branch(BranchInstruction::If(OrdComparison::EQ, 6))
        );
        assert_eq!(
            decoded[0].1,
            AnyInstruction::Regular(Instruction::ILoad(0))
        );
    }

    #[test]
    fn decodes_padded_switch() {
        // iconst_0; tableswitch (2 padding bytes) default=+19 low=0 high=0 [+19]; return
        let mut code = vec![0x03, 0xaa, 0, 0];
        code.extend_from_slice(&19i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&0i32.to_be_bytes());
        code.extend_from_slice(&19i32.to_be_bytes());
        code.push(0xb1);
        let decoded = decode_code(&code).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[2].0, 20);
        assert_eq!(
            decoded[1].1,
            AnyInstruction::Branch(BranchInstruction::TableSwitch {
                padding: 2,
                default: 20,
                low: 0,
                targets: vec![20],
            })
        );
    }

    #[test]
    fn wide_forms_merge() {
        let code = [0xc4, 0x15, 0x01, 0x00, 0xc4, 0x84, 0x01, 0x00, 0xff, 0xfe, 0xb1];
        let decoded = decode_code(&code).unwrap();
        assert_eq!(decoded[0].1, AnyInstruction::Regular(Instruction::ILoad(256)));
        assert_eq!(
            decoded[1].1,
            AnyInstruction::Regular(Instruction::IInc(256, -2))
        );
    }

    #[test]
    fn rejects_bad_code() {
        assert!(matches!(
            decode_code(&[0xa8, 0x00, 0x03, 0xb1]),
            Err(Error::UnsupportedOpcode { opcode: 0xa8, .. })
        ));
        assert!(matches!(
            decode_code(&[0xa7, 0x00, 0x02, 0xb1]),
            Err(Error::InvalidBranchTarget { offset: 0, target: 2 })
        ));
        assert!(matches!(
            decode_code(&[0x11, 0x00]),
            Err(Error::TruncatedInstruction(0))
        ));
        assert!(matches!(
            decode_code(&[0xfe]),
            Err(Error::UnknownOpcode { opcode: 0xfe, .. })
        ));
    }
}
