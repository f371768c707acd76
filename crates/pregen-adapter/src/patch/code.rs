//! `Code` attribute rewriting
//!
//! Inserts a fixed four-byte sequence in front of every `return` and
//! relocates everything that refers to code offsets. The inserted length is a
//! multiple of four, so `tableswitch`/`lookupswitch` padding is unchanged.

use super::classfile::{len_u16, put_u16, put_u32, Attribute, ClassFormatError, ConstantPool, Reader};

/// `return` (void)
pub const RETURN: u8 = 0xb1;
/// `aload_0`
pub const ALOAD_0: u8 = 0x2a;
/// `putstatic`
pub const PUTSTATIC: u8 = 0xb3;

const TABLESWITCH: u8 = 0xaa;
const LOOKUPSWITCH: u8 = 0xab;
const WIDE: u8 = 0xc4;
const IINC: u8 = 0x84;
const GOTO_W: u8 = 0xc8;
const JSR_W: u8 = 0xc9;

/// Exception table row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    /// Range start (inclusive)
    pub start: u16,
    /// Range end (exclusive)
    pub end: u16,
    /// Handler offset
    pub handler: u16,
    /// Caught class index, 0 for any
    pub catch_type: u16,
}

/// Decoded `Code` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    /// Operand stack depth
    pub max_stack: u16,
    /// Local variable slots
    pub max_locals: u16,
    /// Bytecode
    pub code: Vec<u8>,
    /// Exception handlers
    pub exceptions: Vec<ExceptionEntry>,
    /// Nested attributes (`LineNumberTable`, `StackMapTable`, ...)
    pub attributes: Vec<Attribute>,
}

impl CodeAttribute {
    /// Decode attribute body
    ///
    /// # Errors
    /// Returns [`ClassFormatError`] on truncated input.
    pub fn parse(data: &[u8]) -> Result<Self, ClassFormatError> {
        let mut reader = Reader::new(data);
        let max_stack = reader.u16("max_stack")?;
        let max_locals = reader.u16("max_locals")?;
        let code_len = reader.u32("code_length")?;
        let code_len = usize::try_from(code_len).map_err(|_| ClassFormatError::Truncated("code"))?;
        let code = reader.take(code_len, "code")?.to_vec();
        let exception_count = reader.u16("exception_table_length")?;
        let mut exceptions = Vec::with_capacity(usize::from(exception_count));
        for _ in 0..exception_count {
            exceptions.push(ExceptionEntry {
                start: reader.u16("exception start")?,
                end: reader.u16("exception end")?,
                handler: reader.u16("exception handler")?,
                catch_type: reader.u16("exception type")?,
            });
        }
        let attributes = Attribute::read_all(&mut reader)?;
        Ok(Self {
            max_stack,
            max_locals,
            code,
            exceptions,
            attributes,
        })
    }

    /// Encode attribute body
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() + 32);
        put_u16(&mut out, self.max_stack);
        put_u16(&mut out, self.max_locals);
        put_u32(&mut out, u32::try_from(self.code.len()).unwrap_or(u32::MAX));
        out.extend_from_slice(&self.code);
        put_u16(&mut out, len_u16(self.exceptions.len()));
        for entry in &self.exceptions {
            put_u16(&mut out, entry.start);
            put_u16(&mut out, entry.end);
            put_u16(&mut out, entry.handler);
            put_u16(&mut out, entry.catch_type);
        }
        Attribute::write_all(&self.attributes, &mut out);
        out
    }

    /// Offsets of every `return` instruction
    ///
    /// # Errors
    /// Returns [`ClassFormatError`] if the bytecode cannot be walked.
    pub fn return_offsets(&self) -> Result<Vec<usize>, ClassFormatError> {
        Ok(instructions(&self.code)?
            .into_iter()
            .filter(|(pc, _)| self.code[*pc] == RETURN)
            .map(|(pc, _)| pc)
            .collect())
    }

    /// Insert `snippet` before every `return`, returning how many were found
    ///
    /// Branch targets that pointed at a `return` now point at the inserted
    /// sequence, so every path to the return runs it. `max_stack` grows by
    /// one to cover whatever the sequence pushes.
    ///
    /// # Errors
    /// Returns [`ClassFormatError`] if the bytecode or a nested offset table
    /// is malformed, or if the grown method no longer fits its encoding.
    pub fn insert_before_returns(
        &mut self,
        snippet: [u8; 4],
        pool: &ConstantPool,
    ) -> Result<usize, ClassFormatError> {
        let insts = instructions(&self.code)?;
        let returns: Vec<usize> = insts
            .iter()
            .filter(|(pc, _)| self.code[*pc] == RETURN)
            .map(|(pc, _)| *pc)
            .collect();
        if returns.is_empty() {
            return Ok(0);
        }

        let map = OffsetMap {
            returns: &returns,
            grow: snippet.len(),
        };
        let new_len = map.relocate(self.code.len());
        if new_len > usize::from(u16::MAX) {
            return Err(ClassFormatError::CodeTooLarge(new_len));
        }

        let mut code = Vec::with_capacity(new_len);
        for (pc, len) in insts {
            let op = self.code[pc];
            if op == RETURN {
                code.extend_from_slice(&snippet);
            }
            let start = code.len();
            code.extend_from_slice(&self.code[pc..pc + len]);
            relocate_instruction(&mut code[start..], pc, &map)?;
        }

        // An offset naming a return moves to the start of its inserted
        // snippet. A range ending at a return therefore excludes the snippet;
        // `putstatic` on the already loaded owner throws no checked exception.
        for entry in &mut self.exceptions {
            entry.start = map.relocate_u16(entry.start)?;
            entry.end = map.relocate_u16(entry.end)?;
            entry.handler = map.relocate_u16(entry.handler)?;
        }

        for attribute in &mut self.attributes {
            match pool.utf8(attribute.name)? {
                b"LineNumberTable" => relocate_line_numbers(&mut attribute.data, &map)?,
                b"LocalVariableTable" | b"LocalVariableTypeTable" => {
                    relocate_local_variables(&mut attribute.data, &map)?;
                }
                b"StackMapTable" => {
                    attribute.data = relocate_stack_map(&attribute.data, &map)?;
                }
                _ => {}
            }
        }

        self.code = code;
        self.max_stack = self.max_stack.saturating_add(1);
        Ok(returns.len())
    }
}

/// Old-offset to new-offset mapping after insertions before returns
struct OffsetMap<'a> {
    returns: &'a [usize],
    grow: usize,
}

impl OffsetMap<'_> {
    fn relocate(&self, offset: usize) -> usize {
        offset + self.grow * self.returns.partition_point(|r| *r < offset)
    }

    fn relocate_u16(&self, offset: u16) -> Result<u16, ClassFormatError> {
        let moved = self.relocate(usize::from(offset));
        u16::try_from(moved).map_err(|_| ClassFormatError::CodeTooLarge(moved))
    }

    fn relative(&self, pc: usize, delta: i64, width: u8) -> Result<i64, ClassFormatError> {
        let target = i64::try_from(pc).map_err(|_| ClassFormatError::BranchOverflow(pc))? + delta;
        let target = usize::try_from(target).map_err(|_| ClassFormatError::BranchOverflow(pc))?;
        let from = i64::try_from(self.relocate(pc)).map_err(|_| ClassFormatError::BranchOverflow(pc))?;
        let to = i64::try_from(self.relocate(target)).map_err(|_| ClassFormatError::BranchOverflow(pc))?;
        let moved = to - from;
        let fits = match width {
            2 => i16::try_from(moved).is_ok(),
            _ => i32::try_from(moved).is_ok(),
        };
        if fits {
            Ok(moved)
        } else {
            Err(ClassFormatError::BranchOverflow(pc))
        }
    }
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

/// Length of the instruction at `pc`
fn instruction_len(code: &[u8], pc: usize) -> Result<usize, ClassFormatError> {
    let op = code[pc];
    let len = match op {
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf
        | 0xc2 | 0xc3 | 0xca | 0xfe | 0xff => 1,
        0x10 | 0x12 | 0x15..=0x19 | 0x36..=0x3a | 0xa9 | 0xbc => 2,
        0x11 | 0x13 | 0x14 | IINC | 0x99..=0xa8 | 0xb2..=0xb8 | 0xbb | 0xbd | 0xc0 | 0xc1
        | 0xc6 | 0xc7 => 3,
        0xc5 => 4,
        0xb9 | 0xba | GOTO_W | JSR_W => 5,
        WIDE => {
            let next = *code
                .get(pc + 1)
                .ok_or(ClassFormatError::Truncated("wide"))?;
            if next == IINC {
                6
            } else {
                4
            }
        }
        TABLESWITCH => {
            let base = pc + 1 + switch_padding(pc);
            if base + 12 > code.len() {
                return Err(ClassFormatError::Truncated("tableswitch"));
            }
            let low = i64::from(read_i32(code, base + 4));
            let high = i64::from(read_i32(code, base + 8));
            let count = usize::try_from(high - low + 1)
                .map_err(|_| ClassFormatError::Truncated("tableswitch"))?;
            base + 12 + 4 * count - pc
        }
        LOOKUPSWITCH => {
            let base = pc + 1 + switch_padding(pc);
            if base + 8 > code.len() {
                return Err(ClassFormatError::Truncated("lookupswitch"));
            }
            let pairs = usize::try_from(read_i32(code, base + 4))
                .map_err(|_| ClassFormatError::Truncated("lookupswitch"))?;
            base + 8 + 8 * pairs - pc
        }
        opcode => return Err(ClassFormatError::UnknownOpcode { offset: pc, opcode }),
    };
    if pc + len > code.len() {
        return Err(ClassFormatError::Truncated("instruction"));
    }
    Ok(len)
}

/// `(offset, length)` of every instruction
fn instructions(code: &[u8]) -> Result<Vec<(usize, usize)>, ClassFormatError> {
    let mut out = Vec::new();
    let mut pc = 0;
    while pc < code.len() {
        let len = instruction_len(code, pc)?;
        out.push((pc, len));
        pc += len;
    }
    Ok(out)
}

/// Rewrite branch operands of one copied instruction in place
fn relocate_instruction(inst: &mut [u8], pc: usize, map: &OffsetMap<'_>) -> Result<(), ClassFormatError> {
    match inst[0] {
        0x99..=0xa8 | 0xc6 | 0xc7 => {
            let delta = i64::from(i16::from_be_bytes([inst[1], inst[2]]));
            let moved = map.relative(pc, delta, 2)?;
            let moved = i16::try_from(moved).map_err(|_| ClassFormatError::BranchOverflow(pc))?;
            inst[1..3].copy_from_slice(&moved.to_be_bytes());
        }
        GOTO_W | JSR_W => {
            let delta = i64::from(read_i32(inst, 1));
            write_i32(inst, 1, map.relative(pc, delta, 4)?, pc)?;
        }
        TABLESWITCH => {
            let base = 1 + switch_padding(pc);
            write_i32(inst, base, map.relative(pc, i64::from(read_i32(inst, base)), 4)?, pc)?;
            let low = i64::from(read_i32(inst, base + 4));
            let high = i64::from(read_i32(inst, base + 8));
            let count = usize::try_from(high - low + 1).map_err(|_| ClassFormatError::Truncated("tableswitch"))?;
            for i in 0..count {
                let at = base + 12 + 4 * i;
                write_i32(inst, at, map.relative(pc, i64::from(read_i32(inst, at)), 4)?, pc)?;
            }
        }
        LOOKUPSWITCH => {
            let base = 1 + switch_padding(pc);
            write_i32(inst, base, map.relative(pc, i64::from(read_i32(inst, base)), 4)?, pc)?;
            let pairs = usize::try_from(read_i32(inst, base + 4)).map_err(|_| ClassFormatError::Truncated("lookupswitch"))?;
            for i in 0..pairs {
                let at = base + 8 + 8 * i + 4;
                write_i32(inst, at, map.relative(pc, i64::from(read_i32(inst, at)), 4)?, pc)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn write_i32(bytes: &mut [u8], at: usize, value: i64, pc: usize) -> Result<(), ClassFormatError> {
    let value = i32::try_from(value).map_err(|_| ClassFormatError::BranchOverflow(pc))?;
    bytes[at..at + 4].copy_from_slice(&value.to_be_bytes());
    Ok(())
}

fn relocate_line_numbers(data: &mut [u8], map: &OffsetMap<'_>) -> Result<(), ClassFormatError> {
    let count = usize::from(u16_at(data, 0)?);
    for i in 0..count {
        let at = 2 + 4 * i;
        let start = map.relocate_u16(u16_at(data, at)?)?;
        data[at..at + 2].copy_from_slice(&start.to_be_bytes());
    }
    Ok(())
}

fn relocate_local_variables(data: &mut [u8], map: &OffsetMap<'_>) -> Result<(), ClassFormatError> {
    let count = usize::from(u16_at(data, 0)?);
    for i in 0..count {
        let at = 2 + 10 * i;
        let start = u16_at(data, at)?;
        let length = u16_at(data, at + 2)?;
        let new_start = map.relocate_u16(start)?;
        let end = u16::try_from(usize::from(start) + usize::from(length))
            .map_err(|_| ClassFormatError::Truncated("local variable range"))?;
        let new_end = map.relocate_u16(end)?;
        data[at..at + 2].copy_from_slice(&new_start.to_be_bytes());
        data[at + 2..at + 4].copy_from_slice(&(new_end - new_start).to_be_bytes());
    }
    Ok(())
}

fn u16_at(data: &[u8], at: usize) -> Result<u16, ClassFormatError> {
    data.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or(ClassFormatError::Truncated("offset table"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum VerificationType {
    Simple(u8),
    Object(u16),
    Uninitialized(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum FrameKind {
    Same,
    SameLocals1(VerificationType),
    Chop(u8),
    Append(Vec<VerificationType>),
    Full {
        locals: Vec<VerificationType>,
        stack: Vec<VerificationType>,
    },
}

fn read_verification(reader: &mut Reader<'_>) -> Result<VerificationType, ClassFormatError> {
    let tag = reader.u8("verification type")?;
    Ok(match tag {
        0..=6 => VerificationType::Simple(tag),
        7 => VerificationType::Object(reader.u16("object type")?),
        8 => VerificationType::Uninitialized(reader.u16("uninitialized offset")?),
        other => return Err(ClassFormatError::BadVerificationType(other)),
    })
}

fn read_verifications(reader: &mut Reader<'_>, n: usize) -> Result<Vec<VerificationType>, ClassFormatError> {
    (0..n).map(|_| read_verification(reader)).collect()
}

fn write_verification(out: &mut Vec<u8>, ty: &VerificationType, map: &OffsetMap<'_>) -> Result<(), ClassFormatError> {
    match ty {
        VerificationType::Simple(tag) => out.push(*tag),
        VerificationType::Object(class) => {
            out.push(7);
            put_u16(out, *class);
        }
        VerificationType::Uninitialized(offset) => {
            out.push(8);
            put_u16(out, map.relocate_u16(*offset)?);
        }
    }
    Ok(())
}

/// Decode frames to absolute offsets, relocate, and re-encode
fn relocate_stack_map(data: &[u8], map: &OffsetMap<'_>) -> Result<Vec<u8>, ClassFormatError> {
    let mut reader = Reader::new(data);
    let count = reader.u16("number_of_entries")?;
    let mut frames = Vec::with_capacity(usize::from(count));
    let mut previous: Option<usize> = None;
    for _ in 0..count {
        let frame_type = reader.u8("frame type")?;
        let (delta, kind) = match frame_type {
            0..=63 => (usize::from(frame_type), FrameKind::Same),
            64..=127 => (
                usize::from(frame_type - 64),
                FrameKind::SameLocals1(read_verification(&mut reader)?),
            ),
            247 => {
                let delta = usize::from(reader.u16("frame delta")?);
                (delta, FrameKind::SameLocals1(read_verification(&mut reader)?))
            }
            248..=250 => (usize::from(reader.u16("frame delta")?), FrameKind::Chop(251 - frame_type)),
            251 => (usize::from(reader.u16("frame delta")?), FrameKind::Same),
            252..=254 => {
                let delta = usize::from(reader.u16("frame delta")?);
                let locals = read_verifications(&mut reader, usize::from(frame_type - 251))?;
                (delta, FrameKind::Append(locals))
            }
            255 => {
                let delta = usize::from(reader.u16("frame delta")?);
                let local_count = usize::from(reader.u16("full frame locals")?);
                let locals = read_verifications(&mut reader, local_count)?;
                let stack_count = usize::from(reader.u16("full frame stack")?);
                let stack = read_verifications(&mut reader, stack_count)?;
                (delta, FrameKind::Full { locals, stack })
            }
            other => return Err(ClassFormatError::BadFrame(other)),
        };
        let offset = match previous {
            None => delta,
            Some(prev) => prev + delta + 1,
        };
        previous = Some(offset);
        frames.push((offset, kind));
    }

    let mut out = Vec::with_capacity(data.len());
    put_u16(&mut out, count);
    let mut previous: Option<usize> = None;
    for (offset, kind) in frames {
        let offset = map.relocate(offset);
        let delta = match previous {
            None => offset,
            Some(prev) => offset - prev - 1,
        };
        previous = Some(offset);
        let wide = u16::try_from(delta).map_err(|_| ClassFormatError::CodeTooLarge(offset))?;
        match kind {
            FrameKind::Same if delta <= 63 => out.push(wide.to_be_bytes()[1]),
            FrameKind::Same => {
                out.push(251);
                put_u16(&mut out, wide);
            }
            FrameKind::SameLocals1(ty) => {
                if delta <= 63 {
                    out.push(64 + wide.to_be_bytes()[1]);
                } else {
                    out.push(247);
                    put_u16(&mut out, wide);
                }
                write_verification(&mut out, &ty, map)?;
            }
            FrameKind::Chop(k) => {
                out.push(251 - k);
                put_u16(&mut out, wide);
            }
            FrameKind::Append(locals) => {
                out.push(251 + u8::try_from(locals.len()).map_err(|_| ClassFormatError::BadFrame(255))?);
                put_u16(&mut out, wide);
                for ty in &locals {
                    write_verification(&mut out, ty, map)?;
                }
            }
            FrameKind::Full { locals, stack } => {
                out.push(255);
                put_u16(&mut out, wide);
                put_u16(&mut out, len_u16(locals.len()));
                for ty in &locals {
                    write_verification(&mut out, ty, map)?;
                }
                put_u16(&mut out, len_u16(stack.len()));
                for ty in &stack {
                    write_verification(&mut out, ty, map)?;
                }
            }
        }
    }
    Ok(out)
}
