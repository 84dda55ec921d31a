//! Disassembler: a linear decode pass over a bytecode buffer, followed
//! by a label-reconstruction pass and a textual printer.
//!
//! The printer emits the exact one-opcode-per-mnemonic form
//! (`Opcode::mnemonic`, e.g. `push_8i`, `add_i`) rather than the
//! original interpreter's abbreviated display table (`PUSH`, `ADD`).
//! That keeps `assemble(disassemble(x)) == x` a property of the
//! mnemonic table itself rather than a second alias table the parser
//! has to keep in sync with it; the shorter human mnemonics
//! (`push`, `cmp`, `rem`, ...) stay available for hand-written source.

use std::fmt;

use crate::codec;
use crate::opcode::Opcode;

#[derive(Debug)]
pub enum DisasmError {
    InsufficientBytes { offset: u32, needed: usize, available: usize },
    IllegalOpcode { offset: u32, byte: u8 },
    /// A decoded branch/call/table target does not land on any
    /// instruction boundary.
    UnresolvedTarget { from: u32, target: u32 },
}

impl fmt::Display for DisasmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for DisasmError {}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    None,
    Int(i32),
    Float(f32),
    Nibbles(u8, u8),
}

#[derive(Debug)]
pub struct Instr {
    pub offset: u32,
    pub opcode: Opcode,
    pub operand: Operand,
    /// Absolute byte offsets this instruction can transfer control to;
    /// empty for anything that isn't a call, jump or jump table.
    pub targets: Vec<u32>,
    pub is_label: bool,
}

enum Kind {
    None,
    Int8,
    UInt8,
    Int16,
    Int24,
    Int32,
    Float,
    Nibbles,
    ShortBranch,
    LongBranch,
    FarBranch,
    ShortTable,
    LongTable,
}

fn kind_of(op: Opcode) -> Kind {
    use Opcode::*;
    match op {
        PUSH_8I => Kind::Int8,
        BCALL | RET_I => Kind::UInt8,
        PUSH_16I => Kind::Int16,
        PUSH_24I => Kind::Int24,
        PUSH_32I => Kind::Int32,
        PUSH_F => Kind::Float,
        REM_R => Kind::Nibbles,
        CALL => Kind::ShortBranch,
        LCALL => Kind::FarBranch,
        JMP | JLT | JLE | JNE | JEQ | JGE | JGT => Kind::ShortBranch,
        LJMP | LJLT | LJLE | LJNE | LJEQ | LJGE | LJGT => Kind::LongBranch,
        JTBL => Kind::ShortTable,
        LJTBL => Kind::LongTable,
        _ => Kind::None,
    }
}

/// Decode every instruction in `program`, in address order.
pub fn disassemble(program: &[u8]) -> Result<Vec<Instr>, DisasmError> {
    let mut instrs = decode_linear(program)?;
    reconstruct_labels(&mut instrs)?;
    Ok(instrs)
}

fn decode_linear(program: &[u8]) -> Result<Vec<Instr>, DisasmError> {
    let mut instrs = Vec::new();
    let mut offset: u32 = 0;

    while (offset as usize) < program.len() {
        let byte = program[offset as usize];
        let opcode = Opcode::decode(byte).ok_or(DisasmError::IllegalOpcode { offset, byte })?;
        let rest = &program[offset as usize + 1..];

        let (operand, targets, advance) = match kind_of(opcode) {
            Kind::None => (Operand::None, Vec::new(), 1),
            Kind::Int8 => (Operand::Int(need(rest, offset, 1, codec::load_i8)?), Vec::new(), 2),
            Kind::UInt8 => (Operand::Int(need(rest, offset, 1, codec::load_u8)?), Vec::new(), 2),
            Kind::Int16 => (Operand::Int(need(rest, offset, 2, codec::load_i16)?), Vec::new(), 3),
            Kind::Int24 => (Operand::Int(need(rest, offset, 3, codec::load_i24)?), Vec::new(), 4),
            Kind::Int32 => (Operand::Int(need(rest, offset, 4, codec::load_i32)?), Vec::new(), 5),
            Kind::Float => (Operand::Float(need(rest, offset, 4, codec::load_f32)?), Vec::new(), 5),
            Kind::Nibbles => {
                let byte = need_raw(rest, offset, 1)?[0];
                (Operand::Nibbles(byte >> 4, byte & 0x0F), Vec::new(), 2)
            }
            Kind::ShortBranch => {
                let delta = need(rest, offset, 1, codec::load_i8)?;
                (Operand::None, vec![(offset as i64 + delta as i64) as u32], 2)
            }
            Kind::LongBranch => {
                let delta = need(rest, offset, 2, codec::load_i16)?;
                (Operand::None, vec![(offset as i64 + delta as i64) as u32], 3)
            }
            Kind::FarBranch => {
                let delta = need(rest, offset, 3, codec::load_i24)?;
                (Operand::None, vec![(offset as i64 + delta as i64) as u32], 4)
            }
            Kind::ShortTable => {
                let header = need_raw(rest, offset, 1)?[0];
                let entries = header as usize + 1;
                let body = need_raw(rest, offset, 1 + entries)?;
                let targets = (0..entries)
                    .map(|i| {
                        let delta = codec::load_i8(&body[1 + i..]).unwrap();
                        (offset as i64 + delta as i64) as u32
                    })
                    .collect();
                (Operand::None, targets, 2 + entries)
            }
            Kind::LongTable => {
                let header = need_raw(rest, offset, 2)?;
                let entries = codec::load_i16(header).unwrap() as usize + 1;
                let body = need_raw(rest, offset, 2 + entries * 2)?;
                let targets = (0..entries)
                    .map(|i| {
                        let delta = codec::load_i16(&body[2 + i * 2..]).unwrap();
                        (offset as i64 + delta as i64) as u32
                    })
                    .collect();
                (Operand::None, targets, 3 + entries * 2)
            }
        };

        instrs.push(Instr { offset, opcode, operand, targets, is_label: false });
        offset += advance as u32;
    }
    Ok(instrs)
}

fn need<T>(
    rest: &[u8],
    offset: u32,
    width: usize,
    load: impl Fn(&[u8]) -> Result<T, codec::CodecError>,
) -> Result<T, DisasmError> {
    load(rest).map_err(|_| DisasmError::InsufficientBytes { offset, needed: width + 1, available: rest.len() + 1 })
}

fn need_raw(rest: &[u8], offset: u32, width: usize) -> Result<&[u8], DisasmError> {
    if rest.len() < width {
        Err(DisasmError::InsufficientBytes { offset, needed: width + 1, available: rest.len() + 1 })
    } else {
        Ok(&rest[..width])
    }
}

fn reconstruct_labels(instrs: &mut [Instr]) -> Result<(), DisasmError> {
    let starts: std::collections::HashSet<u32> = instrs.iter().map(|i| i.offset).collect();
    let mut labeled: std::collections::HashSet<u32> = std::collections::HashSet::new();
    for instr in instrs.iter() {
        for &target in &instr.targets {
            if !starts.contains(&target) {
                return Err(DisasmError::UnresolvedTarget { from: instr.offset, target });
            }
            labeled.insert(target);
        }
    }
    for instr in instrs.iter_mut() {
        instr.is_label = labeled.contains(&instr.offset);
    }
    Ok(())
}

fn label_name(offset: u32) -> String {
    format!("LAB_{offset:06X}")
}

/// Render decoded instructions as assembly source, in the
/// `.name MAIN` / `.offset 0` single-section form every eVM program
/// round-trips through.
pub fn to_text(instrs: &[Instr]) -> String {
    let mut out = String::from(".name MAIN\n.offset 0\n\n");
    for instr in instrs {
        if instr.is_label {
            out.push_str(&format!("\n{}:\n", label_name(instr.offset)));
        }
        match &instr.operand {
            Operand::None if instr.targets.is_empty() => {
                out.push_str(&format!("    {}\n", instr.opcode.mnemonic()));
            }
            Operand::None if is_table(instr.opcode) => {
                out.push_str(&format!("    {}\n", instr.opcode.mnemonic()));
                for &target in &instr.targets {
                    out.push_str(&format!(".addr {}\n", label_name(target)));
                }
            }
            Operand::None => {
                out.push_str(&format!(
                    "    {} {}\n",
                    instr.opcode.mnemonic(),
                    label_name(instr.targets[0])
                ));
            }
            Operand::Int(n) => {
                out.push_str(&format!("    {} {}\n", instr.opcode.mnemonic(), n));
            }
            Operand::Float(v) => {
                out.push_str(&format!("    {} {}\n", instr.opcode.mnemonic(), v));
            }
            Operand::Nibbles(hi, lo) => {
                out.push_str(&format!("    {} {} {}\n", instr.opcode.mnemonic(), hi, lo));
            }
        }
    }
    out
}

fn is_table(op: Opcode) -> bool {
    matches!(op, Opcode::JTBL | Opcode::LJTBL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_push_add_halt() {
        let bytes = [0x13, 0x02, 0x13, 0x03, 0x44, 0x0F];
        let instrs = disassemble(&bytes).unwrap();
        assert_eq!(instrs.len(), 4);
        assert_eq!(instrs[0].opcode, Opcode::PUSH_8I);
        assert_eq!(instrs[0].operand, Operand::Int(2));
        assert_eq!(instrs[3].opcode, Opcode::HALT);
    }

    #[test]
    fn reconstructs_a_self_referencing_label() {
        // A zero-delta jmp targets its own opcode byte.
        let bytes = [0xE0, 0x00];
        let instrs = disassemble(&bytes).unwrap();
        assert!(instrs[0].is_label);
    }

    #[test]
    fn illegal_opcode_is_reported() {
        let bytes = [0x60];
        assert!(matches!(disassemble(&bytes), Err(DisasmError::IllegalOpcode { .. })));
    }

    #[test]
    fn to_text_round_trips_through_the_assembler() {
        let bytes = vec![0x13, 0x02, 0x13, 0x03, 0x44, 0x0F];
        let instrs = disassemble(&bytes).unwrap();
        let text = to_text(&instrs);
        let reassembled = crate::asm::assemble(&text).unwrap();
        assert_eq!(reassembled, bytes);
    }
}
