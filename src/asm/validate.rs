//! The assembler's back-end: turns the sections the front-end produced
//! into a flat byte buffer. Runs in the order the original interpreter's
//! `validateProgram` does: assign to sections (already done by
//! [`super::section::build`]), check for duplicate labels, resolve
//! labels to addresses, sort sections by base, encode each instruction,
//! check for overlaps and a non-executable entry point, and finally
//! report the total program length.

use std::collections::HashMap;

use crate::codec;
use crate::error::ValidationErrors;
use crate::opcode::Opcode;

use super::instruction::{Instruction, Operand};
use super::section::{Item, Section};

struct Placement {
    /// Byte offset of each item, relative to its section's base.
    local_offsets: Vec<usize>,
    size: usize,
}

fn item_size(item: &Item) -> usize {
    match item {
        Item::Label(_) => 0,
        Item::Data(bytes) => bytes.len(),
        Item::Code(instr, targets) => {
            if is_table_jump(instr.opcode) {
                let width = table_width(instr.opcode);
                instr.opcode.instruction_len() + targets.len() * width
            } else {
                instr.size()
            }
        }
    }
}

fn is_table_jump(op: Opcode) -> bool {
    matches!(op, Opcode::JTBL | Opcode::LJTBL)
}

fn table_width(op: Opcode) -> usize {
    if op == Opcode::LJTBL { 2 } else { 1 }
}

fn place(section: &Section) -> Placement {
    let mut local_offsets = Vec::with_capacity(section.items.len());
    let mut cursor = 0usize;
    for item in &section.items {
        local_offsets.push(cursor);
        cursor += item_size(item);
    }
    Placement { local_offsets, size: cursor }
}

/// Assemble a list of built sections into a flat byte buffer.
pub fn assemble(mut sections: Vec<Section>) -> Result<Vec<u8>, ValidationErrors> {
    let mut errors = ValidationErrors::empty();

    let placements: Vec<Placement> = sections.iter().map(place).collect();

    // Duplicate-label check, across every section.
    let mut labels: HashMap<String, (usize, usize)> = HashMap::new();
    for (si, section) in sections.iter().enumerate() {
        for (ii, item) in section.items.iter().enumerate() {
            if let Item::Label(name) = item {
                let local = placements[si].local_offsets[ii];
                if labels.insert(name.clone(), (si, local)).is_some() {
                    errors |= ValidationErrors::DUPLICATE_LABEL;
                }
            }
        }
    }

    // Assign bases: explicit `.offset` sections keep theirs; the rest
    // are placed contiguously, in declaration order, after whatever
    // precedes them.
    let mut cursor: i64 = 0;
    let mut bases = vec![0i64; sections.len()];
    for (i, section) in sections.iter().enumerate() {
        let base = section.base.unwrap_or(cursor);
        bases[i] = base;
        cursor = base + placements[i].size as i64;
    }

    // Sort sections (and their placements/bases) by base, ascending.
    // A plain selection sort, mirroring the back-end's single linear
    // pass over a small number of sections.
    let mut order: Vec<usize> = (0..sections.len()).collect();
    for i in 0..order.len() {
        let mut min = i;
        for j in (i + 1)..order.len() {
            if bases[order[j]] < bases[order[min]] {
                min = j;
            }
        }
        order.swap(i, min);
    }

    // Overlap check between consecutive sections in sorted order.
    for w in order.windows(2) {
        let (a, b) = (w[0], w[1]);
        if bases[a] + placements[a].size as i64 > bases[b] {
            errors |= ValidationErrors::OVERLAPPING_SECTION;
        }
    }

    // First byte of the lowest-based section must be executable code,
    // not a data byte or a jump-table entry.
    if let Some(&first) = order.first() {
        let first_code_item = sections[first]
            .items
            .iter()
            .find(|item| item_size(item) > 0);
        if matches!(first_code_item, Some(Item::Data(_))) {
            errors |= ValidationErrors::NON_EXECUTABLE_ENTRY_POINT;
        }
    }

    // Absolute address of every label, now that bases are fixed.
    let absolute: HashMap<String, i64> = labels
        .iter()
        .map(|(name, (si, local))| (name.clone(), bases[*si] + *local as i64))
        .collect();

    let program_len = order
        .last()
        .map(|&i| bases[i] + placements[i].size as i64)
        .unwrap_or(0);

    if program_len < 0 || program_len > (u32::MAX as i64 - 1) {
        errors |= ValidationErrors::OPERAND_OUT_OF_RANGE;
    }

    let mut out = vec![0u8; program_len.max(0) as usize];
    for &si in &order {
        let section = &mut sections[si];
        let placement = &placements[si];
        let base = bases[si];
        for (ii, item) in section.items.iter().enumerate() {
            let addr = base + placement.local_offsets[ii] as i64;
            if let Item::Data(bytes) = item {
                let start = addr as usize;
                out[start..start + bytes.len()].copy_from_slice(bytes);
            } else if let Item::Code(instr, targets) = item {
                let mut buf = Vec::with_capacity(item_size(item));
                if let Err(e) = encode(&mut buf, instr, targets, addr, &absolute) {
                    errors |= e;
                    continue;
                }
                let start = addr as usize;
                out[start..start + buf.len()].copy_from_slice(&buf);
            }
        }
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

fn resolve_label(
    name: &str,
    absolute: &HashMap<String, i64>,
) -> Result<i64, ValidationErrors> {
    absolute
        .get(name)
        .copied()
        .ok_or(ValidationErrors::UNRESOLVED_LABEL)
}

fn encode(
    out: &mut Vec<u8>,
    instr: &Instruction,
    targets: &[String],
    own_addr: i64,
    absolute: &HashMap<String, i64>,
) -> Result<(), ValidationErrors> {
    out.push(instr.opcode.byte());
    match &instr.operand {
        Operand::None => {}
        Operand::Float(f) => codec::store_f32(out, *f),
        Operand::Nibbles(hi, lo) => out.push((hi << 4) | lo),
        Operand::Int(n) => encode_int(out, instr.opcode, *n)?,
        Operand::Label(name) => {
            let target = resolve_label(name, absolute)?;
            let delta = target - own_addr;
            encode_branch_delta(out, instr.opcode, delta)?;
        }
    }

    if is_table_jump(instr.opcode) {
        if targets.is_empty() {
            return Err(ValidationErrors::EMPTY_JUMP_TABLE);
        }
        let width = table_width(instr.opcode);
        let header = (targets.len() - 1) as i32;
        store_width(out, width, header)?;
        for name in targets {
            let target = resolve_label(name, absolute)?;
            let delta = target - own_addr;
            store_width(out, width, delta as i32)?;
        }
    }
    Ok(())
}

fn store_width(out: &mut Vec<u8>, width: usize, value: i32) -> Result<(), ValidationErrors> {
    match width {
        1 => {
            if !codec::fits_i8(value) {
                return Err(ValidationErrors::JUMP_TOO_FAR);
            }
            codec::store_i8(out, value);
        }
        2 => {
            if !codec::fits_i16(value) {
                return Err(ValidationErrors::LONG_JUMP_TOO_FAR);
            }
            codec::store_i16(out, value);
        }
        _ => unreachable!("jump tables only come in short and long widths"),
    }
    Ok(())
}

fn encode_int(out: &mut Vec<u8>, opcode: Opcode, n: i32) -> Result<(), ValidationErrors> {
    use Opcode::*;
    match opcode {
        BCALL | RET_I => {
            if !(0..=255).contains(&n) {
                return Err(ValidationErrors::OPERAND_OUT_OF_RANGE);
            }
            out.push(n as u8);
        }
        PUSH_8I => {
            if !codec::fits_i8(n) {
                return Err(ValidationErrors::OPERAND_OUT_OF_RANGE);
            }
            codec::store_i8(out, n);
        }
        PUSH_16I => {
            if !codec::fits_i16(n) {
                return Err(ValidationErrors::OPERAND_OUT_OF_RANGE);
            }
            codec::store_i16(out, n);
        }
        PUSH_24I => {
            if !codec::fits_i24(n) {
                return Err(ValidationErrors::OPERAND_OUT_OF_RANGE);
            }
            codec::store_i24(out, n);
        }
        PUSH_32I => codec::store_i32(out, n),
        _ => return Err(ValidationErrors::INVALID_OPERAND),
    }
    Ok(())
}

fn encode_branch_delta(out: &mut Vec<u8>, opcode: Opcode, delta: i64) -> Result<(), ValidationErrors> {
    use Opcode::*;
    match opcode {
        op if op.is_short_jump() => {
            let d = i32::try_from(delta).map_err(|_| ValidationErrors::JUMP_TOO_FAR)?;
            if !codec::fits_i8(d) {
                return Err(ValidationErrors::JUMP_TOO_FAR);
            }
            codec::store_i8(out, d);
        }
        op if op.is_long_jump() => {
            let d = i32::try_from(delta).map_err(|_| ValidationErrors::LONG_JUMP_TOO_FAR)?;
            if !codec::fits_i16(d) {
                return Err(ValidationErrors::LONG_JUMP_TOO_FAR);
            }
            codec::store_i16(out, d);
        }
        CALL => {
            let d = i32::try_from(delta).map_err(|_| ValidationErrors::JUMP_TOO_FAR)?;
            if !codec::fits_i16(d) {
                return Err(ValidationErrors::JUMP_TOO_FAR);
            }
            codec::store_i16(out, d);
        }
        LCALL => {
            let d = i32::try_from(delta).map_err(|_| ValidationErrors::LONG_JUMP_TOO_FAR)?;
            if !codec::fits_i24(d) {
                return Err(ValidationErrors::LONG_JUMP_TOO_FAR);
            }
            codec::store_i24(out, d);
        }
        _ => return Err(ValidationErrors::INVALID_OPERAND),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::parser::Parser;
    use super::super::section;
    use super::*;

    fn assemble_src(src: &str) -> Result<Vec<u8>, ValidationErrors> {
        let lines = Parser::new(src).parse().unwrap();
        let sections = section::build(lines).unwrap();
        assemble(sections)
    }

    #[test]
    fn push_add_halt_matches_expected_bytes() {
        let bytes = assemble_src(".name MAIN\n.offset 0\npush 2\npush 3\nadd_i\nhalt\n").unwrap();
        assert_eq!(bytes, vec![0x13, 0x02, 0x13, 0x03, 0x44, 0x0F]);
    }

    #[test]
    fn short_jump_resolves_forward_label() {
        let src = ".name MAIN\n.offset 0\npush 0\ncmp 0\njeq done\npush 1\nhalt\ndone:\npush 7\nhalt\n";
        let bytes = assemble_src(src).unwrap();
        // push_i0(1) cmp_i0(1) jeq(2, at offset 2) push_i1(1) halt(1) = done at offset 6
        assert_eq!(bytes[2], Opcode::JEQ.byte());
        assert_eq!(bytes[3] as i8, 4);
    }

    #[test]
    fn unresolved_label_is_reported() {
        let err = assemble_src(".name MAIN\n.offset 0\njmp nowhere\n").unwrap_err();
        assert!(err.contains(ValidationErrors::UNRESOLVED_LABEL));
    }

    #[test]
    fn duplicate_label_is_reported() {
        let src = ".name MAIN\n.offset 0\na:\nhalt\na:\nhalt\n";
        let err = assemble_src(src).unwrap_err();
        assert!(err.contains(ValidationErrors::DUPLICATE_LABEL));
    }

    #[test]
    fn jump_too_far_is_reported_for_short_jump() {
        let mut src = String::from(".name MAIN\n.offset 0\njmp far\n");
        for _ in 0..200 {
            src.push_str("nop\n");
        }
        src.push_str("far:\nhalt\n");
        let err = assemble_src(&src).unwrap_err();
        assert!(err.contains(ValidationErrors::JUMP_TOO_FAR));
    }

    #[test]
    fn long_jump_reaches_where_short_jump_cannot() {
        let mut src = String::from(".name MAIN\n.offset 0\nljmp far\n");
        for _ in 0..200 {
            src.push_str("nop\n");
        }
        src.push_str("far:\nhalt\n");
        assert!(assemble_src(&src).is_ok());
    }

    #[test]
    fn jump_table_dispatches_to_second_entry() {
        let src = "\
.name MAIN
.offset 0
push 1
jtbl
.addr a
.addr b
.addr c
a:
halt
b:
push 42
halt
c:
halt
";
        let bytes = assemble_src(src).unwrap();
        assert_eq!(bytes[1], Opcode::JTBL.byte());
    }

    #[test]
    fn empty_jump_table_is_reported() {
        let err = assemble_src(".name MAIN\n.offset 0\npush 0\njtbl\nhalt\n").unwrap_err();
        assert!(err.contains(ValidationErrors::EMPTY_JUMP_TABLE));
    }

    #[test]
    fn data_as_entry_point_is_reported() {
        let err = assemble_src(".name MAIN\n.offset 0\n.db 1 2 3\n").unwrap_err();
        assert!(err.contains(ValidationErrors::NON_EXECUTABLE_ENTRY_POINT));
    }
}
