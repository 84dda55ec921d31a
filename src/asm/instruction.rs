//! Instruction records produced by the front-end, and the mnemonic →
//! opcode/operand selection rules a human writes against (`push`,
//! `pop`, `ret`, ...) layered on top of the one-opcode-per-mnemonic
//! names the disassembler prints back out (`push_8i`, `ret_3`, ...).
//! Both forms are accepted so a disassembled listing reassembles
//! unchanged.

use super::ParseError;
use crate::codec;
use crate::opcode::Opcode;

/// An instruction's operand, in whichever form the front-end could
/// resolve it to. Branch/call targets stay as a label name until the
/// back-end's resolution pass looks them up.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    None,
    Int(i32),
    Float(f32),
    Nibbles(u8, u8),
    Label(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    /// Total encoded length, including any table-header byte but
    /// excluding jump-table entries supplied by later `.addr`
    /// directives.
    pub fn size(&self) -> usize {
        self.opcode.instruction_len()
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self.operand, Operand::Label(_))
    }
}

/// What kind of operand a directly-nameable opcode (one with a 1:1
/// mnemonic, e.g. `jmp`, `bcall`, `add_i`) expects.
enum Kind {
    None,
    Int,
    Float,
    Nibbles,
    ShortLabel,
    LongLabel,
    FarLabel,
}

fn kind_of(op: Opcode) -> Kind {
    use Opcode::*;
    match op {
        BCALL | PUSH_8I | PUSH_16I | PUSH_24I | PUSH_32I | RET_I => Kind::Int,
        PUSH_F => Kind::Float,
        REM_R => Kind::Nibbles,
        CALL => Kind::ShortLabel,
        LCALL => Kind::FarLabel,
        JMP | JLT | JLE | JNE | JEQ | JGE | JGT => Kind::ShortLabel,
        LJMP | LJLT | LJLE | LJNE | LJEQ | LJGE | LJGT => Kind::LongLabel,
        _ => Kind::None,
    }
}

fn parse_int(text: &str) -> Result<i32, ParseError> {
    text.parse::<i32>()
        .map_err(|_| ParseError::InvalidOperand(text.to_string()))
}

fn parse_float(text: &str) -> Result<f32, ParseError> {
    text.parse::<f32>()
        .map_err(|_| ParseError::InvalidOperand(text.to_string()))
}

/// Resolve a mnemonic and its raw operand tokens into an opcode and
/// operand. Tries the human-friendly abstraction mnemonics first
/// (`push`, `pop`, ...), then falls back to a direct, 1:1 opcode
/// mnemonic lookup.
pub fn resolve(mnemonic: &str, args: &[&str]) -> Result<Instruction, ParseError> {
    if let Some(result) = resolve_abstract(mnemonic, args) {
        return result;
    }
    let opcode = Opcode::from_mnemonic(mnemonic)
        .ok_or_else(|| ParseError::UnknownMnemonic(mnemonic.to_string()))?;
    let operand = match kind_of(opcode) {
        Kind::None => Operand::None,
        Kind::Int => Operand::Int(parse_int(one(args)?)?),
        Kind::Float => Operand::Float(parse_float(one(args)?)?),
        Kind::Nibbles => {
            let (hi, lo) = two(args)?;
            let hi = parse_int(hi)?;
            let lo = parse_int(lo)?;
            if !(0..=15).contains(&hi) || !(0..=15).contains(&lo) {
                return Err(ParseError::OperandOutOfRange);
            }
            Operand::Nibbles(hi as u8, lo as u8)
        }
        Kind::ShortLabel | Kind::LongLabel | Kind::FarLabel => Operand::Label(one(args)?.to_string()),
    };
    Ok(Instruction { opcode, operand })
}

fn one<'a>(args: &[&'a str]) -> Result<&'a str, ParseError> {
    match args {
        [a] => Ok(a),
        [] => Err(ParseError::ExpectedOperand),
        _ => Err(ParseError::UnexpectedOperand),
    }
}

fn two<'a>(args: &[&'a str]) -> Result<(&'a str, &'a str), ParseError> {
    match args {
        [a, b] => Ok((a, b)),
        [] | [_] => Err(ParseError::ExpectedOperand),
        _ => Err(ParseError::UnexpectedOperand),
    }
}

fn resolve_abstract(mnemonic: &str, args: &[&str]) -> Option<Result<Instruction, ParseError>> {
    let lower = mnemonic.to_ascii_lowercase();
    match lower.as_str() {
        "push" => Some(resolve_push(args)),
        "pushf" => Some(resolve_pushf(args)),
        "pop" => Some(resolve_pop(args)),
        "dup" => Some(resolve_dup(args)),
        "ret" => Some(resolve_ret(args)),
        "rem" => Some(resolve_rem(args)),
        "cmp" => Some(resolve_cmp(args)),
        "cmpf" => Some(resolve_cmpf(args)),
        "cnvfi" => Some(resolve_cnv(args, Opcode::CONV_FI, Opcode::CONV_FI_1)),
        "cnvif" => Some(resolve_cnv(args, Opcode::CONV_IF, Opcode::CONV_IF_1)),
        _ => None,
    }
}

fn resolve_push(args: &[&str]) -> Result<Instruction, ParseError> {
    let n = parse_int(one(args)?)?;
    let opcode = match n {
        0 => Opcode::PUSH_I0,
        1 => Opcode::PUSH_I1,
        -1 => Opcode::PUSH_IN1,
        _ if codec::fits_i8(n) => Opcode::PUSH_8I,
        _ if codec::fits_i16(n) => Opcode::PUSH_16I,
        _ if codec::fits_i24(n) => Opcode::PUSH_24I,
        _ => Opcode::PUSH_32I,
    };
    let operand = if matches!(opcode, Opcode::PUSH_I0 | Opcode::PUSH_I1 | Opcode::PUSH_IN1) {
        Operand::None
    } else {
        Operand::Int(n)
    };
    Ok(Instruction { opcode, operand })
}

fn resolve_pushf(args: &[&str]) -> Result<Instruction, ParseError> {
    let f = parse_float(one(args)?)?;
    let opcode = if f.to_bits() == 0.0f32.to_bits() {
        Opcode::PUSH_F0
    } else if f.to_bits() == 1.0f32.to_bits() {
        Opcode::PUSH_F1
    } else if f.to_bits() == (-1.0f32).to_bits() {
        Opcode::PUSH_FN1
    } else {
        Opcode::PUSH_F
    };
    let operand = if opcode == Opcode::PUSH_F { Operand::Float(f) } else { Operand::None };
    Ok(Instruction { opcode, operand })
}

fn resolve_pop(args: &[&str]) -> Result<Instruction, ParseError> {
    let k = parse_int(one(args)?)?;
    if !(1..=8).contains(&k) {
        return Err(ParseError::OperandOutOfRange);
    }
    let opcode = Opcode::decode(Opcode::POP_1.byte() + (k - 1) as u8).unwrap();
    Ok(Instruction { opcode, operand: Operand::None })
}

fn resolve_dup(args: &[&str]) -> Result<Instruction, ParseError> {
    let k = parse_int(one(args)?)?;
    if !(1..=16).contains(&k) {
        return Err(ParseError::OperandOutOfRange);
    }
    let opcode = Opcode::decode(Opcode::DUP_0.byte() + (k - 1) as u8).unwrap();
    Ok(Instruction { opcode, operand: Operand::None })
}

fn resolve_ret(args: &[&str]) -> Result<Instruction, ParseError> {
    let k = parse_int(one(args)?)?;
    if !(0..=255).contains(&k) {
        return Err(ParseError::OperandOutOfRange);
    }
    if k < 15 {
        let opcode = Opcode::decode(Opcode::RET.byte() + k as u8).unwrap();
        Ok(Instruction { opcode, operand: Operand::None })
    } else {
        Ok(Instruction { opcode: Opcode::RET_I, operand: Operand::Int(k) })
    }
}

fn resolve_rem(args: &[&str]) -> Result<Instruction, ParseError> {
    match args {
        [d, c] => {
            let depth = parse_int(d)?;
            let count = parse_int(c)?;
            if !(1..=16).contains(&depth) || !(1..=16).contains(&count) {
                return Err(ParseError::OperandOutOfRange);
            }
            if count == 1 && depth <= 7 {
                let opcode = Opcode::decode(Opcode::REM_1.byte() + (depth - 1) as u8).unwrap();
                Ok(Instruction { opcode, operand: Operand::None })
            } else {
                Ok(Instruction {
                    opcode: Opcode::REM_R,
                    operand: Operand::Nibbles((depth - 1) as u8, (count - 1) as u8),
                })
            }
        }
        [] | [_] => Err(ParseError::ExpectedOperand),
        _ => Err(ParseError::UnexpectedOperand),
    }
}

fn resolve_cmp(args: &[&str]) -> Result<Instruction, ParseError> {
    match args {
        [] => Ok(Instruction { opcode: Opcode::CMP_I, operand: Operand::None }),
        [n] => {
            let v = parse_int(n)?;
            let opcode = match v {
                0 => Opcode::CMP_I0,
                1 => Opcode::CMP_I1,
                -1 => Opcode::CMP_IN1,
                _ => return Err(ParseError::OperandOutOfRange),
            };
            Ok(Instruction { opcode, operand: Operand::None })
        }
        _ => Err(ParseError::UnexpectedOperand),
    }
}

fn resolve_cmpf(args: &[&str]) -> Result<Instruction, ParseError> {
    match args {
        [] => Ok(Instruction { opcode: Opcode::CMP_F, operand: Operand::None }),
        [n] => {
            let v = parse_float(n)?;
            let opcode = if v.to_bits() == 0.0f32.to_bits() {
                Opcode::CMP_F0
            } else if v.to_bits() == 1.0f32.to_bits() {
                Opcode::CMP_F1
            } else if v.to_bits() == (-1.0f32).to_bits() {
                Opcode::CMP_FN1
            } else {
                return Err(ParseError::OperandOutOfRange);
            };
            Ok(Instruction { opcode, operand: Operand::None })
        }
        _ => Err(ParseError::UnexpectedOperand),
    }
}

fn resolve_cnv(args: &[&str], base: Opcode, alt: Opcode) -> Result<Instruction, ParseError> {
    let k = parse_int(one(args)?)?;
    let opcode = match k {
        0 => base,
        1 => alt,
        _ => return Err(ParseError::OperandOutOfRange),
    };
    Ok(Instruction { opcode, operand: Operand::None })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_picks_minimal_width() {
        assert_eq!(resolve("push", &["0"]).unwrap().opcode, Opcode::PUSH_I0);
        assert_eq!(resolve("push", &["1"]).unwrap().opcode, Opcode::PUSH_I1);
        assert_eq!(resolve("push", &["-1"]).unwrap().opcode, Opcode::PUSH_IN1);
        assert_eq!(resolve("push", &["2"]).unwrap().opcode, Opcode::PUSH_8I);
        assert_eq!(resolve("push", &["200"]).unwrap().opcode, Opcode::PUSH_16I);
        assert_eq!(resolve("push", &["100000"]).unwrap().opcode, Opcode::PUSH_24I);
        assert_eq!(resolve("push", &["100000000"]).unwrap().opcode, Opcode::PUSH_32I);
    }

    #[test]
    fn pop_k_maps_to_pop_family() {
        assert_eq!(resolve("pop", &["1"]).unwrap().opcode, Opcode::POP_1);
        assert_eq!(resolve("pop", &["8"]).unwrap().opcode, Opcode::POP_8);
        assert!(resolve("pop", &["9"]).is_err());
    }

    #[test]
    fn ret_switches_to_ret_i_past_14() {
        assert_eq!(resolve("ret", &["0"]).unwrap().opcode, Opcode::RET);
        assert_eq!(resolve("ret", &["14"]).unwrap().opcode, Opcode::RET_14);
        assert_eq!(resolve("ret", &["15"]).unwrap().opcode, Opcode::RET_I);
    }

    #[test]
    fn rem_packs_nibbles_when_needed() {
        let i = resolve("rem", &["1", "1"]).unwrap();
        assert_eq!(i.opcode, Opcode::REM_1);
        let i = resolve("rem", &["10", "2"]).unwrap();
        assert_eq!(i.opcode, Opcode::REM_R);
        assert_eq!(i.operand, Operand::Nibbles(9, 1));
    }

    #[test]
    fn direct_opcode_mnemonics_round_trip() {
        assert_eq!(resolve("jmp", &["x"]).unwrap().opcode, Opcode::JMP);
        assert_eq!(resolve("add_i", &[]).unwrap().opcode, Opcode::ADD_I);
        assert_eq!(resolve("push_8i", &["5"]).unwrap().opcode, Opcode::PUSH_8I);
    }

    #[test]
    fn direct_rem_r_mnemonic_accepts_its_nibble_pair() {
        let i = resolve("rem_r", &["9", "1"]).unwrap();
        assert_eq!(i.opcode, Opcode::REM_R);
        assert_eq!(i.operand, Operand::Nibbles(9, 1));
    }
}
