//! The eVM opcode table: 256 one-byte slots grouped into 16 families by
//! the high nibble. Only a subset of slots are assigned; everything else
//! is illegal.

use std::fmt;

/// The sixteen opcode families, identified by the high nibble of the
/// opcode byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Call,
    Push,
    Pop,
    Dup,
    Math,
    Bits,
    Cmp,
    Jmp,
    Ret,
}

impl Family {
    /// High nibble for this family, or `None` if the byte's high
    /// nibble does not correspond to an assigned family.
    pub fn of(opcode: u8) -> Option<Family> {
        match opcode & 0xF0 {
            0x00 => Some(Family::Call),
            0x10 => Some(Family::Push),
            0x20 => Some(Family::Pop),
            0x30 => Some(Family::Dup),
            0x40 => Some(Family::Math),
            0x50 => Some(Family::Bits),
            0xD0 => Some(Family::Cmp),
            0xE0 => Some(Family::Jmp),
            0xF0 => Some(Family::Ret),
            _ => None,
        }
    }
}

macro_rules! opcodes {
    ($($name:ident = $value:expr, $mnemonic:literal;)*) => {
        /// A single eVM opcode byte.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $value,)*
        }

        impl Opcode {
            /// Decode a raw byte into an opcode, if it is assigned.
            pub fn decode(byte: u8) -> Option<Opcode> {
                match byte {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// The raw opcode byte.
            pub fn byte(self) -> u8 {
                self as u8
            }

            /// The lower-case mnemonic used in assembly source.
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic,)*
                }
            }

            /// Look up an opcode from a case-insensitive mnemonic.
            pub fn from_mnemonic(text: &str) -> Option<Opcode> {
                $(if text.eq_ignore_ascii_case($mnemonic) { return Some(Opcode::$name); })*
                None
            }
        }
    };
}

opcodes! {
    NOP = 0x00, "nop";
    CALL = 0x01, "call";
    LCALL = 0x02, "lcall";
    BCALL = 0x03, "bcall";
    YIELD = 0x0E, "yield";
    HALT = 0x0F, "halt";

    PUSH_I0 = 0x10, "push_i0";
    PUSH_I1 = 0x11, "push_i1";
    PUSH_IN1 = 0x12, "push_in1";
    PUSH_8I = 0x13, "push_8i";
    PUSH_16I = 0x14, "push_16i";
    PUSH_24I = 0x15, "push_24i";
    PUSH_32I = 0x16, "push_32i";
    PUSH_F0 = 0x17, "push_f0";
    PUSH_F1 = 0x18, "push_f1";
    PUSH_FN1 = 0x19, "push_fn1";
    PUSH_F = 0x1A, "push_f";
    SWAP = 0x1F, "swap";

    POP_1 = 0x20, "pop_1";
    POP_2 = 0x21, "pop_2";
    POP_3 = 0x22, "pop_3";
    POP_4 = 0x23, "pop_4";
    POP_5 = 0x24, "pop_5";
    POP_6 = 0x25, "pop_6";
    POP_7 = 0x26, "pop_7";
    POP_8 = 0x27, "pop_8";
    REM_1 = 0x28, "rem_1";
    REM_2 = 0x29, "rem_2";
    REM_3 = 0x2A, "rem_3";
    REM_4 = 0x2B, "rem_4";
    REM_5 = 0x2C, "rem_5";
    REM_6 = 0x2D, "rem_6";
    REM_7 = 0x2E, "rem_7";
    REM_R = 0x2F, "rem_r";

    DUP_0 = 0x30, "dup_0";
    DUP_1 = 0x31, "dup_1";
    DUP_2 = 0x32, "dup_2";
    DUP_3 = 0x33, "dup_3";
    DUP_4 = 0x34, "dup_4";
    DUP_5 = 0x35, "dup_5";
    DUP_6 = 0x36, "dup_6";
    DUP_7 = 0x37, "dup_7";
    DUP_8 = 0x38, "dup_8";
    DUP_9 = 0x39, "dup_9";
    DUP_10 = 0x3A, "dup_10";
    DUP_11 = 0x3B, "dup_11";
    DUP_12 = 0x3C, "dup_12";
    DUP_13 = 0x3D, "dup_13";
    DUP_14 = 0x3E, "dup_14";
    DUP_15 = 0x3F, "dup_15";

    INC_I = 0x40, "inc_i";
    DEC_I = 0x41, "dec_i";
    ABS_I = 0x42, "abs_i";
    NEG_I = 0x43, "neg_i";
    ADD_I = 0x44, "add_i";
    SUB_I = 0x45, "sub_i";
    MUL_I = 0x46, "mul_i";
    DIV_I = 0x47, "div_i";
    INC_F = 0x48, "inc_f";
    DEC_F = 0x49, "dec_f";
    ABS_F = 0x4A, "abs_f";
    NEG_F = 0x4B, "neg_f";
    ADD_F = 0x4C, "add_f";
    SUB_F = 0x4D, "sub_f";
    MUL_F = 0x4E, "mul_f";
    DIV_F = 0x4F, "div_f";

    LSH = 0x50, "lsh";
    RSH = 0x51, "rsh";
    AND = 0x52, "and";
    OR = 0x53, "or";
    XOR = 0x54, "xor";
    INV = 0x55, "inv";
    BOOL = 0x56, "bool";
    NOT = 0x57, "not";
    CONV_FI = 0x58, "conv_fi";
    CONV_FI_1 = 0x59, "conv_fi_1";
    CONV_IF = 0x5A, "conv_if";
    CONV_IF_1 = 0x5B, "conv_if_1";

    CMP_I0 = 0xD0, "cmp_i0";
    CMP_I1 = 0xD1, "cmp_i1";
    CMP_IN1 = 0xD2, "cmp_in1";
    CMP_I = 0xD3, "cmp_i";
    CMP_F0 = 0xD4, "cmp_f0";
    CMP_F1 = 0xD5, "cmp_f1";
    CMP_FN1 = 0xD6, "cmp_fn1";
    CMP_F = 0xD7, "cmp_f";

    JMP = 0xE0, "jmp";
    JLT = 0xE1, "jlt";
    JLE = 0xE2, "jle";
    JNE = 0xE3, "jne";
    JEQ = 0xE4, "jeq";
    JGE = 0xE5, "jge";
    JGT = 0xE6, "jgt";
    JTBL = 0xE7, "jtbl";
    LJMP = 0xE8, "ljmp";
    LJLT = 0xE9, "ljlt";
    LJLE = 0xEA, "ljle";
    LJNE = 0xEB, "ljne";
    LJEQ = 0xEC, "ljeq";
    LJGE = 0xED, "ljge";
    LJGT = 0xEE, "ljgt";
    LJTBL = 0xEF, "ljtbl";

    RET = 0xF0, "ret";
    RET_1 = 0xF1, "ret_1";
    RET_2 = 0xF2, "ret_2";
    RET_3 = 0xF3, "ret_3";
    RET_4 = 0xF4, "ret_4";
    RET_5 = 0xF5, "ret_5";
    RET_6 = 0xF6, "ret_6";
    RET_7 = 0xF7, "ret_7";
    RET_8 = 0xF8, "ret_8";
    RET_9 = 0xF9, "ret_9";
    RET_10 = 0xFA, "ret_10";
    RET_11 = 0xFB, "ret_11";
    RET_12 = 0xFC, "ret_12";
    RET_13 = 0xFD, "ret_13";
    RET_14 = 0xFE, "ret_14";
    RET_I = 0xFF, "ret_i";
}

impl Opcode {
    /// The family this opcode belongs to.
    pub fn family(self) -> Family {
        // Every assigned opcode has an assigned family by construction.
        Family::of(self.byte()).unwrap()
    }

    /// Total encoded length of this instruction in bytes, including the
    /// opcode byte itself. Jump-table trailing entries are *not*
    /// included here since their count is data-dependent; callers must
    /// add `entries * width` separately for `JTBL`/`LJTBL`.
    pub fn instruction_len(self) -> usize {
        use Opcode::*;
        match self {
            BCALL | PUSH_8I | REM_R | RET_I | JMP | JLT | JLE | JNE | JEQ | JGE | JGT | JTBL => 2,
            CALL | PUSH_16I | LJMP | LJLT | LJLE | LJNE | LJEQ | LJGE | LJGT | LJTBL => 3,
            LCALL | PUSH_24I => 4,
            PUSH_32I | PUSH_F => 5,
            _ => 1,
        }
    }

    /// `true` for the eight short conditional/unconditional jump
    /// opcodes (`JMP`, `JLT`, ..., `JGT`), which take a signed 8-bit
    /// delta.
    pub fn is_short_jump(self) -> bool {
        use Opcode::*;
        matches!(self, JMP | JLT | JLE | JNE | JEQ | JGE | JGT)
    }

    /// `true` for the long-form jump opcodes, which take a signed
    /// 16-bit delta.
    pub fn is_long_jump(self) -> bool {
        use Opcode::*;
        matches!(self, LJMP | LJLT | LJLE | LJNE | LJEQ | LJGE | LJGT)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_match_high_nibble() {
        assert_eq!(Opcode::NOP.family(), Family::Call);
        assert_eq!(Opcode::PUSH_I0.family(), Family::Push);
        assert_eq!(Opcode::DUP_0.family(), Family::Dup);
        assert_eq!(Opcode::ADD_I.family(), Family::Math);
        assert_eq!(Opcode::LSH.family(), Family::Bits);
        assert_eq!(Opcode::CMP_I.family(), Family::Cmp);
        assert_eq!(Opcode::JMP.family(), Family::Jmp);
        assert_eq!(Opcode::RET.family(), Family::Ret);
    }

    #[test]
    fn lengths_match_immediate_width() {
        assert_eq!(Opcode::NOP.instruction_len(), 1);
        assert_eq!(Opcode::HALT.instruction_len(), 1);
        assert_eq!(Opcode::PUSH_I0.instruction_len(), 1);
        assert_eq!(Opcode::BCALL.instruction_len(), 2);
        assert_eq!(Opcode::PUSH_8I.instruction_len(), 2);
        assert_eq!(Opcode::JMP.instruction_len(), 2);
        assert_eq!(Opcode::CALL.instruction_len(), 3);
        assert_eq!(Opcode::PUSH_16I.instruction_len(), 3);
        assert_eq!(Opcode::LJMP.instruction_len(), 3);
        assert_eq!(Opcode::LCALL.instruction_len(), 4);
        assert_eq!(Opcode::PUSH_24I.instruction_len(), 4);
        assert_eq!(Opcode::PUSH_32I.instruction_len(), 5);
        assert_eq!(Opcode::PUSH_F.instruction_len(), 5);
    }

    #[test]
    fn decode_round_trips_through_mnemonic() {
        for byte in 0u16..=255 {
            if let Some(op) = Opcode::decode(byte as u8) {
                assert_eq!(Opcode::from_mnemonic(op.mnemonic()), Some(op));
                assert_eq!(op.byte(), byte as u8);
            }
        }
    }

    #[test]
    fn unassigned_slots_do_not_decode() {
        assert_eq!(Opcode::decode(0x60), None);
        assert_eq!(Opcode::decode(0xC0), None);
        assert_eq!(Opcode::decode(0x04), None);
    }
}
