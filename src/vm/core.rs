//! The stack machine itself: state, lifecycle and the dispatch loop.
//! Grounded on the original interpreter's `evmRun`, including its
//! snapshot-and-writeback shape (the dispatch loop works against a
//! local cursor and only commits `ip`/`sp`/`flags` back to `self` once
//! the op budget or a halt/yield is reached) and its per-opcode
//! semantics.

use std::fmt;

use bitflags::bitflags;

use crate::codec;
use crate::opcode::Opcode;
use crate::vm::builtin::BuiltinTable;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Flags: u32 {
        const LESS    = 1 << 0;
        const EQUAL   = 1 << 1;
        const GREATER = 1 << 2;
        const YIELD   = 1 << 3;
        const HALTED  = 1 << 4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmError {
    /// `max_stack` was zero, or a resize would drop live values.
    InvalidStackCapacity,
    /// `max_builtins` fell outside `1..=256`.
    InvalidBuiltinCapacity,
    /// `bind_builtin`'s id exceeded the table's capacity.
    BuiltinOutOfRange,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VmError::InvalidStackCapacity => write!(f, "invalid stack capacity"),
            VmError::InvalidBuiltinCapacity => write!(f, "max_builtins must be in 1..=256"),
            VmError::BuiltinOutOfRange => write!(f, "builtin id exceeds table capacity"),
        }
    }
}

impl std::error::Error for VmError {}

/// A stack-machine instance. Generic over `Env`, the typed host state
/// available to builtins — the idiomatic replacement for the original
/// interpreter's untyped `void *env`.
pub struct Vm<Env> {
    ip: u32,
    sp: u16,
    max_stack: u16,
    stack: Vec<u32>,
    program: Vec<u8>,
    flags: Flags,
    builtins: BuiltinTable<Env>,
    env: Env,
}

impl<Env> Vm<Env> {
    pub fn new(max_stack: u16, max_builtins: usize, env: Env) -> Result<Self, VmError> {
        if max_stack == 0 {
            return Err(VmError::InvalidStackCapacity);
        }
        if !(1..=256).contains(&max_builtins) {
            return Err(VmError::InvalidBuiltinCapacity);
        }
        Ok(Self {
            ip: 0,
            sp: 0,
            max_stack,
            stack: vec![0; max_stack as usize],
            program: Vec::new(),
            flags: Flags::empty(),
            builtins: BuiltinTable::new(max_builtins),
            env,
        })
    }

    /// Resize the stack. Rejected if it would truncate live values.
    pub fn set_stack_capacity(&mut self, cap: u16) -> Result<(), VmError> {
        if cap == 0 || cap < self.sp {
            return Err(VmError::InvalidStackCapacity);
        }
        self.stack.resize(cap as usize, 0);
        self.max_stack = cap;
        Ok(())
    }

    /// Install a new program. Resets `ip`, clears `HALTED`, and
    /// appends a trailing `halt` so execution always terminates even
    /// if control falls off the end, matching `evmSetProgram`.
    pub fn set_program(&mut self, bytes: &[u8]) {
        self.program = Vec::with_capacity(bytes.len() + 1);
        self.program.extend_from_slice(bytes);
        self.program.push(Opcode::HALT.byte());
        self.ip = 0;
        self.flags.remove(Flags::HALTED | Flags::YIELD);
        log::debug!("program installed ({} bytes, +halt)", self.program.len());
    }

    pub fn ip(&self) -> u32 {
        self.ip
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn has_halted(&self) -> bool {
        self.flags.contains(Flags::HALTED)
    }

    pub fn has_yielded(&self) -> bool {
        self.flags.contains(Flags::YIELD)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Env {
        &mut self.env
    }

    pub fn bind_builtin(
        &mut self,
        id: u8,
        f: impl FnMut(&mut Vm<Env>) -> i32 + 'static,
    ) -> Result<(), VmError> {
        if self.builtins.bind(id, f) {
            Ok(())
        } else {
            Err(VmError::BuiltinOutOfRange)
        }
    }

    pub fn peek_i32(&self, depth: u16) -> Option<i32> {
        self.cell(depth).map(|v| v as i32)
    }

    pub fn peek_f32(&self, depth: u16) -> Option<f32> {
        self.cell(depth).map(f32::from_bits)
    }

    fn cell(&self, depth: u16) -> Option<u32> {
        if depth < self.sp {
            Some(self.stack[(self.sp - depth - 1) as usize])
        } else {
            None
        }
    }

    pub fn push_i32(&mut self, v: i32) -> Result<(), VmError> {
        self.push_raw(v as u32);
        Ok(())
    }

    pub fn push_f32(&mut self, v: f32) -> Result<(), VmError> {
        self.push_raw(v.to_bits());
        Ok(())
    }

    pub fn pop(&mut self, n: u16) -> Result<(), VmError> {
        self.pop_n(n);
        Ok(())
    }

    fn push_raw(&mut self, raw: u32) {
        if self.sp < self.max_stack {
            self.stack[self.sp as usize] = raw;
            self.sp += 1;
        } else {
            self.stack_overflow();
        }
    }

    fn pop_n(&mut self, n: u16) {
        if n > self.sp {
            self.stack_underflow();
        } else {
            self.sp -= n;
        }
    }

    fn remove(&mut self, depth: u16, count: u16) {
        if depth + count > self.sp {
            self.stack_underflow();
        } else {
            let src = (self.sp - depth) as usize;
            let dst = (self.sp - depth - count) as usize;
            self.stack.copy_within(src..src + depth as usize, dst);
            self.sp -= count;
        }
    }

    fn dup(&mut self, depth: u16) {
        match self.cell(depth) {
            Some(v) => self.push_raw(v),
            None => self.stack_underflow(),
        }
    }

    fn top_i32(&self) -> i32 {
        self.cell(0).unwrap_or(0) as i32
    }

    fn set_top_i32(&mut self, v: i32) {
        let idx = (self.sp - 1) as usize;
        self.stack[idx] = v as u32;
    }

    fn top_f32(&self) -> f32 {
        f32::from_bits(self.cell(0).unwrap_or(0))
    }

    fn set_top_f32(&mut self, v: f32) {
        let idx = (self.sp - 1) as usize;
        self.stack[idx] = v.to_bits();
    }

    fn stack_i32(&self, depth: u16) -> i32 {
        self.cell(depth).unwrap_or(0) as i32
    }

    fn set_stack_i32(&mut self, depth: u16, v: i32) {
        let idx = (self.sp - depth - 1) as usize;
        self.stack[idx] = v as u32;
    }

    fn set_stack_f32(&mut self, depth: u16, v: f32) {
        let idx = (self.sp - depth - 1) as usize;
        self.stack[idx] = v.to_bits();
    }

    fn stack_overflow(&mut self) {
        self.flags.insert(Flags::HALTED);
        log::error!("stack overflow: sp({:04X}/{:04X}) ip({:08X})", self.sp, self.max_stack, self.ip);
    }

    fn stack_underflow(&mut self) {
        self.flags.insert(Flags::HALTED);
        log::error!("stack underflow: sp({:04X}) ip({:08X})", self.sp, self.ip);
    }

    fn illegal_instruction(&mut self) {
        let byte = self.program.get(self.ip as usize).copied().unwrap_or(0);
        self.flags.insert(Flags::HALTED);
        log::error!("illegal instruction: {:02X} @ {:08X}", byte, self.ip);
    }

    fn set_compare(&mut self, less: bool, equal: bool) {
        self.flags.remove(Flags::LESS | Flags::EQUAL | Flags::GREATER);
        if less {
            self.flags.insert(Flags::LESS);
        } else if equal {
            self.flags.insert(Flags::EQUAL);
        } else {
            self.flags.insert(Flags::GREATER);
        }
    }

    /// Run up to `max_ops` instructions, stopping early on `halt`,
    /// `yield`, or an unrecoverable error. Returns whether the program
    /// has halted.
    pub fn run(&mut self, max_ops: u32) -> bool {
        log::debug!("running for up to {max_ops} operations");
        self.flags.remove(Flags::YIELD);
        let mut ops = 0u32;
        while ops < max_ops && !self.flags.intersects(Flags::HALTED | Flags::YIELD) {
            self.step();
            ops += 1;
        }
        log::debug!("performed {ops} of {max_ops} operations");
        self.has_halted()
    }

    fn operand(&self, width: usize) -> &[u8] {
        let start = self.ip as usize + 1;
        let end = (start + width).min(self.program.len());
        &self.program[start..end]
    }

    fn step(&mut self) {
        let byte = match self.program.get(self.ip as usize) {
            Some(b) => *b,
            None => {
                self.illegal_instruction();
                return;
            }
        };
        let op = match Opcode::decode(byte) {
            Some(op) => op,
            None => {
                self.illegal_instruction();
                return;
            }
        };
        self.dispatch(op);
    }

    fn dispatch(&mut self, op: Opcode) {
        use Opcode::*;
        match op {
            NOP => self.ip += 1,
            CALL => match codec::load_i16(self.operand(2)) {
                Ok(delta) => {
                    let ret = self.ip + 3;
                    self.push_raw(ret);
                    self.ip = self.ip.wrapping_add(delta as u32);
                }
                Err(_) => self.illegal_instruction(),
            },
            LCALL => match codec::load_i24(self.operand(3)) {
                Ok(delta) => {
                    let ret = self.ip + 4;
                    self.push_raw(ret);
                    self.ip = self.ip.wrapping_add(delta as u32);
                }
                Err(_) => self.illegal_instruction(),
            },
            BCALL => {
                let id = self.program[self.ip as usize + 1];
                if (id as usize) >= self.builtins.capacity() {
                    self.illegal_instruction();
                } else {
                    self.ip += 2;
                    match self.builtins.take(id) {
                        Some(mut f) => {
                            let result = f(self);
                            self.builtins.restore(id, f);
                            self.push_raw(result as u32);
                        }
                        None => {
                            log::warn!("called unbound builtin @ {:08X}", self.ip);
                            self.push_raw(0);
                        }
                    }
                }
            }
            YIELD => {
                self.ip += 1;
                self.flags.insert(Flags::YIELD);
            }
            HALT => {
                log::info!("halting @ {:08X}", self.ip);
                self.flags.insert(Flags::HALTED);
            }

            PUSH_I0 => {
                self.ip += 1;
                self.push_raw(0);
            }
            PUSH_I1 => {
                self.ip += 1;
                self.push_raw(1);
            }
            PUSH_IN1 => {
                self.ip += 1;
                self.push_raw(-1i32 as u32);
            }
            PUSH_8I => match codec::load_i8(self.operand(1)) {
                Ok(v) => {
                    self.ip += 2;
                    self.push_raw(v as u32);
                }
                Err(_) => self.illegal_instruction(),
            },
            PUSH_16I => match codec::load_i16(self.operand(2)) {
                Ok(v) => {
                    self.ip += 3;
                    self.push_raw(v as u32);
                }
                Err(_) => self.illegal_instruction(),
            },
            PUSH_24I => match codec::load_i24(self.operand(3)) {
                Ok(v) => {
                    self.ip += 4;
                    self.push_raw(v as u32);
                }
                Err(_) => self.illegal_instruction(),
            },
            PUSH_32I => match codec::load_i32(self.operand(4)) {
                Ok(v) => {
                    self.ip += 5;
                    self.push_raw(v as u32);
                }
                Err(_) => self.illegal_instruction(),
            },
            PUSH_F0 => {
                self.ip += 1;
                self.push_raw(0.0f32.to_bits());
            }
            PUSH_F1 => {
                self.ip += 1;
                self.push_raw(1.0f32.to_bits());
            }
            PUSH_FN1 => {
                self.ip += 1;
                self.push_raw((-1.0f32).to_bits());
            }
            PUSH_F => match codec::load_f32(self.operand(4)) {
                Ok(v) => {
                    self.ip += 5;
                    self.push_raw(v.to_bits());
                }
                Err(_) => self.illegal_instruction(),
            },
            SWAP => {
                self.ip += 1;
                if self.sp < 2 {
                    self.stack_underflow();
                } else {
                    self.stack.swap((self.sp - 1) as usize, (self.sp - 2) as usize);
                }
            }

            POP_1 => { self.ip += 1; self.pop_n(1); }
            POP_2 => { self.ip += 1; self.pop_n(2); }
            POP_3 => { self.ip += 1; self.pop_n(3); }
            POP_4 => { self.ip += 1; self.pop_n(4); }
            POP_5 => { self.ip += 1; self.pop_n(5); }
            POP_6 => { self.ip += 1; self.pop_n(6); }
            POP_7 => { self.ip += 1; self.pop_n(7); }
            POP_8 => { self.ip += 1; self.pop_n(8); }
            REM_1 => { self.ip += 1; self.remove(1, 1); }
            REM_2 => { self.ip += 1; self.remove(2, 1); }
            REM_3 => { self.ip += 1; self.remove(3, 1); }
            REM_4 => { self.ip += 1; self.remove(4, 1); }
            REM_5 => { self.ip += 1; self.remove(5, 1); }
            REM_6 => { self.ip += 1; self.remove(6, 1); }
            REM_7 => { self.ip += 1; self.remove(7, 1); }
            REM_R => {
                let nibble = self.program[self.ip as usize + 1];
                self.ip += 2;
                let depth = ((nibble >> 4) + 1) as u16;
                let count = ((nibble & 0x0F) + 1) as u16;
                self.remove(depth, count);
            }

            DUP_0 => { self.ip += 1; self.dup(0); }
            DUP_1 => { self.ip += 1; self.dup(1); }
            DUP_2 => { self.ip += 1; self.dup(2); }
            DUP_3 => { self.ip += 1; self.dup(3); }
            DUP_4 => { self.ip += 1; self.dup(4); }
            DUP_5 => { self.ip += 1; self.dup(5); }
            DUP_6 => { self.ip += 1; self.dup(6); }
            DUP_7 => { self.ip += 1; self.dup(7); }
            DUP_8 => { self.ip += 1; self.dup(8); }
            DUP_9 => { self.ip += 1; self.dup(9); }
            DUP_10 => { self.ip += 1; self.dup(10); }
            DUP_11 => { self.ip += 1; self.dup(11); }
            DUP_12 => { self.ip += 1; self.dup(12); }
            DUP_13 => { self.ip += 1; self.dup(13); }
            DUP_14 => { self.ip += 1; self.dup(14); }
            DUP_15 => { self.ip += 1; self.dup(15); }

            INC_I => { self.ip += 1; self.unary_i(|v| v.wrapping_add(1)); }
            DEC_I => { self.ip += 1; self.unary_i(|v| v.wrapping_sub(1)); }
            ABS_I => { self.ip += 1; self.unary_i(i32::wrapping_abs); }
            NEG_I => { self.ip += 1; self.unary_i(i32::wrapping_neg); }
            ADD_I => { self.ip += 1; self.bin_i(i32::wrapping_add); }
            SUB_I => { self.ip += 1; self.bin_i(i32::wrapping_sub); }
            MUL_I => { self.ip += 1; self.bin_i(i32::wrapping_mul); }
            DIV_I => { self.ip += 1; self.bin_i_checked(|a, b| a.checked_div(b)); }

            INC_F => { self.ip += 1; self.unary_f(|v| v + 1.0); }
            DEC_F => { self.ip += 1; self.unary_f(|v| v - 1.0); }
            ABS_F => { self.ip += 1; self.unary_f(f32::abs); }
            NEG_F => { self.ip += 1; self.unary_f(|v| -v); }
            ADD_F => { self.ip += 1; self.bin_f(|a, b| a + b); }
            SUB_F => { self.ip += 1; self.bin_f(|a, b| a - b); }
            MUL_F => { self.ip += 1; self.bin_f(|a, b| a * b); }
            DIV_F => { self.ip += 1; self.bin_f(|a, b| a / b); }

            LSH => { self.ip += 1; self.bin_i(|a, b| ((a as u32) << (b & 31)) as i32); }
            RSH => { self.ip += 1; self.bin_i(|a, b| a >> (b & 31)); }
            AND => { self.ip += 1; self.bin_i(|a, b| a & b); }
            OR => { self.ip += 1; self.bin_i(|a, b| a | b); }
            XOR => { self.ip += 1; self.bin_i(|a, b| a ^ b); }
            INV => { self.ip += 1; self.unary_i(|v| !v); }
            BOOL => { self.ip += 1; self.unary_i(|v| (v != 0) as i32); }
            NOT => { self.ip += 1; self.unary_i(|v| (v == 0) as i32); }
            CONV_FI => {
                self.ip += 1;
                if self.sp == 0 { self.stack_underflow(); } else { self.set_top_i32(self.top_f32() as i32); }
            }
            CONV_FI_1 => {
                self.ip += 1;
                if self.sp < 2 { self.stack_underflow(); } else {
                    let v = f32::from_bits(self.stack_i32(1) as u32) as i32;
                    self.set_stack_i32(1, v);
                }
            }
            CONV_IF => {
                self.ip += 1;
                if self.sp == 0 { self.stack_underflow(); } else { self.set_top_f32(self.top_i32() as f32); }
            }
            CONV_IF_1 => {
                self.ip += 1;
                if self.sp < 2 { self.stack_underflow(); } else {
                    let v = self.stack_i32(1) as f32;
                    self.set_stack_f32(1, v);
                }
            }

            CMP_I0 => { self.ip += 1; self.cmp_i(0); }
            CMP_I1 => { self.ip += 1; self.cmp_i(1); }
            CMP_IN1 => { self.ip += 1; self.cmp_i(-1); }
            CMP_I => {
                self.ip += 1;
                if self.sp < 2 { self.stack_underflow(); } else {
                    let (lhs, rhs) = (self.top_i32(), self.stack_i32(1));
                    self.set_compare(lhs < rhs, lhs == rhs);
                }
            }
            CMP_F0 => { self.ip += 1; self.cmp_f(0.0); }
            CMP_F1 => { self.ip += 1; self.cmp_f(1.0); }
            CMP_FN1 => { self.ip += 1; self.cmp_f(-1.0); }
            CMP_F => {
                self.ip += 1;
                if self.sp < 2 { self.stack_underflow(); } else {
                    let lhs = self.top_f32();
                    let rhs = f32::from_bits(self.stack_i32(1) as u32);
                    self.set_compare(lhs < rhs, lhs == rhs);
                }
            }

            JMP => self.short_jump(true),
            JLT => { let t = self.flags.contains(Flags::LESS); self.short_jump(t); }
            JLE => { let t = self.flags.intersects(Flags::LESS | Flags::EQUAL); self.short_jump(t); }
            JNE => { let t = self.flags.intersects(Flags::LESS | Flags::GREATER); self.short_jump(t); }
            JEQ => { let t = self.flags.contains(Flags::EQUAL); self.short_jump(t); }
            JGE => { let t = self.flags.intersects(Flags::GREATER | Flags::EQUAL); self.short_jump(t); }
            JGT => { let t = self.flags.contains(Flags::GREATER); self.short_jump(t); }
            LJMP => self.long_jump(true),
            LJLT => { let t = self.flags.contains(Flags::LESS); self.long_jump(t); }
            LJLE => { let t = self.flags.intersects(Flags::LESS | Flags::EQUAL); self.long_jump(t); }
            LJNE => { let t = self.flags.intersects(Flags::LESS | Flags::GREATER); self.long_jump(t); }
            LJEQ => { let t = self.flags.contains(Flags::EQUAL); self.long_jump(t); }
            LJGE => { let t = self.flags.intersects(Flags::GREATER | Flags::EQUAL); self.long_jump(t); }
            LJGT => { let t = self.flags.contains(Flags::GREATER); self.long_jump(t); }

            JTBL => {
                if self.sp == 0 {
                    self.stack_underflow();
                } else {
                    let index = self.top_i32();
                    let entry_off = self.ip as i64 + 2 + index as i64;
                    match usize::try_from(entry_off).ok().and_then(|o| self.program.get(o..o + 1)) {
                        Some(bytes) => {
                            let delta = codec::load_i8(bytes).unwrap();
                            self.ip = self.ip.wrapping_add(delta as u32);
                        }
                        None => self.illegal_instruction(),
                    }
                }
            }
            LJTBL => {
                if self.sp == 0 {
                    self.stack_underflow();
                } else {
                    let index = self.top_i32();
                    let entry_off = self.ip as i64 + 3 + (index as i64) * 2;
                    match usize::try_from(entry_off).ok().and_then(|o| self.program.get(o..o + 2)) {
                        Some(bytes) => {
                            let delta = codec::load_i16(bytes).unwrap();
                            self.ip = self.ip.wrapping_add(delta as u32);
                        }
                        None => self.illegal_instruction(),
                    }
                }
            }

            RET => {
                if self.sp == 0 {
                    self.stack_underflow();
                } else {
                    self.ip = self.top_i32() as u32;
                    self.sp -= 1;
                }
            }
            RET_1 => self.ret_n(1),
            RET_2 => self.ret_n(2),
            RET_3 => self.ret_n(3),
            RET_4 => self.ret_n(4),
            RET_5 => self.ret_n(5),
            RET_6 => self.ret_n(6),
            RET_7 => self.ret_n(7),
            RET_8 => self.ret_n(8),
            RET_9 => self.ret_n(9),
            RET_10 => self.ret_n(10),
            RET_11 => self.ret_n(11),
            RET_12 => self.ret_n(12),
            RET_13 => self.ret_n(13),
            RET_14 => self.ret_n(14),
            RET_I => {
                let depth = self.program[self.ip as usize + 1] as u16;
                self.ret_n(depth);
            }
        }
    }

    fn short_jump(&mut self, taken: bool) {
        if taken {
            match codec::load_i8(self.operand(1)) {
                Ok(delta) => self.ip = self.ip.wrapping_add(delta as u32),
                Err(_) => self.illegal_instruction(),
            }
        } else {
            self.ip += 2;
        }
    }

    fn long_jump(&mut self, taken: bool) {
        if taken {
            match codec::load_i16(self.operand(2)) {
                Ok(delta) => self.ip = self.ip.wrapping_add(delta as u32),
                Err(_) => self.illegal_instruction(),
            }
        } else {
            self.ip += 3;
        }
    }

    fn ret_n(&mut self, depth: u16) {
        if depth >= self.sp {
            self.stack_underflow();
        } else {
            self.ip = self.stack_i32(depth) as u32;
            self.remove(depth, 1);
        }
    }

    fn unary_i(&mut self, f: impl Fn(i32) -> i32) {
        if self.sp == 0 {
            self.stack_underflow();
        } else {
            self.set_top_i32(f(self.top_i32()));
        }
    }

    fn unary_f(&mut self, f: impl Fn(f32) -> f32) {
        if self.sp == 0 {
            self.stack_underflow();
        } else {
            self.set_top_f32(f(self.top_f32()));
        }
    }

    fn bin_i(&mut self, f: impl Fn(i32, i32) -> i32) {
        if self.sp < 2 {
            self.stack_underflow();
        } else {
            let (top, second) = (self.top_i32(), self.stack_i32(1));
            self.set_stack_i32(1, f(top, second));
            self.sp -= 1;
        }
    }

    fn bin_i_checked(&mut self, f: impl Fn(i32, i32) -> Option<i32>) {
        if self.sp < 2 {
            self.stack_underflow();
        } else {
            let (top, second) = (self.top_i32(), self.stack_i32(1));
            match f(top, second) {
                Some(v) => {
                    self.set_stack_i32(1, v);
                    self.sp -= 1;
                }
                None => self.illegal_instruction(),
            }
        }
    }

    fn bin_f(&mut self, f: impl Fn(f32, f32) -> f32) {
        if self.sp < 2 {
            self.stack_underflow();
        } else {
            let top = self.top_f32();
            let second = f32::from_bits(self.stack_i32(1) as u32);
            self.set_stack_f32(1, f(top, second));
            self.sp -= 1;
        }
    }

    fn cmp_i(&mut self, against: i32) {
        if self.sp == 0 {
            self.stack_underflow();
        } else {
            let v = self.top_i32();
            self.set_compare(v < against, v == against);
        }
    }

    fn cmp_f(&mut self, against: f32) {
        if self.sp == 0 {
            self.stack_underflow();
        } else {
            let v = self.top_f32();
            self.set_compare(v < against, v == against);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm() -> Vm<()> {
        Vm::new(64, 4, ()).unwrap()
    }

    #[test]
    fn push_and_add() {
        let mut m = vm();
        m.set_program(&[
            Opcode::PUSH_I1.byte(),
            Opcode::PUSH_I1.byte(),
            Opcode::ADD_I.byte(),
            Opcode::HALT.byte(),
        ]);
        assert!(m.run(100));
        assert_eq!(m.peek_i32(0), Some(2));
    }

    #[test]
    fn division_by_zero_is_illegal_instruction() {
        let mut m = vm();
        m.set_program(&[
            Opcode::PUSH_I0.byte(),
            Opcode::PUSH_I1.byte(),
            Opcode::DIV_I.byte(),
        ]);
        assert!(m.run(100));
        assert!(m.has_halted());
    }

    #[test]
    fn underflow_halts_vm() {
        let mut m = vm();
        m.set_program(&[Opcode::ADD_I.byte()]);
        assert!(m.run(10));
        assert!(m.has_halted());
    }

    #[test]
    fn relative_jump_skips_instruction() {
        let mut m = vm();
        // jmp +3 (over the push_i1), push_i0, halt
        m.set_program(&[
            Opcode::JMP.byte(), 3,
            Opcode::PUSH_I1.byte(),
            Opcode::PUSH_I0.byte(),
            Opcode::HALT.byte(),
        ]);
        assert!(m.run(100));
        assert_eq!(m.peek_i32(0), Some(0));
    }

    #[test]
    fn yield_suspends_without_halting() {
        let mut m = vm();
        m.set_program(&[Opcode::YIELD.byte(), Opcode::PUSH_I1.byte(), Opcode::HALT.byte()]);
        assert!(!m.run(100));
        assert!(m.has_yielded());
        assert!(!m.has_halted());
        assert!(m.run(100));
        assert_eq!(m.peek_i32(0), Some(1));
    }

    #[test]
    fn bcall_dispatches_bound_builtin() {
        let mut m = Vm::new(64, 4, 0i32).unwrap();
        m.bind_builtin(0, |vm| {
            *vm.env_mut() += 1;
            7
        })
        .unwrap();
        m.set_program(&[Opcode::BCALL.byte(), 0, Opcode::HALT.byte()]);
        assert!(m.run(100));
        assert_eq!(m.peek_i32(0), Some(7));
        assert_eq!(*m.env(), 1);
    }
}
