//! `stackvm`: an assembler, disassembler and interpreter for eVM, a
//! small stack-oriented bytecode format.
//!
//! - [`opcode`] defines the instruction set: the 256-slot opcode space,
//!   its sixteen families and each opcode's immediate width.
//! - [`codec`] reads and writes the little-endian integer and float
//!   encodings instructions embed as operands.
//! - [`asm`] is the assembler: lexer, parser, section builder and the
//!   label-resolution/encoding back-end.
//! - [`disasm`] is the disassembler: linear decode, label
//!   reconstruction and a textual printer that round-trips through
//!   [`asm::assemble`].
//! - [`vm`] is the interpreter: stack machine state and dispatch loop.
//! - [`error`] holds the back-end's accumulated validation errors.

/// Functionality for working with eVM programs in assembly form:
/// lexing, parsing, section layout and label resolution.
pub mod asm;
/// Little-endian operand encoding shared by the assembler, the
/// disassembler and the interpreter.
pub mod codec;
/// The disassembler: linear decode, label reconstruction and a
/// textual printer.
pub mod disasm;
/// Errors accumulated by the assembler's back-end passes.
pub mod error;
/// Logging setup for the `stackvm` CLI.
pub mod logging;
/// The eVM instruction set: opcodes, families and immediate widths.
pub mod opcode;
/// Byte-level helpers shared across the assembler, disassembler and
/// CLI.
pub mod util;
/// The eVM interpreter: stack machine state and dispatch loop.
pub mod vm;
