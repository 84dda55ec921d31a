//! Structural errors accumulated by the assembler's back-end passes.
//! A single assembly run can fail several independent checks at once
//! (an unresolved label *and* an overlapping section, say); rather than
//! stopping at the first one, `asm::validate` walks every pass and
//! folds the results into one bitfield the caller can inspect in full.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ValidationErrors: u32 {
        /// A label was referenced but never defined in any section.
        const UNRESOLVED_LABEL = 1 << 0;
        /// The same label was defined more than once.
        const DUPLICATE_LABEL = 1 << 1;
        /// `.offset` appeared after a label or instruction had already
        /// been emitted into the section.
        const OFFSET_AFTER_CONTENT = 1 << 2;
        /// Two sections claim overlapping address ranges.
        const OVERLAPPING_SECTION = 1 << 3;
        /// An operand's resolved value does not fit the instruction's
        /// immediate width.
        const OPERAND_OUT_OF_RANGE = 1 << 4;
        /// An instruction required an operand that was not supplied.
        const MISSING_OPERAND = 1 << 5;
        /// An operand was present but malformed (bad literal, unknown
        /// directive argument, ...).
        const INVALID_OPERAND = 1 << 6;
        /// A short-form jump's resolved delta does not fit in 8 bits.
        const JUMP_TOO_FAR = 1 << 7;
        /// A long-form jump's resolved delta does not fit in 16 bits.
        const LONG_JUMP_TOO_FAR = 1 << 8;
        /// `jtbl`/`ljtbl` was given zero entries.
        const EMPTY_JUMP_TABLE = 1 << 9;
        /// `max_builtins`/`bcall` id fell outside `1..=256`.
        const BUILTIN_OUT_OF_RANGE = 1 << 10;
        /// A label, directive or instruction appeared before any
        /// `.name` directive had opened a section.
        const MISSING_SECTION = 1 << 11;
        /// The first byte of the first section is a data byte or a
        /// jump-table entry rather than an executable opcode.
        const NON_EXECUTABLE_ENTRY_POINT = 1 << 12;
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no errors");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_set_flags() {
        let errs = ValidationErrors::UNRESOLVED_LABEL | ValidationErrors::JUMP_TOO_FAR;
        let text = errs.to_string();
        assert!(text.contains("UNRESOLVED_LABEL"));
        assert!(text.contains("JUMP_TOO_FAR"));
    }

    #[test]
    fn empty_displays_as_no_errors() {
        assert_eq!(ValidationErrors::empty().to_string(), "no errors");
    }
}
