//! The assembler: a front-end that lexes and parses eVM assembly
//! source into instruction records, and a back-end that resolves
//! labels and encodes those records into a flat bytecode buffer.

pub mod instruction;
pub mod lexer;
pub mod parser;
pub mod section;
pub mod validate;

pub use instruction::{Instruction, Operand};
pub use parser::ParseError;

use std::fmt;

use crate::error::ValidationErrors;

/// Either stage of assembly can fail; `assemble` folds both into one
/// error type so callers don't need to match on two.
#[derive(Debug)]
pub enum AsmError {
    Parse { line: usize, error: ParseError },
    Validate(ValidationErrors),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AsmError::Parse { line, error } => write!(f, "line {line}: {error}"),
            AsmError::Validate(errors) => write!(f, "{errors}"),
        }
    }
}

impl std::error::Error for AsmError {}

/// Assemble a complete source file into its bytecode image.
pub fn assemble(source: &str) -> Result<Vec<u8>, AsmError> {
    let lines = parser::Parser::new(source)
        .parse()
        .map_err(|(line, error)| AsmError::Parse { line, error })?;
    let sections = section::build(lines).map_err(AsmError::Validate)?;
    validate::assemble(sections).map_err(AsmError::Validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_push_add_halt() {
        let bytes = assemble(".name MAIN\n.offset 0\npush 2\npush 3\nadd_i\nhalt\n").unwrap();
        assert_eq!(bytes, vec![0x13, 0x02, 0x13, 0x03, 0x44, 0x0F]);
    }

    #[test]
    fn reports_parse_errors_with_line_numbers() {
        let err = assemble(".name MAIN\n.offset 0\nbogus_mnemonic\n").unwrap_err();
        match err {
            AsmError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
