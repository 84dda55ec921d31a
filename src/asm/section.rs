//! Grouping parsed lines into named, based sections — the first of
//! the back-end's passes. Everything after this point (label
//! resolution, sorting, encoding) operates on [`Section`]s rather than
//! the flat line list the parser produced.

use crate::error::ValidationErrors;

use super::instruction::Instruction;
use super::parser::{Line, Statement};

/// One item placed into a section, in source order.
#[derive(Debug)]
pub enum Item {
    Label(String),
    /// An instruction, plus any `.addr` jump-table targets collected
    /// for it (non-empty only for `jtbl`/`ljtbl`).
    Code(Instruction, Vec<String>),
    Data(Vec<u8>),
}

pub struct Section {
    pub name: String,
    pub base: Option<i64>,
    pub items: Vec<Item>,
}

impl Section {
    fn new(name: String) -> Self {
        Self { name, base: None, items: Vec::new() }
    }
}

fn opcode_takes_table(instr: &Instruction) -> bool {
    use crate::opcode::Opcode;
    matches!(instr.opcode, Opcode::JTBL | Opcode::LJTBL)
}

/// Partition the flat statement list into sections, checking that
/// every `.offset` comes before any content and every label/
/// instruction/data item comes after some `.name`.
pub fn build(lines: Vec<Line>) -> Result<Vec<Section>, ValidationErrors> {
    let mut sections: Vec<Section> = Vec::new();
    let mut errors = ValidationErrors::empty();
    let mut awaiting_table: bool = false;

    for Line { statement, .. } in lines {
        match statement {
            Statement::Section(name) => {
                sections.push(Section::new(name));
                awaiting_table = false;
            }
            Statement::Offset(value) => match sections.last_mut() {
                Some(section) if section.items.is_empty() => section.base = Some(value),
                Some(_) => errors |= ValidationErrors::OFFSET_AFTER_CONTENT,
                None => errors |= ValidationErrors::MISSING_SECTION,
            },
            Statement::Label(name) => match sections.last_mut() {
                Some(section) => {
                    section.items.push(Item::Label(name));
                    awaiting_table = false;
                }
                None => errors |= ValidationErrors::MISSING_SECTION,
            },
            Statement::Data(bytes) => match sections.last_mut() {
                Some(section) => {
                    section.items.push(Item::Data(bytes));
                    awaiting_table = false;
                }
                None => errors |= ValidationErrors::MISSING_SECTION,
            },
            Statement::Instruction(instr) => match sections.last_mut() {
                Some(section) => {
                    awaiting_table = opcode_takes_table(&instr);
                    section.items.push(Item::Code(instr, Vec::new()));
                }
                None => errors |= ValidationErrors::MISSING_SECTION,
            },
            Statement::Addr(label) => match sections.last_mut() {
                Some(section) if awaiting_table => {
                    if let Some(Item::Code(_, targets)) = section.items.last_mut() {
                        targets.push(label);
                    }
                }
                Some(_) => errors |= ValidationErrors::INVALID_OPERAND,
                None => errors |= ValidationErrors::MISSING_SECTION,
            },
        }
    }

    if errors.is_empty() {
        Ok(sections)
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::parser::Parser;

    fn lines(src: &str) -> Vec<Line> {
        Parser::new(src).parse().unwrap()
    }

    #[test]
    fn groups_content_under_name() {
        let sections = build(lines(".name MAIN\n.offset 0\npush 1\nhalt\n")).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, "MAIN");
        assert_eq!(sections[0].base, Some(0));
        assert_eq!(sections[0].items.len(), 2);
    }

    #[test]
    fn offset_after_content_is_an_error() {
        let err = build(lines(".name MAIN\npush 1\n.offset 4\n")).unwrap_err();
        assert!(err.contains(ValidationErrors::OFFSET_AFTER_CONTENT));
    }

    #[test]
    fn content_before_any_section_is_an_error() {
        let err = build(lines("push 1\n")).unwrap_err();
        assert!(err.contains(ValidationErrors::MISSING_SECTION));
    }

    #[test]
    fn addr_attaches_to_the_preceding_jump_table() {
        let sections = build(lines(
            ".name MAIN\n.offset 0\npush 0\njtbl\n.addr a\n.addr b\na:\nhalt\nb:\nhalt\n",
        ))
        .unwrap();
        let jtbl = &sections[0].items[1];
        if let Item::Code(_, targets) = jtbl {
            assert_eq!(targets, &vec!["a".to_string(), "b".to_string()]);
        } else {
            panic!("expected jtbl item");
        }
    }
}
