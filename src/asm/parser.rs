//! Line-oriented parser. Each source line becomes zero or one
//! [`Statement`], carrying its source line number for error reporting.

use std::fmt;

use super::instruction::{self, Instruction};
use super::lexer::{Lexer, Token};

#[derive(Debug)]
pub enum ParseError {
    /// A mnemonic was encountered that requires an operand, but none
    /// was given.
    ExpectedOperand,
    /// An operand was given to a mnemonic that takes none.
    UnexpectedOperand,
    /// A mnemonic did not match any direct opcode or abstraction name.
    UnknownMnemonic(String),
    /// An operand token could not be parsed as the expected type.
    InvalidOperand(String),
    /// An operand parsed fine but fell outside the opcode's range.
    OperandOutOfRange,
    /// A character did not fit any token grammar.
    UnexpectedCharacter(usize, char),
    /// A directive name is not one this assembler recognizes.
    UnknownDirective(String),
    /// A directive was used without its required argument(s).
    MissingDirectiveArgument(String),
    /// A `.db`/`.dh`/`.dw`/`.df` literal could not be parsed.
    InvalidDataLiteral(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for ParseError {}

/// One parsed line of assembly source.
#[derive(Debug)]
pub enum Statement {
    /// `.name NAME`
    Section(String),
    /// `.offset N`
    Offset(i64),
    /// `.db`/`.dh`/`.dw`/`.df` literal data, already encoded to bytes.
    Data(Vec<u8>),
    /// `.addr LABEL`, a jump-table entry.
    Addr(String),
    /// `label:`
    Label(String),
    /// A resolved instruction.
    Instruction(Instruction),
}

/// A statement together with the 1-based source line it came from.
#[derive(Debug)]
pub struct Line {
    pub line: usize,
    pub statement: Statement,
}

pub struct Parser<'a> {
    source: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source }
    }

    pub fn parse(&self) -> Result<Vec<Line>, (usize, ParseError)> {
        let mut out = Vec::new();
        for (index, text) in self.source.lines().enumerate() {
            let line = index + 1;
            if let Some(statement) = parse_line(text).map_err(|e| (line, e))? {
                out.push(Line { line, statement });
            }
        }
        Ok(out)
    }
}

fn parse_line(text: &str) -> Result<Option<Statement>, ParseError> {
    let mut lexer = Lexer::new(text);
    let first = lexer.next()?;
    let statement = match first {
        Token::Eof => return Ok(None),
        Token::Label(name) => Statement::Label(name.to_string()),
        Token::Directive(name) => parse_directive(name, &mut lexer)?,
        Token::Word(mnemonic) => {
            let args = collect_words(&mut lexer)?;
            let refs: Vec<&str> = args.iter().map(String::as_str).collect();
            Statement::Instruction(instruction::resolve(mnemonic, &refs)?)
        }
    };
    expect_eof(&mut lexer)?;
    Ok(Some(statement))
}

fn collect_words(lexer: &mut Lexer) -> Result<Vec<String>, ParseError> {
    let mut words = Vec::new();
    loop {
        match lexer.next()? {
            Token::Eof => return Ok(words),
            Token::Word(w) => words.push(w.to_string()),
            Token::Label(_) | Token::Directive(_) => return Err(ParseError::UnexpectedOperand),
        }
    }
}

fn expect_eof(lexer: &mut Lexer) -> Result<(), ParseError> {
    match lexer.next()? {
        Token::Eof => Ok(()),
        _ => Err(ParseError::UnexpectedOperand),
    }
}

fn parse_directive(name: &str, lexer: &mut Lexer) -> Result<Statement, ParseError> {
    let args = collect_words(lexer)?;
    match name.to_ascii_lowercase().as_str() {
        "name" => {
            let arg = args.into_iter().next().ok_or_else(|| {
                ParseError::MissingDirectiveArgument("name".to_string())
            })?;
            Ok(Statement::Section(arg))
        }
        "offset" => {
            let arg = args.into_iter().next().ok_or_else(|| {
                ParseError::MissingDirectiveArgument("offset".to_string())
            })?;
            let value = parse_i64(&arg)?;
            Ok(Statement::Offset(value))
        }
        "addr" => {
            let arg = args.into_iter().next().ok_or_else(|| {
                ParseError::MissingDirectiveArgument("addr".to_string())
            })?;
            Ok(Statement::Addr(arg))
        }
        "db" => Ok(Statement::Data(parse_data(&args, parse_byte)?)),
        "dh" => Ok(Statement::Data(parse_data(&args, parse_half)?)),
        "dw" => Ok(Statement::Data(parse_data(&args, parse_word)?)),
        "df" => Ok(Statement::Data(parse_data(&args, parse_float_bytes)?)),
        other => Err(ParseError::UnknownDirective(other.to_string())),
    }
}

fn parse_data(
    args: &[String],
    encode: impl Fn(&str) -> Result<Vec<u8>, ParseError>,
) -> Result<Vec<u8>, ParseError> {
    if args.is_empty() {
        return Err(ParseError::ExpectedOperand);
    }
    let mut out = Vec::new();
    for arg in args {
        out.extend(encode(arg)?);
    }
    Ok(out)
}

fn parse_i64(text: &str) -> Result<i64, ParseError> {
    text.parse::<i64>()
        .map_err(|_| ParseError::InvalidOperand(text.to_string()))
}

fn parse_byte(text: &str) -> Result<Vec<u8>, ParseError> {
    let v: i64 = text
        .parse()
        .map_err(|_| ParseError::InvalidDataLiteral(text.to_string()))?;
    if !(-0x80..=0xff).contains(&v) {
        return Err(ParseError::OperandOutOfRange);
    }
    Ok(vec![v as u8])
}

fn parse_half(text: &str) -> Result<Vec<u8>, ParseError> {
    let v: i64 = text
        .parse()
        .map_err(|_| ParseError::InvalidDataLiteral(text.to_string()))?;
    if !(-0x8000..=0xffff).contains(&v) {
        return Err(ParseError::OperandOutOfRange);
    }
    Ok((v as i16).to_le_bytes().to_vec())
}

fn parse_word(text: &str) -> Result<Vec<u8>, ParseError> {
    let v: i64 = text
        .parse()
        .map_err(|_| ParseError::InvalidDataLiteral(text.to_string()))?;
    if !(i32::MIN as i64..=u32::MAX as i64).contains(&v) {
        return Err(ParseError::OperandOutOfRange);
    }
    Ok((v as i32).to_le_bytes().to_vec())
}

fn parse_float_bytes(text: &str) -> Result<Vec<u8>, ParseError> {
    let v: f32 = text
        .parse()
        .map_err(|_| ParseError::InvalidDataLiteral(text.to_string()))?;
    Ok(v.to_bits().to_le_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_section_directive() {
        let lines = Parser::new(".name MAIN").parse().unwrap();
        assert!(matches!(&lines[0].statement, Statement::Section(n) if n == "MAIN"));
    }

    #[test]
    fn parses_label_then_instruction() {
        let src = "done:\n    push 7\n    halt\n";
        let lines = Parser::new(src).parse().unwrap();
        assert!(matches!(&lines[0].statement, Statement::Label(n) if n == "done"));
        assert!(matches!(&lines[1].statement, Statement::Instruction(_)));
        assert!(matches!(&lines[2].statement, Statement::Instruction(_)));
    }

    #[test]
    fn skips_blank_and_comment_only_lines() {
        let src = "; just a comment\n\npush 1\n";
        let lines = Parser::new(src).parse().unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn db_parses_a_list_of_bytes() {
        let lines = Parser::new(".db 1 2 3").parse().unwrap();
        assert!(matches!(&lines[0].statement, Statement::Data(b) if b == &vec![1, 2, 3]));
    }

    #[test]
    fn addr_directive_captures_label() {
        let lines = Parser::new(".addr target").parse().unwrap();
        assert!(matches!(&lines[0].statement, Statement::Addr(n) if n == "target"));
    }

    #[test]
    fn unknown_directive_is_an_error() {
        let err = Parser::new(".bogus 1").parse();
        assert!(matches!(err, Err((_, ParseError::UnknownDirective(_)))));
    }
}
