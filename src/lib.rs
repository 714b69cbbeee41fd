pub mod driver;

use ncc_asm::EmitAsm;
use ncc_asmgen::CodegenError;
use ncc_parser::{
    lexer::{self, LexerError, Loc},
    ErrorCategory, ParserError,
};
use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Parser(#[from] ParserError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

impl CompileError {
    pub fn loc(&self) -> Loc {
        match self {
            CompileError::Lexer(err) => err.loc(),
            CompileError::Parser(err) => err.loc(),
            CompileError::Codegen(err) => err.loc(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CompileError::Lexer(_) => ErrorCategory::Lexical,
            CompileError::Parser(err) => err.category(),
            CompileError::Codegen(err) => err.category(),
        }
    }
}

/// Compiles a whole translation unit to assembly text.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let tokens = lexer::tokenize(source)?;
    let program = ncc_parser::parse(tokens)?;
    let program = ncc_asmgen::code_generation(program)?;

    Ok(program.emit(0))
}
