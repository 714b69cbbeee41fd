pub mod codegen;
pub mod frame_layout;

use ncc_parser::{ast::Program, lexer::Loc, ErrorCategory};
use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum CodegenError {
    #[error("not an lvalue")]
    NotAnLvalue(Loc),
}

impl CodegenError {
    pub fn loc(&self) -> Loc {
        match self {
            CodegenError::NotAnLvalue(loc) => *loc,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Semantic
    }
}

pub fn code_generation(mut program: Program) -> Result<ncc_asm::Program, CodegenError> {
    frame_layout::assign_program_offsets(&mut program);
    codegen::generate_program(&program)
}
