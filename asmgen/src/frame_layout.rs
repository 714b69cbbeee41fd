use ncc_parser::ast::{Declaration, FunctionDeclaration, Program};
use ncc_utils::align_to;

pub const STACK_ALIGNMENT: i64 = 16;

pub fn assign_program_offsets(program: &mut Program) {
    for decl in program.declarations.iter_mut() {
        if let Declaration::FunDecl(func) = decl {
            assign_local_offsets(func);
        }
    }
}

/// Packs the locals below `%rbp`, most recently declared first, without
/// padding between them. Only the total is rounded up to the stack alignment.
pub fn assign_local_offsets(func: &mut FunctionDeclaration) {
    let mut offset = 0;
    for var in func.locals.iter_mut().rev() {
        offset += var.ty.size();
        var.offset = -offset;
    }
    func.stack_size = align_to(offset, STACK_ALIGNMENT);

    log::debug!(
        "function {}: {} locals in {} bytes, frame of {} bytes",
        func.name,
        func.locals.len(),
        offset,
        func.stack_size
    );
}
