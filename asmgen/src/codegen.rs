use std::mem;

use ncc_asm::{
    self, CondCode, FunctionDefinition, Instruction, Operand, Register, RegisterSize, StaticInit,
    StaticVariable, UnaryOperator,
};
use ncc_parser::{
    ast::{
        self, BinaryOperator, Block, Expression, ExpressionKind, FunctionDeclaration,
        LocalVariable, Statement, VarRef,
    },
    types::Type,
};
use ncc_utils::unique_id::{self, UniqueIds};

use crate::CodegenError;

pub const ARG_REGISTERS: [Register; 6] = [
    Register::DI,
    Register::SI,
    Register::DX,
    Register::CX,
    Register::R8,
    Register::R9,
];

pub fn generate_program(program: &ast::Program) -> Result<ncc_asm::Program, CodegenError> {
    let data = program.variables().map(cg_static_variable).collect();

    let mut generator = Generator::new(program);
    let functions = program
        .functions()
        .map(|func| generator.function(func))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ncc_asm::Program { data, functions })
}

fn cg_static_variable(var: &ast::VariableDeclaration) -> StaticVariable {
    let init = match &var.init_data {
        Some(bytes) => StaticInit::Bytes(bytes.clone()),
        None => StaticInit::Zero(var.ty.size()),
    };
    StaticVariable {
        name: var.name.clone(),
        init,
    }
}

/// Width of a load or store of `ty`. Arrays and functions are never loaded,
/// they evaluate to their address.
fn scalar_size(ty: &Type) -> Option<RegisterSize> {
    match ty {
        Type::Char => Some(RegisterSize::One),
        Type::Int => Some(RegisterSize::Four),
        Type::Pointer(_) => Some(RegisterSize::Eight),
        Type::Array { .. } | Type::Function { .. } => None,
    }
}

const ACC: Operand = Operand::Register(Register::AX);
const SCRATCH: Operand = Operand::Register(Register::DI);

/// Stack machine over `%rax`: every expression leaves its value in the
/// accumulator, intermediate values live on the machine stack.
struct Generator<'a> {
    program: &'a ast::Program,
    ids: UniqueIds,
    /// Values currently pushed by expression evaluation.
    depth: usize,
    instructions: Vec<Instruction>,

    locals: &'a [LocalVariable],
    return_label: String,
}

impl<'a> Generator<'a> {
    fn new(program: &'a ast::Program) -> Self {
        Self {
            program,
            ids: UniqueIds::new(),
            depth: 0,
            instructions: vec![],
            locals: &[],
            return_label: String::new(),
        }
    }

    fn emit(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    fn push(&mut self) {
        self.emit(Instruction::Push(ACC));
        self.depth += 1;
    }

    fn pop(&mut self, reg: Register) {
        self.emit(Instruction::Pop(Operand::Register(reg)));
        self.depth -= 1;
    }

    fn is_defined(&self, name: &str) -> bool {
        self.program.functions().any(|func| func.name == name)
    }

    fn function(
        &mut self,
        func: &'a FunctionDeclaration,
    ) -> Result<FunctionDefinition, CodegenError> {
        self.locals = &func.locals;
        self.return_label = format!(".L.return.{}", func.name);
        self.depth = 0;
        self.instructions = vec![Instruction::AllocateStack(func.stack_size)];

        for (&param, register) in func.params.iter().zip(ARG_REGISTERS) {
            let var = &func.locals[param];
            self.emit(Instruction::Mov {
                src: Operand::Register(register),
                dst: Operand::Stack(var.offset),
                size: scalar_size(&var.ty).unwrap_or(RegisterSize::Eight),
            });
        }

        self.block(&func.body)?;

        self.emit(Instruction::Label(self.return_label.clone()));
        self.emit(Instruction::Ret);

        log::debug!(
            "generated function {} with {} instructions",
            func.name,
            self.instructions.len()
        );

        Ok(FunctionDefinition {
            name: func.name.clone(),
            instructions: mem::take(&mut self.instructions),
        })
    }

    fn block(&mut self, block: &Block) -> Result<(), CodegenError> {
        for stmt in block.0.iter() {
            self.statement(stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, stmt: &Statement) -> Result<(), CodegenError> {
        match stmt {
            Statement::Return(expr) => {
                self.expression(expr)?;
                self.emit(Instruction::Jmp(self.return_label.clone()));
            }
            Statement::Expression(expr) => self.expression(expr)?,
            Statement::If {
                condition,
                then,
                r#else,
            } => {
                let id = self.ids.next_id();
                let else_label = unique_id::label("else", id);
                let end_label = unique_id::label("end", id);

                self.expression(condition)?;
                self.emit(Instruction::Cmp {
                    lhs: Operand::Imm(0),
                    rhs: ACC,
                });
                self.emit(Instruction::JumpCC(CondCode::E, else_label.clone()));
                self.statement(then)?;
                self.emit(Instruction::Jmp(end_label.clone()));
                self.emit(Instruction::Label(else_label));
                if let Some(r#else) = r#else {
                    self.statement(r#else)?;
                }
                self.emit(Instruction::Label(end_label));
            }
            Statement::For {
                init,
                condition,
                post,
                body,
            } => {
                let id = self.ids.next_id();
                let begin_label = unique_id::label("begin", id);
                let end_label = unique_id::label("end", id);

                if let Some(init) = init {
                    self.expression(init)?;
                }
                self.emit(Instruction::Label(begin_label.clone()));
                if let Some(condition) = condition {
                    self.expression(condition)?;
                    self.emit(Instruction::Cmp {
                        lhs: Operand::Imm(0),
                        rhs: ACC,
                    });
                    self.emit(Instruction::JumpCC(CondCode::E, end_label.clone()));
                }
                self.statement(body)?;
                if let Some(post) = post {
                    self.expression(post)?;
                }
                self.emit(Instruction::Jmp(begin_label));
                self.emit(Instruction::Label(end_label));
            }
            Statement::Compound(block) | Statement::Declaration(block) => self.block(block)?,
            Statement::Null => {}
        }

        assert_eq!(self.depth, 0, "evaluation stack is unbalanced after a statement");
        Ok(())
    }

    /// Computes the address of an lvalue into the accumulator.
    fn address(&mut self, expr: &Expression) -> Result<(), CodegenError> {
        match &expr.kind {
            ExpressionKind::Var(VarRef::Local(idx)) => {
                self.emit(Instruction::Lea {
                    src: Operand::Stack(self.locals[*idx].offset),
                    dst: ACC,
                });
                Ok(())
            }
            ExpressionKind::Var(VarRef::Global(idx)) => {
                self.emit(Instruction::Lea {
                    src: Operand::Global(self.program.declarations[*idx].name().to_owned()),
                    dst: ACC,
                });
                Ok(())
            }
            ExpressionKind::Dereference(operand) => self.expression(operand),
            _ => Err(CodegenError::NotAnLvalue(expr.loc)),
        }
    }

    /// Replaces the address in the accumulator with the value it points to.
    fn load(&mut self, ty: &Type) {
        if let Some(from) = scalar_size(ty) {
            self.emit(Instruction::MovSx {
                src: Operand::Memory(Register::AX),
                dst: ACC,
                from,
            });
        }
    }

    /// Stores the accumulator to the address in the scratch register.
    fn store(&mut self, target: &Expression) -> Result<(), CodegenError> {
        let size = scalar_size(&target.ty).ok_or(CodegenError::NotAnLvalue(target.loc))?;
        self.emit(Instruction::Mov {
            src: ACC,
            dst: Operand::Memory(Register::DI),
            size,
        });
        Ok(())
    }

    fn expression(&mut self, expr: &Expression) -> Result<(), CodegenError> {
        match &expr.kind {
            ExpressionKind::Constant(val) => self.emit(Instruction::Mov {
                src: Operand::Imm(*val),
                dst: ACC,
                size: RegisterSize::Eight,
            }),
            ExpressionKind::Negate(operand) => {
                self.expression(operand)?;
                self.emit(Instruction::Unary {
                    op: UnaryOperator::Neg,
                    operand: ACC,
                });
            }
            ExpressionKind::Var(_) => {
                self.address(expr)?;
                self.load(&expr.ty);
            }
            ExpressionKind::Dereference(operand) => {
                self.expression(operand)?;
                self.load(&expr.ty);
            }
            ExpressionKind::AddressOf(operand) => self.address(operand)?,
            ExpressionKind::Assignment { lhs, rhs } => {
                self.address(lhs)?;
                self.push();
                self.expression(rhs)?;
                self.pop(Register::DI);
                self.store(lhs)?;
            }
            ExpressionKind::FunctionCall(name, args) => self.call(name, args)?,
            ExpressionKind::Binary { op, lhs, rhs } => {
                self.expression(rhs)?;
                self.push();
                self.expression(lhs)?;
                self.pop(Register::DI);
                self.binary(*op);
            }
        }
        Ok(())
    }

    fn binary(&mut self, op: BinaryOperator) {
        let cond_code = match op {
            BinaryOperator::Add => return self.arithmetic(ncc_asm::BinaryOperator::Add),
            BinaryOperator::Subtract => return self.arithmetic(ncc_asm::BinaryOperator::Sub),
            BinaryOperator::Multiply => return self.arithmetic(ncc_asm::BinaryOperator::Mult),
            BinaryOperator::Divide => {
                self.emit(Instruction::Cqo);
                self.emit(Instruction::Idiv(SCRATCH));
                return;
            }
            BinaryOperator::Equal => CondCode::E,
            BinaryOperator::NotEqual => CondCode::NE,
            BinaryOperator::LessThan => CondCode::L,
            BinaryOperator::LessOrEqual => CondCode::LE,
        };

        self.emit(Instruction::Cmp {
            lhs: SCRATCH,
            rhs: ACC,
        });
        self.emit(Instruction::SetCC(cond_code, ACC));
        self.emit(Instruction::MovZx {
            src: ACC,
            dst: ACC,
        });
    }

    fn arithmetic(&mut self, op: ncc_asm::BinaryOperator) {
        self.emit(Instruction::Binary {
            op,
            src: SCRATCH,
            dst: ACC,
        });
    }

    fn call(&mut self, name: &str, args: &[Expression]) -> Result<(), CodegenError> {
        // The parser rejects calls with more arguments than registers.
        debug_assert!(args.len() <= ARG_REGISTERS.len());

        for arg in args {
            self.expression(arg)?;
            self.push();
        }
        for register in ARG_REGISTERS.iter().take(args.len()).rev() {
            self.pop(*register);
        }

        // %rsp must be 16-byte aligned at the call instruction.
        let misaligned = self.depth % 2 == 1;
        if misaligned {
            self.emit(Instruction::AllocateStack(8));
        }
        self.emit(Instruction::Mov {
            src: Operand::Imm(0),
            dst: ACC,
            size: RegisterSize::Eight,
        });
        self.emit(Instruction::Call {
            name: name.to_owned(),
            external: !self.is_defined(name),
        });
        if misaligned {
            self.emit(Instruction::DeallocateStack(8));
        }
        Ok(())
    }
}
