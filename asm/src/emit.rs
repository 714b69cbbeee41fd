use std::env::consts::OS;

use crate::{
    BinaryOperator, CondCode, FunctionDefinition, Instruction, Operand, Program, Register,
    RegisterSize, StaticInit, StaticVariable, UnaryOperator,
};

/// A Structure that implements this trait, can emit assembly using the provided function.
/// A high-level construct should also add a comment with more debugging information.
/// A high-level construct is a function or a static variable.
pub trait EmitAsm {
    /// The indent_depth argument only needs to be used when you have to indent something.
    fn emit(&self, indent_depth: u32) -> String;
}

/// Symbol name as seen by the assembler. Local labels are never mangled.
fn symbol(name: &str) -> String {
    if OS == "macos" && !name.starts_with(".L") {
        format!("_{}", name)
    } else {
        name.to_owned()
    }
}

impl Register {
    fn name(&self, size: RegisterSize) -> &'static str {
        match self {
            Register::AX => match size {
                RegisterSize::Eight => "rax",
                RegisterSize::Four => "eax",
                RegisterSize::One => "al",
            },
            Register::DX => match size {
                RegisterSize::Eight => "rdx",
                RegisterSize::Four => "edx",
                RegisterSize::One => "dl",
            },
            Register::CX => match size {
                RegisterSize::Eight => "rcx",
                RegisterSize::Four => "ecx",
                RegisterSize::One => "cl",
            },
            Register::DI => match size {
                RegisterSize::One => "dil",
                RegisterSize::Four => "edi",
                RegisterSize::Eight => "rdi",
            },
            Register::SI => match size {
                RegisterSize::One => "sil",
                RegisterSize::Four => "esi",
                RegisterSize::Eight => "rsi",
            },
            Register::R8 => match size {
                RegisterSize::Eight => "r8",
                RegisterSize::Four => "r8d",
                RegisterSize::One => "r8b",
            },
            Register::R9 => match size {
                RegisterSize::Eight => "r9",
                RegisterSize::Four => "r9d",
                RegisterSize::One => "r9b",
            },
        }
    }
}

impl RegisterSize {
    fn suffix(&self) -> &'static str {
        match self {
            RegisterSize::One => "b",
            RegisterSize::Four => "l",
            RegisterSize::Eight => "q",
        }
    }
}

impl Operand {
    fn emit(&self) -> String {
        self.emit_size(RegisterSize::Eight)
    }

    fn emit_size(&self, size: RegisterSize) -> String {
        match self {
            Operand::Register(reg) => format!("%{}", reg.name(size)),
            Operand::Imm(val) => format!("${}", val),
            Operand::Stack(offset) => format!("{}(%rbp)", offset),
            Operand::Memory(reg) => format!("(%{})", reg.name(RegisterSize::Eight)),
            Operand::Global(name) => format!("{}(%rip)", symbol(name)),
        }
    }
}

impl EmitAsm for Instruction {
    fn emit(&self, indent_depth: u32) -> String {
        let tabs = "\t".repeat(indent_depth as usize);

        match self {
            Instruction::Mov { src, dst, size } => format!(
                "{}mov{} {}, {}\n",
                tabs,
                size.suffix(),
                src.emit_size(*size),
                dst.emit_size(*size)
            ),
            Instruction::MovSx {
                src,
                dst,
                from: RegisterSize::Eight,
            } => format!("{}movq {}, {}\n", tabs, src.emit(), dst.emit()),
            Instruction::MovSx { src, dst, from } => format!(
                "{}movs{}q {}, {}\n",
                tabs,
                from.suffix(),
                src.emit_size(*from),
                dst.emit()
            ),
            Instruction::MovZx { src, dst } => format!(
                "{}movzbq {}, {}\n",
                tabs,
                src.emit_size(RegisterSize::One),
                dst.emit()
            ),
            Instruction::Lea { src, dst } => {
                format!("{}leaq {}, {}\n", tabs, src.emit(), dst.emit())
            }
            Instruction::Push(operand) => format!("{}pushq {}\n", tabs, operand.emit()),
            Instruction::Pop(operand) => format!("{}popq {}\n", tabs, operand.emit()),
            Instruction::Unary { op, operand } => {
                format!("{}{} {}\n", tabs, op.emit(indent_depth), operand.emit())
            }
            Instruction::Binary { op, src, dst } => format!(
                "{}{} {}, {}\n",
                tabs,
                op.emit(indent_depth),
                src.emit(),
                dst.emit()
            ),
            Instruction::Cqo => format!("{}cqo\n", tabs),
            Instruction::Idiv(operand) => format!("{}idivq {}\n", tabs, operand.emit()),
            Instruction::Cmp { lhs, rhs } => {
                format!("{}cmpq {}, {}\n", tabs, lhs.emit(), rhs.emit())
            }
            Instruction::SetCC(cond_code, operand) => format!(
                "{}set{} {}\n",
                tabs,
                cond_code.emit(indent_depth),
                operand.emit_size(RegisterSize::One)
            ),
            Instruction::Jmp(label) => format!("{}jmp {}\n", tabs, label),
            Instruction::JumpCC(cond_code, label) => format!(
                "{}j{} {}\n",
                tabs,
                cond_code.emit(indent_depth),
                label
            ),
            Instruction::Label(label) => format!("{}:\n", label),
            Instruction::AllocateStack(amount) => format!("{}subq ${}, %rsp\n", tabs, amount),
            Instruction::DeallocateStack(amount) => {
                format!("{}addq ${}, %rsp\n", tabs, amount)
            }
            Instruction::Call { name, external } => format!(
                "{}call {}{}\n",
                tabs,
                symbol(name),
                if OS == "linux" && *external {
                    "@PLT"
                } else {
                    ""
                }
            ),
            Instruction::Ret => {
                format!("{}movq %rbp, %rsp\n{}popq %rbp\n{}ret\n", tabs, tabs, tabs)
            }
        }
    }
}

impl EmitAsm for CondCode {
    fn emit(&self, _: u32) -> String {
        match self {
            CondCode::E => "e",
            CondCode::NE => "ne",
            CondCode::L => "l",
            CondCode::LE => "le",
        }
        .to_owned()
    }
}

impl EmitAsm for UnaryOperator {
    fn emit(&self, _: u32) -> String {
        match self {
            UnaryOperator::Neg => "negq".to_owned(),
        }
    }
}

impl EmitAsm for BinaryOperator {
    fn emit(&self, _: u32) -> String {
        match self {
            BinaryOperator::Add => "addq",
            BinaryOperator::Sub => "subq",
            BinaryOperator::Mult => "imulq",
        }
        .to_owned()
    }
}

impl EmitAsm for StaticVariable {
    fn emit(&self, indent_depth: u32) -> String {
        let tabs = "\t".repeat((indent_depth + 1) as usize);

        let body = match &self.init {
            StaticInit::Bytes(bytes) => bytes
                .iter()
                .map(|byte| format!("{}.byte {}\n", tabs, byte))
                .collect::<String>(),
            StaticInit::Zero(size) => format!("{}.zero {}\n", tabs, size),
        };

        // Anonymous string literals stay local to the object file.
        let visibility = if self.name.starts_with(".L") {
            String::new()
        } else {
            format!("{}.globl {}\n", tabs, symbol(&self.name))
        };

        format!("{}{}:\n{}", visibility, symbol(&self.name), body)
    }
}

impl EmitAsm for FunctionDefinition {
    fn emit(&self, indent_depth: u32) -> String {
        let tabs = "\t".repeat((indent_depth + 1) as usize);

        let start = format!("{}pushq %rbp\n{}movq %rsp, %rbp", tabs, tabs);

        format!(
            "# Function {}\n{}.globl {}\n{}:\n{}\n{}# End function\n",
            self.name,
            tabs,
            symbol(&self.name),
            symbol(&self.name),
            start,
            self.instructions
                .iter()
                .map(|inst| inst.emit(indent_depth + 1))
                .collect::<String>(),
        )
    }
}

impl EmitAsm for Program {
    fn emit(&self, indent_depth: u32) -> String {
        let tabs = "\t".repeat((indent_depth + 1) as usize);

        log::debug!(
            "emitting {} globals and {} functions",
            self.data.len(),
            self.functions.len()
        );

        format!(
            "{}.data\n{}{}.text\n{}{}",
            tabs,
            self.data
                .iter()
                .map(|var| var.emit(indent_depth))
                .collect::<String>(),
            tabs,
            self.functions
                .iter()
                .map(|func| func.emit(indent_depth))
                .reduce(|acm, item| format!("{}\n{}", acm, item))
                .unwrap_or_default(),
            if OS == "linux" {
                ".section .note.GNU-stack,\"\",@progbits\n"
            } else {
                ""
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_widths() {
        assert_eq!(Operand::Register(Register::AX).emit_size(RegisterSize::One), "%al");
        assert_eq!(Operand::Register(Register::DI).emit_size(RegisterSize::Four), "%edi");
        assert_eq!(Operand::Register(Register::R9).emit(), "%r9");
        assert_eq!(Operand::Stack(-12).emit(), "-12(%rbp)");
        assert_eq!(Operand::Memory(Register::AX).emit_size(RegisterSize::One), "(%rax)");
        assert_eq!(Operand::Imm(42).emit(), "$42");
    }

    #[test]
    fn test_store_and_load_widths() {
        let store = Instruction::Mov {
            src: Operand::Register(Register::AX),
            dst: Operand::Memory(Register::DI),
            size: RegisterSize::One,
        };
        assert_eq!(store.emit(1), "\tmovb %al, (%rdi)\n");

        let store = Instruction::Mov {
            src: Operand::Register(Register::SI),
            dst: Operand::Stack(-8),
            size: RegisterSize::Four,
        };
        assert_eq!(store.emit(1), "\tmovl %esi, -8(%rbp)\n");

        let load = Instruction::MovSx {
            src: Operand::Memory(Register::AX),
            dst: Operand::Register(Register::AX),
            from: RegisterSize::One,
        };
        assert_eq!(load.emit(1), "\tmovsbq (%rax), %rax\n");

        let load = Instruction::MovSx {
            src: Operand::Memory(Register::AX),
            dst: Operand::Register(Register::AX),
            from: RegisterSize::Four,
        };
        assert_eq!(load.emit(1), "\tmovslq (%rax), %rax\n");

        let load = Instruction::MovSx {
            src: Operand::Memory(Register::AX),
            dst: Operand::Register(Register::AX),
            from: RegisterSize::Eight,
        };
        assert_eq!(load.emit(1), "\tmovq (%rax), %rax\n");
    }

    #[test]
    fn test_comparison_sequence() {
        let insts = [
            Instruction::Cmp {
                lhs: Operand::Register(Register::DI),
                rhs: Operand::Register(Register::AX),
            },
            Instruction::SetCC(CondCode::L, Operand::Register(Register::AX)),
            Instruction::MovZx {
                src: Operand::Register(Register::AX),
                dst: Operand::Register(Register::AX),
            },
        ];
        let text: String = insts.iter().map(|inst| inst.emit(1)).collect();
        assert_eq!(text, "\tcmpq %rdi, %rax\n\tsetl %al\n\tmovzbq %al, %rax\n");
    }

    #[test]
    fn test_labels_are_not_indented() {
        assert_eq!(
            Instruction::Label(".L.begin.3".to_owned()).emit(1),
            ".L.begin.3:\n"
        );
        assert_eq!(
            Instruction::JumpCC(CondCode::E, ".L.end.3".to_owned()).emit(1),
            "\tje .L.end.3\n"
        );
    }

    #[test]
    fn test_epilogue() {
        assert_eq!(
            Instruction::Ret.emit(1),
            "\tmovq %rbp, %rsp\n\tpopq %rbp\n\tret\n"
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_external_calls_go_through_plt() {
        let call = Instruction::Call {
            name: "printf".to_owned(),
            external: true,
        };
        assert_eq!(call.emit(1), "\tcall printf@PLT\n");

        let call = Instruction::Call {
            name: "add".to_owned(),
            external: false,
        };
        assert_eq!(call.emit(1), "\tcall add\n");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_emit_program() {
        let program = Program {
            data: vec![
                StaticVariable {
                    name: ".L..0".to_owned(),
                    init: StaticInit::Bytes(b"hi\0".to_vec()),
                },
                StaticVariable {
                    name: "x".to_owned(),
                    init: StaticInit::Zero(12),
                },
            ],
            functions: vec![FunctionDefinition {
                name: "main".to_owned(),
                instructions: vec![
                    Instruction::AllocateStack(0),
                    Instruction::Mov {
                        src: Operand::Imm(42),
                        dst: Operand::Register(Register::AX),
                        size: RegisterSize::Eight,
                    },
                    Instruction::Label(".L.return.main".to_owned()),
                    Instruction::Ret,
                ],
            }],
        };

        assert_eq!(
            program.emit(0),
            "\t.data\n\
             .L..0:\n\
             \t.byte 104\n\
             \t.byte 105\n\
             \t.byte 0\n\
             \t.globl x\n\
             x:\n\
             \t.zero 12\n\
             \t.text\n\
             # Function main\n\
             \t.globl main\n\
             main:\n\
             \tpushq %rbp\n\
             \tmovq %rsp, %rbp\n\
             \tsubq $0, %rsp\n\
             \tmovq $42, %rax\n\
             .L.return.main:\n\
             \tmovq %rbp, %rsp\n\
             \tpopq %rbp\n\
             \tret\n\
             # End function\n\
             .section .note.GNU-stack,\"\",@progbits\n"
        );
    }
}
