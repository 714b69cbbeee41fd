pub mod emit;

pub use emit::EmitAsm;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Mov {
        src: Operand,
        dst: Operand,
        size: RegisterSize,
    },
    /// Sign-extending load of `from` bytes into a full register.
    MovSx {
        src: Operand,
        dst: Operand,
        from: RegisterSize,
    },
    /// Zero-extends the low byte of `src` into `dst`.
    MovZx {
        src: Operand,
        dst: Operand,
    },
    Lea {
        src: Operand,
        dst: Operand,
    },
    Push(Operand),
    Pop(Operand),
    Unary {
        op: UnaryOperator,
        operand: Operand,
    },
    Binary {
        op: BinaryOperator,
        src: Operand,
        dst: Operand,
    },
    Cqo,
    Idiv(Operand),
    /// Sets the flags from `rhs - lhs`.
    Cmp {
        lhs: Operand,
        rhs: Operand,
    },
    SetCC(CondCode, Operand),
    Jmp(String),
    JumpCC(CondCode, String),
    Label(String),
    AllocateStack(i64),
    DeallocateStack(i64),
    Call {
        name: String,
        /// Not defined in this program, resolved by the linker.
        external: bool,
    },
    /// Full epilogue: restores the caller's frame and returns.
    Ret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondCode {
    E,
    NE,
    L,
    LE,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    Imm(i64),
    /// Offset from `%rbp`.
    Stack(i64),
    /// Memory addressed by the register, `(%reg)`.
    Memory(Register),
    /// RIP-relative symbol address.
    Global(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    AX,
    DI,
    SI,
    DX,
    CX,
    R8,
    R9,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterSize {
    One,
    Four,
    Eight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDefinition {
    pub name: String,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticInit {
    Bytes(Vec<u8>),
    Zero(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticVariable {
    pub name: String,
    pub init: StaticInit,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub data: Vec<StaticVariable>,
    pub functions: Vec<FunctionDefinition>,
}
