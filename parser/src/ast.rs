use crate::lexer::Loc;
use crate::types::Type;

pub type Identifier = String;

/// Non-owning reference into a symbol table: an index into the enclosing
/// function's `locals` or into `Program::declarations`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum VarRef {
    Local(usize),
    Global(usize),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub ty: Type,
    pub loc: Loc,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExpressionKind {
    Constant(i64),
    Negate(Box<Expression>),
    AddressOf(Box<Expression>),
    Dereference(Box<Expression>),
    Var(VarRef),
    Assignment {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    FunctionCall(Identifier, Vec<Expression>),
}

/// `>` and `>=` never reach the AST, they are built as swapped `<` and `<=`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Statement {
    Return(Expression),
    Expression(Expression),
    If {
        condition: Expression,
        then: Box<Statement>,
        r#else: Option<Box<Statement>>,
    },
    /// `while (cond) body` is a `For` without `init` and `post`.
    For {
        init: Option<Expression>,
        condition: Option<Expression>,
        post: Option<Expression>,
        body: Box<Statement>,
    },
    Compound(Block),
    /// Local declaration; holds one assignment statement per initializer.
    Declaration(Block),
    Null,
}

#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Block(pub Vec<Statement>);

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LocalVariable {
    pub name: Identifier,
    pub ty: Type,
    /// Offset from `%rbp`, written by the frame layout pass.
    pub offset: i64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct VariableDeclaration {
    pub name: Identifier,
    pub ty: Type,
    /// Exact bytes for string literals, `None` means zero filled.
    pub init_data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FunctionDeclaration {
    pub name: Identifier,
    pub ty: Type,
    /// Indices into `locals`, in declaration order.
    pub params: Vec<usize>,
    /// Every local in declaration order, parameters first.
    pub locals: Vec<LocalVariable>,
    pub body: Block,
    /// Frame size in bytes, written by the frame layout pass.
    pub stack_size: i64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Declaration {
    FunDecl(FunctionDeclaration),
    VarDecl(VariableDeclaration),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::FunDecl(func) => &func.name,
            Declaration::VarDecl(var) => &var.name,
        }
    }

    pub fn ty(&self) -> &Type {
        match self {
            Declaration::FunDecl(func) => &func.ty,
            Declaration::VarDecl(var) => &var.ty,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Program {
    pub declarations: Vec<Declaration>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDeclaration> {
        self.declarations.iter().filter_map(|decl| match decl {
            Declaration::FunDecl(func) => Some(func),
            Declaration::VarDecl(_) => None,
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &VariableDeclaration> {
        self.declarations.iter().filter_map(|decl| match decl {
            Declaration::VarDecl(var) => Some(var),
            Declaration::FunDecl(_) => None,
        })
    }
}
