pub mod ast;
pub mod lexer;
pub mod types;

use std::mem;

use ast::{
    BinaryOperator, Block, Declaration, Expression, ExpressionKind, FunctionDeclaration,
    LocalVariable, Program, Statement, VarRef, VariableDeclaration,
};
use ncc_utils::{unique_id::UniqueIds, ResultOkMap};
use thiserror::Error;
use types::{AdditiveOperator, PointerArithmetic, Type};

use crate::lexer::{Loc, Token, TokenKind};

/// Integer argument registers available to calls and parameters.
pub const MAX_ARGS: usize = 6;

/// Largest object in bytes; stack and data offsets must fit a 32-bit displacement.
pub const MAX_OBJECT_SIZE: i64 = i32::MAX as i64;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorCategory {
    Lexical,
    Syntax,
    Semantic,
}

#[derive(Error, Debug, Eq, PartialEq)]
pub enum ParserError {
    #[error("expected '{expected}', but got '{}'", .actual.kind)]
    UnexpectedToken { expected: TokenKind, actual: Token },
    #[error("expected an expression, but got '{}'", .0.kind)]
    ExpectedExpression(Token),
    #[error("expected an identifier, but got '{}'", .0.kind)]
    ExpectedIdentifier(Token),
    #[error("expected a number, but got '{}'", .0.kind)]
    ExpectedNumber(Token),
    #[error("expected a type name, but got '{}'", .0.kind)]
    ExpectedTypeName(Token),
    #[error("undefined variable '{}'", .0.kind)]
    UndefinedVariable(Token),
    #[error("invalid operands")]
    InvalidOperands(Token),
    #[error("invalid pointer dereference")]
    InvalidDereference(Token),
    #[error("not an lvalue")]
    NotAnLvalue(Token),
    #[error("'{}' declared with a function type", .0.kind)]
    FunctionTypedVariable(Token),
    #[error("sizeof applied to a function type")]
    SizeofFunction(Token),
    #[error("too many parameters, at most {} are supported", MAX_ARGS)]
    TooManyParameters(Token),
    #[error("too many arguments, at most {} are supported", MAX_ARGS)]
    TooManyArguments(Token),
    #[error("array is too large")]
    ArrayTooLarge(Token),
    #[error("redefinition of '{}'", .0.kind)]
    Redefinition(Token),
}

impl ParserError {
    pub fn token(&self) -> &Token {
        match self {
            ParserError::UnexpectedToken { actual, .. } => actual,
            ParserError::ExpectedExpression(token)
            | ParserError::ExpectedIdentifier(token)
            | ParserError::ExpectedNumber(token)
            | ParserError::ExpectedTypeName(token)
            | ParserError::UndefinedVariable(token)
            | ParserError::InvalidOperands(token)
            | ParserError::InvalidDereference(token)
            | ParserError::NotAnLvalue(token)
            | ParserError::FunctionTypedVariable(token)
            | ParserError::SizeofFunction(token)
            | ParserError::TooManyParameters(token)
            | ParserError::TooManyArguments(token)
            | ParserError::ArrayTooLarge(token)
            | ParserError::Redefinition(token) => token,
        }
    }

    pub fn loc(&self) -> Loc {
        self.token().loc
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ParserError::UnexpectedToken { .. }
            | ParserError::ExpectedExpression(_)
            | ParserError::ExpectedIdentifier(_)
            | ParserError::ExpectedNumber(_)
            | ParserError::ExpectedTypeName(_) => ErrorCategory::Syntax,
            _ => ErrorCategory::Semantic,
        }
    }
}

/// Result of parsing one declarator: the declared name, its full type and,
/// for function types, the named parameters.
#[derive(Debug)]
struct Declarator {
    name: ast::Identifier,
    token: Token,
    ty: Type,
    params: Vec<Declarator>,
}

fn binary(op: BinaryOperator, lhs: Expression, rhs: Expression, loc: Loc, ty: Type) -> Expression {
    Expression {
        kind: ExpressionKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
        loc,
    }
}

fn constant(value: i64, loc: Loc) -> Expression {
    Expression {
        kind: ExpressionKind::Constant(value),
        ty: Type::Int,
        loc,
    }
}

fn new_dereference(operand: Expression, token: &Token) -> Result<Expression, ParserError> {
    let ty = match operand.ty.base() {
        Some(base) => base.clone(),
        None => return Err(ParserError::InvalidDereference(token.clone())),
    };
    Ok(Expression {
        kind: ExpressionKind::Dereference(Box::new(operand)),
        ty,
        loc: token.loc,
    })
}

/// Builds `lhs + rhs` or `lhs - rhs`, scaling the integer side of pointer
/// arithmetic by the pointee size.
fn new_additive(
    op: AdditiveOperator,
    lhs: Expression,
    rhs: Expression,
    token: &Token,
) -> Result<Expression, ParserError> {
    let loc = token.loc;
    let ast_op = match op {
        AdditiveOperator::Add => BinaryOperator::Add,
        AdditiveOperator::Subtract => BinaryOperator::Subtract,
    };

    match types::resolve_additive(op, &lhs.ty, &rhs.ty) {
        None => Err(ParserError::InvalidOperands(token.clone())),
        Some(PointerArithmetic::Integer) => Ok(binary(ast_op, lhs, rhs, loc, Type::Int)),
        Some(PointerArithmetic::Offset {
            pointer_on_left,
            element_size,
            result,
        }) => {
            let (pointer, index) = if pointer_on_left {
                (lhs, rhs)
            } else {
                (rhs, lhs)
            };
            let scaled = binary(
                BinaryOperator::Multiply,
                index,
                constant(element_size, loc),
                loc,
                Type::Int,
            );
            Ok(binary(ast_op, pointer, scaled, loc, result))
        }
        Some(PointerArithmetic::Difference { element_size }) => {
            let bytes = binary(BinaryOperator::Subtract, lhs, rhs, loc, Type::Int);
            Ok(binary(
                BinaryOperator::Divide,
                bytes,
                constant(element_size, loc),
                loc,
                Type::Int,
            ))
        }
    }
}

fn new_assignment(
    lhs: Expression,
    rhs: Expression,
    token: &Token,
) -> Result<Expression, ParserError> {
    if matches!(lhs.ty, Type::Array { .. }) {
        return Err(ParserError::NotAnLvalue(token.clone()));
    }
    let ty = lhs.ty.clone();
    Ok(Expression {
        kind: ExpressionKind::Assignment {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
        loc: token.loc,
    })
}

#[derive(Debug)]
pub struct Parser {
    tokens: std::vec::IntoIter<Token>,
    cur_token: Token,
    peek_token: Token,

    /// Globals and functions parsed so far, in declaration order.
    declarations: Vec<Declaration>,
    /// Locals of the function currently being parsed, in declaration order.
    locals: Vec<LocalVariable>,
    string_literals: UniqueIds,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let eof = Token {
            kind: TokenKind::Eof,
            loc: Loc {
                offset: 0,
                line: 1,
                column: 1,
            },
            len: 0,
        };
        let mut parser = Self {
            tokens: tokens.into_iter(),
            cur_token: eof.clone(),
            peek_token: eof,
            declarations: vec![],
            locals: vec![],
            string_literals: UniqueIds::new(),
        };

        parser.next_token();
        parser.next_token();

        parser
    }

    /// Advances by one token and returns the token that was current.
    fn next_token(&mut self) -> Token {
        let next = self.tokens.next().unwrap_or_else(|| Token {
            kind: TokenKind::Eof,
            loc: self.peek_token.loc,
            len: 0,
        });
        let old_peek_token = mem::replace(&mut self.peek_token, next);
        mem::replace(&mut self.cur_token, old_peek_token)
    }

    fn cur_token_is(&self, token: &TokenKind) -> bool {
        mem::discriminant(&self.cur_token.kind) == mem::discriminant(token)
    }

    fn peek_token_is(&self, token: &TokenKind) -> bool {
        mem::discriminant(&self.peek_token.kind) == mem::discriminant(token)
    }

    fn consume(&mut self, expected: TokenKind) -> Option<Token> {
        if self.cur_token_is(&expected) {
            Some(self.next_token())
        } else {
            None
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<Token, ParserError> {
        if self.cur_token_is(&expected) {
            Ok(self.next_token())
        } else {
            Err(ParserError::UnexpectedToken {
                expected,
                actual: self.cur_token.clone(),
            })
        }
    }

    fn new_local(&mut self, name: ast::Identifier, ty: Type) -> usize {
        self.locals.push(LocalVariable {
            name,
            ty,
            offset: 0,
        });
        self.locals.len() - 1
    }

    /// Locals shadow globals; within each table the latest declaration wins.
    fn find_var(&self, name: &str) -> Option<VarRef> {
        self.locals
            .iter()
            .rposition(|var| var.name == name)
            .map(VarRef::Local)
            .or_else(|| {
                self.declarations
                    .iter()
                    .rposition(|decl| decl.name() == name)
                    .map(VarRef::Global)
            })
    }

    fn find_global(&self, name: &str) -> Option<&Declaration> {
        self.declarations.iter().find(|decl| decl.name() == name)
    }

    fn var_type(&self, var: VarRef) -> Type {
        match var {
            VarRef::Local(idx) => self.locals[idx].ty.clone(),
            VarRef::Global(idx) => self.declarations[idx].ty().clone(),
        }
    }

    fn new_string_literal(&mut self, mut bytes: Vec<u8>) -> usize {
        bytes.push(0);
        let name = self.string_literals.next_string_literal();
        self.declarations
            .push(Declaration::VarDecl(VariableDeclaration {
                name,
                ty: Type::array_of(Type::Char, bytes.len()),
                init_data: Some(bytes),
            }));
        self.declarations.len() - 1
    }

    pub fn parse_program(&mut self) -> Result<Program, ParserError> {
        while !self.cur_token_is(&TokenKind::Eof) {
            let base = self.parse_declspec()?;
            let declarator = self.parse_declarator(base.clone())?;

            if declarator.ty.is_function() {
                if self.find_global(&declarator.name).is_some() {
                    return Err(ParserError::Redefinition(declarator.token));
                }
                let function = self.parse_function_definition(declarator)?;
                self.declarations.push(Declaration::FunDecl(function));
            } else {
                self.parse_global_variables(base, declarator)?;
            }
        }

        Ok(Program {
            declarations: mem::take(&mut self.declarations),
        })
    }

    // Declarations

    fn parse_declspec(&mut self) -> Result<Type, ParserError> {
        match self.cur_token.kind {
            TokenKind::KWInt => {
                self.next_token();
                Ok(Type::Int)
            }
            TokenKind::KWChar => {
                self.next_token();
                Ok(Type::Char)
            }
            _ => Err(ParserError::ExpectedTypeName(self.cur_token.clone())),
        }
    }

    // declarator = "*"* ident type-suffix
    fn parse_declarator(&mut self, base: Type) -> Result<Declarator, ParserError> {
        let mut ty = base;
        while self.consume(TokenKind::Asterisk).is_some() {
            ty = Type::pointer_to(ty);
        }

        let name = match &self.cur_token.kind {
            TokenKind::Identifier(name) => name.clone(),
            _ => return Err(ParserError::ExpectedIdentifier(self.cur_token.clone())),
        };
        let token = self.next_token();

        let (ty, params) = self.parse_type_suffix(ty)?;

        Ok(Declarator {
            name,
            token,
            ty,
            params,
        })
    }

    // type-suffix = "(" func-params | "[" num "]" type-suffix | ε
    fn parse_type_suffix(&mut self, ty: Type) -> Result<(Type, Vec<Declarator>), ParserError> {
        if self.consume(TokenKind::OpenParen).is_some() {
            return self.parse_function_params(ty);
        }

        if self.consume(TokenKind::OpenBracket).is_some() {
            let len = match self.cur_token.kind {
                TokenKind::Constant(len) if len >= 0 => len,
                _ => return Err(ParserError::ExpectedNumber(self.cur_token.clone())),
            };
            let len_token = self.next_token();
            self.expect(TokenKind::CloseBracket)?;
            let (base, _) = self.parse_type_suffix(ty)?;

            match base.size().checked_mul(len) {
                Some(size) if size <= MAX_OBJECT_SIZE => {}
                _ => return Err(ParserError::ArrayTooLarge(len_token)),
            }
            return Ok((Type::array_of(base, len as usize), vec![]));
        }

        Ok((ty, vec![]))
    }

    // Expects to be past the (
    fn parse_function_params(
        &mut self,
        return_type: Type,
    ) -> Result<(Type, Vec<Declarator>), ParserError> {
        let mut params: Vec<Declarator> = vec![];

        while !self.cur_token_is(&TokenKind::CloseParen) {
            if !params.is_empty() {
                self.expect(TokenKind::Comma)?;
            }
            let base = self.parse_declspec()?;
            let mut param = self.parse_declarator(base)?;
            if param.ty.is_function() {
                return Err(ParserError::FunctionTypedVariable(param.token));
            }
            // Array parameters are passed as pointers to their first element.
            param.ty = param.ty.decay();
            params.push(param);
        }
        self.expect(TokenKind::CloseParen)?;

        if params.len() > MAX_ARGS {
            return Err(ParserError::TooManyParameters(
                params[MAX_ARGS].token.clone(),
            ));
        }

        let ty = Type::function_of(
            return_type,
            params.iter().map(|param| param.ty.clone()).collect(),
        );
        Ok((ty, params))
    }

    fn parse_function_definition(
        &mut self,
        declarator: Declarator,
    ) -> Result<FunctionDeclaration, ParserError> {
        self.locals.clear();

        let params = declarator
            .params
            .into_iter()
            .map(|param| self.new_local(param.name, param.ty))
            .collect();

        let body = self.parse_block()?;

        log::debug!(
            "parsed function {} with {} locals",
            declarator.name,
            self.locals.len()
        );

        Ok(FunctionDeclaration {
            name: declarator.name,
            ty: declarator.ty,
            params,
            locals: mem::take(&mut self.locals),
            body,
            stack_size: 0,
        })
    }

    // global-vars = declarator ("," declarator)* ";"
    fn parse_global_variables(
        &mut self,
        base: Type,
        first: Declarator,
    ) -> Result<(), ParserError> {
        let mut declarator = first;
        loop {
            if declarator.ty.is_function() {
                return Err(ParserError::FunctionTypedVariable(declarator.token));
            }
            match self.find_global(&declarator.name) {
                // A repeated tentative definition names the same object.
                Some(Declaration::VarDecl(existing)) if existing.ty == declarator.ty => {
                    log::debug!("global {} declared again", declarator.name);
                }
                Some(_) => return Err(ParserError::Redefinition(declarator.token)),
                None => {
                    log::debug!("parsed global {}", declarator.name);
                    self.declarations
                        .push(Declaration::VarDecl(VariableDeclaration {
                            name: declarator.name,
                            ty: declarator.ty,
                            init_data: None,
                        }));
                }
            }

            if self.consume(TokenKind::Comma).is_none() {
                break;
            }
            declarator = self.parse_declarator(base.clone())?;
        }
        self.expect(TokenKind::Semicolon)?;
        Ok(())
    }

    // declaration = declspec (declarator ("=" assign)? ("," declarator ("=" assign)?)*)? ";"
    fn parse_declaration(&mut self) -> Result<Statement, ParserError> {
        let base = self.parse_declspec()?;
        let mut initializers = vec![];
        let mut first = true;

        while !self.cur_token_is(&TokenKind::Semicolon) {
            if !first {
                self.expect(TokenKind::Comma)?;
            }
            first = false;

            let declarator = self.parse_declarator(base.clone())?;
            if declarator.ty.is_function() {
                return Err(ParserError::FunctionTypedVariable(declarator.token));
            }
            let var = self.new_local(declarator.name, declarator.ty.clone());

            if let Some(assign) = self.consume(TokenKind::Assign) {
                let lhs = Expression {
                    kind: ExpressionKind::Var(VarRef::Local(var)),
                    ty: declarator.ty,
                    loc: declarator.token.loc,
                };
                let rhs = self.parse_assign()?;
                initializers.push(Statement::Expression(new_assignment(lhs, rhs, &assign)?));
            }
        }
        self.expect(TokenKind::Semicolon)?;

        Ok(Statement::Declaration(Block(initializers)))
    }

    fn parse_block(&mut self) -> Result<Block, ParserError> {
        self.expect(TokenKind::OpenBrace)?;
        let mut body = vec![];
        while self.consume(TokenKind::CloseBrace).is_none() {
            body.push(self.parse_statement()?);
        }
        Ok(Block(body))
    }

    // Statements

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        match &self.cur_token.kind {
            TokenKind::KWReturn => self.parse_return_statement(),
            TokenKind::KWIf => self.parse_if_statement(),
            TokenKind::KWFor => self.parse_for_statement(),
            TokenKind::KWWhile => self.parse_while_statement(),
            TokenKind::OpenBrace => Ok(Statement::Compound(self.parse_block()?)),
            TokenKind::KWInt | TokenKind::KWChar => self.parse_declaration(),
            TokenKind::Semicolon => {
                self.next_token();
                Ok(Statement::Null)
            }
            _ => {
                let expr = self.parse_expression()?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Statement::Expression(expr))
            }
        }
    }

    fn parse_return_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::KWReturn)?;
        let expr = self.parse_expression()?;
        self.expect(TokenKind::Semicolon)?;
        Ok(Statement::Return(expr))
    }

    fn parse_if_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::KWIf)?;
        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::CloseParen)?;
        let then = Box::new(self.parse_statement()?);

        let r#else = self
            .consume(TokenKind::KWElse)
            .ok_map(|_| self.parse_statement().map(Box::new))?;

        Ok(Statement::If {
            condition,
            then,
            r#else,
        })
    }

    fn parse_optional_expression(
        &mut self,
        end: TokenKind,
    ) -> Result<Option<Expression>, ParserError> {
        let expr = if self.cur_token_is(&end) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(end)?;
        Ok(expr)
    }

    fn parse_for_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::KWFor)?;
        self.expect(TokenKind::OpenParen)?;
        let init = self.parse_optional_expression(TokenKind::Semicolon)?;
        let condition = self.parse_optional_expression(TokenKind::Semicolon)?;
        let post = self.parse_optional_expression(TokenKind::CloseParen)?;
        let body = Box::new(self.parse_statement()?);

        Ok(Statement::For {
            init,
            condition,
            post,
            body,
        })
    }

    fn parse_while_statement(&mut self) -> Result<Statement, ParserError> {
        self.expect(TokenKind::KWWhile)?;
        self.expect(TokenKind::OpenParen)?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::CloseParen)?;
        let body = Box::new(self.parse_statement()?);

        Ok(Statement::For {
            init: None,
            condition: Some(condition),
            post: None,
            body,
        })
    }

    // Expressions

    fn parse_expression(&mut self) -> Result<Expression, ParserError> {
        self.parse_assign()
    }

    // assign = equality ("=" assign)?
    fn parse_assign(&mut self) -> Result<Expression, ParserError> {
        let lhs = self.parse_equality()?;
        match self.consume(TokenKind::Assign) {
            Some(token) => {
                let rhs = self.parse_assign()?;
                new_assignment(lhs, rhs, &token)
            }
            None => Ok(lhs),
        }
    }

    // equality = relational ("==" relational | "!=" relational)*
    fn parse_equality(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_relational()?;

        loop {
            let op = match self.cur_token.kind {
                TokenKind::Equal => BinaryOperator::Equal,
                TokenKind::NotEqual => BinaryOperator::NotEqual,
                _ => return Ok(node),
            };
            let token = self.next_token();
            let rhs = self.parse_relational()?;
            node = binary(op, node, rhs, token.loc, Type::Int);
        }
    }

    // relational = additive ("<" additive | "<=" additive | ">" additive | ">=" additive)*
    fn parse_relational(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_additive()?;

        loop {
            let (op, swapped) = match self.cur_token.kind {
                TokenKind::LessThan => (BinaryOperator::LessThan, false),
                TokenKind::LessOrEqual => (BinaryOperator::LessOrEqual, false),
                TokenKind::GreaterThan => (BinaryOperator::LessThan, true),
                TokenKind::GreaterOrEqual => (BinaryOperator::LessOrEqual, true),
                _ => return Ok(node),
            };
            let token = self.next_token();
            let rhs = self.parse_additive()?;
            node = if swapped {
                binary(op, rhs, node, token.loc, Type::Int)
            } else {
                binary(op, node, rhs, token.loc, Type::Int)
            };
        }
    }

    // additive = multiplicative ("+" multiplicative | "-" multiplicative)*
    fn parse_additive(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_multiplicative()?;

        loop {
            let op = match self.cur_token.kind {
                TokenKind::Plus => AdditiveOperator::Add,
                TokenKind::Minus => AdditiveOperator::Subtract,
                _ => return Ok(node),
            };
            let token = self.next_token();
            let rhs = self.parse_multiplicative()?;
            node = new_additive(op, node, rhs, &token)?;
        }
    }

    // multiplicative = unary ("*" unary | "/" unary)*
    fn parse_multiplicative(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_unary()?;

        loop {
            let op = match self.cur_token.kind {
                TokenKind::Asterisk => BinaryOperator::Multiply,
                TokenKind::Slash => BinaryOperator::Divide,
                _ => return Ok(node),
            };
            let token = self.next_token();
            let rhs = self.parse_unary()?;
            if !node.ty.is_integer() || !rhs.ty.is_integer() {
                return Err(ParserError::InvalidOperands(token));
            }
            node = binary(op, node, rhs, token.loc, Type::Int);
        }
    }

    // unary = ("+" | "-" | "&" | "*") unary | postfix
    fn parse_unary(&mut self) -> Result<Expression, ParserError> {
        match self.cur_token.kind {
            TokenKind::Plus => {
                self.next_token();
                self.parse_unary()
            }
            TokenKind::Minus => {
                let token = self.next_token();
                let operand = self.parse_unary()?;
                if !operand.ty.is_integer() {
                    return Err(ParserError::InvalidOperands(token));
                }
                Ok(Expression {
                    kind: ExpressionKind::Negate(Box::new(operand)),
                    ty: Type::Int,
                    loc: token.loc,
                })
            }
            TokenKind::Ampersand => {
                let token = self.next_token();
                let operand = self.parse_unary()?;
                let ty = match &operand.ty {
                    Type::Array { base, .. } => Type::Pointer(base.clone()),
                    ty => Type::pointer_to(ty.clone()),
                };
                Ok(Expression {
                    kind: ExpressionKind::AddressOf(Box::new(operand)),
                    ty,
                    loc: token.loc,
                })
            }
            TokenKind::Asterisk => {
                let token = self.next_token();
                let operand = self.parse_unary()?;
                new_dereference(operand, &token)
            }
            _ => self.parse_postfix(),
        }
    }

    // postfix = primary ("[" expr "]")*
    fn parse_postfix(&mut self) -> Result<Expression, ParserError> {
        let mut node = self.parse_primary()?;

        while let Some(token) = self.consume(TokenKind::OpenBracket) {
            let index = self.parse_expression()?;
            self.expect(TokenKind::CloseBracket)?;
            let address = new_additive(AdditiveOperator::Add, node, index, &token)?;
            node = new_dereference(address, &token)?;
        }

        Ok(node)
    }

    // primary = "(" expr ")" | "sizeof" unary | ident func-args? | str | num
    fn parse_primary(&mut self) -> Result<Expression, ParserError> {
        match self.cur_token.kind.clone() {
            TokenKind::OpenParen => {
                self.next_token();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(expr)
            }
            TokenKind::KWSizeof => {
                let token = self.next_token();
                let operand = self.parse_unary()?;
                if operand.ty.is_function() {
                    return Err(ParserError::SizeofFunction(token));
                }
                Ok(constant(operand.ty.size(), token.loc))
            }
            TokenKind::Identifier(name) => {
                if self.peek_token_is(&TokenKind::OpenParen) {
                    return self.parse_function_call(name);
                }
                let token = self.next_token();
                let var = self
                    .find_var(&name)
                    .ok_or_else(|| ParserError::UndefinedVariable(token.clone()))?;
                Ok(Expression {
                    kind: ExpressionKind::Var(var),
                    ty: self.var_type(var),
                    loc: token.loc,
                })
            }
            TokenKind::StringLiteral(bytes) => {
                let token = self.next_token();
                let idx = self.new_string_literal(bytes);
                Ok(Expression {
                    kind: ExpressionKind::Var(VarRef::Global(idx)),
                    ty: self.declarations[idx].ty().clone(),
                    loc: token.loc,
                })
            }
            TokenKind::Constant(val) => {
                let token = self.next_token();
                Ok(constant(val, token.loc))
            }
            _ => Err(ParserError::ExpectedExpression(self.cur_token.clone())),
        }
    }

    // func-call = ident "(" (assign ("," assign)*)? ")"
    // Arguments are not checked against the callee's parameters.
    fn parse_function_call(&mut self, name: ast::Identifier) -> Result<Expression, ParserError> {
        let token = self.next_token();
        self.expect(TokenKind::OpenParen)?;

        let mut args = vec![];
        while !self.cur_token_is(&TokenKind::CloseParen) {
            if !args.is_empty() {
                self.expect(TokenKind::Comma)?;
            }
            args.push(self.parse_assign()?);
        }
        self.expect(TokenKind::CloseParen)?;

        if args.len() > MAX_ARGS {
            return Err(ParserError::TooManyArguments(token));
        }

        Ok(Expression {
            kind: ExpressionKind::FunctionCall(name, args),
            ty: Type::Int,
            loc: token.loc,
        })
    }
}

/// Parses a complete token stream into a program.
pub fn parse(tokens: Vec<Token>) -> Result<Program, ParserError> {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FunctionDeclaration;

    fn parse_source(input: &str) -> Result<Program, ParserError> {
        let tokens = lexer::tokenize(input).expect("input should lex");
        parse(tokens)
    }

    fn get_function<'a>(program: &'a Program, name: &str) -> &'a FunctionDeclaration {
        program
            .functions()
            .find(|func| func.name == name)
            .expect("function should exist")
    }

    /// Renders an expression as an s-expression with variable names resolved.
    fn sexp(expr: &Expression, func: &FunctionDeclaration, program: &Program) -> String {
        let render = |e: &Expression| sexp(e, func, program);
        match &expr.kind {
            ExpressionKind::Constant(val) => val.to_string(),
            ExpressionKind::Negate(e) => format!("(neg {})", render(e)),
            ExpressionKind::AddressOf(e) => format!("(addr {})", render(e)),
            ExpressionKind::Dereference(e) => format!("(deref {})", render(e)),
            ExpressionKind::Var(VarRef::Local(idx)) => func.locals[*idx].name.clone(),
            ExpressionKind::Var(VarRef::Global(idx)) => {
                program.declarations[*idx].name().to_owned()
            }
            ExpressionKind::Assignment { lhs, rhs } => {
                format!("(= {} {})", render(lhs), render(rhs))
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                let op = match op {
                    BinaryOperator::Add => "+",
                    BinaryOperator::Subtract => "-",
                    BinaryOperator::Multiply => "*",
                    BinaryOperator::Divide => "/",
                    BinaryOperator::Equal => "==",
                    BinaryOperator::NotEqual => "!=",
                    BinaryOperator::LessThan => "<",
                    BinaryOperator::LessOrEqual => "<=",
                };
                format!("({op} {} {})", render(lhs), render(rhs))
            }
            ExpressionKind::FunctionCall(name, args) => {
                let args: Vec<String> = args.iter().map(render).collect();
                format!("(call {name} {})", args.join(" "))
            }
        }
    }

    /// Parses `main` and returns its final `return` expression, rendered.
    fn returned(input: &str) -> (String, Type) {
        let program = parse_source(input).expect("should successfully parse");
        let main = get_function(&program, "main");
        match main.body.0.last() {
            Some(Statement::Return(expr)) => (sexp(expr, main, &program), expr.ty.clone()),
            other => panic!("expected a trailing return, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let (expr, ty) = returned("int main() { return -2 * 3 + 4 == 10 - 6 / 2; }");
        assert_eq!(expr, "(== (+ (* (neg 2) 3) 4) (- 10 (/ 6 2)))");
        assert_eq!(ty, Type::Int);
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let program = parse_source("int main() { int a; int b; a = b = 3; return a; }")
            .expect("should successfully parse");
        let main = get_function(&program, "main");
        match &main.body.0[2] {
            Statement::Expression(expr) => assert_eq!(sexp(expr, main, &program), "(= a (= b 3))"),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_pointer_offset_is_scaled() {
        let (expr, ty) = returned("int main() { int *p; return *(p + 2); }");
        assert_eq!(expr, "(deref (+ p (* 2 4)))");
        assert_eq!(ty, Type::Int);

        let (expr, _) = returned("int main() { char **p; return *(2 + p); }");
        assert_eq!(expr, "(deref (+ p (* 2 8)))");
    }

    #[test]
    fn test_chained_additions_scale_each_step() {
        let (expr, ty) = returned("int main() { int *p; int a; int b; return *(p + a + b - 1); }");
        assert_eq!(expr, "(deref (- (+ (+ p (* a 4)) (* b 4)) (* 1 4)))");
        assert_eq!(ty, Type::Int);
    }

    #[test]
    fn test_pointer_difference() {
        let (expr, ty) = returned("int main() { char **p; char **q; return p - q; }");
        assert_eq!(expr, "(/ (- p q) 8)");
        assert_eq!(ty, Type::Int);
    }

    #[test]
    fn test_array_indexing_desugars() {
        let program = parse_source("int main() { int x[3]; x[1] = 5; return x[1]; }")
            .expect("should successfully parse");
        let main = get_function(&program, "main");
        match &main.body.0[1] {
            Statement::Expression(expr) => {
                assert_eq!(sexp(expr, main, &program), "(= (deref (+ x (* 1 4))) 5)");
                assert_eq!(expr.ty, Type::Int);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_multi_dimensional_arrays() {
        let program = parse_source("int main() { int x[2][3]; return x[1][2]; }")
            .expect("should successfully parse");
        let main = get_function(&program, "main");
        assert_eq!(
            main.locals[0].ty,
            Type::array_of(Type::array_of(Type::Int, 3), 2)
        );

        let (expr, ty) = returned("int main() { int x[2][3]; return x[1][2]; }");
        assert_eq!(expr, "(deref (+ (deref (+ x (* 1 12))) (* 2 4)))");
        assert_eq!(ty, Type::Int);
    }

    #[test]
    fn test_greater_than_is_normalized() {
        let (expr, _) = returned("int main() { return 1 > 2 > 0; }");
        assert_eq!(expr, "(< 0 (< 2 1))");

        let (expr, _) = returned("int main() { return 1 >= 2 < 3; }");
        assert_eq!(expr, "(< (<= 2 1) 3)");
    }

    #[test]
    fn test_sizeof() {
        let (expr, _) = returned(
            "int main() { int x[3]; char c; int *p; return sizeof(x) + sizeof c + sizeof p + sizeof(x[0]); }",
        );
        assert_eq!(expr, "(+ (+ (+ 12 1) 8) 4)");
    }

    #[test]
    fn test_address_of() {
        let (expr, ty) = returned("int main() { int x[3]; int y; return *&y + *(&x[0] + 1) ; }");
        assert_eq!(expr, "(+ (deref (addr y)) (deref (+ (addr (deref (+ x (* 0 4)))) (* 1 4))))");
        assert_eq!(ty, Type::Int);

        let program = parse_source("int main() { int x[3]; &x; return 0; }")
            .expect("should successfully parse");
        match &get_function(&program, "main").body.0[1] {
            Statement::Expression(expr) => assert_eq!(expr.ty, Type::pointer_to(Type::Int)),
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_string_literal_becomes_global() {
        let program = parse_source(r#"int main() { char *s = "hi"; return s[0]; }"#)
            .expect("should successfully parse");

        assert_eq!(
            program.declarations[0],
            Declaration::VarDecl(VariableDeclaration {
                name: ".L..0".to_owned(),
                ty: Type::array_of(Type::Char, 3),
                init_data: Some(b"hi\0".to_vec()),
            })
        );
        assert_eq!(program.declarations[1].name(), "main");

        let (expr, ty) = returned(r#"int main() { char *s = "hi"; return s[0]; }"#);
        assert_eq!(expr, "(deref (+ s (* 0 1)))");
        assert_eq!(ty, Type::Char);
    }

    #[test]
    fn test_string_literal_names_are_unique() {
        let program = parse_source(r#"int main() { char *a = "x"; char *b = "y"; return 0; }"#)
            .expect("should successfully parse");
        let names: Vec<&str> = program.variables().map(|var| var.name.as_str()).collect();
        assert_eq!(names, vec![".L..0", ".L..1"]);
    }

    #[test]
    fn test_lookup_order() {
        let program = parse_source("int x; int main() { int x; char x; return x; }")
            .expect("should successfully parse");
        let main = get_function(&program, "main");
        match main.body.0.last() {
            Some(Statement::Return(expr)) => {
                assert_eq!(expr.kind, ExpressionKind::Var(VarRef::Local(1)));
                assert_eq!(expr.ty, Type::Char);
            }
            other => panic!("unexpected statement {:?}", other),
        }

        let program =
            parse_source("int x; int main() { return x; }").expect("should successfully parse");
        let main = get_function(&program, "main");
        match main.body.0.last() {
            Some(Statement::Return(expr)) => {
                assert_eq!(expr.kind, ExpressionKind::Var(VarRef::Global(0)))
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_parameters() {
        let program = parse_source("int f(int a, char *b, int c[4]) { return a; }")
            .expect("should successfully parse");
        let f = get_function(&program, "f");

        assert_eq!(f.params, vec![0, 1, 2]);
        let names: Vec<&str> = f.locals.iter().map(|var| var.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(
            f.ty,
            Type::function_of(
                Type::Int,
                vec![
                    Type::Int,
                    Type::pointer_to(Type::Char),
                    Type::pointer_to(Type::Int)
                ]
            )
        );
    }

    #[test]
    fn test_declaration_initializers() {
        let program = parse_source("int main() { int a = 1, b, *c = &a; return b; }")
            .expect("should successfully parse");
        let main = get_function(&program, "main");

        assert_eq!(main.locals.len(), 3);
        match &main.body.0[0] {
            Statement::Declaration(Block(inits)) => {
                let rendered: Vec<String> = inits
                    .iter()
                    .map(|stmt| match stmt {
                        Statement::Expression(expr) => sexp(expr, main, &program),
                        other => panic!("unexpected statement {:?}", other),
                    })
                    .collect();
                assert_eq!(rendered, vec!["(= a 1)", "(= c (addr a))"]);
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_control_flow_statements() {
        let program = parse_source(
            "int main() { int i; while (i < 3) i = i + 1; for (;;) { return 1; } if (i) ; else return 2; return 0; }",
        )
        .expect("should successfully parse");
        let main = get_function(&program, "main");

        assert!(matches!(
            &main.body.0[1],
            Statement::For {
                init: None,
                condition: Some(_),
                post: None,
                ..
            }
        ));
        assert!(matches!(
            &main.body.0[2],
            Statement::For {
                init: None,
                condition: None,
                post: None,
                ..
            }
        ));
        match &main.body.0[3] {
            Statement::If { then, r#else, .. } => {
                assert_eq!(**then, Statement::Null);
                assert!(matches!(r#else.as_deref(), Some(Statement::Return(_))));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_global_declarator_list() {
        let program =
            parse_source("int a, *b, c[4]; char d;").expect("should successfully parse");
        let types: Vec<(&str, Type)> = program
            .variables()
            .map(|var| (var.name.as_str(), var.ty.clone()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("a", Type::Int),
                ("b", Type::pointer_to(Type::Int)),
                ("c", Type::array_of(Type::Int, 4)),
                ("d", Type::Char),
            ]
        );
    }

    #[test]
    fn test_repeated_global_is_one_object() {
        let program = parse_source("int x; int x, x; int main() { x = 2; return x; }")
            .expect("should successfully parse");
        assert_eq!(program.variables().filter(|var| var.name == "x").count(), 1);

        let (expr, ty) = returned("int *p; int *p; int main() { return *p; }");
        assert_eq!(expr, "(deref p)");
        assert_eq!(ty, Type::Int);
    }

    #[test]
    fn test_conflicting_redefinitions() {
        let err = parse_source("int x; char x;").expect_err("should fail");
        assert!(matches!(err, ParserError::Redefinition(_)));
        assert_eq!(err.loc().column, 13);
        assert_eq!(err.to_string(), "redefinition of 'x'");
        assert_eq!(err.category(), ErrorCategory::Semantic);

        let err = parse_source("int a[2]; int a[3];").expect_err("should fail");
        assert!(matches!(err, ParserError::Redefinition(_)));

        let err = parse_source("int f; int f() { return 0; }").expect_err("should fail");
        assert!(matches!(err, ParserError::Redefinition(_)));
        assert_eq!(err.loc().column, 12);

        let err = parse_source("int f() { return 0; } int f;").expect_err("should fail");
        assert!(matches!(err, ParserError::Redefinition(_)));

        let err = parse_source("int f() { return 0; } int f() { return 1; }")
            .expect_err("should fail");
        assert!(matches!(err, ParserError::Redefinition(_)));
    }

    #[test]
    fn test_array_size_limit() {
        let err = parse_source("int main(){ int x[4611686018427387904]; return 0; }")
            .expect_err("should fail");
        assert!(matches!(err, ParserError::ArrayTooLarge(_)));
        assert_eq!(err.loc().column, 19);
        assert_eq!(err.category(), ErrorCategory::Semantic);

        let err = parse_source("int m[65536][65536];").expect_err("should fail");
        assert!(matches!(err, ParserError::ArrayTooLarge(_)));
        assert_eq!(err.loc().column, 7);

        let err = parse_source("char c[2147483648];").expect_err("should fail");
        assert!(matches!(err, ParserError::ArrayTooLarge(_)));

        let program = parse_source("int big[536870911]; char c[2147483647];")
            .expect("should successfully parse");
        let sizes: Vec<i64> = program.variables().map(|var| var.ty.size()).collect();
        assert_eq!(sizes, vec![2147483644, MAX_OBJECT_SIZE]);
    }

    #[test]
    fn test_calls_are_not_arity_checked() {
        let (expr, ty) = returned("int f(int a) { return a; } int main() { return f(1, 2, g()); }");
        assert_eq!(expr, "(call f 1 2 (call g ))");
        assert_eq!(ty, Type::Int);
    }

    #[test]
    fn test_undefined_variable() {
        let err = parse_source("int main() { return y; }").expect_err("should fail");
        assert!(matches!(err, ParserError::UndefinedVariable(_)));
        assert_eq!(err.loc().column, 21);
        assert_eq!(err.loc().line, 1);
        assert_eq!(err.category(), ErrorCategory::Semantic);
        assert_eq!(err.to_string(), "undefined variable 'y'");
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse_source("int main() { return 1 }").expect_err("should fail");
        assert_eq!(err.category(), ErrorCategory::Syntax);
        assert_eq!(err.to_string(), "expected ';', but got '}'");

        let err = parse_source("int main() { return ; }").expect_err("should fail");
        assert!(matches!(err, ParserError::ExpectedExpression(_)));

        let err = parse_source("main() { return 0; }").expect_err("should fail");
        assert!(matches!(err, ParserError::ExpectedTypeName(_)));

        let err = parse_source("int x[y];").expect_err("should fail");
        assert!(matches!(err, ParserError::ExpectedNumber(_)));
    }

    #[test]
    fn test_semantic_errors() {
        let err = parse_source("int main() { int *p; int *q; return p + q; }")
            .expect_err("should fail");
        assert!(matches!(err, ParserError::InvalidOperands(_)));

        let err = parse_source("int main() { int *p; char *q; return p - q; }")
            .expect_err("should fail");
        assert!(matches!(err, ParserError::InvalidOperands(_)));

        let err = parse_source("int main() { int *p; return 1 - p; }").expect_err("should fail");
        assert!(matches!(err, ParserError::InvalidOperands(_)));

        let err = parse_source("int main() { int *p; return p * 2; }").expect_err("should fail");
        assert!(matches!(err, ParserError::InvalidOperands(_)));

        let err = parse_source("int main() { int a; return *a; }").expect_err("should fail");
        assert!(matches!(err, ParserError::InvalidDereference(_)));

        let err = parse_source("int main() { int a[2]; int b[2]; a = b; return 0; }")
            .expect_err("should fail");
        assert!(matches!(err, ParserError::NotAnLvalue(_)));

        let err = parse_source("int f() { return 0; } int main() { return sizeof f; }")
            .expect_err("should fail");
        assert!(matches!(err, ParserError::SizeofFunction(_)));

        let err = parse_source("int main() { return f(1, 2, 3, 4, 5, 6, 7); }")
            .expect_err("should fail");
        assert!(matches!(err, ParserError::TooManyArguments(_)));

        let err = parse_source("int f(int a, int b, int c, int d, int e, int f, int g) { return 0; }")
            .expect_err("should fail");
        assert!(matches!(err, ParserError::TooManyParameters(_)));
        assert_eq!(err.category(), ErrorCategory::Semantic);
    }
}
