#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Type {
    Int,
    Char,
    Pointer(Box<Type>),
    Array {
        base: Box<Type>,
        len: usize,
    },
    Function {
        return_type: Box<Type>,
        params: Vec<Type>,
    },
}

impl Type {
    pub fn pointer_to(base: Type) -> Self {
        Type::Pointer(Box::new(base))
    }

    pub fn array_of(base: Type, len: usize) -> Self {
        Type::Array {
            base: Box::new(base),
            len,
        }
    }

    pub fn function_of(return_type: Type, params: Vec<Type>) -> Self {
        Type::Function {
            return_type: Box::new(return_type),
            params,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int | Type::Char)
    }

    /// Pointers and arrays both expose a base type.
    pub fn is_pointer_like(&self) -> bool {
        matches!(self, Type::Pointer(_) | Type::Array { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn base(&self) -> Option<&Type> {
        match self {
            Type::Pointer(base) | Type::Array { base, .. } => Some(base),
            _ => None,
        }
    }

    /// Size in bytes. Function types have no size and report 0; the parser
    /// refuses to declare objects of function type or take their `sizeof`.
    pub fn size(&self) -> i64 {
        match self {
            Type::Int => 4,
            Type::Char => 1,
            Type::Pointer(_) => 8,
            Type::Array { base, len } => base.size() * *len as i64,
            Type::Function { .. } => 0,
        }
    }

    /// Arrays turn into pointers to their first element.
    pub fn decay(&self) -> Type {
        match self {
            Type::Array { base, .. } => Type::Pointer(base.clone()),
            ty => ty.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AdditiveOperator {
    Add,
    Subtract,
}

/// How an additive expression has to be lowered once its operand types are known.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PointerArithmetic {
    /// Both sides are integers, the result is `int`.
    Integer,
    /// One side is a pointer; the integer side is multiplied by `element_size`.
    Offset {
        pointer_on_left: bool,
        element_size: i64,
        result: Type,
    },
    /// `pointer - pointer`, the byte distance is divided by `element_size`.
    Difference { element_size: i64 },
}

/// Resolves `lhs op rhs` for `+`/`-`. `None` means the operand combination is invalid.
pub fn resolve_additive(op: AdditiveOperator, lhs: &Type, rhs: &Type) -> Option<PointerArithmetic> {
    let element_size = |ty: &Type| ty.base().map(Type::size).unwrap_or(0);

    match (op, lhs.is_pointer_like(), rhs.is_pointer_like()) {
        _ if lhs.is_integer() && rhs.is_integer() => Some(PointerArithmetic::Integer),
        (_, true, false) if rhs.is_integer() => Some(PointerArithmetic::Offset {
            pointer_on_left: true,
            element_size: element_size(lhs),
            result: lhs.decay(),
        }),
        (AdditiveOperator::Add, false, true) if lhs.is_integer() => {
            Some(PointerArithmetic::Offset {
                pointer_on_left: false,
                element_size: element_size(rhs),
                result: rhs.decay(),
            })
        }
        (AdditiveOperator::Subtract, true, true) if lhs.base() == rhs.base() => {
            Some(PointerArithmetic::Difference {
                element_size: element_size(lhs),
            })
        }
        _ => None,
    }
}
