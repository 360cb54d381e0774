// module ::= function* main stmt*
// function ::= 'function' [type] ID ('with' param (',' param)* ';' | ';') stmt*
// param ::= ID ':' type
// type ::= ['*'] ('integer' | 'char' | 'bool' | 'float' | 'double' | 'void')
// stmt ::= 'assert' expr '!'
//        | 'read' ID
//        | 'abort'
//        | 'return' [expr] '!'
//        | 'var' ID ':' type ['=' expr]
//        | 'do' stmt* 'while' expr
//        | 'branch' ID 'of' case ('or' case)* ['otherwise' [':'] stmt*] 'end'
//        | ID '=' expr
//        | expr 'print'
//        | call
//        | ',' stmt
// case ::= [op] expr [':'] stmt*
// expr ::= expr op expr
//        | call
//        | ID
//        | integer
//        | float
// call ::= 'call' ID ['with' expr (',' expr)*] ';'

// Precedence
//
// * /
// + -
// << >>
// < > <= >= ==

use std::{fmt, ops::Deref, rc::Rc};

use crate::{token::Span, util::intern::Symbol};

#[derive(Debug, PartialEq)]
pub struct Module {
    /// Functions other than the entry point, in source order.
    pub functions: Vec<Function>,
    pub entry_point: Option<Function>,
    pub source_filename: String,
}

impl Module {
    pub fn new(source_filename: impl Into<String>) -> Module {
        Module {
            functions: Vec::new(),
            entry_point: None,
            source_filename: source_filename.into(),
        }
    }

    /// All functions, with the entry point last.
    pub fn all_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().chain(&self.entry_point)
    }
}

#[derive(Debug, PartialEq)]
pub struct Function {
    /// `None` for the entry point.
    pub name: Option<Variable>,
    pub return_ty: VarType,
    pub params: Vec<FunctionParam>,
    /// An empty body declares the function without defining it.
    pub body: Vec<Stmt>,
    pub span: Span,
}

impl Function {
    pub fn is_entry_point(&self) -> bool {
        self.name.is_none()
    }
}

#[derive(Debug, PartialEq)]
pub struct FunctionParam {
    pub name: Variable,
    /// Never void.
    pub ty: VarType,
}

#[derive(Debug, PartialEq)]
pub struct Variable {
    pub name: Symbol,
    pub span: Span,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BaseType {
    Integer,
    Char,
    Bool,
    Float,
    Double,
    Void,
}

impl BaseType {
    pub fn name(self) -> &'static str {
        match self {
            BaseType::Integer => "integer",
            BaseType::Char => "char",
            BaseType::Bool => "bool",
            BaseType::Float => "float",
            BaseType::Double => "double",
            BaseType::Void => "void",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarType {
    pub base: BaseType,
    pub pointer: bool,
}

impl VarType {
    pub const VOID: VarType = VarType::new(BaseType::Void);
    pub const INTEGER: VarType = VarType::new(BaseType::Integer);

    pub const fn new(base: BaseType) -> VarType {
        VarType {
            base,
            pointer: false,
        }
    }

    pub const fn pointer_to(base: BaseType) -> VarType {
        VarType {
            base,
            pointer: true,
        }
    }

    pub fn is_void(self) -> bool {
        self.base == BaseType::Void && !self.pointer
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pointer {
            f.write_str("*")?;
        }
        f.write_str(self.base.name())
    }
}

#[derive(Debug, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub enum StmtKind {
    Assert(Expr),
    Input(Variable),
    Abort,
    /// A call evaluated for its effects.
    Expr(Expr),
    Print(Expr),
    Assign {
        target: Variable,
        value: Expr,
    },
    Vardecl {
        var: Variable,
        ty: VarType,
        init: Option<Expr>,
    },
    /// Runs `body` at least once, then again while `condition` holds.
    Loop {
        body: Vec<Stmt>,
        condition: Expr,
    },
    Branch(Branch),
    Return(Option<Expr>),
}

#[derive(Debug, PartialEq)]
pub struct Branch {
    /// The lead variable, shared as the left operand of every case condition.
    pub lead: Rc<Expr>,
    /// Non empty list of cases.
    pub cases: Vec<BranchCase>,
    pub otherwise: Option<Vec<Stmt>>,
}

#[derive(Debug, PartialEq)]
pub struct BranchCase {
    /// A semi-expression: a binary expression over the lead variable.
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, PartialEq)]
pub enum ExprKind {
    Int(u64),
    Float(f64),
    Id(Variable),
    Binary {
        op: BinaryOperator,
        lhs: Operand,
        rhs: Box<Expr>,
    },
    Call {
        function: Variable,
        args: Vec<Expr>,
    },
}

impl ExprKind {
    /// Whether this is the condition of a branch case.
    pub fn is_semi(&self) -> bool {
        matches!(
            self,
            ExprKind::Binary {
                lhs: Operand::Shared(_),
                ..
            }
        )
    }
}

/// The left operand of a binary expression.
///
/// Branch conditions share the lead variable expression among all cases
/// instead of owning a copy.
#[derive(Debug, PartialEq)]
pub enum Operand {
    Owned(Box<Expr>),
    Shared(Rc<Expr>),
}

impl Deref for Operand {
    type Target = Expr;

    fn deref(&self) -> &Expr {
        match self {
            Operand::Owned(expr) => expr,
            Operand::Shared(expr) => expr,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
}

impl BinaryOperator {
    pub fn is_comparison(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Lt | Gt | Le | Ge | Eq)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOperator::Shl | BinaryOperator::Shr)
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Shl => "<<",
            Shr => ">>",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            Eq => "==",
        }
    }
}
