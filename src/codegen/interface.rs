use crate::{
    ast,
    codegen::{generator::Generator, runtime},
    ir::{self, verify::VerifyError},
    token::Spanned,
    types,
    util::intern::Interner,
};

/// Lowers a parsed module into IR, stopping at the first error.
pub fn generate(module: &ast::Module, idents: &Interner) -> Result<ir::Module, Spanned<Error>> {
    type LibcGenerator<'a> = Generator<'a, runtime::Libc>;

    LibcGenerator::new(&module.source_filename, idents).generate(module)
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("undefined variable {0}")]
    UndefinedVariable(String),
    #[error("assigning to undefined variable {0}")]
    AssignUndefined(String),
    #[error("reading an undefined variable {0}")]
    ReadUndefined(String),
    #[error("redefining an existing variable {0}")]
    Redefinition(String),
    #[error("redefining an existing function {0}")]
    FunctionRedefinition(String),
    #[error("function name {0} is reserved")]
    ReservedName(String),
    #[error("call to undefined function {0}")]
    UndefinedFunction(String),
    #[error("wrong number of arguments in call to {function}: expected {expected}, found {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },
    #[error(
        "cannot pass expression of type {found} as argument of type {expected} in call to {function}"
    )]
    ArgumentType {
        function: String,
        expected: String,
        found: String,
    },
    #[error("cannot initialize variable of type {expected} with expression of type {found}")]
    InitType { expected: String, found: String },
    #[error("cannot assign expression of type {found} to variable of type {expected}")]
    AssignType { expected: String, found: String },
    #[error("cannot return expression of type {found} from function of type {expected}")]
    ReturnType { expected: String, found: String },
    #[error("cannot return a value from a void function")]
    ReturnValueFromVoid,
    #[error("cannot declare variable {0} of type void")]
    VoidVariable(String),
    #[error(transparent)]
    Types(#[from] types::Error),
    #[error("pointer arithmetic is not supported")]
    PointerArithmetic,
    #[error("this operation cannot be applied to floats")]
    FloatShift,
    #[error("cannot convert expression of type {0} to boolean")]
    Condition(String),
    #[error("only integer and float valued expressions may be printed")]
    NotPrintable,
    #[error("can only read integers and floating point")]
    NotReadable,
    #[error("invalid function generated: {0}")]
    Verify(#[from] VerifyError),
}
