use std::io::Read;

use crate::util::{fmt::Diagnostic, intern::Interner};

/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// The code generator lowers the AST into IR, checking variable bindings and
/// types along the way.
pub mod codegen;

pub mod ast;
pub mod ir;
pub mod token;
pub mod types;

pub mod util {
    pub mod fmt;
    pub mod intern;
    #[cfg(test)]
    pub(crate) mod test_utils;
}

/// Parses a whole source file.
pub fn parse<R: Read>(
    input: R,
    source_filename: &str,
    idents: &mut Interner,
) -> Result<ast::Module, Diagnostic> {
    parser::parse_module(input, source_filename, idents).map_err(Diagnostic::from)
}

pub fn lower(module: &ast::Module, idents: &Interner) -> Result<ir::Module, Diagnostic> {
    codegen::generate(module, idents).map_err(Diagnostic::from)
}

/// Parses and lowers `source` in one go.
pub fn compile(source: &str, source_filename: &str) -> Result<ir::Module, Diagnostic> {
    let mut idents = Interner::default();
    let module = parse(source.as_bytes(), source_filename, &mut idents)?;
    lower(&module, &idents)
}
