use std::{io::Read, mem, rc::Rc};

use log::debug;

use crate::{
    ast::{
        BinaryOperator, Branch, BranchCase, Expr, ExprKind, Function, FunctionParam, Module,
        Operand, Stmt, StmtKind, VarType, Variable,
    },
    lexer::{Lexer, LexerOptions},
    token::{Location, Span, Spanned, Token, TokenKind},
    util::intern::Interner,
};

pub type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

pub fn parse_module<R: Read>(
    input: R,
    source_filename: &str,
    idents: &mut Interner,
) -> Result<Module> {
    parse_module_with(input, source_filename, idents, LexerOptions::default())
}

pub fn parse_module_with<R: Read>(
    input: R,
    source_filename: &str,
    idents: &mut Interner,
    options: LexerOptions,
) -> Result<Module> {
    let mut p = Parser::new(Lexer::with_options(input, options), idents);
    let module = p.parse_module(source_filename)?;
    p.consume(&TokenKind::Eof, "end of file")?;
    p.check_io()?;
    debug!(
        "parsed {} function(s) from {source_filename}",
        module.functions.len() + usize::from(module.entry_point.is_some())
    );
    Ok(module)
}

/// Parses a single expression spanning the whole input.
pub fn parse_expr<R: Read>(input: R, idents: &mut Interner) -> Result<Expr> {
    let mut p = Parser::new(Lexer::new(input), idents);
    let expr = p.parse_expr()?;
    p.consume(&TokenKind::Eof, "end of file")?;
    p.check_io()?;
    Ok(expr)
}

struct Parser<'ident, R> {
    lexer: Lexer<R>,
    current: Token,
    /// End of the last consumed token.
    prev_end: Location,
    idents: &'ident mut Interner,
}

impl<R: Read> Parser<'_, R> {
    fn parse_module(&mut self, source_filename: &str) -> Result<Module> {
        let mut module = Module::new(source_filename);
        while self.is(&TokenKind::Function) {
            let function = self.parse_function()?;
            module.functions.push(function);
        }
        if self.is(&TokenKind::Main) {
            module.entry_point = Some(self.parse_entry_point()?);
            while self.is(&TokenKind::Function) {
                let function = self.parse_function()?;
                module.functions.push(function);
            }
        }
        Ok(module)
    }

    fn parse_function(&mut self) -> Result<Function> {
        let first = self.consume(&TokenKind::Function, "function")?.span.first;
        let return_ty = if self.is_type_start() {
            self.parse_type()?
        } else {
            VarType::VOID
        };
        let name = self.parse_variable("function name")?;

        let mut params = Vec::new();
        if self.take(&TokenKind::With) {
            loop {
                params.push(self.parse_param()?);
                if self.take(&TokenKind::Comma) {
                    continue;
                }
                if self.take(&TokenKind::Semicolon) {
                    break;
                }
                return Err(self.unexpected("either more parameters or function body begin"));
            }
        } else if !self.take(&TokenKind::Semicolon) {
            return Err(self.unexpected("either parameters or function body begin"));
        }

        let body = self.parse_statements()?;
        Ok(Function {
            name: Some(name),
            return_ty,
            params,
            body,
            span: Span::new(first, self.prev_end),
        })
    }

    /// The entry point always returns an integer.
    fn parse_entry_point(&mut self) -> Result<Function> {
        let first = self.consume(&TokenKind::Main, "main")?.span.first;
        let body = self.parse_statements()?;
        Ok(Function {
            name: None,
            return_ty: VarType::INTEGER,
            params: Vec::new(),
            body,
            span: Span::new(first, self.prev_end),
        })
    }

    fn parse_param(&mut self) -> Result<FunctionParam> {
        let name = self.parse_variable("parameter name")?;
        self.consume(&TokenKind::Colon, ":")?;
        let ty = self.parse_type()?;
        if ty.is_void() {
            return Err(name.span.wrap(Error::VoidParameter));
        }
        Ok(FunctionParam { name, ty })
    }

    fn parse_statements(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while let Some(stmt) = self.maybe_parse_statement()? {
            stmts.push(stmt);
        }
        Ok(stmts)
    }

    /// Returns `None`, consuming nothing but separators, if the current token
    /// can't start a statement.
    fn maybe_parse_statement(&mut self) -> Result<Option<Stmt>> {
        use TokenKind as T;
        while self.take(&T::Comma) {}

        let first = self.peek().span.first;
        let kind = match self.peek().kind {
            T::Assert => {
                self.advance();
                let condition = self.parse_expr()?;
                self.consume(&T::Bang, "final !")?;
                StmtKind::Assert(condition)
            }
            T::Read => {
                self.advance();
                StmtKind::Input(self.parse_variable("variable name")?)
            }
            T::Abort => {
                self.advance();
                StmtKind::Abort
            }
            T::Return => {
                self.advance();
                let value = if self.take(&T::Bang) {
                    None
                } else {
                    let value = self.parse_expr()?;
                    self.consume(&T::Bang, "!")?;
                    Some(value)
                };
                StmtKind::Return(value)
            }
            T::Var => {
                self.advance();
                let var = self.parse_variable("variable name")?;
                self.consume(&T::Colon, ":")?;
                let ty = self.parse_type()?;
                let init = if self.take(&T::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                StmtKind::Vardecl { var, ty, init }
            }
            T::Do => {
                self.advance();
                let body = self.parse_statements()?;
                self.consume(&T::While, "statement")?;
                let condition = self.parse_expr()?;
                StmtKind::Loop { body, condition }
            }
            T::Branch => StmtKind::Branch(self.parse_branch()?),
            T::Identifier(_) | T::Integer(_) | T::Float(_) | T::Call => {
                self.parse_expression_statement()?
            }
            _ => return Ok(None),
        };
        Ok(Some(Stmt {
            kind,
            span: Span::new(first, self.prev_end),
        }))
    }

    /// Statements that start with an expression: assignments, prints and
    /// calls.
    fn parse_expression_statement(&mut self) -> Result<StmtKind> {
        let expr = self.parse_expr()?;
        if self.take(&TokenKind::Assign) {
            let ExprKind::Id(target) = expr.kind else {
                return Err(expr.span.wrap(Error::InvalidAssignmentTarget));
            };
            let value = self.parse_expr()?;
            return Ok(StmtKind::Assign { target, value });
        }
        if self.take(&TokenKind::Print) {
            return Ok(StmtKind::Print(expr));
        }
        match expr.kind {
            ExprKind::Call { .. } => Ok(StmtKind::Expr(expr)),
            _ => Err(expr.span.wrap(Error::NotAStatement)),
        }
    }

    fn parse_branch(&mut self) -> Result<Branch> {
        self.consume(&TokenKind::Branch, "branch")?;
        let var = self.parse_variable("variable name")?;
        let span = var.span;
        let lead = Rc::new(Expr {
            kind: ExprKind::Id(var),
            span,
        });
        self.consume(&TokenKind::Of, "of")?;

        let mut cases = vec![self.parse_branch_case(&lead)?];
        loop {
            match self.peek().kind {
                TokenKind::Or => {
                    self.advance();
                    cases.push(self.parse_branch_case(&lead)?);
                }
                TokenKind::Otherwise | TokenKind::End => break,
                _ => return Err(self.unexpected("other cases, otherwise case or end of branch")),
            }
        }

        let otherwise = if self.take(&TokenKind::Otherwise) {
            self.take(&TokenKind::Colon);
            Some(self.parse_statements()?)
        } else {
            None
        };
        self.consume(&TokenKind::End, "end of branch")?;

        Ok(Branch {
            lead,
            cases,
            otherwise,
        })
    }

    /// Parses `[op] expr [':'] stmt*`, where the left operand of `op` is the
    /// branch's lead variable. The operator defaults to `==`.
    fn parse_branch_case(&mut self, lead: &Rc<Expr>) -> Result<BranchCase> {
        let first = self.peek().span.first;
        let op = match Self::binary_operator(&self.peek().kind) {
            Some((op, _)) => {
                self.advance();
                op
            }
            None => BinaryOperator::Eq,
        };
        let rhs = self.parse_expr()?;
        let condition = Expr {
            kind: ExprKind::Binary {
                op,
                lhs: Operand::Shared(Rc::clone(lead)),
                rhs: Box::new(rhs),
            },
            span: Span::new(first, self.prev_end),
        };
        self.take(&TokenKind::Colon);
        let body = self.parse_statements()?;
        Ok(BranchCase { condition, body })
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        match self.parse_expr_prec(0)? {
            Some(expr) => Ok(expr),
            None => Err(self.unexpected("expression")),
        }
    }

    /// Precedence climbing. Operators at the same level associate to the
    /// left, since the right side only takes strictly tighter operators.
    fn parse_expr_prec(&mut self, min_prec: u8) -> Result<Option<Expr>> {
        let Some(mut lhs) = self.parse_atom()? else {
            return Ok(None);
        };
        while let Some((op, prec)) = Self::binary_operator(&self.peek().kind) {
            if prec < min_prec {
                break;
            }
            let op_token = self.advance();
            let Some(rhs) = self.parse_expr_prec(prec + 1)? else {
                return Err(self.fail_at(op_token.span, Error::MissingRightSide));
            };
            let span = lhs.span.to(rhs.span);
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Operand::Owned(Box::new(lhs)),
                    rhs: Box::new(rhs),
                },
                span,
            };
        }
        Ok(Some(lhs))
    }

    fn parse_atom(&mut self) -> Result<Option<Expr>> {
        let first = self.peek().span.first;
        let kind = match self.peek().kind {
            TokenKind::Call => return self.parse_call().map(Some),
            TokenKind::Identifier(_) => ExprKind::Id(self.parse_variable("variable name")?),
            TokenKind::Integer(value) => {
                self.advance();
                ExprKind::Int(value)
            }
            TokenKind::Float(value) => {
                self.advance();
                ExprKind::Float(value)
            }
            _ => return Ok(None),
        };
        Ok(Some(Expr {
            kind,
            span: Span::new(first, self.prev_end),
        }))
    }

    fn parse_call(&mut self) -> Result<Expr> {
        let first = self.consume(&TokenKind::Call, "call")?.span.first;
        let function = self.parse_variable("name of the function to call")?;
        let mut args = Vec::new();
        if self.take(&TokenKind::With) {
            loop {
                args.push(self.parse_expr()?);
                if self.take(&TokenKind::Comma) {
                    continue;
                }
                if self.take(&TokenKind::Semicolon) {
                    break;
                }
                return Err(self.unexpected("either more arguments or end of call"));
            }
        } else if !self.take(&TokenKind::Semicolon) {
            return Err(self.unexpected("either call arguments or end of call"));
        }
        Ok(Expr {
            kind: ExprKind::Call { function, args },
            span: Span::new(first, self.prev_end),
        })
    }

    fn parse_type(&mut self) -> Result<VarType> {
        let pointer = self.take(&TokenKind::Star);
        match self.peek().kind {
            TokenKind::TypeName(base) => {
                self.advance();
                Ok(VarType { base, pointer })
            }
            _ => Err(self.unexpected("type name")),
        }
    }

    fn is_type_start(&self) -> bool {
        matches!(self.peek().kind, TokenKind::TypeName(_) | TokenKind::Star)
    }

    fn parse_variable(&mut self, what: &'static str) -> Result<Variable> {
        let TokenKind::Identifier(name) = &self.current.kind else {
            return Err(self.unexpected(what));
        };
        let name = self.idents.intern(name);
        let span = self.advance().span;
        Ok(Variable { name, span })
    }

    fn binary_operator(kind: &TokenKind) -> Option<(BinaryOperator, u8)> {
        use BinaryOperator::*;
        let op = match kind {
            TokenKind::Less => (Lt, 1),
            TokenKind::Greater => (Gt, 1),
            TokenKind::LessEq => (Le, 1),
            TokenKind::GreaterEq => (Ge, 1),
            TokenKind::EqEq => (Eq, 1),
            TokenKind::Shl => (Shl, 2),
            TokenKind::Shr => (Shr, 2),
            TokenKind::Plus => (Add, 3),
            TokenKind::Minus => (Sub, 3),
            TokenKind::Star => (Mul, 4),
            TokenKind::Slash => (Div, 4),
            _ => return None,
        };
        Some(op)
    }
}

impl<'ident, R: Read> Parser<'ident, R> {
    fn new(mut lexer: Lexer<R>, idents: &'ident mut Interner) -> Parser<'ident, R> {
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            prev_end: Location::START,
            idents,
        }
    }

    /// Returns the current token.
    fn peek(&self) -> &Token {
        &self.current
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Token {
        let next = self.lexer.next_token();
        let current = mem::replace(&mut self.current, next);
        self.prev_end = current.span.last;
        current
    }

    /// Checks whether the current token matches the given one.
    fn is(&self, expect: &TokenKind) -> bool {
        self.peek().kind == *expect
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: &TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not, fails
    /// saying that `what` was expected.
    fn consume(&mut self, expect: &TokenKind, what: &'static str) -> Result<Token> {
        if self.is(expect) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    /// Builds the error for a current token that doesn't fit the grammar.
    fn unexpected(&mut self, what: &'static str) -> Spanned<Error> {
        let span = self.peek().span;
        self.fail_at(span, Error::Expected(what))
    }

    /// A failed read or an unrecognized token explain an error better than
    /// whatever the grammar expected at that point.
    fn fail_at(&mut self, span: Span, error: Error) -> Spanned<Error> {
        if let Some(io_error) = self.lexer.take_io_error() {
            return self.peek().span.wrap(Error::Io(io_error.to_string()));
        }
        match &self.peek().kind {
            TokenKind::Unknown(text) => self.peek().span.wrap(Error::Unrecognized(text.clone())),
            _ => span.wrap(error),
        }
    }

    fn check_io(&mut self) -> Result<()> {
        match self.lexer.take_io_error() {
            Some(error) => Err(self.peek().span.wrap(Error::Io(error.to_string()))),
            None => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected {0}")]
    Expected(&'static str),
    #[error("unrecognized input `{0}`")]
    Unrecognized(String),
    #[error("assignment target must be an identifier")]
    InvalidAssignmentTarget,
    #[error("only a function call can be a statement")]
    NotAStatement,
    #[error("binary operation is missing a right side")]
    MissingRightSide,
    #[error("parameters cannot have type void")]
    VoidParameter,
    #[error("cannot read input: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_utils::tree_tests;

    #[test]
    fn branch_cases_share_the_lead_variable() {
        let src = "main branch x of 1 abort or > 2 abort otherwise abort end";
        let mut idents = Interner::default();
        let module = parse_module(src.as_bytes(), "test.q", &mut idents).unwrap();
        let entry = module.entry_point.unwrap();
        let StmtKind::Branch(branch) = &entry.body[0].kind else {
            panic!("expected branch, got {:?}", entry.body[0]);
        };
        assert_eq!(branch.cases.len(), 2);
        assert_eq!(Rc::strong_count(&branch.lead), 3);
        for case in &branch.cases {
            assert!(case.condition.kind.is_semi());
            let ExprKind::Binary {
                lhs: Operand::Shared(lhs),
                ..
            } = &case.condition.kind
            else {
                panic!("expected semi-expression");
            };
            assert!(Rc::ptr_eq(lhs, &branch.lead));
        }
    }

    #[test]
    fn empty_input_is_an_empty_module() {
        let mut idents = Interner::default();
        let module = parse_module("# nothing\n".as_bytes(), "empty.q", &mut idents).unwrap();
        assert_eq!(module, Module::new("empty.q"));
    }

    tree_tests!(
        use parser;

        fn test_precedence_mul_over_add() {
            let expr = "1 + 2 * 3";
            let tree_ok = "
                binary Add (1:1..1:10)
                  int 1 (1:1..1:2)
                  binary Mul (1:5..1:10)
                    int 2 (1:5..1:6)
                    int 3 (1:9..1:10)
            ";
        }

        fn test_same_precedence_is_left_associative() {
            let expr = "1 - 2 - 3";
            let tree_ok = "
                binary Sub (1:1..1:10)
                  binary Sub (1:1..1:6)
                    int 1 (1:1..1:2)
                    int 2 (1:5..1:6)
                  int 3 (1:9..1:10)
            ";
        }

        fn test_shift_binds_tighter_than_comparison() {
            let expr = "a < b << 1";
            let tree_ok = "
                binary Lt (1:1..1:11)
                  ident a (1:1..1:2)
                  binary Shl (1:5..1:11)
                    ident b (1:5..1:6)
                    int 1 (1:10..1:11)
            ";
        }

        fn test_call_with_arguments() {
            let expr = "call f with x, 2.5;";
            let tree_ok = "
                call f (1:1..1:20)
                  ident x (1:13..1:14)
                  float 2.5 (1:16..1:19)
            ";
        }

        fn test_call_without_arguments() {
            let expr = "call g;";
            let tree_ok = "call g (1:1..1:8)";
        }

        fn test_missing_right_side() {
            let expr = "1 +";
            let expected_errors = &["1:3: error: binary operation is missing a right side."];
        }

        fn test_unrecognized_input() {
            let expr = "1 ?";
            let expected_errors = &["1:3: error: unrecognized input `?`."];
        }

        fn test_empty_expression() {
            let expr = "";
            let expected_errors = &["1:1: error: expected expression."];
        }

        fn test_function_and_entry_point() {
            let program = "
                function integer add with a: integer, b: integer;
                  return a + b !
                main
                  call add with 2, 3; print
            ";
            let tree_ok = "
                function add -> integer
                  param a: integer
                  param b: integer
                  return
                    binary Add (2:10..2:15)
                      ident a (2:10..2:11)
                      ident b (2:14..2:15)
                main -> integer
                  print
                    call add (4:3..4:22)
                      int 2 (4:17..4:18)
                      int 3 (4:20..4:21)
            ";
        }

        fn test_branch_with_otherwise() {
            let program = "
                main
                  var x: integer = 2
                  branch x of 1: 10 print
                  or < 5: 20 print
                  otherwise 30 print
                  end
            ";
            let tree_ok = "
                main -> integer
                  var x: integer (initialized)
                    int 2 (2:20..2:21)
                  branch x
                    case
                      semi Eq (3:15..3:16)
                        ident x (3:10..3:11)
                        int 1 (3:15..3:16)
                      then
                        print
                          int 10 (3:18..3:20)
                    case
                      semi Lt (4:6..4:9)
                        ident x (3:10..3:11)
                        int 5 (4:8..4:9)
                      then
                        print
                          int 20 (4:11..4:13)
                    otherwise
                      print
                        int 30 (5:13..5:15)
            ";
        }

        fn test_loop_with_separators() {
            let program = "
                main
                  var i: integer = 0
                  do i print, i = i + 1 while i < 3
            ";
            let tree_ok = "
                main -> integer
                  var i: integer (initialized)
                    int 0 (2:20..2:21)
                  do
                    print
                      ident i (3:6..3:7)
                    assign i
                      binary Add (3:19..3:24)
                        ident i (3:19..3:20)
                        int 1 (3:23..3:24)
                  while
                    binary Lt (3:31..3:36)
                      ident i (3:31..3:32)
                      int 3 (3:35..3:36)
            ";
        }

        fn test_declared_function_and_pointer_types() {
            let program = "function *char name with p: *double, n: bool;";
            let tree_ok = "
                function name -> *char (declared)
                  param p: *double
                  param n: bool
            ";
        }

        fn test_statements_without_values() {
            let program = "main read x, abort, return !";
            let tree_ok = "
                main -> integer
                  read x
                  abort
                  return
            ";
        }

        fn test_invalid_assignment_target() {
            let program = "main\n5 = 3";
            let expected_errors = &["2:1: error: assignment target must be an identifier."];
        }

        fn test_expression_is_not_a_statement() {
            let program = "main\nx + 1";
            let expected_errors = &["2:1: error: only a function call can be a statement."];
        }

        fn test_assert_without_bang() {
            let program = "main\nassert 1";
            let expected_errors = &["2:9: error: expected final !."];
        }

        fn test_missing_function_name() {
            let program = "function integer;";
            let expected_errors = &["1:17: error: expected function name."];
        }

        fn test_void_parameter() {
            let program = "function f with a: void;";
            let expected_errors = &["1:17: error: parameters cannot have type void."];
        }

        fn test_bad_parameter_list() {
            let program = "function f with a: integer main";
            let expected_errors =
                &["1:28: error: expected either more parameters or function body begin."];
        }

        fn test_unterminated_branch() {
            let program = "main\nbranch x of 1 abort\nwhile";
            let expected_errors =
                &["3:1: error: expected other cases, otherwise case or end of branch."];
        }

        fn test_trailing_garbage() {
            let program = "main\nx = 1 @";
            let expected_errors = &["2:7: error: unrecognized input `@`."];
        }

        fn test_functions_after_entry_point() {
            let program = "main abort function f;";
            let tree_ok = "
                function f -> void (declared)
                main -> integer
                  abort
            ";
        }

        fn test_second_entry_point() {
            let program = "main abort main abort";
            let expected_errors = &["1:12: error: expected end of file."];
        }
    );
}
