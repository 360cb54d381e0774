use std::fmt;

use crate::ast::BaseType;

/// A 1-based position in the source text.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub const START: Location = Location { line: 1, column: 1 };

    pub const fn new(line: u32, column: u32) -> Location {
        Location { line, column }
    }

    pub(crate) fn advance_column(&mut self, amount: u32) {
        self.column += amount;
    }

    pub(crate) fn new_line(&mut self) {
        self.line += 1;
        self.column = 1;
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::START
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source region. `last` points one past the final character.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub first: Location,
    pub last: Location,
}

impl Span {
    pub const fn new(first: Location, last: Location) -> Span {
        Span { first, last }
    }

    /// An empty span at the provided location.
    pub const fn point(at: Location) -> Span {
        Span {
            first: at,
            last: at,
        }
    }

    /// Returns a span that starts at `self` and finishes at `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            first: self.first,
            last: other.last,
        }
    }

    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { span: self, inner }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self})")
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.first, self.last)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

#[derive(Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Token {
        Token { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {})", self.kind, self.span)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    Function,
    With,
    Main,
    Call,
    Var,
    Read,
    Print,
    Abort,
    Assert,
    Return,
    Branch,
    Of,
    Or,
    Otherwise,
    End,
    Do,
    While,

    /// `!`, closes `assert` and `return`.
    Bang,
    Colon,
    Comma,
    /// `;`, closes a parameter or argument list.
    Semicolon,
    /// `=`
    Assign,

    Plus,
    Minus,
    /// Both multiplication and the pointer type marker.
    Star,
    Slash,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    /// `==`
    EqEq,

    Integer(u64),
    Float(f64),
    Identifier(String),
    TypeName(BaseType),

    Eof,
    /// Input that matches no rule, with its raw text.
    Unknown(String),
}

impl TokenKind {
    /// Whether this token can appear between two operands of a binary
    /// expression.
    pub fn is_operator(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Plus | Minus | Star | Slash | Shl | Shr | Less | Greater | LessEq | GreaterEq | EqEq
        )
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "function" => TokenKind::Function,
    "with" => TokenKind::With,
    "main" => TokenKind::Main,
    "call" => TokenKind::Call,
    "var" => TokenKind::Var,
    "read" => TokenKind::Read,
    "print" => TokenKind::Print,
    "abort" => TokenKind::Abort,
    "assert" => TokenKind::Assert,
    "return" => TokenKind::Return,
    "branch" => TokenKind::Branch,
    "of" => TokenKind::Of,
    "or" => TokenKind::Or,
    "otherwise" => TokenKind::Otherwise,
    "end" => TokenKind::End,
    "do" => TokenKind::Do,
    "while" => TokenKind::While,
    "integer" => TokenKind::TypeName(BaseType::Integer),
    "char" => TokenKind::TypeName(BaseType::Char),
    "bool" => TokenKind::TypeName(BaseType::Bool),
    "float" => TokenKind::TypeName(BaseType::Float),
    "double" => TokenKind::TypeName(BaseType::Double),
    "void" => TokenKind::TypeName(BaseType::Void),
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_to_keeps_outer_bounds() {
        let a = Span::new(Location::new(1, 1), Location::new(1, 4));
        let b = Span::new(Location::new(2, 3), Location::new(2, 9));
        assert_eq!(a.to(b), Span::new(Location::new(1, 1), Location::new(2, 9)));
        assert_eq!(a.to(b).to_string(), "1:1..2:9");
    }

    #[test]
    fn location_advances() {
        let mut l = Location::START;
        l.advance_column(4);
        assert_eq!(l, Location::new(1, 5));
        l.new_line();
        assert_eq!(l, Location::new(2, 1));
    }

    #[test]
    fn type_names_are_keywords() {
        assert_eq!(
            KEYWORDS.get("double"),
            Some(&TokenKind::TypeName(BaseType::Double))
        );
        assert_eq!(KEYWORDS.get("Double"), None);
    }
}
