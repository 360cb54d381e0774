use std::io::{self, Read};

use log::trace;

use crate::token::{Location, Span, Token, TokenKind, KEYWORDS};

pub const DEFAULT_BUFFER_CAPACITY: usize = 1024 * 1024;

#[derive(Copy, Clone, Debug)]
pub struct LexerOptions {
    /// Initial size of the read buffer, in bytes. The buffer grows when a
    /// single token doesn't fit in it.
    pub buffer_capacity: usize,
    /// Logs every produced token under the `quill::lexer` target.
    pub trace: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        LexerOptions {
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            trace: false,
        }
    }
}

/// Fixed-size window over the input stream.
///
/// Only `data[..size]` holds input. Bytes before the start of the token being
/// matched are discarded on every refill, which moves the partial match to
/// the front of the window.
struct Buffer {
    data: Vec<u8>,
    size: usize,
}

impl Buffer {
    fn with_capacity(capacity: usize) -> Buffer {
        Buffer {
            data: vec![0; capacity.max(1)],
            size: 0,
        }
    }

    fn bytes(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Drops the first `amount` bytes, moving the rest to the front.
    fn shift(&mut self, amount: usize) {
        debug_assert!(amount <= self.size);
        self.data.copy_within(amount..self.size, 0);
        self.size -= amount;
    }

    /// Reads more input at the end of the window. A full window is doubled
    /// first, since the in-progress token spans all of it.
    fn imbue(&mut self, input: &mut impl Read) -> io::Result<usize> {
        if self.size == self.data.len() {
            let doubled = self.data.len() * 2;
            self.data.resize(doubled, 0);
        }
        loop {
            match input.read(&mut self.data[self.size..]) {
                Ok(read) => {
                    self.size += read;
                    return Ok(read);
                }
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error),
            }
        }
    }
}

/// The streaming lexer.
///
/// Produces one token per call to [`Lexer::next_token`]. Once the input is
/// exhausted every call produces [`TokenKind::Eof`]; as an iterator, the
/// lexer stops right after the first end-of-file token.
pub struct Lexer<R> {
    input: R,
    buffer: Buffer,
    /// Next byte to be examined.
    cursor: usize,
    /// Start of the token being matched.
    current_lo: usize,
    location: Location,
    exhausted: bool,
    finished: bool,
    io_error: Option<io::Error>,
    trace: bool,
}

impl<R: Read> Lexer<R> {
    pub fn new(input: R) -> Lexer<R> {
        Lexer::with_options(input, LexerOptions::default())
    }

    pub fn with_options(input: R, options: LexerOptions) -> Lexer<R> {
        Lexer {
            input,
            buffer: Buffer::with_capacity(options.buffer_capacity),
            cursor: 0,
            current_lo: 0,
            location: Location::START,
            exhausted: false,
            finished: false,
            io_error: None,
            trace: options.trace,
        }
    }

    /// Location right after the last produced token.
    pub fn location(&self) -> Location {
        self.location
    }

    /// Takes the read error that ended the input early, if any. A failed read
    /// is reported to the caller as the end of the input.
    pub fn take_io_error(&mut self) -> Option<io::Error> {
        self.io_error.take()
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            let kind = self.scan_token_kind();
            let text = (self.trace && kind.is_some()).then(|| self.text());
            let span = self.commit();
            if let Some(kind) = kind {
                if let Some(text) = text {
                    trace!("{kind:?} {text:?} at {span}");
                }
                return Token::new(kind, span);
            }
        }
    }

    /// Scans a single match. Returns `None` for whitespace and comments.
    fn scan_token_kind(&mut self) -> Option<TokenKind> {
        use TokenKind::*;
        let Some(current) = self.mark_advance() else {
            return Some(Eof);
        };
        let kind = match current {
            b'+' => Plus,
            b'-' => Minus,
            b'*' => Star,
            b'/' => Slash,
            b'!' => Bang,
            b':' => Colon,
            b',' => Comma,
            b';' => Semicolon,
            b'=' => match self.peek() {
                Some(b'=') => self.advance_with(EqEq),
                _ => Assign,
            },
            b'<' => match self.peek() {
                Some(b'<') => self.advance_with(Shl),
                Some(b'=') => self.advance_with(LessEq),
                _ => Less,
            },
            b'>' => match self.peek() {
                Some(b'>') => self.advance_with(Shr),
                Some(b'=') => self.advance_with(GreaterEq),
                _ => Greater,
            },
            b'#' => return self.inline_comment(),
            c if c.is_ascii_whitespace() => return self.whitespace(),
            c if c.is_ascii_alphabetic() || c == b'_' => self.identifier_or_keyword(),
            c if c.is_ascii_digit() => self.number(),
            c => self.unknown(c),
        };
        Some(kind)
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == b'_') {
            self.advance();
        }
        let text = self.text();
        match KEYWORDS.get(text.as_str()) {
            Some(keyword) => keyword.clone(),
            None => TokenKind::Identifier(text),
        }
    }

    /// Matches `digits`, `digits.digits` and `digits.digits(e|E)[+-]digits`,
    /// taking the longest prefix that forms a complete literal.
    fn number(&mut self) -> TokenKind {
        #[derive(Copy, Clone, PartialEq)]
        enum State {
            Integer,
            Dot,
            Fraction,
            Exponent,
            ExponentSign,
            ExponentDigits,
        }
        use State::*;

        // Lengths are relative to the token start, which moves on refills.
        let mut state = Integer;
        let mut accepted = (Integer, self.cursor - self.current_lo);
        loop {
            let next = match (state, self.peek()) {
                (Integer, Some(c)) if c.is_ascii_digit() => Integer,
                (Integer, Some(b'.')) => Dot,
                (Dot | Fraction, Some(c)) if c.is_ascii_digit() => Fraction,
                (Fraction, Some(b'e' | b'E')) => Exponent,
                (Exponent, Some(b'+' | b'-')) => ExponentSign,
                (Exponent | ExponentSign | ExponentDigits, Some(c)) if c.is_ascii_digit() => {
                    ExponentDigits
                }
                _ => break,
            };
            self.advance();
            state = next;
            if matches!(state, Integer | Fraction | ExponentDigits) {
                accepted = (state, self.cursor - self.current_lo);
            }
        }
        // Give back whatever followed the last complete literal.
        self.cursor = self.current_lo + accepted.1;

        let text = self.text();
        if accepted.0 == Integer {
            match text.parse() {
                Ok(value) => TokenKind::Integer(value),
                Err(_) => TokenKind::Unknown(text),
            }
        } else {
            match text.parse() {
                Ok(value) => TokenKind::Float(value),
                Err(_) => TokenKind::Unknown(text),
            }
        }
    }

    fn whitespace(&mut self) -> Option<TokenKind> {
        while matches!(self.peek(), Some(c) if c.is_ascii_whitespace()) {
            self.advance();
        }
        None
    }

    fn inline_comment(&mut self) -> Option<TokenKind> {
        while !matches!(self.peek(), Some(b'\n') | None) {
            self.advance();
        }
        None
    }

    /// Consumes the rest of the UTF-8 sequence started by `first`.
    fn unknown(&mut self, first: u8) -> TokenKind {
        let continuation_bytes = match first {
            0xC0..=0xDF => 1,
            0xE0..=0xEF => 2,
            0xF0..=0xF7 => 3,
            _ => 0,
        };
        for _ in 0..continuation_bytes {
            match self.peek() {
                Some(c) if is_continuation(c) => self.advance(),
                _ => break,
            };
        }
        TokenKind::Unknown(self.text())
    }
}

impl<R: Read> Lexer<R> {
    /// Starts a new token "mark" and advances the cursor.
    fn mark_advance(&mut self) -> Option<u8> {
        self.current_lo = self.cursor;
        self.advance()
    }

    /// Returns the next byte and advances the cursor.
    fn advance(&mut self) -> Option<u8> {
        let current = self.peek();
        if current.is_some() {
            self.cursor += 1;
        }
        current
    }

    /// Advances and returns the provided value.
    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next byte without advancing the cursor, refilling the
    /// buffer if needed.
    fn peek(&mut self) -> Option<u8> {
        if self.cursor == self.buffer.size && !self.exhausted {
            self.refill();
        }
        self.buffer.bytes().get(self.cursor).copied()
    }

    fn refill(&mut self) {
        let consumed = self.current_lo;
        self.buffer.shift(consumed);
        self.cursor -= consumed;
        self.current_lo = 0;
        match self.buffer.imbue(&mut self.input) {
            Ok(0) => self.exhausted = true,
            Ok(_) => {}
            Err(error) => {
                self.io_error = Some(error);
                self.exhausted = true;
            }
        }
    }

    /// Returns the text of the current marked bounds.
    fn text(&self) -> String {
        let bytes = &self.buffer.bytes()[self.current_lo..self.cursor];
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Accepts the current match, moving the location past it, and returns
    /// the span it covers.
    fn commit(&mut self) -> Span {
        let first = self.location;
        let mut columns = 0;
        for &byte in &self.buffer.bytes()[self.current_lo..self.cursor] {
            if byte == b'\n' {
                self.location.advance_column(columns);
                self.location.new_line();
                columns = 0;
            } else if !is_continuation(byte) {
                columns += 1;
            }
        }
        self.location.advance_column(columns);
        self.current_lo = self.cursor;
        Span::new(first, self.location)
    }
}

impl<R: Read> Iterator for Lexer<R> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        self.finished = token.is_eof();
        Some(token)
    }
}

fn is_continuation(byte: u8) -> bool {
    byte & 0b1100_0000 == 0b1000_0000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BaseType;
    use pretty_assertions::assert_eq;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new(src.as_bytes()).collect()
    }

    fn lex_with_capacity(src: &str, buffer_capacity: usize) -> Vec<Token> {
        let options = LexerOptions {
            buffer_capacity,
            trace: false,
        };
        Lexer::with_options(src.as_bytes(), options).collect()
    }

    fn ident(name: &str) -> TokenKind {
        TokenKind::Identifier(name.into())
    }

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+-*/" => [
                (Plus, (1, 1)..(1, 2)),
                (Minus, (1, 2)..(1, 3)),
                (Star, (1, 3)..(1, 4)),
                (Slash, (1, 4)..(1, 5)),
                (Eof, (1, 5)..(1, 5)),
            ],
            "< <= << > >= >> = ==" => [
                (Less, (1, 1)..(1, 2)),
                (LessEq, (1, 3)..(1, 5)),
                (Shl, (1, 6)..(1, 8)),
                (Greater, (1, 9)..(1, 10)),
                (GreaterEq, (1, 11)..(1, 13)),
                (Shr, (1, 14)..(1, 16)),
                (Assign, (1, 17)..(1, 18)),
                (EqEq, (1, 19)..(1, 21)),
                (Eof, (1, 21)..(1, 21)),
            ],
            "<<=<===" => [
                (Shl, (1, 1)..(1, 3)),
                (Assign, (1, 3)..(1, 4)),
                (LessEq, (1, 4)..(1, 6)),
                (EqEq, (1, 6)..(1, 8)),
                (Eof, (1, 8)..(1, 8)),
            ],
            "var x: *integer = 5" => [
                (Var, (1, 1)..(1, 4)),
                (ident("x"), (1, 5)..(1, 6)),
                (Colon, (1, 6)..(1, 7)),
                (Star, (1, 8)..(1, 9)),
                (TypeName(BaseType::Integer), (1, 9)..(1, 16)),
                (Assign, (1, 17)..(1, 18)),
                (Integer(5), (1, 19)..(1, 20)),
                (Eof, (1, 20)..(1, 20)),
            ],
            "main\n  x print # prints x\n  abort" => [
                (Main, (1, 1)..(1, 5)),
                (ident("x"), (2, 3)..(2, 4)),
                (Print, (2, 5)..(2, 10)),
                (Abort, (3, 3)..(3, 8)),
                (Eof, (3, 8)..(3, 8)),
            ],
            "Main mainly _tmp a1_b" => [
                (ident("Main"), (1, 1)..(1, 5)),
                (ident("mainly"), (1, 6)..(1, 12)),
                (ident("_tmp"), (1, 13)..(1, 17)),
                (ident("a1_b"), (1, 18)..(1, 22)),
                (Eof, (1, 22)..(1, 22)),
            ],
            "1 2.5 3.0e2 4.5E-1" => [
                (Integer(1), (1, 1)..(1, 2)),
                (Float(2.5), (1, 3)..(1, 6)),
                (Float(300.0), (1, 7)..(1, 12)),
                (Float(0.45), (1, 13)..(1, 19)),
                (Eof, (1, 19)..(1, 19)),
            ],
            "1. 2.5e+" => [
                (Integer(1), (1, 1)..(1, 2)),
                (Unknown(".".into()), (1, 2)..(1, 3)),
                (Float(2.5), (1, 4)..(1, 7)),
                (ident("e"), (1, 7)..(1, 8)),
                (Plus, (1, 8)..(1, 9)),
                (Eof, (1, 9)..(1, 9)),
            ],
            "a ? é b" => [
                (ident("a"), (1, 1)..(1, 2)),
                (Unknown("?".into()), (1, 3)..(1, 4)),
                (Unknown("é".into()), (1, 5)..(1, 6)),
                (ident("b"), (1, 7)..(1, 8)),
                (Eof, (1, 8)..(1, 8)),
            ],
            "# only a comment" => [(Eof, (1, 17)..(1, 17))],
            "" => [(Eof, (1, 1)..(1, 1))],
        });

        for (input, tokens) in cases {
            assert_eq!(lex(input), *tokens, "input: {input:?}");
        }
    }

    #[test]
    fn integer_overflow_is_unknown() {
        let tokens = lex("18446744073709551616");
        assert_eq!(
            tokens[0].kind,
            TokenKind::Unknown("18446744073709551616".into())
        );
        assert_eq!(lex("18446744073709551615")[0].kind, TokenKind::Integer(u64::MAX));
    }

    #[test]
    fn tiny_buffer_matches_default_buffer() {
        let src = "function integer add with a: integer, b: integer;\n\
                   return a + b * 2.75e1 !\n\
                   main call add with 1, 2; print # done\n";
        let expected = lex(src);
        for capacity in 1..8 {
            assert_eq!(lex_with_capacity(src, capacity), expected, "capacity {capacity}");
        }
    }

    #[test]
    fn token_longer_than_buffer() {
        let long = "x".repeat(100);
        let tokens = lex_with_capacity(&format!("{long} y"), 4);
        assert_eq!(tokens[0].kind, TokenKind::Identifier(long));
        assert_eq!(tokens[1].kind, ident("y"));
        assert_eq!(tokens[1].span.first, Location::new(1, 102));
    }

    #[test]
    fn eof_repeats_after_end() {
        let mut lexer = Lexer::new("x".as_bytes());
        assert_eq!(lexer.next_token().kind, ident("x"));
        assert!(lexer.next_token().is_eof());
        assert!(lexer.next_token().is_eof());
    }

    #[test]
    fn read_errors_end_the_input() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
            }
        }
        let mut lexer = Lexer::new(Failing);
        assert!(lexer.next_token().is_eof());
        let error = lexer.take_io_error().expect("error is kept");
        assert_eq!(error.to_string(), "disk on fire");
    }

    #[test]
    fn trace_logs_the_raw_text_of_each_token() {
        use std::sync::Mutex;

        static RECORDS: Mutex<Vec<String>> = Mutex::new(Vec::new());

        struct Capture;
        impl log::Log for Capture {
            fn enabled(&self, metadata: &log::Metadata) -> bool {
                metadata.target() == "quill::lexer"
            }
            fn log(&self, record: &log::Record) {
                if self.enabled(record.metadata()) {
                    RECORDS.lock().unwrap().push(record.args().to_string());
                }
            }
            fn flush(&self) {}
        }

        _ = log::set_logger(&Capture);
        log::set_max_level(log::LevelFilter::Trace);

        let options = LexerOptions {
            trace: true,
            ..LexerOptions::default()
        };
        let tokens: Vec<_> = Lexer::with_options("while  <= # gone\n".as_bytes(), options).collect();
        assert_eq!(tokens.len(), 3);

        let records = RECORDS.lock().unwrap();
        assert!(records.contains(&"While \"while\" at 1:1..1:6".to_owned()));
        assert!(records.contains(&"LessEq \"<=\" at 1:8..1:10".to_owned()));
        assert!(!records.iter().any(|r| r.contains("gone")));
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, ($fl:expr, $fc:expr)..($ll:expr, $lc:expr))),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![
                    $(Token::new(
                        $kind,
                        Span::new(Location::new($fl, $fc), Location::new($ll, $lc)),
                    )),*
                ],
            )),*]
        }};
    }
    use cases;
}
