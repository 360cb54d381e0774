use std::{fmt, fs, path::Path};

use crate::token::{Span, Spanned};

/// A fatal compilation error, tied to the region of source that caused it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn new(span: Span, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            span,
            message: message.into(),
        }
    }

    /// Renders the offending source line with a marker under the error span,
    /// followed by the message.
    ///
    /// ```text
    /// var x: integer = y
    ///                  ^
    /// 1:18: error: undefined variable y.
    /// ```
    pub fn render(&self, source: &str) -> String {
        let mut out = self.excerpt(source);
        out.push_str(&self.to_string());
        out
    }

    /// Like [`Diagnostic::render`], reading the source back from `path`,
    /// which goes on a line of its own first. The excerpt is left out if the
    /// file can't be read.
    pub fn render_file(&self, path: &Path) -> String {
        let source = fs::read(path)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        format!("{}\n{}", path.display(), self.render(&source))
    }

    fn excerpt(&self, source: &str) -> String {
        let mut out = String::new();
        let first = self.span.first;
        if let Some(line) = source.lines().nth(first.line as usize - 1) {
            let start = first.column as usize - 1;
            let width = line.chars().count();
            let end = if self.span.last.line == first.line {
                (self.span.last.column as usize - 1).min(width)
            } else {
                width
            };
            out.push_str(line);
            out.push('\n');
            out.extend(std::iter::repeat(' ').take(start));
            out.push('^');
            if end > start + 1 {
                out.extend(std::iter::repeat('~').take(end - start - 1));
            }
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: error: {}.", self.span.first, self.message)
    }
}

impl<E: fmt::Display> From<Spanned<E>> for Diagnostic {
    fn from(error: Spanned<E>) -> Self {
        Diagnostic::new(error.span, error.inner.to_string())
    }
}
