//! Tokens of the rendering dialect.

use std::fmt;

use opgraph_core::Span;

/// A token.
///
/// The lexeme lives in the arena. For strings it is the unescaped content,
/// without quotes.
#[derive(Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    #[inline]
    pub fn new(kind: TokenKind, lexeme: &'a str, span: Span) -> Self {
        Self { kind, lexeme, span }
    }

    /// Short description used in "found ..." diagnostics.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Str => format!("string \"{}\"", self.lexeme),
            _ => format!("'{}'", self.lexeme),
        }
    }
}

impl fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?} @ {:?})", self.kind, self.lexeme, self.span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `t0`, `block`, `System.Math`
    Ident,
    /// `42`, `-7`
    Int,
    /// `2.0`, `1e-7`, `nan`, `inf`, `-inf`
    Float,
    /// `"text"`
    Str,
    LParen,
    RParen,
    LBracket,
    RBracket,
    /// `<` of a generic type
    Lt,
    /// `>` of a generic type
    Gt,
    Comma,
    Semicolon,
    Equals,
    /// `|` between flag names
    Pipe,
    Eof,
}

impl TokenKind {
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::Int => "integer",
            TokenKind::Float => "number",
            TokenKind::Str => "string",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Equals => "'='",
            TokenKind::Pipe => "'|'",
            TokenKind::Eof => "end of input",
        }
    }
}
