//! Lexer for the rendering dialect.
//!
//! Converts source text into [`Token`]s, dispatching on the first character.
//! Comments (`// ...` and `/* ... */`) are skipped. Lexemes are copied into
//! the arena so the source can be dropped after lexing.

use bumpalo::Bump;
use bumpalo::collections::{String as BumpString, Vec as BumpVec};

use opgraph_core::{ReadError, Span};

use super::cursor::{Cursor, is_ident_continue, is_ident_start};
use super::token::{Token, TokenKind};

pub struct Lexer<'src, 'a> {
    cursor: Cursor<'src>,
    arena: &'a Bump,
}

impl<'src, 'a> Lexer<'src, 'a> {
    pub fn new(source: &'src str, arena: &'a Bump) -> Self {
        Self {
            cursor: Cursor::new(source),
            arena,
        }
    }

    /// Lex the whole input. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(mut self) -> Result<BumpVec<'a, Token<'a>>, ReadError> {
        let mut tokens = BumpVec::new_in(self.arena);
        loop {
            let token = self.next_token()?;
            tokens.push(token);
            if token.kind == TokenKind::Eof {
                return Ok(tokens);
            }
        }
    }

    /// Scan the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>, ReadError> {
        self.skip_trivia()?;

        let (line, col, offset) = (self.cursor.line(), self.cursor.column(), self.cursor.offset());
        let Some(ch) = self.cursor.peek() else {
            return Ok(Token::new(TokenKind::Eof, "", Span::point(line, col)));
        };

        match ch {
            '"' => self.scan_string(line, col),
            c if c.is_ascii_digit() => self.scan_number(line, col, offset),
            '-' if self.cursor.check_str("-inf") => {
                for _ in 0..4 {
                    self.cursor.advance();
                }
                Ok(self.make_token(TokenKind::Float, line, col, offset))
            }
            '-' if self.cursor.peek_nth(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.scan_number(line, col, offset)
            }
            c if is_ident_start(c) => {
                let word = self.cursor.eat_while(is_ident_continue);
                let kind = match word {
                    "nan" | "inf" => TokenKind::Float,
                    _ => TokenKind::Ident,
                };
                Ok(self.make_token(kind, line, col, offset))
            }
            _ => self.scan_punctuation(ch, line, col, offset),
        }
    }

    // ==========================================================================
    // Scanning
    // ==========================================================================

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), ReadError> {
        loop {
            self.cursor.eat_while(|c| c.is_whitespace());
            if self.cursor.check_str("//") {
                self.cursor.eat_while(|c| c != '\n');
            } else if self.cursor.check_str("/*") {
                let span = Span::new(self.cursor.line(), self.cursor.column(), 2);
                self.cursor.advance();
                self.cursor.advance();
                loop {
                    if self.cursor.check_str("*/") {
                        self.cursor.advance();
                        self.cursor.advance();
                        break;
                    }
                    if self.cursor.advance().is_none() {
                        return Err(ReadError::UnterminatedComment { span });
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    fn scan_string(&mut self, line: u32, col: u32) -> Result<Token<'a>, ReadError> {
        let start = Span::point(line, col);
        self.cursor.advance();
        let mut text = BumpString::new_in(self.arena);
        loop {
            let Some(ch) = self.cursor.advance() else {
                return Err(ReadError::UnterminatedString { span: start });
            };
            match ch {
                '"' => break,
                '\\' => {
                    let escape_span = Span::point(self.cursor.line(), self.cursor.column());
                    let escaped = match self.cursor.advance() {
                        Some('"') => '"',
                        Some('\\') => '\\',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('u') => self.scan_unicode_escape(escape_span)?,
                        Some(other) => {
                            return Err(ReadError::UnexpectedChar {
                                ch: other,
                                span: escape_span,
                            });
                        }
                        None => return Err(ReadError::UnterminatedString { span: start }),
                    };
                    text.push(escaped);
                }
                other => text.push(other),
            }
        }
        let len = self.cursor.column().saturating_sub(col);
        Ok(Token::new(
            TokenKind::Str,
            text.into_bump_str(),
            Span::new(line, col, len),
        ))
    }

    /// `\u{hex}`, after the `u`.
    fn scan_unicode_escape(&mut self, span: Span) -> Result<char, ReadError> {
        if !self.cursor.eat('{') {
            return Err(ReadError::InvalidNumber {
                span,
                detail: "expected '{' after \\u".to_string(),
            });
        }
        let digits = self.cursor.eat_while(|c| c.is_ascii_hexdigit());
        if !self.cursor.eat('}') {
            return Err(ReadError::InvalidNumber {
                span,
                detail: "unterminated unicode escape".to_string(),
            });
        }
        u32::from_str_radix(digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| ReadError::InvalidNumber {
                span,
                detail: format!("'{digits}' is not a unicode scalar value"),
            })
    }

    /// `-?digits(.digits)?([eE][+-]?digits)?`
    fn scan_number(&mut self, line: u32, col: u32, offset: u32) -> Result<Token<'a>, ReadError> {
        self.cursor.eat('-');
        self.cursor.eat_while(|c| c.is_ascii_digit());
        let mut kind = TokenKind::Int;
        if self.cursor.peek() == Some('.')
            && self.cursor.peek_nth(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit());
            kind = TokenKind::Float;
        }
        if self.cursor.check(|c| c == 'e' || c == 'E') {
            self.cursor.advance();
            if !self.cursor.eat('-') {
                self.cursor.eat('+');
            }
            let exponent = self.cursor.eat_while(|c| c.is_ascii_digit());
            if exponent.is_empty() {
                return Err(ReadError::InvalidNumber {
                    span: Span::point(line, col),
                    detail: "missing exponent digits".to_string(),
                });
            }
            kind = TokenKind::Float;
        }
        Ok(self.make_token(kind, line, col, offset))
    }

    fn scan_punctuation(
        &mut self,
        ch: char,
        line: u32,
        col: u32,
        offset: u32,
    ) -> Result<Token<'a>, ReadError> {
        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '=' => TokenKind::Equals,
            '|' => TokenKind::Pipe,
            other => {
                return Err(ReadError::UnexpectedChar {
                    ch: other,
                    span: Span::point(line, col),
                });
            }
        };
        self.cursor.advance();
        Ok(self.make_token(kind, line, col, offset))
    }

    /// Token from the start position to the current position.
    fn make_token(&self, kind: TokenKind, line: u32, col: u32, offset: u32) -> Token<'a> {
        let end = self.cursor.offset();
        let lexeme = self
            .arena
            .alloc_str(&self.cursor.source()[offset as usize..end as usize]);
        Token::new(kind, lexeme, Span::new(line, col, end - offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let arena = Bump::new();
        Lexer::new(source, &arena)
            .tokenize()
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    fn lexemes(source: &str) -> Vec<String> {
        let arena = Bump::new();
        Lexer::new(source, &arena)
            .tokenize()
            .unwrap()
            .iter()
            .map(|t| t.lexeme.to_string())
            .collect()
    }

    #[test]
    fn declaration_line() {
        use TokenKind::*;
        assert_eq!(
            kinds("let t0 = type(seq<int>);"),
            vec![Ident, Ident, Equals, Ident, LParen, Ident, Lt, Ident, Gt, RParen, Semicolon, Eof]
        );
    }

    #[test]
    fn comments_are_skipped() {
        let source = "// types\nlet m0 = /* metadata unavailable: x */ null;";
        assert_eq!(lexemes(source), vec!["let", "m0", "=", "null", ";", ""]);
    }

    #[test]
    fn qualified_names_are_one_identifier() {
        assert_eq!(lexemes("System.Math"), vec!["System.Math", ""]);
    }

    #[test]
    fn numbers() {
        use TokenKind::*;
        assert_eq!(kinds("-7 2.0 1e-7 nan -inf"), vec![Int, Float, Float, Float, Float, Eof]);
        assert_eq!(lexemes("-7 -inf"), vec!["-7", "-inf", ""]);
    }

    #[test]
    fn strings_are_unescaped() {
        assert_eq!(
            lexemes(r#""a\"b\\c\n\u{1}""#),
            vec!["a\"b\\c\n\u{1}".to_string(), String::new()]
        );
    }

    #[test]
    fn unterminated_string() {
        let arena = Bump::new();
        let err = Lexer::new("\"abc", &arena).tokenize().unwrap_err();
        assert_eq!(err, ReadError::UnterminatedString { span: Span::point(1, 1) });
    }

    #[test]
    fn unterminated_comment() {
        let arena = Bump::new();
        let err = Lexer::new("a /* b", &arena).tokenize().unwrap_err();
        assert!(matches!(err, ReadError::UnterminatedComment { .. }));
    }

    #[test]
    fn unexpected_character_reports_position() {
        let arena = Bump::new();
        let err = Lexer::new("a\n  #", &arena).tokenize().unwrap_err();
        assert_eq!(err, ReadError::UnexpectedChar { ch: '#', span: Span::point(2, 3) });
    }
}
