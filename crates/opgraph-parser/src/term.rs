//! Term trees of the rendering dialect.
//!
//! ```text
//! document := { "let" IDENT "=" term ";" } term EOF
//! term     := IDENT [ "<" term ">" ]          // name or generic type
//!           | IDENT { "|" IDENT }             // flag set
//!           | IDENT "(" [ term { "," term } ] ")"
//!           | "[" [ term { "," term } ] "]"
//!           | INT | FLOAT | STRING
//! ```
//!
//! Terms are bump-allocated and `Copy`; the whole tree is freed with the
//! arena.

use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;

use opgraph_core::{ReadError, Span};

use crate::lexer::{Lexer, Token, TokenKind};

/// A term with its position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Term<'a> {
    pub kind: TermKind<'a>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TermKind<'a> {
    Ident(&'a str),
    Int(i64),
    Float(f64),
    Str(&'a str),
    List(&'a [Term<'a>]),
    /// Two or more names joined by `|`.
    Flags(&'a [&'a str]),
    /// `seq<int>`
    Generic { head: &'a str, arg: &'a Term<'a> },
    /// `head(args...)`
    Apply { head: &'a str, args: &'a [Term<'a>] },
}

impl<'a> Term<'a> {
    /// The identifier, if this term is one.
    pub fn as_ident(&self) -> Option<&'a str> {
        match self.kind {
            TermKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Head and arguments, if this term is an application.
    pub fn as_apply(&self) -> Option<(&'a str, &'a [Term<'a>])> {
        match self.kind {
            TermKind::Apply { head, args } => Some((head, args)),
            _ => None,
        }
    }
}

/// One `let name = value;` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Declaration<'a> {
    pub name: &'a str,
    pub value: Term<'a>,
    pub span: Span,
}

/// A parsed rendering: hoisted declarations, then the body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Document<'a> {
    pub declarations: &'a [Declaration<'a>],
    pub body: Term<'a>,
}

/// Parse rendered text into a [`Document`] allocated in `arena`.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn parse_document<'a>(source: &str, arena: &'a Bump) -> Result<Document<'a>, ReadError> {
    let tokens = Lexer::new(source, arena).tokenize()?;
    let mut parser = Parser {
        tokens: tokens.into_bump_slice(),
        pos: 0,
        arena,
    };
    parser.document()
}

struct Parser<'a> {
    tokens: &'a [Token<'a>],
    pos: usize,
    arena: &'a Bump,
}

impl<'a> Parser<'a> {
    // ==========================================================================
    // Token access
    // ==========================================================================

    fn peek(&self) -> Token<'a> {
        self.peek_nth(0)
    }

    /// Never runs past the trailing `Eof`.
    fn peek_nth(&self, n: usize) -> Token<'a> {
        let last = self.tokens.len().saturating_sub(1);
        match self.tokens.get((self.pos + n).min(last)) {
            Some(token) => *token,
            None => Token::new(TokenKind::Eof, "", Span::default()),
        }
    }

    fn advance(&mut self) -> Token<'a> {
        let token = self.peek();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'a>, ReadError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> ReadError {
        let found = self.peek();
        if found.kind == TokenKind::Eof {
            ReadError::UnexpectedEof {
                expected: expected.to_string(),
            }
        } else {
            ReadError::Expected {
                expected: expected.to_string(),
                found: found.describe(),
                span: found.span,
            }
        }
    }

    // ==========================================================================
    // Grammar
    // ==========================================================================

    fn document(&mut self) -> Result<Document<'a>, ReadError> {
        let mut declarations = BumpVec::new_in(self.arena);
        while self.is_declaration() {
            let span = self.advance().span;
            let name = self.expect(TokenKind::Ident)?.lexeme;
            self.expect(TokenKind::Equals)?;
            let value = self.term()?;
            self.expect(TokenKind::Semicolon)?;
            declarations.push(Declaration { name, value, span });
        }
        let body = self.term()?;
        self.expect(TokenKind::Eof)?;
        Ok(Document {
            declarations: declarations.into_bump_slice(),
            body,
        })
    }

    /// `let NAME =` ahead.
    fn is_declaration(&self) -> bool {
        let first = self.peek();
        first.kind == TokenKind::Ident
            && first.lexeme == "let"
            && self.peek_nth(1).kind == TokenKind::Ident
            && self.peek_nth(2).kind == TokenKind::Equals
    }

    fn term(&mut self) -> Result<Term<'a>, ReadError> {
        let token = self.peek();
        let kind = match token.kind {
            TokenKind::Ident => return self.named_term(),
            TokenKind::Int => {
                self.advance();
                let value = token.lexeme.parse::<i64>().map_err(|e| ReadError::InvalidNumber {
                    span: token.span,
                    detail: e.to_string(),
                })?;
                TermKind::Int(value)
            }
            TokenKind::Float => {
                self.advance();
                TermKind::Float(parse_float(token)?)
            }
            TokenKind::Str => {
                self.advance();
                TermKind::Str(token.lexeme)
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.list(TokenKind::RBracket)?;
                TermKind::List(items)
            }
            _ => return Err(self.unexpected("a term")),
        };
        Ok(Term {
            kind,
            span: token.span,
        })
    }

    /// Identifier, flag set, generic type or application.
    fn named_term(&mut self) -> Result<Term<'a>, ReadError> {
        let head = self.advance();
        let kind = match self.peek().kind {
            TokenKind::LParen => {
                self.advance();
                let args = self.list(TokenKind::RParen)?;
                TermKind::Apply {
                    head: head.lexeme,
                    args,
                }
            }
            TokenKind::Lt => {
                self.advance();
                let arg = self.term()?;
                self.expect(TokenKind::Gt)?;
                TermKind::Generic {
                    head: head.lexeme,
                    arg: self.arena.alloc(arg),
                }
            }
            TokenKind::Pipe => {
                let mut names = BumpVec::new_in(self.arena);
                names.push(head.lexeme);
                while self.eat(TokenKind::Pipe) {
                    names.push(self.expect(TokenKind::Ident)?.lexeme);
                }
                TermKind::Flags(names.into_bump_slice())
            }
            _ => TermKind::Ident(head.lexeme),
        };
        Ok(Term {
            kind,
            span: head.span,
        })
    }

    /// Comma-separated terms up to `close`; the opener is already consumed.
    fn list(&mut self, close: TokenKind) -> Result<&'a [Term<'a>], ReadError> {
        let mut items = BumpVec::new_in(self.arena);
        if !self.eat(close) {
            loop {
                items.push(self.term()?);
                if self.eat(close) {
                    break;
                }
                if !self.eat(TokenKind::Comma) {
                    return Err(self.unexpected(&format!("',' or {}", close.describe())));
                }
            }
        }
        Ok(items.into_bump_slice())
    }
}

fn parse_float(token: Token<'_>) -> Result<f64, ReadError> {
    match token.lexeme {
        "nan" => Ok(f64::NAN),
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        text => text.parse::<f64>().map_err(|e| ReadError::InvalidNumber {
            span: token.span,
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_then_body() {
        let arena = Bump::new();
        let doc = parse_document(
            "let t0 = type(int);\nlet l0 = label(\"return\");\nlambda(t0, [], l0, false, block())",
            &arena,
        )
        .unwrap();
        assert_eq!(doc.declarations.len(), 2);
        assert_eq!(doc.declarations[1].name, "l0");
        let (head, args) = doc.body.as_apply().unwrap();
        assert_eq!(head, "lambda");
        assert_eq!(args.len(), 5);
        assert_eq!(args[1].kind, TermKind::List(&[]));
    }

    #[test]
    fn flags_and_generics() {
        let arena = Bump::new();
        let doc = parse_document("f(Public | NonPublic | Static, seq<iter<int>>, None)", &arena).unwrap();
        let (_, args) = doc.body.as_apply().unwrap();
        assert_eq!(args[0].kind, TermKind::Flags(&["Public", "NonPublic", "Static"]));
        match args[1].kind {
            TermKind::Generic { head: "seq", arg } => {
                assert!(matches!(arg.kind, TermKind::Generic { head: "iter", .. }));
            }
            other => panic!("expected generic, got {other:?}"),
        }
        assert_eq!(args[2].as_ident(), Some("None"));
    }

    #[test]
    fn literals() {
        let arena = Bump::new();
        let doc = parse_document("[1, -2, 2.5, \"x\", nan]", &arena).unwrap();
        let TermKind::List(items) = doc.body.kind else {
            panic!("expected list");
        };
        assert_eq!(items[1].kind, TermKind::Int(-2));
        assert_eq!(items[2].kind, TermKind::Float(2.5));
        assert_eq!(items[3].kind, TermKind::Str("x"));
        assert!(matches!(items[4].kind, TermKind::Float(f) if f.is_nan()));
    }

    #[test]
    fn missing_comma_is_reported() {
        let arena = Bump::new();
        let err = parse_document("f(a b)", &arena).unwrap_err();
        assert_eq!(
            err,
            ReadError::Expected {
                expected: "',' or ')'".to_string(),
                found: "'b'".to_string(),
                span: Span::new(1, 5, 1),
            }
        );
    }

    #[test]
    fn trailing_input_is_rejected() {
        let arena = Bump::new();
        let err = parse_document("a b", &arena).unwrap_err();
        assert!(matches!(err, ReadError::Expected { .. }));
    }

    #[test]
    fn truncated_input() {
        let arena = Bump::new();
        let err = parse_document("let t0 = type(int)", &arena).unwrap_err();
        assert_eq!(
            err,
            ReadError::UnexpectedEof {
                expected: "';'".to_string()
            }
        );
    }

    #[test]
    fn integer_overflow() {
        let arena = Bump::new();
        let err = parse_document("99999999999999999999", &arena).unwrap_err();
        assert!(matches!(err, ReadError::InvalidNumber { .. }));
    }
}
