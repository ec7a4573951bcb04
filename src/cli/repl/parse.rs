//! REPL line parser.
//!
//! ```text
//! line  := ":" command | "import" NAME ["as" IDENT] | IDENT "=" expr | expr
//! expr  := atom ("." IDENT | "(" [expr ("," expr)*] ")")*
//! atom  := IDENT | INT | FLOAT | STRING | True | False | None | "(" expr ")"
//! ```

use thiserror::Error;

use crate::runtime::Value;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("syntax error at column {column}: {message}")]
pub struct ParseError {
    pub column: usize,
    pub message: String,
}

impl ParseError {
    fn new(column: usize, message: impl Into<String>) -> Self {
        Self {
            column,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Attr(Box<Expr>, String),
    Call(Box<Expr>, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Empty,
    Quit,
    Help,
    Modules,
    Gc,
    Import { module: String, alias: Option<String> },
    Assign { name: String, expr: Expr },
    Eval(Expr),
}

pub fn parse_line(line: &str) -> Result<Line, ParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(Line::Empty);
    }

    if let Some(command) = line.strip_prefix(':') {
        return match command.trim() {
            "q" | "quit" | "exit" => Ok(Line::Quit),
            "h" | "help" => Ok(Line::Help),
            "m" | "modules" => Ok(Line::Modules),
            "gc" => Ok(Line::Gc),
            other => Err(ParseError::new(1, format!("unknown command `:{other}`"))),
        };
    }

    let tokens = tokenize(line)?;
    let mut parser = Parser { tokens, pos: 0 };

    if parser.peek_ident() == Some("import") {
        parser.pos += 1;
        return parser.import();
    }

    if let [(_, Token::Ident(name)), (_, Token::Eq), ..] = parser.tokens.as_slice() {
        let name = name.clone();
        parser.pos += 2;
        let expr = parser.expr()?;
        parser.finish()?;
        return Ok(Line::Assign { name, expr });
    }

    let expr = parser.expr()?;
    parser.finish()?;
    Ok(Line::Eval(expr))
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Dot,
    LParen,
    RParen,
    Comma,
    Eq,
}

fn tokenize(line: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let chars: Vec<char> = line.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = i + 1;
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => push(&mut tokens, &mut i, column, Token::Dot),
            '(' => push(&mut tokens, &mut i, column, Token::LParen),
            ')' => push(&mut tokens, &mut i, column, Token::RParen),
            ',' => push(&mut tokens, &mut i, column, Token::Comma),
            '=' => push(&mut tokens, &mut i, column, Token::Eq),
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ParseError::new(column, "unterminated string")),
                        Some(&ch) if ch == quote => break,
                        Some('\\') => {
                            let escaped = match chars.get(i + 1) {
                                Some('n') => '\n',
                                Some('t') => '\t',
                                Some(&other) => other,
                                None => {
                                    return Err(ParseError::new(column, "unterminated string"));
                                }
                            };
                            text.push(escaped);
                            i += 2;
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                i += 1;
                tokens.push((column, Token::Str(text)));
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut float = false;
                if chars.get(i) == Some(&'.') && next_is_digit(&chars, i) {
                    float = true;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let token = if float {
                    text.parse().map(Token::Float).ok()
                } else {
                    text.parse().map(Token::Int).ok()
                };
                let token =
                    token.ok_or_else(|| ParseError::new(column, format!("bad number `{text}`")))?;
                tokens.push((column, token));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push((column, Token::Ident(chars[start..i].iter().collect())));
            }
            other => return Err(ParseError::new(column, format!("unexpected `{other}`"))),
        }
    }

    Ok(tokens)
}

#[inline]
fn push(tokens: &mut Vec<(usize, Token)>, i: &mut usize, column: usize, token: Token) {
    tokens.push((column, token));
    *i += 1;
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(char::is_ascii_digit)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_ident(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Ident(name)) => Some(name),
            _ => None,
        }
    }

    fn column(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(1, |(c, _)| *c)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.column(), message)
    }

    fn ident(&mut self) -> Result<String, ParseError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            _ => Err(self.error("expected a name")),
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ParseError> {
        if self.peek() == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected `{what}`")))
        }
    }

    fn finish(&self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(_) => Err(self.error("unexpected trailing input")),
        }
    }

    fn import(&mut self) -> Result<Line, ParseError> {
        let mut module = self.ident()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            module.push('.');
            module.push_str(&self.ident()?);
        }

        let alias = if self.peek_ident() == Some("as") {
            self.pos += 1;
            Some(self.ident()?)
        } else {
            None
        };

        self.finish()?;
        Ok(Line::Import { module, alias })
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    expr = Expr::Attr(Box::new(expr), self.ident()?);
                }
                Some(Token::LParen) => {
                    self.pos += 1;
                    let args = self.args()?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::RParen) => return Ok(args),
                _ => {
                    self.pos -= 1;
                    return Err(self.error("expected `,` or `)`"));
                }
            }
        }
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let column = self.column();
        let expr = match self.next() {
            Some(Token::Ident(name)) => match name.as_str() {
                "True" => Expr::Literal(Value::Bool(true)),
                "False" => Expr::Literal(Value::Bool(false)),
                "None" => Expr::Literal(Value::None),
                _ => Expr::Name(name),
            },
            Some(Token::Int(i)) => Expr::Literal(Value::Int(i)),
            Some(Token::Float(x)) => Expr::Literal(Value::Float(x)),
            Some(Token::Str(s)) => Expr::Literal(Value::Str(s)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen, ")")?;
                inner
            }
            _ => return Err(ParseError::new(column, "expected an expression")),
        };
        Ok(expr)
    }
}
