use super::ExprError;
use super::lexer::{Tok, Token, tokenize};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Cond(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl BinaryOp {
    fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "||" => Self::Or,
            "&&" => Self::And,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "^" => Self::Pow,
            _ => return None,
        })
    }

    /// Binding power; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne => 3,
            Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Mod => 6,
            Self::Pow => 7,
        }
    }

    fn right_assoc(self) -> bool {
        self == Self::Pow
    }
}

/// Parse a full expression; an optional leading `=` is accepted.
pub fn parse_expr(src: &str) -> Result<Expr, ExprError> {
    let body = src.trim_start();
    let skip = src.len() - body.len();
    let (body, skip) = match body.strip_prefix('=') {
        Some(b) => (b, skip + 1),
        None => (body, skip),
    };
    let tokens = tokenize(body).map_err(|e| ExprError::new(e.offset + skip, e.message))?;
    let mut p = Parser { tokens, pos: 0 };
    let e = p.conditional().map_err(|e| ExprError::new(e.offset + skip, e.message))?;
    if p.peek() != &Tok::End {
        return Err(ExprError::new(
            p.offset() + skip,
            format!("unexpected trailing {:?}", p.peek()),
        ));
    }
    Ok(e)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].at
    }

    fn next(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if t.tok != Tok::End {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), ExprError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(ExprError::new(
                self.offset(),
                format!("expected {what}, found {:?}", self.peek()),
            ))
        }
    }

    fn conditional(&mut self) -> Result<Expr, ExprError> {
        let cond = self.binary(1)?;
        if !self.eat(&Tok::Question) {
            return Ok(cond);
        }
        let yes = self.conditional()?;
        self.expect(Tok::Colon, "':'")?;
        let no = self.conditional()?;
        Ok(Expr::Cond(Box::new(cond), Box::new(yes), Box::new(no)))
    }

    /// Precedence climbing over binary operators of at least `min` precedence.
    fn binary(&mut self, min: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Op(s) => match BinaryOp::from_symbol(s) {
                    Some(op) if op.precedence() >= min => op,
                    _ => break,
                },
                _ => break,
            };
            self.pos += 1;
            let next_min = if op.right_assoc() {
                op.precedence()
            } else {
                op.precedence() + 1
            };
            let rhs = self.binary(next_min)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Tok::Op("-") => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)))
            }
            Tok::Op("!") => {
                self.pos += 1;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let t = self.next();
        match t.tok {
            Tok::Num(v) => Ok(Expr::Num(v)),
            Tok::Ident(name) => {
                if !self.eat(&Tok::LParen) {
                    return Ok(Expr::Var(name));
                }
                let mut args = Vec::new();
                if !self.eat(&Tok::RParen) {
                    loop {
                        args.push(self.conditional()?);
                        if self.eat(&Tok::Comma) {
                            continue;
                        }
                        self.expect(Tok::RParen, "')'")?;
                        break;
                    }
                }
                Ok(Expr::Call(name, args))
            }
            Tok::LParen => {
                let e = self.conditional()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(e)
            }
            other => Err(ExprError::new(t.at, format!("unexpected {other:?}"))),
        }
    }
}
