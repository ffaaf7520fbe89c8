use serde_json::Value;

use super::lexer::{Spanned, Token, tokenize};
use crate::error::ExprError;
use crate::value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Statement {
    Expr(Expr),
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
    },
    Update {
        target: Expr,
        delta: f64,
    },
}

pub(crate) fn parse_expression(source: &str) -> Result<Expr, ExprError> {
    let mut parser = Parser::new(tokenize(source)?);
    let expr = parser.expression()?;
    parser.expect_end()?;
    Ok(expr)
}

pub(crate) fn parse_statements(source: &str) -> Result<Vec<Statement>, ExprError> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut statements = Vec::new();
    while !parser.at_end() {
        if parser.eat(";") {
            continue;
        }
        statements.push(parser.statement()?);
        if !parser.at_end() && !parser.eat(";") {
            return Err(parser.unexpected("';' or end of statement"));
        }
    }
    Ok(statements)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(expr, Expr::Ident(_) | Expr::Member(..) | Expr::Index(..))
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|spanned| &spanned.token)
    }

    fn peek_punct(&self) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Punct(p)) => Some(*p),
            _ => None,
        }
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.peek_punct() == Some(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &'static str) -> ExprError {
        match self.tokens.get(self.pos) {
            Some(spanned) => ExprError::UnexpectedToken {
                found: spanned.token.describe(),
                expected,
                offset: spanned.offset,
            },
            None => ExprError::UnexpectedEnd { expected },
        }
    }

    fn expect(&mut self, punct: &'static str) -> Result<(), ExprError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.unexpected(punct))
        }
    }

    fn expect_end(&self) -> Result<(), ExprError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    fn statement(&mut self) -> Result<Statement, ExprError> {
        let expr = self.expression()?;
        let op = match self.peek_punct() {
            Some("=") => AssignOp::Set,
            Some("+=") => AssignOp::Add,
            Some("-=") => AssignOp::Sub,
            Some("*=") => AssignOp::Mul,
            Some("/=") => AssignOp::Div,
            Some(p @ ("++" | "--")) => {
                if !is_assignable(&expr) {
                    return Err(ExprError::InvalidAssignmentTarget);
                }
                self.pos += 1;
                let delta = if p == "++" { 1.0 } else { -1.0 };
                return Ok(Statement::Update {
                    target: expr,
                    delta,
                });
            }
            _ => return Ok(Statement::Expr(expr)),
        };
        if !is_assignable(&expr) {
            return Err(ExprError::InvalidAssignmentTarget);
        }
        self.pos += 1;
        let value = self.expression()?;
        Ok(Statement::Assign {
            target: expr,
            op,
            value,
        })
    }

    fn expression(&mut self) -> Result<Expr, ExprError> {
        let condition = self.logical_or()?;
        if !self.eat("?") {
            return Ok(condition);
        }
        let then = self.expression()?;
        self.expect(":")?;
        let otherwise = self.expression()?;
        Ok(Expr::Conditional(
            Box::new(condition),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn logical_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.logical_and()?;
        loop {
            let op = match self.peek_punct() {
                Some("||") => LogicalOp::Or,
                Some("??") => LogicalOp::Nullish,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.logical_and()?;
            left = Expr::Logical(op, Box::new(left), Box::new(right));
        }
    }

    fn logical_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.equality()?;
        while self.eat("&&") {
            let right = self.equality()?;
            left = Expr::Logical(LogicalOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        operators: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, ExprError>,
    ) -> Result<Expr, ExprError> {
        let mut left = next(self)?;
        loop {
            let Some(op) = self.peek_punct().and_then(|p| {
                operators
                    .iter()
                    .find(|(symbol, _)| *symbol == p)
                    .map(|(_, op)| *op)
            }) else {
                return Ok(left);
            };
            self.pos += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                ("===", BinaryOp::StrictEq),
                ("!==", BinaryOp::StrictNe),
                ("==", BinaryOp::Eq),
                ("!=", BinaryOp::Ne),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                ("<", BinaryOp::Lt),
                ("<=", BinaryOp::Le),
                (">", BinaryOp::Gt),
                (">=", BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        self.binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek_punct() {
            Some("!") => UnaryOp::Not,
            Some("-") => UnaryOp::Neg,
            Some("+") => UnaryOp::Plus,
            _ => return self.postfix(),
        };
        self.pos += 1;
        Ok(Expr::Unary(op, Box::new(self.unary()?)))
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") {
                let name = match self.peek() {
                    Some(Token::Ident(name)) => name.clone(),
                    _ => return Err(self.unexpected("property name")),
                };
                self.pos += 1;
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat("(") {
                let args = self.list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to `close`; the opening token has
    /// already been consumed.
    fn list(&mut self, close: &'static str) -> Result<Vec<Expr>, ExprError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(close) {
                return Ok(items);
            }
            self.expect(",")?;
            // trailing comma
            if self.eat(close) {
                return Ok(items);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.unexpected("expression"));
        };
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Expr::Literal(value::number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            }),
            Token::Punct("(") => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct("[") => Ok(Expr::Array(self.list("]")?)),
            Token::Punct("{") => self.object(),
            Token::Punct(_) => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }

    fn object_key(&mut self) -> Result<String, ExprError> {
        let key = match self.peek().cloned() {
            Some(Token::Str(s)) => {
                self.pos += 1;
                return Ok(s);
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                return Ok(value::format_f64(n));
            }
            Some(Token::Ident(name)) => name,
            _ => return Err(self.unexpected("object key")),
        };
        self.pos += 1;
        // class-style keys such as `text-bold`
        let mut key = key;
        while self.peek_punct() == Some("-") {
            match self.tokens.get(self.pos + 1).map(|s| &s.token) {
                Some(Token::Ident(part)) => {
                    key.push('-');
                    key.push_str(part);
                    self.pos += 2;
                }
                _ => break,
            }
        }
        Ok(key)
    }

    fn object(&mut self) -> Result<Expr, ExprError> {
        let mut entries = Vec::new();
        if self.eat("}") {
            return Ok(Expr::Object(entries));
        }
        loop {
            let key = self.object_key()?;
            self.expect(":")?;
            entries.push((key, self.expression()?));
            if self.eat("}") {
                return Ok(Expr::Object(entries));
            }
            self.expect(",")?;
            if self.eat("}") {
                return Ok(Expr::Object(entries));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.to_owned()))
    }

    #[test]
    fn precedence() {
        assert_eq!(
            parse_expression("a + b * 2").unwrap(),
            Expr::Binary(
                BinaryOp::Add,
                ident("a"),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    ident("b"),
                    Box::new(Expr::Literal(json!(2)))
                ))
            )
        );
        assert!(matches!(
            parse_expression("a && b || c").unwrap(),
            Expr::Logical(LogicalOp::Or, ..)
        ));
        assert!(matches!(
            parse_expression("a ? b : c ? d : e").unwrap(),
            Expr::Conditional(_, _, otherwise) if matches!(*otherwise, Expr::Conditional(..))
        ));
    }

    #[test]
    fn member_chains_and_calls() {
        assert_eq!(
            parse_expression("user.tags[0].toUpperCase()").unwrap(),
            Expr::Call(
                Box::new(Expr::Member(
                    Box::new(Expr::Index(
                        Box::new(Expr::Member(ident("user"), "tags".into())),
                        Box::new(Expr::Literal(json!(0)))
                    )),
                    "toUpperCase".into()
                )),
                vec![]
            )
        );
    }

    #[test]
    fn object_literals_accept_dashed_keys() {
        assert_eq!(
            parse_expression("{active: on, 'is-open': 1, text-bold: b}").unwrap(),
            Expr::Object(vec![
                ("active".into(), Expr::Ident("on".into())),
                ("is-open".into(), Expr::Literal(json!(1))),
                ("text-bold".into(), Expr::Ident("b".into())),
            ])
        );
    }

    #[test]
    fn statements() {
        let parsed = parse_statements("count += 1; $parent.total++; save(item)").unwrap();
        assert_eq!(parsed.len(), 3);
        assert!(matches!(parsed[0], Statement::Assign { op: AssignOp::Add, .. }));
        assert!(matches!(parsed[1], Statement::Update { delta, .. } if delta == 1.0));
        assert!(matches!(parsed[2], Statement::Expr(Expr::Call(..))));
    }

    #[test]
    fn errors() {
        assert_eq!(
            parse_expression("a +"),
            Err(ExprError::UnexpectedEnd {
                expected: "expression"
            })
        );
        assert!(matches!(
            parse_expression("a b"),
            Err(ExprError::UnexpectedToken { expected: "end of expression", .. })
        ));
        assert_eq!(
            parse_statements("1 = 2"),
            Err(ExprError::InvalidAssignmentTarget)
        );
        assert_eq!(
            parse_expression(""),
            Err(ExprError::UnexpectedEnd {
                expected: "expression"
            })
        );
    }
}
