use crate::error::{PtxError, TransformFault};
use crate::event::{Event, Value};
use crate::query::ast::CmpOp;
use crate::query::lexer::{tokenize, Token, TokenKind};
use colored::Colorize;
use std::cmp::Ordering;

/// A per-event transform: pure function from event to event-or-drop.
/// Faults are recoverable; the chain catches them and passes the event
/// through unchanged.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, event: &Event) -> Result<Option<Event>, TransformFault>;
}

/// Ordered chain of transforms. `None` from any stage drops the event;
/// a fault at stage i warns and hands stage i+1 the event stage i saw.
#[derive(Default)]
pub struct TransformChain {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn apply(&self, events: Vec<Event>) -> Vec<Event> {
        if self.transforms.is_empty() {
            return events;
        }
        events
            .into_iter()
            .filter_map(|event| self.apply_one(event))
            .collect()
    }

    fn apply_one(&self, mut event: Event) -> Option<Event> {
        for transform in &self.transforms {
            match transform.apply(&event) {
                Ok(Some(next)) => event = next,
                Ok(None) => return None,
                Err(fault) => {
                    eprintln!("{} {}", "warning:".yellow().bold(), fault);
                }
            }
        }
        Some(event)
    }
}

/// Operators of the eval arithmetic layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Expression tree of the eval language. The operator set is closed:
/// arithmetic, comparisons inside `if`, and the listed string helpers.
/// There is deliberately no way to run arbitrary code.
#[derive(Debug, Clone, PartialEq)]
enum EvalExpr {
    Lit(Value),
    Field(String),
    Neg(Box<EvalExpr>),
    Bin {
        op: BinOp,
        left: Box<EvalExpr>,
        right: Box<EvalExpr>,
    },
    If {
        cond_left: Box<EvalExpr>,
        cond_op: CmpOp,
        cond_right: Box<EvalExpr>,
        then_branch: Box<EvalExpr>,
        else_branch: Box<EvalExpr>,
    },
    Upper(Box<EvalExpr>),
    Lower(Box<EvalExpr>),
    Len(Box<EvalExpr>),
    Concat(Vec<EvalExpr>),
}

#[derive(Debug, Clone, PartialEq)]
struct Assignment {
    field: String,
    expr: EvalExpr,
}

/// `--eval` transform: one or more `field = expr` assignments separated
/// by `;`, applied left to right against the event's fields.
pub struct EvalTransform {
    source: String,
    assignments: Vec<Assignment>,
}

impl EvalTransform {
    pub fn parse(input: &str) -> Result<Self, PtxError> {
        let tokens = tokenize(input)?;
        let mut parser = EvalParser {
            tokens,
            pos: 0,
            end: input.len(),
        };
        let assignments = parser.parse_program()?;
        Ok(Self {
            source: input.to_string(),
            assignments,
        })
    }

    fn fault(&self, message: impl Into<String>) -> TransformFault {
        TransformFault {
            transform: format!("eval({})", self.source),
            message: message.into(),
        }
    }

    fn eval(&self, expr: &EvalExpr, event: &Event) -> Result<Value, TransformFault> {
        match expr {
            EvalExpr::Lit(value) => Ok(value.clone()),
            EvalExpr::Field(name) => event
                .field(name)
                .cloned()
                .ok_or_else(|| self.fault(format!("unknown field '{}'", name))),
            EvalExpr::Neg(inner) => {
                let value = self.eval(inner, event)?;
                let x = value
                    .as_numeric()
                    .ok_or_else(|| self.fault(format!("cannot negate '{}'", value.render())))?;
                Ok(crate::exec::number_value(-x))
            }
            EvalExpr::Bin { op, left, right } => {
                let lhs = self.eval(left, event)?;
                let rhs = self.eval(right, event)?;
                let (a, b) = match (lhs.as_numeric(), rhs.as_numeric()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => {
                        return Err(self.fault(format!(
                            "non-numeric operand: '{}' / '{}'",
                            lhs.render(),
                            rhs.render()
                        )))
                    }
                };
                let result = match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => {
                        if b == 0.0 {
                            return Err(self.fault("division by zero"));
                        }
                        a / b
                    }
                };
                Ok(crate::exec::number_value(result))
            }
            EvalExpr::If {
                cond_left,
                cond_op,
                cond_right,
                then_branch,
                else_branch,
            } => {
                let lhs = self.eval(cond_left, event)?;
                let rhs = self.eval(cond_right, event)?;
                let ord = match (lhs.as_numeric(), rhs.as_numeric()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                    _ => lhs.render().cmp(&rhs.render()),
                };
                let truth = match cond_op {
                    CmpOp::Eq => ord == Ordering::Equal,
                    CmpOp::Ne => ord != Ordering::Equal,
                    CmpOp::Lt => ord == Ordering::Less,
                    CmpOp::Le => ord != Ordering::Greater,
                    CmpOp::Gt => ord == Ordering::Greater,
                    CmpOp::Ge => ord != Ordering::Less,
                };
                if truth {
                    self.eval(then_branch, event)
                } else {
                    self.eval(else_branch, event)
                }
            }
            EvalExpr::Upper(inner) => Ok(Value::Str(self.eval(inner, event)?.render().to_uppercase())),
            EvalExpr::Lower(inner) => Ok(Value::Str(self.eval(inner, event)?.render().to_lowercase())),
            EvalExpr::Len(inner) => {
                let value = self.eval(inner, event)?;
                let len = match &value {
                    Value::List(items) => items.len(),
                    other => other.render().chars().count(),
                };
                Ok(Value::Int(len as i64))
            }
            EvalExpr::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&self.eval(part, event)?.render());
                }
                Ok(Value::Str(out))
            }
        }
    }
}

impl Transform for EvalTransform {
    fn name(&self) -> &str {
        "eval"
    }

    fn apply(&self, event: &Event) -> Result<Option<Event>, TransformFault> {
        let mut next = event.clone();
        for assignment in &self.assignments {
            let value = self.eval(&assignment.expr, &next)?;
            next.fields.insert(assignment.field.clone(), value);
        }
        Ok(Some(next))
    }
}

struct EvalParser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl EvalParser {
    fn parse_program(&mut self) -> Result<Vec<Assignment>, PtxError> {
        let mut assignments = vec![self.parse_assignment()?];
        while matches!(self.peek_kind(), Some(TokenKind::Semicolon)) {
            self.pos += 1;
            if self.peek_kind().is_none() {
                break;
            }
            assignments.push(self.parse_assignment()?);
        }
        if let Some(token) = self.peek() {
            return Err(self.error_at(token.pos, format!("unexpected {}", token.kind.describe())));
        }
        Ok(assignments)
    }

    fn parse_assignment(&mut self) -> Result<Assignment, PtxError> {
        let field = match self.next() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => name,
            Some(token) => {
                return Err(self.error_at(
                    token.pos,
                    format!("expected a field name, found {}", token.kind.describe()),
                ))
            }
            None => return Err(self.error_at(self.end, "expected a field name")),
        };
        match self.next() {
            Some(Token {
                kind: TokenKind::Assign,
                ..
            }) => {}
            Some(token) => {
                return Err(self.error_at(
                    token.pos,
                    format!("expected '=', found {}", token.kind.describe()),
                ))
            }
            None => return Err(self.error_at(self.end, "expected '='")),
        }
        let expr = self.parse_arith()?;
        Ok(Assignment { field, expr })
    }

    fn parse_arith(&mut self) -> Result<EvalExpr, PtxError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = EvalExpr::Bin {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<EvalExpr, PtxError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_factor()?;
            left = EvalExpr::Bin {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<EvalExpr, PtxError> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Int(n),
                ..
            }) => Ok(EvalExpr::Lit(Value::Int(n))),
            Some(Token {
                kind: TokenKind::Float(x),
                ..
            }) => Ok(EvalExpr::Lit(Value::Float(x))),
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => Ok(EvalExpr::Lit(Value::Str(s))),
            Some(Token {
                kind: TokenKind::Minus,
                ..
            }) => Ok(EvalExpr::Neg(Box::new(self.parse_factor()?))),
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {
                let inner = self.parse_arith()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token {
                kind: TokenKind::Ident(name),
                pos,
            }) => {
                if matches!(self.peek_kind(), Some(TokenKind::LParen)) {
                    self.pos += 1;
                    return self.parse_call(&name, pos);
                }
                Ok(EvalExpr::Field(name))
            }
            Some(token) => Err(self.error_at(
                token.pos,
                format!("expected an expression, found {}", token.kind.describe()),
            )),
            None => Err(self.error_at(self.end, "expected an expression")),
        }
    }

    fn parse_call(&mut self, name: &str, pos: usize) -> Result<EvalExpr, PtxError> {
        match name.to_lowercase().as_str() {
            "upper" | "lower" | "len" => {
                let arg = self.parse_arith()?;
                self.expect_rparen()?;
                Ok(match name.to_lowercase().as_str() {
                    "upper" => EvalExpr::Upper(Box::new(arg)),
                    "lower" => EvalExpr::Lower(Box::new(arg)),
                    _ => EvalExpr::Len(Box::new(arg)),
                })
            }
            "concat" => {
                let mut parts = vec![self.parse_arith()?];
                while matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                    self.pos += 1;
                    parts.push(self.parse_arith()?);
                }
                self.expect_rparen()?;
                if parts.len() < 2 {
                    return Err(self.error_at(pos, "concat needs at least two arguments"));
                }
                Ok(EvalExpr::Concat(parts))
            }
            "if" => {
                let cond_left = self.parse_arith()?;
                let cond_op = match self.next() {
                    Some(Token {
                        kind: TokenKind::EqEq,
                        ..
                    }) => CmpOp::Eq,
                    Some(Token {
                        kind: TokenKind::Ne, ..
                    }) => CmpOp::Ne,
                    Some(Token {
                        kind: TokenKind::Lt, ..
                    }) => CmpOp::Lt,
                    Some(Token {
                        kind: TokenKind::Le, ..
                    }) => CmpOp::Le,
                    Some(Token {
                        kind: TokenKind::Gt, ..
                    }) => CmpOp::Gt,
                    Some(Token {
                        kind: TokenKind::Ge, ..
                    }) => CmpOp::Ge,
                    Some(token) => {
                        return Err(self.error_at(
                            token.pos,
                            format!("expected a comparison in if(), found {}", token.kind.describe()),
                        ))
                    }
                    None => return Err(self.error_at(self.end, "expected a comparison in if()")),
                };
                let cond_right = self.parse_arith()?;
                self.expect_comma()?;
                let then_branch = self.parse_arith()?;
                self.expect_comma()?;
                let else_branch = self.parse_arith()?;
                self.expect_rparen()?;
                Ok(EvalExpr::If {
                    cond_left: Box::new(cond_left),
                    cond_op,
                    cond_right: Box::new(cond_right),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                })
            }
            other => Err(self.error_at(pos, format!("unknown function '{}'", other))),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), PtxError> {
        match self.next() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => Ok(()),
            Some(token) => Err(self.error_at(
                token.pos,
                format!("expected ')', found {}", token.kind.describe()),
            )),
            None => Err(self.error_at(self.end, "expected ')'")),
        }
    }

    fn expect_comma(&mut self) -> Result<(), PtxError> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Comma,
                ..
            }) => Ok(()),
            Some(token) => Err(self.error_at(
                token.pos,
                format!("expected ',', found {}", token.kind.describe()),
            )),
            None => Err(self.error_at(self.end, "expected ','")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> PtxError {
        PtxError::QuerySyntax {
            position,
            message: message.into(),
        }
    }
}
