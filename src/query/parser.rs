use crate::error::PtxError;
use crate::query::ast::{Agg, AggFunc, CmpOp, Expr, Literal, Query, Sort, SortDir};
use crate::query::lexer::{tokenize, Token, TokenKind};

/// Compile a query string into its AST.
///
/// Grammar: `[where] Expr [group [by] f,...] [agg...] [sort [by] f [dir]]
/// [limit n]` with case-insensitive keywords. Errors carry the byte
/// position of the offending token; nothing panics past this boundary.
pub fn parse_query(input: &str) -> Result<Query, PtxError> {
    let tokens = tokenize(input)?;
    let mut parser = QueryParser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    parser.parse()
}

struct QueryParser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl QueryParser {
    fn parse(&mut self) -> Result<Query, PtxError> {
        let mut query = Query::default();

        if self.keyword_is("where") {
            self.pos += 1;
            query.where_ = Some(self.parse_or()?);
        } else if !self.at_end() && !self.at_clause_start() {
            query.where_ = Some(self.parse_or()?);
        }

        if self.keyword_is("group") {
            self.pos += 1;
            if self.keyword_is("by") {
                self.pos += 1;
            }
            query.group.push(self.expect_ident("group field")?);
            while matches!(self.peek_kind(), Some(TokenKind::Comma)) {
                self.pos += 1;
                query.group.push(self.expect_ident("group field")?);
            }
        }

        loop {
            if self.keyword_is("count") && !self.next_is_operator() {
                self.pos += 1;
                query.aggs.push(Agg {
                    func: AggFunc::Count,
                    field: None,
                });
                continue;
            }
            let func = match () {
                _ if self.keyword_is("avg") => AggFunc::Avg,
                _ if self.keyword_is("sum") => AggFunc::Sum,
                _ if self.keyword_is("min") => AggFunc::Min,
                _ if self.keyword_is("max") => AggFunc::Max,
                _ => break,
            };
            if self.next_is_operator() {
                break;
            }
            self.pos += 1;
            let field = self.expect_ident(&format!("field after '{}'", func.name()))?;
            query.aggs.push(Agg {
                func,
                field: Some(field),
            });
        }

        if self.keyword_is("sort") {
            self.pos += 1;
            if self.keyword_is("by") {
                self.pos += 1;
            }
            let field = self.expect_ident("sort field")?;
            let dir = if self.keyword_is("asc") {
                self.pos += 1;
                SortDir::Asc
            } else if self.keyword_is("desc") {
                self.pos += 1;
                SortDir::Desc
            } else {
                SortDir::Asc
            };
            query.sort = Some(Sort { field, dir });
        }

        if self.keyword_is("limit") {
            self.pos += 1;
            match self.next() {
                Some(Token {
                    kind: TokenKind::Int(n),
                    pos,
                }) => {
                    if n < 0 {
                        return Err(self.error_at(pos, "limit must be non-negative"));
                    }
                    query.limit = Some(n as usize);
                }
                Some(token) => {
                    return Err(self.error_at(
                        token.pos,
                        format!("expected an integer after 'limit', found {}", token.kind.describe()),
                    ));
                }
                None => return Err(self.error_at(self.end, "expected an integer after 'limit'")),
            }
        }

        if let Some(token) = self.peek() {
            return Err(self.error_at(
                token.pos,
                format!("unexpected {}", token.kind.describe()),
            ));
        }
        Ok(query)
    }

    fn parse_or(&mut self) -> Result<Expr, PtxError> {
        let mut left = self.parse_and()?;
        while self.keyword_is("or") {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, PtxError> {
        let mut left = self.parse_not()?;
        while self.keyword_is("and") {
            self.pos += 1;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, PtxError> {
        if self.keyword_is("not") {
            self.pos += 1;
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, PtxError> {
        match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::LParen,
                ..
            }) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(token) => Err(self.error_at(
                        token.pos,
                        format!("expected ')', found {}", token.kind.describe()),
                    )),
                    None => Err(self.error_at(self.end, "expected ')'")),
                }
            }
            Some(Token {
                kind: TokenKind::Ident(name),
                pos,
            }) => {
                // `has(field)` presence test
                if name.eq_ignore_ascii_case("has")
                    && matches!(self.peek_kind_at(1), Some(TokenKind::LParen))
                {
                    self.pos += 2;
                    let field = self.expect_ident("field inside has(...)")?;
                    match self.next() {
                        Some(Token {
                            kind: TokenKind::RParen,
                            ..
                        }) => return Ok(Expr::Has { field }),
                        Some(token) => {
                            return Err(self.error_at(
                                token.pos,
                                format!("expected ')', found {}", token.kind.describe()),
                            ))
                        }
                        None => return Err(self.error_at(self.end, "expected ')'")),
                    }
                }
                self.pos += 1;
                self.parse_field_tail(name, pos)
            }
            Some(token) => Err(self.error_at(
                token.pos,
                format!("expected an expression, found {}", token.kind.describe()),
            )),
            None => Err(self.error_at(self.end, "expected an expression")),
        }
    }

    /// Everything that can follow a field name: a comparison, `in {...}`,
    /// or `matches "pattern"`.
    fn parse_field_tail(&mut self, field: String, field_pos: usize) -> Result<Expr, PtxError> {
        if self.keyword_is("in") {
            self.pos += 1;
            match self.next() {
                Some(Token {
                    kind: TokenKind::LBrace,
                    ..
                }) => {}
                Some(token) => {
                    return Err(self.error_at(
                        token.pos,
                        format!("expected '{{' after 'in', found {}", token.kind.describe()),
                    ))
                }
                None => return Err(self.error_at(self.end, "expected '{' after 'in'")),
            }
            let mut values = vec![self.expect_value()?];
            loop {
                match self.next() {
                    Some(Token {
                        kind: TokenKind::Comma,
                        ..
                    }) => values.push(self.expect_value()?),
                    Some(Token {
                        kind: TokenKind::RBrace,
                        ..
                    }) => break,
                    Some(token) => {
                        return Err(self.error_at(
                            token.pos,
                            format!("expected ',' or '}}', found {}", token.kind.describe()),
                        ))
                    }
                    None => return Err(self.error_at(self.end, "expected '}' after in-list")),
                }
            }
            return Ok(Expr::In { field, values });
        }

        if self.keyword_is("matches") {
            self.pos += 1;
            match self.next() {
                Some(Token {
                    kind: TokenKind::Str(pattern),
                    ..
                }) => return Ok(Expr::Match { field, pattern }),
                Some(token) => {
                    return Err(self.error_at(
                        token.pos,
                        format!("expected a pattern string, found {}", token.kind.describe()),
                    ))
                }
                None => return Err(self.error_at(self.end, "expected a pattern string")),
            }
        }

        let op = match self.peek_kind() {
            Some(TokenKind::EqEq) => CmpOp::Eq,
            Some(TokenKind::Ne) => CmpOp::Ne,
            Some(TokenKind::Lt) => CmpOp::Lt,
            Some(TokenKind::Le) => CmpOp::Le,
            Some(TokenKind::Gt) => CmpOp::Gt,
            Some(TokenKind::Ge) => CmpOp::Ge,
            _ => {
                return Err(self.error_at(
                    field_pos,
                    format!("field '{}' must be followed by a comparison, 'in', or 'matches'", field),
                ))
            }
        };
        self.pos += 1;
        let value = self.expect_value()?;
        Ok(Expr::Compare { field, op, value })
    }

    fn expect_value(&mut self) -> Result<Literal, PtxError> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Int(n),
                ..
            }) => Ok(Literal::Int(n)),
            Some(Token {
                kind: TokenKind::Float(x),
                ..
            }) => Ok(Literal::Float(x)),
            Some(Token {
                kind: TokenKind::Str(s),
                ..
            }) => Ok(Literal::Str(s)),
            Some(Token {
                kind: TokenKind::Minus,
                pos,
            }) => match self.next() {
                Some(Token {
                    kind: TokenKind::Int(n),
                    ..
                }) => Ok(Literal::Int(-n)),
                Some(Token {
                    kind: TokenKind::Float(x),
                    ..
                }) => Ok(Literal::Float(-x)),
                _ => Err(self.error_at(pos, "expected a number after '-'")),
            },
            Some(token) => Err(self.error_at(
                token.pos,
                format!("expected a value, found {}", token.kind.describe()),
            )),
            None => Err(self.error_at(self.end, "expected a value")),
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, PtxError> {
        match self.next() {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Ok(name),
            Some(token) => Err(self.error_at(
                token.pos,
                format!("expected {}, found {}", what, token.kind.describe()),
            )),
            None => Err(self.error_at(self.end, format!("expected {}", what))),
        }
    }

    /// True when the cursor sits on a clause keyword rather than a filter
    /// expression. A keyword followed by an operator is a field reference
    /// (`count > 5` filters on a field named count).
    fn at_clause_start(&self) -> bool {
        let starts_clause = ["group", "count", "avg", "sum", "min", "max", "sort", "limit"]
            .iter()
            .any(|kw| self.keyword_is(kw));
        starts_clause && !self.next_is_operator()
    }

    /// Does the token after the cursor start a field tail?
    fn next_is_operator(&self) -> bool {
        match self.peek_kind_at(1) {
            Some(
                TokenKind::EqEq
                | TokenKind::Ne
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge,
            ) => true,
            Some(TokenKind::Ident(name)) => {
                name.eq_ignore_ascii_case("in") || name.eq_ignore_ascii_case("matches")
            }
            _ => false,
        }
    }

    fn keyword_is(&self, keyword: &str) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::Ident(name)) if name.eq_ignore_ascii_case(keyword)
        )
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| &t.kind)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> PtxError {
        PtxError::QuerySyntax {
            position,
            message: message.into(),
        }
    }
}
