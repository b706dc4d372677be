use crate::error::PtxError;

/// Token kinds shared by the query grammar and the eval expression
/// language (which adds the arithmetic and assignment symbols).
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    EqEq,
    Ne,
    Le,
    Ge,
    Lt,
    Gt,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    Semicolon,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{}'", name),
            TokenKind::Int(n) => format!("number {}", n),
            TokenKind::Float(x) => format!("number {}", x),
            TokenKind::Str(s) => format!("string \"{}\"", s),
            TokenKind::EqEq => "'=='".to_string(),
            TokenKind::Ne => "'!='".to_string(),
            TokenKind::Le => "'<='".to_string(),
            TokenKind::Ge => "'>='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Plus => "'+'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
            TokenKind::Star => "'*'".to_string(),
            TokenKind::Slash => "'/'".to_string(),
            TokenKind::Assign => "'='".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
        }
    }
}

/// A token plus the byte position it started at, for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

fn syntax_error(position: usize, message: impl Into<String>) -> PtxError {
    PtxError::QuerySyntax {
        position,
        message: message.into(),
    }
}

/// Tokenize a query or eval string. Identifiers allow interior dots so
/// flattened field names (`req.method`) stay addressable.
pub fn tokenize(input: &str) -> Result<Vec<Token>, PtxError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let pos = i;
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                i += 1;
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, pos });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, pos });
                i += 1;
            }
            '{' => {
                tokens.push(Token { kind: TokenKind::LBrace, pos });
                i += 1;
            }
            '}' => {
                tokens.push(Token { kind: TokenKind::RBrace, pos });
                i += 1;
            }
            ',' => {
                tokens.push(Token { kind: TokenKind::Comma, pos });
                i += 1;
            }
            ';' => {
                tokens.push(Token { kind: TokenKind::Semicolon, pos });
                i += 1;
            }
            '+' => {
                tokens.push(Token { kind: TokenKind::Plus, pos });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Minus, pos });
                i += 1;
            }
            '*' => {
                tokens.push(Token { kind: TokenKind::Star, pos });
                i += 1;
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Slash, pos });
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::EqEq, pos });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Assign, pos });
                    i += 1;
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Ne, pos });
                    i += 2;
                } else {
                    return Err(syntax_error(pos, "expected '=' after '!'"));
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Le, pos });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Lt, pos });
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token { kind: TokenKind::Ge, pos });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Gt, pos });
                    i += 1;
                }
            }
            '"' | '\'' => {
                let (s, next) = lex_string(input, i)?;
                tokens.push(Token { kind: TokenKind::Str(s), pos });
                i = next;
            }
            '0'..='9' => {
                let (kind, next) = lex_number(input, i)?;
                tokens.push(Token { kind, pos });
                i = next;
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let (name, next) = lex_ident(input, i);
                tokens.push(Token { kind: TokenKind::Ident(name), pos });
                i = next;
            }
            '@' => {
                // Field names like `@timestamp` come straight from
                // structured inputs; accept the sigil as an ident head.
                let (name, next) = lex_ident(input, i + 1);
                tokens.push(Token {
                    kind: TokenKind::Ident(format!("@{}", name)),
                    pos,
                });
                i = next;
            }
            other => {
                return Err(syntax_error(pos, format!("unexpected character '{}'", other)));
            }
        }
    }
    Ok(tokens)
}

fn lex_string(input: &str, start: usize) -> Result<(String, usize), PtxError> {
    let bytes = input.as_bytes();
    let quote = bytes[start];
    let mut out = String::new();
    let mut i = start + 1;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b'\\' {
            let escaped = bytes.get(i + 1).copied().ok_or_else(|| {
                syntax_error(i, "dangling escape at end of string")
            })?;
            out.push(match escaped {
                b'n' => '\n',
                b't' => '\t',
                other => other as char,
            });
            i += 2;
        } else if c == quote {
            return Ok((out, i + 1));
        } else {
            // Multi-byte characters pass through untouched.
            let ch_len = input[i..].chars().next().map(char::len_utf8).unwrap_or(1);
            out.push_str(&input[i..i + ch_len]);
            i += ch_len;
        }
    }
    Err(syntax_error(start, "unterminated string"))
}

fn lex_number(input: &str, start: usize) -> Result<(TokenKind, usize), PtxError> {
    let bytes = input.as_bytes();
    let mut i = start;
    let mut saw_dot = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => i += 1,
            b'.' if !saw_dot && matches!(bytes.get(i + 1), Some(b'0'..=b'9')) => {
                saw_dot = true;
                i += 1;
            }
            _ => break,
        }
    }
    let text = &input[start..i];
    if saw_dot {
        text.parse::<f64>()
            .map(|x| (TokenKind::Float(x), i))
            .map_err(|_| syntax_error(start, format!("bad number '{}'", text)))
    } else {
        text.parse::<i64>()
            .map(|n| (TokenKind::Int(n), i))
            .map_err(|_| syntax_error(start, format!("number '{}' out of range", text)))
    }
}

fn lex_ident(input: &str, start: usize) -> (String, usize) {
    let bytes = input.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        match bytes[i] {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' => i += 1,
            // Interior dot continues a flattened field name.
            b'.' if matches!(bytes.get(i + 1), Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) => {
                i += 1
            }
            _ => break,
        }
    }
    (input[start..i].to_string(), i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_operators_and_symbols() {
        assert_eq!(
            kinds("== != <= >= < > ( ) { } , = ;"),
            vec![
                TokenKind::EqEq,
                TokenKind::Ne,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::Comma,
                TokenKind::Assign,
                TokenKind::Semicolon,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42"), vec![TokenKind::Int(42)]);
        assert_eq!(kinds("2.5"), vec![TokenKind::Float(2.5)]);
        // The sign is its own token; the parser folds it into the literal.
        assert_eq!(
            kinds("-7"),
            vec![TokenKind::Minus, TokenKind::Int(7)]
        );
    }

    #[test]
    fn test_strings_both_quotes_and_escapes() {
        assert_eq!(kinds(r#""GET""#), vec![TokenKind::Str("GET".into())]);
        assert_eq!(kinds("'POST'"), vec![TokenKind::Str("POST".into())]);
        assert_eq!(
            kinds(r#""a\"b\n""#),
            vec![TokenKind::Str("a\"b\n".into())]
        );
    }

    #[test]
    fn test_dotted_and_sigil_idents() {
        assert_eq!(
            kinds("req.method @timestamp plain"),
            vec![
                TokenKind::Ident("req.method".into()),
                TokenKind::Ident("@timestamp".into()),
                TokenKind::Ident("plain".into()),
            ]
        );
    }

    #[test]
    fn test_positions_are_byte_offsets() {
        let tokens = tokenize("status >= 500").unwrap();
        assert_eq!(tokens[0].pos, 0);
        assert_eq!(tokens[1].pos, 7);
        assert_eq!(tokens[2].pos, 10);
    }

    #[test]
    fn test_errors_carry_positions() {
        match tokenize("status # 5") {
            Err(PtxError::QuerySyntax { position, .. }) => assert_eq!(position, 7),
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(tokenize("\"unterminated").is_err());
        assert!(tokenize("a ! b").is_err());
    }
}
