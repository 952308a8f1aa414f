//! Textual predicate parser
//!
//! Recursive descent over a small token stream. Precedence, loosest first:
//! `OR`, `AND`, `NOT`, then comparisons and parenthesised groups.

use super::{CompareOp, Predicate};
use crate::error::{Error, Result};
use crate::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(&'static str),
    Modifier(String),
    Placeholder(char),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidPredicate(msg.into())
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => {
                tokens.push((Token::LParen, start));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, start));
                i += 1;
            }
            '{' => {
                tokens.push((Token::LBrace, start));
                i += 1;
            }
            '}' => {
                tokens.push((Token::RBrace, start));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, start));
                i += 1;
            }
            '[' => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| invalid(format!("unterminated modifier at {}", start)))?;
                let modifier: String = chars[i + 1..i + end].iter().collect();
                tokens.push((Token::Modifier(modifier), start));
                i += end + 1;
            }
            '%' => {
                let kind = chars
                    .get(i + 1)
                    .copied()
                    .filter(|k| matches!(k, '@' | 'd' | 'f' | 's'))
                    .ok_or_else(|| invalid(format!("unknown placeholder at {}", start)))?;
                tokens.push((Token::Placeholder(kind), start));
                i += 2;
            }
            '"' | '\'' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(invalid(format!("unterminated string at {}", start))),
                        Some(&ch) if ch == c => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            if let Some(&escaped) = chars.get(i + 1) {
                                s.push(escaped);
                            }
                            i += 2;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((Token::Str(s), start));
            }
            '=' | '!' | '<' | '>' | '&' | '|' => {
                let next = chars.get(i + 1).copied();
                let (op, len) = match (c, next) {
                    ('=', Some('=')) => ("=", 2),
                    ('=', _) => ("=", 1),
                    ('!', Some('=')) => ("!=", 2),
                    ('!', _) => ("!", 1),
                    ('<', Some('=')) => ("<=", 2),
                    ('<', Some('>')) => ("!=", 2),
                    ('<', _) => ("<", 1),
                    ('>', Some('=')) => (">=", 2),
                    ('>', _) => (">", 1),
                    ('&', Some('&')) => ("&&", 2),
                    ('|', Some('|')) => ("||", 2),
                    _ => return Err(invalid(format!("unexpected '{}' at {}", c, start))),
                };
                tokens.push((Token::Op(op), start));
                i += len;
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let token = if literal.contains('.') {
                    literal
                        .parse::<f64>()
                        .map(Token::Float)
                        .map_err(|_| invalid(format!("bad number '{}' at {}", literal, start)))?
                } else {
                    literal
                        .parse::<i64>()
                        .map(Token::Int)
                        .map_err(|_| invalid(format!("bad number '{}' at {}", literal, start)))?
                };
                tokens.push((token, start));
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                tokens.push((Token::Ident(ident), start));
            }
            _ => return Err(invalid(format!("unexpected '{}' at {}", c, start))),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    params: &'a [Value],
    next_param: usize,
    len: usize,
}

pub(super) fn parse(text: &str, params: &[Value]) -> Result<Predicate> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(invalid("empty predicate"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        params,
        next_param: 0,
        len: text.len(),
    };
    let predicate = parser.parse_or()?;
    if let Some((token, at)) = parser.tokens.get(parser.pos) {
        return Err(invalid(format!("unexpected {:?} at {}", token, at)));
    }
    if parser.next_param != params.len() {
        return Err(invalid(format!(
            "predicate uses {} parameter(s) but {} were supplied",
            parser.next_param,
            params.len()
        )));
    }
    Ok(predicate)
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(_, at)| *at).unwrap_or(self.len)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn peek_op(&self, op: &str) -> bool {
        matches!(self.peek(), Some(Token::Op(o)) if *o == op)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        let at = self.offset();
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(invalid(format!(
                "expected {:?}, found {:?} at {}",
                expected, token, at
            ))),
            None => Err(invalid(format!("expected {:?}, found end of input", expected))),
        }
    }

    fn parse_or(&mut self) -> Result<Predicate> {
        let mut terms = vec![self.parse_and()?];
        while self.peek_keyword("OR") || self.peek_op("||") {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Predicate::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Predicate> {
        let mut terms = vec![self.parse_unary()?];
        while self.peek_keyword("AND") || self.peek_op("&&") {
            self.advance();
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Predicate::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<Predicate> {
        if self.peek_keyword("NOT") || self.peek_op("!") {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate> {
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        if self.peek_keyword("TRUEPREDICATE") {
            self.advance();
            return Ok(Predicate::True);
        }
        if self.peek_keyword("FALSEPREDICATE") {
            self.advance();
            return Ok(Predicate::False);
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Predicate> {
        let at = self.offset();
        let path = match self.advance() {
            Some(Token::Ident(path)) if !is_reserved(&path) => path,
            Some(token) => {
                return Err(invalid(format!("expected key path, found {:?} at {}", token, at)))
            }
            None => return Err(invalid("expected key path, found end of input")),
        };

        let at = self.offset();
        let op = match self.advance() {
            Some(Token::Op("=")) => CompareOp::Eq,
            Some(Token::Op("!=")) => CompareOp::Ne,
            Some(Token::Op("<")) => CompareOp::Lt,
            Some(Token::Op("<=")) => CompareOp::Le,
            Some(Token::Op(">")) => CompareOp::Gt,
            Some(Token::Op(">=")) => CompareOp::Ge,
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("IN") => {
                let values = self.parse_list()?;
                return Ok(Predicate::In { path, values });
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("BEGINSWITH") => {
                CompareOp::BeginsWith
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("ENDSWITH") => {
                CompareOp::EndsWith
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("CONTAINS") => {
                CompareOp::Contains
            }
            Some(token) => {
                return Err(invalid(format!("expected operator, found {:?} at {}", token, at)))
            }
            None => return Err(invalid(format!("expected operator after '{}'", path))),
        };

        let case_insensitive = self.parse_modifier()?;
        let value = self.parse_operand()?;
        Ok(Predicate::Compare {
            path,
            op,
            value,
            case_insensitive,
        })
    }

    fn parse_modifier(&mut self) -> Result<bool> {
        let at = self.offset();
        match self.peek() {
            Some(Token::Modifier(m)) => {
                let case_insensitive = match m.as_str() {
                    "c" | "cd" => true,
                    "d" => false,
                    other => return Err(invalid(format!("unknown modifier [{}] at {}", other, at))),
                };
                self.advance();
                Ok(case_insensitive)
            }
            _ => Ok(false),
        }
    }

    fn parse_operand(&mut self) -> Result<Value> {
        let at = self.offset();
        match self.advance() {
            Some(Token::Int(i)) => Ok(Value::Int(i)),
            Some(Token::Float(f)) => Ok(Value::Float(f)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Placeholder(kind)) => self.take_param(kind, at),
            Some(Token::Ident(word)) => match word.to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(Value::Bool(true)),
                "false" | "no" => Ok(Value::Bool(false)),
                "nil" | "null" => Ok(Value::Null),
                _ => Err(invalid(format!("expected a value, found '{}' at {}", word, at))),
            },
            Some(token) => Err(invalid(format!("expected a value, found {:?} at {}", token, at))),
            None => Err(invalid("expected a value, found end of input")),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Value>> {
        let at = self.offset();
        match self.peek() {
            Some(Token::Placeholder(kind)) => {
                let kind = *kind;
                self.advance();
                match self.take_param(kind, at)? {
                    Value::List(values) => Ok(values),
                    other => Err(invalid(format!(
                        "IN expects a list parameter, got {} at {}",
                        other.type_name(),
                        at
                    ))),
                }
            }
            Some(Token::LBrace) => {
                self.advance();
                let mut values = Vec::new();
                if self.peek() == Some(&Token::RBrace) {
                    self.advance();
                    return Ok(values);
                }
                loop {
                    values.push(self.parse_operand()?);
                    let at = self.offset();
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBrace) => break,
                        Some(token) => {
                            return Err(invalid(format!(
                                "expected ',' or '}}', found {:?} at {}",
                                token, at
                            )))
                        }
                        None => return Err(invalid("unterminated list")),
                    }
                }
                Ok(values)
            }
            _ => Err(invalid(format!("IN expects a list at {}", at))),
        }
    }

    fn take_param(&mut self, kind: char, at: usize) -> Result<Value> {
        let param = self.params.get(self.next_param).cloned().ok_or_else(|| {
            invalid(format!(
                "placeholder at {} has no parameter ({} supplied)",
                at,
                self.params.len()
            ))
        })?;
        self.next_param += 1;

        let value = match (kind, param) {
            ('@', v) => v,
            ('d', v @ Value::Int(_)) => v,
            ('f', Value::Int(i)) => Value::Float(i as f64),
            ('f', v @ Value::Float(_)) => v,
            ('s', v @ Value::String(_)) => v,
            (kind, other) => {
                return Err(invalid(format!(
                    "%{} at {} does not accept a {} parameter",
                    kind,
                    at,
                    other.type_name()
                )))
            }
        };
        Ok(value)
    }
}

fn is_reserved(word: &str) -> bool {
    const RESERVED: &[&str] = &[
        "AND",
        "OR",
        "NOT",
        "IN",
        "BEGINSWITH",
        "ENDSWITH",
        "CONTAINS",
        "TRUEPREDICATE",
        "FALSEPREDICATE",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Predicate {
        super::parse(text, &[]).unwrap()
    }

    #[test]
    fn test_parse_comparisons() {
        assert_eq!(parse("id < 3"), Predicate::lt("id", 3));
        assert_eq!(parse("id <= -3"), Predicate::le("id", -3));
        assert_eq!(parse("price >= 2.5"), Predicate::ge("price", 2.5));
        assert_eq!(parse("brand == 'BMW'"), Predicate::eq("brand", "BMW"));
        assert_eq!(parse("brand <> \"BMW\""), Predicate::ne("brand", "BMW"));
        assert_eq!(parse("isVIP = true"), Predicate::eq("isVIP", true));
    }

    #[test]
    fn test_parse_nil() {
        assert_eq!(parse("deceased = nil"), Predicate::is_nil("deceased"));
        assert_eq!(parse("deceased != NULL"), Predicate::ne("deceased", Value::Null));
    }

    #[test]
    fn test_parse_boolean_precedence() {
        let p = parse("a = 1 OR b = 2 AND NOT c = 3");
        let expected = Predicate::Or(vec![
            Predicate::eq("a", 1),
            Predicate::And(vec![
                Predicate::eq("b", 2),
                Predicate::Not(Box::new(Predicate::eq("c", 3))),
            ]),
        ]);
        assert_eq!(p, expected);

        let grouped = parse("(a = 1 || b = 2) && !(c = 3)");
        assert!(matches!(grouped, Predicate::And(ref terms) if terms.len() == 2));
    }

    #[test]
    fn test_parse_constants() {
        assert_eq!(parse("TRUEPREDICATE"), Predicate::True);
        assert_eq!(parse("falsepredicate"), Predicate::False);
    }

    #[test]
    fn test_parse_in_list() {
        assert_eq!(
            parse("id IN {1, 2, 3}"),
            Predicate::in_list("id", [1, 2, 3])
        );
        assert_eq!(parse("id IN {}"), Predicate::in_list("id", Vec::<i64>::new()));

        let ids = Value::from(vec!["a", "b"]);
        assert_eq!(
            super::parse("stickers IN %@", &[ids]).unwrap(),
            Predicate::in_list("stickers", ["a", "b"])
        );
    }

    #[test]
    fn test_parse_string_ops_and_modifier() {
        assert_eq!(
            parse("firstName BEGINSWITH[c] 'ma'"),
            Predicate::compare("firstName", CompareOp::BeginsWith, "ma").ignoring_case()
        );
        assert_eq!(
            parse("name endswith 'son'"),
            Predicate::compare("name", CompareOp::EndsWith, "son")
        );
        assert_eq!(
            parse("owner.name CONTAINS 'ar'"),
            Predicate::compare("owner.name", CompareOp::Contains, "ar")
        );
    }

    #[test]
    fn test_parse_placeholders() {
        let p = super::parse(
            "hairCount < %d AND name = %s AND weight > %f AND owner = %@",
            &[
                Value::Int(1000),
                Value::from("Jane"),
                Value::Int(60),
                Value::Null,
            ],
        )
        .unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::lt("hairCount", 1000),
                Predicate::eq("name", "Jane"),
                Predicate::gt("weight", 60.0),
                Predicate::is_nil("owner"),
            ])
        );
    }

    #[test]
    fn test_parameter_arity_mismatch() {
        assert!(matches!(
            super::parse("id < %d", &[]),
            Err(Error::InvalidPredicate(_))
        ));
        assert!(matches!(
            super::parse("id < 3", &[Value::Int(1)]),
            Err(Error::InvalidPredicate(_))
        ));
        assert!(matches!(
            super::parse("id < %d", &[Value::from("x")]),
            Err(Error::InvalidPredicate(_))
        ));
    }

    #[test]
    fn test_syntax_errors() {
        for text in [
            "",
            "id <",
            "id 3",
            "(id = 3",
            "id = 3)",
            "id = 'open",
            "AND = 3",
            "id IN 3",
            "id = 3 extra",
            "id # 3",
        ] {
            assert!(
                matches!(super::parse(text, &[]), Err(Error::InvalidPredicate(_))),
                "{:?} should not parse",
                text
            );
        }
    }

    #[test]
    fn test_from_str() {
        let p: Predicate = "id > 1".parse().unwrap();
        assert_eq!(p, Predicate::gt("id", 1));
    }
}
