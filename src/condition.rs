//! A small, sandboxed boolean expression dialect for edge conditions.
//!
//! This is **not** a general scripting runtime. The only name in scope is
//! `state` (the current payload), the literals `true`/`false`/`null`, and a
//! fixed set of pure, total coercion helpers (`len`, `str`, `int`, `float`,
//! `bool`, `list`, `dict`). There is no way to reach I/O, reflection,
//! imports, or loops from an expression - the grammar simply has no
//! production for them. Any parse or evaluation failure is treated as the
//! condition evaluating to `false`; it is never surfaced as a run error.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::model::state::StateData;

/// Matches the full alphabet the grammar is built from; anything outside it
/// is rejected before tokenizing.
fn whitelist_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^[\sA-Za-z0-9_'"\[\]\(\),\.\+\-\*/=!<>&|]*$"#)
            .expect("whitelist pattern is a fixed, valid regex")
    })
}

/// Evaluate `condition` against `state`.
///
/// Never fails: a malformed expression, an out-of-range index, or a type
/// mismatch all evaluate to `false`, with the reason logged at `debug`.
pub fn evaluate(condition: &str, state: &StateData) -> bool {
    match try_evaluate(condition, state) {
        Ok(value) => truthy(&value),
        Err(err) => {
            tracing::debug!(condition, error = %err, "condition evaluation failed");
            false
        }
    }
}

fn try_evaluate(condition: &str, state: &StateData) -> Result<Value, String> {
    if !is_whitelisted(condition) {
        return Err(format!("expression contains disallowed characters: {condition}"));
    }
    let tokens = lex(condition)?;
    let mut parser = Parser::new(&tokens);
    let expr = parser.parse_or()?;
    parser.expect_end()?;
    eval(&expr, state)
}

/// Reject any character outside the grammar's alphabet before tokenizing,
/// so the lexer never has to reason about what it might be looking at.
fn is_whitelisted(expr: &str) -> bool {
    whitelist_pattern().is_match(expr)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// --- Lexer ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Star,
    Slash,
    And,
    Or,
    Not,
}

fn lex(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::NotEq);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::LtEq);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::GtEq);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number literal: {text}"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

// --- AST --------------------------------------------------------------

#[derive(Debug, Clone)]
enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    State,
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
}

// --- Parser (recursive descent, lowest to highest precedence) --------------

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn expect_end(&self) -> Result<(), String> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(format!("unexpected trailing tokens at position {}", self.pos))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(BinOp::Eq),
            Some(Token::NotEq) => Some(BinOp::NotEq),
            Some(Token::Lt) => Some(BinOp::Lt),
            Some(Token::LtEq) => Some(BinOp::LtEq),
            Some(Token::Gt) => Some(BinOp::Gt),
            Some(Token::GtEq) => Some(BinOp::GtEq),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let rhs = self.parse_additive()?;
            return Ok(Expr::BinOp(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        while matches!(self.peek(), Some(Token::LBracket)) {
            self.advance();
            let index = self.parse_or()?;
            match self.advance() {
                Some(Token::RBracket) => {}
                _ => return Err("expected ']'".to_string()),
            }
            expr = Expr::Index(Box::new(expr), Box::new(index));
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance().cloned() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "state" => Ok(Expr::State),
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" | "none" => Ok(Expr::Null),
                "len" | "str" | "int" | "float" | "bool" | "list" | "dict" => {
                    self.parse_call(name)
                }
                other => Err(format!("unknown name '{other}' is not in scope")),
            },
            other => Err(format!("unexpected token: {other:?}")),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::LParen) => {}
            _ => return Err(format!("expected '(' after '{name}'")),
        }
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            args.push(self.parse_or()?);
            while matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
                args.push(self.parse_or()?);
            }
        }
        match self.advance() {
            Some(Token::RParen) => {}
            _ => return Err("expected ')'".to_string()),
        }
        Ok(Expr::Call(name, args))
    }
}

// --- Evaluator --------------------------------------------------------------

fn eval(expr: &Expr, state: &StateData) -> Result<Value, String> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Number(n) => Ok(serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::State => Ok(Value::Object(
            state
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )),
        Expr::Index(base, index) => {
            let base_val = eval(base, state)?;
            let index_val = eval(index, state)?;
            index_into(&base_val, &index_val)
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, state)?))),
        Expr::Neg(inner) => {
            let v = eval(inner, state)?;
            let n = as_f64(&v)?;
            Ok(Value::Number(
                serde_json::Number::from_f64(-n).ok_or("invalid numeric negation")?,
            ))
        }
        Expr::Call(name, args) => eval_call(name, args, state),
        Expr::BinOp(op, lhs, rhs) => eval_binop(*op, lhs, rhs, state),
    }
}

fn index_into(base: &Value, index: &Value) -> Result<Value, String> {
    match (base, index) {
        (Value::Object(map), Value::String(key)) => {
            map.get(key).cloned().ok_or_else(|| format!("key '{key}' not found"))
        }
        (Value::Array(arr), Value::Number(n)) => {
            let i = n.as_i64().ok_or("array index must be an integer")?;
            let i = usize::try_from(i).map_err(|_| "negative array index".to_string())?;
            arr.get(i).cloned().ok_or_else(|| format!("index {i} out of range"))
        }
        (Value::String(s), Value::Number(n)) => {
            let i = n.as_i64().ok_or("string index must be an integer")?;
            let i = usize::try_from(i).map_err(|_| "negative string index".to_string())?;
            s.chars()
                .nth(i)
                .map(|c| Value::String(c.to_string()))
                .ok_or_else(|| format!("index {i} out of range"))
        }
        _ => Err("value is not indexable with the given key".to_string()),
    }
}

fn eval_call(name: &str, args: &[Expr], state: &StateData) -> Result<Value, String> {
    let values = args
        .iter()
        .map(|a| eval(a, state))
        .collect::<Result<Vec<_>, _>>()?;
    let arg = values
        .first()
        .ok_or_else(|| format!("{name}() requires one argument"))?;

    match name {
        "len" => {
            let n = match arg {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                _ => return Err("len() requires a string, list, or mapping".to_string()),
            };
            Ok(Value::Number(n.into()))
        }
        "str" => Ok(Value::String(to_display_string(arg))),
        "int" => Ok(Value::Number(serde_json::Number::from(as_f64(arg)? as i64))),
        "float" => Ok(serde_json::Number::from_f64(as_f64(arg)?)
            .map(Value::Number)
            .unwrap_or(Value::Null)),
        "bool" => Ok(Value::Bool(truthy(arg))),
        "list" => match arg {
            Value::Array(_) => Ok(arg.clone()),
            Value::Null => Ok(Value::Array(vec![])),
            other => Ok(Value::Array(vec![other.clone()])),
        },
        "dict" => match arg {
            Value::Object(_) => Ok(arg.clone()),
            Value::Null => Ok(Value::Object(Map::new())),
            _ => Err("dict() requires a mapping or null".to_string()),
        },
        other => Err(format!("unknown function '{other}'")),
    }
}

fn to_display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn as_f64(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| "invalid number".to_string()),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.parse::<f64>().map_err(|_| format!("cannot coerce '{s}' to a number")),
        other => Err(format!("cannot coerce {other:?} to a number")),
    }
}

/// `Value` equality, except two numbers compare by numeric value rather
/// than by representation. `serde_json::Number` distinguishes integer and
/// float encodings (`json!(3) != json!(3.0)` under `PartialEq`), but the
/// expression dialect has no integer/float distinction of its own - every
/// literal is lexed as `f64` - so state integers must still compare equal
/// to a matching numeric literal.
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => l == r,
        },
        _ => lhs == rhs,
    }
}

fn eval_binop(op: BinOp, lhs: &Expr, rhs: &Expr, state: &StateData) -> Result<Value, String> {
    match op {
        BinOp::And => {
            let l = eval(lhs, state)?;
            if !truthy(&l) {
                return Ok(l);
            }
            eval(rhs, state)
        }
        BinOp::Or => {
            let l = eval(lhs, state)?;
            if truthy(&l) {
                return Ok(l);
            }
            eval(rhs, state)
        }
        BinOp::Eq => Ok(Value::Bool(values_equal(&eval(lhs, state)?, &eval(rhs, state)?))),
        BinOp::NotEq => Ok(Value::Bool(!values_equal(&eval(lhs, state)?, &eval(rhs, state)?))),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            let l = as_f64(&eval(lhs, state)?)?;
            let r = as_f64(&eval(rhs, state)?)?;
            let result = match op {
                BinOp::Lt => l < r,
                BinOp::LtEq => l <= r,
                BinOp::Gt => l > r,
                BinOp::GtEq => l >= r,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            let l = as_f64(&eval(lhs, state)?)?;
            let r = as_f64(&eval(rhs, state)?)?;
            let result = match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    l / r
                }
                _ => unreachable!(),
            };
            Ok(serde_json::Number::from_f64(result)
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn state_with(pairs: &[(&str, Value)]) -> StateData {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn comparison_against_number_field() {
        let state = state_with(&[("x", json!(10))]);
        assert!(evaluate("state['x'] >= 10", &state));
        assert!(!evaluate("state['x'] >= 11", &state));
    }

    #[test]
    fn string_equality() {
        let state = state_with(&[("status", json!("active"))]);
        assert!(evaluate("state['status'] == 'active'", &state));
        assert!(!evaluate("state['status'] == 'inactive'", &state));
    }

    #[test]
    fn logical_connectives() {
        let state = state_with(&[("a", json!(true)), ("b", json!(false))]);
        assert!(evaluate("state['a'] or state['b']", &state));
        assert!(!evaluate("state['a'] and state['b']", &state));
        assert!(evaluate("not state['b']", &state));
        assert!(evaluate("!state['b']", &state));
    }

    #[test]
    fn arithmetic_and_len() {
        let state = state_with(&[("items", json!([1, 2, 3]))]);
        assert!(evaluate("len(state['items']) == 3", &state));
        assert!(evaluate("len(state['items']) + 1 == 4", &state));
    }

    #[test]
    fn missing_deep_key_evaluates_to_false_not_an_error() {
        let state = state_with(&[("x", json!(1))]);
        assert!(!evaluate("state['missing']['deep']", &state));
    }

    #[test]
    fn literal_true_always_taken() {
        let state = StateData::new();
        assert!(evaluate("true", &state));
        assert!(evaluate("True", &state) == false); // case-sensitive: not in grammar, not whitelisted as a bare ident
    }

    #[test]
    fn nested_indexing() {
        let state = state_with(&[("a", json!({"b": 5}))]);
        assert!(evaluate("state['a']['b'] == 5", &state));
    }

    #[test]
    fn disallowed_characters_fail_closed() {
        let state = StateData::new();
        assert!(!evaluate("__import__('os')", &state));
        assert!(!evaluate("state; os.system('ls')", &state));
    }

    proptest! {
        /// No arbitrary input string can panic the evaluator; every one
        /// either evaluates to a bool or fails closed to `false`.
        #[test]
        fn arbitrary_input_never_panics(input in "\\PC*") {
            let state = StateData::new();
            let _ = evaluate(&input, &state);
        }

        /// A value round-tripped through `==` against itself is always true,
        /// for any numeric literal the lexer can produce.
        #[test]
        fn number_equals_itself(n in 0i64..1_000_000) {
            let state = StateData::new();
            let expr = format!("{n} == {n}");
            prop_assert!(evaluate(&expr, &state));
        }
    }
}
