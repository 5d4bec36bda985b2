//! Per-record expressions for `mapValues` entries of the form `{map: "..."}`.
//!
//! The language can only read and write fields of the record it is applied
//! to. It has no loops, no function calls and no access to anything else.
//!
//! ```text
//! program    := statement (';' statement)* ';'?
//! statement  := 'if' expr 'then' actions ('else' actions)? | action
//! actions    := action (',' action)*
//! action     := field '=' expr | 'delete' field
//! expr       := or
//! or         := and ('or' and)*
//! and        := not ('and' not)*
//! not        := 'not' not | comparison
//! comparison := sum (('==' | '!=' | '<' | '<=' | '>' | '>=') sum)?
//! sum        := unary (('+' | '-') unary)*
//! unary      := '-' unary | primary
//! primary    := string | number | 'true' | 'false' | 'null' | field | '(' expr ')'
//! field      := identifier | '`' any text '`'
//! ```
//!
//! Example: `` if sex == 'male' then `full name` = name + ' (m)', delete sex ``

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::ExpressionError;
use crate::models::{display_value, is_truthy, number_value, strict_eq, Record};

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Assign,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Comma,
    Semi,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    /// `true` for backtick-quoted field names, which are never keywords
    quoted: bool,
    pos: usize,
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let mut quoted = false;
        let token = match c {
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, ch)) if ch == c => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, other)) => text.push(other),
                            None => return Err(ExpressionError::new(pos, "unterminated string")),
                        },
                        Some((_, ch)) => text.push(ch),
                        None => return Err(ExpressionError::new(pos, "unterminated string")),
                    }
                }
                Token::Str(text)
            }
            '`' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '`')) => break,
                        Some((_, ch)) => name.push(ch),
                        None => return Err(ExpressionError::new(pos, "unterminated field name")),
                    }
                }
                quoted = true;
                Token::Ident(name)
            }
            c if c.is_ascii_digit() => {
                let mut text = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        text.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::new(pos, format!("invalid number '{}'", text)))?;
                Token::Num(n)
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(name)
            }
            _ => {
                chars.next();
                let next_is_eq = chars.peek().is_some_and(|&(_, n)| n == '=');
                match c {
                    '=' if next_is_eq => {
                        chars.next();
                        Token::EqEq
                    }
                    '!' if next_is_eq => {
                        chars.next();
                        Token::NotEq
                    }
                    '<' if next_is_eq => {
                        chars.next();
                        Token::Le
                    }
                    '>' if next_is_eq => {
                        chars.next();
                        Token::Ge
                    }
                    '=' => Token::Assign,
                    '<' => Token::Lt,
                    '>' => Token::Gt,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    ',' => Token::Comma,
                    ';' => Token::Semi,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    other => {
                        return Err(ExpressionError::new(
                            pos,
                            format!("unexpected character '{}'", other),
                        ))
                    }
                }
            }
        };

        tokens.push(Spanned { token, quoted, pos });
    }

    Ok(tokens)
}

// =============================================================================
// Syntax tree
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Field(String),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Assign(String, Expr),
    Delete(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Action(Action),
    If {
        condition: Expr,
        then: Vec<Action>,
        otherwise: Vec<Action>,
    },
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.index)
    }

    fn position(&self) -> usize {
        self.peek().map(|t| t.pos).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::new(self.position(), message)
    }

    fn next_is(&self, token: &Token) -> bool {
        self.peek().is_some_and(|t| &t.token == token)
    }

    fn next_is_keyword(&self, keyword: &str) -> bool {
        self.peek()
            .is_some_and(|t| !t.quoted && matches!(&t.token, Token::Ident(name) if name == keyword))
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.next_is(token) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.next_is_keyword(keyword) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn program(&mut self) -> Result<Vec<Statement>, ExpressionError> {
        let mut statements = Vec::new();
        while self.peek().is_some() {
            if self.eat(&Token::Semi) {
                continue;
            }
            statements.push(self.statement()?);
            if self.peek().is_some() && !self.eat(&Token::Semi) {
                return Err(self.error("expected ';'"));
            }
        }
        Ok(statements)
    }

    fn statement(&mut self) -> Result<Statement, ExpressionError> {
        if !self.eat_keyword("if") {
            return Ok(Statement::Action(self.action()?));
        }

        let condition = self.expr()?;
        if !self.eat_keyword("then") {
            return Err(self.error("expected 'then'"));
        }
        let then = self.actions()?;
        let otherwise = if self.eat_keyword("else") {
            self.actions()?
        } else {
            Vec::new()
        };
        Ok(Statement::If { condition, then, otherwise })
    }

    fn actions(&mut self) -> Result<Vec<Action>, ExpressionError> {
        let mut actions = vec![self.action()?];
        while self.eat(&Token::Comma) {
            actions.push(self.action()?);
        }
        Ok(actions)
    }

    fn action(&mut self) -> Result<Action, ExpressionError> {
        if self.eat_keyword("delete") {
            return Ok(Action::Delete(self.field_name()?));
        }
        let field = self.field_name()?;
        if !self.eat(&Token::Assign) {
            return Err(self.error("expected '='"));
        }
        Ok(Action::Assign(field, self.expr()?))
    }

    fn field_name(&mut self) -> Result<String, ExpressionError> {
        match self.peek() {
            Some(Spanned { token: Token::Ident(name), quoted, .. })
                if *quoted || !is_keyword(name) =>
            {
                let name = name.clone();
                self.index += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a field name")),
        }
    }

    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and()?;
        while self.eat_keyword("or") {
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.not()?;
        while self.eat_keyword("and") {
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat_keyword("not") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.sum()?;
        let op = match self.peek().map(|t| &t.token) {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(left),
        };
        self.index += 1;
        Ok(Expr::Binary(op, Box::new(left), Box::new(self.sum()?)))
    }

    fn sum(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinOp::Add
            } else if self.eat(&Token::Minus) {
                BinOp::Sub
            } else {
                return Ok(left);
            };
            left = Expr::Binary(op, Box::new(left), Box::new(self.unary()?));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let Some(spanned) = self.peek().cloned() else {
            return Err(self.error("unexpected end of expression"));
        };

        let expr = match spanned.token {
            Token::Str(s) => Expr::Literal(Value::String(s)),
            Token::Num(n) => Expr::Literal(number_value(n)),
            Token::LParen => {
                self.index += 1;
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(self.error("expected ')'"));
                }
                return Ok(inner);
            }
            Token::Ident(name) if spanned.quoted => Expr::Field(name),
            Token::Ident(name) => match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" => Expr::Literal(Value::Null),
                keyword if is_keyword(keyword) => {
                    return Err(self.error(format!("unexpected keyword '{}'", keyword)))
                }
                _ => Expr::Field(name),
            },
            _ => return Err(self.error("expected a value")),
        };
        self.index += 1;
        Ok(expr)
    }
}

fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "if" | "then" | "else" | "and" | "or" | "not" | "delete" | "true" | "false" | "null"
    )
}

// =============================================================================
// Evaluation
// =============================================================================

/// A parsed expression program, ready to apply to records.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    statements: Vec<Statement>,
}

impl Expression {
    /// Parse expression text.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            index: 0,
            end: source.len(),
        };
        let statements = parser.program()?;
        if statements.is_empty() {
            return Err(ExpressionError::new(0, "empty expression"));
        }
        Ok(Self { statements })
    }

    /// Run the program against one record, mutating it in place.
    pub fn apply(&self, record: &mut Record) {
        for statement in &self.statements {
            match statement {
                Statement::Action(action) => perform(action, record),
                Statement::If { condition, then, otherwise } => {
                    let branch = if is_truthy(&evaluate(condition, record)) {
                        then
                    } else {
                        otherwise
                    };
                    for action in branch {
                        perform(action, record);
                    }
                }
            }
        }
    }
}

fn perform(action: &Action, record: &mut Record) {
    match action {
        Action::Assign(field, expr) => {
            let value = evaluate(expr, record);
            record.insert(field.clone(), value);
        }
        Action::Delete(field) => {
            record.shift_remove(field);
        }
    }
}

fn evaluate(expr: &Expr, record: &Record) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Field(name) => record.get(name).cloned().unwrap_or(Value::Null),
        Expr::Not(inner) => Value::Bool(!is_truthy(&evaluate(inner, record))),
        Expr::Neg(inner) => match evaluate(inner, record).as_f64() {
            Some(n) => number_value(-n),
            None => Value::Null,
        },
        Expr::Binary(BinOp::And, l, r) => {
            Value::Bool(is_truthy(&evaluate(l, record)) && is_truthy(&evaluate(r, record)))
        }
        Expr::Binary(BinOp::Or, l, r) => {
            Value::Bool(is_truthy(&evaluate(l, record)) || is_truthy(&evaluate(r, record)))
        }
        Expr::Binary(op, l, r) => binary(*op, &evaluate(l, record), &evaluate(r, record)),
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Value {
    match op {
        BinOp::Add => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => number_value(a + b),
            _ => Value::String(display_value(left) + &display_value(right)),
        },
        BinOp::Sub => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => number_value(a - b),
            _ => Value::Null,
        },
        BinOp::Eq => Value::Bool(strict_eq(left, right)),
        BinOp::Ne => Value::Bool(!strict_eq(left, right)),
        BinOp::Lt => Value::Bool(compare(left, right) == Some(Ordering::Less)),
        BinOp::Le => Value::Bool(matches!(compare(left, right), Some(Ordering::Less | Ordering::Equal))),
        BinOp::Gt => Value::Bool(compare(left, right) == Some(Ordering::Greater)),
        BinOp::Ge => Value::Bool(matches!(
            compare(left, right),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinOp::And | BinOp::Or => Value::Bool(false),
    }
}

/// Order numbers numerically and strings lexically; nothing else is ordered.
fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
