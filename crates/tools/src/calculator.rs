//! Calculator tool: evaluates mathematical expressions.
//!
//! Supports basic arithmetic: `+`, `-`, `*`, `/`, parentheses, and
//! unary negation. The input is first reduced to arithmetic characters,
//! then evaluated by a recursive-descent parser.

use async_trait::async_trait;
use ponder_core::error::ToolError;
use ponder_core::tool::{Tool, ToolResult, string_argument};

const ALLOWED_CHARS: &str = "0123456789.()+-*/ ";

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Evaluates a mathematical expression (e.g. '10 * (5 + 2) / 7') and returns the result. \
         Supports +, -, *, /, parentheses, and decimal numbers. Input: the expression as plain text."
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let expr = string_argument(&arguments, "expression")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        let sanitized = sanitize(&expr);
        if sanitized.trim().is_empty() {
            return Ok(ToolResult::failed(
                "ERROR: Invalid or empty mathematical expression.",
            ));
        }

        match evaluate(&sanitized) {
            Ok(value) => Ok(ToolResult {
                success: true,
                output: format_number(value),
                data: Some(serde_json::json!({"result": value})),
            }),
            Err(EvalError::DivisionByZero) => Ok(ToolResult::failed(format!(
                "ERROR: Division by zero encountered in expression: '{expr}'."
            ))),
            Err(EvalError::Syntax(reason)) => Ok(ToolResult::failed(format!(
                "ERROR: Invalid mathematical syntax in expression: '{expr}' ({reason})."
            ))),
        }
    }
}

/// Keep only the characters the evaluator understands.
pub fn sanitize(expr: &str) -> String {
    expr.chars().filter(|c| ALLOWED_CHARS.contains(*c)).collect()
}

/// Remove the trailing `.0` from integral results.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// ── Recursive-descent expression evaluator ────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    DivisionByZero,
    Syntax(String),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::DivisionByZero => write!(f, "division by zero"),
            EvalError::Syntax(reason) => write!(f, "{reason}"),
        }
    }
}

/// Evaluate a mathematical expression string.
pub fn evaluate(expr: &str) -> Result<f64, EvalError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(EvalError::Syntax(format!(
            "unexpected token at position {}: {:?}",
            parser.pos, parser.tokens[parser.pos]
        )));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| EvalError::Syntax(format!("invalid number: {num_str}")))?;
                tokens.push(Token::Number(num));
            }
            c => return Err(EvalError::Syntax(format!("unexpected character: '{c}'"))),
        }
    }

    Ok(tokens)
}

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

    fn consume(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, EvalError> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    left += self.parse_term()?;
                }
                Token::Minus => {
                    self.consume();
                    left -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<f64, EvalError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    left *= self.parse_unary()?;
                }
                Token::Slash => {
                    self.consume();
                    let right = self.parse_unary()?;
                    if right == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    left /= right;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // unary = ('-' | '+') unary | primary
    fn parse_unary(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    // primary = NUMBER | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, EvalError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err(EvalError::Syntax("expected closing parenthesis".into())),
                }
            }
            Some(tok) => Err(EvalError::Syntax(format!("unexpected token: {tok:?}"))),
            None => Err(EvalError::Syntax("unexpected end of expression".into())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
