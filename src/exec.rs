//! Command execution engine for the hotload listener.
//!
//! Submitted text is a small line-oriented command dialect evaluated against a
//! persistent [`ExecutionContext`]. Stdout/stderr produced by the script are
//! captured into [`CapturedOutput`] buffers, isolated from the listener's own
//! logging. Any failure aborts the script and surfaces as an
//! [`ExecutionFailure`]; partial output from before the failure is discarded.
//!
//! Statements (one per line, blank lines and `#` comments ignored):
//! - `print(expr)`  — append the value plus a newline to captured stdout
//! - `eprint(expr)` — same, to captured stderr
//! - `raise(expr)`  — fail with the value's display form as the message
//! - `name = expr`  — bind a value into the execution context
//! - `expr`         — evaluate and discard (undefined names still fail)
//!
//! Expressions: double-quoted strings (`\n` `\t` `\"` `\\` escapes), 64-bit
//! integers, `true`/`false`, identifiers, and left-associative `+` (integer
//! addition or string concatenation).

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// A value held in the execution context.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Mutable identifier → value store shared across every request served by one
/// listener instance. Single-writer: the serve loop handles one connection at
/// a time, so no synchronization is needed.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    vars: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }
}

/// Stdout/stderr captured while running one script.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ExecutionFailure {
    /// Explicit `raise(...)` from the script.
    #[error("{0}")]
    Raised(String),

    #[error("name '{0}' is not defined")]
    Undefined(String),

    #[error("invalid syntax: {0}")]
    Syntax(String),

    #[error("unsupported operand types for +: {left} and {right}")]
    BadOperands {
        left: &'static str,
        right: &'static str,
    },
}

/// Run `source` against `context`, capturing output in isolation.
pub fn execute(
    context: &mut ExecutionContext,
    source: &str,
) -> Result<CapturedOutput, ExecutionFailure> {
    let mut captured = CapturedOutput::default();

    for raw in source.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        run_statement(context, &mut captured, line)?;
    }

    Ok(captured)
}

fn run_statement(
    context: &mut ExecutionContext,
    captured: &mut CapturedOutput,
    line: &str,
) -> Result<(), ExecutionFailure> {
    if let Some(arg) = call_argument(line, "print")? {
        let value = eval_expr(context, arg)?;
        captured.stdout.push_str(&value.to_string());
        captured.stdout.push('\n');
        return Ok(());
    }
    if let Some(arg) = call_argument(line, "eprint")? {
        let value = eval_expr(context, arg)?;
        captured.stderr.push_str(&value.to_string());
        captured.stderr.push('\n');
        return Ok(());
    }
    if let Some(arg) = call_argument(line, "raise")? {
        let value = eval_expr(context, arg)?;
        return Err(ExecutionFailure::Raised(value.to_string()));
    }
    if let Some((name, expr)) = split_assignment(line) {
        if !is_identifier(name) {
            return Err(ExecutionFailure::Syntax(format!(
                "cannot assign to '{}'",
                name
            )));
        }
        let value = eval_expr(context, expr)?;
        context.set(name, value);
        return Ok(());
    }

    // Bare expression statement: evaluated for effect (errors), value dropped.
    eval_expr(context, line).map(|_| ())
}

/// If `line` is a `func(...)` call spanning the whole statement, return the
/// raw argument text between the parentheses.
fn call_argument<'a>(line: &'a str, func: &str) -> Result<Option<&'a str>, ExecutionFailure> {
    let Some(rest) = line.strip_prefix(func) else {
        return Ok(None);
    };
    let rest = rest.trim_start();
    if !rest.starts_with('(') {
        return Ok(None);
    }
    // Covers both an unterminated call and trailing tokens after the close
    // paren; a call must span the whole statement.
    let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) else {
        return Err(ExecutionFailure::Syntax(format!(
            "malformed call to {}",
            func
        )));
    };
    Ok(Some(inner.trim()))
}

/// Split `name = expr`, ignoring `=` inside string literals and skipping
/// comparison-looking input (`==`).
fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let mut in_string = false;
    let mut escaped = false;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'=' if !in_string => {
                if bytes.get(i + 1) == Some(&b'=') || (i > 0 && bytes[i - 1] == b'=') {
                    return None;
                }
                return Some((line[..i].trim(), line[i + 1..].trim()));
            }
            _ => {}
        }
    }
    None
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn eval_expr(context: &ExecutionContext, expr: &str) -> Result<Value, ExecutionFailure> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ExecutionFailure::Syntax("empty expression".to_string()));
    }

    let mut terms = split_terms(expr)?.into_iter();
    let first = terms
        .next()
        .ok_or_else(|| ExecutionFailure::Syntax("empty expression".to_string()))?;
    let mut result = eval_atom(context, first.trim())?;
    for term in terms {
        let value = eval_atom(context, term.trim())?;
        result = add(result, value)?;
    }
    Ok(result)
}

/// Split an expression on top-level `+`, respecting string literals.
fn split_terms(expr: &str) -> Result<Vec<&str>, ExecutionFailure> {
    let mut terms = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in expr.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '+' if !in_string => {
                terms.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_string {
        return Err(ExecutionFailure::Syntax(
            "unterminated string literal".to_string(),
        ));
    }
    terms.push(&expr[start..]);
    if terms.iter().any(|t| t.trim().is_empty()) {
        return Err(ExecutionFailure::Syntax(format!(
            "malformed expression '{}'",
            expr
        )));
    }
    Ok(terms)
}

fn eval_atom(context: &ExecutionContext, atom: &str) -> Result<Value, ExecutionFailure> {
    if atom.starts_with('"') {
        return parse_string_literal(atom);
    }
    if atom == "true" {
        return Ok(Value::Bool(true));
    }
    if atom == "false" {
        return Ok(Value::Bool(false));
    }
    if atom
        .strip_prefix('-')
        .unwrap_or(atom)
        .chars()
        .all(|c| c.is_ascii_digit())
    {
        return atom
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ExecutionFailure::Syntax(format!("invalid integer '{}'", atom)));
    }
    if is_identifier(atom) {
        return context
            .get(atom)
            .cloned()
            .ok_or_else(|| ExecutionFailure::Undefined(atom.to_string()));
    }
    Err(ExecutionFailure::Syntax(format!(
        "unrecognized expression '{}'",
        atom
    )))
}

fn parse_string_literal(atom: &str) -> Result<Value, ExecutionFailure> {
    let inner = atom
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| ExecutionFailure::Syntax("unterminated string literal".to_string()))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            if c == '"' {
                return Err(ExecutionFailure::Syntax(
                    "unescaped quote inside string literal".to_string(),
                ));
            }
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            other => {
                return Err(ExecutionFailure::Syntax(format!(
                    "invalid escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(Value::Str(out))
}

fn add(left: Value, right: Value) -> Result<Value, ExecutionFailure> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
        (Value::Str(mut a), Value::Str(b)) => {
            a.push_str(&b);
            Ok(Value::Str(a))
        }
        (l, r) => Err(ExecutionFailure::BadOperands {
            left: type_name(&l),
            right: type_name(&r),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Int(_) => "int",
        Value::Str(_) => "str",
        Value::Bool(_) => "bool",
    }
}
