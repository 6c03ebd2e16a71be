// crates/stmt-diag-core/src/core/fingerprint.rs
// ============================================================================
// Module: Statement Fingerprints
// Description: Statement supplier interface and a SQL text normalizer.
// Purpose: Derive the constant-elided fingerprint used to match requests.
// Dependencies: crate::core::identifiers
// ============================================================================

//! ## Overview
//! The query engine hands executing statements to the registry through the
//! [`Statement`] trait: a normalized [`Fingerprint`] for matching and the
//! literal text for storage. [`SqlStatement`] implements it for raw SQL text
//! with a small lexer that elides literal constants:
//! - numeric literals, single-quoted strings, and `$n`/`?` placeholders become `_`
//! - identifiers and double-quoted identifiers are kept verbatim
//! - whitespace runs collapse to one space and the result is trimmed

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::identifiers::Fingerprint;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder emitted in place of an elided constant.
pub const CONSTANT_PLACEHOLDER: char = '_';

// ============================================================================
// SECTION: Statement Interface
// ============================================================================

/// Executing statement as seen by the diagnostics registry.
pub trait Statement {
    /// Returns the normalized fingerprint (constants elided).
    fn fingerprint(&self) -> Fingerprint;

    /// Returns the literal statement text for storage.
    fn text(&self) -> String;
}

/// Statement backed by raw SQL text.
///
/// # Invariants
/// - `fingerprint()` is a pure function of the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// Literal SQL text.
    sql: String,
}

impl SqlStatement {
    /// Wraps literal SQL text.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
        }
    }

    /// Returns the literal SQL text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.sql
    }
}

impl Statement for SqlStatement {
    fn fingerprint(&self) -> Fingerprint {
        normalize_sql(&self.sql)
    }

    fn text(&self) -> String {
        self.sql.clone()
    }
}

// ============================================================================
// SECTION: Normalizer
// ============================================================================

/// Normalizes SQL text into a fingerprint with literal constants elided.
#[must_use]
pub fn normalize_sql(sql: &str) -> Fingerprint {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;
    let mut pos = 0;
    while pos < chars.len() {
        let ch = chars[pos];
        if ch.is_whitespace() {
            pending_space = true;
            pos += 1;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        pos = match ch {
            '\'' => {
                out.push(CONSTANT_PLACEHOLDER);
                skip_string(&chars, pos)
            }
            '"' => copy_quoted_identifier(&chars, pos, &mut out),
            '$' if chars.get(pos + 1).is_some_and(char::is_ascii_digit) => {
                out.push(CONSTANT_PLACEHOLDER);
                skip_digits(&chars, pos + 1)
            }
            '?' => {
                out.push(CONSTANT_PLACEHOLDER);
                skip_digits(&chars, pos + 1)
            }
            '0' ..= '9' => {
                out.push(CONSTANT_PLACEHOLDER);
                skip_number(&chars, pos)
            }
            '.' if chars.get(pos + 1).is_some_and(char::is_ascii_digit) => {
                out.push(CONSTANT_PLACEHOLDER);
                skip_number(&chars, pos)
            }
            _ if is_identifier_start(ch) => copy_identifier(&chars, pos, &mut out),
            _ => {
                out.push(ch);
                pos + 1
            }
        };
    }
    Fingerprint::new(out)
}

/// Returns true for characters that may begin an identifier.
fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

/// Returns true for characters that may continue an identifier.
fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Skips a single-quoted string literal (with `''` escapes); returns the next position.
fn skip_string(chars: &[char], start: usize) -> usize {
    let mut pos = start + 1;
    while pos < chars.len() {
        if chars[pos] == '\'' {
            if chars.get(pos + 1) == Some(&'\'') {
                pos += 2;
                continue;
            }
            return pos + 1;
        }
        pos += 1;
    }
    pos
}

/// Copies a double-quoted identifier verbatim; returns the next position.
fn copy_quoted_identifier(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut pos = start + 1;
    while pos < chars.len() {
        out.push(chars[pos]);
        if chars[pos] == '"' {
            if chars.get(pos + 1) == Some(&'"') {
                out.push('"');
                pos += 2;
                continue;
            }
            return pos + 1;
        }
        pos += 1;
    }
    pos
}

/// Copies an identifier or keyword verbatim; returns the next position.
fn copy_identifier(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut pos = start;
    while pos < chars.len() && is_identifier_part(chars[pos]) {
        out.push(chars[pos]);
        pos += 1;
    }
    pos
}

/// Skips ASCII digits; returns the next position.
fn skip_digits(chars: &[char], start: usize) -> usize {
    let mut pos = start;
    while pos < chars.len() && chars[pos].is_ascii_digit() {
        pos += 1;
    }
    pos
}

/// Skips a numeric literal (decimal, float, exponent, or hex); returns the next position.
fn skip_number(chars: &[char], start: usize) -> usize {
    if chars[start] == '0' && matches!(chars.get(start + 1), Some('x' | 'X')) {
        let mut pos = start + 2;
        while pos < chars.len() && chars[pos].is_ascii_hexdigit() {
            pos += 1;
        }
        return pos;
    }
    let mut pos = skip_digits(chars, start);
    if chars.get(pos) == Some(&'.') {
        pos = skip_digits(chars, pos + 1);
    }
    if matches!(chars.get(pos), Some('e' | 'E')) {
        let mut exponent = pos + 1;
        if matches!(chars.get(exponent), Some('+' | '-')) {
            exponent += 1;
        }
        if chars.get(exponent).is_some_and(char::is_ascii_digit) {
            pos = skip_digits(chars, exponent);
        }
    }
    pos
}

// ============================================================================
// SECTION: Tests
// ============================================================================
