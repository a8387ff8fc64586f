//! Heuristic recovery for malformed JSON request bodies.
//!
//! Clients that build JSON by string concatenation tend to produce the same
//! handful of mistakes: single-quoted strings, raw newlines or tabs inside
//! strings, unescaped backslashes (Windows paths), unescaped quotes inside
//! values, and trailing commas. [`repair`] runs a fixed sequence of text
//! passes over the body to undo those. It is a pure function and does not
//! promise valid output; [`parse_with_repair`] is the entry point used by the
//! HTTP handlers.
//!
//! Passes only rewrite text that strict JSON would reject, so a body that is
//! already valid comes out with the same parsed value. The passes run in a
//! fixed order and each one trusts the string boundaries left by the previous
//! passes, so a badly broken body can still come out as a different value
//! than the client meant.

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, ServerError};

pub const EXCERPT_CHARS: usize = 500;

const PIPELINE: [fn(&str) -> String; 5] = [
    convert_single_quotes,
    escape_control_characters,
    escape_stray_backslashes,
    escape_inner_quotes,
    strip_trailing_commas,
];

pub fn repair(raw: &str) -> String {
    PIPELINE
        .iter()
        .fold(raw.to_string(), |candidate, pass| pass(&candidate))
}

/// Strict parse first, then one attempt on the repaired text. A failure
/// reports the error from the strict parse, never the repaired one.
pub fn parse_with_repair(raw: &str) -> Result<Value> {
    let original_err = match serde_json::from_str::<Value>(raw) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    match serde_json::from_str::<Value>(&repair(raw)) {
        Ok(value) => {
            debug!(error = %original_err, "Recovered malformed JSON body");
            Ok(value)
        }
        Err(_) => Err(ServerError::TransportParse {
            message: original_err.to_string(),
            excerpt: excerpt(raw),
        }),
    }
}

pub fn excerpt(raw: &str) -> String {
    raw.chars().take(EXCERPT_CHARS).collect()
}

fn convert_single_quotes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_double = false;
    let mut in_single = false;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        if in_double {
            out.push(ch);
            match ch {
                '\\' => {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                }
                '"' => in_double = false,
                _ => {}
            }
            continue;
        }

        if in_single {
            match ch {
                '\\' => match chars.next() {
                    Some('\'') => out.push('\''),
                    Some(next) => {
                        out.push('\\');
                        out.push(next);
                    }
                    None => out.push('\\'),
                },
                '\'' => {
                    out.push('"');
                    in_single = false;
                }
                '"' => out.push_str("\\\""),
                _ => out.push(ch),
            }
            continue;
        }

        match ch {
            '"' => {
                in_double = true;
                out.push(ch);
            }
            '\'' => {
                in_single = true;
                out.push('"');
            }
            _ => out.push(ch),
        }
    }

    out
}

fn escape_control_characters(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for ch in input.chars() {
        if !in_string {
            in_string = ch == '"';
            out.push(ch);
            continue;
        }

        if escaped {
            escaped = false;
            out.push(ch);
            continue;
        }

        match ch {
            '\\' => {
                escaped = true;
                out.push(ch);
            }
            '"' => {
                in_string = false;
                out.push(ch);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }

    out
}

fn escape_stray_backslashes(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if !in_string {
            in_string = ch == '"';
            out.push(ch);
            i += 1;
            continue;
        }

        match ch {
            '\\' => {
                if is_valid_escape(&chars[i + 1..]) {
                    out.push('\\');
                    out.push(chars[i + 1]);
                    i += 2;
                } else {
                    out.push_str("\\\\");
                    i += 1;
                }
            }
            '"' => {
                in_string = false;
                out.push(ch);
                i += 1;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    out
}

fn is_valid_escape(rest: &[char]) -> bool {
    match rest.first() {
        Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => true,
        Some('u') => rest.len() >= 5 && rest[1..5].iter().all(char::is_ascii_hexdigit),
        _ => false,
    }
}

/// A quote inside a string only closes it when the next non-whitespace
/// character could legally follow a string.
fn escape_inner_quotes(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        if !in_string {
            in_string = ch == '"';
            out.push(ch);
            i += 1;
            continue;
        }

        match ch {
            '\\' => {
                out.push(ch);
                if let Some(next) = chars.get(i + 1) {
                    out.push(*next);
                }
                i += 2;
            }
            '"' => {
                let follower = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if matches!(follower, None | Some(',' | '}' | ']' | ':')) {
                    in_string = false;
                    out.push('"');
                } else {
                    out.push_str("\\\"");
                }
                i += 1;
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }

    out
}

fn strip_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }

        if ch == ',' {
            let follower = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(follower, Some('}' | ']')) {
                continue;
            }
        }

        in_string = ch == '"';
        out.push(ch);
    }

    out
}
