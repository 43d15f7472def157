//! Canonical JSON encoding
//!
//! The authority recomputes signatures over these exact bytes, so the layout
//! is fixed: two spaces of indentation per nesting level, one member or
//! element per line, `"key": value` separators, and no trailing newline.
//! Object members are emitted in sorted key order so the output does not
//! depend on the field order chosen by the caller's serializer.
//!
//! Empty containers are written as `{\n}` and `[\n]`.

use crate::error::{Error, Result};
use serde_json::Value;

const INDENT: &str = "  ";

/// Canonicalize a single JSON value given as raw bytes
pub fn encode(input: &[u8]) -> Result<String> {
    let value: Value = serde_json::from_slice(input)?;
    encode_value(&value)
}

/// Canonicalize an already parsed JSON value
pub fn encode_value(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(&mut out, value, 0)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value, depth: usize) -> Result<()> {
    match value {
        Value::Object(map) => {
            out.push_str("{\n");
            let mut first = true;
            let mut members: Vec<_> = map.iter().collect();
            members.sort_by(|a, b| a.0.cmp(b.0));
            for (key, item) in members {
                separator(out, &mut first, depth + 1);
                out.push_str(&quote(key)?);
                out.push_str(": ");
                write_value(out, item, depth + 1)?;
            }
            close(out, first, depth, '}');
        }
        Value::Array(items) => {
            out.push_str("[\n");
            let mut first = true;
            for item in items {
                separator(out, &mut first, depth + 1);
                write_value(out, item, depth + 1)?;
            }
            close(out, first, depth, ']');
        }
        Value::String(s) => out.push_str(&quote(s)?),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
    }
    Ok(())
}

fn separator(out: &mut String, first: &mut bool, depth: usize) {
    if *first {
        *first = false;
    } else {
        out.push_str(",\n");
    }
    out.push_str(&INDENT.repeat(depth));
}

fn close(out: &mut String, empty: bool, depth: usize, delim: char) {
    if !empty {
        out.push('\n');
        out.push_str(&INDENT.repeat(depth));
    }
    out.push(delim);
}

fn quote(s: &str) -> Result<String> {
    Ok(serde_json::to_string(s)?)
}

/// Append a `signature` member to a canonical object
///
/// The member goes just before the closing brace, on its own line at depth 1.
pub fn inject_signature(encoded: &str, signature: &str) -> Result<String> {
    let body = encoded
        .strip_suffix('}')
        .filter(|_| encoded.starts_with('{'))
        .ok_or_else(|| Error::Encoding("signed messages must be JSON objects".to_string()))?;
    let member = format!("{}{}: {}\n}}", INDENT, quote("signature")?, quote(signature)?);
    if body == "{\n" {
        Ok(format!("{{\n{}", member))
    } else {
        let body = body.strip_suffix('\n').unwrap_or(body);
        Ok(format!("{},\n{}", body, member))
    }
}
