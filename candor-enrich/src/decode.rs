//! Structured-output decode step
//!
//! Text-generation collaborators are asked for JSON but sometimes wrap it in
//! a code fence, surround it with prose, or leave trailing commas. Decoding
//! tries a small fixed set of structural repairs and otherwise reports the
//! raw text as malformed. It never guesses at content.

use serde::de::DeserializeOwned;

/// Outcome of decoding generated text
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Decoded(T),
    Malformed { raw: String, reason: String },
}

impl<T> Decoded<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Decoded::Decoded(value) => Some(value),
            Decoded::Malformed { .. } => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Decoded::Malformed { .. })
    }
}

/// Decode `raw` as JSON into `T`, applying structural repair if needed
pub fn decode_json<T: DeserializeOwned>(raw: &str) -> Decoded<T> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Decoded::Malformed {
            raw: raw.to_string(),
            reason: "empty response".to_string(),
        };
    }

    let mut last_error = match serde_json::from_str::<T>(trimmed) {
        Ok(value) => return Decoded::Decoded(value),
        Err(e) => e.to_string(),
    };

    let unfenced = strip_code_fence(trimmed);
    let Some(body) = extract_balanced(unfenced) else {
        return Decoded::Malformed {
            raw: raw.to_string(),
            reason: format!("no JSON object or array found ({})", last_error),
        };
    };

    for candidate in [body.to_string(), remove_trailing_commas(body)] {
        match serde_json::from_str::<T>(&candidate) {
            Ok(value) => return Decoded::Decoded(value),
            Err(e) => last_error = e.to_string(),
        }
    }

    Decoded::Malformed {
        raw: raw.to_string(),
        reason: last_error,
    }
}

/// Drop a surrounding ``` fence (with optional language tag)
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the language tag line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Outermost balanced `{...}` or `[...]`, string-aware
fn extract_balanced(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove commas directly before `}` or `]`, ignoring string contents
fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
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
        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}
