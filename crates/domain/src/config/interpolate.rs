//! `${NAME}` environment-variable interpolation for string config values.
//!
//! Applied once, after TOML deserialization, over every provider `api_key`
//! and `base_url` field. Unset variables are left untouched (the literal
//! `${NAME}` stays in the string) rather than erroring, so an operator can
//! see at a glance which variable is missing.

use std::env;

/// Replace every `${NAME}` substring in `input` with the value of the
/// environment variable `NAME`. Leaves the placeholder alone when the
/// variable is unset or contains invalid UTF-8.
pub fn interpolate_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        let end = start + end;
        out.push_str(&rest[..start]);

        let name = &rest[start + 2..end];
        match env::var(name) {
            Ok(val) => out.push_str(&val),
            Err(_) => out.push_str(&rest[start..=end]),
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}
