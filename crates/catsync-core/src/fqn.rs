//! Fully-qualified names
//!
//! FQNs are dot-separated paths from the service down to the entity. A part
//! that itself contains a dot is wrapped in double quotes so the path can be
//! split back unambiguously.

use std::borrow::Cow;

/// Separator between FQN parts
pub const SEPARATOR: char = '.';

const QUOTE: char = '"';

/// Quote a single part if it contains the separator
#[must_use]
pub fn quote(part: &str) -> Cow<'_, str> {
    if part.contains(SEPARATOR) {
        Cow::Owned(format!("{QUOTE}{part}{QUOTE}"))
    } else {
        Cow::Borrowed(part)
    }
}

/// Join parts into an FQN, quoting where needed and skipping empty parts
#[must_use]
pub fn build<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        let part = part.as_ref();
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(SEPARATOR);
        }
        out.push_str(&quote(part));
    }
    out
}

/// Append a leaf name to an already-built parent FQN
#[must_use]
pub fn join(parent: Option<&str>, name: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}{SEPARATOR}{}", quote(name)),
        _ => quote(name).into_owned(),
    }
}

/// Split an FQN into its unquoted parts
#[must_use]
pub fn split(fqn: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in fqn.chars() {
        match c {
            QUOTE => quoted = !quoted,
            SEPARATOR if !quoted => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Whether `fqn` lies strictly below `scope`
#[must_use]
pub fn is_within(fqn: &str, scope: &str) -> bool {
    fqn.len() > scope.len()
        && fqn.starts_with(scope)
        && fqn[scope.len()..].starts_with(SEPARATOR)
}
