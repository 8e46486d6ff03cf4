use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::borrow::Cow;

/// Escapes a DATA line for transmission: a leading `.` gets doubled.
pub fn dot_stuff(line: &str) -> Cow<str> {
    if line.starts_with('.') {
        Cow::Owned(format!(".{}", line))
    } else {
        Cow::Borrowed(line)
    }
}

/// Reverses [`dot_stuff`] on a received block line.
pub fn dot_unstuff(line: &str) -> &str {
    if line.starts_with("..") {
        &line[1..]
    } else {
        line
    }
}

/// Initial response for `AUTH PLAIN` (RFC 4616), with an empty authzid.
pub fn sasl_plain(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{}\0{}", username, password))
}

pub fn base64_line(value: &str) -> String {
    STANDARD.encode(value)
}

/// Header values must stay on one line.
pub fn single_line(value: &str) -> Cow<str> {
    if value.contains(|c: char| c == '\r' || c == '\n') {
        Cow::Owned(value.replace("\r\n", " ").replace(|c: char| c == '\r' || c == '\n', " "))
    } else {
        Cow::Borrowed(value)
    }
}
