//! Conversions for programs that speak ASCII over their ports.
//!
//! Such programs print text one character per output value and read commands
//! as character codes ending in a newline. A final value outside the ASCII
//! range is the program's answer rather than text.

/// Whether `value` is an ASCII character code.
pub fn is_ascii(value: i64) -> bool {
    (0..128).contains(&value)
}

/// Returns the character for an ASCII code.
pub fn to_char(value: i64) -> Option<char> {
    u8::try_from(value)
        .ok()
        .filter(u8::is_ascii)
        .map(char::from)
}

/// Encodes `line` as character codes followed by a newline.
///
/// Non-ASCII characters are encoded by code point.
pub fn encode_line(line: &str) -> Vec<i64> {
    line.chars()
        .map(|c| c as i64)
        .chain(std::iter::once(b'\n' as i64))
        .collect()
}

/// Splits output into its text and a trailing non-ASCII value, if any.
///
/// Non-ASCII values before the end are rendered as `U+FFFD`.
pub fn decode(values: &[i64]) -> (String, Option<i64>) {
    let (body, answer) = match values.split_last() {
        Some((&last, body)) if !is_ascii(last) => (body, Some(last)),
        _ => (values, None),
    };
    let text = body
        .iter()
        .map(|&v| to_char(v).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect();
    (text, answer)
}
