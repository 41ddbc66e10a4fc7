//! Output cleaning and prompt escaping helpers

/// Strip terminal control sequences and carriage returns from captured
/// session output.
pub fn clean_output(raw: &str) -> String {
    strip_ansi_escapes::strip_str(raw).replace('\r', "")
}

/// Escape prompt text for the multiplexer's double-quote rules.
///
/// Backslash, double quote, dollar and backtick would otherwise be expanded
/// before the keystrokes reach the session.
pub fn escape_prompt(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' | '"' | '$' | '`' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
