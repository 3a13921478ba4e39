//! Text sanitizing for user-supplied strings

/// Longest location string broadcast on a presence channel.
pub const MAX_LOCATION_CHARS: usize = 200;

/// Strip control characters (newline and tab survive), trim, and cut to
/// `max_chars` characters on a char boundary.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Escape the characters that matter inside HTML text and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Single-line, bounded page indicator.
pub fn sanitize_location(input: &str) -> String {
    sanitize_text(&input.replace(['\n', '\t'], " "), MAX_LOCATION_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_control_chars() {
        assert_eq!(sanitize_text("  hi\u{0007}\u{001b}there \n", 50), "hithere");
        assert_eq!(sanitize_text("line one\nline two", 50), "line one\nline two");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        assert_eq!(sanitize_text("héllo wörld", 4), "héll");
        assert_eq!(sanitize_text("🎉🎉🎉", 2), "🎉🎉");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<img src="x" onerror='y'>&"#),
            "&lt;img src=&quot;x&quot; onerror=&#x27;y&#x27;&gt;&amp;"
        );
    }

    #[test]
    fn test_location_is_single_line_and_bounded() {
        assert_eq!(sanitize_location("/events\n/42"), "/events /42");
        let long = "a".repeat(500);
        assert_eq!(sanitize_location(&long).chars().count(), MAX_LOCATION_CHARS);
    }
}
