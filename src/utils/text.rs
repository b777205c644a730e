/// Telegram rejects messages longer than 4096 characters; leave room for markup.
pub const MAX_MESSAGE_CHARS: usize = 3500;

pub fn truncate_for_message(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut trimmed = input.chars().take(max_chars).collect::<String>();
    trimmed.push_str("\n[truncated]");
    trimmed
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{escape_html, truncate_for_message};

    #[test]
    fn truncate_for_message_marks_cut_output() {
        let source = "x".repeat(4000);
        let output = truncate_for_message(&source, 3500);
        assert!(output.ends_with("[truncated]"));
        assert!(output.chars().count() < 3600);
        assert_eq!(truncate_for_message("short", 3500), "short");
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html("<b>a & \"b\"</b>"),
            "&lt;b&gt;a &amp; &quot;b&quot;&lt;/b&gt;"
        );
    }
}
