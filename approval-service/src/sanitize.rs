use crate::error::{Result, WorkflowError};

pub const MAX_REASON_CHARS: usize = 2000;

/// Checks a moderator's reason before it is written. The text is stored as typed.
pub fn validate_reason(reason: &str) -> Result<&str> {
    if reason.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("A reason is required".into()));
    }
    if reason.chars().count() > MAX_REASON_CHARS {
        return Err(WorkflowError::InvalidInput(format!(
            "Reason must be at most {} characters",
            MAX_REASON_CHARS
        )));
    }
    Ok(reason)
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Renders a stored reason as safe HTML: everything escaped, line breaks kept.
pub fn render_reason_html(reason: &str) -> String {
    escape_html(reason.trim())
        .replace("\r\n", "\n")
        .replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_must_not_be_blank() {
        assert!(matches!(
            validate_reason("  \n "),
            Err(WorkflowError::InvalidInput(_))
        ));
        assert_eq!(validate_reason("사진 누락").unwrap(), "사진 누락");
    }

    #[test]
    fn test_reason_length_counts_characters() {
        let korean = "가".repeat(MAX_REASON_CHARS);
        assert!(validate_reason(&korean).is_ok());

        let too_long = "a".repeat(MAX_REASON_CHARS + 1);
        assert!(validate_reason(&too_long).is_err());
    }

    #[test]
    fn test_render_escapes_markup() {
        assert_eq!(
            render_reason_html("<img src=x onerror=\"alert(1)\">"),
            "&lt;img src=x onerror=&quot;alert(1)&quot;&gt;"
        );
        assert_eq!(
            render_reason_html("사진 누락\r\n다시 올려주세요 & 확인"),
            "사진 누락<br>다시 올려주세요 &amp; 확인"
        );
    }
}
