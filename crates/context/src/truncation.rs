/// SHARED_MEMORY line-content cap (spec §4.4): content over 500 chars is
/// truncated with a trailing `"..."`, at a valid UTF-8 char boundary.
const SHARED_MEMORY_MAX_CHARS: usize = 500;

pub fn truncate_shared_memory(content: &str) -> String {
    if content.chars().count() <= SHARED_MEMORY_MAX_CHARS {
        return content.to_string();
    }
    let boundary = content
        .char_indices()
        .nth(SHARED_MEMORY_MAX_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(content.len());
    format!("{}...", &content[..boundary])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_limit_is_unchanged() {
        assert_eq!(truncate_shared_memory("hello"), "hello");
    }

    #[test]
    fn exactly_at_limit_is_unchanged() {
        let s = "a".repeat(500);
        assert_eq!(truncate_shared_memory(&s), s);
    }

    #[test]
    fn over_limit_is_truncated_with_ellipsis() {
        let s = "a".repeat(501);
        let result = truncate_shared_memory(&s);
        assert_eq!(result.chars().count(), 503);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn truncates_at_char_boundary_not_byte_boundary() {
        let s = "é".repeat(600);
        let result = truncate_shared_memory(&s);
        assert!(result.ends_with("..."));
        assert_eq!(result.chars().count(), 503);
    }
}
