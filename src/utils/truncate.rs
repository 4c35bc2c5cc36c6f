//! Truncation for observations and summaries that flow back into prompts.
//! Cuts on UTF-8 boundaries and keeps both ends of the text.

const APPROX_BYTES_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    Bytes(usize),
    Tokens(usize),
}

impl TruncationPolicy {
    pub fn byte_budget(&self) -> usize {
        match self {
            TruncationPolicy::Bytes(b) => *b,
            TruncationPolicy::Tokens(t) => t.saturating_mul(APPROX_BYTES_PER_TOKEN),
        }
    }
}

pub fn truncate_text(content: &str, policy: TruncationPolicy) -> String {
    let max_bytes = policy.byte_budget();
    if content.len() <= max_bytes {
        return content.to_string();
    }
    if max_bytes == 0 {
        return format!("... [{} chars truncated] ...", content.len());
    }

    let half = max_bytes / 2;
    let prefix_end = floor_boundary(content, half);
    let suffix_start = ceil_boundary(content, content.len() - half).max(prefix_end);

    let prefix = &content[..prefix_end];
    let suffix = &content[suffix_start..];
    let cut = content.len() - prefix.len() - suffix.len();
    format!("{} ... [{} chars truncated] ... {}", prefix, cut, suffix)
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_text("hello", TruncationPolicy::Bytes(10)), "hello");
    }

    #[test]
    fn test_keeps_both_ends() {
        let out = truncate_text("abcdefghijklmnopqrstuvwxyz", TruncationPolicy::Bytes(10));
        assert!(out.starts_with("abcde"));
        assert!(out.ends_with("vwxyz"));
        assert!(out.contains("16 chars truncated"));
    }

    #[test]
    fn test_respects_utf8() {
        let text = "ééééééééé";
        let out = truncate_text(text, TruncationPolicy::Bytes(5));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn test_token_policy() {
        assert_eq!(TruncationPolicy::Tokens(3).byte_budget(), 12);
    }
}
