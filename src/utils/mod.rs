//! Utils Module
pub mod logging;
pub mod truncate;

pub use logging::init_logging;
pub use truncate::{truncate_text, TruncationPolicy};

/// Slice of `text` from the first `open` to the last `close`, inclusive.
/// Models tend to wrap JSON in prose or code fences.
pub fn json_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}
