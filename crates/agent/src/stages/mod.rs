//! The decision stages of the loop.
//!
//! Each stage is a plain async function over the ports; sequencing and
//! iteration caps belong to [`crate::driver`].

pub mod generator;
pub mod grader;
pub mod rewriter;
pub mod router;

/// Lowercase a raw classifier label and strip quotes and trailing punctuation.
pub(crate) fn normalize_label(label: &str) -> String {
    label
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
        .trim()
        .to_lowercase()
}
