//! URL slug assignment for posts.

use chrono::{DateTime, Utc};
use deunicode::deunicode;

use crate::repo::{Repo, RepoResult};

/// Fallback when a title transliterates to no ASCII alphanumerics at all.
const EMPTY_SLUG_FALLBACK: &str = "post";

/// Lowercase, ASCII-transliterated, hyphen-separated. Non-ASCII text is
/// transliterated first (`café` → `cafe`, CJK to pinyin-style romanization),
/// then punctuation acts as a word separator; runs of separators collapse to
/// a single hyphen and leading/trailing hyphens are trimmed.
pub fn slugify(title: &str) -> String {
    let ascii = deunicode(title);
    let mut out = String::with_capacity(ascii.len());
    let mut pending_sep = false;
    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Slug for a new post: the slugified title, or the same with a
/// `YYYYMMDDHHMMSS` UTC suffix when that slug is already taken. Never reused
/// on edit; a post keeps its slug for life.
pub async fn unique_slug(repo: &dyn Repo, title: &str, now: DateTime<Utc>) -> RepoResult<String> {
    let mut base = slugify(title);
    if base.is_empty() {
        base = EMPTY_SLUG_FALLBACK.to_string();
    }
    if repo.slug_exists(&base).await? {
        Ok(format!("{}-{}", base, now.format("%Y%m%d%H%M%S")))
    } else {
        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_titles() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("My First Post"), "my-first-post");
        assert_eq!(slugify("Rust 2021 edition"), "rust-2021-edition");
    }

    #[test]
    fn separators_collapse() {
        assert_eq!(slugify("  spaced   out  "), "spaced-out");
        assert_eq!(slugify("a -- b ?? c"), "a-b-c");
        assert_eq!(slugify("---"), "");
    }

    #[test]
    fn non_ascii_transliterates() {
        assert_eq!(slugify("caf\u{e9} au lait"), "cafe-au-lait");
        assert_eq!(slugify("\u{4f60}\u{597d}"), "ni-hao");
        assert_eq!(slugify("\u{4f60}\u{597d}\u{4e16}\u{754c}"), "ni-hao-shi-jie");
    }
}
