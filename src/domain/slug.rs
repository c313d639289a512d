//! Post slugs. Titles are transliterated (Chinese via `pinyin`) before
//! `slug::slugify`, so `Rust 基础教程` becomes `rust-ji-chu-jiao-cheng`.

use std::future::Future;

use pinyin::ToPinyin;
use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError<E> {
    #[error("cannot derive a slug from `{0}`")]
    Unrepresentable(String),
    #[error("no free slug left for `{0}`")]
    Exhausted(String),
    #[error("slug lookup failed: {0}")]
    Lookup(E),
}

/// Base slug for a title, or `None` when nothing slug-worthy remains.
pub fn derive_slug(title: &str) -> Option<String> {
    let mut ascii = String::with_capacity(title.len());
    for ch in title.trim().chars() {
        if ch.is_ascii() {
            ascii.push(ch);
        } else if let Some(py) = ch.to_pinyin() {
            if !ascii.is_empty() && !ascii.ends_with(' ') {
                ascii.push(' ');
            }
            ascii.push_str(py.plain());
            ascii.push(' ');
        } else if ch.is_whitespace() {
            ascii.push(' ');
        }
    }

    let slug = slugify(ascii);
    (!slug.is_empty()).then_some(slug)
}

/// `base`, `base-2`, `base-3`, ... in probing order.
pub fn candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string())
        .chain((2..=MAX_SUFFIX).map(move |n| format!("{base}-{n}")))
}

/// First candidate for which `taken` answers `false`.
pub async fn unique_slug<F, Fut, E>(title: &str, mut taken: F) -> Result<String, SlugError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let base = derive_slug(title).ok_or_else(|| SlugError::Unrepresentable(title.to_string()))?;
    for candidate in candidates(&base) {
        if !taken(candidate.clone()).await.map_err(SlugError::Lookup)? {
            return Ok(candidate);
        }
    }
    Err(SlugError::Exhausted(base))
}
