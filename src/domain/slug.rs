//! Group slug rules.
//!
//! A slug is the URL segment of a group page: ASCII letters, digits, hyphens
//! and underscores, at most [`MAX_SLUG_LEN`] characters. Administrators may
//! leave it blank, in which case one is derived from the title via the `slug`
//! crate and suffixed until it no longer collides.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

pub const MAX_SLUG_LEN: usize = 100;
const MAX_SUFFIX_ATTEMPTS: usize = 32;

/// Errors that can occur while validating or generating a slug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("slug may contain only letters, digits, hyphens and underscores")]
    InvalidCharacters,
    #[error("slug must be at most {MAX_SLUG_LEN} characters")]
    TooLong,
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Errors that can occur while generating a slug via an async uniqueness check.
#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Check an administrator-supplied slug.
pub fn validate_slug(slug: &str) -> Result<(), SlugError> {
    if slug.is_empty() {
        return Err(SlugError::EmptyInput);
    }
    if slug.chars().count() > MAX_SLUG_LEN {
        return Err(SlugError::TooLong);
    }
    if !slug
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(SlugError::InvalidCharacters);
    }
    Ok(())
}

/// Derive a base slug from a group title.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let mut candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    // Leave room for a `-NN` suffix.
    let budget = MAX_SLUG_LEN - 4;
    if candidate.len() > budget {
        candidate.truncate(budget);
        while candidate.ends_with('-') {
            candidate.pop();
        }
    }

    Ok(candidate)
}

/// Derive a slug from `input` that the async `is_unique` predicate accepts,
/// retrying with `-2`, `-3`, ... suffixes.
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(base.clone())
        .await
        .map_err(SlugAsyncError::Predicate)?
    {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(candidate.clone())
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_slug_accepts_url_safe_ascii() {
        assert!(validate_slug("cats_and-dogs-2").is_ok());
    }

    #[test]
    fn validate_slug_rejects_spaces_and_unicode() {
        assert_eq!(validate_slug("two words"), Err(SlugError::InvalidCharacters));
        assert_eq!(validate_slug("коты"), Err(SlugError::InvalidCharacters));
        assert_eq!(validate_slug(""), Err(SlugError::EmptyInput));
    }

    #[test]
    fn validate_slug_enforces_length() {
        let long = "a".repeat(MAX_SLUG_LEN + 1);
        assert_eq!(validate_slug(&long), Err(SlugError::TooLong));
        assert!(validate_slug(&"a".repeat(MAX_SLUG_LEN)).is_ok());
    }

    #[test]
    fn derive_slug_lowercases_and_hyphenates() {
        assert_eq!(derive_slug("Rust Beginners").unwrap(), "rust-beginners");
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn derived_slugs_are_valid() {
        let slug = derive_slug(&"Long Title ".repeat(40)).unwrap();
        assert!(validate_slug(&slug).is_ok());
        assert!(!slug.ends_with('-'));
    }

    #[tokio::test]
    async fn generate_unique_slug_async_appends_counter() {
        use std::sync::Arc;
        use tokio::sync::Mutex;

        let existing = Arc::new(Mutex::new(vec!["pattern-library".to_string()]));

        let slug = generate_unique_slug_async("Pattern Library", |candidate| {
            let existing = existing.clone();
            async move {
                let mut guard = existing.lock().await;
                if guard.contains(&candidate) {
                    Ok::<bool, std::convert::Infallible>(false)
                } else {
                    guard.push(candidate);
                    Ok(true)
                }
            }
        })
        .await
        .expect("unique slug");

        assert_eq!(slug, "pattern-library-2");
    }

    #[tokio::test]
    async fn generate_unique_slug_async_exhausts() {
        let result = generate_unique_slug_async("Example", |_| async {
            Ok::<bool, std::convert::Infallible>(false)
        })
        .await;

        assert!(matches!(
            result,
            Err(SlugAsyncError::Slug(SlugError::Exhausted { base })) if base == "example"
        ));
    }
}
