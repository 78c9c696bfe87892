//! The cache-exclusion policy.

use std::collections::BTreeSet;

/// Flags excluded from the cache key by default.
///
/// Their values vary between otherwise-equivalent builds (working
/// directories, host include roots, diagnostic limits), so keying on them
/// would split the cache without changing the produced object.
pub const DEFAULT_NON_CACHED: &[&str] = &[
    "-MF",
    "-MMD",
    "-MT",
    "-coverage-file",
    "-fdebug-compilation-dir",
    "-ferror-limit",
    "-include",
    "-internal-externc-isystem",
    "-internal-isystem",
    "-isysroot",
    "-main-file-name",
    "-resource-dir",
];

/// Decides which forwarded flags stay out of the cache key.
///
/// The set is policy, not mechanism: the classifier consults it per flag
/// spelling and is otherwise unaware of its contents, so deployments can
/// swap the set without touching classification.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    non_cached: BTreeSet<String>,
}

impl CachePolicy {
    /// Builds a policy from an explicit exclusion set.
    #[must_use]
    pub fn new<I, S>(non_cached: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            non_cached: non_cached.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns whether `spelling` must stay out of the cache key.
    #[must_use]
    pub fn is_non_cached(&self, spelling: &str) -> bool {
        self.non_cached.contains(spelling)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_NON_CACHED.iter().copied())
    }
}
