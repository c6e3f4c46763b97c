//! Pattern-based token cleaning.

use std::borrow::Cow;

use regex::Regex;
use tristream_types::{PipelineError, DEFAULT_PATTERN};

/// Configuration options for token normalization.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Every match of this pattern is removed from each token.
    pub pattern: String,
    /// When enabled, tokens are lowercased after stripping.
    /// For example, "Hello!" becomes "hello".
    pub lowercase: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_owned(),
            lowercase: false,
        }
    }
}

/// Per-token string cleaner applied to whole batches.
///
/// Performs the following operations on every token:
/// - Removes every match of the configured pattern (default `[^\w]`, which
///   keeps letters, digits and underscore)
/// - Optionally lowercases the result (Unicode-aware)
///
/// A batch keeps its length and order: a token that strips down to nothing
/// stays in place as an empty string. The trigram aggregator relies on this,
/// since the overlap between consecutive batches is positional.
///
/// Cloning is cheap; the compiled pattern is shared between clones.
///
/// # Examples
///
/// ```
/// use tristream_core::analyzer::normalizer::TextNormalizer;
///
/// let normalizer = TextNormalizer::default();
/// let mut batch = vec!["a.".to_string(), "b,".to_string(), "...".to_string()];
/// normalizer.normalize_batch(&mut batch);
/// assert_eq!(batch, ["a", "b", ""]);
/// ```
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    pattern: Regex,
    lowercase: bool,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_PATTERN).expect("default pattern compiles"),
            lowercase: false,
        }
    }
}

impl TextNormalizer {
    /// Compiles a normalizer from its configuration.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidPattern`] if the pattern does not compile.
    pub fn new(config: &NormalizerConfig) -> Result<Self, PipelineError> {
        let pattern = Regex::new(&config.pattern).map_err(|e| PipelineError::InvalidPattern {
            pattern: config.pattern.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern,
            lowercase: config.lowercase,
        })
    }

    /// The compiled exclusion pattern.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Normalizes one token, borrowing when nothing changes.
    #[inline]
    pub fn normalize<'t>(&self, token: &'t str) -> Cow<'t, str> {
        let stripped = self.pattern.replace_all(token, "");
        if !self.lowercase || stripped.chars().all(|c| c.to_lowercase().eq(Some(c))) {
            return stripped;
        }
        Cow::Owned(stripped.to_lowercase())
    }

    /// Normalizes every token of `batch` in place.
    ///
    /// Tokens that need no change are left untouched, so a clean batch costs
    /// one scan per token and no allocation.
    pub fn normalize_batch(&self, batch: &mut [String]) {
        for token in batch.iter_mut() {
            if let Cow::Owned(cleaned) = self.normalize(token) {
                *token = cleaned;
            }
        }
    }
}
