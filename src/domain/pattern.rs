//! Wildcard id patterns used for whitelisting and subscriptions.
//!
//! A pattern is a literal id where each `*` stands for any substring,
//! including the empty one. Patterns are compiled once into an anchored
//! [`Regex`] and then reused for every change event; the empty pattern and
//! the lone `*` skip the regex entirely.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;

/// Pattern that matches every id.
pub const MATCH_ALL: &str = "*";

/// Error raised when a pattern cannot be compiled.
#[derive(Debug, thiserror::Error)]
#[error("invalid pattern {pattern:?}: {source}")]
pub struct PatternError {
    /// The offending pattern string.
    pub pattern: String,
    /// Underlying regex compilation error.
    #[source]
    pub source: regex::Error,
}

#[derive(Clone)]
enum Matcher {
    Any,
    Regex(Arc<Regex>),
}

/// A compiled wildcard pattern. Cloning is cheap.
#[derive(Clone)]
pub struct IdPattern {
    source: String,
    matcher: Matcher,
}

impl IdPattern {
    /// Compiles `pattern` into a reusable matcher.
    ///
    /// Every character other than `*` is matched literally.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the resulting expression exceeds the
    /// regex engine's size limits.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() || pattern == MATCH_ALL {
            return Ok(Self {
                source: pattern.to_string(),
                matcher: Matcher::Any,
            });
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("(?s)^{body}$")).map_err(|source| PatternError {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            matcher: Matcher::Regex(Arc::new(regex)),
        })
    }

    /// Returns `true` if `id` matches this pattern.
    #[must_use]
    pub fn matches(&self, id: &str) -> bool {
        match &self.matcher {
            Matcher::Any => true,
            Matcher::Regex(re) => re.is_match(id),
        }
    }

    /// Returns `true` if this pattern matches every id.
    #[must_use]
    pub fn matches_all(&self) -> bool {
        matches!(self.matcher, Matcher::Any)
    }

    /// Returns the pattern string this matcher was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for IdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IdPattern").field(&self.source).finish()
    }
}

impl fmt::Display for IdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// The configured set of exposed ids.
///
/// An empty whitelist is unrestricted and behaves like `["*"]`.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    patterns: Vec<IdPattern>,
}

impl Whitelist {
    /// Compiles every configured pattern, preserving order.
    ///
    /// # Errors
    ///
    /// Returns the first [`PatternError`] encountered.
    pub fn new<I, S>(patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| IdPattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Whitelist that admits every id.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Returns `true` if no pattern restricts the exposed ids.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(IdPattern::matches_all)
    }

    /// Returns `true` if `id` is exposed to clients.
    #[must_use]
    pub fn allows(&self, id: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.matches(id))
    }

    /// Pattern strings to resolve and subscribe, in configured order.
    ///
    /// Returns `["*"]` for an empty whitelist.
    #[must_use]
    pub fn effective_patterns(&self) -> Vec<String> {
        if self.patterns.is_empty() {
            return vec![MATCH_ALL.to_string()];
        }
        self.patterns.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Number of configured patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns `true` if no patterns are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Compiled patterns keyed by their source string.
///
/// Client `subscribe` requests repeat the same handful of patterns, so each
/// one is compiled once while the cache has room. Once `capacity` entries
/// are held, new patterns are compiled on every use and not retained.
#[derive(Debug)]
pub struct PatternCache {
    compiled: Mutex<HashMap<String, IdPattern>>,
    capacity: usize,
}

impl PatternCache {
    /// Default number of retained patterns.
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates an empty cache holding at most [`Self::DEFAULT_CAPACITY`]
    /// patterns.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates an empty cache holding at most `capacity` patterns.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            compiled: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Returns the compiled form of `pattern`, compiling it if it is not
    /// cached.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] if the pattern cannot be compiled. Failures
    /// are not cached.
    pub fn get_or_compile(&self, pattern: &str) -> Result<IdPattern, PatternError> {
        if let Some(p) = self.compiled.lock().get(pattern) {
            return Ok(p.clone());
        }
        let compiled = IdPattern::compile(pattern)?;
        let mut cache = self.compiled.lock();
        if cache.len() < self.capacity {
            let _ = cache.insert(pattern.to_string(), compiled.clone());
        }
        Ok(compiled)
    }

    /// Number of cached patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compiled.lock().len()
    }

    /// Returns `true` if nothing has been compiled yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compiled.lock().is_empty()
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new()
    }
}
