//! Path patterns for listener rule conditions.
//!
//! A pattern matches when the request path equals it, or when it matches
//! with `*` standing for any run of characters (including none) and `?`
//! for exactly one character. Matching is case-sensitive and anchored at
//! both ends; every other character is literal.

use regex::Regex;

use webtier_core::DefinitionError;
use webtier_core::validate::validate_path_pattern;

#[derive(Debug, Clone)]
enum Matcher {
    Exact,
    Wildcard(Regex),
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    matcher: Matcher,
}

impl PathPattern {
    /// Compile a pattern, validating its shape first.
    pub fn compile(raw: &str) -> Result<Self, DefinitionError> {
        validate_path_pattern(raw)?;

        if !raw.contains(['*', '?']) {
            return Ok(Self {
                raw: raw.to_string(),
                matcher: Matcher::Exact,
            });
        }

        let mut expr = String::with_capacity(raw.len() + 8);
        expr.push('^');
        for c in raw.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| DefinitionError::InvalidPathPattern {
            pattern: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: raw.to_string(),
            matcher: Matcher::Wildcard(regex),
        })
    }

    /// Whether `path` satisfies the pattern.
    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Exact => self.raw == path,
            Matcher::Wildcard(re) => re.is_match(path),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
