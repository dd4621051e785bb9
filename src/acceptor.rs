//! Decides whether a strategy is responsible for an object, purely from the
//! object's fully qualified type name.
//!
//! Patterns are tried in the order given and the first match wins:
//! * `*.*` (or `*`) accepts every type,
//! * `org.domain.pkg1.*` accepts every type under that prefix, nested packages included,
//! * anything without a wildcard must equal the type name exactly.
//!
//! Rust-style paths work the same way (`my_app::model::*`).

use regex::Regex;

use crate::error::{MarshalError, Result};

pub const ACCEPT_ALL: &str = "*.*";
const WILDCARD: char = '*';

#[derive(Debug, Clone)]
enum Matcher {
    Everything,
    Pattern(Regex),
}

#[derive(Debug, Clone)]
struct ClassPattern {
    source: String,
    matcher: Matcher,
}

impl ClassPattern {
    fn compile(pattern: &str) -> Result<Self> {
        let malformed = |reason: &str| MarshalError::MalformedPattern {
            pattern: pattern.to_owned(),
            reason: reason.to_owned(),
        };
        if pattern.is_empty() {
            return Err(malformed("pattern is empty"));
        }
        if pattern.chars().any(char::is_whitespace) {
            return Err(malformed("pattern contains whitespace"));
        }
        let matcher = if pattern == ACCEPT_ALL || pattern == "*" {
            Matcher::Everything
        } else {
            let expression = match pattern.find(WILDCARD) {
                None => format!("^{}$", regex::escape(pattern)),
                Some(position) if position + 1 == pattern.len() => {
                    format!("^{}.+$", regex::escape(&pattern[..position]))
                }
                Some(_) => return Err(malformed("wildcard is only allowed in trailing position")),
            };
            let regex = Regex::new(&expression).map_err(|e| malformed(&e.to_string()))?;
            Matcher::Pattern(regex)
        };
        Ok(Self {
            source: pattern.to_owned(),
            matcher,
        })
    }
    fn matches(&self, type_name: &str) -> bool {
        match &self.matcher {
            Matcher::Everything => true,
            Matcher::Pattern(regex) => regex.is_match(type_name),
        }
    }
}

// ------------- ClassFilterAcceptor -------------
#[derive(Debug, Clone)]
pub struct ClassFilterAcceptor {
    patterns: Vec<ClassPattern>,
}

impl ClassFilterAcceptor {
    /// Fails on the first malformed pattern; an empty list yields an acceptor
    /// that rejects everything.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| ClassPattern::compile(p.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
    pub fn accept_all() -> Self {
        Self {
            patterns: vec![ClassPattern {
                source: ACCEPT_ALL.to_owned(),
                matcher: Matcher::Everything,
            }],
        }
    }
    pub fn accepts(&self, type_name: &str) -> bool {
        self.matching_pattern(type_name).is_some()
    }
    /// The first pattern, in construction order, that matches.
    pub fn matching_pattern(&self, type_name: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|p| p.matches(type_name))
            .map(|p| p.source.as_str())
    }
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.source.as_str())
    }
}

impl Default for ClassFilterAcceptor {
    fn default() -> Self {
        Self::accept_all()
    }
}
