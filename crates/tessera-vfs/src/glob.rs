//! Shell-style glob patterns compiled to anchored regular expressions.
//!
//! Supported syntax:
//! - `?` matches any single character
//! - `*` matches zero or more characters within one path segment
//! - `**` matches zero or more characters across segments (a following separator is consumed, so
//!   `**/*.ts` also matches `a.ts`)
//! - `[abc]`, `[a-z]`, `[!abc]` character classes
//! - `{a,b,c}` alternation
//! - `a;b` (or a slice of patterns) matches if any alternative matches
//!
//! Every other character is literal, including regex metacharacters such as `.`, `$` or `^`.

use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::error::{Error, Result};

const GLOB_CHARS: [char; 4] = ['*', '?', '[', '{'];

/// Returns `true` if `s` contains any glob metacharacter.
pub fn contains_glob(s: &str) -> bool {
    s.contains(GLOB_CHARS)
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Splits a pattern into its literal base directory and the remaining glob.
///
/// The base is everything before the last separator that precedes the first glob
/// metacharacter. Returns `None` for literal patterns.
///
/// ```
/// use tessera_vfs::split_glob_base;
///
/// assert_eq!(split_glob_base("/src/**/*.rs"), Some(("/src", "**/*.rs")));
/// assert_eq!(split_glob_base("*.rs"), Some(("", "*.rs")));
/// assert_eq!(split_glob_base("/src/main.rs"), None);
/// ```
pub fn split_glob_base(pattern: &str) -> Option<(&str, &str)> {
    let first = pattern.find(GLOB_CHARS)?;
    match pattern[..first].rfind(is_separator) {
        Some(sep) => Some((&pattern[..sep], &pattern[sep + 1..])),
        None => Some(("", pattern)),
    }
}

/// A compiled glob (or disjunction of globs).
#[derive(Clone)]
pub struct Glob {
    patterns: Vec<String>,
    regex: Option<Regex>,
}

impl Glob {
    /// Compiles a single pattern. `;` separates alternatives.
    pub fn new(pattern: &str) -> Result<Self> {
        Self::from_patterns(pattern.split(';'))
    }

    /// Compiles the disjunction of `patterns`. Empty patterns are ignored; an empty set matches
    /// nothing.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        if patterns.is_empty() {
            return Ok(Self {
                patterns,
                regex: None,
            });
        }

        let alternatives: Vec<String> = patterns
            .iter()
            .map(|p| format!("(?:{})", to_regex(p)))
            .collect();
        let source = format!("^(?:{})$", alternatives.join("|"));
        let regex = Regex::new(&source).map_err(|source| Error::InvalidGlob {
            pattern: patterns.join(";"),
            source,
        })?;

        Ok(Self {
            patterns,
            regex: Some(regex),
        })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(candidate))
    }

    pub fn is_match_path(&self, candidate: &Path) -> bool {
        self.is_match(&candidate.to_string_lossy())
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.patterns.join(";")).finish()
    }
}

fn to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut re = String::with_capacity(pattern.len() * 2);
    let mut in_class = false;
    let mut class_start = false;
    let mut braces = 0usize;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if in_class {
            match c {
                ']' => {
                    re.push(']');
                    in_class = false;
                }
                '!' if class_start => re.push('^'),
                '-' => re.push('-'),
                c if c.is_alphanumeric() => re.push(c),
                c => {
                    re.push('\\');
                    re.push(c);
                }
            }
            class_start = false;
            i += 1;
            continue;
        }

        match c {
            '?' => re.push('.'),
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    re.push_str(".*");
                    i += 1;
                    if chars.get(i + 1).copied().is_some_and(is_separator) {
                        i += 1;
                    }
                } else {
                    re.push_str(r"[^/\\]*");
                }
            }
            '[' => {
                re.push('[');
                in_class = true;
                class_start = true;
            }
            '{' => {
                re.push_str("(?:");
                braces += 1;
            }
            '}' if braces > 0 => {
                re.push(')');
                braces -= 1;
            }
            ',' if braces > 0 => re.push('|'),
            c => {
                let mut buf = [0u8; 4];
                re.push_str(&regex::escape(c.encode_utf8(&mut buf)));
            }
        }
        i += 1;
    }

    re
}
