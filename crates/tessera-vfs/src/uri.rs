use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// A `scheme://authority/path?query#fragment` resource identifier.
///
/// Components are stored verbatim (no percent-decoding); backends that encode data into a
/// component are responsible for encoding/decoding it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: String,
    authority: String,
    path: String,
    query: String,
    fragment: String,
}

impl Uri {
    pub fn new(scheme: impl Into<String>, authority: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            authority: authority.into(),
            path: path.into(),
            query: String::new(),
            fragment: String::new(),
        }
    }

    /// Builds a `file` URI for a local path.
    pub fn file(path: impl AsRef<Path>) -> Self {
        let mut path = path.as_ref().to_string_lossy().replace('\\', "/");
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self::new("file", "", path)
    }

    pub fn parse(input: &str) -> Result<Self> {
        let malformed = |reason| Error::MalformedUri {
            uri: input.to_string(),
            reason,
        };

        let colon = input.find(':').ok_or_else(|| malformed("missing scheme"))?;
        let scheme = &input[..colon];
        let valid_scheme = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid_scheme {
            return Err(malformed("invalid scheme"));
        }

        let mut rest = &input[colon + 1..];

        let (rest_before_fragment, fragment) = match rest.find('#') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        rest = rest_before_fragment;

        let (rest_before_query, query) = match rest.find('?') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        rest = rest_before_query;

        let (authority, path) = match rest.strip_prefix("//") {
            Some(after) => match after.find('/') {
                Some(idx) => (&after[..idx], &after[idx..]),
                None => (after, ""),
            },
            None => ("", rest),
        };

        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            fragment: fragment.to_string(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = fragment.into();
        self
    }

    /// Wraps `inner` into a URI of `scheme`, moving the inner scheme into the authority.
    ///
    /// The inner authority is not preserved.
    pub fn encapsulate(inner: &Uri, scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            authority: inner.scheme.clone(),
            path: inner.path.clone(),
            query: inner.query.clone(),
            fragment: inner.fragment.clone(),
        }
    }

    /// Inverse of [`Uri::encapsulate`]: the authority becomes the scheme.
    pub fn encapsulated(&self) -> Result<Uri> {
        if self.authority.is_empty() {
            return Err(Error::MalformedUri {
                uri: self.to_string(),
                reason: "missing encapsulated scheme",
            });
        }
        Ok(Self {
            scheme: self.authority.clone(),
            authority: String::new(),
            path: self.path.clone(),
            query: self.query.clone(),
            fragment: self.fragment.clone(),
        })
    }

    /// Returns the local path for `file` URIs.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.scheme != "file" {
            return None;
        }
        let path = self.path.as_str();
        // `/C:/dir` -> `C:/dir`
        let bytes = path.as_bytes();
        if bytes.len() >= 3 && bytes[0] == b'/' && bytes[1].is_ascii_alphabetic() && bytes[2] == b':' {
            return Some(PathBuf::from(&path[1..]));
        }
        Some(PathBuf::from(path))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

impl FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uri::parse(s)
    }
}
