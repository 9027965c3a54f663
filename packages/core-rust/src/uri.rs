//! REST request-URI patterns such as `/2015-03-31/functions/{FunctionName}`,
//! `/{Bucket}/{Key+}`, or `/{Bucket}?tagging`.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped when expanding a label (RFC 3986 unreserved set).
const LABEL_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriPatternError {
    #[error("request URI '{0}' must start with '/'")]
    Relative(String),
    #[error("malformed label in segment '{0}'")]
    InvalidLabel(String),
    #[error("greedy label '{0}' must be the last path segment")]
    GreedyNotLast(String),
    #[error("no value supplied for URI label '{0}'")]
    MissingLabel(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Label(String),
    Greedy(String),
}

/// A literal query-string requirement embedded in the pattern (`?tagging`, `?list-type=2`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequirement {
    pub key: String,
    pub value: Option<String>,
}

/// Parsed request-URI pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
    query: Vec<QueryRequirement>,
}

impl UriPattern {
    /// The pattern as written in the specification.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of all labels, in path order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Label(name) | Segment::Greedy(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    #[must_use]
    pub fn query_requirements(&self) -> &[QueryRequirement] {
        &self.query
    }

    /// Number of wildcard (label) segments.
    #[must_use]
    pub fn wildcards(&self) -> usize {
        self.labels().count()
    }

    /// Sort key for choosing between patterns that match the same request.
    ///
    /// Lower is more specific. Greedy patterns sort after every non-greedy
    /// one, since a greedy label may stand for any number of segments. Ties
    /// go to fewer wildcards, then more literal query requirements.
    #[must_use]
    pub fn rank(&self) -> (bool, usize, Reverse<usize>) {
        let greedy = self.segments.iter().any(|s| matches!(s, Segment::Greedy(_)));
        (greedy, self.wildcards(), Reverse(self.query.len()))
    }

    /// Matches a request path and raw query string, returning the decoded
    /// label values on success.
    ///
    /// Empty segments never match a literal or a plain label, so `/a//b` and
    /// a trailing slash the pattern does not declare both fail.
    #[must_use]
    pub fn matches(&self, path: &str, query: Option<&str>) -> Option<BTreeMap<String, String>> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };
        let mut labels = BTreeMap::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    let part = parts.get(index)?;
                    if decode(part) != *literal {
                        return None;
                    }
                }
                Segment::Label(name) => {
                    let part = parts.get(index).filter(|p| !p.is_empty())?;
                    labels.insert(name.clone(), decode(part));
                }
                Segment::Greedy(name) => {
                    let rest = parts.get(index..)?;
                    let joined = rest.iter().map(|p| decode(p)).collect::<Vec<_>>().join("/");
                    if joined.is_empty() {
                        return None;
                    }
                    labels.insert(name.clone(), joined);
                    return self.query_satisfied(query).then_some(labels);
                }
            }
        }

        let expected = self.segments.len() + usize::from(self.trailing_slash);
        if parts.len() != expected || (self.trailing_slash && parts.last() != Some(&"")) {
            return None;
        }
        self.query_satisfied(query).then_some(labels)
    }

    /// Builds a concrete path from label values, percent-encoding each value.
    ///
    /// Literal query requirements are not included; see [`Self::query_requirements`].
    ///
    /// # Errors
    ///
    /// Returns [`UriPatternError::MissingLabel`] when `lookup` yields nothing for a label.
    pub fn expand<F>(&self, lookup: F) -> Result<String, UriPatternError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Literal(literal) => {
                    path.push_str(&utf8_percent_encode(literal, LABEL_ESCAPE).to_string());
                }
                Segment::Label(name) => {
                    let value = lookup(name).ok_or_else(|| UriPatternError::MissingLabel(name.clone()))?;
                    path.push_str(&utf8_percent_encode(&value, LABEL_ESCAPE).to_string());
                }
                Segment::Greedy(name) => {
                    let value = lookup(name).ok_or_else(|| UriPatternError::MissingLabel(name.clone()))?;
                    let encoded: Vec<String> = value
                        .split('/')
                        .map(|piece| utf8_percent_encode(piece, LABEL_ESCAPE).to_string())
                        .collect();
                    path.push_str(&encoded.join("/"));
                }
            }
        }
        if path.is_empty() || self.trailing_slash {
            path.push('/');
        }
        Ok(path)
    }

    fn query_satisfied(&self, query: Option<&str>) -> bool {
        if self.query.is_empty() {
            return true;
        }
        let pairs: Vec<(String, String)> = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        self.query.iter().all(|req| {
            pairs.iter().any(|(k, v)| {
                *k == req.key && req.value.as_ref().is_none_or(|expected| expected == v)
            })
        })
    }
}

impl FromStr for UriPattern {
    type Err = UriPatternError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (raw, None),
        };
        if !path.starts_with('/') {
            return Err(UriPatternError::Relative(raw.to_string()));
        }

        let trailing_slash = path.len() > 1 && path.ends_with('/');
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{') {
                Some(inner) => {
                    let name = inner
                        .strip_suffix('}')
                        .filter(|n| !n.is_empty() && !n.contains(['{', '}']))
                        .ok_or_else(|| UriPatternError::InvalidLabel((*part).to_string()))?;
                    match name.strip_suffix('+') {
                        Some(greedy) => {
                            if index + 1 != parts.len() {
                                return Err(UriPatternError::GreedyNotLast(greedy.to_string()));
                            }
                            Segment::Greedy(greedy.to_string())
                        }
                        None => Segment::Label(name.to_string()),
                    }
                }
                None if part.contains(['{', '}']) => {
                    return Err(UriPatternError::InvalidLabel((*part).to_string()));
                }
                None => Segment::Literal((*part).to_string()),
            };
            segments.push(segment);
        }

        let query = query
            .map(|q| {
                q.split('&')
                    .filter(|p| !p.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((key, value)) => QueryRequirement {
                            key: key.to_string(),
                            value: Some(value.to_string()),
                        },
                        None => QueryRequirement {
                            key: pair.to_string(),
                            value: None,
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            raw: raw.to_string(),
            segments,
            trailing_slash,
            query,
        })
    }
}

impl fmt::Display for UriPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn decode(part: &str) -> String {
    percent_decode_str(part).decode_utf8_lossy().into_owned()
}
