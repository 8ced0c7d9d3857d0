//! Path addressing for document and schema trees.
//!
//! A path is an ordered sequence of segments: field names, concrete array
//! indexes, the `*` wildcard ("any index"), and `$parent` ("step to the
//! enclosing context"). Paths come in two flavors: the immutable [`Path`]
//! value used as map keys and inside the query AST, and the [`MutablePath`]
//! builder used while walking trees.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// A named field.
    Field(String),
    /// A concrete array index.
    Index(usize),
    /// The `*` wildcard, matching any array index.
    Any,
    /// The `$parent` step, ascending to the enclosing context.
    Parent,
}

impl Segment {
    /// Create a field segment.
    pub fn field(name: impl Into<String>) -> Self {
        Segment::Field(name.into())
    }

    /// Check whether this segment matches `other` for prefix purposes:
    /// `*` matches any concrete index and vice versa.
    pub fn matches(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Any, Segment::Index(_)) | (Segment::Index(_), Segment::Any) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Index(i) => write!(f, "{i}"),
            Segment::Any => f.write_str("*"),
            Segment::Parent => f.write_str("$parent"),
        }
    }
}

/// Error parsing a path from its dotted string form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path '{path}': {reason}")]
pub struct PathParseError {
    /// The offending input.
    pub path: String,
    /// What was wrong with it.
    pub reason: String,
}

/// An immutable, ordered sequence of segments.
///
/// Supports prefix/suffix slicing, equality, and the "matching prefix" test
/// used when converting absolute paths to relative ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path.
    pub fn empty() -> Self {
        Path { segments: Vec::new() }
    }

    /// Create a path from segments.
    pub fn new(segments: Vec<Segment>) -> Self {
        Path { segments }
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check whether the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The segments as a slice.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Get one segment.
    pub fn segment(&self, i: usize) -> Option<&Segment> {
        self.segments.get(i)
    }

    /// The last segment.
    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// The first `n` segments.
    pub fn prefix(&self, n: usize) -> Path {
        Path::new(self.segments[..n.min(self.segments.len())].to_vec())
    }

    /// The last `n` segments.
    pub fn suffix(&self, n: usize) -> Path {
        let start = self.segments.len().saturating_sub(n);
        Path::new(self.segments[start..].to_vec())
    }

    /// Drop the first `n` segments, keeping the rest.
    ///
    /// This is the absolute-to-relative slicing step: stripping a matching
    /// prefix leaves the path relative to that prefix.
    pub fn skip(&self, n: usize) -> Path {
        Path::new(self.segments[n.min(self.segments.len())..].to_vec())
    }

    /// Concatenate `other` onto the end of this path.
    pub fn concat(&self, other: &Path) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Path::new(segments)
    }

    /// Append a single segment, returning a new path.
    pub fn with(&self, segment: Segment) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Path::new(segments)
    }

    /// Check whether this path is a matching prefix of `other`.
    ///
    /// Segments are compared with `*` matching any concrete index and vice
    /// versa. The empty path is a matching prefix of everything.
    pub fn matching_prefix(&self, other: &Path) -> bool {
        if self.segments.len() > other.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a.matches(b))
    }

    /// Iterate over the segments.
    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Path::empty());
        }
        let mut segments = Vec::new();
        for part in s.split('.') {
            let segment = match part {
                "" => {
                    return Err(PathParseError {
                        path: s.to_string(),
                        reason: "empty segment".to_string(),
                    })
                }
                "*" => Segment::Any,
                "$parent" => Segment::Parent,
                _ => match part.parse::<usize>() {
                    Ok(i) => Segment::Index(i),
                    Err(_) => Segment::Field(part.to_string()),
                },
            };
            segments.push(segment);
        }
        Ok(Path::new(segments))
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A push/pop path builder used while walking trees.
#[derive(Debug, Clone, Default)]
pub struct MutablePath {
    segments: Vec<Segment>,
}

impl MutablePath {
    /// Create an empty builder.
    pub fn new() -> Self {
        MutablePath::default()
    }

    /// Number of segments currently pushed.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check whether nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Push a segment.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Pop the most recently pushed segment.
    pub fn pop(&mut self) -> Option<Segment> {
        self.segments.pop()
    }

    /// Snapshot the current state as an immutable path.
    pub fn to_path(&self) -> Path {
        Path::new(self.segments.clone())
    }
}

impl From<Path> for MutablePath {
    fn from(path: Path) -> Self {
        MutablePath { segments: path.segments }
    }
}

impl From<MutablePath> for Path {
    fn from(path: MutablePath) -> Self {
        Path::new(path.segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display_round_trip() {
        for s in ["a", "a.b.c", "a.*.b", "arr.0.f", "$parent.x", "$parent.$parent.y"] {
            assert_eq!(p(s).to_string(), s);
        }
        assert_eq!(Path::empty().to_string(), "");
    }

    #[test]
    fn test_parse_segments() {
        let path = p("obj.arr.*.3.$parent.f");
        assert_eq!(
            path.segments(),
            &[
                Segment::field("obj"),
                Segment::field("arr"),
                Segment::Any,
                Segment::Index(3),
                Segment::Parent,
                Segment::field("f"),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_empty_segment() {
        assert!("a..b".parse::<Path>().is_err());
        assert!(".a".parse::<Path>().is_err());
    }

    #[test]
    fn test_slicing() {
        let path = p("a.b.*.c");
        assert_eq!(path.prefix(2), p("a.b"));
        assert_eq!(path.suffix(2), p("*.c"));
        assert_eq!(path.skip(2), p("*.c"));
        assert_eq!(path.skip(0), path);
        assert_eq!(path.prefix(10), path);
    }

    #[test]
    fn test_matching_prefix() {
        assert!(p("a.b").matching_prefix(&p("a.b.c")));
        assert!(p("a.*").matching_prefix(&p("a.1.c")));
        assert!(p("a.1").matching_prefix(&p("a.*.c")));
        assert!(Path::empty().matching_prefix(&p("a")));
        assert!(!p("a.b").matching_prefix(&p("a.c.d")));
        assert!(!p("a.b.c.d").matching_prefix(&p("a.b")));
    }

    #[test]
    fn test_mutable_path() {
        let mut path = MutablePath::new();
        path.push(Segment::field("a"));
        path.push(Segment::Any);
        assert_eq!(path.to_path(), p("a.*"));
        path.pop();
        path.push(Segment::field("b"));
        assert_eq!(path.to_path(), p("a.b"));
    }

    #[test]
    fn test_serde_as_string() {
        let path = p("a.*.b");
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"a.*.b\"");
        let back: Path = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
