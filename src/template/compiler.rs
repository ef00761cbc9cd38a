//! URI template compilation.
//!
//! # Responsibilities
//! - Parse `path?query` templates into segment and query descriptors
//! - Classify parts as literal, variable, compound, or wildcard
//! - Derive the canonical path shape used for grouping
//! - Match compiled templates against request paths and queries
//!
//! # Design Decisions
//! - Literal path text compares ASCII case-insensitively; query values
//!   compare ordinally
//! - Literal path text is percent-decoded at compile time; request segments
//!   are decoded before matching
//! - Variable names never influence the shape or equivalence
//! - Compound query values are rejected; only literal, variable, or empty
//!   values are meaningful for disambiguation

use std::collections::HashSet;
use std::fmt;

use crate::error::{DispatchError, DispatchResult};
use crate::routing::address::decode_segment;
use crate::template::query::query_value;

/// Text of the anonymous wildcard segment.
pub const WILDCARD: &str = "*";

/// Classification of a segment or query value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartType {
    Literal,
    Compound,
    Variable,
}

/// One piece of a compound segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    Variable(String),
}

/// Compiled path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Variable(String),
    /// Literal text mixed with variables, e.g. `prefix{var}suffix`.
    Compound(Vec<Piece>),
    /// Matches the remainder of the path; optionally binds it to a name.
    Wildcard(Option<String>),
}

impl Segment {
    fn canonical(&self) -> String {
        match self {
            Self::Literal(text) => text.to_ascii_uppercase(),
            Self::Variable(_) => "{}".to_string(),
            Self::Compound(pieces) => pieces
                .iter()
                .map(|p| match p {
                    Piece::Literal(text) => text.to_ascii_uppercase(),
                    Piece::Variable(_) => "{}".to_string(),
                })
                .collect(),
            Self::Wildcard(_) => WILDCARD.to_string(),
        }
    }
}

/// Compiled query value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Literal(String),
    Variable(String),
    /// `?key` or `?key=`: the key must be present with no value.
    Empty,
}

impl QueryValue {
    /// Literal and empty values both constrain the request value.
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_) | Self::Empty)
    }

    /// Value used in disambiguation tuples; `None` for the empty literal.
    pub fn literal_text(&self) -> Option<&str> {
        match self {
            Self::Literal(text) => Some(text),
            _ => None,
        }
    }
}

/// Canonical path shape. Templates with equal shapes form one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeKey(String);

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

/// A parsed URI template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    text: String,
    segments: Vec<Segment>,
    queries: Vec<(String, QueryValue)>,
    shape: ShapeKey,
}

/// Classify one segment or query value.
pub fn identify_part_type(part: &str) -> Result<PartType, String> {
    let pieces = split_pieces(part)?;
    Ok(classify(&pieces))
}

fn classify(pieces: &[Piece]) -> PartType {
    match pieces {
        [Piece::Variable(_)] => PartType::Variable,
        _ if pieces.iter().any(|p| matches!(p, Piece::Variable(_))) => PartType::Compound,
        _ => PartType::Literal,
    }
}

fn split_pieces(part: &str) -> Result<Vec<Piece>, String> {
    let mut pieces = Vec::new();
    let mut rest = part;
    while !rest.is_empty() {
        match rest.find(['{', '}']) {
            None => {
                pieces.push(Piece::Literal(rest.to_string()));
                break;
            }
            Some(open) if rest.as_bytes()[open] == b'}' => {
                return Err(format!("unbalanced '}}' in '{}'", part));
            }
            Some(open) => {
                if open > 0 {
                    pieces.push(Piece::Literal(rest[..open].to_string()));
                }
                let after = &rest[open + 1..];
                let close = after
                    .find(['{', '}'])
                    .filter(|&i| after.as_bytes()[i] == b'}')
                    .ok_or_else(|| format!("unbalanced '{{' in '{}'", part))?;
                let name = &after[..close];
                if name.is_empty() {
                    return Err(format!("empty variable name in '{}'", part));
                }
                pieces.push(Piece::Variable(name.to_string()));
                rest = &after[close + 1..];
            }
        }
    }
    Ok(pieces)
}

fn compile_segment(template: &str, part: &str) -> DispatchResult<Segment> {
    if part == WILDCARD {
        return Ok(Segment::Wildcard(None));
    }
    let pieces = split_pieces(part).map_err(|reason| DispatchError::format(template, reason))?;
    match classify(&pieces) {
        PartType::Literal => Ok(Segment::Literal(decode_segment(part).into_owned())),
        PartType::Variable => {
            let Some(Piece::Variable(name)) = pieces.into_iter().next() else {
                return Err(DispatchError::format(template, "variable segment without a name"));
            };
            match name.strip_prefix('*') {
                Some("") => Err(DispatchError::format(template, "empty wildcard variable name")),
                Some(wild) => Ok(Segment::Wildcard(Some(wild.to_string()))),
                None => Ok(Segment::Variable(name)),
            }
        }
        PartType::Compound => {
            let adjacent = pieces
                .windows(2)
                .any(|w| matches!(w, [Piece::Variable(_), Piece::Variable(_)]));
            if adjacent {
                return Err(DispatchError::format(
                    template,
                    format!("adjacent variables in compound segment '{}'", part),
                ));
            }
            let starred = pieces
                .iter()
                .any(|p| matches!(p, Piece::Variable(n) if n.starts_with('*')));
            if starred {
                return Err(DispatchError::format(
                    template,
                    format!("wildcard variable inside compound segment '{}'", part),
                ));
            }
            let pieces = pieces
                .into_iter()
                .map(|piece| match piece {
                    Piece::Literal(text) => Piece::Literal(decode_segment(&text).into_owned()),
                    variable => variable,
                })
                .collect();
            Ok(Segment::Compound(pieces))
        }
    }
}

fn compile_query_value(template: &str, key: &str, value: Option<&str>) -> DispatchResult<QueryValue> {
    let value = match value {
        None | Some("") => return Ok(QueryValue::Empty),
        Some(value) => value,
    };
    let pieces = split_pieces(value).map_err(|reason| DispatchError::format(template, reason))?;
    match (classify(&pieces), pieces.into_iter().next()) {
        (PartType::Literal, _) => Ok(QueryValue::Literal(value.to_string())),
        (PartType::Variable, Some(Piece::Variable(name))) if !name.starts_with('*') => {
            Ok(QueryValue::Variable(name))
        }
        _ => Err(DispatchError::format(
            template,
            format!("query value for '{}' must be a literal or a single variable", key),
        )),
    }
}

impl CompiledTemplate {
    /// Compile a template string such as `/items/{id}?format=xml`.
    pub fn compile(text: &str) -> DispatchResult<Self> {
        let (path, query) = match text.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (text, None),
        };

        let mut segments = Vec::new();
        for part in path.split('/').filter(|s| !s.is_empty()) {
            segments.push(compile_segment(text, part)?);
        }
        if let Some(pos) = segments.iter().position(|s| matches!(s, Segment::Wildcard(_))) {
            if pos + 1 != segments.len() {
                return Err(DispatchError::format(text, "wildcard must be the final path segment"));
            }
        }

        let mut queries: Vec<(String, QueryValue)> = Vec::new();
        for pair in query.unwrap_or_default().split('&').filter(|s| !s.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (pair, None),
            };
            if key.is_empty() || key.contains(['{', '}']) {
                return Err(DispatchError::format(
                    text,
                    format!("query key '{}' must be a non-empty literal", key),
                ));
            }
            if queries.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
                return Err(DispatchError::format(text, format!("duplicate query key '{}'", key)));
            }
            let value = compile_query_value(text, key, value)?;
            queries.push((key.to_string(), value));
        }

        let template = Self {
            text: text.to_string(),
            shape: ShapeKey(segments.iter().map(Segment::canonical).collect::<Vec<_>>().join("/")),
            segments,
            queries,
        };
        template.check_unique_variables()?;
        Ok(template)
    }

    fn check_unique_variables(&self) -> DispatchResult<()> {
        let mut seen = HashSet::new();
        for name in self.variable_names() {
            if !seen.insert(name.to_ascii_uppercase()) {
                return Err(DispatchError::format(
                    &self.text,
                    format!("variable '{}' declared more than once", name),
                ));
            }
        }
        Ok(())
    }

    /// Names of all variables, path first, then query.
    pub fn variable_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for segment in &self.segments {
            match segment {
                Segment::Variable(name) | Segment::Wildcard(Some(name)) => names.push(name.as_str()),
                Segment::Compound(pieces) => {
                    for piece in pieces {
                        if let Piece::Variable(name) = piece {
                            names.push(name.as_str());
                        }
                    }
                }
                _ => {}
            }
        }
        for (_, value) in &self.queries {
            if let QueryValue::Variable(name) = value {
                names.push(name.as_str());
            }
        }
        names
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn queries(&self) -> &[(String, QueryValue)] {
        &self.queries
    }

    /// Query constraint declared for `key` (case-insensitive).
    pub fn query(&self, key: &str) -> Option<&QueryValue> {
        self.queries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn shape(&self) -> &ShapeKey {
        &self.shape
    }

    pub fn ends_with_wildcard(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Wildcard(_)))
    }

    /// Equal shapes, or both templates end in a wildcard and the segments
    /// before the shorter one's wildcard have the same shape as the start
    /// of the longer one. Such templates can match the same paths.
    pub fn shares_shape_with(&self, other: &CompiledTemplate) -> bool {
        if self.shape == other.shape {
            return true;
        }
        if !self.ends_with_wildcard() || !other.ends_with_wildcard() {
            return false;
        }
        let (short, long) = if self.segments.len() <= other.segments.len() {
            (self, other)
        } else {
            (other, self)
        };
        let prefix = short.segments.len() - 1;
        short.segments[..prefix]
            .iter()
            .zip(&long.segments[..prefix])
            .all(|(a, b)| a.canonical() == b.canonical())
    }

    /// True when any query key requires a literal (or empty) value.
    pub fn has_query_literal_requirements(&self) -> bool {
        self.queries.iter().any(|(_, v)| v.is_literal())
    }

    /// Same canonical path and the same query constraints. Keys compare
    /// case-insensitively, literal values ordinally, variable names not at all.
    pub fn is_equivalent_to(&self, other: &CompiledTemplate) -> bool {
        if self.shape != other.shape || self.queries.len() != other.queries.len() {
            return false;
        }
        self.queries.iter().all(|(key, value)| {
            match (value, other.query(key)) {
                (QueryValue::Literal(a), Some(QueryValue::Literal(b))) => a == b,
                (QueryValue::Variable(_), Some(QueryValue::Variable(_))) => true,
                (QueryValue::Empty, Some(QueryValue::Empty)) => true,
                _ => false,
            }
        })
    }

    /// Accepts any query: the template declares no query constraints.
    pub fn matches_trivially(&self) -> bool {
        self.queries.is_empty()
    }

    /// Every literal query constraint is satisfied by `query`. With
    /// `must_be_especially_interesting`, every variable key must also be
    /// present. Templates without query constraints are never interesting.
    pub fn matches_interestingly(
        &self,
        query: &[(String, String)],
        must_be_especially_interesting: bool,
    ) -> bool {
        if self.queries.is_empty() {
            return false;
        }
        self.queries.iter().all(|(key, value)| {
            let actual = query_value(query, key);
            match value {
                QueryValue::Literal(expected) => actual == Some(expected.as_str()),
                QueryValue::Empty => actual.is_some_and(str::is_empty),
                QueryValue::Variable(_) => !must_be_especially_interesting || actual.is_some(),
            }
        })
    }

    /// Match the request path segments, returning the path bindings.
    pub fn match_path(&self, request: &[&str]) -> Option<Vec<(String, String)>> {
        let mut bindings = Vec::new();
        for (i, segment) in self.segments.iter().enumerate() {
            if let Segment::Wildcard(name) = segment {
                if let Some(name) = name {
                    bindings.push((name.clone(), request.get(i..).unwrap_or_default().join("/")));
                }
                return Some(bindings);
            }
            let actual = request.get(i)?;
            match segment {
                Segment::Literal(text) => {
                    if !text.eq_ignore_ascii_case(actual) {
                        return None;
                    }
                }
                Segment::Variable(name) => bindings.push((name.clone(), actual.to_string())),
                Segment::Compound(pieces) => bindings.extend(match_compound(pieces, actual)?),
                Segment::Wildcard(_) => {}
            }
        }
        (request.len() == self.segments.len()).then_some(bindings)
    }

    /// Values of the variable query keys present in `query`.
    pub fn query_bindings(&self, query: &[(String, String)]) -> Vec<(String, String)> {
        self.queries
            .iter()
            .filter_map(|(key, value)| match value {
                QueryValue::Variable(name) => {
                    query_value(query, key).map(|v| (name.clone(), v.to_string()))
                }
                _ => None,
            })
            .collect()
    }
}

/// Match one compound segment. Variables are non-empty; each takes the
/// shortest text that still lets the rest of the segment match.
fn match_compound(pieces: &[Piece], actual: &str) -> Option<Vec<(String, String)>> {
    let mut bindings = Vec::new();
    match_pieces(pieces, actual, &mut bindings).then_some(bindings)
}

fn match_pieces(pieces: &[Piece], text: &str, bindings: &mut Vec<(String, String)>) -> bool {
    let Some((first, rest)) = pieces.split_first() else {
        return text.is_empty();
    };
    match first {
        Piece::Literal(literal) => match text.get(..literal.len()) {
            Some(head) if head.eq_ignore_ascii_case(literal) => {
                match_pieces(rest, &text[literal.len()..], bindings)
            }
            _ => false,
        },
        Piece::Variable(name) if rest.is_empty() => {
            if text.is_empty() {
                return false;
            }
            bindings.push((name.clone(), text.to_string()));
            true
        }
        Piece::Variable(name) => {
            let ends = text
                .char_indices()
                .skip(1)
                .map(|(i, _)| i)
                .chain(std::iter::once(text.len()));
            for end in ends {
                bindings.push((name.clone(), text[..end].to_string()));
                if match_pieces(rest, &text[end..], bindings) {
                    return true;
                }
                bindings.pop();
            }
            false
        }
    }
}

impl fmt::Display for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
