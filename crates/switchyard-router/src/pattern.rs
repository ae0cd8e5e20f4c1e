//! Route template compilation.
//!
//! A template such as `/users/:id` or `/assets/*path` is split on `/` and
//! each piece is classified into a [`Segment`]. Compiled patterns can be
//! compared with [`Pattern::relationship`] to detect registrations that
//! would be ambiguous at dispatch time.

use std::fmt;

use http::Method;
use thiserror::Error;

use crate::params::ParamKey;

/// Name given to an anonymous `*` wildcard.
pub const ANONYMOUS_WILDCARD: &str = "*";

/// Errors produced while compiling a route template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The template was the empty string.
    #[error("route template is empty")]
    Empty,

    /// The template did not start with `/`.
    #[error("route template `{template}` must start with '/'")]
    MissingLeadingSlash {
        /// The offending template.
        template: String,
    },

    /// A `{` or `}` was unbalanced or appeared inside a literal.
    #[error("malformed brace in segment `{segment}` of `{template}`")]
    MalformedBrace {
        /// The offending template.
        template: String,
        /// The segment containing the brace.
        segment: String,
    },

    /// A parameter or named wildcard had no name (`:` or `{}`).
    #[error("empty parameter name in `{template}`")]
    EmptyParamName {
        /// The offending template.
        template: String,
    },

    /// The same parameter name was used twice.
    #[error("duplicate parameter `{name}` in `{template}`")]
    DuplicateParam {
        /// The offending template.
        template: String,
        /// The repeated name.
        name: String,
    },

    /// A wildcard was followed by further segments.
    #[error("wildcard must be the last segment of `{template}`")]
    WildcardNotLast {
        /// The offending template.
        template: String,
    },

    /// An end anchor was followed by further segments.
    #[error("end anchor `{{$}}` must be the last segment of `{template}`")]
    EndAnchorNotLast {
        /// The offending template.
        template: String,
    },
}

/// One `/`-delimited piece of a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this text (e.g. `users`).
    Literal(Box<str>),
    /// Matches any single segment and captures it (e.g. `:id`, `{id}`).
    Param(ParamKey),
    /// Matches one or more trailing segments (e.g. `*`, `*path`, `{path...}`).
    Wildcard(ParamKey),
    /// Requires the request path to end with a slash at this point (`{$}`).
    EndAnchor,
}

impl Segment {
    /// Returns the capture key for parameter and wildcard segments.
    #[must_use]
    pub fn param_key(&self) -> Option<&ParamKey> {
        match self {
            Self::Param(key) | Self::Wildcard(key) => Some(key),
            Self::Literal(_) | Self::EndAnchor => None,
        }
    }

    const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard(_))
    }
}

/// How two patterns relate in terms of the requests they match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    /// Both patterns match exactly the same requests.
    Equivalent,
    /// The left pattern matches a strict superset of the right one.
    MoreGeneral,
    /// The left pattern matches a strict subset of the right one.
    MoreSpecific,
    /// Each pattern matches some requests the other does not, and they share some.
    Overlaps,
    /// No request matches both patterns.
    Disjoint,
}

impl Relationship {
    /// Returns the relationship seen from the other side.
    #[must_use]
    pub const fn inverse(self) -> Self {
        match self {
            Self::MoreGeneral => Self::MoreSpecific,
            Self::MoreSpecific => Self::MoreGeneral,
            other => other,
        }
    }

    /// Folds the relationship of one more component into an accumulated one.
    #[must_use]
    pub fn combine(self, next: Self) -> Self {
        match self {
            Self::Equivalent => next,
            Self::Disjoint => Self::Disjoint,
            Self::Overlaps => {
                if next == Self::Disjoint {
                    Self::Disjoint
                } else {
                    Self::Overlaps
                }
            }
            Self::MoreGeneral | Self::MoreSpecific => {
                if next == Self::Equivalent {
                    self
                } else if next == self.inverse() {
                    Self::Overlaps
                } else {
                    next
                }
            }
        }
    }
}

/// A compiled route template.
///
/// # Example
///
/// ```rust
/// use switchyard_router::{Pattern, Relationship};
/// use http::Method;
///
/// let by_id = Pattern::compile("/users/:id", Some(Method::GET)).unwrap();
/// let settings = Pattern::compile("/users/settings", Some(Method::GET)).unwrap();
///
/// assert_eq!(by_id.param_count(), 1);
/// assert_eq!(by_id.relationship(&settings), Relationship::MoreGeneral);
/// assert!(!by_id.conflicts_with(&settings));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    template: Box<str>,
    method: Option<Method>,
    segments: Vec<Segment>,
    param_count: usize,
}

impl Pattern {
    /// Compiles a template for the given method (`None` matches any method).
    pub fn compile(template: &str, method: Option<Method>) -> Result<Self, PatternError> {
        if template.is_empty() {
            return Err(PatternError::Empty);
        }
        let Some(rest) = template.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash {
                template: template.to_string(),
            });
        };

        let mut segments: Vec<Segment> = Vec::new();
        let mut pieces = rest.split('/').filter(|piece| !piece.is_empty()).peekable();
        while let Some(piece) = pieces.next() {
            let segment = parse_segment(template, piece)?;
            let last = pieces.peek().is_none();
            match &segment {
                Segment::Wildcard(_) if !last => {
                    return Err(PatternError::WildcardNotLast {
                        template: template.to_string(),
                    });
                }
                Segment::EndAnchor if !last => {
                    return Err(PatternError::EndAnchorNotLast {
                        template: template.to_string(),
                    });
                }
                Segment::Param(key) | Segment::Wildcard(key) => {
                    let duplicate = segments
                        .iter()
                        .filter_map(Segment::param_key)
                        .any(|existing| existing.name() == key.name());
                    if duplicate {
                        return Err(PatternError::DuplicateParam {
                            template: template.to_string(),
                            name: key.name().to_string(),
                        });
                    }
                }
                Segment::Literal(_) | Segment::EndAnchor => {}
            }
            segments.push(segment);
        }

        let param_count = segments.iter().filter_map(Segment::param_key).count();
        Ok(Self {
            template: template.into(),
            method,
            segments,
            param_count,
        })
    }

    /// Returns the original template text.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns the method this pattern is restricted to, if any.
    #[must_use]
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// Returns the compiled segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns true if the pattern captures anything.
    #[must_use]
    pub fn has_params(&self) -> bool {
        self.param_count > 0
    }

    /// Returns the number of captures (parameters plus wildcard).
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Returns the capture names in path order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments
            .iter()
            .filter_map(Segment::param_key)
            .map(ParamKey::name)
    }

    /// Returns the canonical request path for fully literal patterns.
    ///
    /// Used as the key of the literal fast path. A pattern consisting of only
    /// an end anchor has no key; the trie handles it.
    #[must_use]
    pub fn static_path(&self) -> Option<String> {
        if self.has_params() || self.segments == [Segment::EndAnchor] {
            return None;
        }
        let mut path = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    path.push('/');
                    path.push_str(text);
                }
                Segment::EndAnchor => path.push('/'),
                Segment::Param(_) | Segment::Wildcard(_) => return None,
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Some(path)
    }

    /// Computes how `self` relates to `other`, methods first, then paths.
    #[must_use]
    pub fn relationship(&self, other: &Self) -> Relationship {
        let methods = compare_methods(self.method.as_ref(), other.method.as_ref());
        if methods == Relationship::Disjoint {
            return Relationship::Disjoint;
        }
        methods.combine(self.compare_paths(other))
    }

    /// Returns true if registering both patterns would be ambiguous.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        matches!(
            self.relationship(other),
            Relationship::Equivalent | Relationship::Overlaps
        )
    }

    fn ends_in_wildcard(&self) -> bool {
        self.segments.last().is_some_and(Segment::is_wildcard)
    }

    fn compare_paths(&self, other: &Self) -> Relationship {
        let (left, right) = (&self.segments, &other.segments);
        if left.len() != right.len() && !self.ends_in_wildcard() && !other.ends_in_wildcard() {
            return Relationship::Disjoint;
        }

        let mut rel = Relationship::Equivalent;
        for (a, b) in left.iter().zip(right.iter()) {
            rel = rel.combine(compare_segments(a, b));
            if rel == Relationship::Disjoint {
                return rel;
            }
        }

        match left.len().cmp(&right.len()) {
            std::cmp::Ordering::Equal => rel,
            std::cmp::Ordering::Less if self.ends_in_wildcard() => {
                rel.combine(Relationship::MoreGeneral)
            }
            std::cmp::Ordering::Greater if other.ends_in_wildcard() => {
                rel.combine(Relationship::MoreSpecific)
            }
            _ => Relationship::Disjoint,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{method} {}", self.template),
            None => f.write_str(&self.template),
        }
    }
}

fn parse_segment(template: &str, piece: &str) -> Result<Segment, PatternError> {
    let malformed = || PatternError::MalformedBrace {
        template: template.to_string(),
        segment: piece.to_string(),
    };

    if piece == "{$}" {
        return Ok(Segment::EndAnchor);
    }

    if let Some(inner) = piece.strip_prefix('{') {
        let inner = inner.strip_suffix('}').ok_or_else(malformed)?;
        if inner.contains(['{', '}']) {
            return Err(malformed());
        }
        if let Some(name) = inner.strip_suffix("...") {
            return param_key(template, name).map(Segment::Wildcard);
        }
        return param_key(template, inner).map(Segment::Param);
    }

    if piece.contains(['{', '}']) {
        return Err(malformed());
    }

    if let Some(name) = piece.strip_prefix(':') {
        return param_key(template, name).map(Segment::Param);
    }

    if let Some(name) = piece.strip_prefix('*') {
        let name = if name.is_empty() { ANONYMOUS_WILDCARD } else { name };
        return Ok(Segment::Wildcard(ParamKey::new(name)));
    }

    Ok(Segment::Literal(piece.into()))
}

fn param_key(template: &str, name: &str) -> Result<ParamKey, PatternError> {
    if name.is_empty() {
        return Err(PatternError::EmptyParamName {
            template: template.to_string(),
        });
    }
    Ok(ParamKey::new(name))
}

fn compare_methods(left: Option<&Method>, right: Option<&Method>) -> Relationship {
    match (left, right) {
        (None, None) => Relationship::Equivalent,
        (None, Some(_)) => Relationship::MoreGeneral,
        (Some(_), None) => Relationship::MoreSpecific,
        (Some(a), Some(b)) if a == b => Relationship::Equivalent,
        (Some(a), Some(b)) if *a == Method::GET && *b == Method::HEAD => {
            Relationship::MoreGeneral
        }
        (Some(a), Some(b)) if *a == Method::HEAD && *b == Method::GET => {
            Relationship::MoreSpecific
        }
        _ => Relationship::Disjoint,
    }
}

fn compare_segments(left: &Segment, right: &Segment) -> Relationship {
    match (left, right) {
        (Segment::Wildcard(_), Segment::Wildcard(_))
        | (Segment::Param(_), Segment::Param(_))
        | (Segment::EndAnchor, Segment::EndAnchor) => Relationship::Equivalent,
        (Segment::Wildcard(_), _) => Relationship::MoreGeneral,
        (_, Segment::Wildcard(_)) => Relationship::MoreSpecific,
        // A single-segment parameter never matches the trailing slash.
        (Segment::Param(_), Segment::EndAnchor) | (Segment::EndAnchor, Segment::Param(_)) => {
            Relationship::Disjoint
        }
        (Segment::Param(_), Segment::Literal(_)) => Relationship::MoreGeneral,
        (Segment::Literal(_), Segment::Param(_)) => Relationship::MoreSpecific,
        (Segment::Literal(a), Segment::Literal(b)) if a == b => Relationship::Equivalent,
        _ => Relationship::Disjoint,
    }
}
