use std::borrow::Cow;
use std::fmt;

use anyhow::anyhow;
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

/// Anchor text a modification is positioned against.
#[derive(Debug, Clone)]
pub enum Reference {
    Literal(String),
    Pattern(Regex),
}

impl Reference {
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Pattern)
    }

    /// Byte offset of the first match.
    pub fn find(&self, text: &str) -> Option<usize> {
        match self {
            Self::Literal(literal) => text.find(literal.as_str()),
            Self::Pattern(regex) => regex.find(text).map(|found| found.start()),
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    pub fn replace_all<'t>(&self, text: &'t str, payload: &str) -> Cow<'t, str> {
        match self {
            Self::Literal(literal) => {
                if text.contains(literal.as_str()) {
                    Cow::Owned(text.replace(literal.as_str(), payload))
                } else {
                    Cow::Borrowed(text)
                }
            }
            Self::Pattern(regex) => regex.replace_all(text, NoExpand(payload)),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Literal(literal) => literal.is_empty(),
            Self::Pattern(regex) => regex.as_str().is_empty(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => write!(f, "`{literal}`"),
            Self::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(left), Self::Literal(right)) => left == right,
            (Self::Pattern(left), Self::Pattern(right)) => left.as_str() == right.as_str(),
            _ => false,
        }
    }
}

impl Eq for Reference {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    #[default]
    AfterMatchingLine,
    AtMatchOffset,
    ReplaceAllMatches,
}

impl InsertMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AfterMatchingLine => "after_matching_line",
            Self::AtMatchOffset => "at_match_offset",
            Self::ReplaceAllMatches => "replace_all_matches",
        }
    }
}

/// One declarative edit against a single text file.
///
/// `line_offset` only shifts [`InsertMode::AfterMatchingLine`] insertions;
/// the other modes ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawModification", into = "RawModification")]
pub struct Modification {
    pub reference: Reference,
    pub payload: String,
    pub insert_mode: InsertMode,
    pub line_offset: i64,
}

impl Modification {
    pub fn after_line(reference: Reference, payload: impl Into<String>) -> Self {
        Self {
            reference,
            payload: payload.into(),
            insert_mode: InsertMode::AfterMatchingLine,
            line_offset: 0,
        }
    }

    pub fn at_offset(reference: Reference, payload: impl Into<String>) -> Self {
        Self {
            reference,
            payload: payload.into(),
            insert_mode: InsertMode::AtMatchOffset,
            line_offset: 0,
        }
    }

    pub fn replace_all(reference: Reference, payload: impl Into<String>) -> Self {
        Self {
            reference,
            payload: payload.into(),
            insert_mode: InsertMode::ReplaceAllMatches,
            line_offset: 0,
        }
    }

    pub fn with_line_offset(mut self, line_offset: i64) -> Self {
        self.line_offset = line_offset;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawModification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    payload: String,
    #[serde(default)]
    mode: InsertMode,
    #[serde(default, skip_serializing_if = "is_zero")]
    line_offset: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl TryFrom<RawModification> for Modification {
    type Error = anyhow::Error;

    fn try_from(raw: RawModification) -> Result<Self, Self::Error> {
        let reference = match (raw.reference, raw.pattern) {
            (Some(_), Some(_)) => {
                return Err(anyhow!(
                    "modification must set either 'reference' or 'pattern', not both"
                ));
            }
            (Some(literal), None) => Reference::Literal(literal),
            (None, Some(pattern)) => Reference::pattern(&pattern)
                .map_err(|err| anyhow!("invalid reference pattern '{pattern}': {err}"))?,
            (None, None) => {
                return Err(anyhow!(
                    "modification requires a 'reference' or 'pattern' anchor"
                ));
            }
        };
        if reference.is_empty() {
            return Err(anyhow!("modification anchor must not be empty"));
        }

        Ok(Self {
            reference,
            payload: raw.payload,
            insert_mode: raw.mode,
            line_offset: raw.line_offset,
        })
    }
}

impl From<Modification> for RawModification {
    fn from(value: Modification) -> Self {
        let (reference, pattern) = match value.reference {
            Reference::Literal(literal) => (Some(literal), None),
            Reference::Pattern(regex) => (None, Some(regex.as_str().to_string())),
        };
        Self {
            reference,
            pattern,
            payload: value.payload,
            mode: value.insert_mode,
            line_offset: value.line_offset,
        }
    }
}
