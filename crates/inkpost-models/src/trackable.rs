//! Tagged references to the entity a background job works on.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of entity a job can track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrackableKind {
    /// A blog post
    Post,
    /// A generated video
    Video,
    /// An external content import
    Import,
}

impl TrackableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackableKind::Post => "post",
            TrackableKind::Video => "video",
            TrackableKind::Import => "import",
        }
    }
}

impl fmt::Display for TrackableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Entity-kind plus opaque id pair.
///
/// Replaces dynamic class-name strings with a closed kind enum; the id is
/// resolved through the owning service's own lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TrackableRef {
    pub kind: TrackableKind,
    pub id: String,
}

impl TrackableRef {
    pub fn new(kind: TrackableKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }

    pub fn post(id: impl Into<String>) -> Self {
        Self::new(TrackableKind::Post, id)
    }

    pub fn video(id: impl Into<String>) -> Self {
        Self::new(TrackableKind::Video, id)
    }
}

impl fmt::Display for TrackableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
