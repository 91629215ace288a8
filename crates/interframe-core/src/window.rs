//! Window handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a browsing context (window, iframe or popup).
///
/// Handles are compared by identity: two handles are equal only when they
/// refer to the same browsing context. The environment hands them out; this
/// crate never inspects the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(u64);

impl WindowId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}
