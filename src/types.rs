//! Basic type definitions for the chat server
//!
//! Provides the `ClientId` newtype used as the connection identity key and
//! the name uniquification rule shared by client and room names.

use uuid::Uuid;

/// Unique client identifier (newtype pattern)
///
/// Wraps a UUID v4. Identifies a connection independently of its display
/// name, so it is the key in every registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pick a name that `is_taken` rejects for none of the candidates
///
/// Tries `preferred` first, then `preferred#1`, `preferred#2`, ... and
/// returns the first candidate not taken.
pub fn uniquify(preferred: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(preferred) {
        return preferred.to_string();
    }

    let mut suffix: u64 = 1;
    loop {
        let candidate = format!("{}#{}", preferred, suffix);
        if !is_taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}
