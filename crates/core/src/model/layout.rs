use serde::{Deserialize, Serialize};

/// Words per set for learning sessions.
pub const SET_SIZE: u32 = 20;

/// Position inside a session: which set, and how far into it.
///
/// Orders by set first, then index, so `max` picks the more advanced position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPosition {
    pub current_set: u32,
    pub current_index: u32,
}

impl SessionPosition {
    #[must_use]
    pub fn new(current_set: u32, current_index: u32) -> Self {
        Self {
            current_set,
            current_index,
        }
    }

    /// Merge a server position with a client-cached one: the more advanced wins.
    ///
    /// Either side may be missing (no session yet, empty cache).
    #[must_use]
    pub fn reconcile(server: Option<Self>, cached: Option<Self>) -> Option<Self> {
        match (server, cached) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Result of stepping one word forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub next: SessionPosition,
    pub crossed_set_boundary: bool,
}

/// Pagination of a fixed word count into fixed-size sets.
///
/// The last set may be short; nothing is padded and nothing wraps around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLayout {
    total_words: u32,
    set_size: u32,
}

impl SetLayout {
    /// A `set_size` of zero is bumped to one so the layout stays well defined.
    #[must_use]
    pub fn new(total_words: u32, set_size: u32) -> Self {
        Self {
            total_words,
            set_size: set_size.max(1),
        }
    }

    #[must_use]
    pub fn standard(total_words: u32) -> Self {
        Self::new(total_words, SET_SIZE)
    }

    #[must_use]
    pub fn total_words(&self) -> u32 {
        self.total_words
    }

    #[must_use]
    pub fn set_size(&self) -> u32 {
        self.set_size
    }

    /// `ceil(total_words / set_size)`.
    #[must_use]
    pub fn total_sets(&self) -> u32 {
        self.total_words.div_ceil(self.set_size)
    }

    /// Offset of the first word of `set` in the linear list.
    #[must_use]
    pub fn offset(&self, set: u32) -> u32 {
        set.saturating_mul(self.set_size).min(self.total_words)
    }

    /// Number of words in `set`; zero past the end.
    #[must_use]
    pub fn set_len(&self, set: u32) -> u32 {
        let start = self.offset(set);
        self.total_words.saturating_sub(start).min(self.set_size)
    }

    /// Linear offset of a position.
    #[must_use]
    pub fn linear(&self, position: SessionPosition) -> u32 {
        self.offset(position.current_set)
            .saturating_add(position.current_index.min(self.set_len(position.current_set)))
    }

    /// Position of the word at linear offset `linear`.
    ///
    /// Offsets at or past the end map to the first position after the last set.
    #[must_use]
    pub fn locate(&self, linear: u32) -> SessionPosition {
        if linear >= self.total_words {
            return SessionPosition::new(self.total_sets(), 0);
        }
        SessionPosition::new(linear / self.set_size, linear % self.set_size)
    }

    /// Step one word forward from `position`.
    ///
    /// Moving past the last word of a set lands on index 0 of the next set and
    /// reports the crossing; past the final set the next set equals
    /// `total_sets`, which callers treat as "finished".
    #[must_use]
    pub fn advance(&self, position: SessionPosition) -> Advance {
        let len = self.set_len(position.current_set);
        let next_index = position.current_index.saturating_add(1);
        if next_index < len {
            Advance {
                next: SessionPosition::new(position.current_set, next_index),
                crossed_set_boundary: false,
            }
        } else {
            Advance {
                next: SessionPosition::new(position.current_set.saturating_add(1), 0),
                crossed_set_boundary: true,
            }
        }
    }
}
