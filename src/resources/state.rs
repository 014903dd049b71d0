use std::fmt;

/// Load state of a [`ResourceHandle`](crate::resources::ResourceHandle)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadingState {
    /// Synthetic resource, usable without any fetch
    None,
    /// Keyed but not fetched yet
    Pending,
    /// Fetch in flight (or waiting for a scheduled retry)
    Requesting,
    /// Bytes arrived, decode not run yet
    Completed,
    /// Pixels decoded and usable
    Loaded,
    /// Fetched as a prefetch only; platform image returned to the pool
    Purged,
    /// Fetch or decode failed
    Error,
}

impl LoadingState {
    /// Whether moving from `self` to `next` is an edge of the load state machine.
    ///
    /// Staying in the same state is not a transition and is rejected here.
    pub fn can_advance_to(self, next: LoadingState) -> bool {
        use LoadingState::*;
        matches!(
            (self, next),
            (None, Pending)
                | (Pending, Requesting)
                | (Purged, Requesting)
                | (Error, Requesting)
                | (Requesting, Completed)
                | (Requesting, Error)
                | (Completed, Loaded)
                | (Completed, Purged)
                | (Completed, Error)
        )
    }

    pub fn is_ready(self) -> bool {
        matches!(self, LoadingState::Loaded | LoadingState::None)
    }

    /// Not waiting on the network any more, successfully or not
    pub fn is_request_ready(self) -> bool {
        !matches!(self, LoadingState::Pending | LoadingState::Requesting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoadingState::None => "none",
            LoadingState::Pending => "pending",
            LoadingState::Requesting => "requesting",
            LoadingState::Completed => "completed",
            LoadingState::Loaded => "loaded",
            LoadingState::Purged => "purged",
            LoadingState::Error => "error",
        }
    }
}

impl fmt::Display for LoadingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refetch_edges() {
        for from in [LoadingState::Pending, LoadingState::Purged, LoadingState::Error] {
            assert!(from.can_advance_to(LoadingState::Requesting));
        }
        assert!(!LoadingState::Loaded.can_advance_to(LoadingState::Requesting));
        assert!(!LoadingState::Completed.can_advance_to(LoadingState::Requesting));
    }

    #[test]
    fn test_no_skips() {
        assert!(!LoadingState::Pending.can_advance_to(LoadingState::Loaded));
        assert!(!LoadingState::Requesting.can_advance_to(LoadingState::Loaded));
        assert!(!LoadingState::Requesting.can_advance_to(LoadingState::Requesting));
        assert!(!LoadingState::None.can_advance_to(LoadingState::Requesting));
    }

    #[test]
    fn test_queries() {
        assert!(LoadingState::None.is_ready());
        assert!(LoadingState::Loaded.is_ready());
        assert!(!LoadingState::Purged.is_ready());
        assert!(LoadingState::Error.is_request_ready());
        assert!(!LoadingState::Requesting.is_request_ready());
        assert_eq!(LoadingState::Purged.to_string(), "purged");
    }
}
