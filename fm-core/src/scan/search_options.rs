//! Search scope and filters.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::fs::file_system::FileCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchLocation {
    /// All mounted volumes.
    #[default]
    Everywhere,
    /// The volume holding the current directory.
    RootFolder,
    /// The current directory and its descendants.
    ThisFolder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchRecency {
    #[default]
    Anytime,
    Today,
    Yesterday,
    LastWeek,
    LastMonth,
    LastYear,
}

impl SearchRecency {
    pub fn modified_after(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            Self::Anytime => return None,
            Self::Today => 1,
            Self::Yesterday => 2,
            Self::LastWeek => 7,
            Self::LastMonth => 30,
            Self::LastYear => 365,
        };
        Some(now - ChronoDuration::days(days))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SearchOptions {
    pub location: SearchLocation,
    pub category: FileCategory,
    pub recency: SearchRecency,
}

impl SearchOptions {
    pub fn this_folder() -> Self {
        Self {
            location: SearchLocation::ThisFolder,
            ..Self::default()
        }
    }
}
