//! Content readiness states for a movie's digital print (DCP).

use serde::{Deserialize, Serialize};

/// Readiness of a movie's DCP, scoped either to one projection hall or to
/// the movie as a whole. The remote status ledger stores at most one global
/// value plus zero-or-more per-hall overrides; resolution prefers the
/// hall-specific value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    /// Loaded on the hall's projection server, keys in place.
    ReadyHall,
    /// Present on the central storage, not yet pushed to a hall.
    OnStorage,
    /// Transfer to the hall server in progress.
    DownloadHall,
    /// Transfer to central storage in progress.
    DownloadStorage,
    /// Still with the distributor.
    Distributor,
    /// DCP present but no KDM delivered.
    NoKeys,
    NoStatus,
    Missing,
}

impl ContentStatus {
    /// Statuses that apply to a single hall rather than the whole movie.
    pub fn is_hall_specific(self) -> bool {
        matches!(self, Self::ReadyHall | Self::DownloadHall)
    }

    pub fn is_global(self) -> bool {
        !self.is_hall_specific()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadyHall => "ready_hall",
            Self::OnStorage => "on_storage",
            Self::DownloadHall => "download_hall",
            Self::DownloadStorage => "download_storage",
            Self::Distributor => "distributor",
            Self::NoKeys => "no_keys",
            Self::NoStatus => "no_status",
            Self::Missing => "missing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "ready_hall" => Some(Self::ReadyHall),
            "on_storage" => Some(Self::OnStorage),
            "download_hall" => Some(Self::DownloadHall),
            "download_storage" => Some(Self::DownloadStorage),
            "distributor" => Some(Self::Distributor),
            "no_keys" => Some(Self::NoKeys),
            "no_status" => Some(Self::NoStatus),
            "missing" => Some(Self::Missing),
            _ => None,
        }
    }
}

impl Default for ContentStatus {
    fn default() -> Self {
        Self::NoStatus
    }
}
