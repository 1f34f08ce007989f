use std::time::Duration;

use lyra_core::MediaPeriodId;
use url::Url;

/// Period-level notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    /// Duration, seekability or liveness became known or changed.
    ///
    /// Always published before the period reports itself prepared.
    SourceInfoRefreshed {
        period_id: MediaPeriodId,
        duration_us: Option<i64>,
        is_seekable: bool,
        is_live: bool,
    },
    /// A location was excluded after a load error.
    LocationExcluded {
        period_id: MediaPeriodId,
        uri: Url,
        exclusion: Duration,
    },
    /// The period finished preparing.
    Prepared { period_id: MediaPeriodId },
}

impl SourceEvent {
    pub fn period_id(&self) -> MediaPeriodId {
        match self {
            Self::SourceInfoRefreshed { period_id, .. }
            | Self::LocationExcluded { period_id, .. }
            | Self::Prepared { period_id } => *period_id,
        }
    }
}
