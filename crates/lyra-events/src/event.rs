use lyra_core::MediaPeriodId;

use crate::{LoadEvent, SourceEvent};

/// Any event published on the bus.
#[derive(Clone, Debug)]
pub enum Event {
    /// Lifecycle of one load task.
    Load(LoadEvent),
    /// Period-level notifications.
    Source(SourceEvent),
}

impl Event {
    pub fn period_id(&self) -> MediaPeriodId {
        match self {
            Self::Load(e) => e.period_id(),
            Self::Source(e) => e.period_id(),
        }
    }
}

impl From<LoadEvent> for Event {
    fn from(e: LoadEvent) -> Self {
        Self::Load(e)
    }
}

impl From<SourceEvent> for Event {
    fn from(e: SourceEvent) -> Self {
        Self::Source(e)
    }
}
