use lyra_core::{LoadEventInfo, MediaLoadData, MediaPeriodId};
use lyra_net::LoadError;

/// Lifecycle of one load task, keyed by the period that issued it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadEvent {
    Started {
        period_id: MediaPeriodId,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Completed {
        period_id: MediaPeriodId,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Canceled {
        period_id: MediaPeriodId,
        info: LoadEventInfo,
        media: MediaLoadData,
    },
    Error {
        period_id: MediaPeriodId,
        info: LoadEventInfo,
        media: MediaLoadData,
        error: LoadError,
        /// `true` when the load is not retried.
        was_canceled: bool,
    },
}

impl LoadEvent {
    pub fn period_id(&self) -> MediaPeriodId {
        match self {
            Self::Started { period_id, .. }
            | Self::Completed { period_id, .. }
            | Self::Canceled { period_id, .. }
            | Self::Error { period_id, .. } => *period_id,
        }
    }

    pub fn info(&self) -> &LoadEventInfo {
        match self {
            Self::Started { info, .. }
            | Self::Completed { info, .. }
            | Self::Canceled { info, .. }
            | Self::Error { info, .. } => info,
        }
    }
}

#[cfg(test)]
mod tests {
    use lyra_core::{DataSpec, DataType, PeriodUid};
    use rstest::rstest;
    use url::Url;

    use super::*;
    use crate::Event;

    fn info() -> LoadEventInfo {
        let uri = Url::parse("https://cdn.example.com/v.mp4").expect("valid url");
        LoadEventInfo::new(7, DataSpec::new(uri))
    }

    #[rstest]
    #[case::started(LoadEvent::Started {
        period_id: MediaPeriodId::new(PeriodUid(3)),
        info: info(),
        media: MediaLoadData::new(DataType::Media),
    })]
    #[case::error(LoadEvent::Error {
        period_id: MediaPeriodId::new(PeriodUid(3)),
        info: info(),
        media: MediaLoadData::new(DataType::Media),
        error: LoadError::Timeout,
        was_canceled: false,
    })]
    fn load_event_accessors(#[case] event: LoadEvent) {
        assert_eq!(event.period_id(), MediaPeriodId::new(PeriodUid(3)));
        assert_eq!(event.info().load_task_id, 7);
        let wrapped: Event = event.into();
        assert!(matches!(wrapped, Event::Load(_)));
    }
}
