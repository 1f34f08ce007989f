use crate::PeriodUid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeriodInfo {
    pub uid: PeriodUid,
    /// Duration in microseconds, `None` when unknown.
    pub duration_us: Option<i64>,
}

/// The part of the playback timeline the buffering core needs: the periods in
/// order and whether the content is live.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    periods: Vec<PeriodInfo>,
    is_live: bool,
}

impl Timeline {
    pub fn new(periods: Vec<PeriodInfo>, is_live: bool) -> Self {
        Self { periods, is_live }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn is_live(&self) -> bool {
        self.is_live
    }

    pub fn period_count(&self) -> usize {
        self.periods.len()
    }
}
