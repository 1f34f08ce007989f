use std::fmt;

/// Opaque identifier of a period within a timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeriodUid(pub u64);

impl fmt::Display for PeriodUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "period#{}", self.0)
    }
}

impl From<u64> for PeriodUid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifies one media period. Used as the correlation key for every event a
/// period emits, and to tell apart periods that share an underlying resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MediaPeriodId {
    pub period_uid: PeriodUid,
    /// Sequence number of the window the period belongs to, if known.
    pub window_sequence_number: Option<u64>,
    /// Ad group index, when the period plays an ad.
    pub ad_group_index: Option<u32>,
    /// Ad index within the ad group, when the period plays an ad.
    pub ad_index_in_ad_group: Option<u32>,
    /// Next ad group to play after content, when the period plays content.
    pub next_ad_group_index: Option<u32>,
}

impl MediaPeriodId {
    pub fn new(period_uid: impl Into<PeriodUid>) -> Self {
        Self {
            period_uid: period_uid.into(),
            window_sequence_number: None,
            ad_group_index: None,
            ad_index_in_ad_group: None,
            next_ad_group_index: None,
        }
    }

    #[must_use]
    pub fn with_window_sequence_number(mut self, number: u64) -> Self {
        self.window_sequence_number = Some(number);
        self
    }

    #[must_use]
    pub fn with_ad(mut self, ad_group_index: u32, ad_index_in_ad_group: u32) -> Self {
        self.ad_group_index = Some(ad_group_index);
        self.ad_index_in_ad_group = Some(ad_index_in_ad_group);
        self
    }

    pub fn is_ad(&self) -> bool {
        self.ad_group_index.is_some()
    }

    /// Same id, pointing at a different period.
    #[must_use]
    pub fn copy_with_period_uid(&self, period_uid: PeriodUid) -> Self {
        Self {
            period_uid,
            ..*self
        }
    }
}

impl fmt::Display for MediaPeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.period_uid)?;
        if let Some(seq) = self.window_sequence_number {
            write!(f, "/w{seq}")?;
        }
        if let (Some(group), Some(index)) = (self.ad_group_index, self.ad_index_in_ad_group) {
            write!(f, "/ad{group}.{index}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_period_ids_are_distinct_from_content() {
        let content = MediaPeriodId::new(7).with_window_sequence_number(1);
        let ad = content.with_ad(0, 1);
        assert!(!content.is_ad());
        assert!(ad.is_ad());
        assert_ne!(content, ad);
        assert_eq!(ad.to_string(), "period#7/w1/ad0.1");
    }

    #[test]
    fn copy_with_period_uid_keeps_other_fields() {
        let id = MediaPeriodId::new(1).with_window_sequence_number(4);
        let moved = id.copy_with_period_uid(PeriodUid(2));
        assert_eq!(moved.period_uid, PeriodUid(2));
        assert_eq!(moved.window_sequence_number, Some(4));
    }
}
