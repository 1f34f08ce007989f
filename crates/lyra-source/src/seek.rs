/// A sync point: a time and the byte position to read it from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SeekPoint {
    pub time_us: i64,
    pub position: u64,
}

impl SeekPoint {
    pub const START: Self = Self {
        time_us: 0,
        position: 0,
    };

    pub fn new(time_us: i64, position: u64) -> Self {
        Self { time_us, position }
    }
}

/// Duration, seekability and seek-point lookup reported by an extractor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeekMap {
    duration_us: Option<i64>,
    /// Sorted by time. Empty for unseekable media.
    points: Vec<SeekPoint>,
}

impl SeekMap {
    /// Media that can only be read from the start.
    pub fn unseekable(duration_us: Option<i64>) -> Self {
        Self {
            duration_us,
            points: Vec::new(),
        }
    }

    pub fn new(duration_us: Option<i64>, mut points: Vec<SeekPoint>) -> Self {
        points.sort_by_key(|p| p.time_us);
        Self {
            duration_us,
            points,
        }
    }

    pub fn is_seekable(&self) -> bool {
        !self.points.is_empty()
    }

    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    /// The sync points around `time_us`: the last one at or before it and the
    /// first one after it. Both are equal when `time_us` hits a point exactly
    /// or lies outside the known points.
    pub fn seek_points(&self, time_us: i64) -> (SeekPoint, SeekPoint) {
        let Some(first_point) = self.points.first() else {
            return (SeekPoint::START, SeekPoint::START);
        };
        let after = self.points.partition_point(|p| p.time_us <= time_us);
        if after == 0 {
            return (*first_point, *first_point);
        }
        let before = self.points[after - 1];
        if before.time_us == time_us {
            return (before, before);
        }
        match self.points.get(after) {
            Some(next) => (before, *next),
            None => (before, before),
        }
    }
}

/// How far a seek may move from the requested position to land on a sync point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeekParameters {
    pub tolerance_before_us: i64,
    pub tolerance_after_us: i64,
}

impl SeekParameters {
    pub const EXACT: Self = Self::new(0, 0);
    pub const CLOSEST_SYNC: Self = Self::new(i64::MAX, i64::MAX);
    pub const PREVIOUS_SYNC: Self = Self::new(i64::MAX, 0);
    pub const NEXT_SYNC: Self = Self::new(0, i64::MAX);

    pub const fn new(tolerance_before_us: i64, tolerance_after_us: i64) -> Self {
        Self {
            tolerance_before_us,
            tolerance_after_us,
        }
    }

    /// Pick the sync point to seek to, given the two around `position_us`.
    pub fn resolve_seek_position_us(
        &self,
        position_us: i64,
        first_sync_us: i64,
        second_sync_us: i64,
    ) -> i64 {
        if self.tolerance_before_us == 0 && self.tolerance_after_us == 0 {
            return position_us;
        }
        let min_us = position_us.saturating_sub(self.tolerance_before_us);
        let max_us = position_us.saturating_add(self.tolerance_after_us);
        let first_valid = (min_us..=max_us).contains(&first_sync_us);
        let second_valid = (min_us..=max_us).contains(&second_sync_us);
        match (first_valid, second_valid) {
            (true, true) => {
                if first_sync_us.abs_diff(position_us) <= second_sync_us.abs_diff(position_us) {
                    first_sync_us
                } else {
                    second_sync_us
                }
            }
            (true, false) => first_sync_us,
            (false, true) => second_sync_us,
            (false, false) => min_us,
        }
    }
}

impl Default for SeekParameters {
    fn default() -> Self {
        Self::EXACT
    }
}
