use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to exclude after a failed load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackType {
    /// Exclude the current location (base URL / mirror).
    Location,
    /// Exclude the current track variant.
    Track,
}

/// How many alternatives remain for a failing load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FallbackOptions {
    pub number_of_locations: usize,
    pub number_of_excluded_locations: usize,
    pub number_of_tracks: usize,
    pub number_of_excluded_tracks: usize,
}

impl FallbackOptions {
    pub fn new(
        number_of_locations: usize,
        number_of_excluded_locations: usize,
        number_of_tracks: usize,
        number_of_excluded_tracks: usize,
    ) -> Self {
        Self {
            number_of_locations,
            number_of_excluded_locations,
            number_of_tracks,
            number_of_excluded_tracks,
        }
    }

    /// At least two non-excluded alternatives of `fallback_type` remain, so one
    /// can be excluded without leaving nothing to load.
    pub fn is_fallback_available(&self, fallback_type: FallbackType) -> bool {
        match fallback_type {
            FallbackType::Location => {
                self.number_of_locations
                    .saturating_sub(self.number_of_excluded_locations)
                    > 1
            }
            FallbackType::Track => {
                self.number_of_tracks
                    .saturating_sub(self.number_of_excluded_tracks)
                    > 1
            }
        }
    }
}

/// The policy's verdict: exclude one alternative for a while.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FallbackSelection {
    pub fallback_type: FallbackType,
    pub exclusion_duration: Duration,
}

impl FallbackSelection {
    pub fn new(fallback_type: FallbackType, exclusion_duration: Duration) -> Self {
        Self {
            fallback_type,
            exclusion_duration,
        }
    }
}
