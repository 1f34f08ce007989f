use std::{collections::HashMap, time::Duration};

use lyra_core::{DataType, LoadEventInfo, MediaLoadData};
use serde::{Deserialize, Serialize};
use tracing::debug;
#[cfg(test)]
use unimock::unimock;

use crate::{FallbackOptions, FallbackSelection, FallbackType, LoadError};

/// Everything the policy knows about one failed load attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadErrorInfo {
    pub load_event_info: LoadEventInfo,
    pub media_load_data: MediaLoadData,
    pub error: LoadError,
    /// Failures so far in this load chain, including this one. Starts at 1.
    pub error_count: u32,
}

impl LoadErrorInfo {
    pub fn new(
        load_event_info: LoadEventInfo,
        media_load_data: MediaLoadData,
        error: LoadError,
        error_count: u32,
    ) -> Self {
        Self {
            load_event_info,
            media_load_data,
            error,
            error_count,
        }
    }
}

/// Decides how a failed load proceeds.
///
/// Implementations are pure with respect to their inputs and never fail;
/// `None` answers are meaningful and differ from a zero delay.
#[cfg_attr(test, unimock(api = LoadErrorHandlingPolicyMock))]
pub trait LoadErrorHandlingPolicy: Send + Sync {
    /// Exclusion to apply for this error, or `None` to retry or propagate.
    fn fallback_selection_for(
        &self,
        options: &FallbackOptions,
        info: &LoadErrorInfo,
    ) -> Option<FallbackSelection>;

    /// Delay before retrying, or `None` when retrying cannot help.
    fn retry_delay_for(&self, info: &LoadErrorInfo) -> Option<Duration>;

    /// Failures tolerated for `data_type` before the loader gives up.
    fn minimum_loadable_retry_count(&self, data_type: DataType) -> u32;

    /// Called once a load task ends, successfully or not.
    fn on_load_task_concluded(&self, load_task_id: u64) {
        let _ = load_task_id;
    }
}

/// Tunables of [`DefaultLoadErrorHandlingPolicy`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOptions {
    /// Retry budget for data types without an override.
    pub min_loadable_retry_count: u32,
    /// Retry budget for progressive live streams.
    pub progressive_live_retry_count: u32,
    /// Per-data-type budgets that win over both values above.
    pub retry_count_overrides: HashMap<DataType, u32>,
    /// Delay growth per repeated failure.
    pub retry_step_ms: u64,
    /// Ceiling for the retry delay.
    pub max_retry_delay_ms: u64,
    pub track_exclusion_ms: u64,
    pub location_exclusion_ms: u64,
    /// HTTP status codes that make a load eligible for exclusion.
    pub fallback_status_codes: Vec<u16>,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            min_loadable_retry_count: 3,
            progressive_live_retry_count: 6,
            retry_count_overrides: HashMap::new(),
            retry_step_ms: 1_000,
            max_retry_delay_ms: 5_000,
            track_exclusion_ms: 60_000,
            location_exclusion_ms: 300_000,
            fallback_status_codes: vec![403, 404, 410, 416, 500, 503],
        }
    }
}

/// Standard policy: linear capped backoff, exclusion on a fixed set of HTTP
/// status codes, location before track.
#[derive(Clone, Debug, Default)]
pub struct DefaultLoadErrorHandlingPolicy {
    options: PolicyOptions,
}

impl DefaultLoadErrorHandlingPolicy {
    pub fn new(options: PolicyOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PolicyOptions {
        &self.options
    }

    fn is_eligible_for_fallback(&self, error: &LoadError) -> bool {
        error
            .status_code()
            .is_some_and(|status| self.options.fallback_status_codes.contains(&status))
    }
}

impl LoadErrorHandlingPolicy for DefaultLoadErrorHandlingPolicy {
    fn fallback_selection_for(
        &self,
        options: &FallbackOptions,
        info: &LoadErrorInfo,
    ) -> Option<FallbackSelection> {
        if !self.is_eligible_for_fallback(&info.error) {
            return None;
        }
        if options.is_fallback_available(FallbackType::Location) {
            return Some(FallbackSelection::new(
                FallbackType::Location,
                Duration::from_millis(self.options.location_exclusion_ms),
            ));
        }
        if options.is_fallback_available(FallbackType::Track) {
            return Some(FallbackSelection::new(
                FallbackType::Track,
                Duration::from_millis(self.options.track_exclusion_ms),
            ));
        }
        None
    }

    fn retry_delay_for(&self, info: &LoadErrorInfo) -> Option<Duration> {
        if !info.error.is_retryable() {
            return None;
        }
        let steps = u64::from(info.error_count.saturating_sub(1));
        let delay_ms = steps
            .saturating_mul(self.options.retry_step_ms)
            .min(self.options.max_retry_delay_ms);
        Some(Duration::from_millis(delay_ms))
    }

    fn minimum_loadable_retry_count(&self, data_type: DataType) -> u32 {
        if let Some(count) = self.options.retry_count_overrides.get(&data_type) {
            return *count;
        }
        match data_type {
            DataType::MediaProgressiveLive => self.options.progressive_live_retry_count,
            _ => self.options.min_loadable_retry_count,
        }
    }
}

/// How a failed load proceeds once the policy has been consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadErrorDecision {
    /// Load again after the delay.
    Retry(Duration),
    /// Exclude an alternative and continue with another.
    Fallback(FallbackSelection),
    /// Nothing left to try.
    Fatal,
}

impl LoadErrorDecision {
    /// Retry while the data type's budget allows and the policy gives a delay;
    /// otherwise ask for an exclusion; otherwise fail.
    pub fn resolve(
        policy: &dyn LoadErrorHandlingPolicy,
        options: &FallbackOptions,
        info: &LoadErrorInfo,
    ) -> Self {
        let budget = policy.minimum_loadable_retry_count(info.media_load_data.data_type);
        let delay = (info.error_count <= budget)
            .then(|| policy.retry_delay_for(info))
            .flatten();
        if let Some(delay) = delay {
            debug!(
                error_count = info.error_count,
                budget,
                delay_ms = delay.as_millis() as u64,
                error = %info.error,
                "load error: retry"
            );
            return Self::Retry(delay);
        }
        if let Some(selection) = policy.fallback_selection_for(options, info) {
            debug!(
                fallback = ?selection.fallback_type,
                exclusion_ms = selection.exclusion_duration.as_millis() as u64,
                error = %info.error,
                "load error: fallback"
            );
            return Self::Fallback(selection);
        }
        debug!(error_count = info.error_count, error = %info.error, "load error: fatal");
        Self::Fatal
    }
}

#[cfg(test)]
mod tests {
    use lyra_core::DataSpec;
    use rstest::*;
    use unimock::{MockFn, Unimock, matching};
    use url::Url;

    use super::*;

    fn info(error: LoadError, error_count: u32) -> LoadErrorInfo {
        let uri = Url::parse("https://cdn.example.com/a.mp4").expect("valid url");
        LoadErrorInfo::new(
            LoadEventInfo::new(LoadEventInfo::next_task_id(), DataSpec::new(uri)),
            MediaLoadData::new(DataType::Media),
            error,
            error_count,
        )
    }

    fn http(status: u16) -> LoadError {
        LoadError::invalid_response_code(status, "https://cdn.example.com/a.mp4")
    }

    #[fixture]
    fn policy() -> DefaultLoadErrorHandlingPolicy {
        DefaultLoadErrorHandlingPolicy::default()
    }

    #[rstest]
    fn test_fallback_track_when_single_location(policy: DefaultLoadErrorHandlingPolicy) {
        let selection = policy
            .fallback_selection_for(&FallbackOptions::new(1, 0, 10, 0), &info(http(403), 1));
        assert_eq!(
            selection,
            Some(FallbackSelection::new(
                FallbackType::Track,
                Duration::from_secs(60)
            ))
        );
    }

    #[rstest]
    fn test_fallback_location_preferred(policy: DefaultLoadErrorHandlingPolicy) {
        let selection = policy
            .fallback_selection_for(&FallbackOptions::new(2, 0, 4, 1), &info(http(403), 1));
        assert_eq!(
            selection,
            Some(FallbackSelection::new(
                FallbackType::Location,
                Duration::from_secs(300)
            ))
        );
    }

    #[rstest]
    #[case::teapot(http(418))]
    #[case::io(LoadError::io("connection reset"))]
    #[case::malformed(LoadError::malformed_container("truncated moov"))]
    fn test_no_fallback_for_ineligible_errors(
        policy: DefaultLoadErrorHandlingPolicy,
        #[case] error: LoadError,
    ) {
        let selection =
            policy.fallback_selection_for(&FallbackOptions::new(4, 0, 10, 0), &info(error, 1));
        assert_eq!(selection, None);
    }

    #[rstest]
    #[case(404)]
    #[case(410)]
    #[case(416)]
    #[case(500)]
    #[case(503)]
    fn test_fallback_allow_list(policy: DefaultLoadErrorHandlingPolicy, #[case] status: u16) {
        let selection =
            policy.fallback_selection_for(&FallbackOptions::new(1, 0, 2, 0), &info(http(status), 1));
        assert_eq!(selection.map(|s| s.fallback_type), Some(FallbackType::Track));
    }

    #[rstest]
    fn test_no_fallback_without_alternatives(policy: DefaultLoadErrorHandlingPolicy) {
        let selection =
            policy.fallback_selection_for(&FallbackOptions::new(2, 1, 3, 2), &info(http(404), 1));
        assert_eq!(selection, None);
    }

    #[rstest]
    #[case(1, 0)]
    #[case(3, 2_000)]
    #[case(5, 4_000)]
    #[case(9, 5_000)]
    fn test_retry_delay_linear_capped(
        policy: DefaultLoadErrorHandlingPolicy,
        #[case] error_count: u32,
        #[case] expected_ms: u64,
    ) {
        assert_eq!(
            policy.retry_delay_for(&info(LoadError::io("reset"), error_count)),
            Some(Duration::from_millis(expected_ms))
        );
    }

    #[rstest]
    fn test_retry_delay_non_decreasing(policy: DefaultLoadErrorHandlingPolicy) {
        let delays: Vec<_> = (1..20)
            .map(|count| policy.retry_delay_for(&info(http(503), count)))
            .collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(delays.last().copied().flatten(), Some(Duration::from_secs(5)));
    }

    #[rstest]
    #[case::malformed(LoadError::malformed_container("bad atom"))]
    #[case::file_not_found(LoadError::FileNotFound)]
    #[case::cleartext(LoadError::CleartextNotPermitted)]
    #[case::out_of_range(LoadError::PositionOutOfRange)]
    fn test_retry_delay_unset(policy: DefaultLoadErrorHandlingPolicy, #[case] error: LoadError) {
        for count in [1, 2, 10] {
            assert_eq!(policy.retry_delay_for(&info(error.clone(), count)), None);
        }
    }

    #[rstest]
    #[case(DataType::Media, 3)]
    #[case(DataType::Manifest, 3)]
    #[case(DataType::MediaProgressiveLive, 6)]
    fn test_minimum_retry_count(
        policy: DefaultLoadErrorHandlingPolicy,
        #[case] data_type: DataType,
        #[case] expected: u32,
    ) {
        assert_eq!(policy.minimum_loadable_retry_count(data_type), expected);
    }

    #[rstest]
    fn test_retry_count_override() {
        let mut options = PolicyOptions::default();
        options.retry_count_overrides.insert(DataType::Manifest, 8);
        let policy = DefaultLoadErrorHandlingPolicy::new(options);
        assert_eq!(policy.minimum_loadable_retry_count(DataType::Manifest), 8);
        assert_eq!(policy.minimum_loadable_retry_count(DataType::Media), 3);
    }

    #[rstest]
    fn test_options_from_json() {
        let options: PolicyOptions =
            serde_json::from_str(r#"{"track_exclusion_ms": 1000, "retry_count_overrides": {"manifest": 9}}"#)
                .expect("valid options");
        assert_eq!(options.track_exclusion_ms, 1_000);
        assert_eq!(options.retry_count_overrides.get(&DataType::Manifest), Some(&9));
        assert_eq!(options.location_exclusion_ms, 300_000);
    }

    #[rstest]
    fn test_resolve_retries_within_budget() {
        let mock = Unimock::new((
            LoadErrorHandlingPolicyMock::minimum_loadable_retry_count
                .some_call(matching!(DataType::Media))
                .returns(3_u32),
            LoadErrorHandlingPolicyMock::retry_delay_for
                .some_call(matching!(_))
                .returns(Some(Duration::from_millis(250))),
        ));
        let decision =
            LoadErrorDecision::resolve(&mock, &FallbackOptions::new(1, 0, 1, 0), &info(http(500), 2));
        assert_eq!(decision, LoadErrorDecision::Retry(Duration::from_millis(250)));
    }

    #[rstest]
    fn test_resolve_falls_back_when_budget_exhausted() {
        let selection = FallbackSelection::new(FallbackType::Location, Duration::from_secs(1));
        let mock = Unimock::new((
            LoadErrorHandlingPolicyMock::minimum_loadable_retry_count
                .some_call(matching!(_))
                .returns(3_u32),
            LoadErrorHandlingPolicyMock::fallback_selection_for
                .some_call(matching!(_, _))
                .returns(Some(selection)),
        ));
        let decision =
            LoadErrorDecision::resolve(&mock, &FallbackOptions::new(2, 0, 1, 0), &info(http(500), 4));
        assert_eq!(decision, LoadErrorDecision::Fallback(selection));
    }

    #[rstest]
    fn test_resolve_fatal_without_delay_or_fallback() {
        let mock = Unimock::new((
            LoadErrorHandlingPolicyMock::minimum_loadable_retry_count
                .some_call(matching!(_))
                .returns(3_u32),
            LoadErrorHandlingPolicyMock::retry_delay_for
                .some_call(matching!(_))
                .returns(None),
            LoadErrorHandlingPolicyMock::fallback_selection_for
                .some_call(matching!(_, _))
                .returns(None),
        ));
        let decision = LoadErrorDecision::resolve(
            &mock,
            &FallbackOptions::new(1, 0, 1, 0),
            &info(LoadError::malformed_container("x"), 1),
        );
        assert_eq!(decision, LoadErrorDecision::Fatal);
    }

    #[rstest]
    fn test_resolve_default_policy_end_to_end(policy: DefaultLoadErrorHandlingPolicy) {
        let options = FallbackOptions::new(2, 0, 1, 0);
        assert_eq!(
            LoadErrorDecision::resolve(&policy, &options, &info(http(404), 1)),
            LoadErrorDecision::Retry(Duration::ZERO)
        );
        assert!(matches!(
            LoadErrorDecision::resolve(&policy, &options, &info(http(404), 4)),
            LoadErrorDecision::Fallback(FallbackSelection {
                fallback_type: FallbackType::Location,
                ..
            })
        ));
        assert_eq!(
            LoadErrorDecision::resolve(&policy, &options, &info(http(418), 4)),
            LoadErrorDecision::Fatal
        );
    }
}
