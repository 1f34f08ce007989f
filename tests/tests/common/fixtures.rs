use std::sync::Arc;

use lyra::{Session, SessionConfig};
use lyra_control::LoadControlConfig;
use lyra_net::PolicyOptions;
use lyra_source::mock::FakeMedia;
use rstest::*;
use url::Url;

pub const SAMPLE_SIZE: usize = 100;
pub const INTERVAL_US: i64 = 40_000;
pub const SAMPLE_COUNT: usize = 50;
pub const DURATION_US: i64 = 2_000_000;

#[fixture]
pub fn tracing_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::default()
                .add_directive("warn".parse().expect("valid directive"))
                .add_directive("lyra_control=debug".parse().expect("valid directive"))
                .add_directive("lyra_source=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

/// Session tuned for fast tests: millisecond retry steps and thresholds that
/// fit inside two seconds of media.
#[fixture]
pub fn test_config() -> SessionConfig {
    SessionConfig::default()
        .with_load_error_policy(PolicyOptions {
            retry_step_ms: 5,
            ..PolicyOptions::default()
        })
        .with_load_control(LoadControlConfig {
            min_buffer_ms: 600,
            max_buffer_ms: 1_000,
            buffer_for_playback_ms: 500,
            buffer_for_playback_after_rebuffer_ms: 500,
            ..LoadControlConfig::default()
        })
}

pub fn session(config: SessionConfig) -> Session {
    Session::new(config).expect("valid session config")
}

pub fn uri(path: &str) -> Url {
    Url::parse(&format!("https://cdn.example.com/{path}")).expect("valid url")
}

/// Audio track 1 and video track 2, two seconds of samples.
pub fn av_media() -> Arc<FakeMedia> {
    FakeMedia::builder()
        .audio_track(1)
        .video_track(2)
        .samples(SAMPLE_COUNT, INTERVAL_US)
        .sample_size(SAMPLE_SIZE)
        .duration_us(DURATION_US)
        .build()
}

pub fn audio_media() -> Arc<FakeMedia> {
    FakeMedia::builder()
        .audio_track(1)
        .samples(SAMPLE_COUNT, INTERVAL_US)
        .sample_size(SAMPLE_SIZE)
        .duration_us(DURATION_US)
        .build()
}

pub fn video_media() -> Arc<FakeMedia> {
    FakeMedia::builder()
        .video_track(2)
        .samples(SAMPLE_COUNT, INTERVAL_US)
        .sample_size(SAMPLE_SIZE)
        .duration_us(DURATION_US)
        .build()
}

pub fn expected_times(offset_us: i64) -> Vec<i64> {
    (0..SAMPLE_COUNT as i64)
        .map(|n| n * INTERVAL_US + offset_us)
        .collect()
}

pub fn no_source_info() -> Arc<dyn lyra_source::SourceInfoListener> {
    Arc::new(|_: Option<i64>, _: bool, _: bool| {})
}
