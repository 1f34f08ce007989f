//! Separate audio and video sources merged into one period.

use std::time::Duration;

use lyra::SessionConfig;
use lyra_core::{MediaPeriodId, PeriodUid, TIME_END_OF_SOURCE, TrackType};
use lyra_source::{
    MediaPeriod, SequenceableLoader,
    mock::{load_to_end, prepare_blocking},
};
use rstest::rstest;

use crate::common::*;

const AUDIO_OFFSET_US: i64 = -3_000;

fn merged_id() -> MediaPeriodId {
    MediaPeriodId::new(PeriodUid(10))
}

fn merged(session: &lyra::Session) -> lyra_source::MergingMediaPeriod {
    let video = session.progressive_period(
        MediaPeriodId::new(PeriodUid(11)),
        uri("video.mp4"),
        video_media().factory(),
        no_source_info(),
    );
    let audio = session.progressive_period(
        MediaPeriodId::new(PeriodUid(12)),
        uri("audio.mp4"),
        audio_media().factory(),
        no_source_info(),
    );
    session.merging_period([
        (Box::new(video) as Box<dyn MediaPeriod>, 0),
        (Box::new(audio) as Box<dyn MediaPeriod>, AUDIO_OFFSET_US),
    ])
}

#[rstest]
#[timeout(Duration::from_secs(10))]
fn test_merged_sources_load_and_shift(_tracing_setup: (), test_config: SessionConfig) {
    let mut session = session(test_config);
    let mut period = merged(&session);

    prepare_blocking(&mut period, 0).expect("prepare");
    let groups: Vec<(String, TrackType)> = period
        .track_groups()
        .iter()
        .map(|group| (group.id.clone(), group.track_type))
        .collect();
    assert_eq!(groups.len(), 2);
    assert!(groups[0].0.starts_with("0:"));
    assert_eq!(groups[0].1, TrackType::Video);
    assert!(groups[1].0.starts_with("1:"));
    assert_eq!(groups[1].1, TrackType::Audio);

    session.load_control_mut().on_prepared();
    let streams = select_tracks(&mut session, &mut period, merged_id(), 0);
    load_to_end(&mut period);

    assert_eq!(period.buffered_position_us(), TIME_END_OF_SOURCE);
    assert_eq!(read_times(&streams[0]), expected_times(0));
    assert_eq!(read_times(&streams[1]), expected_times(AUDIO_OFFSET_US));
}

#[rstest]
#[timeout(Duration::from_secs(15))]
fn test_merged_playback_under_load_control(_tracing_setup: (), test_config: SessionConfig) {
    let mut session = session(test_config);
    let mut period = merged(&session);

    prepare_blocking(&mut period, 0).expect("prepare");
    session.load_control_mut().on_prepared();
    let streams = select_tracks(&mut session, &mut period, merged_id(), 0);

    let playback = play(
        &mut session,
        &mut period,
        merged_id(),
        &streams,
        INTERVAL_US,
        DURATION_US,
    );
    assert_eq!(
        playback.played,
        vec![expected_times(0), expected_times(AUDIO_OFFSET_US)]
    );

    period.release().expect("release");
    assert_eq!(session.allocator().total_bytes_allocated(), 0);
}
