//! Single-source playback driven through a session's load control.

use std::time::Duration;

use lyra::SessionConfig;
use lyra_core::{MediaPeriodId, PeriodUid, TIME_END_OF_SOURCE};
use lyra_events::{Event, LoadEvent, SourceEvent};
use lyra_source::{
    MediaPeriod, PeriodOptions, SequenceableLoader,
    mock::{load_to_end, prepare_blocking},
};
use rstest::rstest;

use crate::common::*;

fn period_id() -> MediaPeriodId {
    MediaPeriodId::new(PeriodUid(1))
}

#[rstest]
#[timeout(Duration::from_secs(15))]
fn test_playback_buffers_between_thresholds(_tracing_setup: (), test_config: SessionConfig) {
    let mut session = session(test_config.with_period(PeriodOptions {
        continue_loading_check_interval_bytes: 1_000,
        ..PeriodOptions::default()
    }));
    let media = av_media();
    let mut period =
        session.progressive_period(period_id(), uri("av.mp4"), media.factory(), no_source_info());

    prepare_blocking(&mut period, 0).expect("prepare");
    session.load_control_mut().on_prepared();
    let streams = select_tracks(&mut session, &mut period, period_id(), 0);
    assert_eq!(streams.len(), 2);

    let playback = play(
        &mut session,
        &mut period,
        period_id(),
        &streams,
        INTERVAL_US,
        DURATION_US,
    );

    assert_eq!(playback.played, vec![expected_times(0), expected_times(0)]);
    assert!(playback.paused_by_control);
    // Max buffer of one second plus at most one check interval of media.
    assert!(
        playback.max_ahead_us < 1_500_000,
        "buffered {} us ahead",
        playback.max_ahead_us
    );
    assert_eq!(media.extractors_created(), 1);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
fn test_session_bus_carries_period_events(_tracing_setup: (), test_config: SessionConfig) {
    let mut session = session(test_config);
    let mut events = session.subscribe();
    let media = av_media();
    let mut period =
        session.progressive_period(period_id(), uri("av.mp4"), media.factory(), no_source_info());

    prepare_blocking(&mut period, 0).expect("prepare");
    select_tracks(&mut session, &mut period, period_id(), 0);
    load_to_end(&mut period);

    let received: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(received.iter().all(|event| event.period_id() == period_id()));

    let source: Vec<&SourceEvent> = received
        .iter()
        .filter_map(|event| match event {
            Event::Source(source) => Some(source),
            Event::Load(_) => None,
        })
        .collect();
    assert!(matches!(
        source.first(),
        Some(SourceEvent::SourceInfoRefreshed { .. })
    ));
    assert!(matches!(source.last(), Some(SourceEvent::Prepared { .. })));

    let completed = received
        .iter()
        .filter(|event| matches!(event, Event::Load(LoadEvent::Completed { .. })))
        .count();
    assert_eq!(completed, 1);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
fn test_release_returns_every_block(_tracing_setup: (), test_config: SessionConfig) {
    let mut session = session(test_config);
    let media = av_media();
    let mut period =
        session.progressive_period(period_id(), uri("av.mp4"), media.factory(), no_source_info());

    prepare_blocking(&mut period, 0).expect("prepare");
    session.load_control_mut().on_prepared();
    select_tracks(&mut session, &mut period, period_id(), 0);
    load_to_end(&mut period);
    assert_eq!(period.buffered_position_us(), TIME_END_OF_SOURCE);
    assert!(session.allocator().total_bytes_allocated() > 0);

    period.release().expect("release");
    assert_eq!(session.allocator().total_bytes_allocated(), 0);
    assert!(session.allocator().spare_count() > 0);

    session.load_control_mut().on_stopped();
    assert_eq!(session.allocator().spare_count(), 0);
    session.release();
    assert!(!session.load_control_mut().should_continue_loading(0, 0, 1.0));
}
