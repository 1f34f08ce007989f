//! Load failures handled by the session's error policy.

use std::time::Duration;

use lyra::SessionConfig;
use lyra_core::{MediaPeriodId, PeriodUid};
use lyra_events::{Event, LoadEvent, SourceEvent};
use lyra_net::LoadError;
use lyra_source::{
    MediaPeriod, PeriodError, PeriodState,
    mock::{load_to_end, prepare_blocking},
};
use rstest::rstest;

use crate::common::*;

fn period_id() -> MediaPeriodId {
    MediaPeriodId::new(PeriodUid(20))
}

fn load_errors(events: &[Event]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Load(LoadEvent::Error { was_canceled, .. }) => Some(*was_canceled),
            _ => None,
        })
        .collect()
}

#[rstest]
#[timeout(Duration::from_secs(10))]
fn test_transient_failures_are_retried(_tracing_setup: (), test_config: SessionConfig) {
    let mut session = session(test_config);
    let mut events = session.subscribe();
    let media = av_media();
    media.fail_next_opens([LoadError::io("connection reset"), LoadError::Timeout]);
    let mut period =
        session.progressive_period(period_id(), uri("av.mp4"), media.factory(), no_source_info());

    prepare_blocking(&mut period, 0).expect("prepare");
    let streams = select_tracks(&mut session, &mut period, period_id(), 0);
    load_to_end(&mut period);

    let received: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(load_errors(&received), vec![false, false]);
    assert_eq!(media.opened().len(), 3);
    assert_eq!(read_times(&streams[0]), expected_times(0));
}

#[rstest]
#[case::service_unavailable(503)]
#[case::not_found(404)]
#[timeout(Duration::from_secs(10))]
fn test_fallback_status_moves_to_mirror(
    _tracing_setup: (),
    test_config: SessionConfig,
    #[case] status: u16,
) {
    let session = session(test_config);
    let mut events = session.subscribe();
    let media = av_media();
    media.fail_uri(
        uri("av.mp4"),
        LoadError::invalid_response_code(status, uri("av.mp4").as_str()),
    );
    let mut period = session
        .progressive_period(period_id(), uri("av.mp4"), media.factory(), no_source_info())
        .with_fallback_locations([uri("mirror/av.mp4")]);

    prepare_blocking(&mut period, 0).expect("prepare");
    load_to_end(&mut period);

    assert_eq!(period.current_uri(), &uri("mirror/av.mp4"));
    let received: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    let excluded: Vec<_> = received
        .iter()
        .filter_map(|event| match event {
            Event::Source(SourceEvent::LocationExcluded { uri, exclusion, .. }) => {
                Some((uri.clone(), *exclusion))
            }
            _ => None,
        })
        .collect();
    assert_eq!(excluded, vec![(uri("av.mp4"), Duration::from_secs(300))]);
}

#[rstest]
#[timeout(Duration::from_secs(10))]
fn test_malformed_container_is_not_retried(_tracing_setup: (), test_config: SessionConfig) {
    let session = session(test_config);
    let mut events = session.subscribe();
    let media = av_media();
    let error = LoadError::malformed_container("truncated box");
    media.fail_next_opens([error.clone()]);
    let mut period =
        session.progressive_period(period_id(), uri("av.mp4"), media.factory(), no_source_info());

    assert_eq!(
        prepare_blocking(&mut period, 0),
        Err(PeriodError::Load(error))
    );
    assert_eq!(period.state(), PeriodState::Error);
    assert_eq!(media.opened().len(), 1);
    let received: Vec<Event> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert_eq!(load_errors(&received), vec![true]);
}
