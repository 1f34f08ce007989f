use std::{
    thread,
    time::{Duration, Instant},
};

use lyra::Session;
use lyra_core::{MediaPeriodId, ReadFlags, TIME_END_OF_SOURCE, Timeline, TrackSelection};
use lyra_source::{
    DecoderInputBuffer, FormatHolder, MediaPeriod, ReadResult, SharedSampleStream,
    mock::{renderer_types, select_all},
};

pub fn next_sample(stream: &SharedSampleStream) -> Option<DecoderInputBuffer> {
    let mut holder = FormatHolder::default();
    let mut buffer = DecoderInputBuffer::default();
    loop {
        match stream.read_data(&mut holder, &mut buffer, ReadFlags::empty()) {
            ReadResult::FormatRead => {}
            ReadResult::BufferRead => return Some(buffer),
            ReadResult::NothingRead => return None,
        }
    }
}

/// Sample times up to the end of stream or the first empty read.
pub fn read_times(stream: &SharedSampleStream) -> Vec<i64> {
    std::iter::from_fn(|| next_sample(stream))
        .take_while(|buffer| !buffer.is_end_of_stream())
        .map(|buffer| buffer.time_us)
        .collect()
}

/// Select the first track of every group and report the selection to the
/// session's load control.
pub fn select_tracks(
    session: &mut Session,
    period: &mut dyn MediaPeriod,
    period_id: MediaPeriodId,
    position_us: i64,
) -> Vec<SharedSampleStream> {
    let selections: Vec<Option<TrackSelection>> = select_all(period.track_groups());
    let mut streams = vec![None; selections.len()];
    let mut reset = vec![false; selections.len()];
    period
        .select_tracks(
            &selections,
            &vec![false; selections.len()],
            &mut streams,
            &mut reset,
            position_us,
        )
        .expect("select tracks");
    session.load_control_mut().on_tracks_selected(
        &Timeline::empty(),
        &period_id,
        &renderer_types(period.track_groups()),
        period.track_groups(),
        &selections,
    );
    streams.into_iter().flatten().collect()
}

/// What a simulated playback observed.
#[derive(Debug, Default)]
pub struct Playback {
    /// Sample times read per stream.
    pub played: Vec<Vec<i64>>,
    /// Largest distance between buffered and playback position.
    pub max_ahead_us: i64,
    /// Load control declined to continue at least once before the end.
    pub paused_by_control: bool,
}

/// Play `period` from zero to `duration_us` in steps of `step_us`, asking the
/// session's load control whether to keep loading and when to start.
///
/// Every stream must carry one sample per step.
pub fn play(
    session: &mut Session,
    period: &mut dyn MediaPeriod,
    period_id: MediaPeriodId,
    streams: &[SharedSampleStream],
    step_us: i64,
    duration_us: i64,
) -> Playback {
    let deadline = Instant::now() + Duration::from_secs(10);
    let timeline = Timeline::empty();
    let mut playback = Playback {
        played: vec![Vec::new(); streams.len()],
        ..Playback::default()
    };
    let mut position_us = 0;
    let mut started = false;

    while position_us < duration_us {
        assert!(
            Instant::now() < deadline,
            "playback stalled at {position_us} us"
        );
        while period.poll().is_some() {}

        let buffered_us = period.buffered_position_us();
        let loaded = buffered_us == TIME_END_OF_SOURCE;
        let ahead_us = if loaded {
            i64::MAX
        } else {
            buffered_us - position_us
        };
        if !loaded {
            playback.max_ahead_us = playback.max_ahead_us.max(ahead_us);
            if !period.is_loading() {
                if session
                    .load_control_mut()
                    .should_continue_loading(position_us, ahead_us, 1.0)
                {
                    period.continue_loading(position_us);
                } else {
                    playback.paused_by_control = true;
                }
            }
        }

        started = started
            || loaded
            || session.load_control().should_start_playback(
                &timeline,
                &period_id,
                ahead_us,
                1.0,
                false,
                None,
            );
        if !(started && (loaded || ahead_us > step_us)) {
            thread::sleep(Duration::from_millis(1));
            continue;
        }

        position_us += step_us;
        let due = usize::try_from(position_us / step_us).expect("positive position");
        for (played, stream) in playback.played.iter_mut().zip(streams) {
            while played.len() < due {
                let buffer = next_sample(stream).expect("sample buffered before playback");
                assert!(!buffer.is_end_of_stream(), "stream ended early");
                played.push(buffer.time_us);
            }
        }
        period.discard_buffer(position_us, false);
    }
    playback
}
