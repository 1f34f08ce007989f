//! Fakes for exercising periods without real media.
//!
//! [`FakeMedia`] describes an interleaved resource and hands out extractors
//! over it, with scripted load failures. [`FakeMediaPeriod`] is a scriptable
//! [`MediaPeriod`] for testing code that drives periods.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use lyra_core::{
    BufferFlags, DataSpec, Format, ReadFlags, TIME_END_OF_SOURCE, TrackGroup, TrackGroupArray,
    TrackSelection, TrackType,
};
use lyra_net::{LoadError, LoadResult};
use parking_lot::Mutex;
use url::Url;

use crate::{
    ContainerKind, DecoderInputBuffer, ExtractorFactory, ExtractorOutput, FormatHolder,
    MediaExtractor, MediaPeriod, PeriodError, PeriodEvent, PeriodResult, PeriodState,
    ReadOutcome, ReadResult, SampleStream, SeekMap, SeekParameters, SeekPoint,
    SequenceableLoader, SharedSampleStream, TrackOutput, same_stream,
};

#[derive(Clone, Debug)]
struct FakeSample {
    track: usize,
    time_us: i64,
    flags: BufferFlags,
}

#[derive(Default)]
struct FakeScript {
    /// Failures returned by `open`, one per call.
    open_failures: VecDeque<LoadError>,
    /// Locations that always fail to open.
    failing_uris: HashMap<Url, LoadError>,
    /// One-shot read failure once the input reaches this byte.
    read_failure: Option<(u64, LoadError)>,
    opened: Vec<DataSpec>,
}

/// An interleaved fake resource.
///
/// Sample `n` of the interleaving lives at byte `n * sample_size`; every
/// sample's bytes are filled with its track index.
pub struct FakeMedia {
    tracks: Vec<(u32, Format)>,
    samples: Vec<FakeSample>,
    sample_size: usize,
    /// Times at which every track has a key frame.
    seek_points: Vec<SeekPoint>,
    seekable: bool,
    duration_us: Option<i64>,
    report_length: bool,
    kind: ContainerKind,
    script: Mutex<FakeScript>,
    extractors_created: AtomicUsize,
}

impl FakeMedia {
    pub fn builder() -> FakeMediaBuilder {
        FakeMediaBuilder::default()
    }

    pub fn total_bytes(&self) -> u64 {
        (self.samples.len() * self.sample_size) as u64
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn ExtractorFactory> {
        Arc::new(FakeExtractorFactory {
            media: Arc::clone(self),
        })
    }

    /// Fail the next `open` calls with these errors, in order.
    pub fn fail_next_opens(&self, errors: impl IntoIterator<Item = LoadError>) {
        self.script.lock().open_failures.extend(errors);
    }

    /// Fail every open of `uri`.
    pub fn fail_uri(&self, uri: Url, error: LoadError) {
        self.script.lock().failing_uris.insert(uri, error);
    }

    /// Fail one read once the input reaches `position`.
    pub fn fail_read_at(&self, position: u64, error: LoadError) {
        self.script.lock().read_failure = Some((position, error));
    }

    pub fn opened(&self) -> Vec<DataSpec> {
        self.script.lock().opened.clone()
    }

    pub fn extractors_created(&self) -> usize {
        self.extractors_created.load(Ordering::SeqCst)
    }

    fn seek_map(&self) -> SeekMap {
        if self.seekable {
            SeekMap::new(self.duration_us, self.seek_points.clone())
        } else {
            SeekMap::unseekable(self.duration_us)
        }
    }
}

#[derive(Default)]
pub struct FakeMediaBuilder {
    tracks: Vec<(u32, Format, usize)>,
    samples_per_track: usize,
    interval_us: i64,
    sample_size: usize,
    unseekable: bool,
    duration_us: Option<i64>,
    no_length: bool,
    kind: ContainerKind,
}

impl FakeMediaBuilder {
    /// Track whose samples are key frames every `key_frame_interval` samples.
    #[must_use]
    pub fn track(mut self, id: u32, format: Format, key_frame_interval: usize) -> Self {
        self.tracks.push((id, format, key_frame_interval.max(1)));
        self
    }

    #[must_use]
    pub fn audio_track(self, id: u32) -> Self {
        let format = Format::builder()
            .id(format!("audio-{id}"))
            .sample_mime_type("audio/mp4a-latm")
            .bitrate(128_000)
            .audio(2, 44_100)
            .build();
        self.track(id, format, 1)
    }

    #[must_use]
    pub fn video_track(self, id: u32) -> Self {
        let format = Format::builder()
            .id(format!("video-{id}"))
            .sample_mime_type("video/avc")
            .bitrate(1_000_000)
            .size(1280, 720)
            .build();
        self.track(id, format, 5)
    }

    /// `count` samples per track, `interval_us` apart.
    #[must_use]
    pub fn samples(mut self, count: usize, interval_us: i64) -> Self {
        self.samples_per_track = count;
        self.interval_us = interval_us;
        self
    }

    #[must_use]
    pub fn sample_size(mut self, bytes: usize) -> Self {
        self.sample_size = bytes;
        self
    }

    #[must_use]
    pub fn unseekable(mut self) -> Self {
        self.unseekable = true;
        self
    }

    /// Duration reported in the seek map; unset by default.
    #[must_use]
    pub fn duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    /// Open reports no resource length.
    #[must_use]
    pub fn without_length(mut self) -> Self {
        self.no_length = true;
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: ContainerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn build(self) -> Arc<FakeMedia> {
        let mut samples = Vec::new();
        let mut seek_points = Vec::new();
        for n in 0..self.samples_per_track {
            if self.tracks.iter().all(|(_, _, key_every)| n % key_every == 0) {
                seek_points.push(SeekPoint::new(
                    n as i64 * self.interval_us,
                    (samples.len() * self.sample_size.max(1)) as u64,
                ));
            }
            for (track, (_, _, key_every)) in self.tracks.iter().enumerate() {
                let flags = if n % key_every == 0 {
                    BufferFlags::KEY_FRAME
                } else {
                    BufferFlags::empty()
                };
                samples.push(FakeSample {
                    track,
                    time_us: n as i64 * self.interval_us,
                    flags,
                });
            }
        }
        Arc::new(FakeMedia {
            tracks: self
                .tracks
                .into_iter()
                .map(|(id, format, _)| (id, format))
                .collect(),
            samples,
            sample_size: self.sample_size.max(1),
            seek_points,
            seekable: !self.unseekable,
            duration_us: self.duration_us,
            report_length: !self.no_length,
            kind: self.kind,
            script: Mutex::new(FakeScript::default()),
            extractors_created: AtomicUsize::new(0),
        })
    }
}

struct FakeExtractorFactory {
    media: Arc<FakeMedia>,
}

impl ExtractorFactory for FakeExtractorFactory {
    fn create(&self, _uri: &Url) -> LoadResult<Box<dyn MediaExtractor>> {
        self.media.extractors_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeExtractor {
            media: Arc::clone(&self.media),
            outputs: Vec::new(),
            position: 0,
        }))
    }
}

/// Extractor over a [`FakeMedia`]. Declares tracks on its first read.
pub struct FakeExtractor {
    media: Arc<FakeMedia>,
    outputs: Vec<Arc<dyn TrackOutput>>,
    position: u64,
}

impl MediaExtractor for FakeExtractor {
    fn kind(&self) -> ContainerKind {
        self.media.kind
    }

    fn open(&mut self, spec: &DataSpec) -> LoadResult<Option<u64>> {
        let mut script = self.media.script.lock();
        script.opened.push(spec.clone());
        if let Some(error) = script.failing_uris.get(&spec.uri) {
            return Err(error.clone());
        }
        if let Some(error) = script.open_failures.pop_front() {
            return Err(error);
        }
        self.position = spec.position;
        Ok(self
            .media
            .report_length
            .then(|| self.media.total_bytes().saturating_sub(spec.position)))
    }

    fn read(&mut self, output: &mut dyn ExtractorOutput) -> LoadResult<ReadOutcome> {
        if self.outputs.is_empty() {
            for (id, format) in &self.media.tracks {
                let track = output.track(*id, format.track_type());
                track.format(format.clone());
                self.outputs.push(track);
            }
            output.end_tracks();
            output.seek_map(self.media.seek_map());
            return Ok(ReadOutcome::Continue);
        }
        {
            let mut script = self.media.script.lock();
            if script
                .read_failure
                .as_ref()
                .is_some_and(|(at, _)| self.position >= *at)
                && let Some((_, error)) = script.read_failure.take()
            {
                return Err(error);
            }
        }
        let index = (self.position / self.media.sample_size as u64) as usize;
        let Some(sample) = self.media.samples.get(index) else {
            return Ok(ReadOutcome::EndOfInput);
        };
        let mut flags = sample.flags;
        if index + 1 == self.media.samples.len() {
            flags |= BufferFlags::LAST_SAMPLE;
        }
        let data = vec![sample.track as u8; self.media.sample_size];
        self.outputs[sample.track].sample(sample.time_us, flags, &data);
        self.position += self.media.sample_size as u64;
        Ok(ReadOutcome::Continue)
    }

    fn seek(&mut self, position: u64, _time_us: i64) {
        self.position = position;
    }

    fn input_position(&self) -> u64 {
        self.position
    }

    fn close(&mut self) {}
}

/// Scriptable state behind a [`FakeMediaPeriod`].
#[derive(Debug, Default)]
pub struct FakePeriodState {
    pub prepare_position_us: Option<i64>,
    /// `poll` reports `Prepared` once this is set and prepare was called.
    pub ready: bool,
    pub buffered_position_us: i64,
    pub next_load_position_us: i64,
    pub continue_loading_calls: Vec<i64>,
    /// Whether the next `continue_loading` call reports progress. One-shot.
    pub progress_on_continue: bool,
    /// Returned by `poll` in order after preparation.
    pub queued_events: VecDeque<PeriodEvent>,
    pub selections: Vec<Vec<Option<TrackSelection>>>,
    pub select_positions: Vec<i64>,
    /// Overrides the position `select_tracks` returns.
    pub select_result_us: Option<i64>,
    pub seeks: Vec<i64>,
    pub discards: Vec<(i64, bool)>,
    pub discontinuity_us: Option<i64>,
    pub prepare_error: Option<LoadError>,
    pub release_error: Option<PeriodError>,
    pub released: bool,
    /// Sample timestamps every stream of this period returns.
    pub sample_times_us: Vec<i64>,
}

/// Handle for scripting and inspecting a [`FakeMediaPeriod`] after it has
/// been boxed into another period.
#[derive(Clone, Debug, Default)]
pub struct FakePeriodHandle(Arc<Mutex<FakePeriodState>>);

impl FakePeriodHandle {
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, FakePeriodState> {
        self.0.lock()
    }
}

/// Scriptable [`MediaPeriod`] with fixed track groups.
pub struct FakeMediaPeriod {
    groups: TrackGroupArray,
    handle: FakePeriodHandle,
    prepare_reported: bool,
    streams: Vec<Option<Arc<FakeSampleStream>>>,
}

impl FakeMediaPeriod {
    /// Period ready to prepare on the first poll, buffered up to `buffered_us`.
    pub fn new(groups: Vec<TrackGroup>, buffered_us: i64) -> (Self, FakePeriodHandle) {
        let handle = FakePeriodHandle::default();
        {
            let mut state = handle.lock();
            state.ready = true;
            state.buffered_position_us = buffered_us;
            state.next_load_position_us = buffered_us;
        }
        let count = groups.len();
        let period = Self {
            groups: TrackGroupArray::new(groups),
            handle: handle.clone(),
            prepare_reported: false,
            streams: vec![None; count],
        };
        (period, handle)
    }

    /// Group with one audio format.
    pub fn audio_group(id: &str) -> TrackGroup {
        TrackGroup::with_id(
            id,
            vec![
                Format::builder()
                    .id(id)
                    .sample_mime_type("audio/mp4a-latm")
                    .build(),
            ],
        )
    }

    /// Group with one video format.
    pub fn video_group(id: &str) -> TrackGroup {
        TrackGroup::with_id(
            id,
            vec![Format::builder().id(id).sample_mime_type("video/avc").build()],
        )
    }
}

impl SequenceableLoader for FakeMediaPeriod {
    fn buffered_position_us(&self) -> i64 {
        self.handle.lock().buffered_position_us
    }

    fn next_load_position_us(&self) -> i64 {
        self.handle.lock().next_load_position_us
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        let mut state = self.handle.lock();
        state.continue_loading_calls.push(position_us);
        std::mem::take(&mut state.progress_on_continue)
            && state.next_load_position_us != TIME_END_OF_SOURCE
    }

    fn is_loading(&self) -> bool {
        self.handle.lock().next_load_position_us != TIME_END_OF_SOURCE
    }

    fn reevaluate_buffer(&mut self, _position_us: i64) {}
}

impl MediaPeriod for FakeMediaPeriod {
    fn prepare(&mut self, position_us: i64) {
        self.handle.lock().prepare_position_us = Some(position_us);
    }

    fn poll(&mut self) -> Option<PeriodEvent> {
        let mut state = self.handle.lock();
        if state.released || state.prepare_position_us.is_none() {
            return None;
        }
        if !self.prepare_reported {
            if !state.ready {
                return None;
            }
            self.prepare_reported = true;
            return Some(PeriodEvent::Prepared);
        }
        state.queued_events.pop_front()
    }

    fn maybe_throw_prepare_error(&self) -> PeriodResult<()> {
        match &self.handle.lock().prepare_error {
            Some(error) => Err(error.clone().into()),
            None => Ok(()),
        }
    }

    fn track_groups(&self) -> &TrackGroupArray {
        &self.groups
    }

    fn select_tracks(
        &mut self,
        selections: &[Option<TrackSelection>],
        may_retain: &[bool],
        streams: &mut [Option<SharedSampleStream>],
        reset_flags: &mut [bool],
        position_us: i64,
    ) -> PeriodResult<i64> {
        let n = selections.len();
        if may_retain.len() != n || streams.len() != n || reset_flags.len() != n {
            return Err(PeriodError::LengthMismatch);
        }
        let mut state = self.handle.lock();
        state.selections.push(selections.to_vec());
        state.select_positions.push(position_us);
        for i in 0..n {
            let track = selections[i]
                .as_ref()
                .map(|s| {
                    self.groups
                        .index_of_instance(s.track_group())
                        .ok_or_else(|| PeriodError::UnknownTrackGroup(s.track_group().id.clone()))
                })
                .transpose()?;
            if let Some(stream) = &streams[i] {
                let owned = self
                    .streams
                    .iter()
                    .position(|s| s.as_ref().is_some_and(|s| same_stream(stream, s)));
                if may_retain[i] && owned == track {
                    reset_flags[i] = false;
                } else {
                    if let Some(owned) = owned {
                        self.streams[owned] = None;
                    }
                    streams[i] = None;
                }
            }
            if let Some(track) = track
                && streams[i].is_none()
            {
                let stream = Arc::new(FakeSampleStream::new(
                    self.groups[track].formats()[0].clone(),
                    state.sample_times_us.clone(),
                ));
                self.streams[track] = Some(Arc::clone(&stream));
                streams[i] = Some(stream);
                reset_flags[i] = true;
            }
        }
        Ok(state.select_result_us.unwrap_or(position_us))
    }

    fn discard_buffer(&mut self, position_us: i64, to_key_frame: bool) {
        self.handle.lock().discards.push((position_us, to_key_frame));
    }

    fn read_discontinuity(&mut self) -> PeriodResult<Option<i64>> {
        Ok(self.handle.lock().discontinuity_us.take())
    }

    fn seek_to_us(&mut self, position_us: i64) -> PeriodResult<i64> {
        self.handle.lock().seeks.push(position_us);
        Ok(position_us)
    }

    fn adjusted_seek_position_us(&self, position_us: i64, _parameters: SeekParameters) -> i64 {
        // Sync points every second.
        position_us - position_us.rem_euclid(1_000_000)
    }

    fn release(&mut self) -> PeriodResult<()> {
        let mut state = self.handle.lock();
        state.released = true;
        match state.release_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn state(&self) -> PeriodState {
        let state = self.handle.lock();
        if state.released {
            PeriodState::Released
        } else if self.prepare_reported {
            PeriodState::Prepared
        } else if state.prepare_position_us.is_some() {
            PeriodState::Preparing
        } else {
            PeriodState::Idle
        }
    }
}

/// Stream that returns its format, then one empty key frame per timestamp.
pub struct FakeSampleStream {
    format: Format,
    state: Mutex<(bool, VecDeque<i64>)>,
}

impl FakeSampleStream {
    pub fn new(format: Format, times_us: Vec<i64>) -> Self {
        Self {
            format,
            state: Mutex::new((false, times_us.into())),
        }
    }
}

impl SampleStream for FakeSampleStream {
    fn is_ready(&self) -> bool {
        true
    }

    fn maybe_throw_error(&self) -> PeriodResult<()> {
        Ok(())
    }

    fn read_data(
        &self,
        holder: &mut FormatHolder,
        buffer: &mut DecoderInputBuffer,
        flags: ReadFlags,
    ) -> ReadResult {
        let mut state = self.state.lock();
        if !state.0 || flags.contains(ReadFlags::REQUIRE_FORMAT) {
            state.0 = true;
            holder.format = Some(self.format.clone());
            return ReadResult::FormatRead;
        }
        buffer.clear();
        match state.1.pop_front() {
            Some(time_us) => {
                buffer.time_us = time_us;
                buffer.flags = BufferFlags::KEY_FRAME;
            }
            None => buffer.flags = BufferFlags::END_OF_STREAM,
        }
        ReadResult::BufferRead
    }

    fn skip_data(&self, position_us: i64) -> usize {
        let mut state = self.state.lock();
        let before = state.1.len();
        state.1.retain(|&t| t >= position_us);
        before - state.1.len()
    }
}

/// Call `poll` until `done` accepts an event or the state, answering
/// continue-loading requests along the way. Panics after `timeout`.
pub fn poll_until<P, F>(period: &mut P, timeout: Duration, mut done: F)
where
    P: MediaPeriod + ?Sized,
    F: FnMut(&mut P, Option<PeriodEvent>) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        let event = period.poll();
        if event == Some(PeriodEvent::ContinueLoadingRequested) {
            let position = period.next_load_position_us().max(0);
            period.continue_loading(position);
        }
        if done(&mut *period, event) {
            return;
        }
        assert!(Instant::now() < deadline, "period made no progress");
        if event.is_none() {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Prepare `period` and wait for `Prepared`.
///
/// # Errors
///
/// Returns the preparation error if one surfaces first.
pub fn prepare_blocking<P>(period: &mut P, position_us: i64) -> PeriodResult<()>
where
    P: MediaPeriod + ?Sized,
{
    period.prepare(position_us);
    let mut result = Ok(());
    poll_until(period, Duration::from_secs(10), |period, event| {
        if event == Some(PeriodEvent::Prepared) {
            return true;
        }
        if let Err(error) = period.maybe_throw_prepare_error() {
            result = Err(error);
            return true;
        }
        false
    });
    result
}

/// Keep loading until everything is buffered.
pub fn load_to_end<P>(period: &mut P)
where
    P: MediaPeriod + ?Sized,
{
    period.continue_loading(0);
    poll_until(period, Duration::from_secs(10), |period, _| {
        period.buffered_position_us() == TIME_END_OF_SOURCE
    });
}

/// Selection of the first track of every group.
pub fn select_all(groups: &TrackGroupArray) -> Vec<Option<TrackSelection>> {
    groups
        .iter()
        .map(|group| Some(TrackSelection::fixed(Arc::clone(group), 0)))
        .collect()
}

/// Track type of every group, in order.
pub fn renderer_types(groups: &TrackGroupArray) -> Vec<TrackType> {
    groups.track_types()
}
