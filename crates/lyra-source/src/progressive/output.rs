use std::sync::Arc;

use lyra_bufpool::Allocator;
use lyra_core::{BufferFlags, Format, ReadFlags, TrackType};
use lyra_net::LoadError;
use parking_lot::Mutex;
use tracing::trace;

use crate::{
    DecoderInputBuffer, ExtractorOutput, FormatHolder, PeriodError, PeriodResult, ReadResult,
    SampleQueue, SampleStream, SeekMap, TrackOutput,
};

#[derive(Default)]
pub(super) struct SharedState {
    pub(super) queues: Vec<Arc<SampleQueue>>,
    pub(super) tracks_ended: bool,
    pub(super) seek_map: Option<SeekMap>,
    /// Bumped whenever the extractor reports a different seek map.
    pub(super) seek_map_version: u64,
    pub(super) length_known: bool,
    pub(super) loading_finished: bool,
    /// Pending reset or discontinuity: streams must not hand out samples.
    pub(super) suppress_read: bool,
    pub(super) load_error: Option<LoadError>,
    pub(super) released: bool,
}

/// State shared between the control thread, the loader thread and streams.
#[derive(Default)]
pub(super) struct PeriodShared {
    state: Mutex<SharedState>,
}

impl PeriodShared {
    pub(super) fn lock(&self) -> parking_lot::MutexGuard<'_, SharedState> {
        self.state.lock()
    }

    pub(super) fn queues(&self) -> Vec<Arc<SampleQueue>> {
        self.state.lock().queues.clone()
    }

    fn queue(&self, track: usize) -> Option<(Arc<SampleQueue>, bool, bool)> {
        let state = self.state.lock();
        let queue = state.queues.get(track)?;
        Some((
            Arc::clone(queue),
            state.loading_finished,
            state.suppress_read,
        ))
    }
}

struct DiscardingTrackOutput;

impl TrackOutput for DiscardingTrackOutput {
    fn format(&self, _format: Format) {}

    fn sample(&self, _time_us: i64, _flags: BufferFlags, _data: &[u8]) {}
}

/// Extractor output of one period, used on the loader thread.
pub(super) struct PeriodOutput {
    shared: Arc<PeriodShared>,
    allocator: Allocator,
}

impl PeriodOutput {
    pub(super) fn new(shared: Arc<PeriodShared>, allocator: Allocator) -> Self {
        Self { shared, allocator }
    }

    pub(super) fn set_length_known(&self) {
        self.shared.lock().length_known = true;
    }
}

impl ExtractorOutput for PeriodOutput {
    fn track(&mut self, id: u32, track_type: TrackType) -> Arc<dyn TrackOutput> {
        let mut state = self.shared.lock();
        if let Some(queue) = state.queues.iter().find(|q| q.id() == id) {
            return Arc::clone(queue) as Arc<dyn TrackOutput>;
        }
        if state.tracks_ended || state.released {
            trace!(id, "track declared after end of tracks, discarding");
            return Arc::new(DiscardingTrackOutput);
        }
        let queue = Arc::new(SampleQueue::new(id, track_type, self.allocator.clone()));
        state.queues.push(Arc::clone(&queue));
        queue
    }

    fn end_tracks(&mut self) {
        self.shared.lock().tracks_ended = true;
    }

    fn seek_map(&mut self, seek_map: SeekMap) {
        let mut state = self.shared.lock();
        if state.seek_map.as_ref() != Some(&seek_map) {
            state.seek_map = Some(seek_map);
            state.seek_map_version += 1;
        }
    }
}

/// Stream over one track's sample queue.
pub(super) struct ProgressiveSampleStream {
    shared: Arc<PeriodShared>,
    track: usize,
}

impl ProgressiveSampleStream {
    pub(super) fn new(shared: Arc<PeriodShared>, track: usize) -> Self {
        Self { shared, track }
    }

    pub(super) fn track(&self) -> usize {
        self.track
    }
}

impl SampleStream for ProgressiveSampleStream {
    fn is_ready(&self) -> bool {
        self.shared
            .queue(self.track)
            .is_some_and(|(queue, finished, suppress)| !suppress && queue.is_ready(finished))
    }

    fn maybe_throw_error(&self) -> PeriodResult<()> {
        match &self.shared.lock().load_error {
            Some(error) => Err(PeriodError::Load(error.clone())),
            None => Ok(()),
        }
    }

    fn read_data(
        &self,
        holder: &mut FormatHolder,
        buffer: &mut DecoderInputBuffer,
        flags: ReadFlags,
    ) -> ReadResult {
        match self.shared.queue(self.track) {
            Some((queue, finished, false)) => queue.read(holder, buffer, flags, finished),
            _ => ReadResult::NothingRead,
        }
    }

    fn skip_data(&self, position_us: i64) -> usize {
        match self.shared.queue(self.track) {
            Some((queue, finished, false)) => queue.skip_to(position_us, finished),
            _ => 0,
        }
    }
}
