//! Single-source media period.

mod loadable;
mod output;

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use lyra_core::{
    DataType, LoadEventInfo, MediaLoadData, MediaPeriodId, TIME_END_OF_SOURCE, TrackGroup,
    TrackGroupArray, TrackSelection,
};
use lyra_events::{LoadEvent, SourceEvent};
use lyra_net::{
    FallbackOptions, FallbackType, LoadError, LoadErrorDecision, LoadErrorInfo,
};
use lyra_worker::{LoadErrorAction, Loader, LoaderEvent};
use tracing::{debug, trace, warn};
use url::Url;

use self::{
    loadable::ExtractingLoadable,
    output::{PeriodOutput, PeriodShared, ProgressiveSampleStream},
};
use crate::{
    ExtractorFactory, MediaPeriod, PeriodContext, PeriodError, PeriodEvent, PeriodOptions,
    PeriodResult, PeriodState, SampleQueue, SeekMap, SeekParameters, SequenceableLoader,
    SharedSampleStream, SourceInfoListener, same_stream,
};

/// Added to the last sample timestamp when the container gives no duration.
const DEFAULT_LAST_SAMPLE_DURATION_US: i64 = 10_000;

#[derive(Debug)]
struct Location {
    uri: Url,
    excluded_until: Option<Instant>,
}

impl Location {
    fn is_excluded(&self, now: Instant) -> bool {
        self.excluded_until.is_some_and(|until| now < until)
    }
}

/// Per-track state fixed at preparation.
struct Tracks {
    groups: TrackGroupArray,
    is_audio_video: Vec<bool>,
    have_audio_video: bool,
    enabled: Vec<bool>,
    streams: Vec<Option<Arc<ProgressiveSampleStream>>>,
}

/// Media period over a single progressive resource (one file, possibly
/// mirrored at several locations).
///
/// An extractor runs on a background [`Loader`] and writes into one
/// [`SampleQueue`] per track. Preparation completes once the extractor has
/// declared all tracks, their formats and a seek map.
pub struct ProgressiveMediaPeriod {
    id: MediaPeriodId,
    locations: Vec<Location>,
    current_location: usize,
    factory: Arc<dyn ExtractorFactory>,
    ctx: PeriodContext,
    listener: Arc<dyn SourceInfoListener>,
    options: PeriodOptions,
    shared: Arc<PeriodShared>,
    loader: Loader<ExtractingLoadable>,
    idle_loadable: Option<ExtractingLoadable>,
    setup_error: Option<LoadError>,
    pending_events: VecDeque<PeriodEvent>,

    preparing: bool,
    prepared: bool,
    released: bool,
    empty_groups: TrackGroupArray,
    tracks: Option<Tracks>,
    enabled_track_count: usize,
    seen_first_track_selection: bool,

    seek_map: Option<SeekMap>,
    seek_map_version: u64,
    duration_us: Option<i64>,
    is_live: bool,
    data_type: DataType,

    loading_finished: bool,
    notify_discontinuity: bool,
    pending_reset_position_us: Option<i64>,
    last_seek_position_us: i64,
    pending_deferred_retry: bool,
    extracted_samples_at_start: u64,
}

impl ProgressiveMediaPeriod {
    pub fn new(
        id: MediaPeriodId,
        uri: Url,
        factory: Arc<dyn ExtractorFactory>,
        ctx: PeriodContext,
        listener: Arc<dyn SourceInfoListener>,
        options: PeriodOptions,
    ) -> Self {
        Self {
            loader: Loader::new(format!("lyra-progressive-{}", id.period_uid)),
            id,
            locations: vec![Location {
                uri,
                excluded_until: None,
            }],
            current_location: 0,
            factory,
            ctx,
            listener,
            options,
            shared: Arc::new(PeriodShared::default()),
            idle_loadable: None,
            setup_error: None,
            pending_events: VecDeque::new(),
            preparing: false,
            prepared: false,
            released: false,
            empty_groups: TrackGroupArray::empty(),
            tracks: None,
            enabled_track_count: 0,
            seen_first_track_selection: false,
            seek_map: None,
            seek_map_version: 0,
            duration_us: None,
            is_live: false,
            data_type: DataType::Media,
            loading_finished: false,
            notify_discontinuity: false,
            pending_reset_position_us: None,
            last_seek_position_us: 0,
            pending_deferred_retry: false,
            extracted_samples_at_start: 0,
        }
    }

    /// Mirrors of the primary location, tried in order after exclusions.
    #[must_use]
    pub fn with_fallback_locations(mut self, uris: impl IntoIterator<Item = Url>) -> Self {
        self.locations.extend(uris.into_iter().map(|uri| Location {
            uri,
            excluded_until: None,
        }));
        self
    }

    pub fn id(&self) -> MediaPeriodId {
        self.id
    }

    /// Location the next load reads from.
    pub fn current_uri(&self) -> &Url {
        &self.locations[self.current_location].uri
    }

    pub fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    pub fn is_live(&self) -> bool {
        self.is_live
    }

    fn is_pending_reset(&self) -> bool {
        self.pending_reset_position_us.is_some()
    }

    fn suppress_read(&self) -> bool {
        self.notify_discontinuity || self.is_pending_reset()
    }

    fn queues(&self) -> Vec<Arc<SampleQueue>> {
        self.shared.queues()
    }

    fn extracted_samples_count(&self) -> u64 {
        self.queues().iter().map(|q| q.samples_written()).sum()
    }

    fn retry_budget(&self) -> u32 {
        self.ctx.policy.minimum_loadable_retry_count(self.data_type)
    }

    /// Publish control-thread state that streams read.
    fn sync_shared(&self) {
        let load_error = self
            .setup_error
            .clone()
            .or_else(|| self.loader.maybe_throw_error(self.retry_budget()).err());
        let mut state = self.shared.lock();
        state.loading_finished = self.loading_finished;
        state.suppress_read = self.suppress_read();
        state.load_error = load_error;
    }

    fn media_load_data(&self, loadable: &ExtractingLoadable) -> MediaLoadData {
        MediaLoadData::new(self.data_type)
            .with_media_times(Some(loadable.seek_time_us()), self.duration_us)
    }

    fn load_event_info(&self, loadable: &ExtractingLoadable, elapsed: Duration) -> LoadEventInfo {
        LoadEventInfo::new(loadable.task_id(), loadable.data_spec().clone())
            .with_progress(elapsed, loadable.bytes_loaded())
    }

    fn take_loadable(&mut self) -> Result<ExtractingLoadable, LoadError> {
        if let Some(mut loadable) = self.idle_loadable.take() {
            loadable.renew();
            return Ok(loadable);
        }
        let uri = self.current_uri().clone();
        let extractor = self.factory.create(&uri)?;
        Ok(ExtractingLoadable::new(
            uri,
            self.options.custom_cache_key.clone(),
            extractor,
            PeriodOutput::new(Arc::clone(&self.shared), self.ctx.allocator.clone()),
            self.options.continue_loading_check_interval_bytes,
        ))
    }

    fn start_loading(&mut self) {
        let mut loadable = match self.take_loadable() {
            Ok(loadable) => loadable,
            Err(error) => {
                warn!(period = %self.id, %error, "no extractor for source");
                self.setup_error = Some(error);
                return;
            }
        };

        if self.prepared
            && let Some(reset_us) = self.pending_reset_position_us
        {
            if self.duration_us.is_some_and(|duration| reset_us > duration) {
                self.loading_finished = true;
                self.pending_reset_position_us = None;
                self.idle_loadable = Some(loadable);
                return;
            }
            let position = self
                .seek_map
                .as_ref()
                .map_or(0, |map| map.seek_points(reset_us).0.position);
            loadable.set_load_position(position, reset_us);
            for queue in self.queues() {
                queue.set_start_time_us(reset_us);
            }
            self.pending_reset_position_us = None;
        }

        self.extracted_samples_at_start = self.extracted_samples_count();
        let info = self.load_event_info(&loadable, Duration::ZERO);
        let media = self.media_load_data(&loadable);
        match self.loader.start_loading(loadable) {
            Ok(()) => {
                trace!(period = %self.id, task = info.load_task_id, "load started");
                self.ctx.events.publish(LoadEvent::Started {
                    period_id: self.id,
                    info,
                    media,
                });
            }
            Err(error) => {
                warn!(period = %self.id, %error, "load could not start");
                self.setup_error = Some(error);
            }
        }
    }

    /// Cancel the running load synchronously and report it.
    fn cancel_load(&mut self) {
        let Some(mut loadable) = self.loader.cancel_loading() else {
            return;
        };
        loadable.close();
        let info = self.load_event_info(&loadable, Duration::ZERO);
        let media = self.media_load_data(&loadable);
        self.ctx.events.publish(LoadEvent::Canceled {
            period_id: self.id,
            info,
            media,
        });
        self.idle_loadable = Some(loadable);
    }

    fn maybe_finish_prepare(&mut self) {
        if self.released || self.prepared || !self.preparing {
            return;
        }
        let (queues, seek_map, length_known) = {
            let state = self.shared.lock();
            let Some(seek_map) = state.seek_map.clone() else {
                return;
            };
            if !state.tracks_ended {
                return;
            }
            (state.queues.clone(), (seek_map, state.seek_map_version), state.length_known)
        };
        let mut groups = Vec::with_capacity(queues.len());
        for (index, queue) in queues.iter().enumerate() {
            let Some(format) = queue.upstream_format() else {
                return;
            };
            groups.push(TrackGroup::with_id(index.to_string(), vec![format]));
        }
        let is_audio_video: Vec<bool> = groups
            .iter()
            .map(|g| g.track_type.is_audio_or_video())
            .collect();

        self.apply_seek_map(seek_map.0, seek_map.1, length_known);
        self.tracks = Some(Tracks {
            groups: TrackGroupArray::new(groups),
            have_audio_video: is_audio_video.iter().any(|&av| av),
            enabled: vec![false; is_audio_video.len()],
            streams: vec![None; is_audio_video.len()],
            is_audio_video,
        });
        self.prepared = true;
        self.notify_source_info();
        debug!(
            period = %self.id,
            tracks = queues.len(),
            duration_us = ?self.duration_us,
            live = self.is_live,
            "period prepared"
        );
        self.ctx.events.publish(SourceEvent::Prepared { period_id: self.id });
        self.pending_events.push_back(PeriodEvent::Prepared);
    }

    fn apply_seek_map(&mut self, seek_map: SeekMap, version: u64, length_known: bool) {
        self.duration_us = seek_map.duration_us();
        self.is_live = !length_known && seek_map.duration_us().is_none();
        self.data_type = if self.is_live {
            DataType::MediaProgressiveLive
        } else {
            DataType::Media
        };
        self.seek_map = Some(seek_map);
        self.seek_map_version = version;
    }

    fn notify_source_info(&self) {
        let is_seekable = self.seek_map.as_ref().is_some_and(SeekMap::is_seekable);
        self.listener
            .on_source_info_refreshed(self.duration_us, is_seekable, self.is_live);
        self.ctx.events.publish(SourceEvent::SourceInfoRefreshed {
            period_id: self.id,
            duration_us: self.duration_us,
            is_seekable,
            is_live: self.is_live,
        });
    }

    fn refresh_seek_map(&mut self) {
        if !self.prepared {
            return;
        }
        let update = {
            let state = self.shared.lock();
            match &state.seek_map {
                Some(map) if state.seek_map_version != self.seek_map_version => {
                    Some((map.clone(), state.seek_map_version, state.length_known))
                }
                _ => None,
            }
        };
        if let Some((map, version, length_known)) = update {
            self.apply_seek_map(map, version, length_known);
            self.notify_source_info();
        }
    }

    fn on_load_completed(&mut self, mut loadable: ExtractingLoadable, elapsed: Duration) {
        loadable.close();
        if self.duration_us.is_none() && self.seek_map.is_some() {
            let largest = self.largest_queued_timestamp_us(true);
            self.duration_us = Some(largest.map_or(0, |t| t + DEFAULT_LAST_SAMPLE_DURATION_US));
            self.notify_source_info();
        }
        let info = self.load_event_info(&loadable, elapsed);
        let media = self.media_load_data(&loadable);
        debug!(period = %self.id, bytes = info.bytes_loaded, "load completed");
        self.ctx.events.publish(LoadEvent::Completed {
            period_id: self.id,
            info,
            media,
        });
        self.ctx.policy.on_load_task_concluded(loadable.task_id());
        self.loading_finished = true;
        self.idle_loadable = Some(loadable);
        self.pending_events
            .push_back(PeriodEvent::ContinueLoadingRequested);
    }

    fn fallback_options(&self) -> FallbackOptions {
        let now = Instant::now();
        let excluded = self.locations.iter().filter(|l| l.is_excluded(now)).count();
        FallbackOptions::new(self.locations.len(), excluded, 1, 0)
    }

    /// Exclude the current location and move to the next usable one.
    fn exclude_current_location(&mut self, exclusion: Duration) -> Url {
        let now = Instant::now();
        let excluded = self.current_location;
        self.locations[excluded].excluded_until = Some(now + exclusion);
        let count = self.locations.len();
        if let Some(next) = (1..count)
            .map(|step| (excluded + step) % count)
            .find(|&index| !self.locations[index].is_excluded(now))
        {
            self.current_location = next;
        }
        let uri = self.locations[excluded].uri.clone();
        warn!(
            period = %self.id,
            excluded = %uri,
            next = %self.current_uri(),
            exclusion_ms = exclusion.as_millis() as u64,
            "location excluded"
        );
        self.ctx.events.publish(SourceEvent::LocationExcluded {
            period_id: self.id,
            uri: uri.clone(),
            exclusion,
        });
        uri
    }

    /// Whether a failed load may be retried. Media of unknown length without a
    /// duration is restarted from the beginning, deferred while readers are
    /// still consuming what was loaded.
    fn configure_retry(&mut self, loadable: &mut ExtractingLoadable, extracted: u64) -> bool {
        let length_known = self.shared.lock().length_known;
        if length_known || self.duration_us.is_some() {
            self.extracted_samples_at_start = extracted;
            return true;
        }
        if self.prepared && !self.suppress_read() {
            self.pending_deferred_retry = true;
            return false;
        }
        self.notify_discontinuity = self.prepared;
        self.last_seek_position_us = 0;
        for queue in self.queues() {
            queue.reset();
        }
        self.extracted_samples_at_start = self.extracted_samples_count();
        match loadable.restart_from_beginning(self.factory.as_ref()) {
            Ok(()) => true,
            Err(error) => {
                warn!(period = %self.id, %error, "extractor could not be recreated");
                false
            }
        }
    }

    fn on_load_error(
        &mut self,
        mut loadable: ExtractingLoadable,
        error: LoadError,
        elapsed: Duration,
        error_count: u32,
    ) {
        let info = self.load_event_info(&loadable, elapsed);
        let media = self.media_load_data(&loadable);
        let error_info =
            LoadErrorInfo::new(info.clone(), media.clone(), error.clone(), error_count);
        let decision = LoadErrorDecision::resolve(
            self.ctx.policy.as_ref(),
            &self.fallback_options(),
            &error_info,
        );

        let action = match decision {
            LoadErrorDecision::Retry(delay) => {
                let extracted = self.extracted_samples_count();
                let made_progress = extracted > self.extracted_samples_at_start;
                if !self.configure_retry(&mut loadable, extracted) {
                    LoadErrorAction::DontRetry
                } else if made_progress {
                    LoadErrorAction::RetryResetErrorCount { delay }
                } else {
                    LoadErrorAction::Retry { delay }
                }
            }
            LoadErrorDecision::Fallback(selection)
                if selection.fallback_type == FallbackType::Location =>
            {
                self.exclude_current_location(selection.exclusion_duration);
                loadable.switch_location(self.current_uri().clone());
                LoadErrorAction::RetryResetErrorCount {
                    delay: Duration::ZERO,
                }
            }
            LoadErrorDecision::Fallback(_) | LoadErrorDecision::Fatal => {
                LoadErrorAction::DontRetryFatal
            }
        };

        let was_canceled = !action.is_retry();
        self.ctx.events.publish(LoadEvent::Error {
            period_id: self.id,
            info,
            media,
            error,
            was_canceled,
        });
        if was_canceled {
            loadable.close();
            self.ctx.policy.on_load_task_concluded(loadable.task_id());
        }
        if let Some(loadable) = self.loader.on_error_action(loadable, action) {
            self.idle_loadable = Some(loadable);
        }
    }

    /// Restart a deferred retry once every enabled audio/video stream has
    /// drained what was loaded before the failure.
    fn maybe_start_deferred_retry(&mut self) {
        if !self.pending_deferred_retry {
            return;
        }
        let Some(tracks) = &self.tracks else {
            return;
        };
        let queues = self.queues();
        let still_reading = queues.iter().enumerate().any(|(i, queue)| {
            tracks.enabled[i]
                && (tracks.is_audio_video[i] || !tracks.have_audio_video)
                && queue.is_ready(false)
        });
        if still_reading {
            return;
        }
        debug!(period = %self.id, "starting deferred retry");
        self.pending_reset_position_us = Some(0);
        self.pending_deferred_retry = false;
        self.notify_discontinuity = true;
        self.last_seek_position_us = 0;
        for queue in &queues {
            queue.reset();
        }
        self.extracted_samples_at_start = self.extracted_samples_count();
        if let Some(loadable) = self.idle_loadable.as_mut()
            && let Err(error) = loadable.restart_from_beginning(self.factory.as_ref())
        {
            self.setup_error = Some(error);
            return;
        }
        self.pending_events
            .push_back(PeriodEvent::ContinueLoadingRequested);
    }

    fn largest_queued_timestamp_us(&self, include_disabled: bool) -> Option<i64> {
        let queues = self.queues();
        queues
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                include_disabled
                    || self
                        .tracks
                        .as_ref()
                        .is_some_and(|tracks| tracks.enabled[*i])
            })
            .filter_map(|(_, queue)| queue.largest_queued_timestamp_us())
            .max()
    }

    fn seek_inside_buffer(&self, position_us: i64) -> bool {
        let Some(tracks) = &self.tracks else {
            return false;
        };
        for (i, queue) in self.queues().iter().enumerate() {
            let seeked = queue.seek_to(position_us, false);
            if !seeked && (tracks.is_audio_video[i] || !tracks.have_audio_video) {
                return false;
            }
        }
        true
    }

    fn track_index_for(&self, selection: &TrackSelection) -> PeriodResult<usize> {
        let groups = &self
            .tracks
            .as_ref()
            .ok_or(PeriodError::NotPrepared)?
            .groups;
        let group = selection.track_group();
        groups
            .index_of_instance(group)
            .or_else(|| groups.index_of(group))
            .ok_or_else(|| PeriodError::UnknownTrackGroup(group.id.clone()))
    }

    fn check_distinct(&self, new_tracks: &[Option<usize>]) -> PeriodResult<()> {
        let Some(tracks) = &self.tracks else {
            return Err(PeriodError::NotPrepared);
        };
        let mut seen = vec![false; tracks.groups.len()];
        for &track in new_tracks.iter().flatten() {
            if std::mem::replace(&mut seen[track], true) {
                return Err(PeriodError::DuplicateSelection(
                    tracks.groups[track].id.clone(),
                ));
            }
        }
        Ok(())
    }

    fn disable_stream(&mut self, stream: &SharedSampleStream) {
        let Some(tracks) = self.tracks.as_mut() else {
            return;
        };
        let track = tracks
            .streams
            .iter()
            .position(|s| s.as_ref().is_some_and(|s| same_stream(stream, s)));
        if let Some(track) = track {
            tracks.streams[track] = None;
            tracks.enabled[track] = false;
            self.enabled_track_count -= 1;
        }
    }

    fn stream_track(&self, stream: &SharedSampleStream) -> Option<usize> {
        self.tracks.as_ref()?.streams.iter().flatten().find_map(|s| {
            same_stream(stream, s).then(|| s.track())
        })
    }
}

impl SequenceableLoader for ProgressiveMediaPeriod {
    fn buffered_position_us(&self) -> i64 {
        if self.loading_finished || (self.prepared && self.enabled_track_count == 0) {
            return TIME_END_OF_SOURCE;
        }
        if let Some(reset_us) = self.pending_reset_position_us {
            return reset_us;
        }
        let queues = self.queues();
        let mut largest = None;
        if let Some(tracks) = &self.tracks
            && tracks.have_audio_video
        {
            for (i, queue) in queues.iter().enumerate() {
                if tracks.is_audio_video[i] && tracks.enabled[i] && !queue.is_last_sample_queued() {
                    let queued = queue.largest_queued_timestamp_us().unwrap_or(i64::MIN);
                    largest = Some(largest.map_or(queued, |l: i64| l.min(queued)));
                }
            }
        }
        match largest.or_else(|| self.largest_queued_timestamp_us(false)) {
            Some(i64::MIN) | None => self.last_seek_position_us,
            Some(position) => position,
        }
    }

    fn next_load_position_us(&self) -> i64 {
        self.buffered_position_us()
    }

    fn continue_loading(&mut self, _position_us: i64) -> bool {
        if self.released
            || self.loading_finished
            || self.setup_error.is_some()
            || self.loader.has_fatal_error()
            || self.pending_deferred_retry
            || (self.prepared && self.enabled_track_count == 0)
        {
            return false;
        }
        let mut continued = self.loader.gate().open();
        if !self.loader.is_loading() {
            self.start_loading();
            continued = true;
        }
        self.sync_shared();
        continued
    }

    fn is_loading(&self) -> bool {
        self.loader.is_loading() && self.loader.gate().is_open()
    }

    fn reevaluate_buffer(&mut self, _position_us: i64) {}
}

impl MediaPeriod for ProgressiveMediaPeriod {
    fn prepare(&mut self, position_us: i64) {
        if self.released || self.preparing || self.prepared {
            return;
        }
        debug!(period = %self.id, position_us, uri = %self.current_uri(), "preparing");
        self.preparing = true;
        self.loader.gate().open();
        self.start_loading();
        self.sync_shared();
    }

    fn poll(&mut self) -> Option<PeriodEvent> {
        if self.released {
            return None;
        }
        self.maybe_finish_prepare();
        while let Some(event) = self.loader.try_next_event() {
            match event {
                LoaderEvent::ContinueLoadingRequested => {
                    if self.pending_events.back() != Some(&PeriodEvent::ContinueLoadingRequested) {
                        self.pending_events
                            .push_back(PeriodEvent::ContinueLoadingRequested);
                    }
                }
                LoaderEvent::Completed {
                    loadable,
                    load_duration,
                } => {
                    self.maybe_finish_prepare();
                    self.on_load_completed(loadable, load_duration);
                }
                LoaderEvent::Error {
                    loadable,
                    error,
                    load_duration,
                    error_count,
                } => self.on_load_error(loadable, error, load_duration, error_count),
            }
        }
        self.maybe_finish_prepare();
        self.refresh_seek_map();
        self.maybe_start_deferred_retry();
        self.sync_shared();
        self.pending_events.pop_front()
    }

    fn maybe_throw_prepare_error(&self) -> PeriodResult<()> {
        if let Some(error) = &self.setup_error {
            return Err(error.clone().into());
        }
        self.loader.maybe_throw_error(self.retry_budget())?;
        if self.loading_finished && !self.prepared {
            return Err(LoadError::malformed_container(
                "loading finished before preparation completed",
            )
            .into());
        }
        Ok(())
    }

    fn track_groups(&self) -> &TrackGroupArray {
        self.tracks
            .as_ref()
            .map_or(&self.empty_groups, |tracks| &tracks.groups)
    }

    fn select_tracks(
        &mut self,
        selections: &[Option<TrackSelection>],
        may_retain: &[bool],
        streams: &mut [Option<SharedSampleStream>],
        reset_flags: &mut [bool],
        mut position_us: i64,
    ) -> PeriodResult<i64> {
        if self.released {
            return Err(PeriodError::Released);
        }
        if !self.prepared {
            return Err(PeriodError::NotPrepared);
        }
        let n = selections.len();
        if may_retain.len() != n || streams.len() != n || reset_flags.len() != n {
            return Err(PeriodError::LengthMismatch);
        }
        let new_tracks = selections
            .iter()
            .map(|s| s.as_ref().map(|s| self.track_index_for(s)).transpose())
            .collect::<PeriodResult<Vec<_>>>()?;
        self.check_distinct(&new_tracks)?;
        let old_enabled_count = self.enabled_track_count;

        for i in 0..n {
            let Some(stream) = streams[i].clone() else {
                continue;
            };
            let retain = may_retain[i]
                && new_tracks[i].is_some()
                && self.stream_track(&stream) == new_tracks[i];
            if retain {
                reset_flags[i] = false;
            } else {
                self.disable_stream(&stream);
                streams[i] = None;
            }
        }

        let mut seek_required = if self.seen_first_track_selection {
            old_enabled_count == 0
        } else {
            position_us != 0
        };
        let queues = self.queues();
        for i in 0..n {
            let Some(track) = new_tracks[i] else {
                continue;
            };
            if streams[i].is_some() {
                continue;
            }
            let stream = Arc::new(ProgressiveSampleStream::new(Arc::clone(&self.shared), track));
            let Some(tracks) = self.tracks.as_mut() else {
                return Err(PeriodError::NotPrepared);
            };
            if tracks.enabled[track] {
                return Err(PeriodError::DuplicateSelection(
                    tracks.groups[track].id.clone(),
                ));
            }
            tracks.enabled[track] = true;
            tracks.streams[track] = Some(Arc::clone(&stream));
            self.enabled_track_count += 1;
            streams[i] = Some(stream);
            reset_flags[i] = true;
            if !seek_required {
                let queue = &queues[track];
                seek_required = queue.read_index() != 0 && !queue.seek_to(position_us, true);
            }
        }

        if self.enabled_track_count == 0 {
            self.pending_deferred_retry = false;
            self.notify_discontinuity = false;
            if self.loader.is_loading() {
                for queue in &queues {
                    queue.discard_to_end();
                }
                self.cancel_load();
            }
            for queue in &queues {
                queue.reset();
            }
        } else if seek_required {
            position_us = self.seek_to_us(position_us)?;
            for (flag, stream) in reset_flags.iter_mut().zip(streams.iter()) {
                if stream.is_some() {
                    *flag = true;
                }
            }
        }
        self.seen_first_track_selection = true;
        trace!(
            period = %self.id,
            enabled = self.enabled_track_count,
            position_us,
            seek_required,
            "tracks selected"
        );
        self.sync_shared();
        Ok(position_us)
    }

    fn discard_buffer(&mut self, position_us: i64, to_key_frame: bool) {
        if self.is_pending_reset() {
            return;
        }
        let Some(tracks) = &self.tracks else {
            return;
        };
        for (i, queue) in self.queues().iter().enumerate() {
            queue.discard_to(position_us, to_key_frame, tracks.enabled[i]);
        }
    }

    fn read_discontinuity(&mut self) -> PeriodResult<Option<i64>> {
        if self.notify_discontinuity
            && (self.loading_finished
                || self.extracted_samples_count() > self.extracted_samples_at_start)
        {
            self.notify_discontinuity = false;
            self.sync_shared();
            return Ok(Some(self.last_seek_position_us));
        }
        Ok(None)
    }

    fn seek_to_us(&mut self, position_us: i64) -> PeriodResult<i64> {
        if self.released {
            return Err(PeriodError::Released);
        }
        if !self.prepared {
            return Err(PeriodError::NotPrepared);
        }
        let position_us = if self.seek_map.as_ref().is_some_and(SeekMap::is_seekable) {
            position_us
        } else {
            0
        };
        self.notify_discontinuity = false;
        self.last_seek_position_us = position_us;

        if self.is_pending_reset() {
            self.pending_reset_position_us = Some(position_us);
            self.sync_shared();
            return Ok(position_us);
        }

        if self.data_type != DataType::MediaProgressiveLive
            && (self.loading_finished || self.loader.is_loading())
            && self.seek_inside_buffer(position_us)
        {
            trace!(period = %self.id, position_us, "seek inside buffer");
            return Ok(position_us);
        }

        debug!(period = %self.id, position_us, "seek resets loading");
        self.pending_deferred_retry = false;
        self.pending_reset_position_us = Some(position_us);
        self.loading_finished = false;
        let queues = self.queues();
        if self.loader.is_loading() {
            for queue in &queues {
                queue.discard_to_end();
            }
            self.cancel_load();
        } else {
            self.loader.clear_fatal_error();
        }
        for queue in &queues {
            queue.reset();
        }
        if self.enabled_track_count > 0 {
            self.pending_events
                .push_back(PeriodEvent::ContinueLoadingRequested);
        }
        self.sync_shared();
        Ok(position_us)
    }

    fn adjusted_seek_position_us(&self, position_us: i64, parameters: SeekParameters) -> i64 {
        let Some(seek_map) = self.seek_map.as_ref().filter(|_| self.prepared) else {
            return position_us;
        };
        if !seek_map.is_seekable() {
            return 0;
        }
        let (first, second) = seek_map.seek_points(position_us);
        parameters.resolve_seek_position_us(position_us, first.time_us, second.time_us)
    }

    fn release(&mut self) -> PeriodResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.loader.release();
        self.shared.lock().released = true;
        for queue in self.queues() {
            queue.release();
        }
        if let Some(mut loadable) = self.idle_loadable.take() {
            loadable.close();
        }
        self.pending_events.clear();
        debug!(period = %self.id, "period released");
        Ok(())
    }

    fn state(&self) -> PeriodState {
        if self.released {
            PeriodState::Released
        } else if self.maybe_throw_prepare_error().is_err() {
            PeriodState::Error
        } else if !self.prepared {
            if self.preparing {
                PeriodState::Preparing
            } else {
                PeriodState::Idle
            }
        } else if self.loading_finished {
            PeriodState::Ended
        } else if !self.seen_first_track_selection {
            PeriodState::Prepared
        } else if self.is_loading() {
            PeriodState::Loading
        } else {
            PeriodState::Buffered
        }
    }
}

impl Drop for ProgressiveMediaPeriod {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
