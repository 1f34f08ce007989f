use std::sync::Arc;

use lyra_core::{ReadFlags, TIME_END_OF_SOURCE, TrackGroupArray, TrackSelection};

use crate::{
    DecoderInputBuffer, FormatHolder, MediaPeriod, PeriodEvent, PeriodResult, PeriodState,
    ReadResult, SampleStream, SeekParameters, SequenceableLoader, SharedSampleStream,
    same_stream,
};

fn shift(position_us: i64, offset_us: i64) -> i64 {
    if position_us == TIME_END_OF_SOURCE {
        position_us
    } else {
        position_us.saturating_add(offset_us)
    }
}

/// Sample stream whose sample timestamps are moved by a fixed offset.
pub struct TimeOffsetSampleStream {
    inner: SharedSampleStream,
    offset_us: i64,
}

impl TimeOffsetSampleStream {
    pub fn new(inner: SharedSampleStream, offset_us: i64) -> Self {
        Self { inner, offset_us }
    }

    pub fn inner(&self) -> &SharedSampleStream {
        &self.inner
    }
}

impl SampleStream for TimeOffsetSampleStream {
    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn maybe_throw_error(&self) -> PeriodResult<()> {
        self.inner.maybe_throw_error()
    }

    fn read_data(
        &self,
        holder: &mut FormatHolder,
        buffer: &mut DecoderInputBuffer,
        flags: ReadFlags,
    ) -> ReadResult {
        let result = self.inner.read_data(holder, buffer, flags);
        if result == ReadResult::BufferRead && !buffer.is_end_of_stream() {
            buffer.time_us = buffer.time_us.saturating_add(self.offset_us);
        }
        result
    }

    fn skip_data(&self, position_us: i64) -> usize {
        self.inner.skip_data(position_us.saturating_sub(self.offset_us))
    }
}

/// Wraps a period whose timeline is shifted against its siblings.
///
/// Positions going down are reduced by the offset, positions coming up are
/// increased by it.
pub struct TimeOffsetMediaPeriod {
    inner: Box<dyn MediaPeriod>,
    offset_us: i64,
    streams: Vec<Arc<TimeOffsetSampleStream>>,
}

impl TimeOffsetMediaPeriod {
    pub fn new(inner: Box<dyn MediaPeriod>, offset_us: i64) -> Self {
        Self {
            inner,
            offset_us,
            streams: Vec::new(),
        }
    }

    pub fn inner(&self) -> &dyn MediaPeriod {
        self.inner.as_ref()
    }

    pub fn offset_us(&self) -> i64 {
        self.offset_us
    }

    fn unwrap_stream(&self, stream: &SharedSampleStream) -> SharedSampleStream {
        self.streams
            .iter()
            .find(|wrapper| same_stream(stream, wrapper))
            .map_or_else(|| Arc::clone(stream), |wrapper| Arc::clone(&wrapper.inner))
    }
}

impl SequenceableLoader for TimeOffsetMediaPeriod {
    fn buffered_position_us(&self) -> i64 {
        shift(self.inner.buffered_position_us(), self.offset_us)
    }

    fn next_load_position_us(&self) -> i64 {
        shift(self.inner.next_load_position_us(), self.offset_us)
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        self.inner.continue_loading(position_us.saturating_sub(self.offset_us))
    }

    fn is_loading(&self) -> bool {
        self.inner.is_loading()
    }

    fn reevaluate_buffer(&mut self, position_us: i64) {
        self.inner.reevaluate_buffer(position_us.saturating_sub(self.offset_us));
    }
}

impl MediaPeriod for TimeOffsetMediaPeriod {
    fn prepare(&mut self, position_us: i64) {
        self.inner.prepare(position_us.saturating_sub(self.offset_us));
    }

    fn poll(&mut self) -> Option<PeriodEvent> {
        self.inner.poll()
    }

    fn maybe_throw_prepare_error(&self) -> PeriodResult<()> {
        self.inner.maybe_throw_prepare_error()
    }

    fn track_groups(&self) -> &TrackGroupArray {
        self.inner.track_groups()
    }

    fn select_tracks(
        &mut self,
        selections: &[Option<TrackSelection>],
        may_retain: &[bool],
        streams: &mut [Option<SharedSampleStream>],
        reset_flags: &mut [bool],
        position_us: i64,
    ) -> PeriodResult<i64> {
        let mut child_streams: Vec<Option<SharedSampleStream>> = streams
            .iter()
            .map(|s| s.as_ref().map(|s| self.unwrap_stream(s)))
            .collect();
        let start_us = self.inner.select_tracks(
            selections,
            may_retain,
            &mut child_streams,
            reset_flags,
            position_us.saturating_sub(self.offset_us),
        )?;

        let mut wrappers = Vec::with_capacity(child_streams.len());
        for (slot, child) in streams.iter_mut().zip(child_streams) {
            let Some(child) = child else {
                *slot = None;
                continue;
            };
            let kept = self
                .streams
                .iter()
                .find(|wrapper| same_stream(&child, &wrapper.inner))
                .cloned();
            let wrapper = kept
                .unwrap_or_else(|| Arc::new(TimeOffsetSampleStream::new(child, self.offset_us)));
            *slot = Some(Arc::clone(&wrapper) as SharedSampleStream);
            wrappers.push(wrapper);
        }
        self.streams = wrappers;
        Ok(start_us.saturating_add(self.offset_us))
    }

    fn discard_buffer(&mut self, position_us: i64, to_key_frame: bool) {
        self.inner
            .discard_buffer(position_us.saturating_sub(self.offset_us), to_key_frame);
    }

    fn read_discontinuity(&mut self) -> PeriodResult<Option<i64>> {
        Ok(self
            .inner
            .read_discontinuity()?
            .map(|position_us| position_us.saturating_add(self.offset_us)))
    }

    fn seek_to_us(&mut self, position_us: i64) -> PeriodResult<i64> {
        Ok(self
            .inner
            .seek_to_us(position_us.saturating_sub(self.offset_us))?
            .saturating_add(self.offset_us))
    }

    fn adjusted_seek_position_us(&self, position_us: i64, parameters: SeekParameters) -> i64 {
        self.inner
            .adjusted_seek_position_us(position_us.saturating_sub(self.offset_us), parameters)
            .saturating_add(self.offset_us)
    }

    fn release(&mut self) -> PeriodResult<()> {
        self.streams.clear();
        self.inner.release()
    }

    fn state(&self) -> PeriodState {
        self.inner.state()
    }
}

#[cfg(test)]
mod tests {
    use lyra_core::TrackSelection;

    use super::*;
    use crate::mock::{FakeMediaPeriod, FakePeriodHandle};

    fn offset_period(offset_us: i64) -> (TimeOffsetMediaPeriod, FakePeriodHandle) {
        let (period, handle) = FakeMediaPeriod::new(vec![FakeMediaPeriod::audio_group("a")], 5_000);
        handle.lock().sample_times_us = vec![456_000];
        (TimeOffsetMediaPeriod::new(Box::new(period), offset_us), handle)
    }

    fn select(
        period: &mut TimeOffsetMediaPeriod,
        streams: &mut [Option<SharedSampleStream>],
        may_retain: bool,
    ) -> i64 {
        let selection = TrackSelection::fixed(Arc::clone(&period.track_groups()[0]), 0);
        period
            .select_tracks(&[Some(selection)], &[may_retain], streams, &mut [false], 0)
            .expect("select")
    }

    #[test]
    fn test_positions_shift_both_ways() {
        let (mut period, handle) = offset_period(-3_000);
        let mut streams = vec![None];
        assert_eq!(select(&mut period, &mut streams, false), 0);
        assert_eq!(handle.lock().select_positions, vec![3_000]);
        assert_eq!(period.buffered_position_us(), 2_000);

        let stream = streams[0].clone().expect("stream");
        let mut holder = FormatHolder::default();
        let mut buffer = DecoderInputBuffer::default();
        assert_eq!(
            stream.read_data(&mut holder, &mut buffer, ReadFlags::REQUIRE_FORMAT),
            ReadResult::FormatRead
        );
        assert_eq!(
            stream.read_data(&mut holder, &mut buffer, ReadFlags::empty()),
            ReadResult::BufferRead
        );
        assert_eq!(buffer.time_us, 453_000);
    }

    #[test]
    fn test_end_of_source_is_not_shifted() {
        let (period, handle) = offset_period(1_000);
        handle.lock().buffered_position_us = TIME_END_OF_SOURCE;
        assert_eq!(period.buffered_position_us(), TIME_END_OF_SOURCE);
    }

    #[test]
    fn test_retained_stream_keeps_wrapper() {
        let (mut period, _handle) = offset_period(2_000);
        let mut streams = vec![None];
        select(&mut period, &mut streams, true);
        let first = streams[0].clone().expect("stream");
        select(&mut period, &mut streams, true);
        assert!(Arc::ptr_eq(&first, streams[0].as_ref().expect("stream")));
    }

    #[test]
    fn test_seek_and_discontinuity_shift() {
        let (mut period, handle) = offset_period(1_000);
        assert_eq!(period.seek_to_us(5_000).expect("seek"), 5_000);
        assert_eq!(handle.lock().seeks, vec![4_000]);
        handle.lock().discontinuity_us = Some(7_000);
        assert_eq!(period.read_discontinuity().expect("read"), Some(8_000));
    }

    #[test]
    fn test_extreme_offsets_saturate() {
        let (mut period, handle) = offset_period(i64::MAX);
        assert_eq!(period.buffered_position_us(), i64::MAX);
        assert_eq!(period.seek_to_us(-1_000).expect("seek"), -1);
        assert_eq!(handle.lock().seeks, vec![i64::MIN]);
    }
}
