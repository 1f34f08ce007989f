use std::{collections::VecDeque, sync::Arc};

use lyra_bufpool::{Allocation, Allocator};
use lyra_core::{BufferFlags, Format, ReadFlags, TIME_END_OF_SOURCE, TrackType};
use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::{DecoderInputBuffer, FormatHolder, ReadResult, TrackOutput};

#[derive(Debug)]
struct SampleInfo {
    time_us: i64,
    flags: BufferFlags,
    /// Absolute byte offset of the sample data.
    offset: u64,
    size: usize,
    format: Arc<Format>,
}

struct QueueState {
    upstream_format: Option<Arc<Format>>,
    downstream_format: Option<Arc<Format>>,
    samples: VecDeque<SampleInfo>,
    /// Absolute index of `samples[0]`.
    first_index: u64,
    /// Read position relative to `samples[0]`.
    read_position: usize,
    blocks: VecDeque<Allocation>,
    /// Absolute byte offset of the start of `blocks[0]`.
    first_block_offset: u64,
    write_offset: u64,
    largest_queued_timestamp_us: Option<i64>,
    largest_discarded_timestamp_us: Option<i64>,
    /// Samples before this time are marked decode-only.
    start_time_us: i64,
    upstream_key_frame_required: bool,
    is_last_sample_queued: bool,
    samples_written: u64,
    released: bool,
}

impl QueueState {
    fn new() -> Self {
        Self {
            upstream_format: None,
            downstream_format: None,
            samples: VecDeque::new(),
            first_index: 0,
            read_position: 0,
            blocks: VecDeque::new(),
            first_block_offset: 0,
            write_offset: 0,
            largest_queued_timestamp_us: None,
            largest_discarded_timestamp_us: None,
            start_time_us: i64::MIN,
            upstream_key_frame_required: true,
            is_last_sample_queued: false,
            samples_written: 0,
            released: false,
        }
    }

    fn has_next_sample(&self) -> bool {
        self.read_position < self.samples.len()
    }

    fn append(&mut self, allocator: &Allocator, mut data: &[u8]) -> u64 {
        let start = self.write_offset;
        let block_len = allocator.individual_allocation_length();
        while !data.is_empty() {
            let used = (self.write_offset - self.first_block_offset) as usize;
            if used == self.blocks.len() * block_len {
                self.blocks.push_back(allocator.allocate());
            }
            let (index, in_block) = (used / block_len, used % block_len);
            let n = (block_len - in_block).min(data.len());
            self.blocks[index][in_block..in_block + n].copy_from_slice(&data[..n]);
            self.write_offset += n as u64;
            data = &data[n..];
        }
        start
    }

    fn copy_out(&self, block_len: usize, offset: u64, size: usize, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(size);
        let mut position = offset;
        while out.len() < size {
            let relative = (position - self.first_block_offset) as usize;
            let (index, in_block) = (relative / block_len, relative % block_len);
            let n = (block_len - in_block).min(size - out.len());
            out.extend_from_slice(&self.blocks[index][in_block..in_block + n]);
            position += n as u64;
        }
    }

    /// Index (from `start`) of the last sample at or before `time_us`, looking
    /// at `length` samples and stopping at the first later one.
    fn find_sample_before(
        &self,
        start: usize,
        length: usize,
        time_us: i64,
        key_frame: bool,
    ) -> Option<usize> {
        let mut found = None;
        for (i, sample) in self.samples.range(start..start + length).enumerate() {
            if sample.time_us > time_us {
                break;
            }
            if !key_frame || sample.flags.is_key_frame() {
                found = Some(i);
                if sample.time_us == time_us {
                    break;
                }
            }
        }
        found
    }

    /// Drop `count` samples from the front and return the blocks no sample
    /// refers to any more.
    fn discard_samples(&mut self, count: usize, block_len: usize) -> Vec<Allocation> {
        for sample in self.samples.drain(..count) {
            self.largest_discarded_timestamp_us = Some(
                self.largest_discarded_timestamp_us
                    .map_or(sample.time_us, |t| t.max(sample.time_us)),
            );
        }
        self.first_index += count as u64;
        self.read_position = self.read_position.saturating_sub(count);
        let retained_from = self
            .samples
            .front()
            .map_or(self.write_offset, |sample| sample.offset);
        let mut freed = Vec::new();
        while !self.blocks.is_empty() && self.first_block_offset + block_len as u64 <= retained_from
        {
            if let Some(block) = self.blocks.pop_front() {
                freed.push(block);
            }
            self.first_block_offset += block_len as u64;
        }
        freed
    }

    fn reset(&mut self) -> Vec<Allocation> {
        self.samples.clear();
        self.read_position = 0;
        self.first_block_offset = 0;
        self.write_offset = 0;
        self.largest_queued_timestamp_us = None;
        self.largest_discarded_timestamp_us = None;
        self.upstream_key_frame_required = true;
        self.is_last_sample_queued = false;
        self.blocks.drain(..).collect()
    }
}

/// Queue of samples for one track, with sample data held in allocator blocks.
///
/// Written by the loading thread through [`TrackOutput`], read by sample
/// streams on the control thread.
pub struct SampleQueue {
    id: u32,
    track_type: TrackType,
    allocator: Allocator,
    state: Mutex<QueueState>,
}

impl SampleQueue {
    pub fn new(id: u32, track_type: TrackType, allocator: Allocator) -> Self {
        Self {
            id,
            track_type,
            allocator,
            state: Mutex::new(QueueState::new()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn track_type(&self) -> TrackType {
        self.track_type
    }

    pub fn upstream_format(&self) -> Option<Format> {
        self.state.lock().upstream_format.as_deref().cloned()
    }

    pub fn largest_queued_timestamp_us(&self) -> Option<i64> {
        self.state.lock().largest_queued_timestamp_us
    }

    pub fn is_last_sample_queued(&self) -> bool {
        self.state.lock().is_last_sample_queued
    }

    /// Absolute index of the next sample to read.
    pub fn read_index(&self) -> u64 {
        let state = self.state.lock();
        state.first_index + state.read_position as u64
    }

    /// Samples currently held.
    pub fn len(&self) -> usize {
        self.state.lock().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Samples accepted since creation, across resets.
    pub fn samples_written(&self) -> u64 {
        self.state.lock().samples_written
    }

    pub fn set_start_time_us(&self, start_time_us: i64) {
        self.state.lock().start_time_us = start_time_us;
    }

    pub fn is_ready(&self, loading_finished: bool) -> bool {
        let state = self.state.lock();
        if state.has_next_sample() {
            return true;
        }
        loading_finished
            || state.is_last_sample_queued
            || state
                .upstream_format
                .as_ref()
                .is_some_and(|up| state.downstream_format.as_ref() != Some(up))
    }

    pub fn read(
        &self,
        holder: &mut FormatHolder,
        buffer: &mut DecoderInputBuffer,
        flags: ReadFlags,
        loading_finished: bool,
    ) -> ReadResult {
        let mut state = self.state.lock();
        let require_format = flags.contains(ReadFlags::REQUIRE_FORMAT);

        let Some(sample) = state.samples.get(state.read_position) else {
            if loading_finished || state.is_last_sample_queued {
                buffer.clear();
                buffer.flags = BufferFlags::END_OF_STREAM;
                buffer.time_us = TIME_END_OF_SOURCE;
                return ReadResult::BufferRead;
            }
            if let Some(up) = state.upstream_format.clone()
                && (require_format || state.downstream_format.as_ref() != Some(&up))
            {
                holder.format = Some((*up).clone());
                state.downstream_format = Some(up);
                return ReadResult::FormatRead;
            }
            return ReadResult::NothingRead;
        };

        if require_format || state.downstream_format.as_ref() != Some(&sample.format) {
            let format = Arc::clone(&sample.format);
            holder.format = Some((*format).clone());
            state.downstream_format = Some(format);
            return ReadResult::FormatRead;
        }

        buffer.time_us = sample.time_us;
        buffer.flags = sample.flags;
        if sample.time_us < state.start_time_us {
            buffer.flags |= BufferFlags::DECODE_ONLY;
        }
        if flags.contains(ReadFlags::OMIT_SAMPLE_DATA) {
            buffer.data.clear();
        } else {
            let (offset, size) = (sample.offset, sample.size);
            state.copy_out(
                self.allocator.individual_allocation_length(),
                offset,
                size,
                &mut buffer.data,
            );
        }
        if !flags.contains(ReadFlags::PEEK) {
            state.read_position += 1;
        }
        ReadResult::BufferRead
    }

    /// Move the read position to the key frame at or before `time_us`.
    ///
    /// Fails when `time_us` is before the first sample, or after the last one
    /// unless `allow_time_beyond_buffer`.
    pub fn seek_to(&self, time_us: i64, allow_time_beyond_buffer: bool) -> bool {
        let mut state = self.state.lock();
        state.read_position = 0;
        let Some(first) = state.samples.front() else {
            return false;
        };
        let beyond = state
            .largest_queued_timestamp_us
            .is_some_and(|largest| time_us > largest);
        if time_us < first.time_us || (beyond && !allow_time_beyond_buffer) {
            return false;
        }
        let length = state.samples.len();
        let Some(index) = state.find_sample_before(0, length, time_us, true) else {
            return false;
        };
        state.read_position = index;
        state.start_time_us = time_us;
        true
    }

    /// Advance the read position to the key frame at or before `time_us`, or to
    /// the end when `time_us` is past the buffer and `allow_end_of_queue`.
    pub fn skip_to(&self, time_us: i64, allow_end_of_queue: bool) -> usize {
        let mut state = self.state.lock();
        let Some(next) = state.samples.get(state.read_position) else {
            return 0;
        };
        if time_us < next.time_us {
            return 0;
        }
        let remaining = state.samples.len() - state.read_position;
        let past_end = state
            .largest_queued_timestamp_us
            .is_some_and(|largest| time_us > largest);
        let count = if past_end && allow_end_of_queue {
            remaining
        } else {
            let start = state.read_position;
            state
                .find_sample_before(start, remaining, time_us, true)
                .unwrap_or(0)
        };
        state.read_position += count;
        count
    }

    /// Discard samples before `time_us` (before the preceding key frame when
    /// `to_key_frame`), never past the read position if `stop_at_read_position`.
    pub fn discard_to(&self, time_us: i64, to_key_frame: bool, stop_at_read_position: bool) {
        let freed = {
            let mut state = self.state.lock();
            let Some(first) = state.samples.front() else {
                return;
            };
            if time_us < first.time_us {
                return;
            }
            let length = state.samples.len();
            let search_length = if stop_at_read_position && state.read_position != length {
                state.read_position + 1
            } else {
                length
            };
            let Some(count) = state.find_sample_before(0, search_length, time_us, to_key_frame)
            else {
                return;
            };
            state.discard_samples(count, self.allocator.individual_allocation_length())
        };
        self.release_blocks(freed);
    }

    /// Discard every queued sample, read or not.
    pub fn discard_to_end(&self) {
        let freed = {
            let mut state = self.state.lock();
            let count = state.samples.len();
            state.discard_samples(count, self.allocator.individual_allocation_length())
        };
        self.release_blocks(freed);
    }

    /// Drop all samples and data. The upstream format is kept.
    pub fn reset(&self) {
        let freed = self.state.lock().reset();
        self.release_blocks(freed);
    }

    /// Reset and refuse further samples.
    pub fn release(&self) {
        let freed = {
            let mut state = self.state.lock();
            state.released = true;
            state.reset()
        };
        self.release_blocks(freed);
    }

    fn release_blocks(&self, freed: Vec<Allocation>) {
        if freed.is_empty() {
            return;
        }
        trace!(track = self.id, blocks = freed.len(), "sample data released");
        self.allocator.release_run(freed);
    }
}

impl TrackOutput for SampleQueue {
    fn format(&self, format: Format) {
        let mut state = self.state.lock();
        if state.upstream_format.as_deref() != Some(&format) {
            state.upstream_format = Some(Arc::new(format));
        }
    }

    fn sample(&self, time_us: i64, flags: BufferFlags, data: &[u8]) {
        let mut state = self.state.lock();
        if state.released {
            return;
        }
        if state.upstream_key_frame_required {
            if !flags.is_key_frame() {
                return;
            }
            state.upstream_key_frame_required = false;
        }
        let Some(format) = state.upstream_format.clone() else {
            warn!(track = self.id, time_us, "sample before format, dropped");
            return;
        };
        let offset = state.append(&self.allocator, data);
        state.samples.push_back(SampleInfo {
            time_us,
            flags,
            offset,
            size: data.len(),
            format,
        });
        state.largest_queued_timestamp_us = Some(
            state
                .largest_queued_timestamp_us
                .map_or(time_us, |t| t.max(time_us)),
        );
        if flags.contains(BufferFlags::LAST_SAMPLE) {
            state.is_last_sample_queued = true;
        }
        state.samples_written += 1;
    }
}

impl std::fmt::Debug for SampleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SampleQueue")
            .field("id", &self.id)
            .field("track_type", &self.track_type)
            .field("samples", &state.samples.len())
            .field("read_position", &state.read_position)
            .field("blocks", &state.blocks.len())
            .finish()
    }
}
