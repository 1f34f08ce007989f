use std::sync::Arc;

use lyra_core::{BufferFlags, Format, ReadFlags};

use crate::PeriodResult;

/// Receives the format when `read_data` reports a format change.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormatHolder {
    pub format: Option<Format>,
}

/// Receives one sample from `read_data`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecoderInputBuffer {
    pub time_us: i64,
    pub flags: BufferFlags,
    pub data: Vec<u8>,
}

impl DecoderInputBuffer {
    pub fn clear(&mut self) {
        self.time_us = 0;
        self.flags = BufferFlags::empty();
        self.data.clear();
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.is_end_of_stream()
    }
}

/// Outcome of [`SampleStream::read_data`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadResult {
    /// The holder received a new format.
    FormatRead,
    /// The buffer received a sample or the end-of-stream marker.
    BufferRead,
    NothingRead,
}

/// Per-selected-track channel of samples handed to a renderer.
///
/// Streams are shared as [`SharedSampleStream`]; a period recognizes its own
/// streams by pointer identity.
pub trait SampleStream: Send + Sync {
    /// Whether `read_data` would return something other than `NothingRead`.
    fn is_ready(&self) -> bool;

    /// # Errors
    ///
    /// Returns the load error that stopped this stream's source.
    fn maybe_throw_error(&self) -> PeriodResult<()>;

    fn read_data(
        &self,
        holder: &mut FormatHolder,
        buffer: &mut DecoderInputBuffer,
        flags: ReadFlags,
    ) -> ReadResult;

    /// Skip samples up to the key frame at or before `position_us`. Returns the
    /// number skipped.
    fn skip_data(&self, position_us: i64) -> usize;
}

pub type SharedSampleStream = Arc<dyn SampleStream>;

/// Whether `a` and `b` point at the same stream object.
pub fn same_stream<T: ?Sized>(a: &SharedSampleStream, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
