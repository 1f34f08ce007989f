use bitflags::bitflags;

bitflags! {
    /// Per-sample flags carried from the extractor to the decoder.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u32 {
        /// Sample is a sync point.
        const KEY_FRAME = 0b0000_0001;
        /// Buffer signals the end of the stream and holds no data.
        const END_OF_STREAM = 0b0000_0100;
        /// Last sample of the stream.
        const LAST_SAMPLE = 0b0010_0000;
        /// Sample must be decoded but not rendered (before the seek target).
        const DECODE_ONLY = 0b1000_0000_0000_0000_0000_0000_0000_0000;
    }
}

bitflags! {
    /// Flags controlling `SampleStream::read_data`.
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ReadFlags: u32 {
        /// Report the current format even if it was already read.
        const REQUIRE_FORMAT = 0b001;
        /// Read without advancing the read position.
        const PEEK = 0b010;
        /// Skip copying sample bytes.
        const OMIT_SAMPLE_DATA = 0b100;
    }
}

impl BufferFlags {
    pub fn is_key_frame(self) -> bool {
        self.contains(Self::KEY_FRAME)
    }

    pub fn is_end_of_stream(self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}
