use crate::TrackType;

/// Description of one track's media format.
///
/// Only the fields the buffering core reads are modeled; codec specifics stay
/// with the decoders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Format {
    pub id: Option<String>,
    pub label: Option<String>,
    pub language: Option<String>,
    pub container_mime_type: Option<String>,
    pub sample_mime_type: Option<String>,
    /// Average bitrate in bits per second.
    pub bitrate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub channel_count: Option<u32>,
    pub sample_rate: Option<u32>,
}

impl Format {
    pub fn builder() -> FormatBuilder {
        FormatBuilder::default()
    }

    /// Track type derived from the sample (or container) MIME type.
    pub fn track_type(&self) -> TrackType {
        self.sample_mime_type
            .as_deref()
            .or(self.container_mime_type.as_deref())
            .map_or(TrackType::Unknown, TrackType::from_mime_type)
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct FormatBuilder {
    format: Format,
}

impl FormatBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.format.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.format.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.format.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn container_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.format.container_mime_type = Some(mime.into());
        self
    }

    #[must_use]
    pub fn sample_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.format.sample_mime_type = Some(mime.into());
        self
    }

    #[must_use]
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.format.bitrate = Some(bitrate);
        self
    }

    #[must_use]
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.format.width = Some(width);
        self.format.height = Some(height);
        self
    }

    #[must_use]
    pub fn audio(mut self, channel_count: u32, sample_rate: u32) -> Self {
        self.format.channel_count = Some(channel_count);
        self.format.sample_rate = Some(sample_rate);
        self
    }

    pub fn build(self) -> Format {
        self.format
    }
}
