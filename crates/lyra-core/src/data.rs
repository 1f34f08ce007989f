use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Format, TrackType};

/// What a load is fetching. Drives per-type retry budgets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    #[default]
    Unknown,
    Media,
    MediaInitialization,
    Drm,
    Manifest,
    TimeSynchronization,
    Ad,
    /// Progressive media whose length is unknown because it is live.
    MediaProgressiveLive,
}

/// Region of a resource to load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSpec {
    pub uri: Url,
    /// Byte offset to start from.
    pub position: u64,
    /// Bytes to read, or `None` to read to the end.
    pub length: Option<u64>,
    /// Cache key override.
    pub key: Option<String>,
}

impl DataSpec {
    pub fn new(uri: Url) -> Self {
        Self {
            uri,
            position: 0,
            length: None,
            key: None,
        }
    }

    #[must_use]
    pub fn at_position(&self, position: u64) -> Self {
        Self {
            position,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_length(mut self, length: Option<u64>) -> Self {
        self.length = length;
        self
    }
}

static NEXT_LOAD_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Metadata of one load attempt, reported with every load event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadEventInfo {
    /// Unique for the load task; kept across retries of the same task.
    pub load_task_id: u64,
    pub data_spec: DataSpec,
    /// Uri after redirects.
    pub uri: Url,
    /// Time spent in the current attempt.
    pub load_duration: Duration,
    pub bytes_loaded: u64,
}

impl LoadEventInfo {
    pub fn next_task_id() -> u64 {
        NEXT_LOAD_TASK_ID.fetch_add(1, Ordering::Relaxed)
    }

    pub fn new(load_task_id: u64, data_spec: DataSpec) -> Self {
        let uri = data_spec.uri.clone();
        Self {
            load_task_id,
            data_spec,
            uri,
            load_duration: Duration::ZERO,
            bytes_loaded: 0,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, load_duration: Duration, bytes_loaded: u64) -> Self {
        self.load_duration = load_duration;
        self.bytes_loaded = bytes_loaded;
        self
    }
}

/// Media-level description of what a load carries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaLoadData {
    pub data_type: DataType,
    pub track_type: Option<TrackType>,
    pub track_format: Option<Format>,
    pub media_start_time_us: Option<i64>,
    pub media_end_time_us: Option<i64>,
}

impl MediaLoadData {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_media_times(mut self, start_us: Option<i64>, end_us: Option<i64>) -> Self {
        self.media_start_time_us = start_us;
        self.media_end_time_us = end_us;
        self
    }
}
