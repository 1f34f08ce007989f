use std::sync::Arc;

use crate::{Format, TrackGroup};

/// A selection of tracks from one group, compared by value.
///
/// Selecting the same group and tracks twice yields equal selections, so callers
/// may repeat `select_tracks` with logically unchanged arguments without
/// spurious stream resets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackSelection {
    group: Arc<TrackGroup>,
    tracks: Vec<usize>,
    selected: usize,
}

impl TrackSelection {
    /// Selection of a single fixed track.
    pub fn fixed(group: Arc<TrackGroup>, track: usize) -> Self {
        Self {
            group,
            tracks: vec![track],
            selected: 0,
        }
    }

    /// Selection of several tracks; `tracks` must not be empty.
    pub fn adaptive(group: Arc<TrackGroup>, tracks: Vec<usize>) -> Self {
        debug_assert!(!tracks.is_empty(), "adaptive selection needs tracks");
        Self {
            group,
            tracks,
            selected: 0,
        }
    }

    pub fn track_group(&self) -> &Arc<TrackGroup> {
        &self.group
    }

    pub fn tracks(&self) -> &[usize] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Index within the group of the currently selected track.
    pub fn selected_index_in_track_group(&self) -> usize {
        self.tracks.get(self.selected).copied().unwrap_or_default()
    }

    pub fn selected_format(&self) -> Option<&Format> {
        self.group.format(self.selected_index_in_track_group())
    }

    /// Move the selection to another of its tracks. Out-of-range indices are ignored.
    pub fn set_selected(&mut self, index: usize) {
        if index < self.tracks.len() {
            self.selected = index;
        }
    }

    /// Same tracks against another group (used when forwarding a merged
    /// selection to the child that owns the group).
    #[must_use]
    pub fn with_group(&self, group: Arc<TrackGroup>) -> Self {
        Self {
            group,
            tracks: self.tracks.clone(),
            selected: self.selected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackGroup;

    #[test]
    fn equal_content_means_equal_selection() {
        let format = Format::builder().id("1").build();
        let a = TrackSelection::fixed(Arc::new(TrackGroup::new(vec![format.clone()])), 0);
        let b = TrackSelection::fixed(Arc::new(TrackGroup::new(vec![format])), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn with_group_rebinds_group_only() {
        let group = Arc::new(TrackGroup::new(vec![
            Format::builder().id("lo").build(),
            Format::builder().id("hi").build(),
        ]));
        let mut selection = TrackSelection::adaptive(Arc::clone(&group), vec![0, 1]);
        selection.set_selected(1);
        let child = Arc::new(group.copy_with_id("child"));
        let forwarded = selection.with_group(Arc::clone(&child));
        assert_eq!(forwarded.track_group(), &child);
        assert_eq!(forwarded.selected_format().and_then(|f| f.id.as_deref()), Some("hi"));
        assert_ne!(forwarded, selection);
    }
}
