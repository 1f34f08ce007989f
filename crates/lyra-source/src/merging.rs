use std::{collections::VecDeque, sync::Arc};

use lyra_core::{TIME_END_OF_SOURCE, TrackGroup, TrackGroupArray, TrackSelection};
use tracing::{debug, warn};

use crate::{
    CompositeSequenceableLoader, MediaPeriod, PeriodError, PeriodEvent, PeriodResult,
    PeriodState, SeekParameters, SequenceableLoader, SharedSampleStream, TimeOffsetMediaPeriod,
    same_stream,
};

/// One child's part of a `select_tracks` call, kept for rollback.
struct SelectedChild {
    index: usize,
    selections: Vec<Option<TrackSelection>>,
    /// Streams the child returned.
    streams: Vec<Option<SharedSampleStream>>,
    /// Streams handed to the child.
    previous: Vec<Option<SharedSampleStream>>,
}

/// Merges several child periods that play in parallel into one period.
///
/// Track groups are concatenated in child order with ids prefixed by the
/// child index. Selections are routed to the child owning their group.
pub struct MergingMediaPeriod {
    children: Vec<Box<dyn MediaPeriod>>,
    child_prepared: Vec<bool>,
    prepare_reported: bool,
    track_groups: TrackGroupArray,
    /// Owning child and child group of every merged group, by merged index.
    child_groups: Vec<(usize, Arc<TrackGroup>)>,
    /// Which child produced each stream handed out.
    stream_children: Vec<(SharedSampleStream, usize)>,
    enabled: CompositeSequenceableLoader,
    pending_events: VecDeque<PeriodEvent>,
}

impl MergingMediaPeriod {
    /// Children with a non-zero time offset are wrapped so their positions
    /// line up with the others.
    pub fn new(children: impl IntoIterator<Item = (Box<dyn MediaPeriod>, i64)>) -> Self {
        let children: Vec<Box<dyn MediaPeriod>> = children
            .into_iter()
            .map(|(child, offset_us)| {
                if offset_us == 0 {
                    child
                } else {
                    Box::new(TimeOffsetMediaPeriod::new(child, offset_us)) as Box<dyn MediaPeriod>
                }
            })
            .collect();
        Self {
            child_prepared: vec![false; children.len()],
            children,
            prepare_reported: false,
            track_groups: TrackGroupArray::empty(),
            child_groups: Vec::new(),
            stream_children: Vec::new(),
            enabled: CompositeSequenceableLoader::default(),
            pending_events: VecDeque::new(),
        }
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn child(&self, index: usize) -> Option<&dyn MediaPeriod> {
        self.children.get(index).map(|child| &**child)
    }

    fn is_prepared(&self) -> bool {
        self.prepare_reported
    }

    fn on_all_children_prepared(&mut self) {
        let mut groups = Vec::new();
        self.child_groups.clear();
        for (index, child) in self.children.iter().enumerate() {
            for group in child.track_groups().iter() {
                groups.push(Arc::new(group.copy_with_id(format!("{index}:{}", group.id))));
                self.child_groups.push((index, Arc::clone(group)));
            }
        }
        self.track_groups = TrackGroupArray::from_shared(groups);
        self.prepare_reported = true;
        debug!(
            children = self.children.len(),
            groups = self.track_groups.len(),
            "merged period prepared"
        );
        self.pending_events.push_back(PeriodEvent::Prepared);
    }

    /// Merged group index for each selection: the same instance if exposed,
    /// otherwise the first value-equal group not claimed by an earlier slot.
    fn route(&self, selections: &[Option<TrackSelection>]) -> PeriodResult<Vec<Option<usize>>> {
        let mut claimed = vec![false; self.track_groups.len()];
        let mut routes = Vec::with_capacity(selections.len());
        for selection in selections {
            let Some(selection) = selection else {
                routes.push(None);
                continue;
            };
            let group = selection.track_group();
            let index = self.track_groups.index_of_instance(group).or_else(|| {
                self.track_groups
                    .iter()
                    .enumerate()
                    .position(|(i, g)| !claimed[i] && **g == **group)
            });
            let Some(index) = index else {
                return Err(PeriodError::UnknownTrackGroup(group.id.clone()));
            };
            if claimed[index] {
                return Err(PeriodError::DuplicateSelection(group.id.clone()));
            }
            claimed[index] = true;
            routes.push(Some(index));
        }
        Ok(routes)
    }

    /// Undo the selections of children already updated by a failed
    /// `select_tracks`: streams they created are disabled, retained ones kept.
    fn roll_back(&mut self, selected: Vec<SelectedChild>, position_us: i64) {
        for child in selected {
            let keep: Vec<Option<TrackSelection>> = child
                .selections
                .into_iter()
                .zip(child.streams.iter().zip(&child.previous))
                .map(|(selection, pair)| match pair {
                    (Some(stream), Some(previous)) if same_stream(stream, previous) => selection,
                    _ => None,
                })
                .collect();
            let mut streams = child.streams;
            let n = keep.len();
            if let Err(error) = self.children[child.index].select_tracks(
                &keep,
                &vec![true; n],
                &mut streams,
                &mut vec![false; n],
                position_us,
            ) {
                warn!(child = child.index, %error, "rolling back child selection failed");
            }
        }
    }

    fn stream_child(&self, stream: &SharedSampleStream) -> Option<usize> {
        self.stream_children
            .iter()
            .find(|(s, _)| same_stream(stream, s))
            .map(|(_, child)| *child)
    }
}

impl SequenceableLoader for MergingMediaPeriod {
    fn buffered_position_us(&self) -> i64 {
        self.enabled.buffered_position_us(&self.children)
    }

    fn next_load_position_us(&self) -> i64 {
        self.enabled.next_load_position_us(&self.children)
    }

    fn continue_loading(&mut self, position_us: i64) -> bool {
        if !self.is_prepared() {
            for child in &mut self.children {
                child.continue_loading(position_us);
            }
            return false;
        }
        self.enabled.continue_loading(&mut self.children, position_us)
    }

    fn is_loading(&self) -> bool {
        self.enabled.is_loading(&self.children)
    }

    fn reevaluate_buffer(&mut self, position_us: i64) {
        self.enabled.reevaluate_buffer(&mut self.children, position_us);
    }
}

impl MediaPeriod for MergingMediaPeriod {
    fn prepare(&mut self, position_us: i64) {
        for child in &mut self.children {
            child.prepare(position_us);
        }
    }

    fn poll(&mut self) -> Option<PeriodEvent> {
        let mut continue_requested = false;
        for (index, child) in self.children.iter_mut().enumerate() {
            while let Some(event) = child.poll() {
                match event {
                    PeriodEvent::Prepared => self.child_prepared[index] = true,
                    PeriodEvent::ContinueLoadingRequested => continue_requested = true,
                }
            }
        }
        if !self.prepare_reported && self.child_prepared.iter().all(|&p| p) {
            self.on_all_children_prepared();
        }
        if continue_requested
            && self.pending_events.back() != Some(&PeriodEvent::ContinueLoadingRequested)
        {
            self.pending_events
                .push_back(PeriodEvent::ContinueLoadingRequested);
        }
        self.pending_events.pop_front()
    }

    fn maybe_throw_prepare_error(&self) -> PeriodResult<()> {
        for (child, prepared) in self.children.iter().zip(&self.child_prepared) {
            if !prepared {
                child.maybe_throw_prepare_error()?;
            }
        }
        Ok(())
    }

    fn track_groups(&self) -> &TrackGroupArray {
        &self.track_groups
    }

    fn select_tracks(
        &mut self,
        selections: &[Option<TrackSelection>],
        may_retain: &[bool],
        streams: &mut [Option<SharedSampleStream>],
        reset_flags: &mut [bool],
        mut position_us: i64,
    ) -> PeriodResult<i64> {
        if !self.is_prepared() {
            return Err(PeriodError::NotPrepared);
        }
        let n = selections.len();
        if may_retain.len() != n || streams.len() != n || reset_flags.len() != n {
            return Err(PeriodError::LengthMismatch);
        }
        let routes = self.route(selections)?;
        let stream_children: Vec<Option<usize>> = streams
            .iter()
            .map(|s| s.as_ref().and_then(|s| self.stream_child(s)))
            .collect();
        let selection_children: Vec<Option<usize>> = routes
            .iter()
            .map(|route| route.map(|index| self.child_groups[index].0))
            .collect();

        let mut new_streams: Vec<Option<SharedSampleStream>> = vec![None; n];
        let mut new_stream_children = Vec::new();
        let mut enabled_children = Vec::new();
        let mut selected = Vec::new();
        for child_index in 0..self.children.len() {
            let mut child_streams: Vec<Option<SharedSampleStream>> = (0..n)
                .map(|j| {
                    (stream_children[j] == Some(child_index))
                        .then(|| streams[j].clone())
                        .flatten()
                })
                .collect();
            let child_selections: Vec<Option<TrackSelection>> = (0..n)
                .map(|j| match (routes[j], &selections[j]) {
                    (Some(index), Some(selection)) if self.child_groups[index].0 == child_index => {
                        Some(selection.with_group(Arc::clone(&self.child_groups[index].1)))
                    }
                    _ => None,
                })
                .collect();

            let previous = child_streams.clone();
            let result = self.children[child_index].select_tracks(
                &child_selections,
                may_retain,
                &mut child_streams,
                reset_flags,
                position_us,
            );
            let child_position_us = match result {
                Ok(child_position_us) => child_position_us,
                Err(error) => {
                    self.roll_back(selected, position_us);
                    return Err(error);
                }
            };
            selected.push(SelectedChild {
                index: child_index,
                selections: child_selections,
                streams: child_streams.clone(),
                previous,
            });
            if child_index == 0 {
                position_us = child_position_us;
            } else if child_position_us != position_us {
                let expected = position_us;
                self.roll_back(selected, expected);
                return Err(PeriodError::PositionMismatch {
                    expected,
                    actual: child_position_us,
                });
            }

            let mut child_enabled = false;
            for j in 0..n {
                if selection_children[j] == Some(child_index) {
                    let Some(stream) = child_streams[j].take() else {
                        self.roll_back(selected, position_us);
                        return Err(PeriodError::MissingStream(j));
                    };
                    new_stream_children.push((Arc::clone(&stream), child_index));
                    new_streams[j] = Some(stream);
                    child_enabled = true;
                }
            }
            if child_enabled {
                enabled_children.push(child_index);
            }
        }

        for j in 0..n {
            if let (Some(new), Some(old)) = (&new_streams[j], &streams[j])
                && same_stream(new, old)
            {
                reset_flags[j] = false;
            }
        }
        streams.clone_from_slice(&new_streams);
        self.stream_children = new_stream_children;
        self.enabled = CompositeSequenceableLoader::new(enabled_children);
        Ok(position_us)
    }

    fn discard_buffer(&mut self, position_us: i64, to_key_frame: bool) {
        for &index in self.enabled.indices() {
            self.children[index].discard_buffer(position_us, to_key_frame);
        }
    }

    fn read_discontinuity(&mut self) -> PeriodResult<Option<i64>> {
        let mut discontinuity_us: Option<i64> = None;
        let enabled = self.enabled.indices().to_vec();
        for (position, &index) in enabled.iter().enumerate() {
            let child_discontinuity = self.children[index].read_discontinuity()?;
            match (child_discontinuity, discontinuity_us) {
                (Some(expected), None) => {
                    discontinuity_us = Some(expected);
                    // Earlier children reported none: bring them to the new position.
                    for &earlier in &enabled[..position] {
                        let actual = self.children[earlier].seek_to_us(expected)?;
                        if actual != expected {
                            return Err(PeriodError::PositionMismatch { expected, actual });
                        }
                    }
                }
                (Some(position_us), Some(expected)) if position_us != expected => {
                    return Err(PeriodError::PositionMismatch {
                        expected,
                        actual: position_us,
                    });
                }
                (None, Some(expected)) => {
                    let actual = self.children[index].seek_to_us(expected)?;
                    if actual != expected {
                        return Err(PeriodError::PositionMismatch { expected, actual });
                    }
                }
                _ => {}
            }
        }
        Ok(discontinuity_us)
    }

    fn seek_to_us(&mut self, position_us: i64) -> PeriodResult<i64> {
        let enabled = self.enabled.indices().to_vec();
        let Some((&first, rest)) = enabled.split_first() else {
            return Ok(position_us);
        };
        let position_us = self.children[first].seek_to_us(position_us)?;
        for &index in rest {
            let actual = self.children[index].seek_to_us(position_us)?;
            if actual != position_us {
                return Err(PeriodError::PositionMismatch {
                    expected: position_us,
                    actual,
                });
            }
        }
        Ok(position_us)
    }

    fn adjusted_seek_position_us(&self, position_us: i64, parameters: SeekParameters) -> i64 {
        let child = self
            .enabled
            .indices()
            .first()
            .and_then(|&index| self.children.get(index))
            .or_else(|| self.children.first());
        child.map_or(position_us, |child| {
            child.adjusted_seek_position_us(position_us, parameters)
        })
    }

    fn release(&mut self) -> PeriodResult<()> {
        let mut first_error = None;
        for (index, child) in self.children.iter_mut().enumerate() {
            if let Err(error) = child.release() {
                warn!(child = index, %error, "child period failed to release");
                first_error.get_or_insert(error);
            }
        }
        self.stream_children.clear();
        self.enabled = CompositeSequenceableLoader::default();
        self.pending_events.clear();
        first_error.map_or(Ok(()), Err)
    }

    fn state(&self) -> PeriodState {
        let states: Vec<PeriodState> = self.children.iter().map(|c| c.state()).collect();
        if states.iter().all(|&s| s == PeriodState::Released) && !states.is_empty() {
            PeriodState::Released
        } else if states.contains(&PeriodState::Error) {
            PeriodState::Error
        } else if !self.prepare_reported {
            if states.iter().all(|&s| s == PeriodState::Idle) {
                PeriodState::Idle
            } else {
                PeriodState::Preparing
            }
        } else if self.enabled.indices().is_empty() {
            PeriodState::Prepared
        } else if self.is_loading() {
            PeriodState::Loading
        } else if self.buffered_position_us() == TIME_END_OF_SOURCE {
            PeriodState::Ended
        } else {
            PeriodState::Buffered
        }
    }
}
