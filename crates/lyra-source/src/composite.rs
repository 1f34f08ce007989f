use lyra_core::TIME_END_OF_SOURCE;

use crate::SequenceableLoader;

/// Coordinates a subset of [`SequenceableLoader`]s so the one furthest
/// behind loads first.
///
/// Holds the indices of its members; the loaders themselves stay with the
/// owner and are passed in on every call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositeSequenceableLoader {
    indices: Vec<usize>,
}

impl CompositeSequenceableLoader {
    pub fn new(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn members<'a, L: SequenceableLoader>(&'a self, loaders: &'a [L]) -> impl Iterator<Item = &'a L> {
        self.indices.iter().filter_map(|&i| loaders.get(i))
    }

    /// Minimum over members that are not finished; `TIME_END_OF_SOURCE` only
    /// when all are.
    pub fn buffered_position_us<L: SequenceableLoader>(&self, loaders: &[L]) -> i64 {
        min_position(self.members(loaders).map(SequenceableLoader::buffered_position_us))
    }

    pub fn next_load_position_us<L: SequenceableLoader>(&self, loaders: &[L]) -> i64 {
        min_position(self.members(loaders).map(SequenceableLoader::next_load_position_us))
    }

    pub fn is_loading<L: SequenceableLoader>(&self, loaders: &[L]) -> bool {
        self.members(loaders).any(SequenceableLoader::is_loading)
    }

    pub fn reevaluate_buffer<L: SequenceableLoader>(&self, loaders: &mut [L], position_us: i64) {
        for &i in &self.indices {
            if let Some(loader) = loaders.get_mut(i) {
                loader.reevaluate_buffer(position_us);
            }
        }
    }

    /// Continue every member at the minimum next-load position, and any member
    /// whose next load starts at or before `position_us`. Repeats while some
    /// member made progress.
    pub fn continue_loading<L: SequenceableLoader>(
        &self,
        loaders: &mut [L],
        position_us: i64,
    ) -> bool {
        let mut made_progress = false;
        loop {
            let next_load = self.next_load_position_us(loaders);
            if next_load == TIME_END_OF_SOURCE {
                break;
            }
            let mut progress_this_pass = false;
            for &i in &self.indices {
                let Some(loader) = loaders.get_mut(i) else {
                    continue;
                };
                let loader_next = loader.next_load_position_us();
                let behind_playback =
                    loader_next != TIME_END_OF_SOURCE && loader_next <= position_us;
                if loader_next == next_load || behind_playback {
                    progress_this_pass |= loader.continue_loading(position_us);
                }
            }
            made_progress |= progress_this_pass;
            if !progress_this_pass {
                break;
            }
        }
        made_progress
    }
}

fn min_position(positions: impl Iterator<Item = i64>) -> i64 {
    positions
        .filter(|&p| p != TIME_END_OF_SOURCE)
        .min()
        .unwrap_or(TIME_END_OF_SOURCE)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    /// Advances its next-load position by `step` per continue call until `end`.
    struct StepLoader {
        next: i64,
        step: i64,
        end: i64,
        calls: usize,
    }

    impl StepLoader {
        fn new(next: i64, step: i64, end: i64) -> Self {
            Self {
                next,
                step,
                end,
                calls: 0,
            }
        }
    }

    impl SequenceableLoader for StepLoader {
        fn buffered_position_us(&self) -> i64 {
            self.next_load_position_us()
        }

        fn next_load_position_us(&self) -> i64 {
            if self.next >= self.end {
                TIME_END_OF_SOURCE
            } else {
                self.next
            }
        }

        fn continue_loading(&mut self, _position_us: i64) -> bool {
            if self.next >= self.end {
                return false;
            }
            self.calls += 1;
            self.next += self.step;
            // Progress only on odd calls, so each test pass ends.
            self.calls % 2 == 1
        }

        fn is_loading(&self) -> bool {
            self.next < self.end
        }

        fn reevaluate_buffer(&mut self, _position_us: i64) {}
    }

    #[rstest]
    #[case::all_known(vec![5_000_000, 2_000_000, 7_000_000], 2_000_000)]
    #[case::one_finished(vec![TIME_END_OF_SOURCE, 3_000_000], 3_000_000)]
    #[case::all_finished(vec![TIME_END_OF_SOURCE, TIME_END_OF_SOURCE], TIME_END_OF_SOURCE)]
    fn test_min_position(#[case] positions: Vec<i64>, #[case] expected: i64) {
        assert_eq!(min_position(positions.into_iter()), expected);
    }

    #[test]
    fn test_continue_loading_prefers_furthest_behind() {
        let mut loaders = vec![
            StepLoader::new(5_000_000, 1_000_000, 10_000_000),
            StepLoader::new(2_000_000, 1_000_000, 10_000_000),
        ];
        let composite = CompositeSequenceableLoader::new(vec![0, 1]);
        assert!(composite.continue_loading(&mut loaders, 0));
        assert_eq!(loaders[0].calls, 0);
        assert_eq!(loaders[1].calls, 2);
    }

    #[test]
    fn test_continue_loading_includes_members_behind_playback() {
        let mut loaders = vec![
            StepLoader::new(5_000_000, 1_000_000, 10_000_000),
            StepLoader::new(2_000_000, 1_000_000, 10_000_000),
        ];
        let composite = CompositeSequenceableLoader::new(vec![0, 1]);
        assert!(composite.continue_loading(&mut loaders, 6_000_000));
        assert!(loaders[0].calls > 0);
    }

    #[test]
    fn test_non_members_are_ignored() {
        let mut loaders = vec![
            StepLoader::new(1_000_000, 1_000_000, 10_000_000),
            StepLoader::new(4_000_000, 1_000_000, 10_000_000),
        ];
        let composite = CompositeSequenceableLoader::new(vec![1]);
        assert_eq!(composite.buffered_position_us(&loaders), 4_000_000);
        composite.continue_loading(&mut loaders, 0);
        assert_eq!(loaders[0].calls, 0);
    }

    #[test]
    fn test_finished_members_are_noop() {
        let mut loaders = vec![StepLoader::new(1, 1, 1)];
        let composite = CompositeSequenceableLoader::new(vec![0]);
        assert!(!composite.continue_loading(&mut loaders, 0));
        assert_eq!(composite.buffered_position_us(&loaders), TIME_END_OF_SOURCE);
        assert!(!composite.is_loading(&loaders));
    }

    #[test]
    fn test_empty_composite_is_end_of_source() {
        let loaders: Vec<StepLoader> = Vec::new();
        let composite = CompositeSequenceableLoader::default();
        assert_eq!(composite.next_load_position_us(&loaders), TIME_END_OF_SOURCE);
    }
}
