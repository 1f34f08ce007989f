use lyra_core::DataSpec;
use lyra_net::LoadResult;
use lyra_worker::{LoadContext, Loadable};
use url::Url;

use super::output::PeriodOutput;
use crate::{ExtractorFactory, MediaExtractor, ReadOutcome};

enum Pass {
    Canceled,
    Reopen,
    EndOfInput,
}

/// Reads one resource through an extractor into the period's sample queues.
pub(super) struct ExtractingLoadable {
    task_id: u64,
    uri: Url,
    cache_key: Option<String>,
    extractor: Box<dyn MediaExtractor>,
    output: PeriodOutput,
    /// Byte position the next open starts at.
    position: u64,
    /// Media time at `position`, passed to the extractor on the next open.
    pending_seek_us: Option<i64>,
    seek_time_us: i64,
    check_interval_bytes: u64,
    data_spec: DataSpec,
    bytes_loaded: u64,
}

impl ExtractingLoadable {
    pub(super) fn new(
        uri: Url,
        cache_key: Option<String>,
        extractor: Box<dyn MediaExtractor>,
        output: PeriodOutput,
        check_interval_bytes: u64,
    ) -> Self {
        let data_spec = Self::spec_for(&uri, cache_key.as_ref(), 0);
        Self {
            task_id: lyra_core::LoadEventInfo::next_task_id(),
            uri,
            cache_key,
            extractor,
            output,
            position: 0,
            pending_seek_us: None,
            seek_time_us: 0,
            check_interval_bytes: check_interval_bytes.max(1),
            data_spec,
            bytes_loaded: 0,
        }
    }

    fn spec_for(uri: &Url, cache_key: Option<&String>, position: u64) -> DataSpec {
        let mut spec = DataSpec::new(uri.clone()).at_position(position);
        spec.key = cache_key.cloned();
        spec
    }

    pub(super) fn task_id(&self) -> u64 {
        self.task_id
    }

    pub(super) fn data_spec(&self) -> &DataSpec {
        &self.data_spec
    }

    pub(super) fn bytes_loaded(&self) -> u64 {
        self.bytes_loaded
    }

    pub(super) fn seek_time_us(&self) -> i64 {
        self.seek_time_us
    }

    /// Give this loadable a fresh task id before it is started again.
    pub(super) fn renew(&mut self) {
        self.task_id = lyra_core::LoadEventInfo::next_task_id();
        self.bytes_loaded = 0;
        self.data_spec = Self::spec_for(&self.uri, self.cache_key.as_ref(), self.position);
    }

    pub(super) fn set_load_position(&mut self, position: u64, time_us: i64) {
        self.position = position;
        self.seek_time_us = time_us;
        self.pending_seek_us = Some(time_us);
        self.data_spec = Self::spec_for(&self.uri, self.cache_key.as_ref(), position);
    }

    /// Continue from the current position on another location.
    pub(super) fn switch_location(&mut self, uri: Url) {
        self.uri = uri;
    }

    /// Go back to byte 0. Reusable extractors are seeked, others recreated.
    pub(super) fn restart_from_beginning(
        &mut self,
        factory: &dyn ExtractorFactory,
    ) -> LoadResult<()> {
        if self.extractor.kind().needs_recreation() {
            self.extractor = factory.create(&self.uri)?;
            self.position = 0;
            self.seek_time_us = 0;
            self.pending_seek_us = None;
        } else {
            self.set_load_position(0, 0);
        }
        Ok(())
    }

    pub(super) fn close(&mut self) {
        self.extractor.close();
    }

    fn read_pass(&mut self, ctx: &LoadContext) -> LoadResult<Pass> {
        let mut checkpoint = self.position.saturating_add(self.check_interval_bytes);
        loop {
            if !ctx.block() {
                return Ok(Pass::Canceled);
            }
            let outcome = match self.extractor.read(&mut self.output) {
                Ok(outcome) => outcome,
                Err(error) => {
                    self.advance_to(self.extractor.input_position());
                    return Err(error);
                }
            };
            match outcome {
                ReadOutcome::Continue => {
                    self.advance_to(self.extractor.input_position());
                    if self.position > checkpoint {
                        checkpoint = self.position.saturating_add(self.check_interval_bytes);
                        ctx.pause_and_request_continue();
                    }
                }
                ReadOutcome::Seek(position) => {
                    self.position = position;
                    return Ok(Pass::Reopen);
                }
                ReadOutcome::EndOfInput => return Ok(Pass::EndOfInput),
            }
        }
    }

    fn advance_to(&mut self, position: u64) {
        self.bytes_loaded += position.saturating_sub(self.position);
        self.position = position;
    }
}

impl Loadable for ExtractingLoadable {
    fn load(&mut self, ctx: &LoadContext) -> LoadResult<()> {
        while !ctx.is_canceled() {
            self.data_spec = Self::spec_for(&self.uri, self.cache_key.as_ref(), self.position);
            if self.extractor.open(&self.data_spec)?.is_some() {
                self.output.set_length_known();
            }
            if let Some(time_us) = self.pending_seek_us.take() {
                self.extractor.seek(self.position, time_us);
            }
            let pass = self.read_pass(ctx);
            self.extractor.close();
            match pass? {
                Pass::Reopen => {}
                Pass::Canceled | Pass::EndOfInput => return Ok(()),
            }
        }
        Ok(())
    }
}
