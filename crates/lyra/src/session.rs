use std::sync::Arc;

use lyra_bufpool::Allocator;
use lyra_control::{DefaultLoadControl, LoadControl};
use lyra_core::MediaPeriodId;
use lyra_events::{Event, EventBus};
use lyra_net::{DefaultLoadErrorHandlingPolicy, LoadErrorHandlingPolicy};
use lyra_source::{
    ExtractorFactory, MediaPeriod, MergingMediaPeriod, PeriodContext, ProgressiveMediaPeriod,
    SourceInfoListener,
};
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

use crate::{SessionConfig, SessionResult};

/// Collaborators shared by all periods of one playback.
///
/// The allocator is the one owned by the load control, so byte targets set on
/// track selection apply to the pool the periods allocate from.
pub struct Session {
    config: SessionConfig,
    policy: Arc<dyn LoadErrorHandlingPolicy>,
    load_control: Box<dyn LoadControl>,
    events: EventBus,
}

impl Session {
    /// # Errors
    ///
    /// Fails on inconsistent buffering thresholds.
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        config.validate()?;
        let allocator = Allocator::new(config.allocator.clone());
        let load_control = DefaultLoadControl::new(config.load_control.clone(), allocator)?;
        let policy = Arc::new(DefaultLoadErrorHandlingPolicy::new(
            config.load_error_policy.clone(),
        ));
        let events = EventBus::new(config.event_channel_capacity);
        debug!(
            block_len = config.allocator.individual_allocation_length,
            min_buffer_ms = config.load_control.min_buffer_ms,
            max_buffer_ms = config.load_control.max_buffer_ms,
            "session created"
        );
        Ok(Self {
            config,
            policy,
            load_control: Box::new(load_control),
            events,
        })
    }

    /// Replace the load error policy for periods created afterwards.
    pub fn with_policy(mut self, policy: Arc<dyn LoadErrorHandlingPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the load control. Periods created afterwards allocate from
    /// its pool.
    pub fn with_load_control(mut self, load_control: Box<dyn LoadControl>) -> Self {
        self.load_control = load_control;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn allocator(&self) -> &Allocator {
        self.load_control.allocator()
    }

    pub fn load_control(&self) -> &dyn LoadControl {
        self.load_control.as_ref()
    }

    pub fn load_control_mut(&mut self) -> &mut dyn LoadControl {
        self.load_control.as_mut()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn period_context(&self) -> PeriodContext {
        PeriodContext::new(
            self.allocator().clone(),
            Arc::clone(&self.policy),
            self.events.clone(),
        )
    }

    /// Period loading `uri` with the session's period options.
    pub fn progressive_period(
        &self,
        id: MediaPeriodId,
        uri: Url,
        factory: Arc<dyn ExtractorFactory>,
        listener: Arc<dyn SourceInfoListener>,
    ) -> ProgressiveMediaPeriod {
        debug!(period = ?id.period_uid, %uri, "creating progressive period");
        ProgressiveMediaPeriod::new(
            id,
            uri,
            factory,
            self.period_context(),
            listener,
            self.config.period.clone(),
        )
    }

    /// Period playing `children` in parallel, each shifted by its offset.
    pub fn merging_period(
        &self,
        children: impl IntoIterator<Item = (Box<dyn MediaPeriod>, i64)>,
    ) -> MergingMediaPeriod {
        MergingMediaPeriod::new(children)
    }

    /// Release the load control and with it the pool's spare blocks.
    pub fn release(&mut self) {
        self.load_control.on_released();
        debug!("session released");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("allocator", self.allocator())
            .field("subscribers", &self.events.subscriber_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use lyra_bufpool::AllocatorOptions;
    use lyra_control::LoadControlConfig;
    use lyra_core::{PeriodUid, Timeline, TrackGroupArray, TrackSelection, TrackType};

    use super::*;
    use crate::SessionError;

    fn session() -> Session {
        Session::new(SessionConfig::default().with_allocator(AllocatorOptions {
            individual_allocation_length: 1_024,
            ..AllocatorOptions::default()
        }))
        .expect("valid config")
    }

    #[test]
    fn test_periods_share_the_session_pool() {
        let session = session();
        let ctx = session.period_context();
        let allocation = ctx.allocator.allocate();
        assert_eq!(session.allocator().total_bytes_allocated(), 1_024);
        drop(allocation);
        assert_eq!(session.allocator().total_bytes_allocated(), 0);
    }

    #[test]
    fn test_events_reach_session_subscribers() {
        let session = session();
        let mut events = session.subscribe();
        let ctx = session.period_context();
        ctx.events.publish(lyra_events::SourceEvent::Prepared {
            period_id: MediaPeriodId::new(PeriodUid(1)),
        });
        assert!(events.try_recv().is_ok());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let config = SessionConfig::default().with_load_control(LoadControlConfig {
            min_buffer_ms: 1_000,
            buffer_for_playback_ms: 2_000,
            ..LoadControlConfig::default()
        });
        assert!(matches!(
            Session::new(config),
            Err(SessionError::LoadControl(_))
        ));
    }

    #[test]
    fn test_release_drops_spare_blocks() {
        let mut session = session();
        let blocks: Vec<_> = (0..4).map(|_| session.allocator().allocate()).collect();
        drop(blocks);
        assert_eq!(session.allocator().spare_count(), 4);

        session.load_control_mut().on_prepared();
        session.load_control_mut().on_tracks_selected(
            &Timeline::empty(),
            &MediaPeriodId::new(PeriodUid(2)),
            &[TrackType::Audio],
            &TrackGroupArray::empty(),
            &[None::<TrackSelection>],
        );
        assert_eq!(session.allocator().spare_count(), 4);
        session.release();
        assert_eq!(session.allocator().spare_count(), 0);
    }
}
