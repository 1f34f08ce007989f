use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use lyra_net::{LoadError, LoadResult};
use tracing::{debug, trace, warn};

use crate::{CancelToken, LoadGate};

/// A unit of loading work run on the loader thread.
///
/// The loadable travels to the thread and comes back inside the
/// [`LoaderEvent`] that ends the load, so the control thread owns it again
/// whenever no load is running.
pub trait Loadable: Send + 'static {
    /// Load until done, canceled or failed. Long loads should check
    /// [`LoadContext::is_canceled`] regularly and block on
    /// [`LoadContext::block`] between chunks.
    fn load(&mut self, ctx: &LoadContext) -> LoadResult<()>;
}

/// What a running [`Loadable`] can see of its loader.
pub struct LoadContext {
    gate: Arc<LoadGate>,
    token: CancelToken,
    request_continue: Box<dyn Fn() + Send + Sync>,
}

impl LoadContext {
    pub fn is_canceled(&self) -> bool {
        self.token.is_canceled()
    }

    /// Wait for the gate. Returns `false` if the load was canceled.
    pub fn block(&self) -> bool {
        self.gate.block(&self.token)
    }

    /// Close the gate and ask the control thread whether to keep going.
    pub fn pause_and_request_continue(&self) {
        self.gate.close();
        (self.request_continue)();
    }
}

/// How the loader proceeds after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadErrorAction {
    Retry { delay: Duration },
    /// Retry and count this failure as the first of a new chain.
    RetryResetErrorCount { delay: Duration },
    /// Stop this load; the error is not fatal.
    DontRetry,
    /// Stop this load and surface the error from `maybe_throw_error`.
    DontRetryFatal,
}

impl LoadErrorAction {
    pub fn is_retry(self) -> bool {
        matches!(self, Self::Retry { .. } | Self::RetryResetErrorCount { .. })
    }
}

/// Messages from the loader thread to the control thread.
#[derive(Debug)]
pub enum LoaderEvent<L> {
    /// The running load closed the gate and wants `continue_loading`.
    ContinueLoadingRequested,
    Completed { loadable: L, load_duration: Duration },
    Error {
        loadable: L,
        error: LoadError,
        load_duration: Duration,
        /// Failures in the current chain including this one.
        error_count: u32,
    },
}

enum Outcome<L> {
    ContinueLoadingRequested,
    Finished {
        loadable: L,
        result: LoadResult<()>,
        canceled: bool,
        load_duration: Duration,
    },
}

struct RunningLoad {
    token: CancelToken,
    thread: JoinHandle<()>,
}

/// Runs one [`Loadable`] at a time on a dedicated thread.
///
/// All methods are called from the control thread. Results are collected with
/// [`Loader::try_next_event`]; nothing is delivered after [`Loader::release`].
pub struct Loader<L: Loadable> {
    name: String,
    gate: Arc<LoadGate>,
    tx: kanal::Sender<Outcome<L>>,
    rx: kanal::Receiver<Outcome<L>>,
    current: Option<RunningLoad>,
    error_count: u32,
    current_error: Option<LoadError>,
    fatal_error: Option<LoadError>,
    released: bool,
}

impl<L: Loadable> Loader<L> {
    /// The gate starts open.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = kanal::unbounded();
        Self {
            name: name.into(),
            gate: Arc::new(LoadGate::new(true)),
            tx,
            rx,
            current: None,
            error_count: 0,
            current_error: None,
            fatal_error: None,
            released: false,
        }
    }

    pub fn gate(&self) -> &LoadGate {
        &self.gate
    }

    pub fn is_loading(&self) -> bool {
        self.current.is_some()
    }

    pub fn has_fatal_error(&self) -> bool {
        self.fatal_error.is_some()
    }

    pub fn clear_fatal_error(&mut self) {
        self.fatal_error = None;
    }

    /// Start `loadable` on a new thread.
    ///
    /// # Errors
    ///
    /// Fails if a load is already running, the loader was released, or the
    /// thread could not be spawned.
    pub fn start_loading(&mut self, loadable: L) -> LoadResult<()> {
        self.error_count = 0;
        self.current_error = None;
        self.spawn(loadable, Duration::ZERO)
    }

    fn spawn(&mut self, mut loadable: L, delay: Duration) -> LoadResult<()> {
        if self.released {
            return Err(LoadError::UnexpectedLoader(format!("{} released", self.name)));
        }
        if self.current.is_some() {
            return Err(LoadError::UnexpectedLoader(format!("{} already loading", self.name)));
        }

        let token = CancelToken::new();
        let tx = self.tx.clone();
        let continue_tx = self.tx.clone();
        let ctx = LoadContext {
            gate: Arc::clone(&self.gate),
            token: token.clone(),
            request_continue: Box::new(move || {
                let _ = continue_tx.send(Outcome::ContinueLoadingRequested);
            }),
        };

        let thread = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let started = Instant::now();
                let result = if delay.is_zero() || ctx.token.sleep(delay) {
                    loadable.load(&ctx)
                } else {
                    Ok(())
                };
                let _ = tx.send(Outcome::Finished {
                    loadable,
                    result,
                    canceled: ctx.token.is_canceled(),
                    load_duration: started.elapsed(),
                });
            })
            .map_err(|e| LoadError::UnexpectedLoader(e.to_string()))?;

        trace!(loader = %self.name, delay_ms = delay.as_millis() as u64, "load started");
        self.current = Some(RunningLoad { token, thread });
        Ok(())
    }

    /// Next message from the loader thread, if any.
    pub fn try_next_event(&mut self) -> Option<LoaderEvent<L>> {
        if self.released {
            return None;
        }
        loop {
            let outcome = self.rx.try_recv().ok().flatten()?;
            match outcome {
                Outcome::ContinueLoadingRequested => {
                    if self.current.is_some() {
                        return Some(LoaderEvent::ContinueLoadingRequested);
                    }
                }
                Outcome::Finished {
                    loadable,
                    result,
                    canceled,
                    load_duration,
                } => {
                    self.join_current();
                    if canceled {
                        // Canceled loads are handed back by `cancel_loading`.
                        continue;
                    }
                    return Some(match result {
                        Ok(()) => {
                            self.error_count = 0;
                            self.current_error = None;
                            LoaderEvent::Completed {
                                loadable,
                                load_duration,
                            }
                        }
                        Err(error) => {
                            self.error_count += 1;
                            self.current_error = Some(error.clone());
                            LoaderEvent::Error {
                                loadable,
                                error,
                                load_duration,
                                error_count: self.error_count,
                            }
                        }
                    });
                }
            }
        }
    }

    /// Apply the decision for a failed load returned by `try_next_event`.
    ///
    /// Returns the loadable back when it is not retried.
    pub fn on_error_action(&mut self, loadable: L, action: LoadErrorAction) -> Option<L> {
        let delay = match action {
            LoadErrorAction::Retry { delay } => delay,
            LoadErrorAction::RetryResetErrorCount { delay } => {
                self.error_count = 1;
                delay
            }
            LoadErrorAction::DontRetry => {
                self.error_count = 0;
                self.current_error = None;
                return Some(loadable);
            }
            LoadErrorAction::DontRetryFatal => {
                self.fatal_error = self.current_error.take();
                return Some(loadable);
            }
        };
        if delay.is_zero() {
            // The retry starts now, so the failure is no longer current.
            self.current_error = None;
        }
        debug!(
            loader = %self.name,
            error_count = self.error_count,
            delay_ms = delay.as_millis() as u64,
            "retrying load"
        );
        if let Err(error) = self.spawn(loadable, delay) {
            warn!(loader = %self.name, %error, "retry could not start");
            self.fatal_error = Some(error);
        }
        None
    }

    /// Cancel the running load and wait for its thread.
    ///
    /// Returns the loadable if a load was running. Pending messages of that
    /// load are discarded.
    pub fn cancel_loading(&mut self) -> Option<L> {
        let running = self.current.take()?;
        running.token.cancel();
        self.gate.wake();
        if running.thread.join().is_err() {
            warn!(loader = %self.name, "loader thread panicked");
        }
        trace!(loader = %self.name, "load canceled");
        let mut loadable = None;
        while let Ok(Some(outcome)) = self.rx.try_recv() {
            if let Outcome::Finished { loadable: l, .. } = outcome {
                loadable = Some(l);
            }
        }
        loadable
    }

    /// Surface a fatal error, or the current error once it exceeded
    /// `min_retry_count` attempts.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped loading.
    pub fn maybe_throw_error(&self, min_retry_count: u32) -> LoadResult<()> {
        if let Some(error) = &self.fatal_error {
            return Err(error.clone());
        }
        match &self.current_error {
            Some(error) if self.error_count > min_retry_count => Err(error.clone()),
            _ => Ok(()),
        }
    }

    /// Cancel any load, join its thread and drop pending messages.
    /// Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        drop(self.cancel_loading());
        while let Ok(Some(_)) = self.rx.try_recv() {}
        self.released = true;
        debug!(loader = %self.name, "loader released");
    }

    fn join_current(&mut self) {
        if let Some(running) = self.current.take()
            && running.thread.join().is_err()
        {
            warn!(loader = %self.name, "loader thread panicked");
        }
    }
}

impl<L: Loadable> Drop for Loader<L> {
    fn drop(&mut self) {
        self.release();
    }
}
