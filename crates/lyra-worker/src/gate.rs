use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

/// Open/closed condition a loading thread blocks on between chunks.
///
/// The control thread opens it from `continue_loading`; the loading thread
/// closes it once it has read far enough to ask for permission again.
#[derive(Debug, Default)]
pub struct LoadGate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl LoadGate {
    pub fn new(open: bool) -> Self {
        Self {
            open: Mutex::new(open),
            cond: Condvar::new(),
        }
    }

    /// Returns `true` if the gate was closed before.
    pub fn open(&self) -> bool {
        let mut open = self.open.lock();
        if *open {
            return false;
        }
        *open = true;
        self.cond.notify_all();
        true
    }

    pub fn close(&self) {
        *self.open.lock() = false;
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }

    /// Block until the gate opens or `token` is canceled.
    ///
    /// Returns `false` when canceled.
    pub fn block(&self, token: &CancelToken) -> bool {
        let mut open = self.open.lock();
        while !*open {
            if token.is_canceled() {
                return false;
            }
            self.cond.wait(&mut open);
        }
        !token.is_canceled()
    }

    /// Wake every waiter so it can re-check its cancel token.
    pub(crate) fn wake(&self) {
        let _guard = self.open.lock();
        self.cond.notify_all();
    }
}

#[derive(Debug, Default)]
struct CancelState {
    canceled: Mutex<bool>,
    cond: Condvar,
}

/// Cancellation flag for one load task.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut canceled = self.inner.canceled.lock();
        *canceled = true;
        self.inner.cond.notify_all();
    }

    pub fn is_canceled(&self) -> bool {
        *self.inner.canceled.lock()
    }

    /// Sleep for `delay` unless canceled first. Returns `false` when canceled.
    pub fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut canceled = self.inner.canceled.lock();
        while !*canceled {
            if self.inner.cond.wait_until(&mut canceled, deadline).timed_out() {
                break;
            }
        }
        !*canceled
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_open_reports_change() {
        let gate = LoadGate::new(false);
        assert!(gate.open());
        assert!(!gate.open());
        gate.close();
        assert!(!gate.is_open());
        assert!(gate.open());
    }

    #[test]
    fn test_block_returns_when_opened() {
        let gate = Arc::new(LoadGate::new(false));
        let token = CancelToken::new();
        let waiter = {
            let gate = Arc::clone(&gate);
            let token = token.clone();
            thread::spawn(move || gate.block(&token))
        };
        thread::sleep(Duration::from_millis(20));
        gate.open();
        assert!(waiter.join().expect("waiter thread"));
    }

    #[test]
    fn test_block_returns_false_on_cancel() {
        let gate = Arc::new(LoadGate::new(false));
        let token = CancelToken::new();
        let waiter = {
            let gate = Arc::clone(&gate);
            let token = token.clone();
            thread::spawn(move || gate.block(&token))
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        gate.wake();
        assert!(!waiter.join().expect("waiter thread"));
    }

    #[test]
    fn test_sleep_interrupted_by_cancel() {
        let token = CancelToken::new();
        let sleeper = {
            let token = token.clone();
            thread::spawn(move || {
                let started = Instant::now();
                (token.sleep(Duration::from_secs(30)), started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let (completed, elapsed) = sleeper.join().expect("sleeper thread");
        assert!(!completed);
        assert!(elapsed < Duration::from_secs(30));
    }

    #[test]
    fn test_sleep_completes() {
        assert!(CancelToken::new().sleep(Duration::from_millis(5)));
    }
}
