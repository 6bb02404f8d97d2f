use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A one-way latch: once set it stays set, and every waiter is released.
///
/// Backs `is_finished` / `block_until_finished`.
#[derive(Debug, Default)]
pub(crate) struct Latch {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl Latch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        let mut state = self.state.lock().expect("latch mutex poisoned");
        *state = true;
        self.condvar.notify_all();
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.state.lock().expect("latch mutex poisoned")
    }

    /// Wait until the latch is set or `timeout` elapses; with no timeout,
    /// wait indefinitely. Returns whether the latch is set.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock().expect("latch mutex poisoned");
        match timeout {
            None => {
                while !*state {
                    state = self.condvar.wait(state).expect("latch mutex poisoned");
                }
                true
            }
            Some(timeout) => {
                let (state, _result) = self
                    .condvar
                    .wait_timeout_while(state, timeout, |set| !*set)
                    .expect("latch mutex poisoned");
                *state
            }
        }
    }
}

/// An auto-reset event: a successful wait consumes the signal.
///
/// Backs `await_new_image`; a viewer loops on the wait and redraws each
/// time it is released.
#[derive(Debug, Default)]
pub(crate) struct Signal {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn notify(&self) {
        let mut state = self.state.lock().expect("signal mutex poisoned");
        *state = true;
        self.condvar.notify_all();
    }

    /// Wait until signaled or `timeout` elapses. Clears the signal when it
    /// was observed and returns whether it was.
    pub(crate) fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut state = self.state.lock().expect("signal mutex poisoned");
        match timeout {
            None => {
                while !*state {
                    state = self.condvar.wait(state).expect("signal mutex poisoned");
                }
                *state = false;
                true
            }
            Some(timeout) => {
                let (mut state, _result) = self
                    .condvar
                    .wait_timeout_while(state, timeout, |set| !*set)
                    .expect("signal mutex poisoned");
                let triggered = *state;
                *state = false;
                triggered
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
