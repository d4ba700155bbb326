//! Lifecycle state machine with guarded transitions.
//!
//! # State Diagram
//!
//! ```text
//!     INITIALIZING ──────────► RUNNING
//!          │                      │
//!          ├──────► ERROR ◄───────┤
//!          │          │  ▲        │
//!          │          │  └─(self loop: repeated error reports coalesce)
//!          ▼          ▼           ▼
//!         SHUTDOWN_REQUESTED (terminal)
//! ```
//!
//! Transitioning to the current state is a no-op. Any transition not in
//! the table is a programming error. Callbacks registered per target
//! state run synchronously in registration order. A one-shot shutdown
//! waiter (a Condvar-watched flag) completes once the state becomes
//! `ShutdownRequested` or `Error`.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::core::errors::{Error, Result};

/// Lifecycle state of the trading engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Initializing,
    Running,
    Error,
    ShutdownRequested,
}

impl State {
    /// States that complete the shutdown waiter.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::ShutdownRequested | State::Error)
    }

    fn allowed_targets(&self) -> &'static [State] {
        match self {
            State::Initializing => &[State::Running, State::Error, State::ShutdownRequested],
            State::Running => &[State::Error, State::ShutdownRequested],
            State::Error => &[State::Running, State::Error, State::ShutdownRequested],
            State::ShutdownRequested => &[],
        }
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

struct Inner {
    state: State,
    callbacks: HashMap<State, Vec<Callback>>,
    facts: HashMap<&'static str, bool>,
    shutdown: bool,
}

/// Manages the lifecycle transitions of the engine.
pub struct StateMachine {
    inner: Mutex<Inner>,
    shutdown_signal: Condvar,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: State::Initializing,
                callbacks: HashMap::new(),
                facts: HashMap::new(),
                shutdown: false,
            }),
            shutdown_signal: Condvar::new(),
        }
    }

    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Attempt to transition to a new state.
    ///
    /// Callbacks for the target state run after the lock is released, so
    /// they may transition again (the ERROR self-loop relies on this).
    pub fn transition_to(&self, new_state: State) -> Result<()> {
        let to_run: Vec<Callback>;
        {
            let mut inner = self.inner.lock();
            debug!(from = ?inner.state, to = ?new_state, "state transition");
            if new_state == inner.state {
                // Repeated reports of the same state coalesce; the ERROR
                // self-loop in the table exists so they are not rejected.
                return Ok(());
            }
            if !inner.state.allowed_targets().contains(&new_state) {
                return Err(Error::InvalidTransition {
                    from: inner.state,
                    to: new_state,
                });
            }
            inner.state = new_state;
            if new_state.is_terminal() {
                inner.shutdown = true;
                self.shutdown_signal.notify_all();
            }
            to_run = inner
                .callbacks
                .get(&new_state)
                .map(|cbs| cbs.to_vec())
                .unwrap_or_default();
        }
        for callback in to_run {
            callback();
        }
        Ok(())
    }

    /// Register a callback to run on every transition into `to_state`.
    pub fn register_callback<F>(&self, to_state: State, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .callbacks
            .entry(to_state)
            .or_default()
            .push(Arc::new(callback));
    }

    /// Record a named fact, e.g. `ready_to_trade`.
    pub fn set_fact(&self, name: &'static str, value: bool) {
        self.inner.lock().facts.insert(name, value);
    }

    pub fn fact(&self, name: &str) -> bool {
        self.inner.lock().facts.get(name).copied().unwrap_or(false)
    }

    /// Block until the state becomes `ShutdownRequested` or `Error`.
    /// Returns immediately if already in a terminal state.
    pub fn wait_for_shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return;
        }
        while !inner.shutdown {
            self.shutdown_signal.wait(&mut inner);
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
