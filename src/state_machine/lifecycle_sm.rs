//! Container lifecycle state machine.
//!
//! ```text
//!            StartRequested            StartSucceeded
//!   Idle ───────────────────► Starting ───────────────► Running
//!    ▲  ◄─────────────────────   │                       │  ▲
//!    │       StartFailed                  StopRequested  │  │ StopFailed
//!    │                                                   ▼  │
//!    └────────────────────────────────────────────── Stopping
//!                        StopSucceeded
//! ```
//!
//! `Observed` re-syncs Idle/Running with what `docker-compose ps` reports.
//! Stopping straight from Idle is allowed so a container left running by an
//! earlier session can be brought down.

use statig::prelude::*;

use crate::docker::LifecycleState;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events dispatched to the lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    StartRequested,
    StartSucceeded,
    StartFailed,
    StopRequested,
    StopSucceeded,
    StopFailed,
    /// Result of asking Docker whether the container is up.
    Observed { running: bool },
}

// ---------------------------------------------------------------------------
// Shared storage
// ---------------------------------------------------------------------------

/// Shared storage for the lifecycle state machine.
#[derive(Debug, Default)]
pub struct LifecycleMachine;

impl LifecycleMachine {
    /// Project the internal state onto the public [`LifecycleState`].
    pub fn public_state(state: &State) -> LifecycleState {
        match state {
            State::Idle {} => LifecycleState::Idle,
            State::Starting {} => LifecycleState::Starting,
            State::Running {} => LifecycleState::Running,
            State::Stopping {} => LifecycleState::Stopping,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine implementation
// ---------------------------------------------------------------------------

#[state_machine(
    initial = "State::idle()",
    state(derive(Debug, Clone, PartialEq, Eq))
)]
impl LifecycleMachine {
    /// No container managed by this session.
    #[state]
    fn idle(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::StartRequested => Transition(State::starting()),
            LifecycleEvent::StopRequested => Transition(State::stopping()),
            LifecycleEvent::Observed { running: true } => Transition(State::running()),
            _ => Handled,
        }
    }

    /// `docker-compose up -d` (or `docker start`) is in flight.
    #[state]
    fn starting(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::StartSucceeded => Transition(State::running()),
            LifecycleEvent::StartFailed => Transition(State::idle()),
            _ => Handled,
        }
    }

    /// The container is up.
    #[state]
    fn running(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::StopRequested => Transition(State::stopping()),
            LifecycleEvent::Observed { running: false } => Transition(State::idle()),
            _ => Handled,
        }
    }

    /// `docker-compose down` is in flight.
    #[state]
    fn stopping(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::StopSucceeded => Transition(State::idle()),
            LifecycleEvent::StopFailed => Transition(State::running()),
            _ => Handled,
        }
    }
}
