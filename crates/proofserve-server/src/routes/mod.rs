//! Route handlers and shared state for the proofserve server

mod status;
mod types;
mod verification;

pub use status::{health, stats};
pub use types::{
    ErrorResponse, HealthResponse, ScoreRequest, ScoreResponse, StatsResponse, VerifyRequest,
    VerifyResponse,
};
pub use verification::{score, verify};

use proofserve_dispatcher::{Dispatcher, RewardConfig};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Server lifecycle as seen by load balancers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
    Running = 0,
    /// Signal received; in-flight requests are finishing
    Draining = 1,
    /// Dispatcher is being stopped
    ShuttingDown = 2,
}

impl ShutdownState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ShutdownState::Running,
            1 => ShutdownState::Draining,
            _ => ShutdownState::ShuttingDown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownState::Running => "running",
            ShutdownState::Draining => "draining",
            ShutdownState::ShuttingDown => "shutting_down",
        }
    }
}

/// State shared by all handlers
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub reward: RewardConfig,
    started_at: Instant,
    shutdown_state: AtomicU8,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            reward: RewardConfig::default(),
            started_at: Instant::now(),
            shutdown_state: AtomicU8::new(ShutdownState::Running as u8),
        }
    }

    pub fn with_reward(mut self, reward: RewardConfig) -> Self {
        self.reward = reward;
        self
    }

    pub fn get_shutdown_state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.shutdown_state.load(Ordering::Acquire))
    }

    pub fn set_shutdown_state(&self, state: ShutdownState) {
        self.shutdown_state.store(state as u8, Ordering::Release);
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}
