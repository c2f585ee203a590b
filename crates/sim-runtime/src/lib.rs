#![deny(warnings)]

//! Runtime around the economy engine: control surface, tick sessions and
//! offline policy evaluation.

pub mod control;
pub mod rollout;
pub mod session;

pub use control::{control_channel, ControlHandle, ControlMessage};
pub use rollout::{evaluate, run_episode, EpisodeReport, EvaluationSummary};
pub use session::{Session, SessionStats, TickPayload};
