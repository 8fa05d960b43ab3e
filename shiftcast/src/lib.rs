//! Schedule-driven enforcer for ffmpeg record and playback processes.
//!
//! Each channel can have a record job writing time-stamped segments and a
//! playback job restreaming either the live input or a delayed window of
//! those segments. The [`enforcer::Enforcer`] reconciles the running process
//! set against the configuration on every tick.

pub mod clock;
pub mod command;
pub mod config;
pub mod domain;
pub mod enforcer;
pub mod error;
pub mod logging;
pub mod process;
pub mod recording;
pub mod schedule;
pub mod utils;

pub use error::{Error, Result};
