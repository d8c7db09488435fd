// src/launcher/mod.rs

//! Process launching layer.
//!
//! This module owns every OS-level primitive the supervisor needs:
//!
//! - [`process`] wraps a `tokio::process::Child` as a [`BotProcess`] with
//!   bounded terminate/escalate, wait and non-blocking exit checks.
//! - [`output`] drains child stdout/stderr so a chatty bot never stalls on
//!   a full pipe.
//! - [`backend`] provides the [`Launcher`] trait and the production
//!   [`InterpreterLauncher`].
//! - [`fetch`] runs bounded one-shot commands such as `git clone`.

pub mod backend;
pub mod fetch;
pub mod output;
pub mod process;

pub use backend::{InterpreterLauncher, Launcher};
pub use fetch::run_bounded;
pub use process::{BotProcess, LaunchSpec, TerminateOutcome, TerminateTimeouts};
