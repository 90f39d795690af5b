//! # sheetd-client
//!
//! Client side of the sheetd worker protocol: the supervisor that keeps a
//! single worker process alive, the command channel that transports one
//! request/response pair per call with timeout, and the forwarder that ties
//! the two together with a single supervised retry.

pub mod channel;
pub mod forwarder;
pub mod supervisor;

pub use channel::{ClientConfig, CommandClient};
pub use forwarder::{BeginOutcome, CommitSummary, Forwarder, SessionEntry};
pub use supervisor::{Launch, ProcessLauncher, SupervisorConfig, WorkerHealth, WorkerSupervisor};
