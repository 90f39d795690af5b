//! # sheetd-worker
//!
//! The long-lived worker process that hosts spreadsheet automation
//! sessions. Clients connect over localhost TCP, speak the
//! `sheetd-protocol` frame format, and address sessions created here by id;
//! the worker owns the [`SessionRegistry`](sheetd_core::SessionRegistry)
//! and the engine affinity threads, so it can outlive any individual
//! caller process.

mod dispatch;
pub mod server;

pub use server::{run, serve, WorkerConfig};
