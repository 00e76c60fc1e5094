//! Multi-region EC2 fleet inventory and lifecycle control.
//!
//! [`engine::FleetEngine`] is the entry point: it scans every region into one
//! snapshot, keeps a cached copy on disk, and runs start/stop/reboot commands
//! with reboot completion tracked in the background.

pub mod cache;
pub mod config;
pub mod ec2;
pub mod engine;
pub mod error;
pub mod events;
pub mod fleet;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod output;
pub mod pool;
pub mod reconciler;
pub mod regions;
pub mod scanner;
pub mod server;
pub mod session;
pub mod settings;
pub mod state;
pub mod view;

#[cfg(test)]
mod fake;
