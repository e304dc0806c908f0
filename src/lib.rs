//! Main sysupgrade impl lib

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Commands and args
pub mod command;

// Small util bits
mod util;

// Log setup
mod logging;

// Runtime dirs and well-known paths
mod dirs;

// Info about the running system
mod sysinfo;

// The durable state of an in-progress upgrade
mod state;

// Single-instance locking
mod lock;

// ^C handling
mod interrupt;

// Install-tree (.treeinfo) metadata
mod treeinfo;

// Repo override specs
mod repo;

// The resolution/download engine seam, and the dnf impl behind it
mod engine;

// The resolution and download driver
mod download;

// Progress bars
mod progress;

// Staging packages into the canonical layout
mod stage;

// Boot-chain preparation
mod boot;

// Cleanup and rollback
mod clean;


// CLI Commands
mod cmd;
