//! # taskmaster
//!
//! In-memory request → task → subtask lifecycle tracker for agent
//! orchestration.
//!
//! A caller plans a request into tasks, pulls tasks in priority order, marks
//! them done, and has each result approved, automatically when confidence is
//! high enough. A request closes once every task is completed and approved,
//! producing workflow metrics.
//!
//! The tracker itself is plain synchronous state ([`TaskMaster`]). Around it
//! sit a locked shared handle, an event outbox that feeds metrics and
//! artifact collaborators, agent-callable tools, and an HTTP server.

pub mod events;
pub mod server;
pub mod telemetry;
pub mod tools;
pub mod tracker;
pub mod utilities;

pub use events::{DomainEvent, EventDispatcher, EventEnvelope};
pub use tools::{BaseTool, ToolError, ToolRegistry};
pub use tracker::{
    EventOverwritePolicy, SharedTaskMaster, TaskMaster, TrackerError, TrackerResult,
};
pub use utilities::{ConfigError, TrackerConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
