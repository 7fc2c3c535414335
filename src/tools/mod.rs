//! Agent-callable tools over the lifecycle tracker.
//!
//! Provides the base tool trait, one tool per tracker operation, and a
//! registry for looking tools up by name.

pub mod base_tool;
pub mod registry;
pub mod taskmaster_tools;

// Re-exports for convenience
pub use base_tool::{BaseTool, Tool, ToolError};
pub use registry::ToolRegistry;
pub use taskmaster_tools::taskmaster_tools;
