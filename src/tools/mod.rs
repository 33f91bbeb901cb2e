//! Tools the model may call during a turn.
//!
//! - [`types`]: the [`Tool`] trait and output bounding
//! - [`registry`]: [`ToolRegistry`]: definitions, status labels, dispatch
//! - [`search`]: web search through a Serper-compatible API
//! - [`news`]: trending headlines per platform

pub mod news;
pub mod registry;
pub mod search;
pub mod types;

pub use news::DailyNewsTool;
pub use registry::ToolRegistry;
pub use search::SearchTool;
pub use types::{Tool, ToolArgs, truncate_output};
