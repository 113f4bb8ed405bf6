//! Tool definitions and the catalog of recipe API wrappers

pub mod catalog;
pub mod definition;
pub mod executor;

pub use catalog::ToolCatalog;
pub use definition::{BodySpec, ParamKind, ParamSpec, ToolDefinition};
pub use executor::ToolExecutor;
