//! Tool catalog: the fixed set of query operations advertised to the model.
//!
//! Both the prompt builder and the dispatcher read from [`catalog()`], so the
//! tools the model hears about are exactly the tools that can be executed.

mod catalog; // the two fixed tools
mod parameters; // parameter specs and builder

pub use catalog::{ADVANCED_QUERY_TOOL, IUCR_TOOL, TOOL_CATALOG, ToolCatalog, ToolKind, ToolSpec, catalog};
pub use parameters::{ParamKind, ParamSpec, ToolParameters, ToolParametersBuilder};
