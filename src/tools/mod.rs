pub mod dispatcher;
pub mod search;

pub use dispatcher::{ToolDispatcher, ToolKind};
pub use search::{parse_items, GoogleSearchTool, SearchItem, UnconfiguredSearch, WebSearch};
