pub mod executor;
pub mod parsers;
pub mod registry;
pub mod runner;

pub use executor::{ToolCommand, ToolExecutor, ToolOutput};
pub use registry::{ContentOutput, ContentSource, SourceOutput, SubdomainSource, Tool, UrlSource};
pub use runner::ToolRunner;
