//! Command configuration: schema and compiled registry.

mod loader;
pub mod schema;

pub use loader::{CommandEntry, CommandRegistry};
pub use schema::{
    CommandDefinition, CommandDocument, ResponseLeaf, SUPPORTED_VERSION, StructuredResponse,
    SubGroupsDefinition,
};
