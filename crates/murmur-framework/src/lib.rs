//! # Murmur Framework
//!
//! Everything between raw chat lines and the widgets that care about them:
//!
//! - [`pattern`]: named-capture patterns translated to plain positional groups
//! - [`response`]: anchored response shapes with optional repeating subgroups
//! - [`registry`]: the JSON command configuration, compiled into response sets
//!   keyed by dotted path
//! - [`template`]: `{param}` command templates
//! - [`service`]: the correlator that logs incoming lines, matches them per
//!   subscription and dispatches outgoing commands idempotently
//!
//! The framework knows nothing about connections. Outgoing text leaves through
//! a [`CommandSink`](murmur_core::CommandSink) and incoming lines arrive as
//! [`Message`](murmur_core::Message)s fed to [`CommandService::on_incoming`].

pub mod error;
pub mod pattern;
pub mod registry;
pub mod response;
pub mod service;
pub mod template;

pub use error::{
    PatternError, PatternResult, RegistryError, RegistryResult, ServiceError, ServiceResult,
};
pub use pattern::{CapturedGroups, CompiledPattern, NamedPattern};
pub use registry::{CommandDocument, CommandEntry, CommandRegistry, ResponseLeaf};
pub use response::{CommandResponse, ResponseMatch, ResponseSet, SubgroupPattern};
pub use service::{CommandService, MatchedResponse, ResponseCallback, ResponseHistory};
pub use template::{CommandTemplate, has_unresolved_params};
