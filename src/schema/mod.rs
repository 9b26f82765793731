//! Command registry and request validation (SPEC_FULL.md §4.B), grounded on
//! `QueryHandler::init()`/`syntax_checker` (`original_source/src/
//! QueryHandler.cc`): a static map from command name to the properties it
//! accepts, checked before any command touches the graph engine, the media
//! pipeline, or the descriptor engines.

pub mod registry;
pub mod validate;

pub use registry::{CommandKind, Registry};
pub use validate::validate_command_list;
