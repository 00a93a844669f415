//! cordial - Discord bot command pipeline
//!
//! A platform-agnostic command dispatch and execution pipeline: immutable
//! command trees, typed argument conversion, attribute-bound checks and a
//! uniform response surface across text, slash and context-menu triggers.

pub mod check;
pub mod command;
pub mod config;
pub mod context;
pub mod convert;
pub mod entity;
pub mod error;
pub mod event;
pub mod executor;
pub mod extension;
pub mod processor;
pub mod scope;
pub mod transport;

pub use command::{Command, CommandBuilder, CommandTable, ParameterBuilder};
pub use config::ExtensionConfig;
pub use context::{CommandContext, TriggerKind};
pub use convert::{ArgKind, ArgumentValue, EnumSpec};
pub use error::{BuildError, CommandError};
pub use event::{CommandErrored, CommandExecuted};
pub use executor::{ExecutionOutcome, ExecutionStage};
pub use extension::{Extension, ExtensionBuilder, RefreshReport};
pub use transport::{
    InteractionCreated, MessageCreated, Responder, ResponseMessage,
};
