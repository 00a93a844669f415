//! Post-execution events.
//!
//! Exactly one of [`CommandExecuted`] or [`CommandErrored`] fires per
//! invocation that reaches the executor. Sinks run after the pipeline settles
//! and before finalization; a sink that fails is logged and never re-enters
//! the pipeline.

use crate::command::{Receiver, ReturnValue};
use crate::context::CommandContext;
use crate::error::CommandError;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tracing::error;

/// An invocation ran its handler to completion.
pub struct CommandExecuted {
    pub ctx: Arc<CommandContext>,
    /// Receiver instance the handler ran against, when it had one.
    pub receiver: Option<Receiver>,
    /// Value the handler returned, when it produced one.
    pub value: Option<ReturnValue>,
}

/// An invocation failed at some pipeline stage.
pub struct CommandErrored {
    pub ctx: Arc<CommandContext>,
    /// Receiver instance, when the pipeline got far enough to build one.
    pub receiver: Option<Receiver>,
    pub error: Arc<CommandError>,
}

type ExecutedSink =
    Arc<dyn Fn(Arc<CommandExecuted>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ErroredSink =
    Arc<dyn Fn(Arc<CommandErrored>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Registered event sinks, fixed once dispatch starts.
#[derive(Clone, Default)]
pub struct EventSinks {
    executed: Vec<ExecutedSink>,
    errored: Vec<ErroredSink>,
}

impl EventSinks {
    pub fn on_executed(
        &mut self,
        sink: impl Fn(Arc<CommandExecuted>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
    ) {
        self.executed.push(Arc::new(sink));
    }

    pub fn on_errored(
        &mut self,
        sink: impl Fn(Arc<CommandErrored>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
    ) {
        self.errored.push(Arc::new(sink));
    }

    pub fn has_errored_sinks(&self) -> bool {
        !self.errored.is_empty()
    }

    /// Deliver a success event to every sink, in registration order.
    pub async fn dispatch_executed(&self, event: Arc<CommandExecuted>) {
        for sink in &self.executed {
            if let Err(err) = sink(Arc::clone(&event)).await {
                error!(
                    invocation_id = %event.ctx.invocation_id,
                    command = %event.ctx.command.qualified_name(),
                    error = %err,
                    "executed-event sink failed"
                );
            }
        }
    }

    /// Deliver a failure event to every sink, in registration order.
    pub async fn dispatch_errored(&self, event: Arc<CommandErrored>) {
        for sink in &self.errored {
            if let Err(err) = sink(Arc::clone(&event)).await {
                error!(
                    invocation_id = %event.ctx.invocation_id,
                    command = %event.ctx.command.qualified_name(),
                    error = %err,
                    "errored-event sink failed"
                );
            }
        }
    }
}
