//! Command executor.
//!
//! Drives one invocation through the pipeline stages: validation, context
//! checks, parameter checks, handler invocation, event delivery and
//! finalization. Every invocation that enters the executor produces exactly
//! one executed or errored event, except one cancelled before the handler
//! runs, which produces neither. The invocation scope is released on every
//! exit path.

use crate::check::CheckRegistry;
use crate::command::{CommandId, HandlerFn, HandlerFuture, Receiver, ReceiverSource};
use crate::context::CommandContext;
use crate::error::{CommandError, NotExecutableReason};
use crate::event::{CommandErrored, CommandExecuted, EventSinks};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{Instrument, debug, info_span};

/// Pipeline stage of one invocation, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Validating,
    ContextChecking,
    ParameterChecking,
    Invoking,
    Succeeded,
    Failed,
    Finalizing,
}

impl ExecutionStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::ContextChecking => "context_checking",
            Self::ParameterChecking => "parameter_checking",
            Self::Invoking => "invoking",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Finalizing => "finalizing",
        }
    }
}

/// How one invocation left the executor.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Handler ran to completion; an executed event fired.
    Completed,
    /// The pipeline failed somewhere; an errored event fired.
    Errored(Arc<CommandError>),
    /// Cancelled before the handler ran; no event fired.
    Cancelled,
}

type InvocationThunk =
    Arc<dyn Fn(Option<Receiver>, Arc<CommandContext>) -> HandlerFuture + Send + Sync>;

/// Executes prepared invocations.
///
/// Stateless apart from the per-command thunk cache, so one executor serves
/// any number of concurrent invocations.
pub struct CommandExecutor {
    thunks: DashMap<CommandId, InvocationThunk>,
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self { thunks: DashMap::new() }
    }

    /// Run one invocation to completion.
    pub async fn execute(
        &self,
        ctx: Arc<CommandContext>,
        checks: &CheckRegistry,
        sinks: &EventSinks,
    ) -> ExecutionOutcome {
        let span = info_span!(
            "invocation",
            invocation_id = %ctx.invocation_id,
            command = %ctx.command.qualified_name(),
            trigger = ctx.trigger.as_str(),
        );
        self.execute_inner(ctx, checks, sinks).instrument(span).await
    }

    async fn execute_inner(
        &self,
        ctx: Arc<CommandContext>,
        checks: &CheckRegistry,
        sinks: &EventSinks,
    ) -> ExecutionOutcome {
        debug!(stage = ExecutionStage::Validating.as_str(), "invocation entered executor");
        ctx.command.note_invocation();

        let Some(handler) = ctx.command.handler.clone() else {
            let error = CommandError::NotExecutable {
                command: ctx.command.qualified_name(),
                reason: NotExecutableReason::GroupCommand,
            };
            return self.fail(ctx, None, error, sinks).await;
        };
        let expected = ctx.command.parameters.len();
        let supplied = ctx.arguments.len();
        if supplied != expected {
            let error = CommandError::NotExecutable {
                command: ctx.command.qualified_name(),
                reason: NotExecutableReason::ArityMismatch { expected, supplied },
            };
            return self.fail(ctx, None, error, sinks).await;
        }

        if ctx.cancellation.is_cancelled() {
            return self.cancel(ctx);
        }

        // Both check stages always run; failures from the first never mask
        // the second from executing.
        debug!(stage = ExecutionStage::ContextChecking.as_str(), "running context checks");
        let context_failures = checks.execute_context_checks(&ctx).await;

        debug!(stage = ExecutionStage::ParameterChecking.as_str(), "running parameter checks");
        let parameter_failures = checks.execute_parameter_checks(&ctx).await;

        if !context_failures.is_empty() {
            return self.fail(ctx, None, CommandError::ChecksFailed(context_failures), sinks).await;
        }
        if !parameter_failures.is_empty() {
            let error = CommandError::ParameterChecksFailed(parameter_failures);
            return self.fail(ctx, None, error, sinks).await;
        }

        if ctx.cancellation.is_cancelled() {
            return self.cancel(ctx);
        }

        debug!(stage = ExecutionStage::Invoking.as_str(), "invoking handler");
        let receiver = match self.build_receiver(&handler.receiver, &ctx) {
            Ok(receiver) => receiver,
            Err(err) => {
                return self.fail(ctx, None, CommandError::from_invocation(err), sinks).await;
            }
        };

        let thunk = self
            .thunks
            .entry(ctx.command.id())
            .or_insert_with(|| normalize(handler.func.clone()))
            .clone();

        match thunk(receiver.clone(), Arc::clone(&ctx)).await {
            Ok(value) => {
                debug!(stage = ExecutionStage::Succeeded.as_str(), "handler completed");
                let event = Arc::new(CommandExecuted {
                    ctx: Arc::clone(&ctx),
                    receiver,
                    value,
                });
                sinks.dispatch_executed(event).await;
                self.finalize(&ctx);
                ExecutionOutcome::Completed
            }
            Err(err) => {
                self.fail(ctx, receiver, CommandError::from_invocation(err), sinks).await
            }
        }
    }

    fn build_receiver(
        &self,
        source: &ReceiverSource,
        ctx: &CommandContext,
    ) -> anyhow::Result<Option<Receiver>> {
        match source {
            ReceiverSource::None => Ok(None),
            ReceiverSource::Bound(receiver) => Ok(Some(Arc::clone(receiver))),
            ReceiverSource::Scoped(factory) => ctx
                .with_scope(|scope| factory(scope))
                .unwrap_or_else(|| Err(anyhow::anyhow!("invocation scope already released")))
                .map(Some),
        }
    }

    async fn fail(
        &self,
        ctx: Arc<CommandContext>,
        receiver: Option<Receiver>,
        error: CommandError,
        sinks: &EventSinks,
    ) -> ExecutionOutcome {
        debug!(
            stage = ExecutionStage::Failed.as_str(),
            error_code = error.error_code(),
            error = %error,
            "invocation failed"
        );
        let error = Arc::new(error);
        let event = Arc::new(CommandErrored {
            ctx: Arc::clone(&ctx),
            receiver,
            error: Arc::clone(&error),
        });
        sinks.dispatch_errored(event).await;
        self.finalize(&ctx);
        ExecutionOutcome::Errored(error)
    }

    fn cancel(&self, ctx: Arc<CommandContext>) -> ExecutionOutcome {
        debug!("invocation cancelled before the handler ran");
        self.finalize(&ctx);
        ExecutionOutcome::Cancelled
    }

    fn finalize(&self, ctx: &CommandContext) {
        debug!(stage = ExecutionStage::Finalizing.as_str(), "releasing invocation scope");
        ctx.release_scope();
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a handler convention into the single thunk shape the cache
/// stores. Built at most once per command; later invocations reuse it.
fn normalize(func: HandlerFn) -> InvocationThunk {
    match func {
        HandlerFn::Sync(f) => Arc::new(move |receiver, ctx| {
            let f = Arc::clone(&f);
            Box::pin(async move { f(receiver, ctx).map(|_| None) })
        }),
        HandlerFn::Async(f) => Arc::new(move |receiver, ctx| f(receiver, ctx)),
    }
}
