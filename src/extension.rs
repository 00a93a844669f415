//! The extension host.
//!
//! An [`Extension`] owns everything one command surface needs: the command
//! table, the converter and check registries, the processors, the event sinks
//! and the service provider. Commands are declared as re-runnable
//! registration closures; [`refresh`](Extension::refresh) rebuilds the whole
//! table from them and swaps it in atomically, so concurrent dispatch only
//! ever observes a complete generation.

use crate::check::{CheckRegistry, ContextCheck, ParameterCheck};
use crate::command::{CommandBuilder, CommandTable};
use crate::config::ExtensionConfig;
use crate::context::{CommandContext, TriggerKind};
use crate::convert::{ArgKind, ArgumentMap, Converter, ConverterRegistry};
use crate::entity::{Channel, GuildSnapshot, Member, Permissions, User};
use crate::error::{BuildError, CommandError};
use crate::event::{CommandErrored, CommandExecuted, EventSinks};
use crate::executor::{CommandExecutor, ExecutionOutcome};
use crate::processor::{
    MessageMenuProcessor, ProcessOutcome, Processor, SlashProcessor, TextProcessor, TriggerEvent,
    UserMenuProcessor,
};
use crate::scope::ServiceProvider;
use crate::transport::{
    CommandRegistrar, InteractionCreated, MessageCreated, NullFetcher, NullRegistrar,
    ObjectFetcher, Responder, ResponseMessage,
};
use arc_swap::ArcSwap;
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A re-runnable command declaration; see [`Extension::add_command`].
pub type CommandRegistration = Box<dyn Fn() -> CommandBuilder + Send + Sync>;

/// One command build that failed during a refresh.
#[derive(Debug)]
pub struct RefreshFailure {
    pub command: String,
    pub error: BuildError,
}

/// Outcome of one [`Extension::refresh`].
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Root commands in the swapped-in table.
    pub registered: usize,
    /// Per-command build failures; these commands are absent from the table.
    pub failures: Vec<RefreshFailure>,
}

/// Builder for an [`Extension`]; collects everything that is fixed for the
/// extension's lifetime.
pub struct ExtensionBuilder {
    config: ExtensionConfig,
    provider: ServiceProvider,
    fetcher: Arc<dyn ObjectFetcher>,
    registrar: Arc<dyn CommandRegistrar>,
}

impl ExtensionBuilder {
    pub fn new(config: ExtensionConfig) -> Self {
        Self {
            config,
            provider: ServiceProvider::new(),
            fetcher: Arc::new(NullFetcher),
            registrar: Arc::new(NullRegistrar),
        }
    }

    /// Register a host service for constructor injection.
    pub fn service<T: Any + Send + Sync>(mut self, service: T) -> Self {
        self.provider.register(service);
        self
    }

    /// Network fallback used by the platform-object converters.
    pub fn fetcher(mut self, fetcher: Arc<dyn ObjectFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Platform-side command registration run during refresh.
    pub fn registrar(mut self, registrar: Arc<dyn CommandRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    pub fn build(self) -> Arc<Extension> {
        let mut sinks = EventSinks::default();
        if self.config.enable_default_error_handler {
            let limit = self.config.message_length_limit;
            sinks.on_errored(move |event| Box::pin(default_error_handler(event, limit)));
        }

        Arc::new(Extension {
            config: self.config,
            provider: Arc::new(self.provider),
            fetcher: self.fetcher,
            registrar: self.registrar,
            table: ArcSwap::from_pointee(CommandTable::empty()),
            converters: ArcSwap::from_pointee(ConverterRegistry::with_builtins()),
            checks: ArcSwap::from_pointee(CheckRegistry::with_builtins()),
            sinks: ArcSwap::from_pointee(sinks),
            processors: RwLock::new(vec![
                Arc::new(TextProcessor) as Arc<dyn Processor>,
                Arc::new(SlashProcessor),
                Arc::new(UserMenuProcessor),
                Arc::new(MessageMenuProcessor),
            ]),
            registrations: Mutex::new(Vec::new()),
            executor: CommandExecutor::new(),
            cancellation: CancellationToken::new(),
        })
    }
}

/// The command surface of one bot extension.
pub struct Extension {
    config: ExtensionConfig,
    provider: Arc<ServiceProvider>,
    fetcher: Arc<dyn ObjectFetcher>,
    registrar: Arc<dyn CommandRegistrar>,
    table: ArcSwap<CommandTable>,
    converters: ArcSwap<ConverterRegistry>,
    checks: ArcSwap<CheckRegistry>,
    sinks: ArcSwap<EventSinks>,
    processors: RwLock<Vec<Arc<dyn Processor>>>,
    registrations: Mutex<Vec<CommandRegistration>>,
    executor: CommandExecutor,
    cancellation: CancellationToken,
}

impl Extension {
    pub fn builder(config: ExtensionConfig) -> ExtensionBuilder {
        ExtensionBuilder::new(config)
    }

    pub fn config(&self) -> &ExtensionConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    /// Current command-table generation.
    pub fn table(&self) -> Arc<CommandTable> {
        self.table.load_full()
    }

    pub(crate) fn converters(&self) -> Arc<ConverterRegistry> {
        self.converters.load_full()
    }

    pub(crate) fn fetcher(&self) -> &Arc<dyn ObjectFetcher> {
        &self.fetcher
    }

    /// Cancel every in-flight and future invocation.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }

    // ------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------

    /// Declare a command. The closure is re-run on every refresh to produce a
    /// fresh builder; nothing is visible until [`refresh`](Self::refresh).
    pub fn add_command(
        &self,
        registration: impl Fn() -> CommandBuilder + Send + Sync + 'static,
    ) {
        self.registrations.lock().push(Box::new(registration));
    }

    /// Declare a batch of commands at once.
    pub fn add_commands(&self, registrations: impl IntoIterator<Item = CommandRegistration>) {
        self.registrations.lock().extend(registrations);
    }

    /// Drop every registration whose builder carries `name`. Takes effect on
    /// the next refresh, like [`add_command`](Self::add_command).
    pub fn remove_command(&self, name: &str) {
        self.registrations.lock().retain(|f| f().name() != name);
    }

    /// Bind a converter for a parameter type, replacing the previous binding.
    pub fn add_converter(&self, kind: ArgKind, converter: Arc<dyn Converter>) {
        self.converters.rcu(|current| {
            let mut next = ConverterRegistry::clone(current);
            next.register(kind, Arc::clone(&converter));
            next
        });
    }

    /// Bind a converter for one trigger source only.
    pub fn add_converter_for(
        &self,
        kind: ArgKind,
        trigger: TriggerKind,
        converter: Arc<dyn Converter>,
    ) {
        self.converters.rcu(|current| {
            let mut next = ConverterRegistry::clone(current);
            next.register_for(kind, trigger, Arc::clone(&converter));
            next
        });
    }

    /// Bind a context check to attribute type `A`.
    pub fn add_check<A: 'static>(&self, check: Arc<dyn ContextCheck>) {
        self.checks.rcu(|current| {
            let mut next = CheckRegistry::clone(current);
            next.bind_context::<A>(Arc::clone(&check));
            next
        });
    }

    /// Bind a parameter check to attribute type `A`.
    pub fn add_parameter_check<A: 'static>(&self, check: Arc<dyn ParameterCheck>) {
        self.checks.rcu(|current| {
            let mut next = CheckRegistry::clone(current);
            next.bind_parameter::<A>(Arc::clone(&check));
            next
        });
    }

    /// Append a trigger-source processor to the chain.
    pub fn add_processor(&self, processor: Arc<dyn Processor>) {
        self.processors.write().push(processor);
    }

    pub fn on_executed(
        &self,
        sink: impl Fn(Arc<CommandExecuted>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
    ) {
        let sink = Arc::new(sink);
        self.sinks.rcu(move |current| {
            let mut next = EventSinks::clone(current);
            let sink = Arc::clone(&sink);
            next.on_executed(move |event| sink(event));
            next
        });
    }

    pub fn on_errored(
        &self,
        sink: impl Fn(Arc<CommandErrored>) -> BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync
        + 'static,
    ) {
        let sink = Arc::new(sink);
        self.sinks.rcu(move |current| {
            let mut next = EventSinks::clone(current);
            let sink = Arc::clone(&sink);
            next.on_errored(move |event| sink(event));
            next
        });
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Rebuild the command table from the registration closures and swap it
    /// in. A command that fails to build is reported and skipped; the rest of
    /// the batch still lands. In-flight invocations keep the generation they
    /// started with.
    pub async fn refresh(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        let mut roots = Vec::new();
        // Root commands are siblings in the forest; names and aliases must be
        // unique across all registrations, not just within one builder.
        let mut taken: HashSet<String> = HashSet::new();

        let builders: Vec<CommandBuilder> =
            self.registrations.lock().iter().map(|f| f()).collect();
        for builder in builders {
            let name = builder.name().to_string();
            match builder.build(self.config.name_length_limit) {
                Ok(command) => {
                    let clash = std::iter::once(&command.name)
                        .chain(command.aliases.iter())
                        .find(|n| taken.contains(n.as_str()))
                        .cloned();
                    if let Some(clash) = clash {
                        warn!(command = %name, duplicate = %clash, "root command name already registered; skipping");
                        report.failures.push(RefreshFailure {
                            command: name,
                            error: BuildError::DuplicateName(clash),
                        });
                        continue;
                    }
                    for n in std::iter::once(&command.name).chain(command.aliases.iter()) {
                        taken.insert(n.clone());
                    }
                    roots.push(command);
                }
                Err(error) => {
                    warn!(command = %name, %error, "command failed to build; skipping");
                    report.failures.push(RefreshFailure { command: name, error });
                }
            }
        }

        let mut table = CommandTable::from_roots(roots);
        match self.registrar.sync(&table.descriptors()).await {
            Ok(assignments) => {
                for (name, id) in assignments {
                    table.assign_interaction_id(&name, id);
                }
            }
            Err(error) => {
                // The new table still lands; interactions fall back to
                // name-path matching until the next refresh.
                warn!(%error, "platform command sync failed");
            }
        }

        report.registered = table.roots().len();
        info!(
            commands = report.registered,
            failures = report.failures.len(),
            "command table refreshed"
        );
        self.table.store(Arc::new(table));
        report
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Run a chat message through the processor chain, inline.
    pub async fn process_message(
        self: &Arc<Self>,
        event: &MessageCreated,
        responder: Arc<dyn Responder>,
    ) -> ProcessOutcome {
        self.run_processors(TriggerEvent::Message(event), &responder).await
    }

    /// Run an interaction through the processor chain, inline.
    pub async fn process_interaction(
        self: &Arc<Self>,
        event: &InteractionCreated,
        responder: Arc<dyn Responder>,
    ) -> ProcessOutcome {
        self.run_processors(TriggerEvent::Interaction(event), &responder).await
    }

    /// Handle a chat message on its own task, so one slow handler never
    /// blocks the gateway loop.
    pub fn dispatch_message(
        self: &Arc<Self>,
        event: MessageCreated,
        responder: Arc<dyn Responder>,
    ) -> JoinHandle<()> {
        let extension = Arc::clone(self);
        tokio::spawn(async move {
            extension.process_message(&event, responder).await;
        })
    }

    /// Handle an interaction on its own task.
    pub fn dispatch_interaction(
        self: &Arc<Self>,
        event: InteractionCreated,
        responder: Arc<dyn Responder>,
    ) -> JoinHandle<()> {
        let extension = Arc::clone(self);
        tokio::spawn(async move {
            extension.process_interaction(&event, responder).await;
        })
    }

    async fn run_processors(
        self: &Arc<Self>,
        event: TriggerEvent<'_>,
        responder: &Arc<dyn Responder>,
    ) -> ProcessOutcome {
        let processors: Vec<Arc<dyn Processor>> = self.processors.read().clone();
        for processor in processors {
            match processor.process(self, event, responder).await {
                ProcessOutcome::Ignored => continue,
                outcome => return outcome,
            }
        }
        ProcessOutcome::Ignored
    }

    // ------------------------------------------------------------------
    // Pipeline plumbing (processors only)
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn make_context(
        self: &Arc<Self>,
        trigger: TriggerKind,
        user: User,
        member: Option<Member>,
        channel: Channel,
        guild: Option<GuildSnapshot>,
        command: Arc<crate::command::Command>,
        arguments: ArgumentMap,
        responder: Arc<dyn Responder>,
        trigger_permissions: Option<Permissions>,
    ) -> Arc<CommandContext> {
        CommandContext::new(
            trigger,
            user,
            member,
            channel,
            guild,
            command,
            arguments,
            Arc::downgrade(self),
            responder,
            trigger_permissions,
            self.provider.create_scope(),
            self.cancellation.child_token(),
        )
    }

    /// Hand a prepared invocation to the executor.
    pub(crate) async fn run_invocation(&self, ctx: Arc<CommandContext>) -> ExecutionOutcome {
        let checks = self.checks.load_full();
        let sinks = self.sinks.load_full();
        self.executor.execute(ctx, &checks, &sinks).await
    }

    /// Report a failure that happened before the invocation reached the
    /// executor (argument conversion, target resolution). Fires the errored
    /// event and finalizes the context.
    pub(crate) async fn report_failure(
        &self,
        ctx: Arc<CommandContext>,
        error: CommandError,
    ) -> ExecutionOutcome {
        let error = Arc::new(error);
        let sinks = self.sinks.load_full();
        sinks
            .dispatch_errored(Arc::new(CommandErrored {
                ctx: Arc::clone(&ctx),
                receiver: None,
                error: Arc::clone(&error),
            }))
            .await;
        ctx.release_scope();
        ExecutionOutcome::Errored(error)
    }
}

// ============================================================================
// Default error handler
// ============================================================================

/// Reply to the trigger with a readable error report; reports longer than the
/// platform message limit go out as a file attachment instead.
async fn default_error_handler(
    event: Arc<CommandErrored>,
    message_length_limit: usize,
) -> anyhow::Result<()> {
    let report = format_error_report(&event.error);
    let msg = if report.chars().count() <= message_length_limit {
        ResponseMessage::text(report)
    } else {
        ResponseMessage::text("The error report was too long for a message; see the attachment.")
            .with_attachment("error.txt", report.into_bytes())
    };
    if let Err(err) = event.ctx.respond(msg).await {
        warn!(
            invocation_id = %event.ctx.invocation_id,
            error = %err,
            "failed to deliver error report"
        );
    }
    Ok(())
}

fn format_error_report(error: &CommandError) -> String {
    match error {
        CommandError::ChecksFailed(failures) => {
            let mut out = String::from("Command checks failed:");
            for failure in failures {
                out.push_str("\n- ");
                out.push_str(&failure.message);
            }
            out
        }
        CommandError::ParameterChecksFailed(failures) => {
            let mut out = String::from("Argument checks failed:");
            for failure in failures {
                out.push_str("\n- ");
                out.push_str(&failure.message);
            }
            out
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_reports_stay_inline() {
        let error = CommandError::ArgumentParse { parameter: "count".into(), source: None };
        assert_eq!(format_error_report(&error), "could not parse argument 'count'");
    }

    #[test]
    fn check_failures_list_every_message() {
        use crate::command::attributes::RequireGuild;
        use crate::error::ContextCheckFailedData;

        let error = CommandError::ChecksFailed(vec![
            ContextCheckFailedData {
                attribute: Arc::new(RequireGuild),
                message: "first".into(),
                source: None,
            },
            ContextCheckFailedData {
                attribute: Arc::new(RequireGuild),
                message: "second".into(),
                source: None,
            },
        ]);
        let report = format_error_report(&error);
        assert!(report.contains("- first"));
        assert!(report.contains("- second"));
    }
}
