//! Integration tests for the execution pipeline: validation, checks, event
//! delivery and scope accounting.

mod common;

use async_trait::async_trait;
use common::{EventLog, RecordingResponder, direct_message, guild, guild_message, user};
use cordial::check::ParameterCheck;
use cordial::command::attributes::{
    CheckAttribute, RequireGuild, RequireOwner, RequirePermissions, StringLength,
};
use cordial::command::{CommandBuilder, CommandParameter, ParameterBuilder};
use cordial::config::ExtensionConfig;
use cordial::context::CommandContext;
use cordial::convert::{ArgKind, ArgumentValue};
use cordial::entity::Permissions;
use cordial::error::CommandError;
use cordial::executor::ExecutionOutcome;
use cordial::extension::Extension;
use cordial::processor::ProcessOutcome;
use cordial::transport::{InteractionCreated, ResponseMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn quiet_config() -> ExtensionConfig {
    ExtensionConfig { enable_default_error_handler: false, ..Default::default() }
}

#[tokio::test]
async fn text_command_executes_and_replies() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("ping").handle(|_, ctx| async move {
            ctx.reply("pong").await?;
            Ok(())
        })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = guild_message("!ping", user(1, "alice"), guild(5));
    let outcome = extension.process_message(&event, responder.clone()).await;

    assert!(matches!(
        outcome,
        ProcessOutcome::Completed(ExecutionOutcome::Completed)
    ));
    assert_eq!(responder.response_texts(), vec!["pong".to_string()]);
    assert_eq!(log.executed.lock().as_slice(), ["ping".to_string()]);
    assert_eq!(log.errored_count(), 0);

    let table = extension.table();
    let ping = table.find_root("ping", false).expect("ping registered");
    assert_eq!(ping.invocation_count(), 1);
}

#[tokio::test]
async fn group_invoked_directly_is_not_executable() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("config").child(
            CommandBuilder::new("set")
                .parameter(ParameterBuilder::new("value", ArgKind::String))
                .handle(|_, _| async { Ok(()) }),
        )
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = guild_message("!config", user(1, "alice"), guild(5));
    extension.process_message(&event, responder.clone()).await;

    assert_eq!(log.executed_count(), 0);
    let errored = log.errored.lock();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].0, "not_executable");
    drop(errored);

    // The child itself runs fine.
    let event = guild_message("!config set hello", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;
    assert_eq!(log.executed.lock().as_slice(), ["config.set".to_string()]);
}

#[tokio::test]
async fn unrecognized_message_is_ignored() {
    let extension = Extension::builder(quiet_config()).build();
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = guild_message("!nothing here", user(1, "alice"), guild(5));
    let outcome = extension.process_message(&event, responder).await;

    assert!(matches!(outcome, ProcessOutcome::Ignored));
    assert_eq!(log.executed_count(), 0);
    assert_eq!(log.errored_count(), 0);
}

#[tokio::test]
async fn handler_error_surfaces_root_cause() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("explode").handle(|_, _| async {
            let inner = anyhow::anyhow!("boom");
            Err(inner.context("while exploding"))
        })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = guild_message("!explode", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    let errored = log.errored.lock();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].0, "invocation");
    assert_eq!(errored[0].1, "boom");
}

#[tokio::test]
async fn context_check_failures_accumulate() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("admin")
            .check(RequireGuild)
            .check(RequireOwner)
            .handle(|_, _| async { Ok(()) })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    // Direct message from a non-owner: both checks fail, one event carries both.
    let responder = RecordingResponder::new();
    let event = direct_message("!admin", user(1, "alice"));
    extension.process_message(&event, responder).await;

    assert_eq!(log.errored_count(), 1);
    let errors = log.errors.lock();
    match errors[0].as_ref() {
        CommandError::ChecksFailed(failures) => assert_eq!(failures.len(), 2),
        other => panic!("expected ChecksFailed, got {other:?}"),
    }
}

#[derive(Debug)]
struct Stamped(&'static str);

struct OrderRecorder(Arc<parking_lot::Mutex<Vec<&'static str>>>);

#[async_trait]
impl cordial::check::ContextCheck for OrderRecorder {
    async fn check(
        &self,
        attribute: &dyn CheckAttribute,
        _ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>> {
        if let Some(stamp) = cordial::command::attributes::attribute_as::<Stamped>(attribute) {
            self.0.lock().push(stamp.0);
        }
        Ok(None)
    }
}

#[tokio::test]
async fn group_checks_run_before_leaf_checks() {
    let extension = Extension::builder(quiet_config()).build();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    extension.add_check::<Stamped>(Arc::new(OrderRecorder(Arc::clone(&order))));
    extension.add_command(|| {
        CommandBuilder::new("outer").check(Stamped("outer")).child(
            CommandBuilder::new("leaf")
                .check(Stamped("leaf"))
                .handle(|_, _| async { Ok(()) }),
        )
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = guild_message("!outer leaf", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    assert_eq!(order.lock().as_slice(), ["outer", "leaf"]);
    assert_eq!(log.executed_count(), 1);
}

#[derive(Debug)]
struct Audited;

struct CountingCheck(Arc<AtomicUsize>);

#[async_trait]
impl ParameterCheck for CountingCheck {
    async fn check(
        &self,
        _attribute: &dyn CheckAttribute,
        _parameter: &CommandParameter,
        _value: &ArgumentValue,
        _ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Some("audited".to_string()))
    }
}

#[tokio::test]
async fn parameter_checks_run_even_when_context_checks_fail() {
    let extension = Extension::builder(quiet_config()).build();
    let count = Arc::new(AtomicUsize::new(0));
    extension.add_parameter_check::<Audited>(Arc::new(CountingCheck(Arc::clone(&count))));
    extension.add_command(|| {
        CommandBuilder::new("tag")
            .check(RequireGuild)
            .parameter(ParameterBuilder::new("name", ArgKind::String).check(Audited))
            .handle(|_, _| async { Ok(()) })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = direct_message("!tag hello", user(1, "alice"));
    extension.process_message(&event, responder).await;

    // Context failure wins the report, but the parameter stage still ran.
    assert_eq!(count.load(Ordering::SeqCst), 1);
    let errored = log.errored.lock();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].0, "checks_failed");
}

#[tokio::test]
async fn interaction_permissions_satisfy_the_permissions_check() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("purge")
            .check(RequirePermissions(Permissions::MANAGE_MESSAGES))
            .handle(|_, _| async { Ok(()) })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    // The member record carries no permissions; the platform-computed field
    // delivered with the interaction decides.
    let interaction: InteractionCreated = serde_json::from_value(serde_json::json!({
        "id": 904,
        "token": "tok",
        "kind": "slash",
        "command_id": 1,
        "command_name": "purge",
        "user": { "id": 1, "name": "alice" },
        "member": { "user": { "id": 1, "name": "alice" } },
        "channel": { "id": 10, "name": "general", "kind": "text", "guild_id": 5 },
        "guild": { "id": 5, "name": "testers" },
        "permissions": 8192
    }))
    .expect("interaction payload should deserialize");

    let responder = RecordingResponder::new();
    extension.process_interaction(&interaction, responder).await;
    assert_eq!(log.executed_count(), 1);
    assert_eq!(log.errored_count(), 0);

    // Without the computed field the member record (empty) decides, and the
    // check fails.
    let mut stripped = interaction.clone();
    stripped.permissions = None;
    let responder = RecordingResponder::new();
    extension.process_interaction(&stripped, responder).await;
    let errored = log.errored.lock();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].0, "checks_failed");
}

#[tokio::test]
async fn builtin_string_length_check_rejects_long_input() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("tag")
            .parameter(
                ParameterBuilder::new("name", ArgKind::String).check(StringLength::at_most(3)),
            )
            .handle(|_, _| async { Ok(()) })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = guild_message("!tag toolong", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    let errored = log.errored.lock();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].0, "parameter_checks_failed");
}

#[tokio::test]
async fn scope_released_on_every_exit_path() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("ok").handle(|_, _| async { Ok(()) })
    });
    extension.add_command(|| {
        CommandBuilder::new("count")
            .parameter(ParameterBuilder::new("n", ArgKind::I32))
            .handle(|_, _| async { Ok(()) })
    });
    extension.add_command(|| {
        CommandBuilder::new("guarded")
            .check(RequireGuild)
            .handle(|_, _| async { Ok(()) })
    });
    extension.add_command(|| {
        CommandBuilder::new("grp").child(CommandBuilder::new("leaf").handle(|_, _| async { Ok(()) }))
    });
    extension.refresh().await;

    let responder = RecordingResponder::new();
    let alice = user(1, "alice");
    // Success, parse failure, check failure, group error.
    for content in ["!ok", "!count notanumber", "!grp"] {
        let event = guild_message(content, alice.clone(), guild(5));
        extension.process_message(&event, responder.clone()).await;
    }
    let event = direct_message("!guarded", alice);
    extension.process_message(&event, responder).await;

    let provider = extension.provider();
    assert_eq!(provider.scopes_created(), 4);
    assert_eq!(provider.scopes_released(), 4);
}

#[tokio::test]
async fn shutdown_cancels_before_invoke_without_events() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("ping").handle(|_, _| async { Ok(()) })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    extension.shutdown();
    let responder = RecordingResponder::new();
    let event = guild_message("!ping", user(1, "alice"), guild(5));
    let outcome = extension.process_message(&event, responder).await;

    assert!(matches!(
        outcome,
        ProcessOutcome::Completed(ExecutionOutcome::Cancelled)
    ));
    assert_eq!(log.executed_count(), 0);
    assert_eq!(log.errored_count(), 0);
    assert_eq!(extension.provider().scopes_created(), extension.provider().scopes_released());
}

#[tokio::test]
async fn default_error_handler_replies_in_channel() {
    let extension = Extension::builder(ExtensionConfig::default()).build();
    extension.add_command(|| {
        CommandBuilder::new("grp").child(CommandBuilder::new("leaf").handle(|_, _| async { Ok(()) }))
    });
    extension.refresh().await;

    let responder = RecordingResponder::new();
    let event = guild_message("!grp", user(1, "alice"), guild(5));
    extension.process_message(&event, responder.clone()).await;

    let texts = responder.response_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("not executable"), "unexpected report: {}", texts[0]);
}

#[tokio::test]
async fn oversized_error_report_falls_back_to_attachment() {
    let config = ExtensionConfig { message_length_limit: 64, ..Default::default() };
    let extension = Extension::builder(config).build();
    extension.add_command(|| {
        CommandBuilder::new("explode")
            .handle(|_, _| async { Err(anyhow::anyhow!("x".repeat(200))) })
    });
    extension.refresh().await;

    let responder = RecordingResponder::new();
    let event = guild_message("!explode", user(1, "alice"), guild(5));
    extension.process_message(&event, responder.clone()).await;

    let responses = responder.responses.lock();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].attachments.len(), 1);
    assert_eq!(responses[0].attachments[0].filename, "error.txt");
}

#[tokio::test]
async fn follow_ups_are_recorded_in_order() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("multi").handle(|_, ctx| async move {
            ctx.reply("first").await?;
            ctx.follow_up(ResponseMessage::text("second")).await?;
            ctx.follow_up(ResponseMessage::text("third")).await?;
            anyhow::ensure!(ctx.follow_up_ids().len() == 2, "ledger out of sync");
            Ok(())
        })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = guild_message("!multi", user(1, "alice"), guild(5));
    extension.process_message(&event, responder.clone()).await;

    assert_eq!(log.errored_count(), 0, "handler assertion failed");
    assert_eq!(responder.follow_ups.lock().len(), 2);
}
