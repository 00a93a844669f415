//! Integration tests for argument conversion across trigger sources.

mod common;

use common::{CannedFetcher, EventLog, RecordingResponder, guild, guild_message, user};
use cordial::command::{CommandBuilder, ParameterBuilder};
use cordial::config::ExtensionConfig;
use cordial::convert::{ArgKind, ArgumentValue, EnumSpec};
use cordial::entity::{Member, Permissions, Snowflake};
use cordial::extension::Extension;
use cordial::transport::InteractionCreated;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn quiet_config() -> ExtensionConfig {
    ExtensionConfig { enable_default_error_handler: false, ..Default::default() }
}

/// Captures the argument map the handler observed.
type SeenArgs = Arc<Mutex<Vec<(String, ArgumentValue)>>>;

fn capture_handler(
    seen: SeenArgs,
) -> impl Fn(
    Option<cordial::command::Receiver>,
    Arc<cordial::context::CommandContext>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send>>
+ Send
+ Sync
+ 'static {
    move |_, ctx| {
        let seen = Arc::clone(&seen);
        Box::pin(async move {
            let mut out = seen.lock();
            for (name, value) in ctx.arguments.iter() {
                out.push((name.to_string(), value.clone()));
            }
            Ok(())
        })
    }
}

#[tokio::test]
async fn parse_failure_names_the_parameter_and_skips_the_handler() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("remind")
            .parameter(ParameterBuilder::new("when", ArgKind::Duration))
            .parameter(ParameterBuilder::new("note", ArgKind::String).remaining())
            .handle(|_, _| async { Ok(()) })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    let event = guild_message("!remind notaduration buy milk", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    assert_eq!(log.executed_count(), 0);
    let errored = log.errored.lock();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].0, "argument_parse");
    assert!(errored[0].1.contains("'when'"), "report: {}", errored[0].1);

    // The handler never ran, so the counter never moved.
    let table = extension.table();
    assert_eq!(table.find_root("remind", false).expect("registered").invocation_count(), 0);
}

#[tokio::test]
async fn duration_and_remaining_text_convert_from_one_message() {
    let extension = Extension::builder(quiet_config()).build();
    let seen: SeenArgs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    extension.add_command(move || {
        CommandBuilder::new("remind")
            .parameter(ParameterBuilder::new("when", ArgKind::Duration))
            .parameter(ParameterBuilder::new("note", ArgKind::String).remaining())
            .handle(capture_handler(Arc::clone(&captured)))
    });
    extension.refresh().await;

    let responder = RecordingResponder::new();
    let event = guild_message("!remind 2h30m buy  milk", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    let seen = seen.lock();
    assert_eq!(seen[0].1, ArgumentValue::Duration(Duration::from_secs(2 * 3600 + 30 * 60)));
    // Remaining text is verbatim, inner whitespace preserved.
    assert_eq!(seen[1].1, ArgumentValue::Str("buy  milk".to_string()));
}

#[tokio::test]
async fn quoted_tokens_group_and_optionals_default() {
    let extension = Extension::builder(quiet_config()).build();
    let seen: SeenArgs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    extension.add_command(move || {
        CommandBuilder::new("greet")
            .parameter(ParameterBuilder::new("who", ArgKind::String))
            .parameter(
                ParameterBuilder::new("times", ArgKind::I32)
                    .default_value(ArgumentValue::Int(1)),
            )
            .parameter(ParameterBuilder::new("loud", ArgKind::Bool).optional())
            .handle(capture_handler(Arc::clone(&captured)))
    });
    extension.refresh().await;

    let responder = RecordingResponder::new();
    let event = guild_message(r#"!greet "dear friend""#, user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    let seen = seen.lock();
    assert_eq!(seen[0].1, ArgumentValue::Str("dear friend".to_string()));
    assert_eq!(seen[1].1, ArgumentValue::Int(1));
    assert_eq!(seen[2].1, ArgumentValue::Absent);
}

#[tokio::test]
async fn variadic_collects_trailing_values() {
    let extension = Extension::builder(quiet_config()).build();
    let seen: SeenArgs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    extension.add_command(move || {
        CommandBuilder::new("sum")
            .parameter(ParameterBuilder::new("values", ArgKind::I64).variadic(5))
            .handle(capture_handler(Arc::clone(&captured)))
    });
    extension.refresh().await;

    let responder = RecordingResponder::new();
    let event = guild_message("!sum 1 2 3", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    let seen = seen.lock();
    assert_eq!(
        seen[0].1,
        ArgumentValue::Many(vec![
            ArgumentValue::Int(1),
            ArgumentValue::Int(2),
            ArgumentValue::Int(3),
        ])
    );
}

#[tokio::test]
async fn enum_parameter_matches_variant_names() {
    let extension = Extension::builder(quiet_config()).build();
    let seen: SeenArgs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    extension.add_command(move || {
        CommandBuilder::new("mode")
            .parameter(
                ParameterBuilder::new("level", ArgKind::Enum)
                    .enumeration(EnumSpec::new([("Quiet", 0), ("Loud", 1)])),
            )
            .handle(capture_handler(Arc::clone(&captured)))
    });
    extension.refresh().await;

    let responder = RecordingResponder::new();
    let event = guild_message("!mode loud", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    let seen = seen.lock();
    assert_eq!(seen[0].1, ArgumentValue::Choice { name: "Loud".to_string(), value: 1 });
}

#[tokio::test]
async fn user_mention_resolves_through_guild_directory() {
    let extension = Extension::builder(quiet_config()).build();
    let seen: SeenArgs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    extension.add_command(move || {
        CommandBuilder::new("whois")
            .parameter(ParameterBuilder::new("target", ArgKind::User))
            .handle(capture_handler(Arc::clone(&captured)))
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let mut snapshot = guild(5);
    snapshot.members.insert(
        Snowflake(42),
        Member {
            user: user(42, "bob"),
            nick: None,
            roles: Vec::new(),
            permissions: Permissions::default(),
        },
    );

    let responder = RecordingResponder::new();
    let event = guild_message("!whois <@42>", user(1, "alice"), snapshot.clone());
    extension.process_message(&event, responder.clone()).await;
    assert_eq!(seen.lock()[0].1, ArgumentValue::User(user(42, "bob")));

    // Unknown ids fall through fetch to a soft parse failure.
    let event = guild_message("!whois <@999>", user(1, "alice"), snapshot);
    extension.process_message(&event, responder).await;
    let errored = log.errored.lock();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].0, "argument_parse");
}

#[tokio::test]
async fn fetcher_backfills_users_missing_from_the_guild() {
    let mut fetcher = CannedFetcher::default();
    fetcher.users.insert(Snowflake(77), user(77, "carol"));
    let extension = Extension::builder(quiet_config()).fetcher(Arc::new(fetcher)).build();
    let seen: SeenArgs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    extension.add_command(move || {
        CommandBuilder::new("whois")
            .parameter(ParameterBuilder::new("target", ArgKind::User))
            .handle(capture_handler(Arc::clone(&captured)))
    });
    extension.refresh().await;

    let responder = RecordingResponder::new();
    let event = guild_message("!whois 77", user(1, "alice"), guild(5));
    extension.process_message(&event, responder).await;

    assert_eq!(seen.lock()[0].1, ArgumentValue::User(user(77, "carol")));
}

#[tokio::test]
async fn slash_interaction_descends_to_the_subcommand() {
    let extension = Extension::builder(quiet_config()).build();
    let seen: SeenArgs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    extension.add_command(move || {
        CommandBuilder::new("config").child(
            CommandBuilder::new("set")
                .parameter(ParameterBuilder::new("key", ArgKind::String))
                .parameter(ParameterBuilder::new("count", ArgKind::I32))
                .handle(capture_handler(Arc::clone(&captured))),
        )
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    // Wire-shaped payload, as the gateway layer would deliver it.
    let interaction: InteractionCreated = serde_json::from_value(serde_json::json!({
        "id": 900,
        "token": "tok",
        "kind": "slash",
        "command_id": 1234,
        "command_name": "config",
        "options": [{
            "name": "set",
            "options": [
                { "name": "key", "value": { "string": "volume" } },
                { "name": "count", "value": { "integer": 7 } }
            ]
        }],
        "user": { "id": 1, "name": "alice" },
        "channel": { "id": 10, "name": "general", "kind": "text", "guild_id": 5 }
    }))
    .expect("interaction payload should deserialize");

    let responder = RecordingResponder::new();
    extension.process_interaction(&interaction, responder).await;

    assert_eq!(log.executed.lock().as_slice(), ["config.set".to_string()]);
    let seen = seen.lock();
    assert_eq!(seen[0].1, ArgumentValue::Str("volume".to_string()));
    assert_eq!(seen[1].1, ArgumentValue::Int(7));
}

#[tokio::test]
async fn user_menu_target_comes_from_resolved_data() {
    let extension = Extension::builder(quiet_config()).build();
    let seen: SeenArgs = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&seen);
    extension.add_command(move || {
        CommandBuilder::new("inspect")
            .parameter(ParameterBuilder::new("target", ArgKind::User))
            .handle(capture_handler(Arc::clone(&captured)))
    });
    extension.refresh().await;

    let interaction: InteractionCreated = serde_json::from_value(serde_json::json!({
        "id": 901,
        "token": "tok",
        "kind": "user_menu",
        "command_id": 1234,
        "command_name": "inspect",
        "target_id": 42,
        "resolved": { "users": { "42": { "id": 42, "name": "bob" } } },
        "user": { "id": 1, "name": "alice" },
        "channel": { "id": 10, "name": "general", "kind": "text", "guild_id": 5 }
    }))
    .expect("interaction payload should deserialize");

    let responder = RecordingResponder::new();
    extension.process_interaction(&interaction, responder).await;

    assert_eq!(seen.lock()[0].1, ArgumentValue::User(user(42, "bob")));
}

#[tokio::test]
async fn menu_command_with_wrong_arity_is_not_executable() {
    let extension = Extension::builder(quiet_config()).build();
    extension.add_command(|| {
        CommandBuilder::new("inspect")
            .parameter(ParameterBuilder::new("target", ArgKind::User))
            .parameter(ParameterBuilder::new("extra", ArgKind::String))
            .handle(|_, _| async { Ok(()) })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let interaction: InteractionCreated = serde_json::from_value(serde_json::json!({
        "id": 902,
        "token": "tok",
        "kind": "user_menu",
        "command_id": 1234,
        "command_name": "inspect",
        "target_id": 42,
        "resolved": { "users": { "42": { "id": 42, "name": "bob" } } },
        "user": { "id": 1, "name": "alice" },
        "channel": { "id": 10, "name": "general", "kind": "text", "guild_id": 5 }
    }))
    .expect("interaction payload should deserialize");

    let responder = RecordingResponder::new();
    extension.process_interaction(&interaction, responder).await;

    let errored = log.errored.lock();
    assert_eq!(errored.len(), 1);
    assert_eq!(errored[0].0, "not_executable");
}

#[tokio::test]
async fn case_insensitive_lookup_honors_config() {
    let config = ExtensionConfig {
        case_insensitive: true,
        enable_default_error_handler: false,
        ..Default::default()
    };
    let extension = Extension::builder(config).build();
    extension.add_command(|| {
        CommandBuilder::new("Ping").alias("p").handle(|_, _| async { Ok(()) })
    });
    extension.refresh().await;
    let log = EventLog::attach(&extension);

    let responder = RecordingResponder::new();
    for content in ["!ping", "!PING", "!P"] {
        let event = guild_message(content, user(1, "alice"), guild(5));
        extension.process_message(&event, responder.clone()).await;
    }
    assert_eq!(log.executed_count(), 3);
}
