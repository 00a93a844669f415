//! Slash-command front end.
//!
//! Resolves the addressed command by the platform-assigned id when the table
//! knows it, by name path otherwise, then descends the option tree through
//! subcommand nodes to the leaf and its value options.

use super::{ProcessOutcome, Processor, TriggerEvent, convert_arguments};
use crate::command::Command;
use crate::context::TriggerKind;
use crate::convert::{ArgumentMap, ConverterContext};
use crate::extension::Extension;
use crate::transport::{InteractionKind, InteractionOption, Responder};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct SlashProcessor;

#[async_trait]
impl Processor for SlashProcessor {
    async fn process(
        &self,
        extension: &Arc<Extension>,
        event: TriggerEvent<'_>,
        responder: &Arc<dyn Responder>,
    ) -> ProcessOutcome {
        let TriggerEvent::Interaction(inbound) = event else {
            return ProcessOutcome::Ignored;
        };
        if inbound.kind != InteractionKind::Slash {
            return ProcessOutcome::Ignored;
        }

        let config = extension.config();
        let table = extension.table();
        // The server-assigned id is authoritative; the name path is the
        // fallback when no id mapping was recorded.
        let root = table
            .find_by_interaction_id(inbound.command_id)
            .or_else(|| table.find_root(&inbound.command_name, config.case_insensitive));
        let Some(root) = root.cloned() else {
            debug!(command = %inbound.command_name, "interaction names an unknown command");
            return ProcessOutcome::Ignored;
        };

        let (command, options) =
            descend(root, &inbound.options, config.case_insensitive);

        let arguments = if command.is_group() {
            ArgumentMap::new()
        } else {
            let mut cx = ConverterContext::for_interaction(
                TriggerKind::SlashCommand,
                &command,
                options,
                &inbound.resolved,
                inbound.guild.as_ref(),
                &inbound.channel,
                extension.fetcher().as_ref(),
            );
            let converters = extension.converters();
            match convert_arguments(&mut cx, &converters).await {
                Ok(arguments) => arguments,
                Err(error) => {
                    let ctx = make_interaction_context(
                        extension,
                        inbound,
                        command,
                        ArgumentMap::new(),
                        responder,
                    );
                    return ProcessOutcome::Completed(extension.report_failure(ctx, error).await);
                }
            }
        };

        let ctx = make_interaction_context(extension, inbound, command, arguments, responder);
        ProcessOutcome::Completed(extension.run_invocation(ctx).await)
    }
}

/// Follow valueless options naming children down to the leaf command.
fn descend<'a>(
    mut command: Arc<Command>,
    mut options: &'a [InteractionOption],
    case_insensitive: bool,
) -> (Arc<Command>, &'a [InteractionOption]) {
    loop {
        let subcommand = options
            .first()
            .filter(|o| o.value.is_none())
            .and_then(|o| command.child(&o.name, case_insensitive).cloned().map(|c| (c, o)));
        match subcommand {
            Some((child, node)) => {
                command = child;
                options = &node.options;
            }
            None => return (command, options),
        }
    }
}

pub(super) fn make_interaction_context(
    extension: &Arc<Extension>,
    inbound: &crate::transport::InteractionCreated,
    command: Arc<Command>,
    arguments: ArgumentMap,
    responder: &Arc<dyn Responder>,
) -> Arc<crate::context::CommandContext> {
    let trigger = match inbound.kind {
        InteractionKind::Slash => TriggerKind::SlashCommand,
        InteractionKind::UserMenu => TriggerKind::UserMenu,
        InteractionKind::MessageMenu => TriggerKind::MessageMenu,
    };
    extension.make_context(
        trigger,
        inbound.user.clone(),
        inbound.member.clone(),
        inbound.channel.clone(),
        inbound.guild.clone(),
        command,
        arguments,
        Arc::clone(responder),
        inbound.permissions,
    )
}
