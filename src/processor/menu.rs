//! Context-menu front ends.
//!
//! Menu invocations carry no typed options; the single argument is the
//! targeted user or message, delivered through the interaction's resolved
//! side-table.

use super::slash::make_interaction_context;
use super::{ProcessOutcome, Processor, TriggerEvent};
use crate::command::Command;
use crate::convert::{ArgKind, ArgumentMap, ArgumentValue};
use crate::error::CommandError;
use crate::extension::Extension;
use crate::transport::{InteractionCreated, InteractionKind, Responder};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

pub struct UserMenuProcessor;

#[async_trait]
impl Processor for UserMenuProcessor {
    async fn process(
        &self,
        extension: &Arc<Extension>,
        event: TriggerEvent<'_>,
        responder: &Arc<dyn Responder>,
    ) -> ProcessOutcome {
        let TriggerEvent::Interaction(inbound) = event else {
            return ProcessOutcome::Ignored;
        };
        if inbound.kind != InteractionKind::UserMenu {
            return ProcessOutcome::Ignored;
        }
        dispatch_menu(extension, inbound, responder, resolve_user_target).await
    }
}

pub struct MessageMenuProcessor;

#[async_trait]
impl Processor for MessageMenuProcessor {
    async fn process(
        &self,
        extension: &Arc<Extension>,
        event: TriggerEvent<'_>,
        responder: &Arc<dyn Responder>,
    ) -> ProcessOutcome {
        let TriggerEvent::Interaction(inbound) = event else {
            return ProcessOutcome::Ignored;
        };
        if inbound.kind != InteractionKind::MessageMenu {
            return ProcessOutcome::Ignored;
        }
        dispatch_menu(extension, inbound, responder, resolve_message_target).await
    }
}

async fn dispatch_menu(
    extension: &Arc<Extension>,
    inbound: &InteractionCreated,
    responder: &Arc<dyn Responder>,
    resolve: fn(&InteractionCreated, ArgKind) -> Option<ArgumentValue>,
) -> ProcessOutcome {
    let config = extension.config();
    let table = extension.table();
    let command = table
        .find_by_interaction_id(inbound.command_id)
        .or_else(|| table.find_root(&inbound.command_name, config.case_insensitive));
    let Some(command) = command.cloned() else {
        debug!(command = %inbound.command_name, "menu interaction names an unknown command");
        return ProcessOutcome::Ignored;
    };

    let arguments = match target_arguments(&command, inbound, resolve) {
        Ok(arguments) => arguments,
        Err(error) => {
            let ctx =
                make_interaction_context(extension, inbound, command, ArgumentMap::new(), responder);
            return ProcessOutcome::Completed(extension.report_failure(ctx, error).await);
        }
    };

    let ctx = make_interaction_context(extension, inbound, command, arguments, responder);
    ProcessOutcome::Completed(extension.run_invocation(ctx).await)
}

/// Populate the command's single parameter with the menu target.
///
/// A handler with any other parameter shape falls through to the executor's
/// arity validation.
fn target_arguments(
    command: &Arc<Command>,
    inbound: &InteractionCreated,
    resolve: fn(&InteractionCreated, ArgKind) -> Option<ArgumentValue>,
) -> Result<ArgumentMap, CommandError> {
    let mut arguments = ArgumentMap::new();
    let Some(parameter) = command.parameters.first().filter(|_| command.parameters.len() == 1)
    else {
        return Ok(arguments);
    };
    match resolve(inbound, parameter.kind) {
        Some(value) => {
            arguments.insert(&parameter.name, value);
            Ok(arguments)
        }
        None => Err(CommandError::ArgumentParse {
            parameter: parameter.name.clone(),
            source: None,
        }),
    }
}

fn resolve_user_target(inbound: &InteractionCreated, kind: ArgKind) -> Option<ArgumentValue> {
    let id = inbound.target_id?;
    match kind {
        ArgKind::Member => inbound
            .resolved
            .members
            .get(&id)
            .cloned()
            .map(ArgumentValue::Member),
        ArgKind::User => inbound
            .resolved
            .users
            .get(&id)
            .cloned()
            .map(ArgumentValue::User)
            .or_else(|| {
                inbound
                    .resolved
                    .members
                    .get(&id)
                    .map(|m| ArgumentValue::User(m.user.clone()))
            }),
        _ => None,
    }
}

fn resolve_message_target(inbound: &InteractionCreated, kind: ArgKind) -> Option<ArgumentValue> {
    let id = inbound.target_id?;
    match kind {
        ArgKind::Message => inbound
            .resolved
            .messages
            .get(&id)
            .cloned()
            .map(ArgumentValue::Message),
        _ => None,
    }
}
