//! Trigger-source processors.
//!
//! A processor recognizes one kind of inbound event, resolves the addressed
//! command, drives argument conversion and hands the prepared invocation to
//! the executor. Events no processor claims are ignored silently; everything
//! past recognition reports failures through the errored event.

mod menu;
mod slash;
mod text;

pub use menu::{MessageMenuProcessor, UserMenuProcessor};
pub use slash::SlashProcessor;
pub use text::TextProcessor;

use crate::command::CommandParameter;
use crate::context::TriggerKind;
use crate::convert::{ArgumentMap, ArgumentValue, Conversion, ConverterContext, ConverterRegistry};
use crate::error::CommandError;
use crate::executor::ExecutionOutcome;
use crate::extension::Extension;
use crate::transport::{InteractionCreated, MessageCreated, Responder};
use async_trait::async_trait;
use std::sync::Arc;

/// An inbound event offered to the processor chain.
#[derive(Clone, Copy)]
pub enum TriggerEvent<'a> {
    Message(&'a MessageCreated),
    Interaction(&'a InteractionCreated),
}

/// What a processor did with an event.
pub enum ProcessOutcome {
    /// Not addressed to this processor; try the next one.
    Ignored,
    /// The event entered the pipeline and ran to an outcome.
    Completed(ExecutionOutcome),
}

/// One trigger-source front end.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(
        &self,
        extension: &Arc<Extension>,
        event: TriggerEvent<'_>,
        responder: &Arc<dyn Responder>,
    ) -> ProcessOutcome;
}

fn missing_argument(parameter: &CommandParameter) -> CommandError {
    CommandError::ArgumentParse { parameter: parameter.name.clone(), source: None }
}

/// Convert every declared parameter of the addressed command.
///
/// The resulting map always covers the full parameter set: omitted optional
/// parameters get their default or [`ArgumentValue::Absent`]. The first soft
/// conversion failure of a required parameter aborts with an argument-parse
/// error naming the parameter.
pub(crate) async fn convert_arguments(
    cx: &mut ConverterContext<'_>,
    registry: &ConverterRegistry,
) -> Result<ArgumentMap, CommandError> {
    let mut arguments = ArgumentMap::new();

    while let Some(parameter) = cx.next_parameter() {
        let Some(converter) = registry.resolve(parameter.kind, cx.trigger) else {
            return Err(CommandError::ArgumentParse {
                parameter: parameter.name.clone(),
                source: Some(anyhow::anyhow!(
                    "no converter registered for {:?}",
                    parameter.kind
                )),
            });
        };

        if !has_input(cx) {
            if parameter.optional {
                let value = parameter.default.clone().unwrap_or(ArgumentValue::Absent);
                arguments.insert(&parameter.name, value);
                continue;
            }
            return Err(missing_argument(parameter));
        }

        if let Some(max) = parameter.variadic {
            let mut values = Vec::new();
            while values.len() < max && has_input(cx) {
                match converter.convert(cx).await {
                    Ok(Conversion::Value(v)) => {
                        values.push(v);
                        cx.note_variadic_value();
                    }
                    Ok(Conversion::NoValue) => return Err(missing_argument(parameter)),
                    Err(err) => {
                        return Err(CommandError::ArgumentParse {
                            parameter: parameter.name.clone(),
                            source: Some(err),
                        });
                    }
                }
                // Structured triggers deliver one option per parameter.
                if cx.trigger != TriggerKind::TextMessage {
                    break;
                }
            }
            arguments.insert(&parameter.name, ArgumentValue::Many(values));
            continue;
        }

        match converter.convert(cx).await {
            Ok(Conversion::Value(v)) => arguments.insert(&parameter.name, v),
            Ok(Conversion::NoValue) => return Err(missing_argument(parameter)),
            Err(err) => {
                return Err(CommandError::ArgumentParse {
                    parameter: parameter.name.clone(),
                    source: Some(err),
                });
            }
        }
    }

    Ok(arguments)
}

fn has_input(cx: &ConverterContext<'_>) -> bool {
    match cx.trigger {
        TriggerKind::TextMessage => cx.has_more_text(),
        _ => cx.current_option().is_some(),
    }
}
