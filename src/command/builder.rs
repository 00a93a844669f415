//! Command and parameter builders.
//!
//! The builder is the explicit, testable transformation from a declarative
//! description to an immutable [`Command`] tree. Validation happens here,
//! once, at registration/refresh time; a failed build is reported for that
//! command only and the rest of the batch proceeds.

use crate::command::attributes::CheckAttribute;
use crate::command::{Command, CommandParameter, Handler, HandlerFn, Receiver, ReceiverSource, ReturnValue};
use crate::context::CommandContext;
use crate::convert::{ArgKind, ArgumentValue, EnumSpec};
use crate::error::BuildError;
use crate::scope::InvocationScope;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

/// Builder for one [`CommandParameter`].
pub struct ParameterBuilder {
    name: String,
    description: String,
    kind: ArgKind,
    enum_spec: Option<Arc<EnumSpec>>,
    optional: bool,
    default: Option<ArgumentValue>,
    remaining: bool,
    variadic: Option<usize>,
    checks: Vec<Arc<dyn CheckAttribute>>,
}

impl ParameterBuilder {
    pub fn new(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            enum_spec: None,
            optional: false,
            default: None,
            remaining: false,
            variadic: None,
            checks: Vec::new(),
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn enumeration(mut self, spec: Arc<EnumSpec>) -> Self {
        self.kind = ArgKind::Enum;
        self.enum_spec = Some(spec);
        self
    }

    /// Mark the parameter optional; omitted input yields `Absent`.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark optional with a default used when input is omitted.
    pub fn default_value(mut self, value: ArgumentValue) -> Self {
        self.optional = true;
        self.default = Some(value);
        self
    }

    /// Consume the remaining text verbatim (text triggers).
    pub fn remaining(mut self) -> Self {
        self.remaining = true;
        self
    }

    /// Accept up to `max` repeated values.
    pub fn variadic(mut self, max: usize) -> Self {
        self.variadic = Some(max);
        self
    }

    /// Attach a parameter-check attribute.
    pub fn check(mut self, attribute: impl CheckAttribute) -> Self {
        self.checks.push(Arc::new(attribute));
        self
    }

    fn build(self) -> CommandParameter {
        CommandParameter {
            name: self.name,
            description: self.description,
            kind: self.kind,
            enum_spec: self.enum_spec,
            optional: self.optional,
            default: self.default,
            remaining: self.remaining,
            variadic: self.variadic,
            checks: self.checks,
        }
    }
}

/// Builder for one [`Command`] node and its subtree.
pub struct CommandBuilder {
    name: String,
    aliases: Vec<String>,
    description: String,
    hidden: bool,
    receiver: ReceiverSource,
    handler: Option<Handler>,
    parameters: Vec<ParameterBuilder>,
    checks: Vec<Arc<dyn CheckAttribute>>,
    children: Vec<CommandBuilder>,
}

impl CommandBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            hidden: false,
            receiver: ReceiverSource::None,
            handler: None,
            parameters: Vec::new(),
            checks: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn parameter(mut self, parameter: ParameterBuilder) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Attach a context-check attribute.
    pub fn check(mut self, attribute: impl CheckAttribute) -> Self {
        self.checks.push(Arc::new(attribute));
        self
    }

    pub fn child(mut self, child: CommandBuilder) -> Self {
        self.children.push(child);
        self
    }

    /// Bind the handler to a pre-built receiver instance.
    pub fn bind(mut self, receiver: Receiver) -> Self {
        self.receiver = ReceiverSource::Bound(receiver);
        if let Some(handler) = &mut self.handler {
            handler.receiver = self.receiver.clone();
        }
        self
    }

    /// Synchronous handler, no return value.
    pub fn handle_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<Receiver>, Arc<CommandContext>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        let receiver = self.take_receiver();
        self.handler = Some(Handler { receiver, func: HandlerFn::Sync(Arc::new(f)) });
        self
    }

    /// Asynchronous handler, no return value.
    pub fn handle<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Option<Receiver>, Arc<CommandContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let receiver = self.take_receiver();
        self.handler = Some(Handler {
            receiver,
            func: HandlerFn::Async(Arc::new(move |recv, ctx| {
                let fut = f(recv, ctx);
                Box::pin(async move {
                    fut.await?;
                    Ok(None)
                })
            })),
        });
        self
    }

    /// Asynchronous handler producing a return value for the executed event.
    pub fn handle_with_value<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Option<Receiver>, Arc<CommandContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ReturnValue>> + Send + 'static,
    {
        let receiver = self.take_receiver();
        self.handler = Some(Handler {
            receiver,
            func: HandlerFn::Async(Arc::new(move |recv, ctx| {
                let fut = f(recv, ctx);
                Box::pin(async move { fut.await.map(Some) })
            })),
        });
        self
    }

    /// Construct the receiver from the invocation scope when the handler runs.
    pub fn receiver_factory<F>(mut self, f: F) -> Self
    where
        F: Fn(&InvocationScope) -> anyhow::Result<Receiver> + Send + Sync + 'static,
    {
        self.receiver = ReceiverSource::Scoped(Arc::new(f));
        if let Some(handler) = &mut self.handler {
            handler.receiver = self.receiver.clone();
        }
        self
    }

    fn take_receiver(&mut self) -> ReceiverSource {
        self.receiver.clone()
    }

    /// Build the immutable command tree, validating the whole subtree.
    pub fn build(self, name_limit: usize) -> Result<Arc<Command>, BuildError> {
        validate_name(&self.name, name_limit)?;
        for alias in &self.aliases {
            validate_name(alias, name_limit)?;
        }

        if self.handler.is_none() && self.children.is_empty() {
            return Err(BuildError::NoHandlerOrChildren(self.name));
        }

        validate_parameters(&self.name, &self.parameters)?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut children = Vec::with_capacity(self.children.len());
        for child in self.children {
            for name in std::iter::once(&child.name).chain(child.aliases.iter()) {
                if !seen.insert(name.clone()) {
                    return Err(BuildError::DuplicateName(name.clone()));
                }
            }
            children.push(child.build(name_limit)?);
        }

        Ok(Command::new_node(
            self.name,
            self.aliases,
            self.description,
            self.hidden,
            self.handler,
            self.parameters.into_iter().map(ParameterBuilder::build).collect(),
            self.checks,
            children,
        ))
    }
}

fn validate_name(name: &str, limit: usize) -> Result<(), BuildError> {
    if name.is_empty() {
        return Err(BuildError::EmptyName);
    }
    if name.chars().count() > limit {
        return Err(BuildError::NameTooLong(name.to_string(), limit));
    }
    if name.chars().any(char::is_whitespace) {
        return Err(BuildError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate_parameters(command: &str, parameters: &[ParameterBuilder]) -> Result<(), BuildError> {
    let mut seen = HashSet::new();
    let mut saw_optional = false;
    let last = parameters.len().saturating_sub(1);

    for (i, param) in parameters.iter().enumerate() {
        if !seen.insert(param.name.clone()) {
            return Err(BuildError::DuplicateParameter {
                command: command.to_string(),
                parameter: param.name.clone(),
            });
        }
        if param.remaining && i != last {
            return Err(BuildError::RemainingNotLast {
                command: command.to_string(),
                parameter: param.name.clone(),
            });
        }
        if param.variadic.is_some() && i != last {
            return Err(BuildError::VariadicNotLast {
                command: command.to_string(),
                parameter: param.name.clone(),
            });
        }
        if param.optional {
            saw_optional = true;
        } else if saw_optional {
            return Err(BuildError::RequiredAfterOptional {
                command: command.to_string(),
                parameter: param.name.clone(),
            });
        }
    }
    Ok(())
}
