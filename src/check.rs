//! Check registries and the validation pipeline.
//!
//! A check binds to an attribute type: whenever a command (or parameter)
//! carries an attribute of that type, every bound check runs against it.
//! Checks are constructed per invocation from the invocation scope, so
//! implementations can take host services through constructor injection.
//!
//! Failures accumulate; a failing check never stops the ones after it. The
//! executor treats a non-empty failure list as "checks failed" and reports
//! every failure at once.

use crate::command::attributes::{
    CheckAttribute, NumberBounds, RequireDirectMessage, RequireGuild, RequireOwner,
    RequirePermissions, StringLength, Unconditional, attribute_as, attribute_type,
};
use crate::command::CommandParameter;
use crate::context::CommandContext;
use crate::convert::ArgumentValue;
use crate::error::{ContextCheckFailedData, ParameterCheckFailedData};
use crate::scope::InvocationScope;
use async_trait::async_trait;
use std::any::TypeId;
use std::sync::Arc;

/// A command- or group-level validation rule.
///
/// `Ok(None)` passes, `Ok(Some(message))` fails with that message, `Err` fails
/// with the error preserved for diagnostics.
#[async_trait]
pub trait ContextCheck: Send + Sync {
    async fn check(
        &self,
        attribute: &dyn CheckAttribute,
        ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>>;
}

/// A single-argument validation rule. Same result contract as [`ContextCheck`].
#[async_trait]
pub trait ParameterCheck: Send + Sync {
    async fn check(
        &self,
        attribute: &dyn CheckAttribute,
        parameter: &CommandParameter,
        value: &ArgumentValue,
        ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>>;
}

type ContextCheckFactory =
    Arc<dyn Fn(&InvocationScope) -> anyhow::Result<Arc<dyn ContextCheck>> + Send + Sync>;
type ParameterCheckFactory =
    Arc<dyn Fn(&InvocationScope) -> anyhow::Result<Arc<dyn ParameterCheck>> + Send + Sync>;

#[derive(Clone)]
struct ContextEntry {
    attribute: TypeId,
    factory: ContextCheckFactory,
}

#[derive(Clone)]
struct ParameterEntry {
    attribute: TypeId,
    factory: ParameterCheckFactory,
}

/// Registry of context and parameter checks.
///
/// Built while the extension is wired, immutable during dispatch.
#[derive(Clone)]
pub struct CheckRegistry {
    context: Vec<ContextEntry>,
    parameter: Vec<ParameterEntry>,
}

impl CheckRegistry {
    pub fn empty() -> Self {
        Self { context: Vec::new(), parameter: Vec::new() }
    }

    /// Registry with every built-in check bound.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.bind_context::<RequireGuild>(Arc::new(GuildOnlyCheck));
        registry.bind_context::<RequireDirectMessage>(Arc::new(DirectMessageOnlyCheck));
        registry.bind_context::<RequireOwner>(Arc::new(OwnerOnlyCheck));
        registry.bind_context::<RequirePermissions>(Arc::new(PermissionsCheck));
        registry.bind_parameter::<StringLength>(Arc::new(StringLengthCheck));
        registry.bind_parameter::<NumberBounds>(Arc::new(NumberBoundsCheck));
        registry
    }

    /// Bind a shared check instance to attribute type `A`.
    pub fn bind_context<A: 'static>(&mut self, check: Arc<dyn ContextCheck>) {
        self.add_context_factory::<A>(move |_| Ok(Arc::clone(&check)));
    }

    /// Bind a per-invocation constructed check to attribute type `A`.
    pub fn add_context_factory<A: 'static>(
        &mut self,
        factory: impl Fn(&InvocationScope) -> anyhow::Result<Arc<dyn ContextCheck>>
        + Send
        + Sync
        + 'static,
    ) {
        self.context.push(ContextEntry {
            attribute: TypeId::of::<A>(),
            factory: Arc::new(factory),
        });
    }

    pub fn bind_parameter<A: 'static>(&mut self, check: Arc<dyn ParameterCheck>) {
        self.add_parameter_factory::<A>(move |_| Ok(Arc::clone(&check)));
    }

    pub fn add_parameter_factory<A: 'static>(
        &mut self,
        factory: impl Fn(&InvocationScope) -> anyhow::Result<Arc<dyn ParameterCheck>>
        + Send
        + Sync
        + 'static,
    ) {
        self.parameter.push(ParameterEntry {
            attribute: TypeId::of::<A>(),
            factory: Arc::new(factory),
        });
    }

    /// Run the full context-check stage for one invocation.
    ///
    /// Unconditional checks run first, then the flattened attribute list of
    /// the command and its ancestors in reverse, so the outermost group's
    /// checks execute before the command's own. Every check runs even when an
    /// earlier one already failed.
    pub async fn execute_context_checks(
        &self,
        ctx: &CommandContext,
    ) -> Vec<ContextCheckFailedData> {
        let mut failures = Vec::new();

        static UNCONDITIONAL: Unconditional = Unconditional;
        for entry in self.context_entries(TypeId::of::<Unconditional>()) {
            self.run_context_entry(entry, &UNCONDITIONAL, ctx, &mut failures, || {
                Arc::new(Unconditional)
            })
            .await;
        }

        // Self first, ancestors appended; reversed for outermost-first order.
        let chain = ctx.command.self_and_ancestors();
        let attributes: Vec<Arc<dyn CheckAttribute>> = chain
            .iter()
            .flat_map(|node| node.checks.iter().cloned())
            .collect();

        for attribute in attributes.iter().rev() {
            for entry in self.context_entries(attribute_type(attribute.as_ref())) {
                self.run_context_entry(entry, attribute.as_ref(), ctx, &mut failures, || {
                    Arc::clone(attribute)
                })
                .await;
            }
        }
        failures
    }

    /// Run the parameter-check stage: each parameter in declaration order,
    /// each of its attributes against every bound check.
    pub async fn execute_parameter_checks(
        &self,
        ctx: &CommandContext,
    ) -> Vec<ParameterCheckFailedData> {
        let mut failures = Vec::new();

        for parameter in &ctx.command.parameters {
            let Some(value) = ctx.arguments.get(&parameter.name) else {
                // Processors populate every declared parameter before the
                // executor runs; a hole here is a pipeline bug.
                continue;
            };
            for attribute in &parameter.checks {
                for entry in self.parameter_entries(attribute_type(attribute.as_ref())) {
                    let check = match self.construct_parameter(entry, ctx) {
                        Ok(check) => check,
                        Err(err) => {
                            failures.push(ParameterCheckFailedData {
                                parameter: parameter.name.clone(),
                                attribute: Arc::clone(attribute),
                                message: err.to_string(),
                                source: Some(err),
                            });
                            continue;
                        }
                    };
                    match check.check(attribute.as_ref(), parameter, value, ctx).await {
                        Ok(None) => {}
                        Ok(Some(message)) => failures.push(ParameterCheckFailedData {
                            parameter: parameter.name.clone(),
                            attribute: Arc::clone(attribute),
                            message,
                            source: None,
                        }),
                        Err(err) => failures.push(ParameterCheckFailedData {
                            parameter: parameter.name.clone(),
                            attribute: Arc::clone(attribute),
                            message: err.to_string(),
                            source: Some(err),
                        }),
                    }
                }
            }
        }
        failures
    }

    fn context_entries(&self, attribute: TypeId) -> impl Iterator<Item = &ContextEntry> {
        self.context.iter().filter(move |e| e.attribute == attribute)
    }

    fn parameter_entries(&self, attribute: TypeId) -> impl Iterator<Item = &ParameterEntry> {
        self.parameter.iter().filter(move |e| e.attribute == attribute)
    }

    async fn run_context_entry(
        &self,
        entry: &ContextEntry,
        attribute: &dyn CheckAttribute,
        ctx: &CommandContext,
        failures: &mut Vec<ContextCheckFailedData>,
        record_attribute: impl Fn() -> Arc<dyn CheckAttribute>,
    ) {
        let check = match ctx
            .with_scope(|scope| (entry.factory)(scope))
            .unwrap_or_else(|| Err(anyhow::anyhow!("invocation scope already released")))
        {
            Ok(check) => check,
            Err(err) => {
                failures.push(ContextCheckFailedData {
                    attribute: record_attribute(),
                    message: err.to_string(),
                    source: Some(err),
                });
                return;
            }
        };
        match check.check(attribute, ctx).await {
            Ok(None) => {}
            Ok(Some(message)) => failures.push(ContextCheckFailedData {
                attribute: record_attribute(),
                message,
                source: None,
            }),
            Err(err) => failures.push(ContextCheckFailedData {
                attribute: record_attribute(),
                message: err.to_string(),
                source: Some(err),
            }),
        }
    }

    fn construct_parameter(
        &self,
        entry: &ParameterEntry,
        ctx: &CommandContext,
    ) -> anyhow::Result<Arc<dyn ParameterCheck>> {
        ctx.with_scope(|scope| (entry.factory)(scope))
            .unwrap_or_else(|| Err(anyhow::anyhow!("invocation scope already released")))
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ============================================================================
// Built-in checks
// ============================================================================

struct GuildOnlyCheck;

#[async_trait]
impl ContextCheck for GuildOnlyCheck {
    async fn check(
        &self,
        _attribute: &dyn CheckAttribute,
        ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>> {
        if ctx.in_guild() {
            Ok(None)
        } else {
            Ok(Some("this command can only be used in a guild".to_string()))
        }
    }
}

struct DirectMessageOnlyCheck;

#[async_trait]
impl ContextCheck for DirectMessageOnlyCheck {
    async fn check(
        &self,
        _attribute: &dyn CheckAttribute,
        ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>> {
        if ctx.channel.is_direct() {
            Ok(None)
        } else {
            Ok(Some("this command can only be used in a direct message".to_string()))
        }
    }
}

struct OwnerOnlyCheck;

#[async_trait]
impl ContextCheck for OwnerOnlyCheck {
    async fn check(
        &self,
        _attribute: &dyn CheckAttribute,
        ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>> {
        let owners = ctx
            .extension
            .upgrade()
            .map(|ext| ext.config().owner_ids.clone())
            .unwrap_or_default();
        if owners.contains(&ctx.user.id) {
            Ok(None)
        } else {
            Ok(Some("this command is restricted to the bot owner".to_string()))
        }
    }
}

struct PermissionsCheck;

#[async_trait]
impl ContextCheck for PermissionsCheck {
    async fn check(
        &self,
        attribute: &dyn CheckAttribute,
        ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>> {
        let required = attribute_as::<RequirePermissions>(attribute)
            .ok_or_else(|| anyhow::anyhow!("permissions check bound to a foreign attribute"))?
            .0;
        if ctx.permissions().contains(required) {
            Ok(None)
        } else {
            Ok(Some(format!(
                "missing required permissions (0x{:x})",
                ctx.permissions().missing(required).0
            )))
        }
    }
}

struct StringLengthCheck;

#[async_trait]
impl ParameterCheck for StringLengthCheck {
    async fn check(
        &self,
        attribute: &dyn CheckAttribute,
        parameter: &CommandParameter,
        value: &ArgumentValue,
        _ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>> {
        let bounds = attribute_as::<StringLength>(attribute)
            .ok_or_else(|| anyhow::anyhow!("string length check bound to a foreign attribute"))?;
        let Some(text) = value.as_str() else { return Ok(None) };
        let len = text.chars().count();
        if bounds.min.is_some_and(|min| len < min) {
            return Ok(Some(format!(
                "'{}' must be at least {} character(s)",
                parameter.name,
                bounds.min.unwrap_or(0)
            )));
        }
        if bounds.max.is_some_and(|max| len > max) {
            return Ok(Some(format!(
                "'{}' must be at most {} character(s)",
                parameter.name,
                bounds.max.unwrap_or(0)
            )));
        }
        Ok(None)
    }
}

struct NumberBoundsCheck;

#[async_trait]
impl ParameterCheck for NumberBoundsCheck {
    async fn check(
        &self,
        attribute: &dyn CheckAttribute,
        parameter: &CommandParameter,
        value: &ArgumentValue,
        _ctx: &CommandContext,
    ) -> anyhow::Result<Option<String>> {
        let bounds = attribute_as::<NumberBounds>(attribute)
            .ok_or_else(|| anyhow::anyhow!("number bounds check bound to a foreign attribute"))?;
        let Some(number) = value.as_float() else { return Ok(None) };
        if bounds.min.is_some_and(|min| number < min) {
            return Ok(Some(format!(
                "'{}' must be at least {}",
                parameter.name,
                bounds.min.unwrap_or(f64::NEG_INFINITY)
            )));
        }
        if bounds.max.is_some_and(|max| number > max) {
            return Ok(Some(format!(
                "'{}' must be at most {}",
                parameter.name,
                bounds.max.unwrap_or(f64::INFINITY)
            )));
        }
        Ok(None)
    }
}
