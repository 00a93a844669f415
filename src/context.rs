//! Per-invocation command context.
//!
//! One [`CommandContext`] exists per invocation, created by a processor after
//! argument conversion succeeds and released by the executor's finalize step.
//! Checks and handlers see a fully-populated argument map and one uniform
//! response surface regardless of the trigger source.

use crate::command::Command;
use crate::convert::{ArgumentMap, ArgumentValue};
use crate::entity::{Channel, GuildSnapshot, Member, Message, Permissions, Snowflake, User};
use crate::extension::Extension;
use crate::scope::InvocationScope;
use crate::transport::{PlatformError, Responder, ResponseMessage};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The channel through which a command was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    TextMessage,
    SlashCommand,
    UserMenu,
    MessageMenu,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextMessage => "text",
            Self::SlashCommand => "slash",
            Self::UserMenu => "user_menu",
            Self::MessageMenu => "message_menu",
        }
    }
}

/// Everything a processor hands the executor for one invocation.
pub struct CommandContext {
    /// Correlation id for tracing.
    pub invocation_id: Uuid,
    pub trigger: TriggerKind,
    pub user: User,
    /// Guild member record of the invoker, when in a guild.
    pub member: Option<Member>,
    pub channel: Channel,
    pub guild: Option<GuildSnapshot>,
    pub command: Arc<Command>,
    /// Converted arguments; key set equals the command's parameter set.
    pub arguments: ArgumentMap,
    /// Handle back to the owning extension.
    pub extension: Weak<Extension>,
    /// Cancellation signal threaded through the whole pipeline.
    pub cancellation: CancellationToken,
    responder: Arc<dyn Responder>,
    /// Channel-scoped permissions the platform computed for the trigger,
    /// when it delivered them (interactions do, chat messages do not).
    trigger_permissions: Option<Permissions>,
    /// Append-only ledger of follow-up message ids.
    follow_ups: Mutex<Vec<Snowflake>>,
    scope: Mutex<Option<InvocationScope>>,
}

impl CommandContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        trigger: TriggerKind,
        user: User,
        member: Option<Member>,
        channel: Channel,
        guild: Option<GuildSnapshot>,
        command: Arc<Command>,
        arguments: ArgumentMap,
        extension: Weak<Extension>,
        responder: Arc<dyn Responder>,
        trigger_permissions: Option<Permissions>,
        scope: InvocationScope,
        cancellation: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            invocation_id: Uuid::new_v4(),
            trigger,
            user,
            member,
            channel,
            guild,
            command,
            arguments,
            extension,
            cancellation,
            responder,
            trigger_permissions,
            follow_ups: Mutex::new(Vec::new()),
            scope: Mutex::new(Some(scope)),
        })
    }

    /// Converted value of a named argument.
    pub fn argument(&self, name: &str) -> Option<&ArgumentValue> {
        self.arguments.get(name)
    }

    /// Whether the trigger came from inside a guild.
    pub fn in_guild(&self) -> bool {
        self.guild.is_some()
    }

    /// Permissions of the invoker in the triggering channel.
    ///
    /// The platform-computed value delivered with the trigger wins over the
    /// member record. Direct messages have no permission model; everything is
    /// allowed there.
    pub fn permissions(&self) -> Permissions {
        if self.channel.is_direct() {
            return Permissions::ALL;
        }
        self.trigger_permissions
            .or_else(|| self.member.as_ref().map(|m| m.permissions))
            .unwrap_or_default()
    }

    /// Ids of follow-up messages sent so far, in send order.
    pub fn follow_up_ids(&self) -> Vec<Snowflake> {
        self.follow_ups.lock().clone()
    }

    // ------------------------------------------------------------------
    // Response surface
    // ------------------------------------------------------------------

    /// Send the first reply.
    pub async fn respond(&self, msg: ResponseMessage) -> Result<Snowflake, PlatformError> {
        self.responder.respond(msg).await
    }

    /// Shorthand for a plain-text reply.
    pub async fn reply(&self, content: impl Into<String>) -> Result<Snowflake, PlatformError> {
        self.respond(ResponseMessage::text(content)).await
    }

    /// Acknowledge without content.
    pub async fn defer(&self) -> Result<(), PlatformError> {
        self.responder.defer().await
    }

    pub async fn edit_response(&self, msg: ResponseMessage) -> Result<(), PlatformError> {
        self.responder.edit_response(msg).await
    }

    pub async fn get_response(&self) -> Result<Option<Message>, PlatformError> {
        self.responder.get_response().await
    }

    pub async fn delete_response(&self) -> Result<(), PlatformError> {
        self.responder.delete_response().await
    }

    /// Send an additional message after the first reply and record it in the
    /// follow-up ledger.
    pub async fn follow_up(&self, msg: ResponseMessage) -> Result<Snowflake, PlatformError> {
        let id = self.responder.follow_up(msg).await?;
        self.follow_ups.lock().push(id);
        Ok(id)
    }

    pub async fn edit_follow_up(
        &self,
        id: Snowflake,
        msg: ResponseMessage,
    ) -> Result<(), PlatformError> {
        self.responder.edit_follow_up(id, msg).await
    }

    pub async fn get_follow_up(&self, id: Snowflake) -> Result<Option<Message>, PlatformError> {
        self.responder.get_follow_up(id).await
    }

    pub async fn delete_follow_up(&self, id: Snowflake) -> Result<(), PlatformError> {
        self.responder.delete_follow_up(id).await
    }

    // ------------------------------------------------------------------
    // Scope plumbing (executor only)
    // ------------------------------------------------------------------

    /// Run `f` against the invocation scope. `None` once finalized.
    pub(crate) fn with_scope<R>(&self, f: impl FnOnce(&InvocationScope) -> R) -> Option<R> {
        let guard = self.scope.lock();
        guard.as_ref().map(f)
    }

    /// Release the invocation scope. Idempotent; the executor calls this on
    /// every exit path.
    pub(crate) fn release_scope(&self) {
        if let Some(scope) = self.scope.lock().take() {
            scope.release();
        }
    }
}
