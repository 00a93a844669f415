//! Seams to the platform layer.
//!
//! The pipeline neither speaks the gateway protocol nor performs REST calls.
//! Inbound it receives the event shapes below from whatever delivers gateway
//! payloads; outbound it calls the [`Responder`], [`ObjectFetcher`] and
//! [`CommandRegistrar`] traits, implemented by the host's API client.

use crate::entity::{
    Attachment, Channel, Emoji, GuildSnapshot, Member, Message, Permissions, Role, Snowflake, User,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// Inbound events
// ============================================================================

/// A chat message observed by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageCreated {
    pub message: Message,
    pub channel: Channel,
    /// Present for guild messages; `None` in direct messages.
    #[serde(default)]
    pub guild: Option<GuildSnapshot>,
    /// Guild member record of the author, when in a guild.
    #[serde(default)]
    pub member: Option<Member>,
}

/// What kind of application command an interaction invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Slash,
    UserMenu,
    MessageMenu,
}

/// One node of an interaction's option tree.
///
/// Subcommand groups and subcommands carry nested `options`; value options
/// carry a [`OptionValue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionOption {
    pub name: String,
    #[serde(default)]
    pub value: Option<OptionValue>,
    #[serde(default)]
    pub options: Vec<InteractionOption>,
}

/// A typed value delivered in a structured interaction option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    User(Snowflake),
    Channel(Snowflake),
    Role(Snowflake),
    Mentionable(Snowflake),
}

/// Side-table of objects the platform pre-fetched for an interaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedData {
    #[serde(default)]
    pub users: HashMap<Snowflake, User>,
    #[serde(default)]
    pub members: HashMap<Snowflake, Member>,
    #[serde(default)]
    pub channels: HashMap<Snowflake, Channel>,
    #[serde(default)]
    pub roles: HashMap<Snowflake, Role>,
    #[serde(default)]
    pub messages: HashMap<Snowflake, Message>,
}

impl ResolvedData {
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.members.is_empty()
            && self.channels.is_empty()
            && self.roles.is_empty()
            && self.messages.is_empty()
    }
}

/// An application-command interaction delivered by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionCreated {
    pub id: Snowflake,
    pub token: String,
    pub kind: InteractionKind,
    /// Server-assigned id of the invoked application command.
    pub command_id: Snowflake,
    /// Top-level command name.
    pub command_name: String,
    #[serde(default)]
    pub options: Vec<InteractionOption>,
    /// Target of a context-menu invocation.
    #[serde(default)]
    pub target_id: Option<Snowflake>,
    #[serde(default)]
    pub resolved: ResolvedData,
    pub user: User,
    #[serde(default)]
    pub member: Option<Member>,
    pub channel: Channel,
    #[serde(default)]
    pub guild: Option<GuildSnapshot>,
    /// Permissions the platform computed for the invoking member in the
    /// triggering channel; `None` when the payload omits them.
    #[serde(default)]
    pub permissions: Option<Permissions>,
}

// ============================================================================
// Outbound traits
// ============================================================================

/// Content of an outbound response or follow-up.
#[derive(Debug, Clone, Default)]
pub struct ResponseMessage {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl ResponseMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), attachments: Vec::new() }
    }

    pub fn with_attachment(mut self, filename: impl Into<String>, data: Vec<u8>) -> Self {
        self.attachments.push(Attachment { filename: filename.into(), data });
        self
    }
}

/// Error from the platform REST layer.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The referenced object does not exist (or is not visible).
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Uniform response surface for one invocation.
///
/// Each trigger source implements these in terms of its own mechanics (channel
/// messages for text commands, interaction webhooks for the rest); the
/// pipeline and checks only ever see this trait.
#[async_trait]
pub trait Responder: Send + Sync {
    /// First reply to the trigger.
    async fn respond(&self, msg: ResponseMessage) -> Result<Snowflake, PlatformError>;
    /// Acknowledge without content.
    async fn defer(&self) -> Result<(), PlatformError>;
    async fn edit_response(&self, msg: ResponseMessage) -> Result<(), PlatformError>;
    async fn get_response(&self) -> Result<Option<Message>, PlatformError>;
    async fn delete_response(&self) -> Result<(), PlatformError>;
    /// Additional message after the first reply.
    async fn follow_up(&self, msg: ResponseMessage) -> Result<Snowflake, PlatformError>;
    async fn edit_follow_up(&self, id: Snowflake, msg: ResponseMessage)
        -> Result<(), PlatformError>;
    async fn get_follow_up(&self, id: Snowflake) -> Result<Option<Message>, PlatformError>;
    async fn delete_follow_up(&self, id: Snowflake) -> Result<(), PlatformError>;
}

/// Network fallback for converters resolving objects missing from local data.
///
/// Implementations must report a missing object as `Err(PlatformError::NotFound)`;
/// converters turn that into a soft no-value, never a pipeline error.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch_user(&self, id: Snowflake) -> Result<User, PlatformError>;
    async fn fetch_member(&self, guild: Snowflake, id: Snowflake)
        -> Result<Member, PlatformError>;
    async fn fetch_channel(&self, id: Snowflake) -> Result<Channel, PlatformError>;
    async fn fetch_message(
        &self,
        channel: Snowflake,
        id: Snowflake,
    ) -> Result<Message, PlatformError>;
}

/// No-network fetcher: everything is missing.
///
/// Default when the host wires no REST client; converters then rely solely on
/// resolved data and the guild directory.
pub struct NullFetcher;

#[async_trait]
impl ObjectFetcher for NullFetcher {
    async fn fetch_user(&self, _id: Snowflake) -> Result<User, PlatformError> {
        Err(PlatformError::NotFound)
    }

    async fn fetch_member(
        &self,
        _guild: Snowflake,
        _id: Snowflake,
    ) -> Result<Member, PlatformError> {
        Err(PlatformError::NotFound)
    }

    async fn fetch_channel(&self, _id: Snowflake) -> Result<Channel, PlatformError> {
        Err(PlatformError::NotFound)
    }

    async fn fetch_message(
        &self,
        _channel: Snowflake,
        _id: Snowflake,
    ) -> Result<Message, PlatformError> {
        Err(PlatformError::NotFound)
    }
}

/// Descriptor of one application command offered for platform-side registration.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub kind: DescriptorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Slash,
    UserMenu,
    MessageMenu,
}

/// Resynchronizes application commands with the platform during a refresh.
///
/// Returns the server-assigned id for each descriptor name, used to index the
/// rebuilt command table for id-based interaction lookup.
#[async_trait]
pub trait CommandRegistrar: Send + Sync {
    async fn sync(
        &self,
        commands: &[CommandDescriptor],
    ) -> Result<Vec<(String, Snowflake)>, PlatformError>;
}

/// Registrar that registers nothing; interactions then match by name path.
pub struct NullRegistrar;

#[async_trait]
impl CommandRegistrar for NullRegistrar {
    async fn sync(
        &self,
        _commands: &[CommandDescriptor],
    ) -> Result<Vec<(String, Snowflake)>, PlatformError> {
        Ok(Vec::new())
    }
}
