//! Minimal entity model.
//!
//! The command pipeline treats platform objects as opaque data it reads a few
//! fields from. Only those fields live here; the full entity model belongs to
//! the host application's API layer.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A platform object id.
///
/// Snowflakes embed a millisecond timestamp in their upper 42 bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snowflake(pub u64);

/// Discord epoch (2015-01-01T00:00:00Z) in unix milliseconds.
const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

impl Snowflake {
    /// Creation time encoded in the snowflake.
    pub fn created_at(self) -> DateTime<Utc> {
        let ms = ((self.0 >> 22) as i64) + DISCORD_EPOCH_MS;
        Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for Snowflake {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Permission bit set.
///
/// Only the bits the built-in checks reason about are named; the rest pass
/// through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const ADMINISTRATOR: Permissions = Permissions(1 << 3);
    pub const MANAGE_GUILD: Permissions = Permissions(1 << 5);
    pub const MANAGE_MESSAGES: Permissions = Permissions(1 << 13);
    pub const MANAGE_CHANNELS: Permissions = Permissions(1 << 4);
    pub const KICK_MEMBERS: Permissions = Permissions(1 << 1);
    pub const BAN_MEMBERS: Permissions = Permissions(1 << 2);
    pub const ALL: Permissions = Permissions(u64::MAX);

    /// True when every bit in `other` is set, or the administrator bit is.
    pub fn contains(self, other: Permissions) -> bool {
        if self.0 & Self::ADMINISTRATOR.0 != 0 {
            return true;
        }
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: Permissions) -> Permissions {
        Permissions(self.0 | other.0)
    }

    /// Bits in `required` that are missing from `self`.
    pub fn missing(self, required: Permissions) -> Permissions {
        if self.contains(required) {
            Permissions(0)
        } else {
            Permissions(required.0 & !self.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
    /// Guild-scoped display name, when set.
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    /// Permissions computed by the platform for the triggering channel.
    #[serde(default)]
    pub permissions: Permissions,
}

impl Member {
    /// Display name: nick when present, account name otherwise.
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.user.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    DirectMessage,
    Voice,
    Category,
    Thread,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    pub name: String,
    pub kind: ChannelKind,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

impl Channel {
    pub fn is_direct(&self) -> bool {
        self.kind == ChannelKind::DirectMessage
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub permissions: Permissions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emoji {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub animated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    pub author: User,
    pub content: String,
}

/// A file attached to an outbound response.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Read-only view of a guild's cached directory.
///
/// Delivered alongside inbound events by the gateway layer; name lookups are
/// case-sensitive, matching the platform's own directory semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildSnapshot {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<Snowflake>,
    #[serde(default)]
    pub members: HashMap<Snowflake, Member>,
    #[serde(default)]
    pub channels: HashMap<Snowflake, Channel>,
    #[serde(default)]
    pub roles: HashMap<Snowflake, Role>,
    #[serde(default)]
    pub emojis: HashMap<Snowflake, Emoji>,
}

impl GuildSnapshot {
    pub fn member_named(&self, name: &str) -> Option<&Member> {
        self.members
            .values()
            .find(|m| m.user.name == name || m.nick.as_deref() == Some(name))
    }

    pub fn channel_named(&self, name: &str) -> Option<&Channel> {
        self.channels.values().find(|c| c.name == name)
    }

    pub fn role_named(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.name == name)
    }

    pub fn emoji_named(&self, name: &str) -> Option<&Emoji> {
        self.emojis.values().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn administrator_implies_everything() {
        let perms = Permissions::ADMINISTRATOR;
        assert!(perms.contains(Permissions::BAN_MEMBERS.union(Permissions::MANAGE_GUILD)));
    }

    #[test]
    fn missing_reports_unset_bits() {
        let perms = Permissions::KICK_MEMBERS;
        let missing = perms.missing(Permissions::KICK_MEMBERS.union(Permissions::BAN_MEMBERS));
        assert_eq!(missing, Permissions::BAN_MEMBERS);
    }

    #[test]
    fn guild_snapshot_default_is_empty() {
        let snapshot = GuildSnapshot::default();
        assert_eq!(snapshot.id, Snowflake(0));
        assert!(snapshot.members.is_empty());
        assert!(snapshot.owner_id.is_none());
    }

    #[test]
    fn snowflake_created_at() {
        // 2015-01-01 + 1000ms
        let flake = Snowflake(1000 << 22);
        assert_eq!(flake.created_at().timestamp_millis(), DISCORD_EPOCH_MS + 1000);
    }
}
