//! Platform-object converters.
//!
//! Resolution priority for free-text input: the trigger's resolved side-table,
//! then a raw id, then mention syntax, then a case-sensitive name lookup in
//! the guild's cached directory. Converters that fall back to a network fetch
//! treat a not-found platform error as a soft no-value.

use super::{ArgumentValue, Conversion, Converter, ConverterContext};
use crate::entity::Snowflake;
use crate::transport::{OptionValue, PlatformError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@!?(\d+)>$").expect("user mention pattern"));
static CHANNEL_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<#(\d+)>$").expect("channel mention pattern"));
static ROLE_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<@&(\d+)>$").expect("role mention pattern"));
static EMOJI_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<(a?):([A-Za-z0-9_]+):(\d+)>$").expect("emoji mention pattern"));
static MESSAGE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://(?:\w+\.)?discord(?:app)?\.com/channels/(?:\d+|@me)/(\d+)/(\d+)$")
        .expect("message link pattern")
});

fn value(v: ArgumentValue) -> anyhow::Result<Conversion> {
    Ok(Conversion::Value(v))
}

fn no_value() -> anyhow::Result<Conversion> {
    Ok(Conversion::NoValue)
}

fn raw_id(token: &str) -> Option<Snowflake> {
    token.parse::<u64>().ok().map(Snowflake)
}

fn mention_id(pattern: &Regex, token: &str) -> Option<Snowflake> {
    pattern
        .captures(token)?
        .get(1)
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(Snowflake)
}

/// Id carried by a structured option, regardless of its option type.
fn option_id(opt: &OptionValue) -> Option<Snowflake> {
    match opt {
        OptionValue::User(id)
        | OptionValue::Channel(id)
        | OptionValue::Role(id)
        | OptionValue::Mentionable(id) => Some(*id),
        _ => None,
    }
}

/// Map a fetch result into a conversion: not-found is soft, anything else is a
/// hard error.
fn from_fetch<T>(
    result: Result<T, PlatformError>,
    wrap: impl FnOnce(T) -> ArgumentValue,
) -> anyhow::Result<Conversion> {
    match result {
        Ok(v) => value(wrap(v)),
        Err(PlatformError::NotFound) => no_value(),
        Err(PlatformError::Other(e)) => Err(e),
    }
}

pub struct UserConverter;

#[async_trait]
impl Converter for UserConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let id = match cx.current_option() {
            Some(opt) => option_id(opt),
            None => {
                let Some(token) = cx.next_token() else { return no_value() };
                match raw_id(&token).or_else(|| mention_id(&USER_MENTION, &token)) {
                    Some(id) => Some(id),
                    None => {
                        // Case-sensitive name lookup in the guild directory.
                        return match cx.guild.and_then(|g| g.member_named(&token)) {
                            Some(member) => value(ArgumentValue::User(member.user.clone())),
                            None => no_value(),
                        };
                    }
                }
            }
        };
        let Some(id) = id else { return no_value() };

        if let Some(user) = cx.resolved.users.get(&id) {
            return value(ArgumentValue::User(user.clone()));
        }
        if let Some(member) = cx.resolved.members.get(&id) {
            return value(ArgumentValue::User(member.user.clone()));
        }
        if let Some(member) = cx.guild.and_then(|g| g.members.get(&id)) {
            return value(ArgumentValue::User(member.user.clone()));
        }
        from_fetch(cx.fetcher.fetch_user(id).await, ArgumentValue::User)
    }
}

pub struct MemberConverter;

#[async_trait]
impl Converter for MemberConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let Some(guild_id) = cx.guild.map(|g| g.id) else {
            // Members only exist inside guilds.
            return no_value();
        };

        let id = match cx.current_option() {
            Some(opt) => option_id(opt),
            None => {
                let Some(token) = cx.next_token() else { return no_value() };
                match raw_id(&token).or_else(|| mention_id(&USER_MENTION, &token)) {
                    Some(id) => Some(id),
                    None => {
                        return match cx.guild.and_then(|g| g.member_named(&token)) {
                            Some(member) => value(ArgumentValue::Member(member.clone())),
                            None => no_value(),
                        };
                    }
                }
            }
        };
        let Some(id) = id else { return no_value() };

        if let Some(member) = cx.resolved.members.get(&id) {
            return value(ArgumentValue::Member(member.clone()));
        }
        if let Some(member) = cx.guild.and_then(|g| g.members.get(&id)) {
            return value(ArgumentValue::Member(member.clone()));
        }
        from_fetch(cx.fetcher.fetch_member(guild_id, id).await, ArgumentValue::Member)
    }
}

pub struct ChannelConverter;

#[async_trait]
impl Converter for ChannelConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let id = match cx.current_option() {
            Some(opt) => option_id(opt),
            None => {
                let Some(token) = cx.next_token() else { return no_value() };
                match raw_id(&token).or_else(|| mention_id(&CHANNEL_MENTION, &token)) {
                    Some(id) => Some(id),
                    None => {
                        return match cx.guild.and_then(|g| g.channel_named(&token)) {
                            Some(channel) => value(ArgumentValue::Channel(channel.clone())),
                            None => no_value(),
                        };
                    }
                }
            }
        };
        let Some(id) = id else { return no_value() };

        if let Some(channel) = cx.resolved.channels.get(&id) {
            return value(ArgumentValue::Channel(channel.clone()));
        }
        if let Some(channel) = cx.guild.and_then(|g| g.channels.get(&id)) {
            return value(ArgumentValue::Channel(channel.clone()));
        }
        from_fetch(cx.fetcher.fetch_channel(id).await, ArgumentValue::Channel)
    }
}

pub struct RoleConverter;

#[async_trait]
impl Converter for RoleConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let id = match cx.current_option() {
            Some(opt) => option_id(opt),
            None => {
                let Some(token) = cx.next_token() else { return no_value() };
                match raw_id(&token).or_else(|| mention_id(&ROLE_MENTION, &token)) {
                    Some(id) => Some(id),
                    None => {
                        return match cx.guild.and_then(|g| g.role_named(&token)) {
                            Some(role) => value(ArgumentValue::Role(role.clone())),
                            None => no_value(),
                        };
                    }
                }
            }
        };
        let Some(id) = id else { return no_value() };

        if let Some(role) = cx.resolved.roles.get(&id) {
            return value(ArgumentValue::Role(role.clone()));
        }
        match cx.guild.and_then(|g| g.roles.get(&id)) {
            Some(role) => value(ArgumentValue::Role(role.clone())),
            None => no_value(),
        }
    }
}

pub struct MessageConverter;

#[async_trait]
impl Converter for MessageConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let (channel_id, id) = match cx.current_option() {
            Some(OptionValue::String(s)) => match parse_message_ref(s, cx.channel.id) {
                Some(pair) => pair,
                None => return no_value(),
            },
            Some(_) => return no_value(),
            None => {
                let Some(token) = cx.next_token() else { return no_value() };
                match parse_message_ref(&token, cx.channel.id) {
                    Some(pair) => pair,
                    None => return no_value(),
                }
            }
        };

        if let Some(message) = cx.resolved.messages.get(&id) {
            return value(ArgumentValue::Message(message.clone()));
        }
        from_fetch(cx.fetcher.fetch_message(channel_id, id).await, ArgumentValue::Message)
    }
}

/// A bare id refers to the current channel; a message link carries its own.
fn parse_message_ref(token: &str, current_channel: Snowflake) -> Option<(Snowflake, Snowflake)> {
    if let Some(id) = raw_id(token) {
        return Some((current_channel, id));
    }
    let caps = MESSAGE_LINK.captures(token)?;
    let channel = caps.get(1)?.as_str().parse::<u64>().ok()?;
    let message = caps.get(2)?.as_str().parse::<u64>().ok()?;
    Some((Snowflake(channel), Snowflake(message)))
}

pub struct EmojiConverter;

#[async_trait]
impl Converter for EmojiConverter {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion> {
        let token = match cx.current_option() {
            Some(OptionValue::String(s)) => s.clone(),
            Some(_) => return no_value(),
            None => match cx.next_token() {
                Some(t) => t,
                None => return no_value(),
            },
        };

        if let Some(caps) = EMOJI_MENTION.captures(&token) {
            let animated = !caps.get(1).map_or("", |m| m.as_str()).is_empty();
            let name = caps.get(2).map_or("", |m| m.as_str()).to_string();
            let id = caps.get(3).and_then(|m| m.as_str().parse::<u64>().ok());
            if let Some(id) = id {
                let id = Snowflake(id);
                // Prefer the guild's record when cached; keep the parsed form otherwise.
                if let Some(emoji) = cx.guild.and_then(|g| g.emojis.get(&id)) {
                    return value(ArgumentValue::Emoji(emoji.clone()));
                }
                return value(ArgumentValue::Emoji(crate::entity::Emoji { id, name, animated }));
            }
        }

        let name = token.trim_matches(':');
        match cx.guild.and_then(|g| g.emoji_named(name)) {
            Some(emoji) => value(ArgumentValue::Emoji(emoji.clone())),
            None => no_value(),
        }
    }
}
