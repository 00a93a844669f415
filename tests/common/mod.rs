//! Integration test common infrastructure.
//!
//! Provides a recording responder, a canned object fetcher, event capture and
//! builders for inbound events.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use cordial::entity::{
    Channel, ChannelKind, GuildSnapshot, Member, Message, Permissions, Snowflake, User,
};
use cordial::error::CommandError;
use cordial::extension::Extension;
use cordial::transport::{
    MessageCreated, ObjectFetcher, PlatformError, Responder, ResponseMessage,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Responder that records everything sent through it.
#[derive(Default)]
pub struct RecordingResponder {
    next_id: AtomicU64,
    pub responses: Mutex<Vec<ResponseMessage>>,
    pub follow_ups: Mutex<Vec<(Snowflake, ResponseMessage)>>,
    pub deferred: AtomicU64,
}

impl RecordingResponder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { next_id: AtomicU64::new(1), ..Default::default() })
    }

    fn assign_id(&self) -> Snowflake {
        Snowflake(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn response_texts(&self) -> Vec<String> {
        self.responses.lock().iter().map(|m| m.content.clone()).collect()
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn respond(&self, msg: ResponseMessage) -> Result<Snowflake, PlatformError> {
        self.responses.lock().push(msg);
        Ok(self.assign_id())
    }

    async fn defer(&self) -> Result<(), PlatformError> {
        self.deferred.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn edit_response(&self, msg: ResponseMessage) -> Result<(), PlatformError> {
        let mut responses = self.responses.lock();
        match responses.last_mut() {
            Some(last) => {
                *last = msg;
                Ok(())
            }
            None => Err(PlatformError::NotFound),
        }
    }

    async fn get_response(&self) -> Result<Option<Message>, PlatformError> {
        Ok(None)
    }

    async fn delete_response(&self) -> Result<(), PlatformError> {
        let mut responses = self.responses.lock();
        if responses.pop().is_none() {
            return Err(PlatformError::NotFound);
        }
        Ok(())
    }

    async fn follow_up(&self, msg: ResponseMessage) -> Result<Snowflake, PlatformError> {
        let id = self.assign_id();
        self.follow_ups.lock().push((id, msg));
        Ok(id)
    }

    async fn edit_follow_up(
        &self,
        id: Snowflake,
        msg: ResponseMessage,
    ) -> Result<(), PlatformError> {
        let mut follow_ups = self.follow_ups.lock();
        match follow_ups.iter_mut().find(|(fid, _)| *fid == id) {
            Some((_, stored)) => {
                *stored = msg;
                Ok(())
            }
            None => Err(PlatformError::NotFound),
        }
    }

    async fn get_follow_up(&self, _id: Snowflake) -> Result<Option<Message>, PlatformError> {
        Ok(None)
    }

    async fn delete_follow_up(&self, id: Snowflake) -> Result<(), PlatformError> {
        let mut follow_ups = self.follow_ups.lock();
        let before = follow_ups.len();
        follow_ups.retain(|(fid, _)| *fid != id);
        if follow_ups.len() == before {
            return Err(PlatformError::NotFound);
        }
        Ok(())
    }
}

/// Fetcher serving a fixed set of objects.
#[derive(Default)]
pub struct CannedFetcher {
    pub users: HashMap<Snowflake, User>,
    pub messages: HashMap<Snowflake, Message>,
}

#[async_trait]
impl ObjectFetcher for CannedFetcher {
    async fn fetch_user(&self, id: Snowflake) -> Result<User, PlatformError> {
        self.users.get(&id).cloned().ok_or(PlatformError::NotFound)
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
        id: Snowflake,
    ) -> Result<Message, PlatformError> {
        self.messages.get(&id).cloned().ok_or(PlatformError::NotFound)
    }
}

/// Captured executed/errored events of one extension.
#[derive(Default)]
pub struct EventLog {
    /// Qualified names of commands that executed.
    pub executed: Mutex<Vec<String>>,
    /// (error code, display text) of every errored event.
    pub errored: Mutex<Vec<(String, String)>>,
    pub errors: Mutex<Vec<Arc<CommandError>>>,
}

impl EventLog {
    /// Register capturing sinks on the extension.
    pub fn attach(extension: &Arc<Extension>) -> Arc<Self> {
        let log = Arc::new(Self::default());

        let executed_log = Arc::clone(&log);
        extension.on_executed(move |event| {
            executed_log.executed.lock().push(event.ctx.command.qualified_name());
            Box::pin(async { Ok(()) })
        });

        let errored_log = Arc::clone(&log);
        extension.on_errored(move |event| {
            errored_log
                .errored
                .lock()
                .push((event.error.error_code().to_string(), event.error.to_string()));
            errored_log.errors.lock().push(Arc::clone(&event.error));
            Box::pin(async { Ok(()) })
        });

        log
    }

    pub fn executed_count(&self) -> usize {
        self.executed.lock().len()
    }

    pub fn errored_count(&self) -> usize {
        self.errored.lock().len()
    }
}

// ----------------------------------------------------------------------
// Entity builders
// ----------------------------------------------------------------------

pub fn user(id: u64, name: &str) -> User {
    User { id: Snowflake(id), name: name.to_string(), bot: false }
}

pub fn member(id: u64, name: &str) -> Member {
    Member {
        user: user(id, name),
        nick: None,
        roles: Vec::new(),
        permissions: Permissions::default(),
    }
}

pub fn guild_channel(id: u64, guild: u64) -> Channel {
    Channel {
        id: Snowflake(id),
        name: "general".to_string(),
        kind: ChannelKind::Text,
        guild_id: Some(Snowflake(guild)),
    }
}

pub fn dm_channel(id: u64) -> Channel {
    Channel {
        id: Snowflake(id),
        name: String::new(),
        kind: ChannelKind::DirectMessage,
        guild_id: None,
    }
}

pub fn guild(id: u64) -> GuildSnapshot {
    GuildSnapshot { id: Snowflake(id), name: "testers".to_string(), ..Default::default() }
}

/// A guild text message from `author`.
pub fn guild_message(content: &str, author: User, guild: GuildSnapshot) -> MessageCreated {
    let channel = guild_channel(10, guild.id.0);
    MessageCreated {
        message: Message {
            id: Snowflake(100),
            channel_id: channel.id,
            author: author.clone(),
            content: content.to_string(),
        },
        channel,
        member: Some(Member {
            user: author,
            nick: None,
            roles: Vec::new(),
            permissions: Permissions::default(),
        }),
        guild: Some(guild),
    }
}

/// A direct message from `author`.
pub fn direct_message(content: &str, author: User) -> MessageCreated {
    let channel = dm_channel(11);
    MessageCreated {
        message: Message {
            id: Snowflake(101),
            channel_id: channel.id,
            author,
            content: content.to_string(),
        },
        channel,
        member: None,
        guild: None,
    }
}
