//! Argument conversion.
//!
//! A converter turns one raw wire-level argument (a text token or a structured
//! interaction option) into one typed [`ArgumentValue`]. The registry maps a
//! parameter's declared [`ArgKind`] to a converter, with optional per-trigger
//! overrides; "could not produce a value" is a normal soft outcome
//! ([`Conversion::NoValue`]), not an error.

mod builtin;
mod entity;

pub use builtin::{
    BoolConverter, CodeBlockConverter, DurationConverter, EnumConverter, FloatConverter,
    IntConverter, StringConverter, UIntConverter,
};
pub use entity::{
    ChannelConverter, EmojiConverter, MemberConverter, MessageConverter, RoleConverter,
    UserConverter,
};

use crate::command::{Command, CommandParameter};
use crate::context::TriggerKind;
use crate::entity::{Channel, Emoji, GuildSnapshot, Member, Message, Role, User};
use crate::transport::{InteractionOption, ObjectFetcher, OptionValue, ResolvedData};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Declared semantic type of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    CodeBlock,
    Duration,
    Enum,
    User,
    Member,
    Channel,
    Role,
    Message,
    Emoji,
}

/// Named variants of an enumeration parameter.
///
/// Text input matches variant names case-insensitively; interaction input may
/// also match the underlying numeric value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumSpec {
    pub variants: Vec<(String, i64)>,
}

impl EnumSpec {
    pub fn new(variants: impl IntoIterator<Item = (impl Into<String>, i64)>) -> Arc<Self> {
        Arc::new(Self {
            variants: variants.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        })
    }

    pub fn by_name(&self, name: &str) -> Option<(&str, i64)> {
        self.variants
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, v)| (n.as_str(), *v))
    }

    pub fn by_value(&self, value: i64) -> Option<(&str, i64)> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(n, v)| (n.as_str(), *v))
    }
}

/// A converted argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgumentValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Duration(Duration),
    Choice { name: String, value: i64 },
    CodeBlock { language: Option<String>, code: String },
    User(User),
    Member(Member),
    Channel(Channel),
    Role(Role),
    Message(Message),
    Emoji(Emoji),
    /// Collected values of a variadic parameter.
    Many(Vec<ArgumentValue>),
    /// Optional parameter with no input and no default.
    Absent,
}

impl ArgumentValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Argument map of one invocation, in parameter declaration order.
///
/// Fully populated before the executor ever sees it: the key set equals the
/// command's parameter set.
#[derive(Debug, Clone, Default)]
pub struct ArgumentMap {
    entries: Vec<(String, ArgumentValue)>,
}

impl ArgumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgumentValue) {
        self.entries.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgumentValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

/// Outcome of one conversion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    Value(ArgumentValue),
    /// Expected soft failure: the input did not denote a value of this type.
    NoValue,
}

/// Cursor over the raw arguments of one trigger.
///
/// [`next_parameter`](Self::next_parameter) must be called before a
/// parameter's converter runs; the index advances monotonically and never
/// rewinds. Text triggers walk a token cursor, interaction triggers walk the
/// structured option list, behind the same contract.
pub struct ConverterContext<'a> {
    pub trigger: TriggerKind,
    pub resolved: &'a ResolvedData,
    pub guild: Option<&'a GuildSnapshot>,
    pub channel: &'a Channel,
    pub fetcher: &'a dyn ObjectFetcher,
    command: &'a Command,
    source: ArgumentSource<'a>,
    index: Option<usize>,
    /// Values consumed for the current variadic parameter.
    variadic_taken: usize,
}

enum ArgumentSource<'a> {
    Text(TextCursor<'a>),
    Interaction(&'a [InteractionOption]),
}

impl<'a> ConverterContext<'a> {
    pub fn for_text(
        command: &'a Command,
        input: &'a str,
        resolved: &'a ResolvedData,
        guild: Option<&'a GuildSnapshot>,
        channel: &'a Channel,
        fetcher: &'a dyn ObjectFetcher,
    ) -> Self {
        Self {
            trigger: TriggerKind::TextMessage,
            resolved,
            guild,
            channel,
            fetcher,
            command,
            source: ArgumentSource::Text(TextCursor::new(input)),
            index: None,
            variadic_taken: 0,
        }
    }

    pub fn for_interaction(
        trigger: TriggerKind,
        command: &'a Command,
        options: &'a [InteractionOption],
        resolved: &'a ResolvedData,
        guild: Option<&'a GuildSnapshot>,
        channel: &'a Channel,
        fetcher: &'a dyn ObjectFetcher,
    ) -> Self {
        Self {
            trigger,
            resolved,
            guild,
            channel,
            fetcher,
            command,
            source: ArgumentSource::Interaction(options),
            index: None,
            variadic_taken: 0,
        }
    }

    /// Advance to the next declared parameter.
    pub fn next_parameter(&mut self) -> Option<&'a CommandParameter> {
        let next = self.index.map_or(0, |i| i + 1);
        if next >= self.command.parameters.len() {
            self.index = Some(next);
            return None;
        }
        self.index = Some(next);
        self.variadic_taken = 0;
        Some(&self.command.parameters[next])
    }

    /// The parameter the cursor currently points at.
    pub fn current_parameter(&self) -> Option<&'a CommandParameter> {
        self.command.parameters.get(self.index?)
    }

    pub fn command(&self) -> &'a Command {
        self.command
    }

    /// Number of values already collected for the current variadic parameter.
    pub fn variadic_taken(&self) -> usize {
        self.variadic_taken
    }

    pub(crate) fn note_variadic_value(&mut self) {
        self.variadic_taken += 1;
    }

    /// Pull the next text token. `None` for interaction triggers or when the
    /// input is exhausted.
    pub fn next_token(&mut self) -> Option<String> {
        match &mut self.source {
            ArgumentSource::Text(cursor) => cursor.next_token(),
            ArgumentSource::Interaction(_) => None,
        }
    }

    /// Consume all remaining text verbatim.
    pub fn rest(&mut self) -> Option<String> {
        match &mut self.source {
            ArgumentSource::Text(cursor) => cursor.rest(),
            ArgumentSource::Interaction(_) => None,
        }
    }

    /// Whether any text input remains.
    pub fn has_more_text(&self) -> bool {
        match &self.source {
            ArgumentSource::Text(cursor) => cursor.has_more(),
            ArgumentSource::Interaction(_) => false,
        }
    }

    /// The structured option matching the current parameter, by name.
    pub fn current_option(&self) -> Option<&'a OptionValue> {
        let param = self.current_parameter()?;
        match &self.source {
            ArgumentSource::Interaction(options) => options
                .iter()
                .find(|o| o.name == param.name)
                .and_then(|o| o.value.as_ref()),
            ArgumentSource::Text(_) => None,
        }
    }
}

/// Whitespace tokenizer with double-quote grouping.
struct TextCursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TextCursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn has_more(&self) -> bool {
        !self.input[self.pos..].trim_start().is_empty()
    }

    fn next_token(&mut self) -> Option<String> {
        self.skip_whitespace();
        let rest = &self.input[self.pos..];
        if rest.is_empty() {
            return None;
        }
        if let Some(inner) = rest.strip_prefix('"') {
            // Quoted token; an unterminated quote consumes the remainder.
            match inner.find('"') {
                Some(end) => {
                    self.pos += 1 + end + 1;
                    Some(inner[..end].to_string())
                }
                None => {
                    self.pos = self.input.len();
                    Some(inner.to_string())
                }
            }
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            self.pos += end;
            Some(rest[..end].to_string())
        }
    }

    fn rest(&mut self) -> Option<String> {
        self.skip_whitespace();
        let rest = self.input[self.pos..].trim_end();
        self.pos = self.input.len();
        if rest.is_empty() { None } else { Some(rest.to_string()) }
    }
}

/// Converts one raw argument into one typed value.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, cx: &mut ConverterContext<'_>) -> anyhow::Result<Conversion>;
}

/// Maps a parameter's semantic type to a converter.
///
/// Read-mostly shared state: mutated only while the extension is being wired,
/// shared immutably afterwards.
#[derive(Clone)]
pub struct ConverterRegistry {
    bindings: HashMap<(ArgKind, Option<TriggerKind>), Arc<dyn Converter>>,
}

impl ConverterRegistry {
    /// Empty registry, no built-ins.
    pub fn empty() -> Self {
        Self { bindings: HashMap::new() }
    }

    /// Registry with every built-in converter bound.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(ArgKind::Bool, Arc::new(BoolConverter));
        registry.register(ArgKind::I8, Arc::new(IntConverter::new(i8::MIN as i64, i8::MAX as i64)));
        registry.register(ArgKind::I16, Arc::new(IntConverter::new(i16::MIN as i64, i16::MAX as i64)));
        registry.register(ArgKind::I32, Arc::new(IntConverter::new(i32::MIN as i64, i32::MAX as i64)));
        registry.register(ArgKind::I64, Arc::new(IntConverter::new(i64::MIN, i64::MAX)));
        registry.register(ArgKind::U8, Arc::new(UIntConverter::new(u8::MAX as u64)));
        registry.register(ArgKind::U16, Arc::new(UIntConverter::new(u16::MAX as u64)));
        registry.register(ArgKind::U32, Arc::new(UIntConverter::new(u32::MAX as u64)));
        registry.register(ArgKind::U64, Arc::new(UIntConverter::new(u64::MAX)));
        registry.register(ArgKind::F32, Arc::new(FloatConverter::single()));
        registry.register(ArgKind::F64, Arc::new(FloatConverter::double()));
        registry.register(ArgKind::String, Arc::new(StringConverter));
        registry.register(ArgKind::CodeBlock, Arc::new(CodeBlockConverter));
        registry.register(ArgKind::Duration, Arc::new(DurationConverter));
        registry.register(ArgKind::Enum, Arc::new(EnumConverter));
        registry.register(ArgKind::User, Arc::new(UserConverter));
        registry.register(ArgKind::Member, Arc::new(MemberConverter));
        registry.register(ArgKind::Channel, Arc::new(ChannelConverter));
        registry.register(ArgKind::Role, Arc::new(RoleConverter));
        registry.register(ArgKind::Message, Arc::new(MessageConverter));
        registry.register(ArgKind::Emoji, Arc::new(EmojiConverter));
        registry
    }

    /// Bind a converter for every trigger source.
    pub fn register(&mut self, kind: ArgKind, converter: Arc<dyn Converter>) {
        self.bindings.insert((kind, None), converter);
    }

    /// Bind a converter for one trigger source only, shadowing the generic
    /// binding for that source.
    pub fn register_for(
        &mut self,
        kind: ArgKind,
        trigger: TriggerKind,
        converter: Arc<dyn Converter>,
    ) {
        self.bindings.insert((kind, Some(trigger)), converter);
    }

    /// Resolve the converter for a parameter type, preferring a per-trigger
    /// binding.
    pub fn resolve(&self, kind: ArgKind, trigger: TriggerKind) -> Option<Arc<dyn Converter>> {
        self.bindings
            .get(&(kind, Some(trigger)))
            .or_else(|| self.bindings.get(&(kind, None)))
            .cloned()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
