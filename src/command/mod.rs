//! The command model.
//!
//! A [`Command`] is an immutable node in a name-addressed forest: group nodes
//! carry children and no handler, leaf nodes carry the handler invoked by the
//! executor. Commands are produced by [`CommandBuilder`](builder::CommandBuilder)
//! and never mutated afterwards; a refresh rebuilds the whole
//! [`CommandTable`] and swaps it in wholesale.

pub mod attributes;
pub mod builder;

pub use builder::{CommandBuilder, ParameterBuilder};

use crate::command::attributes::CheckAttribute;
use crate::context::CommandContext;
use crate::convert::{ArgKind, ArgumentValue, EnumSpec};
use crate::entity::Snowflake;
use crate::scope::InvocationScope;
use crate::transport::{CommandDescriptor, DescriptorKind};
use futures_util::future::BoxFuture;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use uuid::Uuid;

/// Unique id of a built command; keys the executor's invocation-thunk cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(Uuid);

impl CommandId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handler receiver instance ("module" object the handler runs against).
pub type Receiver = Arc<dyn Any + Send + Sync>;

/// Value returned by a value-bearing handler, surfaced in the executed event.
pub type ReturnValue = Arc<dyn Any + Send + Sync>;

/// Normalized handler future.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Option<ReturnValue>>>;

/// Where the handler's receiver comes from.
#[derive(Clone)]
pub enum ReceiverSource {
    /// Free function; no receiver.
    None,
    /// Pre-bound instance shared across invocations.
    Bound(Receiver),
    /// Constructed per invocation from the invocation scope.
    Scoped(Arc<dyn Fn(&InvocationScope) -> anyhow::Result<Receiver> + Send + Sync>),
}

/// The callable backing a leaf command, in one of the supported conventions.
#[derive(Clone)]
pub enum HandlerFn {
    /// Synchronous, no return value.
    Sync(
        Arc<
            dyn Fn(Option<Receiver>, Arc<CommandContext>) -> anyhow::Result<()>
                + Send
                + Sync,
        >,
    ),
    /// Asynchronous; may or may not produce a return value.
    Async(Arc<dyn Fn(Option<Receiver>, Arc<CommandContext>) -> HandlerFuture + Send + Sync>),
}

/// Backing handler of a leaf command.
#[derive(Clone)]
pub struct Handler {
    pub receiver: ReceiverSource,
    pub func: HandlerFn,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let receiver = match self.receiver {
            ReceiverSource::None => "none",
            ReceiverSource::Bound(_) => "bound",
            ReceiverSource::Scoped(_) => "scoped",
        };
        let func = match self.func {
            HandlerFn::Sync(_) => "sync",
            HandlerFn::Async(_) => "async",
        };
        f.debug_struct("Handler")
            .field("receiver", &receiver)
            .field("func", &func)
            .finish()
    }
}

/// One declared handler argument.
pub struct CommandParameter {
    pub name: String,
    pub description: String,
    pub kind: ArgKind,
    /// Variant table for `ArgKind::Enum` parameters.
    pub enum_spec: Option<Arc<EnumSpec>>,
    /// May be omitted by the invoker.
    pub optional: bool,
    /// Value used when an optional parameter is omitted.
    pub default: Option<ArgumentValue>,
    /// Consumes the remaining text verbatim (text triggers; final parameter only).
    pub remaining: bool,
    /// Accepts up to N repeated values (final parameter only).
    pub variadic: Option<usize>,
    /// Parameter-check attributes.
    pub checks: Vec<Arc<dyn CheckAttribute>>,
}

impl fmt::Debug for CommandParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandParameter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("optional", &self.optional)
            .field("remaining", &self.remaining)
            .field("variadic", &self.variadic)
            .finish()
    }
}

/// Immutable command node.
pub struct Command {
    id: CommandId,
    pub name: String,
    pub aliases: Vec<String>,
    pub description: String,
    /// Excluded from host-generated help; still executable.
    pub hidden: bool,
    pub handler: Option<Handler>,
    pub parameters: Vec<CommandParameter>,
    /// Context-check attributes declared on this node.
    pub checks: Vec<Arc<dyn CheckAttribute>>,
    pub children: Vec<Arc<Command>>,
    parent: OnceLock<Weak<Command>>,
    invocations: AtomicU64,
}

impl Command {
    pub fn id(&self) -> CommandId {
        self.id
    }

    /// Group node: children but no handler; executable only via a child.
    pub fn is_group(&self) -> bool {
        self.handler.is_none()
    }

    pub fn parent(&self) -> Option<Arc<Command>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// Dotted path from the root, e.g. `config.set`.
    pub fn qualified_name(&self) -> String {
        match self.parent() {
            Some(parent) => format!("{}.{}", parent.qualified_name(), self.name),
            None => self.name.clone(),
        }
    }

    /// Self first, then each ancestor up to the root.
    pub fn self_and_ancestors(self: &Arc<Self>) -> Vec<Arc<Command>> {
        let mut chain = vec![Arc::clone(self)];
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            cursor = node.parent();
            chain.push(node);
        }
        chain
    }

    /// Find a direct child by name or alias.
    pub fn child(&self, name: &str, case_insensitive: bool) -> Option<&Arc<Command>> {
        self.children.iter().find(|c| {
            name_matches(&c.name, name, case_insensitive)
                || c.aliases.iter().any(|a| name_matches(a, name, case_insensitive))
        })
    }

    pub(crate) fn note_invocation(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
    }

    /// Times this command reached the executor since it was built.
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    pub(crate) fn new_node(
        name: String,
        aliases: Vec<String>,
        description: String,
        hidden: bool,
        handler: Option<Handler>,
        parameters: Vec<CommandParameter>,
        checks: Vec<Arc<dyn CheckAttribute>>,
        children: Vec<Arc<Command>>,
    ) -> Arc<Self> {
        let node = Arc::new(Self {
            id: CommandId::new(),
            name,
            aliases,
            description,
            hidden,
            handler,
            parameters,
            checks,
            children,
            parent: OnceLock::new(),
            invocations: AtomicU64::new(0),
        });
        for child in &node.children {
            // Children are freshly built and unparented; set cannot fail.
            let _ = child.parent.set(Arc::downgrade(&node));
        }
        node
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("group", &self.is_group())
            .field("parameters", &self.parameters.len())
            .field("children", &self.children.len())
            .finish()
    }
}

fn name_matches(candidate: &str, query: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        candidate.eq_ignore_ascii_case(query)
    } else {
        candidate == query
    }
}

/// The read-only command table of one extension generation.
///
/// Replaced wholesale on refresh; concurrent invocations only ever observe a
/// complete table.
pub struct CommandTable {
    roots: Vec<Arc<Command>>,
    by_interaction_id: HashMap<Snowflake, Arc<Command>>,
}

impl CommandTable {
    pub fn empty() -> Self {
        Self { roots: Vec::new(), by_interaction_id: HashMap::new() }
    }

    pub fn from_roots(roots: Vec<Arc<Command>>) -> Self {
        Self { roots, by_interaction_id: HashMap::new() }
    }

    pub fn roots(&self) -> &[Arc<Command>] {
        &self.roots
    }

    /// Find a root command by name or alias.
    pub fn find_root(&self, name: &str, case_insensitive: bool) -> Option<&Arc<Command>> {
        self.roots.iter().find(|c| {
            name_matches(&c.name, name, case_insensitive)
                || c.aliases.iter().any(|a| name_matches(a, name, case_insensitive))
        })
    }

    /// Find a command by the platform-assigned application command id.
    pub fn find_by_interaction_id(&self, id: Snowflake) -> Option<&Arc<Command>> {
        self.by_interaction_id.get(&id)
    }

    /// Record the platform-assigned id for a root command.
    pub(crate) fn assign_interaction_id(&mut self, name: &str, id: Snowflake) {
        if let Some(cmd) = self.find_root(name, false) {
            self.by_interaction_id.insert(id, Arc::clone(cmd));
        }
    }

    /// Descriptors offered to the platform registrar during refresh.
    pub fn descriptors(&self) -> Vec<CommandDescriptor> {
        self.roots
            .iter()
            .map(|c| CommandDescriptor {
                name: c.name.clone(),
                description: c.description.clone(),
                kind: DescriptorKind::Slash,
            })
            .collect()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("roots", &self.roots.len())
            .field("interaction_ids", &self.by_interaction_id.len())
            .finish()
    }
}
