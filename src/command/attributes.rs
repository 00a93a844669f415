//! Check attributes.
//!
//! Attributes are plain metadata structs attached to a command or parameter
//! at build time. They declare *that* a rule applies; the matching check
//! implementation registered in the [`CheckRegistry`](crate::check::CheckRegistry)
//! decides *whether* it holds for a given invocation. A single attribute type
//! may activate any number of registered checks.

use crate::entity::Permissions;
use std::any::{Any, TypeId};
use std::fmt;

/// Marker trait for attributes that can activate checks.
///
/// Blanket-implemented for every `Debug + Send + Sync + 'static` type, so
/// host-defined attributes are ordinary structs.
pub trait CheckAttribute: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Send + Sync + fmt::Debug> CheckAttribute for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Downcast helper for check implementations.
pub fn attribute_as<T: Any>(attr: &dyn CheckAttribute) -> Option<&T> {
    attr.as_any().downcast_ref::<T>()
}

/// Runtime type of an attribute instance.
pub fn attribute_type(attr: &dyn CheckAttribute) -> TypeId {
    attr.as_any().type_id()
}

/// Sentinel attribute type. Checks registered against it run exactly once per
/// invocation, before every declared check, regardless of what the command
/// declares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unconditional;

// ============================================================================
// Built-in context-check attributes
// ============================================================================

/// Command may only run inside a guild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequireGuild;

/// Command may only run in a direct message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequireDirectMessage;

/// Command may only be invoked by a configured bot owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequireOwner;

/// Invoking member must hold all of the given permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequirePermissions(pub Permissions);

// ============================================================================
// Built-in parameter-check attributes
// ============================================================================

/// String length bounds, inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringLength {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl StringLength {
    pub fn at_most(max: usize) -> Self {
        Self { min: None, max: Some(max) }
    }

    pub fn between(min: usize, max: usize) -> Self {
        Self { min: Some(min), max: Some(max) }
    }
}

/// Numeric value bounds, inclusive. Applied to integer and float parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NumberBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl NumberBounds {
    pub fn at_least(min: f64) -> Self {
        Self { min: Some(min), max: None }
    }

    pub fn between(min: f64, max: f64) -> Self {
        Self { min: Some(min), max: Some(max) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_round_trip() {
        let attr: Box<dyn CheckAttribute> = Box::new(RequirePermissions(Permissions::BAN_MEMBERS));
        let back = attribute_as::<RequirePermissions>(attr.as_ref()).unwrap();
        assert_eq!(back.0, Permissions::BAN_MEMBERS);
        assert_eq!(attribute_type(attr.as_ref()), TypeId::of::<RequirePermissions>());
    }
}
