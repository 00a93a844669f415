//! Service provider and per-invocation scopes.
//!
//! Checks and unbound handler receivers are constructed from services the
//! host registered up front. Each invocation owns one [`InvocationScope`]
//! from context construction until the executor's finalize step; the scope is
//! released exactly once on every exit path, with drop as the backstop.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Type-keyed registry of host-provided services.
#[derive(Default)]
pub struct ServiceProvider {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    scopes_created: AtomicU64,
    scopes_released: AtomicU64,
}

impl ServiceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service instance, replacing any previous one of the same type.
    pub fn register<T: Any + Send + Sync>(&mut self, service: T) {
        self.services.insert(TypeId::of::<T>(), Arc::new(service));
    }

    /// Look up a service by type.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// Like [`get`](Self::get) but with a named error for constructor injection.
    pub fn require<T: Any + Send + Sync>(&self) -> anyhow::Result<Arc<T>> {
        self.get::<T>()
            .ok_or_else(|| anyhow::anyhow!("service {} is not registered", type_name::<T>()))
    }

    /// Open a scope for one invocation.
    pub fn create_scope(self: &Arc<Self>) -> InvocationScope {
        self.scopes_created.fetch_add(1, Ordering::Relaxed);
        InvocationScope {
            provider: Arc::clone(self),
            released: AtomicBool::new(false),
        }
    }

    /// Number of scopes opened so far.
    pub fn scopes_created(&self) -> u64 {
        self.scopes_created.load(Ordering::Relaxed)
    }

    /// Number of scopes released so far.
    pub fn scopes_released(&self) -> u64 {
        self.scopes_released.load(Ordering::Relaxed)
    }
}

/// Resource lifetime of a single invocation.
///
/// Exclusively owned by one invocation from creation to finalize; never shared
/// across invocations.
pub struct InvocationScope {
    provider: Arc<ServiceProvider>,
    released: AtomicBool,
}

impl InvocationScope {
    /// Resolve a service from the owning provider.
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.provider.get::<T>()
    }

    /// Resolve a service, failing with a named error when missing.
    pub fn require<T: Any + Send + Sync>(&self) -> anyhow::Result<Arc<T>> {
        self.provider.require::<T>()
    }

    pub fn provider(&self) -> &Arc<ServiceProvider> {
        &self.provider
    }

    /// Release the scope. Idempotent; returns whether this call released it.
    pub(crate) fn release(&self) -> bool {
        let first = !self.released.swap(true, Ordering::AcqRel);
        if first {
            self.provider.scopes_released.fetch_add(1, Ordering::Relaxed);
        }
        first
    }
}

impl Drop for InvocationScope {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter(&'static str);

    #[test]
    fn register_and_resolve() {
        let mut provider = ServiceProvider::new();
        provider.register(Greeter("hello"));
        let provider = Arc::new(provider);
        let scope = provider.create_scope();
        assert_eq!(scope.get::<Greeter>().unwrap().0, "hello");
        assert!(scope.get::<String>().is_none());
    }

    #[test]
    fn release_is_idempotent() {
        let provider = Arc::new(ServiceProvider::new());
        let scope = provider.create_scope();
        assert!(scope.release());
        assert!(!scope.release());
        drop(scope);
        assert_eq!(provider.scopes_created(), 1);
        assert_eq!(provider.scopes_released(), 1);
    }

    #[test]
    fn drop_releases_once() {
        let provider = Arc::new(ServiceProvider::new());
        drop(provider.create_scope());
        assert_eq!(provider.scopes_released(), 1);
    }
}
