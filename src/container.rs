//! The root dependency-injection container.
//!
//! Two phases:
//!
//! 1. **Registration**, at process startup, through [`ContainerBuilder`].
//! 2. **Resolution**, per request, through a [`Scope`] obtained from
//!    [`Container::create_scope`]. Registrations are frozen; only the
//!    singleton and scoped caches change.
//!
//! ```rust
//! use kura::{Container, Lifetime};
//!
//! let container = Container::builder()
//!     .register_value("greeting", String::from("hello"))
//!     .register_factory("shout", |c: &kura::Cradle<'_>| {
//!         Ok(c.get::<String>("greeting")?.to_uppercase())
//!     }, Lifetime::Scoped)
//!     .build();
//!
//! let scope = container.create_scope();
//! assert_eq!(*scope.resolve::<String>("shout").unwrap(), "HELLO");
//! ```

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Error;
use crate::lifetime::Lifetime;
use crate::resolver::{Construct, ResolverDescriptor, ResolverId, as_class, as_function};
use crate::scope::{Cradle, Scope, ScopeState};

/// A resolved instance with its concrete type erased.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type ErasedBuild = Arc<dyn Fn(&Cradle<'_>) -> Result<Instance, Error> + Send + Sync>;

/// Cache key. Named registrations, scope-local values and anonymous
/// descriptors never collide.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Key {
    Name(Cow<'static, str>),
    Local(Cow<'static, str>),
    Resolver(ResolverId),
}

#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) lifetime: Lifetime,
    pub(crate) type_name: &'static str,
    pub(crate) build: ErasedBuild,
}

impl Registration {
    pub(crate) fn value<T: Any + Send + Sync>(value: T) -> Self {
        let value: Instance = Arc::new(value);
        Self {
            // Caching would only re-store the same Arc.
            lifetime: Lifetime::Transient,
            type_name: type_name::<T>(),
            build: erase(move |_| Ok(Arc::clone(&value))),
        }
    }

    pub(crate) fn from_resolver<T: Send + Sync + 'static>(resolver: &ResolverDescriptor<T>) -> Self {
        let target = resolver.target().clone();
        Self {
            lifetime: resolver.lifetime(),
            type_name: type_name::<T>(),
            build: erase(move |cradle| {
                target.instantiate(cradle).map(|t| Arc::new(t) as Instance)
            }),
        }
    }
}

fn erase<F>(build: F) -> ErasedBuild
where
    F: Fn(&Cradle<'_>) -> Result<Instance, Error> + Send + Sync + 'static,
{
    Arc::new(build)
}

/// At-most-once construction per key, safe under concurrent first use.
#[derive(Default)]
pub(crate) struct Cache {
    cells: Mutex<HashMap<Key, Arc<OnceCell<Instance>>>>,
}

impl Cache {
    pub(crate) fn get_or_try_init(
        &self,
        key: &Key,
        init: impl FnOnce() -> Result<Instance, Error>,
    ) -> Result<Instance, Error> {
        // The map lock is released before `init` runs: construction may
        // resolve further keys from this same cache.
        let cell = Arc::clone(self.cells.lock().entry(key.clone()).or_default());
        cell.get_or_try_init(init).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.lock().values().filter(|cell| cell.get().is_some()).count()
    }
}

/// Tuning knobs for resolution.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ContainerOptions {
    /// Maximum nesting of dependencies before resolution gives up.
    pub max_depth: usize,
}

impl ContainerOptions {
    pub const DEFAULT_MAX_DEPTH: usize = 100;
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self { max_depth: Self::DEFAULT_MAX_DEPTH }
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Collects registrations. Each method returns `self` for chaining; finish
/// with [`build`](ContainerBuilder::build).
///
/// Registering a name twice replaces the earlier registration.
#[derive(Default)]
pub struct ContainerBuilder {
    registrations: HashMap<Cow<'static, str>, Registration>,
    options: ContainerOptions,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn options(mut self, options: ContainerOptions) -> Self {
        self.options = options;
        self
    }

    /// Registers an already-built value. Every resolution returns the same
    /// shared instance.
    pub fn register_value<T: Any + Send + Sync>(
        self,
        name: impl Into<Cow<'static, str>>,
        value: T,
    ) -> Self {
        self.insert(name.into(), Registration::value(value))
    }

    pub fn register_factory<T, F>(
        self,
        name: impl Into<Cow<'static, str>>,
        factory: F,
        lifetime: Lifetime,
    ) -> Self
    where
        F: Fn(&Cradle<'_>) -> Result<T, Error> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.register(name, as_function(factory).with_lifetime(lifetime))
    }

    pub fn register_class<C: Construct>(
        self,
        name: impl Into<Cow<'static, str>>,
        lifetime: Lifetime,
    ) -> Self {
        self.register(name, as_class::<C>().with_lifetime(lifetime))
    }

    /// Registers a descriptor under `name`.
    pub fn register<T: Send + Sync + 'static>(
        self,
        name: impl Into<Cow<'static, str>>,
        resolver: ResolverDescriptor<T>,
    ) -> Self {
        self.insert(name.into(), Registration::from_resolver(&resolver))
    }

    fn insert(mut self, name: Cow<'static, str>, registration: Registration) -> Self {
        debug!(%name, lifetime = %registration.lifetime, target = registration.type_name, "registering");
        if self.registrations.insert(name.clone(), registration).is_some() {
            debug!(%name, "replaced an earlier registration");
        }
        self
    }

    pub fn build(self) -> Container {
        debug!(registrations = self.registrations.len(), "container built");
        Container {
            inner: Arc::new(Inner {
                registrations: self.registrations,
                options: self.options,
                singletons: Cache::default(),
                root: Arc::new(ScopeState::new()),
            }),
        }
    }
}

// ── Container ─────────────────────────────────────────────────────────────────

/// The process-wide root container. Cheap to clone; clones share
/// registrations and caches.
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

struct Inner {
    registrations: HashMap<Cow<'static, str>, Registration>,
    options: ContainerOptions,
    singletons: Cache,
    /// Scoped cache used when resolving straight from the root.
    root: Arc<ScopeState>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// A fresh child scope with an empty scoped cache.
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.clone(), Arc::new(ScopeState::new()))
    }

    /// The container's own scope. Scoped registrations resolved through it
    /// are cached for the life of the container.
    pub fn root_scope(&self) -> Scope {
        Scope::new(self.clone(), Arc::clone(&self.inner.root))
    }

    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Error> {
        self.root_scope().resolve(name)
    }

    pub fn build<T: Send + Sync + 'static>(&self, resolver: &ResolverDescriptor<T>) -> Result<Arc<T>, Error> {
        self.root_scope().build(resolver)
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.registrations.contains_key(name)
    }

    pub fn options(&self) -> ContainerOptions {
        self.inner.options
    }

    pub(crate) fn registration(&self, name: &str) -> Option<(&Cow<'static, str>, &Registration)> {
        self.inner.registrations.get_key_value(name)
    }

    pub(crate) fn singletons(&self) -> &Cache {
        &self.inner.singletons
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.inner.registrations.keys().collect();
        names.sort();
        f.debug_struct("Container")
            .field("registrations", &names)
            .field("singletons", &self.inner.singletons.len())
            .finish()
    }
}
