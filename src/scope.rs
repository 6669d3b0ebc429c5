//! Resolution scopes and the dependency cradle.
//!
//! A [`Scope`] is the per-request view of a [`Container`]: it shares the
//! container's registrations and singleton cache but owns its own cache for
//! [`Lifetime::Scoped`] instances.
//!
//! Constructors and factories receive a [`Cradle`]. Each nested resolution
//! gets a child cradle pointing at its parent, so the chain of cradles *is*
//! the resolution path: that is what cycle detection walks and what error
//! messages print.

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use crate::container::{Cache, Container, Instance, Key, Registration};
use crate::error::{Error, ResolutionPath};
use crate::lifetime::Lifetime;
use crate::resolver::ResolverDescriptor;

pub(crate) struct ScopeState {
    id: u64,
    cache: Cache,
    locals: RwLock<HashMap<Cow<'static, str>, Registration>>,
}

impl ScopeState {
    pub(crate) fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            cache: Cache::default(),
            locals: RwLock::new(HashMap::new()),
        }
    }
}

/// A resolution context derived from a [`Container`].
///
/// Cloning a `Scope` yields a handle to the *same* scope (same cache).
/// Use [`Container::create_scope`] for a new one.
#[derive(Clone)]
pub struct Scope {
    container: Container,
    state: Arc<ScopeState>,
}

impl Scope {
    pub(crate) fn new(container: Container, state: Arc<ScopeState>) -> Self {
        Self { container, state }
    }

    /// Process-unique identifier, for logs.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Resolves the registration named `name`.
    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Error> {
        Cradle::new(self).get(name)
    }

    /// Resolves an unregistered descriptor, honoring its lifetime.
    pub fn build<T: Send + Sync + 'static>(&self, resolver: &ResolverDescriptor<T>) -> Result<Arc<T>, Error> {
        Cradle::new(self).build(resolver)
    }

    /// Registers a value visible only through this scope, shadowing any
    /// container registration of the same name.
    ///
    /// Typical use: a before-middleware stores the authenticated user so
    /// that request-scoped services can depend on it.
    pub fn register_value<T: Any + Send + Sync>(&self, name: impl Into<Cow<'static, str>>, value: T) {
        let name = name.into();
        trace!(scope = self.id(), %name, "registering scope-local value");
        self.state.locals.write().insert(name, Registration::value(value));
    }

    /// Whether both handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Number of instances constructed and cached by this scope.
    pub fn cached(&self) -> usize {
        self.state.cache.len()
    }

    fn local(&self, name: &str) -> Option<(Cow<'static, str>, Registration)> {
        self.state
            .locals
            .read()
            .get_key_value(name)
            .map(|(name, registration)| (name.clone(), registration.clone()))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.state.id)
            .field("cached", &self.cached())
            .finish()
    }
}

// ── Cradle ────────────────────────────────────────────────────────────────────

struct Frame {
    key: Key,
    label: Cow<'static, str>,
}

/// The set of named dependencies available to a constructor or factory.
pub struct Cradle<'a> {
    scope: &'a Scope,
    parent: Option<&'a Cradle<'a>>,
    frame: Option<Frame>,
    depth: usize,
}

impl<'a> Cradle<'a> {
    pub(crate) fn new(scope: &'a Scope) -> Self {
        Self { scope, parent: None, frame: None, depth: 0 }
    }

    /// The scope this cradle resolves from. Inside a singleton's
    /// constructor this is the container's root scope.
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// Resolves the dependency named `name` as a `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, Error> {
        let (key, label, registration) = match self.scope.local(name) {
            Some((label, registration)) => (Key::Local(label.clone()), label, registration),
            None => match self.scope.container().registration(name) {
                Some((label, registration)) => {
                    (Key::Name(label.clone()), label.clone(), registration.clone())
                }
                None => {
                    return Err(Error::Unregistered {
                        name: Cow::Owned(name.to_owned()),
                        path: self.path_to(name),
                    });
                }
            },
        };

        let instance = self.instantiate(key, label.clone(), registration.lifetime, &*registration.build)?;
        instance.downcast::<T>().map_err(|_| Error::TypeMismatch {
            name: label,
            expected: type_name::<T>(),
            actual: registration.type_name,
        })
    }

    /// Whether `name` would resolve from here.
    pub fn contains(&self, name: &str) -> bool {
        self.scope.local(name).is_some() || self.scope.container().has(name)
    }

    /// Resolves an unregistered descriptor, honoring its lifetime.
    pub fn build<T: Send + Sync + 'static>(&self, resolver: &ResolverDescriptor<T>) -> Result<Arc<T>, Error> {
        let label = Cow::Borrowed(resolver.target_name());
        let build = |cradle: &Cradle<'_>| -> Result<Instance, Error> {
            resolver.target().instantiate(cradle).map(|t| Arc::new(t) as Instance)
        };
        let instance = self.instantiate(Key::Resolver(resolver.id()), label.clone(), resolver.lifetime(), &build)?;
        instance.downcast::<T>().map_err(|_| Error::TypeMismatch {
            name: label,
            expected: type_name::<T>(),
            actual: "<descriptor>",
        })
    }

    fn instantiate(
        &self,
        key: Key,
        label: Cow<'static, str>,
        lifetime: Lifetime,
        build: &dyn Fn(&Cradle<'_>) -> Result<Instance, Error>,
    ) -> Result<Instance, Error> {
        if self.is_resolving(&key) {
            return Err(Error::CircularDependency { path: self.path_to(&label) });
        }
        let limit = self.scope.container().options().max_depth;
        if self.depth >= limit {
            return Err(Error::DepthExceeded { limit, path: self.path_to(&label) });
        }

        trace!(dependency = %label, %lifetime, scope = self.scope.id(), "resolving");
        let frame = Frame { key: key.clone(), label };
        match lifetime {
            Lifetime::Transient => build(&self.child(self.scope, frame)),
            Lifetime::Scoped => self
                .scope
                .state
                .cache
                .get_or_try_init(&key, || build(&self.child(self.scope, frame))),
            Lifetime::Singleton => {
                // A singleton outlives every request: its own dependencies
                // come from the root, never from the current request's scope.
                let container = self.scope.container();
                let root = container.root_scope();
                container
                    .singletons()
                    .get_or_try_init(&key, || build(&self.child(&root, frame)))
            }
        }
    }

    fn child<'b>(&'b self, scope: &'b Scope, frame: Frame) -> Cradle<'b> {
        Cradle { scope, parent: Some(self), frame: Some(frame), depth: self.depth + 1 }
    }

    fn frames(&self) -> impl Iterator<Item = &Frame> {
        let mut cursor: Option<&Cradle<'_>> = Some(self);
        std::iter::from_fn(move || {
            let cradle = cursor?;
            cursor = cradle.parent;
            Some(cradle)
        })
        .filter_map(|cradle| cradle.frame.as_ref())
    }

    fn is_resolving(&self, key: &Key) -> bool {
        self.frames().any(|frame| frame.key == *key)
    }

    fn path_to(&self, last: &str) -> ResolutionPath {
        let mut segments: Vec<_> = self.frames().map(|frame| frame.label.clone()).collect();
        segments.reverse();
        segments.push(Cow::Owned(last.to_owned()));
        ResolutionPath(segments)
    }
}
