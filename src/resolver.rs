//! Handler classification and resolver descriptors.
//!
//! A handler reference is either a **class**, a type that knows how to build
//! itself from the [`Cradle`], or a **factory**, a plain function that takes
//! the cradle and returns the instance. The distinction is made exactly once,
//! when the reference is converted through [`IntoHandlerReference`]:
//!
//! ```text
//! class::<Users>()                 → HandlerKind::Class    (Users: Construct)
//! |c: &Cradle<'_>| Ok(Users { … }) → HandlerKind::Factory
//! ```
//!
//! A [`ResolverDescriptor`] pairs the classified reference with a
//! [`Lifetime`]. It is built once at registration time and reused by every
//! request that resolves it; its [`ResolverId`] is what the scope and
//! singleton caches are keyed on.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Error;
use crate::lifetime::Lifetime;
use crate::scope::Cradle;

/// A type that is built from its dependencies: the "class" half of a
/// handler reference.
///
/// ```rust
/// use std::sync::Arc;
/// use kura::{Construct, Cradle, Error};
///
/// struct Greeter { greeting: Arc<String> }
///
/// impl Construct for Greeter {
///     fn construct(cradle: &Cradle<'_>) -> Result<Self, Error> {
///         Ok(Self { greeting: cradle.get("greeting")? })
///     }
/// }
/// ```
pub trait Construct: Sized + Send + Sync + 'static {
    fn construct(cradle: &Cradle<'_>) -> Result<Self, Error>;
}

/// The construction strategy of a handler reference.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HandlerKind {
    /// Built through [`Construct::construct`].
    Class,
    /// Built by calling a factory function with the cradle.
    Factory,
}

/// Names a [`Construct`] type as a handler reference. Obtain with [`class`].
pub struct Class<C>(PhantomData<fn() -> C>);

/// Refers to the class `C`.
pub fn class<C: Construct>() -> Class<C> {
    Class(PhantomData)
}

impl<C> Clone for Class<C> {
    fn clone(&self) -> Self { *self }
}

impl<C> Copy for Class<C> {}

type BuildFn<T> = Arc<dyn Fn(&Cradle<'_>) -> Result<T, Error> + Send + Sync + 'static>;

/// A classified handler reference: how to produce a `T` from a cradle.
pub struct HandlerReference<T> {
    kind: HandlerKind,
    build: BuildFn<T>,
}

impl<T> HandlerReference<T> {
    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    /// The Rust type name of the produced instance.
    pub fn target_name(&self) -> &'static str {
        type_name::<T>()
    }

    pub(crate) fn instantiate(&self, cradle: &Cradle<'_>) -> Result<T, Error> {
        (self.build)(cradle)
    }
}

impl<T> Clone for HandlerReference<T> {
    fn clone(&self) -> Self {
        Self { kind: self.kind, build: Arc::clone(&self.build) }
    }
}

impl<T> fmt::Debug for HandlerReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerReference")
            .field("kind", &self.kind)
            .field("target", &self.target_name())
            .finish()
    }
}

/// Marker types selecting an [`IntoHandlerReference`] impl.
pub mod marker {
    pub enum Class {}
    pub enum Factory {}
    pub enum Reference {}
}

/// Classifies a value into a [`HandlerReference`].
///
/// `K` is a marker chosen by the compiler: exactly one impl applies to any
/// given value, so the classification is settled at compile time and a value
/// that is neither a class nor a factory is rejected outright.
pub trait IntoHandlerReference<T, K> {
    fn into_handler_reference(self) -> HandlerReference<T>;
}

impl<C: Construct> IntoHandlerReference<C, marker::Class> for Class<C> {
    fn into_handler_reference(self) -> HandlerReference<C> {
        HandlerReference { kind: HandlerKind::Class, build: Arc::new(C::construct) }
    }
}

impl<T, F> IntoHandlerReference<T, marker::Factory> for F
where
    F: Fn(&Cradle<'_>) -> Result<T, Error> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn into_handler_reference(self) -> HandlerReference<T> {
        HandlerReference { kind: HandlerKind::Factory, build: Arc::new(self) }
    }
}

impl<T> IntoHandlerReference<T, marker::Reference> for HandlerReference<T> {
    fn into_handler_reference(self) -> HandlerReference<T> {
        self
    }
}

// ── Descriptors ───────────────────────────────────────────────────────────────

/// Process-unique identity of a [`ResolverDescriptor`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ResolverId(u64);

impl ResolverId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifetime selection for a resolver.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ResolverOptions {
    pub lifetime: Lifetime,
}

impl ResolverOptions {
    /// Lifetime used when no options are given: a fresh instance per call.
    pub const DEFAULT_LIFETIME: Lifetime = Lifetime::Transient;

    pub const fn new(lifetime: Lifetime) -> Self {
        Self { lifetime }
    }
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIFETIME)
    }
}

impl From<Lifetime> for ResolverOptions {
    fn from(lifetime: Lifetime) -> Self {
        Self::new(lifetime)
    }
}

/// A reusable recipe for producing a `T`: classified reference + lifetime.
///
/// Cloning keeps the [`ResolverId`], so clones share cached instances.
pub struct ResolverDescriptor<T> {
    id: ResolverId,
    lifetime: Lifetime,
    target: HandlerReference<T>,
}

impl<T> ResolverDescriptor<T> {
    pub fn id(&self) -> ResolverId {
        self.id
    }

    /// Construction strategy, fixed when the descriptor was built.
    pub fn strategy(&self) -> HandlerKind {
        self.target.kind()
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn target(&self) -> &HandlerReference<T> {
        &self.target
    }

    pub fn target_name(&self) -> &'static str {
        self.target.target_name()
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn singleton(self) -> Self { self.with_lifetime(Lifetime::Singleton) }
    pub fn scoped(self) -> Self { self.with_lifetime(Lifetime::Scoped) }
    pub fn transient(self) -> Self { self.with_lifetime(Lifetime::Transient) }
}

impl<T> Clone for ResolverDescriptor<T> {
    fn clone(&self) -> Self {
        Self { id: self.id, lifetime: self.lifetime, target: self.target.clone() }
    }
}

impl<T> fmt::Debug for ResolverDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverDescriptor")
            .field("id", &self.id)
            .field("strategy", &self.strategy())
            .field("lifetime", &self.lifetime)
            .field("target", &self.target_name())
            .finish()
    }
}

/// Classifies `reference` and wraps it in a descriptor.
pub fn build<T, K>(
    reference: impl IntoHandlerReference<T, K>,
    options: ResolverOptions,
) -> ResolverDescriptor<T> {
    ResolverDescriptor {
        id: ResolverId::next(),
        lifetime: options.lifetime,
        target: reference.into_handler_reference(),
    }
}

/// Transient descriptor for the class `C`.
pub fn as_class<C: Construct>() -> ResolverDescriptor<C> {
    build(class::<C>(), ResolverOptions::default())
}

/// Transient descriptor for a factory function.
pub fn as_function<T, F>(factory: F) -> ResolverDescriptor<T>
where
    F: Fn(&Cradle<'_>) -> Result<T, Error> + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    build(factory, ResolverOptions::default())
}
