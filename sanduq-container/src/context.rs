//! The ambient injection context and the injection helpers.
//!
//! While a container resolves, the pair {container, resolution} sits in
//! a thread-local slot. Code running synchronously inside that extent
//! (class constructors and factories) reaches its dependencies through
//! the free functions here instead of being handed a resolver.
//!
//! The slot is restored by a guard on every exit path, panics included.
//! Calling a helper outside the extent, later or on another thread,
//! fails with [`SanduqError::OutsideInjectionContext`]. Use an
//! [`Injector`](crate::injector::Injector) to inject after the fact.

use std::cell::RefCell;
use std::sync::Arc;

use crate::container::Container;
use crate::error::{Result, SanduqError};
use crate::instance::Instance;
use crate::resolution::{DependentGuard, Resolution, SharedResolution};
use crate::token::Token;

#[derive(Clone)]
pub(crate) struct InjectionContext {
    pub container: Container,
    pub resolution: SharedResolution,
}

impl InjectionContext {
    /// A context with a brand-new resolution.
    pub fn fresh(container: Container) -> Self {
        Self {
            container,
            resolution: Resolution::shared(),
        }
    }
}

thread_local! {
    static CONTEXT: RefCell<Option<InjectionContext>> = const { RefCell::new(None) };
}

/// Restores the previously active context when dropped.
#[must_use = "the context is restored as soon as the guard is dropped"]
pub(crate) struct ContextGuard {
    previous: Option<InjectionContext>,
}

/// Makes `context` the active one until the returned guard drops.
pub(crate) fn provide(context: InjectionContext) -> ContextGuard {
    let previous = CONTEXT.with(|slot| slot.replace(Some(context)));
    ContextGuard { previous }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        // The replaced value is dropped after the borrow ends.
        let _ = CONTEXT.try_with(|slot| slot.replace(previous));
    }
}

/// The active context, if any.
pub(crate) fn current() -> Option<InjectionContext> {
    CONTEXT.try_with(|slot| slot.borrow().clone()).ok().flatten()
}

fn ensure(operation: &'static str) -> Result<InjectionContext> {
    current().ok_or(SanduqError::OutsideInjectionContext { operation })
}

/// Returns `true` when called while a container is resolving.
pub fn in_injection_context() -> bool {
    current().is_some()
}

/// Resolves `token` from the container currently resolving.
///
/// # Errors
/// [`SanduqError::OutsideInjectionContext`] outside a resolve call, or
/// any error of [`Container::resolve`].
pub fn inject<T: ?Sized + Send + Sync + 'static>(token: &Token<T>) -> Result<Arc<T>> {
    ensure("inject")?.container.resolve(token)
}

/// Resolves the registration of `token` carrying `name`.
pub fn inject_named<T: ?Sized + Send + Sync + 'static>(
    token: &Token<T>,
    name: &'static str,
) -> Result<Arc<T>> {
    ensure("inject_named")?.container.resolve_named(token, name)
}

/// Resolves every registration of `token`.
pub fn inject_all<T: ?Sized + Send + Sync + 'static>(token: &Token<T>) -> Result<Vec<Arc<T>>> {
    ensure("inject_all")?.container.resolve_all(token)
}

/// Like [`inject`], but `None` when nothing is registered.
pub fn optional<T: ?Sized + Send + Sync + 'static>(token: &Token<T>) -> Result<Option<Arc<T>>> {
    ensure("optional")?.container.resolve_optional(token)
}

pub fn optional_named<T: ?Sized + Send + Sync + 'static>(
    token: &Token<T>,
    name: &'static str,
) -> Result<Option<Arc<T>>> {
    ensure("optional_named")?
        .container
        .resolve_optional_named(token, name)
}

/// Like [`inject_all`], but an empty vec when nothing is registered.
pub fn optional_all<T: ?Sized + Send + Sync + 'static>(token: &Token<T>) -> Result<Vec<Arc<T>>> {
    ensure("optional_all")?.container.resolve_all_optional(token)
}

/// Runs `resolve` with `this` offered as the placeholder of the
/// provider currently being built.
///
/// A collaborator that asks for that provider again while `resolve`
/// runs receives `this` instead of a circular-dependency error. It sees
/// `this` as constructed so far: fields assigned after the `inject_by`
/// call returns are still unset at that point.
fn offering<A, R>(
    operation: &'static str,
    this: &Arc<A>,
    resolve: impl FnOnce(&Container) -> Result<R>,
) -> Result<R>
where
    A: Send + Sync + 'static,
{
    let context = ensure(operation)?;
    let _offer = DependentGuard::offer(&context.resolution, Instance::new(this.clone()));
    resolve(&context.container)
}

/// [`inject`] that can break a cycle back to the caller.
///
/// # Examples
/// ```
/// use sanduq_container::prelude::*;
/// use std::sync::{Arc, OnceLock, Weak};
///
/// struct Chicken {
///     egg: OnceLock<Arc<Egg>>,
/// }
///
/// struct Egg {
///     chicken: Weak<Chicken>,
/// }
///
/// impl Injectable for Chicken {
///     fn construct() -> Result<Arc<Self>> {
///         let this = Arc::new(Chicken { egg: OnceLock::new() });
///         let egg = inject_by(&this, &Token::<Egg>::class())?;
///         let _ = this.egg.set(egg);
///         Ok(this)
///     }
/// }
///
/// impl Injectable for Egg {
///     fn construct() -> Result<Arc<Self>> {
///         let chicken = inject(&Token::<Chicken>::class())?;
///         Ok(Arc::new(Egg { chicken: Arc::downgrade(&chicken) }))
///     }
/// }
///
/// let container = Container::new();
/// let chicken = container.resolve(&Token::<Chicken>::class()).unwrap();
/// let egg = chicken.egg.get().unwrap();
/// assert!(Arc::ptr_eq(&egg.chicken.upgrade().unwrap(), &chicken));
/// ```
pub fn inject_by<A, T>(this: &Arc<A>, token: &Token<T>) -> Result<Arc<T>>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    offering("inject_by", this, |container| container.resolve(token))
}

pub fn inject_named_by<A, T>(this: &Arc<A>, token: &Token<T>, name: &'static str) -> Result<Arc<T>>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    offering("inject_named_by", this, |container| {
        container.resolve_named(token, name)
    })
}

pub fn inject_all_by<A, T>(this: &Arc<A>, token: &Token<T>) -> Result<Vec<Arc<T>>>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    offering("inject_all_by", this, |container| container.resolve_all(token))
}

pub fn optional_by<A, T>(this: &Arc<A>, token: &Token<T>) -> Result<Option<Arc<T>>>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    offering("optional_by", this, |container| {
        container.resolve_optional(token)
    })
}

pub fn optional_named_by<A, T>(
    this: &Arc<A>,
    token: &Token<T>,
    name: &'static str,
) -> Result<Option<Arc<T>>>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    offering("optional_named_by", this, |container| {
        container.resolve_optional_named(token, name)
    })
}

pub fn optional_all_by<A, T>(this: &Arc<A>, token: &Token<T>) -> Result<Vec<Arc<T>>>
where
    A: Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    offering("optional_all_by", this, |container| {
        container.resolve_all_optional(token)
    })
}
