//! # The Container: heart of Sanduq
//!
//! A container binds tokens to providers and builds object graphs on
//! demand. Containers form a tree: a child sees every registration of
//! its ancestors unless it registers the token itself, and keeps its own
//! instance cache.
//!
//! # Architecture
//! ```text
//! register ──> TokenRegistry ──(parent)──> TokenRegistry
//!                    │
//! resolve ──> context ──> middleware ──> chain ──> scope / cycle stack ──> provider
//!                                                        │
//!                                          inject() ─────┘ (nested resolves)
//! ```
//!
//! # Examples
//! ```rust
//! use sanduq_container::prelude::*;
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, msg: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//! impl Logger for ConsoleLogger {
//!     fn log(&self, msg: &str) -> String { format!("[console] {msg}") }
//! }
//!
//! struct UserService {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! impl Injectable for UserService {
//!     fn construct() -> Result<Arc<Self>> {
//!         Ok(Arc::new(UserService { logger: inject(&Token::of())? }))
//!     }
//! }
//!
//! let container = Container::new();
//! container
//!     .register_with(
//!         &Token::<dyn Logger>::of(),
//!         Provider::factory_arc(|| Ok(Arc::new(ConsoleLogger) as Arc<dyn Logger>)),
//!         Scope::Container,
//!     )
//!     .unwrap();
//!
//! let service = container.resolve(&Token::<UserService>::class()).unwrap();
//! assert_eq!(service.logger.log("hi"), "[console] hi");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use sanduq_support::rendering::suggest_similar;
use tracing::{debug, instrument, trace, warn};

use crate::chain::{Chain, Source};
use crate::class::{ClassDescriptor, Injectable, class_descriptor};
use crate::context::{self, InjectionContext};
use crate::error::{CircularDependencyError, Result, SanduqError, UnregisteredTokenError};
use crate::instance::Instance;
use crate::middleware::{InterceptorFn, Operation, Outcome, ResolveCall, run_chain};
use crate::module::{Module, collected_modules};
use crate::options::{ContainerOptions, RegistrationOptions};
use crate::provider::{BuildFn, ErasedProvider, Provider, ProviderKind};
use crate::registry::{Registration, TokenRegistry};
use crate::resolution::{Frame, FrameGuard, SharedResolution};
use crate::scope::Scope;
use crate::token::{ClassHook, Token, TokenKey};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

const MAX_SUGGESTIONS: usize = 3;

struct ContainerInner {
    id: u64,
    options: ContainerOptions,
    registry: Arc<TokenRegistry>,
    parent: Option<Container>,
    children: Mutex<Vec<Weak<ContainerInner>>>,
    middleware: RwLock<Vec<(Operation, InterceptorFn)>>,
    disposed: AtomicBool,
}

/// Hierarchical, thread-safe dependency injection container.
///
/// Cloning a `Container` clones the handle, not the registrations.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Creates a root container with default options.
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    /// Creates a root container.
    pub fn with_options(options: ContainerOptions) -> Self {
        Self::build(options, None)
    }

    fn build(options: ContainerOptions, parent: Option<Container>) -> Self {
        let registry = match &parent {
            Some(parent) => TokenRegistry::with_parent(Some(parent.inner.registry.clone())),
            None => TokenRegistry::new(),
        };
        Self {
            inner: Arc::new(ContainerInner {
                id: NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed),
                options,
                registry: Arc::new(registry),
                parent,
                children: Mutex::new(Vec::new()),
                middleware: RwLock::new(Vec::new()),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same container.
    pub fn ptr_eq(&self, other: &Container) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(SanduqError::DisposedContainerUse);
        }
        Ok(())
    }

    pub(crate) fn add_interceptor(&self, operation: Operation, interceptor: InterceptorFn) {
        self.inner.middleware.write().push((operation, interceptor));
    }

    // ── Children ──

    /// Creates a child sharing this container's options.
    pub fn create_child(&self) -> Result<Container> {
        self.create_child_with(self.inner.options.clone())
    }

    /// Creates a child with its own options.
    pub fn create_child_with(&self, options: ContainerOptions) -> Result<Container> {
        self.ensure_live()?;
        let child = Container::build(options, Some(self.clone()));
        let mut children = self.inner.children.lock();
        children.retain(|child| child.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));
        drop(children);

        debug!(parent = self.inner.id, child = child.inner.id, "Created child container");
        Ok(child)
    }

    // ── Registration ──

    /// Registers `provider` under `token`.
    ///
    /// Class providers pick up the scope of the class metadata; every
    /// other provider gets the container's `default_scope`.
    ///
    /// # Errors
    /// - [`SanduqError::SelfAlias`] for an alias pointing at `token` itself
    /// - [`SanduqError::ReservedTokenViolation`] for built-in tokens
    /// - [`SanduqError::DisposedContainerUse`]
    pub fn register<T>(&self, token: &Token<T>, provider: Provider<T>) -> Result<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_with(token, provider, RegistrationOptions::default())
    }

    /// Registers `provider` under `token` with explicit options.
    ///
    /// ```
    /// use sanduq_container::prelude::*;
    ///
    /// let url = Token::<String>::new("DatabaseUrl");
    /// let container = Container::new();
    /// container
    ///     .register_with(&url, Provider::value("postgres://primary".to_string()), RegistrationOptions::new().name("primary"))
    ///     .unwrap();
    /// assert_eq!(*container.resolve_named(&url, "primary").unwrap(), "postgres://primary");
    /// ```
    pub fn register_with<T>(
        &self,
        token: &Token<T>,
        provider: Provider<T>,
        options: impl Into<RegistrationOptions>,
    ) -> Result<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register_erased(token.key().clone(), provider.into_erased(), options.into())?;
        Ok(())
    }

    /// Registers the class `C` as described by its metadata.
    ///
    /// Registers the class token, then every alias the metadata declares.
    /// A class marked `eager` whose scope is `Container` is built right away.
    pub fn register_class<C: Injectable>(&self) -> Result<()> {
        self.ensure_live()?;
        self.register_descriptor(class_descriptor::<C>(), true)?;
        Ok(())
    }

    fn register_erased(
        &self,
        token: TokenKey,
        provider: ErasedProvider,
        options: RegistrationOptions,
    ) -> Result<Arc<Registration>> {
        self.ensure_live()?;
        if let ProviderKind::Existing { target, name } = &provider.kind {
            if *target == token && *name == options.name {
                return Err(SanduqError::SelfAlias { token });
            }
        }

        let scope = options
            .scope
            .or(provider.default_scope)
            .unwrap_or(self.inner.options.default_scope);
        self.inner
            .registry
            .set(Registration::new(token, provider, scope, options.name))
    }

    fn register_descriptor(
        &self,
        descriptor: ClassDescriptor,
        allow_eager: bool,
    ) -> Result<Arc<Registration>> {
        let ClassDescriptor {
            token,
            provider,
            scope,
            eager,
            aliases,
            ..
        } = descriptor;

        let registration = self.register_erased(
            token.clone(),
            provider,
            RegistrationOptions { scope, name: None },
        )?;
        for (alias, provider) in aliases {
            self.register_erased(alias, provider, RegistrationOptions::default())?;
        }

        if allow_eager && eager && registration.scope == Scope::Container {
            debug!(token = %token, "Eagerly instantiating");
            self.with_context(|resolution| self.resolve_registration(&registration, resolution))?;
        }
        Ok(registration)
    }

    // ── Removal ──

    /// Removes every local registration of `token`.
    ///
    /// Returns the values those registrations had cached. They are not disposed.
    pub fn unregister<T>(&self, token: &Token<T>) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.unregister_erased(token, None)
    }

    /// Removes the local registration of `token` carrying `name`.
    pub fn unregister_named<T>(&self, token: &Token<T>, name: &'static str) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.unregister_erased(token, Some(name))
    }

    fn unregister_erased<T>(&self, token: &Token<T>, name: Option<&'static str>) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.ensure_live()?;
        let removed = self.inner.registry.delete(token.key(), name);
        Ok(take_cached(&removed)
            .into_iter()
            .filter_map(|(registration, raw)| registration.view(&raw))
            .filter_map(|value| value.downcast::<T>())
            .collect())
    }

    /// Removes every local registration, returning the cached values.
    pub fn reset_registry(&self) -> Result<Vec<Instance>> {
        self.ensure_live()?;
        let removed = self.inner.registry.delete_all();
        debug!(container = self.inner.id, removed = removed.len(), "Registry reset");
        Ok(take_cached(&removed)
            .into_iter()
            .map(|(_, raw)| raw)
            .collect())
    }

    /// Drops every locally cached value, keeping the registrations.
    pub fn clear_cache(&self) -> Result<Vec<Instance>> {
        self.ensure_live()?;
        let cleared = self.inner.registry.clear_cache();
        debug!(container = self.inner.id, cleared = cleared.len(), "Cache cleared");
        Ok(cleared)
    }

    // ── Queries ──

    pub fn is_registered<T: ?Sized + 'static>(&self, token: &Token<T>) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.inner.registry.get(token.key(), None).is_some())
    }

    pub fn is_registered_named<T: ?Sized + 'static>(
        &self,
        token: &Token<T>,
        name: &'static str,
    ) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.inner.registry.get(token.key(), Some(name)).is_some())
    }

    /// The value cached for `token`, without building anything.
    pub fn get_cached<T>(&self, token: &Token<T>) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.ensure_live()?;
        let Some(registration) = self.inner.registry.get(token.key(), None) else {
            return Ok(None);
        };
        Ok(self
            .cached_through(registration)?
            .and_then(|value| value.downcast::<T>()))
    }

    /// The cached values of every registration of `token`, in order.
    pub fn get_all_cached<T>(&self, token: &Token<T>) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.ensure_live()?;
        let registrations = self.inner.registry.get_all(token.key(), None).unwrap_or_default();
        let mut values = Vec::new();
        for registration in registrations {
            if let Some(value) = self.cached_through(registration)?.and_then(|v| v.downcast::<T>()) {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn cached_through(&self, registration: Arc<Registration>) -> Result<Option<Instance>> {
        let registry = &self.inner.registry;
        let Ok(chain) = Chain::follow(registration, |link| {
            Ok(link
                .provider
                .alias_target()
                .and_then(|(target, name)| registry.get(target, name)))
        }) else {
            return Ok(None);
        };
        match chain.concrete.cached() {
            Some(raw) => chain.present(&raw).map(Some),
            None => Ok(None),
        }
    }

    // ── Resolution ──

    /// Resolves the most recent registration of `token`.
    ///
    /// An unregistered class token is auto-registered when its metadata
    /// or the container options opt in, and otherwise built directly
    /// unless its scope is `Container`.
    ///
    /// # Errors
    /// - [`SanduqError::UnregisteredToken`] if nothing is registered
    /// - [`SanduqError::ContainerScopedClass`] for an unregistered class with `Container` scope
    /// - [`SanduqError::CircularDependency`] on a cycle without placeholder
    /// - [`SanduqError::AliasResolutionFailure`] if an alias cannot be followed
    /// - [`SanduqError::ConstructionFailed`] if a provider fails
    pub fn resolve<T>(&self, token: &Token<T>) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_required(token, None)
    }

    /// Resolves the registration of `token` carrying `name`.
    pub fn resolve_named<T>(&self, token: &Token<T>, name: &'static str) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_required(token, Some(name))
    }

    /// Like [`resolve`](Self::resolve), but `None` when nothing is registered.
    pub fn resolve_optional<T>(&self, token: &Token<T>) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_typed(token, None, true)
    }

    pub fn resolve_optional_named<T>(
        &self,
        token: &Token<T>,
        name: &'static str,
    ) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_typed(token, Some(name), true)
    }

    /// Resolves every registration of `token`, in registration order.
    ///
    /// Called from outside any resolution, each registration is built as
    /// its own outer call: `Resolution`-scoped dependencies are not shared
    /// between the returned values. Inside a provider (through
    /// [`inject_all`](crate::context::inject_all)) they share the
    /// enclosing call's instances.
    pub fn resolve_all<T>(&self, token: &Token<T>) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_all_typed(token, false)
    }

    /// Like [`resolve_all`](Self::resolve_all), but empty when nothing is registered.
    pub fn resolve_all_optional<T>(&self, token: &Token<T>) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_all_typed(token, true)
    }

    fn resolve_required<T>(&self, token: &Token<T>, name: Option<&'static str>) -> Result<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.resolve_typed(token, name, false)? {
            Some(value) => Ok(value),
            None => {
                let path = context::current()
                    .filter(|active| active.container.ptr_eq(self))
                    .map(|active| dependency_path(&active.resolution))
                    .unwrap_or_default();
                Err(self.missing(token.key(), name, path))
            }
        }
    }

    fn resolve_typed<T>(
        &self,
        token: &Token<T>,
        name: Option<&'static str>,
        optional: bool,
    ) -> Result<Option<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let call = ResolveCall {
            operation: Operation::Resolve,
            token: token.key().clone(),
            name,
            optional,
        };
        let instance = match self.resolve_instance(&call)? {
            Outcome::One(instance) => instance,
            Outcome::Many(mut all) => all.pop(),
        };
        instance
            .map(|instance| instance.downcast_for::<T>(token.key()))
            .transpose()
    }

    fn resolve_all_typed<T>(&self, token: &Token<T>, optional: bool) -> Result<Vec<Arc<T>>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let call = ResolveCall {
            operation: Operation::ResolveAll,
            token: token.key().clone(),
            name: None,
            optional,
        };
        let instances = match self.resolve_instance(&call)? {
            Outcome::Many(all) => all,
            Outcome::One(one) => one.into_iter().collect(),
        };
        instances
            .iter()
            .map(|instance| instance.downcast_for::<T>(token.key()))
            .collect()
    }

    /// Runs a type-erased call through the middleware and the resolver.
    pub fn resolve_instance(&self, call: &ResolveCall) -> Result<Outcome> {
        self.ensure_live()?;
        self.with_context(|resolution| {
            let interceptors: Vec<InterceptorFn> = self
                .inner
                .middleware
                .read()
                .iter()
                .filter(|(operation, _)| *operation == call.operation)
                .map(|(_, interceptor)| interceptor.clone())
                .collect();
            run_chain(&interceptors, call, &|call: &ResolveCall| {
                self.dispatch(call, resolution)
            })
        })
    }

    /// Runs `resolve` inside this container's injection context.
    ///
    /// Reuses the active resolution when this container is already
    /// resolving, and provides a fresh one otherwise.
    fn with_context<R>(&self, resolve: impl FnOnce(&SharedResolution) -> Result<R>) -> Result<R> {
        let (resolution, _guard) = match context::current() {
            Some(active) if active.container.ptr_eq(self) => {
                trace!(container = self.inner.id, "Reusing active resolution");
                (active.resolution, None)
            }
            _ => {
                let fresh = InjectionContext::fresh(self.clone());
                let resolution = fresh.resolution.clone();
                (resolution, Some(context::provide(fresh)))
            }
        };
        resolve(&resolution)
    }

    fn dispatch(&self, call: &ResolveCall, resolution: &SharedResolution) -> Result<Outcome> {
        match call.operation {
            Operation::Resolve => self
                .resolve_one(&call.token, call.name, call.optional, resolution)
                .map(Outcome::One),
            Operation::ResolveAll => self
                .resolve_many(&call.token, call.name, call.optional, resolution)
                .map(Outcome::Many),
        }
    }

    fn resolve_one(
        &self,
        token: &TokenKey,
        name: Option<&'static str>,
        optional: bool,
        resolution: &SharedResolution,
    ) -> Result<Option<Instance>> {
        trace!(token = %token, name = ?name, "Resolving");
        match self.lookup(token, name)? {
            Some(registration) => self.resolve_registration(&registration, resolution).map(Some),
            None if optional => Ok(None),
            None => Err(self.missing(token, name, dependency_path(resolution))),
        }
    }

    fn resolve_many(
        &self,
        token: &TokenKey,
        name: Option<&'static str>,
        optional: bool,
        resolution: &SharedResolution,
    ) -> Result<Vec<Instance>> {
        trace!(token = %token, "Resolving all");
        let registrations = match self.inner.registry.get_all(token, name) {
            Some(all) => all,
            None => match (name, token.class_hook()) {
                (None, Some(hook)) => self.class_fallback(hook)?.into_iter().collect(),
                _ => Vec::new(),
            },
        };

        if registrations.is_empty() {
            return if optional {
                Ok(Vec::new())
            } else {
                Err(self.missing(token, name, dependency_path(resolution)))
            };
        }

        registrations
            .iter()
            .map(|registration| self.resolve_registration(registration, resolution))
            .collect()
    }

    /// The registration answering `token`, falling back to the class for
    /// unnamed class tokens.
    fn lookup(&self, token: &TokenKey, name: Option<&'static str>) -> Result<Option<Arc<Registration>>> {
        if let Some(registration) = self.inner.registry.get(token, name) {
            return Ok(Some(registration));
        }
        match (name, token.class_hook()) {
            (None, Some(hook)) => self.class_fallback(hook),
            _ => Ok(None),
        }
    }

    /// Registration for an unregistered class, or `None` if it may not be built.
    fn class_fallback(&self, hook: ClassHook) -> Result<Option<Arc<Registration>>> {
        let descriptor = hook();
        let auto_register = descriptor
            .auto_register
            .unwrap_or(self.inner.options.auto_register);
        if auto_register {
            debug!(token = %descriptor.token, "Auto-registering class");
            return self.register_descriptor(descriptor, false).map(Some);
        }

        let scope = descriptor
            .scope
            .unwrap_or(self.inner.options.default_scope);
        if scope == Scope::Container {
            return Ok(None);
        }
        trace!(token = %descriptor.token, scope = %scope, "Building unregistered class");
        Ok(Some(Arc::new(Registration::new(
            descriptor.token,
            descriptor.provider,
            scope,
            None,
        ))))
    }

    fn resolve_registration(
        &self,
        registration: &Arc<Registration>,
        resolution: &SharedResolution,
    ) -> Result<Instance> {
        let chain = Chain::follow(registration.clone(), |link| match link.provider.alias_target() {
            Some((target, name)) => self.lookup(target, name),
            None => Ok(None),
        })?;
        if chain.is_alias() {
            trace!(token = %registration.token, target = %chain.concrete.token, "Resolved through alias");
        }

        let raw = match &chain.source {
            Source::Value(instance) => instance.clone(),
            Source::Build(build) => self
                .produce(&chain.concrete, build, None, resolution)
                .map_err(|err| chain.wrap(err))?,
        };
        chain.present(&raw)
    }

    /// Builds (or fetches from the right cache) the value of a concrete registration.
    fn produce(
        &self,
        registration: &Arc<Registration>,
        build: &BuildFn,
        forced: Option<Scope>,
        resolution: &SharedResolution,
    ) -> Result<Instance> {
        if registration.provider.internal {
            return build();
        }

        let provider = registration.provider.id;
        let scope = forced.unwrap_or_else(|| {
            let dependent = resolution.lock().top().map(|frame| frame.scope);
            registration.scope.effective(dependent)
        });

        match scope {
            Scope::Container => {
                if let Some(cached) = registration.cached() {
                    trace!(token = %registration.token, "Container cache hit");
                    return Ok(cached);
                }
                if let Some(owner) = self.owner_of(registration) {
                    trace!(token = %registration.token, owner = owner.inner.id, "Delegating to owning container");
                    return owner.produce_owned(registration, build);
                }
            }
            Scope::Resolution => {
                if let Some(cached) = resolution.lock().cached(provider) {
                    trace!(token = %registration.token, "Resolution cache hit");
                    return Ok(cached);
                }
            }
            Scope::Transient | Scope::Inherited => {}
        }

        {
            let locked = resolution.lock();
            if locked.is_building(provider) {
                if let Some(placeholder) = locked.dependent(provider) {
                    trace!(token = %registration.token, "Answering cycle with placeholder");
                    return Ok(placeholder);
                }
                let path = locked.path();
                drop(locked);
                warn!(token = %registration.token, depth = path.len(), "Circular dependency detected");
                return Err(SanduqError::CircularDependency(CircularDependencyError {
                    token: registration.token.clone(),
                    path,
                }));
            }
        }

        let _frame = FrameGuard::push(
            resolution,
            Frame {
                provider,
                token: registration.token.clone(),
                scope,
            },
        );
        trace!(
            token = %registration.token,
            scope = %scope,
            depth = resolution.lock().depth(),
            "Invoking provider"
        );
        let instance = build().map_err(|err| err.attach_token(&registration.token))?;

        match scope {
            Scope::Container => {
                let kept = registration.store(instance.clone());
                if !kept.same_as(&instance) {
                    trace!(token = %registration.token, "Container cache filled concurrently, keeping first value");
                }
                Ok(kept)
            }
            Scope::Resolution => {
                resolution.lock().store(provider, instance.clone());
                Ok(instance)
            }
            Scope::Transient | Scope::Inherited => Ok(instance),
        }
    }

    /// Builds a `Container`-scoped value on behalf of a descendant.
    fn produce_owned(&self, registration: &Arc<Registration>, build: &BuildFn) -> Result<Instance> {
        self.ensure_live()?;
        let fresh = InjectionContext::fresh(self.clone());
        let resolution = fresh.resolution.clone();
        let _guard = context::provide(fresh);
        self.produce(registration, build, Some(Scope::Container), &resolution)
    }

    /// The ancestor whose registry holds `registration`, if not this one.
    fn owner_of(&self, registration: &Registration) -> Option<Container> {
        let owner_id = registration.registry_id();
        if owner_id == self.inner.registry.id() {
            return None;
        }
        let mut ancestor = self.inner.parent.as_ref();
        while let Some(container) = ancestor {
            if container.inner.registry.id() == owner_id {
                return Some(container.clone());
            }
            ancestor = container.inner.parent.as_ref();
        }
        None
    }

    fn missing(&self, token: &TokenKey, name: Option<&'static str>, path: Vec<TokenKey>) -> SanduqError {
        if name.is_none() && self.refuses_class(token) {
            return SanduqError::ContainerScopedClass {
                token: token.clone(),
            };
        }
        let available = self.inner.registry.token_names();
        SanduqError::UnregisteredToken(UnregisteredTokenError {
            requested: token.clone(),
            name,
            required_by: path.last().cloned(),
            path,
            suggestions: suggest_similar(token.name(), &available, MAX_SUGGESTIONS),
        })
    }

    /// Whether the class fallback turns `token` away for being `Container`-scoped.
    fn refuses_class(&self, token: &TokenKey) -> bool {
        let Some(hook) = token.class_hook() else {
            return false;
        };
        if self.inner.registry.get(token, None).is_some() {
            return false;
        }
        let descriptor = hook();
        let auto_register = descriptor
            .auto_register
            .unwrap_or(self.inner.options.auto_register);
        let scope = descriptor
            .scope
            .unwrap_or(self.inner.options.default_scope);
        !auto_register && scope == Scope::Container
    }

    // ── Modules ──

    /// Applies the registrations of `module`.
    pub fn install(&self, module: &dyn Module) -> Result<()> {
        self.ensure_live()?;
        debug!(module = module.name(), "Installing module");
        module.register(self)
    }

    /// Installs every module submitted with `inventory::submit!`.
    ///
    /// Returns how many modules were installed.
    pub fn install_collected_modules(&self) -> Result<usize> {
        let mut installed = 0;
        for module in collected_modules() {
            self.install(module)?;
            installed += 1;
        }
        Ok(installed)
    }

    // ── Disposal ──

    /// Tears the container down.
    ///
    /// Disposes the children first, detaches from the parent, then calls
    /// the disposal hook of every distinct cached instance exactly once
    /// and empties the registry. Calling it again does nothing; every
    /// other operation fails with [`SanduqError::DisposedContainerUse`].
    pub fn dispose(&self) {
        self.dispose_with(&mut HashSet::new());
    }

    /// Disposes this container and its descendants, skipping identities in `seen`.
    #[instrument(skip(self, seen), fields(container = self.inner.id))]
    fn dispose_with(&self, seen: &mut HashSet<usize>) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let children: Vec<Weak<ContainerInner>> = self.inner.children.lock().drain(..).collect();
        for inner in children.iter().filter_map(Weak::upgrade) {
            Container { inner }.dispose_with(seen);
        }

        if let Some(parent) = &self.inner.parent {
            let me = Arc::as_ptr(&self.inner);
            parent
                .inner
                .children
                .lock()
                .retain(|child| child.as_ptr() != me);
        }

        let registrations = self.inner.registry.delete_all();
        let mut disposed = 0usize;
        for registration in &registrations {
            let cached = registration.take_cached();
            let value = match &registration.provider.kind {
                ProviderKind::Value { instance } => Some(instance.clone()),
                _ => None,
            };
            for instance in cached.into_iter().chain(value) {
                if instance.is_disposable() && seen.insert(instance.identity()) {
                    instance.dispose();
                    disposed += 1;
                }
            }
        }
        self.inner.middleware.write().clear();

        debug!(
            registrations = registrations.len(),
            disposed, "Container disposed"
        );
    }
}

/// Tokens under construction, outermost first.
fn dependency_path(resolution: &SharedResolution) -> Vec<TokenKey> {
    resolution
        .lock()
        .path()
        .into_iter()
        .map(|(token, _)| token)
        .collect()
}

/// Takes the cached values out of removed registrations, each object once.
fn take_cached(removed: &[Arc<Registration>]) -> Vec<(Arc<Registration>, Instance)> {
    let mut seen = HashSet::new();
    removed
        .iter()
        .filter_map(|registration| {
            registration
                .take_cached()
                .map(|raw| (registration.clone(), raw))
        })
        .filter(|(_, raw)| seen.insert(raw.identity()))
        .collect()
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("registered", &self.inner.registry.len())
            .field("has_parent", &self.inner.parent.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::Container;
    pub use crate::class::{ClassMetadata, Injectable};
    pub use crate::context::{
        in_injection_context, inject, inject_all, inject_all_by, inject_by, inject_named, inject_named_by,
        optional, optional_all, optional_all_by, optional_by, optional_named, optional_named_by,
    };
    pub use crate::error::{Result, SanduqError};
    pub use crate::injector::Injector;
    pub use crate::instance::{Disposable, Instance};
    pub use crate::middleware::{
        Middleware, MiddlewareComposer, Next, Operation, Outcome, ResolveCall, apply_middleware,
    };
    pub use crate::module::{Module, ModuleRegistration};
    pub use crate::options::{ContainerOptions, RegistrationOptions};
    pub use crate::provider::Provider;
    pub use crate::scope::Scope;
    pub use crate::token::{Token, TokenKey};
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassMetadata;
    use crate::context::{in_injection_context, inject, inject_by};
    use crate::instance::Disposable;
    use std::sync::OnceLock;
    use std::sync::atomic::AtomicU32;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    fn counting_factory(calls: &Arc<AtomicU32>) -> Provider<u32> {
        let calls = calls.clone();
        Provider::factory(move || Ok(calls.fetch_add(1, Ordering::SeqCst)))
    }

    #[test]
    fn env_value_is_visible_from_child() {
        let env = Token::<&'static str>::new("Env");
        let container = Container::new();
        container.register(&env, Provider::value("production")).unwrap();

        let child = container.create_child().unwrap();
        assert_eq!(*child.resolve(&env).unwrap(), "production");
    }

    #[test]
    fn container_scope_returns_same_instance() {
        let token = Token::<u32>::new("Counter");
        let calls = counter();
        let container = Container::new();
        container
            .register_with(&token, counting_factory(&calls), Scope::Container)
            .unwrap();

        let a = container.resolve(&token).unwrap();
        let b = container.resolve(&token).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let child = container.create_child().unwrap();
        let c = child.resolve(&token).unwrap();
        assert!(Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn ancestor_owned_singleton_is_cached_by_ancestor() {
        let token = Token::<u32>::new("Counter");
        let calls = counter();
        let parent = Container::new();
        parent
            .register_with(&token, counting_factory(&calls), Scope::Container)
            .unwrap();

        let first_child = parent.create_child().unwrap();
        let second_child = parent.create_child().unwrap();
        let from_first = first_child.resolve(&token).unwrap();
        let from_second = second_child.resolve(&token).unwrap();

        assert!(Arc::ptr_eq(&from_first, &from_second));
        assert!(Arc::ptr_eq(&parent.get_cached(&token).unwrap().unwrap(), &from_first));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn child_override_shadows_parent() {
        let token = Token::<&'static str>::new("Mode");
        let parent = Container::new();
        parent.register(&token, Provider::value("parent")).unwrap();
        let child = parent.create_child().unwrap();
        child.register(&token, Provider::value("child")).unwrap();

        assert_eq!(*child.resolve(&token).unwrap(), "child");
        assert_eq!(*parent.resolve(&token).unwrap(), "parent");
        assert_eq!(child.resolve_all(&token).unwrap().len(), 1);
    }

    #[test]
    fn transient_scope_builds_every_time() {
        let token = Token::<u32>::new("Ticket");
        let calls = counter();
        let container = Container::new();
        container
            .register_with(&token, counting_factory(&calls), Scope::Transient)
            .unwrap();

        let a = container.resolve(&token).unwrap();
        let b = container.resolve(&token).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!((*a, *b), (0, 1));
    }

    #[test]
    fn inherited_at_top_level_behaves_as_transient() {
        let token = Token::<u32>::new("Inherited");
        let calls = counter();
        let container = Container::new();
        container.register(&token, counting_factory(&calls)).unwrap();

        container.resolve(&token).unwrap();
        container.resolve(&token).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(container.get_cached(&token).unwrap().is_none());
    }

    struct Pair {
        left: Arc<u32>,
        right: Arc<u32>,
    }

    fn pair_of(token: &Token<u32>) -> Provider<Pair> {
        let token = token.clone();
        Provider::factory(move || {
            Ok(Pair {
                left: inject(&token)?,
                right: inject(&token)?,
            })
        })
    }

    #[test]
    fn resolution_scope_is_shared_within_one_call() {
        let id = Token::<u32>::new("RequestId");
        let root = Token::<Pair>::new("Root");
        let calls = counter();
        let container = Container::new();
        container
            .register_with(&id, counting_factory(&calls), Scope::Resolution)
            .unwrap();
        container
            .register_with(&root, pair_of(&id), Scope::Transient)
            .unwrap();

        let first = container.resolve(&root).unwrap();
        assert!(Arc::ptr_eq(&first.left, &first.right));

        let second = container.resolve(&root).unwrap();
        assert!(!Arc::ptr_eq(&first.left, &second.left));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn inherited_follows_the_dependent_scope() {
        let id = Token::<u32>::new("Inherited");
        let root = Token::<Pair>::new("Root");
        let calls = counter();
        let container = Container::new();
        container.register(&id, counting_factory(&calls)).unwrap();
        container
            .register_with(&root, pair_of(&id), Scope::Container)
            .unwrap();

        let pair = container.resolve(&root).unwrap();
        assert!(Arc::ptr_eq(&pair.left, &pair.right));
        assert!(container.get_cached(&id).unwrap().is_some());
    }

    #[test]
    fn a_different_container_gets_its_own_resolution() {
        let other = Container::new();
        let id = Token::<u32>::new("RequestId");
        let calls = counter();
        other
            .register_with(&id, counting_factory(&calls), Scope::Resolution)
            .unwrap();

        let root = Token::<Pair>::new("Root");
        let container = Container::new();
        container
            .register(&root, {
                let other = other.clone();
                let id = id.clone();
                Provider::factory(move || {
                    Ok(Pair {
                        left: other.resolve(&id)?,
                        right: other.resolve(&id)?,
                    })
                })
            })
            .unwrap();

        let pair = container.resolve(&root).unwrap();
        assert!(!Arc::ptr_eq(&pair.left, &pair.right));
    }

    #[test]
    fn resolve_all_keeps_registration_order() {
        let token = Token::<&'static str>::new("Plugin");
        let container = Container::new();
        for name in ["auth", "cache", "metrics"] {
            container.register(&token, Provider::value(name)).unwrap();
        }

        let all: Vec<&str> = container
            .resolve_all(&token)
            .unwrap()
            .iter()
            .map(|value| **value)
            .collect();
        assert_eq!(all, ["auth", "cache", "metrics"]);
        assert_eq!(*container.resolve(&token).unwrap(), "metrics");
    }

    #[test]
    fn resolve_all_optional_is_empty() {
        let token = Token::<u8>::new("Nothing");
        let container = Container::new();
        assert!(container.resolve_all_optional(&token).unwrap().is_empty());
        assert!(matches!(
            container.resolve_all(&token),
            Err(SanduqError::UnregisteredToken(_))
        ));
    }

    #[test]
    fn unregistered_token_error_suggests_similar() {
        let container = Container::new();
        container
            .register(&Token::<String>::new("DatabaseUrl"), Provider::value(String::new()))
            .unwrap();

        match container.resolve(&Token::<String>::new("Database")) {
            Err(SanduqError::UnregisteredToken(err)) => {
                assert_eq!(err.suggestions, ["DatabaseUrl"]);
                assert!(err.required_by.is_none());
            }
            other => panic!("expected UnregisteredToken, got {other:?}"),
        }
        assert_eq!(container.resolve_optional(&Token::<u8>::new("Missing")).unwrap(), None);
    }

    #[test]
    fn unregistered_dependency_names_its_dependent() {
        let missing = Token::<u8>::new("Missing");
        let service = Token::<u8>::new("Service");
        let container = Container::new();
        container
            .register(&service, {
                let missing = missing.clone();
                Provider::factory_arc(move || inject(&missing))
            })
            .unwrap();

        match container.resolve(&service) {
            Err(SanduqError::UnregisteredToken(err)) => {
                assert_eq!(err.required_by.as_ref(), Some(service.key()));
            }
            other => panic!("expected UnregisteredToken, got {other:?}"),
        }
    }

    struct Alpha {
        _beta: Arc<Beta>,
    }

    struct Beta {
        _alpha: Arc<Alpha>,
    }

    impl Injectable for Alpha {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Alpha {
                _beta: inject(&Token::class())?,
            }))
        }
    }

    impl Injectable for Beta {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Beta {
                _alpha: inject(&Token::class())?,
            }))
        }
    }

    #[test]
    fn cycle_without_placeholder_fails() {
        let container = Container::new();
        match container.resolve(&Token::<Alpha>::class()) {
            Err(SanduqError::CircularDependency(err)) => {
                assert_eq!(&err.token, Token::<Alpha>::of().key());
                assert_eq!(err.path.len(), 2);
            }
            other => panic!("expected CircularDependency, got {:?}", other.err()),
        }
        assert!(!in_injection_context());
    }

    struct Parent {
        child: OnceLock<Arc<Child>>,
    }

    struct Child {
        parent: Arc<Parent>,
    }

    impl Injectable for Parent {
        fn construct() -> Result<Arc<Self>> {
            let this = Arc::new(Parent {
                child: OnceLock::new(),
            });
            let child = inject_by(&this, &Token::<Child>::class())?;
            let _ = this.child.set(child);
            Ok(this)
        }
    }

    impl Injectable for Child {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Child {
                parent: inject(&Token::class())?,
            }))
        }
    }

    #[test]
    fn cycle_with_placeholder_resolves_to_final_instance() {
        let container = Container::new();
        let parent = container.resolve(&Token::<Parent>::class()).unwrap();
        let child = parent.child.get().unwrap();
        assert!(Arc::ptr_eq(&child.parent, &parent));
        assert!(child.parent.child.get().is_some());
    }

    struct Pool {
        disposed: Arc<AtomicU32>,
    }

    impl Disposable for Pool {
        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn dispose_runs_once_per_instance_across_aliases() {
        let disposed = counter();
        let pool = Token::<Pool>::new("Pool");
        let primary = Token::<Pool>::new("PrimaryPool");
        let replica = Token::<Pool>::new("ReplicaPool");

        let container = Container::new();
        container
            .register_with(
                &pool,
                {
                    let disposed = disposed.clone();
                    Provider::factory(move || {
                        Ok(Pool {
                            disposed: disposed.clone(),
                        })
                    })
                    .disposable()
                },
                Scope::Container,
            )
            .unwrap();
        container.register(&primary, Provider::existing(&pool)).unwrap();
        container.register(&replica, Provider::existing(&primary)).unwrap();

        let a = container.resolve(&primary).unwrap();
        let b = container.resolve(&replica).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        container.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);

        container.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_reaches_children_first_and_blocks_use() {
        let disposed = counter();
        let token = Token::<Pool>::new("Pool");
        let parent = Container::new();
        let child = parent.create_child().unwrap();
        child
            .register_with(
                &token,
                {
                    let disposed = disposed.clone();
                    Provider::factory(move || {
                        Ok(Pool {
                            disposed: disposed.clone(),
                        })
                    })
                    .disposable()
                },
                Scope::Container,
            )
            .unwrap();
        child.resolve(&token).unwrap();

        parent.dispose();
        assert!(child.is_disposed());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);

        assert!(matches!(child.resolve(&token), Err(SanduqError::DisposedContainerUse)));
        assert!(matches!(parent.is_registered(&token), Err(SanduqError::DisposedContainerUse)));
        assert!(matches!(parent.create_child(), Err(SanduqError::DisposedContainerUse)));
        assert!(matches!(
            parent.register(&token, Provider::factory_arc(|| Err(SanduqError::construction("x")))),
            Err(SanduqError::DisposedContainerUse)
        ));
    }

    #[test]
    fn disposing_child_detaches_it() {
        let parent = Container::new();
        let child = parent.create_child().unwrap();
        child.dispose();
        assert_eq!(parent.inner.children.lock().len(), 0);
        assert!(!parent.is_disposed());
        assert!(parent.create_child().is_ok());
    }

    #[test]
    fn transient_values_are_not_disposed() {
        let disposed = counter();
        let token = Token::<Pool>::new("Pool");
        let container = Container::new();
        container
            .register_with(
                &token,
                {
                    let disposed = disposed.clone();
                    Provider::factory(move || {
                        Ok(Pool {
                            disposed: disposed.clone(),
                        })
                    })
                    .disposable()
                },
                Scope::Transient,
            )
            .unwrap();
        container.resolve(&token).unwrap();
        container.dispose();
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }

    struct Wizard;

    impl Injectable for Wizard {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Wizard))
        }

        fn metadata(meta: &mut ClassMetadata<Self>) {
            meta.scope(Scope::Container);
        }
    }

    #[test]
    fn clear_cache_keeps_wizard_registered() {
        let container = Container::new();
        container.register_class::<Wizard>().unwrap();
        let wizard = Token::<Wizard>::class();

        let a = container.resolve(&wizard).unwrap();
        let b = container.resolve(&wizard).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        assert_eq!(container.clear_cache().unwrap().len(), 1);
        assert!(container.is_registered(&wizard).unwrap());
        let c = container.resolve(&wizard).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn unregistered_container_scoped_class_is_rejected() {
        let container = Container::new();
        let wizard = Token::<Wizard>::class();
        assert!(matches!(
            container.resolve(&wizard),
            Err(SanduqError::ContainerScopedClass { .. })
        ));
        assert!(container.resolve_optional(&wizard).unwrap().is_none());
    }

    struct Familiar;

    impl Injectable for Familiar {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Familiar))
        }

        fn metadata(meta: &mut ClassMetadata<Self>) {
            meta.scope(Scope::Container).auto_register(true);
        }
    }

    #[test]
    fn unregister_then_resolve_auto_registers_class() {
        let container = Container::new();
        let familiar = Token::<Familiar>::class();
        let first = container.resolve(&familiar).unwrap();
        assert!(container.is_registered(&familiar).unwrap());

        let removed = container.unregister(&familiar).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(Arc::ptr_eq(&removed[0], &first));
        assert!(!container.is_registered(&familiar).unwrap());

        let second = container.resolve(&familiar).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unregister_then_resolve_plain_token_fails() {
        let token = Token::<u32>::new("Port");
        let container = Container::new();
        container.register(&token, Provider::value(80)).unwrap();
        assert!(container.unregister(&token).unwrap().is_empty());
        assert!(matches!(
            container.resolve(&token),
            Err(SanduqError::UnregisteredToken(_))
        ));
    }

    #[test]
    fn auto_register_container_option() {
        let container = Container::with_options(ContainerOptions::default().auto_register(true));
        let wizard = Token::<Wizard>::class();
        let a = container.resolve(&wizard).unwrap();
        let b = container.resolve(&wizard).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn registration_options_override_metadata_scope() {
        let container = Container::new();
        container
            .register_with(&Token::<Wizard>::class(), Provider::class(), Scope::Transient)
            .unwrap();
        let a = container.resolve(&Token::<Wizard>::class()).unwrap();
        let b = container.resolve(&Token::<Wizard>::class()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn named_registrations() {
        let url = Token::<&'static str>::new("Url");
        let container = Container::new();
        container
            .register_with(&url, Provider::value("primary"), RegistrationOptions::new().name("primary"))
            .unwrap();
        container
            .register_with(&url, Provider::value("replica"), RegistrationOptions::new().name("replica"))
            .unwrap();

        assert_eq!(*container.resolve_named(&url, "primary").unwrap(), "primary");
        assert_eq!(*container.resolve(&url).unwrap(), "replica");
        assert!(container.is_registered_named(&url, "replica").unwrap());
        assert!(container.resolve_optional_named(&url, "backup").unwrap().is_none());

        let err = container
            .register_with(&url, Provider::value("again"), RegistrationOptions::new().name("primary"))
            .unwrap_err();
        assert!(matches!(err, SanduqError::DuplicateNamedRegistration(_)));

        container.unregister_named(&url, "replica").unwrap();
        assert_eq!(*container.resolve(&url).unwrap(), "primary");
    }

    #[test]
    fn alias_to_named_registration() {
        let url = Token::<&'static str>::new("Url");
        let active = Token::<&'static str>::new("ActiveUrl");
        let container = Container::new();
        container
            .register_with(&url, Provider::value("primary"), RegistrationOptions::new().name("primary"))
            .unwrap();
        container
            .register_with(&url, Provider::value("replica"), RegistrationOptions::new().name("replica"))
            .unwrap();
        container
            .register(&active, Provider::existing_named(&url, "primary"))
            .unwrap();
        assert_eq!(*container.resolve(&active).unwrap(), "primary");
    }

    #[test]
    fn self_alias_is_rejected() {
        let token = Token::<u8>::new("Loop");
        let container = Container::new();
        assert!(matches!(
            container.register(&token, Provider::existing(&token)),
            Err(SanduqError::SelfAlias { .. })
        ));
    }

    #[test]
    fn broken_alias_is_wrapped() {
        let target = Token::<u8>::new("Target");
        let alias = Token::<u8>::new("Alias");
        let container = Container::new();
        container.register(&alias, Provider::existing(&target)).unwrap();

        let err = container.resolve(&alias).unwrap_err();
        assert!(matches!(err, SanduqError::AliasResolutionFailure { .. }));
        assert!(matches!(err.root_cause(), SanduqError::UnregisteredToken(_)));
    }

    #[test]
    fn failure_behind_alias_keeps_cause() {
        let target = Token::<u8>::new("Target");
        let alias = Token::<u8>::new("Alias");
        let container = Container::new();
        container
            .register(&target, Provider::factory(|| Err(SanduqError::construction("no disk"))))
            .unwrap();
        container.register(&alias, Provider::existing(&target)).unwrap();

        let err = container.resolve(&alias).unwrap_err();
        match err.root_cause() {
            SanduqError::ConstructionFailed { token, .. } => {
                assert_eq!(token.as_ref(), Some(target.key()));
            }
            other => panic!("unexpected cause: {other:?}"),
        }
        assert!(format!("{err}").contains("no disk"));
        assert!(!in_injection_context());
    }

    #[test]
    fn alias_cycle_is_detected() {
        let a = Token::<u8>::new("A");
        let b = Token::<u8>::new("B");
        let container = Container::new();
        container.register(&a, Provider::existing(&b)).unwrap();
        container.register(&b, Provider::existing(&a)).unwrap();
        assert!(matches!(
            container.resolve(&a),
            Err(SanduqError::AliasCycle { .. })
        ));
    }

    trait Spell: Send + Sync {
        fn power(&self) -> u32;
    }

    struct Fireball;

    impl Spell for Fireball {
        fn power(&self) -> u32 {
            9
        }
    }

    impl Injectable for Fireball {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Fireball))
        }

        fn metadata(meta: &mut ClassMetadata<Self>) {
            meta.scope(Scope::Container)
                .alias_as(&Token::<dyn Spell>::of(), |fireball| fireball as Arc<dyn Spell>);
        }
    }

    #[test]
    fn class_metadata_aliases_share_the_instance() {
        let container = Container::new();
        container.register_class::<Fireball>().unwrap();

        let spell = container.resolve(&Token::<dyn Spell>::of()).unwrap();
        let fireball = container.resolve(&Token::<Fireball>::class()).unwrap();
        assert_eq!(spell.power(), 9);
        assert_eq!(
            Arc::as_ptr(&spell).cast::<()>(),
            Arc::as_ptr(&fireball).cast::<()>()
        );
        assert!(container.get_cached(&Token::<dyn Spell>::of()).unwrap().is_some());
    }

    static EAGER_BUILDS: AtomicU32 = AtomicU32::new(0);

    struct Warmup;

    impl Injectable for Warmup {
        fn construct() -> Result<Arc<Self>> {
            EAGER_BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Warmup))
        }

        fn metadata(meta: &mut ClassMetadata<Self>) {
            meta.scope(Scope::Container).eager();
        }
    }

    #[test]
    fn eager_class_is_built_at_registration() {
        let container = Container::new();
        container.register_class::<Warmup>().unwrap();
        assert_eq!(EAGER_BUILDS.load(Ordering::SeqCst), 1);
        assert!(container.get_cached(&Token::<Warmup>::of()).unwrap().is_some());

        container.resolve(&Token::<Warmup>::class()).unwrap();
        assert_eq!(EAGER_BUILDS.load(Ordering::SeqCst), 1);
    }

    struct Deferred {
        later: Box<dyn Fn() -> Result<Arc<u8>> + Send + Sync>,
    }

    #[test]
    fn helpers_fail_after_the_call_returns() {
        let byte = Token::<u8>::new("Byte");
        let token = Token::<Deferred>::new("Deferred");
        let container = Container::new();
        container.register(&byte, Provider::value(1)).unwrap();
        container
            .register(&token, {
                let byte = byte.clone();
                Provider::factory(move || {
                    let byte = byte.clone();
                    Ok(Deferred {
                        later: Box::new(move || inject(&byte)),
                    })
                })
            })
            .unwrap();

        let deferred = container.resolve(&token).unwrap();
        assert!(matches!(
            (deferred.later)(),
            Err(SanduqError::OutsideInjectionContext { .. })
        ));
    }

    #[test]
    fn reset_registry_returns_cached_values() {
        let token = Token::<u32>::new("Counter");
        let calls = counter();
        let container = Container::new();
        container
            .register_with(&token, counting_factory(&calls), Scope::Container)
            .unwrap();
        container.resolve(&token).unwrap();

        let values = container.reset_registry().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(*values[0].downcast::<u32>().unwrap(), 0);
        assert!(!container.is_registered(&token).unwrap());
    }

    #[test]
    fn get_all_cached_lists_cached_registrations() {
        let token = Token::<u32>::new("Counter");
        let calls = counter();
        let container = Container::new();
        container
            .register_with(&token, counting_factory(&calls), Scope::Container)
            .unwrap();
        container
            .register_with(&token, counting_factory(&calls), Scope::Transient)
            .unwrap();

        container.resolve_all(&token).unwrap();
        assert_eq!(container.get_all_cached(&token).unwrap().len(), 1);
    }

    #[test]
    fn resolve_instance_is_type_erased() {
        let token = Token::<u16>::new("Port");
        let container = Container::new();
        container.register(&token, Provider::value(443)).unwrap();

        let call = ResolveCall {
            operation: Operation::Resolve,
            token: token.key().clone(),
            name: None,
            optional: false,
        };
        match container.resolve_instance(&call).unwrap() {
            Outcome::One(Some(instance)) => assert_eq!(*instance.downcast::<u16>().unwrap(), 443),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn debug_display() {
        let container = Container::new();
        container.register(&Token::<u8>::new("A"), Provider::value(1)).unwrap();
        container.register(&Token::<u8>::new("B"), Provider::value(2)).unwrap();

        let debug = format!("{container:?}");
        assert!(debug.contains("Container"));
        assert!(debug.contains("registered: 2"));
    }

    #[test]
    fn concurrent_first_resolves_share_one_container_value() {
        let token = Token::<u32>::new("Slow");
        let calls = counter();
        let container = Container::new();
        container
            .register_with(
                &token,
                {
                    let calls = calls.clone();
                    Provider::factory(move || {
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        Ok(calls.fetch_add(1, Ordering::SeqCst))
                    })
                },
                Scope::Container,
            )
            .unwrap();

        let barrier = std::sync::Barrier::new(2);
        let (a, b) = std::thread::scope(|scope| {
            let first = scope.spawn(|| {
                barrier.wait();
                container.resolve(&token).unwrap()
            });
            let second = scope.spawn(|| {
                barrier.wait();
                container.resolve(&token).unwrap()
            });
            (first.join().unwrap(), second.join().unwrap())
        });

        assert!(Arc::ptr_eq(&a, &b));
        let cached = container.get_cached(&token).unwrap().unwrap();
        assert!(Arc::ptr_eq(&cached, &a));
    }

    struct Tower {
        _library: Arc<Library>,
    }

    struct Library {
        _shelf: Arc<Shelf>,
    }

    struct Shelf {
        _pages: Arc<u64>,
    }

    impl Injectable for Tower {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Tower {
                _library: inject(&Token::class())?,
            }))
        }
    }

    impl Injectable for Library {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Library {
                _shelf: inject(&Token::class())?,
            }))
        }
    }

    impl Injectable for Shelf {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Shelf {
                _pages: inject(&Token::<u64>::of())?,
            }))
        }
    }

    #[test]
    fn missing_dependency_reports_full_path() {
        let container = Container::new();
        let err = container.resolve(&Token::<Tower>::class()).err().unwrap();
        let SanduqError::UnregisteredToken(missing) = &err else {
            panic!("unexpected error: {err}");
        };

        let names: Vec<&str> = missing.path.iter().map(TokenKey::name).collect();
        assert_eq!(names.len(), 3);
        assert!(names[0].ends_with("Tower"));
        assert!(names[1].ends_with("Library"));
        assert!(names[2].ends_with("Shelf"));
        assert!(missing.required_by.as_ref().is_some_and(|by| by.name().ends_with("Shelf")));
        assert!(format!("{err}").contains("Resolution path: Tower → Library → Shelf → u64"));
    }

    #[test]
    fn recursive_dispose_calls_shared_value_once() {
        let disposed = counter();
        let pool = Arc::new(Pool {
            disposed: disposed.clone(),
        });
        let token = Token::<Pool>::new("Pool");

        let parent = Container::new();
        parent
            .register(&token, Provider::value_arc(pool.clone()).disposable())
            .unwrap();
        let child = parent.create_child().unwrap();
        child
            .register(&token, Provider::value_arc(pool.clone()).disposable())
            .unwrap();

        parent.dispose();
        assert!(child.is_disposed());
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn alias_to_another_name_of_same_token() {
        let url = Token::<&'static str>::new("Url");
        let container = Container::new();
        container
            .register_with(&url, Provider::value("primary"), RegistrationOptions::new().name("primary"))
            .unwrap();
        container
            .register_with(
                &url,
                Provider::existing_named(&url, "primary"),
                RegistrationOptions::new().name("replica"),
            )
            .unwrap();
        assert_eq!(*container.resolve_named(&url, "replica").unwrap(), "primary");

        assert!(matches!(
            container.register_with(
                &url,
                Provider::existing_named(&url, "mirror"),
                RegistrationOptions::new().name("mirror"),
            ),
            Err(SanduqError::SelfAlias { .. })
        ));
    }

    struct Apprentice;

    impl Injectable for Apprentice {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Apprentice))
        }

        fn metadata(meta: &mut ClassMetadata<Self>) {
            meta.scope(Scope::Transient);
        }
    }

    #[test]
    fn short_circuited_transient_class_is_unregistered() {
        let container = Container::new();
        let short_circuit = |composer: &mut crate::middleware::MiddlewareComposer<'_>| {
            composer.use_on(Operation::Resolve, |_, _| Ok(Outcome::One(None)));
        };
        crate::middleware::apply_middleware(&container, &[&short_circuit]).unwrap();

        assert!(matches!(
            container.resolve(&Token::<Apprentice>::class()),
            Err(SanduqError::UnregisteredToken(_))
        ));
        assert!(matches!(
            container.resolve(&Token::<Wizard>::class()),
            Err(SanduqError::ContainerScopedClass { .. })
        ));
    }

    struct Ledger;

    impl Injectable for Ledger {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Ledger))
        }

        fn metadata(meta: &mut ClassMetadata<Self>) {
            meta.scope(Scope::Resolution);
        }
    }

    struct Clerk {
        ledger: Arc<Ledger>,
    }

    static CLERKS: OnceLock<Token<Clerk>> = OnceLock::new();

    fn clerks() -> &'static Token<Clerk> {
        CLERKS.get_or_init(|| Token::new("Clerks"))
    }

    struct Office {
        clerks: Vec<Arc<Clerk>>,
    }

    impl Injectable for Office {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Office {
                clerks: crate::context::inject_all(clerks())?,
            }))
        }
    }

    fn clerk_provider() -> Provider<Clerk> {
        Provider::factory(|| {
            Ok(Clerk {
                ledger: inject(&Token::class())?,
            })
        })
    }

    #[test]
    fn resolve_all_shares_resolution_values_only_inside_a_call() {
        let container = Container::new();
        container.register(clerks(), clerk_provider()).unwrap();
        container.register(clerks(), clerk_provider()).unwrap();

        let top_level = container.resolve_all(clerks()).unwrap();
        assert_eq!(top_level.len(), 2);
        assert!(!Arc::ptr_eq(&top_level[0].ledger, &top_level[1].ledger));

        let office = container.resolve(&Token::<Office>::class()).unwrap();
        assert_eq!(office.clerks.len(), 2);
        assert!(Arc::ptr_eq(&office.clerks[0].ledger, &office.clerks[1].ledger));
    }
}
