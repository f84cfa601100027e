//! Providers: recipes that produce values for tokens.
//!
//! A [`Provider<T>`] is one of four kinds:
//!
//! | kind        | produces                                         |
//! |-------------|--------------------------------------------------|
//! | class       | `C::construct()` of an [`Injectable`] class       |
//! | factory     | the result of a zero-argument closure             |
//! | value       | a pre-built value, never scoped or cached         |
//! | existing    | whatever another token resolves to (an alias)     |
//!
//! Providers are type-erased into [`ErasedProvider`] when registered, and
//! every dispatch site matches on [`ProviderKind`] exhaustively.
//!
//! # Examples
//! ```
//! use sanduq_container::prelude::*;
//! use std::sync::Arc;
//!
//! let url = Token::<String>::new("DatabaseUrl");
//! let primary = Token::<String>::new("PrimaryUrl");
//!
//! let container = Container::new();
//! container.register(&url, Provider::value("postgres://localhost".to_string())).unwrap();
//! container.register(&primary, Provider::existing(&url)).unwrap();
//!
//! assert_eq!(*container.resolve(&primary).unwrap(), "postgres://localhost");
//! ```

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::class::{Injectable, class_build, class_metadata};
use crate::error::Result;
use crate::instance::{Disposable, Instance};
use crate::scope::Scope;
use crate::token::{Token, TokenKey};

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a provider, used by the cycle stack and resolution cache.
///
/// All class providers of one class share an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ProviderId {
    Class(TypeId),
    Unique(u64),
}

impl ProviderId {
    fn unique() -> Self {
        ProviderId::Unique(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Produces a fresh value.
pub(crate) type BuildFn = Arc<dyn Fn() -> Result<Instance> + Send + Sync>;

/// Turns a value into another view of the same object, `None` on type mismatch.
pub(crate) type ConvertFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum ProviderKind {
    Class { build: BuildFn, class: &'static str },
    Factory { build: BuildFn },
    Value { instance: Instance },
    Existing { target: TokenKey, name: Option<&'static str> },
}

/// A provider with its value type erased.
#[derive(Clone)]
pub(crate) struct ErasedProvider {
    pub id: ProviderId,
    pub kind: ProviderKind,
    /// Applied to the produced value before handing it out.
    pub convert: Option<ConvertFn>,
    /// Scope declared by the class metadata, if any.
    pub default_scope: Option<Scope>,
    /// Built-in providers are never pushed on the cycle stack.
    pub internal: bool,
}

impl ErasedProvider {
    pub(crate) fn internal_factory(build: BuildFn) -> Self {
        Self {
            id: ProviderId::unique(),
            kind: ProviderKind::Factory { build },
            convert: None,
            default_scope: Some(Scope::Transient),
            internal: true,
        }
    }

    pub(crate) fn existing(target: TokenKey, name: Option<&'static str>) -> Self {
        Self {
            id: ProviderId::unique(),
            kind: ProviderKind::Existing { target, name },
            convert: None,
            default_scope: None,
            internal: false,
        }
    }

    pub(crate) fn alias_target(&self) -> Option<(&TokenKey, Option<&'static str>)> {
        match &self.kind {
            ProviderKind::Existing { target, name } => Some((target, *name)),
            _ => None,
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match &self.kind {
            ProviderKind::Class { .. } => "class",
            ProviderKind::Factory { .. } => "factory",
            ProviderKind::Value { .. } => "value",
            ProviderKind::Existing { .. } => "existing",
        }
    }
}

impl fmt::Debug for ErasedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Provider");
        s.field("id", &self.id).field("kind", &self.kind_name());
        match &self.kind {
            ProviderKind::Class { class, .. } => s.field("class", class),
            ProviderKind::Existing { target, name } => s.field("target", target).field("name", name),
            ProviderKind::Value { instance } => s.field("value", instance),
            ProviderKind::Factory { .. } => &mut s,
        };
        s.finish()
    }
}

/// A typed recipe for values of `T`.
pub struct Provider<T: ?Sized> {
    inner: ErasedProvider,
    _marker: PhantomData<fn() -> *const T>,
}

impl<T: ?Sized + Send + Sync + 'static> Provider<T> {
    fn from_kind(id: ProviderId, kind: ProviderKind) -> Self {
        Self {
            inner: ErasedProvider {
                id,
                kind,
                convert: None,
                default_scope: None,
                internal: false,
            },
            _marker: PhantomData,
        }
    }

    /// Builds `T` from a closure returning an already shared value.
    ///
    /// Use this for trait objects: `Provider::<dyn Logger>::factory_arc(..)`.
    pub fn factory_arc(factory: impl Fn() -> Result<Arc<T>> + Send + Sync + 'static) -> Self {
        let build: BuildFn = Arc::new(move || factory().map(Instance::new));
        Self::from_kind(ProviderId::unique(), ProviderKind::Factory { build })
    }

    /// Hands out a pre-built shared value.
    pub fn value_arc(value: Arc<T>) -> Self {
        Self::from_kind(
            ProviderId::unique(),
            ProviderKind::Value {
                instance: Instance::new(value),
            },
        )
    }

    /// Redirects to whatever `target` resolves to.
    pub fn existing(target: &Token<T>) -> Self {
        Self::existing_link(target.key().clone(), None)
    }

    /// Redirects to the registration of `target` carrying `name`.
    pub fn existing_named(target: &Token<T>, name: &'static str) -> Self {
        Self::existing_link(target.key().clone(), Some(name))
    }

    /// Redirects to `target` of another type, converting its value.
    ///
    /// ```
    /// use sanduq_container::prelude::*;
    /// use std::sync::Arc;
    ///
    /// trait Named: Send + Sync { fn name(&self) -> &str; }
    /// struct Wizard;
    /// impl Named for Wizard { fn name(&self) -> &str { "wizard" } }
    ///
    /// let wizard = Token::<Wizard>::new("Wizard");
    /// let named = Token::<dyn Named>::new("Named");
    ///
    /// let container = Container::new();
    /// container.register(&wizard, Provider::value(Wizard)).unwrap();
    /// container
    ///     .register(&named, Provider::existing_as(&wizard, |w: Arc<Wizard>| w as Arc<dyn Named>))
    ///     .unwrap();
    /// assert_eq!(container.resolve(&named).unwrap().name(), "wizard");
    /// ```
    pub fn existing_as<U: ?Sized + Send + Sync + 'static>(
        target: &Token<U>,
        convert: impl Fn(Arc<U>) -> Arc<T> + Send + Sync + 'static,
    ) -> Self {
        let mut provider = Self::existing_link(target.key().clone(), None);
        provider.inner.convert = Some(converter(convert));
        provider
    }

    fn existing_link(target: TokenKey, name: Option<&'static str>) -> Self {
        Self {
            inner: ErasedProvider::existing(target, name),
            _marker: PhantomData,
        }
    }

    /// Constructs the class `C` and hands it out as `T`.
    pub fn class_as<C: Injectable>(
        convert: impl Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    ) -> Self {
        let metadata = class_metadata::<C>();
        let mut provider = Self::from_kind(
            ProviderId::Class(TypeId::of::<C>()),
            ProviderKind::Class {
                build: class_build::<C>(metadata.dispose.clone()),
                class: std::any::type_name::<C>(),
            },
        );
        provider.inner.convert = Some(converter(convert));
        provider.inner.default_scope = metadata.scope;
        provider
    }

    /// Attaches a disposal hook to the values this provider builds.
    ///
    /// The hook runs once when the owning container is disposed and the
    /// value is cached there. Alias providers ignore it: disposal belongs
    /// to the provider that actually builds the value.
    pub fn on_dispose(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        let hook: Arc<dyn Fn(&T) + Send + Sync> = Arc::new(hook);
        let convert = self.inner.convert.clone();
        let attach = move |instance: Instance| -> Instance {
            let view = match &convert {
                Some(convert) => convert(&instance),
                None => Some(instance.clone()),
            };
            match view.and_then(|view| view.downcast::<T>()) {
                Some(value) => {
                    let hook = hook.clone();
                    instance.with_disposer(Some(Arc::new(move || hook(value.as_ref()))))
                }
                None => instance,
            }
        };

        match &mut self.inner.kind {
            ProviderKind::Class { build, .. } | ProviderKind::Factory { build } => {
                let inner = build.clone();
                *build = Arc::new(move || inner().map(&attach));
            }
            ProviderKind::Value { instance } => {
                *instance = attach(instance.clone());
            }
            ProviderKind::Existing { .. } => {}
        }
        self
    }

    /// Opts the built values into the [`Disposable`] contract.
    pub fn disposable(self) -> Self
    where
        T: Disposable,
    {
        self.on_dispose(|value: &T| value.dispose())
    }

    pub(crate) fn into_erased(self) -> ErasedProvider {
        self.inner
    }
}

impl<T: Send + Sync + 'static> Provider<T> {
    /// Builds `T` from a zero-argument closure.
    ///
    /// The closure may call [`inject`](crate::context::inject) and friends
    /// to obtain its own dependencies.
    pub fn factory(factory: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self::factory_arc(move || factory().map(Arc::new))
    }

    /// Hands out a pre-built value.
    pub fn value(value: T) -> Self {
        Self::value_arc(Arc::new(value))
    }
}

impl<C: Injectable> Provider<C> {
    /// Constructs the class through [`Injectable::construct`].
    ///
    /// Picks up the scope declared in the class metadata unless the
    /// registration options override it.
    pub fn class() -> Self {
        let metadata = class_metadata::<C>();
        let mut provider = Self::from_kind(
            ProviderId::Class(TypeId::of::<C>()),
            ProviderKind::Class {
                build: class_build::<C>(metadata.dispose.clone()),
                class: std::any::type_name::<C>(),
            },
        );
        provider.inner.default_scope = metadata.scope;
        provider
    }
}

impl<T: ?Sized> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

pub(crate) fn converter<U, T>(convert: impl Fn(Arc<U>) -> Arc<T> + Send + Sync + 'static) -> ConvertFn
where
    U: ?Sized + Send + Sync + 'static,
    T: ?Sized + Send + Sync + 'static,
{
    Arc::new(move |instance: &Instance| {
        instance
            .downcast::<U>()
            .map(|value| instance.rebind(convert(value)))
    })
}
