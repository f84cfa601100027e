//! Injectable classes and their registration metadata.
//!
//! A class is any type implementing [`Injectable`]. Instead of scanning
//! annotations, the class fills in a [`ClassMetadata`] builder describing
//! its scope, extra tokens it answers to, whether it may be
//! auto-registered, and whether it takes part in disposal.
//!
//! # Examples
//! ```
//! use sanduq_container::prelude::*;
//! use std::sync::Arc;
//!
//! struct Wand;
//!
//! impl Injectable for Wand {
//!     fn construct() -> Result<Arc<Self>> {
//!         Ok(Arc::new(Wand))
//!     }
//! }
//!
//! struct Wizard {
//!     wand: Arc<Wand>,
//! }
//!
//! impl Injectable for Wizard {
//!     fn construct() -> Result<Arc<Self>> {
//!         Ok(Arc::new(Wizard { wand: inject(&Token::class())? }))
//!     }
//!
//!     fn metadata(meta: &mut ClassMetadata<Self>) {
//!         meta.scope(Scope::Container);
//!     }
//! }
//!
//! let container = Container::new();
//! container.register_class::<Wizard>().unwrap();
//!
//! let a = container.resolve(&Token::<Wizard>::class()).unwrap();
//! let b = container.resolve(&Token::<Wizard>::class()).unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! ```

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::instance::{Disposable, Disposer, Instance};
use crate::provider::{BuildFn, ErasedProvider, Provider, converter};
use crate::scope::Scope;
use crate::token::{Token, TokenKey};

/// A type the container knows how to construct.
///
/// `construct` runs inside an injection context, so it may call
/// [`inject`](crate::context::inject) and the other helpers to obtain
/// its dependencies.
///
/// Instances are always shared, which is why `construct` returns an
/// `Arc<Self>`. A class that must hand itself to a collaborator during
/// its own construction allocates the `Arc` first, with the fields that
/// depend on the collaborator left unset (e.g. a `OnceLock`), and
/// passes it to [`inject_by`](crate::context::inject_by). The
/// collaborator then sees whatever was assigned so far; reading an unset
/// field before construction finishes is the caller's responsibility.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Builds the instance, resolving dependencies from the active context.
    fn construct() -> Result<Arc<Self>>;

    /// Describes how the class is registered. Defaults to nothing.
    fn metadata(meta: &mut ClassMetadata<Self>) {
        let _ = meta;
    }
}

type DisposeHook<C> = Arc<dyn Fn(&C) + Send + Sync>;

/// Registration metadata of a class, filled in by [`Injectable::metadata`].
pub struct ClassMetadata<C> {
    pub(crate) scope: Option<Scope>,
    pub(crate) auto_register: Option<bool>,
    pub(crate) eager: bool,
    pub(crate) aliases: Vec<(TokenKey, ErasedProvider)>,
    pub(crate) dispose: Option<DisposeHook<C>>,
}

impl<C: Injectable> ClassMetadata<C> {
    fn new() -> Self {
        Self {
            scope: None,
            auto_register: None,
            eager: false,
            aliases: Vec::new(),
            dispose: None,
        }
    }

    /// Sets the scope the class is registered with by default.
    pub fn scope(&mut self, scope: Scope) -> &mut Self {
        self.scope = Some(scope);
        self
    }

    /// Allows (or forbids) implicit registration on first resolve.
    ///
    /// Unset means "follow the container's `auto_register` option".
    pub fn auto_register(&mut self, enabled: bool) -> &mut Self {
        self.auto_register = Some(enabled);
        self
    }

    /// Builds the instance at registration time when its scope is `Container`.
    pub fn eager(&mut self) -> &mut Self {
        self.eager = true;
        self
    }

    /// Also registers the class under `token`, as an alias of the class token.
    pub fn alias(&mut self, token: &Token<C>) -> &mut Self {
        let provider = Provider::existing(&Token::<C>::class()).into_erased();
        self.aliases.push((token.key().clone(), provider));
        self
    }

    /// Also registers the class under a token of another type.
    ///
    /// `convert` is usually an unsizing cast: `|c| c as Arc<dyn Trait>`.
    pub fn alias_as<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        token: &Token<T>,
        convert: impl Fn(Arc<C>) -> Arc<T> + Send + Sync + 'static,
    ) -> &mut Self {
        let mut provider = ErasedProvider::existing(Token::<C>::class().key().clone(), None);
        provider.convert = Some(converter(convert));
        self.aliases.push((token.key().clone(), provider));
        self
    }

    /// Calls [`Disposable::dispose`] when the owning container is disposed.
    pub fn disposable(&mut self) -> &mut Self
    where
        C: Disposable,
    {
        self.dispose = Some(Arc::new(|instance: &C| instance.dispose()));
        self
    }
}

impl<C> fmt::Debug for ClassMetadata<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMetadata")
            .field("class", &type_name::<C>())
            .field("scope", &self.scope)
            .field("auto_register", &self.auto_register)
            .field("eager", &self.eager)
            .field("aliases", &self.aliases.len())
            .field("disposable", &self.dispose.is_some())
            .finish()
    }
}

/// Collects the metadata of `C`.
pub(crate) fn class_metadata<C: Injectable>() -> ClassMetadata<C> {
    let mut meta = ClassMetadata::new();
    C::metadata(&mut meta);
    meta
}

/// Builds instances of `C`, attaching the disposal hook when present.
pub(crate) fn class_build<C: Injectable>(dispose: Option<DisposeHook<C>>) -> BuildFn {
    Arc::new(move || {
        let instance = C::construct()?;
        let disposer = dispose.clone().map(|hook| {
            let instance = instance.clone();
            Arc::new(move || hook(instance.as_ref())) as Disposer
        });
        Ok(Instance::new(instance).with_disposer(disposer))
    })
}

/// Everything needed to register a class from its metadata, type-erased.
pub(crate) struct ClassDescriptor {
    pub token: TokenKey,
    pub provider: ErasedProvider,
    pub scope: Option<Scope>,
    pub auto_register: Option<bool>,
    pub eager: bool,
    pub aliases: Vec<(TokenKey, ErasedProvider)>,
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("token", &self.token)
            .field("scope", &self.scope)
            .field("auto_register", &self.auto_register)
            .field("eager", &self.eager)
            .field("aliases", &self.aliases.len())
            .finish()
    }
}

pub(crate) fn class_descriptor<C: Injectable>() -> ClassDescriptor {
    let meta = class_metadata::<C>();
    ClassDescriptor {
        token: Token::<C>::class().key().clone(),
        provider: Provider::<C>::class().into_erased(),
        scope: meta.scope,
        auto_register: meta.auto_register,
        eager: meta.eager,
        aliases: meta.aliases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;

    trait Spell: Send + Sync {}

    struct Fireball;

    impl Spell for Fireball {}

    impl Injectable for Fireball {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Fireball))
        }

        fn metadata(meta: &mut ClassMetadata<Self>) {
            meta.scope(Scope::Resolution)
                .auto_register(true)
                .alias_as(&Token::<dyn Spell>::of(), |f| f as Arc<dyn Spell>);
        }
    }

    impl Disposable for Fireball {
        fn dispose(&self) {}
    }

    struct Plain;

    impl Injectable for Plain {
        fn construct() -> Result<Arc<Self>> {
            Ok(Arc::new(Plain))
        }
    }

    #[test]
    fn metadata_defaults_are_empty() {
        let meta = class_metadata::<Plain>();
        assert_eq!(meta.scope, None);
        assert_eq!(meta.auto_register, None);
        assert!(!meta.eager);
        assert!(meta.aliases.is_empty());
        assert!(meta.dispose.is_none());
    }

    #[test]
    fn descriptor_carries_metadata() {
        let descriptor = class_descriptor::<Fireball>();
        assert_eq!(descriptor.scope, Some(Scope::Resolution));
        assert_eq!(descriptor.auto_register, Some(true));
        assert_eq!(descriptor.aliases.len(), 1);
        assert_eq!(&descriptor.token, Token::<Fireball>::of().key());

        let (alias, provider) = &descriptor.aliases[0];
        assert_eq!(alias, Token::<dyn Spell>::of().key());
        let (target, name) = provider.alias_target().unwrap();
        assert_eq!(target, &descriptor.token);
        assert_eq!(name, None);
    }

    #[test]
    fn class_build_attaches_disposer() {
        let mut meta = class_metadata::<Fireball>();
        meta.disposable();
        let build = class_build::<Fireball>(meta.dispose.clone());
        let instance = build().unwrap();
        assert!(instance.is_disposable());
        assert!(instance.downcast::<Fireball>().is_some());
    }

    #[test]
    fn class_providers_share_identity() {
        let a = Provider::<Plain>::class().into_erased();
        let b = Provider::<Plain>::class().into_erased();
        assert_eq!(a.id, b.id);
        assert!(matches!(a.kind, ProviderKind::Class { .. }));
    }
}
