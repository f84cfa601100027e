//! Dependency lifecycle scopes.
//!
//! Scopes determine how long a resolved value lives:
//! - [`Scope::Transient`]: new instance every time
//! - [`Scope::Resolution`]: one instance per outer `resolve()` call
//! - [`Scope::Container`]: one instance cached on the owning container
//! - [`Scope::Inherited`]: whatever scope the dependent is being built in
//!
//! `Inherited` is never an *effective* scope: it is turned into one of the
//! other three at the moment a provider is about to run.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Defines the lifetime of a value produced by a provider.
///
/// # Examples
/// ```
/// use sanduq_container::scope::Scope;
///
/// assert!(Scope::Container.is_cached());
/// assert!(!Scope::Transient.is_cached());
/// assert_eq!(Scope::default(), Scope::Inherited);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scope {
    /// Defers to the scope of the dependent currently under construction.
    ///
    /// When resolved at the top of a call chain (no dependent), behaves
    /// like [`Scope::Transient`].
    #[default]
    Inherited,

    /// New instance created on every resolve call.
    ///
    /// Never cached.
    Transient,

    /// One instance per outermost `resolve()` call.
    ///
    /// Every dependent built during the same call observes the same
    /// instance; the next outer call gets a fresh one.
    Resolution,

    /// One instance cached on the container owning the registration.
    ///
    /// Child containers without an override read the parent's instance.
    /// Equivalent to a singleton in most other containers.
    Container,
}

impl Scope {
    /// Returns `true` if this scope caches instances.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Scope::Resolution | Scope::Container)
    }

    /// Resolves `Inherited` against the scope of the dependent frame, if any.
    ///
    /// ```
    /// use sanduq_container::scope::Scope;
    ///
    /// assert_eq!(Scope::Inherited.effective(None), Scope::Transient);
    /// assert_eq!(Scope::Inherited.effective(Some(Scope::Container)), Scope::Container);
    /// assert_eq!(Scope::Resolution.effective(Some(Scope::Container)), Scope::Resolution);
    /// ```
    #[inline]
    pub fn effective(self, dependent: Option<Scope>) -> Scope {
        match self {
            Scope::Inherited => dependent.unwrap_or(Scope::Transient),
            explicit => explicit,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Inherited => write!(f, "Inherited"),
            Scope::Transient => write!(f, "Transient"),
            Scope::Resolution => write!(f, "Resolution"),
            Scope::Container => write!(f, "Container"),
        }
    }
}
