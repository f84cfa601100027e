//! Token registry: stores the registrations of one container.
//!
//! The registry maps a [`TokenKey`] to an ordered list of
//! [`Registration`]s. Lookups that miss locally are delegated to the
//! parent registry; a token with any local registration shadows the
//! parent's registrations for that token entirely.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{DuplicateNamedRegistrationError, Result, SanduqError};
use crate::injector;
use crate::instance::Instance;
use crate::provider::ErasedProvider;
use crate::scope::Scope;
use crate::token::TokenKey;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Registry id of registrations that do not live in any registry.
const DETACHED: u64 = 0;

/// Binding of a token to a provider.
///
/// The `Container`-scope cache lives here, so every container reaching
/// this registration through delegation observes the same instance.
pub(crate) struct Registration {
    pub token: TokenKey,
    pub provider: ErasedProvider,
    pub scope: Scope,
    pub name: Option<&'static str>,
    registry_id: u64,
    value: Mutex<Option<Instance>>,
}

impl Registration {
    pub(crate) fn new(
        token: TokenKey,
        provider: ErasedProvider,
        scope: Scope,
        name: Option<&'static str>,
    ) -> Self {
        Self {
            token,
            provider,
            scope,
            name,
            registry_id: DETACHED,
            value: Mutex::new(None),
        }
    }

    /// Id of the registry holding this registration, `0` when detached.
    #[inline]
    pub(crate) fn registry_id(&self) -> u64 {
        self.registry_id
    }

    /// The cached `Container`-scope value, as built by the provider.
    pub(crate) fn cached(&self) -> Option<Instance> {
        self.value.lock().clone()
    }

    /// Caches `instance` unless a value is already cached.
    ///
    /// Returns whichever value the cache holds afterwards, so concurrent
    /// builders all hand out the first one stored.
    pub(crate) fn store(&self, instance: Instance) -> Instance {
        self.value.lock().get_or_insert(instance).clone()
    }

    pub(crate) fn take_cached(&self) -> Option<Instance> {
        self.value.lock().take()
    }

    /// Presents a value built by this registration's provider as the token's type.
    pub(crate) fn view(&self, instance: &Instance) -> Option<Instance> {
        match &self.provider.convert {
            Some(convert) => convert(instance),
            None => Some(instance.clone()),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("token", &self.token)
            .field("provider", &self.provider)
            .field("scope", &self.scope)
            .field("name", &self.name)
            .field("cached", &self.value.lock().is_some())
            .finish()
    }
}

/// Stores the registrations of one container, chained to its parent's.
pub(crate) struct TokenRegistry {
    id: u64,
    parent: Option<Arc<TokenRegistry>>,
    entries: DashMap<TokenKey, Vec<Arc<Registration>>>,
}

impl TokenRegistry {
    /// Creates an empty root registry.
    pub fn new() -> Self {
        Self::with_parent(None)
    }

    /// Creates an empty registry delegating misses to `parent`.
    pub fn with_parent(parent: Option<Arc<TokenRegistry>>) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            parent,
            entries: DashMap::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Most recent registration matching `token` (and `name`, if given).
    pub fn get(&self, token: &TokenKey, name: Option<&'static str>) -> Option<Arc<Registration>> {
        self.get_all(token, name).and_then(|mut all| all.pop())
    }

    /// All registrations matching `token`, oldest first.
    ///
    /// Without a name every registration of the token matches; with a
    /// name only the ones carrying it do.
    pub fn get_all(
        &self,
        token: &TokenKey,
        name: Option<&'static str>,
    ) -> Option<Vec<Arc<Registration>>> {
        if name.is_none() {
            if let Some(internal) = injector::internal_registration(token) {
                return Some(vec![internal]);
            }
        }
        self.lookup(token, name)
    }

    fn lookup(&self, token: &TokenKey, name: Option<&'static str>) -> Option<Vec<Arc<Registration>>> {
        let local = self.entries.get(token).map(|entry| entry.value().clone());
        let registrations = match local {
            Some(registrations) => registrations,
            None => {
                let parent = self.parent.as_ref()?;
                trace!(token = %token, "Delegating lookup to parent registry");
                parent.lookup(token, name)?
            }
        };

        match name {
            None => Some(registrations),
            Some(name) => {
                let named: Vec<_> = registrations
                    .into_iter()
                    .filter(|registration| registration.name == Some(name))
                    .collect();
                (!named.is_empty()).then_some(named)
            }
        }
    }

    /// Appends a registration and returns the stored handle.
    ///
    /// # Errors
    /// - [`SanduqError::ReservedTokenViolation`] for built-in tokens
    /// - [`SanduqError::DuplicateNamedRegistration`] when the (token, name)
    ///   pair is already taken in this registry
    pub fn set(&self, mut registration: Registration) -> Result<Arc<Registration>> {
        if injector::is_reserved(&registration.token) {
            return Err(SanduqError::ReservedTokenViolation {
                token: registration.token,
            });
        }

        registration.registry_id = self.id;
        let registration = Arc::new(registration);

        let mut entry = self.entries.entry(registration.token.clone()).or_default();
        if let Some(name) = registration.name {
            if entry.iter().any(|existing| existing.name == Some(name)) {
                return Err(SanduqError::DuplicateNamedRegistration(
                    DuplicateNamedRegistrationError {
                        token: registration.token.clone(),
                        name,
                    },
                ));
            }
        }
        entry.push(registration.clone());
        drop(entry);

        debug!(
            token = %registration.token,
            name = ?registration.name,
            scope = %registration.scope,
            provider = registration.provider.kind_name(),
            "Registered token"
        );
        Ok(registration)
    }

    /// Removes the local registrations of `token` (only the named one, if given).
    pub fn delete(&self, token: &TokenKey, name: Option<&'static str>) -> Vec<Arc<Registration>> {
        let removed = match name {
            None => self
                .entries
                .remove(token)
                .map(|(_, registrations)| registrations)
                .unwrap_or_default(),
            Some(name) => {
                let mut removed = Vec::new();
                if let Some(mut entry) = self.entries.get_mut(token) {
                    let (matching, kept): (Vec<_>, Vec<_>) = entry
                        .drain(..)
                        .partition(|registration| registration.name == Some(name));
                    *entry = kept;
                    removed = matching;
                }
                self.entries.remove_if(token, |_, registrations| registrations.is_empty());
                removed
            }
        };

        if !removed.is_empty() {
            debug!(token = %token, name = ?name, count = removed.len(), "Removed registrations");
        }
        removed
    }

    /// Removes every local registration.
    pub fn delete_all(&self) -> Vec<Arc<Registration>> {
        let tokens: Vec<TokenKey> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        tokens
            .iter()
            .filter_map(|token| self.entries.remove(token))
            .flat_map(|(_, registrations)| registrations)
            .collect()
    }

    /// Drops every locally cached value, keeping the bindings.
    ///
    /// Returns the dropped values, each distinct object once.
    pub fn clear_cache(&self) -> Vec<Instance> {
        let mut seen = HashSet::new();
        let mut cleared = Vec::new();
        for entry in self.entries.iter() {
            for registration in entry.value() {
                if let Some(instance) = registration.take_cached() {
                    if seen.insert(instance.identity()) {
                        cleared.push(instance);
                    }
                }
            }
        }
        cleared
    }

    /// Display names of every token visible from here, for suggestions.
    pub fn token_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.entries.iter().map(|entry| entry.key().name()).collect();
        if let Some(parent) = &self.parent {
            names.extend(parent.token_names());
        }
        names.sort_unstable();
        names.dedup();
        names
    }

    /// Number of locally registered tokens.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered locally.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for TokenRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRegistry")
            .field("id", &self.id)
            .field("tokens", &self.entries.len())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
