//! Follows alias providers down to the provider that produces the value.

use std::sync::Arc;

use tracing::trace;

use crate::error::{Result, SanduqError, UnregisteredTokenError};
use crate::instance::Instance;
use crate::provider::{BuildFn, ProviderKind};
use crate::registry::Registration;

/// Where the value of a chain comes from.
pub(crate) enum Source {
    Value(Instance),
    Build(BuildFn),
}

/// A registration followed through its aliases.
pub(crate) struct Chain {
    /// Alias registrations traversed, starting with the requested one.
    pub links: Vec<Arc<Registration>>,
    /// The registration whose provider produces the value.
    pub concrete: Arc<Registration>,
    pub source: Source,
}

impl Chain {
    /// Follows `start` until a class, factory or value provider is reached.
    ///
    /// `lookup` finds the registration an alias points to, or `None`.
    pub fn follow(
        start: Arc<Registration>,
        lookup: impl Fn(&Registration) -> Result<Option<Arc<Registration>>>,
    ) -> Result<Chain> {
        let mut links: Vec<Arc<Registration>> = Vec::new();
        let mut current = start;

        loop {
            let (target, name) = match &current.provider.kind {
                ProviderKind::Class { build, .. } | ProviderKind::Factory { build } => {
                    let source = Source::Build(build.clone());
                    return Ok(Chain {
                        links,
                        concrete: current,
                        source,
                    });
                }
                ProviderKind::Value { instance } => {
                    let source = Source::Value(instance.clone());
                    return Ok(Chain {
                        links,
                        concrete: current,
                        source,
                    });
                }
                ProviderKind::Existing { target, name } => (target.clone(), *name),
            };

            trace!(alias = %current.token, target = %target, "Following alias");
            let next = match lookup(&current) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    let requested = links.first().unwrap_or(&current).token.clone();
                    return Err(SanduqError::AliasResolutionFailure {
                        token: requested,
                        target: target.clone(),
                        source: Box::new(SanduqError::UnregisteredToken(UnregisteredTokenError {
                            requested: target,
                            name,
                            required_by: Some(current.token.clone()),
                            path: Vec::new(),
                            suggestions: Vec::new(),
                        })),
                    });
                }
                Err(err) => {
                    let requested = links.first().unwrap_or(&current).token.clone();
                    return Err(SanduqError::AliasResolutionFailure {
                        token: requested,
                        target,
                        source: Box::new(err),
                    });
                }
            };
            links.push(current);
            if links.iter().any(|link| Arc::ptr_eq(link, &next)) {
                let mut chain: Vec<_> = links.iter().map(|link| link.token.clone()).collect();
                chain.push(next.token.clone());
                return Err(SanduqError::AliasCycle { chain });
            }
            current = next;
        }
    }

    pub fn is_alias(&self) -> bool {
        !self.links.is_empty()
    }

    /// Wraps a failure of the concrete provider when it was reached through an alias.
    pub fn wrap(&self, err: SanduqError) -> SanduqError {
        match self.links.first() {
            Some(first) => SanduqError::AliasResolutionFailure {
                token: first.token.clone(),
                target: self.concrete.token.clone(),
                source: Box::new(err),
            },
            None => err,
        }
    }

    /// Presents the concrete value as the type of the requested token.
    pub fn present(&self, raw: &Instance) -> Result<Instance> {
        let mut value = self.view(&self.concrete, raw)?;
        for link in self.links.iter().rev() {
            value = self.view(link, &value)?;
        }
        Ok(value)
    }

    fn view(&self, registration: &Registration, value: &Instance) -> Result<Instance> {
        registration
            .view(value)
            .ok_or_else(|| SanduqError::TypeMismatch {
                token: registration.token.clone(),
                expected: registration.token.name(),
                found: value.type_name(),
            })
    }
}
