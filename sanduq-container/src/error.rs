//! Error types for Sanduq container operations.
//!
//! Errors carry enough context to read the failing path: which token was
//! asked for, which alias link broke, which providers formed a cycle.

use std::fmt;

use sanduq_support::rendering::{ChainEntry, render_chain, render_chain_vertical};

use crate::scope::Scope;
use crate::token::TokenKey;

/// Main error type for all Sanduq operations.
#[derive(Debug, thiserror::Error)]
pub enum SanduqError {
    /// Nothing is registered under the token and the call was not optional.
    #[error("{}", .0)]
    UnregisteredToken(UnregisteredTokenError),

    /// A provider was requested while already under construction and no
    /// dependent placeholder was offered for it.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A token registered as an alias could not be resolved through its target.
    #[error("Failed to resolve {token} through alias {target}\n  Caused by: {source}")]
    AliasResolutionFailure {
        token: TokenKey,
        target: TokenKey,
        #[source]
        source: Box<SanduqError>,
    },

    /// Alias providers point at each other.
    #[error("Alias cycle detected: {}", render_alias_chain(.chain))]
    AliasCycle { chain: Vec<TokenKey> },

    /// An injection helper was called with no active injection context.
    #[error(
        "{operation}() can only be called while a container is resolving\n  Hint: use an Injector for deferred injection"
    )]
    OutsideInjectionContext { operation: &'static str },

    /// The container was disposed and cannot be used anymore.
    #[error("Container is disposed")]
    DisposedContainerUse,

    /// A second registration under the same token and name.
    #[error("{}", .0)]
    DuplicateNamedRegistration(DuplicateNamedRegistrationError),

    /// Registration over a token the container answers itself.
    #[error("Cannot register reserved token {token}")]
    ReservedTokenViolation { token: TokenKey },

    /// An alias provider pointing at its own token.
    #[error("Alias provider for {token} must not reference itself")]
    SelfAlias { token: TokenKey },

    /// An unregistered class whose scope is `Container` cannot be resolved
    /// without a registration to hold the instance.
    #[error(
        "Unregistered class {token} cannot be resolved in Container scope\n  Hint: register it, or opt into auto-registration"
    )]
    ContainerScopedClass { token: TokenKey },

    /// The registered value does not have the type the token promised.
    #[error("Type mismatch for {token}: expected {expected}, found {found}")]
    TypeMismatch {
        token: TokenKey,
        expected: &'static str,
        found: &'static str,
    },

    /// A factory or class constructor failed with its own error.
    #[error("Failed to construct {}: {source}", display_token(.token))]
    ConstructionFailed {
        token: Option<TokenKey>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl SanduqError {
    /// Wraps an arbitrary error raised inside a factory or constructor.
    ///
    /// The container fills in the token being constructed.
    pub fn construction(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        SanduqError::ConstructionFailed {
            token: None,
            source: source.into(),
        }
    }

    /// Returns the innermost error of a wrapped chain.
    pub fn root_cause(&self) -> &SanduqError {
        match self {
            SanduqError::AliasResolutionFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub(crate) fn attach_token(self, key: &TokenKey) -> Self {
        match self {
            SanduqError::ConstructionFailed {
                token: None,
                source,
            } => SanduqError::ConstructionFailed {
                token: Some(key.clone()),
                source,
            },
            other => other,
        }
    }
}

fn render_alias_chain(chain: &[TokenKey]) -> String {
    let names: Vec<String> = chain.iter().map(ToString::to_string).collect();
    render_chain(&names)
}

fn display_token(token: &Option<TokenKey>) -> String {
    match token {
        Some(token) => token.to_string(),
        None => "value".to_string(),
    }
}

/// Error when a token has no registration.
///
/// Includes helpful hints about what went wrong.
#[derive(Debug)]
pub struct UnregisteredTokenError {
    /// The token that was requested
    pub requested: TokenKey,
    /// The name qualifier of the request, if any
    pub name: Option<&'static str>,
    /// The token whose provider asked for it (if known)
    pub required_by: Option<TokenKey>,
    /// The providers under construction when the lookup failed, outermost first
    pub path: Vec<TokenKey>,
    /// Similar tokens that ARE registered
    pub suggestions: Vec<String>,
}

impl fmt::Display for UnregisteredTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token not registered: {}", self.requested)?;

        if let Some(name) = self.name {
            write!(f, " (name={name:?})")?;
        }

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if self.path.len() > 1 {
            let names: Vec<String> = self
                .path
                .iter()
                .chain(std::iter::once(&self.requested))
                .map(ToString::to_string)
                .collect();
            write!(f, "\n  Resolution path: {}", render_chain(&names))?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        Ok(())
    }
}

/// Error when a circular dependency is detected.
///
/// Shows the in-progress stack so you can see WHERE the cycle is.
#[derive(Debug)]
pub struct CircularDependencyError {
    /// The token whose provider was already under construction
    pub token: TokenKey,
    /// The frames on the cycle stack, outermost first
    pub path: Vec<(TokenKey, Scope)>,
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Circular dependency detected for {}:", self.token)?;

        let entries: Vec<ChainEntry> = self
            .path
            .iter()
            .map(|(token, scope)| ChainEntry {
                type_name: token.to_string(),
                scope: scope.to_string(),
                source_name: None,
            })
            .chain(std::iter::once(ChainEntry {
                type_name: self.token.to_string(),
                scope: "cycle".to_string(),
                source_name: None,
            }))
            .collect();
        write!(f, "{}", render_chain_vertical(&entries))?;

        write!(
            f,
            "  Hint: offer the instance under construction with inject_by(), or restructure the dependencies"
        )
    }
}

/// Error when a named registration already exists for a token.
#[derive(Debug)]
pub struct DuplicateNamedRegistrationError {
    pub token: TokenKey,
    pub name: &'static str,
}

impl fmt::Display for DuplicateNamedRegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token {} with name {:?} is already registered",
            self.token, self.name,
        )?;
        write!(
            f,
            "\n  Hint: unregister the existing binding first, or pick another name"
        )
    }
}

/// Convenient Result type for Sanduq operations.
pub type Result<T> = std::result::Result<T, SanduqError>;
