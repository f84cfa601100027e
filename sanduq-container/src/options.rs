//! Container and registration options.
//!
//! [`ContainerOptions`] is serde-enabled so it can live in an
//! application's configuration file:
//!
//! ```
//! use sanduq_container::options::ContainerOptions;
//! use sanduq_container::scope::Scope;
//!
//! let options = ContainerOptions::default()
//!     .auto_register(true)
//!     .default_scope(Scope::Container);
//! assert!(options.auto_register);
//! ```

use serde::{Deserialize, Serialize};

use crate::scope::Scope;

/// Settings shared by a container and, unless overridden, its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// Register unregistered classes on first resolve, unless their
    /// metadata says otherwise.
    pub auto_register: bool,
    /// Scope of registrations that declare none.
    pub default_scope: Scope,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            auto_register: false,
            default_scope: Scope::Inherited,
        }
    }
}

impl ContainerOptions {
    /// Enables or disables auto-registration.
    pub fn auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    /// Sets the scope used when a registration declares none.
    pub fn default_scope(mut self, scope: Scope) -> Self {
        self.default_scope = scope;
        self
    }
}

/// Per-registration overrides.
///
/// Options given here win over class-level metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrationOptions {
    pub scope: Option<Scope>,
    pub name: Option<&'static str>,
}

impl RegistrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the scope of the registration.
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Qualifies the registration with a name.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }
}

impl From<Scope> for RegistrationOptions {
    fn from(scope: Scope) -> Self {
        Self::new().scope(scope)
    }
}
