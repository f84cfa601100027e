//! Modules: groups of related registrations.
//!
//! Instead of one giant registration block, split registrations by
//! concern and install each group:
//!
//! ```
//! use sanduq_container::prelude::*;
//!
//! struct StorageModule;
//!
//! impl Module for StorageModule {
//!     fn register(&self, container: &Container) -> Result<()> {
//!         container.register(&Token::<String>::of(), Provider::value("/var/lib/app".to_string()))?;
//!         Ok(())
//!     }
//! }
//!
//! let container = Container::new();
//! container.install(&StorageModule).unwrap();
//! assert!(container.is_registered(&Token::<String>::of()).unwrap());
//! ```
//!
//! Modules can also be submitted at link time and installed together:
//!
//! ```ignore
//! static STORAGE: StorageModule = StorageModule;
//! inventory::submit!(ModuleRegistration::new(&STORAGE));
//!
//! container.install_collected_modules()?;
//! ```

use crate::container::Container;
use crate::error::Result;

/// A set of registrations applied to a container in one go.
pub trait Module: Send + Sync {
    /// Registers this module's tokens into `container`.
    fn register(&self, container: &Container) -> Result<()>;

    /// Human-readable name for logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A module submitted with `inventory::submit!`.
pub struct ModuleRegistration {
    module: &'static dyn Module,
}

impl ModuleRegistration {
    pub const fn new(module: &'static dyn Module) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &'static dyn Module {
        self.module
    }
}

inventory::collect!(ModuleRegistration);

/// Every module submitted anywhere in the binary.
pub fn collected_modules() -> impl Iterator<Item = &'static dyn Module> {
    inventory::iter::<ModuleRegistration>
        .into_iter()
        .map(ModuleRegistration::module)
}
