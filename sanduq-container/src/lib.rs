//! Core container implementation for Sanduq DI.

mod chain;
pub mod class;
pub mod container;
pub mod context;
pub mod error;
pub mod injector;
pub mod instance;
pub mod middleware;
pub mod module;
pub mod options;
pub mod provider;
mod registry;
mod resolution;
pub mod scope;
pub mod token;

pub use class::{ClassMetadata, Injectable};
pub use container::{Container, prelude};
pub use context::{
    in_injection_context, inject, inject_all, inject_all_by, inject_by, inject_named,
    inject_named_by, optional, optional_all, optional_all_by, optional_by, optional_named,
    optional_named_by,
};
pub use error::{Result, SanduqError};
pub use injector::Injector;
pub use instance::{Disposable, Instance};
pub use middleware::{Middleware, MiddlewareComposer, Operation, Outcome, ResolveCall, apply_middleware};
pub use module::{Module, ModuleRegistration};
pub use options::{ContainerOptions, RegistrationOptions};
pub use provider::Provider;
pub use scope::Scope;
pub use token::{Token, TokenKey};

#[doc(hidden)]
pub use inventory;
