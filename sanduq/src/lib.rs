//! # Sanduq: Dependency Injection Runtime for Rust
//!
//! A hierarchical IoC container with scoped resolution: tokens bound to
//! providers, `Container`/`Resolution`/`Transient`/`Inherited` lifetimes,
//! child containers, aliases, middleware and deterministic disposal.
//!
//! ```
//! use sanduq::prelude::*;
//!
//! let env = Token::<&'static str>::new("Env");
//! let container = Container::new();
//! container.register(&env, Provider::value("production")).unwrap();
//!
//! let child = container.create_child().unwrap();
//! assert_eq!(*child.resolve(&env).unwrap(), "production");
//! ```

pub use sanduq_container::*;
pub use sanduq_support::*;
