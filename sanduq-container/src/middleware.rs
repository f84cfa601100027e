//! Interceptors around container operations.
//!
//! A middleware attaches interceptors to named [`Operation`]s through a
//! [`MiddlewareComposer`]. Interceptors nest like an onion: the last
//! one applied runs outermost. Given `[a, b]` applied in that order, a
//! call observes `b` before, `a` before, the operation, `a` after,
//! `b` after.
//!
//! ```
//! use sanduq_container::prelude::*;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let counting = {
//!     let calls = calls.clone();
//!     move |composer: &mut MiddlewareComposer<'_>| {
//!         let calls = calls.clone();
//!         composer.use_on(Operation::Resolve, move |call, next| {
//!             calls.fetch_add(1, Ordering::SeqCst);
//!             next(call)
//!         });
//!     }
//! };
//!
//! let port = Token::<u16>::new("Port");
//! let container = Container::new();
//! container.register(&port, Provider::value(8080)).unwrap();
//! apply_middleware(&container, &[&counting]).unwrap();
//!
//! assert_eq!(*container.resolve(&port).unwrap(), 8080);
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::container::Container;
use crate::error::Result;
use crate::instance::Instance;
use crate::token::TokenKey;

/// Container operations that can be intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Resolve,
    ResolveAll,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Resolve => write!(f, "resolve"),
            Operation::ResolveAll => write!(f, "resolve_all"),
        }
    }
}

/// The arguments of an intercepted call.
#[derive(Debug, Clone)]
pub struct ResolveCall {
    pub operation: Operation,
    pub token: TokenKey,
    pub name: Option<&'static str>,
    pub optional: bool,
}

/// The result of an intercepted call.
#[derive(Debug, Clone)]
pub enum Outcome {
    One(Option<Instance>),
    Many(Vec<Instance>),
}

/// Continues with the next interceptor, or the operation itself.
pub type Next<'a> = &'a dyn Fn(&ResolveCall) -> Result<Outcome>;

pub(crate) type InterceptorFn =
    Arc<dyn Fn(&ResolveCall, Next<'_>) -> Result<Outcome> + Send + Sync>;

/// Attaches interceptors to one container.
pub struct MiddlewareComposer<'a> {
    container: &'a Container,
    added: usize,
}

impl<'a> MiddlewareComposer<'a> {
    /// The container being composed.
    pub fn container(&self) -> &'a Container {
        self.container
    }

    /// Wraps `operation` with `interceptor`.
    pub fn use_on(
        &mut self,
        operation: Operation,
        interceptor: impl Fn(&ResolveCall, Next<'_>) -> Result<Outcome> + Send + Sync + 'static,
    ) -> &mut Self {
        self.container
            .add_interceptor(operation, Arc::new(interceptor));
        self.added += 1;
        self
    }
}

/// Something that attaches interceptors to a container.
pub trait Middleware {
    fn apply(&self, composer: &mut MiddlewareComposer<'_>);
}

impl<F> Middleware for F
where
    F: Fn(&mut MiddlewareComposer<'_>),
{
    fn apply(&self, composer: &mut MiddlewareComposer<'_>) {
        self(composer)
    }
}

/// Applies `middlewares` to `container` in order.
///
/// # Errors
/// [`SanduqError::DisposedContainerUse`](crate::error::SanduqError::DisposedContainerUse)
/// if the container is disposed.
pub fn apply_middleware(container: &Container, middlewares: &[&dyn Middleware]) -> Result<()> {
    container.ensure_live()?;
    let mut composer = MiddlewareComposer {
        container,
        added: 0,
    };
    for middleware in middlewares {
        middleware.apply(&mut composer);
    }
    debug!(interceptors = composer.added, "Applied middleware");
    Ok(())
}

/// Runs `call` through `interceptors`, the last one outermost.
pub(crate) fn run_chain(
    interceptors: &[InterceptorFn],
    call: &ResolveCall,
    operation: &dyn Fn(&ResolveCall) -> Result<Outcome>,
) -> Result<Outcome> {
    match interceptors.split_last() {
        None => operation(call),
        Some((outermost, inner)) => {
            outermost(call, &|call: &ResolveCall| run_chain(inner, call, operation))
        }
    }
}
