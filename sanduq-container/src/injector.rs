//! The built-in `Injector`, for injecting outside a constructor's extent.
//!
//! The injection helpers only work while a container is resolving. A
//! value that needs to resolve later (lazily, or from a callback) asks
//! for an [`Injector`] instead; it remembers the container, the
//! resolution and the frame that requested it, and re-enters them on
//! every call.
//!
//! ```
//! use sanduq_container::prelude::*;
//! use std::sync::Arc;
//!
//! struct Mailer {
//!     injector: Arc<Injector>,
//! }
//!
//! impl Injectable for Mailer {
//!     fn construct() -> Result<Arc<Self>> {
//!         Ok(Arc::new(Mailer { injector: inject(&Injector::token())? }))
//!     }
//! }
//!
//! let host = Token::<String>::new("SmtpHost");
//! let container = Container::new();
//! container.register(&host, Provider::value("smtp.local".to_string())).unwrap();
//!
//! let mailer = container.resolve(&Token::<Mailer>::class()).unwrap();
//! // Long after construction finished:
//! assert_eq!(*mailer.injector.inject(&host).unwrap(), "smtp.local");
//! ```

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::container::Container;
use crate::context::{self, InjectionContext};
use crate::error::{Result, SanduqError};
use crate::instance::Instance;
use crate::provider::{BuildFn, ErasedProvider};
use crate::registry::Registration;
use crate::resolution::{DependentGuard, Frame, FrameGuard, SharedResolution};
use crate::scope::Scope;
use crate::token::{Token, TokenKey};

/// Resolves on behalf of the value that requested it, at any time.
pub struct Injector {
    container: Container,
    resolution: SharedResolution,
    frame: Option<Frame>,
    dependent: Option<Instance>,
}

static INJECTOR: Lazy<Arc<Registration>> = Lazy::new(|| {
    let build: BuildFn = Arc::new(|| {
        let context = context::current().ok_or(SanduqError::OutsideInjectionContext {
            operation: "Injector",
        })?;
        let (frame, dependent) = {
            let resolution = context.resolution.lock();
            let frame = resolution.top().cloned();
            let dependent = frame
                .as_ref()
                .and_then(|frame| resolution.dependent(frame.provider));
            (frame, dependent)
        };
        Ok(Instance::new(Arc::new(Injector {
            container: context.container,
            resolution: context.resolution,
            frame,
            dependent,
        })))
    });
    Arc::new(Registration::new(
        TokenKey::for_type::<Injector>(),
        ErasedProvider::internal_factory(build),
        Scope::Transient,
        None,
    ))
});

/// The registration answering `token`, if the container answers it itself.
pub(crate) fn internal_registration(token: &TokenKey) -> Option<Arc<Registration>> {
    is_reserved(token).then(|| INJECTOR.clone())
}

/// Returns `true` for tokens that can never be registered over.
pub(crate) fn is_reserved(token: &TokenKey) -> bool {
    *token == INJECTOR.token
}

impl Injector {
    /// The reserved token every container answers with an `Injector`.
    pub fn token() -> Token<Injector> {
        Token::of()
    }

    /// The container this injector resolves from.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Runs `resolve` inside the captured context.
    ///
    /// Inside the original extent this is a plain call. Afterwards the
    /// captured frame is pushed again so `Inherited` scopes and cycle
    /// placeholders behave as they did during construction.
    fn within<R>(&self, resolve: impl FnOnce(&Container) -> Result<R>) -> Result<R> {
        let active = context::current()
            .is_some_and(|current| Arc::ptr_eq(&current.resolution, &self.resolution));
        if active {
            return resolve(&self.container);
        }

        let _context = context::provide(InjectionContext {
            container: self.container.clone(),
            resolution: self.resolution.clone(),
        });
        let frame = self
            .frame
            .as_ref()
            .filter(|frame| !self.resolution.lock().is_building(frame.provider));
        let _frame = frame.map(|frame| FrameGuard::push(&self.resolution, frame.clone()));
        let _dependent = match (frame, &self.dependent) {
            (Some(frame), Some(dependent)) => Some(DependentGuard::offer_for(
                &self.resolution,
                frame.provider,
                dependent.clone(),
            )),
            _ => None,
        };
        resolve(&self.container)
    }

    pub fn inject<T: ?Sized + Send + Sync + 'static>(&self, token: &Token<T>) -> Result<Arc<T>> {
        self.within(|container| container.resolve(token))
    }

    pub fn inject_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        token: &Token<T>,
        name: &'static str,
    ) -> Result<Arc<T>> {
        self.within(|container| container.resolve_named(token, name))
    }

    pub fn inject_all<T: ?Sized + Send + Sync + 'static>(
        &self,
        token: &Token<T>,
    ) -> Result<Vec<Arc<T>>> {
        self.within(|container| container.resolve_all(token))
    }

    pub fn optional<T: ?Sized + Send + Sync + 'static>(
        &self,
        token: &Token<T>,
    ) -> Result<Option<Arc<T>>> {
        self.within(|container| container.resolve_optional(token))
    }

    pub fn optional_named<T: ?Sized + Send + Sync + 'static>(
        &self,
        token: &Token<T>,
        name: &'static str,
    ) -> Result<Option<Arc<T>>> {
        self.within(|container| container.resolve_optional_named(token, name))
    }

    pub fn optional_all<T: ?Sized + Send + Sync + 'static>(
        &self,
        token: &Token<T>,
    ) -> Result<Vec<Arc<T>>> {
        self.within(|container| container.resolve_all_optional(token))
    }
}

impl fmt::Debug for Injector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injector")
            .field("container", &self.container)
            .field("frame", &self.frame.as_ref().map(|frame| &frame.token))
            .field("has_dependent", &self.dependent.is_some())
            .finish()
    }
}
