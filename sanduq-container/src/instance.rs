//! Type-erased resolved values and the disposal contract.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, SanduqError};
use crate::token::TokenKey;

/// Values that want to be told when their owning container goes away.
///
/// [`Container::dispose`](crate::container::Container::dispose) calls
/// [`dispose`](Disposable::dispose) exactly once per distinct cached
/// instance, no matter how many tokens lead to it.
pub trait Disposable {
    fn dispose(&self);
}

pub(crate) type Disposer = Arc<dyn Fn() + Send + Sync>;

/// A resolved value with its type erased.
///
/// Internally holds an `Arc<T>`; cloning an `Instance` never clones `T`.
/// The identity is the address of the shared value and survives
/// conversions between alias types.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    identity: usize,
    type_name: &'static str,
    disposer: Option<Disposer>,
}

impl Instance {
    /// Wraps a shared value.
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            identity: Arc::as_ptr(&value).cast::<()>() as usize,
            value: Arc::new(value),
            type_name: type_name::<T>(),
            disposer: None,
        }
    }

    pub(crate) fn with_disposer(mut self, disposer: Option<Disposer>) -> Self {
        self.disposer = disposer;
        self
    }

    /// Swaps the carried value for another view of the same object.
    pub(crate) fn rebind<T: ?Sized + Send + Sync + 'static>(&self, value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            identity: self.identity,
            type_name: type_name::<T>(),
            disposer: self.disposer.clone(),
        }
    }

    /// Returns the shared value if it is an `Arc<T>`.
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    pub(crate) fn downcast_for<T: ?Sized + 'static>(&self, token: &TokenKey) -> Result<Arc<T>> {
        self.downcast::<T>().ok_or_else(|| SanduqError::TypeMismatch {
            token: token.clone(),
            expected: type_name::<T>(),
            found: self.type_name,
        })
    }

    /// Address-based identity of the underlying object.
    #[inline]
    pub fn identity(&self) -> usize {
        self.identity
    }

    /// Name of the type currently carried.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if this value opted into the disposal contract.
    #[inline]
    pub fn is_disposable(&self) -> bool {
        self.disposer.is_some()
    }

    /// Returns `true` if both handles point at the same object.
    #[inline]
    pub fn same_as(&self, other: &Instance) -> bool {
        self.identity == other.identity
    }

    pub(crate) fn dispose(&self) {
        if let Some(disposer) = &self.disposer {
            disposer();
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name)
            .field("identity", &format_args!("{:#x}", self.identity))
            .field("disposable", &self.disposer.is_some())
            .finish()
    }
}
