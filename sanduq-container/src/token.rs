//! Injection tokens.
//!
//! A [`Token<T>`] is the nominal identity under which values of type `T`
//! are registered and resolved. Two flavours exist:
//!
//! - **unique tokens** ([`Token::new`]) carry a process-unique identity;
//!   two tokens created with the same display name are never equal;
//! - **type tokens** ([`Token::of`], [`Token::class`]) use the Rust type
//!   itself as identity, the way a class is its own token.
//!
//! Tokens erase to a [`TokenKey`] for storage in the registry.

use std::any::{TypeId, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use sanduq_support::rendering::shorten_type_name;

use crate::class::{ClassDescriptor, Injectable, class_descriptor};

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Identity part of a token. Only this takes part in equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TokenId {
    Type(TypeId),
    Unique(u64),
}

/// Builds the metadata-derived registration of a class token.
pub(crate) type ClassHook = fn() -> ClassDescriptor;

/// Type-erased token, as stored in the registry.
#[derive(Clone)]
pub struct TokenKey {
    id: TokenId,
    name: &'static str,
    class: Option<ClassHook>,
}

impl TokenKey {
    /// Returns the display name given at creation (full type path for type tokens).
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` when this token is a type used as its own token.
    #[inline]
    pub fn is_type_token(&self) -> bool {
        matches!(self.id, TokenId::Type(_))
    }

    /// Returns `true` when the token knows how to build its class.
    #[inline]
    pub fn is_class(&self) -> bool {
        self.class.is_some()
    }

    #[inline]
    pub(crate) fn id(&self) -> TokenId {
        self.id
    }

    #[inline]
    pub(crate) fn class_hook(&self) -> Option<ClassHook> {
        self.class
    }

    pub(crate) fn for_type<T: ?Sized + 'static>() -> Self {
        Self {
            id: TokenId::Type(TypeId::of::<T>()),
            name: type_name::<T>(),
            class: None,
        }
    }
}

impl PartialEq for TokenKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TokenKey {}

impl Hash for TokenKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            TokenId::Type(_) => write!(f, "TokenKey({})", self.name),
            TokenId::Unique(id) => write!(f, "TokenKey({}#{id})", self.name),
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            TokenId::Type(_) => write!(f, "{}", shorten_type_name(self.name)),
            TokenId::Unique(_) => write!(f, "{}", self.name),
        }
    }
}

/// Typed injection token.
///
/// # Examples
/// ```
/// use sanduq_container::token::Token;
///
/// let a = Token::<String>::new("Env");
/// let b = Token::<String>::new("Env");
/// assert_ne!(a, b);
///
/// assert_eq!(Token::<u32>::of(), Token::<u32>::of());
/// ```
pub struct Token<T: ?Sized> {
    key: TokenKey,
    _marker: PhantomData<fn() -> *const T>,
}

impl<T: ?Sized + 'static> Token<T> {
    /// Creates a token with a fresh, process-unique identity.
    pub fn new(name: &'static str) -> Self {
        let id = NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            key: TokenKey {
                id: TokenId::Unique(id),
                name,
                class: None,
            },
            _marker: PhantomData,
        }
    }

    /// Uses the type `T` itself as the token.
    pub fn of() -> Self {
        Self {
            key: TokenKey::for_type::<T>(),
            _marker: PhantomData,
        }
    }

    /// Returns the erased key.
    #[inline]
    pub fn key(&self) -> &TokenKey {
        &self.key
    }

    /// Returns the display name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.key.name
    }
}

impl<C: Injectable> Token<C> {
    /// Uses the class `C` as its own token.
    ///
    /// Equal to [`Token::of`] for the same type, but additionally carries
    /// the class metadata so the container can construct or auto-register
    /// `C` when nothing is registered under it.
    pub fn class() -> Self {
        Self {
            key: TokenKey {
                id: TokenId::Type(TypeId::of::<C>()),
                name: type_name::<C>(),
                class: Some(class_descriptor::<C>),
            },
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Clone for Token<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T: ?Sized> Eq for Token<T> {}

impl<T: ?Sized> Hash for Token<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?})", self.key)
    }
}

impl<T: ?Sized> fmt::Display for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.key, f)
    }
}
