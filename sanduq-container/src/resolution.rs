//! Per-call resolution state.
//!
//! One [`Resolution`] lives for the duration of an outermost `resolve`
//! call on a container. It holds the cycle stack, the `Resolution`-scope
//! cache and the placeholders offered through `inject_by`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::instance::Instance;
use crate::provider::ProviderId;
use crate::scope::Scope;
use crate::token::TokenKey;

/// A provider currently being built, tagged with its effective scope.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub provider: ProviderId,
    pub token: TokenKey,
    pub scope: Scope,
}

#[derive(Debug, Default)]
pub(crate) struct Resolution {
    stack: Vec<Frame>,
    values: HashMap<ProviderId, Instance>,
    dependents: HashMap<ProviderId, Instance>,
}

pub(crate) type SharedResolution = Arc<Mutex<Resolution>>;

impl Resolution {
    pub fn shared() -> SharedResolution {
        Arc::new(Mutex::new(Resolution::default()))
    }

    pub fn top(&self) -> Option<&Frame> {
        self.stack.last()
    }

    pub fn is_building(&self, provider: ProviderId) -> bool {
        self.stack.iter().any(|frame| frame.provider == provider)
    }

    /// The stack, outermost frame first.
    pub fn path(&self) -> Vec<(TokenKey, Scope)> {
        self.stack
            .iter()
            .map(|frame| (frame.token.clone(), frame.scope))
            .collect()
    }

    pub fn cached(&self, provider: ProviderId) -> Option<Instance> {
        self.values.get(&provider).cloned()
    }

    pub fn store(&mut self, provider: ProviderId, instance: Instance) {
        self.values.insert(provider, instance);
    }

    pub fn dependent(&self, provider: ProviderId) -> Option<Instance> {
        self.dependents.get(&provider).cloned()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Pops its frame on drop; discards the per-call cache once the stack is empty.
pub(crate) struct FrameGuard {
    resolution: SharedResolution,
}

impl FrameGuard {
    pub fn push(resolution: &SharedResolution, frame: Frame) -> Self {
        resolution.lock().stack.push(frame);
        Self {
            resolution: resolution.clone(),
        }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        let discarded = {
            let mut resolution = self.resolution.lock();
            resolution.stack.pop();
            if resolution.stack.is_empty() {
                std::mem::take(&mut resolution.values)
            } else {
                HashMap::new()
            }
        };
        // User Drop impls run outside the lock.
        drop(discarded);
    }
}

/// Offers a placeholder for the provider on top of the stack, restoring
/// whatever was offered before when dropped.
pub(crate) struct DependentGuard {
    resolution: SharedResolution,
    provider: ProviderId,
    previous: Option<Instance>,
}

impl DependentGuard {
    /// Returns `None` when nothing is being built.
    pub fn offer(resolution: &SharedResolution, placeholder: Instance) -> Option<Self> {
        let mut locked = resolution.lock();
        let provider = locked.top()?.provider;
        let previous = locked.dependents.insert(provider, placeholder);
        Some(Self {
            resolution: resolution.clone(),
            provider,
            previous,
        })
    }

    /// Offers `placeholder` for an explicit frame.
    pub fn offer_for(resolution: &SharedResolution, provider: ProviderId, placeholder: Instance) -> Self {
        let previous = resolution.lock().dependents.insert(provider, placeholder);
        Self {
            resolution: resolution.clone(),
            provider,
            previous,
        }
    }
}

impl Drop for DependentGuard {
    fn drop(&mut self) {
        let released = {
            let mut resolution = self.resolution.lock();
            match self.previous.take() {
                Some(previous) => resolution.dependents.insert(self.provider, previous),
                None => resolution.dependents.remove(&self.provider),
            }
        };
        drop(released);
    }
}
