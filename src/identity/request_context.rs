use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lifetime of a mounted view. Requests issued on behalf of the view carry a
/// [`ScopeHandle`]; once the scope is dropped (the view unmounted) their
/// responses are discarded without touching shared session state.
#[derive(Debug)]
pub struct ComponentScope {
    name: String,
    alive: Arc<AtomicBool>,
}

impl ComponentScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), alive: Arc::new(AtomicBool::new(true)) }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn handle(&self) -> ScopeHandle {
        ScopeHandle { name: self.name.clone(), alive: self.alive.clone() }
    }

    /// Explicit unmount; equivalent to dropping the scope.
    pub fn unmount(self) {}
}

impl Drop for ComponentScope {
    fn drop(&mut self) { self.alive.store(false, Ordering::Release); }
}

#[derive(Debug, Clone)]
pub struct ScopeHandle {
    name: String,
    alive: Arc<AtomicBool>,
}

impl ScopeHandle {
    pub fn is_alive(&self) -> bool { self.alive.load(Ordering::Acquire) }
    pub fn name(&self) -> &str { &self.name }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_observes_unmount() {
        let scope = ComponentScope::new("tenant/payments");
        let h = scope.handle();
        assert!(h.is_alive());
        scope.unmount();
        assert!(!h.is_alive());
        assert_eq!(h.name(), "tenant/payments");
    }
}
