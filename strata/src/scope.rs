use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Request-scoped kill switch for the whole cache engine.
///
/// One scope is created per request and threaded through every cached call it
/// makes. While disabled, every call bypasses the cache entirely: the
/// computation runs and no tier is read or written. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct RequestScope {
    disabled: Arc<AtomicBool>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disable(&self) {
        self.disabled.store(true, Ordering::Relaxed);
    }

    pub fn enable(&self) {
        self.disabled.store(false, Ordering::Relaxed);
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_toggles_and_clones_share_state() {
        let scope = RequestScope::new();
        assert!(!scope.is_disabled());

        let other = scope.clone();
        scope.disable();
        assert!(other.is_disabled());

        other.enable();
        assert!(!scope.is_disabled());
    }
}
