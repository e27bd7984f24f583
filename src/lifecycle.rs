//! Consumer attach/detach tracking.

/// Tracks whether the consumer of a controller is attached.
///
/// Once inactive, settling invocations may no longer touch the result
/// snapshot. User callbacks are not affected. Both transitions are idempotent.
#[derive(Debug, Default)]
pub struct LifecycleGuard {
    active: bool,
}

impl LifecycleGuard {
    /// Create an inactive guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the consumer attached. Returns `true` if this changed the state.
    pub fn activate(&mut self) -> bool {
        !std::mem::replace(&mut self.active, true)
    }

    /// Mark the consumer detached. Returns `true` if this changed the state.
    pub fn deactivate(&mut self) -> bool {
        std::mem::replace(&mut self.active, false)
    }

    /// Whether the consumer is attached.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_idempotent() {
        let mut guard = LifecycleGuard::new();
        assert!(!guard.deactivate());
        assert!(!guard.is_active());

        assert!(guard.activate());
        assert!(!guard.activate());
        assert!(guard.is_active());

        assert!(guard.deactivate());
        assert!(!guard.deactivate());
        assert!(!guard.is_active());
    }
}
