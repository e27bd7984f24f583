//! Invocation identities.

use std::fmt;

/// Identity of one invocation of an operation.
///
/// Identities are minted by an [`InvocationSequencer`] and are strictly
/// increasing within one controller. `InvocationId(0)` is never minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvocationId(pub u64);

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mints invocation identities and answers "is this still the latest one?".
///
/// Pure bookkeeping: it says nothing about the order responses arrive in.
#[derive(Debug, Default)]
pub struct InvocationSequencer {
    latest: u64,
}

impl InvocationSequencer {
    /// Create a sequencer that has minted nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh identity, greater than every identity minted before.
    ///
    /// # Panics
    ///
    /// Panics if the sequence is exhausted rather than wrapping around.
    pub fn next(&mut self) -> InvocationId {
        self.latest = match self.latest.checked_add(1) {
            Some(next) => next,
            None => panic!("invocation sequence exhausted"),
        };
        InvocationId(self.latest)
    }

    /// Returns `true` iff no identity after `id` has been minted.
    pub fn is_latest(&self, id: InvocationId) -> bool {
        id.0 == self.latest
    }

    /// The most recently minted identity, or `InvocationId(0)` if none.
    pub fn latest(&self) -> InvocationId {
        InvocationId(self.latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_identity_is_one() {
        let mut seq = InvocationSequencer::new();
        assert_eq!(seq.latest(), InvocationId(0));
        assert_eq!(seq.next(), InvocationId(1));
    }

    #[test]
    fn test_only_newest_is_latest() {
        let mut seq = InvocationSequencer::new();
        let first = seq.next();
        let second = seq.next();
        assert!(second > first);
        assert!(!seq.is_latest(first));
        assert!(seq.is_latest(second));
    }

    #[test]
    #[should_panic(expected = "invocation sequence exhausted")]
    fn test_overflow_fails_fast() {
        let mut seq = InvocationSequencer { latest: u64::MAX };
        seq.next();
    }
}
