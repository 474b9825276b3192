use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation tokens of runs executing in the background, keyed by run id.
#[derive(Clone, Default)]
pub struct RunRegistry {
    inner: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl RunRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        // A poisoned map is still consistent: every operation is a single insert/remove.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a run and returns the token the engine should observe.
    pub fn register(&self, run_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(run_id, token.clone());
        token
    }

    /// Requests cancellation. Returns false when the run is not in flight.
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.lock().get(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, run_id: Uuid) {
        self.lock().remove(&run_id);
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_reaches_registered_token() {
        let registry = RunRegistry::default();
        let run_id = Uuid::new_v4();
        let token = registry.register(run_id);

        assert!(registry.cancel(run_id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_unknown_run_is_refused() {
        let registry = RunRegistry::default();
        assert!(!registry.cancel(Uuid::new_v4()));
    }

    #[test]
    fn test_finished_runs_are_removed() {
        let registry = RunRegistry::default();
        let run_id = Uuid::new_v4();
        registry.register(run_id);
        assert_eq!(registry.in_flight(), 1);

        registry.finish(run_id);
        assert_eq!(registry.in_flight(), 0);
        assert!(!registry.cancel(run_id));
    }
}
