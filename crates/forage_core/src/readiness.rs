//! Readiness queue.
//!
//! Disruptive operations (upgrade, reconnect, drop) push a deferred gate
//! onto their database context before touching the shared connection and
//! settle it when they finish. The context's readiness future is chained
//! behind every gate pushed so far, so anything awaiting it waits for all
//! earlier disruptions.
//!
//! Gates are settled newest first. Concurrent disruptions nest: the most
//! recent one completes while the outer ones still wait on the chain.

use crate::error::{ForageError, ForageResult};
use crate::registry::DbContext;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

/// A cloneable future that settles once every pending disruption has.
pub type ReadyFuture = Shared<BoxFuture<'static, ForageResult<()>>>;

/// Settling side of a readiness gate.
pub(crate) struct Deferred {
    settle: oneshot::Sender<ForageResult<()>>,
}

impl DbContext {
    /// Pushes a new gate and chains the readiness future behind it.
    pub(crate) fn defer_readiness(&self) {
        let (settle, gate) = oneshot::channel::<ForageResult<()>>();
        let gate = async move { gate.await.unwrap_or(Err(ForageError::ReadinessAbandoned)) };

        let mut state = self.state.lock();
        let next = match state.db_ready.take() {
            Some(prev) if !matches!(prev.peek(), Some(Ok(()))) => {
                async move {
                    prev.await?;
                    gate.await
                }
                .boxed()
            }
            _ => gate.boxed(),
        };
        state.db_ready = Some(next.shared());
        state.deferred.push(Deferred { settle });
        debug!(
            database = self.name(),
            pending = state.deferred.len(),
            "readiness deferred"
        );
    }

    /// Resolves the most recently pushed gate.
    pub(crate) fn advance_readiness(&self) {
        self.settle(Ok(()));
    }

    /// Rejects the most recently pushed gate with `err`.
    pub(crate) fn reject_readiness(&self, err: ForageError) {
        self.settle(Err(err));
    }

    fn settle(&self, outcome: ForageResult<()>) {
        let mut state = self.state.lock();
        let Some(deferred) = state.deferred.pop() else {
            return;
        };
        debug!(
            database = self.name(),
            pending = state.deferred.len(),
            ok = outcome.is_ok(),
            "readiness settled"
        );
        // The receiving side is gone only if nothing can observe the chain.
        let _ = deferred.settle.send(outcome);
    }

    /// Returns the current readiness future, if any disruption was ever
    /// deferred on this database.
    #[must_use]
    pub fn readiness(&self) -> Option<ReadyFuture> {
        self.state.lock().db_ready.clone()
    }

    /// Returns the number of gates not yet settled.
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        self.state.lock().deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ContextRegistry;
    use forage_engine::EngineError;
    use futures::FutureExt;
    use std::sync::Arc;

    fn context() -> Arc<DbContext> {
        ContextRegistry::new().get_or_create("db")
    }

    #[tokio::test]
    async fn advance_resolves_chain() {
        let ctx = context();
        ctx.defer_readiness();
        let ready = ctx.readiness().unwrap();
        assert!(ready.clone().now_or_never().is_none());

        ctx.advance_readiness();
        assert_eq!(ready.await, Ok(()));
        assert_eq!(ctx.pending_changes(), 0);
    }

    #[tokio::test]
    async fn late_waiters_wait_for_all_gates() {
        let ctx = context();
        ctx.defer_readiness();
        let first = ctx.readiness().unwrap();
        ctx.defer_readiness();
        let both = ctx.readiness().unwrap();

        // Newest gate settles first; the older one still holds the chain.
        ctx.advance_readiness();
        assert!(first.clone().now_or_never().is_none());
        assert!(both.clone().now_or_never().is_none());

        ctx.advance_readiness();
        assert_eq!(first.await, Ok(()));
        assert_eq!(both.await, Ok(()));
    }

    #[tokio::test]
    async fn settle_pops_most_recent_gate() {
        let ctx = context();
        ctx.defer_readiness();
        let outer = ctx.readiness().unwrap();
        ctx.defer_readiness();

        // Rejecting pops the inner gate, so the outer one is unaffected.
        ctx.reject_readiness(EngineError::aborted("inner").into());
        ctx.advance_readiness();
        assert_eq!(outer.await, Ok(()));
        assert!(ctx.readiness().unwrap().await.is_err());
    }

    #[tokio::test]
    async fn rejected_chain_stays_rejected() {
        let ctx = context();
        ctx.defer_readiness();
        let err: ForageError = EngineError::aborted("upgrade failed").into();
        ctx.reject_readiness(err.clone());
        assert_eq!(ctx.readiness().unwrap().await, Err(err.clone()));

        ctx.defer_readiness();
        ctx.advance_readiness();
        assert_eq!(ctx.readiness().unwrap().await, Err(err));
    }

    #[tokio::test]
    async fn resolved_chain_is_not_extended() {
        let ctx = context();
        ctx.defer_readiness();
        ctx.advance_readiness();
        ctx.readiness().unwrap().await.unwrap();

        ctx.defer_readiness();
        ctx.advance_readiness();
        assert_eq!(ctx.readiness().unwrap().now_or_never(), Some(Ok(())));
    }

    #[test]
    fn settle_without_gate_is_noop() {
        let ctx = context();
        ctx.advance_readiness();
        ctx.reject_readiness(ForageError::NotInitialized);
        assert!(ctx.readiness().is_none());
    }

    #[tokio::test]
    async fn dropped_gate_is_abandoned() {
        let ctx = context();
        ctx.defer_readiness();
        let ready = ctx.readiness().unwrap();
        ctx.state.lock().deferred.clear();
        assert_eq!(ready.await, Err(ForageError::ReadinessAbandoned));
    }
}
