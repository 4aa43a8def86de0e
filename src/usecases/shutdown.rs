//! Hierarchical cancellation scopes built on `tokio::sync::watch`.
//!
//! The process owns a root `Shutdown`; the supervisor derives a child
//! scope from whatever it is handed so it can cancel its own strategies
//! without touching the caller, while a root cancel still reaches every
//! strategy through the chain of ancestors.

use std::sync::Arc;

use futures_util::future::{select_all, BoxFuture, FutureExt};
use tokio::sync::watch;

/// A cancellation scope. Clones share the same scope.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Sender for this scope only.
    tx: Arc<watch::Sender<bool>>,
    /// This scope's receiver first, then one receiver per ancestor.
    chain: Vec<watch::Receiver<bool>>,
}

impl Shutdown {
    /// Create a root scope.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            chain: vec![rx],
        }
    }

    /// Derive a child scope, cancelled with this one or on its own.
    pub fn child(&self) -> Self {
        let (tx, rx) = watch::channel(false);
        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(rx);
        chain.extend(self.chain.iter().cloned());
        Self {
            tx: Arc::new(tx),
            chain,
        }
    }

    /// Cancel this scope and every scope derived from it. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.chain.iter().any(|rx| *rx.borrow())
    }

    /// Resolve once this scope or any ancestor is cancelled.
    ///
    /// An ancestor dropped without being cancelled never resolves this.
    pub async fn cancelled(&self) {
        let waiters: Vec<BoxFuture<'static, ()>> = self
            .chain
            .iter()
            .cloned()
            .map(|mut rx| {
                async move {
                    let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        std::future::pending::<()>().await;
                    }
                }
                .boxed()
            })
            .collect();

        select_all(waiters).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
