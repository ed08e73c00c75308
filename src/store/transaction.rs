use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{AppError, StoreError};
use crate::store::{DocumentStore, Transaction};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Work executed inside [`run_transaction`]. It may run more than once, so it
/// must not have side effects outside the transaction handle.
#[async_trait]
pub trait TransactionBody: Send + Sync {
    type Output: Send;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<Self::Output, AppError>;
}

/// Runs `body` atomically, retrying the whole read-modify-write cycle when the
/// commit loses a race with a concurrent writer.
///
/// An error returned by the body aborts immediately and nothing is written.
pub async fn run_transaction<B: TransactionBody>(
    store: &dyn DocumentStore,
    body: &B,
    max_attempts: u32,
) -> Result<B::Output, AppError> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let mut tx = store.begin_transaction().await?;
        let output = body.run(tx.as_mut()).await?;

        match tx.commit().await {
            Ok(()) => {
                debug!("transaction committed on attempt {}", attempt);
                return Ok(output);
            }
            Err(StoreError::Conflict(what)) if attempt < max_attempts => {
                warn!(
                    "transaction conflict on {} (attempt {}/{}), retrying",
                    what, attempt, max_attempts
                );
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::to_int;
    use crate::store::MemoryStore;
    use serde_json::{Map, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COUNTERS: &str = "counters";

    struct Increment {
        runs: AtomicUsize,
        interfere: Option<Arc<MemoryStore>>,
    }

    #[async_trait]
    impl TransactionBody for Increment {
        type Output = i64;

        async fn run(&self, tx: &mut dyn Transaction) -> Result<i64, AppError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            let doc = tx
                .get(COUNTERS, "c")
                .await?
                .ok_or_else(|| AppError::CourseNotFound("c".to_string()))?;
            let value = to_int(doc.data.get("n"), 0);

            // A competing writer sneaks in during the first attempt only.
            if let (0, Some(store)) = (run, &self.interfere) {
                let mut data = Map::new();
                data.insert("n".to_string(), json!(100));
                store.update_document(COUNTERS, "c", data).await?;
            }

            let mut data = Map::new();
            data.insert("n".to_string(), json!(value + 1));
            tx.update(COUNTERS, "c", data);
            Ok(value + 1)
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut data = Map::new();
        data.insert("n".to_string(), json!(1));
        store
            .set_document(COUNTERS, "c", data)
            .await
            .expect("Failed to seed counter");
        store
    }

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let store = seeded_store().await;
        let body = Increment {
            runs: AtomicUsize::new(0),
            interfere: None,
        };

        let result = run_transaction(&*store, &body, DEFAULT_MAX_ATTEMPTS)
            .await
            .expect("transaction should commit");

        assert_eq!(result, 2);
        assert_eq!(body.runs.load(Ordering::SeqCst), 1);
        let doc = store.get_document(COUNTERS, "c").await.unwrap().unwrap();
        assert_eq!(doc.data["n"], json!(2));
    }

    #[tokio::test]
    async fn test_conflict_reruns_body_with_fresh_reads() {
        let store = seeded_store().await;
        let body = Increment {
            runs: AtomicUsize::new(0),
            interfere: Some(store.clone()),
        };

        let result = run_transaction(&*store, &body, DEFAULT_MAX_ATTEMPTS)
            .await
            .expect("retry should commit");

        assert_eq!(result, 101);
        assert_eq!(body.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_conflict_surfaces_when_attempts_run_out() {
        let store = seeded_store().await;
        let body = Increment {
            runs: AtomicUsize::new(0),
            interfere: Some(store.clone()),
        };

        let err = run_transaction(&*store, &body, 1)
            .await
            .expect_err("single attempt should fail");

        assert!(matches!(err, AppError::Store(StoreError::Conflict(_))));
        let doc = store.get_document(COUNTERS, "c").await.unwrap().unwrap();
        assert_eq!(doc.data["n"], json!(100));
    }

    #[tokio::test]
    async fn test_body_error_aborts_without_retry() {
        let store = Arc::new(MemoryStore::new());
        let body = Increment {
            runs: AtomicUsize::new(0),
            interfere: None,
        };

        let err = run_transaction(&*store, &body, DEFAULT_MAX_ATTEMPTS)
            .await
            .expect_err("missing document should abort");

        assert!(matches!(err, AppError::CourseNotFound(_)));
        assert_eq!(body.runs.load(Ordering::SeqCst), 1);
    }
}
