//! Ten workers sharing a pool of five connections.
//!
//! Run with `cargo run -p sluice-pool --example worker_pool`. Set
//! `SLUICE_LOG=sluice_pool=debug` to watch slots being handed around.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sluice_pool::{ConnectionDescriptor, Connector, Credentials, Pool, PoolCell, Warmup};

/// A pretend store session.
#[derive(Debug)]
struct Session {
    id: u64,
    queries: u32,
}

impl Session {
    async fn query(&mut self, sql: &str) -> String {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.queries += 1;
        format!("session {} ran `{sql}` ({} so far)", self.id, self.queries)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("store unavailable")]
struct StoreDown;

#[derive(Default)]
struct InMemoryStore {
    next_id: AtomicU64,
}

impl Connector for InMemoryStore {
    type Connection = Session;
    type Error = StoreDown;

    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Session, StoreDown> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            endpoint = %descriptor.endpoint,
            user = %descriptor.credentials.username,
            session = id,
            "opened session"
        );
        Ok(Session { id, queries: 0 })
    }

    async fn close(&self, conn: Session) {
        tracing::info!(session = conn.id, queries = conn.queries, "closed session");
    }

    async fn is_valid(&self, conn: &Session) -> Result<bool, StoreDown> {
        Ok(conn.queries < 1_000)
    }
}

static POOL: PoolCell<InMemoryStore> = PoolCell::new();

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log = sluice_log::auto_init()?;

    let descriptor = ConnectionDescriptor::new(
        "mem://inventory",
        Credentials::new("worker", "not-a-real-password"),
        5,
    )
    .with_warmup(Warmup::Eager)
    .with_acquire_timeout(Duration::from_secs(2));
    POOL.set(Pool::connect(InMemoryStore::default(), descriptor).await?)?;

    let mut workers = Vec::new();
    for worker in 0..10 {
        workers.push(tokio::spawn(async move {
            let pool = POOL.get()?;
            for round in 0..3 {
                let mut conn = pool.acquire_default().await?;
                let line = conn
                    .query(&format!("SELECT * FROM stock WHERE shard = {worker} -- round {round}"))
                    .await;
                tracing::info!(worker, "{line}");
                pool.release(conn).await?;
            }
            Ok::<_, sluice_pool::PoolError>(())
        }));
    }
    for worker in workers {
        worker.await??;
    }

    let pool = POOL.get()?;
    let stats = pool.stats();
    tracing::info!(
        created = stats.created,
        acquisitions = stats.total_acquisitions,
        timeouts = stats.timeouts,
        "all workers done"
    );

    let report = pool.shutdown(Duration::from_secs(1)).await?;
    tracing::info!(?report, "pool shut down");
    Ok(())
}
