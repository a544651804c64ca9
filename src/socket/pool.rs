//! Idle-connection cache keyed by destination.
//!
//! Amortizes connection setup for single-shot requests. A connection is
//! either checked out (exclusively owned by one caller) or idle in the cache,
//! never both; Rust ownership enforces the exclusive part, and the pool
//! tracks checked-out ids so that releasing a connection it never handed out
//! is rejected instead of corrupting the cache.
//!
//! Idle connections are never health-checked or expired; staleness is the
//! caller's responsibility.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;

use crate::base::Error;
use crate::socket::dial::{Destination, Dialer, NetDialer};
use crate::socket::stream::BoxedStream;
use crate::wire;

/// A checked-out connection: the transport handle plus the single-shot
/// request capability. Hand it back with [`ConnectionPool::release`] to make
/// it reusable, or drop it to close it.
pub struct PooledConn {
    id: u64,
    dest: Destination,
    pool: Weak<Mutex<PoolInner>>,
    // BufReader persists across requests so bytes buffered past one response
    // are not lost before the next.
    stream: BufReader<BoxedStream>,
}

impl std::fmt::Debug for PooledConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConn")
            .field("id", &self.id)
            .field("dest", &self.dest)
            .finish_non_exhaustive()
    }
}

impl PooledConn {
    pub fn destination(&self) -> &Destination {
        &self.dest
    }

    /// One request/response exchange over this connection.
    pub async fn do_request(&mut self, req: &wire::Request) -> Result<wire::Response, Error> {
        let bytes = req.to_bytes();
        self.stream.write_all(&bytes).await.map_err(|e| Error::Write(e.to_string()))?;
        self.stream.flush().await.map_err(|e| Error::Write(e.to_string()))?;
        wire::read_response(&mut self.stream, req.method.eq_ignore_ascii_case("HEAD")).await
    }
}

impl Drop for PooledConn {
    // Dropping a checked-out connection is how callers discard one after a
    // failed exchange; the pool must forget the checkout or its bookkeeping
    // grows with every discarded connection.
    fn drop(&mut self) {
        if let Some(inner) = self.pool.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.checked_out.remove(&self.id);
        }
    }
}

#[derive(Default)]
struct PoolInner {
    idle: HashMap<Destination, Vec<PooledConn>>,
    checked_out: HashSet<u64>,
    next_id: u64,
}

/// Caches idle, previously-used connections per destination.
pub struct ConnectionPool<D: Dialer = NetDialer> {
    dialer: D,
    // One lock covers lookup, pop and append; dialing happens outside it so a
    // slow handshake never blocks unrelated destinations. Connections hold a
    // Weak to this state so dropping one can clear its checkout entry.
    inner: Arc<Mutex<PoolInner>>,
}

impl ConnectionPool<NetDialer> {
    pub fn new() -> Self {
        Self::with_dialer(NetDialer::new())
    }
}

impl Default for ConnectionPool<NetDialer> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Dialer> ConnectionPool<D> {
    pub fn with_dialer(dialer: D) -> Self {
        Self { dialer, inner: Arc::new(Mutex::new(PoolInner::default())) }
    }

    /// Pop an idle connection for `dest`, or dial a new one. A failed dial
    /// returns the error and no connection.
    pub async fn acquire(
        &self,
        dest: &Destination,
        timeout: Option<Duration>,
    ) -> Result<PooledConn, Error> {
        {
            let mut inner = self.lock();
            if let Some(conn) = inner.idle.get_mut(dest).and_then(Vec::pop) {
                inner.checked_out.insert(conn.id);
                debug!(dest = %dest, "pool hit, reusing connection");
                return Ok(conn);
            }
        }

        debug!(dest = %dest, "pool miss, dialing");
        let stream = self.dialer.dial(dest, timeout).await?;

        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.checked_out.insert(id);
        Ok(PooledConn {
            id,
            dest: dest.clone(),
            pool: Arc::downgrade(&self.inner),
            stream: BufReader::new(stream),
        })
    }

    /// Return a checked-out connection to the idle cache. Never closes it.
    /// Releasing a connection this pool did not hand out is a caller error.
    pub fn release(&self, conn: PooledConn) -> Result<(), Error> {
        let mut inner = self.lock();
        if !inner.checked_out.remove(&conn.id) {
            return Err(Error::ForeignConnection);
        }
        inner.idle.entry(conn.dest.clone()).or_default().push(conn);
        Ok(())
    }

    /// Idle connections currently cached for `dest`.
    pub fn idle_count(&self, dest: &Destination) -> usize {
        self.lock().idle.get(dest).map_or(0, Vec::len)
    }

    /// Connections currently checked out of this pool.
    pub fn checked_out_count(&self) -> usize {
        self.lock().checked_out.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::dial::Scheme;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Hands out one end of an in-memory pipe and counts dials.
    struct FakeDialer {
        dials: Arc<AtomicUsize>,
    }

    impl Dialer for FakeDialer {
        async fn dial(
            &self,
            _dest: &Destination,
            _timeout: Option<Duration>,
        ) -> Result<BoxedStream, Error> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let (ours, _theirs) = tokio::io::duplex(64);
            Ok(Box::new(ours))
        }
    }

    struct FailingDialer;

    impl Dialer for FailingDialer {
        async fn dial(
            &self,
            _dest: &Destination,
            _timeout: Option<Duration>,
        ) -> Result<BoxedStream, Error> {
            Err(Error::Dial("refused".to_string()))
        }
    }

    fn dest() -> Destination {
        Destination::new(Scheme::Http, "target:80")
    }

    #[tokio::test]
    async fn test_release_then_acquire_reuses_without_dial() {
        let dials = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::with_dialer(FakeDialer { dials: Arc::clone(&dials) });

        let conn = pool.acquire(&dest(), None).await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 1);

        pool.release(conn).unwrap();
        assert_eq!(pool.idle_count(&dest()), 1);
        assert_eq!(pool.checked_out_count(), 0);

        let _conn = pool.acquire(&dest(), None).await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 1, "second acquire must not dial");
        assert_eq!(pool.idle_count(&dest()), 0);
    }

    #[tokio::test]
    async fn test_distinct_destinations_do_not_share_connections() {
        let dials = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::with_dialer(FakeDialer { dials: Arc::clone(&dials) });

        let a = pool.acquire(&dest(), None).await.unwrap();
        pool.release(a).unwrap();

        let other = Destination::new(Scheme::Http, "elsewhere:80");
        let _b = pool.acquire(&other, None).await.unwrap();
        assert_eq!(dials.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_count(&dest()), 1);
    }

    #[tokio::test]
    async fn test_dial_error_propagates_with_no_connection() {
        let pool = ConnectionPool::with_dialer(FailingDialer);
        let err = pool.acquire(&dest(), None).await.unwrap_err();
        assert_eq!(err, Error::Dial("refused".to_string()));
        assert_eq!(pool.idle_count(&dest()), 0);
    }

    #[tokio::test]
    async fn test_dropped_connection_forgets_its_checkout() {
        let dials = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::with_dialer(FakeDialer { dials });

        let conn = pool.acquire(&dest(), None).await.unwrap();
        assert_eq!(pool.checked_out_count(), 1);

        // The discard path: callers drop instead of releasing after a failed
        // exchange. The checkout entry must not outlive the connection.
        drop(conn);
        assert_eq!(pool.checked_out_count(), 0);
        assert_eq!(pool.idle_count(&dest()), 0);
    }

    #[tokio::test]
    async fn test_releasing_foreign_connection_is_rejected() {
        let dials = Arc::new(AtomicUsize::new(0));
        let pool_a = ConnectionPool::with_dialer(FakeDialer { dials: Arc::clone(&dials) });
        let pool_b = ConnectionPool::with_dialer(FakeDialer { dials });

        let conn = pool_a.acquire(&dest(), None).await.unwrap();
        let err = pool_b.release(conn).unwrap_err();
        assert_eq!(err, Error::ForeignConnection);
        assert_eq!(pool_b.idle_count(&dest()), 0);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_dial_independently() {
        let dials = Arc::new(AtomicUsize::new(0));
        let pool =
            Arc::new(ConnectionPool::with_dialer(FakeDialer { dials: Arc::clone(&dials) }));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move { pool.acquire(&dest(), None).await }));
        }
        let mut conns = Vec::new();
        for h in handles {
            conns.push(h.await.unwrap().unwrap());
        }
        assert_eq!(dials.load(Ordering::SeqCst), 4);

        for conn in conns {
            pool.release(conn).unwrap();
        }
        assert_eq!(pool.idle_count(&dest()), 4);
    }
}
