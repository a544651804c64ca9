//! Pipelined request/response engine for a single destination.
//!
//! A [`PipelineClient`] keeps up to `max_conns` persistent connections
//! ("slots") to one destination and writes queued requests to whichever slot
//! is free without waiting for earlier responses (HTTP/1.1 pipelining). Each
//! slot writes in strict FIFO order and its read loop consumes exactly one
//! response per written request in that same order, so every response is
//! matched back to the request that produced it. No ordering is guaranteed
//! across slots.
//!
//! The pending-request count (queued + written-but-unanswered) is bounded by
//! `max_pending_requests`; submissions past the bound fail immediately
//! instead of queueing without limit.

mod slot;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::trace;

use crate::base::Error;
use crate::client::{self, ClientOptions};
use crate::socket::dial::{Destination, Dialer, NetDialer};
use crate::wire::{self, Headers};

/// Configuration for a [`PipelineClient`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub destination: Destination,
    /// Size of the slot pool. Clamped to at least 1.
    pub max_conns: usize,
    /// Global backpressure bound on queued + in-flight requests.
    /// Clamped to at least 1.
    pub max_pending_requests: usize,
    /// Deadline for each request's response, measured from submission.
    /// `None` waits without bound.
    pub read_timeout: Option<Duration>,
    /// Bound on dial + TLS handshake per slot connection.
    pub connect_timeout: Option<Duration>,
}

impl PipelineOptions {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            max_conns: 1,
            max_pending_requests: 1024,
            read_timeout: None,
            connect_timeout: None,
        }
    }
}

/// A caller-submitted unit of work. Exactly one response or one error is
/// delivered per pending request.
pub(crate) struct Pending {
    /// Serialized request bytes, fixed at submission time.
    pub(crate) wire: Vec<u8>,
    pub(crate) skip_body: bool,
    /// Submission time. The read timeout counts from here, not from when a
    /// slot starts reading this response, so a request queued behind slow
    /// responses cannot wait several timeouts' worth.
    pub(crate) enqueued_at: Instant,
    tx: oneshot::Sender<Result<wire::Response, Error>>,
}

struct State {
    queue: VecDeque<Pending>,
    /// Queued plus written-but-unanswered, across all slots.
    pending: usize,
}

pub(crate) struct Shared {
    dest: Destination,
    max_pending: usize,
    read_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    state: Mutex<State>,
    work: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, pending: Pending) -> Result<(), Error> {
        {
            let mut state = self.lock();
            if state.pending >= self.max_pending {
                return Err(Error::PipelineOverflow);
            }
            state.pending += 1;
            state.queue.push_back(pending);
        }
        self.work.notify_one();
        Ok(())
    }

    /// Wait for the next queued request. `None` means the client was dropped
    /// and the slot should wind down.
    pub(crate) async fn pop_queued(&self) -> Option<Pending> {
        loop {
            let notified = self.work.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(pending) = state.queue.pop_front() {
                    if !state.queue.is_empty() {
                        // Pass the wakeup along so other idle slots drain
                        // the backlog too.
                        self.work.notify_one();
                    }
                    return Some(pending);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Deliver the result for a pending request and free its capacity.
    pub(crate) fn complete(&self, pending: Pending, result: Result<wire::Response, Error>) {
        {
            let mut state = self.lock();
            state.pending -= 1;
        }
        // The caller may have stopped waiting; nothing to do then.
        let _ = pending.tx.send(result);
    }

    pub(crate) fn destination(&self) -> &Destination {
        &self.dest
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub(crate) fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }
}

/// Pipelining client bound to one destination.
///
/// Share it across tasks with an `Arc`; dropping the last handle winds down
/// the slot tasks. Must be created inside a tokio runtime.
pub struct PipelineClient<D: Dialer = NetDialer> {
    shared: Arc<Shared>,
    _dialer: std::marker::PhantomData<D>,
}

impl PipelineClient<NetDialer> {
    pub fn new(options: PipelineOptions) -> Self {
        Self::with_dialer(options, NetDialer::new())
    }
}

impl<D: Dialer> PipelineClient<D> {
    pub fn with_dialer(options: PipelineOptions, dialer: D) -> Self {
        let max_conns = options.max_conns.max(1);
        let shared = Arc::new(Shared {
            dest: options.destination,
            max_pending: options.max_pending_requests.max(1),
            read_timeout: options.read_timeout,
            connect_timeout: options.connect_timeout,
            state: Mutex::new(State { queue: VecDeque::new(), pending: 0 }),
            work: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let dialer = Arc::new(dialer);
        for id in 0..max_conns {
            tokio::spawn(slot::run_slot(Arc::clone(&shared), Arc::clone(&dialer), id));
        }
        Self { shared, _dialer: std::marker::PhantomData }
    }

    /// Submit a request and wait for its matched response.
    ///
    /// Fails immediately with [`Error::PipelineOverflow`] when
    /// `max_pending_requests` is reached. Once written to a slot a request
    /// runs to response, error, or read timeout; there is no cancellation.
    pub async fn do_request(&self, req: wire::Request) -> Result<wire::Response, Error> {
        let (tx, rx) = oneshot::channel();
        let pending = Pending {
            wire: req.to_bytes(),
            skip_body: req.method.eq_ignore_ascii_case("HEAD"),
            enqueued_at: Instant::now(),
            tx,
        };
        self.shared.submit(pending)?;
        trace!(dest = %self.shared.dest, "request queued");
        match rx.await {
            Ok(result) => result,
            // The owning slot went away without delivering; treat as a
            // connection-level failure.
            Err(_) => Err(Error::ConnectionClosed),
        }
    }

    /// Queued plus in-flight request count, for introspection.
    pub fn pending_requests(&self) -> usize {
        self.shared.lock().pending
    }

    pub async fn get(&self, url: &str) -> Result<client::Response, Error> {
        self.do_raw("GET", url, "", &Headers::new(), None).await
    }

    pub async fn head(&self, url: &str) -> Result<client::Response, Error> {
        self.do_raw("HEAD", url, "", &Headers::new(), None).await
    }

    pub async fn post(
        &self,
        url: &str,
        content_type: &str,
        body: impl Into<Bytes>,
    ) -> Result<client::Response, Error> {
        let mut headers = Headers::new();
        headers.append("Content-Type", content_type);
        self.do_raw("POST", url, "", &headers, Some(body.into())).await
    }

    /// Adapter-translated variant of [`Self::do_request`]: the same host,
    /// raw-path, and automatic-header rules as [`crate::Client::do_raw`],
    /// and the same gzip decoding on the way back. The request always goes
    /// to this client's configured destination; the URL only shapes the
    /// request line and `Host` header. Redirects are returned as-is, since
    /// following one mid-pipeline would reorder responses.
    pub async fn do_raw(
        &self,
        method: &str,
        url: &str,
        raw_path: &str,
        headers: &Headers,
        body: Option<Bytes>,
    ) -> Result<client::Response, Error> {
        let (_, request) =
            client::build_request(method, url, raw_path, headers, body, &ClientOptions::default())?;
        let response = self.do_request(request).await?;
        client::decode_response(response)
    }
}

impl<D: Dialer> Drop for PipelineClient<D> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.work.notify_waiters();
    }
}
