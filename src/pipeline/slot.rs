//! Per-slot write and read loops.
//!
//! A slot cycles through generations: dial, pipeline requests over the
//! connection, tear down on the first error, redial lazily when the next
//! request arrives. Within a generation the write loop (the slot task
//! itself) sends each written request into an in-order channel that the
//! spawned read loop consumes, one response per request. The channel is the
//! slot's in-flight FIFO: whatever is in it when the generation ends has
//! been written but not answered, and must be failed rather than left
//! dangling, because a response read after a timeout or transport error can
//! no longer be attributed to the right request.
//!
//! Queued-but-unwritten requests are unaffected by a teardown; they stay in
//! the client's shared queue and are picked up by another slot or by this
//! one after it redials.

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::base::Error;
use crate::pipeline::{Pending, Shared};
use crate::socket::dial::Dialer;
use crate::socket::stream::BoxedStream;
use crate::wire;

pub(super) async fn run_slot<D: Dialer>(shared: Arc<Shared>, dialer: Arc<D>, id: usize) {
    loop {
        let Some(first) = shared.pop_queued().await else {
            return;
        };
        let stream = match dialer.dial(shared.destination(), shared.connect_timeout()).await {
            Ok(stream) => stream,
            Err(e) => {
                // The dial was on behalf of this one request; fail it and
                // let the next request trigger a fresh dial.
                shared.complete(first, Err(e));
                continue;
            }
        };
        debug!(slot = id, dest = %shared.destination(), "slot connected");
        serve_connection(&shared, stream, first, id).await;
        debug!(slot = id, "slot torn down");
    }
}

/// Run one connection generation. Returns when the connection is no longer
/// usable or the client is winding down.
async fn serve_connection(shared: &Arc<Shared>, stream: BoxedStream, first: Pending, id: usize) {
    let (rd, mut wr) = tokio::io::split(stream);
    let (in_flight_tx, in_flight_rx) = mpsc::unbounded_channel();
    let (broken_tx, broken_rx) = watch::channel(false);
    let mut reader =
        tokio::spawn(read_responses(Arc::clone(shared), in_flight_rx, rd, broken_rx, id));

    let mut leftover = None;
    let mut next = Some(first);
    loop {
        let pending = match next.take() {
            Some(pending) => pending,
            None => tokio::select! {
                biased;
                joined = &mut reader => {
                    // Read side hit an error or timeout; responses on this
                    // connection can no longer be trusted.
                    leftover = joined.ok();
                    break;
                }
                popped = shared.pop_queued() => match popped {
                    Some(pending) => pending,
                    None => {
                        // Client dropped: interrupt any in-progress read.
                        let _ = broken_tx.send(true);
                        break;
                    }
                },
            },
        };
        match write_request(&mut wr, &pending.wire).await {
            Ok(()) => {
                if let Err(mpsc::error::SendError(pending)) = in_flight_tx.send(pending) {
                    // Reader already returned; the write went to a dead
                    // connection.
                    shared.complete(pending, Err(Error::ConnectionClosed));
                    break;
                }
            }
            Err(e) => {
                warn!(slot = id, error = %e, "pipelined write failed");
                shared.complete(pending, Err(e));
                let _ = broken_tx.send(true);
                break;
            }
        }
    }

    // Close the in-flight FIFO, wait the reader out, and fail whatever it
    // never got to.
    drop(in_flight_tx);
    let mut remaining = match leftover {
        Some(rx) => rx,
        None => match reader.await {
            Ok(rx) => rx,
            Err(_) => return,
        },
    };
    remaining.close();
    while let Ok(pending) = remaining.try_recv() {
        shared.complete(pending, Err(Error::ConnectionClosed));
    }
}

async fn write_request(wr: &mut WriteHalf<BoxedStream>, bytes: &[u8]) -> Result<(), Error> {
    wr.write_all(bytes).await.map_err(|e| Error::Write(e.to_string()))?;
    wr.flush().await.map_err(|e| Error::Write(e.to_string()))
}

/// Sole reader of the slot's connection: one response per in-flight request,
/// in write order. Returns the in-flight receiver so the write side can fail
/// anything still unanswered. Stops at the first error, since a response
/// stream that lost sync would misattribute every later response.
async fn read_responses(
    shared: Arc<Shared>,
    mut in_flight: mpsc::UnboundedReceiver<Pending>,
    rd: ReadHalf<BoxedStream>,
    mut broken: watch::Receiver<bool>,
    id: usize,
) -> mpsc::UnboundedReceiver<Pending> {
    let mut rd = BufReader::new(rd);
    while let Some(pending) = in_flight.recv().await {
        // The deadline is anchored to submission: time already burned behind
        // earlier responses comes out of this request's budget.
        let deadline = shared
            .read_timeout()
            .filter(|t| !t.is_zero())
            .map(|t| pending.enqueued_at + t);
        let result = tokio::select! {
            result = read_one(&mut rd, pending.skip_body, deadline) => result,
            _ = broken.changed() => Err(Error::ConnectionClosed),
        };
        match result {
            Ok(response) => shared.complete(pending, Ok(response)),
            Err(e) => {
                debug!(slot = id, error = %e, "response read failed, invalidating slot");
                shared.complete(pending, Err(e));
                break;
            }
        }
    }
    in_flight
}

async fn read_one(
    rd: &mut BufReader<ReadHalf<BoxedStream>>,
    skip_body: bool,
    deadline: Option<Instant>,
) -> Result<wire::Response, Error> {
    match deadline {
        Some(deadline) => {
            match tokio::time::timeout_at(deadline, wire::read_response(rd, skip_body)).await {
                Ok(result) => result,
                Err(_) => Err(Error::ReadTimedOut),
            }
        }
        None => wire::read_response(rd, skip_body).await,
    }
}
