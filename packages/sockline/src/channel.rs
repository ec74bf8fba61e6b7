//! Per-connection channel: outbound queue, the three lifetime loops, and
//! the request/ack surface.
//!
//! Each live channel runs exactly one inbound loop, one outbound loop, and
//! one keepalive loop. The inbound loop is the only reader of the transport,
//! the outbound loop the only writer, and the bounded outbound queue is the
//! single point of mutation for "what to send next".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, warn};

use crate::ack::AckCorrelator;
use crate::dispatch::{DispatchTable, ON_CONNECTION, ON_DISCONNECTION};
use crate::error::Error;
use crate::protocol::{Header, Message};
use crate::transport::Connection;

/// Hard limit on pending outbound frames per channel.
pub const QUEUE_CAPACITY: usize = 10_000;

enum OutFrame {
    Frame(String),
    /// Terminal sentinel injected by close so the outbound loop exits
    /// cleanly instead of blocking on an empty queue forever.
    Shutdown,
}

/// Bounded multi-producer single-consumer frame queue. Pushes past capacity
/// are refused rather than blocking; the outbound loop enforces the
/// close-on-overflow policy from its occupancy samples.
#[derive(Default)]
struct OutboundQueue {
    frames: Mutex<VecDeque<OutFrame>>,
    ready: Notify,
}

impl OutboundQueue {
    fn push(&self, frame: OutFrame) -> Result<(), Error> {
        {
            let mut frames = self.frames.lock().expect("outbound queue poisoned");
            if frames.len() >= QUEUE_CAPACITY {
                return Err(Error::Overflow);
            }
            frames.push_back(frame);
        }
        self.ready.notify_one();
        Ok(())
    }

    /// The sentinel bypasses the capacity check so shutdown always lands.
    fn push_sentinel(&self) {
        self.frames
            .lock()
            .expect("outbound queue poisoned")
            .push_back(OutFrame::Shutdown);
        self.ready.notify_one();
    }

    fn len(&self) -> usize {
        self.frames.lock().expect("outbound queue poisoned").len()
    }

    fn clear(&self) {
        self.frames.lock().expect("outbound queue poisoned").clear();
    }

    async fn pop(&self) -> OutFrame {
        loop {
            if let Some(frame) = self
                .frames
                .lock()
                .expect("outbound queue poisoned")
                .pop_front()
            {
                return frame;
            }
            self.ready.notified().await;
        }
    }
}

/// One live connection's session state.
///
/// Created alive; transitions to not-alive exactly once via [`Channel::close`]
/// and is terminal afterwards — no operation revives it.
pub struct Channel {
    conn: Arc<dyn Connection>,
    events: Arc<DispatchTable>,
    out: OutboundQueue,
    alive: Mutex<bool>,
    header: RwLock<Header>,
    acks: AckCorrelator,
    overflowed: AtomicBool,
}

impl Channel {
    pub fn new(conn: Arc<dyn Connection>, events: Arc<DispatchTable>) -> Arc<Channel> {
        Arc::new(Channel {
            conn,
            events,
            out: OutboundQueue::default(),
            alive: Mutex::new(true),
            header: RwLock::new(Header::default()),
            acks: AckCorrelator::new(),
            overflowed: AtomicBool::new(false),
        })
    }

    /// Session id from the Open handshake; empty until one is processed.
    pub fn id(&self) -> String {
        self.header.read().expect("header poisoned").sid.clone()
    }

    /// Handshake header as last received.
    pub fn header(&self) -> Header {
        self.header.read().expect("header poisoned").clone()
    }

    pub fn is_alive(&self) -> bool {
        *self.alive.lock().expect("alive flag poisoned")
    }

    /// Backpressure diagnostic: true while outbound occupancy sits above
    /// half capacity.
    pub fn is_overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }

    pub(crate) fn correlator(&self) -> &AckCorrelator {
        &self.acks
    }

    /// Queue one message for the outbound loop.
    pub(crate) fn enqueue(&self, msg: &Message) -> Result<(), Error> {
        if !self.is_alive() {
            return Err(Error::NotAlive);
        }
        self.out.push(OutFrame::Frame(msg.encode()))
    }

    /// Send a one-way event.
    pub fn emit<A: Serialize>(&self, method: &str, arg: &A) -> Result<(), Error> {
        let args = serde_json::to_string(arg)?;
        self.enqueue(&Message::Emit {
            method: method.to_string(),
            args: Some(args),
        })
    }

    /// Send a request and await its correlated reply.
    ///
    /// The waiter is removed on whichever comes first, reply delivery or the
    /// deadline; a reply arriving after the deadline is discarded silently.
    pub async fn ack<A, R>(&self, method: &str, arg: &A, deadline: Duration) -> Result<R, Error>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let args = serde_json::to_string(arg)?;
        let ack_id = self.acks.next_id();
        let (tx, rx) = oneshot::channel();
        self.acks.add_waiter(ack_id, tx);

        let request = Message::AckRequest {
            ack_id,
            method: method.to_string(),
            args: Some(args),
        };
        if let Err(error) = self.enqueue(&request) {
            self.acks.remove_waiter(ack_id);
            return Err(error);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(payload)) => Ok(serde_json::from_str(&payload)?),
            Ok(Err(_)) => {
                self.acks.remove_waiter(ack_id);
                Err(Error::NotAlive)
            }
            Err(_) => {
                self.acks.remove_waiter(ack_id);
                Err(Error::AckTimeout(deadline))
            }
        }
    }

    /// Tear the channel down. Idempotent and one-shot: the first caller
    /// closes the transport, drains the queue, injects the terminal sentinel
    /// and fires the disconnection event; later callers return immediately.
    pub async fn close(self: &Arc<Self>, cause: Option<Error>) {
        {
            let mut alive = self.alive.lock().expect("alive flag poisoned");
            if !*alive {
                return;
            }
            *alive = false;
        }
        match &cause {
            Some(error) => warn!(sid = %self.id(), %error, "closing channel"),
            None => debug!(sid = %self.id(), "closing channel"),
        }

        self.conn.close().await;
        self.out.clear();
        self.out.push_sentinel();
        // Release callers parked in `ack`; their receivers fail over to
        // NotAlive instead of waiting out their deadlines.
        self.acks.drain();
        self.events.fire_lifecycle(self, ON_DISCONNECTION);
        self.overflowed.store(false, Ordering::Relaxed);
    }
}

/// Drive a channel to completion: spawns the outbound and keepalive loops
/// and runs the inbound loop in place. Returns once the connection has
/// ended and the outbound loop has drained out.
pub async fn run(channel: Arc<Channel>) {
    let out = tokio::spawn(out_loop(channel.clone()));
    tokio::spawn(keepalive_loop(channel.clone()));
    in_loop(&channel).await;
    let _ = out.await;
}

/// Inbound loop: the single reader. Framing-level failures are fatal to the
/// channel; per-message handling is fanned out so handler execution never
/// blocks subsequent reads.
async fn in_loop(channel: &Arc<Channel>) {
    loop {
        let raw = match channel.conn.get_message().await {
            Ok(raw) => raw,
            Err(error) => {
                channel.close(Some(Error::Transport(error))).await;
                return;
            }
        };
        let msg = match Message::decode(&raw) {
            Ok(msg) => msg,
            Err(error) => {
                channel.close(Some(Error::Protocol(error))).await;
                return;
            }
        };

        match msg {
            Message::Open { payload } => match Header::parse(&payload) {
                Ok(header) => {
                    *channel.header.write().expect("header poisoned") = header;
                    channel.events.fire_lifecycle(channel, ON_CONNECTION);
                }
                Err(error) => {
                    channel.close(Some(error)).await;
                    return;
                }
            },
            Message::Ping => {
                if let Err(error) = channel.enqueue(&Message::Pong) {
                    debug!(%error, "failed to enqueue pong");
                }
            }
            Message::Pong => {}
            Message::Close | Message::Empty => {}
            msg => {
                let channel = channel.clone();
                tokio::spawn(async move {
                    channel.events.dispatch(&channel, msg);
                });
            }
        }
    }
}

/// Outbound loop: the single consumer and transport writer. Samples queue
/// occupancy before each dequeue to enforce the backpressure policy.
async fn out_loop(channel: Arc<Channel>) {
    loop {
        let occupancy = channel.out.len();
        if occupancy >= QUEUE_CAPACITY - 1 {
            channel.close(Some(Error::Overflow)).await;
            return;
        } else if occupancy > QUEUE_CAPACITY / 2 {
            channel.overflowed.store(true, Ordering::Relaxed);
        } else {
            channel.overflowed.store(false, Ordering::Relaxed);
        }

        match channel.out.pop().await {
            OutFrame::Shutdown => return,
            OutFrame::Frame(raw) => {
                if let Err(error) = channel.conn.write_message(raw).await {
                    channel.close(Some(Error::Transport(error))).await;
                    return;
                }
            }
        }
    }
}

/// Keepalive loop: enqueues a Ping on the transport's configured interval
/// until it observes the channel is no longer alive.
async fn keepalive_loop(channel: Arc<Channel>) {
    let mut ticker = tokio::time::interval(channel.conn.ping_params().interval);
    // The first tick of a tokio interval completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if !channel.is_alive() {
            return;
        }
        if channel.enqueue(&Message::Ping).is_err() {
            return;
        }
    }
}
