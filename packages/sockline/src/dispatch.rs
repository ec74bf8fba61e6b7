//! Event dispatch: the handler registry and per-message routing.
//!
//! Handler shapes form a closed set of four variants, tagged at registration
//! time. Argument decoding and reply serialization are baked into the stored
//! closure, so dispatch matches on the tag instead of inspecting types at
//! call time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::Error;
use crate::protocol::Message;

/// Fired once per channel after a successful Open handshake.
pub const ON_CONNECTION: &str = "connection";
/// Fired exactly once per channel when it closes.
pub const ON_DISCONNECTION: &str = "disconnection";
/// Conventional event name for application-level error reporting.
pub const ON_ERROR: &str = "error";

type PlainFn = Box<dyn Fn(&Arc<Channel>) + Send + Sync>;
type TypedFn = Box<dyn Fn(&Arc<Channel>, &str) -> Result<(), serde_json::Error> + Send + Sync>;
type PlainReplyFn = Box<dyn Fn(&Arc<Channel>) -> Result<String, serde_json::Error> + Send + Sync>;
type TypedReplyFn =
    Box<dyn Fn(&Arc<Channel>, &str) -> Result<String, serde_json::Error> + Send + Sync>;
type LifecycleFn = dyn Fn(&Arc<Channel>) + Send + Sync;

/// Validated shape of a registered handler. Typed variants decode the raw
/// args payload inside the closure; reply variants return the serialized
/// reply value.
pub(crate) enum Handler {
    Plain(PlainFn),
    Typed(TypedFn),
    PlainReply(PlainReplyFn),
    TypedReply(TypedReplyFn),
}

impl Handler {
    pub(crate) fn accepts_arg(&self) -> bool {
        matches!(self, Handler::Typed(_) | Handler::TypedReply(_))
    }

    pub(crate) fn produces_reply(&self) -> bool {
        matches!(self, Handler::PlainReply(_) | Handler::TypedReply(_))
    }

    /// Invoke for a one-way message; any reply value is discarded.
    fn invoke(&self, channel: &Arc<Channel>, raw_args: &str) -> Result<(), serde_json::Error> {
        match self {
            Handler::Plain(f) => {
                f(channel);
                Ok(())
            }
            Handler::Typed(f) => f(channel, raw_args),
            Handler::PlainReply(f) => f(channel).map(|_| ()),
            Handler::TypedReply(f) => f(channel, raw_args).map(|_| ()),
        }
    }
}

/// Registry mapping event names to handler descriptors, plus the two
/// distinguished lifecycle hooks. All access goes through its own locking;
/// shared freely across channels.
#[derive(Default)]
pub struct DispatchTable {
    handlers: RwLock<HashMap<String, Arc<Handler>>>,
    on_connection: RwLock<Option<Arc<LifecycleFn>>>,
    on_disconnection: RwLock<Option<Arc<LifecycleFn>>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler that takes no argument and produces no reply.
    /// Overwrites any prior registration for the same name.
    pub fn on<F>(&self, method: &str, f: F) -> Result<(), Error>
    where
        F: Fn(&Arc<Channel>) + Send + Sync + 'static,
    {
        self.register(method, Handler::Plain(Box::new(f)))
    }

    /// Register a handler that takes one typed argument, decoded from the
    /// message's args payload.
    pub fn on_typed<A, F>(&self, method: &str, f: F) -> Result<(), Error>
    where
        A: DeserializeOwned,
        F: Fn(&Arc<Channel>, A) + Send + Sync + 'static,
    {
        self.register(
            method,
            Handler::Typed(Box::new(move |channel, raw| {
                let arg: A = serde_json::from_str(raw)?;
                f(channel, arg);
                Ok(())
            })),
        )
    }

    /// Register a no-argument handler whose return value answers AckRequests.
    pub fn on_ack<R, F>(&self, method: &str, f: F) -> Result<(), Error>
    where
        R: Serialize,
        F: Fn(&Arc<Channel>) -> R + Send + Sync + 'static,
    {
        self.register(
            method,
            Handler::PlainReply(Box::new(move |channel| serde_json::to_string(&f(channel)))),
        )
    }

    /// Register a typed-argument handler whose return value answers
    /// AckRequests.
    pub fn on_typed_ack<A, R, F>(&self, method: &str, f: F) -> Result<(), Error>
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(&Arc<Channel>, A) -> R + Send + Sync + 'static,
    {
        self.register(
            method,
            Handler::TypedReply(Box::new(move |channel, raw| {
                let arg: A = serde_json::from_str(raw)?;
                serde_json::to_string(&f(channel, arg))
            })),
        )
    }

    /// Dedicated hook invoked before any user handler on `connection`.
    pub fn set_on_connection<F>(&self, f: F)
    where
        F: Fn(&Arc<Channel>) + Send + Sync + 'static,
    {
        *self.on_connection.write().expect("hook lock poisoned") = Some(Arc::new(f));
    }

    /// Dedicated hook invoked before any user handler on `disconnection`.
    pub fn set_on_disconnection<F>(&self, f: F)
    where
        F: Fn(&Arc<Channel>) + Send + Sync + 'static,
    {
        *self.on_disconnection.write().expect("hook lock poisoned") = Some(Arc::new(f));
    }

    fn register(&self, method: &str, handler: Handler) -> Result<(), Error> {
        if method.is_empty() {
            return Err(Error::Registration("event name must not be empty".into()));
        }
        self.handlers
            .write()
            .expect("handler map poisoned")
            .insert(method.to_string(), Arc::new(handler));
        Ok(())
    }

    pub(crate) fn find(&self, method: &str) -> Option<Arc<Handler>> {
        self.handlers
            .read()
            .expect("handler map poisoned")
            .get(method)
            .cloned()
    }

    /// Fire a connection/disconnection lifecycle event: the dedicated hook
    /// first, then any user-registered handler under the same event name
    /// with an empty argument. Neither existing is an error.
    pub fn fire_lifecycle(&self, channel: &Arc<Channel>, event: &str) {
        let hook = match event {
            ON_CONNECTION => self
                .on_connection
                .read()
                .expect("hook lock poisoned")
                .clone(),
            ON_DISCONNECTION => self
                .on_disconnection
                .read()
                .expect("hook lock poisoned")
                .clone(),
            _ => None,
        };
        if let Some(hook) = hook {
            hook(channel);
        }
        if let Some(handler) = self.find(event) {
            if let Err(error) = handler.invoke(channel, "null") {
                debug!(event, %error, "lifecycle handler rejected empty argument");
            }
        }
    }

    /// Route one decoded message. Per-message failures are local: an unknown
    /// event name, an argument that fails to decode, or a reply for an
    /// unknown ack id all drop the message without touching the channel.
    pub fn dispatch(&self, channel: &Arc<Channel>, msg: Message) {
        match msg {
            Message::Emit { method, args } => {
                let Some(handler) = self.find(&method) else {
                    debug!(%method, "no handler registered, dropping emit");
                    return;
                };
                let raw = args.as_deref().unwrap_or("null");
                if let Err(error) = handler.invoke(channel, raw) {
                    debug!(%method, %error, "argument decode failed, dropping emit");
                }
            }
            Message::AckRequest {
                ack_id,
                method,
                args,
            } => {
                let Some(handler) = self.find(&method) else {
                    debug!(%method, ack_id, "no handler registered, dropping ack request");
                    return;
                };
                if !handler.produces_reply() {
                    debug!(%method, ack_id, "handler produces no reply, dropping ack request");
                    return;
                }
                let raw = args.as_deref().unwrap_or("null");
                let reply = match &*handler {
                    Handler::PlainReply(f) => f(channel),
                    Handler::TypedReply(f) => f(channel, raw),
                    _ => unreachable!("checked produces_reply"),
                };
                match reply {
                    Ok(result) => {
                        let response = Message::AckResponse {
                            ack_id,
                            args: Some(result),
                        };
                        if let Err(error) = channel.enqueue(&response) {
                            warn!(%method, ack_id, %error, "failed to enqueue ack response");
                        }
                    }
                    Err(error) => {
                        debug!(%method, ack_id, %error, "argument decode failed, dropping ack request");
                    }
                }
            }
            Message::AckResponse { ack_id, args } => {
                match channel.correlator().take_waiter(ack_id) {
                    Some(waiter) => {
                        // Receiver may have given up at its deadline already.
                        let _ = waiter.send(args.unwrap_or_else(|| "null".to_string()));
                    }
                    None => debug!(ack_id, "no waiter for ack reply, discarding"),
                }
            }
            other => debug!(kind = ?other.kind(), "message kind not routed through dispatch"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_tags_handler_shapes() {
        let table = DispatchTable::new();
        table.on("plain", |_| {}).unwrap();
        table.on_typed::<String, _>("typed", |_, _| {}).unwrap();
        table.on_ack("plain_reply", |_| 42u32).unwrap();
        table
            .on_typed_ack::<String, _, _>("typed_reply", |_, s| s)
            .unwrap();

        let shape = |name: &str| {
            let h = table.find(name).unwrap();
            (h.accepts_arg(), h.produces_reply())
        };
        assert_eq!(shape("plain"), (false, false));
        assert_eq!(shape("typed"), (true, false));
        assert_eq!(shape("plain_reply"), (false, true));
        assert_eq!(shape("typed_reply"), (true, true));
    }

    #[test]
    fn registration_rejects_empty_event_name() {
        let table = DispatchTable::new();
        assert!(matches!(
            table.on("", |_| {}),
            Err(Error::Registration(_))
        ));
    }

    #[test]
    fn re_registration_overwrites() {
        let table = DispatchTable::new();
        table.on("event", |_| {}).unwrap();
        table.on_ack("event", |_| 1u8).unwrap();
        assert!(table.find("event").unwrap().produces_reply());
    }
}
