//! # Signal Bus
//!
//! Signals are named scalar values routed between modules by a per-instance unique identifier.
//! Producers publish values against an identifier, consumers subscribe to an identifier and
//! receive every value published after they subscribed.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Number of identifiers handed out so far, used to make every identifier unique.
static NUM_SIGNAL_IDS: AtomicU64 = AtomicU64::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Unique identifier of a signal.
///
/// The identifier carries the signal's qualified name (for instance `base.JogSpeed`) followed by
/// a process-wide counter, so two instances with the same name never collide.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalId(String);

/// An in-process signal bus.
///
/// Values are clamped to the signal's registered range (if any) before delivery. Subscribers whose
/// receiver has been dropped are removed on the next publish.
#[derive(Default)]
pub struct LocalSignalBus {
    inner: Mutex<BusInner>,
}

#[derive(Default)]
struct BusInner {
    subscribers: HashMap<SignalId, Vec<Subscriber>>,
    ranges: HashMap<SignalId, (f64, f64)>,
    names: HashMap<String, SignalId>,
}

/// Where a subscription delivers its values.
enum Subscriber {
    Plain(Sender<f64>),

    /// Values arrive with the identifier they were published on, so one channel can serve many
    /// signals and keep their publish order.
    Tagged(Sender<(SignalId, f64)>),
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Publish/subscribe access to the signal bus.
pub trait SignalBus {
    /// Make the signal findable by its name without subscribing to it.
    fn advertise(&self, id: &SignalId);

    /// Publish a new value on the signal.
    fn publish(&self, id: &SignalId, value: f64);

    /// Subscribe to the signal, values published from now on arrive on the returned receiver.
    fn subscribe(&self, id: &SignalId) -> Receiver<f64>;

    /// Subscribe to the signal, values published from now on are sent to `tx` tagged with `id`.
    fn subscribe_tagged(&self, id: &SignalId, tx: Sender<(SignalId, f64)>);

    /// Clamp every value published on the signal into `[min, max]`.
    fn set_range(&self, id: &SignalId, min: f64, max: f64);

    /// Drop every subscription to, and the name of, the signal.
    fn unsubscribe(&self, id: &SignalId);
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl SignalId {
    /// Create a new unique identifier for a signal with the given qualified name.
    pub fn new(name: &str) -> Self {
        let n = NUM_SIGNAL_IDS.fetch_add(1, Ordering::Relaxed);
        SignalId(format!("{}#{}", name, n))
    }

    /// The qualified name of the signal.
    pub fn name(&self) -> &str {
        match self.0.rfind('#') {
            Some(i) => &self.0[..i],
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl LocalSignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the identifier of a signal from its qualified name.
    pub fn lookup(&self, name: &str) -> Option<SignalId> {
        match self.inner.lock() {
            Ok(inner) => inner.names.get(name).cloned(),
            Err(_) => None,
        }
    }

    /// Publish on the signal with the given qualified name.
    ///
    /// Returns false if no signal has that name.
    pub fn publish_named(&self, name: &str, value: f64) -> bool {
        match self.lookup(name) {
            Some(id) => {
                self.publish(&id, value);
                true
            }
            None => false,
        }
    }

    fn add_subscriber(&self, id: &SignalId, sub: Subscriber) {
        match self.inner.lock() {
            Ok(mut inner) => {
                Self::register_name(&mut inner, id);
                inner
                    .subscribers
                    .entry(id.clone())
                    .or_insert_with(Vec::new)
                    .push(sub);
            }
            Err(_) => warn!("Signal bus lock poisoned, {} will receive nothing", id),
        }
    }

    fn register_name(inner: &mut BusInner, id: &SignalId) {
        if let Some(old) = inner.names.insert(id.name().to_string(), id.clone()) {
            if old != *id {
                warn!(
                    "Signal name {} now refers to {} instead of {}",
                    id.name(),
                    id,
                    old
                );
            }
        }
    }
}

impl SignalBus for LocalSignalBus {
    fn advertise(&self, id: &SignalId) {
        match self.inner.lock() {
            Ok(mut inner) => Self::register_name(&mut inner, id),
            Err(_) => warn!("Signal bus lock poisoned, cannot advertise {}", id),
        }
    }

    fn publish(&self, id: &SignalId, value: f64) {
        if value.is_nan() {
            warn!("Dropping NaN published on {}", id);
            return;
        }

        let mut inner = match self.inner.lock() {
            Ok(i) => i,
            Err(_) => {
                warn!("Signal bus lock poisoned, dropping value for {}", id);
                return;
            }
        };

        let value = match inner.ranges.get(id) {
            Some((min, max)) => value.max(*min).min(*max),
            None => value,
        };

        trace!("{} <- {}", id, value);

        if let Some(subs) = inner.subscribers.get_mut(id) {
            subs.retain(|s| match s {
                Subscriber::Plain(tx) => tx.send(value).is_ok(),
                Subscriber::Tagged(tx) => tx.send((id.clone(), value)).is_ok(),
            });
        }
    }

    fn subscribe(&self, id: &SignalId) -> Receiver<f64> {
        let (tx, rx) = channel();
        self.add_subscriber(id, Subscriber::Plain(tx));
        rx
    }

    fn subscribe_tagged(&self, id: &SignalId, tx: Sender<(SignalId, f64)>) {
        self.add_subscriber(id, Subscriber::Tagged(tx));
    }

    fn set_range(&self, id: &SignalId, min: f64, max: f64) {
        match self.inner.lock() {
            Ok(mut inner) => {
                inner.ranges.insert(id.clone(), (min, max));
            }
            Err(_) => warn!("Signal bus lock poisoned, cannot set range of {}", id),
        }
    }

    fn unsubscribe(&self, id: &SignalId) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.subscribers.remove(id);
            inner.ranges.remove(id);
            if inner.names.get(id.name()) == Some(id) {
                inner.names.remove(id.name());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = SignalId::new("base.JogSpeed");
        let b = SignalId::new("base.JogSpeed");
        assert_ne!(a, b);
        assert_eq!(a.name(), "base.JogSpeed");
        assert_eq!(b.name(), "base.JogSpeed");
    }

    #[test]
    fn test_publish_subscribe() {
        let bus = LocalSignalBus::new();
        let id = SignalId::new("elbow.JogSpeed");
        let other = SignalId::new("elbow.JogForward");

        let rx = bus.subscribe(&id);
        bus.set_range(&id, 0.0, 255.0);

        bus.publish(&id, 12.0);
        bus.publish(&id, 300.0);
        bus.publish(&id, -4.0);
        bus.publish(&id, f64::NAN);
        bus.publish(&other, 1.0);

        let got: Vec<f64> = rx.try_iter().collect();
        assert_eq!(got, vec![12.0, 255.0, 0.0]);

        assert!(bus.publish_named("elbow.JogSpeed", 5.0));
        assert!(!bus.publish_named("elbow.Missing", 5.0));
        assert_eq!(rx.try_recv(), Ok(5.0));

        bus.unsubscribe(&id);
        assert!(bus.lookup("elbow.JogSpeed").is_none());
        bus.publish(&id, 6.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_tagged_keeps_publish_order() {
        let bus = LocalSignalBus::new();
        let fwd = SignalId::new("base.JogForward");
        let rev = SignalId::new("base.JogReverse");

        let (tx, rx) = channel();
        bus.subscribe_tagged(&fwd, tx.clone());
        bus.subscribe_tagged(&rev, tx);

        bus.publish(&rev, 1.0);
        bus.publish(&fwd, 1.0);
        bus.publish(&rev, 0.0);

        let got: Vec<(SignalId, f64)> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![(rev.clone(), 1.0), (fwd.clone(), 1.0), (rev.clone(), 0.0)]
        );
    }
}
