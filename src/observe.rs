//! RFC 7641 observer registry
//!
//! Observations are keyed by (endpoint, token, resource). Registering the
//! same key twice is a no-op. Each resource carries its own 24-bit observe
//! sequence number, bumped once per state transition, so clients can order
//! notifications independently of message ids.

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::coreconf::ResourceKind;

/// Observe option values are 24-bit
const SEQUENCE_MASK: u32 = 0x00FF_FFFF;

/// One registered observer of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observer {
    /// Address and port notifications are sent to
    pub endpoint: SocketAddr,
    /// Token from the registering GET, echoed in every notification
    pub token: Vec<u8>,
    /// Message id of the last notification sent, for matching a Reset
    pub last_message_id: Option<u16>,
}

impl Observer {
    fn matches(&self, endpoint: SocketAddr, token: &[u8]) -> bool {
        self.endpoint == endpoint && self.token == token
    }
}

#[derive(Debug, Default)]
struct ResourceObservers {
    observers: Vec<Observer>,
    sequence: u32,
}

/// Set of observations for every observable resource
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    resources: HashMap<ResourceKind, ResourceObservers>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; returns `false` if it was already registered
    pub fn register(&mut self, resource: ResourceKind, endpoint: SocketAddr, token: &[u8]) -> bool {
        let entry = self.resources.entry(resource).or_default();
        if entry.observers.iter().any(|o| o.matches(endpoint, token)) {
            return false;
        }
        entry.observers.push(Observer {
            endpoint,
            token: token.to_vec(),
            last_message_id: None,
        });
        true
    }

    /// Remove an observer; returns `true` if it was registered
    pub fn deregister(&mut self, resource: ResourceKind, endpoint: SocketAddr, token: &[u8]) -> bool {
        let Some(entry) = self.resources.get_mut(&resource) else {
            return false;
        };
        let before = entry.observers.len();
        entry.observers.retain(|o| !o.matches(endpoint, token));
        entry.observers.len() != before
    }

    /// Remove the observer whose last notification had `message_id`
    pub fn deregister_by_message_id(
        &mut self,
        endpoint: SocketAddr,
        message_id: u16,
    ) -> Option<(ResourceKind, Observer)> {
        for (resource, entry) in self.resources.iter_mut() {
            if let Some(pos) = entry
                .observers
                .iter()
                .position(|o| o.endpoint == endpoint && o.last_message_id == Some(message_id))
            {
                return Some((*resource, entry.observers.remove(pos)));
            }
        }
        None
    }

    pub fn observers(&self, resource: ResourceKind) -> &[Observer] {
        self.resources
            .get(&resource)
            .map(|entry| entry.observers.as_slice())
            .unwrap_or(&[])
    }

    pub fn observers_mut(&mut self, resource: ResourceKind) -> &mut [Observer] {
        match self.resources.get_mut(&resource) {
            Some(entry) => entry.observers.as_mut_slice(),
            None => &mut [],
        }
    }

    pub fn len(&self, resource: ResourceKind) -> usize {
        self.observers(resource).len()
    }

    pub fn is_empty(&self, resource: ResourceKind) -> bool {
        self.len(resource) == 0
    }

    /// Current observe sequence of a resource
    pub fn sequence(&self, resource: ResourceKind) -> u32 {
        self.resources
            .get(&resource)
            .map(|entry| entry.sequence)
            .unwrap_or(0)
    }

    /// Advance the sequence for a new state and return it
    pub fn next_sequence(&mut self, resource: ResourceKind) -> u32 {
        let entry = self.resources.entry(resource).or_default();
        entry.sequence = (entry.sequence + 1) & SEQUENCE_MASK;
        entry.sequence
    }
}
