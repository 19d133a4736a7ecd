//! Pending batch: requests grouped by dedup key in arrival order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use reqmux_domain::{DedupKey, OutboundEnvelope, RequestDescriptor, RequestId, WireRequest};
use serde_json::Value;

use crate::callbacks::RequestCallbacks;

/// A request admitted for network fetch.
pub(crate) struct PendingRequest {
    pub descriptor: RequestDescriptor,
    pub callbacks: Arc<dyn RequestCallbacks>,
    /// Payload already delivered from cache, if any.
    pub cached: Option<Value>,
}

/// All requests sharing one dedup key. Sent once, answered once.
pub(crate) struct BatchEntry {
    pub key: DedupKey,
    pub requests: Vec<PendingRequest>,
}

impl BatchEntry {
    fn wire_request(&self) -> Option<WireRequest> {
        self.requests.first().map(|first| WireRequest {
            route: first.descriptor.route().to_string(),
            data: first.descriptor.data().clone(),
        })
    }
}

/// Outcome of adding a request to the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Insertion {
    /// First request for its key; the batch grew by one key.
    NewKey,
    /// Joined an existing key.
    Coalesced,
}

/// Requests accumulated since the last flush.
#[derive(Default)]
pub(crate) struct PendingBatch {
    entries: Vec<BatchEntry>,
    positions: HashMap<DedupKey, usize>,
    ids: HashSet<RequestId>,
}

impl PendingBatch {
    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.ids.contains(&id)
    }

    /// Appends `request` under `key`. Callers must check `contains` first.
    pub fn push(&mut self, key: DedupKey, request: PendingRequest) -> Insertion {
        self.ids.insert(request.descriptor.id());

        if let Some(&position) = self.positions.get(&key) {
            self.entries[position].requests.push(request);
            return Insertion::Coalesced;
        }

        self.positions.insert(key.clone(), self.entries.len());
        self.entries.push(BatchEntry {
            key,
            requests: vec![request],
        });
        Insertion::NewKey
    }

    /// Drains every entry, leaving the batch empty.
    pub fn take(&mut self) -> Vec<BatchEntry> {
        self.positions.clear();
        self.ids.clear();
        std::mem::take(&mut self.entries)
    }
}

/// A drained batch tagged with the rank it is sent under.
pub(crate) struct FlushedBatch {
    pub rank: u64,
    pub entries: Vec<BatchEntry>,
}

impl FlushedBatch {
    /// One wire request per distinct key, in first-insertion order.
    pub fn envelope(&self) -> OutboundEnvelope {
        OutboundEnvelope {
            rank: self.rank,
            requests: self
                .entries
                .iter()
                .filter_map(BatchEntry::wire_request)
                .collect(),
        }
    }

    /// Total number of requests, counting duplicates.
    pub fn request_count(&self) -> usize {
        self.entries.iter().map(|e| e.requests.len()).sum()
    }
}
