//! Response routing and staleness detection.
//!
//! Each flushed batch is answered index-by-index. A single response entry is
//! fanned out to every request that shared its dedup key. Before delivery a
//! request's last-sent rank is consulted: if it has since been sent in a
//! newer batch, the older answer is dropped.

use std::collections::HashMap;
use std::sync::Arc;

use reqmux_domain::{DedupKey, FetchError, InboundEnvelope, RequestId};
use serde_json::Value;
use tracing::{debug, warn};

use super::accumulator::{FlushedBatch, PendingRequest};
use crate::callbacks::RequestCallbacks;

/// Rank of the batch each in-flight request was last sent in.
#[derive(Debug, Default)]
pub struct RankLedger {
    sent: HashMap<RequestId, u64>,
}

impl RankLedger {
    pub fn record(&mut self, id: RequestId, rank: u64) {
        self.sent.insert(id, rank);
    }

    pub fn last_sent(&self, id: RequestId) -> Option<u64> {
        self.sent.get(&id).copied()
    }

    /// Whether a response carrying `rank` is older than the request's last
    /// send. `None` means the response is unranked and always current.
    ///
    /// A ranked response for a request with no ledger entry is stale: the
    /// entry is only cleared once a response from its latest send landed.
    pub fn is_stale(&self, id: RequestId, rank: Option<u64>) -> bool {
        match rank {
            None => false,
            Some(rank) => self.last_sent(id).map_or(true, |last| rank < last),
        }
    }

    /// Forgets `id` if `sent_rank` was its latest send.
    pub fn settle(&mut self, id: RequestId, sent_rank: u64) {
        if self.last_sent(id) == Some(sent_rank) {
            self.sent.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }
}

/// What a single request receives from a resolved batch.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    Success(Value),
    /// Network payload equals what was already served from cache.
    Unchanged,
    Failure(FetchError),
    Stale,
}

pub(crate) struct Delivery {
    pub id: RequestId,
    pub callbacks: Arc<dyn RequestCallbacks>,
    pub outcome: Outcome,
}

impl Delivery {
    /// Invokes the outcome callback, then signals the fetch resolved.
    pub fn deliver(self) {
        match &self.outcome {
            Outcome::Success(payload) => self.callbacks.on_success(payload),
            Outcome::Failure(error) => self.callbacks.on_error(error),
            Outcome::Unchanged => debug!(request = %self.id, "network result matches cache"),
            Outcome::Stale => {}
        }
        self.callbacks.on_loading_delta(-1);
    }
}

/// Side effects computed for one resolved batch.
#[derive(Default)]
pub(crate) struct RoutePlan {
    pub cache_writes: Vec<(DedupKey, Value)>,
    pub deliveries: Vec<Delivery>,
}

impl RoutePlan {
    fn push(&mut self, request: PendingRequest, outcome: Outcome) {
        self.deliveries.push(Delivery {
            id: request.descriptor.id(),
            callbacks: request.callbacks,
            outcome,
        });
    }

    pub fn stale_count(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.outcome == Outcome::Stale)
            .count()
    }
}

/// Demultiplexes an inbound envelope (or a send failure) onto the requests
/// of the batch it answers.
pub(crate) struct ResponseRouter;

impl ResponseRouter {
    pub fn route(
        batch: FlushedBatch,
        result: Result<InboundEnvelope, FetchError>,
        ledger: &mut RankLedger,
    ) -> RoutePlan {
        let sent_rank = batch.rank;
        let mut plan = RoutePlan::default();

        let inbound = match result {
            Ok(inbound) if inbound.responses.len() == batch.entries.len() => inbound,
            Ok(inbound) => {
                let error = FetchError::ProtocolLengthMismatch {
                    sent: batch.entries.len(),
                    received: inbound.responses.len(),
                };
                warn!(rank = sent_rank, %error, "rejecting batch response");
                Self::fail_all(batch, error, ledger, &mut plan);
                return plan;
            }
            Err(error) => {
                Self::fail_all(batch, error, ledger, &mut plan);
                return plan;
            }
        };

        let response_rank = inbound.effective_rank();
        for (entry, response) in batch.entries.into_iter().zip(inbound.responses) {
            match response.outcome() {
                Ok(payload) => {
                    let mut any_current = false;
                    for request in entry.requests {
                        let outcome = if Self::is_current(&request, response_rank, sent_rank, ledger)
                        {
                            any_current = true;
                            if request.cached.as_ref() == Some(payload) {
                                Outcome::Unchanged
                            } else {
                                Outcome::Success(payload.clone())
                            }
                        } else {
                            Outcome::Stale
                        };
                        plan.push(request, outcome);
                    }
                    if any_current {
                        plan.cache_writes.push((entry.key, payload.clone()));
                    }
                }
                Err(error) => {
                    if let FetchError::UnknownResponseType { .. } = &error {
                        warn!(rank = sent_rank, key = %entry.key, %error, "rejecting response entry");
                    }
                    for request in entry.requests {
                        let outcome = if Self::is_current(&request, response_rank, sent_rank, ledger)
                        {
                            Outcome::Failure(error.clone())
                        } else {
                            Outcome::Stale
                        };
                        plan.push(request, outcome);
                    }
                }
            }
        }

        plan
    }

    fn fail_all(
        batch: FlushedBatch,
        error: FetchError,
        ledger: &mut RankLedger,
        plan: &mut RoutePlan,
    ) {
        let sent_rank = batch.rank;
        for request in batch.entries.into_iter().flat_map(|e| e.requests) {
            let outcome = if Self::is_current(&request, Some(sent_rank), sent_rank, ledger) {
                Outcome::Failure(error.clone())
            } else {
                Outcome::Stale
            };
            plan.push(request, outcome);
        }
    }

    fn is_current(
        request: &PendingRequest,
        response_rank: Option<u64>,
        sent_rank: u64,
        ledger: &mut RankLedger,
    ) -> bool {
        let id = request.descriptor.id();
        if ledger.is_stale(id, response_rank) {
            debug!(
                request = %id,
                rank = ?response_rank,
                last_sent = ?ledger.last_sent(id),
                "dropping stale response"
            );
            return false;
        }
        ledger.settle(id, sent_rank);
        true
    }
}
