//! Bookkeeping for mutations whose service response has not arrived yet.
//!
//! Every mutation takes the next [`MutationSeq`] when it is issued. Remote
//! mutations stay registered until their response is reconciled. A response
//! whose sequence number is no longer registered has been cancelled and must
//! not touch the graph.

use std::collections::{BTreeMap, HashSet};

use pipeline::{MutationSeq, NodeId, TemplateId};

/// A remote mutation awaiting its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingMutation {
    AddNode { template_id: TemplateId },
    Connect { source: NodeId, target: NodeId },
    Execute,
}

impl PendingMutation {
    fn touches(&self, node: &NodeId) -> bool {
        match self {
            PendingMutation::Connect { source, target } => source == node || target == node,
            PendingMutation::AddNode { .. } | PendingMutation::Execute => false,
        }
    }
}

#[derive(Debug)]
pub struct MutationLedger {
    last: MutationSeq,
    in_flight: BTreeMap<MutationSeq, PendingMutation>,
    /// Ids of deleted nodes. A late `add_node` response carrying one of these
    /// must not bring the node back.
    ///
    /// Never pruned: it grows by one id per deleted node and lives as long as
    /// the session that owns the ledger. An add response may arrive at any time
    /// after the delete, so no in-flight state says when an id is safe to drop.
    tombstones: HashSet<NodeId>,
}

impl Default for MutationLedger {
    fn default() -> Self {
        Self {
            last: MutationSeq::new(0),
            in_flight: BTreeMap::new(),
            tombstones: HashSet::new(),
        }
    }
}

impl MutationLedger {
    fn next_seq(&mut self) -> MutationSeq {
        self.last = self.last.next();
        self.last
    }

    /// Registers a remote mutation and returns its sequence number.
    pub fn begin(&mut self, mutation: PendingMutation) -> MutationSeq {
        let seq = self.next_seq();
        self.in_flight.insert(seq, mutation);
        seq
    }

    /// Takes a sequence number for a mutation applied locally only.
    pub fn record_local(&mut self) -> MutationSeq {
        self.next_seq()
    }

    /// Unregisters a mutation whose response arrived.
    ///
    /// Returns `None` if it was cancelled in the meantime.
    pub fn finish(&mut self, seq: MutationSeq) -> Option<PendingMutation> {
        self.in_flight.remove(&seq)
    }

    /// Cancels an in-flight mutation. Returns `false` if it was not in flight.
    pub fn cancel(&mut self, seq: MutationSeq) -> bool {
        self.in_flight.remove(&seq).is_some()
    }

    /// Records a node deletion: tombstones the id and cancels every in-flight
    /// connect that references it. Returns the cancelled sequence numbers.
    pub fn node_deleted(&mut self, node: &NodeId) -> Vec<MutationSeq> {
        self.tombstones.insert(node.clone());
        let cancelled: Vec<MutationSeq> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.touches(node))
            .map(|(seq, _)| *seq)
            .collect();
        for seq in &cancelled {
            self.in_flight.remove(seq);
        }
        cancelled
    }

    pub fn is_tombstoned(&self, node: &NodeId) -> bool {
        self.tombstones.contains(node)
    }

    pub fn execution_in_flight(&self) -> bool {
        self.in_flight.values().any(|m| *m == PendingMutation::Execute)
    }

    /// In-flight mutations in issue order.
    pub fn pending(&self) -> Vec<(MutationSeq, PendingMutation)> {
        self.in_flight
            .iter()
            .map(|(seq, m)| (*seq, m.clone()))
            .collect()
    }

    /// The most recently issued sequence number.
    pub fn last_seq(&self) -> MutationSeq {
        self.last
    }
}
