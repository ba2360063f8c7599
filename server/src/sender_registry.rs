use std::collections::HashMap;

use canopy_shared::{NodeId, SequenceNumber};

use crate::sequence_tracker::SequenceTracker;

/// Per-sender reliability trackers plus counters aggregated across all
/// senders. Keyed by `Option<NodeId>`: packets with no verified source share
/// one anonymous bucket. Mutated only by the processor worker.
#[derive(Debug, Default)]
pub struct SenderRegistry {
    senders: HashMap<Option<NodeId>, SequenceTracker>,
    total_packets: u64,
    total_elements: u64,
    total_transit_us: u64,
    total_process_us: u64,
    total_lock_wait_us: u64,
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the sender's tracker (created lazily on its first packet) and
    /// folds the packet into it and into the aggregate counters.
    pub fn track(
        &mut self,
        sender: Option<NodeId>,
        sequence: SequenceNumber,
        transit_us: u64,
        edits: u32,
        process_us: u64,
        lock_wait_us: u64,
    ) {
        self.total_transit_us += transit_us;
        self.total_process_us += process_us;
        self.total_lock_wait_us += lock_wait_us;
        self.total_elements += u64::from(edits);
        self.total_packets += 1;

        self.senders
            .entry(sender)
            .or_default()
            .observe(sequence, transit_us, edits, process_us, lock_wait_us);
    }

    /// Drops every sender `is_alive` reports dead, along with the anonymous
    /// bucket (there is no node to query or NACK for it). Returns how many
    /// entries were evicted.
    pub fn evict_dead<F: Fn(&NodeId) -> bool>(&mut self, is_alive: F) -> usize {
        let before = self.senders.len();
        self.senders.retain(|sender, _| match sender {
            Some(node_id) => is_alive(node_id),
            None => false,
        });
        before - self.senders.len()
    }

    /// The named senders, for the NACK sweep after eviction.
    pub fn known_senders(&self) -> impl Iterator<Item = (&NodeId, &SequenceTracker)> {
        self.senders
            .iter()
            .filter_map(|(sender, tracker)| sender.as_ref().map(|node_id| (node_id, tracker)))
    }

    /// The tracker for one sender bucket, if packets have arrived from it.
    pub fn sender(&self, sender: &Option<NodeId>) -> Option<&SequenceTracker> {
        self.senders.get(sender)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Clears all trackers and aggregate counters.
    pub fn reset(&mut self) {
        self.senders.clear();
        self.total_packets = 0;
        self.total_elements = 0;
        self.total_transit_us = 0;
        self.total_process_us = 0;
        self.total_lock_wait_us = 0;
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_transit_us(&self) -> u64 {
        self.total_transit_us
    }

    pub fn total_process_us(&self) -> u64 {
        self.total_process_us
    }

    pub fn total_lock_wait_us(&self) -> u64 {
        self.total_lock_wait_us
    }

    /// Mean transit time per packet across all senders, in microseconds.
    pub fn average_transit_time_us(&self) -> u64 {
        self.per_packet(self.total_transit_us)
    }

    /// Mean octree processing time per packet across all senders.
    pub fn average_process_time_us(&self) -> u64 {
        self.per_packet(self.total_process_us)
    }

    /// Mean octree write-lock wait per packet across all senders.
    pub fn average_lock_wait_time_us(&self) -> u64 {
        self.per_packet(self.total_lock_wait_us)
    }

    fn per_packet(&self, total: u64) -> u64 {
        if self.total_packets == 0 {
            0
        } else {
            total / self.total_packets
        }
    }
}
