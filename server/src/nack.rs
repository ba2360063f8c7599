use log::warn;

use canopy_shared::{write_nack_packets, NodeId, PacketHeaderCodec, PacketType, SequenceNumber};

use crate::{node_directory::NodeDirectory, sender_registry::SenderRegistry};

/// Builds and transmits NACK datagrams for every live sender with sequence
/// numbers outstanding.
#[derive(Debug)]
pub struct NackEmitter<H: PacketHeaderCodec> {
    codec: H,
    max_packet_size: usize,
    send_failures: u64,
}

impl<H: PacketHeaderCodec> NackEmitter<H> {
    pub fn new(codec: H, max_packet_size: usize) -> Self {
        Self {
            codec,
            max_packet_size,
            send_failures: 0,
        }
    }

    /// Runs one NACK sweep.
    ///
    /// Dead senders are evicted first. A sender is skipped when it has
    /// nothing missing, when it still has packets waiting in the inbound
    /// queue (the missing numbers may be among them), or when it cannot be
    /// resolved to a destination. Returns the datagrams successfully sent;
    /// failed writes are tallied and logged without aborting the sweep.
    pub fn send_nacks<D, F>(
        &mut self,
        registry: &mut SenderRegistry,
        directory: &D,
        has_pending: F,
    ) -> usize
    where
        D: NodeDirectory,
        F: Fn(&NodeId) -> bool,
    {
        registry.evict_dead(|node_id| directory.is_alive(node_id));

        let mut packets_sent = 0;
        for (node_id, tracker) in registry.known_senders() {
            let missing = tracker.missing_sequences();
            if missing.is_empty() {
                continue;
            }
            if has_pending(node_id) {
                continue;
            }
            let Some(destination) = directory.lookup(node_id) else {
                continue;
            };

            let sequences: Vec<SequenceNumber> = missing.iter().copied().collect();
            let packets = write_nack_packets(
                &self.codec,
                PacketType::EntityNack,
                &sequences,
                self.max_packet_size,
            );
            for packet in packets {
                match directory.send_unverified_datagram(&packet, &destination) {
                    Ok(_) => packets_sent += 1,
                    Err(error) => {
                        self.send_failures += 1;
                        warn!("Cannot send nack packet to {node_id}: {error}");
                    }
                }
            }
        }
        packets_sent
    }

    /// Datagram writes that have failed since construction.
    pub fn send_failures(&self) -> u64 {
        self.send_failures
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::RefCell,
        collections::{HashMap, HashSet},
    };

    use canopy_shared::{read_nack_packet, NodeId, StandardHeaderCodec, Uuid};

    use super::NackEmitter;
    use crate::{error::SendError, node_directory::NodeDirectory, sender_registry::SenderRegistry};

    #[derive(Default)]
    struct RecordingDirectory {
        alive: HashSet<NodeId>,
        unresolvable: HashSet<NodeId>,
        fail_sends_to: HashSet<NodeId>,
        sent: RefCell<Vec<(NodeId, Vec<u8>)>>,
        heard_from: RefCell<HashMap<NodeId, u64>>,
    }

    impl RecordingDirectory {
        fn with_alive(node_ids: &[NodeId]) -> Self {
            Self {
                alive: node_ids.iter().copied().collect(),
                ..Self::default()
            }
        }

        fn sent_to(&self, node_id: &NodeId) -> Vec<Vec<u8>> {
            self.sent
                .borrow()
                .iter()
                .filter(|(dest, _)| dest == node_id)
                .map(|(_, packet)| packet.clone())
                .collect()
        }
    }

    impl NodeDirectory for RecordingDirectory {
        type Handle = NodeId;

        fn lookup(&self, node_id: &NodeId) -> Option<NodeId> {
            (!self.unresolvable.contains(node_id)).then_some(*node_id)
        }

        fn is_alive(&self, node_id: &NodeId) -> bool {
            self.alive.contains(node_id)
        }

        fn note_heard_from(&self, node_id: &NodeId, heard_at_us: u64) {
            self.heard_from.borrow_mut().insert(*node_id, heard_at_us);
        }

        fn send_unverified_datagram(
            &self,
            payload: &[u8],
            dest: &NodeId,
        ) -> Result<usize, SendError> {
            if self.fail_sends_to.contains(dest) {
                return Err(SendError {
                    payload_size: payload.len(),
                });
            }
            self.sent.borrow_mut().push((*dest, payload.to_vec()));
            Ok(payload.len())
        }
    }

    // registry with one sender missing {11, 12}
    fn registry_with_gap(node_id: NodeId) -> SenderRegistry {
        let mut registry = SenderRegistry::new();
        registry.track(Some(node_id), 10, 0, 0, 0, 0);
        registry.track(Some(node_id), 13, 0, 0, 0, 0);
        registry
    }

    #[test]
    fn nacks_missing_sequence_numbers_to_a_live_sender() {
        let node_id = Uuid::new_v4();
        let directory = RecordingDirectory::with_alive(&[node_id]);
        let mut registry = registry_with_gap(node_id);
        let mut emitter = NackEmitter::new(StandardHeaderCodec, 1450);

        let sent = emitter.send_nacks(&mut registry, &directory, |_| false);

        assert_eq!(sent, 1);
        let packets = directory.sent_to(&node_id);
        assert_eq!(packets.len(), 1);
        assert_eq!(
            read_nack_packet(&StandardHeaderCodec, &packets[0]).unwrap(),
            vec![11, 12]
        );
    }

    #[test]
    fn sender_with_nothing_missing_is_skipped() {
        let node_id = Uuid::new_v4();
        let directory = RecordingDirectory::with_alive(&[node_id]);
        let mut registry = SenderRegistry::new();
        registry.track(Some(node_id), 10, 0, 0, 0, 0);
        registry.track(Some(node_id), 11, 0, 0, 0, 0);
        let mut emitter = NackEmitter::new(StandardHeaderCodec, 1450);

        assert_eq!(emitter.send_nacks(&mut registry, &directory, |_| false), 0);
        assert!(directory.sent.borrow().is_empty());
    }

    #[test]
    fn sender_with_queued_packets_is_skipped_but_kept() {
        let node_id = Uuid::new_v4();
        let directory = RecordingDirectory::with_alive(&[node_id]);
        let mut registry = registry_with_gap(node_id);
        let mut emitter = NackEmitter::new(StandardHeaderCodec, 1450);

        let sent = emitter.send_nacks(&mut registry, &directory, |pending| *pending == node_id);

        assert_eq!(sent, 0);
        assert!(directory.sent.borrow().is_empty());
        // still tracked; the missing numbers may arrive from the queue
        assert!(registry.sender(&Some(node_id)).is_some());
    }

    #[test]
    fn dead_sender_is_evicted_and_not_nacked() {
        let node_id = Uuid::new_v4();
        let directory = RecordingDirectory::default(); // nobody alive
        let mut registry = registry_with_gap(node_id);
        let mut emitter = NackEmitter::new(StandardHeaderCodec, 1450);

        let sent = emitter.send_nacks(&mut registry, &directory, |_| false);

        assert_eq!(sent, 0);
        assert!(registry.is_empty());
        assert!(directory.sent.borrow().is_empty());
    }

    #[test]
    fn unresolvable_sender_is_skipped() {
        let node_id = Uuid::new_v4();
        let mut directory = RecordingDirectory::with_alive(&[node_id]);
        directory.unresolvable.insert(node_id);
        let mut registry = registry_with_gap(node_id);
        let mut emitter = NackEmitter::new(StandardHeaderCodec, 1450);

        assert_eq!(emitter.send_nacks(&mut registry, &directory, |_| false), 0);
    }

    #[test]
    fn large_missing_set_splits_across_datagrams() {
        let node_id = Uuid::new_v4();
        let directory = RecordingDirectory::with_alive(&[node_id]);
        let mut registry = SenderRegistry::new();
        registry.track(Some(node_id), 0, 0, 0, 0, 0);
        registry.track(Some(node_id), 80, 0, 0, 0, 0); // missing 1..=79
        // room for 30 sequence numbers per datagram
        let mut emitter = NackEmitter::new(StandardHeaderCodec, 2 + 2 + 30 * 2);

        let sent = emitter.send_nacks(&mut registry, &directory, |_| false);

        assert_eq!(sent, 3);
        let mut union = HashSet::new();
        for packet in directory.sent_to(&node_id) {
            union.extend(read_nack_packet(&StandardHeaderCodec, &packet).unwrap());
        }
        assert_eq!(union, (1u16..80).collect::<HashSet<u16>>());
    }

    #[test]
    fn send_failure_is_tallied_and_does_not_abort_the_sweep() {
        let failing = Uuid::new_v4();
        let healthy = Uuid::new_v4();
        let mut directory = RecordingDirectory::with_alive(&[failing, healthy]);
        directory.fail_sends_to.insert(failing);

        let mut registry = registry_with_gap(failing);
        registry.track(Some(healthy), 20, 0, 0, 0, 0);
        registry.track(Some(healthy), 22, 0, 0, 0, 0); // missing {21}
        let mut emitter = NackEmitter::new(StandardHeaderCodec, 1450);

        let sent = emitter.send_nacks(&mut registry, &directory, |_| false);

        assert_eq!(sent, 1);
        assert_eq!(emitter.send_failures(), 1);
        assert_eq!(directory.sent_to(&healthy).len(), 1);
    }
}
