use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};

use log::{debug, warn};

use canopy_shared::{
    EditPreamble, NodeId, PacketHeaderCodec, StandardHeaderCodec, Timestamp,
    EDIT_PREAMBLE_BYTES, MTU_SIZE_BYTES,
};

use crate::{
    envelope::PacketEnvelope,
    nack::NackEmitter,
    node_directory::NodeDirectory,
    octree::{Octree, SharedOctree},
    sender_registry::SenderRegistry,
};

/// Tuning knobs for the packet processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Minimum time between NACK sweeps.
    pub nack_interval: Duration,
    /// Largest datagram the NACK emitter may build.
    pub max_packet_size: usize,
    /// Log every received packet at debug level.
    pub debug_receiving: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            nack_interval: Duration::from_secs(1),
            max_packet_size: MTU_SIZE_BYTES,
            debug_receiving: false,
        }
    }
}

/// Cooperative termination flag for the processor worker. Clone it and hand
/// it to whatever owns the worker's lifecycle; the worker checks it between
/// cycles, so in-flight packets always finish.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the worker to stop after its current cycle.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct QueueInner {
    packets: VecDeque<PacketEnvelope>,
    pending: HashMap<Option<NodeId>, u32>,
}

/// The inbound packet queue shared between network producers and the
/// processor worker. The mutex is held only to push or pop, never while a
/// packet is being processed.
#[derive(Debug, Default)]
pub struct InboundPacketQueue {
    inner: Mutex<QueueInner>,
    has_packets: Condvar,
}

impl InboundPacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an envelope and wakes the worker.
    pub fn enqueue(&self, envelope: PacketEnvelope) {
        let mut inner = self.lock_inner();
        *inner.pending.entry(envelope.sender).or_insert(0) += 1;
        inner.packets.push_back(envelope);
        drop(inner);
        self.has_packets.notify_one();
    }

    // Pops the oldest envelope and decrements its sender's pending count.
    fn pop_front(&self) -> Option<PacketEnvelope> {
        let mut inner = self.lock_inner();
        let envelope = inner.packets.pop_front()?;
        if let Some(count) = inner.pending.get_mut(&envelope.sender) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                inner.pending.remove(&envelope.sender);
            }
        }
        Some(envelope)
    }

    pub fn is_empty(&self) -> bool {
        self.lock_inner().packets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock_inner().packets.len()
    }

    /// Whether any queued packets are from `node_id`. The NACK sweep holds
    /// off on senders that still have packets waiting.
    pub fn has_pending_from(&self, node_id: &NodeId) -> bool {
        self.lock_inner()
            .pending
            .get(&Some(*node_id))
            .is_some_and(|count| *count > 0)
    }

    // Sleeps until a packet arrives or `timeout` passes. Spurious wakeups
    // are fine; the caller re-checks the queue.
    fn wait_for_packets(&self, timeout: Duration) {
        let inner = self.lock_inner();
        if !inner.packets.is_empty() {
            return;
        }
        drop(
            self.has_packets
                .wait_timeout(inner, timeout)
                .unwrap_or_else(PoisonError::into_inner),
        );
    }

    fn lock_inner(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The dedicated worker that drains the inbound queue, applies edit records
/// to the octree under its write lock, updates per-sender reliability state,
/// and periodically NACKs missing sequence numbers.
pub struct PacketProcessor<O, D, H = StandardHeaderCodec>
where
    O: Octree,
    D: NodeDirectory,
    H: PacketHeaderCodec + Clone,
{
    queue: Arc<InboundPacketQueue>,
    octree: SharedOctree<O>,
    directory: Arc<D>,
    codec: H,
    registry: SenderRegistry,
    nack_emitter: NackEmitter<H>,
    last_nack: Instant,
    received_packet_count: u64,
    shutdown: ShutdownSignal,
    config: ProcessorConfig,
}

impl<O, D, H> PacketProcessor<O, D, H>
where
    O: Octree,
    D: NodeDirectory,
    H: PacketHeaderCodec + Clone,
{
    pub fn new(
        octree: SharedOctree<O>,
        directory: Arc<D>,
        codec: H,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            queue: Arc::new(InboundPacketQueue::new()),
            octree,
            directory,
            codec: codec.clone(),
            nack_emitter: NackEmitter::new(codec, config.max_packet_size),
            registry: SenderRegistry::new(),
            last_nack: Instant::now(),
            received_packet_count: 0,
            shutdown: ShutdownSignal::new(),
            config,
        }
    }

    /// The queue handle producers push received packets onto.
    pub fn queue(&self) -> Arc<InboundPacketQueue> {
        Arc::clone(&self.queue)
    }

    /// The termination flag this worker observes between cycles.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Runs cycles until the shutdown signal is raised.
    pub fn run(&mut self) {
        while self.process() {}
    }

    /// One processor cycle: sleep until work or the NACK deadline, then
    /// drain the queue. Returns whether the worker should keep running.
    pub fn process(&mut self) -> bool {
        if self.queue.is_empty() {
            let next_nack = self.last_nack + self.config.nack_interval;
            let now = Instant::now();
            if now >= next_nack {
                self.last_nack = now;
                self.send_nacks();
            } else {
                let wait = next_nack
                    .saturating_duration_since(now)
                    .max(Duration::from_millis(1));
                self.queue.wait_for_packets(wait);
            }
        }

        while let Some(envelope) = self.queue.pop_front() {
            self.process_envelope(envelope);

            if self.last_nack.elapsed() >= self.config.nack_interval {
                // re-captured here; the cycle-start time goes stale during
                // a long drain
                self.last_nack = Instant::now();
                self.send_nacks();
            }
        }

        !self.shutdown.is_shutdown()
    }

    fn process_envelope(&mut self, envelope: PacketEnvelope) {
        let PacketEnvelope { sender, payload } = envelope;

        let packet_type = match self.codec.read_packet_type(&payload) {
            Ok(packet_type) => packet_type,
            Err(error) => {
                debug!("discarding packet with unreadable header: {error}");
                return;
            }
        };

        let handles_type = {
            let octree = self.octree.read().unwrap_or_else(PoisonError::into_inner);
            octree.handles_edit_packet_type(packet_type)
        };
        if !handles_type {
            debug!("unknown packet ignored... packet_type: {packet_type:?}");
            return;
        }

        self.received_packet_count += 1;

        let header_len = self.codec.header_len(&payload);
        let preamble = match EditPreamble::read(&payload, header_len) {
            Ok(preamble) => preamble,
            Err(error) => {
                warn!("discarding truncated edit packet: {error}");
                return;
            }
        };

        let now_us = Timestamp::now_micros();
        let transit_us = now_us.saturating_sub(preamble.sent_at_us);

        if self.config.debug_receiving {
            debug!(
                "got {packet_type:?} packet - {} received_bytes={} sequence={} transit_us={transit_us}",
                self.received_packet_count,
                payload.len(),
                preamble.sequence,
            );
        }

        let mut cursor = header_len + EDIT_PREAMBLE_BYTES;
        let mut edits: u32 = 0;
        let mut process_us: u64 = 0;
        let mut lock_wait_us: u64 = 0;

        while cursor < payload.len() {
            let start_lock = Instant::now();
            let mut octree = self.octree.write().unwrap_or_else(PoisonError::into_inner);
            let start_process = Instant::now();
            let consumed =
                octree.process_edit_packet_data(packet_type, &payload, cursor, sender.as_ref());
            drop(octree);
            let end_process = Instant::now();

            lock_wait_us += start_process.duration_since(start_lock).as_micros() as u64;
            process_us += end_process.duration_since(start_process).as_micros() as u64;

            if consumed == 0 {
                warn!("octree consumed no bytes at offset {cursor}; dropping rest of packet");
                break;
            }
            cursor += consumed;
            edits += 1;
        }

        if let Some(node_id) = sender.as_ref() {
            self.directory
                .note_heard_from(node_id, Timestamp::now_micros());
        }

        self.registry.track(
            sender,
            preamble.sequence,
            transit_us,
            edits,
            process_us,
            lock_wait_us,
        );
    }

    fn send_nacks(&mut self) -> usize {
        let queue = Arc::clone(&self.queue);
        self.nack_emitter
            .send_nacks(&mut self.registry, self.directory.as_ref(), |node_id| {
                queue.has_pending_from(node_id)
            })
    }

    /// Packets accepted for processing since construction or the last reset.
    pub fn received_packet_count(&self) -> u64 {
        self.received_packet_count
    }

    /// Read access to per-sender reliability state, for diagnostics. Clone
    /// trackers out rather than holding this across cycles.
    pub fn registry(&self) -> &SenderRegistry {
        &self.registry
    }

    /// Datagram writes the NACK emitter has failed since construction.
    pub fn nack_send_failures(&self) -> u64 {
        self.nack_emitter.send_failures()
    }

    /// Clears all counters and per-sender state and re-arms the NACK clock.
    pub fn reset_stats(&mut self) {
        self.received_packet_count = 0;
        self.registry.reset();
        self.last_nack = Instant::now();
    }
}
