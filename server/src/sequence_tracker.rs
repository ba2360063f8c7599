use std::collections::HashSet;

use log::debug;

use canopy_shared::{sequence_greater_than, wrapping_diff, SequenceNumber};

/// Largest believable jump between consecutive sequence numbers from one
/// sender. Must stay below half the u16 range for rollover detection to
/// work.
pub const MAX_REASONABLE_SEQUENCE_GAP: u16 = 1000;

/// Hard upper bound on the tracked missing set.
pub const MAX_MISSING_SEQUENCE_SIZE: usize = 100;

/// Reliability state for a single sender: the last accepted sequence number,
/// the sequence numbers observed skipped, and running packet counters.
///
/// Mutated only by the processor worker; diagnostics clone a snapshot out
/// rather than reading live state.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last_sequence: SequenceNumber,
    missing: HashSet<SequenceNumber>,
    total_packets: u64,
    total_elements: u64,
    total_transit_us: u64,
    total_process_us: u64,
    total_lock_wait_us: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one received packet into the tracker.
    ///
    /// Counters update on every call. Sequence state advances on in-order
    /// and early packets, fills gaps on late ones, and stays untouched for
    /// packets further than [`MAX_REASONABLE_SEQUENCE_GAP`] from the
    /// expected number.
    pub fn observe(
        &mut self,
        sequence: SequenceNumber,
        transit_us: u64,
        edits: u32,
        process_us: u64,
        lock_wait_us: u64,
    ) {
        let first_packet = self.total_packets == 0;
        self.total_transit_us += transit_us;
        self.total_process_us += process_us;
        self.total_lock_wait_us += lock_wait_us;
        self.total_elements += u64::from(edits);
        self.total_packets += 1;

        let expected = if first_packet {
            sequence
        } else {
            self.last_sequence.wrapping_add(1)
        };

        if sequence == expected {
            // on time
            self.last_sequence = sequence;
        } else {
            // out of order; the signed wrapping distance folds rollover away
            let gap = wrapping_diff(expected, sequence);

            if gap.unsigned_abs() > MAX_REASONABLE_SEQUENCE_GAP {
                debug!(
                    "ignoring unreasonable packet... sequence: {sequence} expected: {expected}"
                );
            } else if sequence_greater_than(sequence, expected) {
                // early: everything skipped between expected and sequence
                // went missing
                let mut skipped = expected;
                while skipped != sequence {
                    self.missing.insert(skipped);
                    skipped = skipped.wrapping_add(1);
                }
                self.last_sequence = sequence;
            } else {
                // late: fills a gap if we were waiting on this number.
                // last_sequence stays put; it must not move backwards.
                self.missing.remove(&sequence);
            }
        }

        self.prune_missing();
    }

    // Bounds the missing set once it outgrows MAX_MISSING_SEQUENCE_SIZE:
    // first drop entries more than MAX_REASONABLE_SEQUENCE_GAP numbers
    // behind last_sequence in modular order (entries numerically above
    // last_sequence may date from before the most recent rollover), then,
    // if still over, keep only the newest entries.
    fn prune_missing(&mut self) {
        if self.missing.len() <= MAX_MISSING_SEQUENCE_SIZE {
            return;
        }

        let last = self.last_sequence;
        let cutoff = i32::from(last) - i32::from(MAX_REASONABLE_SEQUENCE_GAP);
        if cutoff >= 0 {
            let cutoff = cutoff as u16;
            self.missing
                .retain(|&skipped| skipped <= last && skipped > cutoff);
        } else {
            let rollover_cutoff = (cutoff + i32::from(u16::MAX) + 1) as u16;
            self.missing
                .retain(|&skipped| skipped <= last || skipped > rollover_cutoff);
        }

        if self.missing.len() > MAX_MISSING_SEQUENCE_SIZE {
            let mut by_age: Vec<SequenceNumber> = self.missing.iter().copied().collect();
            by_age.sort_unstable_by_key(|&skipped| last.wrapping_sub(skipped));
            by_age.truncate(MAX_MISSING_SEQUENCE_SIZE);
            self.missing = by_age.into_iter().collect();
        }
    }

    /// The highest accepted sequence number. Undefined until a packet has
    /// been observed.
    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    /// The sequence numbers observed skipped and not yet received.
    pub fn missing_sequences(&self) -> &HashSet<SequenceNumber> {
        &self.missing
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

    /// Mean sender-to-server transit time per packet, in microseconds.
    pub fn average_transit_time_us(&self) -> u64 {
        self.per_packet(self.total_transit_us)
    }

    /// Mean octree processing time per packet, in microseconds.
    pub fn average_process_time_us(&self) -> u64 {
        self.per_packet(self.total_process_us)
    }

    /// Mean octree write-lock wait per packet, in microseconds.
    pub fn average_lock_wait_time_us(&self) -> u64 {
        self.per_packet(self.total_lock_wait_us)
    }

    /// Mean edit records per packet.
    pub fn average_elements_per_packet(&self) -> u64 {
        self.per_packet(self.total_elements)
    }

    fn per_packet(&self, total: u64) -> u64 {
        if self.total_packets == 0 {
            0
        } else {
            total / self.total_packets
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{SequenceTracker, MAX_MISSING_SEQUENCE_SIZE};

    fn observe_all(tracker: &mut SequenceTracker, sequences: &[u16]) {
        for &sequence in sequences {
            tracker.observe(sequence, 0, 0, 0, 0);
        }
    }

    fn missing_of(tracker: &SequenceTracker) -> HashSet<u16> {
        tracker.missing_sequences().clone()
    }

    #[test]
    fn on_time_stream_has_no_missing() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[10, 11, 12, 13]);

        assert_eq!(tracker.last_sequence(), 13);
        assert!(tracker.missing_sequences().is_empty());
        assert_eq!(tracker.total_packets(), 4);
    }

    #[test]
    fn early_packet_marks_the_skipped_range_missing() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[10, 13]);

        assert_eq!(tracker.last_sequence(), 13);
        assert_eq!(missing_of(&tracker), HashSet::from([11, 12]));
    }

    #[test]
    fn late_packet_fills_its_gap_without_moving_last_sequence() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[10, 13, 11]);

        assert_eq!(tracker.last_sequence(), 13);
        assert_eq!(missing_of(&tracker), HashSet::from([12]));
        assert_eq!(tracker.total_packets(), 3);
    }

    #[test]
    fn early_packet_across_rollover() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[65534, 1]);

        assert_eq!(tracker.last_sequence(), 1);
        assert_eq!(missing_of(&tracker), HashSet::from([65535, 0]));
    }

    #[test]
    fn late_packet_across_rollover() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[65534, 2, 0]);

        assert_eq!(tracker.last_sequence(), 2);
        assert_eq!(missing_of(&tracker), HashSet::from([65535, 1]));
    }

    #[test]
    fn unreasonable_gap_is_ignored_but_still_counted() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[100, 5000]);

        assert_eq!(tracker.last_sequence(), 100);
        assert!(tracker.missing_sequences().is_empty());
        assert_eq!(tracker.total_packets(), 2);
    }

    #[test]
    fn unreasonable_backwards_gap_is_ignored() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[5000, 100]);

        assert_eq!(tracker.last_sequence(), 5000);
        assert!(tracker.missing_sequences().is_empty());
    }

    #[test]
    fn first_sequence_is_accepted_as_is() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[40000]);

        assert_eq!(tracker.last_sequence(), 40000);
        assert!(tracker.missing_sequences().is_empty());
        assert_eq!(tracker.total_packets(), 1);
    }

    #[test]
    fn duplicate_on_time_packet_reads_as_late() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[10, 11, 11]);

        assert_eq!(tracker.last_sequence(), 11);
        assert!(tracker.missing_sequences().is_empty());
        assert_eq!(tracker.total_packets(), 3);
    }

    #[test]
    fn missing_set_never_exceeds_its_bound() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(0, 0, 0, 0, 0);

        let mut sequence: u16 = 0;
        for _ in 0..50 {
            sequence = sequence.wrapping_add(900);
            tracker.observe(sequence, 0, 0, 0, 0);
            assert!(tracker.missing_sequences().len() <= MAX_MISSING_SEQUENCE_SIZE);
        }
    }

    #[test]
    fn prune_keeps_the_newest_missing_numbers() {
        let mut tracker = SequenceTracker::new();
        observe_all(&mut tracker, &[0, 150]);

        let missing = missing_of(&tracker);
        assert_eq!(missing.len(), MAX_MISSING_SEQUENCE_SIZE);
        // the newest 100 skipped numbers survive, the oldest are gone
        assert!(missing.contains(&149));
        assert!(missing.contains(&50));
        assert!(!missing.contains(&49));
        assert!(!missing.contains(&1));
    }

    #[test]
    fn prune_drops_entries_too_far_behind() {
        let mut tracker = SequenceTracker::new();
        // a burst of gaps, then a clean run far ahead
        observe_all(&mut tracker, &[0, 120]);
        observe_all(&mut tracker, &[1000, 1150]);

        for skipped in missing_of(&tracker) {
            let age = tracker.last_sequence().wrapping_sub(skipped);
            assert!(age <= 1000, "stale missing number {skipped} survived");
        }
        assert!(tracker.missing_sequences().len() <= MAX_MISSING_SEQUENCE_SIZE);
    }

    #[test]
    fn prune_handles_rollover_window() {
        let mut tracker = SequenceTracker::new();
        // last_sequence lands just past 0, with skips on both sides of the
        // rollover point
        observe_all(&mut tracker, &[65400, 65500]);
        observe_all(&mut tracker, &[50, 120]);

        let missing = missing_of(&tracker);
        assert!(missing.len() <= MAX_MISSING_SEQUENCE_SIZE);
        for skipped in missing {
            let age = tracker.last_sequence().wrapping_sub(skipped);
            assert!(age <= 1000, "stale missing number {skipped} survived");
        }
    }

    #[test]
    fn counters_accumulate() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(1, 100, 3, 40, 10);
        tracker.observe(2, 300, 1, 20, 30);

        assert_eq!(tracker.total_packets(), 2);
        assert_eq!(tracker.total_elements(), 4);
        assert_eq!(tracker.total_transit_us(), 400);
        assert_eq!(tracker.total_process_us(), 60);
        assert_eq!(tracker.total_lock_wait_us(), 40);
        assert_eq!(tracker.average_transit_time_us(), 200);
        assert_eq!(tracker.average_process_time_us(), 30);
        assert_eq!(tracker.average_lock_wait_time_us(), 20);
        assert_eq!(tracker.average_elements_per_packet(), 2);
    }

    #[test]
    fn averages_are_zero_before_any_packet() {
        let tracker = SequenceTracker::new();
        assert_eq!(tracker.average_transit_time_us(), 0);
        assert_eq!(tracker.average_elements_per_packet(), 0);
    }
}
