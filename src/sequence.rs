//! Carrier TDM sequence allocation.
//!
//! The hardware consumes carriers over a shared time-division-multiplexed
//! input whose repeating slot pattern is programmed by software. A carrier
//! with sample-rate class `c` must occupy `2^c` slots of the pattern, and
//! the hardware delivers its samples with the least jitter when those slots
//! are spaced evenly. This module owns that placement logic.

use crate::config::CcId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maximum TDM sequence length.
pub const SEQ_LENGTH_MAX: usize = 16;

/// Slot placement policy.
///
/// Even spacing is the default: it equalizes the inter-occurrence gaps of a
/// carrier's slots, minimizing jitter in the TDM delivery of its samples.
/// The contiguous policy packs a carrier's slots into the first free run and
/// is kept as an alternative pending confirmation against the hardware
/// behavioural model.
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SlotPolicy {
    /// Spread the carrier's slots with a constant stride.
    #[default]
    EvenlySpaced,
    /// Pack the carrier's slots into one contiguous run.
    Contiguous,
}

/// The TDM slot sequence.
///
/// An ordered, fixed-capacity table of carrier identifiers in which a given
/// identifier may repeat. Slot positions are stable hardware slot numbers:
/// removal clears positions but never compacts the table. The declared
/// length always equals the highest occupied position plus one.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct CcSequence {
    slots: [Option<CcId>; SEQ_LENGTH_MAX],
}

impl CcSequence {
    /// Creates an empty sequence.
    pub fn new() -> CcSequence {
        CcSequence::default()
    }

    /// Returns the declared sequence length: the highest occupied position
    /// plus one, or 0 for an empty sequence.
    pub fn length(&self) -> usize {
        self.slots
            .iter()
            .rposition(|slot| slot.is_some())
            .map_or(0, |p| p + 1)
    }

    /// Returns the carrier occupying a slot position, if any.
    pub fn slot(&self, position: usize) -> Option<CcId> {
        self.slots.get(position).copied().flatten()
    }

    /// Returns the full slot table.
    pub fn slots(&self) -> &[Option<CcId>; SEQ_LENGTH_MAX] {
        &self.slots
    }

    /// Counts the slot positions holding a carrier.
    pub fn occupancy(&self, cc_id: CcId) -> usize {
        self.slots
            .iter()
            .filter(|slot| **slot == Some(cc_id))
            .count()
    }

    /// Returns whether a carrier appears anywhere in the sequence.
    pub fn contains(&self, cc_id: CcId) -> bool {
        self.slots.iter().any(|slot| *slot == Some(cc_id))
    }

    /// Allocates `2^rate_class` slots to a carrier and returns the chosen
    /// positions in ascending order.
    ///
    /// Re-adding a carrier is idempotent: its existing slots count as
    /// available, so repeating an `add` with the same rate class reproduces
    /// the same placement. Changing the rate class of a present carrier
    /// reallocates it. The operation is all-or-nothing: on
    /// [`Error::CapacityExceeded`] the sequence is left untouched,
    /// including any prior allocation of this carrier.
    pub fn add(&mut self, cc_id: CcId, rate_class: u8, policy: SlotPolicy) -> Result<Vec<usize>> {
        if rate_class > 3 {
            return Err(Error::OutOfRange {
                field: "rate_class",
                value: rate_class.into(),
            });
        }
        let replication = 1usize << rate_class;

        // Work on a scratch copy with this carrier's slots cleared, so that
        // a re-add sees them as free and failure leaves self untouched.
        let mut scratch = self.clone();
        scratch.clear(cc_id);

        let positions = match policy {
            SlotPolicy::EvenlySpaced => scratch.find_evenly_spaced(replication),
            SlotPolicy::Contiguous => scratch.find_contiguous(replication),
        };
        let Some(positions) = positions else {
            return Err(Error::CapacityExceeded { cc_id, rate_class });
        };
        for &position in &positions {
            scratch.slots[position] = Some(cc_id);
        }
        *self = scratch;
        Ok(positions)
    }

    /// Clears every slot position holding a carrier.
    ///
    /// Positions are not compacted; the declared length shrinks only if the
    /// tail of the sequence becomes free.
    pub fn remove(&mut self, cc_id: CcId) {
        self.clear(cc_id);
    }

    /// Reallocates a carrier at a new rate class.
    ///
    /// Equivalent to remove followed by add, with strong exception safety:
    /// if no placement exists the prior allocation is left untouched.
    pub fn update(
        &mut self,
        cc_id: CcId,
        rate_class: u8,
        policy: SlotPolicy,
    ) -> Result<Vec<usize>> {
        self.add(cc_id, rate_class, policy)
    }

    fn clear(&mut self, cc_id: CcId) {
        for slot in self.slots.iter_mut() {
            if *slot == Some(cc_id) {
                *slot = None;
            }
        }
    }

    /// Searches for `replication` free slots spaced with a constant stride.
    ///
    /// Candidate pattern lengths are multiples of the replication count, no
    /// shorter than the current extent, up to the hardware maximum. Longer
    /// candidates are tried first: spreading over the widest pattern leaves
    /// the most stride offsets free for carriers added later. Within a
    /// candidate length `l` the stride is `l / replication`; start offsets
    /// are scanned from `stride - 1` downward, so the first carrier placed
    /// anchors its last occurrence at `l - 1`. The declared length then
    /// equals `l` and every cyclic inter-occurrence gap equals the stride,
    /// including the wrap-around gap from the last occurrence back to the
    /// first. The first hit wins, which keeps the search deterministic.
    fn find_evenly_spaced(&self, replication: usize) -> Option<Vec<usize>> {
        let current = self.length();
        for l in (1..=SEQ_LENGTH_MAX / replication)
            .rev()
            .map(|m| m * replication)
        {
            if l < current {
                continue;
            }
            let stride = l / replication;
            for start in (0..stride).rev() {
                let positions: Vec<usize> =
                    (0..replication).map(|k| start + k * stride).collect();
                if positions.iter().all(|&p| self.slots[p].is_none()) {
                    return Some(positions);
                }
            }
        }
        None
    }

    /// Searches for the first free run of `replication` adjacent slots.
    fn find_contiguous(&self, replication: usize) -> Option<Vec<usize>> {
        for start in 0..=(SEQ_LENGTH_MAX - replication) {
            let positions: Vec<usize> = (start..start + replication).collect();
            if positions.iter().all(|&p| self.slots[p].is_none()) {
                return Some(positions);
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cc(id: u8) -> CcId {
        CcId::new(id).unwrap()
    }

    #[test]
    fn occupancy_matches_rate_class() {
        let mut seq = CcSequence::new();
        for (id, rate) in [(0, 0), (1, 1), (2, 2)] {
            seq.add(cc(id), rate, SlotPolicy::EvenlySpaced).unwrap();
            assert_eq!(seq.occupancy(cc(id)), 1 << rate);
        }
        // no slot lost on the earlier carriers
        assert_eq!(seq.occupancy(cc(0)), 1);
        assert_eq!(seq.occupancy(cc(1)), 2);
    }

    #[test]
    fn re_add_is_idempotent() {
        let mut seq = CcSequence::new();
        seq.add(cc(3), 1, SlotPolicy::EvenlySpaced).unwrap();
        seq.add(cc(5), 2, SlotPolicy::EvenlySpaced).unwrap();
        let snapshot = seq.clone();
        let positions = seq.add(cc(5), 2, SlotPolicy::EvenlySpaced).unwrap();
        assert_eq!(seq, snapshot);
        assert_eq!(positions.len(), 4);
    }

    #[test]
    fn add_never_moves_other_carriers() {
        let mut seq = CcSequence::new();
        seq.add(cc(0), 3, SlotPolicy::EvenlySpaced).unwrap();
        let before: Vec<usize> = (0..SEQ_LENGTH_MAX)
            .filter(|&p| seq.slot(p) == Some(cc(0)))
            .collect();
        seq.add(cc(1), 3, SlotPolicy::EvenlySpaced).unwrap();
        let after: Vec<usize> = (0..SEQ_LENGTH_MAX)
            .filter(|&p| seq.slot(p) == Some(cc(0)))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn capacity_exceeded_leaves_sequence_untouched() {
        let mut seq = CcSequence::new();
        seq.add(cc(0), 3, SlotPolicy::EvenlySpaced).unwrap();
        seq.add(cc(1), 3, SlotPolicy::EvenlySpaced).unwrap();
        let snapshot = seq.clone();
        // table is full: 8 + 8 slots
        assert!(matches!(
            seq.add(cc(2), 0, SlotPolicy::EvenlySpaced),
            Err(Error::CapacityExceeded { .. })
        ));
        assert_eq!(seq, snapshot);
    }

    #[test]
    fn update_failure_keeps_prior_allocation() {
        let mut seq = CcSequence::new();
        seq.add(cc(0), 3, SlotPolicy::EvenlySpaced).unwrap();
        seq.add(cc(1), 2, SlotPolicy::EvenlySpaced).unwrap();
        seq.add(cc(2), 2, SlotPolicy::EvenlySpaced).unwrap();
        let snapshot = seq.clone();
        // growing carrier 1 to 8 slots cannot fit next to 8 + 4
        assert!(seq.update(cc(1), 3, SlotPolicy::EvenlySpaced).is_err());
        assert_eq!(seq, snapshot);
    }

    #[test]
    fn remove_then_re_add_restores_occupancy() {
        let mut seq = CcSequence::new();
        seq.add(cc(4), 2, SlotPolicy::EvenlySpaced).unwrap();
        let count = seq.occupancy(cc(4));
        seq.remove(cc(4));
        assert_eq!(seq.occupancy(cc(4)), 0);
        seq.add(cc(4), 2, SlotPolicy::EvenlySpaced).unwrap();
        assert_eq!(seq.occupancy(cc(4)), count);
    }

    #[test]
    fn remove_does_not_compact() {
        let mut seq = CcSequence::new();
        seq.add(cc(0), 0, SlotPolicy::EvenlySpaced).unwrap();
        let positions = seq.add(cc(1), 2, SlotPolicy::EvenlySpaced).unwrap();
        seq.remove(cc(0));
        for &p in &positions {
            assert_eq!(seq.slot(p), Some(cc(1)));
        }
    }

    #[test]
    fn length_tracks_highest_occupied() {
        let mut seq = CcSequence::new();
        assert_eq!(seq.length(), 0);
        // the first placement anchors the tail of the full pattern
        seq.add(cc(0), 0, SlotPolicy::EvenlySpaced).unwrap();
        assert_eq!(seq.slot(SEQ_LENGTH_MAX - 1), Some(cc(0)));
        assert_eq!(seq.length(), SEQ_LENGTH_MAX);
        let positions = seq.add(cc(1), 2, SlotPolicy::EvenlySpaced).unwrap();
        // freeing the tail slot shrinks the declared length to the highest
        // remaining occupied position
        seq.remove(cc(0));
        assert_eq!(seq.length(), positions.iter().max().unwrap() + 1);
        seq.remove(cc(1));
        assert_eq!(seq.length(), 0);
    }

    #[test]
    fn even_spacing_has_even_cyclic_gaps() {
        let mut seq = CcSequence::new();
        let positions = seq.add(cc(2), 2, SlotPolicy::EvenlySpaced).unwrap();
        let length = seq.length();
        // the repeating pattern ends exactly at the last occurrence
        assert_eq!(*positions.last().unwrap(), length - 1);
        let mut gaps: Vec<usize> = positions.windows(2).map(|w| w[1] - w[0]).collect();
        gaps.push(length + positions[0] - positions.last().unwrap());
        assert!(gaps.iter().all(|&gap| gap == length / positions.len()));
    }

    #[test]
    fn mixed_rate_scenario() {
        let mut seq = CcSequence::new();
        let p0 = seq.add(cc(0), 0, SlotPolicy::EvenlySpaced).unwrap();
        assert_eq!(p0.len(), 1);
        let p1 = seq.add(cc(1), 2, SlotPolicy::EvenlySpaced).unwrap();
        assert_eq!(p1.len(), 4);
        assert!(p1.iter().all(|p| !p0.contains(p)));
        let occupied = seq.occupancy(cc(0)) + seq.occupancy(cc(1));
        assert!(occupied <= seq.length());
        assert!(seq.length() <= SEQ_LENGTH_MAX);
    }

    #[test]
    fn even_spacing_has_constant_stride() {
        let mut seq = CcSequence::new();
        let positions = seq.add(cc(7), 2, SlotPolicy::EvenlySpaced).unwrap();
        let strides: Vec<usize> = positions.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(strides.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn contiguous_policy_packs_a_run() {
        let mut seq = CcSequence::new();
        seq.add(cc(0), 0, SlotPolicy::Contiguous).unwrap();
        let positions = seq.add(cc(1), 2, SlotPolicy::Contiguous).unwrap();
        assert_eq!(positions, vec![1, 2, 3, 4]);
    }

    #[test]
    fn invalid_rate_class_rejected() {
        let mut seq = CcSequence::new();
        assert!(matches!(
            seq.add(cc(0), 4, SlotPolicy::EvenlySpaced),
            Err(Error::OutOfRange { .. })
        ));
    }
}
