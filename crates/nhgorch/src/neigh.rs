//! Next hop resolution interface provided by NeighOrch.

use crate::nhg::{NextHopFlags, NextHopKey};
use sonic_sai::NextHopOid;

/// What the next hop group layer needs from neighbor resolution.
///
/// All methods take `&self`; implementations use interior mutability.
pub trait NeighborResolver: Send + Sync {
    fn has_next_hop(&self, key: &NextHopKey) -> bool;

    /// Returns [`NextHopOid::NULL`] when the next hop is not resolved.
    fn get_next_hop_id(&self, key: &NextHopKey) -> NextHopOid;

    /// Creates a labeled next hop on top of its resolved unlabeled root.
    fn add_next_hop(&self, key: &NextHopKey) -> bool;

    fn increase_next_hop_ref_count(&self, key: &NextHopKey);

    fn decrease_next_hop_ref_count(&self, key: &NextHopKey);

    fn get_next_hop_ref_count(&self, key: &NextHopKey) -> u32;

    fn is_next_hop_flag_set(&self, key: &NextHopKey, flag: NextHopFlags) -> bool;

    fn remove_next_hop(&self, key: &NextHopKey) -> bool;
}
