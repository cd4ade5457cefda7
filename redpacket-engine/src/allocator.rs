//! Share computation for a single claim.
//!
//! [`allocate`] is a pure function of the packet's split state and a random
//! source. [`Allocator`] owns the generator so production can draw from OS
//! entropy while tests pin a seed.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{Amount, PacketType, SplitState};

/// Amount the next claimer receives.
///
/// The last open slot always takes exactly what is left. Otherwise an even
/// packet pays `total_amount / total_count` and leaves any remainder for the
/// last slot, and a lucky packet draws uniformly from
/// `[1, 2 * remaining_amount / remaining_count - 1]`, which keeps at least one
/// unit for every slot still open after this one.
///
/// Callers guarantee `remaining_count >= 1` and
/// `remaining_amount >= remaining_count`.
pub fn allocate<R>(state: SplitState, rng: &mut R) -> Amount
where
    R: Rng + ?Sized,
{
    if state.remaining_count == 1 {
        return state.remaining_amount;
    }

    match state.packet_type {
        PacketType::Even => state.total_amount / Amount::from(state.total_count),
        PacketType::Lucky => {
            let average = state.remaining_amount / Amount::from(state.remaining_count);
            let max = (average * 2 - 1).max(1);
            rng.gen_range(1..=max)
        }
    }
}

/// Seedable random source for lucky splits
pub struct Allocator {
    rng: Mutex<StdRng>,
}

impl Allocator {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic allocator for reproducible draws
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn allocate(&self, state: SplitState) -> Amount {
        let mut rng = self.rng.lock();
        allocate(state, &mut *rng)
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::from_entropy()
    }
}
