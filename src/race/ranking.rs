//! Race positions
//!
//! Cars are ordered by more laps first, then by the earlier last crossing,
//! then by lower slot index. The comparison never returns `Equal` for two
//! different slots, so the ranking is a strict total order.

use super::car::CarState;
use crate::constants::CAR_COUNT;
use std::cmp::Ordering;

/// Compare two car slots by race position
pub fn compare(cars: &[CarState; CAR_COUNT], a: usize, b: usize) -> Ordering {
    cars[b]
        .laps
        .cmp(&cars[a].laps)
        .then(cars[a].last_crossing_us.cmp(&cars[b].last_crossing_us))
        .then(a.cmp(&b))
}

/// All slots, leader first
pub fn rank(cars: &[CarState; CAR_COUNT]) -> [usize; CAR_COUNT] {
    let mut order: [usize; CAR_COUNT] = std::array::from_fn(|i| i);
    order.sort_by(|&a, &b| compare(cars, a, b));
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cars_with(laps: [u8; CAR_COUNT], crossing: [u64; CAR_COUNT]) -> [CarState; CAR_COUNT] {
        std::array::from_fn(|i| CarState {
            laps: laps[i],
            last_crossing_us: crossing[i],
            ..CarState::default()
        })
    }

    #[test]
    fn test_identity_when_untouched() {
        let cars = [CarState::default(); CAR_COUNT];
        assert_eq!(rank(&cars), [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_more_laps_first_then_earlier_crossing() {
        let cars = cars_with([2, 3, 3, 0, 1, 0], [500, 900, 800, 0, 100, 0]);
        assert_eq!(rank(&cars), [2, 1, 0, 4, 3, 5]);
    }

    proptest! {
        #[test]
        fn prop_strict_total_order(
            laps in any::<[u8; 6]>(),
            crossing in any::<[u64; 6]>(),
        ) {
            let cars = cars_with(laps, crossing);
            for a in 0..CAR_COUNT {
                for b in 0..CAR_COUNT {
                    let ab = compare(&cars, a, b);
                    prop_assert_eq!(ab, compare(&cars, b, a).reverse());
                    prop_assert_eq!(ab == Ordering::Equal, a == b);
                }
            }
        }

        #[test]
        fn prop_rank_is_stable(
            laps in any::<[u8; 6]>(),
            crossing in any::<[u64; 6]>(),
        ) {
            let cars = cars_with(laps, crossing);
            let first = rank(&cars);
            prop_assert_eq!(first, rank(&cars));
            for pair in first.windows(2) {
                prop_assert_eq!(compare(&cars, pair[0], pair[1]), Ordering::Less);
            }
        }
    }
}
