//! Property tests for LED addressing.
//!
//! 1. `index` is a bijection between active slots and `0..N`.
//! 2. Levels are exhausted in wiring order, blocks left to right.
//! 3. Re-applying a layout resizes the buffer to the active slot count and clears it.

use proptest::prelude::*;
use shelf_core::{Layout, Position, SlotSpec};
use shelf_led::{LedAddressing, LedController, RecordingDriver, Rgb, WiringOrder};

// ── Helpers ─────────────────────────────────────────────────────────────

/// Random layout: up to 6 levels, up to 10 blocks each, some inactive
fn layout_strategy() -> impl Strategy<Value = Layout> {
    prop::collection::btree_map(1u32..=6, prop::collection::vec(any::<bool>(), 1..=10), 1..=6)
        .prop_filter_map("at least one active slot", |levels| {
            let slots = levels.into_iter().flat_map(|(level, row)| {
                row.into_iter().enumerate().map(move |(i, active)| {
                    (
                        Position::new(level, i as u32 + 1),
                        SlotSpec {
                            capacity: 24,
                            active,
                        },
                    )
                })
            });
            Layout::from_slots(slots).ok()
        })
}

fn order_strategy() -> impl Strategy<Value = WiringOrder> {
    prop_oneof![Just(WiringOrder::TopDown), Just(WiringOrder::BottomUp)]
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Bijection onto 0..N
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn index_is_bijection(layout in layout_strategy(), order in order_strategy()) {
        let addressing = LedAddressing::from_layout(&layout, order);
        let n = layout.active_count();
        prop_assert_eq!(addressing.len(), n);

        let mut seen = vec![false; n];
        for pos in layout.positions() {
            let index = addressing.index(pos);
            prop_assert!(index.is_some(), "{} has no index", pos);
            let index = index.unwrap();
            prop_assert!(index < n);
            prop_assert!(!seen[index], "index {} used twice", index);
            seen[index] = true;
            prop_assert_eq!(addressing.position_of(index), Some(pos));
        }
        prop_assert!(seen.iter().all(|s| *s));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Monotonic by level in wiring direction
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn index_monotonic_in_wiring_order(layout in layout_strategy(), order in order_strategy()) {
        let addressing = LedAddressing::from_layout(&layout, order);
        let strip = addressing.positions();
        for pair in strip.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.level == b.level {
                prop_assert!(a.block < b.block);
            } else {
                match order {
                    WiringOrder::TopDown => prop_assert!(a.level > b.level),
                    WiringOrder::BottomUp => prop_assert!(a.level < b.level),
                }
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Layout change resizes and clears
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn layout_change_resizes_and_clears(layout in layout_strategy()) {
        let driver = RecordingDriver::new();
        let controller =
            LedController::new(&Layout::fallback(), WiringOrder::TopDown, Box::new(driver.clone()));
        controller.light_level(1, Rgb::RED).unwrap();

        let layout = layout.with_version(1);
        prop_assert!(controller.apply_layout(&layout).unwrap());

        prop_assert_eq!(controller.len(), layout.active_count());
        prop_assert_eq!(controller.state().active_count, 0);
        prop_assert_eq!(driver.last_frame(), Some(vec![Rgb::OFF; layout.active_count()]));
    }
}
