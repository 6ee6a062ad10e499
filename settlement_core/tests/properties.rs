/// Property tests: arbitrary command sequences interleaved with time
/// passing never break the progression rules, ticks are idempotent, and
/// export/hydrate reproduces the same instances.

use std::sync::Arc;

use proptest::prelude::*;

use settlement_core::catalog::{BuildingCatalog, PlotRegistry};
use settlement_core::{Clock, ManualClock, Resource, Settlement, SettlementConfig, MAX_LEVEL};

const PLOTS: [&str; 6] = ["townhall", "plot_a", "plot_b", "plot_c", "plot_d", "plot_e"];
const BUILDINGS: [&str; 5] = ["farm", "lumber", "house", "barracks", "quarry"];

#[derive(Debug, Clone)]
enum Op {
    Place(usize, usize),
    Upgrade(usize),
    Cancel(usize, f64),
    Speedup(usize, f64),
    Advance(u64),
    FinishAll,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..PLOTS.len(), 0..BUILDINGS.len()).prop_map(|(p, b)| Op::Place(p, b)),
        4 => (0..PLOTS.len()).prop_map(Op::Upgrade),
        1 => (0..PLOTS.len(), 0.0..=1.0f64).prop_map(|(p, f)| Op::Cancel(p, f)),
        1 => (0..PLOTS.len(), 0.01..0.99f64).prop_map(|(p, f)| Op::Speedup(p, f)),
        3 => (0u64..120_000).prop_map(Op::Advance),
        1 => Just(Op::FinishAll),
    ]
}

fn settlement(clock: &ManualClock, queue_limit: usize, timers: bool) -> Settlement {
    let config = SettlementConfig {
        queue_limit,
        timers_enabled: timers,
        starting_resources: Resource::ALL.iter().map(|r| (*r, 1_000_000.0)).collect(),
        ..SettlementConfig::default()
    };
    Settlement::new(
        Arc::new(BuildingCatalog::standard()),
        Arc::new(PlotRegistry::standard()),
        config,
        Arc::new(clock.clone()),
    )
}

fn run(s: &mut Settlement, clock: &ManualClock, op: &Op) {
    // Rejections are expected; only the invariants matter here.
    let _ = match *op {
        Op::Place(p, b) => s.place_building_on_plot(PLOTS[p], BUILDINGS[b]).map(|_| ()),
        Op::Upgrade(p) => s.upgrade_plot(PLOTS[p]).map(|_| ()),
        Op::Cancel(p, f) => s.cancel(PLOTS[p], f).map(|_| ()),
        Op::Speedup(p, f) => s.apply_speedup(PLOTS[p], f).map(|_| ()),
        Op::Advance(ms) => {
            clock.advance(ms);
            s.tick_now();
            Ok(())
        }
        Op::FinishAll => {
            s.finish_all_now();
            Ok(())
        }
    };
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_after_every_step(
        ops in prop::collection::vec(op(), 1..60),
        queue_limit in 1usize..4,
        timers in any::<bool>(),
    ) {
        let clock = ManualClock::new(1_000);
        let mut s = settlement(&clock, queue_limit, timers);
        for op in &ops {
            run(&mut s, &clock, op);
            prop_assert!(s.check_invariants().is_ok(), "after {:?}: {:?}", op, s.check_invariants());

            let townhall = s.townhall_level();
            for inst in s.get_all_instances() {
                prop_assert!((1..=MAX_LEVEL).contains(&inst.level));
                if !inst.is_townhall() {
                    prop_assert!(inst.level <= townhall);
                }
            }
            let queue = s.get_queue_info();
            prop_assert!(queue.active <= queue_limit);
        }
    }

    #[test]
    fn tick_is_idempotent(ops in prop::collection::vec(op(), 1..40), extra in 0u64..200_000) {
        let clock = ManualClock::new(1_000);
        let mut s = settlement(&clock, 2, true);
        for op in &ops {
            run(&mut s, &clock, op);
        }
        let now = clock.now_ms() + extra;
        s.tick(now);
        let once = s.state().clone();
        prop_assert!(s.tick(now).is_empty());
        prop_assert_eq!(s.state(), &once);
    }

    #[test]
    fn export_hydrate_round_trip(ops in prop::collection::vec(op(), 1..40)) {
        let clock = ManualClock::new(1_000);
        let mut s = settlement(&clock, 2, true);
        for op in &ops {
            run(&mut s, &clock, op);
        }
        s.tick_now();

        let mut restored = settlement(&clock, 2, true);
        let report = restored
            .hydrate(&s.export_records(), Some(s.resources().balances()))
            .unwrap();
        prop_assert_eq!(report.dropped, 0);
        prop_assert_eq!(report.repaired, 0);
        prop_assert_eq!(restored.state(), s.state());
        for plot in PLOTS {
            prop_assert_eq!(restored.get_status(plot), s.get_status(plot));
        }
    }
}
