//! Property tests: random operation sequences checked against a plain map
//! from id to location.

use crate::{DoHierarchy, DoId, HierarchyConfig, HierarchyError, Location, ZoneId};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

const PARENTS: std::ops::Range<u64> = 1..4;
const ZONES: std::ops::Range<u32> = 1..4;

#[derive(Debug, Clone)]
enum Op {
    Store(u64, u64, u32),
    Delete(u64, u64, u32),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (1u64..10, PARENTS, ZONES).prop_map(|(id, p, z)| Op::Store(id, p, z)),
        5 => (1u64..10, PARENTS, ZONES).prop_map(|(id, p, z)| Op::Delete(id, p, z)),
        1 => Just(Op::Clear),
    ]
}

fn quiet_hierarchy() -> DoHierarchy {
    let mut config = HierarchyConfig::default();
    config.logging.level = "error".to_string();
    config.logging.history_capacity = 0;
    DoHierarchy::with_config(&config).expect("valid config")
}

type Model = HashMap<DoId, Location>;

fn expected(model: &Model, parent: DoId, zone: Option<ZoneId>) -> HashSet<DoId> {
    model
        .iter()
        .filter(|(_, loc)| loc.parent == parent && zone.map_or(true, |z| loc.zone == z))
        .map(|(id, _)| *id)
        .collect()
}

fn assert_matches_model(h: &mut DoHierarchy, model: &Model) -> Result<(), TestCaseError> {
    prop_assert_eq!(h.size().unwrap(), model.len());
    prop_assert_eq!(h.is_empty().unwrap(), model.is_empty());

    for parent in PARENTS.map(DoId) {
        let all: HashSet<DoId> = h.query(parent, None).unwrap().into_iter().collect();
        prop_assert_eq!(&all, &expected(model, parent, None));

        for zone in ZONES.map(ZoneId) {
            let cell: HashSet<DoId> = h.query(parent, Some(zone)).unwrap().into_iter().collect();
            prop_assert_eq!(&cell, &expected(model, parent, Some(zone)));
        }

        let live_zones: HashSet<ZoneId> = h.zones(parent).unwrap().into_iter().collect();
        let model_zones: HashSet<ZoneId> = model
            .values()
            .filter(|loc| loc.parent == parent)
            .map(|loc| loc.zone)
            .collect();
        prop_assert_eq!(live_zones, model_zones);
    }

    let live_parents: HashSet<DoId> = h.parents().unwrap().into_iter().collect();
    let model_parents: HashSet<DoId> = model.values().map(|loc| loc.parent).collect();
    prop_assert_eq!(live_parents, model_parents);

    prop_assert!(h.check_invariants().is_ok());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn random_sequences_track_reference_model(ops in prop::collection::vec(op(), 1..60)) {
        let mut h = quiet_hierarchy();
        let mut model = Model::new();

        for op in ops {
            match op {
                Op::Store(id, p, z) => {
                    let (id, loc) = (DoId(id), Location::new(p, z));
                    let result = h.store(id, loc.parent, loc.zone, "");
                    if model.contains_key(&id) {
                        let is_duplicate = matches!(result, Err(HierarchyError::DuplicateRegistration(_)));
                        prop_assert!(is_duplicate);
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(id, loc);
                    }
                }
                Op::Delete(id, p, z) => {
                    let (id, loc) = (DoId(id), Location::new(p, z));
                    let result = h.delete(id, loc.parent, loc.zone, "");
                    if model.get(&id) == Some(&loc) {
                        prop_assert!(result.is_ok());
                        model.remove(&id);
                    } else {
                        prop_assert!(result.is_err());
                    }
                }
                Op::Clear => {
                    h.clear();
                    model.clear();
                    for parent in PARENTS.map(DoId) {
                        prop_assert!(h.query(parent, None).unwrap().is_empty());
                    }
                    prop_assert_eq!(h.size().unwrap(), 0);
                }
            }
            prop_assert!(!h.is_poisoned());
            assert_matches_model(&mut h, &model)?;
        }
    }

    #[test]
    fn store_then_delete_restores_prior_state(
        prefix in prop::collection::hash_map(1u64..50, (PARENTS, ZONES), 0..20),
        parent in PARENTS,
        zone in ZONES,
    ) {
        let mut h = quiet_hierarchy();
        for (id, (p, z)) in &prefix {
            h.store(DoId(*id), DoId(*p), ZoneId(*z), "").unwrap();
        }
        let before = h.snapshot().unwrap();

        let fresh = DoId(1_000);
        h.store(fresh, DoId(parent), ZoneId(zone), "").unwrap();
        h.delete(fresh, DoId(parent), ZoneId(zone), "").unwrap();

        prop_assert_eq!(h.snapshot().unwrap(), before);
        prop_assert_eq!(h.size().unwrap(), prefix.len());
        prop_assert!(h.check_invariants().is_ok());
    }

    #[test]
    fn duplicate_store_never_changes_the_table(
        id in 1u64..10,
        first in (PARENTS, ZONES),
        second in (PARENTS, ZONES),
    ) {
        let mut h = quiet_hierarchy();
        h.store(DoId(id), DoId(first.0), ZoneId(first.1), "").unwrap();
        let before = h.snapshot().unwrap();

        let result = h.store(DoId(id), DoId(second.0), ZoneId(second.1), "");
        let is_duplicate = matches!(result, Err(HierarchyError::DuplicateRegistration(_)));
        prop_assert!(is_duplicate);
        prop_assert_eq!(h.snapshot().unwrap(), before);
    }
}
