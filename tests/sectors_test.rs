//! Sector validation, resolution and area.
//!
//! Run with: cargo test --test sectors_test

mod common;

use common::{quadrants, spec};
use pivot_tracker::tracking::circular::{ArcRange, normalize, signed_delta};
use pivot_tracker::tracking::sectors::InvalidReason;
use pivot_tracker::tracking::{SectorSet, SectorSpec};
use proptest::prelude::*;
use uuid::Uuid;

fn numero_at(set: &SectorSet, angle: f64) -> Option<i32> {
    set.resolve(angle).map(|s| s.numero)
}

#[test]
fn quadrants_validate_and_resolve_half_open() {
    let set = SectorSet::validate(quadrants()).unwrap();
    assert_eq!(set.len(), 4);

    assert_eq!(numero_at(&set, 0.0), Some(0));
    assert_eq!(numero_at(&set, 89.999), Some(0));
    assert_eq!(numero_at(&set, 90.0), Some(1));
    assert_eq!(numero_at(&set, 270.0), Some(3));
    assert_eq!(numero_at(&set, 359.9), Some(3));
    assert_eq!(numero_at(&set, 360.0), Some(0));
    assert_eq!(numero_at(&set, -10.0), Some(3));
    assert_eq!(numero_at(&set, f64::NAN), None);
}

#[test]
fn overlapping_sectors_are_rejected_with_the_pair() {
    let a = spec(1, 0.0, 100.0);
    let b = spec(2, 90.0, 180.0);
    let err = SectorSet::validate(vec![a.clone(), b.clone()]).unwrap_err();

    assert_eq!(err.conflicts.len(), 1);
    assert!(err.invalid.is_empty());
    let pair = &err.conflicts[0];
    assert_eq!((pair.numero_a, pair.numero_b), (1, 2));
    assert_eq!((pair.sector_a, pair.sector_b), (a.id, b.id));
}

#[test]
fn wrapping_sector_overlap_uses_the_unrolled_range() {
    // [350, 10) wraps through north
    let overlapping = SectorSet::validate(vec![spec(1, 350.0, 10.0), spec(2, 0.0, 20.0)]);
    assert!(overlapping.is_err());

    let adjacent = SectorSet::validate(vec![spec(1, 350.0, 10.0), spec(2, 10.0, 20.0)]).unwrap();
    assert_eq!(numero_at(&adjacent, 355.0), Some(1));
    assert_eq!(numero_at(&adjacent, 5.0), Some(1));
    assert_eq!(numero_at(&adjacent, 10.0), Some(2));
    assert_eq!(numero_at(&adjacent, 25.0), None);
}

#[test]
fn every_problem_is_reported_and_nothing_is_accepted() {
    let mut bad_coef = spec(3, 200.0, 220.0);
    bad_coef.coeficiente_riego = 0.0;
    let mut out_of_range = spec(4, 300.0, 400.0);
    out_of_range.radio_externo_m = 50.0;
    let empty = spec(5, 45.0, 45.0);
    let mut bad_radius = spec(6, 230.0, 240.0);
    bad_radius.radio_interno_m = 500.0;

    let err = SectorSet::validate(vec![
        spec(1, 0.0, 100.0),
        spec(2, 50.0, 150.0),
        bad_coef,
        out_of_range,
        empty,
        bad_radius,
    ])
    .unwrap_err();

    assert_eq!(err.conflicts.len(), 1);
    let reasons: Vec<_> = err.invalid.iter().map(|i| (i.numero, i.reason)).collect();
    assert_eq!(
        reasons,
        vec![
            (3, InvalidReason::NonPositiveCoefficient),
            (4, InvalidReason::AngleOutOfRange),
            (5, InvalidReason::EmptyRange),
            (6, InvalidReason::InvalidRadius),
        ]
    );
}

#[test]
fn duplicate_ids_are_invalid() {
    let a = spec(1, 0.0, 90.0);
    let mut b = spec(2, 90.0, 180.0);
    b.id = a.id;
    let err = SectorSet::validate(vec![a, b]).unwrap_err();
    assert_eq!(err.invalid.len(), 1);
    assert_eq!(err.invalid[0].reason, InvalidReason::DuplicateId);
}

#[test]
fn inactive_sectors_may_overlap_but_never_resolve() {
    let mut hidden = spec(9, 0.0, 180.0);
    hidden.activo = false;
    let mut specs = quadrants();
    specs.push(hidden.clone());

    let set = SectorSet::validate(specs).unwrap();
    assert_eq!(numero_at(&set, 45.0), Some(0));

    // Turning it on would overlap two active quadrants
    let err = set.with_active(hidden.id, true).unwrap().unwrap_err();
    assert_eq!(err.conflicts.len(), 2);

    assert!(set.with_active(Uuid::new_v4(), true).is_none());
}

#[test]
fn deactivating_a_sector_leaves_a_gap() {
    let specs = quadrants();
    let second = specs[1].id;
    let set = SectorSet::validate(specs).unwrap();

    let updated = set.with_active(second, false).unwrap().unwrap();
    assert_eq!(numero_at(&updated, 120.0), None);
    assert_eq!(numero_at(&updated, 200.0), Some(2));
    assert_eq!(updated.len(), 4);
}

#[test]
fn area_is_a_pie_slice_of_the_outer_radius() {
    let set = SectorSet::validate(quadrants()).unwrap();
    let quarter = &set.sectors()[0];
    let expected = std::f64::consts::PI * 400.0 * 400.0 / 4.0;
    assert!((quarter.area_m2() - expected).abs() < 1e-6);
    assert!((quarter.area_ha() - expected / 10_000.0).abs() < 1e-9);

    let wrapping = SectorSet::validate(vec![spec(1, 350.0, 10.0)]).unwrap();
    assert!((wrapping.sectors()[0].range.span() - 20.0).abs() < 1e-12);
}

#[test]
fn single_full_field_sector_covers_the_whole_circle() {
    let whole = spec(1, 0.0, 360.0);
    let set = SectorSet::validate(vec![whole.clone()]).unwrap();
    let sector = &set.sectors()[0];

    let disc = std::f64::consts::PI * 400.0 * 400.0;
    assert!((sector.area_m2() - disc).abs() < 1e-6);
    assert_eq!(sector.to_spec().angulo_fin, 360.0);
    for k in 0..720 {
        assert_eq!(numero_at(&set, f64::from(k) * 0.5), Some(1));
    }
    assert_eq!(numero_at(&set, -90.0), Some(1));

    // Any second active sector overlaps it
    let err = SectorSet::validate(vec![whole, spec(2, 10.0, 20.0)]).unwrap_err();
    assert_eq!(err.conflicts.len(), 1);
    assert!(err.invalid.is_empty());
}

#[test]
fn circular_helpers_agree_on_wrap() {
    assert_eq!(normalize(725.0), 5.0);
    assert_eq!(signed_delta(359.0, 1.0), 2.0);
    assert_eq!(signed_delta(1.0, 359.0), -2.0);

    let north = ArcRange::new(350.0, 10.0);
    assert!(north.wraps());
    assert!(north.contains(0.0));
    assert!(!north.contains(10.0));
    assert!(north.overlaps(&ArcRange::new(5.0, 6.0)));
    assert!(!north.overlaps(&ArcRange::new(10.0, 350.0)));
}

/// Sector with integer bounds so overlap can be checked exhaustively at
/// half-degree points.
fn integer_spec(numero: i32, start: u32, span: u32) -> SectorSpec {
    spec(numero, f64::from(start), f64::from((start + span) % 360))
}

fn brute_force_overlap(specs: &[SectorSpec]) -> bool {
    (0..360).any(|k| {
        let point = f64::from(k) + 0.5;
        specs
            .iter()
            .filter(|s| ArcRange::new(s.angulo_inicio, s.angulo_fin).contains(point))
            .count()
            > 1
    })
}

proptest! {
    #[test]
    fn validation_accepts_exactly_the_non_overlapping_sets(
        arcs in prop::collection::vec((0u32..360, 1u32..=120), 1..6)
    ) {
        let specs: Vec<SectorSpec> = arcs
            .iter()
            .enumerate()
            .map(|(i, (start, span))| integer_spec(i as i32, *start, *span))
            .collect();
        let overlap = brute_force_overlap(&specs);

        match SectorSet::validate(specs) {
            Ok(set) => {
                prop_assert!(!overlap);
                prop_assert_eq!(set.len(), arcs.len());
            }
            Err(err) => {
                prop_assert!(overlap);
                prop_assert!(!err.conflicts.is_empty());
                prop_assert!(err.invalid.is_empty());
            }
        }
    }

    #[test]
    fn resolve_is_single_valued_and_turn_invariant(
        arcs in prop::collection::vec((0u32..360, 1u32..=90), 1..5),
        k in 0u32..360,
    ) {
        let specs: Vec<SectorSpec> = arcs
            .iter()
            .enumerate()
            .map(|(i, (start, span))| integer_spec(i as i32, *start, *span))
            .collect();
        prop_assume!(!brute_force_overlap(&specs));
        let set = SectorSet::validate(specs).unwrap();

        let angle = f64::from(k) + 0.5;
        let containing: Vec<i32> = set
            .sectors()
            .iter()
            .filter(|s| s.range.contains(angle))
            .map(|s| s.numero)
            .collect();
        prop_assert!(containing.len() <= 1);

        let resolved = numero_at(&set, angle);
        prop_assert_eq!(resolved, containing.first().copied());
        prop_assert_eq!(numero_at(&set, angle), resolved);
        prop_assert_eq!(numero_at(&set, angle + 360.0), resolved);
        prop_assert_eq!(numero_at(&set, angle - 720.0), resolved);
    }
}
