//! Concurrency and lifecycle behaviour of the coordinate layer.

use sparr::coordinates::{Coordinates, Update};
use sparr::Vector;

#[test]
fn concurrent_staged_assignment_fills_the_set() {
    // 8 OS threads each stage indices {t, t+8, ..., t+15*8} into one
    // 128-element set; a single join publishes all of them
    const THREADS: usize = 8;
    const N: usize = 128;

    let mut coords = Coordinates::new(N);
    let mut updates: Vec<Update> = (0..THREADS).map(|_| Update::default()).collect();
    {
        let view = coords.view();
        std::thread::scope(|scope| {
            for (t, upd) in updates.iter_mut().enumerate() {
                scope.spawn(move || {
                    for k in 0..16 {
                        let i = t + k * THREADS;
                        // indices are disjoint across threads
                        assert!(!unsafe { view.assign_async(i, upd) });
                    }
                });
            }
        });
    }
    assert!(!coords.join_update(&mut updates));

    assert_eq!(coords.nonzeroes(), N);
    for i in 0..N {
        assert!(coords.assigned(i));
    }
}

#[test]
fn join_of_empty_updates_reports_empty() {
    let mut coords = Coordinates::new(16);
    let mut updates = coords.make_updates(4);
    assert!(coords.join_update(&mut updates));
    assert_eq!(coords.nonzeroes(), 0);
}

#[test]
fn clear_range_invalidates_until_rebuild() {
    let mut coords = Coordinates::new(32);
    for i in (0..32).step_by(3) {
        coords.assign(i);
    }
    let before = coords.nonzeroes();
    coords.clear_range(10, 20);
    assert!(!coords.is_valid());

    coords.rebuild(false);
    assert!(coords.is_valid());
    assert!(coords.nonzeroes() < before);
    for i in (0..32).step_by(3) {
        assert_eq!(coords.assigned(i), !(10..20).contains(&i));
    }
}

#[test]
fn vector_build_rejects_duplicates_and_range() {
    assert!(Vector::build(4, &[(1, 1.0f64), (1, 2.0)]).is_err());
    assert!(Vector::build(4, &[(4, 1.0f64)]).is_err());
    let v = Vector::build(4, &[(3, 1.0f64), (0, 2.0)]).unwrap();
    assert_eq!(v.nnz(), 2);
    let pairs: Vec<_> = v.iter().collect();
    assert_eq!(pairs, vec![(3, 1.0), (0, 2.0)]);
}

#[test]
fn clone_copies_pattern_but_not_identity() {
    let v = Vector::build(8, &[(2, 5.0f64), (6, 7.0)]).unwrap();
    let w = v.clone();
    assert_ne!(v.id(), w.id());
    assert_eq!(w.nnz(), 2);
    assert_eq!(w.get(2), Some(5.0));
    assert_eq!(w.get(6), Some(7.0));
}
