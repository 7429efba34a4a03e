//! Level-1 primitives through the public API.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sparr::algebra::{Minus, Monoid, Plus, Semiring, Times};
use sparr::{blas1, Descriptor, Phase, Vector};

#[test]
fn sparse_dot_over_pattern_intersection() {
    let x = Vector::build(3, &[(0, 5.0f64), (2, 7.0)]).unwrap();
    let y = Vector::build(3, &[(0, 3.0f64), (1, 3.0)]).unwrap();
    let mut out = 0.0;
    blas1::dot(&mut out, &x, &y, &Monoid::plus(), Times, Phase::Execute).unwrap();
    assert_eq!(out, 15.0);
}

#[test]
fn dense_dot_matches_naive_sum() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let n = 257;
    let xs: Vec<i64> = (0..n).map(|_| rng.gen_range(-50..50)).collect();
    let ys: Vec<i64> = (0..n).map(|_| rng.gen_range(-50..50)).collect();
    let expected: i64 = xs.iter().zip(&ys).map(|(a, b)| a * b).sum();

    let x = Vector::from_slice(&xs);
    let y = Vector::from_slice(&ys);
    let mut out = 0i64;
    blas1::dot(&mut out, &x, &y, &Monoid::plus(), Times, Phase::Execute).unwrap();
    assert_eq!(out, expected);
}

#[test]
fn dot_accumulates_into_the_given_scalar() {
    let x = Vector::from_slice(&[1.0f64, 1.0]);
    let y = Vector::from_slice(&[2.0f64, 3.0]);
    let mut out = 100.0;
    blas1::dot(&mut out, &x, &y, &Monoid::plus(), Times, Phase::Execute).unwrap();
    assert_eq!(out, 105.0);
}

#[test]
fn apply_add_and_mul_semantics_differ() {
    // apply: intersection; add: union; mul: intersection with accumulation
    let x = Vector::build(6, &[(0, 1.0f64), (3, 2.0)]).unwrap();
    let y = Vector::build(6, &[(3, 10.0f64), (5, 20.0)]).unwrap();

    let mut inter = Vector::<f64>::new(6);
    blas1::ewise_apply(&mut inter, &x, &y, Times, Descriptor::default()).unwrap();
    assert_eq!(inter.nnz(), 1);
    assert_eq!(inter.get(3), Some(20.0));

    let mut uni = Vector::<f64>::new(6);
    blas1::ewise_add(&mut uni, &x, &y, &Monoid::plus(), Descriptor::default()).unwrap();
    assert_eq!(uni.nnz(), 3);
    assert_eq!(uni.get(0), Some(1.0));
    assert_eq!(uni.get(3), Some(12.0));
    assert_eq!(uni.get(5), Some(20.0));

    let ring = Semiring::<Plus, Times, f64>::plus_times();
    let mut acc = Vector::build(6, &[(3, 0.5f64)]).unwrap();
    blas1::ewise_mul(&mut acc, &x, &y, &ring, Descriptor::default()).unwrap();
    assert_eq!(acc.get(3), Some(20.5));
}

#[test]
fn masked_set_respects_structural_and_inverted_masks() {
    let mask = Vector::build(4, &[(0, 0.0f64), (2, 1.0)]).unwrap();

    // value mask: the stored zero at index 0 does not pass
    let mut v = Vector::<f64>::new(4);
    blas1::set_masked(&mut v, &mask, 9.0, Descriptor::default()).unwrap();
    assert_eq!(v.nnz(), 1);
    assert_eq!(v.get(2), Some(9.0));

    // structural mask: presence alone passes
    let mut s = Vector::<f64>::new(4);
    blas1::set_masked(&mut s, &mask, 9.0, Descriptor::STRUCTURAL).unwrap();
    assert_eq!(s.nnz(), 2);

    // inverted structural mask: the complement of the pattern
    let mut inv = Vector::<f64>::new(4);
    blas1::set_masked(
        &mut inv,
        &mask,
        9.0,
        Descriptor::STRUCTURAL | Descriptor::INVERT_MASK,
    )
    .unwrap();
    assert_eq!(inv.nnz(), 2);
    assert_eq!(inv.get(1), Some(9.0));
    assert_eq!(inv.get(3), Some(9.0));
}

#[test]
fn scalar_folds_touch_only_stored_entries() {
    let mut x = Vector::build(5, &[(1, 10.0f64), (4, 20.0)]).unwrap();
    blas1::foldr(100.0, &mut x, Minus).unwrap();
    // foldr computes op(beta, x[i])
    assert_eq!(x.get(1), Some(90.0));
    assert_eq!(x.get(4), Some(80.0));
    assert_eq!(x.nnz(), 2);
}

#[test]
fn reduction_over_a_large_random_vector() {
    let mut rng = StdRng::seed_from_u64(7);
    let n = 1000;
    let entries: Vec<(usize, i64)> = (0..n)
        .step_by(3)
        .map(|i| (i, rng.gen_range(1..10)))
        .collect();
    let expected: i64 = entries.iter().map(|&(_, v)| v).sum();
    let x = Vector::build(n, &entries).unwrap();
    let mut acc = 0i64;
    blas1::foldl_scalar(&mut acc, &x, &Monoid::plus(), Phase::Execute).unwrap();
    assert_eq!(acc, expected);
}

#[test]
fn scalar_operand_apply_follows_the_vector_pattern() {
    let y = Vector::build(4, &[(1, 3.0f64), (2, 4.0)]).unwrap();
    let mut z = Vector::<f64>::new(4);
    blas1::ewise_apply_left_scalar(&mut z, 10.0, &y, Times, Descriptor::default()).unwrap();
    assert_eq!(z.nnz(), 2);
    assert_eq!(z.get(1), Some(30.0));
    assert_eq!(z.get(2), Some(40.0));
}
