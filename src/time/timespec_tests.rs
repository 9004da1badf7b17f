//! Arithmetic and ordering checks for [`TimeSpec`].

use super::{TimeSpec, NSEC_PER_SEC};

#[test]
fn add_without_carry() {
    let mut a = TimeSpec::new(1, 200_000_000);
    a.add(&TimeSpec::new(2, 300_000_000));
    assert_eq!(a, TimeSpec::new(3, 500_000_000));
}

#[test]
fn add_carries_nanoseconds() {
    let mut a = TimeSpec::new(1, 700_000_000);
    a.add(&TimeSpec::new(2, 600_000_000));
    assert_eq!(a, TimeSpec::new(4, 300_000_000));
}

#[test]
fn add_carry_boundary() {
    let mut a = TimeSpec::new(0, 999_999_999);
    a.add(&TimeSpec::new(0, 1));
    assert_eq!(a, TimeSpec::new(1, 0));

    let mut b = TimeSpec::new(0, 999_999_998);
    b.add(&TimeSpec::new(0, 1));
    assert_eq!(b, TimeSpec::new(0, 999_999_999));
}

#[test]
fn sub_without_borrow() {
    let mut a = TimeSpec::new(3, 500_000_000);
    a.sub(&TimeSpec::new(1, 200_000_000));
    assert_eq!(a, TimeSpec::new(2, 300_000_000));
}

#[test]
fn sub_borrows_from_seconds() {
    let mut a = TimeSpec::new(3, 200_000_000);
    a.sub(&TimeSpec::new(1, 500_000_000));
    assert_eq!(a, TimeSpec::new(1, 700_000_000));
}

#[test]
fn sub_below_zero_keeps_nanoseconds_normalized() {
    let mut a = TimeSpec::ZERO;
    a.sub(&TimeSpec::new(0, 1));
    assert_eq!(a.sec, -1);
    assert_eq!(a.nsec, NSEC_PER_SEC - 1);
    assert!(a.is_spent());
}

#[test]
fn ordering_is_seconds_then_nanoseconds() {
    let early = TimeSpec::new(5, 900_000_000);
    let late = TimeSpec::new(6, 100_000_000);
    assert!(early < late);

    let a = TimeSpec::new(5, 100);
    let b = TimeSpec::new(5, 200);
    assert!(a < b);
    assert_eq!(a, TimeSpec::new(5, 100));
}

#[test]
fn zero_and_spent() {
    assert!(TimeSpec::ZERO.is_zero());
    assert!(TimeSpec::ZERO.is_spent());
    assert!(!TimeSpec::from_secs(1).is_zero());
    assert!(!TimeSpec::new(0, 1).is_spent());
    assert!(TimeSpec::new(-1, 0).is_spent());
}
