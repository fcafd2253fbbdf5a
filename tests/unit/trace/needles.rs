use super::*;

#[test]
fn open_courses_sit_on_the_front_bed() {
    let slots = relative_slots(4, false);
    assert_eq!(
        slots,
        vec![(Side::Front, 0), (Side::Front, 1), (Side::Front, 2), (Side::Front, 3)]
    );
}

#[test]
fn closed_courses_wrap_around_both_beds() {
    assert_eq!(
        relative_slots(6, true),
        vec![
            (Side::Front, 0),
            (Side::Front, 1),
            (Side::Front, 2),
            (Side::Back, 2),
            (Side::Back, 1),
            (Side::Back, 0),
        ]
    );
    let odd = relative_slots(5, true);
    assert_eq!(odd.iter().filter(|s| s.0 == Side::Front).count(), 3);
    assert_eq!(odd[3], (Side::Back, 1));
    assert_eq!(odd[4], (Side::Back, 0));
}

#[test]
fn base_is_the_median_offset() {
    let f = |k| (Side::Front, k);
    assert_eq!(choose_base(&[]), 0);
    assert_eq!(choose_base(&[(f(0), f(2)), (f(1), f(3)), (f(2), f(9))]), 2);
    // A cross-bed pair is ignored while same-bed pairs exist.
    assert_eq!(choose_base(&[(f(0), (Side::Back, 40)), (f(0), f(-1))]), -1);
    assert_eq!(choose_base(&[(f(0), (Side::Back, 4))]), 4);
}

#[test]
fn half_gauge_interleaves_the_beds() {
    assert_eq!(physical(Side::Front, 3, 1), Needle::front(3));
    assert_eq!(physical(Side::Back, 3, 1), Needle::back(3));
    assert_eq!(physical(Side::Front, 3, 2), Needle::front(6));
    assert_eq!(physical(Side::Back, 3, 2), Needle::back(7));
}
