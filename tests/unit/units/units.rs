use super::*;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

#[test]
fn parses_single_quantities() {
    assert_eq!(
        parse("12.5 mm").unwrap(),
        Measure::Unit(Unit::new(12.5, UnitKind::Mm))
    );
    assert_eq!(
        parse("3in").unwrap(),
        Measure::Unit(Unit::new(3.0, UnitKind::In))
    );
    assert_eq!(
        parse("7").unwrap(),
        Measure::Unit(Unit::new(7.0, UnitKind::None))
    );
}

#[test]
fn parses_ratios_with_implicit_one() {
    let Measure::Ratio(r) = parse("5 stitches / mm").unwrap() else {
        panic!("expected ratio");
    };
    assert_eq!(r.top, Unit::new(5.0, UnitKind::Stitches));
    assert_eq!(r.bot, Unit::new(1.0, UnitKind::Mm));
    assert!(approx(r.value(), 5.0));
}

#[test]
fn rejects_malformed_input() {
    assert!(matches!(parse("5 furlongs"), Err(UnitError::MalformedToken(_))));
    assert!(matches!(
        parse("1 mm / 2 mm / 3 mm"),
        Err(UnitError::DoubleDivision(_))
    ));
    assert!(matches!(parse("5 6 mm"), Err(UnitError::MultiNumber(_))));
    assert!(matches!(parse("   "), Err(UnitError::Empty)));
    assert!(matches!(parse("1 mm / 0 px"), Err(UnitError::ZeroDenominator(_))));
}

#[test]
fn converts_lengths_exactly() {
    let u = parse_as("2 in", UnitKind::Mm, true).unwrap();
    assert!(approx(u.value, 50.8));
    let u = parse_as("1.5 m", UnitKind::Cm, true).unwrap();
    assert!(approx(u.value, 150.0));
}

#[test]
fn strictness_controls_bare_numbers() {
    assert!(parse_as("4", UnitKind::Mm, true).is_err());
    assert_eq!(
        parse_as("4", UnitKind::Mm, false).unwrap(),
        Unit::new(4.0, UnitKind::Mm)
    );
    assert!(matches!(
        parse_as("4 px", UnitKind::Mm, false),
        Err(UnitError::Incompatible { .. })
    ));
}

#[test]
fn inverted_ratio_only_without_strict() {
    let src = "0.2 mm / 1 stitches";
    assert!(parse_as_ratio(src, UnitKind::Stitches, UnitKind::Mm, true).is_err());
    let r = parse_as_ratio(src, UnitKind::Stitches, UnitKind::Mm, false).unwrap();
    assert!(approx(r.value(), 5.0));
}

#[test]
fn ratio_conversion_composes() {
    let Measure::Ratio(r) = parse("30 wales / 2 in").unwrap() else {
        panic!("expected ratio");
    };
    let pairs = [
        (UnitKind::Wales, UnitKind::Mm),
        (UnitKind::Stitches, UnitKind::Cm),
        (UnitKind::Wales, UnitKind::M),
    ];
    for (ut, ub) in pairs {
        for (vt, vb) in pairs {
            let direct = r.to(vt, vb).unwrap().value();
            let chained = r.to(ut, ub).unwrap().to(vt, vb).unwrap().value();
            assert!(approx(direct, chained), "{ut:?}/{ub:?} -> {vt:?}/{vb:?}");
        }
    }
}

#[test]
fn compact_collapses_length_ratios() {
    let Measure::Ratio(r) = parse("1 cm / 2 mm").unwrap() else {
        panic!("expected ratio");
    };
    assert!(approx(r.compact().unwrap(), 5.0));
    let Measure::Ratio(r) = parse("3 px / 1 px").unwrap() else {
        panic!("expected ratio");
    };
    assert!(approx(r.compact().unwrap(), 3.0));
    let Measure::Ratio(r) = parse("1 mm / 1 px").unwrap() else {
        panic!("expected ratio");
    };
    assert!(r.compact().is_none());
}

#[test]
fn wales_and_courses_stay_distinct() {
    let u = Unit::new(3.0, UnitKind::Wales);
    assert!(u.to(UnitKind::Courses).is_err());
    assert!(u.to(UnitKind::Stitches).is_ok());
}
