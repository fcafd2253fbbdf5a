use super::*;

fn env_row_col(row: f64, col: f64) -> Env {
    let mut env = Env::new();
    env.set("row", row);
    env.set("col", col);
    env
}

fn run(src: &str, env: &Env) -> f64 {
    eval(&parse_expr(src).unwrap(), env).unwrap()
}

#[test]
fn arithmetic_respects_precedence() {
    let env = Env::new();
    assert_eq!(run("1 + 2 * 3", &env), 7.0);
    assert_eq!(run("(1 + 2) * 3", &env), 9.0);
    assert_eq!(run("2 ^ 3 ^ 2", &env), 512.0);
    assert_eq!(run("-2 ^ 2", &env), 4.0);
    assert_eq!(run("10 - 4 - 3", &env), 3.0);
    assert_eq!(run("7 % 3", &env), 1.0);
    assert_eq!(run("-1 % 3", &env), 2.0);
    assert_eq!(run("1.5e1 / 3", &env), 5.0);
}

#[test]
fn comparisons_and_logic_yield_flags() {
    let env = Env::new();
    assert_eq!(run("1 < 2 && 2 <= 2", &env), 1.0);
    assert_eq!(run("1 > 2 || !(3 != 3)", &env), 1.0);
    assert_eq!(run("1 == 2", &env), 0.0);
}

#[test]
fn ternary_selects_program_constants() {
    let src = "(row + col) % 2 == 0 ? purl : knit";
    assert_eq!(run(src, &env_row_col(0.0, 0.0)), 1.0);
    assert_eq!(run(src, &env_row_col(0.0, 1.0)), 0.0);
    assert_eq!(run("row > 1 ? tuck : row > 0 ? miss : knit", &env_row_col(1.0, 0.0)), 3.0);
}

#[test]
fn functions_are_available() {
    let env = env_row_col(3.0, 7.0);
    assert_eq!(run("min(row, col, 5)", &env), 3.0);
    assert_eq!(run("max(row, col)", &env), 7.0);
    assert_eq!(run("abs(row - col)", &env), 4.0);
    assert_eq!(run("floor(col / 2) + ceil(0.2)", &env), 4.0);
}

#[test]
fn leading_equals_sign_is_accepted() {
    assert_eq!(run("= 1 + 1", &Env::new()), 2.0);
}

#[test]
fn parse_errors_carry_byte_offsets() {
    let e = parse_expr("1 + # 2").unwrap_err();
    assert_eq!(e.offset, 4);
    assert_eq!(e.to_string(), "expr error at byte 4: unexpected character '#'");

    let e = parse_expr("(1 + 2").unwrap_err();
    assert_eq!(e.offset, 6);

    let e = parse_expr("= 1 1").unwrap_err();
    assert_eq!(e.offset, 4);

    assert!(parse_expr("row ? 1").is_err());
}

#[test]
fn evaluation_errors_name_the_culprit() {
    let env = Env::new();
    let e = eval(&parse_expr("width + 1").unwrap(), &env).unwrap_err();
    assert!(e.message.contains("width"));
    let e = eval(&parse_expr("abs(1, 2)").unwrap(), &env).unwrap_err();
    assert!(e.message.contains("abs"));
    let e = eval(&parse_expr("gamma(1)").unwrap(), &env).unwrap_err();
    assert!(e.message.contains("gamma"));
}
