use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        KnitError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(KnitError::units("x").to_string().contains("unit error:"));
    assert!(KnitError::flow("x").to_string().contains("flow error:"));
    assert!(KnitError::trace("x").to_string().contains("trace error:"));
    assert!(
        KnitError::compile("x")
            .to_string()
            .contains("compile error:")
    );
}

#[test]
fn knitout_error_carries_line() {
    let e = KnitError::knitout(12, "unknown opcode 'frob'");
    assert_eq!(
        e.to_string(),
        "knitout error at line 12: unknown opcode 'frob'"
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = KnitError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn serde_json_errors_convert() {
    let err: KnitError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert!(err.to_string().starts_with("serialization error:"));
}
