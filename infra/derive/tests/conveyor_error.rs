#[test]
fn conveyor_error_ui() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/conveyor_error_pass.rs");
    t.pass("tests/ui/conveyor_error_clone.rs");
    t.compile_fail("tests/ui/conveyor_error_no_context.rs");
    t.compile_fail("tests/ui/conveyor_error_bad_context_type.rs");
    t.compile_fail("tests/ui/conveyor_error_tuple_variant.rs");
}
