//! Compile-error and warning surface tests.

use vexelc::{Compiler, CompilerOptions, DiagnosticKind, Target};

fn compile_err(source: &str) -> vexelc::CompileError {
    let compiler = Compiler::new();
    compiler
        .compile(source, &CompilerOptions::default())
        .err()
        .expect("compilation should fail")
}

#[test]
fn test_parse_error_has_position() {
    let err = compile_err("int x = ;\n");
    assert_eq!(err.diagnostic.kind, DiagnosticKind::ParseError);
    assert_eq!(err.diagnostic.line, 1);
    assert_eq!(err.diagnostic.snippet, "int x = ;");
}

#[test]
fn test_attribute_type_conflict() {
    let err = compile_err("@a = 1.0f;\ni@a = 2;\n");
    assert_eq!(err.diagnostic.kind, DiagnosticKind::TypeError);
    assert_eq!(err.diagnostic.line, 2);
}

#[test]
fn test_unknown_function() {
    let err = compile_err("@a = frobnicate(1.0f);");
    assert_eq!(err.diagnostic.kind, DiagnosticKind::FunctionLookupError);
}

#[test]
fn test_wrong_target_function() {
    let compiler = Compiler::new();
    let err = compiler
        .compile(
            r#"if (ingroup("wet")) @d = 1.0f;"#,
            &CompilerOptions::new(Target::Volume),
        )
        .err()
        .expect("volume kernels cannot test groups");
    assert_eq!(err.diagnostic.kind, DiagnosticKind::FunctionLookupError);
}

#[test]
fn test_float_to_int_needs_cast_by_default() {
    let err = compile_err("i@count = 1.5f;");
    assert_eq!(err.diagnostic.kind, DiagnosticKind::TypeError);
    assert!(err.diagnostic.message.contains("explicit cast"));
}

#[test]
fn test_bitwise_on_float_warns() {
    let compiler = Compiler::new();
    let exe = compiler
        .compile("l@bits = @x & 3;", &CompilerOptions::default())
        .unwrap();
    let warnings = match &exe {
        vexelc::Executable::Volume(exe) => exe.warnings().to_vec(),
        vexelc::Executable::Point(exe) => exe.warnings().to_vec(),
    };
    assert!(
        warnings
            .iter()
            .any(|w| w.kind == DiagnosticKind::BitwiseFloatWarning)
    );
}

#[test]
fn test_warn_as_error_promotes() {
    let compiler = Compiler::new();
    let options = CompilerOptions::default().with_warn_as_error(true);
    let err = compiler
        .compile("l@bits = @x & 3;", &options)
        .err()
        .expect("warnings promote to errors");
    assert!(!err.diagnostic.is_warning());
}

#[test]
fn test_string_attribute_is_reserved() {
    let err = compile_err(r#"s@name = "cloud";"#);
    assert_eq!(err.diagnostic.kind, DiagnosticKind::TypeError);
    assert!(err.diagnostic.message.contains("reserved"));
}

#[test]
fn test_component_out_of_bounds() {
    let err = compile_err("v@P = {1.0f, 2.0f, 3.0f}; @w = v@P[3];");
    assert_eq!(err.diagnostic.kind, DiagnosticKind::TypeError);
    assert!(err.diagnostic.message.contains("out of bounds"));
}

#[test]
fn test_modulo_on_float_is_a_binary_operation_error() {
    let err = compile_err("@a = @a % 0.5f;");
    assert_eq!(err.diagnostic.kind, DiagnosticKind::BinaryOperationError);
}

#[test]
fn test_warnings_survive_success() {
    let compiler = Compiler::new();
    let exe = compiler
        .compile_volume(
            "float unused = 1.0f; @a = 1.0f;",
            &CompilerOptions::default(),
        )
        .unwrap();
    assert!(
        exe.warnings()
            .iter()
            .any(|w| w.kind == DiagnosticKind::UnusedLocalWarning)
    );
}
