//! Tests for on-demand function compilation: mangling, variants,
//! variadics, unknown-parameter instantiation and registry behavior.

mod common;

use anyhow::Result;
use common::{compile_to_ir, with_compiled_program};

#[test]
fn empty_body_function_is_mangled_and_returns_zero() -> Result<()> {
    let src = r#"
        is m
        func f() int { return 0; }
        func main() int { return f(); }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("define i32 @m_f"),
        "expected mangled m_f definition:\n{}",
        ir
    );
    assert!(ir.contains("ret i32 0"), "expected ret i32 0:\n{}", ir);
    Ok(())
}

#[test]
fn main_keeps_its_source_symbol() -> Result<()> {
    let ir = compile_to_ir("is m func main() int { return 0; }")?;
    assert!(ir.contains("define i32 @main"), "main must stay unmangled:\n{}", ir);
    Ok(())
}

#[test]
fn variadic_function_accepts_extra_arguments() -> Result<()> {
    let src = r#"
        is m
        func g(int first, ...) void {
        }
        func main() int {
            g(1);
            g(1, 2, 3);
            return 0;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("i32, ...") || ir.contains("(i32, ...)"),
        "expected a variadic signature:\n{}",
        ir
    );
    Ok(())
}

#[test]
fn variadic_function_rejects_too_few_arguments() {
    let src = r#"
        is m
        func g(int first, ...) void {
        }
        func main() int {
            g();
            return 0;
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    assert!(
        format!("{}", err)
            .contains("variadic function g expects a minimum of 1 arguments. given: 0"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn wrong_arity_is_rejected_for_non_variadics() {
    let src = r#"
        is m
        func add(int a, int b) int { return a + b; }
        func main() int {
            return add(1);
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    let msg = format!("{}", err);
    assert!(
        msg.contains("incorrect number of arguments passed to function \"add\""),
        "unexpected error: {}",
        msg
    );
    assert!(msg.contains("expected 2, given 1"), "unexpected error: {}", msg);
}

#[test]
fn argument_type_mismatch_names_both_types() {
    let src = r#"
        is m
        func takes_string(string s) void {
        }
        func main() int {
            takes_string(42);
            return 0;
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    let msg = format!("{}", err);
    assert!(
        msg.contains("incorrect type passed into function takes_string"),
        "unexpected error: {}",
        msg
    );
    assert!(msg.contains("expected: \"string\""), "unexpected error: {}", msg);
}

#[test]
fn unknown_parameters_instantiate_one_variant_per_type() -> Result<()> {
    let src = r#"
        is m
        func id(T x) T { return x; }
        func main() int {
            int i = 7;
            double d = 1.5;
            int a = id(i);
            double b = id(d);
            return a;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("define i32 @m_id_i32"),
        "expected i32 variant:\n{}",
        ir
    );
    assert!(
        ir.contains("define double @m_id_f64"),
        "expected double variant:\n{}",
        ir
    );
    Ok(())
}

#[test]
fn unknown_instantiation_reuses_cached_variants() -> Result<()> {
    let src = r#"
        is m
        func id(T x) T { return x; }
        func main() int {
            int a = id(1);
            int b = id(2);
            return a + b;
        }
    "#;
    let ir = compile_to_ir(src)?;
    let definitions = ir.matches("define i64 @m_id_i64").count();
    assert_eq!(definitions, 1, "variant must be compiled once:\n{}", ir);
    Ok(())
}

#[test]
fn nomangle_functions_keep_their_source_name() -> Result<()> {
    let src = r#"
        is m
        nomangle func raw_name(int x) int { return x; }
        func main() int { return raw_name(1); }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("define i32 @raw_name"),
        "expected unmangled symbol:\n{}",
        ir
    );
    assert!(!ir.contains("@m_raw_name"), "must not be mangled:\n{}", ir);
    Ok(())
}

#[test]
fn extern_functions_declare_without_a_body() -> Result<()> {
    let src = r#"
        is m
        extern func puts(string s, ...) int;
        func main() int {
            puts("hello");
            return 0;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("declare i32 @puts"),
        "expected external declaration:\n{}",
        ir
    );
    Ok(())
}

#[test]
fn unresolvable_calls_list_every_candidate() {
    let src = r#"
        is m
        func main() int {
            missing(1);
            return 0;
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    let msg = format!("{}", err);
    assert!(
        msg.contains("unable to find function with names [missing, m:missing]"),
        "unexpected error: {}",
        msg
    );
}

#[test]
fn registry_keys_qualify_by_package() -> Result<()> {
    let src = r#"
        is m
        func helper() int { return 1; }
        func main() int { return helper(); }
    "#;
    with_compiled_program(src, |program| {
        let node = program.functions.get("m:helper").expect("registered");
        assert_eq!(node.decl.ident.name, "helper");
        assert_eq!(node.package, "m");
        // main is registered unqualified.
        assert!(program.functions.contains_key("main"));
        assert!(!program.functions.contains_key("m:main"));
    })?;
    Ok(())
}

#[test]
fn compiled_variants_are_cached_by_mangled_name() -> Result<()> {
    let src = r#"
        is m
        func helper() int { return 1; }
        func main() int { return helper() + helper(); }
    "#;
    with_compiled_program(src, |program| {
        assert!(program.variants.contains_key("m_helper"));
        let ir = program.to_ir();
        assert_eq!(
            ir.matches("define i32 @m_helper").count(),
            1,
            "helper must be compiled once:\n{}",
            ir
        );
    })?;
    Ok(())
}

#[test]
fn missing_return_in_non_void_function_errors() {
    let src = r#"
        is m
        func f() int {
            int x = 1;
        }
        func main() int { return f(); }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    assert!(
        format!("{}", err).contains("missing return in function f"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn void_functions_get_an_implicit_return() -> Result<()> {
    let src = r#"
        is m
        func log_nothing() void {
        }
        func main() int {
            log_nothing();
            return 0;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("ret void"), "expected implicit ret void:\n{}", ir);
    Ok(())
}

#[test]
fn no_main_is_a_driver_error() {
    let err = compile_to_ir("is m func f() int { return 0; }").unwrap_err();
    assert!(
        format!("{}", err).contains("no `main` function found"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn debug_mode_attaches_scope_metadata() -> Result<()> {
    let src = r#"
        is m
        func main() int {
            return 0;
        }
    "#;
    let ir = common::compile_to_ir_debug(src)?;
    assert!(ir.contains("!scope_"), "expected scope metadata:\n{}", ir);
    Ok(())
}
