//! Tests for structured control-flow lowering and the cast engine.

mod common;

use anyhow::Result;
use common::compile_to_ir;

#[test]
fn if_without_else_keeps_every_block_terminated() -> Result<()> {
    let src = r#"
        is m
        func f(int p) int {
            if p {
                return 1;
            }
            return 0;
        }
        func main() int { return f(3); }
    "#;
    let ir = compile_to_ir(src)?;

    assert!(ir.contains("if.1.then"), "missing then block:\n{}", ir);
    assert!(ir.contains("if.1.else"), "missing else block:\n{}", ir);
    assert!(ir.contains("if.1.end"), "missing end block:\n{}", ir);
    // The then block returns; it must not also branch to the end block.
    assert!(ir.contains("ret i32 1"));
    // The synthesized else block falls through to end.
    assert!(ir.contains("br label %if.1.end"));
    Ok(())
}

#[test]
fn while_loop_creates_start_body_merge() -> Result<()> {
    let src = r#"
        is m
        func main() int {
            int n = 0;
            while n < 10 {
                n = n + 1;
            }
            return n;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("while.1.start"));
    assert!(ir.contains("while.1.body"));
    assert!(ir.contains("while.1.merge"));
    // Body loops back to the predicate block.
    assert!(ir.contains("br label %while.1.start"));
    Ok(())
}

#[test]
fn for_loop_scopes_its_bindings() {
    // The loop counter must not leak into the enclosing scope.
    let src = r#"
        is m
        func main() int {
            for int i = 0; i < 3; i = i + 1 {
            }
            return i;
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    assert!(
        format!("{}", err).contains("unable to find value \"i\""),
        "unexpected error: {}",
        err
    );
}

#[test]
fn for_loop_emits_cond_body_end() -> Result<()> {
    let src = r#"
        is m
        func main() int {
            int total = 0;
            for int i = 0; i < 4; i = i + 1 {
                total = total + i;
            }
            return total;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("for.1.cond"));
    assert!(ir.contains("for.1.body"));
    assert!(ir.contains("for.1.end"));
    Ok(())
}

#[test]
fn mixed_width_addition_widens_by_precedence() -> Result<()> {
    // i8 + i64: the i8 side is sign-extended before the add.
    let src = r#"
        is m
        func main() int {
            byte small = 'a';
            long big = 100;
            long sum = small + big;
            return 0;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("sext i8") && ir.contains("to i64"),
        "expected i8 -> i64 sign extension:\n{}",
        ir
    );
    assert!(ir.contains("add i64"));
    Ok(())
}

#[test]
fn int_to_float_widening_uses_sitofp() -> Result<()> {
    let src = r#"
        is m
        func main() int {
            int i = 3;
            double d = 1.5;
            double r = i + d;
            return 0;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("sitofp i32"), "expected sitofp:\n{}", ir);
    assert!(ir.contains("fadd double"));
    Ok(())
}

#[test]
fn identity_cast_emits_no_conversion() -> Result<()> {
    // Returning an i32 local from an int function needs no cast.
    let src = r#"
        is m
        func main() int {
            int x = 5;
            return x;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(!ir.contains("sext"), "unexpected widening:\n{}", ir);
    assert!(!ir.contains("trunc"), "unexpected truncation:\n{}", ir);
    Ok(())
}

#[test]
fn return_widens_integer_results() -> Result<()> {
    // Returning a byte from a long function is a legal int-to-int cast.
    let src = r#"
        is m
        func f() long {
            byte b = 'x';
            return b;
        }
        func main() int {
            long v = f();
            return 0;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("sext i8"), "expected sext on return:\n{}", ir);
    Ok(())
}

#[test]
fn return_type_mismatch_is_reported_with_both_types() {
    let src = r#"
        is m
        func f() string {
            return 1;
        }
        func main() int {
            string s = f();
            return 0;
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    let msg = format!("{}", err);
    assert!(
        msg.contains("incorrect return value for function f"),
        "unexpected error: {}",
        msg
    );
    assert!(msg.contains("expected: string"), "unexpected error: {}", msg);
}

#[test]
fn unary_not_compares_xors_and_widens() -> Result<()> {
    let src = r#"
        is m
        func main() int {
            int x = 5;
            int y = !x;
            return y;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("xor i1"), "expected xor i1:\n{}", ir);
    assert!(ir.contains("zext i1"), "expected zext to i32:\n{}", ir);
    Ok(())
}

#[test]
fn unary_minus_on_ints_subtracts_from_zero() -> Result<()> {
    let src = r#"
        is m
        func main() int {
            int x = 5;
            int y = -x;
            return y;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("sub i"), "expected integer subtraction:\n{}", ir);
    Ok(())
}

#[test]
fn reference_and_dereference_round_trip() -> Result<()> {
    let src = r#"
        is m
        func main() int {
            int x = 41;
            int* p = &x;
            int y = *p;
            return y;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("load i32"), "expected load through pointer:\n{}", ir);
    Ok(())
}

#[test]
fn reference_of_a_literal_is_rejected() {
    let src = r#"
        is m
        func main() int {
            int* p = &3;
            return 0;
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    assert!(
        format!("{}", err).contains("'&' operator called on non-addressable operand"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn dereference_of_non_pointer_is_rejected() {
    let src = r#"
        is m
        func main() int {
            int x = 1;
            int y = *x;
            return y;
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    assert!(
        format!("{}", err).contains("dereference a non-pointer"),
        "unexpected error: {}",
        err
    );
}

#[test]
fn char_and_bool_literals_lower_to_i8_and_i1() -> Result<()> {
    let src = r#"
        is m
        func main() int {
            char c = 'A';
            bool b = true;
            if b {
                return c;
            }
            return 0;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("i8 65"), "expected i8 65 constant:\n{}", ir);
    assert!(ir.contains("i1"), "expected an i1 value:\n{}", ir);
    Ok(())
}

#[test]
fn chained_comparisons_with_logical_and() -> Result<()> {
    let src = r#"
        is m
        func inrange(int h) bool {
            return 0 <= h && h < 60;
        }
        func main() int {
            bool ok = inrange(30);
            return 0;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("icmp sle"), "expected <= comparison:\n{}", ir);
    assert!(ir.contains("icmp slt"), "expected < comparison:\n{}", ir);
    assert!(ir.contains("and i1"), "expected i1 and:\n{}", ir);
    Ok(())
}

#[test]
fn finished_modules_pass_llvm_verification() -> Result<()> {
    let src = r#"
        is m
        func fib(int n) int {
            if n < 2 {
                return n;
            }
            return fib(n - 1) + fib(n - 2);
        }
        func main() int {
            int total = 0;
            for int i = 0; i < 10; i = i + 1 {
                while total < 100 {
                    total = total + fib(i);
                }
            }
            return total;
        }
    "#;
    common::with_compiled_program(src, |program| {
        program
            .module
            .verify()
            .map_err(|e| anyhow::anyhow!("module failed verification: {}", e))
    })??;
    Ok(())
}
