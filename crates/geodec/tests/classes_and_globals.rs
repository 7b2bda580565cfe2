//! Tests for class lowering, global variables, and the constant pools.

mod common;

use anyhow::Result;
use common::{compile_to_ir, with_compiled_program};

#[test]
fn class_fields_lower_to_struct_accesses() -> Result<()> {
    let src = r#"
        is m
        class Point {
            int x;
            int y;
        }
        func main() int {
            Point p = new Point(3, 4);
            p.x = 7;
            return p.y;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("%class.m.Point = type { i32, i32 }"),
        "expected nominal struct layout:\n{}",
        ir
    );
    assert!(
        ir.contains("getelementptr inbounds %class.m.Point"),
        "expected struct GEPs:\n{}",
        ir
    );
    Ok(())
}

#[test]
fn class_methods_take_this_and_compile_mangled() -> Result<()> {
    let src = r#"
        is m
        class Counter {
            int value;
            func bump(int by) int {
                this.value = this.value + by;
                return this.value;
            }
        }
        func main() int {
            Counter c = new Counter(0);
            return c.bump(2);
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("@m_Counter_bump"),
        "expected mangled method symbol:\n{}",
        ir
    );
    Ok(())
}

#[test]
fn unknown_method_names_are_reported() {
    let src = r#"
        is m
        class Point {
            int x;
        }
        func main() int {
            Point p = new Point(1);
            return p.magnitude();
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    assert!(
        format!("{}", err).contains("class Point has no method \"magnitude\""),
        "unexpected error: {}",
        err
    );
}

#[test]
fn unknown_field_names_name_the_class() {
    let src = r#"
        is m
        class Point {
            int x;
        }
        func main() int {
            Point p = new Point(1);
            return p.z;
        }
    "#;
    let err = compile_to_ir(src).unwrap_err();
    assert!(
        format!("{}", err).contains("class Point has no field \"z\""),
        "unexpected error: {}",
        err
    );
}

#[test]
fn duplicate_fields_are_reported_but_do_not_abort() -> Result<()> {
    // Class verification reports and continues, so the rest of the
    // program still compiles in the same run.
    let src = r#"
        is m
        class Odd {
            int a;
            int a;
        }
        func main() int { return 0; }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("define i32 @main"), "main must still lower:\n{}", ir);
    Ok(())
}

#[test]
fn classes_emit_one_type_info_descriptor() -> Result<()> {
    let src = r#"
        is m
        class Point {
            int x;
            int y;
        }
        func main() int {
            Point a = new Point(1, 2);
            Point b = new Point(3, 4);
            return 0;
        }
    "#;
    with_compiled_program(src, |program| {
        assert_eq!(program.type_info_defs.len(), 1);
        let ir = program.to_ir();
        assert_eq!(
            ir.matches("@typeinfo.m.Point").count(),
            1,
            "descriptor must be emitted once:\n{}",
            ir
        );
    })?;
    Ok(())
}

#[test]
fn constant_globals_initialize_in_place() -> Result<()> {
    let src = r#"
        is m
        int answer = 42;
        func main() int { return answer; }
    "#;
    with_compiled_program(src, |program| {
        assert!(program.initializations.is_empty());
        let ir = program.to_ir();
        assert!(
            ir.contains("@m.answer = global i32 42"),
            "expected constant initializer:\n{}",
            ir
        );
    })?;
    Ok(())
}

#[test]
fn computed_globals_store_at_the_top_of_main() -> Result<()> {
    let src = r#"
        is m
        func seed() int { return 17; }
        int state = seed();
        func main() int { return state; }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(
        ir.contains("@m.state = global i32 0"),
        "expected zero placeholder:\n{}",
        ir
    );
    assert!(
        ir.contains("store i32 %"),
        "expected the initializer store in main:\n{}",
        ir
    );
    Ok(())
}

#[test]
fn string_literals_intern_per_content() -> Result<()> {
    let src = r#"
        is m
        func pick(int which) string {
            if which {
                return "hello";
            }
            return "hello";
        }
        func main() int {
            string a = pick(0);
            string b = "other";
            return 0;
        }
    "#;
    with_compiled_program(src, |program| {
        assert_eq!(program.string_defs.len(), 2, "two distinct contents");
        let ir = program.to_ir();
        assert_eq!(
            ir.matches("c\"hello\\00\"").count(),
            1,
            "identical literals share one global:\n{}",
            ir
        );
    })?;
    Ok(())
}

#[test]
fn globals_resolve_through_qualified_names() -> Result<()> {
    let src = r#"
        is m
        int counter = 5;
        func main() int {
            counter = counter + 1;
            return m:counter;
        }
    "#;
    let ir = compile_to_ir(src)?;
    assert!(ir.contains("@m.counter"), "expected the global symbol:\n{}", ir);
    Ok(())
}
