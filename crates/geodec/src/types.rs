//! The Geode type-system adapter.
//!
//! Geode's surface types map onto a small set of canonical LLVM types:
//! `bool` is `i1`, `byte`/`char` are `i8`, `short` is `i16`, `int` is
//! `i32`, `long` is `i64`, `float`/`double` are `double`, `string` is
//! `i8*` and `void` is `void`. Pointers are opaque in modern LLVM, so
//! [`Ty`] carries the pointed-to type alongside the raw LLVM type.

use inkwell::AddressSpace;
use inkwell::context::Context;
use inkwell::types::{AnyType, AnyTypeEnum, BasicType, BasicTypeEnum};

/// A resolved Geode type: the raw LLVM type plus, for pointers, the
/// pointed-to type that opaque pointers no longer expose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ty<'ctx> {
    pub raw: AnyTypeEnum<'ctx>,
    pub pointee: Option<BasicTypeEnum<'ctx>>,
}

impl<'ctx> Ty<'ctx> {
    pub fn new(raw: AnyTypeEnum<'ctx>) -> Self {
        Ty { raw, pointee: None }
    }

    pub fn from_basic(raw: BasicTypeEnum<'ctx>) -> Self {
        Ty {
            raw: raw.as_any_type_enum(),
            pointee: None,
        }
    }

    pub fn pointer(context: &'ctx Context, pointee: BasicTypeEnum<'ctx>) -> Self {
        Ty {
            raw: context
                .ptr_type(AddressSpace::default())
                .as_any_type_enum(),
            pointee: Some(pointee),
        }
    }

    pub fn void(context: &'ctx Context) -> Self {
        Ty::new(context.void_type().as_any_type_enum())
    }

    pub fn is_void(&self) -> bool {
        self.raw.is_void_type()
    }

    /// The type as a `BasicTypeEnum`, or `None` for `void`.
    pub fn basic(&self) -> Option<BasicTypeEnum<'ctx>> {
        BasicTypeEnum::try_from(self.raw).ok()
    }
}

/// Whether the given type is an integer or floating-point type.
pub fn is_number(t: BasicTypeEnum) -> bool {
    t.is_int_type() || t.is_float_type()
}

/// Two types are loosely equal when both are numeric; mixed numeric
/// operands are reconciled by the cast engine instead of rejected.
pub fn loosely_equal(a: BasicTypeEnum, b: BasicTypeEnum) -> bool {
    is_number(a) && is_number(b)
}

/// Bit size used to pick between extension and truncation. Only
/// meaningful for numeric types; everything else reports -1.
pub fn type_size(t: BasicTypeEnum) -> i64 {
    if t.is_int_type() {
        return t.into_int_type().get_bit_width() as i64;
    }
    if t.is_float_type() {
        // Geode's only float type is double.
        return 64;
    }
    -1
}

/// The fixed numeric cast-precedence table. Built once per Program and
/// consulted as pure data: the operand with the lower precedence is
/// widened to the type with the higher one.
pub fn precedence_table(context: &Context) -> Vec<(AnyTypeEnum<'_>, i32)> {
    vec![
        (
            context.ptr_type(AddressSpace::default()).as_any_type_enum(),
            0,
        ),
        (context.void_type().as_any_type_enum(), 0),
        (context.bool_type().as_any_type_enum(), 1),
        (context.i8_type().as_any_type_enum(), 2),
        (context.i16_type().as_any_type_enum(), 3),
        (context.i32_type().as_any_type_enum(), 4),
        (context.i64_type().as_any_type_enum(), 5),
        (context.f64_type().as_any_type_enum(), 11),
    ]
}

/// Looks a type up in the precedence table; unknown types are -1.
pub fn cast_precedence(table: &[(AnyTypeEnum, i32)], t: AnyTypeEnum) -> i32 {
    for (key, prec) in table {
        if *key == t {
            return *prec;
        }
    }
    -1
}

/// The primitive bindings injected into every root scope.
pub fn primitives(context: &Context) -> Vec<(&'static str, Ty<'_>)> {
    let i8t = context.i8_type().as_basic_type_enum();
    vec![
        ("void", Ty::void(context)),
        ("bool", Ty::new(context.bool_type().as_any_type_enum())),
        ("byte", Ty::new(context.i8_type().as_any_type_enum())),
        ("char", Ty::new(context.i8_type().as_any_type_enum())),
        ("short", Ty::new(context.i16_type().as_any_type_enum())),
        ("int", Ty::new(context.i32_type().as_any_type_enum())),
        ("long", Ty::new(context.i64_type().as_any_type_enum())),
        ("float", Ty::new(context.f64_type().as_any_type_enum())),
        ("double", Ty::new(context.f64_type().as_any_type_enum())),
        ("string", Ty::pointer(context, i8t)),
    ]
}

/// Short type tag used inside mangled function names.
pub fn mangle_type(t: BasicTypeEnum) -> String {
    if t.is_int_type() {
        return format!("i{}", t.into_int_type().get_bit_width());
    }
    if t.is_float_type() {
        return "f64".to_string();
    }
    if t.is_pointer_type() {
        return "ptr".to_string();
    }
    if t.is_struct_type() {
        return "obj".to_string();
    }
    "any".to_string()
}

/// Deterministic mangling of a qualified function name plus its
/// effective parameter types, e.g. `m:add` over `(i32, i32)` becomes
/// `m_add_i32_i32`.
pub fn mangle_function(qualified: &str, param_types: &[BasicTypeEnum]) -> String {
    let mut out = qualified.replace([':', '.'], "_");
    for ty in param_types {
        out.push('_');
        out.push_str(&mangle_type(*ty));
    }
    out
}

/// Printable form of an LLVM type for error messages.
pub fn print_type(t: AnyTypeEnum) -> String {
    t.print_to_string().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_is_a_total_order_on_distinct_numerics() {
        let context = Context::create();
        let table = precedence_table(&context);
        // Every numeric key maps to a distinct precedence value.
        let mut numeric: Vec<i32> = table
            .iter()
            .filter(|(k, _)| k.is_int_type() || k.is_float_type())
            .map(|(_, p)| *p)
            .collect();
        let before = numeric.len();
        numeric.sort_unstable();
        numeric.dedup();
        assert_eq!(before, numeric.len());
    }

    #[test]
    fn unknown_types_have_negative_precedence() {
        let context = Context::create();
        let table = precedence_table(&context);
        let f32t = context.f32_type().as_any_type_enum();
        assert_eq!(cast_precedence(&table, f32t), -1);
    }

    #[test]
    fn mangling_is_deterministic() {
        let context = Context::create();
        let i32t = context.i32_type().as_basic_type_enum();
        let f64t = context.f64_type().as_basic_type_enum();
        assert_eq!(mangle_function("m:add", &[i32t, i32t]), "m_add_i32_i32");
        assert_eq!(mangle_function("m:id", &[f64t]), "m_id_f64");
        assert_eq!(mangle_function("m:f", &[]), "m_f");
    }

    #[test]
    fn loose_equality_covers_mixed_numerics() {
        let context = Context::create();
        let i8t = context.i8_type().as_basic_type_enum();
        let f64t = context.f64_type().as_basic_type_enum();
        let ptr = context
            .ptr_type(AddressSpace::default())
            .as_basic_type_enum();
        assert!(loosely_equal(i8t, f64t));
        assert!(!loosely_equal(i8t, ptr));
    }
}
