//! Shared lowering machinery: the block cursor, the single-terminator
//! discipline, entry-block allocas, and the type-cast engine.

pub mod expr;
pub mod stmt;

use inkwell::basic_block::BasicBlock;
use inkwell::types::{AnyType, BasicTypeEnum};
use inkwell::values::{BasicValue, BasicValueEnum, FunctionValue, PointerValue};

use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::program::Program;
use crate::types::{self, Ty};

/// The compiler cursor: which function and block instructions are
/// currently being appended to. Cloned wholesale by the function
/// compiler's save/restore.
#[derive(Debug, Clone, Default)]
pub struct Cursor<'ctx> {
    pub function: Option<FunctionValue<'ctx>>,
    /// Source-level name of the function being lowered, for messages.
    pub fn_name: String,
    /// Declared return type of the function being lowered.
    pub ret_ty: Option<Ty<'ctx>>,
    blocks: Vec<BasicBlock<'ctx>>,
}

impl<'ctx> Cursor<'ctx> {
    pub fn new(function: FunctionValue<'ctx>, fn_name: String, ret_ty: Ty<'ctx>) -> Self {
        Cursor {
            function: Some(function),
            fn_name,
            ret_ty: Some(ret_ty),
            blocks: Vec::new(),
        }
    }

    /// Pushes the first (or a nested) block onto the stack.
    pub fn enter(&mut self, block: BasicBlock<'ctx>) {
        self.blocks.push(block);
    }

    pub fn leave(&mut self) {
        self.blocks.pop();
    }

    /// Replaces the current block; emission continues there.
    pub fn replace(&mut self, block: BasicBlock<'ctx>) {
        self.blocks.pop();
        self.blocks.push(block);
    }

    pub fn current(&self) -> BasicBlock<'ctx> {
        *self.blocks.last().expect("cursor has no current block")
    }

    pub fn current_opt(&self) -> Option<BasicBlock<'ctx>> {
        self.blocks.last().copied()
    }
}

/// A lowered value. Pointers carry their pointed-to type alongside,
/// since opaque pointers no longer expose it.
#[derive(Debug, Clone, Copy)]
pub struct RValue<'ctx> {
    pub v: BasicValueEnum<'ctx>,
    pub pointee: Option<BasicTypeEnum<'ctx>>,
}

impl<'ctx> RValue<'ctx> {
    pub fn plain(v: BasicValueEnum<'ctx>) -> Self {
        RValue { v, pointee: None }
    }

    pub fn pointer(v: PointerValue<'ctx>, pointee: BasicTypeEnum<'ctx>) -> Self {
        RValue {
            v: v.as_basic_value_enum(),
            pointee: Some(pointee),
        }
    }

    pub fn ty(&self) -> BasicTypeEnum<'ctx> {
        self.v.get_type()
    }

    /// The value's type as a [`Ty`], preserving pointee information.
    pub fn full_ty(&self) -> Ty<'ctx> {
        Ty {
            raw: self.v.get_type().as_any_type_enum(),
            pointee: self.pointee,
        }
    }
}

impl<'ctx> Program<'ctx> {
    /// Appends a fresh basic block to the function being lowered.
    pub fn append_block(&mut self, name: &str) -> DiagnosticResult<BasicBlock<'ctx>> {
        let function = self
            .cursor
            .function
            .ok_or_else(|| Diagnostic::simple("block created outside of a function"))?;
        Ok(self.context.append_basic_block(function, name))
    }

    /// Replaces the cursor's current block and repositions the builder.
    pub fn set_block(&mut self, block: BasicBlock<'ctx>) {
        self.cursor.replace(block);
        self.builder.position_at_end(block);
    }

    /// Runs `f` with emission redirected into `block`, then returns the
    /// cursor to where it was.
    pub fn gen_in_block<T>(
        &mut self,
        block: BasicBlock<'ctx>,
        f: impl FnOnce(&mut Self) -> DiagnosticResult<T>,
    ) -> DiagnosticResult<T> {
        self.cursor.enter(block);
        self.builder.position_at_end(block);
        let result = f(self);
        self.cursor.leave();
        if let Some(prev) = self.cursor.current_opt() {
            self.builder.position_at_end(prev);
        }
        result
    }

    /// Appends an unconditional branch when and only when the block's
    /// terminator slot is empty. This is what keeps nested structured
    /// lowering composable: every block ends with exactly one
    /// terminator, no matter which construct filled it.
    pub fn branch_if_no_terminator(
        &self,
        block: BasicBlock<'ctx>,
        to: BasicBlock<'ctx>,
    ) -> DiagnosticResult<()> {
        if block.get_terminator().is_none() {
            let builder = self.context.create_builder();
            builder.position_at_end(block);
            builder.build_unconditional_branch(to)?;
        }
        Ok(())
    }

    /// Creates an alloca in the entry block of the current function, so
    /// every local slot dominates its uses.
    pub fn create_entry_alloca(
        &self,
        ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> DiagnosticResult<PointerValue<'ctx>> {
        let function = self
            .cursor
            .function
            .ok_or_else(|| Diagnostic::simple("alloca outside of a function"))?;
        let entry = function
            .get_first_basic_block()
            .ok_or_else(|| Diagnostic::simple("function has no entry block"))?;
        let builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first) => builder.position_before(&first),
            None => builder.position_at_end(entry),
        }
        Ok(builder.build_alloca(ty, name)?)
    }

    /// The numeric cast precedence of a type; unknown types are -1.
    pub fn cast_precedence(&self, ty: Ty<'ctx>) -> i32 {
        types::cast_precedence(&self.precedences, ty.raw)
    }

    /// The sole legal way to change a value's type.
    ///
    /// Returns `None` only when casting to void (the value is
    /// discarded). Casting a value to its own type returns it unchanged
    /// with no emitted instruction, and integer/float constants are
    /// retyped rather than converted.
    pub fn cast(
        &mut self,
        input: RValue<'ctx>,
        to: Ty<'ctx>,
    ) -> DiagnosticResult<Option<RValue<'ctx>>> {
        let in_ty = input.ty();

        if to.is_void() {
            return Ok(None);
        }
        let Some(to_basic) = to.basic() else {
            return Ok(None);
        };

        if in_ty == to_basic {
            // Same representation; just adopt the target's pointee.
            return Ok(Some(RValue {
                v: input.v,
                pointee: to.pointee.or(input.pointee),
            }));
        }

        // Constants are retyped in place rather than converted.
        if in_ty.is_int_type() && to_basic.is_int_type() {
            let iv = input.v.into_int_value();
            if iv.is_const() {
                if let Some(value) = iv.get_sign_extended_constant() {
                    let retyped = to_basic.into_int_type().const_int(value as u64, true);
                    return Ok(Some(RValue::plain(retyped.into())));
                }
            }
        }
        if in_ty.is_float_type() && to_basic.is_float_type() {
            let fv = input.v.into_float_value();
            if fv.is_const() {
                if let Some((value, _lossy)) = fv.get_constant() {
                    let retyped = to_basic.into_float_type().const_float(value);
                    return Ok(Some(RValue::plain(retyped.into())));
                }
            }
        }

        if in_ty.is_pointer_type() && to_basic.is_pointer_type() {
            let cast = self.builder.build_pointer_cast(
                input.v.into_pointer_value(),
                to_basic.into_pointer_type(),
                "ptrcast",
            )?;
            return Ok(Some(RValue {
                v: cast.as_basic_value_enum(),
                pointee: to.pointee,
            }));
        }

        if in_ty.is_float_type() && to_basic.is_int_type() {
            let cast = self.builder.build_float_to_signed_int(
                input.v.into_float_value(),
                to_basic.into_int_type(),
                "fptosi",
            )?;
            return Ok(Some(RValue::plain(cast.into())));
        }

        if in_ty.is_int_type() && to_basic.is_float_type() {
            let cast = self.builder.build_signed_int_to_float(
                input.v.into_int_value(),
                to_basic.into_float_type(),
                "sitofp",
            )?;
            return Ok(Some(RValue::plain(cast.into())));
        }

        if in_ty.is_int_type() && to_basic.is_int_type() {
            let in_size = types::type_size(in_ty);
            let out_size = types::type_size(to_basic);
            let iv = input.v.into_int_value();
            let target = to_basic.into_int_type();
            let cast = if in_size < out_size {
                self.builder.build_int_s_extend(iv, target, "sext")?
            } else if in_size == out_size {
                iv
            } else {
                self.builder.build_int_truncate(iv, target, "trunc")?
            };
            return Ok(Some(RValue::plain(cast.into())));
        }

        if in_ty.is_float_type() && to_basic.is_float_type() {
            let in_size = types::type_size(in_ty);
            let out_size = types::type_size(to_basic);
            let fv = input.v.into_float_value();
            let target = to_basic.into_float_type();
            let cast = if in_size < out_size {
                self.builder.build_float_ext(fv, target, "fpext")?
            } else if in_size == out_size {
                fv
            } else {
                self.builder.build_float_trunc(fv, target, "fptrunc")?
            };
            return Ok(Some(RValue::plain(cast.into())));
        }

        if in_ty.is_pointer_type() && to_basic.is_int_type() {
            let cast = self.builder.build_ptr_to_int(
                input.v.into_pointer_value(),
                to_basic.into_int_type(),
                "ptrtoint",
            )?;
            return Ok(Some(RValue::plain(cast.into())));
        }

        if in_ty.is_int_type() && to_basic.is_pointer_type() {
            let cast = self.builder.build_int_to_ptr(
                input.v.into_int_value(),
                to_basic.into_pointer_type(),
                "inttoptr",
            )?;
            return Ok(Some(RValue {
                v: cast.as_basic_value_enum(),
                pointee: to.pointee,
            }));
        }

        Err(Diagnostic::simple(format!(
            "failed to typecast type {} to {}",
            types::print_type(in_ty.as_any_type_enum()),
            types::print_type(to.raw)
        )))
    }

    /// Casts to a basic type, for callers that know the target is not
    /// void.
    pub fn cast_to_basic(
        &mut self,
        input: RValue<'ctx>,
        to: BasicTypeEnum<'ctx>,
    ) -> DiagnosticResult<RValue<'ctx>> {
        self.cast(input, Ty::from_basic(to))?
            .ok_or_else(|| Diagnostic::simple("cast produced no value"))
    }

    /// Reconciles the operands of a mixed-type numeric binary
    /// operation: the side with the lower cast precedence is widened to
    /// the other's type.
    pub fn widen_pair(
        &mut self,
        lhs: RValue<'ctx>,
        rhs: RValue<'ctx>,
    ) -> DiagnosticResult<(RValue<'ctx>, RValue<'ctx>)> {
        if lhs.ty() == rhs.ty() {
            return Ok((lhs, rhs));
        }
        let lp = self.cast_precedence(lhs.full_ty());
        let rp = self.cast_precedence(rhs.full_ty());
        if lp < rp {
            let widened = self.cast_to_basic(lhs, rhs.ty())?;
            Ok((widened, rhs))
        } else {
            let widened = self.cast_to_basic(rhs, lhs.ty())?;
            Ok((lhs, widened))
        }
    }
}
