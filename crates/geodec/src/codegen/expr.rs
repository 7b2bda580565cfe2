//! Expression lowering: literals, names, operators, calls, members.

use inkwell::module::Linkage;
use inkwell::values::{BasicMetadataValueEnum, PointerValue};
use inkwell::{Either, FloatPredicate, IntPredicate};

use crate::codegen::RValue;
use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::program::Program;
use crate::scope::ValueBinding;
use crate::types::{self, Ty};

use geode_ast::{
    AssignExpr, AssignTarget, BinaryExpr, BinaryOp, CallExpr, Callee, Expr, MemberExpr, Name,
    NewExpr, UnaryExpr, UnaryOp,
};

impl<'ctx> Program<'ctx> {
    pub fn lower_expr(&mut self, expr: &Expr) -> DiagnosticResult<RValue<'ctx>> {
        match expr {
            Expr::Int(lit) => Ok(RValue::plain(
                self.context
                    .i64_type()
                    .const_int(lit.value as u64, true)
                    .into(),
            )),
            Expr::Float(lit) => Ok(RValue::plain(
                self.context.f64_type().const_float(lit.value).into(),
            )),
            Expr::Char(lit) => Ok(RValue::plain(
                self.context
                    .i8_type()
                    .const_int(lit.value as u64, false)
                    .into(),
            )),
            Expr::Bool(lit) => Ok(RValue::plain(
                self.context
                    .bool_type()
                    .const_int(lit.value as u64, false)
                    .into(),
            )),
            Expr::Str(lit) => {
                let ptr = self.intern_string(&lit.value);
                Ok(RValue::pointer(ptr, self.context.i8_type().into()))
            }
            Expr::Ident(name) => self.lower_ident(name),
            Expr::Unary(unary) => self.lower_unary(unary),
            Expr::Binary(binary) => self.lower_binary(binary),
            Expr::Assign(assign) => self.lower_assign(assign),
            Expr::Call(call) => self.lower_call(call),
            Expr::Member(member) => {
                let (ptr, ty) = self.member_ptr(member)?;
                let basic = ty
                    .basic()
                    .ok_or_else(|| self.diag(member.span.start, "field has no loadable type"))?;
                let loaded = self.builder.build_load(basic, ptr, &member.prop.name)?;
                Ok(RValue {
                    v: loaded,
                    pointee: ty.pointee,
                })
            }
            Expr::New(new) => self.lower_new(new),
        }
    }

    fn lower_ident(&mut self, name: &Name) -> DiagnosticResult<RValue<'ctx>> {
        let binding = self.resolve_value(name)?;
        let basic = binding.ty.basic().ok_or_else(|| {
            self.diag(name.span.start, format!("\"{}\" has no loadable type", name.text))
        })?;
        let loaded = self.builder.build_load(basic, binding.ptr, &name.text)?;
        Ok(RValue {
            v: loaded,
            pointee: binding.ty.pointee,
        })
    }

    /// Resolves a possibly qualified name to a value slot through the
    /// resolver's candidate list.
    fn resolve_value(&self, name: &Name) -> DiagnosticResult<ValueBinding<'ctx>> {
        let candidates = self.search_names(&name.text);
        if let Some(binding) = self.scopes.find_value(self.scope, &candidates) {
            return Ok(binding);
        }
        if self.scopes.find_function(self.scope, &candidates).is_some() {
            return Err(self.diag(
                name.span.start,
                format!("\"{}\" is a function, not a value", name.text),
            ));
        }
        Err(self.diag(
            name.span.start,
            format!(
                "unable to find value \"{}\" in the scope. search paths: [{}]",
                name.text,
                candidates.join(", ")
            ),
        ))
    }

    fn lower_unary(&mut self, unary: &UnaryExpr) -> DiagnosticResult<RValue<'ctx>> {
        // The reference operator never evaluates its operand; it needs
        // the operand's address, not its value.
        if unary.op == UnaryOp::Ref {
            return self.lower_address_of(unary);
        }

        let operand = self.lower_expr(&unary.operand)?;

        match unary.op {
            UnaryOp::Neg => {
                if operand.ty().is_float_type() {
                    let zero = self.context.f64_type().const_float(0.0);
                    let neg = self.builder.build_float_sub(
                        zero,
                        operand.v.into_float_value(),
                        "fneg",
                    )?;
                    Ok(RValue::plain(neg.into()))
                } else if operand.ty().is_int_type() {
                    let int_ty = operand.v.into_int_value().get_type();
                    let zero = int_ty.const_zero();
                    let neg =
                        self.builder
                            .build_int_sub(zero, operand.v.into_int_value(), "neg")?;
                    Ok(RValue::plain(neg.into()))
                } else {
                    Err(self.diag(
                        unary.span.start,
                        "unary '-' applied to non-numeric operand",
                    ))
                }
            }
            UnaryOp::Not => {
                if !operand.ty().is_int_type() {
                    return Err(self.diag(
                        unary.span.start,
                        format!(
                            "unable to '!' (not) type \"{}\"",
                            types::print_type(operand.full_ty().raw)
                        ),
                    ));
                }
                // There is no intrinsic `not`: compare != false, invert
                // with xor, widen back to i32.
                let bool_ty = Ty::new(self.context.bool_type().into());
                let as_bool = self
                    .cast(operand, bool_ty)?
                    .ok_or_else(|| Diagnostic::simple("'!' operand has no value"))?;
                let f = self.context.bool_type().const_zero();
                let t = self.context.bool_type().const_int(1, false);
                let ne = self.builder.build_int_compare(
                    IntPredicate::NE,
                    as_bool.v.into_int_value(),
                    f,
                    "tobool",
                )?;
                let inverted = self.builder.build_xor(ne, t, "not")?;
                let widened = self.builder.build_int_z_extend(
                    inverted,
                    self.context.i32_type(),
                    "zext",
                )?;
                Ok(RValue::plain(widened.into()))
            }
            UnaryOp::Deref => {
                if !operand.ty().is_pointer_type() {
                    return Err(self.diag(
                        unary.span.start,
                        "attempt to dereference a non-pointer value",
                    ));
                }
                let Some(pointee) = operand.pointee else {
                    return Err(self.diag(
                        unary.span.start,
                        "cannot determine the pointed-to type of this pointer",
                    ));
                };
                let loaded = self.builder.build_load(
                    pointee,
                    operand.v.into_pointer_value(),
                    "deref",
                )?;
                Ok(RValue::plain(loaded))
            }
            UnaryOp::Ref => unreachable!("handled above"),
        }
    }

    /// `&` requires an addressable operand: something backed by an
    /// alloca or a field slot.
    fn lower_address_of(&mut self, unary: &UnaryExpr) -> DiagnosticResult<RValue<'ctx>> {
        match &unary.operand {
            Expr::Ident(name) => {
                let binding = self.resolve_value(name)?;
                let pointee = binding.ty.basic().ok_or_else(|| {
                    self.diag(unary.span.start, "cannot take the address of a void slot")
                })?;
                Ok(RValue::pointer(binding.ptr, pointee))
            }
            Expr::Member(member) => {
                let (ptr, ty) = self.member_ptr(member)?;
                let pointee = ty.basic().ok_or_else(|| {
                    self.diag(unary.span.start, "cannot take the address of a void field")
                })?;
                Ok(RValue::pointer(ptr, pointee))
            }
            _ => Err(self.diag(
                unary.span.start,
                "'&' operator called on non-addressable operand",
            )),
        }
    }

    fn lower_binary(&mut self, binary: &BinaryExpr) -> DiagnosticResult<RValue<'ctx>> {
        let lhs = self.lower_expr(&binary.lhs)?;
        let rhs = self.lower_expr(&binary.rhs)?;

        // Logical operators normalize both sides to i1 first.
        if matches!(binary.op, BinaryOp::And | BinaryOp::Or) {
            let bool_ty = Ty::new(self.context.bool_type().into());
            let l = self
                .cast(lhs, bool_ty)?
                .ok_or_else(|| Diagnostic::simple("logical operand has no value"))?;
            let r = self
                .cast(rhs, bool_ty)?
                .ok_or_else(|| Diagnostic::simple("logical operand has no value"))?;
            let result = match binary.op {
                BinaryOp::And => self.builder.build_and(
                    l.v.into_int_value(),
                    r.v.into_int_value(),
                    "and",
                )?,
                _ => self
                    .builder
                    .build_or(l.v.into_int_value(), r.v.into_int_value(), "or")?,
            };
            return Ok(RValue::plain(result.into()));
        }

        if !types::is_number(lhs.ty()) || !types::is_number(rhs.ty()) {
            return Err(self.diag(
                binary.span.start,
                "binary operator applied to non-numeric operands",
            ));
        }

        let (lhs, rhs) = self.widen_pair(lhs, rhs)?;
        let float = lhs.ty().is_float_type();

        if let Some(pred) = float_predicate(binary.op) {
            if float {
                let cmp = self.builder.build_float_compare(
                    pred,
                    lhs.v.into_float_value(),
                    rhs.v.into_float_value(),
                    "fcmp",
                )?;
                return Ok(RValue::plain(cmp.into()));
            }
            let cmp = self.builder.build_int_compare(
                int_predicate(binary.op),
                lhs.v.into_int_value(),
                rhs.v.into_int_value(),
                "icmp",
            )?;
            return Ok(RValue::plain(cmp.into()));
        }

        let value = if float {
            let l = lhs.v.into_float_value();
            let r = rhs.v.into_float_value();
            match binary.op {
                BinaryOp::Add => self.builder.build_float_add(l, r, "fadd")?.into(),
                BinaryOp::Sub => self.builder.build_float_sub(l, r, "fsub")?.into(),
                BinaryOp::Mul => self.builder.build_float_mul(l, r, "fmul")?.into(),
                BinaryOp::Div => self.builder.build_float_div(l, r, "fdiv")?.into(),
                BinaryOp::Rem => self.builder.build_float_rem(l, r, "frem")?.into(),
                _ => unreachable!("comparisons handled above"),
            }
        } else {
            let l = lhs.v.into_int_value();
            let r = rhs.v.into_int_value();
            match binary.op {
                BinaryOp::Add => self.builder.build_int_add(l, r, "add")?.into(),
                BinaryOp::Sub => self.builder.build_int_sub(l, r, "sub")?.into(),
                BinaryOp::Mul => self.builder.build_int_mul(l, r, "mul")?.into(),
                BinaryOp::Div => self.builder.build_int_signed_div(l, r, "sdiv")?.into(),
                BinaryOp::Rem => self.builder.build_int_signed_rem(l, r, "srem")?.into(),
                _ => unreachable!("comparisons handled above"),
            }
        };
        Ok(RValue::plain(value))
    }

    fn lower_assign(&mut self, assign: &AssignExpr) -> DiagnosticResult<RValue<'ctx>> {
        let value = self.lower_expr(&assign.value)?;
        let (slot, ty) = match &assign.target {
            AssignTarget::Ident(name) => {
                let binding = self.resolve_value(name)?;
                (binding.ptr, binding.ty)
            }
            AssignTarget::Member(member) => self.member_ptr(member)?,
        };
        let basic = ty
            .basic()
            .ok_or_else(|| self.diag(assign.span.start, "cannot assign to a void slot"))?;
        let cast = self.cast_to_basic(value, basic)?;
        self.builder.build_store(slot, cast.v)?;
        Ok(cast)
    }

    fn lower_call(&mut self, call: &CallExpr) -> DiagnosticResult<RValue<'ctx>> {
        match &call.callee {
            Callee::Name(name) => {
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.lower_expr(arg)?);
                }
                let arg_tys: Vec<Ty<'ctx>> = args.iter().map(|a| a.full_ty()).collect();
                let candidates = self.search_names(&name.text);
                let function = self.find_function(&candidates, &arg_tys, name.span.start)?;
                self.build_call_with_casts(function, &args, call.span.start)
            }
            Callee::Method(member) => self.lower_method_call(member, &call.args, call.span.start),
        }
    }

    /// Walks the resolver's candidate list; the first registry hit that
    /// type-checks wins.
    pub fn find_function(
        &mut self,
        candidates: &[String],
        arg_tys: &[Ty<'ctx>],
        span_start: usize,
    ) -> DiagnosticResult<inkwell::values::FunctionValue<'ctx>> {
        for candidate in candidates {
            if let Some(function) = self.get_function(candidate, Some(arg_tys))? {
                return Ok(function);
            }
        }
        Err(self.diag(
            span_start,
            format!(
                "unable to find function with names [{}]",
                candidates.join(", ")
            ),
        ))
    }

    fn build_call_with_casts(
        &mut self,
        function: inkwell::values::FunctionValue<'ctx>,
        args: &[RValue<'ctx>],
        span_start: usize,
    ) -> DiagnosticResult<RValue<'ctx>> {
        let declared = function.get_type().get_param_types();
        let mut call_args: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            // Known parameters are cast to their declared types;
            // variadic extras pass through untouched.
            let value = match declared.get(i) {
                Some(meta) => {
                    let basic = inkwell::types::BasicTypeEnum::try_from(*meta).map_err(|_| {
                        self.diag(span_start, "unsupported parameter type in call")
                    })?;
                    self.cast_to_basic(*arg, basic)?.v
                }
                None => arg.v,
            };
            call_args.push(value.into());
        }
        let site = self.builder.build_call(function, &call_args, "call")?;
        match site.try_as_basic_value() {
            Either::Left(value) => Ok(RValue::plain(value)),
            Either::Right(_) => {
                // Void calls still need a placeholder value for
                // expression positions; a zero i32 is never observed.
                Ok(RValue::plain(self.context.i32_type().const_zero().into()))
            }
        }
    }

    fn lower_method_call(
        &mut self,
        member: &MemberExpr,
        args: &[Expr],
        span_start: usize,
    ) -> DiagnosticResult<RValue<'ctx>> {
        let object = self.lower_expr(&member.obj)?;
        let class_key = self.class_key_of(&object).ok_or_else(|| {
            self.diag(
                member.span.start,
                "method call on a value that is not a class instance",
            )
        })?;
        let class = self.classes[&class_key].clone();
        if !class
            .decl
            .methods
            .iter()
            .any(|m| m.ident.name == member.prop.name)
        {
            return Err(self.diag(
                member.prop.span.start,
                format!(
                    "class {} has no method \"{}\"",
                    class.decl.ident.name, member.prop.name
                ),
            ));
        }

        let mut lowered = vec![object];
        for arg in args {
            lowered.push(self.lower_expr(arg)?);
        }
        let arg_tys: Vec<Ty<'ctx>> = lowered.iter().map(|a| a.full_ty()).collect();

        let method_key = format!("{}.{}", class_key, member.prop.name);
        let function = self
            .get_function(&method_key, Some(&arg_tys))?
            .ok_or_else(|| {
                self.diag(
                    member.prop.span.start,
                    format!(
                        "class {} has no method \"{}\"",
                        class.decl.ident.name, member.prop.name
                    ),
                )
            })?;
        self.build_call_with_casts(function, &lowered, span_start)
    }

    /// Maps a class-instance value back to its registry key via the
    /// nominal struct type it points at.
    fn class_key_of(&self, value: &RValue<'ctx>) -> Option<String> {
        let pointee = value.pointee?;
        if !pointee.is_struct_type() {
            return None;
        }
        let struct_ty = pointee.into_struct_type();
        for (key, st) in &self.class_types {
            if *st == struct_ty {
                return Some(key.clone());
            }
        }
        None
    }

    /// Resolves `obj.field` to the field's slot pointer and type.
    pub fn member_ptr(
        &mut self,
        member: &MemberExpr,
    ) -> DiagnosticResult<(PointerValue<'ctx>, Ty<'ctx>)> {
        let object = self.lower_expr(&member.obj)?;
        let class_key = self.class_key_of(&object).ok_or_else(|| {
            self.diag(
                member.span.start,
                "field access on a value that is not a class instance",
            )
        })?;
        let class = self.classes[&class_key].clone();
        let struct_ty = self.class_types[&class_key];

        let Some(index) = class
            .decl
            .fields
            .iter()
            .position(|f| f.ident.name == member.prop.name)
        else {
            return Err(self.diag(
                member.prop.span.start,
                format!(
                    "class {} has no field \"{}\"",
                    class.decl.ident.name, member.prop.name
                ),
            ));
        };

        let ptr = self.builder.build_struct_gep(
            struct_ty,
            object.v.into_pointer_value(),
            index as u32,
            &member.prop.name,
        )?;
        // Resolved field types carry pointee information that the
        // struct layout alone cannot recover.
        let field_ty = self
            .class_field_tys
            .get(&class_key)
            .and_then(|tys| tys.get(index))
            .copied()
            .ok_or_else(|| Diagnostic::simple("class field index out of range"))?;
        Ok((ptr, field_ty))
    }

    fn lower_new(&mut self, new: &NewExpr) -> DiagnosticResult<RValue<'ctx>> {
        let candidates = self.search_names(&new.class.text);
        let Some(class_key) = candidates
            .iter()
            .find(|c| self.classes.contains_key(c.as_str()))
            .cloned()
        else {
            return Err(self.diag(
                new.class.span.start,
                format!(
                    "unable to find class \"{}\". search paths: [{}]",
                    new.class.text,
                    candidates.join(", ")
                ),
            ));
        };
        let class = self.classes[&class_key].clone();
        let struct_ty = self.class_types[&class_key];

        if new.args.len() > class.decl.fields.len() {
            return Err(self.diag(
                new.span.start,
                format!(
                    "class {} has {} fields but {} initializers were given",
                    class.decl.ident.name,
                    class.decl.fields.len(),
                    new.args.len()
                ),
            ));
        }

        let slot = self.create_entry_alloca(struct_ty.into(), &class.decl.ident.name)?;
        for (i, arg) in new.args.iter().enumerate() {
            let value = self.lower_expr(arg)?;
            let field_ty = struct_ty
                .get_field_type_at_index(i as u32)
                .ok_or_else(|| Diagnostic::simple("class field index out of range"))?;
            let cast = self.cast_to_basic(value, field_ty)?;
            let field_ptr = self.builder.build_struct_gep(
                struct_ty,
                slot,
                i as u32,
                &class.decl.fields[i].ident.name,
            )?;
            self.builder.build_store(field_ptr, cast.v)?;
        }

        Ok(RValue::pointer(slot, struct_ty.into()))
    }

    /// Interns a string constant: one private null-terminated global
    /// per distinct content, reused on every later occurrence.
    pub fn intern_string(&mut self, value: &str) -> PointerValue<'ctx> {
        if let Some(ptr) = self.string_defs.get(value) {
            return *ptr;
        }
        let data = self.context.const_string(value.as_bytes(), true);
        let name = format!("str.{}", self.string_defs.len());
        let global = self.module.add_global(data.get_type(), None, &name);
        global.set_initializer(&data);
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        let ptr = global.as_pointer_value();
        self.string_defs.insert(value.to_string(), ptr);
        ptr
    }
}

fn float_predicate(op: BinaryOp) -> Option<FloatPredicate> {
    match op {
        BinaryOp::Eq => Some(FloatPredicate::OEQ),
        BinaryOp::Ne => Some(FloatPredicate::ONE),
        BinaryOp::Lt => Some(FloatPredicate::OLT),
        BinaryOp::Le => Some(FloatPredicate::OLE),
        BinaryOp::Gt => Some(FloatPredicate::OGT),
        BinaryOp::Ge => Some(FloatPredicate::OGE),
        _ => None,
    }
}

fn int_predicate(op: BinaryOp) -> IntPredicate {
    match op {
        BinaryOp::Eq => IntPredicate::EQ,
        BinaryOp::Ne => IntPredicate::NE,
        BinaryOp::Lt => IntPredicate::SLT,
        BinaryOp::Le => IntPredicate::SLE,
        BinaryOp::Gt => IntPredicate::SGT,
        BinaryOp::Ge => IntPredicate::SGE,
        _ => unreachable!("not a comparison"),
    }
}
