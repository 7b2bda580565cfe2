//! Statement lowering: structured control flow, declarations, returns.
//!
//! Every structured construct follows the same pattern: split the
//! current block, create labeled child blocks, lower the sub-statements
//! into them, and make sure every block it touched ends in exactly one
//! terminator before emission continues in the merge block.

use inkwell::IntPredicate;
use inkwell::basic_block::BasicBlock;

use crate::diagnostics::{Diagnostic, DiagnosticResult};
use crate::program::Program;
use crate::scope::{Binding, ValueBinding};
use crate::types::Ty;

use geode_ast::{BlockStmt, ForStmt, IfStmt, ReturnStmt, Stmt, VarDeclStmt, WhileStmt};

impl<'ctx> Program<'ctx> {
    /// Lowers a braced block in the current scope and returns the block
    /// the cursor ends up in (nested control flow moves it).
    pub fn lower_block(&mut self, block: &BlockStmt) -> DiagnosticResult<BasicBlock<'ctx>> {
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(self.cursor.current())
    }

    pub fn lower_stmt(&mut self, stmt: &Stmt) -> DiagnosticResult<()> {
        match stmt {
            Stmt::Block(block) => {
                self.scope_down();
                let result = self.lower_block(block);
                self.scope_up()?;
                result.map(|_| ())
            }
            Stmt::VarDecl(decl) => self.lower_var_decl(decl),
            Stmt::Return(ret) => self.lower_return(ret),
            Stmt::If(ifstmt) => self.lower_if(ifstmt),
            Stmt::While(whilestmt) => self.lower_while(whilestmt),
            Stmt::For(forstmt) => self.lower_for(forstmt),
            Stmt::Expr(expr) => {
                self.lower_expr(&expr.expr)?;
                Ok(())
            }
        }
    }

    fn lower_var_decl(&mut self, decl: &VarDeclStmt) -> DiagnosticResult<()> {
        let ty = self.find_type(&decl.ty)?;
        let Some(basic) = ty.basic() else {
            return Err(self.diag(
                decl.ty.span.start,
                format!("variable \"{}\" cannot have type void", decl.ident.name),
            ));
        };
        let slot = self.create_entry_alloca(basic, &decl.ident.name)?;
        if let Some(init) = &decl.init {
            let value = self.lower_expr(init)?;
            let cast = self.cast_to_basic(value, basic)?;
            self.builder.build_store(slot, cast.v)?;
        }
        self.scopes.define(
            self.scope,
            decl.ident.name.clone(),
            Binding::Value(ValueBinding { ptr: slot, ty }),
        );
        Ok(())
    }

    fn lower_return(&mut self, ret: &ReturnStmt) -> DiagnosticResult<()> {
        let ret_ty = self
            .cursor
            .ret_ty
            .ok_or_else(|| Diagnostic::simple("return outside of a function"))?;

        let inst = if ret_ty.is_void() || ret.value.is_none() {
            self.builder.build_return(None)?
        } else {
            let value = ret.value.as_ref().expect("checked above");
            let mut lowered = self.lower_expr(value)?;
            let expected = ret_ty.basic().expect("non-void return type");
            if lowered.ty() != expected {
                if !(lowered.ty().is_int_type() && expected.is_int_type()) {
                    let fn_name = self.cursor.fn_name.clone();
                    let expected_name = self.type_name(&ret_ty);
                    let given_name = self.type_name(&lowered.full_ty());
                    return Err(self.diag(
                        ret.span.start,
                        format!(
                            "incorrect return value for function {}. expected: {} ({}). given: {} ({})",
                            fn_name,
                            expected_name,
                            crate::types::print_type(ret_ty.raw),
                            given_name,
                            crate::types::print_type(lowered.full_ty().raw),
                        ),
                    ));
                }
                lowered = self.cast_to_basic(lowered, expected)?;
            }
            self.builder.build_return(Some(&lowered.v))?
        };

        if self.debug {
            self.attach_location_metadata(inst, ret.span.start);
        }
        Ok(())
    }

    /// Attaches `file:line:col` metadata to an emitted instruction;
    /// part of the opt-in debug side channel.
    fn attach_location_metadata(
        &self,
        inst: inkwell::values::InstructionValue<'ctx>,
        span_start: usize,
    ) {
        let Some(file) = self.current_file.as_ref() else {
            return;
        };
        let Some(source) = self.sources.get(file) else {
            return;
        };
        let (line, col) = geode_parser::line_col(source, span_start);
        let loc = format!("{}:{}:{}", file.display(), line, col);
        let md = self
            .context
            .metadata_node(&[self.context.metadata_string(&loc).into()]);
        let kind = self.context.get_kind_id("geode.loc");
        let _ = inst.set_metadata(md, kind);
    }

    fn lower_if(&mut self, ifstmt: &IfStmt) -> DiagnosticResult<()> {
        let index = self.next_index();
        let parent = self.cursor.current();

        // Predicate compares != 0 over i32 in the parent block.
        let predicate = self.lower_expr(&ifstmt.test)?;
        let i32_ty = Ty::new(self.context.i32_type().into());
        let cast = self
            .cast(predicate, i32_ty)?
            .ok_or_else(|| Diagnostic::simple("if predicate has no value"))?;
        let zero = self.context.i32_type().const_zero();
        let cond = self.builder.build_int_compare(
            IntPredicate::NE,
            zero,
            cast.v.into_int_value(),
            "ifcond",
        )?;

        let then_block = self.append_block(&format!("if.{}.then", index))?;
        let else_block = self.append_block(&format!("if.{}.else", index))?;

        let then_last = self.gen_in_block(then_block, |p| p.lower_block(&ifstmt.cons))?;

        let else_last = if let Some(alt) = &ifstmt.alt {
            Some(self.gen_in_block(else_block, |p| p.lower_block(alt))?)
        } else {
            None
        };

        let end_block = self.append_block(&format!("if.{}.end", index))?;

        // Every entered block terminates into the end block unless a
        // return (or nested construct) already terminated it.
        self.branch_if_no_terminator(then_block, end_block)?;
        self.branch_if_no_terminator(then_last, end_block)?;
        self.branch_if_no_terminator(else_block, end_block)?;
        if let Some(last) = else_last {
            self.branch_if_no_terminator(last, end_block)?;
        }

        self.builder.position_at_end(parent);
        self.builder
            .build_conditional_branch(cond, then_block, else_block)?;

        self.set_block(end_block);
        Ok(())
    }

    fn lower_while(&mut self, whilestmt: &WhileStmt) -> DiagnosticResult<()> {
        let index = self.next_index();
        let parent = self.cursor.current();

        let start_block = self.append_block(&format!("while.{}.start", index))?;
        let body_block = self.append_block(&format!("while.{}.body", index))?;
        let merge_block = self.append_block(&format!("while.{}.merge", index))?;

        self.branch_if_no_terminator(parent, start_block)?;

        // Predicate is lowered inside the start block so re-entry
        // re-evaluates it.
        self.set_block(start_block);
        let predicate = self.lower_expr(&whilestmt.test)?;
        let bool_ty = Ty::new(self.context.bool_type().into());
        let cast = self
            .cast(predicate, bool_ty)?
            .ok_or_else(|| Diagnostic::simple("while predicate has no value"))?;
        let one = self.context.bool_type().const_int(1, false);
        let cond = self.builder.build_int_compare(
            IntPredicate::EQ,
            one,
            cast.v.into_int_value(),
            "whilecond",
        )?;
        self.builder
            .build_conditional_branch(cond, body_block, merge_block)?;

        self.set_block(body_block);
        let body_last = self.lower_block(&whilestmt.body)?;
        self.branch_if_no_terminator(body_block, start_block)?;
        self.branch_if_no_terminator(body_last, start_block)?;

        self.set_block(merge_block);
        Ok(())
    }

    fn lower_for(&mut self, forstmt: &ForStmt) -> DiagnosticResult<()> {
        let index = self.next_index();

        // The loop gets its own scope so header bindings die with it.
        self.scope_down();
        let result = self.lower_for_inner(forstmt, index);
        self.scope_up()?;
        result
    }

    fn lower_for_inner(&mut self, forstmt: &ForStmt, index: usize) -> DiagnosticResult<()> {
        let cond_block = self.append_block(&format!("for.{}.cond", index))?;
        let body_block = self.append_block(&format!("for.{}.body", index))?;
        let end_block = self.append_block(&format!("for.{}.end", index))?;

        // Initializer runs once in the parent block.
        self.lower_stmt(&forstmt.init)?;
        let parent = self.cursor.current();
        self.branch_if_no_terminator(parent, cond_block)?;

        self.set_block(cond_block);
        let predicate = self.lower_expr(&forstmt.test)?;
        let bool_ty = Ty::new(self.context.bool_type().into());
        let cast = self
            .cast(predicate, bool_ty)?
            .ok_or_else(|| Diagnostic::simple("for predicate has no value"))?;
        let one = self.context.bool_type().const_int(1, false);
        let cond = self.builder.build_int_compare(
            IntPredicate::EQ,
            one,
            cast.v.into_int_value(),
            "forcond",
        )?;
        self.builder
            .build_conditional_branch(cond, body_block, end_block)?;

        self.set_block(body_block);
        self.lower_block(&forstmt.body)?;
        self.lower_stmt(&forstmt.step)?;
        let body_last = self.cursor.current();
        self.branch_if_no_terminator(body_block, cond_block)?;
        self.branch_if_no_terminator(body_last, cond_block)?;

        self.set_block(end_block);
        Ok(())
    }
}
