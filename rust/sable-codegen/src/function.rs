//! Expression and statement emission for one function body.
//!
//! [`FunctionEmitter`] drives the prologue, lowers the body statement by
//! statement, and hands the result to the epilogue. Applications go through
//! [`crate::call`]; function references through [`crate::closure`].

use std::rc::Rc;

use sable_core::ast::{Block, Expr, ExprKind, FuncDecl, SourceModule, Stmt, StmtKind};
use sable_core::types::{TypeId, TypeTable};
use tracing::trace;

use crate::frame::{FunctionFrame, Local};
use crate::ir::{Function, IrBuilder, IrType};
use crate::layout::{Address, Explosion, LayoutKind, RValue, TypeLayout, ValueSchema};
use crate::module::ModuleEmitter;

pub struct FunctionEmitter<'m, 'src> {
    pub(crate) module: &'m mut ModuleEmitter<'src>,
    pub(crate) builder: IrBuilder,
    pub(crate) frame: FunctionFrame,
    decl: &'src FuncDecl,
}

impl<'m, 'src> FunctionEmitter<'m, 'src> {
    /// Start emitting `decl` into `func` (a fresh, empty definition).
    pub fn new(module: &'m mut ModuleEmitter<'src>, decl: &'src FuncDecl, func: Function) -> Self {
        let mut builder = IrBuilder::new(func);
        let types = &module.source().types;
        let frame = FunctionFrame::emit_prologue(&mut builder, module.catalog_mut(), types, decl);
        Self {
            module,
            builder,
            frame,
            decl,
        }
    }

    pub fn source(&self) -> &'src SourceModule {
        self.module.source()
    }

    pub fn types(&self) -> &'src TypeTable {
        &self.module.source().types
    }

    pub fn decl(&self) -> &'src FuncDecl {
        self.decl
    }

    pub fn builder(&self) -> &IrBuilder {
        &self.builder
    }

    pub fn layout(&mut self, ty: TypeId) -> Rc<TypeLayout> {
        self.module.layout(ty)
    }

    pub fn create_alloca(&mut self, ty: IrType, align: u64, name: &str) -> Address {
        self.frame.create_alloca(&mut self.builder, ty, align, name)
    }

    /// Run the epilogue and return the finished function.
    pub fn finish(self) -> Function {
        self.frame.emit_epilogue(self.builder)
    }

    // -----------------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------------

    pub fn emit_block(&mut self, block: &Block) {
        for stmt in &block.stmts {
            if !self.builder.has_valid_position() {
                trace!(function = %self.decl.name, "skipping unreachable statements");
                break;
            }
            self.emit_stmt(stmt);
        }
    }

    pub fn emit_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.emit_rvalue(expr);
            }
            StmtKind::Let { local, name, init } => {
                let layout = self.layout(init.ty);
                // An indirect call result already lives in its own slot.
                if matches!(init.kind, ExprKind::Apply { .. }) {
                    if let Some(addr) = self.try_emit_apply_as_address(init) {
                        self.frame.bind(*local, Local { addr, layout });
                        return;
                    }
                }
                let value = self.emit_rvalue(init);
                let addr = self.create_alloca(layout.storage.clone(), layout.align, name);
                layout.store(&mut self.builder, &value, addr);
                self.frame.bind(*local, Local { addr, layout });
            }
            StmtKind::Return(value) => {
                if let Some(expr) = value {
                    let result = self.emit_rvalue(expr);
                    if let Some(slot) = self.frame.result_slot {
                        let layout = self.frame.result_layout.clone();
                        layout.store(&mut self.builder, &result, slot);
                    }
                }
                self.builder.build_br(self.frame.return_block);
            }
            StmtKind::If {
                cond,
                then_block,
                else_block,
            } => self.emit_if(cond, then_block, else_block.as_ref()),
            StmtKind::Trap => self.builder.build_unreachable(),
        }
    }

    fn emit_if(&mut self, cond: &Expr, then_block: &Block, else_block: Option<&Block>) {
        let cond = match self.emit_rvalue(cond).scalars() {
            [cond] => *cond,
            other => panic!("condition lowered to {} values", other.len()),
        };
        let then_bb = self.builder.create_block("if.then");
        let end_bb = self.builder.create_block("if.end");
        let else_bb = match else_block {
            Some(_) => self.builder.create_block("if.else"),
            None => end_bb,
        };
        self.builder.build_cond_br(cond, then_bb, else_bb);

        self.builder.append_block(then_bb);
        self.builder.position_at_end(then_bb);
        self.emit_block(then_block);
        if self.builder.has_valid_position() {
            self.builder.build_br(end_bb);
        }

        if let Some(else_block) = else_block {
            self.builder.append_block(else_bb);
            self.builder.position_at_end(else_bb);
            self.emit_block(else_block);
            if self.builder.has_valid_position() {
                self.builder.build_br(end_bb);
            }
        }

        if self.builder.func().pred_count(end_bb) > 0 {
            self.builder.append_block(end_bb);
            self.builder.position_at_end(end_bb);
        } else {
            self.builder.clear_position();
        }
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    pub fn emit_rvalue(&mut self, expr: &Expr) -> RValue {
        match &expr.kind {
            ExprKind::IntLiteral(value) => {
                let layout = self.layout(expr.ty);
                RValue::Scalars(vec![self.builder.const_int(layout.storage.clone(), *value)])
            }
            ExprKind::FloatLiteral(value) => {
                let layout = self.layout(expr.ty);
                RValue::Scalars(vec![self.builder.const_float(layout.storage.clone(), *value)])
            }
            ExprKind::BoolLiteral(value) => {
                RValue::Scalars(vec![self.builder.const_int(IrType::I1, i64::from(*value))])
            }
            ExprKind::Tuple(elements) | ExprKind::Record(elements) => {
                self.emit_structure(expr.ty, elements)
            }
            ExprKind::TupleElement { base, index } => self.emit_element(base, *index),
            ExprKind::Local(id) => {
                let local = self.frame.local(*id).clone();
                local.layout.load(&mut self.builder, local.addr)
            }
            ExprKind::Func(decl) => {
                let mut out = Explosion::new();
                self.emit_exploded_function_ref(*decl, &mut out);
                RValue::Scalars(out.claim_all())
            }
            ExprKind::Apply { .. } => {
                let layout = self.layout(expr.ty);
                self.emit_apply(expr, &layout)
            }
        }
    }

    /// Emit `expr` and add its decomposed values to `out`.
    pub fn emit_explosion(&mut self, expr: &Expr, out: &mut Explosion) {
        match &expr.kind {
            ExprKind::Apply { .. } => self.emit_exploded_apply(expr, out),
            ExprKind::Func(decl) => self.emit_exploded_function_ref(*decl, out),
            _ => {
                let layout = self.layout(expr.ty);
                let value = self.emit_rvalue(expr);
                layout.explode(&value, out);
            }
        }
    }

    fn emit_structure(&mut self, ty: TypeId, elements: &[Expr]) -> RValue {
        let layout = self.layout(ty);
        assert_eq!(
            elements.len(),
            layout.fields().len(),
            "literal of `{}` has the wrong number of fields",
            self.types().display(ty)
        );
        if let ValueSchema::Scalars(_) = layout.schema {
            let mut out = Explosion::new();
            for element in elements {
                self.emit_explosion(element, &mut out);
            }
            return RValue::Scalars(out.claim_all());
        }

        let name = match layout.kind {
            LayoutKind::Record(_) => "record",
            _ => "tuple",
        };
        let addr = self.create_alloca(layout.storage.clone(), layout.align, name);
        for (index, element) in elements.iter().enumerate() {
            let value = self.emit_rvalue(element);
            let field_addr = layout.field_address(&mut self.builder, addr, index);
            layout.fields()[index]
                .layout
                .store(&mut self.builder, &value, field_addr);
        }
        RValue::Aggregate(addr)
    }

    fn emit_element(&mut self, base: &Expr, index: usize) -> RValue {
        let layout = self.layout(base.ty);
        match self.emit_rvalue(base) {
            RValue::Scalars(values) => {
                let start = layout.field_explosion_start(index);
                let count = layout.fields()[index].layout.explosion_size();
                RValue::Scalars(values[start..start + count].to_vec())
            }
            RValue::Aggregate(addr) => {
                let field_addr = layout.field_address(&mut self.builder, addr, index);
                layout.fields()[index]
                    .layout
                    .load(&mut self.builder, field_addr)
            }
        }
    }
}
