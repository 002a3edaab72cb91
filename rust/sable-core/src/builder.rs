//! Programmatic construction of typed modules.
//!
//! Drivers and tests use [`ModuleBuilder`] to produce the same typed AST the
//! type checker would, with every expression type filled in.

use crate::ast::{
    Block, DeclContext, DeclId, Expr, ExprKind, FuncDecl, LocalId, Param, SourceModule, Span,
    Stmt, StmtKind,
};
use crate::builtins::BuiltinKind;
use crate::types::{TypeId, TypeKind, TypeTable};

pub struct ModuleBuilder {
    name: String,
    pub types: TypeTable,
    decls: Vec<FuncDecl>,
    next_local: u32,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: TypeTable::new(),
            decls: Vec::new(),
            next_local: 0,
        }
    }

    pub fn fresh_local(&mut self) -> LocalId {
        let id = LocalId(self.next_local);
        self.next_local += 1;
        id
    }

    /// Declare a function. Parameters are derived from the input type: one per
    /// tuple field, or a single parameter for a non-tuple input.
    pub fn declare(&mut self, name: &str, ty: TypeId, context: DeclContext) -> DeclId {
        let (input, _) = self
            .types
            .as_function(ty)
            .unwrap_or_else(|| panic!("`{name}` is not declared with a function type"));
        let param_tys: Vec<TypeId> = match self.types.kind(input) {
            TypeKind::Tuple(fields) => fields.iter().map(|f| f.ty).collect(),
            _ => vec![input],
        };
        let params = if context == DeclContext::Builtin {
            Vec::new()
        } else {
            param_tys
                .into_iter()
                .enumerate()
                .map(|(i, ty)| Param {
                    id: self.fresh_local(),
                    name: format!("p{i}"),
                    ty,
                    span: Span::dummy(),
                })
                .collect()
        };
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(FuncDecl {
            id,
            name: name.to_string(),
            ty,
            context,
            params,
            body: None,
            span: Span::dummy(),
        });
        id
    }

    pub fn declare_global(&mut self, name: &str, ty: TypeId) -> DeclId {
        self.declare(name, ty, DeclContext::Module)
    }

    pub fn declare_builtin(&mut self, kind: BuiltinKind, ty: TypeId) -> DeclId {
        self.declare(kind.name(), ty, DeclContext::Builtin)
    }

    pub fn define(&mut self, decl: DeclId, body: Vec<Stmt>) {
        self.decls[decl.0 as usize].body = Some(Block::new(body));
    }

    pub fn set_span(&mut self, decl: DeclId, span: Span) {
        self.decls[decl.0 as usize].span = span;
    }

    pub fn finish(self) -> SourceModule {
        SourceModule {
            name: self.name,
            types: self.types,
            decls: self.decls,
        }
    }

    // -- Expressions --------------------------------------------------------

    pub fn int(&mut self, value: i64) -> Expr {
        let ty = self.types.int(64);
        Expr::new(ExprKind::IntLiteral(value), ty)
    }

    pub fn float(&mut self, value: f64) -> Expr {
        let ty = self.types.float(64);
        Expr::new(ExprKind::FloatLiteral(value), ty)
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        let ty = self.types.bool();
        Expr::new(ExprKind::BoolLiteral(value), ty)
    }

    pub fn tuple(&mut self, elements: Vec<Expr>) -> Expr {
        let tys: Vec<TypeId> = elements.iter().map(|e| e.ty).collect();
        let ty = self.types.tuple(&tys);
        Expr::new(ExprKind::Tuple(elements), ty)
    }

    pub fn record(&mut self, ty: TypeId, fields: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::Record(fields), ty)
    }

    pub fn element(&mut self, base: Expr, index: usize) -> Expr {
        let ty = match self.types.kind(base.ty) {
            TypeKind::Tuple(fields) | TypeKind::Record { fields, .. } => fields[index].ty,
            other => panic!("cannot project element {index} out of {other:?}"),
        };
        Expr::new(
            ExprKind::TupleElement {
                base: Box::new(base),
                index,
            },
            ty,
        )
    }

    pub fn func_ref(&self, decl: DeclId) -> Expr {
        let ty = self.decls[decl.0 as usize].ty;
        Expr::new(ExprKind::Func(decl), ty)
    }

    pub fn local(&self, id: LocalId, ty: TypeId) -> Expr {
        Expr::new(ExprKind::Local(id), ty)
    }

    /// Reference to the `index`th parameter of `decl`.
    pub fn param(&self, decl: DeclId, index: usize) -> Expr {
        let param = &self.decls[decl.0 as usize].params[index];
        Expr::new(ExprKind::Local(param.id), param.ty)
    }

    pub fn apply(&mut self, callee: Expr, arg: Expr) -> Expr {
        let (_, result) = self
            .types
            .as_function(callee.ty)
            .expect("callee of an application must have a function type");
        Expr::new(
            ExprKind::Apply {
                callee: Box::new(callee),
                arg: Box::new(arg),
            },
            result,
        )
    }

    /// Apply a declaration directly by name reference.
    pub fn call(&mut self, decl: DeclId, arg: Expr) -> Expr {
        let callee = self.func_ref(decl);
        self.apply(callee, arg)
    }
}

// -- Statements -------------------------------------------------------------

pub fn expr_stmt(expr: Expr) -> Stmt {
    stmt(StmtKind::Expr(expr))
}

pub fn let_stmt(local: LocalId, name: &str, init: Expr) -> Stmt {
    stmt(StmtKind::Let {
        local,
        name: name.to_string(),
        init,
    })
}

pub fn ret(expr: Expr) -> Stmt {
    stmt(StmtKind::Return(Some(expr)))
}

pub fn ret_void() -> Stmt {
    stmt(StmtKind::Return(None))
}

pub fn if_stmt(cond: Expr, then_block: Vec<Stmt>, else_block: Option<Vec<Stmt>>) -> Stmt {
    stmt(StmtKind::If {
        cond,
        then_block: Block::new(then_block),
        else_block: else_block.map(Block::new),
    })
}

pub fn trap() -> Stmt {
    stmt(StmtKind::Trap)
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt {
        kind,
        span: Span::dummy(),
    }
}
