//! Typed AST handed from the type checker to the backend.
//!
//! Every expression carries its checked [`TypeId`]. Function application takes
//! exactly one argument expression; multiple arguments are a tuple.

use serde::{Deserialize, Serialize};

use crate::types::{TypeId, TypeTable};

/// Source location in the original file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the start in the source
    pub start: usize,
    /// Byte offset of the end (exclusive) in the source
    pub end: usize,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub col: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, col: usize) -> Self {
        Self {
            start,
            end,
            line,
            col,
        }
    }

    pub fn dummy() -> Self {
        Self::default()
    }
}

/// Identifies a function declaration within a [`SourceModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub u32);

/// Identifies a parameter or `let`-bound local within one function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(pub u32);

/// Where a function is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclContext {
    /// Declared by the builtin module; has no body and is lowered inline.
    Builtin,
    /// Top-level declaration with no captured state.
    Module,
    /// Nested inside another function and may capture its locals.
    Local { parent: DeclId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub id: LocalId,
    pub name: String,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncDecl {
    pub id: DeclId,
    pub name: String,
    /// Always a function type.
    pub ty: TypeId,
    pub context: DeclContext,
    /// One parameter per field of a tuple input, or a single parameter otherwise.
    pub params: Vec<Param>,
    pub body: Option<Block>,
    pub span: Span,
}

impl FuncDecl {
    pub fn is_builtin(&self) -> bool {
        self.context == DeclContext::Builtin
    }

    pub fn is_local(&self) -> bool {
        matches!(self.context, DeclContext::Local { .. })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Expr(Expr),
    Let {
        local: LocalId,
        name: String,
        init: Expr,
    },
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Option<Block>,
    },
    /// Aborts execution; control never continues past it.
    Trap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    Tuple(Vec<Expr>),
    /// Field initializers in declaration order.
    Record(Vec<Expr>),
    TupleElement {
        base: Box<Expr>,
        index: usize,
    },
    Local(LocalId),
    Func(DeclId),
    Apply {
        callee: Box<Expr>,
        arg: Box<Expr>,
    },
}

impl Expr {
    pub fn new(kind: ExprKind, ty: TypeId) -> Self {
        Self {
            kind,
            ty,
            span: Span::dummy(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The declaration directly named by the callee of an application, if any.
    pub fn called_decl(&self) -> Option<DeclId> {
        match &self.kind {
            ExprKind::Apply { callee, .. } => match callee.kind {
                ExprKind::Func(id) => Some(id),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A type-checked compilation unit.
#[derive(Debug, Clone)]
pub struct SourceModule {
    pub name: String,
    pub types: TypeTable,
    pub decls: Vec<FuncDecl>,
}

impl SourceModule {
    pub fn decl(&self, id: DeclId) -> &FuncDecl {
        &self.decls[id.0 as usize]
    }

    pub fn find_decl(&self, name: &str) -> Option<&FuncDecl> {
        self.decls.iter().find(|d| d.name == name)
    }
}
