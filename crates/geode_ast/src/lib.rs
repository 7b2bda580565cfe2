//! Geode AST definitions
//!
//! This crate defines the abstract syntax tree (AST) for the Geode
//! language. It serves as the contract between the parser and the
//! compiler core: the parser produces a flat list of [`Item`]s per
//! source file, the compiler buckets them into packages and lowers
//! them.

use std::ops::Range;

/// Represents a source code span as a byte range.
pub type Span = Range<usize>;

/// A top-level node in a Geode source file.
#[derive(Debug, Clone)]
pub enum Item {
    /// `is <name>` — declares the namespace the file belongs to.
    Namespace(NamespaceDecl),
    /// `include "<path>"` / `link "<path>"` — a dependency reference.
    Dependency(DependencyDecl),
    Func(FnDecl),
    Class(ClassDecl),
    Global(GlobalDecl),
}

impl Item {
    /// The span of the item's leading token, used for diagnostics.
    pub fn span(&self) -> Span {
        match self {
            Item::Namespace(n) => n.span.clone(),
            Item::Dependency(d) => d.span.clone(),
            Item::Func(f) => f.span.clone(),
            Item::Class(c) => c.span.clone(),
            Item::Global(g) => g.span.clone(),
        }
    }
}

/// Namespace declaration at the head of a file.
#[derive(Debug, Clone)]
pub struct NamespaceDecl {
    pub name: String,
    pub span: Span,
}

/// Dependency declaration.
///
/// `include "util"` pulls another Geode package into the build;
/// `link "runtime.c"` records a C-linkage native dependency instead of
/// recursing into it.
#[derive(Debug, Clone)]
pub struct DependencyDecl {
    pub paths: Vec<String>,
    pub c_linkage: bool,
    pub span: Span,
}

/// A reference to a type by name, as written in source.
///
/// `ptr_depth` counts trailing `*`s (`int**` has depth 2). A reference
/// whose name is a single uppercase ASCII letter is a type-variable;
/// its concrete type is bound at each call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub name: String,
    pub ptr_depth: u8,
    pub span: Span,
}

impl TypeRef {
    /// Whether this reference is an unknown (type-variable) parameter type.
    pub fn is_unknown(&self) -> bool {
        self.ptr_depth == 0
            && self.name.len() == 1
            && self.name.as_bytes()[0].is_ascii_uppercase()
    }
}

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// A function parameter. The name is optional so declarations such as
/// `func g(int, ...) void` can omit it.
#[derive(Debug, Clone)]
pub struct Param {
    pub ty: TypeRef,
    pub ident: Option<Ident>,
}

/// Function declaration.
#[derive(Debug, Clone)]
pub struct FnDecl {
    pub ident: Ident,
    pub params: Vec<Param>,
    pub variadic: bool,
    pub ret: TypeRef,
    /// `None` for `extern` declarations.
    pub body: Option<BlockStmt>,
    pub external: bool,
    pub no_mangle: bool,
    pub span: Span,
}

/// Class declaration: ordered fields plus methods.
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub ident: Ident,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<FnDecl>,
    pub span: Span,
}

/// A single field inside a class body.
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub ty: TypeRef,
    pub ident: Ident,
    pub span: Span,
}

/// Top-level global variable declaration.
#[derive(Debug, Clone)]
pub struct GlobalDecl {
    pub ty: TypeRef,
    pub ident: Ident,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Statements.
#[derive(Debug, Clone)]
pub enum Stmt {
    Block(BlockStmt),
    VarDecl(VarDeclStmt),
    Return(ReturnStmt),
    If(IfStmt),
    While(WhileStmt),
    For(Box<ForStmt>),
    Expr(ExprStmt),
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Block(b) => b.span.clone(),
            Stmt::VarDecl(v) => v.span.clone(),
            Stmt::Return(r) => r.span.clone(),
            Stmt::If(i) => i.span.clone(),
            Stmt::While(w) => w.span.clone(),
            Stmt::For(f) => f.span.clone(),
            Stmt::Expr(e) => e.span.clone(),
        }
    }
}

/// Braced statement list.
#[derive(Debug, Clone)]
pub struct BlockStmt {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// Local variable declaration: `int x = 5;`.
#[derive(Debug, Clone)]
pub struct VarDeclStmt {
    pub ty: TypeRef,
    pub ident: Ident,
    pub init: Option<Expr>,
    pub span: Span,
}

/// Return statement. `value` is `None` for a bare `return;`.
#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

/// If statement. `alt` covers both `else { .. }` and `else if` chains
/// (the parser wraps a trailing `else if` in a single-statement block).
#[derive(Debug, Clone)]
pub struct IfStmt {
    pub test: Expr,
    pub cons: BlockStmt,
    pub alt: Option<BlockStmt>,
    pub span: Span,
}

/// While loop.
#[derive(Debug, Clone)]
pub struct WhileStmt {
    pub test: Expr,
    pub body: BlockStmt,
    pub span: Span,
}

/// C-style for loop: `for init; cond; step { body }`.
#[derive(Debug, Clone)]
pub struct ForStmt {
    pub init: Stmt,
    pub test: Expr,
    pub step: Stmt,
    pub body: BlockStmt,
    pub span: Span,
}

/// Expression statement.
#[derive(Debug, Clone)]
pub struct ExprStmt {
    pub expr: Expr,
    pub span: Span,
}

/// A possibly package-qualified name, `io:print` or just `print`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    /// The literal text as written, including the `:` if present.
    pub text: String,
    pub span: Span,
}

impl Name {
    /// Split into `(namespace, name)` parts. An unqualified name has an
    /// empty namespace part.
    pub fn parts(&self) -> (&str, &str) {
        match self.text.split_once(':') {
            Some((ns, nm)) => (ns, nm),
            None => ("", self.text.as_str()),
        }
    }
}

/// Expressions.
#[derive(Debug, Clone)]
pub enum Expr {
    Int(IntLit),
    Float(FloatLit),
    Str(StrLit),
    Char(CharLit),
    Bool(BoolLit),
    Ident(Name),
    Unary(Box<UnaryExpr>),
    Binary(Box<BinaryExpr>),
    Assign(Box<AssignExpr>),
    Call(Box<CallExpr>),
    Member(Box<MemberExpr>),
    New(Box<NewExpr>),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Int(l) => l.span.clone(),
            Expr::Float(l) => l.span.clone(),
            Expr::Str(l) => l.span.clone(),
            Expr::Char(l) => l.span.clone(),
            Expr::Bool(l) => l.span.clone(),
            Expr::Ident(n) => n.span.clone(),
            Expr::Unary(u) => u.span.clone(),
            Expr::Binary(b) => b.span.clone(),
            Expr::Assign(a) => a.span.clone(),
            Expr::Call(c) => c.span.clone(),
            Expr::Member(m) => m.span.clone(),
            Expr::New(n) => n.span.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IntLit {
    pub value: i64,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FloatLit {
    pub value: f64,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StrLit {
    pub value: String,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CharLit {
    pub value: u8,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct BoolLit {
    pub value: bool,
    pub span: Span,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
    /// `&`
    Ref,
    /// `*`
    Deref,
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Expr,
    pub span: Span,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub lhs: Expr,
    pub rhs: Expr,
    pub span: Span,
}

/// Assignment target: a plain name or a field of an object.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    Ident(Name),
    Member(MemberExpr),
}

#[derive(Debug, Clone)]
pub struct AssignExpr {
    pub target: AssignTarget,
    pub value: Expr,
    pub span: Span,
}

/// Function or method call. `callee` is a bare/qualified name for a
/// free call, or a member expression for a method call.
#[derive(Debug, Clone)]
pub enum Callee {
    Name(Name),
    Method(MemberExpr),
}

#[derive(Debug, Clone)]
pub struct CallExpr {
    pub callee: Callee,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// Field access `obj.field`.
#[derive(Debug, Clone)]
pub struct MemberExpr {
    pub obj: Expr,
    pub prop: Ident,
    pub span: Span,
}

/// `new ns:Class(args)`.
#[derive(Debug, Clone)]
pub struct NewExpr {
    pub class: Name,
    pub args: Vec<Expr>,
    pub span: Span,
}

/// Returns the namespace declared by a node list, or `None` when the
/// file carries no `is` declaration.
pub fn namespace_from_items(items: &[Item]) -> Option<&NamespaceDecl> {
    items.iter().find_map(|item| match item {
        Item::Namespace(n) => Some(n),
        _ => None,
    })
}
