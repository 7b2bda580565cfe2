//! Parser for the Geode language
//!
//! A hand-written recursive-descent parser over the token stream
//! produced by [`tokenizer`]. The entry point is [`parse`], which
//! returns the flat list of top-level items the compiler buckets into
//! packages.

pub mod tokenizer;

use anyhow::{Result, bail};
use geode_ast::*;
use tokenizer::{Token, TokenKind, tokenize_significant};

/// Parse Geode source text into a list of top-level items.
///
/// `path` is only used to label error messages; the parser never touches
/// the filesystem.
pub fn parse(source: &str, path: Option<&str>) -> Result<Vec<Item>> {
    let tokens = tokenize_significant(source);
    let mut parser = Parser {
        source,
        path,
        tokens,
        pos: 0,
    };
    parser.parse_items()
}

struct Parser<'s> {
    source: &'s str,
    path: Option<&'s str>,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, ahead: usize) -> &TokenKind {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn next(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek().kind == *kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.next();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.at(&kind) {
            Ok(self.next())
        } else {
            Err(self.error_here(&format!("expected {}", what)))
        }
    }

    fn error_here(&self, msg: &str) -> anyhow::Error {
        let tok = self.peek();
        let (line, col) = line_col(self.source, tok.span.start);
        let file = self.path.unwrap_or("<input>");
        let found = if tok.text.is_empty() {
            "end of file".to_string()
        } else {
            format!("`{}`", tok.text)
        };
        anyhow::anyhow!("{}:{}:{}: {}, found {}", file, line, col, msg, found)
    }

    fn parse_items(&mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        while !self.at(&TokenKind::Eof) {
            items.push(self.parse_item()?);
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Item> {
        match self.peek().kind.clone() {
            TokenKind::Is => {
                let start = self.next().span;
                let name = self.parse_ident("namespace name")?;
                Ok(Item::Namespace(NamespaceDecl {
                    span: start.start..name.span.end,
                    name: name.name,
                }))
            }
            TokenKind::Include | TokenKind::Link => {
                let c_linkage = matches!(self.peek().kind, TokenKind::Link);
                let start = self.next().span;
                let mut paths = Vec::new();
                let mut end = start.end;
                // One or more string paths may follow a single keyword.
                while let TokenKind::Str(s) = self.peek().kind.clone() {
                    let tok = self.next();
                    end = tok.span.end;
                    paths.push(s);
                }
                if paths.is_empty() {
                    return Err(self.error_here("expected dependency path string"));
                }
                Ok(Item::Dependency(DependencyDecl {
                    paths,
                    c_linkage,
                    span: start.start..end,
                }))
            }
            TokenKind::Func | TokenKind::Nomangle | TokenKind::Extern => {
                Ok(Item::Func(self.parse_func()?))
            }
            TokenKind::Class => Ok(Item::Class(self.parse_class()?)),
            TokenKind::Ident(_) => {
                let decl = self.parse_var_like()?;
                self.expect(TokenKind::Semicolon, "`;` after global declaration")?;
                Ok(Item::Global(GlobalDecl {
                    span: decl.span.clone(),
                    ty: decl.ty,
                    ident: decl.ident,
                    init: decl.init,
                }))
            }
            _ => Err(self.error_here("expected a top-level declaration")),
        }
    }

    fn parse_ident(&mut self, what: &str) -> Result<Ident> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                let tok = self.next();
                Ok(Ident {
                    name,
                    span: tok.span,
                })
            }
            _ => Err(self.error_here(&format!("expected {}", what))),
        }
    }

    fn parse_type(&mut self) -> Result<TypeRef> {
        let ident = self.parse_ident("type name")?;
        let mut ptr_depth = 0u8;
        let mut end = ident.span.end;
        while self.at(&TokenKind::Star) {
            let tok = self.next();
            end = tok.span.end;
            ptr_depth += 1;
        }
        Ok(TypeRef {
            name: ident.name,
            ptr_depth,
            span: ident.span.start..end,
        })
    }

    fn parse_func(&mut self) -> Result<FnDecl> {
        let start = self.peek().span.start;
        let mut no_mangle = false;
        let mut external = false;
        loop {
            if self.eat(&TokenKind::Nomangle) {
                no_mangle = true;
            } else if self.eat(&TokenKind::Extern) {
                external = true;
            } else {
                break;
            }
        }
        self.expect(TokenKind::Func, "`func`")?;
        let ident = self.parse_ident("function name")?;
        self.expect(TokenKind::LeftParen, "`(`")?;

        let mut params = Vec::new();
        let mut variadic = false;
        while !self.at(&TokenKind::RightParen) {
            if self.eat(&TokenKind::DotDotDot) {
                variadic = true;
                break;
            }
            let ty = self.parse_type()?;
            let ident = if let TokenKind::Ident(_) = self.peek().kind {
                Some(self.parse_ident("parameter name")?)
            } else {
                None
            };
            params.push(Param { ty, ident });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "`)`")?;

        let ret = self.parse_type()?;

        let (body, end) = if self.at(&TokenKind::Semicolon) {
            let tok = self.next();
            (None, tok.span.end)
        } else {
            let block = self.parse_block()?;
            let end = block.span.end;
            (Some(block), end)
        };

        if body.is_none() && !external {
            bail!(
                "{}: function `{}` has no body and is not marked extern",
                self.path.unwrap_or("<input>"),
                ident.name
            );
        }

        Ok(FnDecl {
            ident,
            params,
            variadic,
            ret,
            body,
            external,
            no_mangle,
            span: start..end,
        })
    }

    fn parse_class(&mut self) -> Result<ClassDecl> {
        let start = self.expect(TokenKind::Class, "`class`")?.span.start;
        let ident = self.parse_ident("class name")?;
        self.expect(TokenKind::LeftBrace, "`{`")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.at(&TokenKind::RightBrace) && !self.at(&TokenKind::Eof) {
            if self.at(&TokenKind::Func) {
                methods.push(self.parse_func()?);
            } else {
                let ty = self.parse_type()?;
                let fident = self.parse_ident("field name")?;
                let semi = self.expect(TokenKind::Semicolon, "`;` after field")?;
                fields.push(FieldDecl {
                    span: ty.span.start..semi.span.end,
                    ty,
                    ident: fident,
                });
            }
        }
        let end = self.expect(TokenKind::RightBrace, "`}`")?.span.end;

        Ok(ClassDecl {
            ident,
            fields,
            methods,
            span: start..end,
        })
    }

    fn parse_block(&mut self) -> Result<BlockStmt> {
        let start = self.expect(TokenKind::LeftBrace, "`{`")?.span.start;
        let mut stmts = Vec::new();
        while !self.at(&TokenKind::RightBrace) && !self.at(&TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        let end = self.expect(TokenKind::RightBrace, "`}`")?.span.end;
        Ok(BlockStmt {
            stmts,
            span: start..end,
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        match self.peek().kind.clone() {
            TokenKind::LeftBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Return => {
                let start = self.next().span.start;
                let value = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let end = self
                    .expect(TokenKind::Semicolon, "`;` after return")?
                    .span
                    .end;
                Ok(Stmt::Return(ReturnStmt {
                    value,
                    span: start..end,
                }))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                let start = self.next().span.start;
                let test = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::While(WhileStmt {
                    span: start..body.span.end,
                    test,
                    body,
                }))
            }
            TokenKind::For => {
                let start = self.next().span.start;
                let init = self.parse_simple_stmt()?;
                self.expect(TokenKind::Semicolon, "`;` after loop initializer")?;
                let test = self.parse_expr()?;
                self.expect(TokenKind::Semicolon, "`;` after loop condition")?;
                let step = self.parse_simple_stmt()?;
                let body = self.parse_block()?;
                Ok(Stmt::For(Box::new(ForStmt {
                    span: start..body.span.end,
                    init,
                    test,
                    step,
                    body,
                })))
            }
            _ => {
                let stmt = self.parse_simple_stmt()?;
                let end = self
                    .expect(TokenKind::Semicolon, "`;` after statement")?
                    .span
                    .end;
                // Widen the span to cover the semicolon.
                Ok(match stmt {
                    Stmt::VarDecl(mut v) => {
                        v.span.end = end;
                        Stmt::VarDecl(v)
                    }
                    Stmt::Expr(mut e) => {
                        e.span.end = end;
                        Stmt::Expr(e)
                    }
                    other => other,
                })
            }
        }
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        let start = self.expect(TokenKind::If, "`if`")?.span.start;
        let test = self.parse_expr()?;
        let cons = self.parse_block()?;
        let mut end = cons.span.end;
        let alt = if self.eat(&TokenKind::Else) {
            if self.at(&TokenKind::If) {
                // `else if` becomes an else block holding one if statement.
                let nested = self.parse_if()?;
                let span = nested.span();
                end = span.end;
                Some(BlockStmt {
                    stmts: vec![nested],
                    span,
                })
            } else {
                let block = self.parse_block()?;
                end = block.span.end;
                Some(block)
            }
        } else {
            None
        };
        Ok(Stmt::If(IfStmt {
            test,
            cons,
            alt,
            span: start..end,
        }))
    }

    /// Parses a statement without its trailing semicolon: a variable
    /// declaration or an expression statement. Used directly by `for`
    /// headers and by `parse_stmt`.
    fn parse_simple_stmt(&mut self) -> Result<Stmt> {
        if self.starts_var_decl() {
            let decl = self.parse_var_like()?;
            return Ok(Stmt::VarDecl(decl));
        }
        let expr = self.parse_expr()?;
        Ok(Stmt::Expr(ExprStmt {
            span: expr.span(),
            expr,
        }))
    }

    /// Lookahead: `ident '*'* ident` introduces a declaration, anything
    /// else is an expression (`a * b` stays a multiplication).
    fn starts_var_decl(&self) -> bool {
        if !matches!(self.peek_kind(0), TokenKind::Ident(_)) {
            return false;
        }
        let mut ahead = 1;
        while matches!(self.peek_kind(ahead), TokenKind::Star) {
            ahead += 1;
        }
        matches!(self.peek_kind(ahead), TokenKind::Ident(_))
    }

    fn parse_var_like(&mut self) -> Result<VarDeclStmt> {
        let ty = self.parse_type()?;
        let ident = self.parse_ident("variable name")?;
        let mut end = ident.span.end;
        let init = if self.eat(&TokenKind::Eq) {
            let expr = self.parse_expr()?;
            end = expr.span().end;
            Some(expr)
        } else {
            None
        };
        Ok(VarDeclStmt {
            span: ty.span.start..end,
            ty,
            ident,
            init,
        })
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr> {
        let lhs = self.parse_or()?;
        if self.at(&TokenKind::Eq) {
            self.next();
            let target = match lhs {
                Expr::Ident(name) => AssignTarget::Ident(name),
                Expr::Member(m) => AssignTarget::Member(*m),
                other => {
                    let (line, col) = line_col(self.source, other.span().start);
                    bail!(
                        "{}:{}:{}: invalid assignment target",
                        self.path.unwrap_or("<input>"),
                        line,
                        col
                    );
                }
            };
            let value = self.parse_assign()?;
            let span = match &target {
                AssignTarget::Ident(n) => n.span.start..value.span().end,
                AssignTarget::Member(m) => m.span.start..value.span().end,
            };
            return Ok(Expr::Assign(Box::new(AssignExpr {
                target,
                value,
                span,
            })));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&TokenKind::OrOr) {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        while self.eat(&TokenKind::AndAnd) {
            let rhs = self.parse_cmp()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::Le,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::Ge,
                _ => break,
            };
            self.next();
            let rhs = self.parse_add()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.next();
            let rhs = self.parse_mul()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.next();
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek().kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Amp => Some(UnaryOp::Ref),
            TokenKind::Star => Some(UnaryOp::Deref),
            _ => None,
        };
        if let Some(op) = op {
            let start = self.next().span.start;
            let operand = self.parse_unary()?;
            let span = start..operand.span().end;
            return Ok(Expr::Unary(Box::new(UnaryExpr { op, operand, span })));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.at(&TokenKind::Dot) {
                self.next();
                let prop = self.parse_ident("field or method name")?;
                let span = expr.span().start..prop.span.end;
                expr = Expr::Member(Box::new(MemberExpr {
                    obj: expr,
                    prop,
                    span,
                }));
            } else if self.at(&TokenKind::LeftParen) {
                let callee = match expr {
                    Expr::Ident(name) => Callee::Name(name),
                    Expr::Member(m) => Callee::Method(*m),
                    other => {
                        let (line, col) = line_col(self.source, other.span().start);
                        bail!(
                            "{}:{}:{}: expression is not callable",
                            self.path.unwrap_or("<input>"),
                            line,
                            col
                        );
                    }
                };
                let (args, end) = self.parse_args()?;
                let span = match &callee {
                    Callee::Name(n) => n.span.start..end,
                    Callee::Method(m) => m.span.start..end,
                };
                expr = Expr::Call(Box::new(CallExpr { callee, args, span }));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<(Vec<Expr>, usize)> {
        self.expect(TokenKind::LeftParen, "`(`")?;
        let mut args = Vec::new();
        while !self.at(&TokenKind::RightParen) {
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(TokenKind::RightParen, "`)`")?.span.end;
        Ok((args, end))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.peek().kind.clone() {
            TokenKind::Int(value) => {
                let tok = self.next();
                Ok(Expr::Int(IntLit {
                    value,
                    span: tok.span,
                }))
            }
            TokenKind::Float(value) => {
                let tok = self.next();
                Ok(Expr::Float(FloatLit {
                    value,
                    span: tok.span,
                }))
            }
            TokenKind::Str(value) => {
                let tok = self.next();
                Ok(Expr::Str(StrLit {
                    value,
                    span: tok.span,
                }))
            }
            TokenKind::Char(value) => {
                let tok = self.next();
                Ok(Expr::Char(CharLit {
                    value,
                    span: tok.span,
                }))
            }
            TokenKind::True | TokenKind::False => {
                let tok = self.next();
                Ok(Expr::Bool(BoolLit {
                    value: tok.kind == TokenKind::True,
                    span: tok.span,
                }))
            }
            TokenKind::New => {
                let start = self.next().span.start;
                let class = self.parse_name()?;
                let (args, end) = self.parse_args()?;
                Ok(Expr::New(Box::new(NewExpr {
                    class,
                    args,
                    span: start..end,
                })))
            }
            TokenKind::Ident(_) => Ok(Expr::Ident(self.parse_name()?)),
            TokenKind::LeftParen => {
                self.next();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RightParen, "`)`")?;
                Ok(expr)
            }
            _ => Err(self.error_here("expected an expression")),
        }
    }

    /// Parses a possibly qualified `ns:name` reference. The qualifier is
    /// only consumed when an identifier immediately follows the colon.
    fn parse_name(&mut self) -> Result<Name> {
        let first = self.parse_ident("name")?;
        if self.at(&TokenKind::Colon) && matches!(self.peek_kind(1), TokenKind::Ident(_)) {
            self.next();
            let second = self.parse_ident("name")?;
            return Ok(Name {
                text: format!("{}:{}", first.name, second.name),
                span: first.span.start..second.span.end,
            });
        }
        Ok(Name {
            text: first.name,
            span: first.span,
        })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let span = lhs.span().start..rhs.span().end;
    Expr::Binary(Box::new(BinaryExpr { op, lhs, rhs, span }))
}

/// Convert a byte offset into 1-based line and column numbers.
pub fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (idx, ch) in source.char_indices() {
        if idx >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}
