//! The mutable Program context and its three big jobs: loading files
//! into packages, driving declaration/lowering order, and compiling
//! function variants on demand.
//!
//! A single `Program` value is threaded through every operation of a
//! compilation. Function compilation re-roots the active scope and
//! package while it descends into a callee, and restores them on the
//! way out; that save/restore is the ordering discipline the whole
//! resolver depends on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::Context as AnyhowContext;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::builder::Builder;
use inkwell::targets::TargetMachine;
use inkwell::types::{AnyTypeEnum, BasicMetadataTypeEnum, BasicType, BasicTypeEnum, StructType};
use inkwell::values::{BasicValueEnum, FunctionValue, GlobalValue, PointerValue};

use geode_ast::{
    ClassDecl, DependencyDecl, Expr, FnDecl, GlobalDecl, Item, namespace_from_items,
};

use crate::codegen::Cursor;
use crate::diagnostics::{Diagnostic, DiagnosticResult, emit_diagnostic};
use crate::package::{
    self, Package, is_valid_namespace, reduce_to_dir, resolve_dep_path,
};
use crate::scope::{Binding, ScopeArena, ScopeId, ValueBinding};
use crate::types::{self, Ty, mangle_function};

/// Data layout emitted ahead of the module text.
pub const TARGET_DATALAYOUT: &str = "e-m:o-i64:64-f80:128-n8:16:32:64-S128";

/// A function known to the program, keyed in the registry by its
/// qualified name. The declaration is shared; compiled variants live in
/// the program's variant cache under their mangled names.
#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub decl: Rc<FnDecl>,
    pub package: String,
    pub file: PathBuf,
    /// Set for class methods: the class registry key providing `this`.
    pub receiver: Option<String>,
}

/// A class known to the program.
#[derive(Debug, Clone)]
pub struct ClassNode {
    pub decl: Rc<ClassDecl>,
    pub package: String,
    pub file: PathBuf,
}

/// A global whose initializer could not be evaluated at declaration
/// time; the driver stores it at the top of `main`.
#[derive(Debug, Clone)]
pub struct PendingInit<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub ty: Ty<'ctx>,
    pub expr: Expr,
    pub package: String,
    pub file: PathBuf,
}

/// The compilation context. Created once per compilation, mutated
/// throughout, serialized to textual IR at the end.
pub struct Program<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,

    pub scopes: ScopeArena<'ctx>,
    /// The active scope, re-rooted during function compilation.
    pub scope: ScopeId,
    /// The active package, used to qualify unqualified names.
    pub package: Option<String>,

    pub packages: BTreeMap<String, Package>,
    pub parsed_files: HashSet<PathBuf>,
    pub sources: HashMap<PathBuf, String>,

    pub functions: HashMap<String, FunctionNode>,
    pub classes: HashMap<String, ClassNode>,
    pub class_types: HashMap<String, StructType<'ctx>>,
    /// Resolved field types per class, in declaration order.
    pub class_field_tys: HashMap<String, Vec<Ty<'ctx>>>,
    /// Compiled function variants keyed by mangled name.
    pub variants: HashMap<String, FunctionValue<'ctx>>,

    pub c_linkages: Vec<PathBuf>,
    pub initializations: Vec<PendingInit<'ctx>>,
    pub string_defs: HashMap<String, PointerValue<'ctx>>,
    pub type_info_defs: HashMap<String, GlobalValue<'ctx>>,

    pub entry: PathBuf,
    pub target_triple: String,
    pub stdlib_root: PathBuf,
    pub debug: bool,

    pub cursor: Cursor<'ctx>,
    pub current_file: Option<PathBuf>,

    pub(crate) precedences: Vec<(AnyTypeEnum<'ctx>, i32)>,
    name_counter: usize,
}

impl<'ctx> Program<'ctx> {
    pub fn new(context: &'ctx Context, entry: &Path) -> Self {
        let stem = entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "geode".to_string());
        let module = context.create_module(&stem);
        let builder = context.create_builder();
        let triple = TargetMachine::get_default_triple();
        Program {
            context,
            module,
            builder,
            scopes: ScopeArena::new(context),
            scope: ScopeId(0),
            package: None,
            packages: BTreeMap::new(),
            parsed_files: HashSet::new(),
            sources: HashMap::new(),
            functions: HashMap::new(),
            classes: HashMap::new(),
            class_types: HashMap::new(),
            class_field_tys: HashMap::new(),
            variants: HashMap::new(),
            c_linkages: Vec::new(),
            initializations: Vec::new(),
            string_defs: HashMap::new(),
            type_info_defs: HashMap::new(),
            entry: entry.to_path_buf(),
            target_triple: triple.as_str().to_string_lossy().into_owned(),
            stdlib_root: package::stdlib_root(),
            debug: false,
            cursor: Cursor::default(),
            current_file: None,
            precedences: types::precedence_table(context),
            name_counter: 0,
        }
    }

    /// Registry key convention: `"<pkg>:<name>"`, except `main` and the
    /// `runtime` package, which stay unqualified.
    pub fn registry_key(pkg: &str, name: &str) -> String {
        if name == "main" || pkg == "runtime" {
            name.to_string()
        } else {
            format!("{}:{}", pkg, name)
        }
    }

    /// Monotonic counter used to label control-flow blocks.
    pub(crate) fn next_index(&mut self) -> usize {
        self.name_counter += 1;
        self.name_counter
    }

    // ---- scopes -------------------------------------------------------

    /// Steps into a fresh child scope. With `--debug`, each push also
    /// attaches a `scope_<index>` named-metadata entry to the module.
    pub fn scope_down(&mut self) {
        let child = self.scopes.spawn_child(self.scope);
        self.scope = child;
        if self.debug {
            let name = format!("scope_{}", self.scopes.get(child).index);
            let node = self.context.metadata_node(&[]);
            let _ = self.module.add_global_metadata(&name, &node);
        }
    }

    /// Steps back to the parent scope. Failing at the root is a
    /// compiler bug, not a user error.
    pub fn scope_up(&mut self) -> DiagnosticResult<()> {
        match self.scopes.get(self.scope).parent {
            Some(parent) => {
                self.scope = parent;
                Ok(())
            }
            None => Err(Diagnostic::simple("scope step up failed at the root scope")),
        }
    }

    // ---- diagnostics --------------------------------------------------

    /// A diagnostic anchored at a byte offset of the current file.
    pub fn diag(&self, span_start: usize, msg: impl Into<String>) -> Diagnostic {
        Diagnostic::located(
            msg,
            self.current_file
                .as_ref()
                .map(|p| p.display().to_string()),
            span_start,
        )
    }

    /// Emits a diagnostic with its file's source and converts it into an
    /// `anyhow::Error` for the driver.
    pub fn report(&self, d: Diagnostic) -> anyhow::Error {
        let source = d
            .file
            .as_ref()
            .and_then(|f| self.sources.get(Path::new(f)))
            .map(|s| s.as_str());
        emit_diagnostic(&d, source);
        anyhow::anyhow!("{}", d.message)
    }

    /// Printable name of a type: the source-level name when the scope
    /// knows one, the LLVM rendering otherwise.
    pub fn type_name(&self, ty: &Ty<'ctx>) -> String {
        self.scopes
            .find_type_name(self.scope, ty)
            .unwrap_or_else(|| types::print_type(ty.raw))
    }

    // ---- name resolution ----------------------------------------------

    /// Ordered candidate keys for resolving `base` from the current
    /// scope: the literal input; for `ns:nm`, the current package
    /// qualified over `nm`; and the current package qualified over the
    /// full input.
    pub fn search_names(&self, base: &str) -> Vec<String> {
        let current = self.scopes.get(self.scope).package_name.clone();
        let mut names = vec![base.to_string()];
        if !current.is_empty() {
            if let Some((_ns, nm)) = base.split_once(':') {
                names.push(format!("{}:{}", current, nm));
            }
            names.push(format!("{}:{}", current, base));
        }
        names.dedup();
        names
    }

    /// Resolves a source-level type reference to a concrete type.
    pub fn find_type(&self, tr: &geode_ast::TypeRef) -> DiagnosticResult<Ty<'ctx>> {
        let candidates = self.search_names(&tr.name);
        let Some(mut ty) = self.scopes.find_type(self.scope, &candidates) else {
            return Err(self.diag(
                tr.span.start,
                format!(
                    "unable to find type \"{}\" in the scope. search paths: [{}]",
                    tr.name,
                    candidates.join(", ")
                ),
            ));
        };
        for _ in 0..tr.ptr_depth {
            let Some(basic) = ty.basic() else {
                return Err(self.diag(tr.span.start, "cannot form a pointer to void"));
            };
            ty = Ty::pointer(self.context, basic);
        }
        Ok(ty)
    }

    // ---- loading ------------------------------------------------------

    /// Parses every not-yet-seen `.g` file in a directory. A file path
    /// reduces to its parent directory first.
    pub fn parse_path(&mut self, path: &Path) -> anyhow::Result<()> {
        let dir = if path.is_file() {
            path.parent().unwrap_or(Path::new(".")).to_path_buf()
        } else {
            path.to_path_buf()
        };

        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("unable to read source directory {}", dir.display()))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "g").unwrap_or(false))
            .collect();
        files.sort();

        for file in files {
            let abs = absolutize(&file);
            if self.parsed_files.contains(&abs) {
                continue;
            }
            self.parse_file(&abs)?;
        }
        Ok(())
    }

    /// Reads and parses a single source file.
    pub fn parse_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let code = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read source file {}", path.display()))?;
        self.parse_text(&code, path)
    }

    /// Parses source text into its package and recurses into its
    /// dependencies. The parsed-file set keyed by absolute path makes
    /// dependency recursion terminate.
    pub fn parse_text(&mut self, code: &str, path: &Path) -> anyhow::Result<()> {
        let abs = absolutize(path);
        if !self.parsed_files.insert(abs.clone()) {
            return Ok(());
        }

        let items = geode_parser::parse(code, Some(&abs.display().to_string()))?;

        let ns = namespace_from_items(&items).ok_or_else(|| {
            anyhow::anyhow!("file {} has no namespace declaration", path.display())
        })?;
        let pkg_name = ns.name.clone();
        if !is_valid_namespace(&pkg_name) {
            anyhow::bail!(
                "invalid namespace name \"{}\" in {}. namespaces can only contain lowercase letters and underscores",
                pkg_name,
                path.display()
            );
        }

        self.sources.insert(abs.clone(), code.to_string());

        let deps: Vec<DependencyDecl> = items
            .iter()
            .filter_map(|item| match item {
                Item::Dependency(d) => Some(d.clone()),
                _ => None,
            })
            .collect();

        let pkg = self
            .packages
            .entry(pkg_name.clone())
            .or_insert_with(|| Package::new(pkg_name.clone()));
        pkg.files.push(abs.clone());
        for item in items {
            pkg.nodes.push((abs.clone(), item));
        }

        let base = abs
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        for dep in deps {
            for spec in &dep.paths {
                let resolved = resolve_dep_path(&base, spec, &self.stdlib_root);
                if dep.c_linkage {
                    self.c_linkages.push(resolved);
                } else {
                    self.packages
                        .get_mut(&pkg_name)
                        .expect("package just inserted")
                        .dependency_paths
                        .push(reduce_to_dir(&resolved));
                    self.parse_path(&resolved)?;
                }
            }
        }
        Ok(())
    }

    // ---- driver -------------------------------------------------------

    /// Sets the active package context the way lowering expects it:
    /// the root scope qualifies unqualified names with the package.
    fn setup_context(&mut self, pkg: &str, file: &Path) {
        self.package = Some(pkg.to_string());
        let root = self.scopes.root();
        self.scopes.get_mut(root).package_name = pkg.to_string();
        self.current_file = Some(file.to_path_buf());
    }

    /// Drives the whole pipeline after parsing: register nodes, declare
    /// classes, verify and lower classes, declare globals, then lower
    /// `main`, which pulls everything else in transitively.
    pub fn congeal(&mut self) -> anyhow::Result<()> {
        let stem = self
            .entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "geode".to_string());
        self.module = self.context.create_module(&stem);
        self.cursor = Cursor::default();
        self.functions.clear();
        self.classes.clear();
        self.class_types.clear();
        self.class_field_tys.clear();
        self.variants.clear();
        self.string_defs.clear();
        self.type_info_defs.clear();
        self.initializations.clear();

        // Registration pass. Packages iterate in name order so emission
        // is deterministic.
        let pkg_names: Vec<String> = self.packages.keys().cloned().collect();
        for pkg_name in &pkg_names {
            let nodes = self.packages[pkg_name].nodes.clone();
            for (file, item) in nodes {
                match item {
                    Item::Func(f) => {
                        let key = Self::registry_key(pkg_name, &f.ident.name);
                        let root = self.scopes.root();
                        self.scopes
                            .define(root, key.clone(), Binding::Function(key.clone()));
                        self.functions.insert(
                            key,
                            FunctionNode {
                                decl: Rc::new(f),
                                package: pkg_name.clone(),
                                file,
                                receiver: None,
                            },
                        );
                    }
                    Item::Class(c) => {
                        let class_key = Self::registry_key(pkg_name, &c.ident.name);
                        for method in &c.methods {
                            let mkey = format!("{}.{}", class_key, method.ident.name);
                            self.functions.insert(
                                mkey,
                                FunctionNode {
                                    decl: Rc::new(method.clone()),
                                    package: pkg_name.clone(),
                                    file: file.clone(),
                                    receiver: Some(class_key.clone()),
                                },
                            );
                        }
                        self.classes.insert(
                            class_key,
                            ClassNode {
                                decl: Rc::new(c),
                                package: pkg_name.clone(),
                                file,
                            },
                        );
                    }
                    _ => {}
                }
            }
        }

        // Declare every class first so recursive and mutual field
        // references resolve during lowering.
        let mut class_keys: Vec<String> = self.classes.keys().cloned().collect();
        class_keys.sort();
        for key in &class_keys {
            self.declare_class(key);
        }

        // Verification failures are reported but do not stop the run, so
        // later errors surface in the same invocation.
        for key in &class_keys {
            if let Err(d) = self.verify_class(key) {
                let _ = self.report(d);
            }
            self.codegen_class_layout(key).map_err(|d| self.report(d))?;
        }
        // Method bodies compile only after every layout exists, since a
        // method may touch fields of any other class.
        for key in &class_keys {
            self.codegen_class_methods(key).map_err(|d| self.report(d))?;
        }

        // Globals after classes so class-typed globals resolve.
        for pkg_name in &pkg_names {
            let nodes = self.packages[pkg_name].nodes.clone();
            for (file, item) in nodes {
                if let Item::Global(g) = item {
                    self.declare_global(pkg_name, &file, &g)
                        .map_err(|d| self.report(d))?;
                }
            }
        }

        match self.get_function("main", Some(&[])) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => anyhow::bail!("no `main` function found in the program"),
            Err(d) => Err(self.report(d)),
        }
    }

    fn declare_class(&mut self, key: &str) {
        let node = self.classes[key].clone();
        self.setup_context(&node.package, &node.file);
        let struct_name = format!("class.{}.{}", node.package, node.decl.ident.name);
        let st = self.context.opaque_struct_type(&struct_name);
        self.class_types.insert(key.to_string(), st);
        let root = self.scopes.root();
        self.scopes.define(
            root,
            key.to_string(),
            Binding::Type(Ty::pointer(self.context, st.as_basic_type_enum())),
        );
    }

    /// Class correctness checks: duplicate fields and unresolvable
    /// field types.
    fn verify_class(&mut self, key: &str) -> DiagnosticResult<()> {
        let node = self.classes[key].clone();
        self.setup_context(&node.package, &node.file);
        let mut seen: HashSet<&str> = HashSet::new();
        for field in &node.decl.fields {
            if !seen.insert(field.ident.name.as_str()) {
                return Err(self.diag(
                    field.ident.span.start,
                    format!(
                        "class {} declares duplicate field \"{}\"",
                        node.decl.ident.name, field.ident.name
                    ),
                ));
            }
            self.find_type(&field.ty)?;
        }
        Ok(())
    }

    /// Lowers a class's field layout and type-info descriptor.
    fn codegen_class_layout(&mut self, key: &str) -> DiagnosticResult<()> {
        let node = self.classes[key].clone();
        self.setup_context(&node.package, &node.file);
        let st = self.class_types[key];

        let mut field_tys: Vec<Ty<'ctx>> = Vec::new();
        let mut field_types: Vec<BasicTypeEnum<'ctx>> = Vec::new();
        for field in &node.decl.fields {
            let ty = self.find_type(&field.ty)?;
            let Some(basic) = ty.basic() else {
                return Err(self.diag(
                    field.ty.span.start,
                    format!("field \"{}\" cannot have type void", field.ident.name),
                ));
            };
            field_tys.push(ty);
            field_types.push(basic);
        }
        st.set_body(&field_types, false);
        self.class_field_tys.insert(key.to_string(), field_tys);

        self.emit_type_info(key, &node);
        Ok(())
    }

    /// Compiles every method whose parameter types are concrete.
    fn codegen_class_methods(&mut self, key: &str) -> DiagnosticResult<()> {
        let node = self.classes[key].clone();
        self.setup_context(&node.package, &node.file);
        for method in &node.decl.methods {
            if method.params.iter().any(|p| p.ty.is_unknown()) {
                // Unknown-typed methods instantiate per call site.
                continue;
            }
            let mkey = format!("{}.{}", key, method.ident.name);
            self.get_function(&mkey, None)?;
        }
        Ok(())
    }

    /// Emits the constant `{ i8* name, i64 field_count }` descriptor for
    /// a class, once per class.
    fn emit_type_info(&mut self, key: &str, node: &ClassNode) {
        if self.type_info_defs.contains_key(key) {
            return;
        }
        let label = format!("{}.{}", node.package, node.decl.ident.name);
        let name_ptr = self.intern_string(&label);
        let count = self
            .context
            .i64_type()
            .const_int(node.decl.fields.len() as u64, false);
        let init = self
            .context
            .const_struct(&[name_ptr.into(), count.into()], false);
        let global = self
            .module
            .add_global(init.get_type(), None, &format!("typeinfo.{}", label));
        global.set_initializer(&init);
        global.set_constant(true);
        global.set_linkage(Linkage::Private);
        self.type_info_defs.insert(key.to_string(), global);
    }

    fn declare_global(
        &mut self,
        pkg: &str,
        file: &Path,
        g: &GlobalDecl,
    ) -> DiagnosticResult<()> {
        self.setup_context(pkg, file);
        let ty = self.find_type(&g.ty)?;
        let Some(basic) = ty.basic() else {
            return Err(self.diag(g.ty.span.start, "global variables cannot have type void"));
        };

        let llvm_name = format!("{}.{}", pkg, g.ident.name);
        let global = self.module.add_global(basic, None, &llvm_name);

        match &g.init {
            Some(Expr::Int(l)) if basic.is_int_type() => {
                global.set_initializer(&basic.into_int_type().const_int(l.value as u64, true));
            }
            Some(Expr::Int(l)) if basic.is_float_type() => {
                global.set_initializer(&basic.into_float_type().const_float(l.value as f64));
            }
            Some(Expr::Float(l)) if basic.is_float_type() => {
                global.set_initializer(&basic.into_float_type().const_float(l.value));
            }
            Some(Expr::Char(c)) if basic.is_int_type() => {
                global.set_initializer(&basic.into_int_type().const_int(c.value as u64, false));
            }
            Some(Expr::Bool(b)) if basic.is_int_type() => {
                global
                    .set_initializer(&basic.into_int_type().const_int(b.value as u64, false));
            }
            Some(other) => {
                global.set_initializer(&const_zero(basic));
                self.initializations.push(PendingInit {
                    ptr: global.as_pointer_value(),
                    ty,
                    expr: other.clone(),
                    package: pkg.to_string(),
                    file: file.to_path_buf(),
                });
            }
            None => {
                global.set_initializer(&const_zero(basic));
            }
        }

        let root = self.scopes.root();
        self.scopes.define(
            root,
            Self::registry_key(pkg, &g.ident.name),
            Binding::Value(ValueBinding {
                ptr: global.as_pointer_value(),
                ty,
            }),
        );
        Ok(())
    }

    // ---- function compilation -----------------------------------------

    /// On-demand variant compilation. Absence of the name from the
    /// registry is not an error here: the caller walks the resolver's
    /// candidate list and treats `None` as "try the next one".
    ///
    /// The active package, scope and cursor are saved on entry and
    /// restored on exit; body lowering re-enters this function for
    /// callees, so the context must behave as a stack.
    pub fn get_function(
        &mut self,
        name: &str,
        arg_types: Option<&[Ty<'ctx>]>,
    ) -> DiagnosticResult<Option<FunctionValue<'ctx>>> {
        let Some(node) = self.functions.get(name).cloned() else {
            return Ok(None);
        };

        let saved_package = self.package.clone();
        let saved_scope = self.scope;
        let saved_cursor = self.cursor.clone();
        let saved_file = self.current_file.clone();

        let result = self.compile_function(name, &node, arg_types);

        self.package = saved_package;
        self.scope = saved_scope;
        self.current_file = saved_file;
        self.cursor = saved_cursor;
        if let Some(block) = self.cursor.current_opt() {
            self.builder.position_at_end(block);
        }

        result.map(Some)
    }

    fn compile_function(
        &mut self,
        key: &str,
        node: &FunctionNode,
        arg_types: Option<&[Ty<'ctx>]>,
    ) -> DiagnosticResult<FunctionValue<'ctx>> {
        let decl = node.decl.clone();
        let fname = &decl.ident.name;

        // Re-root into the function's own package before resolving
        // anything it declares.
        self.scope = self.scopes.root();
        self.setup_context(&node.package, &node.file);
        self.scope_down();

        let receiver_count = usize::from(node.receiver.is_some());
        let declared_arity = decl.params.len() + receiver_count;

        if let Some(args) = arg_types {
            if args.len() != declared_arity {
                if decl.variadic {
                    if args.len() < declared_arity {
                        return Err(self.diag(
                            decl.span.start,
                            format!(
                                "variadic function {} expects a minimum of {} arguments. given: {}",
                                fname,
                                declared_arity - receiver_count,
                                args.len() - receiver_count
                            ),
                        ));
                    }
                } else {
                    return Err(self.diag(
                        decl.span.start,
                        format!(
                            "incorrect number of arguments passed to function \"{}\". expected {}, given {}",
                            fname,
                            declared_arity - receiver_count,
                            args.len() - receiver_count
                        ),
                    ));
                }
            }
        }

        // Effective parameter list: `this` first for methods, then the
        // declared parameters with unknowns bound to the caller's types.
        let mut params: Vec<(Option<String>, Ty<'ctx>)> = Vec::new();
        if let Some(class_key) = &node.receiver {
            let st = self.class_types[class_key];
            params.push((
                Some("this".to_string()),
                Ty::pointer(self.context, st.as_basic_type_enum()),
            ));
        }
        for (i, param) in decl.params.iter().enumerate() {
            let supplied = arg_types.and_then(|a| a.get(i + receiver_count)).copied();
            let ty = if param.ty.is_unknown() {
                match supplied {
                    Some(given) => {
                        self.scopes.define(
                            self.scope,
                            param.ty.name.clone(),
                            Binding::Type(given),
                        );
                        given
                    }
                    None => {
                        return Err(self.diag(
                            param.ty.span.start,
                            format!(
                                "cannot infer unknown parameter type {} of {} without a call site",
                                param.ty.name, fname
                            ),
                        ));
                    }
                }
            } else {
                let expected = self.find_type(&param.ty)?;
                if let (Some(given), false) = (supplied, decl.variadic) {
                    let loosely = match (expected.basic(), given.basic()) {
                        (Some(e), Some(g)) => types::loosely_equal(g, e),
                        _ => false,
                    };
                    if expected.raw != given.raw && !loosely {
                        let given_name = self.type_name(&given);
                        let expected_name = self.type_name(&expected);
                        return Err(self.diag(
                            param.ty.span.start,
                            format!(
                                "incorrect type passed into function {}. given: \"{}\", expected: \"{}\"",
                                fname, given_name, expected_name
                            ),
                        ));
                    }
                }
                expected
            };
            params.push((param.ident.as_ref().map(|id| id.name.clone()), ty));
        }

        // Return type resolves after the parameters so a bound
        // type-variable return (`func id(T x) T`) sees its binding.
        let ret_ty = self.find_type(&decl.ret)?;

        let param_basics: Vec<BasicTypeEnum<'ctx>> = params
            .iter()
            .filter_map(|(_, ty)| ty.basic())
            .collect();

        // External declarations link against their source symbol, so
        // they are never mangled either.
        let mangled = if decl.no_mangle || decl.external || !key.contains(':') {
            fname.clone()
        } else {
            mangle_function(key, &param_basics)
        };

        if let Some(compiled) = self.variants.get(&mangled) {
            return Ok(*compiled);
        }

        let param_meta: Vec<BasicMetadataTypeEnum<'ctx>> =
            param_basics.iter().map(|t| (*t).into()).collect();
        let fn_type = match ret_ty.basic() {
            Some(basic) => basic.fn_type(&param_meta, decl.variadic),
            None => self.context.void_type().fn_type(&param_meta, decl.variadic),
        };

        let function = match self.module.get_function(&mangled) {
            Some(existing) => existing,
            None => self.module.add_function(&mangled, fn_type, None),
        };
        // Insert before lowering the body so recursive calls hit the
        // cache instead of re-entering.
        self.variants.insert(mangled, function);

        if !decl.external {
            if let Some(body) = &decl.body {
                self.lower_function_body(function, &decl, key, &params, ret_ty, body)?;
            }
        }

        Ok(function)
    }

    fn lower_function_body(
        &mut self,
        function: FunctionValue<'ctx>,
        decl: &FnDecl,
        key: &str,
        params: &[(Option<String>, Ty<'ctx>)],
        ret_ty: Ty<'ctx>,
        body: &geode_ast::BlockStmt,
    ) -> DiagnosticResult<()> {
        let entry = self.context.append_basic_block(function, "entry");
        self.cursor = Cursor::new(function, decl.ident.name.clone(), ret_ty);
        self.cursor.enter(entry);
        self.builder.position_at_end(entry);

        let mut param_index = 0u32;
        for (name_opt, ty) in params {
            let index = param_index;
            param_index += 1;
            let Some(pname) = name_opt else { continue };
            let Some(basic) = ty.basic() else { continue };
            let slot = self.builder.build_alloca(basic, pname)?;
            let value = function
                .get_nth_param(index)
                .ok_or_else(|| Diagnostic::simple("parameter count mismatch in declaration"))?;
            self.builder.build_store(slot, value)?;
            self.scopes.define(
                self.scope,
                pname.clone(),
                Binding::Value(ValueBinding { ptr: slot, ty: *ty }),
            );
        }

        if key == "main" {
            self.flush_global_initializations()?;
        }

        self.lower_block(body)?;

        let last = self.cursor.current();
        if last.get_terminator().is_none() {
            if ret_ty.is_void() {
                self.builder.position_at_end(last);
                self.builder.build_return(None)?;
            } else {
                return Err(self.diag(
                    decl.span.start,
                    format!("missing return in function {}", decl.ident.name),
                ));
            }
        }
        Ok(())
    }

    /// Stores every pending global initializer, in declaration order,
    /// into the entry of `main`.
    fn flush_global_initializations(&mut self) -> DiagnosticResult<()> {
        let pending = std::mem::take(&mut self.initializations);
        for init in pending {
            let saved_package = self.package.clone();
            let saved_file = self.current_file.clone();
            let scope = self.scope;
            let saved_scope_pkg = self.scopes.get(scope).package_name.clone();

            // Qualify lookups with the global's own package while its
            // initializer lowers.
            self.package = Some(init.package.clone());
            self.scopes.get_mut(scope).package_name = init.package.clone();
            self.current_file = Some(init.file.clone());

            let result = (|| -> DiagnosticResult<()> {
                let value = self.lower_expr(&init.expr)?;
                let cast = self
                    .cast(value, init.ty)?
                    .ok_or_else(|| Diagnostic::simple("global initializer has no value"))?;
                self.builder.build_store(init.ptr, cast.v)?;
                Ok(())
            })();

            self.package = saved_package;
            self.current_file = saved_file;
            self.scopes.get_mut(scope).package_name = saved_scope_pkg;
            result?;
        }
        Ok(())
    }

    // ---- output -------------------------------------------------------

    /// Renders the finished module, prefixed with the target directives.
    pub fn to_ir(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("target datalayout = \"{}\"\n", TARGET_DATALAYOUT));
        out.push_str(&format!("target triple = \"{}\"\n\n", self.target_triple));
        out.push_str(&self.module.print_to_string().to_string());
        out
    }

    /// Writes the textual IR under the build directory, named after the
    /// entry path's basename. Returns the written path.
    pub fn emit(&self, build_dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(build_dir).with_context(|| {
            format!("unable to create build directory {}", build_dir.display())
        })?;
        let stem = self
            .entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "geode".to_string());
        let out = build_dir.join(format!("{}.ll", stem));
        std::fs::write(&out, self.to_ir())
            .with_context(|| format!("unable to write {}", out.display()))?;
        Ok(out)
    }
}

/// Canonical form used as the parsed-file dedup key. Paths that do not
/// exist (in-memory tests) pass through unchanged.
fn absolutize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn const_zero<'ctx>(ty: BasicTypeEnum<'ctx>) -> BasicValueEnum<'ctx> {
    match ty {
        BasicTypeEnum::IntType(t) => t.const_zero().into(),
        BasicTypeEnum::FloatType(t) => t.const_zero().into(),
        BasicTypeEnum::PointerType(t) => t.const_null().into(),
        BasicTypeEnum::StructType(t) => t.const_zero().into(),
        BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
        BasicTypeEnum::VectorType(t) => t.const_zero().into(),
        BasicTypeEnum::ScalableVectorType(t) => t.const_zero().into(),
    }
}
