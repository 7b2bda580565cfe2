//! The lexical scope tree.
//!
//! Scopes form a tree rooted at the program's primitive scope. Because
//! scopes back-reference their parents while the program also needs to
//! mutate them freely, the tree lives in an arena owned by the Program
//! and nodes are addressed by [`ScopeId`] handles.

use std::collections::HashMap;

use inkwell::context::Context;
use inkwell::values::PointerValue;

use crate::types::{self, Ty};

/// Handle to a scope inside the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(pub usize);

/// A named slot holding a value: the alloca (or global) pointer plus
/// the type stored in the slot.
#[derive(Debug, Clone, Copy)]
pub struct ValueBinding<'ctx> {
    pub ptr: PointerValue<'ctx>,
    pub ty: Ty<'ctx>,
}

/// What a name resolves to inside a scope.
#[derive(Debug, Clone)]
pub enum Binding<'ctx> {
    Type(Ty<'ctx>),
    Value(ValueBinding<'ctx>),
    /// Key into the program's function registry.
    Function(String),
}

/// One node of the scope tree.
#[derive(Debug)]
pub struct Scope<'ctx> {
    pub parent: Option<ScopeId>,
    /// Monotonic index within the tree, used for debug-info naming.
    pub index: usize,
    /// Package used to qualify unqualified lookups from this scope.
    pub package_name: String,
    symbols: HashMap<String, Binding<'ctx>>,
}

/// Arena holding every scope created during a compilation.
#[derive(Debug)]
pub struct ScopeArena<'ctx> {
    scopes: Vec<Scope<'ctx>>,
}

impl<'ctx> ScopeArena<'ctx> {
    /// Creates the arena with a root scope pre-populated with the
    /// primitive type bindings.
    pub fn new(context: &'ctx Context) -> Self {
        let mut root = Scope {
            parent: None,
            index: 0,
            package_name: String::new(),
            symbols: HashMap::new(),
        };
        for (name, ty) in types::primitives(context) {
            root.symbols.insert(name.to_string(), Binding::Type(ty));
        }
        ScopeArena { scopes: vec![root] }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Acquires a child of `parent`, inheriting its package context.
    pub fn spawn_child(&mut self, parent: ScopeId) -> ScopeId {
        let index = self.scopes.len();
        let package_name = self.scopes[parent.0].package_name.clone();
        self.scopes.push(Scope {
            parent: Some(parent),
            index,
            package_name,
            symbols: HashMap::new(),
        });
        ScopeId(index)
    }

    pub fn get(&self, id: ScopeId) -> &Scope<'ctx> {
        &self.scopes[id.0]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope<'ctx> {
        &mut self.scopes[id.0]
    }

    /// Defines a binding in the given scope, shadowing any outer one.
    pub fn define(&mut self, id: ScopeId, name: impl Into<String>, binding: Binding<'ctx>) {
        self.scopes[id.0].symbols.insert(name.into(), binding);
    }

    fn lookup(&self, from: ScopeId, name: &str) -> Option<&Binding<'ctx>> {
        let mut cur = Some(from);
        while let Some(id) = cur {
            let scope = &self.scopes[id.0];
            if let Some(binding) = scope.symbols.get(name) {
                return Some(binding);
            }
            cur = scope.parent;
        }
        None
    }

    /// Tries each candidate name in order against the scope chain and
    /// returns the first type binding found.
    pub fn find_type(&self, from: ScopeId, candidates: &[String]) -> Option<Ty<'ctx>> {
        for name in candidates {
            if let Some(Binding::Type(ty)) = self.lookup(from, name) {
                return Some(*ty);
            }
        }
        None
    }

    /// Tries each candidate name in order and returns the first value
    /// binding found.
    pub fn find_value(&self, from: ScopeId, candidates: &[String]) -> Option<ValueBinding<'ctx>> {
        for name in candidates {
            if let Some(Binding::Value(vb)) = self.lookup(from, name) {
                return Some(*vb);
            }
        }
        None
    }

    /// Tries each candidate name in order and returns the first
    /// function-registry key found.
    pub fn find_function(&self, from: ScopeId, candidates: &[String]) -> Option<String> {
        for name in candidates {
            if let Some(Binding::Function(key)) = self.lookup(from, name) {
                return Some(key.clone());
            }
        }
        None
    }

    /// Reverse lookup: the source-level name of a type, for error
    /// messages. Walks the chain from `from` to the root.
    pub fn find_type_name(&self, from: ScopeId, ty: &Ty<'ctx>) -> Option<String> {
        let mut cur = Some(from);
        while let Some(id) = cur {
            let scope = &self.scopes[id.0];
            for (name, binding) in scope.symbols.iter() {
                if let Binding::Type(bound) = binding {
                    if bound == ty {
                        return Some(name.clone());
                    }
                }
            }
            cur = scope.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::types::AnyType;

    #[test]
    fn root_scope_contains_primitives() {
        let context = Context::create();
        let arena = ScopeArena::new(&context);
        let int = arena
            .find_type(arena.root(), &["int".to_string()])
            .expect("int bound");
        assert_eq!(
            int.raw,
            context.i32_type().as_any_type_enum()
        );
        assert!(arena
            .find_type(arena.root(), &["string".to_string()])
            .expect("string bound")
            .pointee
            .is_some());
    }

    #[test]
    fn child_scopes_shadow_and_inherit() {
        let context = Context::create();
        let mut arena = ScopeArena::new(&context);
        let root = arena.root();
        arena.get_mut(root).package_name = "m".to_string();
        let child = arena.spawn_child(root);
        assert_eq!(arena.get(child).package_name, "m");
        assert_eq!(arena.get(child).index, 1);

        // Shadow `int` with double in the child; the root is untouched.
        let shadow = Ty::new(context.f64_type().as_any_type_enum());
        arena.define(child, "int", Binding::Type(shadow));
        let seen = arena.find_type(child, &["int".to_string()]).unwrap();
        assert_eq!(seen.raw, context.f64_type().as_any_type_enum());
        let seen_root = arena.find_type(root, &["int".to_string()]).unwrap();
        assert_eq!(seen_root.raw, context.i32_type().as_any_type_enum());
    }

    #[test]
    fn candidate_order_wins_over_scope_depth() {
        let context = Context::create();
        let mut arena = ScopeArena::new(&context);
        let root = arena.root();
        let child = arena.spawn_child(root);
        arena.define(
            root,
            "m:vec",
            Binding::Type(Ty::new(context.i64_type().as_any_type_enum())),
        );
        arena.define(
            child,
            "vec",
            Binding::Type(Ty::new(context.i8_type().as_any_type_enum())),
        );
        // First candidate (the literal) is tried across the whole chain
        // before the qualified fallback.
        let hit = arena
            .find_type(child, &["vec".to_string(), "m:vec".to_string()])
            .unwrap();
        assert_eq!(hit.raw, context.i8_type().as_any_type_enum());
    }

    #[test]
    fn reverse_type_lookup_names_primitives() {
        let context = Context::create();
        let arena = ScopeArena::new(&context);
        let int = arena.find_type(arena.root(), &["int".to_string()]).unwrap();
        let name = arena.find_type_name(arena.root(), &int).unwrap();
        // int and its aliases share the LLVM type; any alias is a valid name.
        assert!(name == "int");
    }
}
