use std::collections::HashMap;
use std::rc::Rc;

use super::function::{FuncRef, Function, Linkage, Signature};

/// A compilation unit of IR functions, addressed by [`FuncRef`].
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
    by_name: HashMap<String, FuncRef>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Declare `name`, or return the existing declaration of it.
    pub fn declare_function(&mut self, name: &str, sig: Rc<Signature>, linkage: Linkage) -> FuncRef {
        if let Some(&existing) = self.by_name.get(name) {
            assert_eq!(
                self.functions[existing.index()].sig, sig,
                "`{name}` redeclared with a different signature"
            );
            return existing;
        }
        let fref = FuncRef(self.functions.len() as u32);
        self.functions.push(Function::new(name, sig, linkage));
        self.by_name.insert(name.to_string(), fref);
        fref
    }

    /// Replace the declaration behind `fref` with its definition.
    pub fn define(&mut self, fref: FuncRef, func: Function) {
        let slot = &mut self.functions[fref.index()];
        assert_eq!(slot.name, func.name, "definition does not match declaration");
        assert!(slot.is_declaration(), "`{}` defined twice", func.name);
        *slot = func;
    }

    pub fn function(&self, fref: FuncRef) -> &Function {
        &self.functions[fref.index()]
    }

    pub fn func_ref(&self, name: &str) -> Option<FuncRef> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.func_ref(name).map(|f| self.function(f))
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncRef, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncRef(i as u32), f))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
