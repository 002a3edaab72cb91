//! Module-level emission: global function declarations and definitions.

use std::collections::HashMap;
use std::rc::Rc;

use sable_core::ast::{DeclContext, DeclId, SourceModule};
use sable_core::diagnostics::{Diagnostic, Diagnostics};
use sable_core::types::TypeId;
use tracing::{debug, trace};

use crate::error::CodegenError;
use crate::function::FunctionEmitter;
use crate::ir::{self, FuncRef, Function, Linkage, Signature};
use crate::layout::{TypeLayout, TypeLayoutCatalog};
use crate::settings::CodegenSettings;
use crate::target::TargetInfo;

/// Lowers one [`SourceModule`] into an [`ir::Module`].
pub struct ModuleEmitter<'src> {
    source: &'src SourceModule,
    target: TargetInfo,
    settings: CodegenSettings,
    catalog: TypeLayoutCatalog,
    module: ir::Module,
    globals: HashMap<DeclId, FuncRef>,
    diagnostics: Diagnostics,
}

impl<'src> ModuleEmitter<'src> {
    /// Create an emitter for the target named in `settings` (host if unset).
    pub fn new(source: &'src SourceModule, settings: CodegenSettings) -> Result<Self, CodegenError> {
        let target = TargetInfo::from_setting(settings.target.as_deref())?;
        Ok(Self::with_target(source, settings, target))
    }

    pub fn with_target(
        source: &'src SourceModule,
        settings: CodegenSettings,
        target: TargetInfo,
    ) -> Self {
        let catalog = TypeLayoutCatalog::new(target.clone(), settings.max_scalar_explosion);
        Self {
            source,
            target,
            settings,
            catalog,
            module: ir::Module::new(source.name.clone()),
            globals: HashMap::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn source(&self) -> &'src SourceModule {
        self.source
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    pub fn settings(&self) -> &CodegenSettings {
        &self.settings
    }

    pub(crate) fn catalog_mut(&mut self) -> &mut TypeLayoutCatalog {
        &mut self.catalog
    }

    pub fn layout(&mut self, ty: TypeId) -> Rc<TypeLayout> {
        self.catalog.layout(&self.source.types, ty)
    }

    pub fn function_type(&mut self, ty: TypeId, needs_context: bool) -> Rc<Signature> {
        self.catalog
            .function_type(&self.source.types, ty, needs_context)
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic);
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn module(&self) -> &ir::Module {
        &self.module
    }

    /// The IR function for a module-level declaration, declared on first use
    /// with the context-free signature of its type.
    pub fn addr_of_global_function(&mut self, decl: DeclId) -> FuncRef {
        if let Some(&fref) = self.globals.get(&decl) {
            return fref;
        }
        let func = self.source.decl(decl);
        assert_eq!(
            func.context,
            DeclContext::Module,
            "`{}` has no global address",
            func.name
        );
        let sig = self.function_type(func.ty, false);
        let fref = self.module.declare_function(&func.name, sig, Linkage::Export);
        trace!(function = %func.name, "declared global function");
        self.globals.insert(decl, fref);
        fref
    }

    /// Emit the body of a module-level function. Declarations without a body
    /// are left as external declarations.
    #[tracing::instrument(level = "debug", skip(self), fields(module = %self.source.name))]
    pub fn emit_global_function(&mut self, decl: DeclId) {
        let source = self.source;
        let func = source.decl(decl);
        let Some(body) = &func.body else {
            return;
        };
        let fref = self.addr_of_global_function(decl);
        let sig = self.module.function(fref).sig.clone();

        let mut emitter =
            FunctionEmitter::new(self, func, Function::new(&func.name, sig, Linkage::Export));
        emitter.emit_block(body);
        let lowered = emitter.finish();

        debug!(
            function = %func.name,
            blocks = lowered.layout().len(),
            "emitted function"
        );
        trace!("\n{}", ir::print::FunctionPrinter::new(&lowered, Some(&self.module)));
        self.module.define(fref, lowered);
    }

    /// Emit every module-level function of the source module.
    #[tracing::instrument(level = "debug", skip(self), fields(module = %self.source.name))]
    pub fn emit_module(&mut self) {
        let source = self.source;
        for func in &source.decls {
            if func.context == DeclContext::Module {
                self.emit_global_function(func.id);
            }
        }
    }

    /// The finished IR module, or the unimplemented features it relies on.
    pub fn finish(self) -> Result<ir::Module, CodegenError> {
        if self.diagnostics.has_errors() {
            return Err(CodegenError::Unimplemented {
                module: self.source.name.clone(),
                diagnostics: self.diagnostics.into_vec(),
            });
        }
        Ok(self.module)
    }
}

/// Lower every function of `source` for the target described by `settings`.
pub fn lower_module(
    source: &SourceModule,
    settings: CodegenSettings,
) -> Result<ir::Module, CodegenError> {
    let mut emitter = ModuleEmitter::new(source, settings)?;
    emitter.emit_module();
    emitter.finish()
}
