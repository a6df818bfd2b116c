//! Module-wide symbol resolution.
//!
//! [`SymbolSpace`] knows every module the rewriter may reference: the module being
//! woven, its core library and any dependency registered up front or discovered on
//! the search paths. It resolves `(assembly, full name)` pairs to bound type names,
//! following type forwarders, and caches every successful lookup.
//!
//! A `SymbolSpace` is shared by all methods of a pass and is safe to use from
//! several threads at once.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;

use crate::{
    metadata::{Module, ModuleCache, ModuleReader, TypeDef, TypeName, TypeSig},
    ErrorKind, Result,
};

const MAX_FORWARDING_DEPTH: usize = 16;

/// Names of core library value types that have no [`TypeDef`] registered.
const CORE_VALUE_TYPES: &[&str] = &[
    "Void", "Boolean", "Char", "SByte", "Byte", "Int16", "UInt16", "Int32", "UInt32", "Int64",
    "UInt64", "Single", "Double", "IntPtr", "UIntPtr", "TypedReference", "RuntimeTypeHandle",
    "RuntimeMethodHandle", "RuntimeFieldHandle", "Decimal",
];

#[derive(Clone)]
struct ResolvedType {
    name: Arc<TypeName>,
    definition: Arc<TypeDef>,
}

/// Resolves type names across the modules of a pass.
pub struct SymbolSpace {
    current: String,
    core_library: String,
    modules: DashMap<String, Arc<Module>>,
    types: DashMap<(String, String), ResolvedType>,
    search_paths: Vec<PathBuf>,
    loader: Option<ModuleCache>,
}

impl SymbolSpace {
    /// Creates a symbol space for weaving `current`, with `core_library` as the name of
    /// the assembly defining `System.Object`.
    pub fn new(current: Arc<Module>, core_library: impl Into<String>) -> Self {
        let space = SymbolSpace {
            current: current.assembly.clone(),
            core_library: core_library.into(),
            modules: DashMap::new(),
            types: DashMap::new(),
            search_paths: Vec::new(),
            loader: None,
        };
        space.add_module(current);
        space
    }

    /// Registers a dependency module.
    #[must_use]
    pub fn with_module(self, module: Module) -> Self {
        self.add_module(Arc::new(module));
        self
    }

    /// Enables on-demand loading of dependencies from `search_paths`.
    #[must_use]
    pub fn with_loader(mut self, reader: Arc<dyn ModuleReader>, search_paths: Vec<PathBuf>) -> Self {
        self.loader = Some(ModuleCache::new(reader));
        self.search_paths = search_paths;
        self
    }

    /// Registers a module under its assembly name.
    pub fn add_module(&self, module: Arc<Module>) {
        self.modules.insert(module.assembly.to_ascii_lowercase(), module);
    }

    /// Name of the assembly being woven.
    #[must_use]
    pub fn current_assembly(&self) -> &str {
        &self.current
    }

    /// Name of the core library assembly.
    #[must_use]
    pub fn core_library(&self) -> &str {
        &self.core_library
    }

    /// The module being woven.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Internal`] if the current module was never registered.
    pub fn current_module(&self) -> Result<Arc<Module>> {
        self.modules
            .get(&self.current.to_ascii_lowercase())
            .map(|m| m.clone())
            .ok_or_else(|| internal_error!("Current module {} is not registered", self.current))
    }

    /// Resolves and caches a module given a file path, and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ModuleLoad`] if the file cannot be read, or
    /// [`crate::Error::Config`] if no [`ModuleReader`] was configured.
    pub fn load_module(&self, path: &Path) -> Result<Arc<Module>> {
        let Some(loader) = &self.loader else {
            return Err(crate::Error::Config(
                "no module reader configured for loading modules by path".to_string(),
            ));
        };

        let module = loader.load(path)?;
        self.add_module(module.clone());
        Ok(module)
    }

    /// Finds a module by assembly name, loading it from the search paths if needed.
    ///
    /// Display names such as `System.Runtime, Version=8.0.0.0` are accepted.
    ///
    /// # Errors
    ///
    /// Returns a not-found weaving error if no module matches, or a load error if a
    /// candidate file exists but cannot be read.
    pub fn module(&self, assembly: &str) -> Result<Arc<Module>> {
        let simple = assembly.split(',').next().unwrap_or(assembly).trim();
        if let Some(module) = self.modules.get(&simple.to_ascii_lowercase()) {
            return Ok(module.clone());
        }

        if self.loader.is_some() {
            for dir in &self.search_paths {
                for extension in ["dll", "exe"] {
                    let candidate = dir.join(format!("{simple}.{extension}"));
                    if candidate.is_file() {
                        return self.load_module(&candidate);
                    }
                }
            }
        }

        Err(weaving_error!(
            NotFound,
            None,
            "Could not resolve assembly: {}",
            simple
        ))
    }

    /// Resolves a type by assembly and full name, following forwarders.
    ///
    /// Nested types accept both `Outer/Inner` and `Outer+Inner`.
    ///
    /// # Errors
    ///
    /// Returns a not-found weaving error if the type does not exist.
    pub fn find_type(&self, assembly: &str, full_name: &str) -> Result<TypeSig> {
        Ok(TypeSig::Named(self.lookup(assembly, full_name)?.name))
    }

    /// Resolves the definition behind a bound type name.
    ///
    /// # Errors
    ///
    /// Returns a not-found weaving error if the type does not exist.
    pub fn resolve(&self, name: &TypeName) -> Result<Arc<TypeDef>> {
        Ok(self.lookup(&name.scope, &name.full_name())?.definition)
    }

    /// A type from the core library, bound without requiring a definition.
    #[must_use]
    pub fn core_type(&self, namespace: &str, name: &str) -> TypeSig {
        if let Ok(resolved) = self.lookup(&self.core_library, &format!("{namespace}.{name}")) {
            return TypeSig::Named(resolved.name);
        }

        let mut type_name = TypeName::new(&self.core_library, namespace, name);
        type_name.is_value_type = namespace == "System" && CORE_VALUE_TYPES.contains(&name);
        TypeSig::named(type_name)
    }

    fn lookup(&self, assembly: &str, full_name: &str) -> Result<ResolvedType> {
        let normalized = full_name.replace('+', "/");
        let key = (assembly.to_ascii_lowercase(), normalized.clone());
        if let Some(hit) = self.types.get(&key) {
            return Ok(hit.clone());
        }

        let mut scope = assembly.to_string();
        for _ in 0..MAX_FORWARDING_DEPTH {
            let module = self.module(&scope).map_err(|error| match error.kind() {
                Some(ErrorKind::NotFound) => weaving_error!(
                    NotFound,
                    None,
                    "Type {} not found: assembly {} could not be resolved",
                    normalized,
                    scope
                ),
                _ => error,
            })?;

            if let Some((name, definition)) = module.find_type(&normalized) {
                let resolved = ResolvedType {
                    name: Arc::new(name),
                    definition,
                };
                self.types.insert(key, resolved.clone());
                return Ok(resolved);
            }

            match module.forwarded_to(&normalized) {
                Some(target) => scope = target.to_string(),
                None => {
                    return Err(weaving_error!(
                        NotFound,
                        None,
                        "Type {} not found in assembly {}",
                        normalized,
                        module.assembly
                    ))
                }
            }
        }

        Err(weaving_error!(
            NotFound,
            None,
            "Type {} could not be resolved: type forwarding chain is too long",
            normalized
        ))
    }
}
