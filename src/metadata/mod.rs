//! Symbols the rewriter reads and produces.
//!
//! - [`signatures`] - Bound type, method, field and call-site references used as operands
//! - [`module`] - The symbol model of a parsed module (types, members, forwarders)
//! - [`resolver`] - [`SymbolSpace`], name resolution across modules with caching
//! - [`loader`] - [`ModuleCache`], memory-mapped loading of modules by path

pub mod loader;
pub mod module;
pub mod resolver;
pub mod signatures;

pub use loader::{ModuleCache, ModuleReader};
pub use module::{
    EventDef, FieldDef, MethodDef, MethodModifiers, Module, ParamDef, PropertyDef, TypeDef,
};
pub use resolver::SymbolSpace;
pub use signatures::{
    CallSiteSig, CallingConvention, FieldRef, GenericParamOwner, MethodRef, TypeName, TypeSig,
};
