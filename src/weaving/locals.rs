//! Locals declared through `IL.DeclareLocals`.
//!
//! Declared locals are appended after the locals the compiler already allocated, so
//! the index a user writes (`IL.Emit.Ldloc(0)`) is relative to the declaration and
//! translated to the absolute slot here. Bodies without a declaration keep raw index
//! semantics.

use std::collections::HashMap;

use crate::{
    assembly::{InstrId, LocalVariable, MethodBody},
    metadata::TypeSig,
    Result,
};

/// A local as described by a `LocalVar` builder chain.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocalDecl {
    pub name: Option<String>,
    pub local_type: TypeSig,
    pub pinned: bool,
}

#[derive(Debug)]
struct Slot {
    name: Option<String>,
    used: bool,
}

/// The declared locals of one method.
#[derive(Debug, Default)]
pub(crate) struct LocalTable {
    base: u16,
    declared: Option<Vec<Slot>>,
    names: HashMap<String, u16>,
    declared_at: Option<InstrId>,
}

impl LocalTable {
    pub(crate) fn new() -> Self {
        LocalTable::default()
    }

    /// Appends `decls` to the body's locals.
    pub(crate) fn declare(
        &mut self,
        body: &mut MethodBody,
        decls: Vec<LocalDecl>,
        init_locals: bool,
        at: InstrId,
    ) -> Result<()> {
        if self.declared.is_some() {
            return Err(weaving_error!(
                Structural,
                Some(at),
                "Local variables have already been declared"
            ));
        }

        let base = u16::try_from(body.locals.len())
            .map_err(|_| internal_error!("Too many locals: {}", body.locals.len()))?;
        let mut slots = Vec::with_capacity(decls.len());
        let mut names = HashMap::new();
        let mut locals = Vec::with_capacity(decls.len());
        for (offset, decl) in decls.into_iter().enumerate() {
            let index = u16::try_from(offset)
                .ok()
                .and_then(|offset| base.checked_add(offset))
                .ok_or_else(|| weaving_error!(Structural, Some(at), "Too many local variables"))?;

            if let Some(name) = &decl.name {
                if names.insert(name.clone(), index).is_some() {
                    return Err(weaving_error!(
                        Structural,
                        Some(at),
                        "Local {} is already defined",
                        name
                    ));
                }
            }

            let local_type = if decl.pinned {
                TypeSig::Pinned(Box::new(decl.local_type))
            } else {
                decl.local_type
            };
            locals.push(LocalVariable {
                name: decl.name.clone(),
                local_type,
            });
            slots.push(Slot {
                name: decl.name,
                used: false,
            });
        }

        body.locals.extend(locals);
        body.init_locals = init_locals;
        self.base = base;
        self.declared = Some(slots);
        self.names = names;
        self.declared_at = Some(at);
        Ok(())
    }

    /// True once `IL.DeclareLocals` has run.
    pub(crate) fn is_declared(&self) -> bool {
        self.declared.is_some()
    }

    /// Absolute slot of a named local.
    pub(crate) fn by_name(&mut self, name: &str) -> Result<u16> {
        let index = *self
            .names
            .get(name)
            .ok_or_else(|| weaving_error!(NotFound, None, "Local {} is not defined", name))?;
        self.mark_used(index);
        Ok(index)
    }

    /// Absolute slot for a user-supplied index.
    pub(crate) fn by_index(&mut self, index: i64) -> Result<u16> {
        let Some(slots) = &self.declared else {
            return u16::try_from(index).map_err(|_| {
                weaving_error!(PatternMismatch, None, "Local index {} is out of range", index)
            });
        };

        let relative = usize::try_from(index)
            .ok()
            .filter(|i| *i < slots.len())
            .ok_or_else(|| weaving_error!(Structural, None, "Local index {} is out of range", index))?;
        let absolute = u16::try_from(relative)
            .ok()
            .and_then(|relative| self.base.checked_add(relative))
            .ok_or_else(|| internal_error!("Local index {} overflows the local table", index))?;
        self.mark_used(absolute);
        Ok(absolute)
    }

    /// Warnings for declared locals that no instruction referenced.
    pub(crate) fn unused(&self) -> Vec<(String, Option<InstrId>)> {
        let Some(slots) = &self.declared else {
            return Vec::new();
        };

        slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.used)
            .map(|(i, slot)| {
                let message = match &slot.name {
                    Some(name) => format!("Unused local {name}"),
                    None => format!("Unused local at index {i}"),
                };
                (message, self.declared_at)
            })
            .collect()
    }

    fn mark_used(&mut self, absolute: u16) {
        if let Some(slots) = &mut self.declared {
            if let Some(slot) = absolute
                .checked_sub(self.base)
                .and_then(|relative| slots.get_mut(usize::from(relative)))
            {
                slot.used = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test, ErrorKind};

    fn decl(name: Option<&str>, local_type: TypeSig) -> LocalDecl {
        LocalDecl {
            name: name.map(ToString::to_string),
            local_type,
            pinned: false,
        }
    }

    #[test]
    fn declared_after_compiler_locals() {
        let mut body = MethodBody::new();
        body.locals.push(LocalVariable::new(test::int32()));
        let at = InstrId::new(0);

        let mut table = LocalTable::new();
        table
            .declare(
                &mut body,
                vec![decl(Some("foo"), test::int32()), decl(None, test::string())],
                false,
                at,
            )
            .unwrap();

        assert_eq!(body.locals.len(), 3);
        assert!(!body.init_locals);
        assert_eq!(table.by_name("foo").unwrap(), 1);
        assert_eq!(table.by_index(1).unwrap(), 2);
        assert!(table.unused().is_empty());

        let error = table.by_name("bar").unwrap_err();
        assert_eq!(error.to_string(), "Local bar is not defined");
        assert!(table.by_index(2).unwrap_err().to_string().contains("out of range"));
    }

    #[test]
    fn duplicates_and_redeclaration() {
        let mut body = MethodBody::new();
        let at = InstrId::new(0);
        let mut table = LocalTable::new();

        let error = table
            .declare(
                &mut body,
                vec![decl(Some("x"), test::int32()), decl(Some("x"), test::int32())],
                true,
                at,
            )
            .unwrap_err();
        assert_eq!(error.to_string(), "Local x is already defined");
        assert!(body.locals.is_empty());

        table.declare(&mut body, vec![], true, at).unwrap();
        let error = table.declare(&mut body, vec![], true, at).unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::Structural));
    }

    #[test]
    fn pinned_and_unused() {
        let mut body = MethodBody::new();
        let mut table = LocalTable::new();
        let mut pinned = decl(Some("p"), test::int32().by_ref());
        pinned.pinned = true;
        table
            .declare(&mut body, vec![pinned], true, InstrId::new(4))
            .unwrap();

        assert!(body.locals[0].is_pinned());
        assert_eq!(
            table.unused(),
            vec![("Unused local p".to_string(), Some(InstrId::new(4)))]
        );
    }

    #[test]
    fn raw_indices_without_declaration() {
        let mut table = LocalTable::new();
        assert!(!table.is_declared());
        assert_eq!(table.by_index(7).unwrap(), 7);
        assert!(table.by_index(-1).is_err());
        assert!(table.unused().is_empty());
    }
}
