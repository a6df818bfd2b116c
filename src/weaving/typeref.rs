//! Type reference construction.
//!
//! Each function takes already-resolved type signatures and produces a new one,
//! validating the composition rules of the type system: no pointers, arrays or
//! references to by-ref types, array ranks in range, and generic instantiations with
//! the right number of arguments.

use crate::{
    metadata::{GenericParamOwner, SymbolSpace, TypeSig},
    Result,
};

const MAX_ARRAY_RANK: i64 = 32;

/// Resolves a type by assembly and full name.
pub(crate) fn from_name(symbols: &SymbolSpace, assembly: &str, type_name: &str) -> Result<TypeSig> {
    if type_name.is_empty() {
        return Err(weaving_error!(PatternMismatch, None, "Type name cannot be empty"));
    }
    symbols.find_type(assembly, type_name)
}

/// `T*`
pub(crate) fn pointer(element: TypeSig) -> Result<TypeSig> {
    if element.is_by_ref() {
        return Err(weaving_error!(
            Structural,
            None,
            "Cannot point to a by-ref type: {}",
            element
        ));
    }
    Ok(element.pointer())
}

/// `T&`
pub(crate) fn by_ref(element: TypeSig) -> Result<TypeSig> {
    if element.is_by_ref() {
        return Err(weaving_error!(
            Structural,
            None,
            "Cannot make a by-ref of a by-ref type: {}",
            element
        ));
    }
    Ok(element.by_ref())
}

/// `T[]` for rank 1, `T[,...]` otherwise.
pub(crate) fn array(element: TypeSig, rank: i64) -> Result<TypeSig> {
    if element.is_by_ref() {
        return Err(weaving_error!(
            Structural,
            None,
            "Cannot array a by-ref type: {}",
            element
        ));
    }
    if !(1..=MAX_ARRAY_RANK).contains(&rank) {
        return Err(weaving_error!(
            Structural,
            None,
            "Invalid array rank {}, must be between 1 and {}",
            rank,
            MAX_ARRAY_RANK
        ));
    }

    let rank = u32::try_from(rank).map_err(|_| internal_error!("Array rank {} out of range", rank))?;
    Ok(element.array(rank))
}

/// Instantiates a generic type definition.
pub(crate) fn generic_instance(
    symbols: &SymbolSpace,
    definition: TypeSig,
    arguments: Vec<TypeSig>,
) -> Result<TypeSig> {
    let name = match &definition {
        TypeSig::Named(name) => name.clone(),
        TypeSig::GenericInstance { .. } => {
            return Err(weaving_error!(
                Structural,
                None,
                "Type {} is already a generic instance",
                definition
            ))
        }
        _ => {
            return Err(weaving_error!(
                Structural,
                None,
                "Type {} is not a generic type definition",
                definition
            ))
        }
    };

    let type_def = symbols.resolve(&name)?;
    let expected = type_def.generic_parameters.len();
    if expected == 0 {
        return Err(weaving_error!(
            Structural,
            None,
            "Type {} is not a generic type definition",
            definition
        ));
    }
    if arguments.len() != expected {
        return Err(weaving_error!(
            Structural,
            None,
            "Incorrect number of generic arguments for type {}: expected {}, got {}",
            definition,
            expected,
            arguments.len()
        ));
    }
    check_generic_arguments(&arguments)?;

    Ok(TypeSig::GenericInstance {
        definition: name,
        arguments,
    })
}

/// Attaches a `modopt` or `modreq` modifier.
pub(crate) fn modified(element: TypeSig, modifier: TypeSig, required: bool) -> TypeSig {
    TypeSig::Modified {
        required,
        modifier: Box::new(modifier),
        element: Box::new(element),
    }
}

/// `!N` or `!!N`.
pub(crate) fn generic_parameter(owner: GenericParamOwner, index: i64) -> Result<TypeSig> {
    let index = u32::try_from(index).map_err(|_| {
        weaving_error!(
            PatternMismatch,
            None,
            "Invalid generic parameter index: {}",
            index
        )
    })?;
    Ok(TypeSig::GenericParam { owner, index })
}

pub(crate) fn check_generic_arguments(arguments: &[TypeSig]) -> Result<()> {
    match arguments.iter().find(|a| a.is_by_ref()) {
        Some(argument) => Err(weaving_error!(
            Structural,
            None,
            "A generic argument cannot be a by-ref type: {}",
            argument
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test, ErrorKind};

    #[test]
    fn by_ref_compositions_rejected() {
        let by_ref = by_ref(test::int32()).unwrap();
        assert_eq!(by_ref.to_string(), "System.Int32&");

        let error = pointer(by_ref.clone()).unwrap_err();
        assert!(error.to_string().contains("Cannot point to a by-ref type"));
        assert!(array(by_ref.clone(), 1)
            .unwrap_err()
            .to_string()
            .contains("Cannot array a by-ref type"));
        assert_eq!(
            super::by_ref(by_ref).unwrap_err().kind(),
            Some(ErrorKind::Structural)
        );
    }

    #[test]
    fn array_ranks() {
        assert_eq!(array(test::int32(), 2).unwrap().to_string(), "System.Int32[,]");
        assert!(array(test::int32(), 0).is_err());
        assert!(array(test::int32(), 33).is_err());
    }

    #[test]
    fn generic_instances() {
        let symbols = test::symbols();
        let list = symbols.find_type("TestLib", "TestLib.Box`1").unwrap();
        let instance = generic_instance(&symbols, list.clone(), vec![test::int32()]).unwrap();
        assert_eq!(instance.to_string(), "TestLib.Box`1<System.Int32>");

        let error = generic_instance(&symbols, list.clone(), vec![]).unwrap_err();
        assert!(error.to_string().contains("expected 1, got 0"));
        assert!(generic_instance(&symbols, instance, vec![test::int32()]).is_err());
        assert!(generic_instance(&symbols, list, vec![test::int32().by_ref()]).is_err());

        let plain = symbols.find_type("TestLib", "TestLib.Calculator").unwrap();
        assert!(generic_instance(&symbols, plain, vec![test::int32()])
            .unwrap_err()
            .to_string()
            .contains("not a generic type definition"));
    }

    #[test]
    fn generic_parameters() {
        let param = generic_parameter(GenericParamOwner::Method, 1).unwrap();
        assert_eq!(param.to_string(), "!!1");
        assert!(generic_parameter(GenericParamOwner::Type, -1).is_err());
    }
}
