//! Field reference construction.

use crate::{
    metadata::{FieldRef, SymbolSpace, TypeSig},
    Result,
};

/// Finds a field by name; exactly one field must match.
pub(crate) fn find(symbols: &SymbolSpace, declaring_type: &TypeSig, name: &str) -> Result<FieldRef> {
    let Some(type_name) = declaring_type.type_name() else {
        return Err(weaving_error!(
            PatternMismatch,
            None,
            "Cannot look up fields of type {}",
            declaring_type
        ));
    };

    let type_def = symbols.resolve(type_name)?;
    let mut fields = type_def.fields.iter().filter(|f| f.name == name);
    match (fields.next(), fields.next()) {
        (Some(field), None) => Ok(FieldRef {
            declaring_type: declaring_type.clone(),
            name: field.name.clone(),
            field_type: field.field_type.clone(),
            is_static: field.is_static,
        }),
        (None, _) => Err(weaving_error!(
            NotFound,
            None,
            "Field {} not found in type {}",
            name,
            declaring_type
        )),
        (Some(_), Some(_)) => Err(weaving_error!(
            Ambiguous,
            None,
            "Ambiguous field {} in type {}",
            name,
            declaring_type
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test, ErrorKind};

    #[test]
    fn lookup() {
        let symbols = test::symbols();
        let calculator = symbols.find_type("TestLib", "TestLib.Calculator").unwrap();

        let field = find(&symbols, &calculator, "Total").unwrap();
        assert_eq!(field.to_string(), "System.Int32 TestLib.Calculator::Total");
        assert!(!field.is_static);

        let error = find(&symbols, &calculator, "Nope").unwrap_err();
        assert_eq!(error.kind(), Some(ErrorKind::NotFound));
        assert!(find(&symbols, &test::int32().pointer(), "Total").is_err());
    }
}
