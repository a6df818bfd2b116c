//! Method reference construction and overload resolution.
//!
//! Methods are looked up on the definition behind a type signature and referenced
//! through that signature, so a method found on `List<int>` keeps `List<int>` as its
//! declaring type while its parameters stay expressed in terms of `!0`.
//!
//! Every lookup requires exactly one match: no candidate is reported as "not found",
//! several candidates as "ambiguous". Accessors, constructors and operators are found
//! through their metadata naming conventions (`get_X`, `.ctor`, `op_Addition`, ...).

use std::sync::Arc;

use crate::{
    metadata::{CallingConvention, MethodDef, MethodRef, SymbolSpace, TypeDef, TypeSig},
    weaving::typeref,
    Result,
};

const UNARY_OPERATORS: &[&str] = &[
    "op_UnaryPlus",
    "op_UnaryNegation",
    "op_LogicalNot",
    "op_OnesComplement",
    "op_Increment",
    "op_Decrement",
    "op_True",
    "op_False",
];

const BINARY_OPERATORS: &[&str] = &[
    "op_Addition",
    "op_Subtraction",
    "op_Multiply",
    "op_Division",
    "op_Modulus",
    "op_BitwiseAnd",
    "op_BitwiseOr",
    "op_ExclusiveOr",
    "op_LeftShift",
    "op_RightShift",
    "op_Equality",
    "op_Inequality",
    "op_LessThan",
    "op_GreaterThan",
    "op_LessThanOrEqual",
    "op_GreaterThanOrEqual",
];

/// Property and event accessor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Accessor {
    Get,
    Set,
    Add,
    Remove,
    Raise,
}

impl Accessor {
    fn describe(self) -> &'static str {
        match self {
            Accessor::Get => "getter",
            Accessor::Set => "setter",
            Accessor::Add => "add accessor",
            Accessor::Remove => "remove accessor",
            Accessor::Raise => "raise accessor",
        }
    }
}

/// Creates a reference to `def`, declared on `declaring_type`.
pub(crate) fn reference(declaring_type: &TypeSig, def: &MethodDef) -> MethodRef {
    MethodRef {
        declaring_type: declaring_type.clone(),
        name: def.name.clone(),
        has_this: def.has_this(),
        explicit_this: false,
        calling_convention: def.calling_convention,
        return_type: def.return_type.clone(),
        parameters: def.parameter_types(),
        generic_arity: u32::try_from(def.generic_parameters.len()).unwrap_or(u32::MAX),
        generic_arguments: Vec::new(),
        optional_parameters: None,
    }
}

/// Finds a method by name, optionally narrowed by generic arity and parameter types.
pub(crate) fn by_name(
    symbols: &SymbolSpace,
    declaring_type: &TypeSig,
    name: &str,
    generic_arity: Option<i64>,
    parameters: Option<&[TypeSig]>,
) -> Result<MethodRef> {
    let type_def = definition(symbols, declaring_type)?;
    let candidates: Vec<&Arc<MethodDef>> = type_def
        .methods_named(name)
        .filter(|m| {
            generic_arity.map_or(true, |arity| {
                i64::try_from(m.generic_parameters.len()) == Ok(arity)
            })
        })
        .filter(|m| parameters.map_or(true, |params| m.parameter_types() == params))
        .collect();

    let describe = || {
        let mut description = format!("{declaring_type}::{name}");
        if let Some(arity) = generic_arity {
            description.push_str(&format!("`{arity}"));
        }
        if let Some(params) = parameters {
            let list: Vec<String> = params.iter().map(ToString::to_string).collect();
            description.push_str(&format!("({})", list.join(",")));
        }
        description
    };

    single(declaring_type, candidates, || format!("Method {}", describe()))
}

/// Finds a property or event accessor.
pub(crate) fn accessor(
    symbols: &SymbolSpace,
    declaring_type: &TypeSig,
    member: &str,
    kind: Accessor,
) -> Result<MethodRef> {
    let type_def = definition(symbols, declaring_type)?;
    let found = match kind {
        Accessor::Get | Accessor::Set => {
            let property = type_def
                .properties
                .iter()
                .find(|p| p.name == member)
                .ok_or_else(|| {
                    weaving_error!(
                        NotFound,
                        None,
                        "Property {} not found in type {}",
                        member,
                        declaring_type
                    )
                })?;
            if kind == Accessor::Get {
                property.getter.clone()
            } else {
                property.setter.clone()
            }
        }
        Accessor::Add | Accessor::Remove | Accessor::Raise => {
            let event = type_def
                .events
                .iter()
                .find(|e| e.name == member)
                .ok_or_else(|| {
                    weaving_error!(
                        NotFound,
                        None,
                        "Event {} not found in type {}",
                        member,
                        declaring_type
                    )
                })?;
            match kind {
                Accessor::Add => event.adder.clone(),
                Accessor::Remove => event.remover.clone(),
                _ => event.raiser.clone(),
            }
        }
    };

    found
        .map(|method| reference(declaring_type, &method))
        .ok_or_else(|| {
            weaving_error!(
                NotFound,
                None,
                "{} {} of type {} has no {}",
                if matches!(kind, Accessor::Get | Accessor::Set) {
                    "Property"
                } else {
                    "Event"
                },
                member,
                declaring_type,
                kind.describe()
            )
        })
}

/// Finds an instance constructor by parameter types.
pub(crate) fn constructor(
    symbols: &SymbolSpace,
    declaring_type: &TypeSig,
    parameters: &[TypeSig],
) -> Result<MethodRef> {
    let type_def = definition(symbols, declaring_type)?;
    let candidates = type_def
        .methods_named(".ctor")
        .filter(|m| !m.is_static() && m.parameter_types() == parameters)
        .collect();
    single(declaring_type, candidates, || {
        let list: Vec<String> = parameters.iter().map(ToString::to_string).collect();
        format!("Constructor {declaring_type}({})", list.join(","))
    })
}

/// Finds the type initializer.
pub(crate) fn type_initializer(symbols: &SymbolSpace, declaring_type: &TypeSig) -> Result<MethodRef> {
    let type_def = definition(symbols, declaring_type)?;
    let candidates = type_def
        .methods_named(".cctor")
        .filter(|m| m.is_static())
        .collect();
    single(declaring_type, candidates, || {
        format!("Type initializer of {declaring_type}")
    })
}

/// Finds a unary operator; `operator` is the `UnaryOperator` enum value.
pub(crate) fn unary_operator(
    symbols: &SymbolSpace,
    declaring_type: &TypeSig,
    operator: i64,
) -> Result<MethodRef> {
    let name = operator_name(UNARY_OPERATORS, operator, "unary")?;
    let type_def = definition(symbols, declaring_type)?;
    let candidates: Vec<&Arc<MethodDef>> = type_def
        .methods_named(name)
        .filter(|m| m.is_static() && m.parameters.len() == 1)
        .collect();
    single(declaring_type, candidates, || {
        format!("Operator {declaring_type}::{name}")
    })
}

/// Finds a binary operator by its operand types.
pub(crate) fn binary_operator(
    symbols: &SymbolSpace,
    declaring_type: &TypeSig,
    operator: i64,
    left: &TypeSig,
    right: &TypeSig,
) -> Result<MethodRef> {
    let name = operator_name(BINARY_OPERATORS, operator, "binary")?;
    let type_def = definition(symbols, declaring_type)?;
    let operands = [left.clone(), right.clone()];
    let candidates = type_def
        .methods_named(name)
        .filter(|m| m.is_static() && m.parameter_types() == operands)
        .collect();
    single(declaring_type, candidates, || {
        format!("Operator {declaring_type}::{name}({left},{right})")
    })
}

/// Finds a conversion operator.
///
/// `kind` is 0 for implicit and 1 for explicit conversions. `direction` is 0 for a
/// conversion from `other` to the declaring type and 1 for the opposite direction.
pub(crate) fn conversion_operator(
    symbols: &SymbolSpace,
    declaring_type: &TypeSig,
    kind: i64,
    direction: i64,
    other: &TypeSig,
) -> Result<MethodRef> {
    let name = match kind {
        0 => "op_Implicit",
        1 => "op_Explicit",
        _ => {
            return Err(weaving_error!(
                PatternMismatch,
                None,
                "Invalid conversion operator kind: {}",
                kind
            ))
        }
    };
    let (source, target) = match direction {
        0 => (other, declaring_type),
        1 => (declaring_type, other),
        _ => {
            return Err(weaving_error!(
                PatternMismatch,
                None,
                "Invalid conversion direction: {}",
                direction
            ))
        }
    };

    let type_def = definition(symbols, declaring_type)?;
    let candidates = type_def
        .methods_named(name)
        .filter(|m| {
            m.is_static()
                && m.parameters.len() == 1
                && m.parameters[0].param_type == *source
                && m.return_type == *target
        })
        .collect();
    single(declaring_type, candidates, || {
        format!("Conversion operator {declaring_type}::{name} from {source} to {target}")
    })
}

/// Instantiates a generic method.
pub(crate) fn make_generic(mut method: MethodRef, arguments: Vec<TypeSig>) -> Result<MethodRef> {
    if method.generic_arity == 0 {
        return Err(weaving_error!(
            Structural,
            None,
            "Method {} is not a generic method definition",
            method
        ));
    }
    if !method.generic_arguments.is_empty() {
        return Err(weaving_error!(
            Structural,
            None,
            "Method {} is already a generic method instance",
            method
        ));
    }
    if u32::try_from(arguments.len()) != Ok(method.generic_arity) {
        return Err(weaving_error!(
            Structural,
            None,
            "Incorrect number of generic arguments for method {}: expected {}, got {}",
            method,
            method.generic_arity,
            arguments.len()
        ));
    }
    typeref::check_generic_arguments(&arguments)?;

    method.generic_arguments = arguments;
    Ok(method)
}

/// Supplies the optional trailing parameters of a vararg call site.
pub(crate) fn with_optional_parameters(
    mut method: MethodRef,
    parameters: Vec<TypeSig>,
) -> Result<MethodRef> {
    if method.calling_convention != CallingConvention::VarArg {
        return Err(weaving_error!(
            Structural,
            None,
            "Not a vararg method: {}",
            method
        ));
    }
    if method.optional_parameters.is_some() {
        return Err(weaving_error!(
            Structural,
            None,
            "Optional parameters have already been supplied for method {}",
            method
        ));
    }

    method.optional_parameters = Some(parameters);
    Ok(method)
}

fn definition(symbols: &SymbolSpace, declaring_type: &TypeSig) -> Result<Arc<TypeDef>> {
    match declaring_type.type_name() {
        Some(name) => symbols.resolve(name),
        None => Err(weaving_error!(
            PatternMismatch,
            None,
            "Cannot look up members of type {}",
            declaring_type
        )),
    }
}

fn operator_name(table: &'static [&'static str], value: i64, kind: &str) -> Result<&'static str> {
    usize::try_from(value)
        .ok()
        .and_then(|index| table.get(index).copied())
        .ok_or_else(|| {
            weaving_error!(
                PatternMismatch,
                None,
                "Invalid {} operator: {}",
                kind,
                value
            )
        })
}

fn single(
    declaring_type: &TypeSig,
    candidates: Vec<&Arc<MethodDef>>,
    describe: impl FnOnce() -> String,
) -> Result<MethodRef> {
    match candidates.as_slice() {
        [method] => Ok(reference(declaring_type, method)),
        [] => Err(weaving_error!(NotFound, None, "{} not found", describe())),
        many => Err(weaving_error!(
            Ambiguous,
            None,
            "{} is ambiguous between {} overloads",
            describe(),
            many.len()
        )),
    }
}
