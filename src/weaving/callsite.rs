//! Stand-alone method signatures for `calli`.
//!
//! Managed signatures take a `System.Reflection.CallingConventions` flags value,
//! unmanaged ones a `System.Runtime.InteropServices.CallingConvention` value.

use crate::{
    metadata::{CallSiteSig, CallingConvention, TypeSig},
    Result,
};

const CONVENTION_STANDARD: i64 = 0x01;
const CONVENTION_VARARGS: i64 = 0x02;
const CONVENTION_ANY: i64 = 0x03;
const CONVENTION_HAS_THIS: i64 = 0x20;
const CONVENTION_EXPLICIT_THIS: i64 = 0x40;

/// Builds a managed signature from `CallingConventions` flags.
pub(crate) fn managed(flags: i64, return_type: TypeSig, parameters: Vec<TypeSig>) -> Result<CallSiteSig> {
    if flags & !(CONVENTION_ANY | CONVENTION_HAS_THIS | CONVENTION_EXPLICIT_THIS) != 0 {
        return Err(weaving_error!(
            PatternMismatch,
            None,
            "Invalid calling convention flags: 0x{:X}",
            flags
        ));
    }

    let calling_convention = match flags & CONVENTION_ANY {
        CONVENTION_STANDARD | 0 => CallingConvention::Default,
        CONVENTION_VARARGS => CallingConvention::VarArg,
        _ => {
            return Err(weaving_error!(
                Structural,
                None,
                "Calling convention Any is not valid for a call site signature"
            ))
        }
    };

    let has_this = flags & CONVENTION_HAS_THIS != 0;
    let explicit_this = flags & CONVENTION_EXPLICIT_THIS != 0;
    if explicit_this && !has_this {
        return Err(weaving_error!(
            Structural,
            None,
            "ExplicitThis requires HasThis"
        ));
    }

    Ok(CallSiteSig {
        calling_convention,
        has_this,
        explicit_this,
        return_type,
        parameters,
        optional_parameters: None,
    })
}

/// Builds an unmanaged signature from a `CallingConvention` value.
pub(crate) fn unmanaged(
    convention: i64,
    return_type: TypeSig,
    parameters: Vec<TypeSig>,
) -> Result<CallSiteSig> {
    let calling_convention = match convention {
        1 => CallingConvention::Unmanaged,
        2 => CallingConvention::C,
        3 => CallingConvention::StdCall,
        4 => CallingConvention::ThisCall,
        5 => CallingConvention::FastCall,
        _ => {
            return Err(weaving_error!(
                PatternMismatch,
                None,
                "Invalid unmanaged calling convention: {}",
                convention
            ))
        }
    };

    Ok(CallSiteSig {
        calling_convention,
        has_this: false,
        explicit_this: false,
        return_type,
        parameters,
        optional_parameters: None,
    })
}

/// Supplies the optional trailing parameters of a vararg signature.
pub(crate) fn with_optional_parameters(
    mut signature: CallSiteSig,
    parameters: Vec<TypeSig>,
) -> Result<CallSiteSig> {
    if signature.calling_convention != CallingConvention::VarArg {
        return Err(weaving_error!(
            Structural,
            None,
            "Not a vararg signature: {}",
            signature
        ));
    }
    if signature.optional_parameters.is_some() {
        return Err(weaving_error!(
            Structural,
            None,
            "Optional parameters have already been supplied for signature {}",
            signature
        ));
    }

    signature.optional_parameters = Some(parameters);
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test;

    #[test]
    fn managed_signatures() {
        let sig = managed(CONVENTION_STANDARD, test::int32(), vec![test::int32()]).unwrap();
        assert_eq!(sig.to_string(), "System.Int32 *(System.Int32)");
        assert_eq!(sig.call_pops(), 2);

        let sig = managed(CONVENTION_STANDARD | CONVENTION_HAS_THIS, test::void(), vec![]).unwrap();
        assert!(sig.has_this);
        assert!(managed(CONVENTION_ANY, test::void(), vec![]).is_err());
        assert!(managed(0x1000, test::void(), vec![]).is_err());
    }

    #[test]
    fn unmanaged_signatures() {
        let sig = unmanaged(2, test::void(), vec![test::int32()]).unwrap();
        assert_eq!(sig.to_string(), "unmanaged cdecl System.Void *(System.Int32)");
        assert!(unmanaged(9, test::void(), vec![]).is_err());
    }

    #[test]
    fn vararg_optional_parameters() {
        let sig = managed(CONVENTION_VARARGS, test::void(), vec![test::int32()]).unwrap();
        let sig = with_optional_parameters(sig, vec![test::string()]).unwrap();
        assert_eq!(sig.call_pops(), 3);
        assert!(with_optional_parameters(sig, vec![]).is_err());

        let plain = managed(CONVENTION_STANDARD, test::void(), vec![]).unwrap();
        assert!(with_optional_parameters(plain, vec![]).is_err());
    }
}
