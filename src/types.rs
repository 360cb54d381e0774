//! Mapping from source types to IR types, and the result type rule for
//! binary operations.

use crate::{
    ast::{BaseType, VarType},
    ir::{Prim, Type},
};

pub fn ir_type(ty: VarType) -> Type {
    let prim = match ty.base {
        BaseType::Integer => Prim::I64,
        BaseType::Char => Prim::I8,
        BaseType::Bool => Prim::I1,
        BaseType::Float => Prim::F32,
        BaseType::Double => Prim::F64,
        BaseType::Void => Prim::Void,
    };
    Type {
        prim,
        pointer: ty.pointer,
    }
}

/// The name of `ty` as written in source, used in diagnostics. IR-only
/// integer widths (literals are `i32`) are printed as IR names.
pub fn source_name(ty: Type) -> String {
    let base = match ty.prim {
        Prim::I64 => "integer",
        Prim::I8 => "char",
        Prim::I1 => "bool",
        Prim::F32 => "float",
        Prim::F64 => "double",
        Prim::Void => "void",
        Prim::I32 => "i32",
    };
    if ty.pointer {
        format!("*{base}")
    } else {
        base.to_owned()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("cannot operate on void")]
    Void,
    #[error("cannot mix pointer and non-pointer")]
    MixedPointer,
    #[error("cannot cast between pointer types")]
    PointerCast,
}

/// Picks the type both operands of a binary operation are converted to.
///
/// Floats win over integers and the wider type wins among floats or among
/// integers. Two pointers must be of the same type.
pub fn result_type(l: Type, r: Type) -> Result<Type, Error> {
    if l.is_void() || r.is_void() {
        return Err(Error::Void);
    }
    match (l.pointer, r.pointer) {
        (true, true) if l == r => return Ok(l),
        (true, true) => return Err(Error::PointerCast),
        (true, false) | (false, true) => return Err(Error::MixedPointer),
        (false, false) => {}
    }
    let ty = match (l.is_float(), r.is_float()) {
        (true, true) | (false, false) => {
            if l.bits() >= r.bits() {
                l
            } else {
                r
            }
        }
        (true, false) => l,
        (false, true) => r,
    };
    Ok(ty)
}
