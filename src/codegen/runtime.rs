use crate::ir::{Prim, Type};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// The runtime library lowered programs link against.
pub trait Env {
    /// Name given to the entry point.
    const ENTRY_POINT: &str;

    /// `int (const char *, ...)`
    const PRINT: &str;
    /// `int (const char *, ...)`
    const READ: &str;
    /// `void (void)`, never returns.
    const ABORT: &str;

    /// Format string passing one value of type `ty` to the print or read
    /// function.
    fn format(ty: Type, direction: Direction) -> &'static str;

    /// Whether user functions may not take `name`.
    fn is_reserved(name: &str) -> bool {
        name == Self::PRINT || name == Self::READ || name == Self::ABORT
    }
}

impl Env for Libc {
    const ENTRY_POINT: &str = "main";

    const PRINT: &str = "printf";
    const READ: &str = "scanf";
    const ABORT: &str = "abort";

    fn format(ty: Type, direction: Direction) -> &'static str {
        use Direction::*;
        debug_assert!(ty.is_int() || ty.is_float(), "no format for {ty}");
        match (ty.prim, direction) {
            (Prim::I1 | Prim::I32, Input) => "%d",
            (Prim::I1 | Prim::I32, Output) => "%d\n",
            (Prim::I8, Input) => " %c",
            (Prim::I8, Output) => "%c\n",
            (Prim::I64, Input) => "%ld",
            (Prim::I64, Output) => "%ld\n",
            (Prim::F32, Input) => "%f",
            (Prim::F32, Output) => "%f\n",
            (Prim::F64 | Prim::Void, Input) => "%lf",
            (Prim::F64 | Prim::Void, Output) => "%lf\n",
        }
    }
}

pub struct Libc;
