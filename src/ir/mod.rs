//! A small typed SSA-style IR with explicit stack slots, modeled after the
//! subset of LLVM IR the lowering needs.

use std::{collections::HashMap, fmt};

pub mod builder;
pub mod interp;
mod print;
pub mod verify;

pub use builder::Builder;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Prim {
    Void,
    I1,
    I8,
    I32,
    I64,
    F32,
    F64,
}

impl Prim {
    fn name(self) -> &'static str {
        match self {
            Prim::Void => "void",
            Prim::I1 => "i1",
            Prim::I8 => "i8",
            Prim::I32 => "i32",
            Prim::I64 => "i64",
            Prim::F32 => "float",
            Prim::F64 => "double",
        }
    }
}

/// A scalar type, or a pointer to one.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    pub prim: Prim,
    pub pointer: bool,
}

impl Type {
    pub const VOID: Type = Type::new(Prim::Void);
    pub const I1: Type = Type::new(Prim::I1);
    pub const I8: Type = Type::new(Prim::I8);
    pub const I32: Type = Type::new(Prim::I32);
    pub const I64: Type = Type::new(Prim::I64);
    pub const F32: Type = Type::new(Prim::F32);
    pub const F64: Type = Type::new(Prim::F64);

    pub const fn new(prim: Prim) -> Type {
        Type {
            prim,
            pointer: false,
        }
    }

    pub const fn pointer_to(prim: Prim) -> Type {
        Type {
            prim,
            pointer: true,
        }
    }

    pub fn is_void(self) -> bool {
        self == Type::VOID
    }

    pub fn is_int(self) -> bool {
        !self.pointer && matches!(self.prim, Prim::I1 | Prim::I8 | Prim::I32 | Prim::I64)
    }

    pub fn is_float(self) -> bool {
        !self.pointer && matches!(self.prim, Prim::F32 | Prim::F64)
    }

    /// Width of integer and floating point types. Zero for anything else.
    pub fn bits(self) -> u32 {
        if self.pointer {
            return 0;
        }
        match self.prim {
            Prim::Void => 0,
            Prim::I1 => 1,
            Prim::I8 => 8,
            Prim::I32 | Prim::F32 => 32,
            Prim::I64 | Prim::F64 => 64,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prim.name())?;
        if self.pointer {
            f.write_str("*")?;
        }
        Ok(())
    }
}

macro_rules! define_ids {
    ($($(#[$meta:meta])* $name:ident;)*) => {$(
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    )*};
}

define_ids! {
    FuncId;
    /// Local to its function.
    BlockId;
    /// An instruction result, local to its function.
    ValueId;
    /// A stack slot, local to its function.
    SlotId;
    GlobalId;
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Inst(ValueId),
    /// The n-th parameter of the enclosing function.
    Param(u32),
    Int { ty: Type, value: i64 },
    Float { ty: Type, value: f64 },
    /// The address of a global string.
    Global(GlobalId),
    /// The address of a stack slot.
    SlotAddr(SlotId),
    /// The result of a call to a void function. Not a valid operand.
    Void,
}

impl Value {
    pub fn int(ty: Type, value: i64) -> Value {
        Value::Int { ty, value }
    }

    pub fn float(ty: Type, value: f64) -> Value {
        Value::Float { ty, value }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    SDiv,
    Shl,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinOp {
    pub fn is_float(self) -> bool {
        matches!(self, BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv)
    }

    fn name(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::SDiv => "sdiv",
            BinOp::Shl => "shl",
            BinOp::AShr => "ashr",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
        }
    }
}

/// Comparison predicates. The `I*` ones compare signed integers (and pointers,
/// for equality), the `F*` ones floats.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpPred {
    IEq,
    INe,
    ISlt,
    ISgt,
    ISle,
    ISge,
    FOeq,
    /// Unordered or not equal: true for NaN.
    FUne,
    FOlt,
    FOgt,
    FOle,
    FOge,
}

impl CmpPred {
    pub fn is_float(self) -> bool {
        use CmpPred::*;
        matches!(self, FOeq | FUne | FOlt | FOgt | FOle | FOge)
    }

    fn name(self) -> &'static str {
        use CmpPred::*;
        match self {
            IEq => "icmp eq",
            INe => "icmp ne",
            ISlt => "icmp slt",
            ISgt => "icmp sgt",
            ISle => "icmp sle",
            ISge => "icmp sge",
            FOeq => "fcmp oeq",
            FUne => "fcmp une",
            FOlt => "fcmp olt",
            FOgt => "fcmp ogt",
            FOle => "fcmp ole",
            FOge => "fcmp oge",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CastOp {
    SExt,
    ZExt,
    Trunc,
    FpToSi,
    SiToFp,
    UiToFp,
    FpExt,
    FpTrunc,
}

impl CastOp {
    fn name(self) -> &'static str {
        match self {
            CastOp::SExt => "sext",
            CastOp::ZExt => "zext",
            CastOp::Trunc => "trunc",
            CastOp::FpToSi => "fptosi",
            CastOp::SiToFp => "sitofp",
            CastOp::UiToFp => "uitofp",
            CastOp::FpExt => "fpext",
            CastOp::FpTrunc => "fptrunc",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inst {
    /// Result value, `None` for instructions without one.
    pub result: Option<ValueId>,
    pub kind: InstKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstKind {
    Alloca { slot: SlotId },
    Load { slot: SlotId },
    Store { slot: SlotId, value: Value },
    Binary { op: BinOp, lhs: Value, rhs: Value },
    Cmp { pred: CmpPred, lhs: Value, rhs: Value },
    Cast { op: CastOp, value: Value, to: Type },
    Call { callee: FuncId, args: Vec<Value> },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Value,
        then_dest: BlockId,
        else_dest: BlockId,
    },
    Ret(Option<Value>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<BlockId> {
        match *self {
            Terminator::Br(dest) => vec![dest],
            Terminator::CondBr {
                then_dest,
                else_dest,
                ..
            } => vec![then_dest, else_dest],
            Terminator::Ret(_) | Terminator::Unreachable => Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
    pub terminator: Option<Terminator>,
    /// Set on blocks that start after a `return` or `abort`: no edge reaches
    /// them.
    pub unreachable: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct ValueInfo {
    ty: Type,
    /// Whether the value comes straight out of a comparison.
    comparison: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    pub variadic: bool,
    /// Calls to this function never return.
    pub no_return: bool,
    blocks: Vec<Block>,
    /// Attached blocks, in emission order. Empty for declarations.
    layout: Vec<BlockId>,
    slots: Vec<Slot>,
    values: Vec<ValueInfo>,
}

impl Function {
    pub(crate) fn new(name: String, params: Vec<Param>, ret: Type) -> Function {
        Function {
            name,
            params,
            ret,
            variadic: false,
            no_return: false,
            blocks: Vec::new(),
            layout: Vec::new(),
            slots: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Whether the function only has a declaration.
    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Attached blocks, in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.layout.iter().map(|&id| (id, self.block(id)))
    }

    pub fn is_attached(&self, id: BlockId) -> bool {
        self.layout.contains(&id)
    }

    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.index()]
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// The type of `value` in the context of this function. Panics on foreign
    /// value ids.
    pub fn type_of(&self, value: Value) -> Type {
        match value {
            Value::Inst(id) => self.values[id.index()].ty,
            Value::Param(n) => self.params[n as usize].ty,
            Value::Int { ty, .. } | Value::Float { ty, .. } => ty,
            Value::Global(_) => Type::pointer_to(Prim::I8),
            Value::SlotAddr(slot) => Type::pointer_to(self.slot(slot).ty.prim),
            Value::Void => Type::VOID,
        }
    }

    /// Whether `value` is the direct result of a comparison.
    pub fn is_comparison(&self, value: Value) -> bool {
        match value {
            Value::Inst(id) => self.values[id.index()].comparison,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub name: String,
    /// Contents, without the trailing NUL.
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
    globals: Vec<Global>,
    by_name: HashMap<String, FuncId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            ..Module::default()
        }
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId(i as u32), f))
    }

    pub fn get_function(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.index()]
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &Global)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId(i as u32), g))
    }
}
