//! Incremental construction of IR modules.

use super::{
    interp::{round, unsigned, wrap},
    BinOp, Block, BlockId, CastOp, CmpPred, FuncId, Function, Global, GlobalId, Inst, InstKind,
    Module, Param, Prim, Slot, SlotId, Terminator, Type, Value, ValueId, ValueInfo,
};

/// Builds a module one instruction at a time.
///
/// Instructions go to the end of the current block of the current function.
/// Blocks are created detached and only become part of the function, in
/// order, once appended.
pub struct Builder {
    module: Module,
    func: Option<FuncId>,
    block: Option<BlockId>,
}

impl Builder {
    pub fn new(module_name: impl Into<String>) -> Builder {
        Builder {
            module: Module::new(module_name),
            func: None,
            block: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    // ============ Module Building ============

    /// Declares a function. Returns `None` if the name is taken.
    pub fn declare_function(&mut self, name: &str, params: Vec<Param>, ret: Type) -> Option<FuncId> {
        if self.module.by_name.contains_key(name) {
            return None;
        }
        let id = FuncId(self.module.functions.len() as u32);
        self.module
            .functions
            .push(Function::new(name.to_owned(), params, ret));
        self.module.by_name.insert(name.to_owned(), id);
        Some(id)
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.module.functions[id.index()]
    }

    /// Adds a NUL-terminated string constant, returning its address.
    pub fn add_string(&mut self, name: &str, text: &str) -> Value {
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.push(Global {
            name: format!("{name}.{}", id.0),
            text: text.to_owned(),
        });
        Value::Global(id)
    }

    // ============ Function Building ============

    /// Directs subsequent blocks and instructions to `func`.
    pub fn enter_function(&mut self, func: FuncId) {
        self.func = Some(func);
        self.block = None;
    }

    pub fn current_function_id(&self) -> FuncId {
        self.func.expect("no function is being built")
    }

    pub fn current_function(&self) -> &Function {
        self.module.function(self.current_function_id())
    }

    fn func_mut(&mut self) -> &mut Function {
        let id = self.current_function_id();
        self.function_mut(id)
    }

    /// Creates a block that is not yet part of the function layout.
    pub fn create_block(&mut self, label: &str) -> BlockId {
        let func = self.func_mut();
        let id = BlockId(func.blocks.len() as u32);
        func.blocks.push(Block {
            label: label.to_owned(),
            insts: Vec::new(),
            terminator: None,
            unreachable: false,
        });
        id
    }

    /// Places `block` after all previously appended blocks.
    pub fn append_block(&mut self, block: BlockId) {
        let func = self.func_mut();
        debug_assert!(!func.layout.contains(&block), "block appended twice");
        func.layout.push(block);
    }

    /// Moves the insertion point to the end of `block`.
    pub fn switch_to(&mut self, block: BlockId) {
        self.block = Some(block);
    }

    pub fn current_block(&self) -> BlockId {
        self.block.expect("no insertion block")
    }

    pub fn mark_unreachable(&mut self, block: BlockId) {
        self.func_mut().blocks[block.index()].unreachable = true;
    }

    pub fn type_of(&self, value: Value) -> Type {
        self.current_function().type_of(value)
    }

    pub fn is_comparison(&self, value: Value) -> bool {
        self.current_function().is_comparison(value)
    }

    // ============ Instructions ============

    fn push(&mut self, kind: InstKind, result: Option<ValueInfo>) -> Option<ValueId> {
        let block = self.current_block();
        let func = self.func_mut();
        let result = result.map(|info| {
            func.values.push(info);
            ValueId(func.values.len() as u32 - 1)
        });
        let block = &mut func.blocks[block.index()];
        debug_assert!(block.terminator.is_none(), "instruction after terminator");
        block.insts.push(Inst { result, kind });
        result
    }

    fn push_value(&mut self, kind: InstKind, ty: Type, comparison: bool) -> Value {
        match self.push(kind, Some(ValueInfo { ty, comparison })) {
            Some(id) => Value::Inst(id),
            None => Value::Void,
        }
    }

    /// Reserves a stack slot for a variable of type `ty`.
    pub fn alloca(&mut self, name: &str, ty: Type) -> SlotId {
        let func = self.func_mut();
        let slot = SlotId(func.slots.len() as u32);
        func.slots.push(Slot {
            name: name.to_owned(),
            ty,
        });
        self.push(InstKind::Alloca { slot }, None);
        slot
    }

    pub fn load(&mut self, slot: SlotId) -> Value {
        let ty = self.current_function().slot(slot).ty;
        self.push_value(InstKind::Load { slot }, ty, false)
    }

    pub fn store(&mut self, slot: SlotId, value: Value) {
        self.push(InstKind::Store { slot, value }, None);
    }

    /// Both operands must have the same type, which is also the result type.
    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.type_of(lhs);
        self.push_value(InstKind::Binary { op, lhs, rhs }, ty, false)
    }

    pub fn cmp(&mut self, pred: CmpPred, lhs: Value, rhs: Value) -> Value {
        self.push_value(InstKind::Cmp { pred, lhs, rhs }, Type::I1, true)
    }

    /// Casts of constants are folded.
    pub fn cast(&mut self, op: CastOp, value: Value, to: Type) -> Value {
        let from = self.type_of(value);
        if let Some(folded) = fold_cast(op, from, value, to) {
            return folded;
        }
        self.push_value(InstKind::Cast { op, value, to }, to, false)
    }

    /// Returns [`Value::Void`] for functions without a result.
    pub fn call(&mut self, callee: FuncId, args: Vec<Value>) -> Value {
        let ret = self.module.function(callee).ret;
        let kind = InstKind::Call { callee, args };
        if ret.is_void() {
            self.push(kind, None);
            Value::Void
        } else {
            self.push_value(kind, ret, false)
        }
    }

    // ============ Terminators ============

    fn terminate(&mut self, terminator: Terminator) {
        let block = self.current_block();
        let block = &mut self.func_mut().blocks[block.index()];
        debug_assert!(block.terminator.is_none(), "block terminated twice");
        block.terminator = Some(terminator);
    }

    pub fn br(&mut self, dest: BlockId) {
        self.terminate(Terminator::Br(dest));
    }

    pub fn cond_br(&mut self, cond: Value, then_dest: BlockId, else_dest: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_dest,
            else_dest,
        });
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }
}

fn fold_cast(op: CastOp, from: Type, value: Value, to: Type) -> Option<Value> {
    let folded = match (op, value) {
        (CastOp::SExt | CastOp::Trunc, Value::Int { value, .. }) => Value::int(to, wrap(to, value)),
        (CastOp::ZExt, Value::Int { value, .. }) => {
            Value::int(to, wrap(to, unsigned(from, value) as i64))
        }
        (CastOp::SiToFp, Value::Int { value, .. }) => Value::float(to, round(to, value as f64)),
        (CastOp::UiToFp, Value::Int { value, .. }) => {
            Value::float(to, round(to, unsigned(from, value) as f64))
        }
        (CastOp::FpToSi, Value::Float { value, .. }) => Value::int(to, wrap(to, value as i64)),
        (CastOp::FpExt | CastOp::FpTrunc, Value::Float { value, .. }) => {
            Value::float(to, round(to, value))
        }
        _ => return None,
    };
    Some(folded)
}

/// The zero constant of a scalar type.
pub fn zero(ty: Type) -> Value {
    match ty.prim {
        Prim::F32 | Prim::F64 => Value::float(ty, 0.0),
        _ => Value::int(ty, 0),
    }
}
