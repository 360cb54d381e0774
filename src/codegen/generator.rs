use std::{collections::HashMap, marker::PhantomData};

use log::debug;

use crate::{
    ast::{self, BinaryOperator, Branch, Expr, ExprKind, Stmt, StmtKind, VarType, Variable},
    codegen::{
        interface::Error,
        runtime::{Direction, Env},
        scope::Scopes,
    },
    ir::{
        self, builder::zero, BinOp, BlockId, Builder, CastOp, CmpPred, FuncId, Param, Prim,
        SlotId, Type, Value,
    },
    token::{Span, Spanned},
    types::{self, ir_type, source_name},
    util::intern::{Interner, Symbol},
};

type Result<T, E = Spanned<Error>> = std::result::Result<T, E>;

#[derive(Copy, Clone)]
struct Runtime {
    print: FuncId,
    read: FuncId,
    abort: FuncId,
}

/// State of the function whose body is being lowered.
#[derive(Copy, Clone)]
struct Frame {
    /// Holds the only `ret`. Attached after the body.
    exit: BlockId,
    /// `None` for void functions.
    result: Option<SlotId>,
}

pub struct Generator<'ident, E> {
    builder: Builder,
    idents: &'ident Interner,
    scopes: Scopes,
    functions: HashMap<Symbol, FuncId>,
    runtime: Runtime,
    formats: HashMap<(Type, Direction), Value>,
    frame: Option<Frame>,
    _env: PhantomData<E>,
}

impl<'ident, E: Env> Generator<'ident, E> {
    pub fn new(module_name: &str, idents: &'ident Interner) -> Generator<'ident, E> {
        let mut builder = Builder::new(module_name);
        let runtime = Runtime {
            print: Self::declare_runtime(&mut builder, E::PRINT, true, Type::I32),
            read: Self::declare_runtime(&mut builder, E::READ, true, Type::I32),
            abort: Self::declare_runtime(&mut builder, E::ABORT, false, Type::VOID),
        };
        builder.function_mut(runtime.abort).no_return = true;
        Generator {
            builder,
            idents,
            scopes: Scopes::default(),
            functions: HashMap::new(),
            runtime,
            formats: HashMap::new(),
            frame: None,
            _env: PhantomData,
        }
    }

    fn declare_runtime(builder: &mut Builder, name: &str, formatted: bool, ret: Type) -> FuncId {
        let params = if formatted {
            vec![Param {
                name: "format".to_owned(),
                ty: Type::pointer_to(Prim::I8),
            }]
        } else {
            Vec::new()
        };
        let id = builder
            .declare_function(name, params, ret)
            .expect("runtime functions are declared first");
        builder.function_mut(id).variadic = formatted;
        id
    }

    /// Declares every function before defining any, so that calls may refer
    /// to functions defined later in the source.
    pub fn generate(mut self, module: &ast::Module) -> Result<ir::Module> {
        let ids = module
            .all_functions()
            .map(|function| self.declare(function))
            .collect::<Result<Vec<_>>>()?;
        for (function, id) in module.all_functions().zip(ids) {
            self.g_function(function, id)?;
        }
        Ok(self.builder.finish())
    }

    fn declare(&mut self, function: &ast::Function) -> Result<FuncId> {
        let name = self.function_name(function);
        let span = function.name.as_ref().map_or(function.span, |var| var.span);
        if E::is_reserved(name) {
            return Err(span.wrap(Error::ReservedName(name.to_owned())));
        }
        let params = function
            .params
            .iter()
            .map(|param| Param {
                name: self.name(param.name.name).to_owned(),
                ty: ir_type(param.ty),
            })
            .collect();
        let ret = ir_type(function.return_ty);
        let Some(id) = self.builder.declare_function(name, params, ret) else {
            return Err(span.wrap(Error::FunctionRedefinition(name.to_owned())));
        };
        if let Some(var) = &function.name {
            self.functions.insert(var.name, id);
        }
        debug!("declared {name}: {ret}");
        Ok(id)
    }

    fn g_function(&mut self, function: &ast::Function, id: FuncId) -> Result<()> {
        if function.body.is_empty() {
            return Ok(());
        }
        self.builder.enter_function(id);
        let entry = self.new_block("entry");
        self.builder.switch_to(entry);

        self.scoped(|this| {
            let ret = ir_type(function.return_ty);
            let result = (!ret.is_void()).then(|| this.builder.alloca("result", ret));
            if let (Some(slot), true) = (result, function.is_entry_point()) {
                this.builder.store(slot, zero(ret));
            }
            for (i, param) in function.params.iter().enumerate() {
                let name = this.name(param.name.name);
                let slot = this.builder.alloca(name, ir_type(param.ty));
                this.builder.store(slot, Value::Param(i as u32));
                this.define(&param.name, slot)?;
            }

            let exit = this.builder.create_block("exit");
            this.frame = Some(Frame { exit, result });
            this.g_stmts(&function.body)?;
            this.builder.br(exit);

            this.builder.append_block(exit);
            this.builder.switch_to(exit);
            let value = result.map(|slot| this.builder.load(slot));
            this.builder.ret(value);
            this.frame = None;
            Ok(())
        })?;

        ir::verify::verify_function(self.builder.module(), id)
            .map_err(|error| function.span.wrap(Error::Verify(error)))?;
        debug!("defined {}", self.function_name(function));
        Ok(())
    }

    // ============ Statements ============

    fn g_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        stmts.iter().try_for_each(|stmt| self.g_stmt(stmt))
    }

    fn g_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Assert(condition) => self.g_assert(condition),
            StmtKind::Input(var) => self.g_input(var),
            StmtKind::Abort => {
                self.g_abort();
                self.continue_unreachable("abort.after");
                Ok(())
            }
            StmtKind::Expr(expr) => self.g_expr(expr).map(drop),
            StmtKind::Print(expr) => self.g_print(expr),
            StmtKind::Assign { target, value } => self.g_assign(target, value),
            StmtKind::Vardecl { var, ty, init } => self.g_vardecl(var, *ty, init.as_ref()),
            StmtKind::Loop { body, condition } => self.g_loop(body, condition),
            StmtKind::Branch(branch) => self.g_branch(branch),
            StmtKind::Return(value) => self.g_return(value.as_ref()),
        }
    }

    fn g_vardecl(&mut self, var: &Variable, ty: VarType, init: Option<&Expr>) -> Result<()> {
        let ty = ir_type(ty);
        if ty.is_void() {
            return Err(var.span.wrap(Error::VoidVariable(self.name(var.name).to_owned())));
        }
        // The name is bound only after the initializer, which still sees any
        // outer variable it shadows.
        if self.scopes.defined_here(var.name) {
            return Err(var.span.wrap(Error::Redefinition(self.name(var.name).to_owned())));
        }
        let init = match init {
            Some(expr) => {
                let value = self.g_expr(expr)?;
                let found = self.builder.type_of(value);
                let value = self.coerce(value, ty).ok_or_else(|| {
                    expr.span.wrap(Error::InitType {
                        expected: source_name(ty),
                        found: source_name(found),
                    })
                })?;
                Some(value)
            }
            None => None,
        };
        let name = self.name(var.name);
        let slot = self.builder.alloca(name, ty);
        self.define(var, slot)?;
        if let Some(value) = init {
            self.builder.store(slot, value);
        }
        Ok(())
    }

    fn g_return(&mut self, value: Option<&Expr>) -> Result<()> {
        let Some(frame) = self.frame else {
            unreachable!("return outside of a function body");
        };
        match (value, frame.result) {
            (Some(expr), Some(slot)) => {
                let value = self.g_expr(expr)?;
                let found = self.builder.type_of(value);
                let expected = self.builder.current_function().ret;
                let value = self.coerce(value, expected).ok_or_else(|| {
                    expr.span.wrap(Error::ReturnType {
                        expected: source_name(expected),
                        found: source_name(found),
                    })
                })?;
                self.builder.store(slot, value);
            }
            (Some(expr), None) => return Err(expr.span.wrap(Error::ReturnValueFromVoid)),
            (None, _) => {}
        }
        self.builder.br(frame.exit);
        self.continue_unreachable("return.after");
        Ok(())
    }

    fn g_assign(&mut self, target: &Variable, value: &Expr) -> Result<()> {
        let value_ir = self.g_expr(value)?;
        let slot = self.scopes.lookup(target.name).ok_or_else(|| {
            target
                .span
                .wrap(Error::AssignUndefined(self.name(target.name).to_owned()))
        })?;
        let expected = self.builder.current_function().slot(slot).ty;
        let found = self.builder.type_of(value_ir);
        let value_ir = self.coerce(value_ir, expected).ok_or_else(|| {
            value.span.wrap(Error::AssignType {
                expected: source_name(expected),
                found: source_name(found),
            })
        })?;
        self.builder.store(slot, value_ir);
        Ok(())
    }

    fn g_branch(&mut self, branch: &Branch) -> Result<()> {
        let exit = self.builder.create_block("branch.after");
        let first = self.new_block("branch.case.cond");
        self.builder.br(first);
        self.builder.switch_to(first);

        for case in &branch.cases {
            let condition = self.g_condition(&case.condition)?;
            let next = self.builder.create_block("branch.case.cond");
            let body = self.new_block("branch.case.body");
            self.builder.cond_br(condition, body, next);

            self.builder.switch_to(body);
            self.scoped(|this| this.g_stmts(&case.body))?;
            self.builder.br(exit);

            self.builder.append_block(next);
            self.builder.switch_to(next);
        }

        if let Some(otherwise) = &branch.otherwise {
            let block = self.new_block("branch.else");
            self.builder.br(block);
            self.builder.switch_to(block);
            self.scoped(|this| this.g_stmts(otherwise))?;
        }

        self.builder.br(exit);
        self.builder.append_block(exit);
        self.builder.switch_to(exit);
        Ok(())
    }

    /// The body runs once before the condition is first checked.
    fn g_loop(&mut self, body: &[Stmt], condition: &Expr) -> Result<()> {
        let body_block = self.new_block("loop.body");
        self.builder.br(body_block);
        self.builder.switch_to(body_block);
        self.scoped(|this| this.g_stmts(body))?;

        let condition_block = self.new_block("loop.condition");
        self.builder.br(condition_block);
        self.builder.switch_to(condition_block);
        let condition = self.g_condition(condition)?;

        let after = self.builder.create_block("loop.after");
        self.builder.cond_br(condition, body_block, after);
        self.builder.append_block(after);
        self.builder.switch_to(after);
        Ok(())
    }

    fn g_input(&mut self, var: &Variable) -> Result<()> {
        let slot = self.scopes.lookup(var.name).ok_or_else(|| {
            var.span
                .wrap(Error::ReadUndefined(self.name(var.name).to_owned()))
        })?;
        let ty = self.builder.current_function().slot(slot).ty;
        if !ty.is_int() && !ty.is_float() {
            return Err(var.span.wrap(Error::NotReadable));
        }
        let format = self.format(ty, Direction::Input);
        if ty == Type::I1 {
            // Read a whole int, then keep its truthiness.
            let temp = self.builder.alloca("input", Type::I32);
            self.builder
                .call(self.runtime.read, vec![format, Value::SlotAddr(temp)]);
            let read = self.builder.load(temp);
            let truth = self.builder.cmp(CmpPred::INe, read, zero(Type::I32));
            self.builder.store(slot, truth);
        } else {
            self.builder
                .call(self.runtime.read, vec![format, Value::SlotAddr(slot)]);
        }
        Ok(())
    }

    fn g_print(&mut self, expr: &Expr) -> Result<()> {
        let value = self.g_expr(expr)?;
        let ty = self.builder.type_of(value);
        if !ty.is_int() && !ty.is_float() {
            return Err(expr.span.wrap(Error::NotPrintable));
        }
        // Variadic arguments are promoted to int or double.
        let value = if ty.is_int() && ty.bits() < 32 {
            self.builder.cast(CastOp::ZExt, value, Type::I32)
        } else if ty == Type::F32 {
            self.builder.cast(CastOp::FpExt, value, Type::F64)
        } else {
            value
        };
        let format = self.format(ty, Direction::Output);
        self.builder.call(self.runtime.print, vec![format, value]);
        Ok(())
    }

    fn g_assert(&mut self, condition: &Expr) -> Result<()> {
        let check = self.new_block("assert.check");
        let fail = self.new_block("assert.fail");
        let success = self.new_block("assert.success");
        self.builder.br(check);

        self.builder.switch_to(check);
        let condition = self.g_condition(condition)?;
        self.builder.cond_br(condition, success, fail);

        self.builder.switch_to(fail);
        self.g_abort();

        self.builder.switch_to(success);
        Ok(())
    }

    /// Calls abort, terminating the current block.
    fn g_abort(&mut self) {
        self.builder.call(self.runtime.abort, Vec::new());
        self.builder.unreachable();
    }

    // ============ Expressions ============

    fn g_expr(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Int(int) => Ok(match i32::try_from(*int) {
                Ok(int) => Value::int(Type::I32, i64::from(int)),
                Err(_) => Value::int(Type::I64, *int as i64),
            }),
            ExprKind::Float(float) => Ok(Value::float(Type::F64, *float)),
            ExprKind::Id(var) => {
                let slot = self.scopes.lookup(var.name).ok_or_else(|| {
                    var.span
                        .wrap(Error::UndefinedVariable(self.name(var.name).to_owned()))
                })?;
                Ok(self.builder.load(slot))
            }
            ExprKind::Binary { op, lhs, rhs } => self.g_binary(expr.span, *op, lhs, rhs),
            ExprKind::Call { function, args } => self.g_call(expr.span, function, args),
        }
    }

    fn g_binary(&mut self, span: Span, op: BinaryOperator, lhs: &Expr, rhs: &Expr) -> Result<Value> {
        use BinaryOperator::*;

        let lhs = self.g_expr(lhs)?;
        let rhs = self.g_expr(rhs)?;
        let ty = types::result_type(self.builder.type_of(lhs), self.builder.type_of(rhs))
            .map_err(|error| span.wrap(Error::Types(error)))?;
        if ty.pointer {
            if op != Eq {
                return Err(span.wrap(Error::PointerArithmetic));
            }
            return Ok(self.builder.cmp(CmpPred::IEq, lhs, rhs));
        }

        let lhs = self.convert(lhs, ty);
        let rhs = self.convert(rhs, ty);
        let value = if ty.is_float() {
            match op {
                Add => self.builder.binary(BinOp::FAdd, lhs, rhs),
                Sub => self.builder.binary(BinOp::FSub, lhs, rhs),
                Mul => self.builder.binary(BinOp::FMul, lhs, rhs),
                Div => self.builder.binary(BinOp::FDiv, lhs, rhs),
                Shl | Shr => return Err(span.wrap(Error::FloatShift)),
                Lt => self.builder.cmp(CmpPred::FOlt, lhs, rhs),
                Gt => self.builder.cmp(CmpPred::FOgt, lhs, rhs),
                Le => self.builder.cmp(CmpPred::FOle, lhs, rhs),
                Ge => self.builder.cmp(CmpPred::FOge, lhs, rhs),
                Eq => self.builder.cmp(CmpPred::FOeq, lhs, rhs),
            }
        } else {
            match op {
                Add => self.builder.binary(BinOp::Add, lhs, rhs),
                Sub => self.builder.binary(BinOp::Sub, lhs, rhs),
                Mul => self.builder.binary(BinOp::Mul, lhs, rhs),
                Div => self.builder.binary(BinOp::SDiv, lhs, rhs),
                Shl => self.builder.binary(BinOp::Shl, lhs, rhs),
                Shr => self.builder.binary(BinOp::AShr, lhs, rhs),
                Lt => self.builder.cmp(CmpPred::ISlt, lhs, rhs),
                Gt => self.builder.cmp(CmpPred::ISgt, lhs, rhs),
                Le => self.builder.cmp(CmpPred::ISle, lhs, rhs),
                Ge => self.builder.cmp(CmpPred::ISge, lhs, rhs),
                Eq => self.builder.cmp(CmpPred::IEq, lhs, rhs),
            }
        };
        Ok(value)
    }

    fn g_call(&mut self, span: Span, function: &Variable, args: &[Expr]) -> Result<Value> {
        let name = self.name(function.name);
        let Some(&id) = self.functions.get(&function.name) else {
            return Err(function.span.wrap(Error::UndefinedFunction(name.to_owned())));
        };
        let params: Vec<Type> = self
            .builder
            .module()
            .function(id)
            .params
            .iter()
            .map(|param| param.ty)
            .collect();
        if params.len() != args.len() {
            return Err(span.wrap(Error::ArgumentCount {
                function: name.to_owned(),
                expected: params.len(),
                found: args.len(),
            }));
        }

        let mut values = Vec::with_capacity(args.len());
        for (arg, &expected) in args.iter().zip(&params) {
            let value = self.g_expr(arg)?;
            let found = self.builder.type_of(value);
            let value = self.coerce(value, expected).ok_or_else(|| {
                arg.span.wrap(Error::ArgumentType {
                    function: name.to_owned(),
                    expected: source_name(expected),
                    found: source_name(found),
                })
            })?;
            values.push(value);
        }
        Ok(self.builder.call(id, values))
    }

    /// Turns a condition into an `i1`. Comparisons are used as they are,
    /// numbers are compared against zero.
    fn g_condition(&mut self, expr: &Expr) -> Result<Value> {
        let value = self.g_expr(expr)?;
        if self.builder.is_comparison(value) {
            return Ok(value);
        }
        let ty = self.builder.type_of(value);
        if ty.is_int() {
            Ok(self.builder.cmp(CmpPred::INe, value, zero(ty)))
        } else if ty.is_float() {
            Ok(self.builder.cmp(CmpPred::FUne, value, zero(ty)))
        } else {
            Err(expr.span.wrap(Error::Condition(source_name(ty))))
        }
    }

    // ============ Conversions ============

    /// Converts `value` to `to`. Fails for void values and for pointers,
    /// which only convert to their own type.
    fn coerce(&mut self, value: Value, to: Type) -> Option<Value> {
        let from = self.builder.type_of(value);
        if from == to {
            return Some(value);
        }
        if from.pointer || to.pointer || from.is_void() || to.is_void() {
            return None;
        }
        Some(self.convert(value, to))
    }

    /// Converts between numeric types.
    fn convert(&mut self, value: Value, to: Type) -> Value {
        let from = self.builder.type_of(value);
        if from == to {
            return value;
        }
        let op = match (from.is_float(), to.is_float()) {
            (false, false) if from.bits() < to.bits() => {
                if from == Type::I1 {
                    CastOp::ZExt
                } else {
                    CastOp::SExt
                }
            }
            (false, false) => CastOp::Trunc,
            (true, false) => CastOp::FpToSi,
            (false, true) if from == Type::I1 => CastOp::UiToFp,
            (false, true) => CastOp::SiToFp,
            (true, true) if from.bits() < to.bits() => CastOp::FpExt,
            (true, true) => CastOp::FpTrunc,
        };
        self.builder.cast(op, value, to)
    }
}

/// Utility functions.
impl<'ident, E: Env> Generator<'ident, E> {
    fn name(&self, symbol: Symbol) -> &'ident str {
        self.idents.get(symbol)
    }

    fn function_name(&self, function: &ast::Function) -> &'ident str {
        match &function.name {
            Some(var) => self.name(var.name),
            None => E::ENTRY_POINT,
        }
    }

    fn define(&mut self, var: &Variable, slot: SlotId) -> Result<()> {
        if self.scopes.define(var.name, slot) {
            Ok(())
        } else {
            Err(var.span.wrap(Error::Redefinition(self.name(var.name).to_owned())))
        }
    }

    /// Creates a block and attaches it after the existing ones.
    fn new_block(&mut self, label: &str) -> BlockId {
        let block = self.builder.create_block(label);
        self.builder.append_block(block);
        block
    }

    /// Moves on to a fresh block no edge leads to, after the current one was
    /// terminated by a return or an abort.
    fn continue_unreachable(&mut self, label: &str) {
        let block = self.new_block(label);
        self.builder.mark_unreachable(block);
        self.builder.switch_to(block);
    }

    /// Caches one format string per type and direction.
    fn format(&mut self, ty: Type, direction: Direction) -> Value {
        if let Some(&format) = self.formats.get(&(ty, direction)) {
            return format;
        }
        let format = self.builder.add_string("format", E::format(ty, direction));
        self.formats.insert((ty, direction), format);
        format
    }

    /// Lowers code in a nested scope frame.
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.enter();
        let res = f(self);
        self.scopes.leave();
        res
    }
}
