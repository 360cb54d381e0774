//! Executes IR modules directly, emulating the small part of libc that
//! lowered programs call into (`printf`, `scanf` and `abort`).

use std::io::{self, BufRead, Write};

use log::trace;

use super::{
    BinOp, CastOp, CmpPred, FuncId, Function, GlobalId, InstKind, Module, Prim, SlotId,
    Terminator, Type, Value,
};

const MAX_CALL_DEPTH: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Trap {
    #[error("program aborted")]
    Abort,
    #[error("module has no main function")]
    NoEntryPoint,
    #[error("function {0} is declared but never defined")]
    MissingBody(String),
    #[error("division by zero in {0}")]
    DivisionByZero(String),
    #[error("reached unreachable code in {0}")]
    Unreachable(String),
    #[error("call stack exhausted")]
    StackOverflow,
    #[error("unsupported format string {0:?}")]
    Format(String),
    #[error("i/o error: {0}")]
    Io(String),
}

impl From<io::Error> for Trap {
    fn from(error: io::Error) -> Self {
        Trap::Io(error.to_string())
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Val {
    Int(i64),
    Float(f64),
    Ptr(Ptr),
    Void,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Ptr {
    Null,
    Global(GlobalId),
    Slot(SlotId),
}

impl Val {
    fn zero(ty: Type) -> Val {
        if ty.pointer {
            Val::Ptr(Ptr::Null)
        } else if ty.is_float() {
            Val::Float(0.0)
        } else {
            Val::Int(0)
        }
    }

    fn int(self) -> i64 {
        match self {
            Val::Int(v) => v,
            Val::Float(v) => v as i64,
            Val::Ptr(_) | Val::Void => 0,
        }
    }

    fn float(self) -> f64 {
        match self {
            Val::Float(v) => v,
            Val::Int(v) => v as f64,
            Val::Ptr(_) | Val::Void => 0.0,
        }
    }
}

/// Wraps `value` to the width of the integer type `ty`. Booleans are 0 or 1.
pub(super) fn wrap(ty: Type, value: i64) -> i64 {
    match ty.prim {
        Prim::I1 => value & 1,
        Prim::I8 => i64::from(value as i8),
        Prim::I32 => i64::from(value as i32),
        _ => value,
    }
}

/// Rounds `value` to the precision of the float type `ty`.
pub(super) fn round(ty: Type, value: f64) -> f64 {
    if ty.prim == Prim::F32 {
        f64::from(value as f32)
    } else {
        value
    }
}

/// The bits of `value` when read as an unsigned integer of type `ty`.
pub(super) fn unsigned(ty: Type, value: i64) -> u64 {
    match ty.bits() {
        bits @ 1..=63 => (value as u64) & ((1u64 << bits) - 1),
        _ => value as u64,
    }
}

struct Frame<'a> {
    func: &'a Function,
    args: &'a [Val],
    slots: Vec<Val>,
    values: Vec<Val>,
}

impl Frame<'_> {
    fn get(&self, value: Value) -> Val {
        match value {
            Value::Inst(id) => self.values[id.index()],
            Value::Param(n) => self.args[n as usize],
            Value::Int { value, .. } => Val::Int(value),
            Value::Float { value, .. } => Val::Float(value),
            Value::Global(id) => Val::Ptr(Ptr::Global(id)),
            Value::SlotAddr(slot) => Val::Ptr(Ptr::Slot(slot)),
            Value::Void => Val::Void,
        }
    }
}

/// Runs a lowered module against the provided standard streams.
pub struct Machine<'m, R, W> {
    module: &'m Module,
    input: R,
    output: W,
    depth: usize,
}

impl<'m, R: BufRead, W: Write> Machine<'m, R, W> {
    pub fn new(module: &'m Module, input: R, output: W) -> Machine<'m, R, W> {
        Machine {
            module,
            input,
            output,
            depth: 0,
        }
    }

    /// Calls `main` and returns its result, the program's exit code.
    pub fn run_main(&mut self) -> Result<i64, Trap> {
        let main = self.module.get_function("main").ok_or(Trap::NoEntryPoint)?;
        let result = self.call(main, &[]);
        self.output.flush()?;
        Ok(result?.int())
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn call(&mut self, id: FuncId, args: &[Val]) -> Result<Val, Trap> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(Trap::StackOverflow);
        }
        self.depth += 1;
        let result = self.run_function(id, args);
        self.depth -= 1;
        result
    }

    fn run_function(&mut self, id: FuncId, args: &[Val]) -> Result<Val, Trap> {
        let module = self.module;
        let func = module.function(id);
        let Some(mut block) = func.entry() else {
            return Err(Trap::MissingBody(func.name.clone()));
        };
        trace!("entering {}", func.name);
        let mut frame = Frame {
            func,
            args,
            slots: vec![Val::Void; func.slot_count()],
            values: vec![Val::Void; func.value_count()],
        };

        loop {
            let current = func.block(block);
            for inst in &current.insts {
                let result = self.exec(&mut frame, &inst.kind)?;
                if let Some(id) = inst.result {
                    frame.values[id.index()] = result;
                }
            }
            block = match &current.terminator {
                Some(Terminator::Br(dest)) => *dest,
                Some(Terminator::CondBr {
                    cond,
                    then_dest,
                    else_dest,
                }) => {
                    if frame.get(*cond).int() != 0 {
                        *then_dest
                    } else {
                        *else_dest
                    }
                }
                Some(Terminator::Ret(value)) => {
                    return Ok(value.map_or(Val::Void, |value| frame.get(value)));
                }
                Some(Terminator::Unreachable) | None => {
                    return Err(Trap::Unreachable(func.name.clone()));
                }
            };
        }
    }

    fn exec(&mut self, frame: &mut Frame<'_>, kind: &InstKind) -> Result<Val, Trap> {
        let func = frame.func;
        let result = match kind {
            InstKind::Alloca { slot } => {
                frame.slots[slot.index()] = Val::zero(func.slot(*slot).ty);
                Val::Void
            }
            InstKind::Load { slot } => frame.slots[slot.index()],
            InstKind::Store { slot, value } => {
                frame.slots[slot.index()] = frame.get(*value);
                Val::Void
            }
            InstKind::Binary { op, lhs, rhs } => {
                let ty = func.type_of(*lhs);
                binary(func, *op, ty, frame.get(*lhs), frame.get(*rhs))?
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                let (l, r) = (frame.get(*lhs), frame.get(*rhs));
                Val::Int(i64::from(compare(*pred, l, r)))
            }
            InstKind::Cast { op, value, to } => {
                let from = func.type_of(*value);
                cast(*op, from, *to, frame.get(*value))
            }
            InstKind::Call { callee, args } => {
                let args: Vec<Val> = args.iter().map(|arg| frame.get(*arg)).collect();
                let module = self.module;
                let target = module.function(*callee);
                if target.is_declaration() {
                    self.call_libc(frame, target, &args)?
                } else {
                    self.call(*callee, &args)?
                }
            }
        };
        Ok(result)
    }

    fn call_libc(&mut self, frame: &mut Frame<'_>, target: &Function, args: &[Val]) -> Result<Val, Trap> {
        match target.name.as_str() {
            "abort" => Err(Trap::Abort),
            "printf" => self.printf(args),
            "scanf" => self.scanf(frame, args),
            _ => Err(Trap::MissingBody(target.name.clone())),
        }
    }

    fn format_string(&self, arg: Option<&Val>) -> Result<&'m str, Trap> {
        let module = self.module;
        match arg {
            Some(Val::Ptr(Ptr::Global(id))) => Ok(&module.global(*id).text),
            other => Err(Trap::Format(format!("{other:?}"))),
        }
    }

    fn printf(&mut self, args: &[Val]) -> Result<Val, Trap> {
        let format = self.format_string(args.first())?;
        let mut rest = args.iter().skip(1);
        let mut out = Vec::new();
        let mut chars = format.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                let mut buf = [0; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                continue;
            }
            let spec = conversion(&mut chars).ok_or_else(|| Trap::Format(format.to_owned()))?;
            if spec == "%" {
                out.push(b'%');
                continue;
            }
            let arg = rest.next().ok_or_else(|| Trap::Format(format.to_owned()))?;
            match spec.as_str() {
                "d" => write!(out, "{}", arg.int() as i32)?,
                "ld" => write!(out, "{}", arg.int())?,
                "c" => out.push(arg.int() as u8),
                "f" | "lf" => write!(out, "{:.6}", arg.float())?,
                _ => return Err(Trap::Format(format.to_owned())),
            }
        }
        self.output.write_all(&out)?;
        Ok(Val::Int(out.len() as i64))
    }

    /// Reads whitespace separated words. A word that doesn't parse leaves
    /// the target untouched and stops the conversion, like libc does.
    fn scanf(&mut self, frame: &mut Frame<'_>, args: &[Val]) -> Result<Val, Trap> {
        let format = self.format_string(args.first())?;
        let mut targets = args.iter().skip(1);
        let mut converted = 0;
        let mut chars = format.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                continue;
            }
            let spec = conversion(&mut chars).ok_or_else(|| Trap::Format(format.to_owned()))?;
            let Some(Val::Ptr(Ptr::Slot(slot))) = targets.next() else {
                return Err(Trap::Format(format.to_owned()));
            };
            let ty = frame.func.slot(*slot).ty;
            let read = if spec == "c" {
                self.read_char()?.map(|byte| Val::Int(i64::from(byte as i8)))
            } else {
                let Some(word) = self.read_word()? else {
                    return Ok(Val::Int(if converted == 0 { -1 } else { converted }));
                };
                match spec.as_str() {
                    "d" | "ld" => word.parse::<i64>().ok().map(|v| Val::Int(wrap(ty, v))),
                    "f" | "lf" => word.parse::<f64>().ok().map(|v| Val::Float(round(ty, v))),
                    _ => return Err(Trap::Format(format.to_owned())),
                }
            };
            match read {
                Some(value) => {
                    frame.slots[slot.index()] = value;
                    converted += 1;
                }
                None => break,
            }
        }
        Ok(Val::Int(converted))
    }

    fn skip_whitespace(&mut self) -> Result<(), Trap> {
        loop {
            let buf = self.input.fill_buf()?;
            let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
            let done = skip < buf.len() || buf.is_empty();
            self.input.consume(skip);
            if done {
                return Ok(());
            }
        }
    }

    fn read_char(&mut self) -> Result<Option<u8>, Trap> {
        self.skip_whitespace()?;
        let byte = self.input.fill_buf()?.first().copied();
        if byte.is_some() {
            self.input.consume(1);
        }
        Ok(byte)
    }

    fn read_word(&mut self) -> Result<Option<String>, Trap> {
        self.skip_whitespace()?;
        let mut word = Vec::new();
        loop {
            let buf = self.input.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            let take = buf.iter().take_while(|b| !b.is_ascii_whitespace()).count();
            word.extend_from_slice(&buf[..take]);
            let done = take < buf.len();
            self.input.consume(take);
            if done {
                break;
            }
        }
        if word.is_empty() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&word).into_owned()))
    }
}

/// Reads a conversion specification, right after a `%`.
fn conversion(chars: &mut std::str::Chars<'_>) -> Option<String> {
    let mut spec = String::new();
    for c in chars.by_ref() {
        spec.push(c);
        if c != 'l' {
            return Some(spec);
        }
    }
    None
}

fn binary(func: &Function, op: BinOp, ty: Type, l: Val, r: Val) -> Result<Val, Trap> {
    let int = |v: i64| Ok(Val::Int(wrap(ty, v)));
    let float = |v: f64| Ok(Val::Float(round(ty, v)));
    match op {
        BinOp::Add => int(l.int().wrapping_add(r.int())),
        BinOp::Sub => int(l.int().wrapping_sub(r.int())),
        BinOp::Mul => int(l.int().wrapping_mul(r.int())),
        BinOp::SDiv => match r.int() {
            0 => Err(Trap::DivisionByZero(func.name.clone())),
            divisor => int(l.int().wrapping_div(divisor)),
        },
        BinOp::Shl => int(l.int().wrapping_shl(r.int() as u32)),
        BinOp::AShr => int(l.int().wrapping_shr(r.int() as u32)),
        BinOp::FAdd => float(l.float() + r.float()),
        BinOp::FSub => float(l.float() - r.float()),
        BinOp::FMul => float(l.float() * r.float()),
        BinOp::FDiv => float(l.float() / r.float()),
    }
}

fn compare(pred: CmpPred, l: Val, r: Val) -> bool {
    use CmpPred::*;
    if let (Val::Ptr(l), Val::Ptr(r)) = (l, r) {
        return match pred {
            INe => l != r,
            _ => l == r,
        };
    }
    let (a, b) = (l.float(), r.float());
    match pred {
        IEq => l.int() == r.int(),
        INe => l.int() != r.int(),
        ISlt => l.int() < r.int(),
        ISgt => l.int() > r.int(),
        ISle => l.int() <= r.int(),
        ISge => l.int() >= r.int(),
        FOeq => a == b,
        FUne => a != b,
        FOlt => a < b,
        FOgt => a > b,
        FOle => a <= b,
        FOge => a >= b,
    }
}

fn cast(op: CastOp, from: Type, to: Type, value: Val) -> Val {
    match op {
        CastOp::SExt | CastOp::Trunc => Val::Int(wrap(to, value.int())),
        CastOp::ZExt => Val::Int(wrap(to, unsigned(from, value.int()) as i64)),
        CastOp::FpToSi => Val::Int(wrap(to, value.float() as i64)),
        CastOp::SiToFp => Val::Float(round(to, value.int() as f64)),
        CastOp::UiToFp => Val::Float(round(to, unsigned(from, value.int()) as f64)),
        CastOp::FpExt | CastOp::FpTrunc => Val::Float(round(to, value.float())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Param};

    fn declare_libc(b: &mut Builder) -> (FuncId, FuncId) {
        let format = || {
            vec![Param {
                name: "format".into(),
                ty: Type::pointer_to(Prim::I8),
            }]
        };
        let printf = b.declare_function("printf", format(), Type::I32).unwrap();
        b.function_mut(printf).variadic = true;
        let scanf = b.declare_function("scanf", format(), Type::I32).unwrap();
        b.function_mut(scanf).variadic = true;
        (printf, scanf)
    }

    fn start_main(b: &mut Builder) {
        let main = b.declare_function("main", Vec::new(), Type::I64).unwrap();
        b.enter_function(main);
        let entry = b.create_block("entry");
        b.append_block(entry);
        b.switch_to(entry);
    }

    fn run(module: &Module, input: &str) -> (Result<i64, Trap>, String) {
        let mut machine = Machine::new(module, input.as_bytes(), Vec::new());
        let result = machine.run_main();
        let output = String::from_utf8(machine.into_output()).unwrap();
        (result, output)
    }

    #[test]
    fn prints_formatted_values() {
        let mut b = Builder::new("m");
        let (printf, _) = declare_libc(&mut b);
        let int = b.add_string("format", "%d|%ld|%c|%lf\n");
        start_main(&mut b);
        b.call(
            printf,
            vec![
                int,
                Value::int(Type::I32, -7),
                Value::int(Type::I64, 1 << 40),
                Value::int(Type::I32, 65),
                Value::float(Type::F64, 2.5),
            ],
        );
        b.ret(Some(Value::int(Type::I64, 3)));
        let (result, output) = run(&b.finish(), "");
        assert_eq!(result, Ok(3));
        assert_eq!(output, "-7|1099511627776|A|2.500000\n");
    }

    #[test]
    fn scans_into_slots() {
        let mut b = Builder::new("m");
        let (_, scanf) = declare_libc(&mut b);
        let format = b.add_string("format", "%ld");
        start_main(&mut b);
        let slot = b.alloca("x", Type::I64);
        b.call(scanf, vec![format, Value::SlotAddr(slot)]);
        let x = b.load(slot);
        let doubled = b.binary(BinOp::Add, x, x);
        b.ret(Some(doubled));
        assert_eq!(run(&b.finish(), "  21\n").0, Ok(42));
    }

    #[test]
    fn integer_arithmetic_wraps_to_width() {
        let mut b = Builder::new("m");
        start_main(&mut b);
        let sum = b.binary(BinOp::Add, Value::int(Type::I8, 127), Value::int(Type::I8, 1));
        let wide = b.cast(CastOp::SExt, sum, Type::I64);
        b.ret(Some(wide));
        assert_eq!(run(&b.finish(), "").0, Ok(-128));
    }

    #[test]
    fn division_by_zero_traps() {
        let mut b = Builder::new("m");
        start_main(&mut b);
        let q = b.binary(BinOp::SDiv, Value::int(Type::I64, 1), Value::int(Type::I64, 0));
        b.ret(Some(q));
        assert_eq!(
            run(&b.finish(), "").0,
            Err(Trap::DivisionByZero("main".into()))
        );
    }

    #[test]
    fn missing_main() {
        let module = Builder::new("m").finish();
        assert_eq!(run(&module, "").0, Err(Trap::NoEntryPoint));
    }

    #[test]
    fn zero_extension_of_booleans() {
        assert_eq!(cast(CastOp::ZExt, Type::I1, Type::I32, Val::Int(1)), Val::Int(1));
        assert_eq!(cast(CastOp::ZExt, Type::I8, Type::I32, Val::Int(-1)), Val::Int(255));
        assert_eq!(
            cast(CastOp::UiToFp, Type::I1, Type::F64, Val::Int(1)),
            Val::Float(1.0)
        );
    }
}
