//! Structural and type checks over built functions.

use super::{CastOp, FuncId, Function, InstKind, Module, Terminator, Type, Value};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("in function {function}: {message}")]
pub struct VerifyError {
    pub function: String,
    pub message: String,
}

/// Checks that every attached block ends in a terminator whose targets are
/// attached, that exactly one block returns, and that operand types agree.
pub fn verify_function(module: &Module, id: FuncId) -> Result<(), VerifyError> {
    let func = module.function(id);
    if func.is_declaration() {
        return Ok(());
    }
    let fail = |message: String| VerifyError {
        function: func.name.clone(),
        message,
    };

    let mut returns = 0;
    for (block_id, block) in func.blocks() {
        let label = &block.label;
        for inst in &block.insts {
            check_inst(module, func, &inst.kind).map_err(|m| fail(format!("{label}: {m}")))?;
        }
        let Some(terminator) = &block.terminator else {
            return Err(fail(format!("block {label}.{} has no terminator", block_id.0)));
        };
        for dest in terminator.successors() {
            if !func.is_attached(dest) {
                return Err(fail(format!("{label} branches to a detached block")));
            }
        }
        match terminator {
            Terminator::CondBr { cond, .. } => {
                let ty = operand(func, *cond).map_err(fail)?;
                if ty != Type::I1 {
                    return Err(fail(format!("{label}: branch condition has type {ty}")));
                }
            }
            Terminator::Ret(value) => {
                returns += 1;
                let ty = match value {
                    Some(value) => operand(func, *value).map_err(fail)?,
                    None => Type::VOID,
                };
                if ty != func.ret {
                    return Err(fail(format!("returns {ty}, declared {}", func.ret)));
                }
            }
            Terminator::Br(_) | Terminator::Unreachable => {}
        }
    }
    if returns != 1 {
        return Err(fail(format!("expected one return, found {returns}")));
    }
    Ok(())
}

fn operand(func: &Function, value: Value) -> Result<Type, String> {
    match value {
        Value::Void => Err("void value used as an operand".to_owned()),
        Value::Param(n) if n as usize >= func.params.len() => {
            Err(format!("parameter {n} out of range"))
        }
        Value::Inst(id) if id.index() >= func.value_count() => {
            Err(format!("value %{} is not defined", id.0))
        }
        Value::SlotAddr(slot) if slot.index() >= func.slot_count() => {
            Err(format!("slot {} is not defined", slot.0))
        }
        value => Ok(func.type_of(value)),
    }
}

fn check_inst(module: &Module, func: &Function, kind: &InstKind) -> Result<(), String> {
    match kind {
        InstKind::Alloca { .. } | InstKind::Load { .. } => Ok(()),
        InstKind::Store { slot, value } => {
            let ty = operand(func, *value)?;
            let slot_ty = func.slot(*slot).ty;
            if ty != slot_ty {
                return Err(format!("storing {ty} into slot of type {slot_ty}"));
            }
            Ok(())
        }
        InstKind::Binary { op, lhs, rhs } => {
            let (l, r) = (operand(func, *lhs)?, operand(func, *rhs)?);
            if l != r {
                return Err(format!("operands of {op:?} differ: {l} and {r}"));
            }
            let fits = if op.is_float() { l.is_float() } else { l.is_int() };
            if !fits {
                return Err(format!("{op:?} applied to {l}"));
            }
            Ok(())
        }
        InstKind::Cmp { pred, lhs, rhs } => {
            let (l, r) = (operand(func, *lhs)?, operand(func, *rhs)?);
            if l != r {
                return Err(format!("operands of {pred:?} differ: {l} and {r}"));
            }
            let fits = if pred.is_float() {
                l.is_float()
            } else {
                l.is_int() || l.pointer
            };
            if !fits {
                return Err(format!("{pred:?} applied to {l}"));
            }
            Ok(())
        }
        InstKind::Cast { op, value, to } => {
            let from = operand(func, *value)?;
            let legal = match op {
                CastOp::SExt | CastOp::ZExt => from.is_int() && to.is_int() && from.bits() < to.bits(),
                CastOp::Trunc => from.is_int() && to.is_int() && from.bits() > to.bits(),
                CastOp::FpToSi => from.is_float() && to.is_int(),
                CastOp::SiToFp | CastOp::UiToFp => from.is_int() && to.is_float(),
                CastOp::FpExt => from.is_float() && to.is_float() && from.bits() < to.bits(),
                CastOp::FpTrunc => from.is_float() && to.is_float() && from.bits() > to.bits(),
            };
            if !legal {
                return Err(format!("cannot {op:?} from {from} to {to}"));
            }
            Ok(())
        }
        InstKind::Call { callee, args } => {
            let callee = module.function(*callee);
            let fixed = callee.params.len();
            let arity_ok = if callee.variadic {
                args.len() >= fixed
            } else {
                args.len() == fixed
            };
            if !arity_ok {
                return Err(format!(
                    "call to {} with {} argument(s), expected {fixed}",
                    callee.name,
                    args.len()
                ));
            }
            for (i, arg) in args.iter().enumerate() {
                let ty = operand(func, *arg)?;
                if let Some(param) = callee.params.get(i) {
                    if param.ty != ty {
                        return Err(format!(
                            "argument {i} of call to {} has type {ty}, expected {}",
                            callee.name, param.ty
                        ));
                    }
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Builder, Param};

    fn function_with_entry(b: &mut Builder, ret: Type) -> FuncId {
        let f = b.declare_function("f", Vec::new(), ret).unwrap();
        b.enter_function(f);
        let entry = b.create_block("entry");
        b.append_block(entry);
        b.switch_to(entry);
        f
    }

    #[test]
    fn accepts_single_return() {
        let mut b = Builder::new("m");
        let f = function_with_entry(&mut b, Type::I32);
        b.ret(Some(Value::int(Type::I32, 0)));
        assert_eq!(verify_function(b.module(), f), Ok(()));
    }

    #[test]
    fn rejects_missing_terminator() {
        let mut b = Builder::new("m");
        let f = function_with_entry(&mut b, Type::VOID);
        let error = verify_function(b.module(), f).unwrap_err();
        assert_eq!(error.message, "block entry.0 has no terminator");
    }

    #[test]
    fn rejects_branch_to_detached_block() {
        let mut b = Builder::new("m");
        let f = function_with_entry(&mut b, Type::VOID);
        let exit = b.create_block("exit");
        b.br(exit);
        let error = verify_function(b.module(), f).unwrap_err();
        assert_eq!(error.message, "entry branches to a detached block");
    }

    #[test]
    fn rejects_two_returns() {
        let mut b = Builder::new("m");
        let f = function_with_entry(&mut b, Type::VOID);
        let other = b.create_block("other");
        b.br(other);
        b.append_block(other);
        b.switch_to(other);
        b.ret(None);
        let dead = b.create_block("dead");
        b.append_block(dead);
        b.switch_to(dead);
        b.ret(None);
        let error = verify_function(b.module(), f).unwrap_err();
        assert_eq!(error.message, "expected one return, found 2");
    }

    #[test]
    fn rejects_mixed_operands() {
        let mut b = Builder::new("m");
        let f = function_with_entry(&mut b, Type::VOID);
        b.binary(BinOp::Add, Value::int(Type::I32, 1), Value::int(Type::I64, 2));
        b.ret(None);
        let error = verify_function(b.module(), f).unwrap_err();
        assert_eq!(error.message, "entry: operands of Add differ: i32 and i64");
    }

    #[test]
    fn rejects_wrong_arity() {
        let mut b = Builder::new("m");
        let params = vec![Param {
            name: "x".into(),
            ty: Type::I64,
        }];
        let g = b.declare_function("g", params, Type::VOID).unwrap();
        let f = function_with_entry(&mut b, Type::VOID);
        b.call(g, Vec::new());
        b.ret(None);
        let error = verify_function(b.module(), f).unwrap_err();
        assert_eq!(error.message, "entry: call to g with 0 argument(s), expected 1");
    }
}
