use std::fmt::{self, Write};

use super::{BlockId, Function, InstKind, Module, SlotId, Terminator, Value};

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for (_, global) in self.globals() {
            writeln!(
                f,
                "@{} = constant \"{}\\00\"",
                global.name,
                escape(&global.text)
            )?;
        }
        for (_, func) in self.functions() {
            writeln!(f)?;
            print_function(f, self, func)?;
        }
        Ok(())
    }
}

fn print_function(f: &mut fmt::Formatter<'_>, module: &Module, func: &Function) -> fmt::Result {
    if func.is_declaration() {
        write!(f, "declare {} @{}(", func.ret, func.name)?;
        for (i, param) in func.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param.ty)?;
        }
        if func.variadic {
            f.write_str(", ...")?;
        }
        f.write_str(")")?;
        if func.no_return {
            f.write_str(" noreturn")?;
        }
        return writeln!(f);
    }

    write!(f, "define {} @{}(", func.ret, func.name)?;
    for (i, param) in func.params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{} %{}", param.ty, param.name)?;
    }
    writeln!(f, ") {{")?;

    let p = Printer { module, func };
    for (id, block) in func.blocks() {
        write!(f, "{}:", p.label(id))?;
        if block.unreachable {
            f.write_str("  ; unreachable")?;
        }
        writeln!(f)?;
        for inst in &block.insts {
            f.write_str("  ")?;
            if let Some(result) = inst.result {
                write!(f, "%{} = ", result.0)?;
            }
            p.inst(f, &inst.kind)?;
            writeln!(f)?;
        }
        if let Some(terminator) = &block.terminator {
            f.write_str("  ")?;
            p.terminator(f, terminator)?;
            writeln!(f)?;
        }
    }
    writeln!(f, "}}")
}

struct Printer<'a> {
    module: &'a Module,
    func: &'a Function,
}

impl Printer<'_> {
    fn label(&self, id: BlockId) -> String {
        format!("{}.{}", self.func.block(id).label, id.0)
    }

    fn slot(&self, id: SlotId) -> String {
        format!("%{}.{}", self.func.slot(id).name, id.0)
    }

    fn value(&self, value: Value) -> String {
        match value {
            Value::Inst(id) => format!("%{}", id.0),
            Value::Param(n) => format!("%{}", self.func.params[n as usize].name),
            Value::Int { value, .. } => value.to_string(),
            Value::Float { value, .. } => format!("{value:?}"),
            Value::Global(id) => format!("@{}", self.module.global(id).name),
            Value::SlotAddr(slot) => self.slot(slot),
            Value::Void => "void".to_owned(),
        }
    }

    /// A value preceded by its type.
    fn typed(&self, value: Value) -> String {
        format!("{} {}", self.func.type_of(value), self.value(value))
    }

    fn inst(&self, f: &mut fmt::Formatter<'_>, kind: &InstKind) -> fmt::Result {
        match kind {
            InstKind::Alloca { slot } => {
                let ty = self.func.slot(*slot).ty;
                write!(f, "{} = alloca {ty}", self.slot(*slot))
            }
            InstKind::Load { slot } => {
                let ty = self.func.slot(*slot).ty;
                write!(f, "load {ty}, {ty}* {}", self.slot(*slot))
            }
            InstKind::Store { slot, value } => {
                let ty = self.func.slot(*slot).ty;
                write!(f, "store {}, {ty}* {}", self.typed(*value), self.slot(*slot))
            }
            InstKind::Binary { op, lhs, rhs } => {
                write!(f, "{} {}, {}", op.name(), self.typed(*lhs), self.value(*rhs))
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                write!(f, "{} {}, {}", pred.name(), self.typed(*lhs), self.value(*rhs))
            }
            InstKind::Cast { op, value, to } => {
                write!(f, "{} {} to {to}", op.name(), self.typed(*value))
            }
            InstKind::Call { callee, args } => {
                let callee = self.module.function(*callee);
                write!(f, "call {} @{}(", callee.ret, callee.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&self.typed(*arg))?;
                }
                f.write_str(")")
            }
        }
    }

    fn terminator(&self, f: &mut fmt::Formatter<'_>, terminator: &Terminator) -> fmt::Result {
        match terminator {
            Terminator::Br(dest) => write!(f, "br label %{}", self.label(*dest)),
            Terminator::CondBr {
                cond,
                then_dest,
                else_dest,
            } => write!(
                f,
                "br {}, label %{}, label %{}",
                self.typed(*cond),
                self.label(*then_dest),
                self.label(*else_dest)
            ),
            Terminator::Ret(Some(value)) => write!(f, "ret {}", self.typed(*value)),
            Terminator::Ret(None) => f.write_str("ret void"),
            Terminator::Unreachable => f.write_str("unreachable"),
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        if (byte.is_ascii_graphic() || byte == b' ') && byte != b'"' && byte != b'\\' {
            out.push(byte as char);
        } else {
            let _ = write!(out, "\\{byte:02X}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Builder, Param, Type};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    #[test]
    fn prints_llvm_like_text() {
        let mut b = Builder::new("demo");
        let printf = b
            .declare_function(
                "printf",
                vec![Param {
                    name: "format".into(),
                    ty: Type::pointer_to(crate::ir::Prim::I8),
                }],
                Type::I32,
            )
            .unwrap();
        b.function_mut(printf).variadic = true;
        let format = b.add_string("format", "%ld\n");

        let params = vec![Param {
            name: "a".into(),
            ty: Type::I64,
        }];
        let f = b.declare_function("twice", params, Type::I64).unwrap();
        b.enter_function(f);
        let entry = b.create_block("entry");
        b.append_block(entry);
        b.switch_to(entry);
        let slot = b.alloca("a", Type::I64);
        b.store(slot, Value::Param(0));
        let a = b.load(slot);
        let sum = b.binary(BinOp::Add, a, a);
        b.call(printf, vec![format, sum]);
        b.ret(Some(sum));

        let expected = indoc! {r#"
            ; module demo
            @format.0 = constant "%ld\0A\00"

            declare i32 @printf(i8*, ...)

            define i64 @twice(i64 %a) {
            entry.0:
              %a.0 = alloca i64
              store i64 %a, i64* %a.0
              %0 = load i64, i64* %a.0
              %1 = add i64 %0, %0
              %2 = call i32 @printf(i8* @format.0, i64 %1)
              ret i64 %1
            }
        "#};
        assert_eq!(b.finish().to_string(), expected);
    }
}
