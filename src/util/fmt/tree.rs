use std::io::{self, Write};

use crate::{ast::*, util::intern::Interner};

const INDENT_WIDTH: usize = 2;

pub fn print_module_string(idents: &Interner, module: &Module) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_module(&mut buf, idents, module).expect("writing to a Vec never fails");
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn print_expr_string(idents: &Interner, expr: &Expr) -> String {
    let mut buf = Vec::with_capacity(512);
    print_expr(&mut buf, idents, 0, expr).expect("writing to a Vec never fails");
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn print_module(w: &mut impl Write, idents: &Interner, module: &Module) -> io::Result<()> {
    for function in module.all_functions() {
        print_function(w, idents, 0, function)?;
    }
    Ok(())
}

fn print_function(
    w: &mut impl Write,
    idents: &Interner,
    i: usize,
    function: &Function,
) -> io::Result<()> {
    sp(w, i)?;
    match &function.name {
        Some(name) => write!(w, "function {}", idents.get(name.name))?,
        None => write!(w, "main")?,
    }
    write!(w, " -> {}", function.return_ty)?;
    if function.body.is_empty() {
        write!(w, " (declared)")?;
    }
    writeln!(w)?;
    for param in &function.params {
        sp(w, i + 1)?;
        writeln!(w, "param {}: {}", idents.get(param.name.name), param.ty)?;
    }
    print_stmts(w, idents, i + 1, &function.body)
}

fn print_stmts(w: &mut impl Write, idents: &Interner, i: usize, stmts: &[Stmt]) -> io::Result<()> {
    for stmt in stmts {
        print_stmt(w, idents, i, stmt)?;
    }
    Ok(())
}

pub fn print_stmt(w: &mut impl Write, idents: &Interner, i: usize, stmt: &Stmt) -> io::Result<()> {
    sp(w, i)?;
    match &stmt.kind {
        StmtKind::Assert(condition) => {
            writeln!(w, "assert")?;
            print_expr(w, idents, i + 1, condition)?;
        }
        StmtKind::Input(var) => writeln!(w, "read {}", idents.get(var.name))?,
        StmtKind::Abort => writeln!(w, "abort")?,
        StmtKind::Expr(expr) => {
            writeln!(w, "expression")?;
            print_expr(w, idents, i + 1, expr)?;
        }
        StmtKind::Print(expr) => {
            writeln!(w, "print")?;
            print_expr(w, idents, i + 1, expr)?;
        }
        StmtKind::Assign { target, value } => {
            writeln!(w, "assign {}", idents.get(target.name))?;
            print_expr(w, idents, i + 1, value)?;
        }
        StmtKind::Vardecl { var, ty, init } => {
            write!(w, "var {}: {ty}", idents.get(var.name))?;
            if let Some(init) = init {
                writeln!(w, " (initialized)")?;
                print_expr(w, idents, i + 1, init)?;
            } else {
                writeln!(w)?;
            }
        }
        StmtKind::Loop { body, condition } => {
            writeln!(w, "do")?;
            print_stmts(w, idents, i + 1, body)?;
            sp(w, i)?;
            writeln!(w, "while")?;
            print_expr(w, idents, i + 1, condition)?;
        }
        StmtKind::Branch(branch) => {
            match &branch.lead.kind {
                ExprKind::Id(lead) => writeln!(w, "branch {}", idents.get(lead.name))?,
                _ => writeln!(w, "branch")?,
            }
            for case in &branch.cases {
                sp(w, i + 1)?;
                writeln!(w, "case")?;
                print_expr(w, idents, i + 2, &case.condition)?;
                sp(w, i + 2)?;
                writeln!(w, "then")?;
                print_stmts(w, idents, i + 3, &case.body)?;
            }
            if let Some(otherwise) = &branch.otherwise {
                sp(w, i + 1)?;
                writeln!(w, "otherwise")?;
                print_stmts(w, idents, i + 2, otherwise)?;
            }
        }
        StmtKind::Return(value) => {
            writeln!(w, "return")?;
            if let Some(value) = value {
                print_expr(w, idents, i + 1, value)?;
            }
        }
    }
    Ok(())
}

pub fn print_expr(w: &mut impl Write, idents: &Interner, i: usize, expr: &Expr) -> io::Result<()> {
    sp(w, i)?;
    let span = expr.span;
    match &expr.kind {
        ExprKind::Int(value) => writeln!(w, "int {value} ({span})")?,
        ExprKind::Float(value) => writeln!(w, "float {value} ({span})")?,
        ExprKind::Id(var) => writeln!(w, "ident {} ({span})", idents.get(var.name))?,
        ExprKind::Binary { op, lhs, rhs } => {
            let label = if expr.kind.is_semi() { "semi" } else { "binary" };
            writeln!(w, "{label} {op:?} ({span})")?;
            print_expr(w, idents, i + 1, lhs)?;
            print_expr(w, idents, i + 1, rhs)?;
        }
        ExprKind::Call { function, args } => {
            writeln!(w, "call {} ({span})", idents.get(function.name))?;
            for arg in args {
                print_expr(w, idents, i + 1, arg)?;
            }
        }
    }
    Ok(())
}

fn sp(w: &mut impl Write, i: usize) -> io::Result<()> {
    write!(w, "{:1$}", "", i * INDENT_WIDTH)
}
