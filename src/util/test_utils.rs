use crate::{
    codegen,
    ir::{
        self,
        interp::{Machine, Trap},
    },
    parser,
    util::{
        fmt::{tree, Diagnostic},
        intern::Interner,
    },
};

/// Each variant contains the input.
pub enum Test {
    ParserProgram(&'static str),
    ParserExpr(&'static str),
    Codegen(&'static str),
}

pub enum Assertion {
    TreeOk(&'static str),
    ExpectedErrors(&'static [&'static str]),
    IrContains(&'static str),
    Output(&'static str),
    ExitCode(i64),
    Trap(Trap),
}

/// What running a test produced. For codegen tests, the tree is the printed
/// IR.
#[derive(Default)]
pub struct Outcome {
    pub tree: String,
    pub errors: Vec<String>,
    pub output: String,
    pub exit: Option<Result<i64, Trap>>,
}

impl Outcome {
    fn failed(error: impl Into<Diagnostic>) -> Outcome {
        Outcome {
            errors: vec![error.into().to_string()],
            ..Outcome::default()
        }
    }
}

/// Runs the `main` of `module`, feeding it `input`.
pub fn execute(module: &ir::Module, input: &str) -> (Result<i64, Trap>, String) {
    let mut machine = Machine::new(module, input.as_bytes(), Vec::new());
    let exit = machine.run_main();
    let output = String::from_utf8_lossy(&machine.into_output()).into_owned();
    (exit, output)
}

/// Compiles and runs `source`. Panics on compilation errors.
#[track_caller]
pub fn run_program(source: &str, input: &str) -> (Result<i64, Trap>, String) {
    let module = crate::compile(source, "test.q").unwrap_or_else(|d| panic!("{d}"));
    execute(&module, input)
}

#[track_caller]
pub fn run_pipeline(test: Test) -> Outcome {
    let interner = &mut Interner::with_capacity(128);

    match test {
        Test::ParserProgram(input) => {
            match parser::parse_module(input.as_bytes(), "test.q", interner) {
                Ok(module) => Outcome {
                    tree: tree::print_module_string(interner, &module),
                    ..Outcome::default()
                },
                Err(error) => Outcome::failed(error),
            }
        }
        Test::ParserExpr(input) => match parser::parse_expr(input.as_bytes(), interner) {
            Ok(expr) => Outcome {
                tree: tree::print_expr_string(interner, &expr),
                ..Outcome::default()
            },
            Err(error) => Outcome::failed(error),
        },
        Test::Codegen(input) => {
            let module = match parser::parse_module(input.as_bytes(), "test.q", interner) {
                Ok(module) => module,
                Err(error) => return Outcome::failed(error),
            };
            match codegen::generate(&module, interner) {
                Ok(ir) => {
                    let (exit, output) = execute(&ir, "");
                    Outcome {
                        tree: ir.to_string(),
                        errors: Vec::new(),
                        output,
                        exit: Some(exit),
                    }
                }
                Err(error) => Outcome::failed(error),
            }
        }
    }
}

#[track_caller]
pub fn run_assertion(assertion: Assertion, actual: &Outcome) {
    match assertion {
        Assertion::TreeOk(expected_tree) => {
            let expected_errors: &[&str] = &[];
            ::pretty_assertions::assert_eq!(actual.errors, expected_errors);
            ::pretty_assertions::assert_eq!(actual.tree.trim(), expected_tree.trim());
        }
        Assertion::ExpectedErrors(expected_errors) => {
            ::pretty_assertions::assert_eq!(actual.errors, expected_errors);
        }
        Assertion::IrContains(expected) => {
            assert!(
                actual.tree.contains(expected.trim()),
                "IR does not contain:\n{expected}\nIR:\n{}",
                actual.tree
            );
        }
        Assertion::Output(expected) => {
            ::pretty_assertions::assert_eq!(actual.output, expected);
        }
        Assertion::ExitCode(expected) => {
            ::pretty_assertions::assert_eq!(actual.exit, Some(Ok(expected)));
        }
        Assertion::Trap(expected) => {
            ::pretty_assertions::assert_eq!(actual.exit, Some(Err(expected)));
        }
    }
}

macro_rules! tree_tests {
    (
        use $test_kind:ident;

        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    tree_tests!(@@get_test($test_kind, $source_kind), $source);
                let outcome = crate::util::test_utils::run_pipeline(test);
                tree_tests!(@@expand_assertions, &outcome, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $outcome:expr, []) => {};
    (@@expand_assertions, $outcome:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            tree_tests!(@@assertion, $assertion, $assertion_expected),
            $outcome,
        );
        tree_tests!(@@expand_assertions, $outcome, [$($rest_assertions_tt)*]);
    };

    (@@assertion, tree_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::TreeOk(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_errors, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedErrors($expected)
    };
    (@@assertion, ir_contains, $expected:expr) => {
        crate::util::test_utils::Assertion::IrContains(::indoc::indoc! { $expected })
    };
    (@@assertion, output, $expected:expr) => {
        crate::util::test_utils::Assertion::Output(::indoc::indoc! { $expected })
    };
    (@@assertion, exit_code, $expected:expr) => {
        crate::util::test_utils::Assertion::ExitCode($expected)
    };
    (@@assertion, trap, $expected:expr) => {
        crate::util::test_utils::Assertion::Trap($expected)
    };

    (@@get_test(parser, program), $source:expr) => {
        crate::util::test_utils::Test::ParserProgram(::indoc::indoc! { $source })
    };
    (@@get_test(parser, expr), $source:expr) => {
        crate::util::test_utils::Test::ParserExpr(::indoc::indoc! { $source })
    };
    (@@get_test(codegen, program), $source:expr) => {
        crate::util::test_utils::Test::Codegen(::indoc::indoc! { $source })
    };
}
pub(crate) use tree_tests;
