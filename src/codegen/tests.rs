use crate::{
    ir::interp::Trap,
    util::test_utils::{run_program, tree_tests},
};

tree_tests!(
    use codegen;

    fn test_call_and_print() {
        let program = "
            function integer add with a: integer, b: integer;
              return a + b !
            main
              var x: integer = call add with 2, 3;
              x print
        ";
        let output = "5\n";
        let exit_code = 0;
    }

    fn test_entry_point_layout() {
        let program = "
            main
              var x: integer = 2
              x print
        ";
        let tree_ok = r#"
            ; module test.q
            @format.0 = constant "%ld\0A\00"

            declare i32 @printf(i8*, ...)

            declare i32 @scanf(i8*, ...)

            declare void @abort() noreturn

            define i64 @main() {
            entry.0:
              %result.0 = alloca i64
              store i64 0, i64* %result.0
              %x.1 = alloca i64
              store i64 2, i64* %x.1
              %0 = load i64, i64* %x.1
              %1 = call i32 @printf(i8* @format.0, i64 %0)
              br label %exit.1
            exit.1:
              %2 = load i64, i64* %result.0
              ret i64 %2
            }
        "#;
    }

    fn test_loop_body_runs_once_on_false_condition() {
        let program = "
            main
              var n: integer = 0
              do n print, n = n + 1 while 0
              n print
        ";
        let output = "
            0
            1
        ";
    }

    fn test_loop_counts() {
        let program = "
            main
              var i: integer = 0
              do i print, i = i + 1 while i < 3
        ";
        let output = "
            0
            1
            2
        ";
    }

    fn test_branch_takes_matching_case_only() {
        let program = "
            main
              var x: integer = 3
              branch x of 1: 10 print
              or 2: 20 print
              or 3: 30 print
              otherwise 40 print
              end
        ";
        let output = "30\n";
    }

    fn test_branch_without_match_or_otherwise() {
        let program = "
            main
              var x: integer = 9
              branch x of < 5: 1 print
              or == 7: 2 print
              end
              0 print
        ";
        let output = "0\n";
    }

    fn test_branch_otherwise() {
        let program = "
            main
              var x: double = 0.5
              branch x of > 1: 1 print
              otherwise 2 print
              end
        ";
        let output = "2\n";
    }

    fn test_case_scope_shadows_outer_variable() {
        let program = "
            main
              var x: integer = 1
              branch x of 1:
                var x: double = 2.5
                x print
              end
              x print
        ";
        let output = "
            2.500000
            1
        ";
    }

    fn test_assert_true_continues() {
        let program = "
            main
              assert 1 !
              assert 2 > 1 !
              7 print
        ";
        let output = "7\n";
        let exit_code = 0;
    }

    fn test_assert_false_aborts() {
        let program = "
            main
              1 print
              assert 0 !
              2 print
        ";
        let output = "1\n";
        let trap = Trap::Abort;
        let ir_contains = "
            assert.fail.3:
              call void @abort()
              unreachable
        ";
    }

    fn test_abort_makes_rest_unreachable() {
        let program = "
            main
              abort
              1 print
        ";
        let ir_contains = "abort.after.2:  ; unreachable";
        let trap = Trap::Abort;
    }

    fn test_return_sets_exit_code() {
        let program = "
            main
              return 7 !
              1 print
        ";
        let exit_code = 7;
        let output = "";
        let ir_contains = "return.after.2:  ; unreachable";
    }

    fn test_recursion() {
        let program = "
            function integer fact with n: integer;
              branch n of <= 1: return 1 !
              end
              return n * call fact with n - 1; !
            main
              call fact with 10; print
        ";
        let output = "3628800\n";
    }

    fn test_forward_references() {
        let program = "
            function bool even with n: integer;
              branch n of 0: return 1 !
              end
              return call odd with n - 1; !
            function bool odd with n: integer;
              branch n of 0: return 0 !
              end
              return call even with n - 1; !
            main
              call even with 10; print
              call odd with 10; print
        ";
        let output = "
            1
            0
        ";
    }

    fn test_function_after_entry_point() {
        let program = "
            main
              call twice with 21; print
            function integer twice with n: integer;
              return n * 2 !
        ";
        let output = "42\n";
    }

    fn test_return_value_is_converted() {
        let program = "
            function integer truncate with d: double;
              return d !
            main
              call truncate with 2.75; print
        ";
        let output = "2\n";
    }

    fn test_float_arithmetic() {
        let program = "
            main
              var f: float = 1.5
              f * 2 print
              7 / 2 print
              7.0 / 2 print
        ";
        let output = "
            3.000000
            3
            3.500000
        ";
    }

    fn test_integer_widening_and_shifts() {
        let program = "
            main
              var c: char = 100
              var n: integer = c
              c print
              n * 1000000000 print
              var one: integer = 1
              one << 40 print
              0 - 8 >> 1 print
        ";
        let output = "
            d
            100000000000
            1099511627776
            -4
        ";
    }

    fn test_pointer_equality() {
        let program = "
            main
              var p: *integer
              var q: *integer
              var same: bool = p == q
              same print
        ";
        let output = "1\n";
    }

    fn test_division_by_zero_traps() {
        let program = "
            main
              var z: integer = 0
              1 / z print
        ";
        let trap = Trap::DivisionByZero("main".to_owned());
    }

    fn test_redefinition_in_same_scope() {
        let program = "main\nvar x: integer\nvar x: char";
        let expected_errors = &["3:5: error: redefining an existing variable x."];
    }

    fn test_redefinition_reported_before_initializer() {
        let program = "main\nvar x: integer\nvar x: integer = y";
        let expected_errors = &["3:5: error: redefining an existing variable x."];
    }

    fn test_initializer_sees_shadowed_variable() {
        let program = "
            main
              var x: integer = 5
              branch x of 5:
                var x: integer = x + 1
                x print
              end
              x print
        ";
        let output = "
            6
            5
        ";
    }

    fn test_int_double_int_keeps_value() {
        let program = "
            main
              var i: integer = 7
              var d: double = i
              var j: integer = d
              j print
        ";
        let output = "7\n";
        let ir_contains = "sitofp";
    }

    fn test_parameter_redefinition() {
        let program = "function f with a: integer, a: char;\nabort";
        let expected_errors = &["1:29: error: redefining an existing variable a."];
    }

    fn test_undefined_variable() {
        let program = "main\ny print";
        let expected_errors = &["2:1: error: undefined variable y."];
    }

    fn test_assign_undefined() {
        let program = "main\nx = 1";
        let expected_errors = &["2:1: error: assigning to undefined variable x."];
    }

    fn test_read_undefined() {
        let program = "main\nread y";
        let expected_errors = &["2:6: error: reading an undefined variable y."];
    }

    fn test_undefined_function() {
        let program = "main\ncall f; print";
        let expected_errors = &["2:6: error: call to undefined function f."];
    }

    fn test_argument_count() {
        let program = "function integer f with a: integer;\nreturn a !\nmain\ncall f;";
        let expected_errors =
            &["4:1: error: wrong number of arguments in call to f: expected 1, found 0."];
    }

    fn test_argument_type() {
        let program = "function f with p: *char;\nabort\nmain\ncall f with 1;";
        let expected_errors = &[
            "4:13: error: cannot pass expression of type i32 as argument of type *char in call to f.",
        ];
    }

    fn test_reserved_function_name() {
        let program = "function integer printf;\nmain\nabort";
        let expected_errors = &["1:18: error: function name printf is reserved."];
    }

    fn test_function_redefinition() {
        let program = "function f;\nfunction f;\nmain\nabort";
        let expected_errors = &["2:10: error: redefining an existing function f."];
    }

    fn test_return_value_from_void() {
        let program = "function void f;\nreturn 1 !\nmain\nabort";
        let expected_errors = &["2:8: error: cannot return a value from a void function."];
    }

    fn test_void_variable() {
        let program = "main\nvar v: void";
        let expected_errors = &["2:5: error: cannot declare variable v of type void."];
    }

    fn test_initializer_type() {
        let program = "main\nvar p: *integer = 1";
        let expected_errors = &[
            "2:19: error: cannot initialize variable of type *integer with expression of type i32.",
        ];
    }

    fn test_pointer_arithmetic() {
        let program = "main\nvar p: *integer\nvar q: *integer\nvar b: bool = p + q";
        let expected_errors = &["4:15: error: pointer arithmetic is not supported."];
    }

    fn test_pointer_mixed_with_number() {
        let program = "main\nvar p: *integer\nvar n: integer = p + 1";
        let expected_errors = &["3:18: error: cannot mix pointer and non-pointer."];
    }

    fn test_float_shift() {
        let program = "main\nvar d: double = 1.5 << 2";
        let expected_errors = &["2:17: error: this operation cannot be applied to floats."];
    }

    fn test_pointer_condition() {
        let program = "main\nvar p: *integer\nassert p !";
        let expected_errors = &["3:8: error: cannot convert expression of type *integer to boolean."];
    }

    fn test_void_is_not_printable() {
        let program = "function f;\nabort\nmain\ncall f; print";
        let expected_errors =
            &["4:1: error: only integer and float valued expressions may be printed."];
    }

    fn test_loop_body_scope_ends_before_condition() {
        let program = "main\ndo var k: integer = 1 while k";
        let expected_errors = &["2:29: error: undefined variable k."];
    }
);

#[test]
fn reads_integers() {
    let (exit, output) = run_program("main\nvar n: integer\nread n\nn * 2 print", " 21\n");
    assert_eq!(exit, Ok(0));
    assert_eq!(output, "42\n");
}

#[test]
fn reads_booleans_through_an_int() {
    let (_, output) = run_program("main\nvar b: bool\nread b\nb print", "5");
    assert_eq!(output, "1\n");
    let (_, output) = run_program("main\nvar b: bool\nread b\nb print", "0");
    assert_eq!(output, "0\n");
}

#[test]
fn reads_characters_and_doubles() {
    let source = "main\nvar c: char\nvar d: double\nread c\nread d\nc print\nd print";
    let (_, output) = run_program(source, "  z 0.25");
    assert_eq!(output, "z\n0.250000\n");
}

#[test]
fn every_function_has_a_single_return() {
    let source = "
        function integer sign with n: integer;
          branch n of < 0: return 0 - 1 !
          or > 0: return 1 !
          end
          return 0 !
        main
          call sign with 0 - 5; print
    ";
    let module = crate::compile(source, "sign.q").unwrap();
    let text = module.to_string();
    let sign = text
        .split("define")
        .find(|f| f.contains("@sign"))
        .unwrap();
    assert_eq!(sign.matches("ret ").count(), 1);
    let (_, output) = crate::util::test_utils::execute(&module, "");
    assert_eq!(output, "-1\n");
}

#[test]
fn int_double_int_keeps_read_values() {
    let source = "main\nvar i: integer\nread i\nvar d: double = i\nvar j: integer = d\nj print";
    for value in ["123456789", "-42", "9007199254740992"] {
        let (exit, output) = run_program(source, value);
        assert_eq!(exit, Ok(0));
        assert_eq!(output, format!("{value}\n"));
    }
}

#[test]
fn same_type_coercion_emits_no_cast() {
    let source = "main\nvar a: integer\nread a\nvar b: integer = a\nb = a + b\nb print";
    let text = crate::compile(source, "same.q").unwrap().to_string();
    for cast in ["sext", "zext", "trunc", "sitofp", "uitofp", "fptosi", "fpext", "fptrunc"] {
        assert!(!text.contains(cast), "unexpected {cast} in:\n{text}");
    }
    let (_, output) = run_program(source, "21");
    assert_eq!(output, "42\n");
}
