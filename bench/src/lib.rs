use std::fmt::Write;

/// Builds a program with `functions` copies of a small recursive function,
/// followed by an entry point that calls each of them.
pub fn synthetic_program(functions: usize) -> String {
    let mut src = String::new();
    for i in 0..functions {
        _ = write!(
            src,
            "\
function integer f{i} with n: integer, scale: double;
  var acc: integer = 0
  do
    acc = acc + n * 3 << 1,
    n = n - 1
  while n > 0
  branch acc of < 100: return acc !
  or == 100: return 0 !
  otherwise
    assert scale >= 0.5 !
  end
  return acc / 2 !
"
        );
    }
    src.push_str("main\n");
    for i in 0..functions {
        _ = writeln!(src, "  call f{i} with {i}, 1.25; print");
    }
    src
}
