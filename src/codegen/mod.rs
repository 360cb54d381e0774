mod generator;
mod interface;
mod runtime;
mod scope;

#[cfg(test)]
mod tests;

pub use interface::{generate, Error};
pub use runtime::{Direction, Env, Libc};
