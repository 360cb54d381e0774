pub mod error;
pub mod tree;

pub use error::Diagnostic;
