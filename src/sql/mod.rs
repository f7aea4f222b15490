//! SQL front end: lexer, parser and AST.

pub mod ast;
mod error;
mod lexer;
mod parser;
mod token;

pub use error::SyntaxError;
pub use parser::{parse, Parser};
