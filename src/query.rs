pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{Agg, AggFunc, CmpOp, Expr, Literal, Query, Sort, SortDir};
pub use parser::parse_query;
