pub mod compiler;
pub mod error;
pub mod generate;
pub mod ir;
pub mod layout;
pub mod matrix;
pub mod output;
pub mod parser;
pub mod topology;
