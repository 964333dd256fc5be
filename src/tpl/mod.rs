pub mod ast;
pub mod helpers;
pub mod lexer;
pub mod parser;
pub mod path;
mod render;
pub mod render_context;
pub mod template;
