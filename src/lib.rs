pub mod config;
pub mod error;
pub mod registry;
pub mod tpl;
pub mod value;

#[doc(hidden)]
pub use ctor;
pub use curly_macros::{ToValue, templates};

pub use config::{RenderConfig, UnknownBlock};
pub use error::{Error, RenderError, SyntaxError, SyntaxErrorKind};
pub use registry::{ENGINE, EscapeFn, Registry, Renderer, compile, render};
pub use tpl::helpers::{Builtin, Helper, HelperDef, html_escape, no_escape};
pub use tpl::lexer::Position;
pub use tpl::render_context::{Frame, RenderContext};
pub use tpl::template::Template;
pub use value::{Map, ToValue, Value, to_value};

pub type Result<T> = std::result::Result<T, Error>;
