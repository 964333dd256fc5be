mod assets;
mod to_value;

use proc_macro::TokenStream;

/// Embeds the templates matching a glob pattern (relative to the crate root)
/// and compiles them into `curly::ENGINE` before `main` runs.
///
/// Each template is named by its path relative to the pattern's literal
/// prefix, without extension: `templates!("views/**/*.hbs")` registers
/// `views/users/list.hbs` as `users/list`.
#[proc_macro]
pub fn templates(input: TokenStream) -> TokenStream {
    assets::templates_impl(input)
}

/// Implements `curly::ToValue` for a struct with named fields.
///
/// Field attributes: `#[value("name")]` or `#[value(rename = "name")]` to
/// change the key, `#[value(skip)]` to leave the field out.
#[proc_macro_derive(ToValue, attributes(value))]
pub fn derive_to_value(input: TokenStream) -> TokenStream {
    to_value::derive_to_value_impl(input)
}
