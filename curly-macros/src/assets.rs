use glob::glob;
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use syn::{LitStr, parse_macro_input};

pub fn templates_impl(input: TokenStream) -> TokenStream {
    let pattern = parse_macro_input!(input as LitStr);
    let pattern_str = pattern.value();

    // Patterns are relative to the crate being compiled.
    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") else {
        return syn::Error::new(pattern.span(), "CARGO_MANIFEST_DIR is not set")
            .to_compile_error()
            .into();
    };
    let root = PathBuf::from(manifest_dir);
    let full_pattern = root.join(&pattern_str);
    let base = root.join(literal_prefix(&pattern_str));

    let files: Vec<PathBuf> = match glob(&full_pattern.to_string_lossy()) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect(),
        Err(e) => {
            return syn::Error::new(pattern.span(), format!("Invalid glob pattern: {}", e))
                .to_compile_error()
                .into();
        }
    };

    // `include_str!` also makes cargo rebuild when a template changes.
    let assets: Vec<_> = files
        .iter()
        .map(|path| {
            let name = template_name(&base, path);
            let file = path.to_string_lossy().to_string();
            quote! {
                (#name, include_str!(#file))
            }
        })
        .collect();

    // Unique per pattern so the macro can be used several times in one scope.
    let mut hasher = DefaultHasher::new();
    pattern_str.hash(&mut hasher);
    let fn_name = format_ident!("__curly_register_templates_{}", hasher.finish());

    let output = quote! {
        #[::curly::ctor::ctor]
        fn #fn_name() {
            let assets: &[(&str, &str)] = &[
                #(#assets),*
            ];
            // Failures are logged by the registry; there is no caller to return them to.
            let _ = ::curly::ENGINE.compile_assets(assets);
        }
    };

    output.into()
}

/// The directory part of `pattern` before its first wildcard.
fn literal_prefix(pattern: &str) -> &str {
    let first_wildcard = pattern.find(['*', '?', '[', '{']).unwrap_or(pattern.len());
    match pattern[..first_wildcard].rfind('/') {
        Some(i) => &pattern[..i],
        None => "",
    }
}

/// `base/users/list.hbs` -> `users/list`.
fn template_name(base: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}
