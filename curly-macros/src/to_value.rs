use proc_macro::TokenStream;
use quote::quote;
use syn::{DeriveInput, Field, LitStr, parse_macro_input, parse_quote};

pub fn derive_to_value_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(mut input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = input.ident.clone();

    let fields = match &input.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(fields) => fields.named.clone(),
            _ => {
                return Err(syn::Error::new_spanned(
                    &name,
                    "ToValue only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(&name, "ToValue only supports structs"));
        }
    };

    let mut inserts = Vec::with_capacity(fields.len());
    for field in &fields {
        let Some(ident) = &field.ident else {
            continue;
        };
        let attrs = parse_field_attrs(field)?;
        if attrs.skip {
            continue;
        }
        let key = LitStr::new(
            &attrs.key.unwrap_or_else(|| ident.to_string()),
            ident.span(),
        );
        inserts.push(quote! {
            map.insert(#key.to_string(), ::curly::ToValue::to_value(&self.#ident));
        });
    }
    let capacity = inserts.len();

    // Every type parameter must itself convert.
    let type_params: Vec<_> = input.generics.type_params().map(|p| p.ident.clone()).collect();
    let where_clause = input.generics.make_where_clause();
    for param in type_params {
        where_clause
            .predicates
            .push(parse_quote!(#param: ::curly::ToValue));
    }
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::curly::ToValue for #name #ty_generics #where_clause {
            fn to_value(&self) -> ::curly::Value {
                let mut map = ::curly::Map::with_capacity(#capacity);
                #(#inserts)*
                ::curly::Value::Map(map)
            }
        }
    })
}

#[derive(Default)]
struct FieldAttrs {
    key: Option<String>,
    skip: bool,
}

/// Reads `#[value("name")]`, `#[value(rename = "name")]` and `#[value(skip)]`.
fn parse_field_attrs(field: &Field) -> syn::Result<FieldAttrs> {
    let mut attrs = FieldAttrs::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("value") {
            continue;
        }
        if let Ok(s) = attr.parse_args::<LitStr>() {
            attrs.key = Some(s.value());
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("skip") {
                attrs.skip = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let s: LitStr = meta.value()?.parse()?;
                attrs.key = Some(s.value());
                Ok(())
            } else {
                Err(meta.error("expected `skip` or `rename = \"...\"`"))
            }
        })?;
    }
    Ok(attrs)
}
