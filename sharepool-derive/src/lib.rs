//! # Sharepool Derive Macros
//!
//! This crate provides `#[derive(Persist)]` for `sharepool`. The generated impl writes a
//! struct as a JSON object keyed by field name, routes every field through its own
//! `Persist` impl (so nested containers go to their pools) and reports the field types to
//! type discovery.
//!
//! Compatible with `syn 2.0`.

use proc_macro::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, LitStr, parse_macro_input, parse_quote};

/// Derives `sharepool::Persist` for a struct with named fields.
///
/// Field attributes:
/// - `#[persist(inline)]`: write the field with plain serde, bypassing the pools. Types
///   reachable only through inline fields are not discovered.
/// - `#[persist(rename = "name")]`: use `name` as the object key and discovery name.
#[proc_macro_derive(Persist, attributes(persist))]
pub fn derive_persist(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(ds) => match &ds.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return syn::Error::new(
                    name.span(),
                    "Persist only supports structs with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(name.span(), "Persist only supports structs")
                .to_compile_error()
                .into();
        }
    };

    let mut parsed = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            continue;
        };
        let options = match parse_attributes(&field.attrs) {
            Ok(res) => res,
            Err(e) => return e.to_compile_error().into(),
        };
        let key = options.rename.unwrap_or_else(|| ident.to_string());
        parsed.push(PersistField {
            ident,
            ty: field.ty.clone(),
            key,
            inline: options.inline,
        });
    }

    let mut generics = input.generics.clone();
    for param in generics.type_params_mut() {
        param.bounds.push(parse_quote!(::sharepool::Persist));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let save = generate_save(&parsed);
    let load = generate_load(name, &parsed);
    let members = generate_members(&parsed);

    let expanded = quote! {
        impl #impl_generics ::sharepool::Persist for #name #ty_generics #where_clause {
            #save
            #load
            #members
        }
    };

    TokenStream::from(expanded)
}

// --- Internal Data Structures ---

struct PersistField {
    ident: syn::Ident,
    ty: syn::Type,
    key: String,
    inline: bool,
}

#[derive(Default)]
struct FieldOptions {
    inline: bool,
    rename: Option<String>,
}

fn parse_attributes(attrs: &[Attribute]) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in attrs {
        if attr.path().is_ident("persist") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("inline") {
                    options.inline = true;
                    return Ok(());
                }

                if meta.path.is_ident("rename") {
                    let value = meta.value()?;
                    let s: LitStr = value.parse()?;
                    options.rename = Some(s.value());
                    return Ok(());
                }
                Err(meta.error("Unknown persist attribute key. Supported: inline, rename"))
            })?;
        }
    }
    Ok(options)
}

// --- Generator: save ---

fn generate_save(fields: &[PersistField]) -> proc_macro2::TokenStream {
    let inserts = fields.iter().map(|f| {
        let ident = &f.ident;
        let key = &f.key;
        let value = if f.inline {
            quote! { ::sharepool::rt::save_inline(&self.#ident)? }
        } else {
            quote! { ::sharepool::Persist::save(&self.#ident, pools)? }
        };
        quote! { object.insert(::std::string::String::from(#key), #value); }
    });

    quote! {
        #[allow(unused_variables)]
        fn save(
            &self,
            pools: &mut ::sharepool::OutputPools,
        ) -> ::sharepool::Result<::sharepool::internal::serde_json::Value> {
            let mut object = ::sharepool::internal::serde_json::Map::new();
            #(#inserts)*
            ::std::result::Result::Ok(::sharepool::internal::serde_json::Value::Object(object))
        }
    }
}

// --- Generator: load ---

fn generate_load(name: &syn::Ident, fields: &[PersistField]) -> proc_macro2::TokenStream {
    let owner = name.to_string();
    let inits = fields.iter().map(|f| {
        let ident = &f.ident;
        let ty = &f.ty;
        let key = &f.key;
        let raw = quote! { ::sharepool::rt::field(node, #key, #owner)? };
        if f.inline {
            quote! { #ident: ::sharepool::rt::load_inline::<#ty>(#raw)? }
        } else {
            quote! { #ident: <#ty as ::sharepool::Persist>::load(#raw, pools)? }
        }
    });

    quote! {
        #[allow(unused_variables)]
        fn load(
            node: &::sharepool::internal::serde_json::Value,
            pools: &mut ::sharepool::InputPools,
        ) -> ::sharepool::Result<Self> {
            ::std::result::Result::Ok(Self {
                #(#inits,)*
            })
        }
    }
}

// --- Generator: members ---

fn generate_members(fields: &[PersistField]) -> proc_macro2::TokenStream {
    let entries = fields.iter().filter(|f| !f.inline).map(|f| {
        let ty = &f.ty;
        let key = &f.key;
        quote! { members.field::<#ty>(#key); }
    });

    quote! {
        #[allow(unused_variables)]
        fn members(members: &mut ::sharepool::Members) {
            #(#entries)*
        }
    }
}
