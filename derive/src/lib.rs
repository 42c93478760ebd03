//! # COURIER DERIVE
//!
//! **`#[derive(Model)]` FOR RECORD STRUCTS**
//!
//! Generates the static type description and the `Value` conversions the
//! marshalling engine works from. Field metadata comes from
//! `#[courier(key = "value", ...)]`:
//!
//! - `in`, `name`, `mime`, `validate`, `default`, `json`, `xml` and any
//!   other key are copied verbatim into the field's tag map
//! - `err_msg` is stored under `errMsg`
//! - bare `embed` marks a field whose parameters are flattened into the parent
//!
//! Only `pub` fields are exported. `#[courier(post_validate)]` on the struct
//! routes `Model::post_validate` to the type's `PostValidate` impl.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{
    parse_macro_input, parse_quote, Attribute, Data, DeriveInput, Fields, GenericParam, LitStr,
    Visibility,
};

#[proc_macro_derive(Model, attributes(courier))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// ================================================================================================
// ATTRIBUTES
// ================================================================================================

#[derive(Default)]
struct FieldAttrs {
    tags: Vec<(String, String)>,
    embed: bool,
}

fn tag_key(raw: &str) -> String {
    let key = raw.strip_prefix("r#").unwrap_or(raw);
    match key {
        "err_msg" => "errMsg".to_string(),
        other => other.to_string(),
    }
}

fn field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut out = FieldAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("courier")) {
        attr.parse_nested_meta(|meta| {
            let ident = meta
                .path
                .get_ident()
                .ok_or_else(|| meta.error("expected a plain key"))?
                .to_string();
            if ident == "embed" {
                out.embed = true;
                return Ok(());
            }
            let value: LitStr = meta.value()?.parse()?;
            let key = tag_key(&ident);
            match out.tags.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value.value(),
                None => out.tags.push((key, value.value())),
            }
            Ok(())
        })?;
    }
    Ok(out)
}

fn wants_post_validate(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut enabled = false;
    for attr in attrs.iter().filter(|a| a.path().is_ident("courier")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("post_validate") {
                enabled = true;
                Ok(())
            } else {
                Err(meta.error("unknown container attribute"))
            }
        })?;
    }
    Ok(enabled)
}

// ================================================================================================
// EXPANSION
// ================================================================================================

fn expand(mut input: DeriveInput) -> syn::Result<TokenStream2> {
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named.named.iter().collect::<Vec<_>>(),
            Fields::Unit => Vec::new(),
            Fields::Unnamed(_) => {
                return Err(syn::Error::new(
                    Span::call_site(),
                    "Model can only be derived for structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new(
                Span::call_site(),
                "Model can only be derived for structs",
            ))
        }
    };

    let post_validate = wants_post_validate(&input.attrs)?;

    let mut infos = Vec::new();
    let mut to_values = Vec::new();
    let mut from_values = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let ident = field
            .ident
            .as_ref()
            .ok_or_else(|| syn::Error::new(Span::call_site(), "unnamed field"))?;
        let ty = &field.ty;
        let ident_str = ident.to_string();
        let ident_str = ident_str.strip_prefix("r#").unwrap_or(&ident_str).to_string();
        let exported = matches!(field.vis, Visibility::Public(_));
        let attrs = field_attrs(&field.attrs)?;
        let embedded = attrs.embed;
        let keys = attrs.tags.iter().map(|(k, _)| k);
        let values = attrs.tags.iter().map(|(_, v)| v);

        infos.push(quote! {
            ::courier::reflect::FieldInfo::new(
                #ident_str,
                #index,
                #exported,
                #embedded,
                ::courier::reflect::TagMap::from_pairs(&[#((#keys, #values)),*]),
                <#ty as ::courier::Model>::type_info,
            )
        });
        to_values.push(quote! {
            ::courier::Model::to_value(&self.#ident)
        });
        from_values.push(quote! {
            #ident: <#ty as ::courier::Model>::from_value(
                fields.next().unwrap_or(::courier::reflect::Value::Null),
            )
            .map_err(|e| ::courier::reflect::ValueError::Field {
                field: #ident_str,
                source: ::std::boxed::Box::new(e),
            })?
        });
    }

    for param in input.generics.params.iter_mut() {
        if let GenericParam::Type(ty) = param {
            ty.bounds.push(parse_quote!(::courier::Model));
        }
    }

    let name = &input.ident;
    let name_str = name.to_string();
    let count = fields.len();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let hook = if post_validate {
        quote! {
            fn post_validate(&self, errors: &mut ::courier::validation::BadRequest) {
                <Self as ::courier::PostValidate>::post_validate(self, errors)
            }
        }
    } else {
        quote! {}
    };

    Ok(quote! {
        impl #impl_generics ::courier::Model for #name #ty_generics #where_clause {
            fn type_info() -> ::courier::reflect::TypeInfo {
                ::courier::reflect::TypeInfo::structure::<Self>(
                    #name_str,
                    ::std::vec![#(#infos),*],
                )
            }

            fn to_value(&self) -> ::courier::reflect::Value {
                ::courier::reflect::Value::Struct(::std::vec![#(#to_values),*])
            }

            #[allow(unused_mut, unused_variables)]
            fn from_value(
                value: ::courier::reflect::Value,
            ) -> ::std::result::Result<Self, ::courier::reflect::ValueError> {
                let mut fields = value.into_fields(#count)?.into_iter();
                ::std::result::Result::Ok(Self { #(#from_values),* })
            }

            #hook
        }
    })
}
