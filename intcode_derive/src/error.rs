//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations.
//! Replacement for `thiserror` crate.
//!
//! # Usage
//!
//! ```ignore
//! use intcode_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MachineError {
//!     #[error("unknown opcode {0}")]
//!     UnknownOpcode(i64),
//!
//!     #[error("negative address {address}")]
//!     InvalidAddress { address: i64 },
//!
//!     #[error("machine {machine} faulted")]
//!     Fault { machine: usize, source: Fault },
//! }
//! ```
//!
//! # Supported Features
//!
//! - Unit variants: `#[error("message")]`
//! - Tuple variants with positional args: `#[error("error: {0}")]`
//! - Struct variants with named args: `#[error("expected {expected}")]`
//! - Fields that the message does not mention are allowed
//! - `Error::source` from a field named `source` or marked `#[source]`

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, Lit, Meta, parse_macro_input};

/// Derives `Display` and `Error` for an enum or struct.
///
/// Each variant must have an `#[error("...")]` attribute specifying
/// the display message. Supports field interpolation using `{0}`, `{1}`
/// for tuple fields or `{field_name}` for struct fields.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let (display_body, source_body) = match &input.data {
        Data::Enum(data_enum) => {
            let mut display_arms = Vec::new();
            let mut source_arms = Vec::new();

            for variant in &data_enum.variants {
                let variant_name = &variant.ident;
                let error_msg = extract_error_message_from_attrs(
                    &variant.attrs,
                    &variant.ident,
                    &format!("variant `{}`", variant.ident),
                )?;

                match &variant.fields {
                    Fields::Unit => {
                        display_arms.push(quote! {
                            Self::#variant_name => write!(f, #error_msg),
                        });
                    }
                    Fields::Unnamed(fields) => {
                        let count = fields.unnamed.len();
                        let format_str = convert_positional_to_named(&error_msg, count);
                        let bindings: Vec<_> = (0..count)
                            .map(|i| {
                                let ident = format_ident!("f{}", i);
                                if mentions(&format_str, &ident.to_string()) {
                                    quote!(#ident)
                                } else {
                                    quote!(_)
                                }
                            })
                            .collect();
                        let used: Vec<_> = (0..count)
                            .map(|i| format_ident!("f{}", i))
                            .filter(|ident| mentions(&format_str, &ident.to_string()))
                            .collect();
                        display_arms.push(quote! {
                            Self::#variant_name(#(#bindings),*) => write!(f, #format_str, #(#used = #used),*),
                        });

                        if let Some(index) = fields.unnamed.iter().position(is_source_field) {
                            let pattern: Vec<_> = (0..count)
                                .map(|i| if i == index { quote!(source) } else { quote!(_) })
                                .collect();
                            source_arms.push(quote! {
                                Self::#variant_name(#(#pattern),*) => Some(source),
                            });
                        }
                    }
                    Fields::Named(fields) => {
                        let used: Vec<_> = fields
                            .named
                            .iter()
                            .filter_map(|field| field.ident.as_ref())
                            .filter(|ident| mentions(&error_msg, &ident.to_string()))
                            .collect();
                        display_arms.push(quote! {
                            Self::#variant_name { #(#used,)* .. } => write!(f, #error_msg, #(#used = #used),*),
                        });

                        if let Some(field) = fields.named.iter().find(|f| is_source_field(f)) {
                            let ident = &field.ident;
                            source_arms.push(quote! {
                                Self::#variant_name { #ident: source, .. } => Some(source),
                            });
                        }
                    }
                }
            }

            let display_body = quote! {
                match self {
                    #(#display_arms)*
                }
            };
            let fallback = if source_arms.len() < data_enum.variants.len() {
                quote!(_ => None,)
            } else {
                quote!()
            };
            let source_body = if source_arms.is_empty() {
                quote!(None)
            } else {
                quote! {
                    match self {
                        #(#source_arms)*
                        #fallback
                    }
                }
            };
            (display_body, source_body)
        }
        Data::Struct(data_struct) => {
            let error_msg = extract_error_message_from_attrs(
                &input.attrs,
                &input.ident,
                &format!("type `{}`", input.ident),
            )?;

            match &data_struct.fields {
                Fields::Unit => (quote!(write!(f, #error_msg)), quote!(None)),
                Fields::Named(fields) => {
                    let used: Vec<_> = fields
                        .named
                        .iter()
                        .filter_map(|field| field.ident.as_ref())
                        .filter(|ident| mentions(&error_msg, &ident.to_string()))
                        .collect();
                    let source_body = match fields.named.iter().find(|f| is_source_field(f)) {
                        Some(field) => {
                            let ident = &field.ident;
                            quote!(Some(&self.#ident))
                        }
                        None => quote!(None),
                    };
                    (
                        quote!(write!(f, #error_msg, #(#used = self.#used),*)),
                        source_body,
                    )
                }
                Fields::Unnamed(fields) => {
                    let count = fields.unnamed.len();
                    let format_str = convert_positional_to_named(&error_msg, count);
                    let (idents, indices): (Vec<_>, Vec<_>) = (0..count)
                        .map(|i| (format_ident!("f{}", i), syn::Index::from(i)))
                        .filter(|(ident, _)| mentions(&format_str, &ident.to_string()))
                        .unzip();
                    let source_body = match fields.unnamed.iter().position(is_source_field) {
                        Some(index) => {
                            let index = syn::Index::from(index);
                            quote!(Some(&self.#index))
                        }
                        None => quote!(None),
                    };
                    (
                        quote!(write!(f, #format_str, #(#idents = self.#indices),*)),
                        source_body,
                    )
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {
            fn source(&self) -> Option<&(dyn ::std::error::Error + 'static)> {
                #source_body
            }
        }
    })
}

/// A field is the error source when it is named `source` or carries `#[source]`.
fn is_source_field(field: &Field) -> bool {
    field.attrs.iter().any(|attr| attr.path().is_ident("source"))
        || field.ident.as_ref().is_some_and(|ident| ident == "source")
}

/// Returns true if the format string interpolates `name` (`{name}` or `{name:...}`).
fn mentions(format_str: &str, name: &str) -> bool {
    format_str.contains(&format!("{{{}}}", name)) || format_str.contains(&format!("{{{}:", name))
}

/// Extracts the error message from attributes.
fn extract_error_message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if attr.path().is_ident("error") {
            if let Meta::List(meta_list) = &attr.meta {
                let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
                    syn::Error::new_spanned(
                        &attr.meta,
                        "failed to parse #[error] attribute; expected a string literal like #[error(\"unknown opcode: {0}\")]",
                    )
                })?;

                if let Lit::Str(lit_str) = lit {
                    return Ok(lit_str.value());
                }

                return Err(syn::Error::new_spanned(
                    &attr.meta,
                    "invalid #[error] attribute: message must be a string literal",
                ));
            }

            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        }
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {}; every error variant must declare a display message",
            target_desc
        ),
    ))
}

/// Converts positional format args `{0}`, `{1:?}` to named args `{f0}`, `{f1:?}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{}}}", i), &format!("{{f{}}}", i))
            .replace(&format!("{{{}:", i), &format!("{{f{}:", i));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_args_become_named() {
        assert_eq!(
            convert_positional_to_named("opcode {0} at {1:?}", 2),
            "opcode {f0} at {f1:?}"
        );
    }

    #[test]
    fn mentions_plain_and_formatted() {
        assert!(mentions("at pc {pc}", "pc"));
        assert!(mentions("value {value:>4}", "value"));
        assert!(!mentions("at pc {pcx}", "pc"));
    }
}
