//! Derive macros for the intcode crate.
//!
//! Provides:
//! - `#[derive(Error)]` - error type boilerplate (thiserror replacement)

mod error;

use proc_macro::TokenStream;

/// Automatically implements `Display` and `Error` traits for error types.
///
/// A field named `source`, or any field marked `#[source]`, is returned from
/// `Error::source`.
#[proc_macro_derive(Error, attributes(error, source))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
