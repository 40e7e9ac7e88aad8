//! # typed-rpc derive macros
//!
//! Procedural macros that let plain parameter and result structs take part
//! in schema reflection and parameter validation.
//!
//! - `#[derive(Describe)]` - describe a type's wire shape for the schema
//! - `#[derive(Validate)]` - check `#[rpc(validate = "required")]` fields
//!
//! Both read `#[serde(rename = "...")]`, `#[serde(rename_all = "...")]` and
//! `#[serde(skip)]` so the described field names match the wire names.
//!
//! ```rust,ignore
//! use serde::Deserialize;
//! use typed_rpc_server::{Describe, Validate};
//!
//! #[derive(Deserialize, Describe, Validate)]
//! #[serde(rename_all = "camelCase")]
//! struct CreateUser {
//!     #[rpc(validate = "required")]
//!     user_name: String,
//!     #[rpc(nested)]
//!     address: Address,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod describe;
mod utils;
mod validate;

/// Derive `typed_rpc_server::schema::Describe`
///
/// # Attributes
///
/// - `#[rpc(kind = "string")]` - describe the type by a fixed wire kind
///   instead of its fields
/// - `#[rpc(validate = "required,min=1")]` - rule tokens recorded on the field
///
/// Named structs become records, newtypes are transparent and enums with
/// only unit variants are described as strings.
#[proc_macro_derive(Describe, attributes(rpc, serde))]
pub fn derive_describe(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    describe::derive_describe_impl(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}

/// Derive `typed_rpc_server::validation::Validate`
///
/// Fields marked `#[rpc(validate = "required")]` must hold a non-zero
/// value. Fields marked `#[rpc(nested)]` are validated recursively and
/// their failures are reported under the outer field's namespace.
#[proc_macro_derive(Validate, attributes(rpc, serde))]
pub fn derive_validate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    validate::derive_validate_impl(input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
