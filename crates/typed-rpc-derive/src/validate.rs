//! `#[derive(Validate)]`

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

use crate::utils::extract_field_meta;

pub fn derive_validate_impl(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut checks = Vec::new();
    match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => {
                for field in &named.named {
                    let meta = extract_field_meta(field)?;
                    let Some(ident) = &field.ident else {
                        continue;
                    };
                    let field_name = ident.to_string();
                    let namespace = format!("{}.{}", name_str, field_name);

                    if meta.enforces_required() {
                        checks.push(quote! {
                            if !::typed_rpc_server::validation::Presence::is_present(&self.#ident) {
                                errors.push(
                                    ::typed_rpc_server::validation::FieldError::new(
                                        #namespace,
                                        #field_name,
                                        "required",
                                    )
                                    .with_value(::typed_rpc_server::validation::Presence::observed(
                                        &self.#ident,
                                    )),
                                );
                            }
                        });
                    }
                    if meta.nested {
                        checks.push(quote! {
                            if let ::std::result::Result::Err(nested) =
                                ::typed_rpc_server::validation::Validate::validate(&self.#ident)
                            {
                                errors.absorb_nested(#namespace, nested);
                            }
                        });
                    }
                }
            }
            Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
                // newtypes validate as their inner value
                return Ok(quote! {
                    impl #impl_generics ::typed_rpc_server::validation::Validate for #name #ty_generics #where_clause {
                        fn validate(&self) -> ::std::result::Result<(), ::typed_rpc_server::validation::ValidationErrors> {
                            ::typed_rpc_server::validation::Validate::validate(&self.0)
                        }
                    }
                });
            }
            Fields::Unnamed(_) | Fields::Unit => {}
        },
        Data::Enum(_) => {}
        Data::Union(data) => {
            return Err(syn::Error::new_spanned(
                data.union_token,
                "Validate cannot be derived for unions",
            ));
        }
    }

    let errors_binding = if checks.is_empty() {
        quote!(let errors = ::typed_rpc_server::validation::ValidationErrors::new();)
    } else {
        quote!(let mut errors = ::typed_rpc_server::validation::ValidationErrors::new();)
    };

    Ok(quote! {
        impl #impl_generics ::typed_rpc_server::validation::Validate for #name #ty_generics #where_clause {
            fn validate(&self) -> ::std::result::Result<(), ::typed_rpc_server::validation::ValidationErrors> {
                #errors_binding
                #(#checks)*
                errors.into_result()
            }
        }
    })
}
