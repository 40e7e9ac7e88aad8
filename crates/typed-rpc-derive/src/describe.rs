//! `#[derive(Describe)]`

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result, parse_quote};

use crate::utils::{extract_container_meta, extract_field_meta};

pub fn derive_describe_impl(mut input: DeriveInput) -> Result<TokenStream> {
    let container = extract_container_meta(&input.attrs)?;
    let name = &input.ident;
    let name_str = name.to_string();
    let generic = !input.generics.params.is_empty();

    for param in input.generics.type_params_mut() {
        param.bounds.push(parse_quote!(::typed_rpc_server::schema::Describe));
    }
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    // Generic instantiations must not share one schema entry
    let (type_name, package) = if generic {
        (quote!(::std::any::type_name::<Self>()), quote!(""))
    } else {
        (quote!(#name_str), quote!(::std::module_path!()))
    };

    let body = if let Some(kind) = &container.kind {
        quote! {
            ::typed_rpc_server::schema::Shape::Override {
                name: #type_name,
                package: #package,
                kind: #kind,
            }
        }
    } else {
        match &input.data {
            Data::Struct(data) => match &data.fields {
                Fields::Named(named) => {
                    let mut fields = Vec::new();
                    for field in &named.named {
                        let meta = extract_field_meta(field)?;
                        if meta.skip {
                            continue;
                        }
                        let Some(ident) = &field.ident else {
                            continue;
                        };
                        let field_name = ident.to_string();
                        let wire_name = match (&meta.rename, container.rename_all) {
                            (Some(rename), _) => rename.clone(),
                            (None, Some(rule)) => rule.apply_to_field(&field_name),
                            (None, None) => field_name.clone(),
                        };
                        let rules = &meta.rules;
                        let ty = &field.ty;
                        fields.push(quote! {
                            ::typed_rpc_server::schema::FieldShape {
                                name: #field_name,
                                wire_name: #wire_name,
                                rules: &[#(#rules),*],
                                shape: <#ty as ::typed_rpc_server::schema::Describe>::shape,
                            }
                        });
                    }
                    record(&type_name, &package, fields)
                }
                // newtypes are transparent on the wire
                Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
                    let ty = &unnamed.unnamed[0].ty;
                    quote!(<#ty as ::typed_rpc_server::schema::Describe>::shape())
                }
                Fields::Unnamed(unnamed) => {
                    let fields = unnamed.unnamed.iter().enumerate().map(|(index, field)| {
                        let position = index.to_string();
                        let ty = &field.ty;
                        quote! {
                            ::typed_rpc_server::schema::FieldShape::new(
                                #position,
                                <#ty as ::typed_rpc_server::schema::Describe>::shape,
                            )
                        }
                    });
                    record(&type_name, &package, fields.collect())
                }
                Fields::Unit => quote!(<() as ::typed_rpc_server::schema::Describe>::shape()),
            },
            Data::Enum(data) => {
                if let Some(variant) = data
                    .variants
                    .iter()
                    .find(|variant| !matches!(variant.fields, Fields::Unit))
                {
                    return Err(syn::Error::new_spanned(
                        variant,
                        "Describe can only be derived for enums with unit variants; \
                         add #[rpc(kind = \"...\")] to describe it by its wire kind",
                    ));
                }
                quote! {
                    ::typed_rpc_server::schema::Shape::Override {
                        name: #type_name,
                        package: #package,
                        kind: "string",
                    }
                }
            }
            Data::Union(data) => {
                return Err(syn::Error::new_spanned(
                    data.union_token,
                    "Describe cannot be derived for unions",
                ));
            }
        }
    };

    Ok(quote! {
        impl #impl_generics ::typed_rpc_server::schema::Describe for #name #ty_generics #where_clause {
            fn shape() -> ::typed_rpc_server::schema::Shape {
                #body
            }
        }
    })
}

fn record(type_name: &TokenStream, package: &TokenStream, fields: Vec<TokenStream>) -> TokenStream {
    quote! {
        ::typed_rpc_server::schema::Shape::Record(::typed_rpc_server::schema::RecordShape {
            name: ::std::option::Option::Some(#type_name),
            package: #package,
            fields: ::std::vec![#(#fields),*],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(input: DeriveInput) -> String {
        derive_describe_impl(input)
            .unwrap()
            .to_string()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    }

    #[test]
    fn test_record_fields_follow_serde_names() {
        let code = expand(parse_quote! {
            #[serde(rename_all = "camelCase")]
            struct Profile {
                user_id: u64,
                #[serde(rename = "display")]
                display_name: String,
                #[serde(skip)]
                cache: Vec<u8>,
                #[rpc(validate = "required,min=1")]
                tags: Vec<String>,
            }
        });

        assert!(code.contains(r#"wire_name:"userId""#));
        assert!(code.contains(r#"wire_name:"display""#));
        assert!(!code.contains("cache"));
        assert!(code.contains(r#"rules:&["required","min=1"]"#));
        assert!(code.contains("::std::module_path!()"));
    }

    #[test]
    fn test_newtype_is_transparent() {
        let code = expand(parse_quote! {
            struct UserId(u64);
        });
        assert!(code.contains("<u64as::typed_rpc_server::schema::Describe>::shape()"));
        assert!(!code.contains("RecordShape"));
    }

    #[test]
    fn test_kind_override() {
        let code = expand(parse_quote! {
            #[rpc(kind = "string")]
            struct Stamp { seconds: u64 }
        });
        assert!(code.contains("Shape::Override"));
        assert!(code.contains(r#"kind:"string""#));
    }

    #[test]
    fn test_unit_enum_is_string() {
        let code = expand(parse_quote! {
            enum Color { Red, Green }
        });
        assert!(code.contains(r#"kind:"string""#));
    }

    #[test]
    fn test_data_enum_rejected() {
        let result = derive_describe_impl(parse_quote! {
            enum Shape { Circle(f64), Square { side: f64 } }
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_generic_records_use_type_name() {
        let code = expand(parse_quote! {
            struct Page<T> { items: Vec<T> }
        });
        assert!(code.contains("type_name::<Self>()"));
        assert!(code.contains("T:::typed_rpc_server::schema::Describe"));
    }
}
