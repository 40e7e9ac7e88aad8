//! Attribute parsing shared by the derives

use syn::meta::ParseNestedMeta;
use syn::{Attribute, Field, LitStr, Result, Token};

/// Field renaming rule from `#[serde(rename_all = "...")]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameRule {
    LowerCase,
    UpperCase,
    PascalCase,
    CamelCase,
    SnakeCase,
    ScreamingSnakeCase,
    KebabCase,
    ScreamingKebabCase,
}

impl RenameRule {
    pub fn parse(rule: &str) -> Option<Self> {
        match rule {
            "lowercase" => Some(RenameRule::LowerCase),
            "UPPERCASE" => Some(RenameRule::UpperCase),
            "PascalCase" => Some(RenameRule::PascalCase),
            "camelCase" => Some(RenameRule::CamelCase),
            "snake_case" => Some(RenameRule::SnakeCase),
            "SCREAMING_SNAKE_CASE" => Some(RenameRule::ScreamingSnakeCase),
            "kebab-case" => Some(RenameRule::KebabCase),
            "SCREAMING-KEBAB-CASE" => Some(RenameRule::ScreamingKebabCase),
            _ => None,
        }
    }

    /// Apply to a snake_case field name, the way serde does
    pub fn apply_to_field(&self, field: &str) -> String {
        match self {
            RenameRule::LowerCase | RenameRule::SnakeCase => field.to_string(),
            RenameRule::UpperCase | RenameRule::ScreamingSnakeCase => field.to_ascii_uppercase(),
            RenameRule::PascalCase => field
                .split('_')
                .map(|part| {
                    let mut chars = part.chars();
                    match chars.next() {
                        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect(),
            RenameRule::CamelCase => {
                let pascal = RenameRule::PascalCase.apply_to_field(field);
                let mut chars = pascal.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            }
            RenameRule::KebabCase => field.replace('_', "-"),
            RenameRule::ScreamingKebabCase => field.replace('_', "-").to_ascii_uppercase(),
        }
    }
}

/// Container-level settings
#[derive(Debug, Default)]
pub struct ContainerMeta {
    pub rename_all: Option<RenameRule>,
    /// `#[rpc(kind = "string")]`
    pub kind: Option<String>,
}

/// Field-level settings
#[derive(Debug, Default)]
pub struct FieldMeta {
    pub rename: Option<String>,
    pub skip: bool,
    /// Tokens from `#[rpc(validate = "required,min=1")]`
    pub rules: Vec<String>,
    /// `#[rpc(nested)]`: validate the field's own value as well
    pub nested: bool,
}

impl FieldMeta {
    /// Only the exact `required` token is enforced at runtime
    pub fn enforces_required(&self) -> bool {
        self.rules.iter().any(|rule| rule == "required")
    }
}

/// Consume the value of a serde key we do not interpret
fn skip_value(meta: &ParseNestedMeta) -> Result<()> {
    if meta.input.peek(Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let _: proc_macro2::TokenTree = meta.input.parse()?;
    }
    Ok(())
}

pub fn extract_container_meta(attrs: &[Attribute]) -> Result<ContainerMeta> {
    let mut container = ContainerMeta::default();

    for attr in attrs {
        if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename_all") {
                    if meta.input.peek(Token![=]) {
                        let s: LitStr = meta.value()?.parse()?;
                        container.rename_all = Some(RenameRule::parse(&s.value()).ok_or_else(
                            || meta.error(format!("unknown rename rule '{}'", s.value())),
                        )?);
                    } else {
                        skip_value(&meta)?;
                    }
                } else {
                    skip_value(&meta)?;
                }
                Ok(())
            })?;
        } else if attr.path().is_ident("rpc") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("kind") {
                    let s: LitStr = meta.value()?.parse()?;
                    if s.value().is_empty() {
                        return Err(meta.error("kind cannot be empty"));
                    }
                    container.kind = Some(s.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported rpc container attribute, expected `kind`"))
                }
            })?;
        }
    }

    Ok(container)
}

pub fn extract_field_meta(field: &Field) -> Result<FieldMeta> {
    let mut meta_out = FieldMeta::default();

    for attr in &field.attrs {
        if attr.path().is_ident("serde") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                    let s: LitStr = meta.value()?.parse()?;
                    meta_out.rename = Some(s.value());
                } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                    meta_out.skip = true;
                } else {
                    skip_value(&meta)?;
                }
                Ok(())
            })?;
        } else if attr.path().is_ident("rpc") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("validate") {
                    let s: LitStr = meta.value()?.parse()?;
                    meta_out.rules = s
                        .value()
                        .split(',')
                        .map(|rule| rule.trim().to_string())
                        .filter(|rule| !rule.is_empty())
                        .collect();
                    Ok(())
                } else if meta.path.is_ident("nested") {
                    meta_out.nested = true;
                    Ok(())
                } else {
                    Err(meta.error("unsupported rpc field attribute, expected `validate` or `nested`"))
                }
            })?;
        }
    }

    Ok(meta_out)
}
