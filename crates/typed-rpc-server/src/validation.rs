//! Validation bridge
//!
//! After parameters are bound, record-typed parameters are asked to validate
//! themselves through [`Validate`]. Field failures are turned into an
//! Invalid Params error by the active [`ValidationFormatter`] (or
//! [`default_formatter`]). Non-record parameter types skip validation.
//!
//! `#[derive(Validate)]` enforces the `required` token through [`Presence`]
//! and descends into fields marked `#[rpc(nested)]`. Other rules are
//! implemented by hand in [`Validate`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{JsonRpcErrorCode, RpcError};
use crate::schema::Shape;

/// A single field-level validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    /// Dotted path starting at the record name, e.g. `ConcatParams.b`
    pub namespace: String,
    /// Field name as written in Rust
    pub field: String,
    /// The rule that failed, e.g. `required`
    pub tag: String,
    /// Rule parameter (`3` for `min=3`), empty when the rule takes none
    pub param: String,
    /// Offending value, when it can be represented
    pub value: Option<Value>,
}

impl FieldError {
    pub fn new(
        namespace: impl Into<String>,
        field: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            field: field.into(),
            tag: tag.into(),
            param: String::new(),
            value: None,
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.param = param.into();
        self
    }

    pub fn with_value(mut self, value: Option<Value>) -> Self {
        self.value = value;
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}' failed on the '{}' rule",
            self.namespace, self.tag
        )
    }
}

/// Non-empty set of field failures
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.errors.iter()
    }

    /// Take over the failures of a nested record, re-rooting their
    /// namespaces at `prefix` (e.g. `Order.address`)
    pub fn absorb_nested(&mut self, prefix: &str, nested: ValidationErrors) {
        for mut error in nested.errors {
            error.namespace = match error.namespace.split_once('.') {
                Some((_, rest)) => format!("{}.{}", prefix, rest),
                None => format!("{}.{}", prefix, error.namespace),
            };
            self.errors.push(error);
        }
    }

    /// `Ok(())` when nothing was collected
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<Vec<FieldError>> for ValidationErrors {
    fn from(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        f.write_str(&messages.join("; "))
    }
}

/// Capability of a bound parameter value to check itself
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationErrors>;
}

/// Formats field failures into the error returned to the caller
pub type ValidationFormatter = Arc<dyn Fn(&ValidationErrors) -> RpcError + Send + Sync>;

/// Invalid Params with one `{field, tag, value}` object per failure
pub fn default_formatter(errors: &ValidationErrors) -> RpcError {
    let details: Vec<Value> = errors
        .iter()
        .map(|error| {
            let mut detail = Map::new();
            if !error.field.is_empty() {
                detail.insert("field".to_string(), json!(error.namespace));
            }
            if !error.tag.is_empty() {
                detail.insert("tag".to_string(), json!(error.tag));
            }
            if let Some(value) = &error.value {
                detail.insert("value".to_string(), value.clone());
            }
            Value::Object(detail)
        })
        .collect();

    RpcError::new(
        JsonRpcErrorCode::InvalidParams,
        None,
        Some(Value::Array(details)),
    )
}

/// Field failures for a record whose binding stopped at a missing member.
///
/// Serde reports only the first absent field. This lists every `required`
/// field absent from (or null in) `params`, plus the one serde named, each
/// with the `required` tag. `None` when `error` is not a missing-field error
/// or `shape` is not a record.
pub fn missing_fields(
    shape: &Shape,
    params: &Value,
    error: &serde_json::Error,
) -> Option<ValidationErrors> {
    let message = error.to_string();
    let reported = message.strip_prefix("missing field `")?.split('`').next()?;
    let Shape::Record(record) = shape else {
        return None;
    };

    // `module::Page<module::Item>` namespaces as `Page`
    let record_name = record
        .name
        .map(|name| {
            let base = name.split('<').next().unwrap_or(name);
            base.rsplit("::").next().unwrap_or(base)
        })
        .unwrap_or_default();
    let members = params.as_object();

    let mut errors = ValidationErrors::new();
    for field in &record.fields {
        let absent = members
            .and_then(|members| members.get(field.wire_name))
            .is_none_or(Value::is_null);
        if absent && (field.is_required() || field.wire_name == reported) {
            let namespace = if record_name.is_empty() {
                field.name.to_string()
            } else {
                format!("{}.{}", record_name, field.name)
            };
            errors.push(FieldError::new(namespace, field.name, "required"));
        }
    }
    (!errors.is_empty()).then_some(errors)
}

/// Holds the active formatter; shared by every registered method
#[derive(Default)]
pub struct ValidationBridge {
    formatter: RwLock<Option<ValidationFormatter>>,
}

impl ValidationBridge {
    pub fn new(formatter: Option<ValidationFormatter>) -> Self {
        Self {
            formatter: RwLock::new(formatter),
        }
    }

    pub fn set_formatter(&self, formatter: ValidationFormatter) {
        *self.formatter.write() = Some(formatter);
    }

    /// Run `value` through validation and format any failures
    pub fn check<T: Validate + ?Sized>(&self, value: &T) -> Result<(), RpcError> {
        match value.validate() {
            Ok(()) => Ok(()),
            Err(errors) if errors.is_empty() => Ok(()),
            Err(errors) => Err(self.format(&errors)),
        }
    }

    pub fn format(&self, errors: &ValidationErrors) -> RpcError {
        // released before the call so the formatter may replace itself
        let formatter = self.formatter.read().clone();
        match formatter {
            Some(formatter) => formatter(errors),
            None => default_formatter(errors),
        }
    }
}

impl fmt::Debug for ValidationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationBridge")
            .field("custom_formatter", &self.formatter.read().is_some())
            .finish()
    }
}

/// Whether a value counts as present for the `required` rule.
///
/// Mirrors "non-zero": empty strings, zero numbers, `false`, `None` and
/// empty collections are all absent.
pub trait Presence {
    fn is_present(&self) -> bool;

    /// Value reported alongside a failure
    fn observed(&self) -> Option<Value> {
        None
    }
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }

    fn observed(&self) -> Option<Value> {
        Some(Value::String(self.clone()))
    }
}

impl Presence for bool {
    fn is_present(&self) -> bool {
        *self
    }

    fn observed(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }
}

impl Presence for char {
    fn is_present(&self) -> bool {
        *self != '\0'
    }
}

macro_rules! presence_for_numbers {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Presence for $ty {
                fn is_present(&self) -> bool {
                    *self != (0 as $ty)
                }

                fn observed(&self) -> Option<Value> {
                    serde_json::to_value(*self).ok()
                }
            }
        )*
    };
}

presence_for_numbers!(
    i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
);

impl<T> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl<T: Presence + ?Sized> Presence for Box<T> {
    fn is_present(&self) -> bool {
        (**self).is_present()
    }

    fn observed(&self) -> Option<Value> {
        (**self).observed()
    }
}

impl<T: Presence + ?Sized> Presence for Arc<T> {
    fn is_present(&self) -> bool {
        (**self).is_present()
    }

    fn observed(&self) -> Option<Value> {
        (**self).observed()
    }
}

impl<T> Presence for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Presence for VecDeque<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T, S> Presence for HashSet<T, S> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Presence for BTreeSet<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V, S> Presence for HashMap<K, V, S> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> Presence for BTreeMap<K, V> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Presence for Value {
    fn is_present(&self) -> bool {
        !self.is_null()
    }

    fn observed(&self) -> Option<Value> {
        Some(self.clone())
    }
}

macro_rules! validate_always_ok {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Validate for $ty {
                fn validate(&self) -> Result<(), ValidationErrors> {
                    Ok(())
                }
            }
        )*
    };
}

validate_always_ok!(
    (),
    bool,
    char,
    String,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    Value,
);

macro_rules! validate_always_ok_generic {
    ($($ty:ident < $($param:ident),+ >),* $(,)?) => {
        $(
            impl<$($param),+> Validate for $ty<$($param),+> {
                fn validate(&self) -> Result<(), ValidationErrors> {
                    Ok(())
                }
            }
        )*
    };
}

// Containers are not records: their contents are not walked.
validate_always_ok_generic!(
    Vec<T>,
    VecDeque<T>,
    BTreeSet<T>,
    HashSet<T>,
    HashMap<K, V>,
    BTreeMap<K, V>,
    Rc<T>,
);

macro_rules! validate_always_ok_tuple {
    ($(($($param:ident),+)),* $(,)?) => {
        $(
            impl<$($param),+> Validate for ($($param,)+) {
                fn validate(&self) -> Result<(), ValidationErrors> {
                    Ok(())
                }
            }
        )*
    };
}

// Tuples bind positionally; there are no named fields to check.
validate_always_ok_tuple!((A, B), (A, B, C), (A, B, C, D));

impl<T, const N: usize> Validate for [T; N] {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Some(inner) => inner.validate(),
            None => Ok(()),
        }
    }
}

impl<T: Validate + ?Sized> Validate for Box<T> {
    fn validate(&self) -> Result<(), ValidationErrors> {
        (**self).validate()
    }
}

impl<T: Validate + ?Sized> Validate for Arc<T> {
    fn validate(&self) -> Result<(), ValidationErrors> {
        (**self).validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Concat {
        a: String,
        b: String,
    }

    impl Validate for Concat {
        fn validate(&self) -> Result<(), ValidationErrors> {
            let mut errors = ValidationErrors::new();
            if !self.a.is_present() {
                errors.push(
                    FieldError::new("Concat.a", "a", "required").with_value(self.a.observed()),
                );
            }
            if !self.b.is_present() {
                errors.push(
                    FieldError::new("Concat.b", "b", "required").with_value(self.b.observed()),
                );
            }
            errors.into_result()
        }
    }

    #[test]
    fn test_default_formatter_shape() {
        let bridge = ValidationBridge::default();
        let error = bridge
            .check(&Concat {
                a: "x".into(),
                b: String::new(),
            })
            .unwrap_err();

        assert_eq!(error.code, -32602);
        assert_eq!(error.message, "Invalid params");
        assert_eq!(
            error.data,
            Some(json!([{"field": "Concat.b", "tag": "required", "value": ""}]))
        );
    }

    #[test]
    fn test_valid_value_passes() {
        let bridge = ValidationBridge::default();
        assert!(
            bridge
                .check(&Concat {
                    a: "x".into(),
                    b: "y".into()
                })
                .is_ok()
        );
    }

    #[test]
    fn test_custom_formatter_replaces_default() {
        let bridge = ValidationBridge::default();
        bridge.set_formatter(Arc::new(|errors: &ValidationErrors| {
            RpcError::invalid_params(format!("{} field(s) invalid: {}", errors.len(), errors))
        }));

        let error = bridge
            .check(&Concat {
                a: String::new(),
                b: String::new(),
            })
            .unwrap_err();
        assert_eq!(error.code, -32602);
        assert!(error.message.starts_with("2 field(s) invalid"));
        assert!(error.data.is_none());
    }

    #[test]
    fn test_nested_namespaces_are_rerooted() {
        let mut nested = ValidationErrors::new();
        nested.push(FieldError::new("Address.city", "city", "required"));

        let mut errors = ValidationErrors::new();
        errors.absorb_nested("Order.address", nested);
        let error = errors.iter().next().unwrap();
        assert_eq!(error.namespace, "Order.address.city");
        assert_eq!(error.field, "city");
    }

    fn order_shape() -> Shape {
        use crate::schema::{Describe, FieldShape, RecordShape};
        Shape::Record(RecordShape {
            name: Some("shop::Order"),
            package: "shop",
            fields: vec![
                FieldShape {
                    wire_name: "orderId",
                    rules: &["required"],
                    ..FieldShape::new("order_id", String::shape)
                },
                FieldShape::new("note", String::shape),
                FieldShape::new("qty", u32::shape),
            ],
        })
    }

    #[test]
    fn test_missing_fields_lists_every_required_member() {
        let params = json!({"note": "gift"});
        let error = serde_json::from_str::<u8>("x").unwrap_err();
        assert!(missing_fields(&order_shape(), &params, &error).is_none());

        let error = <serde_json::Error as serde::de::Error>::missing_field("qty");
        let errors = missing_fields(&order_shape(), &params, &error).unwrap();
        let namespaces: Vec<&str> = errors.iter().map(|e| e.namespace.as_str()).collect();
        assert_eq!(namespaces, vec!["Order.order_id", "Order.qty"]);
        assert!(errors.iter().all(|e| e.tag == "required"));

        let not_a_record = Shape::primitive("String", crate::schema::Kind::String);
        assert!(missing_fields(&not_a_record, &params, &error).is_none());
    }

    #[test]
    fn test_formatter_may_replace_itself() {
        let bridge = Arc::new(ValidationBridge::default());
        let handle = Arc::clone(&bridge);
        bridge.set_formatter(Arc::new(move |errors: &ValidationErrors| {
            handle.set_formatter(Arc::new(|_: &ValidationErrors| {
                RpcError::invalid_params("second formatter")
            }));
            RpcError::invalid_params(format!("first formatter: {}", errors.len()))
        }));

        let errors = ValidationErrors::from(vec![FieldError::new("Concat.a", "a", "required")]);
        assert_eq!(bridge.format(&errors).message, "first formatter: 1");
        assert_eq!(bridge.format(&errors).message, "second formatter");
    }

    #[test]
    fn test_tuples_and_containers_always_pass() {
        assert!((1u8, String::new()).validate().is_ok());
        assert!((1u8, 2i64, String::new(), false).validate().is_ok());
        assert!(vec![String::new()].validate().is_ok());
    }

    #[test]
    fn test_presence_of_builtins() {
        assert!(!0i128.is_present());
        assert_eq!(7u128.observed(), Some(json!(7)));
        assert!(!0i32.is_present());
        assert!(1.5f64.is_present());
        assert!(!false.is_present());
        assert!(!None::<u8>.is_present());
        assert!(Some(0u8).is_present());
        assert!(!Vec::<u8>::new().is_present());
        assert!(!Value::Null.is_present());
        assert_eq!(String::new().observed(), Some(json!("")));
    }
}
