use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::shape::{FieldShape, Kind, RecordShape, Shape};

/// One registered method, with its parameter and result signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodInfo {
    pub name: String,
    pub params: String,
    pub result: String,
}

/// Snapshot of every method and every type they reach
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerSpec {
    pub methods: Vec<MethodInfo>,
    pub types: BTreeMap<String, TypeDescriptor>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

/// Structural description of a registered type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub package: String,
    pub kind: Kind,
    #[serde(skip_serializing_if = "is_false")]
    pub is_array: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub array_depth: usize,
    #[serde(skip_serializing_if = "is_false")]
    pub is_pointer: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub pointer_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub wire_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub kind: Kind,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_rules: Vec<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_array: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub array_depth: usize,
    #[serde(skip_serializing_if = "is_false")]
    pub is_pointer: bool,
    #[serde(skip_serializing_if = "is_zero")]
    pub pointer_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

/// A shape with its pointer and array layers peeled off
struct Layers<'a> {
    pointer_depth: usize,
    array_depth: usize,
    element_type: Option<String>,
    base: &'a Shape,
}

/// Leading pointers first, then array layers (skipping any pointers between them)
fn strip(shape: &Shape) -> Layers<'_> {
    let mut pointer_depth = 0;
    let mut current = shape;
    while let Shape::Pointer(inner) = current {
        pointer_depth += 1;
        current = &**inner;
    }

    let mut array_depth = 0;
    let mut element_type = None;
    loop {
        match current {
            Shape::Array(inner) => {
                if element_type.is_none() {
                    element_type = Some(signature(inner));
                }
                array_depth += 1;
                current = &**inner;
            }
            Shape::Pointer(inner) if array_depth > 0 => current = &**inner,
            _ => break,
        }
    }

    Layers {
        pointer_depth,
        array_depth,
        element_type,
        base: current,
    }
}

fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", package, name)
    }
}

/// Structural signature of an anonymous record, e.g. `struct { 0 i32; 1 String }`
fn structural_signature(record: &RecordShape) -> String {
    let members: Vec<String> = record
        .fields
        .iter()
        .map(|field| format!("{} {}", field.wire_name, signature(&(field.shape)())))
        .collect();
    format!("struct {{ {} }}", members.join("; "))
}

/// Stable synthetic name for an anonymous record
pub fn anonymous_name(record: &RecordShape) -> String {
    let mut hasher = Sha256::new();
    hasher.update(structural_signature(record).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("struct_{}", &digest[..16])
}

fn record_name(record: &RecordShape) -> String {
    match record.name {
        Some(name) => qualify(record.package, name),
        None => anonymous_name(record),
    }
}

/// Render a full type signature: pointer markers, then array brackets, then
/// the qualified base name. Maps render as `map[K]V`.
pub fn signature(shape: &Shape) -> String {
    match shape {
        Shape::Primitive { name, .. } => (*name).to_string(),
        Shape::Pointer(inner) => format!("*{}", signature(inner)),
        Shape::Array(inner) => format!("[]{}", signature(inner)),
        Shape::Map { key, value } => format!("map[{}]{}", signature(key), signature(value)),
        Shape::Record(record) => record_name(record),
        Shape::Override { name, package, .. } => qualify(package, name),
    }
}

fn base_kind(base: &Shape) -> Kind {
    match base {
        Shape::Primitive { kind, .. } => *kind,
        Shape::Record(_) => Kind::Struct,
        Shape::Map { .. } => Kind::Map,
        Shape::Override { kind, .. } => Kind::Overridden(*kind),
        // `strip` never stops on a layer
        Shape::Pointer(_) | Shape::Array(_) => Kind::Any,
    }
}

impl TypeDescriptor {
    /// Describe `shape` without walking into record fields
    pub fn summary(shape: &Shape) -> Self {
        let layers = strip(shape);
        let (name, package) = match layers.base {
            Shape::Record(RecordShape {
                name: Some(name),
                package,
                ..
            }) => ((*name).to_string(), (*package).to_string()),
            Shape::Override { name, package, .. } => ((*name).to_string(), (*package).to_string()),
            base => (signature(base), String::new()),
        };
        let (key_type, value_type) = match layers.base {
            Shape::Map { key, value } => (Some(signature(key)), Some(signature(value))),
            _ => (None, None),
        };

        Self {
            name,
            package,
            kind: base_kind(layers.base),
            is_array: layers.array_depth > 0,
            array_depth: layers.array_depth,
            is_pointer: layers.pointer_depth > 0,
            pointer_depth: layers.pointer_depth,
            element_type: layers.element_type,
            key_type,
            value_type,
            fields: Vec::new(),
        }
    }

    /// Qualified name used as the key in [`ServerSpec::types`]
    pub fn qualified_name(&self) -> String {
        qualify(&self.package, &self.name)
    }
}

impl FieldDescriptor {
    fn new(field: &FieldShape, shape: &Shape) -> Self {
        let layers = strip(shape);
        let (key_type, value_type) = match layers.base {
            Shape::Map { key, value } => (Some(signature(key)), Some(signature(value))),
            _ => (None, None),
        };

        Self {
            name: field.name.to_string(),
            wire_name: field.wire_name.to_string(),
            type_name: signature(layers.base),
            kind: base_kind(layers.base),
            required: field.is_required(),
            validation_rules: field.rules.iter().map(|rule| rule.to_string()).collect(),
            is_array: layers.array_depth > 0,
            array_depth: layers.array_depth,
            is_pointer: layers.pointer_depth > 0,
            pointer_depth: layers.pointer_depth,
            element_type: layers.element_type,
            key_type,
            value_type,
        }
    }
}

/// Recursive walker that collects every record and overridden type.
///
/// A record is entered into the map *before* its fields are visited, and a
/// name already present stops the walk, so self-referential records
/// terminate with exactly one entry.
#[derive(Debug, Default)]
pub struct Reflector {
    types: BTreeMap<String, TypeDescriptor>,
}

impl Reflector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, shape: &Shape) {
        let layers = strip(shape);
        match layers.base {
            Shape::Map { key, value } => {
                self.collect(key);
                self.collect(value);
            }
            Shape::Record(record) => self.collect_record(record),
            base @ Shape::Override { .. } => {
                let descriptor = TypeDescriptor::summary(base);
                self.types
                    .entry(descriptor.qualified_name())
                    .or_insert(descriptor);
            }
            _ => {}
        }
    }

    fn collect_record(&mut self, record: &RecordShape) {
        let key = record_name(record);
        if self.types.contains_key(&key) {
            return;
        }

        let mut descriptor = TypeDescriptor {
            name: record
                .name
                .map(str::to_string)
                .unwrap_or_else(|| key.clone()),
            package: record
                .name
                .map(|_| record.package.to_string())
                .unwrap_or_default(),
            kind: Kind::Struct,
            is_array: false,
            array_depth: 0,
            is_pointer: false,
            pointer_depth: 0,
            element_type: None,
            key_type: None,
            value_type: None,
            fields: Vec::new(),
        };
        self.types.insert(key.clone(), descriptor.clone());

        for field in &record.fields {
            let shape = (field.shape)();
            self.collect(&shape);
            descriptor.fields.push(FieldDescriptor::new(field, &shape));
        }

        self.types.insert(key, descriptor);
    }

    /// Record one method's signature and everything it reaches
    pub fn method(&mut self, name: &str, params: &Shape, result: &Shape) -> MethodInfo {
        self.collect(params);
        self.collect(result);
        MethodInfo {
            name: name.to_string(),
            params: signature(params),
            result: signature(result),
        }
    }

    pub fn into_types(self) -> BTreeMap<String, TypeDescriptor> {
        self.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Describe;
    use std::collections::HashMap;

    struct Node;

    impl Describe for Node {
        fn shape() -> Shape {
            Shape::Record(RecordShape {
                name: Some("Node"),
                package: "tree",
                fields: vec![
                    FieldShape {
                        rules: &["required"],
                        ..FieldShape::new("value", i64::shape)
                    },
                    FieldShape::new("children", <Vec<Box<Node>>>::shape),
                    FieldShape::new("parent", <Option<Box<Node>>>::shape),
                ],
            })
        }
    }

    struct Stamp;

    impl Describe for Stamp {
        fn shape() -> Shape {
            Shape::Override {
                name: "Stamp",
                package: "clock",
                kind: "string",
            }
        }
    }

    #[test]
    fn test_self_reference_terminates_with_one_entry() {
        let mut reflector = Reflector::new();
        reflector.collect(&Node::shape());
        let types = reflector.into_types();

        assert_eq!(types.len(), 1);
        let node = &types["tree::Node"];
        assert_eq!(node.kind, Kind::Struct);
        assert_eq!(node.fields.len(), 3);
        assert!(node.fields[0].required);

        let children = &node.fields[1];
        assert_eq!(children.array_depth, 1);
        assert_eq!(children.element_type.as_deref(), Some("*tree::Node"));
        assert_eq!(children.type_name, "tree::Node");

        let parent = &node.fields[2];
        assert_eq!(parent.pointer_depth, 2);
        assert!(!parent.is_array);
    }

    #[test]
    fn test_signature_rendering_order() {
        assert_eq!(signature(&<Option<Vec<Node>>>::shape()), "*[]tree::Node");
        assert_eq!(
            signature(&<Vec<HashMap<String, Stamp>>>::shape()),
            "[]map[String]clock::Stamp"
        );
    }

    #[test]
    fn test_override_registered_without_fields() {
        let mut reflector = Reflector::new();
        reflector.collect(&<HashMap<String, Vec<Stamp>>>::shape());
        let types = reflector.into_types();

        let stamp = &types["clock::Stamp"];
        assert_eq!(stamp.kind.as_str(), "string");
        assert!(stamp.fields.is_empty());
    }

    #[test]
    fn test_anonymous_names_are_stable() {
        let a = signature(&<(i32, String)>::shape());
        let b = signature(&<(i32, String)>::shape());
        let c = signature(&<(String, i32)>::shape());
        assert!(a.starts_with("struct_"));
        assert_eq!(a.len(), "struct_".len() + 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_scalars_do_not_enter_the_map() {
        let mut reflector = Reflector::new();
        let info = reflector.method("math.add", &<Vec<f64>>::shape(), &f64::shape());
        assert_eq!(info.params, "[]f64");
        assert_eq!(info.result, "f64");
        assert!(reflector.into_types().is_empty());
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let descriptor = TypeDescriptor::summary(&<Option<Vec<Vec<u8>>>>::shape());
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["pointerDepth"], 1);
        assert_eq!(value["arrayDepth"], 2);
        assert_eq!(value["elementType"], "[]u8");
        assert_eq!(value["kind"], "uint");
        assert!(value.get("keyType").is_none());
    }
}
