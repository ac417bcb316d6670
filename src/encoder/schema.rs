//! Schema trees, parsed once from their JSON form.
//!
//! A schema maps field names to nodes. A node is written either as a type name
//! (`"Mass": "float"`) or as an object:
//!
//! | JSON                                             | Node |
//! |--------------------------------------------------|------|
//! | `{"type": "int", "column": "Cnt", "default": 0}` | scalar |
//! | `{"value": "Lab1"}`                              | literal |
//! | `{"type": "group", "key": "Date", "members": {...}}` | group |
//! | `{"type": "obj", "members": {...}}` or a plain mapping of fields | object |

use crate::ci_map::CiMap;
use crate::coercion::DeclaredType;
use crate::error::{HwdbError, HwdbResult};
use crate::types::Value;

/// An ordered set of named schema nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub fields: Vec<(String, SchemaNode)>,
}

/// One node of a schema tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Scalar(ScalarField),
    Literal(Value),
    Object(Schema),
    Group(GroupField),
}

/// A field resolved from the sheet and cast to a declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    /// Column to read; the field name when `None`.
    pub column: Option<String>,
    pub ty: DeclaredType,
    /// Used when the resolved value is null.
    pub default: Option<Value>,
    pub required: bool,
}

impl ScalarField {
    pub fn new(ty: DeclaredType) -> Self {
        Self {
            column: None,
            ty,
            default: None,
            required: false,
        }
    }
}

/// A repeated substructure: one instance per distinct key tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupField {
    pub keys: Vec<String>,
    pub members: Schema,
}

const NODE_KEYS: [&str; 7] = ["type", "column", "value", "key", "members", "default", "required"];

impl Schema {
    /// Parse a schema mapping. `path` names the location for error messages.
    pub fn from_json(v: &serde_json::Value, path: &str) -> HwdbResult<Self> {
        let obj = v.as_object().ok_or_else(|| {
            HwdbError::invalid_encoder(format!("{path}: schema must be a mapping of fields, got {v}"))
        })?;
        let mut fields = Vec::with_capacity(obj.len());
        for (name, node) in obj {
            let child_path = format!("{path}.{name}");
            fields.push((name.clone(), SchemaNode::from_json(node, &child_path)?));
        }
        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any node in the tree (excluding group members) is a group.
    pub fn has_groups(&self) -> bool {
        self.fields.iter().any(|(_, node)| match node {
            SchemaNode::Group(_) => true,
            SchemaNode::Object(children) => children.has_groups(),
            _ => false,
        })
    }
}

impl SchemaNode {
    /// Parse a single node.
    pub fn from_json(v: &serde_json::Value, path: &str) -> HwdbResult<Self> {
        match v {
            serde_json::Value::String(name) => {
                let ty: DeclaredType = name.parse().map_err(|e| prefix(path, e))?;
                match ty {
                    DeclaredType::Group => Err(HwdbError::invalid_encoder(format!(
                        "{path}: a group needs 'key' and 'members'"
                    ))),
                    DeclaredType::Obj => Err(HwdbError::invalid_encoder(format!(
                        "{path}: an object needs 'members'"
                    ))),
                    ty => Ok(Self::Scalar(ScalarField::new(ty))),
                }
            }
            serde_json::Value::Object(obj) => {
                let attrs: CiMap<&serde_json::Value> = obj.iter().map(|(k, v)| (k.as_str(), v)).collect();
                let is_node = NODE_KEYS.iter().any(|k| attrs.contains_key(k));
                if !is_node {
                    return Ok(Self::Object(Schema::from_json(v, path)?));
                }
                Self::from_attrs(&attrs, path)
            }
            other => Err(HwdbError::invalid_encoder(format!(
                "{path}: schema node must be a type name or a mapping, got {other}"
            ))),
        }
    }

    fn from_attrs(attrs: &CiMap<&serde_json::Value>, path: &str) -> HwdbResult<Self> {
        if let Some(value) = attrs.get("value") {
            return Ok(Self::Literal(Value::from_json(value)));
        }

        let ty = match attrs.get("type") {
            Some(serde_json::Value::String(name)) => name.parse().map_err(|e| prefix(path, e))?,
            Some(other) => {
                return Err(HwdbError::invalid_encoder(format!(
                    "{path}: 'type' must be a string, got {other}"
                )));
            }
            None => DeclaredType::Any,
        };

        match ty {
            DeclaredType::Group => {
                let keys = parse_keys(attrs.get("key").copied(), path)?;
                let members = attrs.get("members").ok_or_else(|| {
                    HwdbError::invalid_encoder(format!("{path}: a group needs 'members'"))
                })?;
                Ok(Self::Group(GroupField {
                    keys,
                    members: Schema::from_json(members, &format!("{path}.members"))?,
                }))
            }
            DeclaredType::Obj => {
                let members = attrs.get("members").ok_or_else(|| {
                    HwdbError::invalid_encoder(format!("{path}: an object needs 'members'"))
                })?;
                Ok(Self::Object(Schema::from_json(members, &format!("{path}.members"))?))
            }
            ty => {
                let column = match attrs.get("column") {
                    None | Some(serde_json::Value::Null) => None,
                    Some(serde_json::Value::String(c)) => Some(c.clone()),
                    Some(other) => {
                        return Err(HwdbError::invalid_encoder(format!(
                            "{path}: 'column' must be a string, got {other}"
                        )));
                    }
                };
                let required = match attrs.get("required") {
                    None => false,
                    Some(serde_json::Value::Bool(b)) => *b,
                    Some(other) => {
                        return Err(HwdbError::invalid_encoder(format!(
                            "{path}: 'required' must be true or false, got {other}"
                        )));
                    }
                };
                Ok(Self::Scalar(ScalarField {
                    column,
                    ty,
                    default: attrs
                        .get("default")
                        .map(|v| Value::from_json(v))
                        .filter(|v| !v.is_null()),
                    required,
                }))
            }
        }
    }
}

fn prefix(path: &str, err: HwdbError) -> HwdbError {
    match err {
        HwdbError::InvalidEncoder { message } => HwdbError::invalid_encoder(format!("{path}: {message}")),
        other => other,
    }
}

/// Parse a `key` attribute: a column name or a non-empty list of column names.
pub(crate) fn parse_keys(v: Option<&serde_json::Value>, path: &str) -> HwdbResult<Vec<String>> {
    let keys: Vec<String> = match v {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    HwdbError::invalid_encoder(format!("{path}: key columns must be strings, got {item}"))
                })
            })
            .collect::<HwdbResult<_>>()?,
        Some(other) => {
            return Err(HwdbError::invalid_encoder(format!(
                "{path}: 'key' must be a string or a list of strings, got {other}"
            )));
        }
        None => Vec::new(),
    };
    if keys.is_empty() {
        return Err(HwdbError::invalid_encoder(format!(
            "{path}: a group needs at least one 'key' column"
        )));
    }
    Ok(keys)
}
