use crate::LifeStr;
use indexmap::IndexMap;
use std::fmt::{self, Display, Formatter};

/// Handle of an allocation in the simulated [`Heap`](crate::Heap)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

impl Display for ResourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Ordered field storage of a record
pub type Fields = IndexMap<LifeStr, Value>;

/// A value of a user-defined (or synthesized) record type
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub ty: LifeStr,
    pub fields: Fields,
}

impl Record {
    pub fn new(ty: impl Into<LifeStr>) -> Self {
        Self {
            ty: ty.into(),
            fields: Fields::new(),
        }
    }

    pub fn with(mut self, name: impl Into<LifeStr>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields.get_mut(name)
    }

    pub fn set(&mut self, name: impl Into<LifeStr>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(LifeStr),
    /// Raw resource handle, `None` is the null pointer
    Ptr(Option<ResourceId>),
    Record(Record),
}

impl Value {
    pub const NULL_PTR: Value = Value::Ptr(None);

    /// Name of the builtin or record type this value belongs to
    pub fn type_name(&self) -> LifeStr {
        match self {
            Value::Nil => "Nil".into(),
            Value::Bool(_) => "Bool".into(),
            Value::Int(_) => "Int".into(),
            Value::Float(_) => "Float".into(),
            Value::Str(_) => "String".into(),
            Value::Ptr(_) => "Pointer".into(),
            Value::Record(rec) => rec.ty.clone(),
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_null_ptr(&self) -> bool {
        matches!(self, Value::Ptr(None))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_ptr(&self) -> Option<ResourceId> {
        match self {
            Value::Ptr(p) => *p,
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Value::Record(rec) => Some(rec),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_record().and_then(|rec| rec.get(name))
    }

    /// All non-null resource handles reachable from this value
    pub fn resources(&self) -> Vec<ResourceId> {
        let mut out = Vec::new();
        self.collect_resources(&mut out);
        out
    }

    fn collect_resources(&self, out: &mut Vec<ResourceId>) {
        match self {
            Value::Ptr(Some(id)) => out.push(*id),
            Value::Record(rec) => {
                for value in rec.fields.values() {
                    value.collect_resources(out);
                }
            }
            _ => {}
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Ptr(None) => write!(f, "null"),
            Value::Ptr(Some(id)) => write!(f, "*{}", id),
            Value::Record(rec) => {
                write!(f, "{} {{", rec.ty)?;
                for (i, (name, value)) in rec.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", name, value)?;
                }
                write!(f, " }}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<LifeStr> for Value {
    fn from(s: LifeStr) -> Self {
        Value::Str(s)
    }
}

impl From<ResourceId> for Value {
    fn from(id: ResourceId) -> Self {
        Value::Ptr(Some(id))
    }
}

impl From<Record> for Value {
    fn from(rec: Record) -> Self {
        Value::Record(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::from(1).type_name().as_str(), "Int");
        assert_eq!(Value::from("a").type_name().as_str(), "String");
        assert_eq!(Value::NULL_PTR.type_name().as_str(), "Pointer");
        assert_eq!(Value::from(Record::new("Person")).type_name().as_str(), "Person");
    }

    #[test]
    fn test_nested_resources() {
        let inner = Record::new("Box").with("ptr", ResourceId(3));
        let outer = Record::new("Pair")
            .with("a", ResourceId(1))
            .with("b", inner)
            .with("c", Value::NULL_PTR);
        assert_eq!(
            Value::from(outer).resources(),
            vec![ResourceId(1), ResourceId(3)]
        );
    }

    #[test]
    fn test_display_record() {
        let rec = Record::new("Person").with("name", "bob").with("age", 7);
        assert_eq!(
            Value::from(rec).to_string(),
            "Person { name: \"bob\", age: 7 }"
        );
    }
}
