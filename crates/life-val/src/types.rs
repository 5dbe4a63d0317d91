//! Type descriptors handed to the tracker by the host front end

use crate::{FieldId, Fields, Heap, HeapResult, LifeStr, Record, Value};
use serde::{Deserialize, Serialize};

/// Body of an explicit constructor: builds field values from call arguments
pub type InitBody = fn(&mut Heap, &[Value]) -> HeapResult<Fields>;

/// Body of an explicit copy: builds the copy's record from the source
pub type CopyBody = fn(&mut Heap, &Record) -> HeapResult<Record>;

/// Body of an explicit destructor: releases what the value owns
pub type DelBody = fn(&mut Heap, &Record) -> HeapResult<()>;

/// Parameter type that accepts any argument
pub const ANY_TYPE: &str = "Any";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: LifeStr,
    pub ty: LifeStr,
}

impl FieldDecl {
    pub fn new(name: impl Into<LifeStr>, ty: impl Into<LifeStr>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// Lifecycle capabilities of a type
///
/// On a descriptor passed to registration these are what the author
/// declared. On a registered type they are the effective capabilities,
/// synthesized ones included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleFlags {
    pub has_init: bool,
    pub has_copy: bool,
    pub has_consuming_move: bool,
    pub has_taking_move: bool,
    pub is_trivial: bool,
}

impl LifecycleFlags {
    /// Flags of a type that is copied and moved as raw bits
    pub const TRIVIAL: Self = Self {
        has_init: true,
        has_copy: true,
        has_consuming_move: true,
        has_taking_move: true,
        is_trivial: true,
    };
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Constructor {
    /// Parameter type names, in call order
    #[serde(default)]
    pub params: Vec<LifeStr>,
    /// Without a body, arguments initialize the leading fields positionally
    /// and the remaining fields receive their null state.
    #[serde(skip)]
    pub body: Option<InitBody>,
    /// Produced by auto-derivation rather than written by the author
    #[serde(skip)]
    pub synthesized: bool,
}

impl Constructor {
    pub fn new(params: &[&str]) -> Self {
        Self {
            params: params.iter().map(|p| LifeStr::from(*p)).collect(),
            body: None,
            synthesized: false,
        }
    }

    pub fn with_body(params: &[&str], body: InitBody) -> Self {
        Self {
            body: Some(body),
            ..Self::new(params)
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Signature as written at a call site, e.g. `(String, Int)`
    pub fn signature(&self) -> String {
        format!("({})", self.params.join(", "))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyMethod {
    /// Without a body the explicit copy copies each field with that field's
    /// own copy operation.
    #[serde(skip)]
    pub body: Option<CopyBody>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Destructor {
    #[serde(skip)]
    pub body: Option<DelBody>,
    /// Fields released by the destructor body itself; every other field is
    /// still destroyed structurally after the body runs.
    #[serde(default)]
    pub unmanaged: Vec<LifeStr>,
}

impl Destructor {
    pub fn manages(&self, field: &str) -> bool {
        !self.unmanaged.iter().any(|f| f == field)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodTable {
    pub constructors: Vec<Constructor>,
    pub copy: Option<CopyMethod>,
    pub destructor: Option<Destructor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: LifeStr,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub flags: LifecycleFlags,
    /// Opt-in to synthesis of the lifecycle methods the author did not write
    #[serde(default)]
    pub auto_derive: bool,
    #[serde(default)]
    pub methods: MethodTable,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<LifeStr>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            flags: LifecycleFlags::default(),
            auto_derive: false,
            methods: MethodTable::default(),
        }
    }

    pub fn field(mut self, name: impl Into<LifeStr>, ty: impl Into<LifeStr>) -> Self {
        self.fields.push(FieldDecl::new(name, ty));
        self
    }

    pub fn auto_derive(mut self) -> Self {
        self.auto_derive = true;
        self
    }

    pub fn trivial(mut self) -> Self {
        self.flags = LifecycleFlags::TRIVIAL;
        self
    }

    pub fn constructor(mut self, params: &[&str]) -> Self {
        self.methods.constructors.push(Constructor::new(params));
        self
    }

    pub fn constructor_with(mut self, params: &[&str], body: InitBody) -> Self {
        self.methods
            .constructors
            .push(Constructor::with_body(params, body));
        self
    }

    pub fn copy(mut self) -> Self {
        self.methods.copy = Some(CopyMethod { body: None });
        self
    }

    pub fn copy_with(mut self, body: CopyBody) -> Self {
        self.methods.copy = Some(CopyMethod { body: Some(body) });
        self
    }

    pub fn consuming_move(mut self) -> Self {
        self.flags.has_consuming_move = true;
        self
    }

    pub fn taking_move(mut self) -> Self {
        self.flags.has_taking_move = true;
        self
    }

    pub fn destructor(mut self, body: DelBody, unmanaged: &[&str]) -> Self {
        self.methods.destructor = Some(Destructor {
            body: Some(body),
            unmanaged: unmanaged.iter().map(|f| LifeStr::from(*f)).collect(),
        });
        self
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.fields.iter().position(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let desc = TypeDescriptor::new("Person")
            .field("name", "String")
            .field("age", "Int")
            .auto_derive()
            .constructor(&[])
            .constructor(&["String"]);
        assert_eq!(desc.field_id("age"), Some(1));
        assert_eq!(desc.methods.constructors[1].signature(), "(String)");
        assert!(desc.auto_derive);
        assert!(!desc.flags.has_copy);
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = r#"{
            "name": "Handle",
            "fields": [{ "name": "fd", "ty": "Pointer" }],
            "flags": { "has_taking_move": true },
            "methods": {
                "constructors": [{ "params": ["Pointer"] }],
                "destructor": { "unmanaged": ["fd"] }
            }
        }"#;
        let desc: TypeDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.fields[0], FieldDecl::new("fd", "Pointer"));
        assert!(desc.flags.has_taking_move);
        assert!(!desc.flags.has_consuming_move);
        let dtor = desc.methods.destructor.unwrap();
        assert!(!dtor.manages("fd"));
        assert!(dtor.body.is_none());
    }
}
