//! Registered types and their effective lifecycle capabilities

use crate::error::{LifeResult, RegistryError, ResolveError};
use crate::synth::{self, CopyPlan, DestroyPlan};
use indexmap::IndexMap;
use life_val::{
    Constructor, LifeStr, LifecycleFlags, MethodTable, Record, TypeDescriptor, Value, ANY_TYPE,
};
use log::debug;
use std::collections::HashSet;

/// A registered type: its descriptor with effective flags and synthesized
/// methods filled in, plus the plans the resolver hands out
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub desc: TypeDescriptor,
    /// Copy plan, or why the type cannot be copied
    pub copy: Result<CopyPlan, String>,
    pub destroy: DestroyPlan,
    pub builtin: bool,
    /// Field nesting depth, builtins are 1
    pub depth: usize,
}

impl TypeInfo {
    pub fn name(&self) -> &LifeStr {
        &self.desc.name
    }

    pub fn flags(&self) -> LifecycleFlags {
        self.desc.flags
    }

    pub fn field_count(&self) -> usize {
        self.desc.fields.len()
    }

    /// Storage layout of an uninitialized slot of this type
    pub fn empty_value(&self) -> Value {
        if self.builtin {
            return Value::Nil;
        }
        let mut rec = Record::new(self.desc.name.clone());
        for field in &self.desc.fields {
            rec.set(field.name.clone(), Value::Nil);
        }
        Value::Record(rec)
    }
}

#[derive(Debug)]
pub struct TypeRegistry {
    types: IndexMap<LifeStr, TypeInfo>,
    max_depth: usize,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::with_depth_limit(64)
    }

    pub fn with_depth_limit(max_depth: usize) -> Self {
        let mut types = IndexMap::new();
        for info in [
            builtin_info("Int", LifecycleFlags::TRIVIAL, Ok(CopyPlan::Bitwise)),
            builtin_info("Float", LifecycleFlags::TRIVIAL, Ok(CopyPlan::Bitwise)),
            builtin_info("Bool", LifecycleFlags::TRIVIAL, Ok(CopyPlan::Bitwise)),
            builtin_info(
                "String",
                LifecycleFlags {
                    is_trivial: false,
                    ..LifecycleFlags::TRIVIAL
                },
                Ok(CopyPlan::Bitwise),
            ),
            builtin_info(
                "Pointer",
                LifecycleFlags {
                    has_init: true,
                    has_copy: false,
                    has_consuming_move: true,
                    has_taking_move: true,
                    is_trivial: false,
                },
                Err("a Pointer is a raw resource handle and copying it would alias the \
                     resource; define an explicit copy that duplicates the pointee"
                    .to_string()),
            ),
        ] {
            types.insert(info.desc.name.clone(), info);
        }
        Self { types, max_depth }
    }

    /// Validate a type definition and record its effective lifecycle
    ///
    /// Field types must already be registered, so registration order follows
    /// containment and a type can never hold itself by value.
    pub fn register_type(&mut self, desc: TypeDescriptor) -> LifeResult<&TypeInfo> {
        self.validate(&desc)?;
        let info = synth::synthesize(desc, self)?;
        if info.depth > self.max_depth {
            return Err(RegistryError::DepthExceeded {
                ty: info.desc.name.to_string(),
                depth: info.depth,
                limit: self.max_depth,
            }
            .into());
        }
        debug!(
            "registered {} (init: {}, copy: {}, consuming: {}, taking: {}, trivial: {})",
            info.desc.name,
            info.desc.flags.has_init,
            info.desc.flags.has_copy,
            info.desc.flags.has_consuming_move,
            info.desc.flags.has_taking_move,
            info.desc.flags.is_trivial,
        );
        let name = info.desc.name.clone();
        let (idx, _) = self.types.insert_full(name, info);
        Ok(&self.types[idx])
    }

    fn validate(&self, desc: &TypeDescriptor) -> LifeResult<()> {
        let ty = desc.name.to_string();
        if self.types.contains_key(&desc.name) {
            return Err(RegistryError::DuplicateType { ty }.into());
        }

        let mut seen = HashSet::new();
        for field in &desc.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(RegistryError::DuplicateField {
                    ty,
                    field: field.name.to_string(),
                }
                .into());
            }
            if field.ty == desc.name {
                return Err(RegistryError::RecursiveType {
                    ty,
                    field: field.name.to_string(),
                }
                .into());
            }
            let Some(field_info) = self.types.get(&field.ty) else {
                return Err(RegistryError::UnknownFieldType {
                    ty,
                    field: field.name.to_string(),
                    field_ty: field.ty.to_string(),
                }
                .into());
            };
            if desc.flags.is_trivial && !field_info.desc.flags.is_trivial {
                return Err(RegistryError::InvalidTrivial {
                    ty,
                    field: field.name.to_string(),
                }
                .into());
            }
        }

        if let Some(dtor) = &desc.methods.destructor {
            if let Some(field) = dtor.unmanaged.iter().find(|f| desc.field_id(f).is_none()) {
                return Err(RegistryError::UnknownUnmanaged {
                    ty,
                    field: field.to_string(),
                }
                .into());
            }
        }

        self.validate_constructors(desc, &desc.methods)
    }

    fn validate_constructors(&self, desc: &TypeDescriptor, methods: &MethodTable) -> LifeResult<()> {
        let mut signatures = HashSet::new();
        for ctor in &methods.constructors {
            let signature = ctor.signature();
            let invalid = |reason: String| RegistryError::InvalidConstructor {
                ty: desc.name.to_string(),
                signature: ctor.signature(),
                reason,
            };
            if !signatures.insert(ctor.params.clone()) {
                return Err(RegistryError::DuplicateConstructor {
                    ty: desc.name.to_string(),
                    signature,
                }
                .into());
            }
            for param in &ctor.params {
                if param != ANY_TYPE && param != &desc.name && !self.types.contains_key(param) {
                    return Err(invalid(format!("parameter type '{}' is not registered", param)).into());
                }
            }
            if ctor.body.is_some() {
                continue;
            }
            // bodiless: arguments fill the leading fields in order
            if ctor.arity() > desc.fields.len() {
                return Err(invalid(format!(
                    "without a body a constructor takes at most {} arguments, one per field",
                    desc.fields.len()
                ))
                .into());
            }
            for (param, field) in ctor.params.iter().zip(&desc.fields) {
                if param != ANY_TYPE && param != &field.ty {
                    return Err(invalid(format!(
                        "parameter of type '{}' cannot initialize field '{}' of type '{}'",
                        param, field.name, field.ty
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> LifeResult<&TypeInfo> {
        self.types.get(name).ok_or_else(|| {
            ResolveError::UnknownType {
                ty: name.to_string(),
            }
            .into()
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Types registered by the host, in registration order
    pub fn user_types(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.values().filter(|info| !info.builtin)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_info(name: &str, flags: LifecycleFlags, copy: Result<CopyPlan, String>) -> TypeInfo {
    let mut desc = TypeDescriptor::new(name);
    desc.flags = flags;
    desc.methods.constructors = vec![Constructor::new(&[]), Constructor::new(&[name])];
    TypeInfo {
        desc,
        copy,
        destroy: DestroyPlan::Trivial,
        builtin: true,
        depth: 1,
    }
}
