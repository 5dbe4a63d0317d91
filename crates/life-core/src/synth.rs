//! Auto-derivation of lifecycle methods at registration time
//!
//! A type that opts in with `auto_derive` gets the lifecycle methods its
//! author did not write, as long as every field supports them:
//!
//! - a member-wise constructor taking every field in declaration order
//! - a member-wise copy, when every field is copyable
//! - a consuming move, when every field supports it
//!
//! Taking moves are never synthesized: the null state they leave behind is
//! a decision only the type author can make. Explicit definitions always
//! win over synthesis.

use crate::error::LifeResult;
use crate::registry::{TypeInfo, TypeRegistry};
use life_val::{Constructor, CopyBody, DelBody, LifeStr, Record, TypeDescriptor, Value};
use log::trace;
use strum_macros::{Display, IntoStaticStr};

/// How a copy of a value is produced
#[derive(Debug, Clone, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum CopyPlan {
    /// Raw value duplication (builtins and trivial types)
    Bitwise,
    /// Field-by-field copy synthesized by auto-derivation
    Synthesized,
    /// The author's copy; without a body each field is copied with its own plan
    Explicit(Option<CopyBody>),
}

/// How a live value is torn down
#[derive(Debug, Clone, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DestroyPlan {
    /// Nothing to run
    Trivial,
    /// Destroy each field, last declared first
    FieldWise,
    /// Run the author's destructor once, then destroy the fields it does not
    /// list as unmanaged
    Explicit {
        body: Option<DelBody>,
        unmanaged: Vec<LifeStr>,
    },
}

/// Turn a validated descriptor into its effective registered form
pub(crate) fn synthesize(mut desc: TypeDescriptor, registry: &TypeRegistry) -> LifeResult<TypeInfo> {
    let mut fields = Vec::with_capacity(desc.fields.len());
    for field in &desc.fields {
        fields.push(registry.get(&field.ty)?);
    }
    let trivial = desc.flags.is_trivial;

    if desc.auto_derive && desc.methods.constructors.is_empty() {
        let params: Vec<&str> = desc.fields.iter().map(|f| f.ty.as_str()).collect();
        trace!("{}: synthesizing member-wise constructor ({})", desc.name, params.join(", "));
        desc.methods.constructors.push(Constructor {
            synthesized: true,
            ..Constructor::new(&params)
        });
    }

    let copy = if let Some(explicit) = &desc.methods.copy {
        Ok(CopyPlan::Explicit(explicit.body))
    } else if desc.flags.has_copy {
        Ok(CopyPlan::Explicit(None))
    } else if trivial {
        Ok(CopyPlan::Bitwise)
    } else if !desc.auto_derive {
        Err(format!(
            "'{}' defines no copy and does not opt in to auto-derivation",
            desc.name
        ))
    } else if let Some((decl, _)) = desc
        .fields
        .iter()
        .zip(&fields)
        .find(|(_, info)| !info.desc.flags.has_copy)
    {
        Err(format!(
            "field '{}' of type '{}' is not copyable, so no copy can be synthesized",
            decl.name, decl.ty
        ))
    } else {
        trace!("{}: synthesizing member-wise copy", desc.name);
        Ok(CopyPlan::Synthesized)
    };

    let consuming = desc.flags.has_consuming_move
        || trivial
        || (desc.auto_derive && fields.iter().all(|f| f.desc.flags.has_consuming_move));
    let taking = desc.flags.has_taking_move || trivial;

    let destroy = match &desc.methods.destructor {
        Some(dtor) => DestroyPlan::Explicit {
            body: dtor.body,
            unmanaged: dtor.unmanaged.clone(),
        },
        None if trivial => DestroyPlan::Trivial,
        None => DestroyPlan::FieldWise,
    };

    let depth = 1 + fields.iter().map(|f| f.depth).max().unwrap_or(0);

    desc.flags.has_init = !desc.methods.constructors.is_empty();
    desc.flags.has_copy = copy.is_ok();
    desc.flags.has_consuming_move = consuming;
    desc.flags.has_taking_move = taking;

    Ok(TypeInfo {
        desc,
        copy,
        destroy,
        builtin: false,
        depth,
    })
}

/// The null state of a type: null pointers, zero numbers, empty strings
///
/// This is the value a taking move leaves behind when the caller does not
/// supply one of its own.
pub fn null_state(registry: &TypeRegistry, ty: &str) -> LifeResult<Value> {
    let info = registry.get(ty)?;
    if info.builtin {
        return Ok(builtin_null(ty));
    }
    let mut rec = Record::new(ty);
    for field in &info.desc.fields {
        rec.set(field.name.clone(), null_state(registry, &field.ty)?);
    }
    Ok(Value::Record(rec))
}

fn builtin_null(ty: &str) -> Value {
    match ty {
        "Int" => Value::Int(0),
        "Float" => Value::Float(0.0),
        "Bool" => Value::Bool(false),
        "String" => Value::Str(LifeStr::new()),
        "Pointer" => Value::NULL_PTR,
        _ => Value::Nil,
    }
}
