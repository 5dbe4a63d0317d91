//! Error types and diagnostics for the lifecycle tracker
//!
//! Every rejection is reported as a `miette` diagnostic with a stable code.
//! Spans are optional: they are present when the host attached a source
//! location to the slot or call site involved.

use life_val::HeapError;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Create a span from absolute position and length
pub fn span_from(offset: usize, len: usize) -> SourceSpan {
    SourceSpan::new(offset.into(), len)
}

/// Alias for Result type with lifecycle errors
pub type LifeResult<T> = std::result::Result<T, LifeError>;

/// Every error the tracker can surface to its host
#[derive(Error, Debug)]
pub enum LifeError {
    /// Operation selection failures
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Slot state violations
    #[error(transparent)]
    State(#[from] StateError),

    /// Rejected type definitions
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Failures inside lifecycle bodies or the simulated heap
    #[error(transparent)]
    Heap(#[from] HeapError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Diagnostic for LifeError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            LifeError::Resolve(e) => e.code(),
            LifeError::State(e) => e.code(),
            LifeError::Registry(e) => e.code(),
            LifeError::Heap(_) => Some(Box::new("life_heap_E0401")),
            LifeError::Io(_) | LifeError::Json(_) => None,
        }
    }

    fn severity(&self) -> Option<miette::Severity> {
        match self {
            LifeError::Resolve(e) => e.severity(),
            LifeError::State(e) => e.severity(),
            LifeError::Registry(e) => e.severity(),
            _ => None,
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        match self {
            LifeError::Resolve(e) => e.help(),
            LifeError::State(e) => e.help(),
            LifeError::Registry(e) => e.help(),
            LifeError::Heap(HeapError::DoubleFree(_)) => Some(Box::new(
                "A destructor that runs after a taking move must check for the null state before releasing",
            )),
            _ => None,
        }
    }

    fn labels<'a>(&'a self) -> Option<Box<dyn Iterator<Item = miette::LabeledSpan> + 'a>> {
        match self {
            LifeError::Resolve(e) => e.labels(),
            LifeError::State(e) => e.labels(),
            LifeError::Registry(e) => e.labels(),
            _ => None,
        }
    }
}

// ============================================================================
// Resolution Errors (E0101-E0199)
// ============================================================================

/// A requested lifecycle operation does not apply to the type
#[derive(Error, Diagnostic, Debug)]
pub enum ResolveError {
    #[error("no constructor of '{ty}' matches {args}")]
    #[diagnostic(
        code(life_resolve_E0101),
        help("Available constructors: {candidates}")
    )]
    NoConstructor {
        ty: String,
        args: String,
        candidates: String,
        #[label("no matching constructor")]
        span: Option<SourceSpan>,
    },

    #[error("'{ty}' is not copyable")]
    #[diagnostic(code(life_resolve_E0102), help("{reason}"))]
    NotCopyable {
        ty: String,
        reason: String,
        #[label("copy requested here")]
        span: Option<SourceSpan>,
    },

    #[error("'{ty}' does not support {kind}")]
    #[diagnostic(
        code(life_resolve_E0103),
        help("Declare the {kind} capability on '{ty}'")
    )]
    NotMovable {
        ty: String,
        kind: String,
        #[label("move requested here")]
        span: Option<SourceSpan>,
    },

    #[error("cannot consume '{slot}': its lifetime does not provably end here")]
    #[diagnostic(code(life_resolve_E0104), help("{reason}"))]
    LifetimeNotProvablyEnding {
        slot: String,
        reason: String,
        #[label("'{slot}' may still be used")]
        span: Option<SourceSpan>,
    },

    #[error("unknown type '{ty}'")]
    #[diagnostic(
        code(life_resolve_E0105),
        help("Register '{ty}' before declaring slots of it")
    )]
    UnknownType { ty: String },

    #[error("call of '{ty}' with {args} is ambiguous")]
    #[diagnostic(
        code(life_resolve_E0106),
        help("Equally good constructors: {candidates}")
    )]
    AmbiguousConstructor {
        ty: String,
        args: String,
        candidates: String,
        #[label("more than one constructor matches")]
        span: Option<SourceSpan>,
    },
}

// ============================================================================
// State Errors (E0201-E0299)
// ============================================================================

/// An operation is not allowed in the slot's current state
#[derive(Error, Diagnostic, Debug)]
pub enum StateError {
    #[error("use of moved value '{slot}'")]
    #[diagnostic(
        code(life_state_E0201),
        help("'{slot}' was consumed by a move and can no longer be accessed")
    )]
    UseAfterMove {
        slot: String,
        #[label("value moved out of '{slot}'")]
        span: Option<SourceSpan>,
    },

    #[error("use of partially initialized value '{slot}'")]
    #[diagnostic(
        code(life_state_E0202),
        help("Initialize {missing} before using '{slot}'")
    )]
    PartiallyInitializedUse {
        slot: String,
        missing: String,
        #[label("'{slot}' is not fully initialized")]
        span: Option<SourceSpan>,
    },

    #[error("use of {state} value '{slot}'")]
    #[diagnostic(code(life_state_E0203), help("'{slot}' holds no value"))]
    UninitializedUse {
        slot: String,
        state: String,
        #[label("'{slot}' is {state}")]
        span: Option<SourceSpan>,
    },

    #[error("cannot take from immutable binding '{slot}'")]
    #[diagnostic(
        code(life_state_E0204),
        help("A taking move overwrites its source; declare '{slot}' mutable")
    )]
    ImmutableSource {
        slot: String,
        #[label("'{slot}' is immutable")]
        span: Option<SourceSpan>,
    },

    #[error("cannot assign to immutable binding '{slot}'")]
    #[diagnostic(
        code(life_state_E0205),
        help("Declare '{slot}' mutable to modify it after initialization")
    )]
    ImmutableAssignment {
        slot: String,
        #[label("'{slot}' is immutable")]
        span: Option<SourceSpan>,
    },

    #[error("destination '{slot}' already holds a value")]
    #[diagnostic(
        code(life_state_E0206),
        help("Only an uninitialized slot can receive a new value, '{slot}' is {state}")
    )]
    DestinationOccupied {
        slot: String,
        state: String,
        #[label("'{slot}' is {state}")]
        span: Option<SourceSpan>,
    },

    #[error("type mismatch")]
    #[diagnostic(
        code(life_state_E0207),
        help("Expected a value of type '{expected}', but found '{found}'")
    )]
    TypeMismatch {
        expected: String,
        found: String,
        #[label("this has type '{found}'")]
        span: Option<SourceSpan>,
    },

    #[error("resource {resource} would be owned by both '{slot}' and '{other}'")]
    #[diagnostic(
        code(life_state_E0208),
        help("Transfer the resource with a move, or give '{slot}' its own allocation")
    )]
    AliasedResource {
        slot: String,
        other: String,
        resource: String,
        #[label("'{slot}' would alias '{other}'")]
        span: Option<SourceSpan>,
    },

    #[error("'{slot}' is moved on some paths but not on others")]
    #[diagnostic(
        code(life_state_E0209),
        help("Move '{slot}' on every branch or on none of them")
    )]
    ConditionalMove { slot: String },

    #[error("unknown slot #{id}")]
    #[diagnostic(code(life_state_E0210))]
    UnknownSlot { id: u32 },

    #[error("'{ty}' has no field '{field}'")]
    #[diagnostic(code(life_state_E0211))]
    UnknownField { ty: String, field: String },

    #[error("value of '{ty}' is missing field '{field}'")]
    #[diagnostic(
        code(life_state_E0215),
        help("A whole '{ty}' value must carry every declared field")
    )]
    MissingField {
        ty: String,
        field: String,
        #[label("'{field}' missing here")]
        span: Option<SourceSpan>,
    },

    #[error("no open scope")]
    #[diagnostic(
        code(life_state_E0212),
        help("Enter a scope before declaring slots or exiting")
    )]
    NoOpenScope,

    #[error("'{slot}' cannot be both source and destination")]
    #[diagnostic(code(life_state_E0213))]
    SameSlot { slot: String },

    #[error("no slot named '{name}'")]
    #[diagnostic(
        code(life_state_E0214),
        help("Declare '{name}' before using it")
    )]
    UndeclaredSlot { name: String },
}

// ============================================================================
// Registration Errors (E0301-E0399)
// ============================================================================

/// A type definition was rejected at registration
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("duplicate type '{ty}'")]
    #[diagnostic(code(life_registry_E0301), help("'{ty}' is already registered"))]
    DuplicateType { ty: String },

    #[error("duplicate field '{field}' in '{ty}'")]
    #[diagnostic(code(life_registry_E0302))]
    DuplicateField { ty: String, field: String },

    #[error("duplicate constructor {signature} in '{ty}'")]
    #[diagnostic(
        code(life_registry_E0303),
        help("Overloads must differ in parameter count or types")
    )]
    DuplicateConstructor { ty: String, signature: String },

    #[error("field '{field}' of '{ty}' has unknown type '{field_ty}'")]
    #[diagnostic(
        code(life_registry_E0304),
        help("Register '{field_ty}' before '{ty}'")
    )]
    UnknownFieldType {
        ty: String,
        field: String,
        field_ty: String,
    },

    #[error("'{ty}' contains itself through field '{field}'")]
    #[diagnostic(
        code(life_registry_E0305),
        help("A value cannot hold itself by value; use a Pointer field")
    )]
    RecursiveType { ty: String, field: String },

    #[error("invalid constructor {signature} in '{ty}'")]
    #[diagnostic(code(life_registry_E0306), help("{reason}"))]
    InvalidConstructor {
        ty: String,
        signature: String,
        reason: String,
    },

    #[error("'{ty}' is declared trivial but field '{field}' is not")]
    #[diagnostic(
        code(life_registry_E0307),
        help("Trivial types may only contain trivial fields")
    )]
    InvalidTrivial { ty: String, field: String },

    #[error("destructor of '{ty}' names unknown field '{field}'")]
    #[diagnostic(code(life_registry_E0308))]
    UnknownUnmanaged { ty: String, field: String },

    #[error("'{ty}' nests fields {depth} levels deep")]
    #[diagnostic(
        code(life_registry_E0309),
        help("The configured limit is {limit}")
    )]
    DepthExceeded { ty: String, depth: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_delegate() {
        let err: LifeError = StateError::UseAfterMove {
            slot: "a".into(),
            span: None,
        }
        .into();
        assert_eq!(err.code().unwrap().to_string(), "life_state_E0201");
        assert_eq!(err.to_string(), "use of moved value 'a'");
    }

    #[test]
    fn test_labels_with_span() {
        let err: LifeError = ResolveError::NoConstructor {
            ty: "Person".into(),
            args: "(Int)".into(),
            candidates: "(), (String)".into(),
            span: Some(span_from(4, 6)),
        }
        .into();
        let labels: Vec<_> = err.labels().unwrap().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].offset(), 4);
        assert_eq!(labels[0].len(), 6);
        assert_eq!(
            err.help().unwrap().to_string(),
            "Available constructors: (), (String)"
        );
    }

    #[test]
    fn test_heap_help() {
        let err: LifeError = HeapError::DoubleFree(life_val::ResourceId(1)).into();
        assert!(err.help().is_some());
        assert_eq!(err.code().unwrap().to_string(), "life_heap_E0401");
    }
}
