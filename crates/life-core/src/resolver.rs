//! Lifecycle operation selection
//!
//! The resolver decides which lifecycle operation applies to a request and
//! whether it is permitted. It never mutates anything: [`MoveTracker`],
//! [`DestructionScheduler`] and the tracker facade act on what it returns.
//!
//! [`MoveTracker`]: crate::moves::MoveTracker
//! [`DestructionScheduler`]: crate::scheduler::DestructionScheduler

use crate::error::{LifeResult, ResolveError};
use crate::registry::{TypeInfo, TypeRegistry};
use crate::slot::{SlotId, SlotStore, ValueSlot};
use crate::synth::{CopyPlan, DestroyPlan};
use life_val::{Value, ANY_TYPE};
use log::trace;
use miette::SourceSpan;
use strum_macros::{Display, IntoStaticStr};

/// Kind of lifecycle operation, used in diagnostics and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum OpKind {
    Init,
    Copy,
    ConsumingMove,
    TakingMove,
    Destroy,
}

/// What the host asks for
#[derive(Debug, Clone, PartialEq)]
pub enum OpRequest {
    Init { args: Vec<Value> },
    Copy { source: SlotId },
    /// `last_use` is the host flow analysis verdict: the source is not used
    /// again on any path after this point
    ConsumingMove { source: SlotId, last_use: bool },
    TakingMove { source: SlotId },
    Destroy { slot: SlotId },
}

impl OpRequest {
    pub fn kind(&self) -> OpKind {
        match self {
            OpRequest::Init { .. } => OpKind::Init,
            OpRequest::Copy { .. } => OpKind::Copy,
            OpRequest::ConsumingMove { .. } => OpKind::ConsumingMove,
            OpRequest::TakingMove { .. } => OpKind::TakingMove,
            OpRequest::Destroy { .. } => OpKind::Destroy,
        }
    }
}

/// A permitted operation together with the plan selected for it
#[derive(Debug, Clone)]
pub enum LifecycleOp {
    /// `ctor` indexes the type's constructor list
    Init { ctor: usize, args: Vec<Value> },
    Copy { source: SlotId, plan: CopyPlan },
    ConsumingMove { source: SlotId },
    TakingMove { source: SlotId },
    Destroy { slot: SlotId, plan: DestroyPlan },
}

impl LifecycleOp {
    pub fn kind(&self) -> OpKind {
        match self {
            LifecycleOp::Init { .. } => OpKind::Init,
            LifecycleOp::Copy { .. } => OpKind::Copy,
            LifecycleOp::ConsumingMove { .. } => OpKind::ConsumingMove,
            LifecycleOp::TakingMove { .. } => OpKind::TakingMove,
            LifecycleOp::Destroy { .. } => OpKind::Destroy,
        }
    }
}

pub struct LifecycleResolver<'a> {
    registry: &'a TypeRegistry,
    slots: &'a SlotStore,
}

impl<'a> LifecycleResolver<'a> {
    pub fn new(registry: &'a TypeRegistry, slots: &'a SlotStore) -> Self {
        Self { registry, slots }
    }

    /// Pick the lifecycle operation for `request` on a value of type `ty`
    ///
    /// # Errors
    /// - `NoConstructor` when no overload accepts the arguments
    /// - `NotCopyable` when the type neither defines nor synthesizes a copy
    /// - `NotMovable` when the move capability is missing
    /// - `LifetimeNotProvablyEnding` when a consumed source may still be used
    /// - any read error of the source slot (moved, partially initialized)
    pub fn resolve(&self, ty: &str, request: &OpRequest) -> LifeResult<LifecycleOp> {
        let info = self.registry.get(ty)?;
        trace!("resolve {} on {}", request.kind(), ty);
        match request {
            OpRequest::Init { args } => self.resolve_init(info, args, None),
            OpRequest::Copy { source } => {
                let src = self.source(*source, info)?;
                match &info.copy {
                    Ok(plan) => Ok(LifecycleOp::Copy {
                        source: *source,
                        plan: plan.clone(),
                    }),
                    Err(reason) => Err(ResolveError::NotCopyable {
                        ty: ty.to_string(),
                        reason: reason.clone(),
                        span: src.span,
                    }
                    .into()),
                }
            }
            OpRequest::ConsumingMove { source, last_use } => {
                let src = self.source(*source, info)?;
                if !info.flags().has_consuming_move {
                    return Err(not_movable(info, OpKind::ConsumingMove, src.span));
                }
                if !src.binding.is_owned() {
                    return Err(ResolveError::LifetimeNotProvablyEnding {
                        slot: src.name.to_string(),
                        reason: format!(
                            "'{}' is a {} binding; its value is owned elsewhere and outlives it",
                            src.name, src.binding
                        ),
                        span: src.span,
                    }
                    .into());
                }
                if !last_use {
                    return Err(ResolveError::LifetimeNotProvablyEnding {
                        slot: src.name.to_string(),
                        reason: format!("'{}' is used again after this point", src.name),
                        span: src.span,
                    }
                    .into());
                }
                Ok(LifecycleOp::ConsumingMove { source: *source })
            }
            OpRequest::TakingMove { source } => {
                let src = self.source(*source, info)?;
                if !info.flags().has_taking_move {
                    return Err(not_movable(info, OpKind::TakingMove, src.span));
                }
                Ok(LifecycleOp::TakingMove { source: *source })
            }
            OpRequest::Destroy { slot } => {
                self.slots.get(*slot)?;
                Ok(LifecycleOp::Destroy {
                    slot: *slot,
                    plan: info.destroy.clone(),
                })
            }
        }
    }

    /// Overload selection for a constructor call
    ///
    /// A parameter matches an argument of the same type; `Any` matches every
    /// argument. Registration rejects identical signatures, so at most one
    /// overload without `Any` parameters can match exactly. Otherwise the
    /// overload with the most exact parameter matches wins; a tie between
    /// the best overloads is ambiguous.
    pub fn resolve_init(
        &self,
        info: &TypeInfo,
        args: &[Value],
        span: Option<SourceSpan>,
    ) -> LifeResult<LifecycleOp> {
        let ctor = self.select_constructor(info, args, span)?;
        Ok(LifecycleOp::Init {
            ctor,
            args: args.to_vec(),
        })
    }

    /// Index of the constructor a call with `args` selects
    pub fn select_constructor(
        &self,
        info: &TypeInfo,
        args: &[Value],
        span: Option<SourceSpan>,
    ) -> LifeResult<usize> {
        let arg_types: Vec<_> = args.iter().map(|a| a.type_name()).collect();
        let constructors = &info.desc.methods.constructors;
        let mut best: Vec<usize> = Vec::new();
        let mut best_score = 0;
        for (idx, ctor) in constructors.iter().enumerate() {
            if ctor.arity() != args.len() {
                continue;
            }
            let mut exact = 0;
            let matches = ctor.params.iter().zip(&arg_types).all(|(param, arg)| {
                if param == arg {
                    exact += 1;
                    true
                } else {
                    param == ANY_TYPE
                }
            });
            if !matches {
                continue;
            }
            if best.is_empty() || exact > best_score {
                best = vec![idx];
                best_score = exact;
            } else if exact == best_score {
                best.push(idx);
            }
        }

        let args = format!("({})", arg_types.join(", "));
        match best.as_slice() {
            [ctor] => Ok(*ctor),
            [] => {
                let candidates = constructors.iter().map(|c| c.signature()).collect::<Vec<_>>();
                Err(ResolveError::NoConstructor {
                    ty: info.name().to_string(),
                    args,
                    candidates: if candidates.is_empty() {
                        "none; the type has no lifecycle and cannot produce instances".into()
                    } else {
                        candidates.join(", ")
                    },
                    span,
                }
                .into())
            }
            tied => Err(ResolveError::AmbiguousConstructor {
                ty: info.name().to_string(),
                args,
                candidates: tied
                    .iter()
                    .map(|idx| constructors[*idx].signature())
                    .collect::<Vec<_>>()
                    .join(", "),
                span,
            }
            .into()),
        }
    }

    fn source(&self, id: SlotId, info: &TypeInfo) -> LifeResult<&'a ValueSlot> {
        let slot = self.slots.get(id)?;
        slot.check_readable(info)?;
        Ok(slot)
    }
}

fn not_movable(info: &TypeInfo, kind: OpKind, span: Option<SourceSpan>) -> crate::error::LifeError {
    ResolveError::NotMovable {
        ty: info.name().to_string(),
        kind: kind.to_string().replace('_', " "),
        span,
    }
    .into()
}
