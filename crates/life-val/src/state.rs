//! Ownership states of a storage slot

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use strum_macros::{Display, EnumString, IntoStaticStr};

/// Index of a field in its type's declaration order
pub type FieldId = usize;

/// Where a slot is in its lifecycle
///
/// ```text
/// Uninitialized -> PartiallyInitialized -> Live -> Destroyed
///                                           |
///                                           +-> Moved (terminal, never destroyed)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SlotState {
    #[default]
    Uninitialized,
    PartiallyInitialized(BTreeSet<FieldId>),
    Live,
    Moved,
    Destroyed,
}

impl SlotState {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    pub fn is_moved(&self) -> bool {
        matches!(self, Self::Moved)
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Whether the scheduler still owes this slot a destruction pass
    pub fn needs_destroy(&self) -> bool {
        !matches!(self, Self::Moved | Self::Destroyed)
    }

    /// Whether field `id` holds an initialized value
    pub fn is_field_init(&self, id: FieldId) -> bool {
        match self {
            Self::Live => true,
            Self::PartiallyInitialized(set) => set.contains(&id),
            _ => false,
        }
    }

    /// Initialized field ids, given the number of declared fields
    pub fn initialized(&self, total: usize) -> BTreeSet<FieldId> {
        match self {
            Self::Live => (0..total).collect(),
            Self::PartiallyInitialized(set) => set.clone(),
            _ => BTreeSet::new(),
        }
    }

    /// Build the state for a set of initialized fields
    pub fn from_initialized(set: BTreeSet<FieldId>, total: usize) -> Self {
        if set.len() == total {
            Self::Live
        } else if set.is_empty() {
            Self::Uninitialized
        } else {
            Self::PartiallyInitialized(set)
        }
    }

    /// State after field `id` has been assigned
    ///
    /// Returns `None` when the slot is not under construction.
    pub fn with_field(&self, id: FieldId, total: usize) -> Option<Self> {
        match self {
            Self::Uninitialized | Self::PartiallyInitialized(_) | Self::Live => {
                let mut set = self.initialized(total);
                set.insert(id);
                Some(Self::from_initialized(set, total))
            }
            Self::Moved | Self::Destroyed => None,
        }
    }

    /// Merge the states reached on two control-flow branches
    ///
    /// Initialization merges by intersection: a field is initialized after
    /// the join only when both branches initialized it. A slot moved or
    /// destroyed on one branch only has no single state, `None` is returned.
    pub fn join(&self, other: &Self, total: usize) -> Option<Self> {
        match (self, other) {
            (a, b) if a == b => Some(a.clone()),
            (Self::Moved, _) | (_, Self::Moved) => None,
            (Self::Destroyed, _) | (_, Self::Destroyed) => None,
            (a, b) => {
                let set = a
                    .initialized(total)
                    .intersection(&b.initialized(total))
                    .copied()
                    .collect();
                Some(Self::from_initialized(set, total))
            }
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::PartiallyInitialized(set) => {
                write!(f, "partially initialized (fields ")?;
                for (i, id) in set.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "#{}", id)?;
                }
                write!(f, ")")
            }
            Self::Live => write!(f, "live"),
            Self::Moved => write!(f, "moved"),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// How a binding holds its value, decided by the host's call resolution
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BindingMode {
    /// The binding owns its value (locals, owned-transfer parameters)
    #[default]
    Owned,
    /// Read-only alias of a value owned elsewhere
    Borrowed,
    /// Exclusive alias of a value owned elsewhere
    MutBorrowed,
}

impl BindingMode {
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned)
    }
}
