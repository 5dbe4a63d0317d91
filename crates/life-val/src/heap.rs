//! Simulated allocation store
//!
//! Lifecycle bodies (explicit constructors, copies and destructors) allocate
//! and release pointer-like resources through [`Heap`]. Freed allocations are
//! kept as tombstones so double frees and dangling accesses are reported
//! instead of silently succeeding.

use crate::{ResourceId, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HeapError {
    #[error("double free of allocation {0}")]
    DoubleFree(ResourceId),

    #[error("use of freed allocation {0}")]
    UseAfterFree(ResourceId),

    #[error("pointer {0} does not refer to any allocation")]
    Dangling(ResourceId),

    #[error("null pointer dereference")]
    NullDeref,

    #[error("index {index} out of bounds for allocation {id} of length {len}")]
    OutOfBounds {
        id: ResourceId,
        index: usize,
        len: usize,
    },

    /// Failure raised by a lifecycle body itself
    #[error("{0}")]
    Body(String),
}

pub type HeapResult<T> = std::result::Result<T, HeapError>;

#[derive(Debug, Clone)]
struct Allocation {
    cells: Vec<Value>,
    freed: bool,
}

#[derive(Debug, Default)]
pub struct Heap {
    allocs: BTreeMap<ResourceId, Allocation>,
    next_id: u32,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `len` cells, each initialized to `nil`
    pub fn alloc(&mut self, len: usize) -> ResourceId {
        self.alloc_with(vec![Value::Nil; len])
    }

    pub fn alloc_with(&mut self, cells: Vec<Value>) -> ResourceId {
        self.next_id += 1;
        let id = ResourceId(self.next_id);
        self.allocs.insert(
            id,
            Allocation {
                cells,
                freed: false,
            },
        );
        id
    }

    /// Resolve a pointer value to its allocation handle
    pub fn deref(value: &Value) -> HeapResult<ResourceId> {
        match value {
            Value::Ptr(Some(id)) => Ok(*id),
            _ => Err(HeapError::NullDeref),
        }
    }

    fn live(&self, id: ResourceId) -> HeapResult<&Allocation> {
        match self.allocs.get(&id) {
            Some(a) if a.freed => Err(HeapError::UseAfterFree(id)),
            Some(a) => Ok(a),
            None => Err(HeapError::Dangling(id)),
        }
    }

    fn live_mut(&mut self, id: ResourceId) -> HeapResult<&mut Allocation> {
        match self.allocs.get_mut(&id) {
            Some(a) if a.freed => Err(HeapError::UseAfterFree(id)),
            Some(a) => Ok(a),
            None => Err(HeapError::Dangling(id)),
        }
    }

    pub fn len(&self, id: ResourceId) -> HeapResult<usize> {
        Ok(self.live(id)?.cells.len())
    }

    pub fn load(&self, id: ResourceId, index: usize) -> HeapResult<Value> {
        let alloc = self.live(id)?;
        alloc
            .cells
            .get(index)
            .cloned()
            .ok_or(HeapError::OutOfBounds {
                id,
                index,
                len: alloc.cells.len(),
            })
    }

    pub fn store(&mut self, id: ResourceId, index: usize, value: Value) -> HeapResult<()> {
        let alloc = self.live_mut(id)?;
        let len = alloc.cells.len();
        match alloc.cells.get_mut(index) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(HeapError::OutOfBounds { id, index, len }),
        }
    }

    /// Snapshot of every cell in the allocation
    pub fn cells(&self, id: ResourceId) -> HeapResult<Vec<Value>> {
        Ok(self.live(id)?.cells.clone())
    }

    pub fn free(&mut self, id: ResourceId) -> HeapResult<()> {
        match self.allocs.get_mut(&id) {
            Some(a) if a.freed => Err(HeapError::DoubleFree(id)),
            Some(a) => {
                a.freed = true;
                a.cells.clear();
                Ok(())
            }
            None => Err(HeapError::Dangling(id)),
        }
    }

    pub fn is_live(&self, id: ResourceId) -> bool {
        self.live(id).is_ok()
    }

    /// Number of allocations that have not been freed yet
    pub fn live_count(&self) -> usize {
        self.allocs.values().filter(|a| !a.freed).count()
    }
}
