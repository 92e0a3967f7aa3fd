use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use crate::error::AnalysisResult;
use crate::memory::pointer::Pointer;
use crate::memory::target::{AllocId, MemoryAddress, PointerTarget, VarName};

/// The target that is definitely the null address.
pub const NULL_POINTER: PointerTarget = PointerTarget::Null;
/// The target of a pointer that must never be dereferenced.
pub const INVALID_POINTER: PointerTarget = PointerTarget::Invalid;
/// The target of a pointer the analysis lost track of.
pub const UNKNOWN_POINTER: PointerTarget = PointerTarget::Unknown;

/// The universe of locations that hold pointers: named variables and heap
/// cells. All reads and writes of stored pointers go through this table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Memory {
    /// pointers held by named variables
    variables: BTreeMap<VarName, Pointer>,
    /// pointers held in heap cells
    heap: BTreeMap<MemoryAddress, Pointer>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.heap.is_empty()
    }

    /// Start tracking a named variable.
    pub fn add_variable(&mut self, name: VarName, pointer: Pointer) {
        self.variables.insert(name, pointer);
    }

    pub fn get_pointer(&self, name: &VarName) -> Option<&Pointer> {
        self.variables.get(name)
    }

    pub fn get_pointer_mut(&mut self, name: &VarName) -> Option<&mut Pointer> {
        self.variables.get_mut(name)
    }

    pub fn get_heap_pointer(&self, address: &MemoryAddress) -> Option<&Pointer> {
        self.heap.get(address)
    }

    pub fn get_heap_pointer_mut(&mut self, address: &MemoryAddress) -> Option<&mut Pointer> {
        self.heap.get_mut(address)
    }

    /// Store a pointer into a heap cell.
    pub fn write_on_heap(&mut self, address: MemoryAddress, pointer: Pointer) {
        self.heap.insert(address, pointer);
    }

    /// Fetch the pointer stored in a heap cell. A cell nothing was ever
    /// written to materializes on first use as a null-initialized pointer one
    /// level of indirection below the asking pointer, never below one level.
    pub fn resolve_heap(
        &mut self,
        address: &MemoryAddress,
        level_of_indirection: usize,
    ) -> AnalysisResult<&mut Pointer> {
        match self.heap.entry(*address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let fresh = Pointer::new(level_of_indirection.saturating_sub(1).max(1))?;
                Ok(entry.insert(fresh))
            }
        }
    }

    pub fn variables(&self) -> impl Iterator<Item = (&VarName, &Pointer)> {
        self.variables.iter()
    }

    pub fn heap_cells(&self) -> impl Iterator<Item = (&MemoryAddress, &Pointer)> {
        self.heap.iter()
    }

    /// Every pointer stored anywhere, mutably.
    pub fn pointers_mut(&mut self) -> impl Iterator<Item = &mut Pointer> {
        self.variables.values_mut().chain(self.heap.values_mut())
    }

    /// Pointwise union with another memory: locations tracked on both sides
    /// union their targets, locations only the other side tracks are adopted.
    pub fn join(&mut self, other: &Memory) {
        for (name, theirs) in &other.variables {
            self.variables
                .entry(name.clone())
                .and_modify(|ours| ours.join(theirs))
                .or_insert_with(|| theirs.clone());
        }
        for (address, theirs) in &other.heap {
            self.heap
                .entry(*address)
                .and_modify(|ours| ours.join(theirs))
                .or_insert_with(|| theirs.clone());
        }
    }

    /// Every location tracked here is also tracked there, with at least the
    /// same targets.
    pub fn is_covered_by(&self, other: &Memory) -> bool {
        self.variables.iter().all(|(name, ours)| {
            other
                .variables
                .get(name)
                .map_or(false, |theirs| ours.is_subset_of(theirs))
        }) && self.heap.iter().all(|(address, ours)| {
            other
                .heap
                .get(address)
                .map_or(false, |theirs| ours.is_subset_of(theirs))
        })
    }

    /// The given allocations are gone: every pointer still aiming at one of
    /// them now points to an invalid address, and their cells are dropped.
    pub fn invalidate_allocations(&mut self, allocations: &BTreeSet<AllocId>) {
        for pointer in self.pointers_mut() {
            let doomed: Vec<PointerTarget> = pointer
                .targets()
                .iter()
                .filter(|target| {
                    matches!(
                        target,
                        PointerTarget::MemoryAddress(address)
                            if allocations.contains(&address.allocation())
                    )
                })
                .cloned()
                .collect();
            for target in doomed {
                pointer.remove_target(&target);
                pointer.add_target(INVALID_POINTER);
            }
        }
        self.heap
            .retain(|address, _| !allocations.contains(&address.allocation()));
    }
}

impl Display for Memory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (name, pointer) in &self.variables {
            writeln!(f, "{}: {}", name, pointer)?;
        }
        for (address, pointer) in &self.heap {
            writeln!(f, "{}: {}", address, pointer)?;
        }
        Ok(())
    }
}
