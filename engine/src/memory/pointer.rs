use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::error::{AnalysisError, AnalysisResult};
use crate::memory::model::Memory;
use crate::memory::target::PointerTarget;

/// An abstract pointer value: the set of locations it may point to, together
/// with its static level of indirection and, once known, the byte size of the
/// type it points to.
#[derive(Clone, Debug)]
pub struct Pointer {
    /// locations this pointer may point to, never empty
    targets: BTreeSet<PointerTarget>,
    /// number of stars in the declared type, at least one
    level_of_indirection: usize,
    /// byte size of the pointee type, write-once
    size_of_target: Option<u64>,
}

impl Pointer {
    /// A pointer fresh from its declaration: nothing was assigned yet, so it
    /// points to null.
    pub fn new(level_of_indirection: usize) -> AnalysisResult<Self> {
        if level_of_indirection == 0 {
            return Err(AnalysisError::InvalidArgument(
                "a pointer needs at least one level of indirection".into(),
            ));
        }
        let mut targets = BTreeSet::new();
        targets.insert(PointerTarget::Null);
        Ok(Self {
            targets,
            level_of_indirection,
            size_of_target: None,
        })
    }

    /// A single-target pointer at one level of indirection, the shape of a
    /// freshly evaluated address expression.
    pub fn from_target(target: PointerTarget) -> Self {
        let mut targets = BTreeSet::new();
        targets.insert(target);
        Self {
            targets,
            level_of_indirection: 1,
            size_of_target: None,
        }
    }

    pub fn targets(&self) -> &BTreeSet<PointerTarget> {
        &self.targets
    }

    pub fn level_of_indirection(&self) -> usize {
        self.level_of_indirection
    }

    pub fn is_pointer_to_pointer(&self) -> bool {
        self.level_of_indirection > 1
    }

    pub fn contains(&self, target: &PointerTarget) -> bool {
        self.targets.contains(target)
    }

    pub fn has_size_of_target(&self) -> bool {
        self.size_of_target.is_some()
    }

    pub fn size_of_target(&self) -> Option<u64> {
        self.size_of_target
    }

    /// Record the byte size of the pointee type. The size is write-once:
    /// setting the same value again is a no-op, a different value is an
    /// illegal reassignment.
    pub fn set_size_of_target(&mut self, size: u64) -> AnalysisResult<()> {
        if size == 0 {
            return Err(AnalysisError::InvalidArgument(
                "the size of the pointee type must be positive".into(),
            ));
        }
        match self.size_of_target {
            Some(existing) if existing != size => Err(AnalysisError::IllegalReassignment(format!(
                "the size of the pointee type is already {} bytes, refusing {}",
                existing, size
            ))),
            _ => {
                self.size_of_target = Some(size);
                Ok(())
            }
        }
    }

    /// Make this pointer point to exactly one target.
    pub fn assign_target(&mut self, target: PointerTarget) {
        self.targets.clear();
        self.targets.insert(target);
    }

    /// Replace the target set with a copy of the other pointer's targets.
    pub fn assign(&mut self, rhs: &Pointer) {
        self.targets.clear();
        self.targets.extend(rhs.targets.iter().cloned());
    }

    /// Union the other pointer's targets into this one.
    pub fn join(&mut self, other: &Pointer) {
        self.targets.extend(other.targets.iter().cloned());
    }

    pub fn add_target(&mut self, target: PointerTarget) {
        self.targets.insert(target);
    }

    pub fn remove_target(&mut self, target: &PointerTarget) {
        self.targets.remove(target);
    }

    /// Drop every target the other pointer could also point to.
    pub fn remove_all_targets(&mut self, other: &Pointer) {
        for target in &other.targets {
            self.targets.remove(target);
        }
    }

    pub fn is_subset_of(&self, other: &Pointer) -> bool {
        self.targets.is_subset(&other.targets)
    }

    /// A dereference of this pointer may touch the null or an invalid address.
    pub fn is_unsafe(&self) -> bool {
        self.targets.contains(&PointerTarget::Null) || self.targets.contains(&PointerTarget::Invalid)
    }

    /// Every possible target of this pointer is a concrete location.
    pub fn is_safe(&self) -> bool {
        !(self.targets.contains(&PointerTarget::Null)
            || self.targets.contains(&PointerTarget::Invalid)
            || self.targets.contains(&PointerTarget::Unknown))
    }

    /// Follow one target to the pointer stored at that location. Sentinel
    /// targets hold no location and resolve to nothing.
    fn resolve<'a>(
        &self,
        target: &PointerTarget,
        memory: &'a mut Memory,
    ) -> AnalysisResult<Option<&'a mut Pointer>> {
        match target {
            PointerTarget::Variable(name) => match memory.get_pointer_mut(name) {
                Some(pointee) => Ok(Some(pointee)),
                None => Err(AnalysisError::TypeMismatch(format!(
                    "the target `{}` does not name a tracked pointer",
                    name
                ))),
            },
            PointerTarget::MemoryAddress(address) => memory
                .resolve_heap(address, self.level_of_indirection)
                .map(Some),
            PointerTarget::Null | PointerTarget::Invalid | PointerTarget::Unknown => Ok(None),
        }
    }

    /// The write `*this = rhs`. Every target is followed one step and the
    /// pointee behind it updated with the right-hand side: a single possible
    /// target permits a strong update, several possible targets force a weak
    /// update on each of them.
    pub fn assign_through(&self, rhs: &Pointer, memory: &mut Memory) -> AnalysisResult<()> {
        let strong = self.targets.len() == 1;
        for target in &self.targets {
            if let Some(pointee) = self.resolve(target, memory)? {
                if strong {
                    pointee.assign(rhs);
                } else {
                    pointee.join(rhs);
                }
            }
        }
        Ok(())
    }

    /// The read `*this`: a pointer at one lower level of indirection whose
    /// targets are the union over all resolved pointees. A null or invalid
    /// target contributes an invalid result, an unknown target stays unknown.
    pub fn deref(&self, memory: &mut Memory) -> AnalysisResult<Pointer> {
        if self.level_of_indirection < 2 {
            return Err(AnalysisError::InvalidDereference(
                "the target of this pointer is not a pointer".into(),
            ));
        }
        let mut result = Pointer::new(self.level_of_indirection - 1)?;
        result.targets.clear();
        for target in &self.targets {
            match target {
                PointerTarget::Null | PointerTarget::Invalid => {
                    result.add_target(PointerTarget::Invalid);
                }
                PointerTarget::Unknown => {
                    result.add_target(PointerTarget::Unknown);
                }
                PointerTarget::Variable(_) | PointerTarget::MemoryAddress(_) => {
                    if let Some(pointee) = self.resolve(target, memory)? {
                        result.join(pointee);
                    }
                }
            }
        }
        Ok(result)
    }

    /// Advance this pointer by a number of elements. Without a known pointee
    /// size the byte displacement cannot be computed and the offsets of all
    /// heap targets become untracked.
    pub fn add_offset(&mut self, shift: i64) {
        let bytes = self
            .size_of_target
            .and_then(|size| i64::try_from(size).ok())
            .and_then(|size| shift.checked_mul(size));
        match bytes {
            Some(bytes) => {
                self.targets = self
                    .targets
                    .iter()
                    .map(|target| target.add_offset(bytes))
                    .collect();
            }
            None => self.add_unknown_offset(),
        }
    }

    /// Advance this pointer by an untracked number of elements.
    pub fn add_unknown_offset(&mut self) {
        self.targets = self
            .targets
            .iter()
            .map(|target| target.add_unknown_offset())
            .collect();
    }

    /// The shift `*this += shift`, applied to every pointee one resolution
    /// step away. Sentinel targets are skipped.
    pub fn add_offset_through(&self, shift: i64, memory: &mut Memory) -> AnalysisResult<()> {
        if self.size_of_target.is_none() {
            return self.add_unknown_offset_through(memory);
        }
        for target in &self.targets {
            if let Some(pointee) = self.resolve(target, memory)? {
                pointee.add_offset(shift);
            }
        }
        Ok(())
    }

    /// The shift `*this += shift` for an untracked shift amount.
    pub fn add_unknown_offset_through(&self, memory: &mut Memory) -> AnalysisResult<()> {
        for target in &self.targets {
            if let Some(pointee) = self.resolve(target, memory)? {
                pointee.add_unknown_offset();
            }
        }
        Ok(())
    }
}

/// Two pointers are the same abstract value when they may point to the same
/// set of targets, regardless of declared level or pointee size.
impl PartialEq for Pointer {
    fn eq(&self, other: &Self) -> bool {
        self.targets == other.targets
    }
}
impl Eq for Pointer {}

impl Display for Pointer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for _ in 0..self.level_of_indirection {
            write!(f, "*")?;
        }
        write!(f, "(")?;
        for target in &self.targets {
            write!(f, " {}", target)?;
        }
        write!(f, " )")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::target::{AllocId, MemoryAddress, Offset};

    fn addr(index: u64, offset: i64) -> MemoryAddress {
        MemoryAddress::with_offset(AllocId::from(index), Offset::Known(offset))
    }

    #[test]
    fn test_new_rejects_level_zero() {
        assert!(matches!(
            Pointer::new(0),
            Err(AnalysisError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_new_points_to_null() {
        let pointer = Pointer::new(2).unwrap();
        assert_eq!(pointer.level_of_indirection(), 2);
        assert!(pointer.is_pointer_to_pointer());
        assert_eq!(pointer.targets().len(), 1);
        assert!(pointer.contains(&PointerTarget::Null));
        assert!(!pointer.has_size_of_target());
    }

    #[test]
    fn test_size_of_target_is_write_once() {
        let mut pointer = Pointer::new(1).unwrap();
        assert!(matches!(
            pointer.set_size_of_target(0),
            Err(AnalysisError::InvalidArgument(_))
        ));
        pointer.set_size_of_target(4).unwrap();
        pointer.set_size_of_target(4).unwrap();
        assert!(matches!(
            pointer.set_size_of_target(8),
            Err(AnalysisError::IllegalReassignment(_))
        ));
        assert_eq!(pointer.size_of_target(), Some(4));
    }

    #[test]
    fn test_equality_ignores_level_and_size() {
        let shallow = Pointer::new(1).unwrap();
        let mut deep = Pointer::new(3).unwrap();
        deep.set_size_of_target(8).unwrap();
        assert_eq!(shallow, deep);

        let mut other = Pointer::new(1).unwrap();
        other.add_target(PointerTarget::Unknown);
        assert_ne!(shallow, other);
    }

    #[test]
    fn test_assign_and_join() {
        let mut pointer = Pointer::new(1).unwrap();
        let rhs = Pointer::from_target(PointerTarget::Variable("a".into()));

        pointer.assign(&rhs);
        assert_eq!(pointer, rhs);

        pointer.join(&Pointer::from_target(PointerTarget::Null));
        assert_eq!(pointer.targets().len(), 2);
        assert!(pointer.contains(&PointerTarget::Null));
        assert!(pointer.contains(&PointerTarget::Variable("a".into())));
    }

    #[test]
    fn test_remove_all_targets() {
        let mut pointer = Pointer::from_target(PointerTarget::Variable("a".into()));
        pointer.add_target(PointerTarget::Null);
        pointer.remove_all_targets(&Pointer::from_target(PointerTarget::Null));
        assert_eq!(
            pointer,
            Pointer::from_target(PointerTarget::Variable("a".into()))
        );
        assert!(pointer.is_subset_of(&Pointer::from_target(PointerTarget::Variable("a".into()))));
    }

    #[test]
    fn test_safety_classification() {
        let mut pointer = Pointer::from_target(PointerTarget::MemoryAddress(addr(0, 0)));
        assert!(pointer.is_safe());
        assert!(!pointer.is_unsafe());

        pointer.add_target(PointerTarget::Unknown);
        assert!(!pointer.is_safe());
        assert!(!pointer.is_unsafe());

        pointer.add_target(PointerTarget::Null);
        assert!(pointer.is_unsafe());
    }

    #[test]
    fn test_add_offset_scales_by_pointee_size() {
        let mut pointer = Pointer::from_target(PointerTarget::MemoryAddress(addr(1, 8)));
        pointer.set_size_of_target(4).unwrap();
        pointer.add_offset(3);
        assert!(pointer.contains(&PointerTarget::MemoryAddress(addr(1, 20))));
    }

    #[test]
    fn test_add_offset_without_size_forgets_offsets() {
        let mut pointer = Pointer::from_target(PointerTarget::MemoryAddress(addr(1, 8)));
        pointer.add_target(PointerTarget::Null);
        pointer.add_offset(3);
        assert!(pointer.contains(&PointerTarget::MemoryAddress(
            MemoryAddress::with_offset(AllocId::from(1), Offset::Unknown)
        )));
        assert!(pointer.contains(&PointerTarget::Null));
    }

    #[test]
    fn test_add_offset_pushes_variable_target_invalid() {
        let mut pointer = Pointer::from_target(PointerTarget::Variable("a".into()));
        pointer.set_size_of_target(4).unwrap();
        pointer.add_offset(0);
        assert!(pointer.contains(&PointerTarget::Variable("a".into())));
        pointer.add_offset(1);
        assert_eq!(pointer, Pointer::from_target(PointerTarget::Invalid));
    }

    #[test]
    fn test_assign_through_single_target_is_strong() {
        let mut memory = Memory::new();
        memory.add_variable("a".into(), Pointer::new(1).unwrap());

        let writer = Pointer::from_target(PointerTarget::Variable("a".into()));
        let rhs = Pointer::from_target(PointerTarget::MemoryAddress(addr(0, 0)));
        writer.assign_through(&rhs, &mut memory).unwrap();

        assert_eq!(memory.get_pointer(&"a".into()), Some(&rhs));
    }

    #[test]
    fn test_assign_through_many_targets_is_weak() {
        let mut memory = Memory::new();
        memory.add_variable("a".into(), Pointer::new(1).unwrap());
        memory.add_variable("b".into(), Pointer::new(1).unwrap());

        let mut writer = Pointer::from_target(PointerTarget::Variable("a".into()));
        writer.add_target(PointerTarget::Variable("b".into()));
        let rhs = Pointer::from_target(PointerTarget::MemoryAddress(addr(0, 0)));
        writer.assign_through(&rhs, &mut memory).unwrap();

        for name in ["a", "b"] {
            let pointee = memory.get_pointer(&name.into()).unwrap();
            assert!(pointee.contains(&PointerTarget::Null));
            assert!(pointee.contains(&PointerTarget::MemoryAddress(addr(0, 0))));
        }
    }

    #[test]
    fn test_assign_through_skips_sentinels() {
        let mut memory = Memory::new();
        memory.add_variable("a".into(), Pointer::new(1).unwrap());

        let mut writer = Pointer::from_target(PointerTarget::Variable("a".into()));
        writer.add_target(PointerTarget::Null);
        let rhs = Pointer::from_target(PointerTarget::Unknown);
        writer.assign_through(&rhs, &mut memory).unwrap();

        let pointee = memory.get_pointer(&"a".into()).unwrap();
        assert!(pointee.contains(&PointerTarget::Null));
        assert!(pointee.contains(&PointerTarget::Unknown));
    }

    #[test]
    fn test_assign_through_unresolved_variable_is_an_error() {
        let mut memory = Memory::new();
        let writer = Pointer::from_target(PointerTarget::Variable("ghost".into()));
        let rhs = Pointer::from_target(PointerTarget::Null);
        assert!(matches!(
            writer.assign_through(&rhs, &mut memory),
            Err(AnalysisError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_assign_through_materializes_missing_heap_cell() {
        let mut memory = Memory::new();
        let writer = Pointer::from_target(PointerTarget::MemoryAddress(addr(7, 0)));
        let rhs = Pointer::from_target(PointerTarget::Invalid);
        writer.assign_through(&rhs, &mut memory).unwrap();

        let cell = memory.get_heap_pointer(&addr(7, 0)).unwrap();
        assert_eq!(cell, &rhs);
        assert_eq!(cell.level_of_indirection(), 1);
    }

    #[test]
    fn test_deref_requires_pointer_to_pointer() {
        let mut memory = Memory::new();
        let pointer = Pointer::new(1).unwrap();
        assert!(matches!(
            pointer.deref(&mut memory),
            Err(AnalysisError::InvalidDereference(_))
        ));
    }

    #[test]
    fn test_deref_unions_resolved_pointees() {
        let mut memory = Memory::new();
        memory.add_variable(
            "a".into(),
            Pointer::from_target(PointerTarget::MemoryAddress(addr(0, 0))),
        );
        memory.add_variable(
            "b".into(),
            Pointer::from_target(PointerTarget::MemoryAddress(addr(1, 4))),
        );

        let mut pointer = Pointer::new(2).unwrap();
        pointer.assign_target(PointerTarget::Variable("a".into()));
        pointer.add_target(PointerTarget::Variable("b".into()));

        let resolved = pointer.deref(&mut memory).unwrap();
        assert_eq!(resolved.level_of_indirection(), 1);
        assert_eq!(resolved.targets().len(), 2);
        assert!(resolved.contains(&PointerTarget::MemoryAddress(addr(0, 0))));
        assert!(resolved.contains(&PointerTarget::MemoryAddress(addr(1, 4))));
    }

    #[test]
    fn test_deref_maps_sentinels() {
        let mut memory = Memory::new();
        let mut pointer = Pointer::new(2).unwrap();
        pointer.add_target(PointerTarget::Invalid);
        pointer.add_target(PointerTarget::Unknown);

        let resolved = pointer.deref(&mut memory).unwrap();
        assert_eq!(resolved.targets().len(), 2);
        assert!(resolved.contains(&PointerTarget::Invalid));
        assert!(resolved.contains(&PointerTarget::Unknown));
    }

    #[test]
    fn test_deref_materializes_null_initialized_heap_cell() {
        let mut memory = Memory::new();
        let mut pointer = Pointer::new(2).unwrap();
        pointer.assign_target(PointerTarget::MemoryAddress(addr(3, 0)));

        let resolved = pointer.deref(&mut memory).unwrap();
        assert_eq!(resolved, Pointer::new(1).unwrap());

        let cell = memory.get_heap_pointer(&addr(3, 0)).unwrap();
        assert_eq!(cell.level_of_indirection(), 1);
        assert!(cell.contains(&PointerTarget::Null));
    }

    #[test]
    fn test_add_offset_through_scales_by_pointee_size() {
        let mut memory = Memory::new();
        let mut held = Pointer::from_target(PointerTarget::MemoryAddress(addr(0, 0)));
        held.set_size_of_target(8).unwrap();
        memory.add_variable("a".into(), held);

        let mut writer = Pointer::from_target(PointerTarget::Variable("a".into()));
        writer.set_size_of_target(4).unwrap();
        writer.add_offset_through(2, &mut memory).unwrap();

        let pointee = memory.get_pointer(&"a".into()).unwrap();
        assert!(pointee.contains(&PointerTarget::MemoryAddress(addr(0, 16))));
    }

    #[test]
    fn test_add_offset_through_without_own_size_forgets_offsets() {
        let mut memory = Memory::new();
        let mut held = Pointer::from_target(PointerTarget::MemoryAddress(addr(0, 0)));
        held.set_size_of_target(8).unwrap();
        memory.add_variable("a".into(), held);

        let writer = Pointer::from_target(PointerTarget::Variable("a".into()));
        writer.add_offset_through(2, &mut memory).unwrap();

        let pointee = memory.get_pointer(&"a".into()).unwrap();
        assert!(pointee.contains(&PointerTarget::MemoryAddress(
            MemoryAddress::with_offset(AllocId::from(0), Offset::Unknown)
        )));
    }

    #[test]
    fn test_display() {
        let mut pointer = Pointer::new(2).unwrap();
        pointer.add_target(PointerTarget::MemoryAddress(addr(0, 0)));
        assert_eq!(pointer.to_string(), "**( heap#0@0 null )");
    }
}
