//
// Points-to:
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use petra_shared::logging::Tracer;

use crate::analysis::domain::{covered_by, AbstractDomain};
use crate::error::{AnalysisError, AnalysisResult};
use crate::ir::bridge::cfg::{BranchCase, Edge};
use crate::ir::bridge::program::{Lvalue, Program, Rvalue, Statement};
use crate::memory::model::{Memory, INVALID_POINTER, NULL_POINTER, UNKNOWN_POINTER};
use crate::memory::pointer::Pointer;
use crate::memory::target::{AllocId, MemoryAddress, Offset, PointerTarget, VarName};

/// The abstract state at one program point: a snapshot of all tracked memory
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct PointsToState {
    pub memory: Memory,
}

impl PointsToState {
    /// The state at procedure entry: every declared variable fresh from its
    /// declaration.
    pub fn entry(program: &Program) -> Self {
        let mut memory = Memory::new();
        for (name, pointer) in &program.variables {
            memory.add_variable(name.clone(), pointer.clone());
        }
        Self { memory }
    }
}

/// Collapse targets that differ only in their known offset into one target
/// of the same allocation at an unknown offset. This bounds the offset
/// chains that pointer arithmetic in a loop would otherwise grow forever.
fn widen_offsets(pointer: &mut Pointer) {
    let mut seen: BTreeMap<AllocId, BTreeSet<Offset>> = BTreeMap::new();
    for target in pointer.targets() {
        if let PointerTarget::MemoryAddress(address) = target {
            seen.entry(address.allocation())
                .or_default()
                .insert(address.offset());
        }
    }
    for (allocation, offsets) in seen {
        if offsets.len() > 1 {
            for offset in offsets {
                pointer.remove_target(&PointerTarget::MemoryAddress(MemoryAddress::with_offset(
                    allocation, offset,
                )));
            }
            pointer.add_target(PointerTarget::MemoryAddress(MemoryAddress::with_offset(
                allocation,
                Offset::Unknown,
            )));
        }
    }
}

impl AbstractDomain for PointsToState {
    fn join(&self, other: &Self) -> Self {
        let mut joined = self.clone();
        joined.memory.join(&other.memory);
        joined
    }

    fn widen(&self, previous: &Self) -> Self {
        let mut widened = self.join(previous);
        for pointer in widened.memory.pointers_mut() {
            widen_offsets(pointer);
        }
        widened
    }

    fn narrow(&self, other: &Self) -> Self {
        let mut narrowed = Self::bottom();
        for (name, ours) in self.memory.variables() {
            if let Some(theirs) = other.memory.get_pointer(name) {
                let mut kept = ours.clone();
                for target in ours.targets() {
                    if !theirs.contains(target) {
                        kept.remove_target(target);
                    }
                }
                if !kept.targets().is_empty() {
                    narrowed.memory.add_variable(name.clone(), kept);
                }
            }
        }
        for (address, ours) in self.memory.heap_cells() {
            if let Some(theirs) = other.memory.get_heap_pointer(address) {
                let mut kept = ours.clone();
                for target in ours.targets() {
                    if !theirs.contains(target) {
                        kept.remove_target(target);
                    }
                }
                if !kept.targets().is_empty() {
                    narrowed.memory.write_on_heap(*address, kept);
                }
            }
        }
        narrowed
    }

    fn partial_order(&self, other: &Self) -> Ordering {
        if self.memory.is_covered_by(&other.memory) {
            if other.memory.is_covered_by(&self.memory) {
                Ordering::Equal
            } else {
                Ordering::Less
            }
        } else {
            Ordering::Greater
        }
    }

    fn bottom() -> Self {
        Self {
            memory: Memory::new(),
        }
    }
}

fn fetch_pointer(memory: &Memory, name: &VarName) -> AnalysisResult<Pointer> {
    memory.get_pointer(name).cloned().ok_or_else(|| {
        AnalysisError::TypeMismatch(format!("`{}` is not a tracked pointer", name))
    })
}

/// Evaluate a pointer-valued expression to a temporary pointer.
fn evaluate_rvalue(rvalue: &Rvalue, memory: &mut Memory) -> AnalysisResult<Pointer> {
    let pointer = match rvalue {
        Rvalue::Null | Rvalue::Literal(0) => Pointer::from_target(NULL_POINTER),
        // a nonzero integer is no address the analysis can reason about
        Rvalue::Literal(_) => Pointer::from_target(INVALID_POINTER),
        Rvalue::Var(name) => fetch_pointer(memory, name)?,
        Rvalue::AddrOf(name) => Pointer::from_target(PointerTarget::Variable(name.clone())),
        Rvalue::Deref(name) => fetch_pointer(memory, name)?.deref(memory)?,
        Rvalue::Malloc(site) => {
            Pointer::from_target(PointerTarget::MemoryAddress(MemoryAddress::new(*site)))
        }
        Rvalue::Unknown => Pointer::from_target(UNKNOWN_POINTER),
    };
    Ok(pointer)
}

/// Apply one statement to the state.
pub fn transfer_statement(stmt: &Statement, state: &mut PointsToState) -> AnalysisResult<()> {
    let memory = &mut state.memory;
    match stmt {
        Statement::Assign { dst, src } => {
            let rhs = evaluate_rvalue(src, memory)?;
            match dst {
                // direct assignment to the variable itself, always strong
                Lvalue::Var(name) => match memory.get_pointer_mut(name) {
                    Some(slot) => slot.assign(&rhs),
                    None => {
                        return Err(AnalysisError::TypeMismatch(format!(
                            "`{}` is not a tracked pointer",
                            name
                        )));
                    }
                },
                Lvalue::Deref(name) => {
                    let through = fetch_pointer(memory, name)?;
                    through.assign_through(&rhs, memory)?;
                }
            }
        }
        Statement::Advance { dst, shift } => match dst {
            Lvalue::Var(name) => {
                let slot = match memory.get_pointer_mut(name) {
                    Some(slot) => slot,
                    None => {
                        return Err(AnalysisError::TypeMismatch(format!(
                            "`{}` is not a tracked pointer",
                            name
                        )));
                    }
                };
                match shift {
                    Some(elements) => slot.add_offset(*elements),
                    None => slot.add_unknown_offset(),
                }
            }
            Lvalue::Deref(name) => {
                let through = fetch_pointer(memory, name)?;
                match shift {
                    Some(elements) => through.add_offset_through(*elements, memory)?,
                    None => through.add_unknown_offset_through(memory)?,
                }
            }
        },
        Statement::Free(name) => {
            let pointer = fetch_pointer(memory, name)?;
            let allocations: BTreeSet<AllocId> = pointer
                .targets()
                .iter()
                .filter_map(|target| match target {
                    PointerTarget::MemoryAddress(address) => Some(address.allocation()),
                    _ => None,
                })
                .collect();
            // freeing a pointer that holds no allocation, e.g. free(NULL),
            // leaves the state untouched
            if !allocations.is_empty() {
                memory.invalidate_allocations(&allocations);
            }
        }
    }
    Ok(())
}

/// Refine a state along a CFG edge. `None` means the edge is infeasible
/// under the state and propagates nothing.
fn refine_along_edge(edge: &Edge, state: &PointsToState) -> AnalysisResult<Option<PointsToState>> {
    match edge {
        Edge::Goto | Edge::Branch(BranchCase::Any) => Ok(Some(state.clone())),
        Edge::Branch(BranchCase::Null(name)) => {
            let pointer = fetch_pointer(&state.memory, name)?;
            if !pointer.contains(&NULL_POINTER) && !pointer.contains(&UNKNOWN_POINTER) {
                return Ok(None);
            }
            let mut refined = state.clone();
            if let Some(slot) = refined.memory.get_pointer_mut(name) {
                slot.assign_target(NULL_POINTER);
            }
            Ok(Some(refined))
        }
        Edge::Branch(BranchCase::NonNull(name)) => {
            let mut refined = state.clone();
            let slot = match refined.memory.get_pointer_mut(name) {
                Some(slot) => slot,
                None => {
                    return Err(AnalysisError::TypeMismatch(format!(
                        "`{}` is not a tracked pointer",
                        name
                    )));
                }
            };
            slot.remove_target(&NULL_POINTER);
            if slot.targets().is_empty() {
                return Ok(None);
            }
            Ok(Some(refined))
        }
    }
}

/// Result of a whole-program fixpoint: the state at the entry of every
/// reached block plus the joined state after all return blocks.
pub struct PointsToSummary {
    /// state at the entry of each reached block, keyed by label
    pub block_states: BTreeMap<usize, PointsToState>,
    /// joined state after every return block
    pub exit: PointsToState,
}

impl Display for PointsToSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.exit.memory)
    }
}

/// Run the points-to analysis to a fixpoint over the program CFG.
pub fn execute_points_to(program: &Program) -> AnalysisResult<PointsToSummary> {
    let graph = program.cfg.graph();
    let entry_node = program.cfg.entry();
    let entry_state = PointsToState::entry(program);

    let tracer = Tracer::new("points-to fixpoint".to_string());

    let mut incoming: BTreeMap<NodeIndex, PointsToState> = BTreeMap::new();
    let mut outgoing: BTreeMap<NodeIndex, PointsToState> = BTreeMap::new();

    let mut worklist: BTreeSet<NodeIndex> = BTreeSet::new();
    worklist.insert(entry_node);

    while let Some(node) = worklist.pop_first() {
        tracer.log(&format!("visiting block {}", graph[node].label));

        // join all feasible incoming edges
        let mut state = if node == entry_node {
            Some(entry_state.clone())
        } else {
            None
        };
        for edge in graph.edges_directed(node, Direction::Incoming) {
            let Some(pred_state) = outgoing.get(&edge.source()) else {
                continue;
            };
            let Some(refined) = refine_along_edge(edge.weight(), pred_state)? else {
                continue;
            };
            state = Some(match state {
                None => refined,
                Some(current) => current.join(&refined),
            });
        }
        // nothing reaches this block yet
        let Some(mut state) = state else {
            continue;
        };

        // widen against what was seen before and stop on no change
        if let Some(previous) = incoming.get(&node) {
            state = state.widen(previous);
            if covered_by(&state, previous) {
                continue;
            }
        }
        incoming.insert(node, state.clone());

        // transfer the block body
        for stmt in &graph[node].sequence {
            transfer_statement(stmt, &mut state)?;
        }
        outgoing.insert(node, state);

        // revisit the successors
        for succ in graph.neighbors_directed(node, Direction::Outgoing) {
            worklist.insert(succ);
        }
    }
    drop(tracer);

    // per-label entry states
    let mut block_states = BTreeMap::new();
    for node in graph.node_indices() {
        if let Some(state) = incoming.get(&node) {
            block_states.insert(graph[node].label, state.clone());
        }
    }

    // join the post-states of all return blocks
    let mut exit: Option<PointsToState> = None;
    for node in graph.node_indices() {
        if graph
            .edges_directed(node, Direction::Outgoing)
            .next()
            .is_some()
        {
            continue;
        }
        if let Some(state) = outgoing.get(&node) {
            exit = Some(match exit {
                None => state.clone(),
                Some(current) => current.join(state),
            });
        }
    }
    let exit = exit.unwrap_or_else(PointsToState::bottom);

    Ok(PointsToSummary {
        block_states,
        exit,
    })
}
