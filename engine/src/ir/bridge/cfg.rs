use std::collections::{BTreeMap, BTreeSet};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{AnalysisError, AnalysisResult};
use crate::ir::adapter;
use crate::ir::bridge::program::{Context, Statement};
use crate::memory::target::VarName;

/// A basic block of validated statements
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct Block {
    /// label as given in the input
    pub label: usize,
    /// sequence of statements
    pub sequence: Vec<Statement>,
}

/// Which side of a conditional branch an edge represents
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum BranchCase {
    /// no tracked condition, either side is possible
    Any,
    /// taken when the tested variable is null
    Null(VarName),
    /// taken when the tested variable is not null
    NonNull(VarName),
}

/// A representation of CFG edges
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Edge {
    Goto,
    Branch(BranchCase),
}

/// A control-flow graph over basic blocks of pointer statements. Blocks that
/// end in a return have no outgoing edges.
pub struct ControlFlowGraph {
    graph: DiGraph<Block, Edge>,
    /// block label to index in the graph
    block_label_to_index: BTreeMap<usize, NodeIndex>,
    /// index of the entry block
    entry: NodeIndex,
}

fn insert_edge(
    edges: &mut BTreeMap<(usize, usize), Edge>,
    labels: &BTreeSet<usize>,
    src: usize,
    dst: usize,
    edge: Edge,
) -> AnalysisResult<()> {
    if !labels.contains(&dst) {
        return Err(AnalysisError::LoadingError(format!(
            "edge to unknown block label {}",
            dst
        )));
    }
    if edges.insert((src, dst), edge).is_some() {
        return Err(AnalysisError::LoadingError("duplicated edge in CFG".into()));
    }
    Ok(())
}

impl ControlFlowGraph {
    pub(crate) fn build(
        ctxt: &mut Context,
        blocks: &[adapter::program::Block],
    ) -> AnalysisResult<Self> {
        use adapter::program::Block as AdaptedBlock;
        use adapter::program::Terminator as AdaptedTerminator;

        // construct block labels
        let block_labels: BTreeSet<_> = blocks.iter().map(|b| b.label).collect();
        if block_labels.len() != blocks.len() {
            return Err(AnalysisError::LoadingError(
                "duplicated block labels".into(),
            ));
        }
        if blocks.is_empty() {
            return Err(AnalysisError::LoadingError(
                "a program needs at least one block".into(),
            ));
        }

        // convert block by block
        let mut graph = DiGraph::new();
        let mut block_label_to_index = BTreeMap::new();
        let mut edges: BTreeMap<(usize, usize), Edge> = BTreeMap::new();
        for block in blocks {
            let AdaptedBlock {
                label,
                body,
                terminator,
            } = block;

            let sequence = body
                .iter()
                .map(|stmt| ctxt.parse_statement(stmt))
                .collect::<AnalysisResult<_>>()?;

            // collect the edges
            match terminator {
                AdaptedTerminator::Goto { target } => {
                    insert_edge(&mut edges, &block_labels, *label, *target, Edge::Goto)?;
                }
                AdaptedTerminator::Branch {
                    condition,
                    then_case,
                    else_case,
                } => {
                    let (on_then, on_else) = match condition {
                        None => (BranchCase::Any, BranchCase::Any),
                        Some(cond) => {
                            let var = ctxt.check_declared(&cond.var)?;
                            (BranchCase::Null(var.clone()), BranchCase::NonNull(var))
                        }
                    };
                    insert_edge(
                        &mut edges,
                        &block_labels,
                        *label,
                        *then_case,
                        Edge::Branch(on_then),
                    )?;
                    insert_edge(
                        &mut edges,
                        &block_labels,
                        *label,
                        *else_case,
                        Edge::Branch(on_else),
                    )?;
                }
                AdaptedTerminator::Return => (),
            }

            // construct the new block
            let node_index = graph.add_node(Block {
                label: *label,
                sequence,
            });
            block_label_to_index.insert(*label, node_index);
        }

        // add the edges
        for ((src, dst), edge) in edges {
            let src_index = block_label_to_index.get(&src).unwrap();
            let dst_index = block_label_to_index.get(&dst).unwrap();
            graph.add_edge(*src_index, *dst_index, edge);
        }

        // done with the construction
        let entry = *block_label_to_index.get(&blocks[0].label).unwrap();
        Ok(Self {
            graph,
            block_label_to_index,
            entry,
        })
    }

    pub fn entry(&self) -> NodeIndex {
        self.entry
    }

    pub fn graph(&self) -> &DiGraph<Block, Edge> {
        &self.graph
    }

    pub fn get_block_by_label(&self, label: usize) -> Option<&Block> {
        self.block_label_to_index
            .get(&label)
            .and_then(|idx| self.graph.node_weight(*idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::adapter::program as raw;
    use crate::ir::bridge::program::Program;
    use petgraph::visit::EdgeRef;
    use petgraph::Direction;

    fn block(label: usize, terminator: raw::Terminator) -> raw::Block {
        raw::Block {
            label,
            body: vec![],
            terminator,
        }
    }

    fn convert(variables: Vec<raw::Variable>, blocks: Vec<raw::Block>) -> AnalysisResult<Program> {
        Program::convert(&raw::Program { variables, blocks })
    }

    #[test]
    fn test_build_rejects_empty_program() {
        assert!(matches!(
            convert(vec![], vec![]),
            Err(AnalysisError::LoadingError(_))
        ));
    }

    #[test]
    fn test_build_rejects_duplicate_labels() {
        let blocks = vec![
            block(0, raw::Terminator::Return),
            block(0, raw::Terminator::Return),
        ];
        assert!(matches!(
            convert(vec![], blocks),
            Err(AnalysisError::LoadingError(_))
        ));
    }

    #[test]
    fn test_build_rejects_unknown_edge_target() {
        let blocks = vec![block(0, raw::Terminator::Goto { target: 7 })];
        assert!(matches!(
            convert(vec![], blocks),
            Err(AnalysisError::LoadingError(_))
        ));
    }

    #[test]
    fn test_build_rejects_duplicate_edge() {
        let blocks = vec![
            block(
                0,
                raw::Terminator::Branch {
                    condition: None,
                    then_case: 1,
                    else_case: 1,
                },
            ),
            block(1, raw::Terminator::Return),
        ];
        assert!(matches!(
            convert(vec![], blocks),
            Err(AnalysisError::LoadingError(_))
        ));
    }

    #[test]
    fn test_build_rejects_undeclared_condition_variable() {
        let blocks = vec![
            block(
                0,
                raw::Terminator::Branch {
                    condition: Some(raw::Condition {
                        var: "p".to_string(),
                    }),
                    then_case: 1,
                    else_case: 2,
                },
            ),
            block(1, raw::Terminator::Return),
            block(2, raw::Terminator::Return),
        ];
        assert!(matches!(
            convert(vec![], blocks),
            Err(AnalysisError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_build_branch_edges() {
        let variables = vec![raw::Variable {
            name: "p".to_string(),
            indirection: 1,
            pointee_size: None,
        }];
        let blocks = vec![
            block(
                0,
                raw::Terminator::Branch {
                    condition: Some(raw::Condition {
                        var: "p".to_string(),
                    }),
                    then_case: 1,
                    else_case: 2,
                },
            ),
            block(1, raw::Terminator::Goto { target: 2 }),
            block(2, raw::Terminator::Return),
        ];
        let program = convert(variables, blocks).unwrap();
        let cfg = &program.cfg;

        assert_eq!(cfg.graph().node_count(), 3);
        assert_eq!(cfg.graph().edge_count(), 3);
        assert_eq!(cfg.graph()[cfg.entry()].label, 0);

        let mut cases = vec![];
        for edge in cfg.graph().edges_directed(cfg.entry(), Direction::Outgoing) {
            match edge.weight() {
                Edge::Branch(case) => cases.push(case.clone()),
                Edge::Goto => panic!("expected branch edges at the entry"),
            }
        }
        cases.sort_by_key(|case| matches!(case, BranchCase::NonNull(_)));
        assert_eq!(
            cases,
            vec![
                BranchCase::Null(VarName::from("p")),
                BranchCase::NonNull(VarName::from("p")),
            ]
        );

        // the return block has no outgoing edges
        let exit = cfg.get_block_by_label(2).unwrap();
        assert_eq!(exit.sequence.len(), 0);
        assert_eq!(
            cfg.graph()
                .edges_directed(cfg.block_label_to_index[&2], Direction::Outgoing)
                .count(),
            0
        );
    }
}
