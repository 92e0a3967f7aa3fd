use std::collections::{BTreeMap, BTreeSet};

use crate::error::{AnalysisError, AnalysisResult};
use crate::ir::adapter;
use crate::ir::bridge::cfg::ControlFlowGraph;
use crate::memory::pointer::Pointer;
use crate::memory::target::{AllocId, VarName};

/// A validated location a statement writes to
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Lvalue {
    /// the variable itself
    Var(VarName),
    /// the location one dereference behind the variable
    Deref(VarName),
}

/// A validated pointer-valued expression
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Rvalue {
    /// the null pointer constant
    Null,
    /// an integer literal used as a pointer
    Literal(i64),
    /// the value of another pointer variable
    Var(VarName),
    /// the address of a variable
    AddrOf(VarName),
    /// the value behind a pointer variable
    Deref(VarName),
    /// a fresh allocation from this site
    Malloc(AllocId),
    /// a value the analysis cannot track
    Unknown,
}

/// A validated statement over pointer variables
#[derive(Eq, PartialEq, Clone, Debug)]
pub enum Statement {
    Assign { dst: Lvalue, src: Rvalue },
    Advance { dst: Lvalue, shift: Option<i64> },
    Free(VarName),
}

/// Parsing context for statement conversion
pub(crate) struct Context {
    /// declared pointer variables
    variables: BTreeSet<VarName>,
    /// number of allocation sites handed out so far
    allocations: u64,
}

impl Context {
    /// The name must refer to a declared pointer variable.
    pub(crate) fn check_declared(&self, name: &str) -> AnalysisResult<VarName> {
        let name = VarName::from(name);
        if self.variables.contains(&name) {
            Ok(name)
        } else {
            Err(AnalysisError::TypeMismatch(format!(
                "`{}` is not a declared pointer variable",
                name
            )))
        }
    }

    fn parse_lvalue(&self, lvalue: &adapter::program::Lvalue) -> AnalysisResult<Lvalue> {
        use adapter::program::Lvalue as AdaptedLvalue;

        match lvalue {
            AdaptedLvalue::Var { name } => Ok(Lvalue::Var(self.check_declared(name)?)),
            AdaptedLvalue::Deref { name } => Ok(Lvalue::Deref(self.check_declared(name)?)),
            AdaptedLvalue::Field { base, member } => Err(AnalysisError::UnsupportedTarget(
                format!("member access `{}.{}`", base, member),
            )),
        }
    }

    fn parse_rvalue(&mut self, rvalue: &adapter::program::Rvalue) -> AnalysisResult<Rvalue> {
        use adapter::program::Rvalue as AdaptedRvalue;

        match rvalue {
            AdaptedRvalue::Null => Ok(Rvalue::Null),
            AdaptedRvalue::Literal { value } => Ok(Rvalue::Literal(*value)),
            AdaptedRvalue::Var { name } => Ok(Rvalue::Var(self.check_declared(name)?)),
            // the address of any variable can be taken, a non-pointer one
            // only fails later if the program dereferences through it
            AdaptedRvalue::AddrOf { name } => Ok(Rvalue::AddrOf(VarName::from(name))),
            AdaptedRvalue::Deref { name } => Ok(Rvalue::Deref(self.check_declared(name)?)),
            AdaptedRvalue::Malloc { size: _ } => {
                let site = AllocId::from(self.allocations);
                self.allocations += 1;
                Ok(Rvalue::Malloc(site))
            }
            AdaptedRvalue::Unknown => Ok(Rvalue::Unknown),
            AdaptedRvalue::Field { base, member } => Err(AnalysisError::UnsupportedTarget(
                format!("member access `{}.{}`", base, member),
            )),
        }
    }

    pub(crate) fn parse_statement(
        &mut self,
        stmt: &adapter::program::Statement,
    ) -> AnalysisResult<Statement> {
        use adapter::program::Statement as AdaptedStatement;

        match stmt {
            AdaptedStatement::Assign { dst, src } => Ok(Statement::Assign {
                dst: self.parse_lvalue(dst)?,
                src: self.parse_rvalue(src)?,
            }),
            AdaptedStatement::Advance { dst, shift } => Ok(Statement::Advance {
                dst: self.parse_lvalue(dst)?,
                shift: *shift,
            }),
            AdaptedStatement::Free { ptr } => Ok(Statement::Free(self.check_declared(ptr)?)),
        }
    }
}

/// A single-procedure pointer program with its control-flow graph
pub struct Program {
    /// declared pointer variables with their initial abstract values
    pub variables: BTreeMap<VarName, Pointer>,
    /// the control-flow graph
    pub cfg: ControlFlowGraph,
}

impl Program {
    pub fn convert(program: &adapter::program::Program) -> AnalysisResult<Self> {
        // construct the variable slots
        let mut variables = BTreeMap::new();
        for decl in &program.variables {
            let mut pointer = Pointer::new(decl.indirection)?;
            if let Some(size) = decl.pointee_size {
                pointer.set_size_of_target(size)?;
            }
            if variables
                .insert(VarName::from(&decl.name), pointer)
                .is_some()
            {
                return Err(AnalysisError::LoadingError(format!(
                    "duplicated declaration of variable `{}`",
                    decl.name
                )));
            }
        }

        // convert the blocks
        let mut ctxt = Context {
            variables: variables.keys().cloned().collect(),
            allocations: 0,
        };
        let cfg = ControlFlowGraph::build(&mut ctxt, &program.blocks)?;

        Ok(Self { variables, cfg })
    }
}
