use serde::{Deserialize, Serialize};

/// A pointer variable declaration
#[derive(Serialize, Deserialize)]
pub struct Variable {
    /// name of the variable
    pub name: String,
    /// number of stars in the declared type
    pub indirection: usize,
    /// byte size of the pointee type (which may not be known)
    pub pointee_size: Option<u64>,
}

/// A location a statement writes to
#[derive(Serialize, Deserialize)]
pub enum Lvalue {
    Var { name: String },
    Deref { name: String },
    Field { base: String, member: String },
}

/// A pointer-valued expression
#[derive(Serialize, Deserialize)]
pub enum Rvalue {
    Null,
    Literal { value: i64 },
    Var { name: String },
    AddrOf { name: String },
    Deref { name: String },
    Malloc { size: Option<u64> },
    Unknown,
    Field { base: String, member: String },
}

/// A statement in a basic block
#[derive(Serialize, Deserialize)]
pub enum Statement {
    Assign { dst: Lvalue, src: Rvalue },
    Advance { dst: Lvalue, shift: Option<i64> },
    Free { ptr: String },
}

/// A test of one pointer variable against null
#[derive(Serialize, Deserialize)]
pub struct Condition {
    /// the variable under test
    pub var: String,
}

/// How control leaves a basic block. In a conditional branch the then edge
/// is the null case of the condition and the else edge the non-null case;
/// a branch without a condition is nondeterministic.
#[derive(Serialize, Deserialize)]
pub enum Terminator {
    Goto {
        target: usize,
    },
    Branch {
        condition: Option<Condition>,
        then_case: usize,
        else_case: usize,
    },
    Return,
}

/// A basic block
#[derive(Serialize, Deserialize)]
pub struct Block {
    /// a unique id for the block
    pub label: usize,
    /// list of statements
    pub body: Vec<Statement>,
    /// terminator
    pub terminator: Terminator,
}

/// A single-procedure pointer program
#[derive(Serialize, Deserialize)]
pub struct Program {
    /// pointer variable declarations
    pub variables: Vec<Variable>,
    /// basic blocks, the first one being the entry
    pub blocks: Vec<Block>,
}
