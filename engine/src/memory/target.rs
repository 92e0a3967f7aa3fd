use std::fmt::{Display, Formatter};

/// Represents the name of a variable in the analyzed program
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub struct VarName(String);

impl Display for VarName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for VarName {
    fn from(name: String) -> Self {
        Self(name)
    }
}
impl From<&String> for VarName {
    fn from(name: &String) -> Self {
        Self(name.clone())
    }
}
impl From<&str> for VarName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for VarName {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// Represents one heap allocation site
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug)]
pub struct AllocId(u64);

impl AllocId {
    pub fn index(&self) -> u64 {
        self.0
    }
}

impl Display for AllocId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "heap#{}", self.0)
    }
}

impl From<u64> for AllocId {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

/// A byte displacement into an allocation
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug)]
pub enum Offset {
    /// displacement tracked exactly
    Known(i64),
    /// displacement no longer tracked
    Unknown,
}

impl Offset {
    /// Advance by a number of bytes; an untracked or overflowing
    /// displacement stays untracked.
    pub fn shifted(self, bytes: i64) -> Self {
        match self {
            Self::Known(current) => match current.checked_add(bytes) {
                Some(total) => Self::Known(total),
                None => Self::Unknown,
            },
            Self::Unknown => Self::Unknown,
        }
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(bytes) => bytes.fmt(f),
            Self::Unknown => write!(f, "?"),
        }
    }
}

/// A heap cell, designated by its allocation site and a byte offset into it
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug)]
pub struct MemoryAddress {
    allocation: AllocId,
    offset: Offset,
}

impl MemoryAddress {
    /// The base address of an allocation.
    pub fn new(allocation: AllocId) -> Self {
        Self {
            allocation,
            offset: Offset::Known(0),
        }
    }

    pub fn with_offset(allocation: AllocId, offset: Offset) -> Self {
        Self { allocation, offset }
    }

    pub fn allocation(&self) -> AllocId {
        self.allocation
    }

    pub fn offset(&self) -> Offset {
        self.offset
    }

    pub fn shifted(&self, bytes: i64) -> Self {
        Self {
            allocation: self.allocation,
            offset: self.offset.shifted(bytes),
        }
    }

    pub fn forgotten(&self) -> Self {
        Self {
            allocation: self.allocation,
            offset: Offset::Unknown,
        }
    }
}

impl Display for MemoryAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.allocation, self.offset)
    }
}

/// One location a pointer may point to
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Debug)]
pub enum PointerTarget {
    /// a named variable
    Variable(VarName),
    /// a cell inside a heap allocation
    MemoryAddress(MemoryAddress),
    /// definitely the null address
    Null,
    /// a freed or otherwise unusable address
    Invalid,
    /// an address the analysis lost track of
    Unknown,
}

impl PointerTarget {
    /// A copy of this target advanced by a number of bytes. Heap cells move
    /// within their allocation, sentinels are immune to arithmetic, and a
    /// named variable pushed off itself becomes invalid.
    pub fn add_offset(&self, bytes: i64) -> Self {
        match self {
            Self::Variable(_) => {
                if bytes == 0 {
                    self.clone()
                } else {
                    Self::Invalid
                }
            }
            Self::MemoryAddress(address) => Self::MemoryAddress(address.shifted(bytes)),
            Self::Null | Self::Invalid | Self::Unknown => self.clone(),
        }
    }

    /// A copy of this target advanced by an untracked number of bytes.
    pub fn add_unknown_offset(&self) -> Self {
        match self {
            Self::Variable(_) => Self::Invalid,
            Self::MemoryAddress(address) => Self::MemoryAddress(address.forgotten()),
            Self::Null | Self::Invalid | Self::Unknown => self.clone(),
        }
    }
}

impl Display for PointerTarget {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(name) => name.fmt(f),
            Self::MemoryAddress(address) => address.fmt(f),
            Self::Null => write!(f, "null"),
            Self::Invalid => write!(f, "invalid"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
