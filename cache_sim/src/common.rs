use std::fmt;

use serde::Serialize;

#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize)]
/// high-order bits of an address identifying the block held by a line
pub struct Tag(u64);

impl Tag {
    pub const fn new(v: u64) -> Self {
        Self(v)
    }
    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize)]
pub struct SetIndex(usize);

impl SetIndex {
    pub const fn new(v: usize) -> Self {
        Self(v)
    }
    pub const fn into_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for SetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
