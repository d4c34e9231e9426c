use std::fmt;

use thiserror::Error;

use crate::{
    addr::Geometry,
    common::{SetIndex, Tag},
    recency::RecencyTracker,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("a set needs at least one line")]
    NoLines,
    #[error("{offset_bits} offset bits + {index_bits} index bits exceed the {width}-bit address")]
    AddressWidthExceeded {
        offset_bits: u32,
        index_bits: u32,
        width: u32,
    },
    #[error("{index_bits} index bits is too many sets to simulate (at most {max})")]
    TooManySets { index_bits: u32, max: u32 },
    #[error("2^{index_bits} sets x {lines_per_set} lines exceed the {max} lines that can be simulated")]
    TooManyLines {
        index_bits: u32,
        lines_per_set: usize,
        max: usize,
    },
}

/// broken bookkeeping inside the cache model. never caused by user input.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvariantError {
    #[error("set {set} is full but has no eviction candidate")]
    EmptyRecency { set: SetIndex },
    #[error("eviction candidate {tag} is not resident in set {set}")]
    VictimNotResident { set: SetIndex, tag: Tag },
    #[error("set index {set} out of range for {num_sets} sets")]
    SetOutOfRange { set: SetIndex, num_sets: usize },
}

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct Line {
    pub valid: bool,
    pub tag: Tag,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SetAccess {
    pub hit: bool,
    pub evicted: Option<Tag>,
}

impl SetAccess {
    const HIT: Self = Self {
        hit: true,
        evicted: None,
    };
    const FILL: Self = Self {
        hit: false,
        evicted: None,
    };
}

pub struct Set {
    id: SetIndex,
    lines: Box<[Line]>,
    recency: RecencyTracker,
}

impl Set {
    fn new(id: SetIndex, lines_per_set: usize) -> Self {
        Self {
            id,
            lines: vec![Line::default(); lines_per_set].into_boxed_slice(),
            recency: RecencyTracker::with_capacity(lines_per_set),
        }
    }

    /// looks `tag` up, filling a free line or replacing the LRU line on a miss.
    pub fn access(&mut self, tag: Tag) -> Result<SetAccess, InvariantError> {
        if self.lines.iter().any(|l| l.valid && l.tag == tag) {
            self.recency.touch(tag);
            return Ok(SetAccess::HIT);
        }
        if let Some(line) = self.lines.iter_mut().find(|l| !l.valid) {
            *line = Line { valid: true, tag };
            self.recency.touch(tag);
            return Ok(SetAccess::FILL);
        }
        let victim = self
            .recency
            .eviction_candidate()
            .ok_or(InvariantError::EmptyRecency { set: self.id })?;
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.valid && l.tag == victim)
            .ok_or(InvariantError::VictimNotResident {
                set: self.id,
                tag: victim,
            })?;
        line.tag = tag;
        self.recency.remove(victim);
        self.recency.touch(tag);
        Ok(SetAccess {
            hit: false,
            evicted: Some(victim),
        })
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn recency(&self) -> &RecencyTracker {
        &self.recency
    }

    pub fn num_valid(&self) -> usize {
        self.lines.iter().filter(|l| l.valid).count()
    }
}

pub struct Cache {
    sets: Vec<Set>,
    geometry: Geometry,
}

impl Cache {
    pub fn new(geometry: Geometry) -> Self {
        let sets = (0..geometry.num_sets())
            .map(|i| Set::new(SetIndex::new(i), geometry.lines_per_set()))
            .collect();
        log::debug!(
            "cache built: {} sets x {} lines, {}-byte blocks",
            geometry.num_sets(),
            geometry.lines_per_set(),
            1u128 << geometry.offset_bits()
        );
        Self { sets, geometry }
    }

    pub fn access(&mut self, set: SetIndex, tag: Tag) -> Result<SetAccess, InvariantError> {
        let num_sets = self.sets.len();
        self.sets
            .get_mut(set.into_usize())
            .ok_or(InvariantError::SetOutOfRange { set, num_sets })?
            .access(tag)
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn sets(&self) -> &[Set] {
        &self.sets
    }

    pub fn view(&self) -> CacheView<'_> {
        CacheView { cache: self }
    }
}

/// human readable dump of every set.
pub struct CacheView<'a> {
    cache: &'a Cache,
}

impl fmt::Display for CacheView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.cache.geometry;
        writeln!(
            f,
            "cache | sets: {}, lines: {}",
            g.num_sets(),
            g.lines_per_set()
        )?;
        for set in &self.cache.sets {
            writeln!(f, "set[{}]", set.id)?;
            if set.recency.is_empty() {
                writeln!(f, "    lru: empty")?;
            } else {
                let order = set
                    .recency
                    .iter()
                    .map(|t| format!("{t}"))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                writeln!(f, "    lru: {order}")?;
            }
            for (i, line) in set.lines.iter().enumerate() {
                writeln!(
                    f,
                    "    line[{i}] | valid: {}, tag: {}",
                    u8::from(line.valid),
                    line.tag
                )?;
            }
        }
        Ok(())
    }
}
