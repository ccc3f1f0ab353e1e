use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::path::PathBuf;

/// How strongly an occurrence claims to be a definition. Lower value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    Definition = 1,
    MaybeReference = 2,
    Reference = 3,
}

impl Serialize for Rank {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// One identifier occurrence: a byte range in the composite source of `file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file: PathBuf,
    pub start: usize,
    pub end: usize,
    pub rank: Rank,
}

impl Location {
    pub fn new(file: PathBuf, start: usize, end: usize, rank: Rank) -> Self {
        Location {
            file,
            start,
            end,
            rank,
        }
    }

    /// Ordering used by the symbol array and the offset binary search:
    /// start ascending, ties broken by end ascending.
    pub fn compare(a: &Location, b: &Location) -> Ordering {
        a.start.cmp(&b.start).then(a.end.cmp(&b.end))
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}
