use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::WatchError;

/// Outcome category of a single roll.
///
/// The feed reports these as `ct`, `t` and `bonus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Black (`ct`)
    A,
    /// Orange (`t`)
    B,
    /// Green (`bonus`)
    C,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[Self::A, Self::B, Self::C]
    }

    /// Token used by the feed for this category.
    pub fn code(&self) -> &'static str {
        match self {
            Self::A => "ct",
            Self::B => "t",
            Self::C => "bonus",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::A => "Black",
            Self::B => "Orange",
            Self::C => "Green",
        }
    }
}

impl FromStr for Category {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ct" => Ok(Self::A),
            "t" => Ok(Self::B),
            "bonus" => Ok(Self::C),
            other => Err(WatchError::UnknownCategory(other.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A single observed roll. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roll {
    pub index: u64,
    pub category: Category,
    pub observed_at: DateTime<Utc>,
}

impl Roll {
    pub fn new(index: u64, category: Category) -> Self {
        Self {
            index,
            category,
            observed_at: Utc::now(),
        }
    }
}

/// Roll as reported by the feed, before the category is validated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRoll {
    pub index: u64,
    pub coin: String,
}

/// One poll result from the source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    #[serde(default)]
    pub rolls: Vec<RawRoll>,
    /// The source's own latest roll index.
    #[serde(default)]
    pub index: u64,
}

/// Per-category counts over a slice of rolls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub a: usize,
    pub b: usize,
    pub c: usize,
}

impl Distribution {
    pub fn from_rolls(rolls: &[Roll]) -> Self {
        let mut dist = Self::default();
        for roll in rolls {
            match roll.category {
                Category::A => dist.a += 1,
                Category::B => dist.b += 1,
                Category::C => dist.c += 1,
            }
        }
        dist
    }

    pub fn count(&self, category: Category) -> usize {
        match category {
            Category::A => self.a,
            Category::B => self.b,
            Category::C => self.c,
        }
    }

    pub fn total(&self) -> usize {
        self.a + self.b + self.c
    }
}
