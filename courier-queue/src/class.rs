//! Priority classes and weighted class scheduling.

use crate::error::QueueError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named scheduling bucket. A task keeps its class for its whole lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum QueueClass {
    /// Time-sensitive mail (verification, password reset)
    Critical,
    /// Regular notifications
    #[default]
    Default,
    /// Bulk and background mail
    Low,
}

impl QueueClass {
    /// All classes, highest weight first.
    pub const ALL: [QueueClass; 3] = [QueueClass::Critical, QueueClass::Default, QueueClass::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::Critical => "critical",
            QueueClass::Default => "default",
            QueueClass::Low => "low",
        }
    }

    fn index(self) -> usize {
        match self {
            QueueClass::Critical => 0,
            QueueClass::Default => 1,
            QueueClass::Low => 2,
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueClass {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(QueueClass::Critical),
            "default" => Ok(QueueClass::Default),
            "low" => Ok(QueueClass::Low),
            other => Err(QueueError::UnknownClass(other.to_string())),
        }
    }
}

/// Relative dequeue share of each class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassWeights {
    pub critical: u32,
    pub default: u32,
    pub low: u32,
}

impl Default for ClassWeights {
    fn default() -> Self {
        Self {
            critical: 6,
            default: 3,
            low: 1,
        }
    }
}

impl ClassWeights {
    pub fn new(critical: u32, default: u32, low: u32) -> Self {
        Self {
            critical,
            default,
            low,
        }
    }

    pub fn weight(&self, class: QueueClass) -> u32 {
        match class {
            QueueClass::Critical => self.critical,
            QueueClass::Default => self.default,
            QueueClass::Low => self.low,
        }
    }

    pub fn total(&self) -> u64 {
        self.critical as u64 + self.default as u64 + self.low as u64
    }
}

/// Smooth weighted round-robin over the three classes.
///
/// Over any window of `weights.total()` selections each class is chosen
/// exactly `weight` times, interleaved rather than in bursts. A class with
/// weight zero is never selected first but still appears at the end of every
/// order, so its tasks drain once the weighted classes are empty.
#[derive(Debug, Clone)]
pub struct WeightedRoundRobin {
    weights: ClassWeights,
    current: [i64; 3],
}

impl WeightedRoundRobin {
    pub fn new(weights: ClassWeights) -> Self {
        Self {
            weights,
            current: [0; 3],
        }
    }

    pub fn weights(&self) -> ClassWeights {
        self.weights
    }

    /// Select the next class to serve.
    pub fn next_class(&mut self) -> Option<QueueClass> {
        let total = self.weights.total() as i64;
        if total == 0 {
            return None;
        }

        let mut best: Option<QueueClass> = None;
        for class in QueueClass::ALL {
            let weight = self.weights.weight(class) as i64;
            if weight == 0 {
                continue;
            }
            self.current[class.index()] += weight;
            match best {
                Some(b) if self.current[b.index()] >= self.current[class.index()] => {}
                _ => best = Some(class),
            }
        }

        if let Some(class) = best {
            self.current[class.index()] -= total;
        }
        best
    }

    /// Order in which classes should be tried for one dequeue: the selected
    /// class first, then the remaining classes by descending weight.
    pub fn next_order(&mut self) -> Vec<QueueClass> {
        let mut order = Vec::with_capacity(QueueClass::ALL.len());
        if let Some(first) = self.next_class() {
            order.push(first);
        }

        let mut rest: Vec<QueueClass> = QueueClass::ALL
            .into_iter()
            .filter(|c| !order.contains(c))
            .collect();
        rest.sort_by_key(|c| std::cmp::Reverse(self.weights.weight(*c)));
        order.extend(rest);
        order
    }
}
