use serde::{Deserialize, Serialize};

/// A directed range over linear offsets.
///
/// `from` is where the range was anchored and `to` where it ends; a range with
/// `to < from` is backwards. `start`/`end` give the ordered bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinearRange {
    pub from: usize,
    pub to: usize,
}

impl LinearRange {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }

    pub fn collapsed(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn start(&self) -> usize {
        self.from.min(self.to)
    }

    pub fn end(&self) -> usize {
        self.from.max(self.to)
    }

    pub fn len(&self) -> usize {
        self.end() - self.start()
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    pub fn is_backwards(&self) -> bool {
        self.to < self.from
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start()..self.end()
    }
}

impl From<std::ops::Range<usize>> for LinearRange {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}
