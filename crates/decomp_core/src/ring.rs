use std::collections::VecDeque;

pub const DEFAULT_LOG_CAPACITY: usize = 2000;

/// Bounded, oldest-first-evicting buffer of log lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRing {
    lines: VecDeque<String>,
    capacity: usize,
    total: u64,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            total: 0,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of lines ever pushed, including evicted ones.
    pub fn total_pushed(&self) -> u64 {
        self.total
    }

    pub fn evicted(&self) -> u64 {
        self.total - self.lines.len() as u64
    }

    /// True when `tail(n)` returns exactly what the full history would.
    pub fn covers_tail(&self, n: usize) -> bool {
        n <= self.lines.len() || self.evicted() == 0
    }

    /// The last `n` retained lines in emission order.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.total = 0;
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}
