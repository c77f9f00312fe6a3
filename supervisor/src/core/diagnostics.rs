//! Bounded observation history for external reporting
//!
//! Both buffers outlive individual server processes. They are written by the
//! supervisor loop and read from whatever task serves the operator views, so
//! each sits behind its own lock.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use shared::{ConsoleLine, DiagnosticSample};

/// Console page size used by the operator views
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug)]
pub struct DiagnosticsSink {
    samples: Mutex<VecDeque<DiagnosticSample>>,
    console: Mutex<VecDeque<ConsoleLine>>,
    sample_capacity: usize,
    console_capacity: usize,
}

impl DiagnosticsSink {
    pub fn new(sample_capacity: usize, console_capacity: usize) -> Self {
        let sample_capacity = sample_capacity.max(1);
        let console_capacity = console_capacity.max(1);
        Self {
            samples: Mutex::new(VecDeque::with_capacity(sample_capacity)),
            console: Mutex::new(VecDeque::with_capacity(console_capacity.min(4_096))),
            sample_capacity,
            console_capacity,
        }
    }

    pub fn record_memory_sample(&self, memory_bytes: u64) {
        self.push_sample(DiagnosticSample::now(memory_bytes));
    }

    pub fn push_sample(&self, sample: DiagnosticSample) {
        let mut samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        while samples.len() >= self.sample_capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Append a console line; blank lines are dropped
    pub fn record_console_line(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let mut console = self.console.lock().unwrap_or_else(PoisonError::into_inner);
        while console.len() >= self.console_capacity {
            console.pop_front();
        }
        console.push_back(ConsoleLine::now(text));
    }

    /// Most recent lines first. Pages are 1-based; page 0 is read as page 1.
    pub fn console_lines(&self, page: usize, page_size: usize) -> Vec<ConsoleLine> {
        let skip = page.saturating_sub(1).saturating_mul(page_size);
        let console = self.console.lock().unwrap_or_else(PoisonError::into_inner);
        console.iter().rev().skip(skip).take(page_size).cloned().collect()
    }

    pub fn console_page(&self, page: usize) -> Vec<ConsoleLine> {
        self.console_lines(page, DEFAULT_PAGE_SIZE)
    }

    pub fn line_count(&self) -> usize {
        self.console.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Oldest first
    pub fn memory_samples(&self) -> Vec<DiagnosticSample> {
        let samples = self.samples.lock().unwrap_or_else(PoisonError::into_inner);
        samples.iter().copied().collect()
    }
}
