//! Status - ループの実行結果と累積カウンタ

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::OutcomeKind;

/// Result of one fetch-and-resolve cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub completed: usize,
    pub failed_retryable: usize,
    pub failed_terminal: usize,
    /// complete / failure の送信に失敗した task（lock 期限切れで再配送される）
    pub unresolved: usize,
}

impl CycleReport {
    pub fn record(&mut self, outcome: OutcomeKind) {
        match outcome {
            OutcomeKind::Completed => self.completed += 1,
            OutcomeKind::FailedRetryable => self.failed_retryable += 1,
            OutcomeKind::FailedTerminal => self.failed_terminal += 1,
            OutcomeKind::Unresolved => self.unresolved += 1,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.fetched == 0
    }

    /// Every fetched task got exactly one outcome.
    pub fn is_fully_accounted(&self) -> bool {
        self.completed + self.failed_retryable + self.failed_terminal + self.unresolved
            == self.fetched
    }
}

/// Cumulative counters of one worker loop. Shared with whoever spawned it.
#[derive(Debug, Default)]
pub struct LoopStats {
    cycles: AtomicU64,
    fetch_errors: AtomicU64,
    fetched: AtomicU64,
    completed: AtomicU64,
    failed_retryable: AtomicU64,
    failed_terminal: AtomicU64,
    unresolved: AtomicU64,
}

/// Point-in-time copy of [`LoopStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStatsSnapshot {
    pub cycles: u64,
    pub fetch_errors: u64,
    pub fetched: u64,
    pub completed: u64,
    pub failed_retryable: u64,
    pub failed_terminal: u64,
    pub unresolved: u64,
}

impl LoopStats {
    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.fetched.fetch_add(report.fetched as u64, Ordering::Relaxed);
        self.completed
            .fetch_add(report.completed as u64, Ordering::Relaxed);
        self.failed_retryable
            .fetch_add(report.failed_retryable as u64, Ordering::Relaxed);
        self.failed_terminal
            .fetch_add(report.failed_terminal as u64, Ordering::Relaxed);
        self.unresolved
            .fetch_add(report.unresolved as u64, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed_retryable: self.failed_retryable.load(Ordering::Relaxed),
            failed_terminal: self.failed_terminal.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
        }
    }
}
