// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Planner group managers
//!
//! [`StaticGroupManager`] serializes every request on one group.
//! [`DynamicGroupManager`] keeps a fixed pool of groups and routes each thread
//! to the same group for the life of the pool. A background sweeper samples
//! free memory every reset interval and clears all groups when the free ratio
//! drops below the configured threshold.

use crate::config::PlannerConfig;
use crate::error::{OptimizerError, OptimizerResult};
use crate::plan::logical::LogicalNode;
use crate::planner::group::{GraphMeta, PlannerGroup};
use crate::planner::trace::PlanTrace;
use log::{debug, info, warn};
use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Upper bound on how long shutdown waits for an in-flight sweep
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Free and total system memory in bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

impl MemorySample {
    /// Fraction of memory still free; an empty total counts as fully free
    pub fn free_ratio(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        self.free_bytes as f64 / self.total_bytes as f64
    }
}

/// Source of memory samples for the sweeper
pub trait MemoryProbe: Send + Sync + std::fmt::Debug {
    fn sample(&self) -> OptimizerResult<MemorySample>;
}

/// Probe returning whatever was last stored in it
#[derive(Debug)]
pub struct FixedProbe {
    sample: Mutex<MemorySample>,
}

impl FixedProbe {
    pub fn new(free_bytes: u64, total_bytes: u64) -> Self {
        Self {
            sample: Mutex::new(MemorySample {
                free_bytes,
                total_bytes,
            }),
        }
    }

    pub fn set(&self, free_bytes: u64, total_bytes: u64) {
        *self.sample.lock() = MemorySample {
            free_bytes,
            total_bytes,
        };
    }
}

impl MemoryProbe for FixedProbe {
    fn sample(&self) -> OptimizerResult<MemorySample> {
        Ok(*self.sample.lock())
    }
}

/// Reads `MemAvailable` and `MemTotal` from `/proc/meminfo`
#[derive(Debug, Default)]
pub struct ProcMeminfoProbe;

impl ProcMeminfoProbe {
    fn parse(text: &str) -> OptimizerResult<MemorySample> {
        let field = |name: &str| -> OptimizerResult<u64> {
            text.lines()
                .find_map(|line| line.strip_prefix(name)?.strip_prefix(':'))
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| kb * 1024)
                .ok_or_else(|| OptimizerError::unsupported(format!("meminfo has no {} value", name)))
        };
        Ok(MemorySample {
            free_bytes: field("MemAvailable")?,
            total_bytes: field("MemTotal")?,
        })
    }
}

impl MemoryProbe for ProcMeminfoProbe {
    fn sample(&self) -> OptimizerResult<MemorySample> {
        let text = std::fs::read_to_string("/proc/meminfo")?;
        Self::parse(&text)
    }
}

/// Exclusive access to one planner group
pub struct GroupGuard<'a> {
    guard: MutexGuard<'a, PlannerGroup>,
    index: usize,
}

impl GroupGuard<'_> {
    /// Position of the group in its pool
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for GroupGuard<'_> {
    type Target = PlannerGroup;

    fn deref(&self) -> &PlannerGroup {
        &self.guard
    }
}

impl DerefMut for GroupGuard<'_> {
    fn deref_mut(&mut self) -> &mut PlannerGroup {
        &mut self.guard
    }
}

/// A single group shared by all callers
#[derive(Debug)]
pub struct StaticGroupManager {
    group: Mutex<PlannerGroup>,
}

impl StaticGroupManager {
    pub fn new(config: PlannerConfig, meta: &GraphMeta) -> OptimizerResult<Self> {
        Ok(Self::from_group(PlannerGroup::new(config, meta)?))
    }

    pub fn from_group(group: PlannerGroup) -> Self {
        Self {
            group: Mutex::new(group),
        }
    }

    /// Block until the group is free
    pub fn checkout(&self) -> GroupGuard<'_> {
        GroupGuard {
            guard: self.group.lock(),
            index: 0,
        }
    }

    pub fn clear_all(&self) -> OptimizerResult<()> {
        self.group.lock().clear()
    }
}

type GroupPool = Arc<Vec<Mutex<PlannerGroup>>>;

/// Index of the group serving `thread` in a pool of `pool_size`
pub fn group_index_for(thread: ThreadId, pool_size: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    thread.hash(&mut hasher);
    (hasher.finish() % pool_size.max(1) as u64) as usize
}

enum SweepMessage {
    Shutdown,
}

/// Background thread clearing the pool under memory pressure
struct Sweeper {
    sender: mpsc::Sender<SweepMessage>,
    done: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    fn spawn(
        groups: GroupPool,
        probe: Arc<dyn MemoryProbe>,
        interval: Duration,
        threshold: f64,
    ) -> OptimizerResult<Self> {
        let (sender, receiver) = mpsc::channel();
        let (done_sender, done) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("gopt-sweeper".to_string())
            .spawn(move || {
                loop {
                    match receiver.recv_timeout(interval) {
                        Ok(SweepMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            sweep(&groups, probe.as_ref(), threshold);
                        }
                    }
                }
                let _ = done_sender.send(());
            })?;
        Ok(Self {
            sender,
            done,
            handle: Some(handle),
        })
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.sender.send(SweepMessage::Shutdown);
        match self.done.recv_timeout(SHUTDOWN_TIMEOUT) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("memory sweeper panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "memory sweeper did not stop within {:?}; detaching it",
                    SHUTDOWN_TIMEOUT
                );
            }
        }
    }
}

/// Clear every group when free memory is below `threshold`
fn sweep(groups: &[Mutex<PlannerGroup>], probe: &dyn MemoryProbe, threshold: f64) -> bool {
    let sample = match probe.sample() {
        Ok(sample) => sample,
        Err(e) => {
            warn!("skipping memory sweep: {}", e);
            return false;
        }
    };
    let ratio = sample.free_ratio();
    if ratio >= threshold {
        debug!("free memory ratio {:.3}, no sweep", ratio);
        return false;
    }
    info!(
        "free memory ratio {:.3} below {:.3}, clearing {} planner groups",
        ratio,
        threshold,
        groups.len()
    );
    for (index, group) in groups.iter().enumerate() {
        if let Err(e) = group.lock().clear() {
            warn!("failed to clear planner group {}: {}", index, e);
        }
    }
    true
}

/// A fixed pool of groups sharded by thread identity
pub struct DynamicGroupManager {
    groups: GroupPool,
    probe: Arc<dyn MemoryProbe>,
    threshold: f64,
    sweeper: Mutex<Option<Sweeper>>,
}

impl std::fmt::Debug for DynamicGroupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicGroupManager")
            .field("pool_size", &self.groups.len())
            .field("threshold", &self.threshold)
            .field("probe", &self.probe)
            .finish()
    }
}

impl DynamicGroupManager {
    pub fn new(config: PlannerConfig, meta: &GraphMeta, probe: Arc<dyn MemoryProbe>) -> OptimizerResult<Self> {
        config.validate()?;
        let groups = (0..config.pool_size)
            .map(|_| PlannerGroup::new(config.clone(), meta))
            .collect::<OptimizerResult<Vec<_>>>()?;
        Self::from_groups(
            groups,
            probe,
            config.reset_interval(),
            config.free_memory_threshold,
        )
    }

    /// Pool over prebuilt groups
    pub fn from_groups(
        groups: Vec<PlannerGroup>,
        probe: Arc<dyn MemoryProbe>,
        interval: Duration,
        threshold: f64,
    ) -> OptimizerResult<Self> {
        if groups.is_empty() {
            return Err(OptimizerError::Config("pool_size must be positive".to_string()));
        }
        let groups: GroupPool = Arc::new(groups.into_iter().map(Mutex::new).collect());
        let sweeper = Sweeper::spawn(groups.clone(), probe.clone(), interval, threshold)?;
        info!(
            "dynamic planner pool of {} groups, sweep every {:?}",
            groups.len(),
            interval
        );
        Ok(Self {
            groups,
            probe,
            threshold,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    pub fn pool_size(&self) -> usize {
        self.groups.len()
    }

    /// The group owned by the calling thread
    pub fn checkout(&self) -> GroupGuard<'_> {
        let index = group_index_for(thread::current().id(), self.groups.len());
        GroupGuard {
            guard: self.groups[index].lock(),
            index,
        }
    }

    pub fn clear_all(&self) -> OptimizerResult<()> {
        for group in self.groups.iter() {
            group.lock().clear()?;
        }
        Ok(())
    }

    /// Run one sweep on the calling thread; returns whether the pool was cleared
    pub fn sweep_now(&self) -> bool {
        sweep(&self.groups, self.probe.as_ref(), self.threshold)
    }

    /// Stop the sweeper; idempotent
    pub fn shutdown(&self) {
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.shutdown();
            debug!("memory sweeper stopped");
        }
    }
}

impl Drop for DynamicGroupManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Group manager selected by [`PlannerConfig::group_mode`]
#[derive(Debug)]
pub enum GroupManager {
    Static(StaticGroupManager),
    Dynamic(DynamicGroupManager),
}

impl GroupManager {
    /// Build the configured manager; the dynamic pool samples `/proc/meminfo`
    pub fn new(config: PlannerConfig, meta: &GraphMeta) -> OptimizerResult<Self> {
        Self::with_probe(config, meta, Arc::new(ProcMeminfoProbe))
    }

    pub fn with_probe(
        config: PlannerConfig,
        meta: &GraphMeta,
        probe: Arc<dyn MemoryProbe>,
    ) -> OptimizerResult<Self> {
        if config.group_mode.is_pooled() {
            Ok(GroupManager::Dynamic(DynamicGroupManager::new(config, meta, probe)?))
        } else {
            Ok(GroupManager::Static(StaticGroupManager::new(config, meta)?))
        }
    }

    pub fn checkout(&self) -> GroupGuard<'_> {
        match self {
            GroupManager::Static(m) => m.checkout(),
            GroupManager::Dynamic(m) => m.checkout(),
        }
    }

    pub fn optimize(&self, plan: LogicalNode) -> OptimizerResult<LogicalNode> {
        self.checkout().optimize(plan)
    }

    pub fn optimize_with_trace(&self, plan: LogicalNode) -> OptimizerResult<(LogicalNode, PlanTrace)> {
        self.checkout().optimize_with_trace(plan)
    }

    pub fn clear_all(&self) -> OptimizerResult<()> {
        match self {
            GroupManager::Static(m) => m.clear_all(),
            GroupManager::Dynamic(m) => m.clear_all(),
        }
    }

    pub fn pool_size(&self) -> usize {
        match self {
            GroupManager::Static(_) => 1,
            GroupManager::Dynamic(m) => m.pool_size(),
        }
    }

    /// Stop background work; a no-op for the static manager
    pub fn shutdown(&self) {
        if let GroupManager::Dynamic(m) = self {
            m.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo() {
        let text = "MemTotal:       16000 kB\nMemFree:         1000 kB\nMemAvailable:    4000 kB\n";
        let sample = ProcMeminfoProbe::parse(text).unwrap();
        assert_eq!(sample.total_bytes, 16000 * 1024);
        assert_eq!(sample.free_bytes, 4000 * 1024);
        assert!((sample.free_ratio() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_parse_meminfo_missing_field() {
        let err = ProcMeminfoProbe::parse("MemTotal: 16000 kB\n").unwrap_err();
        assert!(matches!(err, OptimizerError::Unsupported(_)));
    }

    #[test]
    fn test_empty_total_counts_as_free() {
        let sample = MemorySample {
            free_bytes: 0,
            total_bytes: 0,
        };
        assert_eq!(sample.free_ratio(), 1.0);
    }

    #[test]
    fn test_group_index_is_stable() {
        let id = thread::current().id();
        let first = group_index_for(id, 7);
        assert!(first < 7);
        assert_eq!(group_index_for(id, 7), first);
        assert_eq!(group_index_for(id, 1), 0);
    }
}
