//! Simulated memory budget used to size waves.
//!
//! The ledger tracks no real heap. It gives the orchestrator a
//! deterministic pressure signal that callers drive explicitly.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Utilization above which the ledger reports pressure.
pub const PRESSURE_THRESHOLD_PERCENT: u64 = 80;

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub allocated_bytes: u64,
    pub max_bytes: u64,
    pub utilization_percent: f64,
    pub fragmentation_percent: f64,
    pub is_under_pressure: bool,
}

/// Bounded allocation ledger with fragmentation accounting.
///
/// Invariants: `used_bytes <= allocated_bytes <= max_bytes`, and
/// `used_bytes` equals the live charges plus `reclaimable_bytes`.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    max_bytes: u64,
    allocated_bytes: u64,
    used_bytes: u64,
    /// Bytes released from the middle of the allocation and not yet compacted.
    gap_bytes: u64,
    /// Bytes charged per checkpoint name.
    charges: HashMap<String, u64>,
    /// Charges of removed checkpoints awaiting `compact`.
    reclaimable_bytes: u64,
}

impl MemoryLedger {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            allocated_bytes: 0,
            used_bytes: 0,
            gap_bytes: 0,
            charges: HashMap::new(),
            reclaimable_bytes: 0,
        }
    }

    /// Increase the allocation. Leaves the ledger untouched on failure.
    pub fn grow(&mut self, bytes: u64) -> Result<()> {
        match self.allocated_bytes.checked_add(bytes) {
            Some(total) if total <= self.max_bytes => {
                self.allocated_bytes = total;
                Ok(())
            }
            _ => Err(Error::MemoryLimitExceeded {
                requested: bytes,
                allocated: self.allocated_bytes,
                max: self.max_bytes,
            }),
        }
    }

    /// Decrease the allocation. Leaves the ledger untouched on failure.
    ///
    /// Releasing part of a live allocation leaves a gap that counts as
    /// fragmentation until the next compaction.
    pub fn shrink(&mut self, bytes: u64) -> Result<()> {
        if bytes > self.allocated_bytes {
            return Err(Error::InsufficientAllocation {
                requested: bytes,
                allocated: self.allocated_bytes,
            });
        }
        self.allocated_bytes -= bytes;
        if self.allocated_bytes > 0 {
            self.gap_bytes = self.gap_bytes.saturating_add(bytes);
        }
        if self.used_bytes > self.allocated_bytes {
            self.used_bytes = self.allocated_bytes;
            self.trim_charges_to_used();
        }
        Ok(())
    }

    /// Drop charged bytes that no longer fit in `used_bytes` after a shrink.
    ///
    /// Reclaimable bytes go first, then live charges in name order.
    fn trim_charges_to_used(&mut self) {
        let charged: u64 = self.charges.values().sum();
        let mut excess = charged
            .saturating_add(self.reclaimable_bytes)
            .saturating_sub(self.used_bytes);

        let from_reclaimable = excess.min(self.reclaimable_bytes);
        self.reclaimable_bytes -= from_reclaimable;
        excess -= from_reclaimable;

        let mut names: Vec<String> = self.charges.keys().cloned().collect();
        names.sort();
        for name in names {
            if excess == 0 {
                break;
            }
            if let Some(bytes) = self.charges.get_mut(&name) {
                let cut = excess.min(*bytes);
                *bytes -= cut;
                excess -= cut;
                if *bytes == 0 {
                    self.charges.remove(&name);
                }
            }
        }
    }

    /// Charge a saved checkpoint against the free part of the allocation.
    ///
    /// A repeated save under the same name replaces the earlier charge.
    /// Returns the number of bytes charged, which may be less than `bytes`
    /// (or zero) when headroom is short.
    pub fn charge(&mut self, name: &str, bytes: u64) -> u64 {
        if let Some(previous) = self.charges.remove(name) {
            self.used_bytes = self.used_bytes.saturating_sub(previous);
        }
        let headroom = self.allocated_bytes - self.used_bytes;
        let charged = bytes.min(headroom);
        if charged > 0 {
            self.used_bytes += charged;
            self.charges.insert(name.to_string(), charged);
        }
        charged
    }

    /// Mark a removed checkpoint's charge as reclaimable by [`compact`](Self::compact).
    pub fn release(&mut self, name: &str) {
        if let Some(charged) = self.charges.remove(name) {
            self.reclaimable_bytes = self.reclaimable_bytes.saturating_add(charged);
        }
    }

    /// Defragment and return reclaimable bytes to the budget.
    ///
    /// Returns the number of bytes reclaimed.
    pub fn compact(&mut self) -> u64 {
        let reclaimed = self.reclaimable_bytes.min(self.used_bytes);
        self.used_bytes -= reclaimed;
        self.allocated_bytes -= reclaimed.min(self.allocated_bytes);
        self.reclaimable_bytes = 0;
        self.gap_bytes = 0;
        reclaimed
    }

    pub fn usage(&self) -> MemoryUsage {
        let percent_of_max = |bytes: u64| {
            if self.max_bytes == 0 {
                0.0
            } else {
                bytes as f64 * 100.0 / self.max_bytes as f64
            }
        };
        let is_under_pressure = u128::from(self.allocated_bytes) * 100
            > u128::from(self.max_bytes) * u128::from(PRESSURE_THRESHOLD_PERCENT);

        MemoryUsage {
            used_bytes: self.used_bytes,
            allocated_bytes: self.allocated_bytes,
            max_bytes: self.max_bytes,
            utilization_percent: percent_of_max(self.allocated_bytes),
            fragmentation_percent: percent_of_max(self.gap_bytes).min(100.0),
            is_under_pressure,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn allocated_bytes(&self) -> u64 {
        self.allocated_bytes
    }
}
