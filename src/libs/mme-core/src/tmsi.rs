//! M-TMSI allocation
//!
//! The allocator is owned by the MME task and tracks every M-TMSI currently
//! bound to a UE, so a value is never handed out twice while it is live.

use std::collections::HashSet;

use crate::config::RunMode;
use crate::error::{MmeError, MmeResult};
use crate::types::INVALID_M_TMSI;

/// Random draws attempted before giving up
const MAX_RANDOM_ATTEMPTS: usize = 32;

/// M-TMSI generation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmsiMode {
    /// Counter starting at 1
    Sequential,
    /// Uniformly random values
    Random,
}

impl From<RunMode> for TmsiMode {
    fn from(mode: RunMode) -> Self {
        match mode {
            RunMode::Test => TmsiMode::Sequential,
            RunMode::Normal => TmsiMode::Random,
        }
    }
}

/// M-TMSI allocator with a live-identity registry
#[derive(Debug)]
pub struct MTmsiAllocator {
    mode: TmsiMode,
    next: u32,
    live: HashSet<u32>,
}

impl MTmsiAllocator {
    /// Create a new allocator
    pub fn new(mode: TmsiMode) -> Self {
        Self::with_start(mode, 1)
    }

    /// Create a sequential allocator whose counter starts at `start`
    pub fn with_start(mode: TmsiMode, start: u32) -> Self {
        Self {
            mode,
            next: start,
            live: HashSet::new(),
        }
    }

    /// Generation mode
    pub fn mode(&self) -> TmsiMode {
        self.mode
    }

    /// Number of M-TMSIs currently bound to a UE
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// True if `m_tmsi` is currently bound to a UE
    pub fn is_live(&self, m_tmsi: u32) -> bool {
        self.live.contains(&m_tmsi)
    }

    /// Allocate a fresh M-TMSI
    ///
    /// Fails with `AllocationExhausted` when the generator reaches the
    /// reserved value or no free value can be found.
    pub fn allocate(&mut self) -> MmeResult<u32> {
        let m_tmsi = match self.mode {
            TmsiMode::Sequential => self.next_sequential()?,
            TmsiMode::Random => self.next_random()?,
        };
        self.live.insert(m_tmsi);
        Ok(m_tmsi)
    }

    /// Return an M-TMSI to the free pool
    pub fn release(&mut self, m_tmsi: u32) -> bool {
        self.live.remove(&m_tmsi)
    }

    /// Mark an externally assigned M-TMSI as live
    pub fn reserve(&mut self, m_tmsi: u32) -> MmeResult<()> {
        if m_tmsi == INVALID_M_TMSI {
            return Err(MmeError::InvalidArgument("reserved M-TMSI".to_string()));
        }
        if !self.live.insert(m_tmsi) {
            return Err(MmeError::InvalidArgument(format!("M-TMSI {:#010x} already in use", m_tmsi)));
        }
        Ok(())
    }

    fn next_sequential(&mut self) -> MmeResult<u32> {
        // Every value except the sentinel may be live at most once
        let mut attempts = (INVALID_M_TMSI as u64).saturating_sub(self.live.len() as u64) + 1;
        loop {
            let candidate = self.next;
            if candidate == INVALID_M_TMSI {
                self.next = 1;
                log::warn!("M-TMSI counter reached the reserved value, wrapping");
                return Err(MmeError::AllocationExhausted);
            }
            self.next = candidate.wrapping_add(1);
            if !self.live.contains(&candidate) {
                return Ok(candidate);
            }
            attempts -= 1;
            if attempts == 0 {
                return Err(MmeError::AllocationExhausted);
            }
        }
    }

    fn next_random(&mut self) -> MmeResult<u32> {
        for _ in 0..MAX_RANDOM_ATTEMPTS {
            let candidate: u32 = rand::random();
            if candidate != INVALID_M_TMSI && !self.live.contains(&candidate) {
                return Ok(candidate);
            }
        }
        log::error!("No free M-TMSI after {} attempts", MAX_RANDOM_ATTEMPTS);
        Err(MmeError::AllocationExhausted)
    }
}
