//! EPS bearer and PDN connection data
//!
//! A PDN connection owns an ordered set of bearer slot indices into the UE's
//! bearer array; position 0 is always the default bearer.

use std::fmt;

use crate::types::{Bitrate, EBI_UNASSIGNED};

// ============================================================================
// Bearer status
// ============================================================================

/// EPS bearer context status (TS 24.301 6.1.3.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EsmEbrStatus {
    #[default]
    Inactive,
    Active,
    /// Activation sent, waiting for accept
    ActivePending,
    /// Deactivation sent, waiting for accept
    InactivePending,
    /// Modification sent, waiting for accept
    ModifyPending,
}

impl EsmEbrStatus {
    /// True for the states in which a retransmission timer may run
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            EsmEbrStatus::ActivePending | EsmEbrStatus::InactivePending | EsmEbrStatus::ModifyPending
        )
    }
}

impl fmt::Display for EsmEbrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EsmEbrStatus::Inactive => write!(f, "BEARER CONTEXT INACTIVE"),
            EsmEbrStatus::Active => write!(f, "BEARER CONTEXT ACTIVE"),
            EsmEbrStatus::ActivePending => write!(f, "BEARER CONTEXT ACTIVE PENDING"),
            EsmEbrStatus::InactivePending => write!(f, "BEARER CONTEXT INACTIVE PENDING"),
            EsmEbrStatus::ModifyPending => write!(f, "BEARER CONTEXT MODIFY PENDING"),
        }
    }
}

/// ESM retransmission timers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EsmTimerId {
    /// T3485 - Activate bearer context request
    T3485,
    /// T3486 - Modify bearer context request
    T3486,
    /// T3495 - Deactivate bearer context request
    T3495,
}

/// Handle of a retransmission timer armed by the procedure layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerTimer {
    /// Timer
    pub id: EsmTimerId,
    /// Retransmissions so far
    pub retry_count: u32,
}

// ============================================================================
// Owned NAS blobs
// ============================================================================

/// Traffic Flow Template, encoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficFlowTemplate {
    pub buffer: Vec<u8>,
}

/// Protocol Configuration Options, encoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolConfigurationOptions {
    pub buffer: Vec<u8>,
}

// ============================================================================
// Bearer Context
// ============================================================================

/// Guaranteed and maximum bitrates of a bearer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BearerRates {
    /// GBR
    pub gbr: Bitrate,
    /// MBR
    pub mbr: Bitrate,
}

impl BearerRates {
    pub fn new(gbr_dl: u64, gbr_ul: u64, mbr_dl: u64, mbr_ul: u64) -> Self {
        Self {
            gbr: Bitrate::new(gbr_dl, gbr_ul),
            mbr: Bitrate::new(mbr_dl, mbr_ul),
        }
    }
}

/// EPS bearer context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerContext {
    /// EPS Bearer ID
    pub ebi: u8,
    /// Owning PDN connection
    pub pdn_cid: u8,
    /// Procedure Transaction Identity
    pub pti: u8,
    /// QCI
    pub qci: u8,
    /// Bitrates
    pub rates: BearerRates,
    /// TFT
    pub tft: Option<TrafficFlowTemplate>,
    /// PCO
    pub pco: Option<ProtocolConfigurationOptions>,
    status: EsmEbrStatus,
    timer: Option<BearerTimer>,
}

impl BearerContext {
    /// Freshly registered bearer: inactive, no timer
    pub fn new(ebi: u8, pdn_cid: u8) -> Self {
        Self {
            ebi,
            pdn_cid,
            pti: 0,
            qci: 0,
            rates: BearerRates::default(),
            tft: None,
            pco: None,
            status: EsmEbrStatus::Inactive,
            timer: None,
        }
    }

    pub fn status(&self) -> EsmEbrStatus {
        self.status
    }

    pub fn timer(&self) -> Option<&BearerTimer> {
        self.timer.as_ref()
    }

    /// Change status; leaving the pending states disarms the timer
    pub(crate) fn set_status(&mut self, status: EsmEbrStatus) -> EsmEbrStatus {
        let old = self.status;
        self.status = status;
        if !status.is_pending() {
            self.timer = None;
        }
        old
    }

    pub(crate) fn arm_timer(&mut self, timer: BearerTimer) -> Option<BearerTimer> {
        self.timer.replace(timer)
    }
}

// ============================================================================
// PDN Connection
// ============================================================================

/// PDN connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdnConnection {
    /// PDN connection identifier
    pub cid: u8,
    /// APN
    pub apn: String,
    /// Activation indicator
    pub is_active: bool,
    /// EBI of the default bearer
    pub default_ebi: u8,
    /// Emergency PDN
    pub is_emergency: bool,
    /// Number of bearers attached
    pub n_bearers: usize,
    /// Bearer slot indices; position 0 is the default bearer
    pub(crate) bearer_slots: Vec<usize>,
}

impl PdnConnection {
    pub fn new(cid: u8, apn: &str, is_emergency: bool) -> Self {
        Self {
            cid,
            apn: apn.to_string(),
            is_active: false,
            default_ebi: EBI_UNASSIGNED,
            is_emergency,
            n_bearers: 0,
            bearer_slots: Vec::new(),
        }
    }

    /// UE bearer slots owned by this PDN, default bearer first
    pub fn bearer_slots(&self) -> &[usize] {
        &self.bearer_slots
    }
}
