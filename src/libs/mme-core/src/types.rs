//! Identity and QoS value types shared by the MME core
//!
//! PLMN, TAI and GUTI are plain value types: they are copied into and out of
//! the UE context and have no lifetime of their own.

use std::fmt;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of PDN connections per UE
pub const MAX_APN_PER_UE: usize = 5;
/// Maximum number of EPS bearer contexts per UE (EBI 5..=15)
pub const BEARERS_PER_UE: usize = 11;
/// Maximum number of entries in a UE TAI list
pub const TAI_LIST_MAX_SIZE: usize = 16;
/// Maximum number of configured neighbor MMEs
pub const MAX_NGH_MMES: usize = 5;
/// Maximum number of served TAIs in the configuration
pub const MAX_NUM_OF_SERVED_TAI: usize = 16;
/// Maximum length of a security algorithm preference list
pub const MAX_NUM_OF_ALGORITHM: usize = 8;

/// Minimum EPS bearer ID
pub const MIN_EPS_BEARER_ID: u8 = 5;
/// Maximum EPS bearer ID
pub const MAX_EPS_BEARER_ID: u8 = 15;
/// EPS bearer identity value meaning "no bearer"
pub const EBI_UNASSIGNED: u8 = 0;

/// Reserved M-TMSI, never issued
pub const INVALID_M_TMSI: u32 = 0xffff_ffff;
/// Reserved TAC, never part of a TAI list
pub const INVALID_TAC: u16 = 0xfffe;
/// Invalid MME UE S1AP ID
pub const INVALID_MME_UE_S1AP_ID: u32 = 0xffff_ffff;

// ============================================================================
// PLMN ID
// ============================================================================

/// PLMN ID, one decimal digit per field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PlmnId {
    /// MCC digit 1
    pub mcc1: u8,
    /// MCC digit 2
    pub mcc2: u8,
    /// MCC digit 3
    pub mcc3: u8,
    /// MNC digit 1
    pub mnc1: u8,
    /// MNC digit 2
    pub mnc2: u8,
    /// MNC digit 3 (0xf if 2-digit MNC)
    pub mnc3: u8,
}

impl PlmnId {
    /// Create a PLMN ID from MCC/MNC digit strings
    pub fn new(mcc: &str, mnc: &str) -> Self {
        let mcc_bytes: Vec<u8> = mcc.chars().filter_map(|c| c.to_digit(10).map(|d| d as u8)).collect();
        let mnc_bytes: Vec<u8> = mnc.chars().filter_map(|c| c.to_digit(10).map(|d| d as u8)).collect();

        Self {
            mcc1: mcc_bytes.first().copied().unwrap_or(0),
            mcc2: mcc_bytes.get(1).copied().unwrap_or(0),
            mcc3: mcc_bytes.get(2).copied().unwrap_or(0),
            mnc1: mnc_bytes.first().copied().unwrap_or(0),
            mnc2: mnc_bytes.get(1).copied().unwrap_or(0),
            mnc3: mnc_bytes.get(2).copied().unwrap_or(0xf),
        }
    }

    /// True if the MNC has three digits
    pub fn is_long_mnc(&self) -> bool {
        self.mnc3 != 0xf
    }

    /// Convert to BCD string
    pub fn to_bcd(&self) -> String {
        if self.mnc3 == 0xf {
            format!("{}{}{}{}{}", self.mcc1, self.mcc2, self.mcc3, self.mnc1, self.mnc2)
        } else {
            format!("{}{}{}{}{}{}", self.mcc1, self.mcc2, self.mcc3, self.mnc1, self.mnc2, self.mnc3)
        }
    }
}

impl fmt::Display for PlmnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}.", self.mcc1, self.mcc2, self.mcc3)?;
        if self.is_long_mnc() {
            write!(f, "{}{}{}", self.mnc1, self.mnc2, self.mnc3)
        } else {
            write!(f, "{}{}", self.mnc1, self.mnc2)
        }
    }
}

// ============================================================================
// TAI / GUMMEI / GUTI
// ============================================================================

/// EPS TAI (Tracking Area Identity)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EpsTai {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// TAC (16 bits for EPS)
    pub tac: u16,
}

impl EpsTai {
    /// Create a TAI
    pub fn new(plmn_id: PlmnId, tac: u16) -> Self {
        Self { plmn_id, tac }
    }
}

impl fmt::Display for EpsTai {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-TAC:{:#06x}", self.plmn_id, self.tac)
    }
}

/// GUMMEI (Globally Unique MME Identifier)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Gummei {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// MME Group ID
    pub mme_gid: u16,
    /// MME Code
    pub mme_code: u8,
}

/// EPS GUTI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EpsGuti {
    /// PLMN ID
    pub plmn_id: PlmnId,
    /// MME Group ID
    pub mme_gid: u16,
    /// MME Code
    pub mme_code: u8,
    /// M-TMSI
    pub m_tmsi: u32,
}

impl EpsGuti {
    /// Build a GUTI from the node GUMMEI and a unique M-TMSI
    pub fn new(gummei: &Gummei, m_tmsi: u32) -> Self {
        Self {
            plmn_id: gummei.plmn_id,
            mme_gid: gummei.mme_gid,
            mme_code: gummei.mme_code,
            m_tmsi,
        }
    }

    /// GUMMEI part of the GUTI
    pub fn gummei(&self) -> Gummei {
        Gummei {
            plmn_id: self.plmn_id,
            mme_gid: self.mme_gid,
            mme_code: self.mme_code,
        }
    }
}

impl fmt::Display for EpsGuti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{:04x}|{:02x}|{:08x}",
            self.plmn_id, self.mme_gid, self.mme_code, self.m_tmsi
        )
    }
}

// ============================================================================
// QoS
// ============================================================================

/// Bitrate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bitrate {
    /// Downlink bitrate (bps)
    pub downlink: u64,
    /// Uplink bitrate (bps)
    pub uplink: u64,
}

impl Bitrate {
    /// Create a bitrate pair
    pub fn new(downlink: u64, uplink: u64) -> Self {
        Self { downlink, uplink }
    }
}
