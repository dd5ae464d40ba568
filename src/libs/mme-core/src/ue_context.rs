//! MME UE context
//!
//! One context per attached UE. The context owns its PDN connections and
//! bearer contexts in fixed-capacity slot arrays; bearers are indexed by a
//! per-UE slot number, not by EBI.

use std::fmt;

use crate::bearer::{BearerContext, EsmEbrStatus, PdnConnection};
use crate::error::{MmeError, MmeResult};
use crate::tai_list::TaiList;
use crate::types::{
    EpsGuti, BEARERS_PER_UE, EBI_UNASSIGNED, MAX_APN_PER_UE, MAX_EPS_BEARER_ID, MIN_EPS_BEARER_ID,
};

// ============================================================================
// Procedure state carried on the UE
// ============================================================================

/// Cause recorded for a pending UE context release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UeContextReleaseCause {
    #[default]
    Invalid,
    /// NAS signalling connection release
    NasNormalRelease,
    /// Detach
    NasDetach,
    /// Radio link failure reported by the eNB
    RadioEutranGenerated,
    /// Release without tearing down the NAS context
    InvalidateNas,
    /// Implicit release on S1 path failure
    ImplicitContextRelease,
}

impl UeContextReleaseCause {
    /// True if session resources must be kept
    pub fn preserves_session(&self) -> bool {
        matches!(self, UeContextReleaseCause::InvalidateNas)
    }
}

/// EPS update type of a pending tracking area update (TS 24.301 9.9.3.14)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EpsUpdateType {
    TaUpdating = 0,
    CombinedTaLaUpdating = 1,
    CombinedTaLaUpdatingWithImsiAttach = 2,
    PeriodicUpdating = 3,
}

// ============================================================================
// MME UE
// ============================================================================

/// MME UE context
#[derive(Debug, Clone)]
pub struct MmeUe {
    mme_ue_s1ap_id: u32,
    imsi_bcd: Option<String>,
    guti: Option<EpsGuti>,

    /// TAI list sent with the current GUTI
    pub tai_list: TaiList,

    /// PDN connection slots, indexed by connection id
    pub(crate) pdn: [Option<PdnConnection>; MAX_APN_PER_UE],
    /// Bearer context slots
    pub(crate) bearers: [Option<BearerContext>; BEARERS_PER_UE],
    /// Bearers registered across all PDN connections
    pub(crate) n_active_ebrs: usize,

    /// Emergency bearer services in use
    pub is_emergency: bool,
    /// Cause of the pending S1 release
    pub ue_context_rel_cause: UeContextReleaseCause,
    /// Subscription data received from the HSS
    pub subscription_known: bool,
    /// Bearer deactivation waits for the UE to become reachable
    pub pending_bearer_deactivation: bool,
    /// EPS update type of the TAU being processed
    pub pending_tau_eps_update_type: Option<EpsUpdateType>,
    /// UE radio capability as received from the eNB
    pub ue_radio_capability: Option<Vec<u8>>,
}

impl MmeUe {
    /// Empty context for a new S1 signalling connection
    pub fn new(mme_ue_s1ap_id: u32) -> Self {
        Self {
            mme_ue_s1ap_id,
            imsi_bcd: None,
            guti: None,
            tai_list: TaiList::new(),
            pdn: std::array::from_fn(|_| None),
            bearers: std::array::from_fn(|_| None),
            n_active_ebrs: 0,
            is_emergency: false,
            ue_context_rel_cause: UeContextReleaseCause::default(),
            subscription_known: false,
            pending_bearer_deactivation: false,
            pending_tau_eps_update_type: None,
            ue_radio_capability: None,
        }
    }

    pub fn mme_ue_s1ap_id(&self) -> u32 {
        self.mme_ue_s1ap_id
    }

    pub fn imsi(&self) -> Option<&str> {
        self.imsi_bcd.as_deref()
    }

    pub fn guti(&self) -> Option<&EpsGuti> {
        self.guti.as_ref()
    }

    // Keys change only through the store so the indexes stay in step
    pub(crate) fn set_mme_ue_s1ap_id(&mut self, id: u32) {
        self.mme_ue_s1ap_id = id;
    }

    pub(crate) fn set_imsi(&mut self, imsi: Option<String>) {
        self.imsi_bcd = imsi;
    }

    pub(crate) fn set_guti(&mut self, guti: Option<EpsGuti>) {
        self.guti = guti;
    }

    /// Number of bearers currently registered for the UE
    pub fn n_active_ebrs(&self) -> usize {
        self.n_active_ebrs
    }

    // ========================================================================
    // PDN connections
    // ========================================================================

    pub fn pdn(&self, cid: u8) -> Option<&PdnConnection> {
        self.pdn.get(cid as usize).and_then(|p| p.as_ref())
    }

    pub(crate) fn pdn_mut(&mut self, cid: u8) -> Option<&mut PdnConnection> {
        self.pdn.get_mut(cid as usize).and_then(|p| p.as_mut())
    }

    /// Allocated PDN connections in connection id order
    pub fn pdns(&self) -> impl Iterator<Item = &PdnConnection> {
        self.pdn.iter().flatten()
    }

    /// Allocate a PDN connection in the lowest free slot
    pub fn create_pdn_connection(&mut self, apn: &str, is_emergency: bool) -> MmeResult<u8> {
        let Some(cid) = self.pdn.iter().position(|p| p.is_none()) else {
            log::warn!(
                "[{}] No free PDN connection slot for APN {}",
                self.mme_ue_s1ap_id, apn
            );
            return Err(MmeError::CapacityExceeded {
                what: "PDN connection",
                max: MAX_APN_PER_UE,
            });
        };

        let cid = cid as u8;
        self.pdn[cid as usize] = Some(PdnConnection::new(cid, apn, is_emergency));
        log::info!(
            "[{}] PDN connection {} created (APN {}{})",
            self.mme_ue_s1ap_id,
            cid,
            apn,
            if is_emergency { ", emergency" } else { "" }
        );
        Ok(cid)
    }

    /// Free a PDN connection that no longer has bearers
    pub fn release_pdn_connection(&mut self, cid: u8) -> MmeResult<()> {
        let pdn = self.pdn(cid).ok_or(MmeError::PdnNotFound(cid))?;
        if pdn.n_bearers != 0 {
            return Err(MmeError::InvalidArgument(format!(
                "PDN connection {} still has {} bearers",
                cid, pdn.n_bearers
            )));
        }
        self.pdn[cid as usize] = None;
        log::info!("[{}] PDN connection {} released", self.mme_ue_s1ap_id, cid);
        Ok(())
    }

    // ========================================================================
    // Bearer contexts
    // ========================================================================

    pub fn bearer(&self, slot: usize) -> Option<&BearerContext> {
        self.bearers.get(slot).and_then(|b| b.as_ref())
    }

    /// Registered bearers with their slot index
    pub fn bearers(&self) -> impl Iterator<Item = (usize, &BearerContext)> {
        self.bearers
            .iter()
            .enumerate()
            .filter_map(|(slot, b)| b.as_ref().map(|b| (slot, b)))
    }

    /// Slot holding the bearer with this EBI
    pub fn find_bearer_slot(&self, ebi: u8) -> Option<usize> {
        if ebi == EBI_UNASSIGNED {
            return None;
        }
        self.bearers().find(|(_, b)| b.ebi == ebi).map(|(slot, _)| slot)
    }

    pub fn find_bearer(&self, ebi: u8) -> Option<&BearerContext> {
        self.find_bearer_slot(ebi).and_then(|slot| self.bearer(slot))
    }

    pub(crate) fn find_bearer_mut(&mut self, ebi: u8) -> Option<&mut BearerContext> {
        let slot = self.find_bearer_slot(ebi)?;
        self.bearers[slot].as_mut()
    }

    /// Status of the bearer with this EBI; unknown bearers are inactive
    pub fn bearer_status(&self, ebi: u8) -> EsmEbrStatus {
        self.find_bearer(ebi)
            .map(|b| b.status())
            .unwrap_or(EsmEbrStatus::Inactive)
    }

    /// Claim a free bearer slot for `ebi` under PDN `cid`
    ///
    /// The default bearer must be the first bearer of its PDN and a dedicated
    /// bearer needs a default bearer in place. Nothing is modified on error.
    pub(crate) fn register_bearer_context(&mut self, ebi: u8, cid: u8, is_default: bool) -> MmeResult<usize> {
        if !(MIN_EPS_BEARER_ID..=MAX_EPS_BEARER_ID).contains(&ebi) {
            return Err(MmeError::InvalidArgument(format!("EBI {} out of range", ebi)));
        }
        if self.find_bearer_slot(ebi).is_some() {
            return Err(MmeError::InvalidArgument(format!("EBI {} already in use", ebi)));
        }

        let pdn = self.pdn(cid).ok_or(MmeError::PdnNotFound(cid))?;
        match (is_default, pdn.bearer_slots.is_empty()) {
            (true, false) => {
                return Err(MmeError::InvalidArgument(format!(
                    "PDN connection {} already has default bearer {}",
                    cid, pdn.default_ebi
                )));
            }
            (false, true) => {
                return Err(MmeError::InvalidArgument(format!(
                    "PDN connection {} has no default bearer",
                    cid
                )));
            }
            _ => {}
        }

        let slot = self
            .bearers
            .iter()
            .position(|b| b.is_none())
            .ok_or(MmeError::CapacityExceeded {
                what: "bearer context",
                max: BEARERS_PER_UE,
            })?;

        self.bearers[slot] = Some(BearerContext::new(ebi, cid));
        if let Some(pdn) = self.pdn_mut(cid) {
            pdn.bearer_slots.push(slot);
        }
        log::debug!(
            "[{}] EBI {} registered in slot {} of PDN {}",
            self.mme_ue_s1ap_id, ebi, slot, cid
        );
        Ok(slot)
    }

    /// Return a bearer slot to the free pool
    pub(crate) fn unregister_bearer_context(&mut self, slot: usize) -> Option<BearerContext> {
        let bearer = self.bearers.get_mut(slot)?.take()?;
        if let Some(pdn) = self.pdn_mut(bearer.pdn_cid) {
            pdn.bearer_slots.retain(|&s| s != slot);
        }
        Some(bearer)
    }

    /// Bookkeeping consistency: the UE bearer count equals the sum of the PDN
    /// bearer counts, every PDN bearer slot is occupied by a bearer of that
    /// PDN, and no slot is claimed twice.
    pub fn check_invariants(&self) -> bool {
        let sum: usize = self.pdns().map(|p| p.n_bearers).sum();
        if sum != self.n_active_ebrs || self.n_active_ebrs > BEARERS_PER_UE {
            return false;
        }

        let mut claimed = [false; BEARERS_PER_UE];
        for pdn in self.pdns() {
            if pdn.n_bearers != pdn.bearer_slots.len() {
                return false;
            }
            for &slot in &pdn.bearer_slots {
                if slot >= BEARERS_PER_UE || claimed[slot] {
                    return false;
                }
                claimed[slot] = true;
                match self.bearer(slot) {
                    Some(b) if b.pdn_cid == pdn.cid => {}
                    _ => return false,
                }
            }
        }

        self.bearers().all(|(slot, _)| claimed[slot])
    }
}

impl fmt::Display for MmeUe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UE[{}]", self.mme_ue_s1ap_id)?;
        if let Some(imsi) = &self.imsi_bcd {
            write!(f, " IMSI:{}", imsi)?;
        }
        Ok(())
    }
}
