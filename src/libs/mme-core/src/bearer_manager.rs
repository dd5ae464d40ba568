//! EPS Bearer Context Manager
//!
//! Creates and releases the bearer contexts of a UE under its PDN
//! connections. The UE-wide bearer count always equals the sum of the PDN
//! bearer counts, and releasing a default bearer tears down every dedicated
//! bearer of the same PDN.

use crate::bearer::{
    BearerContext, BearerRates, BearerTimer, EsmEbrStatus, ProtocolConfigurationOptions,
    TrafficFlowTemplate,
};
use crate::error::{MmeError, MmeResult};
use crate::types::{BEARERS_PER_UE, EBI_UNASSIGNED};
use crate::ue_context::MmeUe;

/// Parameters of a bearer to create
#[derive(Debug, Clone, Default)]
pub struct BearerRequest {
    /// PDN connection identifier
    pub pdn_cid: u8,
    /// Requested EPS bearer identity
    pub ebi: u8,
    /// Default bearer of the PDN
    pub is_default: bool,
    /// QCI
    pub qci: u8,
    /// GBR/MBR
    pub rates: BearerRates,
    /// TFT
    pub tft: Option<TrafficFlowTemplate>,
    /// PCO
    pub pco: Option<ProtocolConfigurationOptions>,
    /// Procedure transaction identity
    pub pti: u8,
}

/// Bearer addressed by a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseTarget {
    /// Bearer with this EBI
    ByIdentity(u8),
    /// Bearer at position `slot` of PDN `pid` (0 is the default bearer)
    ByPosition { pid: u8, slot: usize },
}

/// Create a bearer context
///
/// Returns the EBI of the PDN's default bearer, which is the requested EBI
/// when the default bearer itself is created.
pub fn create_bearer(ue: &mut MmeUe, req: BearerRequest) -> MmeResult<u8> {
    let ue_id = ue.mme_ue_s1ap_id();

    if ue.pdn(req.pdn_cid).is_none() {
        log::error!("[{}] No PDN connection found (pid={})", ue_id, req.pdn_cid);
        return Err(MmeError::PdnNotFound(req.pdn_cid));
    }
    if ue.n_active_ebrs >= BEARERS_PER_UE {
        log::warn!(
            "[{}] The total number of active EPS bearers is exceeded ({})",
            ue_id, ue.n_active_ebrs
        );
        return Err(MmeError::CapacityExceeded {
            what: "EPS bearer",
            max: BEARERS_PER_UE,
        });
    }

    let slot = ue
        .register_bearer_context(req.ebi, req.pdn_cid, req.is_default)
        .map_err(|e| {
            log::warn!("[{}] Failed to register EBI {}: {}", ue_id, req.ebi, e);
            e
        })?;

    if let Some(bearer) = ue.bearers[slot].as_mut() {
        bearer.qci = req.qci;
        bearer.rates = req.rates;
        bearer.pti = req.pti;
        // Assignment drops any blob the slot held before
        bearer.tft = req.tft;
        bearer.pco = req.pco;
    }

    ue.n_active_ebrs += 1;
    let mut raise_emergency = false;
    let default_ebi = match ue.pdn_mut(req.pdn_cid) {
        Some(pdn) => {
            pdn.n_bearers += 1;
            if req.is_default {
                pdn.is_active = true;
                pdn.default_ebi = req.ebi;
                raise_emergency = pdn.is_emergency;
            }
            pdn.default_ebi
        }
        None => return Err(MmeError::PdnNotFound(req.pdn_cid)),
    };
    if raise_emergency {
        ue.is_emergency = true;
    }

    log::info!(
        "[{}] EPS bearer {} created (pid={}, {} bearer, QCI {}), {} active",
        ue_id,
        req.ebi,
        req.pdn_cid,
        if req.is_default { "default" } else { "dedicated" },
        req.qci,
        ue.n_active_ebrs
    );
    Ok(default_ebi)
}

/// Release a bearer context
///
/// Releasing the default bearer (position 0 of its PDN) releases every
/// remaining bearer of that PDN and deactivates the PDN. Returns the EBI of
/// the targeted bearer.
pub fn release_bearer(ue: &mut MmeUe, target: ReleaseTarget) -> MmeResult<u8> {
    let ue_id = ue.mme_ue_s1ap_id();

    let (pid, position) = match target {
        ReleaseTarget::ByIdentity(ebi) => {
            let slot = ue.find_bearer_slot(ebi).ok_or_else(|| {
                log::warn!("[{}] EPS bearer {} not found", ue_id, ebi);
                MmeError::BearerNotFound(format!("EBI {}", ebi))
            })?;
            let pid = ue.bearers[slot]
                .as_ref()
                .map(|b| b.pdn_cid)
                .ok_or_else(|| MmeError::BearerNotFound(format!("slot {}", slot)))?;
            let pdn = ue.pdn(pid).ok_or(MmeError::PdnNotFound(pid))?;
            let position = pdn
                .bearer_slots
                .iter()
                .position(|&s| s == slot)
                .ok_or_else(|| MmeError::BearerNotFound(format!("EBI {} in PDN {}", ebi, pid)))?;
            (pid, position)
        }
        ReleaseTarget::ByPosition { pid, slot } => {
            let pdn = ue.pdn(pid).ok_or_else(|| {
                log::error!("[{}] No PDN connection found (pid={})", ue_id, pid);
                MmeError::PdnNotFound(pid)
            })?;
            if slot >= pdn.bearer_slots.len() {
                return Err(MmeError::BearerNotFound(format!("position {} of PDN {}", slot, pid)));
            }
            (pid, slot)
        }
    };

    let Some(pdn) = ue.pdn(pid) else {
        return Err(MmeError::PdnNotFound(pid));
    };
    let target_slot = pdn.bearer_slots[position];
    // Dedicated bearers first, default bearer last
    let victims: Vec<usize> = if position == 0 {
        pdn.bearer_slots.iter().rev().copied().collect()
    } else {
        vec![target_slot]
    };

    let mut released_ebi = EBI_UNASSIGNED;
    for slot in victims {
        let Some(bearer) = release_slot(ue, slot) else {
            continue;
        };
        if slot == target_slot {
            released_ebi = bearer.ebi;
        } else {
            log::info!(
                "[{}] EPS bearer {} released with default bearer of PDN {}",
                ue_id, bearer.ebi, pid
            );
        }
    }

    if position == 0 {
        if let Some(pdn) = ue.pdn_mut(pid) {
            pdn.is_active = false;
            pdn.is_emergency = false;
            pdn.default_ebi = EBI_UNASSIGNED;
        }
        let emergency = ue.pdns().any(|p| p.is_active && p.is_emergency);
        ue.is_emergency = emergency;
    }

    log::info!(
        "[{}] EPS bearer {} released (pid={}), {} active",
        ue_id, released_ebi, pid, ue.n_active_ebrs
    );
    Ok(released_ebi)
}

/// Mark the bearer inactive, drop its resources and free its slot
fn release_slot(ue: &mut MmeUe, slot: usize) -> Option<BearerContext> {
    let mut bearer = ue.unregister_bearer_context(slot)?;
    bearer.set_status(EsmEbrStatus::Inactive);
    bearer.tft = None;
    bearer.pco = None;

    if let Some(pdn) = ue.pdn_mut(bearer.pdn_cid) {
        pdn.n_bearers = pdn.n_bearers.saturating_sub(1);
    }
    ue.n_active_ebrs = ue.n_active_ebrs.saturating_sub(1);
    Some(bearer)
}

/// Change the status of a bearer; returns the previous status
///
/// Moving to `Inactive` disarms the retransmission timer.
pub fn set_bearer_status(ue: &mut MmeUe, ebi: u8, status: EsmEbrStatus) -> MmeResult<EsmEbrStatus> {
    let ue_id = ue.mme_ue_s1ap_id();
    let bearer = ue
        .find_bearer_mut(ebi)
        .ok_or_else(|| MmeError::BearerNotFound(format!("EBI {}", ebi)))?;

    let old = bearer.set_status(status);
    if old != status {
        log::debug!("[{}] EBI {}: {} -> {}", ue_id, ebi, old, status);
    }
    Ok(old)
}

/// Attach a retransmission timer to a bearer in a pending state
pub fn arm_bearer_timer(ue: &mut MmeUe, ebi: u8, timer: BearerTimer) -> MmeResult<()> {
    let bearer = ue
        .find_bearer_mut(ebi)
        .ok_or_else(|| MmeError::BearerNotFound(format!("EBI {}", ebi)))?;

    if !bearer.status().is_pending() {
        return Err(MmeError::InvalidArgument(format!(
            "EBI {} is {}, timer {:?} not allowed",
            ebi,
            bearer.status(),
            timer.id
        )));
    }
    bearer.arm_timer(timer);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bearer::EsmTimerId;
    use crate::types::MAX_APN_PER_UE;

    fn request(pdn_cid: u8, ebi: u8, is_default: bool) -> BearerRequest {
        BearerRequest {
            pdn_cid,
            ebi,
            is_default,
            qci: if is_default { 9 } else { 1 },
            rates: BearerRates::new(1000, 1000, 2000, 2000),
            pti: 1,
            ..Default::default()
        }
    }

    fn ue_with_pdn(apn: &str, is_emergency: bool) -> (MmeUe, u8) {
        let mut ue = MmeUe::new(1);
        let cid = ue.create_pdn_connection(apn, is_emergency).unwrap();
        (ue, cid)
    }

    #[test]
    fn test_create_default_bearer() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        assert_eq!(create_bearer(&mut ue, request(cid, 5, true)).unwrap(), 5);

        let pdn = ue.pdn(cid).unwrap();
        assert!(pdn.is_active);
        assert_eq!(pdn.default_ebi, 5);
        assert_eq!(pdn.n_bearers, 1);
        assert_eq!(ue.n_active_ebrs(), 1);
        assert!(!ue.is_emergency);

        let bearer = ue.find_bearer(5).unwrap();
        assert_eq!(bearer.qci, 9);
        assert_eq!(bearer.pti, 1);
        assert_eq!(bearer.status(), EsmEbrStatus::Inactive);
        assert!(ue.check_invariants());
    }

    #[test]
    fn test_create_dedicated_returns_default_ebi() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        let mut req = request(cid, 6, false);
        req.tft = Some(TrafficFlowTemplate { buffer: vec![0x21, 0x10] });
        assert_eq!(create_bearer(&mut ue, req).unwrap(), 5);

        assert_eq!(ue.pdn(cid).unwrap().n_bearers, 2);
        assert_eq!(ue.n_active_ebrs(), 2);
        assert!(ue.find_bearer(6).unwrap().tft.is_some());
        assert!(ue.check_invariants());
    }

    #[test]
    fn test_create_emergency_raises_flag() {
        let (mut ue, cid) = ue_with_pdn("sos", true);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        assert!(ue.is_emergency);
    }

    #[test]
    fn test_create_unknown_pdn() {
        let mut ue = MmeUe::new(1);
        assert_eq!(create_bearer(&mut ue, request(0, 5, true)), Err(MmeError::PdnNotFound(0)));
        assert_eq!(ue.n_active_ebrs(), 0);
    }

    #[test]
    fn test_create_beyond_capacity() {
        let mut ue = MmeUe::new(1);
        let mut ebi = 5;
        for _ in 0..MAX_APN_PER_UE {
            let cid = ue.create_pdn_connection("internet", false).unwrap();
            create_bearer(&mut ue, request(cid, ebi, true)).unwrap();
            ebi += 1;
        }
        while ue.n_active_ebrs() < BEARERS_PER_UE {
            create_bearer(&mut ue, request(0, ebi, false)).unwrap();
            ebi += 1;
        }

        let before: Vec<usize> = ue.pdns().map(|p| p.n_bearers).collect();
        let err = create_bearer(&mut ue, request(1, 4, false)).unwrap_err();
        assert!(matches!(err, MmeError::CapacityExceeded { .. }));
        assert_eq!(ue.n_active_ebrs(), BEARERS_PER_UE);
        assert_eq!(ue.pdns().map(|p| p.n_bearers).collect::<Vec<_>>(), before);
        assert!(ue.check_invariants());
    }

    #[test]
    fn test_create_rejected_registration_leaves_counters() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        assert!(create_bearer(&mut ue, request(cid, 5, false)).is_err());
        assert!(create_bearer(&mut ue, request(cid, 6, true)).is_err());
        assert_eq!(ue.n_active_ebrs(), 1);
        assert_eq!(ue.pdn(cid).unwrap().n_bearers, 1);
    }

    #[test]
    fn test_release_default_cascades() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        create_bearer(&mut ue, request(cid, 6, false)).unwrap();
        set_bearer_status(&mut ue, 5, EsmEbrStatus::Active).unwrap();
        set_bearer_status(&mut ue, 6, EsmEbrStatus::Active).unwrap();

        assert_eq!(release_bearer(&mut ue, ReleaseTarget::ByIdentity(5)).unwrap(), 5);
        assert_eq!(ue.bearer_status(5), EsmEbrStatus::Inactive);
        assert_eq!(ue.bearer_status(6), EsmEbrStatus::Inactive);

        let pdn = ue.pdn(cid).unwrap();
        assert_eq!(pdn.n_bearers, 0);
        assert!(!pdn.is_active);
        assert_eq!(ue.n_active_ebrs(), 0);
        assert_eq!(ue.bearers().count(), 0);
        assert!(ue.check_invariants());
    }

    #[test]
    fn test_release_default_with_three_dedicated() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        for ebi in 6..=8 {
            create_bearer(&mut ue, request(cid, ebi, false)).unwrap();
        }

        let released = release_bearer(&mut ue, ReleaseTarget::ByPosition { pid: cid, slot: 0 });
        assert_eq!(released.unwrap(), 5);
        for ebi in 5..=8 {
            assert_eq!(ue.bearer_status(ebi), EsmEbrStatus::Inactive);
        }
        assert_eq!(ue.pdn(cid).unwrap().n_bearers, 0);
        assert!(ue.check_invariants());
    }

    #[test]
    fn test_release_dedicated_leaves_others() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        create_bearer(&mut ue, request(cid, 6, false)).unwrap();
        create_bearer(&mut ue, request(cid, 7, false)).unwrap();
        set_bearer_status(&mut ue, 7, EsmEbrStatus::Active).unwrap();

        assert_eq!(release_bearer(&mut ue, ReleaseTarget::ByIdentity(6)).unwrap(), 6);
        assert_eq!(ue.pdn(cid).unwrap().n_bearers, 2);
        assert_eq!(ue.bearer_status(7), EsmEbrStatus::Active);
        assert!(ue.find_bearer(5).is_some());
        assert!(ue.pdn(cid).unwrap().is_active);

        // Position 1 is now EBI 7
        let released = release_bearer(&mut ue, ReleaseTarget::ByPosition { pid: cid, slot: 1 });
        assert_eq!(released.unwrap(), 7);
        assert_eq!(ue.n_active_ebrs(), 1);
        assert!(ue.check_invariants());
    }

    #[test]
    fn test_release_not_found() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();

        assert!(release_bearer(&mut ue, ReleaseTarget::ByIdentity(9)).unwrap_err().is_not_found());
        assert!(release_bearer(&mut ue, ReleaseTarget::ByIdentity(0)).unwrap_err().is_not_found());
        assert_eq!(
            release_bearer(&mut ue, ReleaseTarget::ByPosition { pid: 3, slot: 0 }),
            Err(MmeError::PdnNotFound(3))
        );
        assert!(release_bearer(&mut ue, ReleaseTarget::ByPosition { pid: cid, slot: 1 }).is_err());
        assert_eq!(ue.n_active_ebrs(), 1);
    }

    #[test]
    fn test_release_emergency_default_clears_flags() {
        let (mut ue, cid) = ue_with_pdn("sos", true);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        assert!(ue.is_emergency);

        release_bearer(&mut ue, ReleaseTarget::ByIdentity(5)).unwrap();
        assert!(!ue.pdn(cid).unwrap().is_emergency);
        assert!(!ue.is_emergency);
    }

    #[test]
    fn test_release_emergency_default_keeps_other_emergency_pdn() {
        let (mut ue, first) = ue_with_pdn("sos", true);
        let second = ue.create_pdn_connection("sos2", true).unwrap();
        create_bearer(&mut ue, request(first, 5, true)).unwrap();
        create_bearer(&mut ue, request(second, 6, true)).unwrap();

        release_bearer(&mut ue, ReleaseTarget::ByPosition { pid: first, slot: 0 }).unwrap();
        assert!(ue.is_emergency);

        release_bearer(&mut ue, ReleaseTarget::ByIdentity(6)).unwrap();
        assert!(!ue.is_emergency);
    }

    #[test]
    fn test_released_slot_is_reused() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        create_bearer(&mut ue, request(cid, 6, false)).unwrap();
        release_bearer(&mut ue, ReleaseTarget::ByIdentity(6)).unwrap();

        create_bearer(&mut ue, request(cid, 7, false)).unwrap();
        assert_eq!(ue.find_bearer_slot(7), Some(1));
        assert!(ue.find_bearer(7).unwrap().tft.is_none());
    }

    #[test]
    fn test_timer_armed_only_when_pending() {
        let (mut ue, cid) = ue_with_pdn("internet", false);
        create_bearer(&mut ue, request(cid, 5, true)).unwrap();
        let timer = BearerTimer { id: EsmTimerId::T3485, retry_count: 0 };

        assert!(arm_bearer_timer(&mut ue, 5, timer.clone()).is_err());
        set_bearer_status(&mut ue, 5, EsmEbrStatus::ActivePending).unwrap();
        arm_bearer_timer(&mut ue, 5, timer).unwrap();
        assert!(ue.find_bearer(5).unwrap().timer().is_some());

        let old = set_bearer_status(&mut ue, 5, EsmEbrStatus::Active).unwrap();
        assert_eq!(old, EsmEbrStatus::ActivePending);
        assert!(ue.find_bearer(5).unwrap().timer().is_none());
        assert!(set_bearer_status(&mut ue, 9, EsmEbrStatus::Active).is_err());
    }
}
