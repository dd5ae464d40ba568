//! Identity and TAI Allocator
//!
//! GUTI reallocation for a UE and the tracking area checks run on incoming
//! TAIs.

use crate::error::MmeResult;
use crate::snapshot::CapabilitySnapshot;
use crate::tai_list::TaiList;
use crate::tmsi::MTmsiAllocator;
use crate::types::{EpsGuti, EpsTai};
use crate::ue_store::UeContextStore;

/// Result of a GUTI allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GutiAllocation {
    /// New GUTI
    pub guti: EpsGuti,
    /// TAI list valid for the new GUTI
    pub tai_list: TaiList,
}

/// Allocate a new GUTI and TAI list for the UE with this IMSI
///
/// The superseded M-TMSI goes back to the allocator once the new GUTI is
/// bound. When the allocator fails the UE keeps its current GUTI.
pub fn allocate_guti(
    store: &mut UeContextStore,
    tmsi: &mut MTmsiAllocator,
    snapshot: &CapabilitySnapshot,
    imsi: &str,
    old_guti: Option<&EpsGuti>,
    originating_tai: Option<&EpsTai>,
) -> MmeResult<GutiAllocation> {
    let id = store.id_by_imsi(imsi).map_err(|e| {
        log::error!("No UE context for IMSI {}", imsi);
        e
    })?;

    let m_tmsi = tmsi.allocate()?;
    let guti = EpsGuti::new(&snapshot.gummei, m_tmsi);

    let superseded = match store.notify_new_guti(id, &guti) {
        Ok(superseded) => superseded,
        Err(e) => {
            tmsi.release(m_tmsi);
            return Err(e);
        }
    };
    if let Some(previous) = superseded {
        tmsi.release(previous.m_tmsi);
    }

    let tai_list = TaiList::from_served(&snapshot.served_tai, &guti.plmn_id);
    store.find_by_id_mut(id)?.tai_list = tai_list.clone();

    log::info!(
        "[{}] IMSI {} GUTI {} (was {}), TAI list {:?} ({:?}), originating TAI {}",
        id,
        imsi,
        guti,
        old_guti.map(|g| g.to_string()).unwrap_or_else(|| "none".to_string()),
        tai_list.tacs(),
        tai_list.list_type(),
        originating_tai.map(|t| t.to_string()).unwrap_or_else(|| "none".to_string())
    );

    Ok(GutiAllocation { guti, tai_list })
}

/// True if the TAI belongs to a configured neighbor MME
pub fn check_tai_ngh_existing(snapshot: &CapabilitySnapshot, tai: Option<&EpsTai>) -> bool {
    let Some(tai) = tai else {
        log::warn!("TAI not provided");
        return false;
    };
    if snapshot.neighbor_tai.is_empty() {
        log::debug!("No neighbor MME configured");
        return false;
    }

    let found = snapshot.neighbor_tai.iter().any(|ngh| ngh == tai);
    if found {
        log::debug!("TAI {} belongs to a neighbor MME", tai);
    } else {
        log::debug!("TAI {} is not a neighbor MME TAI", tai);
    }
    found
}

/// True if the TAI is served by this MME
pub fn check_tai_local_mme(snapshot: &CapabilitySnapshot, tai: Option<&EpsTai>) -> bool {
    let Some(tai) = tai else {
        log::warn!("TAI not provided");
        return false;
    };

    let plmn = &snapshot.gummei.plmn_id;
    if tai.plmn_id != *plmn {
        log::debug!("TAI {} PLMN differs from MME PLMN {}", tai, plmn);
        return false;
    }

    let found = snapshot.served_tai.iter().any(|served| served == tai);
    if !found {
        log::debug!("TAI {} not served by this MME", tai);
    }
    found
}
