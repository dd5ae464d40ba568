//! MME API
//!
//! Operations the NAS layer invokes on a UE addressed by MME UE S1AP ID, and
//! the outbound session signaling seam towards the S11/S6a paths.

use crate::error::{MmeError, MmeResult};
use crate::types::EpsTai;
use crate::ue_context::{EpsUpdateType, MmeUe};
use crate::ue_store::UeContextStore;

// ============================================================================
// Session signaling
// ============================================================================

/// Outbound session and subscription signaling
///
/// Implementations only start the procedure; answers come back as events.
pub trait SessionSignaling {
    /// S11 Delete Session Request for every PDN of the UE
    fn send_delete_session_request(&mut self, ue: &MmeUe) -> MmeResult<()>;

    /// S11 Create Session Request for the UE's pending PDN connection
    fn send_create_session_request(&mut self, ue: &MmeUe) -> MmeResult<()>;

    /// S6a Update Location Request
    fn send_update_location_request(&mut self, ue: &MmeUe) -> MmeResult<()>;
}

/// Signaling sink that only logs, used when no peer path is attached
#[derive(Debug, Default)]
pub struct LogSignaling;

impl SessionSignaling for LogSignaling {
    fn send_delete_session_request(&mut self, ue: &MmeUe) -> MmeResult<()> {
        log::info!("{} Delete Session Request ({} PDN)", ue, ue.pdns().count());
        Ok(())
    }

    fn send_create_session_request(&mut self, ue: &MmeUe) -> MmeResult<()> {
        log::info!("{} Create Session Request", ue);
        Ok(())
    }

    fn send_update_location_request(&mut self, ue: &MmeUe) -> MmeResult<()> {
        log::info!("{} Update Location Request", ue);
        Ok(())
    }
}

// ============================================================================
// Session requests
// ============================================================================

/// Ask the SGW to release the UE's sessions
///
/// Skipped when the pending release only invalidates the NAS context.
/// Returns whether the request was sent.
pub fn delete_session_request(
    store: &UeContextStore,
    signaling: &mut dyn SessionSignaling,
    id: u32,
) -> MmeResult<bool> {
    let ue = store.find_by_id(id)?;
    if ue.ue_context_rel_cause.preserves_session() {
        log::debug!("[{}] Release cause keeps the sessions, no Delete Session Request", id);
        return Ok(false);
    }
    signaling.send_delete_session_request(ue)?;
    Ok(true)
}

pub fn send_s11_create_session_req(
    store: &UeContextStore,
    signaling: &mut dyn SessionSignaling,
    id: u32,
) -> MmeResult<()> {
    let ue = store.find_by_id(id)?;
    signaling.send_create_session_request(ue).map_err(|e| {
        log::error!("[{}] Create Session Request failed: {}", id, e);
        e
    })
}

pub fn send_update_location_request(
    store: &UeContextStore,
    signaling: &mut dyn SessionSignaling,
    id: u32,
) -> MmeResult<()> {
    let ue = store.find_by_id(id)?;
    signaling.send_update_location_request(ue).map_err(|e| {
        log::error!("[{}] Update Location Request failed: {}", id, e);
        e
    })
}

// ============================================================================
// UE state accessors
// ============================================================================

/// Add a TAI reported by the UE to its TAI list
pub fn add_tai(store: &mut UeContextStore, id: u32, tai: &EpsTai) -> MmeResult<()> {
    let ue = store.find_by_id_mut(id)?;
    ue.tai_list.add_tai(tai)
}

pub fn get_pending_bearer_deactivation(store: &UeContextStore, id: u32) -> MmeResult<bool> {
    Ok(store.find_by_id(id)?.pending_bearer_deactivation)
}

pub fn set_pending_bearer_deactivation(store: &mut UeContextStore, id: u32, pending: bool) -> MmeResult<()> {
    store.find_by_id_mut(id)?.pending_bearer_deactivation = pending;
    Ok(())
}

/// True once subscription data has been received for the UE
pub fn is_subscription_known(store: &UeContextStore, id: u32) -> MmeResult<bool> {
    Ok(store.find_by_id(id)?.subscription_known)
}

/// EPS update type of the TAU currently processed for the UE
pub fn get_eps_update_type(store: &UeContextStore, id: u32) -> MmeResult<EpsUpdateType> {
    store
        .find_by_id(id)?
        .pending_tau_eps_update_type
        .ok_or_else(|| MmeError::InvalidArgument(format!("no TAU pending for UE {}", id)))
}

/// Drop the stored UE radio capability; returns whether one was held
pub fn free_ue_radio_capabilities(store: &mut UeContextStore, id: u32) -> MmeResult<bool> {
    let ue = store.find_by_id_mut(id)?;
    let freed = ue.ue_radio_capability.take().is_some();
    if freed {
        log::debug!("[{}] UE radio capability released", id);
    }
    Ok(freed)
}
