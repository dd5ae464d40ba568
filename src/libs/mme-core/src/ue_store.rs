//! UE Context Store
//!
//! In-memory multi-key map of MME UE contexts. A context is reachable by its
//! MME UE S1AP ID, its IMSI and its GUTI; every re-key updates all indexes
//! together so no stale key stays reachable.

use std::collections::HashMap;

use crate::error::{MmeError, MmeResult};
use crate::types::{EpsGuti, INVALID_MME_UE_S1AP_ID};
use crate::ue_context::MmeUe;

/// Multi-key UE context store
#[derive(Debug)]
pub struct UeContextStore {
    /// UE contexts by MME UE S1AP ID
    ue_list: HashMap<u32, MmeUe>,
    /// IMSI -> MME UE S1AP ID
    imsi_ue_hash: HashMap<String, u32>,
    /// GUTI -> MME UE S1AP ID
    guti_ue_hash: HashMap<EpsGuti, u32>,
    next_mme_ue_s1ap_id: u32,
}

impl Default for UeContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UeContextStore {
    pub fn new() -> Self {
        Self {
            ue_list: HashMap::new(),
            imsi_ue_hash: HashMap::new(),
            guti_ue_hash: HashMap::new(),
            next_mme_ue_s1ap_id: 1,
        }
    }

    /// Number of UE contexts
    pub fn len(&self) -> usize {
        self.ue_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ue_list.is_empty()
    }

    /// Create a context under a fresh MME UE S1AP ID
    pub fn add(&mut self) -> u32 {
        let mut id = self.next_mme_ue_s1ap_id;
        while id == INVALID_MME_UE_S1AP_ID || id == 0 || self.ue_list.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        self.next_mme_ue_s1ap_id = id.wrapping_add(1);

        self.ue_list.insert(id, MmeUe::new(id));
        log::debug!("[{}] UE context added ({} total)", id, self.ue_list.len());
        id
    }

    /// Remove a context and every index entry pointing at it
    pub fn remove(&mut self, id: u32) -> Option<MmeUe> {
        let ue = self.ue_list.remove(&id)?;
        if let Some(imsi) = ue.imsi() {
            self.imsi_ue_hash.remove(imsi);
        }
        if let Some(guti) = ue.guti() {
            self.guti_ue_hash.remove(guti);
        }
        log::debug!("[{}] UE context removed ({} total)", id, self.ue_list.len());
        Some(ue)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn find_by_id(&self, id: u32) -> MmeResult<&MmeUe> {
        self.ue_list
            .get(&id)
            .ok_or_else(|| MmeError::UeNotFound(format!("mme_ue_s1ap_id {}", id)))
    }

    pub fn find_by_id_mut(&mut self, id: u32) -> MmeResult<&mut MmeUe> {
        self.ue_list
            .get_mut(&id)
            .ok_or_else(|| MmeError::UeNotFound(format!("mme_ue_s1ap_id {}", id)))
    }

    pub fn find_by_imsi(&self, imsi: &str) -> MmeResult<&MmeUe> {
        let id = self.id_by_imsi(imsi)?;
        self.find_by_id(id)
    }

    pub fn find_by_guti(&self, guti: &EpsGuti) -> MmeResult<&MmeUe> {
        let id = self.id_by_guti(guti)?;
        self.find_by_id(id)
    }

    /// MME UE S1AP ID of the context with this IMSI
    pub fn id_by_imsi(&self, imsi: &str) -> MmeResult<u32> {
        self.imsi_ue_hash
            .get(imsi)
            .copied()
            .ok_or_else(|| MmeError::UeNotFound(format!("IMSI {}", imsi)))
    }

    /// MME UE S1AP ID of the context with this GUTI
    pub fn id_by_guti(&self, guti: &EpsGuti) -> MmeResult<u32> {
        self.guti_ue_hash
            .get(guti)
            .copied()
            .ok_or_else(|| MmeError::UeNotFound(format!("GUTI {}", guti)))
    }

    // ========================================================================
    // Re-key
    // ========================================================================

    /// Move a context to new keys
    ///
    /// All conflicts are checked before any index is touched, so on error
    /// the store is unchanged.
    pub fn update_coll_keys(
        &mut self,
        id: u32,
        new_id: u32,
        imsi: Option<&str>,
        guti: Option<&EpsGuti>,
    ) -> MmeResult<()> {
        if !self.ue_list.contains_key(&id) {
            return Err(MmeError::UeNotFound(format!("mme_ue_s1ap_id {}", id)));
        }
        if new_id == INVALID_MME_UE_S1AP_ID {
            return Err(MmeError::InvalidArgument("invalid MME UE S1AP ID".to_string()));
        }
        if new_id != id && self.ue_list.contains_key(&new_id) {
            return Err(MmeError::InvalidArgument(format!(
                "MME UE S1AP ID {} already in use",
                new_id
            )));
        }
        if let Some(imsi) = imsi {
            if matches!(self.imsi_ue_hash.get(imsi), Some(&owner) if owner != id) {
                return Err(MmeError::InvalidArgument(format!("IMSI {} already in use", imsi)));
            }
        }
        if let Some(guti) = guti {
            if matches!(self.guti_ue_hash.get(guti), Some(&owner) if owner != id) {
                return Err(MmeError::InvalidArgument(format!("GUTI {} already in use", guti)));
            }
        }

        let Some(mut ue) = self.ue_list.remove(&id) else {
            return Err(MmeError::UeNotFound(format!("mme_ue_s1ap_id {}", id)));
        };
        if let Some(old) = ue.imsi() {
            self.imsi_ue_hash.remove(old);
        }
        if let Some(old) = ue.guti() {
            self.guti_ue_hash.remove(old);
        }

        ue.set_mme_ue_s1ap_id(new_id);
        ue.set_imsi(imsi.map(str::to_string));
        ue.set_guti(guti.copied());

        if let Some(imsi) = imsi {
            self.imsi_ue_hash.insert(imsi.to_string(), new_id);
        }
        if let Some(guti) = guti {
            self.guti_ue_hash.insert(*guti, new_id);
        }
        self.ue_list.insert(new_id, ue);

        log::debug!(
            "UE context re-keyed: {} -> {} (IMSI {:?}, GUTI {})",
            id,
            new_id,
            imsi,
            guti.map(|g| g.to_string()).unwrap_or_else(|| "none".to_string())
        );
        Ok(())
    }

    /// Bind the IMSI resolved during attach to a context
    pub fn notify_imsi(&mut self, id: u32, imsi: &str) -> MmeResult<()> {
        let guti = self.find_by_id(id)?.guti().copied();
        self.update_coll_keys(id, id, Some(imsi), guti.as_ref())?;
        log::info!("[{}] IMSI {} bound", id, imsi);
        Ok(())
    }

    /// Bind a new GUTI to a context; returns the GUTI it supersedes
    pub fn notify_new_guti(&mut self, id: u32, guti: &EpsGuti) -> MmeResult<Option<EpsGuti>> {
        let ue = self.find_by_id(id)?;
        let old = ue.guti().copied();
        let imsi = ue.imsi().map(str::to_string);
        self.update_coll_keys(id, id, imsi.as_deref(), Some(guti))?;
        log::info!("[{}] New GUTI {}", id, guti);
        Ok(old)
    }

    /// Move a context to a new MME UE S1AP ID
    pub fn renumber(&mut self, id: u32, new_id: u32) -> MmeResult<()> {
        let ue = self.find_by_id(id)?;
        let imsi = ue.imsi().map(str::to_string);
        let guti = ue.guti().copied();
        self.update_coll_keys(id, new_id, imsi.as_deref(), guti.as_ref())
    }
}
