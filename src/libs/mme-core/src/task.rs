//! MME task
//!
//! Sequential worker owning the UE context store and the M-TMSI allocator.
//! Other tasks talk to it through an mpsc channel of [`MmeEvent`]s; each
//! event carries a oneshot sender for its result. Events are processed one
//! at a time to completion.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::api::{self, SessionSignaling};
use crate::bearer::EsmEbrStatus;
use crate::bearer_manager::{self, BearerRequest, ReleaseTarget};
use crate::config::{ConfigError, MmeConfig};
use crate::error::MmeResult;
use crate::identity::{self, GutiAllocation};
use crate::snapshot::SnapshotHandle;
use crate::tmsi::{MTmsiAllocator, TmsiMode};
use crate::types::{EpsGuti, EpsTai};
use crate::ue_store::UeContextStore;

/// Reply channel of an event
pub type Reply<T> = oneshot::Sender<MmeResult<T>>;

/// Result of the tracking area checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaiCheck {
    /// Served by this MME
    pub is_local: bool,
    /// Served by a configured neighbor MME
    pub is_neighbor: bool,
}

/// Event handled by the MME task
#[derive(Debug)]
pub enum MmeEvent {
    /// New S1 signalling connection; replies with the MME UE S1AP ID
    UeAttach { reply: Reply<u32> },
    /// UE gone; its sessions are released and its M-TMSI freed
    UeDetach { id: u32, reply: Reply<()> },
    /// MME UE S1AP ID reassigned
    Renumber { id: u32, new_id: u32, reply: Reply<()> },
    /// IMSI learned from the UE or the old MME
    ImsiResolved { id: u32, imsi: String, reply: Reply<()> },
    /// GUTI reallocation
    AllocateGuti {
        imsi: String,
        old_guti: Option<EpsGuti>,
        originating_tai: Option<EpsTai>,
        reply: Reply<GutiAllocation>,
    },
    /// TAI reported by the UE
    AddTai { id: u32, tai: EpsTai, reply: Reply<()> },
    /// Local / neighbor check of a TAI
    CheckTai { tai: EpsTai, reply: oneshot::Sender<TaiCheck> },
    CreatePdn {
        id: u32,
        apn: String,
        is_emergency: bool,
        reply: Reply<u8>,
    },
    ReleasePdn { id: u32, cid: u8, reply: Reply<()> },
    CreateBearer {
        id: u32,
        request: BearerRequest,
        reply: Reply<u8>,
    },
    ReleaseBearer {
        id: u32,
        target: ReleaseTarget,
        reply: Reply<u8>,
    },
    SetBearerStatus {
        id: u32,
        ebi: u8,
        status: EsmEbrStatus,
        reply: Reply<EsmEbrStatus>,
    },
    CreateSession { id: u32, reply: Reply<()> },
    DeleteSession { id: u32, reply: Reply<bool> },
    UpdateLocation { id: u32, reply: Reply<()> },
    /// New configuration
    Reload {
        config: Box<MmeConfig>,
        reply: oneshot::Sender<Result<u64, ConfigError>>,
    },
}

impl MmeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MmeEvent::UeAttach { .. } => "UE_ATTACH",
            MmeEvent::UeDetach { .. } => "UE_DETACH",
            MmeEvent::Renumber { .. } => "RENUMBER",
            MmeEvent::ImsiResolved { .. } => "IMSI_RESOLVED",
            MmeEvent::AllocateGuti { .. } => "ALLOCATE_GUTI",
            MmeEvent::AddTai { .. } => "ADD_TAI",
            MmeEvent::CheckTai { .. } => "CHECK_TAI",
            MmeEvent::CreatePdn { .. } => "CREATE_PDN",
            MmeEvent::ReleasePdn { .. } => "RELEASE_PDN",
            MmeEvent::CreateBearer { .. } => "CREATE_BEARER",
            MmeEvent::ReleaseBearer { .. } => "RELEASE_BEARER",
            MmeEvent::SetBearerStatus { .. } => "SET_BEARER_STATUS",
            MmeEvent::CreateSession { .. } => "CREATE_SESSION",
            MmeEvent::DeleteSession { .. } => "DELETE_SESSION",
            MmeEvent::UpdateLocation { .. } => "UPDATE_LOCATION",
            MmeEvent::Reload { .. } => "RELOAD",
        }
    }
}

fn respond<T>(event: &'static str, reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        log::debug!("{}: requester went away", event);
    }
}

/// MME task state
pub struct MmeTask {
    store: UeContextStore,
    tmsi: MTmsiAllocator,
    snapshot: Arc<SnapshotHandle>,
    signaling: Box<dyn SessionSignaling + Send>,
}

impl MmeTask {
    /// Create the task; the M-TMSI mode follows the configured run mode
    pub fn new(snapshot: Arc<SnapshotHandle>, signaling: Box<dyn SessionSignaling + Send>) -> Self {
        let mode = TmsiMode::from(snapshot.current().run_mode);
        log::info!("M-TMSI allocation mode: {:?}", mode);
        Self {
            store: UeContextStore::new(),
            tmsi: MTmsiAllocator::new(mode),
            snapshot,
            signaling,
        }
    }

    pub fn store(&self) -> &UeContextStore {
        &self.store
    }

    pub fn tmsi(&self) -> &MTmsiAllocator {
        &self.tmsi
    }

    pub fn snapshot(&self) -> &Arc<SnapshotHandle> {
        &self.snapshot
    }

    /// Swap in a capability snapshot built from `config`
    ///
    /// The M-TMSI mode stays as chosen at startup.
    pub fn reload(&self, config: &MmeConfig) -> Result<u64, ConfigError> {
        let mode = TmsiMode::from(config.run_mode);
        if mode != self.tmsi.mode() {
            log::warn!("run_mode change takes effect on restart");
        }
        self.snapshot.reload(config)
    }

    /// Drain the event channel until every sender is dropped
    pub async fn run(mut self, mut rx: mpsc::Receiver<MmeEvent>) -> Self {
        log::info!("MME task running");
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        log::info!("MME task stopped ({} UE contexts left)", self.store.len());
        self
    }

    /// Process one event to completion
    pub fn handle(&mut self, event: MmeEvent) {
        let name = event.name();
        log::debug!("Handling event: {}", name);

        match event {
            MmeEvent::UeAttach { reply } => {
                let id = self.store.add();
                respond(name, reply, Ok(id));
            }
            MmeEvent::UeDetach { id, reply } => {
                respond(name, reply, self.detach(id));
            }
            MmeEvent::Renumber { id, new_id, reply } => {
                respond(name, reply, self.store.renumber(id, new_id));
            }
            MmeEvent::ImsiResolved { id, imsi, reply } => {
                respond(name, reply, self.store.notify_imsi(id, &imsi));
            }
            MmeEvent::AllocateGuti {
                imsi,
                old_guti,
                originating_tai,
                reply,
            } => {
                let snapshot = self.snapshot.current();
                let result = identity::allocate_guti(
                    &mut self.store,
                    &mut self.tmsi,
                    &snapshot,
                    &imsi,
                    old_guti.as_ref(),
                    originating_tai.as_ref(),
                );
                respond(name, reply, result);
            }
            MmeEvent::AddTai { id, tai, reply } => {
                respond(name, reply, api::add_tai(&mut self.store, id, &tai));
            }
            MmeEvent::CheckTai { tai, reply } => {
                let snapshot = self.snapshot.current();
                let check = TaiCheck {
                    is_local: identity::check_tai_local_mme(&snapshot, Some(&tai)),
                    is_neighbor: identity::check_tai_ngh_existing(&snapshot, Some(&tai)),
                };
                respond(name, reply, check);
            }
            MmeEvent::CreatePdn {
                id,
                apn,
                is_emergency,
                reply,
            } => {
                let result = self
                    .store
                    .find_by_id_mut(id)
                    .and_then(|ue| ue.create_pdn_connection(&apn, is_emergency));
                respond(name, reply, result);
            }
            MmeEvent::ReleasePdn { id, cid, reply } => {
                let result = self
                    .store
                    .find_by_id_mut(id)
                    .and_then(|ue| ue.release_pdn_connection(cid));
                respond(name, reply, result);
            }
            MmeEvent::CreateBearer { id, request, reply } => {
                let result = self
                    .store
                    .find_by_id_mut(id)
                    .and_then(|ue| bearer_manager::create_bearer(ue, request));
                respond(name, reply, result);
            }
            MmeEvent::ReleaseBearer { id, target, reply } => {
                let result = self
                    .store
                    .find_by_id_mut(id)
                    .and_then(|ue| bearer_manager::release_bearer(ue, target));
                respond(name, reply, result);
            }
            MmeEvent::SetBearerStatus {
                id,
                ebi,
                status,
                reply,
            } => {
                let result = self
                    .store
                    .find_by_id_mut(id)
                    .and_then(|ue| bearer_manager::set_bearer_status(ue, ebi, status));
                respond(name, reply, result);
            }
            MmeEvent::CreateSession { id, reply } => {
                let result = api::send_s11_create_session_req(&self.store, self.signaling.as_mut(), id);
                respond(name, reply, result);
            }
            MmeEvent::DeleteSession { id, reply } => {
                let result = api::delete_session_request(&self.store, self.signaling.as_mut(), id);
                respond(name, reply, result);
            }
            MmeEvent::UpdateLocation { id, reply } => {
                let result = api::send_update_location_request(&self.store, self.signaling.as_mut(), id);
                respond(name, reply, result);
            }
            MmeEvent::Reload { config, reply } => {
                respond(name, reply, self.reload(&config));
            }
        }
    }

    fn detach(&mut self, id: u32) -> MmeResult<()> {
        if self.store.find_by_id(id)?.pdns().next().is_some() {
            if let Err(e) = api::delete_session_request(&self.store, self.signaling.as_mut(), id) {
                log::warn!("[{}] Delete Session Request failed: {}", id, e);
            }
        }

        if let Some(ue) = self.store.remove(id) {
            if let Some(guti) = ue.guti() {
                self.tmsi.release(guti.m_tmsi);
            }
            log::info!("{} detached", ue);
        }
        Ok(())
    }
}
