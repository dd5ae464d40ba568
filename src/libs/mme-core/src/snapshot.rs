//! Capability Snapshot
//!
//! Read-only view of the node configuration consulted by the mobility and
//! session procedures. Every worker reads the current snapshot through a
//! [`SnapshotHandle`]; a reload builds a new version and swaps it in under the
//! write lock, so readers never observe a half-built snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::config::{ConfigError, IpCapability, MmeConfig, RunMode};
use crate::types::{EpsTai, Gummei};

// ============================================================================
// EPS network feature support (TS 24.301 9.9.3.12A)
// ============================================================================

/// IMS voice over PS session in S1 mode supported
pub const EPS_NETWORK_FEATURE_SUPPORT_IMS_VOICE_OVER_PS_SESSION_IN_S1_SUPPORTED: u8 = 0x01;
/// Emergency bearer services in S1 mode supported
pub const EPS_NETWORK_FEATURE_SUPPORT_EMERGENCY_BEARER_SERVICES_IN_S1_MODE_SUPPORTED: u8 = 0x02;
/// Location services via EPC supported
pub const EPS_NETWORK_FEATURE_SUPPORT_LOCATION_SERVICES_VIA_EPC_SUPPORTED: u8 = 0x04;
/// Location services via CS domain not supported
pub const EPS_NETWORK_FEATURE_SUPPORT_CS_LCS_LOCATION_SERVICES_VIA_CS_DOMAIN_NOT_SUPPORTED: u8 = 0x10;
/// Extended service request supported
pub const EPS_NETWORK_FEATURE_SUPPORT_EXTENDED_SERVICE_REQUEST_SUPPORTED: u8 = 0x20;

/// EMM feature: attach with unauthenticated IMSI accepted
pub const MME_FEATURE_UNAUTHENTICATED_IMSI: u32 = 0x01;

/// ESM feature: IPv4 PDN addresses
pub const MME_ESM_FEATURE_IPV4: u8 = 0x01;
/// ESM feature: IPv6 PDN addresses
pub const MME_ESM_FEATURE_IPV6: u8 = 0x02;

/// Immutable capability snapshot
#[derive(Debug, Clone)]
pub struct CapabilitySnapshot {
    /// Monotonic version, bumped on every reload
    pub version: u64,
    /// M-TMSI generation mode
    pub run_mode: RunMode,
    /// Node GUMMEI used for GUTI allocation
    pub gummei: Gummei,
    /// Served TAIs, sorted by TAC
    pub served_tai: Vec<EpsTai>,
    /// Neighbor MME TAIs
    pub neighbor_tai: Vec<EpsTai>,
    /// Integrity algorithm preference
    pub integrity_order: Vec<u8>,
    /// Ciphering algorithm preference
    pub ciphering_order: Vec<u8>,
    /// EPS network feature support octet
    pub eps_network_feature_support: u8,
    /// EMM feature bitmap
    pub features: u32,
    /// ESM feature bitmap
    pub esm_features: u8,
}

impl CapabilitySnapshot {
    /// Build a snapshot from a validated configuration
    pub fn build(config: &MmeConfig, version: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let gummei = config
            .gummei
            .first()
            .copied()
            .ok_or_else(|| ConfigError::ValidationError("No GUMMEI configured".to_string()))?;

        if config.gummei.len() > 1 {
            log::warn!("{} GUMMEI configured, using the first one for GUTI allocation", config.gummei.len());
        }

        // Stable sort keeps the configured order among equal TACs
        let mut served_tai = config.served_tai.clone();
        served_tai.sort_by_key(|tai| tai.tac);

        let mut eps_network_feature_support =
            EPS_NETWORK_FEATURE_SUPPORT_CS_LCS_LOCATION_SERVICES_VIA_CS_DOMAIN_NOT_SUPPORTED;
        if config.features.emergency_bearer_services {
            eps_network_feature_support |=
                EPS_NETWORK_FEATURE_SUPPORT_EMERGENCY_BEARER_SERVICES_IN_S1_MODE_SUPPORTED;
        }
        if config.features.ims_voice_over_ps {
            eps_network_feature_support |=
                EPS_NETWORK_FEATURE_SUPPORT_IMS_VOICE_OVER_PS_SESSION_IN_S1_SUPPORTED;
        }
        if config.features.location_services_via_epc {
            eps_network_feature_support |= EPS_NETWORK_FEATURE_SUPPORT_LOCATION_SERVICES_VIA_EPC_SUPPORTED;
        }
        if config.features.extended_service_request {
            eps_network_feature_support |= EPS_NETWORK_FEATURE_SUPPORT_EXTENDED_SERVICE_REQUEST_SUPPORTED;
        }

        let mut features = 0;
        if config.features.unauthenticated_imsi {
            features |= MME_FEATURE_UNAUTHENTICATED_IMSI;
        }

        let esm_features = match config.ip_capability {
            IpCapability::Ipv4 => MME_ESM_FEATURE_IPV4,
            IpCapability::Ipv6 => MME_ESM_FEATURE_IPV6,
            IpCapability::Ipv4v6 => MME_ESM_FEATURE_IPV4 | MME_ESM_FEATURE_IPV6,
        };

        Ok(Self {
            version,
            run_mode: config.run_mode,
            gummei,
            served_tai,
            neighbor_tai: config.neighbor_tai.clone(),
            integrity_order: config.integrity_order.clone(),
            ciphering_order: config.ciphering_order.clone(),
            eps_network_feature_support,
            features,
            esm_features,
        })
    }

    pub fn emergency_bearer_services_supported(&self) -> bool {
        self.eps_network_feature_support
            & EPS_NETWORK_FEATURE_SUPPORT_EMERGENCY_BEARER_SERVICES_IN_S1_MODE_SUPPORTED
            != 0
    }

    pub fn ims_voice_over_ps_supported(&self) -> bool {
        self.eps_network_feature_support
            & EPS_NETWORK_FEATURE_SUPPORT_IMS_VOICE_OVER_PS_SESSION_IN_S1_SUPPORTED
            != 0
    }

    pub fn location_services_via_epc_supported(&self) -> bool {
        self.eps_network_feature_support & EPS_NETWORK_FEATURE_SUPPORT_LOCATION_SERVICES_VIA_EPC_SUPPORTED != 0
    }

    pub fn extended_service_request_supported(&self) -> bool {
        self.eps_network_feature_support & EPS_NETWORK_FEATURE_SUPPORT_EXTENDED_SERVICE_REQUEST_SUPPORTED != 0
    }

    pub fn unauthenticated_imsi_supported(&self) -> bool {
        self.features & MME_FEATURE_UNAUTHENTICATED_IMSI != 0
    }
}

/// Shared, swappable reference to the current capability snapshot
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<CapabilitySnapshot>>,
    version: AtomicU64,
}

impl SnapshotHandle {
    /// Build the initial snapshot (version 1) from configuration
    pub fn new(config: &MmeConfig) -> Result<Self, ConfigError> {
        let snapshot = CapabilitySnapshot::build(config, 1)?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            version: AtomicU64::new(1),
        })
    }

    /// Current snapshot; the returned `Arc` stays valid across reloads
    pub fn current(&self) -> Arc<CapabilitySnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Version of the current snapshot
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Rebuild from configuration and swap in the result
    ///
    /// On error the previous snapshot stays in place.
    pub fn reload(&self, config: &MmeConfig) -> Result<u64, ConfigError> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let version = self.version.load(Ordering::SeqCst) + 1;
        let snapshot = CapabilitySnapshot::build(config, version)?;
        *guard = Arc::new(snapshot);
        self.version.store(version, Ordering::SeqCst);
        log::info!("Capability snapshot reloaded (version {})", version);
        Ok(version)
    }
}
