//! MME Configuration
//!
//! Parses the `mme:` section of the YAML configuration into an [`MmeConfig`].
//! The capability snapshot is built from a validated configuration; a
//! configuration missing served TAIs or a GUMMEI is rejected at startup.

use crate::types::{
    EpsTai, Gummei, PlmnId, INVALID_TAC, MAX_NGH_MMES, MAX_NUM_OF_ALGORITHM,
    MAX_NUM_OF_SERVED_TAI,
};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nextgcore/mme.yaml";

/// M-TMSI generation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Random M-TMSI values
    #[default]
    Normal,
    /// Deterministic M-TMSI counter starting at 1
    Test,
}

/// PDN address families the MME is willing to negotiate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpCapability {
    Ipv4,
    Ipv6,
    #[default]
    Ipv4v6,
}

/// EPS network feature toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConf {
    /// Accept attach with an unauthenticated IMSI
    pub unauthenticated_imsi: bool,
    /// Emergency bearer services in S1 mode
    pub emergency_bearer_services: bool,
    /// IMS voice over PS session in S1 mode
    pub ims_voice_over_ps: bool,
    /// Location services via EPC
    pub location_services_via_epc: bool,
    /// Extended service request
    pub extended_service_request: bool,
}

/// MME configuration
#[derive(Debug, Clone, Default)]
pub struct MmeConfig {
    /// M-TMSI generation mode
    pub run_mode: RunMode,
    /// Served GUMMEI list (the first entry is used for GUTI allocation)
    pub gummei: Vec<Gummei>,
    /// Served TAIs in configured order
    pub served_tai: Vec<EpsTai>,
    /// TAIs served by neighbor MMEs
    pub neighbor_tai: Vec<EpsTai>,
    /// Integrity algorithm preference (EIA ids)
    pub integrity_order: Vec<u8>,
    /// Ciphering algorithm preference (EEA ids)
    pub ciphering_order: Vec<u8>,
    /// Feature toggles
    pub features: FeatureConf,
    /// PDN IP capability
    pub ip_capability: IpCapability,
}

impl MmeConfig {
    /// Load and validate configuration from a YAML file
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        log::info!("Loading configuration from: {}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let yaml: Value = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse YAML config: {}", e)))?;

        let section = yaml
            .get("mme")
            .ok_or_else(|| ConfigError::ParseError("No 'mme' section in config file".to_string()))?;

        let mut config = MmeConfig::default();

        if let Some(mode) = section.get("run_mode") {
            config.run_mode = serde_yaml::from_value(mode.clone())
                .map_err(|e| ConfigError::ParseError(format!("run_mode: {}", e)))?;
        }

        if let Some(list) = section.get("gummei").and_then(|v| v.as_sequence()) {
            for entry in list {
                config.gummei.push(parse_gummei(entry)?);
            }
        }

        if let Some(list) = section.get("tai").and_then(|v| v.as_sequence()) {
            for entry in list {
                let plmn_id = parse_plmn_id(entry.get("plmn_id"))?;
                for tac in parse_tac_list(entry.get("tac"))? {
                    config.served_tai.push(EpsTai::new(plmn_id, tac));
                }
            }
        }

        if let Some(list) = section.get("neighbor").and_then(|v| v.as_sequence()) {
            for entry in list {
                let tai = entry.get("tai").unwrap_or(entry);
                let plmn_id = parse_plmn_id(tai.get("plmn_id"))?;
                let tac = tai
                    .get("tac")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| ConfigError::ParseError("neighbor TAI without TAC".to_string()))?;
                config.neighbor_tai.push(EpsTai::new(plmn_id, to_tac(tac)?));
            }
        }

        config.integrity_order = vec![2, 1];
        config.ciphering_order = vec![0, 1, 2];
        if let Some(security) = section.get("security") {
            if let Some(order) = security.get("integrity_order").and_then(|v| v.as_sequence()) {
                config.integrity_order = parse_algorithm_order(order, "EIA")?;
            }
            if let Some(order) = security.get("ciphering_order").and_then(|v| v.as_sequence()) {
                config.ciphering_order = parse_algorithm_order(order, "EEA")?;
            }
        }

        if let Some(features) = section.get("features") {
            config.features = serde_yaml::from_value(features.clone())
                .map_err(|e| ConfigError::ParseError(format!("features: {}", e)))?;
        }

        if let Some(cap) = section.get("ip_capability") {
            config.ip_capability = serde_yaml::from_value(cap.clone())
                .map_err(|e| ConfigError::ParseError(format!("ip_capability: {}", e)))?;
        }

        config.validate()?;

        log::info!(
            "MME configuration loaded: {} GUMMEI, {} TAI, {} neighbor TAI",
            config.gummei.len(),
            config.served_tai.len(),
            config.neighbor_tai.len()
        );
        Ok(config)
    }

    /// Check the mandatory parts of the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.served_tai.is_empty() {
            return Err(ConfigError::ValidationError("No TAI configured".to_string()));
        }
        if self.served_tai.len() > MAX_NUM_OF_SERVED_TAI {
            return Err(ConfigError::ValidationError(format!(
                "Too many served TAIs: {} (max {})",
                self.served_tai.len(),
                MAX_NUM_OF_SERVED_TAI
            )));
        }
        if self.gummei.is_empty() {
            return Err(ConfigError::ValidationError("No GUMMEI configured".to_string()));
        }
        if self.neighbor_tai.len() > MAX_NGH_MMES {
            return Err(ConfigError::ValidationError(format!(
                "Too many neighbor MMEs: {} (max {})",
                self.neighbor_tai.len(),
                MAX_NGH_MMES
            )));
        }
        if let Some(tai) = self.served_tai.iter().find(|t| t.tac == INVALID_TAC) {
            return Err(ConfigError::ValidationError(format!("Reserved TAC in served TAI {}", tai)));
        }
        for (i, tai) in self.served_tai.iter().enumerate() {
            if self.served_tai[..i].contains(tai) {
                return Err(ConfigError::ValidationError(format!("Duplicate served TAI {}", tai)));
            }
        }
        if self.integrity_order.len() > MAX_NUM_OF_ALGORITHM
            || self.ciphering_order.len() > MAX_NUM_OF_ALGORITHM
        {
            return Err(ConfigError::ValidationError(
                "Security algorithm list too long".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read a digit field that YAML may present either as a number or a string
fn digits(value: &Value, width: usize) -> Option<String> {
    if let Some(s) = value.as_str() {
        return Some(s.to_string());
    }
    value.as_u64().map(|n| format!("{:0width$}", n, width = width))
}

/// Parse PLMN ID from YAML
fn parse_plmn_id(value: Option<&Value>) -> Result<PlmnId, ConfigError> {
    let plmn = value.ok_or_else(|| ConfigError::ParseError("Missing plmn_id".to_string()))?;
    let mcc = plmn
        .get("mcc")
        .and_then(|v| digits(v, 3))
        .ok_or_else(|| ConfigError::ParseError("Missing MCC".to_string()))?;
    let mnc = plmn
        .get("mnc")
        .and_then(|v| digits(v, 2))
        .ok_or_else(|| ConfigError::ParseError("Missing MNC".to_string()))?;

    if mcc.len() != 3 || !mcc.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::ValidationError(format!("BAD MCC: {}", mcc)));
    }
    if !(2..=3).contains(&mnc.len()) || !mnc.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::ValidationError(format!("BAD MNC length for GUMMEI: {}", mnc)));
    }
    Ok(PlmnId::new(&mcc, &mnc))
}

/// Parse GUMMEI from YAML entry
fn parse_gummei(entry: &Value) -> Result<Gummei, ConfigError> {
    let plmn_id = parse_plmn_id(entry.get("plmn_id"))?;
    let mme_gid = entry
        .get("mme_gid")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ConfigError::ParseError("GUMMEI without mme_gid".to_string()))?;
    let mme_code = entry
        .get("mme_code")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ConfigError::ParseError("GUMMEI without mme_code".to_string()))?;

    Ok(Gummei {
        plmn_id,
        mme_gid: u16::try_from(mme_gid)
            .map_err(|_| ConfigError::ValidationError(format!("mme_gid out of range: {}", mme_gid)))?,
        mme_code: u8::try_from(mme_code)
            .map_err(|_| ConfigError::ValidationError(format!("mme_code out of range: {}", mme_code)))?,
    })
}

fn to_tac(value: u64) -> Result<u16, ConfigError> {
    u16::try_from(value).map_err(|_| ConfigError::ValidationError(format!("TAC out of range: {}", value)))
}

/// TAC may be a single value or a list
fn parse_tac_list(value: Option<&Value>) -> Result<Vec<u16>, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::ParseError("TAI without TAC".to_string()))?;
    if let Some(tac) = value.as_u64() {
        return Ok(vec![to_tac(tac)?]);
    }
    let list = value
        .as_sequence()
        .ok_or_else(|| ConfigError::ParseError("TAC must be a number or a list".to_string()))?;
    list.iter()
        .map(|v| {
            v.as_u64()
                .ok_or_else(|| ConfigError::ParseError("TAC must be a number".to_string()))
                .and_then(to_tac)
        })
        .collect()
}

/// Parse "EIA2"/"EEA0" style algorithm names
fn parse_algorithm_order(list: &[Value], prefix: &str) -> Result<Vec<u8>, ConfigError> {
    list.iter()
        .map(|v| {
            let name = v
                .as_str()
                .ok_or_else(|| ConfigError::ParseError(format!("{} algorithm must be a string", prefix)))?;
            name.strip_prefix(prefix)
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| *n <= 3)
                .ok_or_else(|| ConfigError::ValidationError(format!("Unknown algorithm: {}", name)))
        })
        .collect()
}
