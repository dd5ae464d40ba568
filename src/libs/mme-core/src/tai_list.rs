//! UE Tracking Area Identity list
//!
//! A TAI list holds the tracking areas a GUTI is valid in. All entries share
//! one PLMN, no two entries share a TAC and the reserved TAC never appears.
//! The list type says whether the TACs form an unbroken ascending run, which
//! lets the NAS encoder use the compact "consecutive TACs" form.

use crate::error::{MmeError, MmeResult};
use crate::types::{EpsTai, PlmnId, INVALID_TAC, TAI_LIST_MAX_SIZE};

/// Type of TAI list (TS 24.301 9.9.3.33)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TaiListType {
    /// List of TACs belonging to one PLMN, non-consecutive
    OnePlmnNonConsecutiveTacs = 0,
    /// List of TACs belonging to one PLMN, consecutive
    #[default]
    OnePlmnConsecutiveTacs = 1,
}

/// UE TAI list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaiList {
    list_type: TaiListType,
    tai: Vec<EpsTai>,
}

/// True if each TAC is its predecessor plus one; the first TAC seeds the run
fn tacs_are_consecutive<I: IntoIterator<Item = u16>>(tacs: I) -> bool {
    let mut prev: Option<u16> = None;
    for tac in tacs {
        if let Some(p) = prev {
            if p.checked_add(1) != Some(tac) {
                return false;
            }
        }
        prev = Some(tac);
    }
    true
}

impl TaiList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the served TAIs of `plmn_id`, in served order, up to capacity
    pub fn from_served(served_tai: &[EpsTai], plmn_id: &PlmnId) -> Self {
        let tai: Vec<EpsTai> = served_tai
            .iter()
            .filter(|t| t.plmn_id == *plmn_id)
            .take(TAI_LIST_MAX_SIZE)
            .copied()
            .collect();

        let mut list = Self {
            list_type: TaiListType::default(),
            tai,
        };
        list.update_list_type();
        list
    }

    /// List type
    pub fn list_type(&self) -> TaiListType {
        self.list_type
    }

    /// Number of TAIs
    pub fn len(&self) -> usize {
        self.tai.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tai.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tai.len() >= TAI_LIST_MAX_SIZE
    }

    /// TAIs in list order
    pub fn tais(&self) -> &[EpsTai] {
        &self.tai
    }

    /// TACs in list order
    pub fn tacs(&self) -> Vec<u16> {
        self.tai.iter().map(|t| t.tac).collect()
    }

    pub fn contains_tac(&self, tac: u16) -> bool {
        self.tai.iter().any(|t| t.tac == tac)
    }

    /// Add a TAI reported by the UE
    ///
    /// Adding a TAC already present is a no-op. A full list, a TAI of another
    /// PLMN or the reserved TAC is rejected without touching the list.
    pub fn add_tai(&mut self, new_tai: &EpsTai) -> MmeResult<()> {
        if let Some(first) = self.tai.first() {
            if first.plmn_id != new_tai.plmn_id {
                log::warn!("TAI {} is not in the TAI list PLMN {}", new_tai, first.plmn_id);
                return Err(MmeError::InvalidArgument(format!(
                    "TAI {} outside TAI list PLMN {}",
                    new_tai, first.plmn_id
                )));
            }
        }
        if self.contains_tac(new_tai.tac) {
            log::debug!("TAI list already contains TAC {}", new_tai.tac);
            return Ok(());
        }
        if self.is_full() {
            log::warn!("TAI list already has {} elements", TAI_LIST_MAX_SIZE);
            return Err(MmeError::CapacityExceeded {
                what: "TAI list",
                max: TAI_LIST_MAX_SIZE,
            });
        }
        if new_tai.tac == INVALID_TAC {
            log::warn!("Rejecting invalid TAI {}", new_tai);
            return Err(MmeError::InvalidArgument(format!("reserved TAC {:#06x}", new_tai.tac)));
        }

        self.tai.push(*new_tai);
        self.update_list_type();
        log::info!(
            "Added TAI {} to TAI list, list contains {} elements",
            new_tai,
            self.tai.len()
        );
        Ok(())
    }

    fn update_list_type(&mut self) {
        self.list_type = if tacs_are_consecutive(self.tai.iter().map(|t| t.tac)) {
            TaiListType::OnePlmnConsecutiveTacs
        } else {
            TaiListType::OnePlmnNonConsecutiveTacs
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plmn_a() -> PlmnId {
        PlmnId::new("208", "93")
    }

    fn served(tacs: &[u16]) -> Vec<EpsTai> {
        tacs.iter().map(|&tac| EpsTai::new(plmn_a(), tac)).collect()
    }

    #[test]
    fn test_from_served_non_consecutive() {
        let list = TaiList::from_served(&served(&[10, 11, 20]), &plmn_a());
        assert_eq!(list.tacs(), vec![10, 11, 20]);
        assert_eq!(list.list_type(), TaiListType::OnePlmnNonConsecutiveTacs);
    }

    #[test]
    fn test_from_served_consecutive() {
        let list = TaiList::from_served(&served(&[5, 6, 7]), &plmn_a());
        assert_eq!(list.tacs(), vec![5, 6, 7]);
        assert_eq!(list.list_type(), TaiListType::OnePlmnConsecutiveTacs);
    }

    #[test]
    fn test_from_served_filters_plmn() {
        let mut tais = served(&[1, 2]);
        tais.insert(1, EpsTai::new(PlmnId::new("001", "01"), 9));
        let list = TaiList::from_served(&tais, &plmn_a());
        assert_eq!(list.tacs(), vec![1, 2]);
        assert_eq!(list.list_type(), TaiListType::OnePlmnConsecutiveTacs);
    }

    #[test]
    fn test_from_served_caps_at_max() {
        let tacs: Vec<u16> = (1..=20).collect();
        let list = TaiList::from_served(&served(&tacs), &plmn_a());
        assert_eq!(list.len(), TAI_LIST_MAX_SIZE);
        assert_eq!(list.tacs(), (1..=16).collect::<Vec<u16>>());
    }

    #[test]
    fn test_single_and_empty_are_consecutive() {
        assert!(tacs_are_consecutive(Vec::<u16>::new()));
        assert!(tacs_are_consecutive(vec![42]));
        assert!(!tacs_are_consecutive(vec![3, 2]));
        assert!(!tacs_are_consecutive(vec![0xffff, 0]));
    }

    #[test]
    fn test_add_tai_idempotent() {
        let mut list = TaiList::from_served(&served(&[1, 2, 3]), &plmn_a());
        let before = list.clone();
        list.add_tai(&EpsTai::new(plmn_a(), 2)).unwrap();
        assert_eq!(list, before);
    }

    #[test]
    fn test_add_tai_appends_and_retags() {
        let mut list = TaiList::from_served(&served(&[1, 2, 3]), &plmn_a());
        list.add_tai(&EpsTai::new(plmn_a(), 4)).unwrap();
        assert_eq!(list.tacs(), vec![1, 2, 3, 4]);
        assert_eq!(list.list_type(), TaiListType::OnePlmnConsecutiveTacs);

        list.add_tai(&EpsTai::new(plmn_a(), 9)).unwrap();
        assert_eq!(list.tacs(), vec![1, 2, 3, 4, 9]);
        assert_eq!(list.list_type(), TaiListType::OnePlmnNonConsecutiveTacs);
    }

    #[test]
    fn test_add_tai_full_list() {
        let tacs: Vec<u16> = (100..116).collect();
        let mut list = TaiList::from_served(&served(&tacs), &plmn_a());
        assert!(list.is_full());
        let before = list.clone();

        let err = list.add_tai(&EpsTai::new(plmn_a(), 500)).unwrap_err();
        assert!(matches!(err, MmeError::CapacityExceeded { .. }));
        assert_eq!(list, before);

        // Already present still succeeds on a full list
        list.add_tai(&EpsTai::new(plmn_a(), 100)).unwrap();
        assert_eq!(list, before);
    }

    #[test]
    fn test_add_tai_invalid_tac() {
        let mut list = TaiList::new();
        let err = list.add_tai(&EpsTai::new(plmn_a(), INVALID_TAC)).unwrap_err();
        assert!(matches!(err, MmeError::InvalidArgument(_)));
        assert!(list.is_empty());
    }

    #[test]
    fn test_add_tai_other_plmn_rejected() {
        let mut list = TaiList::from_served(&served(&[1]), &plmn_a());
        let before = list.clone();

        let err = list.add_tai(&EpsTai::new(PlmnId::new("001", "01"), 2)).unwrap_err();
        assert!(matches!(err, MmeError::InvalidArgument(_)));
        assert_eq!(list, before);
        assert_eq!(list.list_type(), TaiListType::OnePlmnConsecutiveTacs);

        // An empty list takes the PLMN of its first TAI
        let mut empty = TaiList::new();
        empty.add_tai(&EpsTai::new(PlmnId::new("001", "01"), 2)).unwrap();
        assert_eq!(empty.tacs(), vec![2]);
    }
}
