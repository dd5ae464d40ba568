//! Property-Based Tests for the MME core
//!
//! TAI list construction and maintenance, M-TMSI allocation and the EPS
//! bearer bookkeeping invariants.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::bearer::EsmEbrStatus;
    use crate::bearer_manager::{create_bearer, release_bearer, BearerRequest, ReleaseTarget};
    use crate::error::MmeError;
    use crate::tai_list::{TaiList, TaiListType};
    use crate::tmsi::{MTmsiAllocator, TmsiMode};
    use crate::types::{EpsTai, PlmnId, BEARERS_PER_UE, INVALID_M_TMSI, TAI_LIST_MAX_SIZE};
    use crate::ue_context::MmeUe;

    // ========================================================================
    // Strategies for generating test data
    // ========================================================================

    fn plmn_a() -> PlmnId {
        PlmnId::new("208", "93")
    }

    fn plmn_b() -> PlmnId {
        PlmnId::new("001", "01")
    }

    /// Served TAI list mixing the node PLMN and a foreign one
    fn arb_served_tai() -> impl Strategy<Value = Vec<EpsTai>> {
        prop::collection::vec((any::<bool>(), 0u16..40), 0..24).prop_map(|entries| {
            entries
                .into_iter()
                .map(|(own, tac)| EpsTai::new(if own { plmn_a() } else { plmn_b() }, tac))
                .collect()
        })
    }

    /// Distinct TACs of the node PLMN, never the reserved one
    fn arb_unique_tacs(max: usize) -> impl Strategy<Value = Vec<u16>> {
        prop::collection::btree_set(0u16..1000, 1..=max).prop_map(|set| set.into_iter().collect())
    }

    #[derive(Debug, Clone)]
    enum BearerOp {
        CreatePdn,
        CreateDefault { pid: u8, ebi: u8 },
        CreateDedicated { pid: u8, ebi: u8 },
        ReleaseByIdentity(u8),
        ReleaseByPosition { pid: u8, slot: usize },
    }

    fn arb_bearer_op() -> impl Strategy<Value = BearerOp> {
        prop_oneof![
            Just(BearerOp::CreatePdn),
            (0u8..5, 5u8..=15).prop_map(|(pid, ebi)| BearerOp::CreateDefault { pid, ebi }),
            (0u8..5, 5u8..=15).prop_map(|(pid, ebi)| BearerOp::CreateDedicated { pid, ebi }),
            (0u8..=16).prop_map(BearerOp::ReleaseByIdentity),
            (0u8..5, 0usize..4).prop_map(|(pid, slot)| BearerOp::ReleaseByPosition { pid, slot }),
        ]
    }

    fn request(pid: u8, ebi: u8, is_default: bool) -> BearerRequest {
        BearerRequest {
            pdn_cid: pid,
            ebi,
            is_default,
            qci: 9,
            ..Default::default()
        }
    }

    fn is_run(tacs: &[u16]) -> bool {
        tacs.windows(2).all(|w| w[0].checked_add(1) == Some(w[1]))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        // ====================================================================
        // TAI list
        // ====================================================================

        /// The list holds the node PLMN's served TACs in scan order, capped
        #[test]
        fn prop_tai_list_from_served(served in arb_served_tai()) {
            let list = TaiList::from_served(&served, &plmn_a());

            let expected: Vec<u16> = served
                .iter()
                .filter(|t| t.plmn_id == plmn_a())
                .map(|t| t.tac)
                .take(TAI_LIST_MAX_SIZE)
                .collect();
            prop_assert_eq!(list.tacs(), expected.clone());
            prop_assert!(list.tais().iter().all(|t| t.plmn_id == plmn_a()));

            let tag = if is_run(&expected) {
                TaiListType::OnePlmnConsecutiveTacs
            } else {
                TaiListType::OnePlmnNonConsecutiveTacs
            };
            prop_assert_eq!(list.list_type(), tag);
        }

        /// Adding a TAC already in the list changes nothing
        #[test]
        fn prop_add_tai_idempotent(tacs in arb_unique_tacs(TAI_LIST_MAX_SIZE), pick in any::<prop::sample::Index>()) {
            let served: Vec<EpsTai> = tacs.iter().map(|&tac| EpsTai::new(plmn_a(), tac)).collect();
            let mut list = TaiList::from_served(&served, &plmn_a());
            let before = list.clone();

            let existing = served[pick.index(served.len())];
            prop_assert!(list.add_tai(&existing).is_ok());
            prop_assert_eq!(list, before);
        }

        /// A full list rejects new TACs and stays unchanged
        #[test]
        fn prop_add_tai_full_list(start in 0u16..1000, tac in 2000u16..3000) {
            let served: Vec<EpsTai> = (start..start + TAI_LIST_MAX_SIZE as u16)
                .map(|tac| EpsTai::new(plmn_a(), tac))
                .collect();
            let mut list = TaiList::from_served(&served, &plmn_a());
            let before = list.clone();

            let result = list.add_tai(&EpsTai::new(plmn_a(), tac));
            let is_capacity_error = matches!(result, Err(MmeError::CapacityExceeded { .. }));
            prop_assert!(is_capacity_error);
            prop_assert_eq!(list, before);
        }

        /// Incremental adds keep TACs unique and the tag accurate
        #[test]
        fn prop_add_tai_retags(initial in arb_unique_tacs(8), added in prop::collection::vec(0u16..1000, 0..12)) {
            let served: Vec<EpsTai> = initial.iter().map(|&tac| EpsTai::new(plmn_a(), tac)).collect();
            let mut list = TaiList::from_served(&served, &plmn_a());

            for tac in added {
                let _ = list.add_tai(&EpsTai::new(plmn_a(), tac));
            }

            let tacs = list.tacs();
            let mut dedup = tacs.clone();
            dedup.sort_unstable();
            dedup.dedup();
            prop_assert_eq!(dedup.len(), tacs.len());
            prop_assert!(tacs.len() <= TAI_LIST_MAX_SIZE);
            prop_assert_eq!(list.list_type() == TaiListType::OnePlmnConsecutiveTacs, is_run(&tacs));
        }

        // ====================================================================
        // M-TMSI
        // ====================================================================

        /// The reserved M-TMSI is never issued
        #[test]
        fn prop_m_tmsi_never_sentinel(offset in 1u32..64, count in 1usize..128) {
            let mut alloc = MTmsiAllocator::with_start(TmsiMode::Sequential, INVALID_M_TMSI - offset);
            for _ in 0..count {
                match alloc.allocate() {
                    Ok(m_tmsi) => {
                        prop_assert_ne!(m_tmsi, INVALID_M_TMSI);
                    }
                    Err(e) => {
                        prop_assert_eq!(e, MmeError::AllocationExhausted);
                    }
                }
            }
            prop_assert!(!alloc.is_live(INVALID_M_TMSI));
        }

        // ====================================================================
        // Bearer contexts
        // ====================================================================

        /// Bookkeeping stays consistent under any operation sequence
        #[test]
        fn prop_bearer_invariants(ops in prop::collection::vec(arb_bearer_op(), 1..60)) {
            let mut ue = MmeUe::new(1);

            for op in ops {
                let before = ue.n_active_ebrs();
                match op {
                    BearerOp::CreatePdn => {
                        let _ = ue.create_pdn_connection("internet", false);
                    }
                    BearerOp::CreateDefault { pid, ebi } => {
                        if create_bearer(&mut ue, request(pid, ebi, true)).is_ok() {
                            prop_assert_eq!(ue.n_active_ebrs(), before + 1);
                        } else {
                            prop_assert_eq!(ue.n_active_ebrs(), before);
                        }
                    }
                    BearerOp::CreateDedicated { pid, ebi } => {
                        if create_bearer(&mut ue, request(pid, ebi, false)).is_ok() {
                            prop_assert_eq!(ue.n_active_ebrs(), before + 1);
                        } else {
                            prop_assert_eq!(ue.n_active_ebrs(), before);
                        }
                    }
                    BearerOp::ReleaseByIdentity(ebi) => {
                        if release_bearer(&mut ue, ReleaseTarget::ByIdentity(ebi)).is_ok() {
                            prop_assert!(ue.n_active_ebrs() < before);
                            prop_assert!(ue.find_bearer(ebi).is_none());
                        } else {
                            prop_assert_eq!(ue.n_active_ebrs(), before);
                        }
                    }
                    BearerOp::ReleaseByPosition { pid, slot } => {
                        if release_bearer(&mut ue, ReleaseTarget::ByPosition { pid, slot }).is_err() {
                            prop_assert_eq!(ue.n_active_ebrs(), before);
                        }
                    }
                }
                prop_assert!(ue.check_invariants());
                prop_assert!(ue.n_active_ebrs() <= BEARERS_PER_UE);
            }
        }

        /// Create followed by release of the same EBI restores the counter
        #[test]
        fn prop_create_release_restores_counter(dedicated in 0usize..5) {
            let mut ue = MmeUe::new(1);
            let pid = ue.create_pdn_connection("internet", false).unwrap();
            create_bearer(&mut ue, request(pid, 5, true)).unwrap();
            for i in 0..dedicated {
                create_bearer(&mut ue, request(pid, 6 + i as u8, false)).unwrap();
            }

            let before = ue.n_active_ebrs();
            create_bearer(&mut ue, request(pid, 15, false)).unwrap();
            prop_assert_eq!(release_bearer(&mut ue, ReleaseTarget::ByIdentity(15)).unwrap(), 15);
            prop_assert_eq!(ue.n_active_ebrs(), before);
        }

        /// Releasing the default bearer releases every bearer of its PDN
        #[test]
        fn prop_default_release_cascades(dedicated in 0u8..=9, by_position in any::<bool>()) {
            let mut ue = MmeUe::new(1);
            let other = ue.create_pdn_connection("ims", false).unwrap();
            create_bearer(&mut ue, request(other, 15, true)).unwrap();

            let pid = ue.create_pdn_connection("internet", false).unwrap();
            create_bearer(&mut ue, request(pid, 5, true)).unwrap();
            for i in 0..dedicated {
                create_bearer(&mut ue, request(pid, 6 + i, false)).unwrap();
            }

            let target = if by_position {
                ReleaseTarget::ByPosition { pid, slot: 0 }
            } else {
                ReleaseTarget::ByIdentity(5)
            };
            prop_assert_eq!(release_bearer(&mut ue, target).unwrap(), 5);

            for ebi in 5..6 + dedicated {
                prop_assert_eq!(ue.bearer_status(ebi), EsmEbrStatus::Inactive);
                prop_assert!(ue.find_bearer(ebi).is_none());
            }
            prop_assert_eq!(ue.pdn(pid).unwrap().n_bearers, 0);
            // Other PDN untouched
            prop_assert!(ue.find_bearer(15).is_some());
            prop_assert_eq!(ue.n_active_ebrs(), 1);
            prop_assert!(ue.check_invariants());
        }
    }
}
