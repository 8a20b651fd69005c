//! Collaborator handles shared by every group.

use super::budget::NhgBudget;
use crate::crm::CrmCounters;
use crate::neigh::NeighborResolver;
use sonic_sai::api::NextHopGroupApi;
use std::sync::Arc;

/// Handles a group needs to program hardware and keep counters.
#[derive(Clone)]
pub struct NhgContext {
    pub sai: Arc<dyn NextHopGroupApi>,
    pub neigh: Arc<dyn NeighborResolver>,
    pub crm: Arc<dyn CrmCounters>,
    pub budget: Arc<NhgBudget>,
}

impl NhgContext {
    pub fn new(
        sai: Arc<dyn NextHopGroupApi>,
        neigh: Arc<dyn NeighborResolver>,
        crm: Arc<dyn CrmCounters>,
        budget: Arc<NhgBudget>,
    ) -> Self {
        Self {
            sai,
            neigh,
            crm,
            budget,
        }
    }
}

impl std::fmt::Debug for NhgContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NhgContext")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}
