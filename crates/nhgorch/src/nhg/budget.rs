//! Hardware next hop group budget.
//!
//! Counts every hardware group object in existence against the ceiling the
//! switch reports at start-up. Exceeding the ceiling is a caller bug: check
//! [`NhgBudget::has_capacity`] before syncing a group that needs an object.

use super::config::NhgOrchConfig;
use crate::switch::{SwitchCapabilitySink, SWITCH_CAPABILITY_MAX_NEXTHOP_GROUP_COUNT};
use crate::{info_log, warn_log};
use sonic_sai::api::SwitchApi;
use std::sync::atomic::{AtomicU32, Ordering};

/// Ceiling used when the switch cannot be queried.
pub const DEFAULT_NUMBER_OF_ECMP_GROUPS: u32 = 128;

/// ECMP group size the Mellanox SDK reserves per group.
pub const DEFAULT_MAX_ECMP_GROUP_SIZE: u32 = 32;

const MELLANOX_PLATFORM_SUBSTRING: &str = "mellanox";

#[derive(Debug)]
pub struct NhgBudget {
    used: AtomicU32,
    max: u32,
}

impl NhgBudget {
    pub fn new(max: u32) -> Self {
        Self {
            used: AtomicU32::new(0),
            max,
        }
    }

    /// Queries the ceiling from the switch and publishes it.
    pub fn from_switch(
        switch: &dyn SwitchApi,
        config: &NhgOrchConfig,
        capabilities: &dyn SwitchCapabilitySink,
    ) -> Self {
        let platform = config.resolve_platform();
        let max = match switch.get_number_of_ecmp_groups() {
            Ok(count)
                if platform.contains(MELLANOX_PLATFORM_SUBSTRING)
                    && config.mellanox_max_ecmp_group_size > 0 =>
            {
                info_log!(
                    "NhgOrch",
                    divisor = config.mellanox_max_ecmp_group_size,
                    "Mellanox platform, dividing ECMP group capacity"
                );
                count / config.mellanox_max_ecmp_group_size
            }
            Ok(count) => count,
            Err(e) => {
                warn_log!(
                    "NhgOrch",
                    error = %e,
                    default = config.default_max_nhg_count,
                    "Failed to get switch attribute number of ECMP groups, using default"
                );
                config.default_max_nhg_count
            }
        };

        capabilities.set_switch_capability(&[(
            SWITCH_CAPABILITY_MAX_NEXTHOP_GROUP_COUNT.to_string(),
            max.to_string(),
        )]);

        info_log!("NhgOrch", max_nhg_count = max, platform = %platform, "Next hop group ceiling set");

        Self::new(max)
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn has_capacity(&self) -> bool {
        self.used() < self.max
    }

    /// Panics when the ceiling is already reached.
    pub fn inc(&self) {
        let prev = self.used.fetch_add(1, Ordering::SeqCst);
        if prev >= self.max {
            self.used.fetch_sub(1, Ordering::SeqCst);
            panic!("next hop group count {} exceeds ceiling {}", prev + 1, self.max);
        }
    }

    /// Panics when no group is accounted.
    pub fn dec(&self) {
        if self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_err()
        {
            panic!("next hop group count decremented below zero");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::{SaiError, SaiResult};
    use std::sync::Mutex;

    struct FixedSwitch(Option<u32>);

    impl SwitchApi for FixedSwitch {
        fn get_number_of_ecmp_groups(&self) -> SaiResult<u32> {
            self.0.ok_or_else(|| SaiError::not_supported("NUMBER_OF_ECMP_GROUPS"))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, String)>>);

    impl SwitchCapabilitySink for Recorder {
        fn set_switch_capability(&self, fvs: &[(String, String)]) {
            self.0.lock().unwrap().extend_from_slice(fvs);
        }
    }

    #[test]
    fn test_inc_dec() {
        let budget = NhgBudget::new(2);
        budget.inc();
        budget.inc();
        assert!(!budget.has_capacity());
        budget.dec();
        assert!(budget.has_capacity());
        assert_eq!(budget.used(), 1);
    }

    #[test]
    #[should_panic(expected = "exceeds ceiling")]
    fn test_inc_past_ceiling_panics() {
        let budget = NhgBudget::new(1);
        budget.inc();
        budget.inc();
    }

    #[test]
    #[should_panic(expected = "below zero")]
    fn test_dec_below_zero_panics() {
        NhgBudget::new(1).dec();
    }

    #[test]
    fn test_from_switch_publishes() {
        let sink = Recorder::default();
        let config = NhgOrchConfig::default().with_platform("x86_64-kvm_x86_64-r0");
        let budget = NhgBudget::from_switch(&FixedSwitch(Some(512)), &config, &sink);

        assert_eq!(budget.max(), 512);
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![("MAX_NEXTHOP_GROUP_COUNT".to_string(), "512".to_string())]
        );
    }

    #[test]
    fn test_from_switch_fallback_and_mellanox_divisor() {
        let sink = Recorder::default();
        let config = NhgOrchConfig::default().with_platform("x86_64-mellanox_sn2700-r0");

        let budget = NhgBudget::from_switch(&FixedSwitch(Some(4096)), &config, &sink);
        assert_eq!(budget.max(), 128);

        let budget = NhgBudget::from_switch(&FixedSwitch(None), &config, &sink);
        assert_eq!(budget.max(), 128);
    }
}
