//! Safe wrapper for SAI switch API.

use crate::error::SaiResult;

/// Switch attributes read during start-up.
pub trait SwitchApi: Send + Sync {
    /// Reads `SAI_SWITCH_ATTR_NUMBER_OF_ECMP_GROUPS`.
    fn get_number_of_ecmp_groups(&self) -> SaiResult<u32>;
}
