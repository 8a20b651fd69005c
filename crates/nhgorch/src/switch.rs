//! Switch capability publication.

/// STATE_DB SWITCH_CAPABILITY field carrying the group ceiling.
pub const SWITCH_CAPABILITY_MAX_NEXTHOP_GROUP_COUNT: &str = "MAX_NEXTHOP_GROUP_COUNT";

/// Sink for SWITCH_CAPABILITY|switch fields, provided by SwitchOrch.
pub trait SwitchCapabilitySink: Send + Sync {
    fn set_switch_capability(&self, fvs: &[(String, String)]);
}
