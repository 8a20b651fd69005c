//! Validation of class-based group payloads.
//!
//! `members` is a comma list of plain group indices. `class_map` is a comma
//! list of `fc:index` pairs where `fc` is a forwarding class in 0..=63 and
//! `index` a 0-based position in `members`.

use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Highest forwarding class value.
pub const FC_MAX_VAL: u8 = 63;

/// Most members a class-based group can address with an 8-bit index.
pub const MAX_CBF_MEMBERS: usize = u8::MAX as usize + 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CbfValidationError {
    #[error("CBF group has no members")]
    EmptyMembers,

    #[error("CBF group has an empty class map")]
    EmptyClassMap,

    #[error("CBF group has an empty member name")]
    EmptyMember,

    #[error("CBF group has {0} members, more than can be indexed")]
    TooManyMembers(usize),

    #[error("CBF group member {0} appears more than once")]
    DuplicateMember(String),

    #[error("CBF class map entry '{0}' is ill-formed")]
    MalformedClassMapEntry(String),

    #[error("CBF class map entry '{0}' is not numeric")]
    NonNumeric(String),

    #[error("CBF class map contains invalid FC {0}")]
    FcOutOfRange(u32),

    #[error("CBF class map index {index} out of range for {members} members")]
    IndexOutOfRange { index: u32, members: usize },

    #[error("CBF class map maps FC {0} more than once")]
    DuplicateFc(u8),
}

/// A validated class-based group payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CbfData {
    pub members: Vec<String>,
    pub class_map: BTreeMap<u8, u8>,
}

pub fn validate_cbf_data(members: &str, class_map: &str) -> Result<CbfData, CbfValidationError> {
    if members.is_empty() {
        return Err(CbfValidationError::EmptyMembers);
    }
    if class_map.is_empty() {
        return Err(CbfValidationError::EmptyClassMap);
    }

    let members: Vec<String> = members.split(',').map(str::to_string).collect();
    if members.len() > MAX_CBF_MEMBERS {
        return Err(CbfValidationError::TooManyMembers(members.len()));
    }

    let mut seen = BTreeSet::new();
    for member in &members {
        if member.is_empty() {
            return Err(CbfValidationError::EmptyMember);
        }
        if !seen.insert(member.as_str()) {
            return Err(CbfValidationError::DuplicateMember(member.clone()));
        }
    }

    let mut map = BTreeMap::new();
    for entry in class_map.split(',') {
        let (fc, index) = match entry.split(':').collect::<Vec<_>>().as_slice() {
            [fc, index] => (*fc, *index),
            _ => return Err(CbfValidationError::MalformedClassMapEntry(entry.to_string())),
        };

        let fc: u32 = fc
            .trim()
            .parse()
            .map_err(|_| CbfValidationError::NonNumeric(entry.to_string()))?;
        let index: u32 = index
            .trim()
            .parse()
            .map_err(|_| CbfValidationError::NonNumeric(entry.to_string()))?;

        if fc > u32::from(FC_MAX_VAL) {
            return Err(CbfValidationError::FcOutOfRange(fc));
        }
        if index as usize >= members.len() {
            return Err(CbfValidationError::IndexOutOfRange {
                index,
                members: members.len(),
            });
        }

        // Both bounds checked above.
        let (fc, index) = (fc as u8, index as u8);
        if map.insert(fc, index).is_some() {
            return Err(CbfValidationError::DuplicateFc(fc));
        }
    }

    Ok(CbfData {
        members,
        class_map: map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_valid_data() {
        let data = validate_cbf_data("group1,group2,group3", "0:0,5:1,10:2,63:0").unwrap();
        assert_eq!(data.members, vec!["group1", "group2", "group3"]);
        assert_eq!(
            data.class_map,
            BTreeMap::from([(0, 0), (5, 1), (10, 2), (63, 0)])
        );
    }

    #[test]
    fn test_member_order_preserved() {
        let data = validate_cbf_data("group3,group1", "0:1").unwrap();
        assert_eq!(data.members, vec!["group3", "group1"]);
    }

    #[test]
    fn test_duplicate_fc() {
        assert_eq!(
            validate_cbf_data("A,B,C", "5:0,10:1,5:2"),
            Err(CbfValidationError::DuplicateFc(5))
        );
    }

    #[test]
    fn test_index_out_of_range() {
        assert_eq!(
            validate_cbf_data("A,B,C", "5:0,10:5"),
            Err(CbfValidationError::IndexOutOfRange { index: 5, members: 3 })
        );
        assert!(matches!(
            validate_cbf_data("A,B,C", "5:3"),
            Err(CbfValidationError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(validate_cbf_data("", "0:0"), Err(CbfValidationError::EmptyMembers));
        assert_eq!(validate_cbf_data("A", ""), Err(CbfValidationError::EmptyClassMap));
        assert_eq!(validate_cbf_data("A,,B", "0:0"), Err(CbfValidationError::EmptyMember));
    }

    #[test]
    fn test_duplicate_members() {
        assert_eq!(
            validate_cbf_data("A,B,A", "0:0"),
            Err(CbfValidationError::DuplicateMember("A".to_string()))
        );
    }

    #[test]
    fn test_malformed_entries() {
        assert!(matches!(
            validate_cbf_data("A,B", "0:0:1"),
            Err(CbfValidationError::MalformedClassMapEntry(_))
        ));
        assert!(matches!(
            validate_cbf_data("A,B", "0"),
            Err(CbfValidationError::MalformedClassMapEntry(_))
        ));
        assert!(matches!(
            validate_cbf_data("A,B", "x:0"),
            Err(CbfValidationError::NonNumeric(_))
        ));
        assert!(matches!(
            validate_cbf_data("A,B", "-1:0"),
            Err(CbfValidationError::NonNumeric(_))
        ));
        assert_eq!(
            validate_cbf_data("A,B", "64:0"),
            Err(CbfValidationError::FcOutOfRange(64))
        );
    }
}
