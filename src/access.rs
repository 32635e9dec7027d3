//! CIDR allow/deny lists.
//!
//! - [`Subnet`] / [`parse_ip`]: canonical CIDR handling (in `cidr` module).
//! - [`AccessListStore`]: storage of raw network strings per list (in `store` module).
//! - [`AccessResolver`]: membership tests and list mutation over a store (in `resolver`).
//!
//! The two lists form a closed set, so storage targets are fixed per variant and no
//! table name is ever built from caller input.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cidr;
pub mod resolver;
pub mod store;
pub use cidr::{parse_ip, Subnet};
pub use resolver::AccessResolver;
pub use store::{AccessListStore, InMemoryAccessListStore};

/// One of the two access lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessList {
    /// Always admitted, bypasses rate limiting.
    Whitelist,
    /// Always denied.
    Blacklist,
}

impl AccessList {
    /// Both lists, in precedence order.
    pub const ALL: [AccessList; 2] = [AccessList::Whitelist, AccessList::Blacklist];

    /// Fixed storage target for this list.
    pub fn table(self) -> &'static str {
        match self {
            AccessList::Whitelist => "whitelist",
            AccessList::Blacklist => "blacklist",
        }
    }

    /// The opposite list.
    pub fn other(self) -> Self {
        match self {
            AccessList::Whitelist => AccessList::Blacklist,
            AccessList::Blacklist => AccessList::Whitelist,
        }
    }
}

impl fmt::Display for AccessList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_tables() {
        for list in AccessList::ALL {
            let json = serde_json::to_string(&list).unwrap();
            assert_eq!(json, format!("\"{}\"", list.table()));
        }
    }

    #[test]
    fn unknown_list_names_are_rejected() {
        for bad in ["\"users; DROP TABLE whitelist\"", "\"Whitelist\"", "\"greylist\"", "\"\""] {
            assert!(serde_json::from_str::<AccessList>(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn other_flips() {
        assert_eq!(AccessList::Whitelist.other(), AccessList::Blacklist);
        assert_eq!(AccessList::Blacklist.other(), AccessList::Whitelist);
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&AccessList::Whitelist).unwrap();
        assert_eq!(json, "\"whitelist\"");
        let list: AccessList = serde_json::from_str("\"blacklist\"").unwrap();
        assert_eq!(list, AccessList::Blacklist);
    }
}
