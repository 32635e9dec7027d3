//! Whitelist/blacklist mutation protocol.
//!
//! A subnet may live in at most one list. Adding checks for an exact canonical match in
//! the whitelist first, then the blacklist, and refuses when either holds it. Overlap
//! between different prefixes is permitted and only logged.
//!
//! Every mutation request is recorded on the `bouncer::audit` tracing target.

use tracing::{info, warn};

use crate::access::{AccessList, AccessResolver, Subnet};
use crate::context::CallContext;
use crate::BouncerError;

/// Result of an add request. Both variants are successful calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The subnet was stored in `list`.
    Added { list: AccessList, subnet: Subnet },
    /// The subnet already lives in `list`; nothing was written.
    AlreadyListed { list: AccessList, subnet: Subnet },
}

impl AddOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, AddOutcome::Added { .. })
    }

    pub fn message(&self) -> String {
        match self {
            AddOutcome::Added { list, subnet } => format!("Added {subnet} to the {list}"),
            AddOutcome::AlreadyListed { list, subnet } => match list {
                AccessList::Whitelist => format!("{subnet} is already whitelisted"),
                AccessList::Blacklist => format!("{subnet} is already blacklisted"),
            },
        }
    }
}

/// Result of a remove request. Both variants are successful calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed { list: AccessList, subnet: Subnet },
    NotFound { list: AccessList, subnet: Subnet },
}

impl RemoveOutcome {
    pub fn is_removed(&self) -> bool {
        matches!(self, RemoveOutcome::Removed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            RemoveOutcome::Removed { list, subnet } => format!("Removed {subnet} from the {list}"),
            RemoveOutcome::NotFound { list, subnet } => format!("{subnet} not found in the {list}"),
        }
    }
}

/// Administrative operations on the access lists.
#[derive(Debug, Clone)]
pub struct ListAdmin {
    resolver: AccessResolver,
}

impl ListAdmin {
    pub fn new(resolver: AccessResolver) -> Self {
        Self { resolver }
    }

    /// Add `subnet` to `target` unless either list already holds its canonical form.
    pub async fn add(
        &self,
        ctx: &CallContext,
        target: AccessList,
        subnet: &str,
    ) -> Result<AddOutcome, BouncerError> {
        let subnet = Subnet::parse(subnet)?;

        for list in AccessList::ALL {
            if ctx.run(self.resolver.network_exists(list, &subnet)).await? {
                info!(target: "bouncer::audit", action = "add", list = %target, %subnet, outcome = "already_listed", found_in = %list, "access list unchanged");
                return Ok(AddOutcome::AlreadyListed { list, subnet });
            }
        }

        let overlaps = ctx.run(self.resolver.overlapping(target.other(), &subnet)).await?;
        if !overlaps.is_empty() {
            let with: Vec<String> = overlaps.iter().map(Subnet::to_string).collect();
            warn!(target: "bouncer::access", %subnet, list = %target, other = %target.other(), overlaps = ?with, "subnet overlaps the other list");
        }

        ctx.run(self.resolver.insert(target, &subnet)).await?;
        info!(target: "bouncer::audit", action = "add", list = %target, %subnet, outcome = "added", "access list changed");
        Ok(AddOutcome::Added { list: target, subnet })
    }

    /// Remove the canonical form of `subnet` from `list`.
    pub async fn remove(
        &self,
        ctx: &CallContext,
        list: AccessList,
        subnet: &str,
    ) -> Result<RemoveOutcome, BouncerError> {
        let subnet = Subnet::parse(subnet)?;
        if ctx.run(self.resolver.remove(list, &subnet)).await? {
            info!(target: "bouncer::audit", action = "remove", %list, %subnet, outcome = "removed", "access list changed");
            Ok(RemoveOutcome::Removed { list, subnet })
        } else {
            info!(target: "bouncer::audit", action = "remove", %list, %subnet, outcome = "not_found", "access list unchanged");
            Ok(RemoveOutcome::NotFound { list, subnet })
        }
    }

    /// Entries of `list` in canonical form, sorted.
    pub async fn list(&self, ctx: &CallContext, list: AccessList) -> Result<Vec<Subnet>, BouncerError> {
        ctx.run(self.resolver.entries(list)).await
    }
}
