use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::access::cidr::{parse_ip, Subnet};
use crate::access::{AccessList, AccessListStore};
use crate::BouncerError;

/// Membership tests and mutations over an [`AccessListStore`].
///
/// Every call reads the store; nothing is cached between calls. Membership is a linear
/// scan over the list, which is fine while lists stay small next to request volume.
#[derive(Clone)]
pub struct AccessResolver {
    store: Arc<dyn AccessListStore>,
}

impl std::fmt::Debug for AccessResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessResolver").field("store", &"<dyn AccessListStore>").finish()
    }
}

impl AccessResolver {
    pub fn new(store: Arc<dyn AccessListStore>) -> Self {
        Self { store }
    }

    /// True iff `ip` falls inside any subnet stored in `list`.
    ///
    /// A malformed `ip` matches nothing. Store failures are returned, not swallowed.
    pub async fn is_listed(&self, list: AccessList, ip: &str) -> Result<bool, BouncerError> {
        match parse_ip(ip) {
            Ok(addr) => self.contains(list, addr).await,
            Err(_) => {
                debug!(target: "bouncer::access", %list, ip, "unparseable address matches no subnet");
                Ok(false)
            }
        }
    }

    /// True iff `addr` falls inside any subnet stored in `list`. Malformed rows are skipped.
    pub async fn contains(&self, list: AccessList, addr: IpAddr) -> Result<bool, BouncerError> {
        let rows = self.store.get_all(list).await?;
        Ok(rows.iter().any(|row| match Subnet::parse(row) {
            Ok(net) => net.contains(addr),
            Err(err) => {
                warn!(target: "bouncer::access", %list, row = %row, error = %err, "skipping malformed stored subnet");
                false
            }
        }))
    }

    /// Exact match of the canonical form, not a containment test.
    pub async fn network_exists(
        &self,
        list: AccessList,
        subnet: &Subnet,
    ) -> Result<bool, BouncerError> {
        Ok(self.store.exists_exact(list, &subnet.to_string()).await?)
    }

    /// Store the canonical form of `subnet` in `list`.
    pub async fn insert(&self, list: AccessList, subnet: &Subnet) -> Result<(), BouncerError> {
        Ok(self.store.insert(list, &subnet.to_string()).await?)
    }

    /// Delete `subnet` from `list`; `false` when nothing matched.
    pub async fn remove(&self, list: AccessList, subnet: &Subnet) -> Result<bool, BouncerError> {
        Ok(self.store.delete(list, &subnet.to_string()).await? > 0)
    }

    /// Well-formed entries of `list` in canonical form.
    pub async fn entries(&self, list: AccessList) -> Result<Vec<Subnet>, BouncerError> {
        let rows = self.store.get_all(list).await?;
        let mut nets: Vec<Subnet> = rows
            .iter()
            .filter_map(|row| match Subnet::parse(row) {
                Ok(net) => Some(net),
                Err(err) => {
                    warn!(target: "bouncer::access", %list, row = %row, error = %err, "skipping malformed stored subnet");
                    None
                }
            })
            .collect();
        nets.sort();
        nets.dedup();
        Ok(nets)
    }

    /// Entries of `list` that contain or are contained by `subnet`.
    pub async fn overlapping(
        &self,
        list: AccessList,
        subnet: &Subnet,
    ) -> Result<Vec<Subnet>, BouncerError> {
        Ok(self.entries(list).await?.into_iter().filter(|net| net.overlaps(subnet)).collect())
    }
}
