//! Selection of the node routes left behind by a cluster
//!
//! The in-tree GCP cloud provider creates one route per node for the pod
//! CIDR of that node. Once the node's instance is gone the route stays, with
//! a `NEXT_HOP_INSTANCE_NOT_FOUND` warning.

use std::net::IpAddr;
use std::str::FromStr;

use super::client::Route;

const COMPUTE_API_ENDPOINT: &str = "https://www.googleapis.com/compute/v1/";
const K8S_NODE_ROUTE_TAG: &str = "k8s-node-route";
const K8S_NODE_ROUTE_PREFIX_REGEXP: &str = "kubernetes-.*";
const NEXT_HOP_INSTANCE_NOT_FOUND: &str = "NEXT_HOP_INSTANCE_NOT_FOUND";

/// Routes list filter matching node routes in `network_url`
pub fn route_filter(network_url: &str) -> String {
    format!(
        "(name eq \"{K8S_NODE_ROUTE_PREFIX_REGEXP}\")(description eq \"{K8S_NODE_ROUTE_TAG}\")(network eq \".*{network_url}.*\")"
    )
}

/// Absolute URL of a network given as URL, partial path or plain name
pub fn network_url(project: &str, network: &str) -> String {
    if network.starts_with("https://") || network.starts_with("http://") {
        return network.to_string();
    }
    let base = network
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|b| !b.is_empty())
        .unwrap_or("default");
    format!("{COMPUTE_API_ENDPOINT}projects/{project}/global/networks/{base}")
}

/// An IP network in CIDR notation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cidr {
    network: IpAddr,
    prefix: u8,
}

fn bits(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn width(ip: IpAddr) -> u8 {
    if ip.is_ipv4() {
        32
    } else {
        128
    }
}

fn from_bits(template: IpAddr, value: u128) -> IpAddr {
    match template {
        // Only ever called with values masked to 32 bits
        IpAddr::V4(_) => IpAddr::from((value as u32).to_be_bytes()),
        IpAddr::V6(_) => IpAddr::from(value.to_be_bytes()),
    }
}

impl Cidr {
    fn host_mask(&self) -> u128 {
        let host_bits = u32::from(width(self.network) - self.prefix);
        1u128.checked_shl(host_bits).map_or(u128::MAX, |v| v - 1)
    }

    pub fn first(&self) -> IpAddr {
        self.network
    }

    pub fn last(&self) -> IpAddr {
        from_bits(self.network, bits(self.network) | self.host_mask())
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        ip.is_ipv4() == self.network.is_ipv4()
            && bits(ip) & !self.host_mask() == bits(self.network)
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("invalid CIDR address: {s}"))?;
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| format!("invalid CIDR address: {s}"))?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= width(addr))
            .ok_or_else(|| format!("invalid CIDR address: {s}"))?;

        let mut cidr = Cidr {
            network: addr,
            prefix,
        };
        cidr.network = from_bits(addr, bits(addr) & !cidr.host_mask());
        Ok(cidr)
    }
}

/// Whether the route's destination overlaps one of the cluster's pod CIDRs
pub fn is_cluster_route(pod_cidrs: &[String], route: &Route) -> Result<bool, String> {
    let destination: Cidr = route
        .dest_range
        .parse()
        .map_err(|e| format!("failed to parse route destination CIDR: {e}"))?;

    for pod_cidr in pod_cidrs {
        let cluster: Cidr = pod_cidr
            .parse()
            .map_err(|e| format!("failed to parse cluster CIDR: {e}"))?;
        if cluster.contains(destination.first()) || cluster.contains(destination.last()) {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn is_next_hop_not_found(route: &Route) -> bool {
    route
        .warnings
        .iter()
        .any(|w| w.code == NEXT_HOP_INSTANCE_NOT_FOUND)
}
