//! Shared types for the Cluster specification
//!
//! The cloud spec mirrors the wire format of the Cluster CRD: one optional
//! branch per provider, of which exactly one is set. [`CloudSpec::provider`]
//! turns that into a [`ProviderKind`] for matching.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default GCP network used when the cluster does not name one
pub const GCP_DEFAULT_NETWORK: &str = "global/networks/default";

/// Reference to a single key of a Secret in any namespace
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSecretKeySelector {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AWSCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<GlobalSecretKeySelector>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vpc_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzureCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<GlobalSecretKeySelector>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_group: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpenstackCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<GlobalSecretKeySelector>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,
}

/// GCP cloud settings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GCPCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<GlobalSecretKeySelector>,

    /// Base64 encoded service account JSON. Usually empty, in which case the
    /// credentials reference is used instead.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subnetwork: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DigitaloceanCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<GlobalSecretKeySelector>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HetznerCloudSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_reference: Option<GlobalSecretKeySelector>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BringYourOwnCloudSpec {}

/// Cloud provider settings of a cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudSpec {
    #[serde(rename = "dc", default)]
    pub datacenter_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AWSCloudSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureCloudSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openstack: Option<OpenstackCloudSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcp: Option<GCPCloudSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digitalocean: Option<DigitaloceanCloudSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hetzner: Option<HetznerCloudSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bringyourown: Option<BringYourOwnCloudSpec>,
}

impl CloudSpec {
    /// The provider branch that is set, if any
    pub fn provider(&self) -> Option<ProviderKind> {
        if self.aws.is_some() {
            Some(ProviderKind::Aws)
        } else if self.azure.is_some() {
            Some(ProviderKind::Azure)
        } else if self.openstack.is_some() {
            Some(ProviderKind::Openstack)
        } else if self.gcp.is_some() {
            Some(ProviderKind::Gcp)
        } else if self.digitalocean.is_some() {
            Some(ProviderKind::Digitalocean)
        } else if self.hetzner.is_some() {
            Some(ProviderKind::Hetzner)
        } else if self.bringyourown.is_some() {
            Some(ProviderKind::BringYourOwn)
        } else {
            None
        }
    }
}

/// Cloud providers a cluster can run on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Aws,
    Azure,
    Openstack,
    Gcp,
    Digitalocean,
    Hetzner,
    BringYourOwn,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::Azure => "azure",
            ProviderKind::Openstack => "openstack",
            ProviderKind::Gcp => "gcp",
            ProviderKind::Digitalocean => "digitalocean",
            ProviderKind::Hetzner => "hetzner",
            ProviderKind::BringYourOwn => "bringyourown",
        }
    }

    /// Whether the platform keeps a per-cluster credentials Secret for this provider
    pub fn has_credentials(&self) -> bool {
        !matches!(self, ProviderKind::BringYourOwn)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(ProviderKind::Aws),
            "azure" => Ok(ProviderKind::Azure),
            "openstack" => Ok(ProviderKind::Openstack),
            "gcp" => Ok(ProviderKind::Gcp),
            "digitalocean" => Ok(ProviderKind::Digitalocean),
            "hetzner" => Ok(ProviderKind::Hetzner),
            "bringyourown" => Ok(ProviderKind::BringYourOwn),
            other => Err(format!("unknown cloud provider {other:?}")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRanges {
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworkingConfig {
    #[serde(default)]
    pub pods: NetworkRanges,

    #[serde(default)]
    pub services: NetworkRanges,
}
