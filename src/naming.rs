//! Logical camera naming.
//!
//! A device is named from its hardware identity when a policy recognises it,
//! and positionally (`camera_<slot>`) otherwise. Two strategies exist because
//! deployments identify cameras differently: some by USB vendor/product pair,
//! some by a substring of the udev serial or by-id link.

use serde::{Deserialize, Serialize};

/// Hardware identity read for one device slot. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    /// Descriptive string such as the udev serial or a `/dev/v4l/by-id` link.
    pub descriptor: Option<String>,
}

/// Positional fallback name for a slot.
pub fn default_name(slot_id: u32) -> String {
    format!("camera_{slot_id}")
}

pub trait NamingPolicy: Send + Sync {
    /// Canonical name for a recognised identity, `None` if not recognised.
    fn canonical_name(&self, identity: &DeviceIdentity) -> Option<String>;

    fn name_for(&self, slot_id: u32, identity: Option<&DeviceIdentity>) -> String {
        identity
            .and_then(|identity| self.canonical_name(identity))
            .unwrap_or_else(|| default_name(slot_id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProductRule {
    pub vendor_id: String,
    pub product_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstringRule {
    pub pattern: String,
    pub name: String,
}

/// Matches `{vendor_id, product_id}` pairs, ignoring hex case.
#[derive(Debug, Clone, Default)]
pub struct VendorProductPolicy {
    rules: Vec<VendorProductRule>,
}

impl VendorProductPolicy {
    pub fn new(rules: Vec<VendorProductRule>) -> Self {
        Self { rules }
    }
}

impl NamingPolicy for VendorProductPolicy {
    fn canonical_name(&self, identity: &DeviceIdentity) -> Option<String> {
        let (vendor, product) = (identity.vendor_id.as_deref()?, identity.product_id.as_deref()?);
        self.rules
            .iter()
            .find(|rule| {
                rule.vendor_id.eq_ignore_ascii_case(vendor)
                    && rule.product_id.eq_ignore_ascii_case(product)
            })
            .map(|rule| rule.name.clone())
    }
}

/// Matches the first rule whose pattern occurs in the descriptor string.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSubstringPolicy {
    rules: Vec<SubstringRule>,
}

impl DescriptorSubstringPolicy {
    pub fn new(rules: Vec<SubstringRule>) -> Self {
        Self { rules }
    }
}

impl NamingPolicy for DescriptorSubstringPolicy {
    fn canonical_name(&self, identity: &DeviceIdentity) -> Option<String> {
        let descriptor = identity.descriptor.as_deref()?.to_lowercase();
        self.rules
            .iter()
            .find(|rule| descriptor.contains(&rule.pattern.to_lowercase()))
            .map(|rule| rule.name.clone())
    }
}

/// Naming strategy as it appears in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum NamingConfig {
    VendorProduct { rules: Vec<VendorProductRule> },
    DescriptorSubstring { rules: Vec<SubstringRule> },
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self::VendorProduct {
            rules: vec![
                VendorProductRule {
                    vendor_id: "1234".to_string(),
                    product_id: "abcd".to_string(),
                    name: "web".to_string(),
                },
                VendorProductRule {
                    vendor_id: "5678".to_string(),
                    product_id: "efgh".to_string(),
                    name: "usb".to_string(),
                },
            ],
        }
    }
}

impl NamingConfig {
    pub fn build(&self) -> Box<dyn NamingPolicy> {
        match self {
            Self::VendorProduct { rules } => Box::new(VendorProductPolicy::new(rules.clone())),
            Self::DescriptorSubstring { rules } => {
                Box::new(DescriptorSubstringPolicy::new(rules.clone()))
            }
        }
    }

    /// Names every rule can produce.
    pub fn rule_names(&self) -> Vec<&str> {
        match self {
            Self::VendorProduct { rules } => rules.iter().map(|r| r.name.as_str()).collect(),
            Self::DescriptorSubstring { rules } => rules.iter().map(|r| r.name.as_str()).collect(),
        }
    }
}
