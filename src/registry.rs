//! Lookup descriptors for every object kind a reference can point at.
//!
//! The resolver is written once and parameterized by an [`ObjectDescriptor`]:
//! which API collection to query, which filter fields act as slug and name,
//! and which sibling references narrow a text lookup.
//!
//! # Example
//!
//! ```
//! use netbox_provider_refs::registry::{ObjectDescriptor, ObjectRegistry};
//!
//! let registry = ObjectRegistry::netbox()
//!     .with_descriptor(ObjectDescriptor::named("widget", "Widget", "plugins/widgets"));
//!
//! let vlan = registry.get("vlan").unwrap();
//! assert!(vlan.slug_field.is_none());
//! assert_eq!(vlan.scope_filter_for("site"), Some("site_id"));
//! assert!(registry.get("widget").is_some());
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::reference::{LookupField, ReferenceKind};

/// Narrows a text lookup by the ID of a sibling reference on the same
/// resource block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeFilter {
    /// Object type of the sibling reference (e.g. `"site"`).
    pub sibling: String,
    /// API filter receiving the sibling's ID (e.g. `"site_id"`).
    pub filter: String,
}

/// How to look up one object kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// The object type key used by reference attributes (e.g. `"device_type"`).
    pub object_type: String,
    /// Human-readable name used in diagnostics.
    pub display_name: String,
    /// API collection path (e.g. `"dcim/device-types"`).
    pub endpoint: String,
    /// Filter field holding the slug, if the kind has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug_field: Option<String>,
    /// Filter field holding the name, if the kind has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_field: Option<String>,
    /// Sibling references that narrow text lookups.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope: Vec<ScopeFilter>,
}

impl ObjectDescriptor {
    /// A kind that can only be referenced by ID.
    pub fn id_only(
        object_type: impl Into<String>,
        display_name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            display_name: display_name.into(),
            endpoint: endpoint.into(),
            slug_field: None,
            name_field: None,
            scope: Vec::new(),
        }
    }

    /// A kind with both `slug` and `name` filters.
    pub fn slugged(
        object_type: impl Into<String>,
        display_name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::id_only(object_type, display_name, endpoint)
            .with_slug_field("slug")
            .with_name_field("name")
    }

    /// A kind with a `name` filter and no slug.
    pub fn named(
        object_type: impl Into<String>,
        display_name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::id_only(object_type, display_name, endpoint).with_name_field("name")
    }

    /// Set the slug filter field.
    pub fn with_slug_field(mut self, field: impl Into<String>) -> Self {
        self.slug_field = Some(field.into());
        self
    }

    /// Set the name filter field.
    pub fn with_name_field(mut self, field: impl Into<String>) -> Self {
        self.name_field = Some(field.into());
        self
    }

    /// Narrow text lookups by a sibling reference of type `sibling`.
    pub fn scoped_by(mut self, sibling: impl Into<String>, filter: impl Into<String>) -> Self {
        self.scope.push(ScopeFilter {
            sibling: sibling.into(),
            filter: filter.into(),
        });
        self
    }

    /// The filter field matching a reference kind, if the kind supports it.
    pub fn field_for(&self, kind: ReferenceKind) -> Option<&str> {
        match kind {
            ReferenceKind::Slug => self.slug_field.as_deref(),
            ReferenceKind::Name => self.name_field.as_deref(),
            ReferenceKind::NumericId | ReferenceKind::Unset => None,
        }
    }

    /// The shape text values take when the attribute does not declare one.
    pub fn default_lookup(&self) -> LookupField {
        if self.slug_field.is_some() {
            LookupField::Slug
        } else {
            LookupField::Name
        }
    }

    /// The filter receiving a sibling of type `sibling`, if declared.
    pub fn scope_filter_for(&self, sibling: &str) -> Option<&str> {
        self.scope
            .iter()
            .find(|s| s.sibling == sibling)
            .map(|s| s.filter.as_str())
    }
}

/// The set of object kinds the resolver knows how to look up.
#[derive(Debug, Clone, Default)]
pub struct ObjectRegistry {
    descriptors: HashMap<String, ObjectDescriptor>,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a descriptor.
    pub fn with_descriptor(mut self, descriptor: ObjectDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    /// Add or replace a descriptor in place.
    pub fn insert(&mut self, descriptor: ObjectDescriptor) {
        self.descriptors
            .insert(descriptor.object_type.clone(), descriptor);
    }

    /// Look up a descriptor.
    pub fn get(&self, object_type: &str) -> Option<&ObjectDescriptor> {
        self.descriptors.get(object_type)
    }

    /// Look up a descriptor, failing with [`ResolveError::UnknownObjectType`].
    pub fn require(&self, object_type: &str) -> Result<&ObjectDescriptor, ResolveError> {
        self.get(object_type)
            .ok_or_else(|| ResolveError::UnknownObjectType(object_type.to_string()))
    }

    /// Whether `object_type` is registered.
    pub fn contains(&self, object_type: &str) -> bool {
        self.descriptors.contains_key(object_type)
    }

    /// Registered object types, sorted.
    pub fn object_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of registered kinds.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptors for every object kind the NetBox provider references.
    pub fn netbox() -> Self {
        let descriptors = [
            // dcim
            ObjectDescriptor::slugged("region", "Region", "dcim/regions"),
            ObjectDescriptor::slugged("site_group", "Site group", "dcim/site-groups"),
            ObjectDescriptor::slugged("site", "Site", "dcim/sites"),
            ObjectDescriptor::slugged("location", "Location", "dcim/locations")
                .scoped_by("site", "site_id"),
            ObjectDescriptor::slugged("rack_role", "Rack role", "dcim/rack-roles"),
            ObjectDescriptor::slugged("rack_type", "Rack type", "dcim/rack-types")
                .with_name_field("model")
                .scoped_by("manufacturer", "manufacturer_id"),
            ObjectDescriptor::named("rack", "Rack", "dcim/racks")
                .scoped_by("site", "site_id")
                .scoped_by("location", "location_id"),
            ObjectDescriptor::slugged("manufacturer", "Manufacturer", "dcim/manufacturers"),
            ObjectDescriptor::slugged("device_type", "Device type", "dcim/device-types")
                .with_name_field("model")
                .scoped_by("manufacturer", "manufacturer_id"),
            ObjectDescriptor::id_only("module_type", "Module type", "dcim/module-types")
                .with_name_field("model")
                .scoped_by("manufacturer", "manufacturer_id"),
            ObjectDescriptor::slugged("device_role", "Device role", "dcim/device-roles"),
            ObjectDescriptor::slugged("platform", "Platform", "dcim/platforms"),
            ObjectDescriptor::named("device", "Device", "dcim/devices")
                .scoped_by("site", "site_id"),
            ObjectDescriptor::named("interface", "Interface", "dcim/interfaces")
                .scoped_by("device", "device_id"),
            ObjectDescriptor::named("power_panel", "Power panel", "dcim/power-panels")
                .scoped_by("site", "site_id"),
            ObjectDescriptor::named("power_feed", "Power feed", "dcim/power-feeds")
                .scoped_by("power_panel", "power_panel_id"),
            ObjectDescriptor::named("power_port", "Power port", "dcim/power-ports")
                .scoped_by("device", "device_id"),
            ObjectDescriptor::named("virtual_chassis", "Virtual chassis", "dcim/virtual-chassis"),
            ObjectDescriptor::slugged(
                "inventory_item_role",
                "Inventory item role",
                "dcim/inventory-item-roles",
            ),
            // tenancy
            ObjectDescriptor::slugged("tenant_group", "Tenant group", "tenancy/tenant-groups"),
            ObjectDescriptor::slugged("tenant", "Tenant", "tenancy/tenants"),
            ObjectDescriptor::slugged("contact_group", "Contact group", "tenancy/contact-groups"),
            ObjectDescriptor::slugged("contact_role", "Contact role", "tenancy/contact-roles"),
            ObjectDescriptor::named("contact", "Contact", "tenancy/contacts"),
            // ipam
            ObjectDescriptor::slugged("rir", "RIR", "ipam/rirs"),
            ObjectDescriptor::named("vrf", "VRF", "ipam/vrfs"),
            ObjectDescriptor::named("route_target", "Route target", "ipam/route-targets"),
            ObjectDescriptor::slugged("vlan_group", "VLAN group", "ipam/vlan-groups"),
            ObjectDescriptor::named("vlan", "VLAN", "ipam/vlans")
                .scoped_by("site", "site_id")
                .scoped_by("vlan_group", "group_id"),
            ObjectDescriptor::slugged("role", "Role", "ipam/roles"),
            ObjectDescriptor::id_only("ip_address", "IP address", "ipam/ip-addresses")
                .with_name_field("address")
                .scoped_by("vrf", "vrf_id"),
            ObjectDescriptor::id_only("prefix", "Prefix", "ipam/prefixes")
                .with_name_field("prefix")
                .scoped_by("vrf", "vrf_id"),
            // virtualization
            ObjectDescriptor::slugged(
                "cluster_type",
                "Cluster type",
                "virtualization/cluster-types",
            ),
            ObjectDescriptor::slugged(
                "cluster_group",
                "Cluster group",
                "virtualization/cluster-groups",
            ),
            ObjectDescriptor::named("cluster", "Cluster", "virtualization/clusters")
                .scoped_by("cluster_group", "group_id"),
            ObjectDescriptor::named(
                "virtual_machine",
                "Virtual machine",
                "virtualization/virtual-machines",
            )
            .scoped_by("cluster", "cluster_id"),
            ObjectDescriptor::named("vm_interface", "VM interface", "virtualization/interfaces")
                .scoped_by("virtual_machine", "virtual_machine_id"),
            // circuits
            ObjectDescriptor::slugged("provider", "Provider", "circuits/providers"),
            ObjectDescriptor::id_only(
                "provider_account",
                "Provider account",
                "circuits/provider-accounts",
            )
            .with_name_field("account")
            .scoped_by("provider", "provider_id"),
            ObjectDescriptor::named(
                "provider_network",
                "Provider network",
                "circuits/provider-networks",
            )
            .scoped_by("provider", "provider_id"),
            ObjectDescriptor::slugged("circuit_type", "Circuit type", "circuits/circuit-types"),
            ObjectDescriptor::id_only("circuit", "Circuit", "circuits/circuits")
                .with_name_field("cid")
                .scoped_by("provider", "provider_id"),
            ObjectDescriptor::slugged("circuit_group", "Circuit group", "circuits/circuit-groups"),
            // wireless
            ObjectDescriptor::slugged(
                "wireless_lan_group",
                "Wireless LAN group",
                "wireless/wireless-lan-groups",
            ),
            ObjectDescriptor::id_only("wireless_lan", "Wireless LAN", "wireless/wireless-lans")
                .with_name_field("ssid"),
            // vpn
            ObjectDescriptor::slugged("tunnel_group", "Tunnel group", "vpn/tunnel-groups"),
            ObjectDescriptor::named("tunnel", "Tunnel", "vpn/tunnels"),
            ObjectDescriptor::named("ike_policy", "IKE policy", "vpn/ike-policies"),
            ObjectDescriptor::named("ike_proposal", "IKE proposal", "vpn/ike-proposals"),
            ObjectDescriptor::named("ipsec_policy", "IPSec policy", "vpn/ipsec-policies"),
            ObjectDescriptor::named("ipsec_profile", "IPSec profile", "vpn/ipsec-profiles"),
            ObjectDescriptor::named("ipsec_proposal", "IPSec proposal", "vpn/ipsec-proposals"),
            ObjectDescriptor::slugged("l2vpn", "L2VPN", "vpn/l2vpns"),
            // extras
            ObjectDescriptor::slugged("tag", "Tag", "extras/tags"),
            ObjectDescriptor::named(
                "config_template",
                "Config template",
                "extras/config-templates",
            ),
            ObjectDescriptor::named(
                "custom_field_choice_set",
                "Custom field choice set",
                "extras/custom-field-choice-sets",
            ),
            ObjectDescriptor::named(
                "notification_group",
                "Notification group",
                "extras/notification-groups",
            ),
            // users
            ObjectDescriptor::id_only("user", "User", "users/users").with_name_field("username"),
        ];

        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.insert(descriptor);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_constructors() {
        let site = ObjectDescriptor::slugged("site", "Site", "dcim/sites");
        assert_eq!(site.slug_field.as_deref(), Some("slug"));
        assert_eq!(site.name_field.as_deref(), Some("name"));
        assert_eq!(site.default_lookup(), LookupField::Slug);

        let vrf = ObjectDescriptor::named("vrf", "VRF", "ipam/vrfs");
        assert!(vrf.slug_field.is_none());
        assert_eq!(vrf.default_lookup(), LookupField::Name);

        let asn = ObjectDescriptor::id_only("asn", "ASN", "ipam/asns");
        assert!(asn.field_for(ReferenceKind::Slug).is_none());
        assert!(asn.field_for(ReferenceKind::Name).is_none());
    }

    #[test]
    fn test_field_for_kind() {
        let device_type = ObjectRegistry::netbox().require("device_type").unwrap().clone();
        assert_eq!(device_type.field_for(ReferenceKind::Slug), Some("slug"));
        assert_eq!(device_type.field_for(ReferenceKind::Name), Some("model"));
        assert_eq!(device_type.field_for(ReferenceKind::NumericId), None);
    }

    #[test]
    fn test_scope_filters() {
        let registry = ObjectRegistry::netbox();
        let rack = registry.require("rack").unwrap();
        assert_eq!(rack.scope_filter_for("site"), Some("site_id"));
        assert_eq!(rack.scope_filter_for("location"), Some("location_id"));
        assert_eq!(rack.scope_filter_for("tenant"), None);

        let vlan = registry.require("vlan").unwrap();
        assert_eq!(vlan.scope_filter_for("vlan_group"), Some("group_id"));
    }

    #[test]
    fn test_unknown_object_type() {
        let registry = ObjectRegistry::netbox();
        let err = registry.require("widget").unwrap_err();
        assert_eq!(err, ResolveError::UnknownObjectType("widget".to_string()));
    }

    #[test]
    fn test_with_descriptor_overrides() {
        let registry = ObjectRegistry::netbox()
            .with_descriptor(ObjectDescriptor::id_only("site", "Site", "dcim/sites"));
        assert!(registry.require("site").unwrap().slug_field.is_none());
    }

    #[test]
    fn test_netbox_registry_covers_common_kinds() {
        let registry = ObjectRegistry::netbox();
        for kind in [
            "site", "tenant", "rack", "vlan", "vrf", "device", "device_type", "rir", "cluster",
            "virtual_machine", "provider_account", "interface", "user",
        ] {
            assert!(registry.contains(kind), "missing {kind}");
        }
        assert!(registry.len() > 40);
        let types = registry.object_types();
        let mut sorted = types.clone();
        sorted.sort_unstable();
        assert_eq!(types, sorted);
    }
}
