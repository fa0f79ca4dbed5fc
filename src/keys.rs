//! KV tree layout. Every key under `/ns`, `/config` and `/label` is built
//! here so the hierarchy is defined exactly once.

use crate::resource::ResourceKind;

pub fn ns_key(ns_id: &str) -> String {
    format!("/ns/{ns_id}")
}

pub fn ns_prefix(ns_id: &str) -> String {
    format!("/ns/{ns_id}/")
}

pub fn resource_kind_prefix(ns_id: &str, kind: ResourceKind) -> String {
    format!("/ns/{ns_id}/resources/{kind}")
}

pub fn resource_key(ns_id: &str, kind: ResourceKind, resource_id: &str) -> String {
    format!("/ns/{ns_id}/resources/{kind}/{resource_id}")
}

pub fn mcis_prefix(ns_id: &str) -> String {
    format!("/ns/{ns_id}/mcis")
}

pub fn mcis_key(ns_id: &str, mcis_id: &str) -> String {
    format!("/ns/{ns_id}/mcis/{mcis_id}")
}

pub fn vm_prefix(ns_id: &str, mcis_id: &str) -> String {
    format!("/ns/{ns_id}/mcis/{mcis_id}/vm")
}

pub fn vm_key(ns_id: &str, mcis_id: &str, vm_id: &str) -> String {
    format!("/ns/{ns_id}/mcis/{mcis_id}/vm/{vm_id}")
}

pub fn cluster_prefix(ns_id: &str) -> String {
    format!("/ns/{ns_id}/cluster")
}

pub fn cluster_key(ns_id: &str, cluster_id: &str) -> String {
    format!("/ns/{ns_id}/cluster/{cluster_id}")
}

pub fn config_key(config_id: &str) -> String {
    format!("/config/{config_id}")
}

pub const CONFIG_PREFIX: &str = "/config";

pub fn label_key(kind: &str, uuid: &str) -> String {
    format!("/label/{kind}/{uuid}")
}

pub const LABEL_PREFIX: &str = "/label";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    #[test]
    fn test_keys_mirror_object_hierarchy() {
        // setup & execute & verify:
        assert_eq!("/ns/ns01", ns_key("ns01"));
        assert_eq!("/ns/ns01/resources/vNet/vnet1", resource_key("ns01", ResourceKind::VNet, "vnet1"));
        assert_eq!("/ns/ns01/mcis/m1", mcis_key("ns01", "m1"));
        assert_eq!("/ns/ns01/mcis/m1/vm/vm1", vm_key("ns01", "m1", "vm1"));
        assert_eq!("/ns/ns01/cluster/c1", cluster_key("ns01", "c1"));
        assert_eq!("/config/SPIDER_REST_URL", config_key("SPIDER_REST_URL"));
        assert_eq!("/label/vNet/abc", label_key("vNet", "abc"));
    }
}
