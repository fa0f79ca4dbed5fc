//! Config store and label index scenarios.

mod common;

use common::{harness, mcis_req, seed_namespace, vm_req, CONN};
use mcis_engine::config::{self, ConfigKey};
use mcis_engine::errors::OrchestratorError;
use mcis_engine::{label, mcis};
use std::collections::BTreeMap;

#[test]
fn config_update_refreshes_the_mirror_and_survives_restart() {
    // S5: the driver URL override lands in the mirror and in the store
    let h = harness();

    config::update(h.ctx.kv(), h.ctx.settings(), "SPIDER_REST_URL", "http://x:1").unwrap();
    assert_eq!("http://x:1", h.ctx.settings().spider_rest_url());

    let listed = config::list(h.ctx.kv()).unwrap();
    assert_eq!(1, listed.len());
    assert_eq!("SPIDER_REST_URL", listed[0].id);
    assert_eq!("http://x:1", listed[0].value);

    // a fresh mirror (process restart) picks the persisted value back up
    let fresh = config::RuntimeSettings::new();
    config::init_settings_from_store(h.ctx.kv(), &fresh).unwrap();
    assert_eq!("http://x:1", fresh.spider_rest_url());
}

#[test]
fn config_rejects_keys_outside_the_allow_list() {
    let h = harness();

    let result = config::update(h.ctx.kv(), h.ctx.settings(), "SOME_RANDOM_KEY", "x");
    assert!(matches!(result, Err(OrchestratorError::Validation { .. })));

    let missing = config::get(h.ctx.kv(), "DB_URL");
    assert!(matches!(missing, Err(OrchestratorError::ConfigNotFound { .. })));
}

#[test]
fn autocontrol_interval_is_config_driven() {
    let h = harness();

    config::update(h.ctx.kv(), h.ctx.settings(), "AUTOCONTROL_DURATION_MS", "1234").unwrap();
    assert_eq!(
        std::time::Duration::from_millis(1234),
        h.ctx.settings().autocontrol_duration()
    );
    assert_eq!(Some("1234".to_string()), h.ctx.settings().get(ConfigKey::AutocontrolDurationMs));
}

#[test]
fn label_index_tracks_mcis_and_survives_lost_entries() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let mut req = mcis_req("m1", vec![vm_req("web", 1, CONN, "1")]);
    req.label = BTreeMap::from([("env".to_string(), "prod".to_string())]);
    let created = mcis::create_mcis(&h.ctx, "ns-a", &req).unwrap();

    let found = label::find_by_label(h.ctx.kv(), "env", "prod").unwrap();
    assert_eq!(1, found.len());
    assert_eq!("/ns/ns-a/mcis/m1", found[0].primary_key);

    // lose the index entry; the next read re-asserts it
    label::remove(h.ctx.kv(), "mcis", &created.uuid).unwrap();
    assert!(label::find_by_label(h.ctx.kv(), "env", "prod").unwrap().is_empty());

    mcis::get_mcis(&h.ctx, "ns-a", "m1").unwrap();
    let reasserted = label::find_by_label(h.ctx.kv(), "env", "prod").unwrap();
    assert_eq!(1, reasserted.len());
}
