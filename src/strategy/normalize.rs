//! In-place normalization of a Jaeger CR
//!
//! Every rule is idempotent: normalizing a normalized CR changes nothing.

use serde_json::{json, Value};
use tracing::warn;

use super::{DeploymentStrategy, StorageType};
use crate::builders::{elasticsearch, ingress, jobs};
use crate::capabilities::CapabilitySnapshot;
use crate::config::OperatorConfig;
use crate::crd::Jaeger;

/// Name given to an instance created without one
pub const DEFAULT_NAME: &str = "my-jaeger";

const DEPRECATED_ALL_IN_ONE: &str = "all-in-one";

/// Normalize `jaeger` and return the strategy to build
pub fn normalize(
    jaeger: &mut Jaeger,
    caps: &CapabilitySnapshot,
    config: &OperatorConfig,
) -> DeploymentStrategy {
    if jaeger.metadata.name.as_deref().unwrap_or_default().is_empty() {
        jaeger.metadata.name = Some(DEFAULT_NAME.to_string());
    }

    let storage = normalize_storage(jaeger);
    let mut strategy = normalize_strategy(jaeger);
    if storage == StorageType::Memory && strategy != DeploymentStrategy::AllInOne {
        warn!(%strategy, "In-memory storage only supports the allInOne strategy");
        strategy = DeploymentStrategy::AllInOne;
    }
    jaeger.spec.strategy = strategy.as_str().to_string();

    normalize_security(jaeger, caps);

    let es_provisioned =
        strategy != DeploymentStrategy::AllInOne && elasticsearch::should_provision(jaeger, caps);
    normalize_jobs(jaeger, storage, es_provisioned, config);
    normalize_ui(jaeger, storage);

    strategy
}

fn normalize_storage(jaeger: &mut Jaeger) -> StorageType {
    let raw = &jaeger.spec.storage.storage_type;
    let storage = match StorageType::parse(raw) {
        Some(storage) => storage,
        None => {
            warn!(storage = %raw, "Missing or unknown storage type, falling back to memory");
            StorageType::Memory
        }
    };
    jaeger.spec.storage.storage_type = storage.as_str().to_string();
    storage
}

fn normalize_strategy(jaeger: &Jaeger) -> DeploymentStrategy {
    let raw = jaeger.spec.strategy.as_str();
    let (strategy, fell_back) = DeploymentStrategy::parse(raw);
    if fell_back {
        if raw.eq_ignore_ascii_case(DEPRECATED_ALL_IN_ONE) {
            warn!("Strategy 'all-in-one' is deprecated, use 'allInOne'");
        } else if !raw.is_empty() {
            warn!(strategy = %raw, "Unknown strategy, falling back to allInOne");
        }
    }
    strategy
}

/// OAuth proxy on OpenShift unless explicitly disabled; nothing elsewhere
fn normalize_security(jaeger: &mut Jaeger, caps: &CapabilitySnapshot) {
    let security = &mut jaeger.spec.ingress.security;
    if caps.is_openshift() {
        if security.as_str() != ingress::SECURITY_NONE {
            *security = ingress::SECURITY_OAUTH_PROXY.to_string();
        }
    } else if security.as_str() != ingress::SECURITY_NONE {
        if security.as_str() == ingress::SECURITY_OAUTH_PROXY {
            warn!("OAuth proxy is only available on OpenShift, disabling ingress security");
        }
        *security = ingress::SECURITY_NONE.to_string();
    }
}

fn normalize_jobs(
    jaeger: &mut Jaeger,
    storage: StorageType,
    es_provisioned: bool,
    config: &OperatorConfig,
) {
    let spec = &mut jaeger.spec.storage;
    let es = storage == StorageType::Elasticsearch;

    let deps = &mut spec.dependencies;
    if deps.enabled.is_none() && (storage == StorageType::Cassandra || es) && !es_provisioned {
        deps.enabled = Some(true);
    }
    if deps.enabled == Some(true) {
        deps.image
            .get_or_insert_with(|| config.spark_dependencies_image.clone());
        deps.schedule
            .get_or_insert_with(|| jobs::DEFAULT_DEPENDENCIES_SCHEDULE.to_string());
    }
    apply_es_tls_defaults(jaeger);

    let aliases = jobs::uses_es_aliases(jaeger);
    let spec = &mut jaeger.spec.storage;
    if es {
        let cleaner = &mut spec.es_index_cleaner;
        cleaner.enabled.get_or_insert(true);
        if cleaner.enabled == Some(true) {
            cleaner
                .image
                .get_or_insert_with(|| config.versioned(&config.es_index_cleaner_image));
            cleaner
                .schedule
                .get_or_insert_with(|| jobs::DEFAULT_INDEX_CLEANER_SCHEDULE.to_string());
            cleaner
                .number_of_days
                .get_or_insert(jobs::DEFAULT_INDEX_CLEANER_DAYS);
        }

        if aliases {
            let rollover = &mut spec.es_rollover;
            rollover
                .image
                .get_or_insert_with(|| config.versioned(&config.es_rollover_image));
            rollover
                .schedule
                .get_or_insert_with(|| jobs::DEFAULT_ROLLOVER_SCHEDULE.to_string());
        }
    }

    if storage == StorageType::Cassandra {
        let schema = &mut spec.cassandra_create_schema;
        schema.enabled.get_or_insert(true);
        if schema.enabled == Some(true) {
            schema
                .image
                .get_or_insert_with(|| config.versioned(&config.cassandra_schema_image));
        }
    }
}

/// A CA without an explicit host verification choice means "verify"
pub(super) fn apply_es_tls_defaults(jaeger: &mut Jaeger) {
    let options = &mut jaeger.spec.storage.options;
    if options.get("es.tls.enabled") == Some("true")
        && options.contains("es.tls.ca")
        && !options.contains("es.tls.skip-host-verify")
    {
        options.set("es.tls.skip-host-verify", "false");
    }
}

fn normalize_ui(jaeger: &mut Jaeger, storage: StorageType) {
    let archive = {
        let options = &jaeger.spec.storage.options;
        options.has_prefix("es-archive.") || options.has_prefix("cassandra-archive.")
    };
    let deps_enabled = jaeger.spec.storage.dependencies.enabled == Some(true);
    let ui = &mut jaeger.spec.ui.options;

    if archive && !ui.contains_key("archiveEnabled") {
        ui.insert("archiveEnabled".to_string(), Value::Bool(true));
    }

    if storage != StorageType::Memory && !deps_enabled {
        let dependencies = ui
            .entry("dependencies".to_string())
            .or_insert_with(|| json!({}));
        if let Value::Object(menu) = dependencies {
            menu.entry("menuEnabled".to_string())
                .or_insert(Value::Bool(false));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Platform;
    use crate::crd::JaegerSpec;

    fn jaeger(strategy: &str, storage: &str) -> Jaeger {
        let mut spec = JaegerSpec {
            strategy: strategy.to_string(),
            ..Default::default()
        };
        spec.storage.storage_type = storage.to_string();
        Jaeger::new("demo", spec)
    }

    fn run(jaeger: &mut Jaeger, caps: CapabilitySnapshot) -> DeploymentStrategy {
        normalize(jaeger, &caps, &OperatorConfig::default())
    }

    #[test]
    fn memory_forces_all_in_one() {
        let mut cr = jaeger("production", "memory");
        assert_eq!(run(&mut cr, Default::default()), DeploymentStrategy::AllInOne);
        assert_eq!(cr.spec.strategy, "allInOne");
    }

    #[test]
    fn unknown_storage_becomes_memory() {
        let mut cr = jaeger("production", "unknown");
        assert_eq!(run(&mut cr, Default::default()), DeploymentStrategy::AllInOne);
        assert_eq!(cr.spec.storage.storage_type, "memory");
    }

    #[test]
    fn deprecated_alias_maps_to_all_in_one() {
        let mut cr = jaeger("all-in-one", "memory");
        assert_eq!(run(&mut cr, Default::default()), DeploymentStrategy::AllInOne);
    }

    #[test]
    fn empty_name_gets_default() {
        let mut cr = jaeger("", "");
        cr.metadata.name = None;
        run(&mut cr, Default::default());
        assert_eq!(cr.metadata.name.as_deref(), Some(DEFAULT_NAME));
    }

    #[test]
    fn security_follows_platform() {
        let openshift = CapabilitySnapshot {
            platform: Platform::OpenShift,
            ..Default::default()
        };

        let mut cr = jaeger("allInOne", "memory");
        run(&mut cr, openshift);
        assert_eq!(cr.spec.ingress.security, "oauth-proxy");

        let mut cr = jaeger("allInOne", "memory");
        cr.spec.ingress.security = "none".to_string();
        run(&mut cr, openshift);
        assert_eq!(cr.spec.ingress.security, "none");

        let mut cr = jaeger("allInOne", "memory");
        cr.spec.ingress.security = "oauth-proxy".to_string();
        run(&mut cr, Default::default());
        assert_eq!(cr.spec.ingress.security, "none");
    }

    #[test]
    fn elasticsearch_jobs_get_defaults() {
        let mut cr = jaeger("production", "elasticsearch");
        cr.spec
            .storage
            .options
            .set("es.server-urls", "https://es:9200");
        cr.spec.storage.options.set("es.tls.enabled", "true");
        cr.spec.storage.options.set("es.tls.ca", "/ca.crt");
        run(&mut cr, Default::default());

        let storage = &cr.spec.storage;
        assert_eq!(storage.dependencies.enabled, Some(true));
        assert_eq!(
            storage.dependencies.schedule.as_deref(),
            Some(jobs::DEFAULT_DEPENDENCIES_SCHEDULE)
        );
        assert_eq!(storage.es_index_cleaner.enabled, Some(true));
        assert_eq!(storage.es_index_cleaner.number_of_days, Some(7));
        assert!(storage.es_rollover.image.is_none());
        assert!(storage.es_rollover.schedule.is_none());
        assert_eq!(storage.options.get("es.tls.skip-host-verify"), Some("false"));
        assert!(cr.spec.ui.options.get("dependencies").is_none());
    }

    #[test]
    fn rollover_defaults_only_with_aliases() {
        let mut cr = jaeger("production", "elasticsearch");
        cr.spec
            .storage
            .options
            .set("es.server-urls", "https://es:9200");
        cr.spec.storage.options.set("es.use-aliases", "true");
        run(&mut cr, Default::default());

        let rollover = &cr.spec.storage.es_rollover;
        assert_eq!(
            rollover.schedule.as_deref(),
            Some(jobs::DEFAULT_ROLLOVER_SCHEDULE)
        );
        assert!(rollover.image.is_some());
    }

    #[test]
    fn provisioned_elasticsearch_disables_dependencies_and_menu() {
        let caps = CapabilitySnapshot {
            es_provisioning_enabled: true,
            ..Default::default()
        };
        let mut cr = jaeger("production", "elasticsearch");
        run(&mut cr, caps);

        assert_eq!(cr.spec.storage.dependencies.enabled, None);
        assert_eq!(
            cr.spec.ui.options["dependencies"],
            json!({ "menuEnabled": false })
        );
    }

    #[test]
    fn explicit_ui_values_are_respected() {
        let mut cr = jaeger("production", "elasticsearch");
        cr.spec.storage.options.set("es-archive.server-urls", "http://archive:9200");
        cr.spec.storage.dependencies.enabled = Some(false);
        cr.spec
            .ui
            .options
            .insert("archiveEnabled".to_string(), json!(false));
        cr.spec
            .ui
            .options
            .insert("dependencies".to_string(), json!({ "menuEnabled": true }));
        run(&mut cr, Default::default());

        assert_eq!(cr.spec.ui.options["archiveEnabled"], json!(false));
        assert_eq!(cr.spec.ui.options["dependencies"]["menuEnabled"], json!(true));
    }

    #[test]
    fn archive_options_enable_archive() {
        let mut cr = jaeger("production", "cassandra");
        cr.spec
            .storage
            .options
            .set("cassandra-archive.servers", "cassandra-archive");
        run(&mut cr, Default::default());

        assert_eq!(cr.spec.ui.options["archiveEnabled"], json!(true));
        assert_eq!(cr.spec.storage.cassandra_create_schema.enabled, Some(true));
    }

    #[test]
    fn normalization_is_idempotent() {
        let caps = CapabilitySnapshot {
            platform: Platform::OpenShift,
            es_provisioning_enabled: true,
            ..Default::default()
        };
        let mut cr = jaeger("Production", "Elasticsearch");
        cr.spec.storage.options.set("es-archive.server-urls", "http://a:9200");
        run(&mut cr, caps);
        let once = cr.clone();
        run(&mut cr, caps);
        assert_eq!(once, cr);
    }
}
