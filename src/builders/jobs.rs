//! Auxiliary storage jobs
//!
//! Cron jobs keep the span store healthy (dependency links, index cleanup,
//! rollover). The blocking jobs prepare the store and must finish before any
//! component that writes to it starts.

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, Job, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, EnvVar, PodSpec, PodTemplateSpec, SecretEnvSource,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{child_name, BuildContext};
use crate::crd::Jaeger;
use crate::labels;

pub const DEFAULT_DEPENDENCIES_SCHEDULE: &str = "55 23 * * *";
pub const DEFAULT_INDEX_CLEANER_SCHEDULE: &str = "55 23 * * *";
pub const DEFAULT_ROLLOVER_SCHEDULE: &str = "0 0 * * *";
pub const DEFAULT_INDEX_CLEANER_DAYS: i32 = 7;

const DEFAULT_ES_URL: &str = "http://elasticsearch:9200";
const DEFAULT_CASSANDRA_HOST: &str = "cassandra";

/// Whether the index aliases used by rollover are enabled
pub fn uses_es_aliases(jaeger: &Jaeger) -> bool {
    jaeger.spec.storage.options.get("es.use-aliases") == Some("true")
}

/// Spark job computing the service dependency graph
pub fn spark_dependencies(jaeger: &Jaeger, ctx: &BuildContext) -> CronJob {
    let storage = &jaeger.spec.storage;
    let options = &storage.options;
    let mut env = vec![var("STORAGE", &storage.storage_type)];

    match storage.storage_type.as_str() {
        "cassandra" => {
            env.push(var(
                "CASSANDRA_CONTACT_POINTS",
                options.get("cassandra.servers").unwrap_or(DEFAULT_CASSANDRA_HOST),
            ));
            if let Some(keyspace) = options.get("cassandra.keyspace") {
                env.push(var("CASSANDRA_KEYSPACE", keyspace));
            }
            if let Some(user) = options.get("cassandra.username") {
                env.push(var("CASSANDRA_USERNAME", user));
            }
            if let Some(password) = options.get("cassandra.password") {
                env.push(var("CASSANDRA_PASSWORD", password));
            }
        }
        _ => {
            env.push(var("ES_NODES", es_urls(jaeger)));
            if let Some(prefix) = options.get("es.index-prefix") {
                env.push(var("ES_INDEX_PREFIX", prefix));
            }
            if let Some(user) = options.get("es.username") {
                env.push(var("ES_USERNAME", user));
            }
            if let Some(password) = options.get("es.password") {
                env.push(var("ES_PASSWORD", password));
            }
            if uses_es_aliases(jaeger) {
                env.push(var("ES_USE_ALIASES", "true"));
            }
            if let Some(skip) = options.get("es.tls.skip-host-verify") {
                env.push(var("ES_NODES_WAN_ONLY", "false"));
                env.push(var("ES_TLS_SKIP_HOST_VERIFY", skip));
            }
        }
    }
    if let Some(java_opts) = &storage.dependencies.java_opts {
        env.push(var("JAVA_OPTS", java_opts));
    }

    cron_job(
        jaeger,
        ctx,
        "spark-dependencies",
        storage
            .dependencies
            .schedule
            .as_deref()
            .unwrap_or(DEFAULT_DEPENDENCIES_SCHEDULE),
        storage
            .dependencies
            .image
            .clone()
            .unwrap_or_else(|| ctx.config.spark_dependencies_image.clone()),
        Vec::new(),
        env,
    )
}

/// Removes indices older than `numberOfDays`
pub fn es_index_cleaner(jaeger: &Jaeger, ctx: &BuildContext) -> CronJob {
    let cleaner = &jaeger.spec.storage.es_index_cleaner;
    let days = cleaner.number_of_days.unwrap_or(DEFAULT_INDEX_CLEANER_DAYS);

    let mut env = es_env(jaeger);
    if uses_es_aliases(jaeger) {
        env.push(var("ROLLOVER", "true"));
    }

    cron_job(
        jaeger,
        ctx,
        "es-index-cleaner",
        cleaner
            .schedule
            .as_deref()
            .unwrap_or(DEFAULT_INDEX_CLEANER_SCHEDULE),
        cleaner
            .image
            .clone()
            .unwrap_or_else(|| ctx.config.versioned(&ctx.config.es_index_cleaner_image)),
        vec![days.to_string(), es_urls(jaeger)],
        env,
    )
}

/// Rollover and lookback jobs maintaining the write and read aliases
pub fn es_rollover(jaeger: &Jaeger, ctx: &BuildContext) -> Vec<CronJob> {
    let rollover = &jaeger.spec.storage.es_rollover;
    let schedule = rollover
        .schedule
        .as_deref()
        .unwrap_or(DEFAULT_ROLLOVER_SCHEDULE);
    let image = rollover_image(jaeger, ctx);

    let mut rollover_env = es_env(jaeger);
    if let Some(conditions) = &rollover.conditions {
        rollover_env.push(var("CONDITIONS", conditions));
    }

    let mut lookback_env = es_env(jaeger);
    if let Some((unit, count)) = rollover.read_ttl.as_deref().and_then(parse_ttl) {
        lookback_env.push(var("UNIT", unit));
        lookback_env.push(var("UNIT_COUNT", count.to_string()));
    }

    vec![
        cron_job(
            jaeger,
            ctx,
            "es-rollover",
            schedule,
            image.clone(),
            vec!["rollover".to_string(), es_urls(jaeger)],
            rollover_env,
        ),
        cron_job(
            jaeger,
            ctx,
            "es-lookback",
            schedule,
            image,
            vec!["lookback".to_string(), es_urls(jaeger)],
            lookback_env,
        ),
    ]
}

/// Creates the rollover indices and aliases; blocks the reconcile until done
pub fn es_rollover_init(jaeger: &Jaeger, ctx: &BuildContext) -> Job {
    let options = &jaeger.spec.storage.options;
    let mut env = es_env(jaeger);
    if let Some(shards) = options.get("es.num-shards") {
        env.push(var("SHARDS", shards));
    }
    if let Some(replicas) = options.get("es.num-replicas") {
        env.push(var("REPLICAS", replicas));
    }

    job(
        jaeger,
        ctx,
        "es-rollover-create-mapping",
        rollover_image(jaeger, ctx),
        vec!["init".to_string(), es_urls(jaeger)],
        env,
        None,
    )
}

/// Creates the Cassandra keyspace and tables; blocks the reconcile until done
pub fn cassandra_schema(jaeger: &Jaeger, ctx: &BuildContext) -> Job {
    let storage = &jaeger.spec.storage;
    let spec = &storage.cassandra_create_schema;
    let datacenter = spec.datacenter.as_deref().unwrap_or("test");
    let keyspace = storage
        .options
        .get("cassandra.keyspace")
        .map(str::to_string)
        .unwrap_or_else(|| format!("jaeger_v1_{}", datacenter.replace('-', "_")));

    let env = vec![
        var(
            "CQLSH_HOST",
            storage
                .options
                .get("cassandra.servers")
                .unwrap_or(DEFAULT_CASSANDRA_HOST),
        ),
        var("MODE", spec.mode.as_deref().unwrap_or("prod")),
        var("DATACENTER", datacenter),
        var("KEYSPACE", keyspace),
    ];

    job(
        jaeger,
        ctx,
        "cassandra-schema-job",
        spec.image
            .clone()
            .unwrap_or_else(|| ctx.config.versioned(&ctx.config.cassandra_schema_image)),
        Vec::new(),
        env,
        spec.timeout_seconds,
    )
}

fn rollover_image(jaeger: &Jaeger, ctx: &BuildContext) -> String {
    jaeger
        .spec
        .storage
        .es_rollover
        .image
        .clone()
        .unwrap_or_else(|| ctx.config.versioned(&ctx.config.es_rollover_image))
}

fn es_urls(jaeger: &Jaeger) -> String {
    jaeger
        .spec
        .storage
        .options
        .get("es.server-urls")
        .unwrap_or(DEFAULT_ES_URL)
        .to_string()
}

fn es_env(jaeger: &Jaeger) -> Vec<EnvVar> {
    let options = &jaeger.spec.storage.options;
    let mut env = Vec::new();
    if let Some(prefix) = options.get("es.index-prefix") {
        env.push(var("INDEX_PREFIX", prefix));
    }
    if let Some(user) = options.get("es.username") {
        env.push(var("ES_USERNAME", user));
    }
    if let Some(password) = options.get("es.password") {
        env.push(var("ES_PASSWORD", password));
    }
    if options.get("es.tls.enabled") == Some("true") {
        env.push(var("ES_TLS", "true"));
        if let Some(ca) = options.get("es.tls.ca") {
            env.push(var("ES_TLS_CA", ca));
        }
        if let Some(cert) = options.get("es.tls.cert") {
            env.push(var("ES_TLS_CERT", cert));
        }
        if let Some(key) = options.get("es.tls.key") {
            env.push(var("ES_TLS_KEY", key));
        }
    }
    env
}

/// Split a TTL such as `48h` into the lookback unit and count
fn parse_ttl(ttl: &str) -> Option<(&'static str, u64)> {
    let ttl = ttl.trim();
    let split = ttl.find(|c: char| !c.is_ascii_digit())?;
    let (count, unit) = ttl.split_at(split);
    let count: u64 = count.parse().ok()?;
    let unit = match unit {
        "s" => "seconds",
        "m" => "minutes",
        "h" => "hours",
        "d" => "days",
        _ => return None,
    };
    Some((unit, count))
}

fn var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

#[allow(clippy::too_many_arguments)]
fn pod_template(
    jaeger: &Jaeger,
    ctx: &BuildContext,
    name: &str,
    component: &str,
    image: String,
    args: Vec<String>,
    env: Vec<EnvVar>,
    restart_policy: &str,
) -> PodTemplateSpec {
    let env_from = jaeger.spec.storage.secret_name.as_ref().map(|secret| {
        vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: secret.clone(),
                optional: None,
            }),
            ..Default::default()
        }]
    });

    let spec = &jaeger.spec;
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels::component_labels(
                jaeger,
                &ctx.config.identity,
                name,
                component,
            )),
            annotations: (!spec.annotations.is_empty()).then(|| spec.annotations.clone()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: name.to_string(),
                image: Some(image),
                args: (!args.is_empty()).then_some(args),
                env: Some(env),
                env_from,
                volume_mounts: (!spec.volume_mounts.is_empty()).then(|| spec.volume_mounts.clone()),
                ..Default::default()
            }],
            volumes: (!spec.volumes.is_empty()).then(|| spec.volumes.clone()),
            restart_policy: Some(restart_policy.to_string()),
            service_account_name: Some(super::service_account_name(jaeger)),
            ..Default::default()
        }),
    }
}

fn cron_job(
    jaeger: &Jaeger,
    ctx: &BuildContext,
    suffix: &str,
    schedule: &str,
    image: String,
    args: Vec<String>,
    env: Vec<EnvVar>,
) -> CronJob {
    let name = child_name(jaeger, suffix);
    let component = format!("cronjob-{}", suffix);
    CronJob {
        metadata: ctx.meta(jaeger, &name, &component),
        spec: Some(CronJobSpec {
            schedule: schedule.to_string(),
            concurrency_policy: Some("Forbid".to_string()),
            successful_jobs_history_limit: Some(1),
            failed_jobs_history_limit: Some(1),
            job_template: JobTemplateSpec {
                metadata: None,
                spec: Some(JobSpec {
                    parallelism: Some(1),
                    template: pod_template(
                        jaeger, ctx, &name, &component, image, args, env, "OnFailure",
                    ),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn job(
    jaeger: &Jaeger,
    ctx: &BuildContext,
    suffix: &str,
    image: String,
    args: Vec<String>,
    env: Vec<EnvVar>,
    active_deadline_seconds: Option<i64>,
) -> Job {
    let name = child_name(jaeger, suffix);
    let component = format!("job-{}", suffix);
    Job {
        metadata: ctx.meta(jaeger, &name, &component),
        spec: Some(JobSpec {
            active_deadline_seconds,
            template: pod_template(jaeger, ctx, &name, &component, image, args, env, "OnFailure"),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use kube::ResourceExt;

    use super::*;
    use crate::capabilities::CapabilitySnapshot;
    use crate::config::OperatorConfig;

    fn es_jaeger() -> Jaeger {
        let mut jaeger = Jaeger::new("demo", Default::default());
        jaeger.spec.storage.storage_type = "elasticsearch".to_string();
        jaeger.spec.storage.options.set("es.server-urls", "https://es:9200");
        jaeger.spec.storage.options.set("es.use-aliases", "true");
        jaeger.spec.storage.es_rollover.read_ttl = Some("48h".to_string());
        jaeger
    }

    fn env_of(template: &PodTemplateSpec, name: &str) -> Option<String> {
        template.spec.as_ref()?.containers[0]
            .env
            .as_ref()?
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.value.clone())
    }

    #[test]
    fn ttl_parsing() {
        assert_eq!(parse_ttl("48h"), Some(("hours", 48)));
        assert_eq!(parse_ttl("7d"), Some(("days", 7)));
        assert_eq!(parse_ttl("h"), None);
        assert_eq!(parse_ttl("12w"), None);
    }

    #[test]
    fn rollover_produces_rollover_and_lookback() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let jobs = es_rollover(&es_jaeger(), &ctx);

        let names: Vec<String> = jobs.iter().map(|j| j.name_any()).collect();
        assert_eq!(names, vec!["demo-es-rollover", "demo-es-lookback"]);

        let lookback = &jobs[1].spec.as_ref().unwrap().job_template;
        let template = &lookback.spec.as_ref().unwrap().template;
        assert_eq!(env_of(template, "UNIT").as_deref(), Some("hours"));
        assert_eq!(env_of(template, "UNIT_COUNT").as_deref(), Some("48"));
        assert_eq!(jobs[0].spec.as_ref().unwrap().schedule, DEFAULT_ROLLOVER_SCHEDULE);
    }

    #[test]
    fn cassandra_schema_job_carries_deadline() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let mut jaeger = Jaeger::new("demo", Default::default());
        jaeger.spec.storage.storage_type = "cassandra".to_string();
        jaeger.spec.storage.cassandra_create_schema.timeout_seconds = Some(600);
        jaeger.spec.storage.cassandra_create_schema.datacenter = Some("dc-1".to_string());

        let job = cassandra_schema(&jaeger, &ctx);
        assert_eq!(job.name_any(), "demo-cassandra-schema-job");
        let spec = job.spec.unwrap();
        assert_eq!(spec.active_deadline_seconds, Some(600));
        assert_eq!(env_of(&spec.template, "KEYSPACE").as_deref(), Some("jaeger_v1_dc_1"));
        assert_eq!(env_of(&spec.template, "CQLSH_HOST").as_deref(), Some("cassandra"));
    }

    #[test]
    fn index_cleaner_defaults() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let cron = es_index_cleaner(&es_jaeger(), &ctx);
        let spec = cron.spec.unwrap();
        assert_eq!(spec.schedule, DEFAULT_INDEX_CLEANER_SCHEDULE);
        let container = &spec.job_template.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(
            container.args.as_ref().unwrap(),
            &vec!["7".to_string(), "https://es:9200".to_string()]
        );
    }
}
