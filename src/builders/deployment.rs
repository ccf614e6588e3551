//! Deployments for the Jaeger components

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvFromSource, EnvVar, HTTPGetAction,
    PodSpec, PodTemplateSpec, Probe, SecretEnvSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::config_maps::{sampling_config_name, ui_config_name};
use super::{
    child_name, pod_annotations, service_account_name, BuildContext, COMPONENT_ALL_IN_ONE,
    COMPONENT_COLLECTOR, COMPONENT_INGESTER, COMPONENT_QUERY,
};
use crate::crd::{Jaeger, Options};
use crate::labels;

pub const COLLECTOR_ADMIN_PORT: i32 = 14269;
pub const QUERY_ADMIN_PORT: i32 = 16687;
pub const INGESTER_ADMIN_PORT: i32 = 14270;

pub const QUERY_HTTP_PORT: i32 = 16686;
pub const QUERY_GRPC_PORT: i32 = 16685;
pub const COLLECTOR_GRPC_PORT: i32 = 14250;
pub const COLLECTOR_HTTP_PORT: i32 = 14268;
pub const COLLECTOR_ZIPKIN_PORT: i32 = 9411;
pub const OTLP_GRPC_PORT: i32 = 4317;
pub const OTLP_HTTP_PORT: i32 = 4318;

const UI_CONFIG_DIR: &str = "/etc/config";
const SAMPLING_CONFIG_DIR: &str = "/etc/jaeger/sampling";

/// Configuration files mounted into a component
#[derive(Clone, Copy, Debug, Default)]
struct Mounts {
    ui_config: bool,
    sampling_config: bool,
}

/// Shape of one component deployment
struct ComponentDeployment {
    name: String,
    component: &'static str,
    image: String,
    options: Options,
    replicas: Option<i32>,
    ports: Vec<ContainerPort>,
    env: Vec<EnvVar>,
    admin_port: i32,
    mounts: Mounts,
}

/// Single-pod deployment running every component with in-process storage
pub fn all_in_one(jaeger: &Jaeger, ctx: &BuildContext) -> Deployment {
    let spec = &jaeger.spec;
    let mut options = spec.storage.options.clone();
    options.0.extend(spec.all_in_one.options.0.clone());

    let mut ports = collector_ports();
    ports.extend(query_ports());
    ports.extend([
        udp_port("zk-compact-trft", 5775),
        udp_port("jg-compact-trft", 6831),
        udp_port("jg-binary-trft", 6832),
        tcp_port("config-rest", 5778),
    ]);

    build(
        jaeger,
        ctx,
        ComponentDeployment {
            name: jaeger.name_any(),
            component: COMPONENT_ALL_IN_ONE,
            image: image_or(&spec.all_in_one.image, &ctx.config.all_in_one_image, ctx),
            options,
            replicas: None,
            ports,
            env: storage_env(&spec.storage.storage_type),
            admin_port: COLLECTOR_ADMIN_PORT,
            mounts: Mounts {
                ui_config: true,
                sampling_config: true,
            },
        },
    )
}

/// Collector; in streaming mode it writes to Kafka instead of the span store
pub fn collector(jaeger: &Jaeger, ctx: &BuildContext, streaming: bool) -> Deployment {
    let spec = &jaeger.spec;
    let (mut options, storage_type) = if streaming {
        (spec.storage.options.filter_prefix("kafka.producer"), "kafka")
    } else {
        (spec.storage.options.clone(), spec.storage.storage_type.as_str())
    };
    options.0.extend(spec.collector.options.0.clone());

    build(
        jaeger,
        ctx,
        ComponentDeployment {
            name: child_name(jaeger, COMPONENT_COLLECTOR),
            component: COMPONENT_COLLECTOR,
            image: image_or(&spec.collector.image, &ctx.config.collector_image, ctx),
            options,
            replicas: spec.collector.replicas,
            ports: collector_ports(),
            env: storage_env(storage_type),
            admin_port: COLLECTOR_ADMIN_PORT,
            mounts: Mounts {
                ui_config: false,
                sampling_config: true,
            },
        },
    )
}

/// Query service and UI
pub fn query(jaeger: &Jaeger, ctx: &BuildContext) -> Deployment {
    let spec = &jaeger.spec;
    let mut options = spec.storage.options.clone();
    options.0.extend(spec.query.options.0.clone());

    build(
        jaeger,
        ctx,
        ComponentDeployment {
            name: child_name(jaeger, COMPONENT_QUERY),
            component: COMPONENT_QUERY,
            image: image_or(&spec.query.image, &ctx.config.query_image, ctx),
            options,
            replicas: spec.query.replicas,
            ports: query_ports(),
            env: storage_env(&spec.storage.storage_type),
            admin_port: QUERY_ADMIN_PORT,
            mounts: Mounts {
                ui_config: true,
                sampling_config: false,
            },
        },
    )
}

/// Ingester moving spans from Kafka into the span store
pub fn ingester(jaeger: &Jaeger, ctx: &BuildContext) -> Deployment {
    let spec = &jaeger.spec;
    let mut options = spec.storage.options.clone();
    options.0.extend(spec.ingester.options.0.clone());

    build(
        jaeger,
        ctx,
        ComponentDeployment {
            name: child_name(jaeger, COMPONENT_INGESTER),
            component: COMPONENT_INGESTER,
            image: image_or(&spec.ingester.image, &ctx.config.ingester_image, ctx),
            options,
            replicas: spec.ingester.replicas,
            ports: vec![tcp_port("admin-http", INGESTER_ADMIN_PORT)],
            env: storage_env(&spec.storage.storage_type),
            admin_port: INGESTER_ADMIN_PORT,
            mounts: Mounts::default(),
        },
    )
}

/// Ask the injection webhook for an agent sidecar
pub fn request_sidecar(deployment: &mut Deployment, jaeger: &Jaeger) {
    deployment
        .annotations_mut()
        .insert(labels::SIDECAR_INJECT_ANNOTATION.to_string(), jaeger.name_any());
}

/// The pod spec of a deployment built here
pub fn pod_spec_mut(deployment: &mut Deployment) -> Option<&mut PodSpec> {
    deployment
        .spec
        .as_mut()
        .and_then(|s| s.template.spec.as_mut())
}

fn build(jaeger: &Jaeger, ctx: &BuildContext, d: ComponentDeployment) -> Deployment {
    let spec = &jaeger.spec;
    let selector = labels::selector_labels(jaeger, &d.name, d.component);

    let mut pod_labels = labels::component_labels(jaeger, &ctx.config.identity, &d.name, d.component);
    pod_labels.extend(selector.clone());

    let mut volumes: Vec<Volume> = spec.volumes.clone();
    let mut mounts: Vec<VolumeMount> = spec.volume_mounts.clone();
    let mut options = d.options;

    if d.mounts.ui_config {
        let cm = ui_config_name(jaeger);
        volumes.push(config_map_volume(&cm, &cm, "ui.json"));
        mounts.push(super::read_only_mount(&cm, UI_CONFIG_DIR));
        if !options.contains("query.ui-config") {
            options.set("query.ui-config", format!("{}/ui.json", UI_CONFIG_DIR));
        }
    }
    if d.mounts.sampling_config {
        let cm = sampling_config_name(jaeger);
        volumes.push(config_map_volume(&cm, &cm, "sampling.json"));
        mounts.push(super::read_only_mount(&cm, SAMPLING_CONFIG_DIR));
        if !options.contains("sampling.strategies-file") {
            options.set(
                "sampling.strategies-file",
                format!("{}/sampling.json", SAMPLING_CONFIG_DIR),
            );
        }
    }

    let env_from = spec.storage.secret_name.as_ref().map(|secret| {
        vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: secret.clone(),
                optional: None,
            }),
            ..Default::default()
        }]
    });

    let container = Container {
        name: format!("jaeger-{}", d.component),
        image: Some(d.image),
        args: Some(options.to_args()),
        env: Some(d.env),
        env_from,
        ports: Some(d.ports),
        volume_mounts: Some(mounts),
        readiness_probe: Some(http_probe(d.admin_port, 1)),
        liveness_probe: Some(http_probe(d.admin_port, 5)),
        ..Default::default()
    };

    Deployment {
        metadata: ctx.meta(jaeger, &d.name, d.component),
        spec: Some(DeploymentSpec {
            replicas: d.replicas,
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: Some(pod_annotations(jaeger, d.admin_port)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    service_account_name: Some(service_account_name(jaeger)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn image_or(explicit: &Option<String>, default: &str, ctx: &BuildContext) -> String {
    explicit
        .clone()
        .unwrap_or_else(|| ctx.config.versioned(default))
}

fn storage_env(storage_type: &str) -> Vec<EnvVar> {
    vec![EnvVar {
        name: "SPAN_STORAGE_TYPE".to_string(),
        value: Some(storage_type.to_string()),
        ..Default::default()
    }]
}

fn config_map_volume(volume: &str, config_map: &str, file: &str) -> Volume {
    Volume {
        name: volume.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.to_string(),
            items: Some(vec![k8s_openapi::api::core::v1::KeyToPath {
                key: file.to_string(),
                path: file.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn http_probe(port: i32, initial_delay: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/".to_string()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        ..Default::default()
    }
}

pub(crate) fn tcp_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub(crate) fn udp_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("UDP".to_string()),
        ..Default::default()
    }
}

fn collector_ports() -> Vec<ContainerPort> {
    vec![
        tcp_port("zipkin", COLLECTOR_ZIPKIN_PORT),
        tcp_port("grpc", COLLECTOR_GRPC_PORT),
        tcp_port("c-tchan-trft", 14267),
        tcp_port("c-binary-trft", COLLECTOR_HTTP_PORT),
        tcp_port("otlp-grpc", OTLP_GRPC_PORT),
        tcp_port("otlp-http", OTLP_HTTP_PORT),
        tcp_port("admin-http", COLLECTOR_ADMIN_PORT),
    ]
}

fn query_ports() -> Vec<ContainerPort> {
    vec![
        tcp_port("query", QUERY_HTTP_PORT),
        tcp_port("grpc-query", QUERY_GRPC_PORT),
        tcp_port("admin-http-q", QUERY_ADMIN_PORT),
    ]
}

/// Pod template labels, for selectors built elsewhere
pub fn template_labels(deployment: &Deployment) -> BTreeMap<String, String> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_default()
}
