//! Node agent daemon set

use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use super::deployment::{tcp_port, udp_port, COLLECTOR_GRPC_PORT};
use super::{child_name, pod_annotations, service_account_name, BuildContext, COMPONENT_AGENT, COMPONENT_COLLECTOR};
use crate::crd::Jaeger;
use crate::labels;

const AGENT_ADMIN_PORT: i32 = 14271;

/// Whether the agent runs as a daemon set rather than an injected sidecar
pub fn is_daemonset(jaeger: &Jaeger) -> bool {
    jaeger.spec.agent.strategy.eq_ignore_ascii_case("daemonset")
}

/// Agent on every node, reporting to the collector service over gRPC
pub fn daemonset(jaeger: &Jaeger, ctx: &BuildContext) -> DaemonSet {
    let name = child_name(jaeger, "agent-daemonset");
    let selector = labels::selector_labels(jaeger, &name, COMPONENT_AGENT);
    let mut pod_labels = labels::component_labels(jaeger, &ctx.config.identity, &name, COMPONENT_AGENT);
    pod_labels.extend(selector.clone());

    let mut options = jaeger.spec.agent.options.clone();
    if !options.has_prefix("reporter.grpc.host-port") {
        options.set(
            "reporter.grpc.host-port",
            format!(
                "dns:///{}-headless.{}:{}",
                child_name(jaeger, COMPONENT_COLLECTOR),
                jaeger.metadata.namespace.clone().unwrap_or_default(),
                COLLECTOR_GRPC_PORT
            ),
        );
    }

    let image = jaeger
        .spec
        .agent
        .image
        .clone()
        .unwrap_or_else(|| ctx.config.versioned(&ctx.config.agent_image));

    let mut ports = vec![
        udp_port("zk-compact-trft", 5775),
        udp_port("jg-compact-trft", 6831),
        udp_port("jg-binary-trft", 6832),
        tcp_port("config-rest", 5778),
        tcp_port("admin-http", AGENT_ADMIN_PORT),
    ];
    for port in ports.iter_mut().take(4) {
        port.host_port = Some(port.container_port);
    }

    DaemonSet {
        metadata: ctx.meta(jaeger, &name, COMPONENT_AGENT),
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: Some(pod_annotations(jaeger, AGENT_ADMIN_PORT)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "jaeger-agent-daemonset".to_string(),
                        image: Some(image),
                        args: Some(options.to_args()),
                        ports: Some(ports),
                        volume_mounts: (!jaeger.spec.volume_mounts.is_empty())
                            .then(|| jaeger.spec.volume_mounts.clone()),
                        ..Default::default()
                    }],
                    volumes: (!jaeger.spec.volumes.is_empty()).then(|| jaeger.spec.volumes.clone()),
                    service_account_name: Some(service_account_name(jaeger)),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilitySnapshot;
    use crate::config::OperatorConfig;

    #[test]
    fn strategy_is_case_insensitive() {
        let mut jaeger = Jaeger::new("demo", Default::default());
        assert!(!is_daemonset(&jaeger));
        jaeger.spec.agent.strategy = "DaemonSet".to_string();
        assert!(is_daemonset(&jaeger));
    }

    #[test]
    fn agent_reports_to_headless_collector() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let mut jaeger = Jaeger::new("demo", Default::default());
        jaeger.metadata.namespace = Some("obs".to_string());

        let ds = daemonset(&jaeger, &ctx);
        let container = &ds.spec.unwrap().template.spec.unwrap().containers[0];
        assert!(container
            .args
            .as_ref()
            .unwrap()
            .contains(&"--reporter.grpc.host-port=dns:///demo-collector-headless.obs:14250".to_string()));
        let ports = container.ports.as_ref().unwrap();
        assert_eq!(ports[1].host_port, Some(6831));
        assert_eq!(ports[4].host_port, None);
    }
}
