//! Services exposing the Jaeger components

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use super::deployment::{
    COLLECTOR_ADMIN_PORT, COLLECTOR_GRPC_PORT, COLLECTOR_HTTP_PORT, COLLECTOR_ZIPKIN_PORT,
    OTLP_GRPC_PORT, OTLP_HTTP_PORT, QUERY_ADMIN_PORT, QUERY_GRPC_PORT, QUERY_HTTP_PORT,
};
use super::{child_name, BuildContext, COMPONENT_AGENT, COMPONENT_COLLECTOR, COMPONENT_QUERY};
use crate::crd::Jaeger;
use crate::labels;

/// Name of the query port, also targeted by routes and ingresses
pub const QUERY_PORT_NAME: &str = "http-query";

/// Port name the service monitors scrape
pub const ADMIN_PORT_NAME: &str = "admin-http";

pub fn query_service_name(jaeger: &Jaeger) -> String {
    child_name(jaeger, COMPONENT_QUERY)
}

/// Collector services, regular and headless, selecting pods of `component`
pub fn collector(
    jaeger: &Jaeger,
    ctx: &BuildContext,
    workload: &str,
    component: &str,
) -> Vec<Service> {
    let selector = labels::selector_labels(jaeger, workload, component);
    let service_type = jaeger.spec.collector.service_type.clone();
    let ports = collector_ports();

    let name = child_name(jaeger, COMPONENT_COLLECTOR);
    let regular = service(
        jaeger,
        ctx,
        &name,
        COMPONENT_COLLECTOR,
        selector.clone(),
        ports.clone(),
        service_type,
        None,
    );
    let headless = service(
        jaeger,
        ctx,
        &format!("{}-headless", name),
        COMPONENT_COLLECTOR,
        selector,
        ports,
        None,
        Some("None".to_string()),
    );
    vec![regular, headless]
}

/// Query service selecting pods of `component`
pub fn query(jaeger: &Jaeger, ctx: &BuildContext, workload: &str, component: &str) -> Service {
    service(
        jaeger,
        ctx,
        &query_service_name(jaeger),
        COMPONENT_QUERY,
        labels::selector_labels(jaeger, workload, component),
        vec![
            port(QUERY_PORT_NAME, QUERY_HTTP_PORT, QUERY_HTTP_PORT, "TCP"),
            port("grpc-query", QUERY_GRPC_PORT, QUERY_GRPC_PORT, "TCP"),
            port(ADMIN_PORT_NAME, QUERY_ADMIN_PORT, QUERY_ADMIN_PORT, "TCP"),
        ],
        jaeger.spec.query.service_type.clone(),
        None,
    )
}

/// Agent ports served by the all-in-one pod
pub fn agent(jaeger: &Jaeger, ctx: &BuildContext, workload: &str, component: &str) -> Service {
    service(
        jaeger,
        ctx,
        &child_name(jaeger, COMPONENT_AGENT),
        COMPONENT_AGENT,
        labels::selector_labels(jaeger, workload, component),
        vec![
            port("zk-compact-trft", 5775, 5775, "UDP"),
            port("config-rest", 5778, 5778, "TCP"),
            port("jg-compact-trft", 6831, 6831, "UDP"),
            port("jg-binary-trft", 6832, 6832, "UDP"),
        ],
        None,
        Some("None".to_string()),
    )
}

/// Service port forwarding to a container port
pub fn port(name: &str, port: i32, target: i32, protocol: &str) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(target)),
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}

fn collector_ports() -> Vec<ServicePort> {
    vec![
        port("http-zipkin", COLLECTOR_ZIPKIN_PORT, COLLECTOR_ZIPKIN_PORT, "TCP"),
        port("grpc-http", COLLECTOR_GRPC_PORT, COLLECTOR_GRPC_PORT, "TCP"),
        port("http-c-binary-trft", COLLECTOR_HTTP_PORT, COLLECTOR_HTTP_PORT, "TCP"),
        port("grpc-otlp", OTLP_GRPC_PORT, OTLP_GRPC_PORT, "TCP"),
        port("http-otlp", OTLP_HTTP_PORT, OTLP_HTTP_PORT, "TCP"),
        port(ADMIN_PORT_NAME, COLLECTOR_ADMIN_PORT, COLLECTOR_ADMIN_PORT, "TCP"),
    ]
}

#[allow(clippy::too_many_arguments)]
fn service(
    jaeger: &Jaeger,
    ctx: &BuildContext,
    name: &str,
    component: &str,
    selector: BTreeMap<String, String>,
    ports: Vec<ServicePort>,
    service_type: Option<String>,
    cluster_ip: Option<String>,
) -> Service {
    Service {
        metadata: ctx.meta(jaeger, name, component),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(ports),
            type_: service_type,
            cluster_ip,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Find a service by name in a built list
pub fn find_mut<'a>(services: &'a mut [Service], name: &str) -> Option<&'a mut Service> {
    services.iter_mut().find(|s| s.name_any() == name)
}
