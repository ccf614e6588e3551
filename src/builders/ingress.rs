//! Exposure of the query UI: Ingress on Kubernetes, Route and ConsoleLink on OpenShift

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec as NetIngressSpec, IngressTLS, ServiceBackendPort,
};
use kube::ResourceExt;

use super::deployment::QUERY_HTTP_PORT;
use super::oauth_proxy::PROXY_PORT_NAME;
use super::service::{query_service_name, QUERY_PORT_NAME};
use super::{child_name, BuildContext, COMPONENT_QUERY};
use crate::crd::{
    ConsoleLink, ConsoleLinkSpec, Jaeger, NamespaceDashboard, Route, RoutePort, RouteSpec,
    RouteTargetReference, RouteTls,
};

/// Annotation linking a console link to the route whose host it points at
pub const CONSOLE_LINK_ROUTE_ANNOTATION: &str = "consolelink.jaegertracing.io/route";

pub const SECURITY_NONE: &str = "none";
pub const SECURITY_OAUTH_PROXY: &str = "oauth-proxy";

pub fn enabled(jaeger: &Jaeger) -> bool {
    jaeger.spec.ingress.enabled.unwrap_or(true)
}

pub fn oauth_proxy_enabled(jaeger: &Jaeger) -> bool {
    jaeger.spec.ingress.security == SECURITY_OAUTH_PROXY
}

/// Kubernetes ingress to the query service
pub fn ingress(jaeger: &Jaeger, ctx: &BuildContext) -> Ingress {
    let spec = &jaeger.spec.ingress;
    let backend = IngressBackend {
        service: Some(IngressServiceBackend {
            name: query_service_name(jaeger),
            port: Some(ServiceBackendPort {
                number: Some(QUERY_HTTP_PORT),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };

    let (default_backend, rules) = if spec.hosts.is_empty() {
        (Some(backend), None)
    } else {
        let rules = spec
            .hosts
            .iter()
            .map(|host| IngressRule {
                host: Some(host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "ImplementationSpecific".to_string(),
                        backend: backend.clone(),
                    }],
                }),
            })
            .collect();
        (None, Some(rules))
    };

    let tls: Vec<IngressTLS> = spec
        .tls
        .iter()
        .map(|t| IngressTLS {
            hosts: (!t.hosts.is_empty()).then(|| t.hosts.clone()),
            secret_name: t.secret_name.clone(),
        })
        .collect();

    Ingress {
        metadata: ctx.meta(jaeger, &child_name(jaeger, COMPONENT_QUERY), COMPONENT_QUERY),
        spec: Some(NetIngressSpec {
            default_backend,
            rules,
            tls: (!tls.is_empty()).then_some(tls),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// OpenShift route to the query service, re-encrypting through the OAuth proxy when present
pub fn route(jaeger: &Jaeger, ctx: &BuildContext) -> Route {
    let (target_port, termination) = if oauth_proxy_enabled(jaeger) {
        (PROXY_PORT_NAME, "reencrypt")
    } else {
        (QUERY_PORT_NAME, "edge")
    };
    Route {
        metadata: ctx.meta(jaeger, &jaeger.name_any(), COMPONENT_QUERY),
        spec: RouteSpec {
            host: jaeger.spec.ingress.hosts.first().cloned(),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: query_service_name(jaeger),
            },
            port: Some(RoutePort {
                target_port: target_port.to_string(),
            }),
            tls: Some(RouteTls {
                termination: termination.to_string(),
            }),
        },
        status: None,
    }
}

/// Console menu entry for the UI; the href is filled in once the route has a host
pub fn console_link(jaeger: &Jaeger, ctx: &BuildContext, route: &Route) -> ConsoleLink {
    let namespace = jaeger.namespace().unwrap_or_default();
    let name = format!("{}-{}", namespace, jaeger.name_any());
    let mut metadata = ctx.cluster_meta(jaeger, &name, "console-link");
    metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(CONSOLE_LINK_ROUTE_ANNOTATION.to_string(), route.name_any());

    let href = route
        .spec
        .host
        .as_ref()
        .map(|host| format!("https://{}", host))
        .unwrap_or_default();

    ConsoleLink {
        metadata,
        spec: ConsoleLinkSpec {
            href,
            text: format!("Jaeger [{}]", jaeger.name_any()),
            location: "NamespaceDashboard".to_string(),
            namespace_dashboard: Some(NamespaceDashboard {
                namespaces: vec![namespace],
            }),
        },
    }
}

/// Fill the href from applied routes; links whose route has no host yet are dropped
pub fn resolve_console_links(links: Vec<ConsoleLink>, routes: &[Route]) -> Vec<ConsoleLink> {
    links
        .into_iter()
        .filter_map(|mut link| {
            let route_name = link.annotations().get(CONSOLE_LINK_ROUTE_ANNOTATION)?.clone();
            if link.spec.href.is_empty() {
                let host = routes
                    .iter()
                    .find(|r| r.name_any() == route_name)
                    .and_then(|r| r.spec.host.clone())?;
                link.spec.href = format!("https://{}", host);
            }
            Some(link)
        })
        .collect()
}
