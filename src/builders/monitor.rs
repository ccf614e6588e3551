//! Prometheus operator service monitors

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;

use super::service::ADMIN_PORT_NAME;
use super::BuildContext;
use crate::crd::{Jaeger, MonitorEndpoint, ServiceMonitor, ServiceMonitorSpec};
use crate::labels;

/// One monitor per service exposing an admin port; headless twins are skipped
pub fn for_services(jaeger: &Jaeger, ctx: &BuildContext, services: &[Service]) -> Vec<ServiceMonitor> {
    services
        .iter()
        .filter(|svc| {
            let spec = svc.spec.as_ref();
            let headless = spec.and_then(|s| s.cluster_ip.as_deref()) == Some("None");
            let has_admin = spec
                .and_then(|s| s.ports.as_ref())
                .is_some_and(|ports| ports.iter().any(|p| p.name.as_deref() == Some(ADMIN_PORT_NAME)));
            !headless && has_admin
        })
        .map(|svc| {
            let name = svc.name_any();
            let mut monitor = ServiceMonitor::new(
                &name,
                ServiceMonitorSpec {
                    selector: LabelSelector {
                        match_labels: Some(BTreeMap::from([
                            (labels::K8S_INSTANCE.to_string(), jaeger.name_any()),
                            (labels::K8S_NAME.to_string(), name.clone()),
                        ])),
                        ..Default::default()
                    },
                    endpoints: vec![MonitorEndpoint {
                        port: ADMIN_PORT_NAME.to_string(),
                        path: Some("/metrics".to_string()),
                        interval: None,
                    }],
                },
            );
            monitor.metadata = ctx.meta(jaeger, &name, "service-monitor");
            monitor
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::service;
    use crate::capabilities::CapabilitySnapshot;
    use crate::config::OperatorConfig;

    #[test]
    fn headless_services_are_not_monitored() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let jaeger = Jaeger::new("demo", Default::default());

        let mut services = service::collector(&jaeger, &ctx, "demo-collector", "collector");
        services.push(service::query(&jaeger, &ctx, "demo-query", "query"));

        let monitors = for_services(&jaeger, &ctx, &services);
        let names: Vec<String> = monitors.iter().map(|m| m.name_any()).collect();
        assert_eq!(names, vec!["demo-collector", "demo-query"]);
        assert_eq!(monitors[0].spec.endpoints[0].port, ADMIN_PORT_NAME);
    }
}
