use super::{add_common, normalize, DesiredState};
use crate::builders::{
    agent, autoscale, child_name, deployment, elasticsearch, service, BuildContext,
    COMPONENT_COLLECTOR, COMPONENT_QUERY,
};
use crate::crd::Jaeger;
use crate::error::Result;

/// Collector and query as separate deployments
pub(super) fn build(jaeger: &mut Jaeger, ctx: &BuildContext) -> Result<DesiredState> {
    let mut desired = DesiredState::default();
    provision_elasticsearch(jaeger, ctx, &mut desired);

    let jaeger = &*jaeger;
    add_collector(jaeger, ctx, &mut desired, false);
    add_query(jaeger, ctx, &mut desired);

    add_common(jaeger, ctx, &mut desired, &child_name(jaeger, COMPONENT_QUERY))?;
    Ok(desired)
}

/// Request an Elasticsearch cluster and wire the instance to it when needed
pub(super) fn provision_elasticsearch(
    jaeger: &mut Jaeger,
    ctx: &BuildContext,
    desired: &mut DesiredState,
) {
    if elasticsearch::should_provision(jaeger, &ctx.caps) {
        elasticsearch::inject(jaeger);
        normalize::apply_es_tls_defaults(jaeger);
        desired.elasticsearches.push(elasticsearch::cluster(jaeger, ctx));
        desired
            .secrets
            .push(elasticsearch::connection_secret(jaeger, ctx));
    } else {
        elasticsearch::release(jaeger);
    }
}

pub(super) fn add_collector(
    jaeger: &Jaeger,
    ctx: &BuildContext,
    desired: &mut DesiredState,
    streaming: bool,
) {
    let name = child_name(jaeger, COMPONENT_COLLECTOR);
    desired
        .deployments
        .push(deployment::collector(jaeger, ctx, streaming));
    desired
        .services
        .extend(service::collector(jaeger, ctx, &name, COMPONENT_COLLECTOR));

    let collector = &jaeger.spec.collector;
    desired.autoscalers.extend(autoscale::for_deployment(
        jaeger,
        ctx,
        &name,
        COMPONENT_COLLECTOR,
        &collector.autoscale,
        collector.replicas,
    ));
}

pub(super) fn add_query(jaeger: &Jaeger, ctx: &BuildContext, desired: &mut DesiredState) {
    let name = child_name(jaeger, COMPONENT_QUERY);
    let mut query = deployment::query(jaeger, ctx);
    if !agent::is_daemonset(jaeger) {
        deployment::request_sidecar(&mut query, jaeger);
    }
    desired.deployments.push(query);
    desired
        .services
        .push(service::query(jaeger, ctx, &name, COMPONENT_QUERY));
}

#[cfg(test)]
mod tests {
    use kube::ResourceExt;

    use super::*;
    use crate::capabilities::CapabilitySnapshot;
    use crate::config::OperatorConfig;
    use crate::labels;

    fn jaeger() -> Jaeger {
        let mut jaeger = Jaeger::new("demo", Default::default());
        jaeger.metadata.namespace = Some("obs".to_string());
        jaeger.spec.strategy = "production".to_string();
        jaeger.spec.storage.storage_type = "elasticsearch".to_string();
        jaeger
    }

    #[test]
    fn query_requests_agent_sidecar() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let mut jaeger = jaeger();
        jaeger.spec.storage.options.set("es.server-urls", "http://es:9200");

        let desired = build(&mut jaeger, &ctx).unwrap();
        let query = desired
            .deployments
            .iter()
            .find(|d| d.name_any() == "demo-query")
            .unwrap();
        assert_eq!(query.annotations()[labels::SIDECAR_INJECT_ANNOTATION], "demo");
        assert_eq!(desired.autoscalers.len(), 1);
        assert!(desired.elasticsearches.is_empty());
    }

    #[test]
    fn daemonset_agent_replaces_sidecar() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let mut jaeger = jaeger();
        jaeger.spec.agent.strategy = "DaemonSet".to_string();

        let desired = build(&mut jaeger, &ctx).unwrap();
        assert_eq!(desired.daemon_sets.len(), 1);
        assert!(desired
            .deployments
            .iter()
            .all(|d| !d.annotations().contains_key(labels::SIDECAR_INJECT_ANNOTATION)));
    }

    #[test]
    fn provisioned_elasticsearch_mounts_certificates() {
        let config = OperatorConfig::default();
        let caps = CapabilitySnapshot {
            es_provisioning_enabled: true,
            ..Default::default()
        };
        let ctx = BuildContext::new(&config, caps);
        let mut jaeger = jaeger();

        let desired = build(&mut jaeger, &ctx).unwrap();
        assert_eq!(desired.elasticsearches.len(), 1);
        assert_eq!(desired.secrets[0].name_any(), "demo-jaeger-elasticsearch");

        let query = desired
            .deployments
            .iter()
            .find(|d| d.name_any() == "demo-query")
            .unwrap();
        let volumes = query
            .spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .and_then(|p| p.volumes.clone())
            .unwrap();
        assert!(volumes
            .iter()
            .any(|v| v.secret.as_ref().and_then(|s| s.secret_name.as_deref()) == Some("elasticsearch")));
    }
}
