use super::production::{add_collector, add_query, provision_elasticsearch};
use super::{add_common, DesiredState};
use crate::builders::{
    autoscale, child_name, deployment, kafka, BuildContext, COMPONENT_INGESTER, COMPONENT_QUERY,
};
use crate::crd::Jaeger;
use crate::error::Result;

/// Collector writes to Kafka, ingester moves spans from Kafka to storage
pub(super) fn build(jaeger: &mut Jaeger, ctx: &BuildContext) -> Result<DesiredState> {
    let mut desired = DesiredState::default();

    if kafka::should_provision(jaeger, &ctx.caps) {
        kafka::inject(jaeger);
        desired.kafkas.push(kafka::cluster(jaeger, ctx));
        desired.kafka_users.push(kafka::user(jaeger, ctx));
    } else {
        kafka::release(jaeger);
    }
    provision_elasticsearch(jaeger, ctx, &mut desired);

    let jaeger = &*jaeger;
    add_collector(jaeger, ctx, &mut desired, true);

    let ingester = child_name(jaeger, COMPONENT_INGESTER);
    desired.deployments.push(deployment::ingester(jaeger, ctx));
    let spec = &jaeger.spec.ingester;
    desired.autoscalers.extend(autoscale::for_deployment(
        jaeger,
        ctx,
        &ingester,
        COMPONENT_INGESTER,
        &spec.autoscale,
        spec.replicas,
    ));

    add_query(jaeger, ctx, &mut desired);

    add_common(jaeger, ctx, &mut desired, &child_name(jaeger, COMPONENT_QUERY))?;
    Ok(desired)
}

#[cfg(test)]
mod tests {
    use kube::ResourceExt;

    use super::*;
    use crate::capabilities::CapabilitySnapshot;
    use crate::config::OperatorConfig;

    #[test]
    fn provisions_kafka_without_brokers() {
        let config = OperatorConfig::default();
        let caps = CapabilitySnapshot {
            kafka_provisioning_enabled: true,
            ..Default::default()
        };
        let ctx = BuildContext::new(&config, caps);
        let mut jaeger = Jaeger::new("demo", Default::default());
        jaeger.metadata.namespace = Some("obs".to_string());
        jaeger.spec.storage.storage_type = "elasticsearch".to_string();
        jaeger.spec.storage.options.set("es.server-urls", "http://es:9200");

        let desired = build(&mut jaeger, &ctx).unwrap();
        assert_eq!(desired.kafkas.len(), 1);
        assert_eq!(desired.kafka_users.len(), 1);

        let names: Vec<String> = desired.deployments.iter().map(|d| d.name_any()).collect();
        assert_eq!(names, vec!["demo-collector", "demo-ingester", "demo-query"]);
        assert_eq!(desired.autoscalers.len(), 2);
        assert!(jaeger.annotations().contains_key(kafka::PROVISIONED_ANNOTATION));
    }

    #[test]
    fn external_kafka_is_left_alone() {
        let config = OperatorConfig::default();
        let caps = CapabilitySnapshot {
            kafka_provisioning_enabled: true,
            ..Default::default()
        };
        let ctx = BuildContext::new(&config, caps);
        let mut jaeger = Jaeger::new("demo", Default::default());
        jaeger
            .spec
            .storage
            .options
            .set("kafka.producer.brokers", "kafka:9092");

        let desired = build(&mut jaeger, &ctx).unwrap();
        assert!(desired.kafkas.is_empty());
        assert!(desired.kafka_users.is_empty());
    }
}
