//! Horizontal pod autoscalers

use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
    MetricSpec, MetricTarget, ResourceMetricSource,
};
use kube::ResourceExt;

use super::BuildContext;
use crate::crd::{AutoscaleSpec, Jaeger};

const DEFAULT_MIN_REPLICAS: i32 = 1;
const DEFAULT_MAX_REPLICAS: i32 = 100;
const TARGET_UTILIZATION: i32 = 90;

/// Autoscaler for a component deployment unless autoscaling was turned off
///
/// An explicit replica count without bounds also disables autoscaling.
pub fn for_deployment(
    jaeger: &Jaeger,
    ctx: &BuildContext,
    deployment: &str,
    component: &str,
    autoscale: &AutoscaleSpec,
    replicas: Option<i32>,
) -> Option<HorizontalPodAutoscaler> {
    if autoscale.autoscale == Some(false) {
        return None;
    }
    if replicas.is_some() && autoscale.max_replicas.is_none() && autoscale.autoscale.is_none() {
        return None;
    }

    let min_replicas = autoscale.min_replicas.or(replicas).unwrap_or(DEFAULT_MIN_REPLICAS);
    let max_replicas = autoscale
        .max_replicas
        .unwrap_or(DEFAULT_MAX_REPLICAS)
        .max(min_replicas);

    Some(HorizontalPodAutoscaler {
        metadata: ctx.meta(jaeger, deployment, component),
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: deployment.to_string(),
            },
            min_replicas: Some(min_replicas),
            max_replicas,
            metrics: Some(vec![
                resource_metric("cpu"),
                resource_metric("memory"),
            ]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn resource_metric(resource: &str) -> MetricSpec {
    MetricSpec {
        type_: "Resource".to_string(),
        resource: Some(ResourceMetricSource {
            name: resource.to_string(),
            target: MetricTarget {
                type_: "Utilization".to_string(),
                average_utilization: Some(TARGET_UTILIZATION),
                ..Default::default()
            },
        }),
        ..Default::default()
    }
}

/// Name of the deployment an autoscaler scales
pub fn target(hpa: &HorizontalPodAutoscaler) -> String {
    hpa.spec
        .as_ref()
        .map(|s| s.scale_target_ref.name.clone())
        .unwrap_or_else(|| hpa.name_any())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilitySnapshot;
    use crate::config::OperatorConfig;

    #[test]
    fn defaults_and_opt_out() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let jaeger = Jaeger::new("demo", Default::default());

        let hpa = for_deployment(
            &jaeger,
            &ctx,
            "demo-collector",
            "collector",
            &AutoscaleSpec::default(),
            None,
        )
        .unwrap();
        let spec = hpa.spec.as_ref().unwrap();
        assert_eq!(spec.min_replicas, Some(1));
        assert_eq!(spec.max_replicas, 100);
        assert_eq!(spec.metrics.as_ref().unwrap().len(), 2);
        assert_eq!(target(&hpa), "demo-collector");

        let off = AutoscaleSpec {
            autoscale: Some(false),
            ..Default::default()
        };
        assert!(for_deployment(&jaeger, &ctx, "demo-collector", "collector", &off, None).is_none());
        assert!(for_deployment(
            &jaeger,
            &ctx,
            "demo-collector",
            "collector",
            &AutoscaleSpec::default(),
            Some(3)
        )
        .is_none());
    }

    #[test]
    fn max_never_below_min() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let jaeger = Jaeger::new("demo", Default::default());
        let bounds = AutoscaleSpec {
            autoscale: Some(true),
            min_replicas: Some(5),
            max_replicas: Some(2),
        };
        let hpa = for_deployment(&jaeger, &ctx, "demo-ingester", "ingester", &bounds, None).unwrap();
        assert_eq!(hpa.spec.unwrap().max_replicas, 5);
    }
}
