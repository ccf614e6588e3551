//! UI and sampling configuration maps

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::{json, Value};

use super::{child_name, BuildContext};
use crate::crd::Jaeger;
use crate::error::Result;

pub fn ui_config_name(jaeger: &Jaeger) -> String {
    child_name(jaeger, "ui-configuration")
}

pub fn sampling_config_name(jaeger: &Jaeger) -> String {
    child_name(jaeger, "sampling-configuration")
}

/// Probabilistic sampling of every trace unless configured otherwise
pub fn default_sampling() -> Value {
    json!({
        "default_strategy": {
            "type": "probabilistic",
            "param": 1
        }
    })
}

pub fn ui(jaeger: &Jaeger, ctx: &BuildContext) -> Result<ConfigMap> {
    let body = serde_json::to_string(&jaeger.spec.ui.options)?;
    Ok(config_map(jaeger, ctx, &ui_config_name(jaeger), "ui.json", body))
}

pub fn sampling(jaeger: &Jaeger, ctx: &BuildContext) -> Result<ConfigMap> {
    let options = &jaeger.spec.sampling.options;
    let body = if options.is_empty() {
        default_sampling().to_string()
    } else {
        serde_json::to_string(options)?
    };
    Ok(config_map(
        jaeger,
        ctx,
        &sampling_config_name(jaeger),
        "sampling.json",
        body,
    ))
}

fn config_map(jaeger: &Jaeger, ctx: &BuildContext, name: &str, file: &str, body: String) -> ConfigMap {
    ConfigMap {
        metadata: ctx.meta(jaeger, name, "config"),
        data: Some(BTreeMap::from([(file.to_string(), body)])),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilitySnapshot;
    use crate::config::OperatorConfig;

    #[test]
    fn sampling_defaults_to_probabilistic() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let jaeger = Jaeger::new("demo", Default::default());

        let cm = sampling(&jaeger, &ctx).unwrap();
        let body: Value =
            serde_json::from_str(&cm.data.unwrap()["sampling.json"]).unwrap();
        assert_eq!(body, default_sampling());
        assert_eq!(cm.metadata.name.as_deref(), Some("demo-sampling-configuration"));
    }

    #[test]
    fn ui_config_renders_options() {
        let config = OperatorConfig::default();
        let ctx = BuildContext::new(&config, CapabilitySnapshot::default());
        let mut jaeger = Jaeger::new("demo", Default::default());
        assert_eq!(ui(&jaeger, &ctx).unwrap().data.unwrap()["ui.json"], "{}");

        jaeger
            .spec
            .ui
            .options
            .insert("archiveEnabled".to_string(), json!(true));
        let cm = ui(&jaeger, &ctx).unwrap();
        assert!(cm.data.unwrap()["ui.json"].contains("archiveEnabled"));
    }
}
