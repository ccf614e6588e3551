//! OpenShift OAuth proxy in front of the query UI

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Service};

use super::account::oauth_proxy_account_name;
use super::deployment::{pod_spec_mut, tcp_port, QUERY_HTTP_PORT};
use super::service::port;
use super::{child_name, ensure_volume, ensure_volume_mount, read_only_mount, secret_volume, BuildContext};
use crate::crd::Jaeger;

pub const PROXY_PORT: i32 = 8443;
pub const PROXY_PORT_NAME: &str = "https-query";

const SERVING_CERT_ANNOTATION: &str = "service.beta.openshift.io/serving-cert-secret-name";
const TLS_DIR: &str = "/etc/tls/private";

pub fn tls_secret_name(jaeger: &Jaeger) -> String {
    child_name(jaeger, "ui-oauth-proxy-tls")
}

/// Add the proxy sidecar to the pod serving the UI
pub fn wrap_deployment(deployment: &mut Deployment, jaeger: &Jaeger, ctx: &BuildContext) {
    let volume = tls_secret_name(jaeger);
    let Some(pod) = pod_spec_mut(deployment) else {
        return;
    };
    if pod.containers.iter().any(|c| c.name == "oauth-proxy") {
        return;
    }

    let volumes = pod.volumes.get_or_insert_with(Vec::new);
    ensure_volume(volumes, secret_volume(&volume, &volume));
    pod.service_account_name = Some(oauth_proxy_account_name(jaeger));

    let mut mounts = Vec::new();
    ensure_volume_mount(&mut mounts, read_only_mount(&volume, TLS_DIR));

    pod.containers.push(Container {
        name: "oauth-proxy".to_string(),
        image: Some(ctx.config.oauth_proxy_image.clone()),
        args: Some(args(jaeger)),
        ports: Some(vec![tcp_port("public", PROXY_PORT)]),
        volume_mounts: Some(mounts),
        ..Default::default()
    });
}

/// Expose the proxy on 443 and request a serving certificate
pub fn wrap_service(service: &mut Service, jaeger: &Jaeger) {
    service
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(SERVING_CERT_ANNOTATION.to_string(), tls_secret_name(jaeger));

    if let Some(spec) = service.spec.as_mut() {
        let ports = spec.ports.get_or_insert_with(Vec::new);
        if !ports.iter().any(|p| p.name.as_deref() == Some(PROXY_PORT_NAME)) {
            ports.insert(0, port(PROXY_PORT_NAME, 443, PROXY_PORT, "TCP"));
        }
    }
}

fn args(jaeger: &Jaeger) -> Vec<String> {
    let openshift = &jaeger.spec.ingress.openshift;
    let mut args = vec![
        format!("--cookie-secret={}", cookie_secret(jaeger)),
        format!("--https-address=:{}", PROXY_PORT),
        format!("--openshift-service-account={}", oauth_proxy_account_name(jaeger)),
        "--provider=openshift".to_string(),
        format!("--tls-cert={}/tls.crt", TLS_DIR),
        format!("--tls-key={}/tls.key", TLS_DIR),
        format!("--upstream=http://localhost:{}", QUERY_HTTP_PORT),
    ];
    if let Some(sar) = &openshift.sar {
        args.push(format!("--openshift-sar={}", sar));
    }
    if let Some(delegate) = &openshift.delegate_urls {
        args.push(format!("--openshift-delegate-urls={}", delegate));
    }
    if let Some(htpasswd) = &openshift.htpasswd_file {
        args.push(format!("--htpasswd-file={}", htpasswd));
        args.push("--display-htpasswd-form=false".to_string());
    }
    args.sort();
    args
}

/// Cookie secret derived from the instance identity, stable across reconciles
fn cookie_secret(jaeger: &Jaeger) -> String {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    jaeger.metadata.uid.hash(&mut hasher);
    jaeger.metadata.name.hash(&mut hasher);
    jaeger.metadata.namespace.hash(&mut hasher);
    format!("{:016x}{:016x}", hasher.finish(), hasher.finish().rotate_left(17))
}
