//! Service accounts and RBAC bindings

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};
use kube::ResourceExt;

use super::{child_name, service_account_name, BuildContext};
use crate::crd::Jaeger;

const OAUTH_REDIRECT_ANNOTATION: &str = "serviceaccounts.openshift.io/oauth-redirectreference.primary";

/// Service account used by the OAuth proxy sidecar
pub fn oauth_proxy_account_name(jaeger: &Jaeger) -> String {
    child_name(jaeger, "ui-proxy")
}

/// The workload account, unless the user brings their own
pub fn workload(jaeger: &Jaeger, ctx: &BuildContext) -> Option<ServiceAccount> {
    if jaeger.spec.service_account.is_some() {
        return None;
    }
    Some(ServiceAccount {
        metadata: ctx.meta(jaeger, &service_account_name(jaeger), "service-account"),
        ..Default::default()
    })
}

/// Account the OAuth proxy authenticates as; the redirect reference points at the UI route
pub fn oauth_proxy(jaeger: &Jaeger, ctx: &BuildContext) -> ServiceAccount {
    let mut metadata = ctx.meta(jaeger, &oauth_proxy_account_name(jaeger), "service-account");
    let redirect = serde_json::json!({
        "kind": "OAuthRedirectReference",
        "apiVersion": "v1",
        "reference": { "kind": "Route", "name": jaeger.name_any() }
    });
    metadata.annotations = Some(BTreeMap::from([(
        OAUTH_REDIRECT_ANNOTATION.to_string(),
        redirect.to_string(),
    )]));
    ServiceAccount {
        metadata,
        ..Default::default()
    }
}

/// Binds `system:auth-delegator` to the OAuth proxy account so it can review tokens
pub fn auth_delegator(jaeger: &Jaeger, ctx: &BuildContext) -> ClusterRoleBinding {
    let name = format!(
        "{}-{}-oauth-proxy",
        jaeger.name_any(),
        jaeger.namespace().unwrap_or_default()
    );
    ClusterRoleBinding {
        metadata: ctx.cluster_meta(jaeger, &name, "cluster-role-binding"),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: "system:auth-delegator".to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: oauth_proxy_account_name(jaeger),
            namespace: jaeger.namespace(),
            ..Default::default()
        }]),
    }
}
