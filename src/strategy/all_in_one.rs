use kube::ResourceExt;

use super::{add_common, DesiredState};
use crate::builders::{deployment, service, BuildContext, COMPONENT_ALL_IN_ONE};
use crate::crd::Jaeger;
use crate::error::Result;

/// One pod running collector, query and agent
pub(super) fn build(jaeger: &mut Jaeger, ctx: &BuildContext) -> Result<DesiredState> {
    let jaeger = &*jaeger;
    let name = jaeger.name_any();
    let mut desired = DesiredState::default();

    desired.deployments.push(deployment::all_in_one(jaeger, ctx));
    desired
        .services
        .extend(service::collector(jaeger, ctx, &name, COMPONENT_ALL_IN_ONE));
    desired
        .services
        .push(service::query(jaeger, ctx, &name, COMPONENT_ALL_IN_ONE));
    desired
        .services
        .push(service::agent(jaeger, ctx, &name, COMPONENT_ALL_IN_ONE));

    add_common(jaeger, ctx, &mut desired, &name)?;
    Ok(desired)
}
