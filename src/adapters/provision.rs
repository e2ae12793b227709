//! Idempotent-create provisioning adapters.
//!
//! One entry point per serving resource: database instance, target group,
//! load balancer (with its listener), and autoscaling group. A resource
//! that already exists is an `already_exists` outcome; missing
//! prerequisites (VPC, subnets, security group) are real errors.

use snafu::prelude::*;
use tracing::info;

use crate::config::{DatabaseConfig, ServingConfig};
use crate::error::{
    AdapterError, NoDefaultVpcSnafu, NoSubnetsSnafu, NotEnoughSubnetsSnafu, ProvisionSnafu,
    SecurityGroupNotFoundSnafu, TargetGroupNotFoundSnafu,
};
use crate::outcome::{Outcome, Provisioned};
use crate::services::Infrastructure;

/// Load balancers require subnets in at least two availability zones.
const LB_SUBNET_COUNT: usize = 2;

pub async fn database(infra: &dyn Infrastructure, config: &DatabaseConfig) -> Outcome {
    super::outcome_or_failure("provision-db", create_database(infra, config).await)
}

pub async fn target_group(infra: &dyn Infrastructure, config: &ServingConfig) -> Outcome {
    super::outcome_or_failure("provision-tg", create_target_group(infra, config).await)
}

pub async fn load_balancer(infra: &dyn Infrastructure, config: &ServingConfig) -> Outcome {
    super::outcome_or_failure("provision-lb", create_load_balancer(infra, config).await)
}

/// Overrides for one autoscaling group creation.
#[derive(Debug, Clone, Default)]
pub struct AsgRequest {
    /// Comma-separated subnet ids; falls back to the account's
    /// default-for-AZ subnets when absent.
    pub subnet_ids: Option<String>,
}

pub async fn auto_scaling_group(
    infra: &dyn Infrastructure,
    config: &ServingConfig,
    request: AsgRequest,
) -> Outcome {
    super::outcome_or_failure(
        "provision-asg",
        create_auto_scaling_group(infra, config, request).await,
    )
}

async fn create_database(
    infra: &dyn Infrastructure,
    config: &DatabaseConfig,
) -> Result<Outcome, AdapterError> {
    match infra
        .create_db_instance(config)
        .await
        .context(ProvisionSnafu)?
    {
        Provisioned::Created(()) => {
            info!("[provision-db] creating instance '{}'", config.instance_id);
            Ok(Outcome::ok("database instance creation initiated")
                .with("db_instance_identifier", config.instance_id.as_str()))
        }
        Provisioned::AlreadyExists => Ok(Outcome::already_exists(format!(
            "database instance '{}' already exists",
            config.instance_id
        ))
        .with("db_instance_identifier", config.instance_id.as_str())),
    }
}

async fn create_target_group(
    infra: &dyn Infrastructure,
    config: &ServingConfig,
) -> Result<Outcome, AdapterError> {
    let vpc_id = default_vpc(infra).await?;

    match infra
        .create_target_group(config, &vpc_id)
        .await
        .context(ProvisionSnafu)?
    {
        Provisioned::Created(arn) => {
            info!("[provision-tg] created '{}'", config.target_group);
            Ok(
                Outcome::ok(format!("created target group '{}'", config.target_group))
                    .with("target_group_arn", arn)
                    .with("vpc_id", vpc_id),
            )
        }
        Provisioned::AlreadyExists => Ok(Outcome::already_exists(format!(
            "target group '{}' already exists",
            config.target_group
        ))),
    }
}

async fn create_load_balancer(
    infra: &dyn Infrastructure,
    config: &ServingConfig,
) -> Result<Outcome, AdapterError> {
    let vpc_id = default_vpc(infra).await?;

    let subnets = infra.vpc_subnets(&vpc_id).await.context(ProvisionSnafu)?;
    if subnets.len() < LB_SUBNET_COUNT {
        return NotEnoughSubnetsSnafu {
            need: LB_SUBNET_COUNT,
            found: subnets.len(),
        }
        .fail()
        .context(ProvisionSnafu);
    }
    let subnets = &subnets[..LB_SUBNET_COUNT];

    let security_group = infra
        .security_group_id(&config.security_group, &vpc_id)
        .await
        .context(ProvisionSnafu)?;
    let Some(security_group) = security_group else {
        return SecurityGroupNotFoundSnafu {
            name: config.security_group.as_str(),
        }
        .fail()
        .context(ProvisionSnafu);
    };

    let target_group_arn = infra
        .target_group_arn(&config.target_group)
        .await
        .context(ProvisionSnafu)?;
    let Some(target_group_arn) = target_group_arn else {
        return TargetGroupNotFoundSnafu {
            name: config.target_group.as_str(),
        }
        .fail()
        .context(ProvisionSnafu);
    };

    let created = infra
        .create_load_balancer(&config.load_balancer, subnets, &security_group)
        .await
        .context(ProvisionSnafu)?;
    let balancer = match created {
        Provisioned::Created(info) => info,
        Provisioned::AlreadyExists => {
            return Ok(Outcome::already_exists(format!(
                "load balancer '{}' already exists",
                config.load_balancer
            )));
        }
    };
    info!(
        "[provision-lb] created '{}' at {}",
        config.load_balancer, balancer.dns_name
    );

    let listener = infra
        .create_listener(&balancer.arn, config.listener_port, &target_group_arn)
        .await
        .context(ProvisionSnafu)?;

    let mut outcome = Outcome::ok(format!(
        "created load balancer '{}'",
        config.load_balancer
    ))
    .with("load_balancer_arn", balancer.arn.as_str())
    .with("dns_name", balancer.dns_name.as_str());
    if let Provisioned::Created(listener_arn) = listener {
        outcome = outcome.with("listener_arn", listener_arn);
    }
    Ok(outcome)
}

async fn create_auto_scaling_group(
    infra: &dyn Infrastructure,
    config: &ServingConfig,
    request: AsgRequest,
) -> Result<Outcome, AdapterError> {
    let subnet_ids = match request.subnet_ids {
        Some(ids) if !ids.is_empty() => ids,
        _ => {
            let subnets = infra.default_subnets().await.context(ProvisionSnafu)?;
            if subnets.is_empty() {
                return NoSubnetsSnafu.fail().context(ProvisionSnafu);
            }
            info!("[provision-asg] using {} default subnets", subnets.len());
            subnets.join(",")
        }
    };

    match infra
        .create_auto_scaling_group(config, &subnet_ids)
        .await
        .context(ProvisionSnafu)?
    {
        Provisioned::Created(()) => Ok(Outcome::ok(format!(
            "created auto scaling group '{}'",
            config.asg_name
        ))
        .with("subnet_ids", subnet_ids)),
        Provisioned::AlreadyExists => Ok(Outcome::already_exists(format!(
            "auto scaling group '{}' already exists",
            config.asg_name
        ))),
    }
}

async fn default_vpc(infra: &dyn Infrastructure) -> Result<String, AdapterError> {
    match infra.default_vpc().await.context(ProvisionSnafu)? {
        Some(id) => Ok(id),
        None => NoDefaultVpcSnafu.fail().context(ProvisionSnafu),
    }
}
