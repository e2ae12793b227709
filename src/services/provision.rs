//! Infrastructure provisioning on the AWS SDKs.
//!
//! Each wrapper makes one creation call and classifies the provider's
//! "already exists" fault into `Provisioned::AlreadyExists`; every other
//! failure is a real error. No rollback, no partial-state cleanup.

use async_trait::async_trait;
use aws_sdk_autoscaling::types::LaunchTemplateSpecification;
use aws_sdk_ec2::types::Filter;
use aws_sdk_elasticloadbalancingv2::types::{
    Action, ActionTypeEnum, IpAddressType, LoadBalancerSchemeEnum, LoadBalancerTypeEnum, Matcher,
    ProtocolEnum, TargetTypeEnum,
};
use snafu::prelude::*;
use tracing::debug;

use crate::config::{DatabaseConfig, ServingConfig};
use crate::error::{ProvisionApiSnafu, ProvisionError};
use crate::outcome::Provisioned;

use super::{Infrastructure, LoadBalancerInfo, sdk_error_message};

/// Name tag propagated to instances launched by the autoscaling group.
const ASG_INSTANCE_TAG: &str = "ml-instance";

/// Provisioning implementation on the AWS SDK clients.
#[derive(Debug, Clone)]
pub struct AwsInfrastructure {
    rds: aws_sdk_rds::Client,
    ec2: aws_sdk_ec2::Client,
    elb: aws_sdk_elasticloadbalancingv2::Client,
    autoscaling: aws_sdk_autoscaling::Client,
}

impl AwsInfrastructure {
    pub fn new(
        rds: aws_sdk_rds::Client,
        ec2: aws_sdk_ec2::Client,
        elb: aws_sdk_elasticloadbalancingv2::Client,
        autoscaling: aws_sdk_autoscaling::Client,
    ) -> Self {
        Self {
            rds,
            ec2,
            elb,
            autoscaling,
        }
    }
}

fn api_error<E: std::error::Error>(err: &E) -> ProvisionError {
    ProvisionApiSnafu {
        message: sdk_error_message(err),
    }
    .build()
}

#[async_trait]
impl Infrastructure for AwsInfrastructure {
    async fn create_db_instance(
        &self,
        config: &DatabaseConfig,
    ) -> Result<Provisioned, ProvisionError> {
        let request = self
            .rds
            .create_db_instance()
            .db_instance_identifier(&config.instance_id)
            .db_name(&config.db_name)
            .allocated_storage(config.allocated_storage_gb)
            .db_instance_class(&config.instance_class)
            .engine(&config.engine)
            .master_username(&config.user)
            .master_user_password(&config.password)
            .publicly_accessible(true)
            .set_vpc_security_group_ids(config.security_group_id.clone().map(|id| vec![id]))
            .set_db_subnet_group_name(config.subnet_group.clone())
            .backup_retention_period(1)
            .storage_type("gp2")
            .multi_az(false)
            .auto_minor_version_upgrade(true)
            .tags(
                aws_sdk_rds::types::Tag::builder()
                    .key("Name")
                    .value(&config.instance_id)
                    .build(),
            );

        match request.send().await {
            Ok(_) => {
                debug!("[rds] creating instance '{}'", config.instance_id);
                Ok(Provisioned::Created(()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_db_instance_already_exists_fault() {
                    Ok(Provisioned::AlreadyExists)
                } else {
                    Err(api_error(&service_err))
                }
            }
        }
    }

    async fn db_endpoint(&self, instance_id: &str) -> Result<Option<String>, ProvisionError> {
        match self
            .rds
            .describe_db_instances()
            .db_instance_identifier(instance_id)
            .send()
            .await
        {
            Ok(response) => Ok(response
                .db_instances()
                .first()
                .and_then(|instance| instance.endpoint())
                .and_then(|endpoint| endpoint.address())
                .map(str::to_string)),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_db_instance_not_found_fault() {
                    Ok(None)
                } else {
                    Err(api_error(&service_err))
                }
            }
        }
    }

    async fn default_vpc(&self) -> Result<Option<String>, ProvisionError> {
        let response = self
            .ec2
            .describe_vpcs()
            .filters(Filter::builder().name("isDefault").values("true").build())
            .send()
            .await
            .map_err(|err| api_error(&err))?;

        Ok(response
            .vpcs()
            .first()
            .and_then(|vpc| vpc.vpc_id())
            .map(str::to_string))
    }

    async fn vpc_subnets(&self, vpc_id: &str) -> Result<Vec<String>, ProvisionError> {
        let response = self
            .ec2
            .describe_subnets()
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|err| api_error(&err))?;

        Ok(response
            .subnets()
            .iter()
            .filter_map(|subnet| subnet.subnet_id())
            .map(str::to_string)
            .collect())
    }

    async fn default_subnets(&self) -> Result<Vec<String>, ProvisionError> {
        let response = self
            .ec2
            .describe_subnets()
            .filters(
                Filter::builder()
                    .name("default-for-az")
                    .values("true")
                    .build(),
            )
            .send()
            .await
            .map_err(|err| api_error(&err))?;

        Ok(response
            .subnets()
            .iter()
            .filter_map(|subnet| subnet.subnet_id())
            .map(str::to_string)
            .collect())
    }

    async fn security_group_id(
        &self,
        name: &str,
        vpc_id: &str,
    ) -> Result<Option<String>, ProvisionError> {
        let response = self
            .ec2
            .describe_security_groups()
            .filters(Filter::builder().name("group-name").values(name).build())
            .filters(Filter::builder().name("vpc-id").values(vpc_id).build())
            .send()
            .await
            .map_err(|err| api_error(&err))?;

        Ok(response
            .security_groups()
            .first()
            .and_then(|group| group.group_id())
            .map(str::to_string))
    }

    async fn target_group_arn(&self, name: &str) -> Result<Option<String>, ProvisionError> {
        match self.elb.describe_target_groups().names(name).send().await {
            Ok(response) => Ok(response
                .target_groups()
                .first()
                .and_then(|group| group.target_group_arn())
                .map(str::to_string)),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_target_group_not_found_exception() {
                    Ok(None)
                } else {
                    Err(api_error(&service_err))
                }
            }
        }
    }

    async fn create_target_group(
        &self,
        config: &ServingConfig,
        vpc_id: &str,
    ) -> Result<Provisioned<String>, ProvisionError> {
        let name_tag = aws_sdk_elasticloadbalancingv2::types::Tag::builder()
            .key("Name")
            .value(&config.target_group)
            .build()
            .map_err(|err| api_error(&err))?;

        let request = self
            .elb
            .create_target_group()
            .name(&config.target_group)
            .protocol(ProtocolEnum::Http)
            .port(config.target_port)
            .vpc_id(vpc_id)
            .target_type(TargetTypeEnum::Instance)
            .protocol_version("HTTP1")
            .health_check_enabled(true)
            .health_check_protocol(ProtocolEnum::Http)
            .health_check_port("traffic-port")
            .health_check_path("/")
            .health_check_interval_seconds(300)
            .health_check_timeout_seconds(10)
            .healthy_threshold_count(5)
            .unhealthy_threshold_count(10)
            .matcher(Matcher::builder().http_code("200-400").build())
            .tags(name_tag);

        match request.send().await {
            Ok(response) => {
                let arn = response
                    .target_groups()
                    .first()
                    .and_then(|group| group.target_group_arn())
                    .map(str::to_string)
                    .context(ProvisionApiSnafu {
                        message: "target group creation returned no ARN",
                    })?;
                debug!("[elb] created target group {}", arn);
                Ok(Provisioned::Created(arn))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_duplicate_target_group_name_exception() {
                    Ok(Provisioned::AlreadyExists)
                } else {
                    Err(api_error(&service_err))
                }
            }
        }
    }

    async fn create_load_balancer(
        &self,
        name: &str,
        subnet_ids: &[String],
        security_group_id: &str,
    ) -> Result<Provisioned<LoadBalancerInfo>, ProvisionError> {
        let name_tag = aws_sdk_elasticloadbalancingv2::types::Tag::builder()
            .key("Name")
            .value(name)
            .build()
            .map_err(|err| api_error(&err))?;

        let request = self
            .elb
            .create_load_balancer()
            .name(name)
            .set_subnets(Some(subnet_ids.to_vec()))
            .security_groups(security_group_id)
            .scheme(LoadBalancerSchemeEnum::InternetFacing)
            .r#type(LoadBalancerTypeEnum::Application)
            .ip_address_type(IpAddressType::Ipv4)
            .tags(name_tag);

        match request.send().await {
            Ok(response) => {
                let balancer = response.load_balancers().first().context(ProvisionApiSnafu {
                    message: "load balancer creation returned no record",
                })?;
                let info = LoadBalancerInfo {
                    arn: balancer.load_balancer_arn().unwrap_or_default().to_string(),
                    dns_name: balancer.dns_name().unwrap_or_default().to_string(),
                };
                debug!("[elb] created load balancer {}", info.arn);
                Ok(Provisioned::Created(info))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_duplicate_load_balancer_name_exception() {
                    Ok(Provisioned::AlreadyExists)
                } else {
                    Err(api_error(&service_err))
                }
            }
        }
    }

    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        port: i32,
        target_group_arn: &str,
    ) -> Result<Provisioned<String>, ProvisionError> {
        let forward = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .target_group_arn(target_group_arn)
            .build()
            .map_err(|err| api_error(&err))?;

        let request = self
            .elb
            .create_listener()
            .load_balancer_arn(load_balancer_arn)
            .protocol(ProtocolEnum::Http)
            .port(port)
            .default_actions(forward);

        match request.send().await {
            Ok(response) => {
                let arn = response
                    .listeners()
                    .first()
                    .and_then(|listener| listener.listener_arn())
                    .map(str::to_string)
                    .context(ProvisionApiSnafu {
                        message: "listener creation returned no ARN",
                    })?;
                debug!("[elb] created listener {}", arn);
                Ok(Provisioned::Created(arn))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_duplicate_listener_exception() {
                    Ok(Provisioned::AlreadyExists)
                } else {
                    Err(api_error(&service_err))
                }
            }
        }
    }

    async fn create_auto_scaling_group(
        &self,
        config: &ServingConfig,
        subnet_ids_csv: &str,
    ) -> Result<Provisioned, ProvisionError> {
        let name_tag = aws_sdk_autoscaling::types::Tag::builder()
            .key("Name")
            .value(ASG_INSTANCE_TAG)
            .propagate_at_launch(true)
            .build()
            .map_err(|err| api_error(&err))?;

        let request = self
            .autoscaling
            .create_auto_scaling_group()
            .auto_scaling_group_name(&config.asg_name)
            .launch_template(
                LaunchTemplateSpecification::builder()
                    .launch_template_name(&config.launch_template)
                    .version("$Default")
                    .build(),
            )
            .min_size(config.min_size)
            .max_size(config.max_size)
            .desired_capacity(config.desired_capacity)
            .vpc_zone_identifier(subnet_ids_csv)
            .tags(name_tag);

        match request.send().await {
            Ok(_) => {
                debug!("[asg] created group '{}'", config.asg_name);
                Ok(Provisioned::Created(()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_already_exists_fault() {
                    Ok(Provisioned::AlreadyExists)
                } else {
                    Err(api_error(&service_err))
                }
            }
        }
    }
}
