//! # AWS Provider
//!
//! [`CloudSession`] backed by the AWS SDK. Identity scopes are named
//! profiles from the shared config files; deployment scopes are regions.
//!
//! - Buckets (S3): `HeadBucket` for existence, `GetBucketLifecycleConfiguration`
//!   for state, `PutBucketLifecycleConfiguration` for writes, `ListBuckets`
//!   pages for discovery.
//! - Log groups (CloudWatch Logs): `DescribeLogGroups` with a name prefix for
//!   existence and state, `PutRetentionPolicy` for writes, `DescribeLogGroups`
//!   pages for discovery.
//! - Identity: STS `GetCallerIdentity`.
//!
//! The engine is synchronous; each call blocks on a shared current-thread
//! tokio runtime.

use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{
    BucketLifecycleConfiguration, ExpirationStatus, LifecycleExpiration, LifecycleRule,
    LifecycleRuleFilter, NoncurrentVersionExpiration, NoncurrentVersionTransition, Transition,
    TransitionStorageClass,
};
use tokio::runtime::Runtime;

use lcw_core::{
    DeploymentScope, DesiredPolicy, IdentityScope, LifecyclePolicy, LifecycleRuleState,
    ObservedState, ResourceId, ResourceKind,
};
use lcw_engine::{CloudSession, Page, ProviderError, ResourceClient, SessionError};

/// Page size requested from `ListBuckets` and `DescribeLogGroups`.
const LIST_PAGE_SIZE: i32 = 50;

/// Session that opens SDK clients per profile and region.
pub struct AwsSession {
    runtime: Arc<Runtime>,
    kind: ResourceKind,
}

impl std::fmt::Debug for AwsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsSession").field("kind", &self.kind).finish()
    }
}

impl AwsSession {
    /// Create a session for one resource kind.
    pub fn new(kind: ResourceKind) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("cannot start async runtime for the AWS SDK")?;
        Ok(Self {
            runtime: Arc::new(runtime),
            kind,
        })
    }

    fn sdk_config(&self, identity: &IdentityScope, region: Option<&DeploymentScope>) -> SdkConfig {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).profile_name(identity.as_str());
        if let Some(r) = region {
            loader = loader.region(Region::new(r.as_str().to_string()));
        }
        self.runtime.block_on(loader.load())
    }
}

impl CloudSession for AwsSession {
    fn open(
        &self,
        identity: &IdentityScope,
        deployment: Option<&DeploymentScope>,
    ) -> Result<Box<dyn ResourceClient>, SessionError> {
        match (self.kind, deployment) {
            (ResourceKind::Bucket, None) => {
                let config = self.sdk_config(identity, None);
                if config.credentials_provider().is_none() {
                    return Err(SessionError::Credentials {
                        identity: identity.to_string(),
                        message: "no credentials provider resolved for profile".into(),
                    });
                }
                Ok(Box::new(S3Client {
                    runtime: Arc::clone(&self.runtime),
                    client: aws_sdk_s3::Client::new(&config),
                }))
            }
            (ResourceKind::LogGroup, Some(region)) => {
                let config = self.sdk_config(identity, Some(region));
                if config.credentials_provider().is_none() {
                    return Err(SessionError::Credentials {
                        identity: identity.to_string(),
                        message: "no credentials provider resolved for profile".into(),
                    });
                }
                Ok(Box::new(LogsClient {
                    runtime: Arc::clone(&self.runtime),
                    client: aws_sdk_cloudwatchlogs::Client::new(&config),
                }))
            }
            (kind, Some(d)) => Err(SessionError::ScopeShape(format!(
                "{kind} is global but deployment scope '{d}' was given"
            ))),
            (kind, None) => Err(SessionError::ScopeShape(format!(
                "{kind} requires a deployment scope"
            ))),
        }
    }

    fn describe_identity(&self, identity: &IdentityScope) -> Option<String> {
        let config = self.sdk_config(identity, None);
        let sts = aws_sdk_sts::Client::new(&config);
        match self.runtime.block_on(sts.get_caller_identity().send()) {
            Ok(out) => out.account().map(str::to_string),
            Err(e) => {
                tracing::warn!(identity = %identity, "GetCallerIdentity failed: {}", DisplayErrorContext(&e));
                None
            }
        }
    }
}

/// Map an SDK error onto the engine's provider error classes.
fn provider_error<E>(resource: &str, err: SdkError<E, HttpResponse>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    if matches!(err, SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)) {
        return ProviderError::Transient { message };
    }
    let status = err.raw_response().map(|r| r.status().as_u16());
    classify(resource, err.code(), status, message)
}

/// Service error code first, HTTP status when the service sent no code.
fn classify(resource: &str, code: Option<&str>, status: Option<u16>, message: String) -> ProviderError {
    match (code, status) {
        (Some("NoSuchBucket" | "NotFound" | "ResourceNotFoundException"), _) | (None, Some(404)) => {
            ProviderError::NotFound {
                resource: resource.to_string(),
            }
        }
        (Some("AccessDenied" | "AccessDeniedException" | "Forbidden"), _) | (None, Some(403)) => {
            ProviderError::AccessDenied {
                resource: resource.to_string(),
                message,
            }
        }
        (
            Some("Throttling" | "ThrottlingException" | "SlowDown" | "TooManyRequestsException"),
            _,
        )
        | (None, Some(429)) => ProviderError::Throttled { message },
        (_, Some(500..=599)) => ProviderError::Transient { message },
        _ => ProviderError::Rejected {
            resource: resource.to_string(),
            message,
        },
    }
}

fn days(v: Option<i32>) -> Option<u32> {
    v.and_then(|d| u32::try_from(d).ok())
}

fn as_days(v: u32, resource: &ResourceId) -> Result<i32, ProviderError> {
    i32::try_from(v).map_err(|_| ProviderError::Rejected {
        resource: resource.to_string(),
        message: format!("{v} days is out of range"),
    })
}

// ---------------------------------------------------------------------------
// S3
// ---------------------------------------------------------------------------

struct S3Client {
    runtime: Arc<Runtime>,
    client: aws_sdk_s3::Client,
}

impl S3Client {
    fn lifecycle_rule(policy: &LifecyclePolicy, bucket: &ResourceId) -> Result<LifecycleRule, ProviderError> {
        let mut rule = LifecycleRule::builder()
            .id(policy.rule_id(bucket))
            .filter(LifecycleRuleFilter::builder().prefix("").build())
            .status(ExpirationStatus::Enabled)
            .expiration(
                LifecycleExpiration::builder()
                    .days(as_days(policy.current.expire_after_days, bucket)?)
                    .build(),
            )
            .noncurrent_version_expiration(
                NoncurrentVersionExpiration::builder()
                    .noncurrent_days(as_days(policy.noncurrent.expire_after_days, bucket)?)
                    .build(),
            );
        if let Some(step) = policy.current.transition {
            rule = rule.transitions(
                Transition::builder()
                    .days(as_days(step.after_days, bucket)?)
                    .storage_class(TransitionStorageClass::from(step.storage_class.as_str()))
                    .build(),
            );
        }
        if let Some(step) = policy.noncurrent.transition {
            rule = rule.noncurrent_version_transitions(
                NoncurrentVersionTransition::builder()
                    .noncurrent_days(as_days(step.after_days, bucket)?)
                    .storage_class(TransitionStorageClass::from(step.storage_class.as_str()))
                    .build(),
            );
        }
        rule.build().map_err(|e| ProviderError::Rejected {
            resource: bucket.to_string(),
            message: e.to_string(),
        })
    }

    fn observed_rule(rule: &LifecycleRule) -> LifecycleRuleState {
        let transition = rule.transitions().first();
        let noncurrent_transition = rule.noncurrent_version_transitions().first();
        LifecycleRuleState {
            id: rule.id().map(str::to_string),
            enabled: *rule.status() == ExpirationStatus::Enabled,
            transition_after_days: days(transition.and_then(|t| t.days())),
            storage_class: transition
                .and_then(|t| t.storage_class())
                .map(|c| c.as_str().to_string()),
            expire_after_days: days(rule.expiration().and_then(|e| e.days())),
            noncurrent_transition_after_days: days(
                noncurrent_transition.and_then(|t| t.noncurrent_days()),
            ),
            noncurrent_expire_after_days: days(
                rule.noncurrent_version_expiration()
                    .and_then(|e| e.noncurrent_days()),
            ),
        }
    }
}

impl ResourceClient for S3Client {
    fn exists(&self, id: &ResourceId) -> Result<bool, ProviderError> {
        let req = self.client.head_bucket().bucket(id.as_str()).send();
        match self.runtime.block_on(req) {
            Ok(_) => Ok(true),
            Err(e) => match provider_error(id.as_str(), e) {
                ProviderError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }

    fn current_state(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
        let req = self
            .client
            .get_bucket_lifecycle_configuration()
            .bucket(id.as_str())
            .send();
        match self.runtime.block_on(req) {
            Ok(out) => Ok(ObservedState::Lifecycle {
                rules: out.rules().iter().map(Self::observed_rule).collect(),
            }),
            Err(e) if e.code() == Some("NoSuchLifecycleConfiguration") => {
                Ok(ObservedState::Lifecycle { rules: Vec::new() })
            }
            Err(e) if e.code() == Some("NoSuchBucket") => Ok(ObservedState::Absent),
            Err(e) => Err(provider_error(id.as_str(), e)),
        }
    }

    fn put_desired_state(&self, id: &ResourceId, policy: &DesiredPolicy) -> Result<(), ProviderError> {
        let DesiredPolicy::Lifecycle(lifecycle) = policy else {
            return Err(ProviderError::Unsupported {
                operation: format!("writing a {} policy to a bucket", policy.shape_name()),
            });
        };
        let config = BucketLifecycleConfiguration::builder()
            .rules(Self::lifecycle_rule(lifecycle, id)?)
            .build()
            .map_err(|e| ProviderError::Rejected {
                resource: id.to_string(),
                message: e.to_string(),
            })?;
        let req = self
            .client
            .put_bucket_lifecycle_configuration()
            .bucket(id.as_str())
            .lifecycle_configuration(config)
            .send();
        self.runtime
            .block_on(req)
            .map(|_| ())
            .map_err(|e| provider_error(id.as_str(), e))
    }

    fn list_page(&self, token: Option<&str>) -> Result<Page, ProviderError> {
        let req = self
            .client
            .list_buckets()
            .max_buckets(LIST_PAGE_SIZE)
            .set_continuation_token(token.map(str::to_string))
            .send();
        let out = self
            .runtime
            .block_on(req)
            .map_err(|e| provider_error("ListBuckets", e))?;
        Ok(Page {
            items: out
                .buckets()
                .iter()
                .filter_map(|b| b.name())
                .map(ResourceId::new)
                .collect(),
            next_token: out.continuation_token().map(str::to_string),
        })
    }
}

// ---------------------------------------------------------------------------
// CloudWatch Logs
// ---------------------------------------------------------------------------

struct LogsClient {
    runtime: Arc<Runtime>,
    client: aws_sdk_cloudwatchlogs::Client,
}

impl LogsClient {
    /// Find a log group by exact name, walking every page of the prefix match.
    fn find(&self, id: &ResourceId) -> Result<Option<aws_sdk_cloudwatchlogs::types::LogGroup>, ProviderError> {
        let mut token: Option<String> = None;
        loop {
            let req = self
                .client
                .describe_log_groups()
                .log_group_name_prefix(id.as_str())
                .set_next_token(token.take())
                .send();
            let out = self
                .runtime
                .block_on(req)
                .map_err(|e| provider_error(id.as_str(), e))?;
            if let Some(group) = out
                .log_groups()
                .iter()
                .find(|g| g.log_group_name() == Some(id.as_str()))
            {
                return Ok(Some(group.clone()));
            }
            match out.next_token() {
                Some(next) => token = Some(next.to_string()),
                None => return Ok(None),
            }
        }
    }
}

impl ResourceClient for LogsClient {
    fn exists(&self, id: &ResourceId) -> Result<bool, ProviderError> {
        Ok(self.find(id)?.is_some())
    }

    fn current_state(&self, id: &ResourceId) -> Result<ObservedState, ProviderError> {
        Ok(match self.find(id)? {
            Some(group) => ObservedState::Retention {
                retention_days: days(group.retention_in_days()),
            },
            None => ObservedState::Absent,
        })
    }

    fn put_desired_state(&self, id: &ResourceId, policy: &DesiredPolicy) -> Result<(), ProviderError> {
        let DesiredPolicy::Retention(retention) = policy else {
            return Err(ProviderError::Unsupported {
                operation: format!("writing a {} policy to a log group", policy.shape_name()),
            });
        };
        let req = self
            .client
            .put_retention_policy()
            .log_group_name(id.as_str())
            .retention_in_days(as_days(retention.retention_days, id)?)
            .send();
        self.runtime
            .block_on(req)
            .map(|_| ())
            .map_err(|e| provider_error(id.as_str(), e))
    }

    fn list_page(&self, token: Option<&str>) -> Result<Page, ProviderError> {
        let req = self
            .client
            .describe_log_groups()
            .limit(LIST_PAGE_SIZE)
            .set_next_token(token.map(str::to_string))
            .send();
        let out = self
            .runtime
            .block_on(req)
            .map_err(|e| provider_error("DescribeLogGroups", e))?;
        Ok(Page {
            items: out
                .log_groups()
                .iter()
                .filter_map(|g| g.log_group_name())
                .map(ResourceId::new)
                .collect(),
            next_token: out.next_token().map(str::to_string),
        })
    }
}
