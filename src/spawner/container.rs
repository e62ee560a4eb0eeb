//! Container spawner (spec §4.D): submits a Kubernetes `Job` with
//! `serializedConfig` carried as environment variables, then polls the
//! orchestrator until the job reaches a terminal state.

use super::{Completion, Runner, Spawner};
use crate::errors::CoordinatorError;
use crate::model::ResourceId;
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use kube::api::{DeleteParams, ObjectMeta, PostParams};
use kube::{Api, Client};
use std::time::Duration;
use tokio::time::sleep;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct ContainerSpawner {
    client: Client,
    namespace: String,
    image: String,
}

impl ContainerSpawner {
    pub fn new(client: Client, namespace: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            image: image.into(),
        }
    }

    fn jobs_api(&self) -> Api<Job> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn job_name(kind: &str, resource_id: &ResourceId) -> String {
        let slug = format!("{}-{}-{}", kind, resource_id.name, resource_id.variant)
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
            .collect::<String>();
        format!("coordinator-job-{slug}")
    }
}

#[async_trait]
impl Spawner for ContainerSpawner {
    async fn get_runner(
        &self,
        kind: &str,
        serialized_config: Vec<u8>,
        resource_id: &ResourceId,
    ) -> Result<Box<dyn Runner>, CoordinatorError> {
        Ok(Box::new(ContainerRunner {
            jobs: self.jobs_api(),
            image: self.image.clone(),
            name: Self::job_name(kind, resource_id),
            kind: kind.to_string(),
            serialized_config,
            resource_id: resource_id.clone(),
        }))
    }
}

struct ContainerRunner {
    jobs: Api<Job>,
    image: String,
    name: String,
    kind: String,
    serialized_config: Vec<u8>,
    resource_id: ResourceId,
}

#[async_trait]
impl Runner for ContainerRunner {
    async fn run(self: Box<Self>) -> Box<dyn Completion> {
        let job = Job {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            spec: Some(k8s_openapi::api::batch::v1::JobSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        restart_policy: Some("Never".to_string()),
                        containers: vec![Container {
                            name: "runner".to_string(),
                            image: Some(self.image.clone()),
                            env: Some(vec![
                                EnvVar {
                                    name: "RUNNER_KIND".to_string(),
                                    value: Some(self.kind.clone()),
                                    ..Default::default()
                                },
                                EnvVar {
                                    name: "RUNNER_RESOURCE_ID".to_string(),
                                    value: Some(self.resource_id.to_string()),
                                    ..Default::default()
                                },
                                EnvVar {
                                    name: "RUNNER_CONFIG".to_string(),
                                    value: Some(String::from_utf8_lossy(&self.serialized_config).to_string()),
                                    ..Default::default()
                                },
                            ]),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                backoff_limit: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };

        match self.jobs.create(&PostParams::default(), &job).await {
            Ok(_) => Box::new(ContainerCompletion {
                jobs: self.jobs,
                name: self.name,
                resource: self.resource_id.to_string(),
                submit_error: None,
            }),
            Err(e) => Box::new(ContainerCompletion {
                jobs: self.jobs,
                name: self.name,
                resource: self.resource_id.to_string(),
                submit_error: Some(e.to_string()),
            }),
        }
    }
}

struct ContainerCompletion {
    jobs: Api<Job>,
    name: String,
    resource: String,
    submit_error: Option<String>,
}

#[async_trait]
impl Completion for ContainerCompletion {
    async fn wait(self: Box<Self>) -> Result<(), CoordinatorError> {
        if let Some(reason) = self.submit_error {
            return Err(CoordinatorError::RunnerFailure {
                resource: self.resource,
                reason,
            });
        }

        loop {
            let job = self
                .jobs
                .get(&self.name)
                .await
                .map_err(|e| CoordinatorError::RunnerFailure {
                    resource: self.resource.clone(),
                    reason: e.to_string(),
                })?;

            if let Some(status) = job.status {
                if status.succeeded.unwrap_or(0) > 0 {
                    let _ = self.jobs.delete(&self.name, &DeleteParams::background()).await;
                    return Ok(());
                }
                if status.failed.unwrap_or(0) > 0 {
                    let _ = self.jobs.delete(&self.name, &DeleteParams::background()).await;
                    return Err(CoordinatorError::RunnerFailure {
                        resource: self.resource,
                        reason: "job reported failed pod(s)".to_string(),
                    });
                }
            }

            sleep(POLL_INTERVAL).await;
        }
    }
}
