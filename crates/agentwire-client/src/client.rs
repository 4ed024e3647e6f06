//! Caller-side RPC driver.
//!
//! Every call looks synchronous to the caller: asynchronous agent methods are
//! polled with `get_task` until they leave the running state. Only the
//! polling phase and `get_state` tolerate transport errors; every other
//! initial send is attempted exactly once.

use std::sync::Arc;
use std::time::Duration;

use agentwire_core::config::ClientConfig;
use agentwire_core::types::{AgentRequestMessage, Response, TaskStateValue, GET_TASK_METHOD};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ClientError;
use crate::retry::{Attempt, AttemptRetryStrategy, ErrorTolerance, Retryable, UnlimitedRetryStrategy};
use crate::transport::AgentTransport;

const RUN_SCRIPT_METHOD: &str = "run_script";
const GET_STATE_METHOD: &str = "get_state";

/// A named, versioned blob: a package source or a compiled package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub name: String,
    pub version: String,
    pub sha1: String,
    pub blobstore_id: String,
}

pub struct AgentClient {
    transport: Arc<dyn AgentTransport>,
    reply_to: String,
    get_task_delay: Duration,
    tolerated_error_count: usize,
}

impl AgentClient {
    pub fn new(transport: Arc<dyn AgentTransport>, reply_to: impl Into<String>, config: &ClientConfig) -> Self {
        Self {
            transport,
            reply_to: reply_to.into(),
            get_task_delay: Duration::from_millis(config.get_task_delay_ms),
            tolerated_error_count: config.tolerated_error_count,
        }
    }

    /// Override the polling interval.
    pub fn with_get_task_delay(mut self, delay: Duration) -> Self {
        self.get_task_delay = delay;
        self
    }

    pub async fn ping(&self) -> Result<String, ClientError> {
        let value = self.send_message("ping", vec![]).await?;
        expect_string("ping", value)
    }

    pub async fn stop(&self) -> Result<(), ClientError> {
        self.send_async_task_message("stop", vec![]).await?;
        Ok(())
    }

    /// Start the agent's job services. Anything but "started" is an error.
    pub async fn start(&self) -> Result<(), ClientError> {
        let value = self.send_message("start", vec![]).await?;
        if value != json!("started") {
            return Err(ClientError::Protocol(format!(
                "Failed to start agent services with response: '{}'",
                value
            )));
        }
        Ok(())
    }

    /// Fetch the agent's state document.
    ///
    /// Transport errors are retried up to `tolerated_error_count` times;
    /// an exception from the agent is returned immediately.
    pub async fn get_state(&self) -> Result<Value, ClientError> {
        let mut query = StateQuery {
            transport: Arc::clone(&self.transport),
            message: AgentRequestMessage::new(GET_STATE_METHOD, vec![], self.reply_to.clone()),
        };
        AttemptRetryStrategy::new(self.tolerated_error_count + 1, self.get_task_delay)
            .run(&mut query)
            .await
    }

    pub async fn apply(&self, spec: Value) -> Result<(), ClientError> {
        self.send_async_task_message("apply", vec![spec]).await?;
        Ok(())
    }

    /// Disk ids currently attached to the agent's machine.
    pub async fn list_disk(&self) -> Result<Vec<String>, ClientError> {
        let value = self.send_message("list_disk", vec![]).await?;
        serde_json::from_value(value.clone()).map_err(|_| {
            ClientError::Protocol(format!("Unexpected 'list_disk' response: {}", value))
        })
    }

    pub async fn mount_disk(&self, disk_cid: &str) -> Result<(), ClientError> {
        self.send_async_task_message("mount_disk", vec![json!(disk_cid)]).await?;
        Ok(())
    }

    pub async fn unmount_disk(&self, disk_cid: &str) -> Result<(), ClientError> {
        self.send_async_task_message("unmount_disk", vec![json!(disk_cid)]).await?;
        Ok(())
    }

    pub async fn migrate_disk(&self) -> Result<(), ClientError> {
        self.send_async_task_message("migrate_disk", vec![]).await?;
        Ok(())
    }

    /// Compile a package against already compiled dependencies and return
    /// a reference to the compiled blob.
    pub async fn compile_package(
        &self,
        source: &BlobRef,
        dependencies: &[BlobRef],
    ) -> Result<BlobRef, ClientError> {
        let mut deps = Map::new();
        for dependency in dependencies {
            deps.insert(dependency.name.clone(), json!(dependency));
        }
        let arguments = vec![
            json!(source.blobstore_id),
            json!(source.sha1),
            json!(source.name),
            json!(source.version),
            Value::Object(deps),
        ];

        let value = self.send_async_task_message("compile_package", arguments).await?;
        let result = value.get("result");
        let field = |name: &str| result.and_then(|r| r.get(name)).and_then(Value::as_str);
        match (field("sha1"), field("blobstore_id")) {
            (Some(sha1), Some(blobstore_id)) => Ok(BlobRef {
                name: source.name.clone(),
                version: source.version.clone(),
                sha1: sha1.to_string(),
                blobstore_id: blobstore_id.to_string(),
            }),
            _ => Err(ClientError::Protocol(format!(
                "Unable to parse 'compile_package' response from the agent: {}",
                value
            ))),
        }
    }

    pub async fn delete_arp_entries(&self, ips: &[String]) -> Result<(), ClientError> {
        self.send_message("delete_arp_entries", vec![json!({ "ips": ips })])
            .await?;
        Ok(())
    }

    /// Run a named script on the agent.
    ///
    /// Agents that predate `run_script` answer "unknown message run_script";
    /// that one answer counts as success.
    pub async fn run_script(&self, script_name: &str, options: Value) -> Result<(), ClientError> {
        match self
            .send_async_task_message(RUN_SCRIPT_METHOD, vec![json!(script_name), options])
            .await
        {
            Ok(_) => Ok(()),
            Err(ClientError::TaskFailed(message))
                if message == format!("unknown message {}", RUN_SCRIPT_METHOD) =>
            {
                tracing::info!(script = %script_name, "Agent does not support run_script, skipping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn sync_dns(&self, blob_id: &str, digest: &str, version: u64) -> Result<String, ClientError> {
        let value = self
            .send_message("sync_dns", vec![json!(blob_id), json!(digest), json!(version)])
            .await?;
        expect_string("sync_dns", value)
    }

    /// Single `get_task` call, without polling.
    pub async fn get_task(&self, task_id: &str) -> Result<Value, ClientError> {
        self.send_message(GET_TASK_METHOD, vec![json!(task_id)]).await
    }

    pub async fn cancel_task(&self, task_id: &str) -> Result<(), ClientError> {
        self.send_message("cancel_task", vec![json!(task_id)]).await?;
        Ok(())
    }

    /// Send one request and unwrap its response. Never retried.
    pub async fn send_message(&self, method: &str, arguments: Vec<Value>) -> Result<Value, ClientError> {
        let message = AgentRequestMessage::new(method, arguments, self.reply_to.clone());
        tracing::debug!(method, reply_to = %self.reply_to, "Sending request to agent");

        let response = self
            .transport
            .send(&message)
            .await
            .map_err(|e| ClientError::transport(method, e))?;

        match response {
            Response::Value(value) => Ok(value),
            Response::Exception(exception) => Err(ClientError::TaskFailed(exception.message)),
        }
    }

    /// Send a request and, if the agent started a task, poll until it ends.
    pub async fn send_async_task_message(
        &self,
        method: &str,
        arguments: Vec<Value>,
    ) -> Result<Value, ClientError> {
        let value = self.send_message(method, arguments).await?;
        match TaskStateValue::from_value(&value) {
            Some(task) => {
                tracing::debug!(method, task_id = %task.agent_task_id, "Polling agent task");
                self.poll_task(&task.agent_task_id).await
            }
            None => Ok(value),
        }
    }

    async fn poll_task(&self, task_id: &str) -> Result<Value, ClientError> {
        let poll = TaskPoll {
            transport: Arc::clone(&self.transport),
            message: AgentRequestMessage::new(GET_TASK_METHOD, vec![json!(task_id)], self.reply_to.clone()),
        };
        let mut tolerant = ErrorTolerance::new(poll, self.tolerated_error_count);
        UnlimitedRetryStrategy::new(self.get_task_delay)
            .run(&mut tolerant)
            .await
    }
}

fn expect_string(method: &str, value: Value) -> Result<String, ClientError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ClientError::Protocol(format!(
            "Unexpected '{}' response: {}",
            method, other
        ))),
    }
}

/// One `get_state` round trip. Only transport failures are worth retrying.
struct StateQuery {
    transport: Arc<dyn AgentTransport>,
    message: AgentRequestMessage,
}

#[async_trait]
impl Retryable for StateQuery {
    type Output = Value;
    type Error = ClientError;

    async fn attempt(&mut self) -> Attempt<Value, ClientError> {
        match self.transport.send(&self.message).await {
            Err(e) => Attempt::Transient(ClientError::transport(GET_STATE_METHOD, e)),
            Ok(Response::Exception(exception)) => Attempt::Fatal(ClientError::TaskFailed(exception.message)),
            Ok(Response::Value(value)) => Attempt::Ready(value),
        }
    }
}

/// One `get_task` round trip, classified for the retry strategies.
struct TaskPoll {
    transport: Arc<dyn AgentTransport>,
    message: AgentRequestMessage,
}

#[async_trait]
impl Retryable for TaskPoll {
    type Output = Value;
    type Error = ClientError;

    async fn attempt(&mut self) -> Attempt<Value, ClientError> {
        match self.transport.send(&self.message).await {
            Err(e) => Attempt::Transient(ClientError::transport(GET_TASK_METHOD, e)),
            Ok(Response::Exception(exception)) => Attempt::Fatal(ClientError::TaskFailed(exception.message)),
            Ok(Response::Value(value)) => match TaskStateValue::from_value(&value) {
                Some(task) if task.is_running() => Attempt::Pending,
                _ => Attempt::Ready(value),
            },
        }
    }
}
