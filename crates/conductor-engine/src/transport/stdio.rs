//! Stdio transport for subprocess providers.
//!
//! The child is spawned directly so stderr can be forwarded into the
//! provider's log buffer; rmcp drives JSON-RPC over the stdin/stdout pair.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{ConductorError, ServerLogger};
use rmcp::ServiceExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::{classify_connect_error, timeout_error, ConnectedProvider, Transport};
use crate::client::ProviderClientHandler;

pub struct StdioTransport {
    provider_id: String,
    command_path: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    logger: Arc<ServerLogger>,
    connect_timeout: Duration,
}

impl StdioTransport {
    pub fn new(
        provider_id: String,
        command_path: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        logger: Arc<ServerLogger>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            provider_id,
            command_path,
            args,
            env,
            logger,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(
        &self,
        handler: ProviderClientHandler,
    ) -> Result<ConnectedProvider, ConductorError> {
        info!(
            provider = %self.provider_id,
            command = %self.command_path.display(),
            "connecting to stdio provider"
        );
        self.logger.append(
            &self.provider_id,
            format!("spawning: {} {:?}", self.command_path.display(), self.args),
        );

        let mut child = Command::new(&self.command_path)
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConductorError::TransportCreation {
                provider_id: self.provider_id.clone(),
                reason: format!("failed to spawn process: {e}"),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ConductorError::TransportCreation {
                provider_id: self.provider_id.clone(),
                reason: "child stdout not captured".to_string(),
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ConductorError::TransportCreation {
                provider_id: self.provider_id.clone(),
                reason: "child stdin not captured".to_string(),
            })?;

        // Forward stderr lines into the provider's log buffer
        let stderr_task = child.stderr.take().map(|stderr| {
            let provider_id = self.provider_id.clone();
            let logger = Arc::clone(&self.logger);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(provider = %provider_id, "stderr: {line}");
                    logger.append(&provider_id, format!("stderr: {line}"));
                }
            })
        });

        let connect_future = handler.serve((stdout, stdin));
        let client = match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                let err = classify_connect_error(&self.provider_id, e);
                self.logger.append(&self.provider_id, err.to_string());
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(err);
            }
            Err(_) => {
                let err = timeout_error(&self.provider_id, self.connect_timeout);
                self.logger.append(&self.provider_id, err.to_string());
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(err);
            }
        };

        self.logger
            .append(&self.provider_id, "provider connected");

        Ok(ConnectedProvider {
            client,
            child: Some(child),
            stderr_task,
        })
    }

    fn kind(&self) -> &'static str {
        "stdio"
    }

    fn description(&self) -> String {
        format!("stdio:{}", self.command_path.display())
    }
}
