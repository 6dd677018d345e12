//! Out-of-process stage.
//!
//! Runs an external program per payload: the payload is written to the
//! child's stdin and the child's stdout becomes the new payload. Stage
//! logic can then be redeployed without rebuilding the subscriber.

use crate::pipeline::Stage;
use crate::stages::StageDescriptor;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::process::Stdio;
use taskq_shared::{Payload, TaskqError, TaskqResult};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Default)]
pub struct Exec;

#[async_trait]
impl Stage for Exec {
    const KIND: &'static str = "exec";
    type Config = ExecConfig;

    async fn transform(&self, payload: &[u8], config: &ExecConfig) -> TaskqResult<Payload> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TaskqError::Stage(format!(
                    "exec: failed to spawn '{}': {}",
                    config.program, e
                ))
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(payload).await?;
                // Dropping stdin closes the pipe so the child sees EOF.
            }
            Ok::<_, std::io::Error>(())
        };

        // Write stdin and drain stdout concurrently; the child may block on a full pipe.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| {
            TaskqError::Stage(format!("exec: failed to wait for '{}': {}", config.program, e))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TaskqError::Stage(format!(
                "exec: '{}' exited with {}: {}",
                config.program,
                output.status,
                stderr.trim()
            )));
        }

        match fed {
            // The child may exit successfully without reading all of its input.
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(TaskqError::Stage(
                format!("exec: failed to write to '{}': {}", config.program, e),
            )),
            _ => Ok(output.stdout),
        }
    }
}

inventory::submit! { StageDescriptor::of::<Exec>() }
