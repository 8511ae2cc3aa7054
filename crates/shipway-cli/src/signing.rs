//! Detached signing via an external GPG command.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use shipway_core::{ReleaseError, Result, SigningProvider};

use crate::manifest::SigningConfig;

/// Produces ASCII-armored detached signatures by piping the payload
/// through `gpg --detach-sign`.
pub struct GpgCommandSigner {
    command: String,
    key_id: Option<String>,
}

impl GpgCommandSigner {
    pub fn from_config(config: &SigningConfig) -> Self {
        Self {
            command: config.command.clone(),
            key_id: config.key_id.clone(),
        }
    }
}

#[async_trait]
impl SigningProvider for GpgCommandSigner {
    fn enabled(&self) -> bool {
        self.key_id.is_some()
    }

    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let key_id = self.key_id.as_deref().ok_or_else(|| {
            ReleaseError::Signing("no signing key configured".to_string())
        })?;
        debug!(key = key_id, size = data.len(), "signing payload");

        let mut child = Command::new(&self.command)
            .args([
                "--batch",
                "--yes",
                "--armor",
                "--detach-sign",
                "--local-user",
                key_id,
                "--output",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ReleaseError::Signing(format!("failed to spawn {}: {err}", self.command))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReleaseError::Signing("signer stdin unavailable".to_string()))?;
        stdin
            .write_all(data)
            .await
            .map_err(|err| ReleaseError::Signing(format!("failed to feed signer: {err}")))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| ReleaseError::Signing(format!("signer did not exit: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReleaseError::Signing(format!(
                "{} exited with {}: {}",
                self.command,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}
