//! scp/ssh side channel used to stage certificate material on the appliance
//!
//! The REST API can only install certificates and keys from files that
//! already exist on the appliance, so the PEM bytes are copied over with
//! `scp` first and removed with `ssh rm -f` afterwards.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Narrow file transfer capability used by the certificate lifecycle
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Copy `contents` to `remote_path` on the appliance
    async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<()>;

    /// Delete `remote_path` on the appliance; a missing file is not an error
    async fn remove(&self, remote_path: &str) -> Result<()>;
}

/// [`FileTransfer`] that shells out to the OpenSSH client tools
pub struct SshFileTransfer {
    target: String,
    // Private copy of the key with 0400 permissions; ssh refuses keys that
    // are readable by others, which mounted secrets often are.
    key_file: NamedTempFile,
}

impl SshFileTransfer {
    pub fn new(host: &str, username: &str, private_key: &Path) -> Result<Self> {
        let key = std::fs::read(private_key).map_err(|e| {
            Error::ConfigError(format!(
                "cannot read SSH private key {}: {}",
                private_key.display(),
                e
            ))
        })?;

        let mut key_file = tempfile::Builder::new()
            .prefix("f5-ssh-key-")
            .tempfile()?;
        key_file.write_all(&key)?;
        key_file.flush()?;
        std::fs::set_permissions(key_file.path(), std::fs::Permissions::from_mode(0o400))?;

        Ok(Self {
            target: format!("{}@{}", username, host),
            key_file,
        })
    }

    fn ssh_options(&self) -> Vec<String> {
        let mut options: Vec<String> = [
            "StrictHostKeyChecking=no",
            "GSSAPIAuthentication=no",
            "PasswordAuthentication=no",
            "PubkeyAuthentication=yes",
            "VerifyHostKeyDNS=no",
            "UserKnownHostsFile=/dev/null",
        ]
        .iter()
        .flat_map(|opt| ["-o".to_string(), opt.to_string()])
        .collect();
        options.push("-i".to_string());
        options.push(self.key_file.path().display().to_string());
        options
    }

    async fn run(&self, program: &str, args: Vec<String>) -> Result<()> {
        debug!("Running {} {:?}", program, args);
        let output = Command::new(program).args(&args).output().await?;
        if output.status.success() {
            return Ok(());
        }

        Err(Error::TransferError(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[async_trait]
impl FileTransfer for SshFileTransfer {
    #[instrument(skip(self, contents), fields(bytes = contents.len()))]
    async fn upload(&self, contents: &[u8], remote_path: &str) -> Result<()> {
        let mut local = NamedTempFile::new()?;
        local.write_all(contents)?;
        local.flush()?;

        let mut args = self.ssh_options();
        args.push(local.path().display().to_string());
        args.push(format!("{}:{}", self.target, remote_path));
        self.run("scp", args).await
    }

    #[instrument(skip(self))]
    async fn remove(&self, remote_path: &str) -> Result<()> {
        let mut args = self.ssh_options();
        args.push(self.target.clone());
        args.push("rm".to_string());
        args.push("-f".to_string());
        args.push(remote_path.to_string());
        self.run("ssh", args).await
    }
}
