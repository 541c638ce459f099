//! Kernel process launching.
//!
//! The launcher is the boundary to whatever actually runs a kernel. The
//! built-in [`ProcessLauncher`] starts the spec's command as a local process;
//! cluster backends provide their own implementation of [`KernelLauncher`].

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::process::Stdio;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

use crate::error::{GatewayError, Result};
use crate::services::kernels::KernelHandle;
use crate::services::kernelspecs::KernelSpec;

/// Everything a launcher needs to start one kernel.
#[derive(Debug)]
pub struct LaunchRequest<'a> {
    pub handle: &'a KernelHandle,
    pub spec: &'a KernelSpec,
    pub env: BTreeMap<String, String>,
}

#[async_trait]
pub trait KernelLauncher: Send + Sync + Debug {
    async fn launch(&self, request: &LaunchRequest<'_>) -> Result<()>;

    /// Check that a kernel is alive. Used to reattach persisted sessions;
    /// callers bound this with a timeout.
    async fn probe(&self, handle: &KernelHandle) -> Result<()>;

    async fn terminate(&self, handle: &KernelHandle) -> Result<()>;
}

/// Runs kernels as child processes of the gateway.
#[derive(Debug, Default)]
pub struct ProcessLauncher {
    children: DashMap<String, Child>,
}

impl ProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }
}

fn substitute(arg: &str, handle: &KernelHandle) -> String {
    let ports = handle
        .ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(",");
    arg.replace("{kernel_id}", &handle.kernel_id)
        .replace("{host}", &handle.host)
        .replace("{ports}", &ports)
        .replace("{username}", &handle.username)
}

#[async_trait]
impl KernelLauncher for ProcessLauncher {
    async fn launch(&self, request: &LaunchRequest<'_>) -> Result<()> {
        let handle = request.handle;
        let argv: Vec<String> = request.spec.argv.iter().map(|a| substitute(a, handle)).collect();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| GatewayError::Launch(format!("kernel spec '{}' has no command", request.spec.name)))?;

        let child = Command::new(program)
            .args(args)
            .envs(&request.spec.env)
            .envs(&request.env)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatewayError::Launch(format!("failed to spawn '{}': {}", program, e)))?;

        tracing::info!(
            kernel_id = %handle.kernel_id,
            pid = ?child.id(),
            program = %program,
            "Kernel process started"
        );
        self.children.insert(handle.kernel_id.clone(), child);
        Ok(())
    }

    async fn probe(&self, handle: &KernelHandle) -> Result<()> {
        if let Some(mut child) = self.children.get_mut(&handle.kernel_id) {
            return match child.try_wait()? {
                None => Ok(()),
                Some(status) => Err(GatewayError::Recovery(format!(
                    "kernel {} exited with {}",
                    handle.kernel_id, status
                ))),
            };
        }

        let port = handle
            .ports
            .first()
            .ok_or_else(|| GatewayError::Recovery(format!("kernel {} has no transport ports", handle.kernel_id)))?;
        TcpStream::connect((handle.host.as_str(), *port))
            .await
            .map(|_| ())
            .map_err(|e| {
                GatewayError::Recovery(format!("kernel {} unreachable at {}:{}: {}", handle.kernel_id, handle.host, port, e))
            })
    }

    async fn terminate(&self, handle: &KernelHandle) -> Result<()> {
        // Reattached kernels were started by an earlier gateway process and
        // have no child here; they must outlive this process.
        let (_, mut child) = self.children.remove(&handle.kernel_id).ok_or_else(|| {
            GatewayError::Launch(format!(
                "kernel {} was not started by this process and cannot be stopped",
                handle.kernel_id
            ))
        })?;

        if child.try_wait()?.is_some() {
            return Ok(());
        }
        child
            .kill()
            .await
            .map_err(|e| GatewayError::Launch(format!("failed to kill kernel {}: {}", handle.kernel_id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> KernelHandle {
        KernelHandle {
            kernel_id: "k-1".to_string(),
            kernel_name: "python3".to_string(),
            username: "alice".to_string(),
            host: "localhost".to_string(),
            ports: vec![5000, 5001],
        }
    }

    #[test]
    fn test_substitution() {
        let h = handle();
        assert_eq!(substitute("--id={kernel_id}", &h), "--id=k-1");
        assert_eq!(substitute("{host}:{ports}", &h), "localhost:5000,5001");
        assert_eq!(substitute("{username}", &h), "alice");
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let launcher = ProcessLauncher::new();
        let mut h = handle();
        // Bind then drop to get a port nobody is listening on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        h.ports = vec![listener.local_addr().unwrap().port()];
        h.host = "127.0.0.1".to_string();
        drop(listener);
        assert!(matches!(launcher.probe(&h).await, Err(GatewayError::Recovery(_))));
    }

    #[tokio::test]
    async fn test_probe_reachable() {
        let launcher = ProcessLauncher::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut h = handle();
        h.host = "127.0.0.1".to_string();
        h.ports = vec![listener.local_addr().unwrap().port()];
        assert!(launcher.probe(&h).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_and_terminate() {
        let launcher = ProcessLauncher::new();
        let spec = KernelSpec {
            name: "sleeper".to_string(),
            display_name: String::new(),
            language: String::new(),
            argv: vec!["sleep".to_string(), "30".to_string()],
            env: BTreeMap::new(),
        };
        let h = handle();
        let request = LaunchRequest {
            handle: &h,
            spec: &spec,
            env: BTreeMap::new(),
        };
        launcher.launch(&request).await.unwrap();
        assert!(launcher.probe(&h).await.is_ok());
        launcher.terminate(&h).await.unwrap();
        assert!(launcher.children.is_empty());
    }

    #[tokio::test]
    async fn test_terminate_without_local_process_fails() {
        let launcher = ProcessLauncher::new();
        assert!(matches!(launcher.terminate(&handle()).await, Err(GatewayError::Launch(_))));
    }
}
