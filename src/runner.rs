use async_trait::async_trait;
use std::io;
use tokio::process::Command;

#[derive(Debug)]
pub struct ProcessOutput {
    pub success: bool,
    /// stdout and stderr, interleaved the way an operator would see them.
    pub output: String,
}

/// Capability seam for external diagnostic utilities: given argv, return the
/// exit status and combined output. Probes stay testable with a fake runner.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<ProcessOutput>;
}

/// Real child-process runner. Each invocation is synchronous from the
/// sampler's point of view: awaited to completion, timeouts ride on the
/// child's own argv flags.
#[derive(Debug, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str]) -> io::Result<ProcessOutput> {
        let out = Command::new(program).args(args).output().await?;
        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(ProcessOutput {
            success: out.status.success(),
            output: combined,
        })
    }
}
