use crate::runner::ProcessRunner;
use crate::structures::{ProbeError, ProbeResult, Target};
use tokio::time::Instant;

/// External ICMP echo, the OS-level reachability ground truth. The in-process
/// raw connect can fail while this keeps succeeding; that contrast is the
/// whole point of the tool.
pub async fn ping<R: ProcessRunner + ?Sized>(runner: &R, target: &Target) -> ProbeResult {
    let host = target.ip.to_string();
    #[cfg(target_os = "macos")]
    let args = ["-c", "1", "-t", "2", host.as_str()];
    #[cfg(not(target_os = "macos"))]
    let args = ["-c", "1", "-W", "2", host.as_str()];

    run_tool(runner, "ping", &args, target, "system ping", false).await
}

/// External TCP port probe (`nc -z`), the system counterpart of the raw
/// connect check.
pub async fn netcat<R: ProcessRunner + ?Sized>(runner: &R, target: &Target) -> ProbeResult {
    let host = target.ip.to_string();
    let port = target.port.to_string();
    let args = ["-z", "-w", "2", host.as_str(), port.as_str()];

    run_tool(runner, "nc", &args, target, "system nc", false).await
}

/// Route-table lookup for the target address, attached verbatim as
/// diagnostic context. An interface-scoped route disappearing here is the
/// suspected root cause.
pub async fn route<R: ProcessRunner + ?Sized>(runner: &R, target: &Target) -> ProbeResult {
    let host = target.ip.to_string();
    #[cfg(target_os = "macos")]
    let (program, args) = ("route", ["-n", "get", host.as_str()]);
    #[cfg(not(target_os = "macos"))]
    let (program, args) = ("ip", ["route", "get", host.as_str()]);

    run_tool(runner, program, &args, target, "route lookup", true).await
}

/// Address-resolution-table lookup, attached verbatim.
pub async fn arp<R: ProcessRunner + ?Sized>(runner: &R, target: &Target) -> ProbeResult {
    let host = target.ip.to_string();
    let args = ["-n", host.as_str()];

    run_tool(runner, "arp", &args, target, "arp lookup", true).await
}

async fn run_tool<R: ProcessRunner + ?Sized>(
    runner: &R,
    program: &str,
    args: &[&str],
    target: &Target,
    check: &str,
    always_attach_output: bool,
) -> ProbeResult {
    let started = Instant::now();
    match runner.run(program, args).await {
        Ok(out) if out.success => {
            let result = ProbeResult::ok(check, target.endpoint(), started.elapsed());
            if always_attach_output {
                result.with_output(out.output)
            } else {
                result
            }
        }
        Ok(out) => ProbeResult::failed(
            check,
            target.endpoint(),
            started.elapsed(),
            ProbeError::Helper {
                program: program.to_string(),
                detail: "exited with failure".to_string(),
            },
        )
        .with_output(out.output),
        Err(e) => ProbeResult::failed(
            check,
            target.endpoint(),
            started.elapsed(),
            ProbeError::Helper {
                program: program.to_string(),
                detail: e.to_string(),
            },
        ),
    }
}
