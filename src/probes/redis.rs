use crate::structures::{ProbeError, ProbeResult, Target};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Duration, Instant};

const PROBE_KEY: &str = "netrepro:probe";
const VALUE_TTL_SECS: &str = "60";

/// RESP PING with request/response timing. A comparative signal only: the
/// same connect path as the raw check, plus one application round trip.
pub async fn ping(target: &Target, timeout: Duration) -> ProbeResult {
    let started = Instant::now();
    let outcome = time::timeout(timeout, ping_inner(target)).await;
    finish("redis ping", target, started, timeout, outcome)
}

/// RESP SET with a short TTL followed by GET, verifying the stored value
/// comes back.
pub async fn set_get(target: &Target, timeout: Duration, value: &str) -> ProbeResult {
    let started = Instant::now();
    let outcome = time::timeout(timeout, set_get_inner(target, value)).await;
    finish("redis set/get", target, started, timeout, outcome)
}

fn finish(
    check: &str,
    target: &Target,
    started: Instant,
    timeout: Duration,
    outcome: Result<Result<(), ProbeError>, time::error::Elapsed>,
) -> ProbeResult {
    let elapsed = started.elapsed();
    match outcome {
        Ok(Ok(())) => ProbeResult::ok(check, target.endpoint(), elapsed),
        Ok(Err(e)) => ProbeResult::failed(check, target.endpoint(), elapsed, e),
        Err(_) => ProbeResult::failed(
            check,
            target.endpoint(),
            elapsed,
            ProbeError::Timeout(timeout),
        ),
    }
}

async fn ping_inner(target: &Target) -> Result<(), ProbeError> {
    let mut stream = connect(target).await?;
    let reply = request(&mut stream, &encode(&["PING"])).await?;
    expect_prefix(&reply, "+PONG")
}

async fn set_get_inner(target: &Target, value: &str) -> Result<(), ProbeError> {
    let mut stream = connect(target).await?;

    let set = encode(&["SET", PROBE_KEY, value, "EX", VALUE_TTL_SECS]);
    let reply = request(&mut stream, &set).await?;
    expect_prefix(&reply, "+OK")?;

    let reply = request(&mut stream, &encode(&["GET", PROBE_KEY])).await?;
    let expected = format!("${}\r\n{}\r\n", value.len(), value);
    expect_prefix(&reply, &expected)
}

async fn connect(target: &Target) -> Result<TcpStream, ProbeError> {
    TcpStream::connect(target.addr())
        .await
        .map_err(ProbeError::Connect)
}

async fn request(stream: &mut TcpStream, command: &[u8]) -> Result<String, ProbeError> {
    stream
        .write_all(command)
        .await
        .map_err(|e| ProbeError::Protocol(format!("write failed: {e}")))?;

    let mut reply = Vec::with_capacity(64);
    let mut chunk = [0_u8; 64];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| ProbeError::Protocol(format!("read failed: {e}")))?;
        if n == 0 {
            return Err(ProbeError::Protocol(
                "connection closed mid-reply".to_string(),
            ));
        }
        reply.extend_from_slice(&chunk[..n]);
        if reply.windows(2).any(|w| w == b"\r\n") {
            return Ok(String::from_utf8_lossy(&reply).into_owned());
        }
    }
}

fn expect_prefix(reply: &str, want: &str) -> Result<(), ProbeError> {
    if reply.starts_with(want) {
        Ok(())
    } else {
        Err(ProbeError::Protocol(format!(
            "unexpected reply: {:?}",
            reply.lines().next().unwrap_or_default()
        )))
    }
}

fn encode(parts: &[&str]) -> Vec<u8> {
    let mut buf = format!("*{}\r\n", parts.len()).into_bytes();
    for part in parts {
        buf.extend_from_slice(format!("${}\r\n{}\r\n", part.len(), part).as_bytes());
    }
    buf
}
