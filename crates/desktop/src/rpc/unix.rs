use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use gristdesk_common::protocol::jsonrpc::{Request, RequestId, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::warn;

use crate::rpc::methods::{handle_raw_request, RpcState};

#[cfg(windows)]
pub const WINDOWS_NAMED_PIPE_PATH: &str = r"\\.\pipe\gristdesk";

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve the instance socket: newline-delimited JSON-RPC 2.0.
#[cfg(unix)]
pub async fn serve_unix(listener: UnixListener, state: RpcState) -> Result<()> {
    loop {
        let (stream, _) = listener.accept().await.context("failed to accept instance connection")?;
        let connection_state = state.clone();
        tokio::spawn(async move {
            if let Err(error) = serve_connection(stream, connection_state).await {
                warn!(?error, "instance connection failed");
            }
        });
    }
}

/// Serve the instance socket over named pipe `\\.\pipe\gristdesk`.
#[cfg(windows)]
pub async fn serve_named_pipe(state: RpcState) -> Result<()> {
    use tokio::net::windows::named_pipe::ServerOptions;

    loop {
        let server = ServerOptions::new()
            .create(WINDOWS_NAMED_PIPE_PATH)
            .with_context(|| format!("failed to create named pipe `{WINDOWS_NAMED_PIPE_PATH}`"))?;
        server.connect().await.context("failed to accept named-pipe instance connection")?;

        let connection_state = state.clone();
        tokio::spawn(async move {
            if let Err(error) = serve_connection(server, connection_state).await {
                warn!(?error, "named-pipe instance connection failed");
            }
        });
    }
}

/// Handle a single stream. Each request line yields one response line.
pub async fn serve_connection<IO>(stream: IO, state: RpcState) -> Result<()>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = io::split(stream);
    let mut reader = BufReader::new(read_half);

    loop {
        let mut request_line = Vec::new();
        let bytes_read =
            reader.read_until(b'\n', &mut request_line).await.context("failed to read json-rpc request")?;

        if bytes_read == 0 {
            return Ok(());
        }

        trim_line_endings(&mut request_line);
        if request_line.iter().all(|byte| byte.is_ascii_whitespace()) {
            continue;
        }

        let response = handle_raw_request(&request_line, &state).await;
        let mut encoded = serde_json::to_vec(&response).context("failed to serialize json-rpc response")?;
        encoded.push(b'\n');

        write_half.write_all(&encoded).await.context("failed to write json-rpc response")?;
        write_half.flush().await.context("failed to flush json-rpc response")?;
    }
}

fn trim_line_endings(line: &mut Vec<u8>) {
    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }
}

// ── Client ─────────────────────────────────────────────────────────

/// Client side of the instance socket, used by a second process instance.
#[derive(Debug)]
pub struct InstanceClient {
    socket_path: PathBuf,
    timeout: Duration,
    next_request_id: AtomicU64,
}

impl InstanceClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self { socket_path, timeout: DEFAULT_CLIENT_TIMEOUT, next_request_id: AtomicU64::new(1) }
    }

    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst) as i64;
        let params = serde_json::to_value(params).context("failed to serialize json-rpc params")?;
        let request = Request::new(method, Some(params), RequestId::Number(id));
        let mut payload = serde_json::to_vec(&request).context("failed to serialize json-rpc request")?;
        payload.push(b'\n');

        let response_line = self.exchange(&payload).await?;
        if response_line.is_empty() {
            anyhow::bail!("running instance returned an empty json-rpc response");
        }
        let response: Response =
            serde_json::from_slice(&response_line).context("failed to decode json-rpc response")?;

        if let Some(error) = response.error {
            anyhow::bail!(
                "json-rpc error {}: {} (data: {})",
                error.code,
                error.message,
                error.data.map(|value| value.to_string()).unwrap_or_else(|| "null".to_string())
            );
        }
        let result = response.result.context("json-rpc response missing `result` field")?;
        serde_json::from_value(result).context("unexpected json-rpc result shape")
    }

    #[cfg(unix)]
    async fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let stream = timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("timed out connecting to instance socket")?
            .with_context(|| format!("failed to connect to instance socket `{}`", self.socket_path.display()))?;

        let (read_half, mut write_half) = stream.into_split();
        timeout(self.timeout, write_half.write_all(payload))
            .await
            .context("timed out writing json-rpc request")?
            .context("failed writing json-rpc request")?;
        timeout(self.timeout, write_half.flush())
            .await
            .context("timed out flushing json-rpc request")?
            .context("failed flushing json-rpc request")?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = Vec::new();
        timeout(self.timeout, reader.read_until(b'\n', &mut response_line))
            .await
            .context("timed out waiting for json-rpc response")?
            .context("failed reading json-rpc response")?;
        trim_line_endings(&mut response_line);
        Ok(response_line)
    }

    #[cfg(not(unix))]
    async fn exchange(&self, _payload: &[u8]) -> Result<Vec<u8>> {
        let _ = (&self.socket_path, self.timeout);
        anyhow::bail!("named pipe client transport is not implemented yet")
    }
}
