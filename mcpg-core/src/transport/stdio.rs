//! Stdio transport: one subprocess speaking newline-delimited JSON-RPC.
//!
//! # Concurrency
//!
//! - One writer task owns the child's stdin and writes queued lines one at
//!   a time. A line that has started is always finished, even when the
//!   caller that queued it has gone away.
//! - A single read task decodes stdout line by line and hands each response
//!   to the caller whose pending entry matches its id.
//! - Ids on the wire are assigned by the gateway (a per-transport counter),
//!   so concurrent callers that happen to reuse the same client id never
//!   collide. The caller's id is restored on the way back.
//!
//! # Exit
//!
//! When stdout reaches EOF every pending request fails with a transport
//! error and the exit signal fires. There is no restart.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::framing::{FramingError, MAX_MESSAGE_BYTES, bounded_read_line, encode_line, parse_line};
use super::{Reply, Transport};
use crate::config::{StdioSpec, TransportKind};
use crate::error::{GatewayError, GatewayResult};
use crate::jsonrpc::{JsonRpcId, JsonRpcMessageKind, JsonRpcRequest, JsonRpcResponse, restore_id};

/// Time the child gets to exit on its own after stdin is closed.
const STDIN_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Time the child gets to exit after SIGTERM before SIGKILL.
const SIGTERM_GRACE: Duration = Duration::from_secs(3);

/// Lines that may wait for the writer task before callers block.
const WRITE_QUEUE_DEPTH: usize = 64;

/// An in-flight request waiting for its response line.
struct PendingRequest {
    method: String,
    created_at: Instant,
    tx: oneshot::Sender<GatewayResult<Value>>,
}

/// One encoded line for the writer task.
struct Outgoing {
    line: Vec<u8>,
    done: Option<oneshot::Sender<Result<(), String>>>,
}

type PendingTable = SyncMutex<HashMap<i64, PendingRequest>>;
/// `None` once the transport is closing.
type SharedWriter = Arc<SyncMutex<Option<mpsc::Sender<Outgoing>>>>;

/// Transport over a child process's stdin/stdout.
pub struct StdioTransport {
    backend: String,
    writer: SharedWriter,
    child: Mutex<Option<Child>>,
    pending: Arc<PendingTable>,
    next_id: AtomicI64,
    exit_rx: watch::Receiver<Option<String>>,
    reader_task: SyncMutex<Option<JoinHandle<()>>>,
    writer_task: SyncMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Launch the backend process and start its read loop.
    ///
    /// # Errors
    ///
    /// Returns `BackendConnect` if the process cannot be spawned or its
    /// stdio pipes are unavailable.
    pub fn spawn(backend: &str, spec: &StdioSpec) -> GatewayResult<Self> {
        let args = expand_docker_env_args(&spec.args);

        let mut cmd = Command::new(&spec.command);
        cmd.args(&args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_directory {
            cmd.current_dir(dir);
        }
        // Own process group so that shutdown can signal the whole tree.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| GatewayError::BackendConnect {
            backend: backend.to_string(),
            reason: format!("failed to launch '{}': {e}", spec.command),
        })?;

        let missing_pipe = |pipe: &str| GatewayError::BackendConnect {
            backend: backend.to_string(),
            reason: format!("child {pipe} unavailable"),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(log_stderr(backend.to_string(), stderr));
        }

        info!(
            backend,
            command = %spec.command,
            pid = child.id(),
            "launched stdio backend"
        );

        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let writer_task = tokio::spawn(write_loop(backend.to_string(), stdin, write_rx));
        let writer: SharedWriter = Arc::new(SyncMutex::new(Some(write_tx)));
        let pending: Arc<PendingTable> = Arc::default();
        let (exit_tx, exit_rx) = watch::channel(None);

        let reader_task = tokio::spawn(read_loop(
            backend.to_string(),
            stdout,
            pending.clone(),
            writer.clone(),
            exit_tx,
        ));

        Ok(Self {
            backend: backend.to_string(),
            writer,
            child: Mutex::new(Some(child)),
            pending,
            next_id: AtomicI64::new(1),
            exit_rx,
            reader_task: SyncMutex::new(Some(reader_task)),
            writer_task: SyncMutex::new(Some(writer_task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of requests currently waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn transport_error(&self, reason: impl Into<String>) -> GatewayError {
        GatewayError::Transport {
            backend: self.backend.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn send(&self, request: JsonRpcRequest, timeout: Duration) -> GatewayResult<Reply> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.transport_error("backend closed"));
        }
        if self.exit_rx.borrow().is_some() {
            return Err(self.transport_error("backend process exited"));
        }

        let client_id = request.id.clone();
        let method = request.method.clone();
        let internal = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            internal,
            PendingRequest {
                method: method.clone(),
                created_at: Instant::now(),
                tx,
            },
        );
        let mut guard = PendingGuard {
            backend: self.backend.clone(),
            id: internal,
            pending: self.pending.clone(),
            writer: self.writer.clone(),
            notify_cancel: true,
        };

        let wire = JsonRpcRequest {
            id: Some(JsonRpcId::Number(internal)),
            ..request
        };
        if let Err(reason) = write_message(&self.writer, &wire).await {
            guard.notify_cancel = false;
            return Err(self.transport_error(reason));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(mut message))) => {
                restore_id(&mut message, client_id.as_ref());
                Ok(Reply::json(message))
            }
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(self.transport_error("response channel closed")),
            Err(_) => {
                warn!(backend = %self.backend, method = %method, internal_id = internal, "stdio request timed out");
                Err(GatewayError::Timeout {
                    backend: self.backend.clone(),
                    method,
                    timeout_secs: timeout.as_secs(),
                })
            }
        }
    }

    async fn notify(&self, notification: JsonRpcRequest) -> GatewayResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.transport_error("backend closed"));
        }
        write_message(&self.writer, &notification)
            .await
            .map_err(|reason| self.transport_error(reason))
    }

    async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        // Step 1: close stdin. The writer task drains what is queued, then
        // drops the pipe once the last sender is gone.
        drop(self.writer.lock().take());
        let writer_task = self.writer_task.lock().take();
        if let Some(mut task) = writer_task
            && tokio::time::timeout(STDIN_CLOSE_GRACE, &mut task).await.is_err()
        {
            warn!(backend = %self.backend, "stdin busy, dropping queued writes");
            task.abort();
        }

        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            shutdown_child(&self.backend, &mut child).await;
        }

        fail_all_pending(&self.backend, &self.pending, "backend closed");
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        true
    }

    fn exit_signal(&self) -> Option<watch::Receiver<Option<String>>> {
        Some(self.exit_rx.clone())
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.writer_task.lock().take() {
            task.abort();
        }
    }
}

/// Removes a pending entry when the caller stops waiting.
///
/// If the entry is still present (timeout, or the caller's future was
/// dropped), a best-effort `notifications/cancelled` is sent to the backend.
struct PendingGuard {
    backend: String,
    id: i64,
    pending: Arc<PendingTable>,
    writer: SharedWriter,
    notify_cancel: bool,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let removed = self.pending.lock().remove(&self.id);
        let Some(entry) = removed else {
            return;
        };
        if !self.notify_cancel {
            return;
        }
        debug!(
            backend = %self.backend,
            method = %entry.method,
            internal_id = self.id,
            "cancelling abandoned stdio request"
        );
        let notification = JsonRpcRequest::notification(
            "notifications/cancelled",
            Some(json!({"requestId": self.id, "reason": "request abandoned by gateway"})),
        );
        let Ok(line) = encode_line(&notification) else {
            return;
        };
        let sender = self.writer.lock().clone();
        if let Some(sender) = sender
            && sender.try_send(Outgoing { line, done: None }).is_err()
        {
            debug!(backend = %self.backend, "write queue full, cancellation not sent");
        }
    }
}

/// Queue one message and wait until the writer task has written it.
///
/// Dropping the returned future never truncates a line: once queued, the
/// writer task finishes it regardless.
async fn write_message<T: serde::Serialize>(writer: &SharedWriter, message: &T) -> Result<(), String> {
    let line = encode_line(message).map_err(|e| format!("failed to encode message: {e}"))?;
    let sender = writer.lock().clone().ok_or_else(|| "stdin closed".to_string())?;
    let (done, written) = oneshot::channel();
    sender
        .send(Outgoing {
            line,
            done: Some(done),
        })
        .await
        .map_err(|_| "stdin closed".to_string())?;
    // Only the queue may keep the writer alive, so `close` is not held up.
    drop(sender);
    written.await.map_err(|_| "stdin closed".to_string())?
}

/// Sole owner of the child's stdin. Exits when every sender is gone or a
/// write fails; stdin is closed on exit.
async fn write_loop(backend: String, mut stdin: ChildStdin, mut queue: mpsc::Receiver<Outgoing>) {
    while let Some(Outgoing { line, done }) = queue.recv().await {
        let result = match stdin.write_all(&line).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        }
        .map_err(|e| format!("write to backend stdin failed: {e}"));

        let failed = result.as_ref().err().cloned();
        if let Some(done) = done {
            let _ = done.send(result);
        }
        if let Some(reason) = failed {
            debug!(backend = %backend, reason = %reason, "stdin writer stopped");
            return;
        }
    }
    debug!(backend = %backend, "stdin closed");
}

async fn read_loop(
    backend: String,
    stdout: ChildStdout,
    pending: Arc<PendingTable>,
    writer: SharedWriter,
    exit_tx: watch::Sender<Option<String>>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::with_capacity(8192);

    let reason = loop {
        buf.clear();
        match bounded_read_line(&mut reader, &mut buf, MAX_MESSAGE_BYTES).await {
            Ok(0) => break "backend process exited".to_string(),
            Ok(_) => {}
            Err(FramingError::MessageTooLarge { max_bytes }) => {
                warn!(backend = %backend, max_bytes, "skipping oversized line from backend");
                continue;
            }
            Err(e) => break format!("read from backend stdout failed: {e}"),
        }

        let message = match parse_line(&buf) {
            Ok(m) => m,
            Err(e) => {
                debug!(backend = %backend, error = %e, "discarding non-JSON-RPC output");
                continue;
            }
        };

        match message.kind {
            JsonRpcMessageKind::Response {
                id: JsonRpcId::Number(id),
            } => deliver(&backend, &pending, id, message.value),
            JsonRpcMessageKind::Response { id } => {
                debug!(backend = %backend, %id, "discarding response with foreign id");
            }
            JsonRpcMessageKind::Request { id, method } => {
                // Answer off the read loop so a full stdin pipe cannot stall stdout draining.
                let writer = writer.clone();
                let backend = backend.clone();
                tokio::spawn(async move {
                    let response = answer_backend_request(id, &method);
                    if let Err(e) = write_message(&writer, &response).await {
                        debug!(backend = %backend, method = %method, error = %e, "failed to answer backend request");
                    }
                });
            }
            JsonRpcMessageKind::Notification { method } => {
                debug!(backend = %backend, method = %method, "backend notification");
            }
        }
    };

    info!(backend = %backend, reason = %reason, "stdio backend stopped");
    fail_all_pending(&backend, &pending, &reason);
    let _ = exit_tx.send(Some(reason));
}

fn deliver(backend: &str, pending: &PendingTable, id: i64, message: Value) {
    let entry = pending.lock().remove(&id);
    match entry {
        Some(entry) => {
            debug!(
                backend,
                method = %entry.method,
                elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                "stdio response received"
            );
            let _ = entry.tx.send(Ok(message));
        }
        None => debug!(backend, id, "discarding response with no pending request"),
    }
}

/// Requests a backend sends to the gateway. Only `ping` is served.
fn answer_backend_request(id: JsonRpcId, method: &str) -> JsonRpcResponse {
    if method == "ping" {
        JsonRpcResponse::success(Some(id), json!({}))
    } else {
        let error = GatewayError::MethodNotFound {
            method: method.to_string(),
        };
        JsonRpcResponse::error(Some(id), error.to_jsonrpc_error("backend-request"))
    }
}

fn fail_all_pending(backend: &str, pending: &PendingTable, reason: &str) {
    let drained: Vec<_> = pending.lock().drain().collect();
    if drained.is_empty() {
        return;
    }
    warn!(backend, count = drained.len(), reason, "failing outstanding requests");
    for (_, entry) in drained {
        let _ = entry.tx.send(Err(GatewayError::Transport {
            backend: backend.to_string(),
            reason: reason.to_string(),
        }));
    }
}

async fn log_stderr<R: AsyncRead + Unpin>(backend: String, stderr: R) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match bounded_read_line(&mut reader, &mut buf, MAX_MESSAGE_BYTES).await {
            Ok(0) | Err(FramingError::Io(_)) => return,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(backend = %backend, "stderr: {line}");
                }
            }
            Err(_) => continue,
        }
    }
}

/// Shut a backend process down.
///
/// 1. stdin has already been closed by the caller
/// 2. Wait [`STDIN_CLOSE_GRACE`] for a voluntary exit
/// 3. SIGTERM the process group (Unix)
/// 4. Wait [`SIGTERM_GRACE`]
/// 5. SIGKILL
/// 6. Reap the exit status
async fn shutdown_child(backend: &str, child: &mut Child) {
    match tokio::time::timeout(STDIN_CLOSE_GRACE, child.wait()).await {
        Ok(Ok(status)) => {
            info!(backend, code = status.code().unwrap_or(-1), "backend exited after stdin close");
            return;
        }
        Ok(Err(e)) => warn!(backend, error = %e, "wait failed after stdin close"),
        Err(_) => debug!(backend, "backend still running after stdin close"),
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;
        if let Some(pid) = child.id() {
            debug!(backend, pid, "sending SIGTERM to process group");
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(backend, pid, error = ?e, "killpg SIGTERM failed");
            }
        }

        match tokio::time::timeout(SIGTERM_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                info!(backend, code = status.code().unwrap_or(-1), "backend exited after SIGTERM");
                return;
            }
            Ok(Err(e)) => warn!(backend, error = %e, "wait failed after SIGTERM"),
            Err(_) => warn!(backend, "backend ignored SIGTERM"),
        }
    }

    warn!(backend, "sending SIGKILL");
    if let Err(e) = child.kill().await {
        warn!(backend, error = %e, "SIGKILL failed");
    }
    match child.wait().await {
        Ok(status) => info!(backend, code = status.code().unwrap_or(-1), "backend killed"),
        Err(e) => warn!(backend, error = %e, "failed to reap backend process"),
    }
}

/// Rewrite `-e NAME` into `-e NAME=value` when `NAME` is set in the
/// gateway's environment, so that `docker run` receives the value even when
/// the variable was loaded from an env file after the gateway started.
pub fn expand_docker_env_args(args: &[String]) -> Vec<String> {
    let mut result = Vec::with_capacity(args.len());
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        result.push(arg.clone());
        if arg != "-e" {
            continue;
        }
        let Some(next) = iter.next_if(|next| !next.contains('=')) else {
            continue;
        };
        match std::env::var(next) {
            Ok(value) => result.push(format!("{next}={value}")),
            Err(_) => result.push(next.clone()),
        }
    }
    result
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::BTreeMap;

    fn sh(script: &str) -> StdioSpec {
        StdioSpec {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: BTreeMap::new(),
            working_directory: None,
        }
    }

    /// Echoes every request back as a response carrying the same id.
    /// Non-JSON output is interleaved to exercise the discard path.
    const ECHO_SERVER: &str = r#"
echo "booting up (not json)"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  if [ -n "$id" ]; then
    echo "log: handling $id"
    printf '{"jsonrpc":"2.0","id":%s,"result":{"echo":%s}}\n' "$id" "$id"
  fi
done
"#;

    #[tokio::test]
    async fn test_send_restores_client_id() {
        let transport = StdioTransport::spawn("echo", &sh(ECHO_SERVER)).unwrap();

        let request = JsonRpcRequest::new(
            JsonRpcId::String("client-abc".into()),
            "tools/list",
            None,
        );
        let reply = transport
            .send(request, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.message["id"], "client-abc");
        assert!(reply.message["result"]["echo"].is_number());
        assert_eq!(transport.pending_count(), 0);

        assert!(transport.close().await);
    }

    #[tokio::test]
    async fn test_concurrent_requests_with_same_client_id() {
        let transport = Arc::new(StdioTransport::spawn("echo", &sh(ECHO_SERVER)).unwrap());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let t = transport.clone();
            handles.push(tokio::spawn(async move {
                t.send(JsonRpcRequest::new(1, "ping", None), Duration::from_secs(5))
                    .await
            }));
        }

        let mut echoed = Vec::new();
        for handle in handles {
            let reply = handle.await.unwrap().unwrap();
            assert_eq!(reply.message["id"], 1);
            echoed.push(reply.message["result"]["echo"].as_i64().unwrap());
        }
        echoed.sort_unstable();
        echoed.dedup();
        assert_eq!(echoed.len(), 8, "each caller must get its own response");

        transport.close().await;
    }

    #[tokio::test]
    async fn test_timeout_discards_pending() {
        let transport = StdioTransport::spawn("silent", &sh("cat > /dev/null")).unwrap();

        let err = transport
            .send(JsonRpcRequest::new(1, "tools/call", None), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
        assert_eq!(transport.pending_count(), 0);

        transport.close().await;
    }

    #[tokio::test]
    async fn test_process_exit_fails_pending_and_signals() {
        let transport = StdioTransport::spawn("dies", &sh("read line; exit 3")).unwrap();
        let mut exit = transport.exit_signal().unwrap();

        let err = transport
            .send(JsonRpcRequest::new(1, "initialize", None), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport { .. }), "{err:?}");

        tokio::time::timeout(Duration::from_secs(5), exit.wait_for(Option::is_some))
            .await
            .unwrap()
            .unwrap();

        let err = transport
            .send(JsonRpcRequest::new(2, "ping", None), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_abandoned_large_write_does_not_corrupt_stream() {
        // The backend does not read for a second, so a large line fills the pipe.
        let script = format!("sleep 1\n{ECHO_SERVER}");
        let transport = StdioTransport::spawn("slow", &sh(&script)).unwrap();

        let payload = "x".repeat(512 * 1024);
        let big = JsonRpcRequest::new(
            1,
            "tools/call",
            Some(json!({"name": "upload", "arguments": {"data": payload}})),
        );
        let abandoned =
            tokio::time::timeout(Duration::from_millis(100), transport.send(big, Duration::from_secs(30))).await;
        assert!(abandoned.is_err(), "write should still be blocked on the pipe");

        let reply = transport
            .send(JsonRpcRequest::new(2, "ping", None), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(reply.message["id"], 2);
        assert!(reply.message["result"]["echo"].is_number());

        transport.close().await;
    }

    #[tokio::test]
    async fn test_backend_ping_is_answered() {
        // The backend pings the gateway and only answers tools/list once the pong arrived.
        let script = r#"
printf '{"jsonrpc":"2.0","id":"srv-1","method":"ping"}\n'
ponged=""
id=""
while IFS= read -r line; do
  case "$line" in
    *'"result"'*) ponged=1 ;;
    *tools/list*) id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p') ;;
  esac
  if [ -n "$ponged" ] && [ -n "$id" ]; then
    printf '{"jsonrpc":"2.0","id":%s,"result":{"ok":true}}\n' "$id"
    id=""
  fi
done
"#;
        let transport = StdioTransport::spawn("pinger", &sh(script)).unwrap();
        let reply = transport
            .send(JsonRpcRequest::new(9, "tools/list", None), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(reply.message["result"]["ok"], true);
        transport.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = StdioTransport::spawn("cat", &sh("cat")).unwrap();
        assert!(transport.close().await);
        assert!(!transport.close().await);

        let err = transport
            .send(JsonRpcRequest::new(1, "ping", None), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_close_terminates_process_ignoring_stdin() {
        let transport = StdioTransport::spawn("sleeper", &sh("sleep 30")).unwrap();
        let started = Instant::now();
        assert!(transport.close().await);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_connect_error() {
        let spec = StdioSpec {
            command: "/nonexistent/mcp-server".to_string(),
            args: vec![],
            env: BTreeMap::new(),
            working_directory: None,
        };
        let err = StdioTransport::spawn("ghost", &spec).err().unwrap();
        assert!(matches!(err, GatewayError::BackendConnect { .. }));
    }

    #[test]
    #[serial]
    fn test_expand_docker_env_args() {
        // SAFETY: #[serial]
        unsafe { std::env::set_var("MCPG_TEST_DOCKER_TOKEN", "s3cret") };
        let args: Vec<String> = ["run", "-e", "MCPG_TEST_DOCKER_TOKEN", "-e", "A=1", "-e", "MCPG_TEST_UNSET_X", "img"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let expanded = expand_docker_env_args(&args);
        assert_eq!(
            expanded,
            vec![
                "run",
                "-e",
                "MCPG_TEST_DOCKER_TOKEN=s3cret",
                "-e",
                "A=1",
                "-e",
                "MCPG_TEST_UNSET_X",
                "img"
            ]
        );
        unsafe { std::env::remove_var("MCPG_TEST_DOCKER_TOKEN") };
    }
}
