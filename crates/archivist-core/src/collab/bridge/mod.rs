//! Automation through a driver process speaking line-delimited JSON.
//!
//! The driver owns the browser and the stored session; archivist only sends
//! movement requests and receives download events (see [`protocol`]).

pub mod protocol;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};

use crate::config::AutomationConfig;
use crate::error::AutomationError;
use crate::locator::ItemLocator;

use self::protocol::{Incoming, Op, RequestFrame, ResponseFrame};
use super::{Automation, DateLabelSource, DownloadEvent};

/// Extra wait on top of a driver-side timeout so the driver can report it.
const DRIVER_GRACE: Duration = Duration::from_secs(5);
/// Wait for requests that carry no timeout of their own.
const SHORT_REQUEST: Duration = Duration::from_secs(30);
/// Buffered download events.
const EVENT_BUFFER: usize = 16;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<ResponseFrame>>>>;

/// Handle to a running driver process.
pub struct ProcessBridge {
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
}

impl ProcessBridge {
    /// Spawns the driver (`program args... extra_args...`) and starts routing
    /// its output. Returns the bridge and the download event stream.
    pub fn spawn(
        cfg: &AutomationConfig,
        extra_args: &[String],
    ) -> Result<(Arc<Self>, mpsc::Receiver<DownloadEvent>)> {
        let mut child = tokio::process::Command::new(&cfg.program)
            .args(&cfg.args)
            .args(extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to launch automation driver {}", cfg.program))?;

        let stdin = child.stdin.take().context("driver stdin unavailable")?;
        let stdout = child.stdout.take().context("driver stdout unavailable")?;

        let pending: Pending = Arc::default();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        tokio::spawn(route_output(stdout, Arc::clone(&pending), events_tx));

        tracing::info!(program = %cfg.program, "automation driver started");
        let bridge = Arc::new(Self {
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
        });
        Ok((bridge, events_rx))
    }

    async fn request(&self, op: Op, wait: Duration) -> Result<ResponseFrame, AutomationError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let mut line = serde_json::to_string(&RequestFrame { id, op })
            .map_err(|e| AutomationError::Driver(format!("encode request: {e}")))?;
        line.push('\n');
        {
            let mut stdin = self.stdin.lock().await;
            let written = match stdin.write_all(line.as_bytes()).await {
                Ok(()) => stdin.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                lock(&self.pending).remove(&id);
                return Err(AutomationError::Driver(format!("write to driver: {e}")));
            }
        }

        let response = match tokio::time::timeout(wait, rx).await {
            Ok(Ok(r)) => r,
            Ok(Err(_)) => return Err(AutomationError::Driver("driver exited".to_string())),
            Err(_) => {
                lock(&self.pending).remove(&id);
                return Err(AutomationError::Timeout(wait));
            }
        };

        if response.ok {
            return Ok(response);
        }
        let message = response
            .error
            .clone()
            .unwrap_or_else(|| "unspecified driver error".to_string());
        if response.timeout {
            Err(AutomationError::Timeout(wait.saturating_sub(DRIVER_GRACE)))
        } else {
            Err(AutomationError::Stalled(message))
        }
    }

    async fn request_locator(&self, op: Op, wait: Duration) -> Result<ItemLocator, AutomationError> {
        let response = self.request(op, wait).await?;
        let raw = response
            .locator
            .ok_or_else(|| AutomationError::Driver("response without locator".to_string()))?;
        Ok(ItemLocator::parse(&raw)?)
    }

    /// Asks the driver to close the browser and waits for it to exit.
    pub async fn shutdown(&self, wait: Duration) -> Result<()> {
        if let Err(e) = self.request(Op::Shutdown, wait).await {
            tracing::debug!(error = %e, "driver did not acknowledge shutdown");
        }
        let mut child = self.child.lock().await;
        match tokio::time::timeout(wait, child.wait()).await {
            Ok(status) => {
                let status = status.context("wait for driver")?;
                tracing::info!(%status, "automation driver exited");
            }
            Err(_) => {
                tracing::warn!("automation driver did not exit, killing it");
                child.kill().await.context("kill driver")?;
            }
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Reads driver output until EOF, completing pending requests and forwarding
/// download events. Pending requests fail once the driver goes away.
async fn route_output(stdout: ChildStdout, pending: Pending, events: mpsc::Sender<DownloadEvent>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "reading driver output failed");
                break;
            }
        };
        match protocol::parse_line(&line) {
            Ok(Some(Incoming::Response(resp))) => {
                let waiter = lock(&pending).remove(&resp.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => tracing::debug!(id = resp.id, "late or unknown driver response"),
                }
            }
            Ok(Some(Incoming::Event(ev))) => {
                let ev: DownloadEvent = ev.into();
                tracing::debug!(url = %ev.url, "download started");
                if events.send(ev).await.is_err() {
                    tracing::debug!("download event dropped: no listener");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, line = %line, "unparsable driver output"),
        }
    }
    lock(&pending).clear();
    tracing::info!("automation driver output closed");
}

#[async_trait]
impl DateLabelSource for ProcessBridge {
    async fn fetch_visible_date_label(&self, origin: &ItemLocator) -> Option<String> {
        let op = Op::DateLabel {
            locator: origin.to_string(),
        };
        match self.request(op, SHORT_REQUEST).await {
            Ok(resp) => resp.label.filter(|l| !l.trim().is_empty()),
            Err(e) => {
                tracing::debug!(origin = %origin, error = %e, "date label unavailable");
                None
            }
        }
    }
}

#[async_trait]
impl Automation for ProcessBridge {
    async fn current_locator(&self) -> Result<ItemLocator, AutomationError> {
        self.request_locator(Op::CurrentLocator, SHORT_REQUEST).await
    }

    async fn jump_to_newest(&self, timeout: Duration) -> Result<ItemLocator, AutomationError> {
        let op = Op::JumpToNewest {
            timeout_ms: millis(timeout),
        };
        self.request_locator(op, timeout + DRIVER_GRACE).await
    }

    async fn goto(&self, locator: &ItemLocator, timeout: Duration) -> Result<(), AutomationError> {
        let op = Op::Goto {
            locator: locator.to_string(),
            timeout_ms: millis(timeout),
        };
        self.request(op, timeout + DRIVER_GRACE).await.map(|_| ())
    }

    async fn step_to_previous_item(
        &self,
        timeout: Duration,
    ) -> Result<ItemLocator, AutomationError> {
        let op = Op::StepPrevious {
            timeout_ms: millis(timeout),
        };
        self.request_locator(op, timeout + DRIVER_GRACE).await
    }

    async fn trigger_download(&self) -> Result<(), AutomationError> {
        self.request(Op::TriggerDownload, SHORT_REQUEST)
            .await
            .map(|_| ())
    }
}

/// Runs the driver attached to the terminal (e.g. for an interactive login)
/// and waits for it to exit.
pub async fn run_interactive(cfg: &AutomationConfig, extra_args: &[String]) -> Result<ExitStatus> {
    let status = tokio::process::Command::new(&cfg.program)
        .args(&cfg.args)
        .args(extra_args)
        .status()
        .await
        .with_context(|| format!("failed to launch automation driver {}", cfg.program))?;
    Ok(status)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A shell driver that answers every request with a fixed locator and
    /// emits one download event after the first request.
    fn scripted_driver() -> AutomationConfig {
        let script = r#"
            sent=0
            while IFS= read -r line; do
              id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
              case "$line" in
                *'"op":"date_label"'*)
                  printf '{"id":%s,"ok":true,"label":"May 17, 2020"}\n' "$id" ;;
                *'"op":"step_previous"'*)
                  printf '{"id":%s,"ok":false,"error":"no previous item"}\n' "$id" ;;
                *'"op":"shutdown"'*)
                  printf '{"id":%s,"ok":true}\n' "$id"; exit 0 ;;
                *)
                  printf '{"id":%s,"ok":true,"locator":"https://photos.google.com/u/0/photo/NEW"}\n' "$id" ;;
              esac
              if [ "$sent" = 0 ]; then
                printf '{"event":"download","url":"https://dl.example.com/a.jpg","suggested_name":"a.jpg"}\n'
                sent=1
              fi
            done
        "#;
        AutomationConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[tokio::test]
    async fn requests_are_routed_and_events_forwarded() {
        let (bridge, mut events) = ProcessBridge::spawn(&scripted_driver(), &[]).unwrap();

        let newest = bridge.jump_to_newest(Duration::from_secs(5)).await.unwrap();
        assert_eq!(newest.as_str(), "https://photos.google.com/photo/NEW");

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.url, "https://dl.example.com/a.jpg");

        let label = bridge.fetch_visible_date_label(&newest).await;
        assert_eq!(label.as_deref(), Some("May 17, 2020"));

        let err = bridge
            .step_to_previous_item(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, AutomationError::Stalled(_)));

        bridge.shutdown(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test]
    async fn driver_exit_fails_pending_requests() {
        let cfg = AutomationConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "read -r line; exit 0".to_string()],
        };
        let (bridge, _events) = ProcessBridge::spawn(&cfg, &[]).unwrap();
        let err = bridge.current_locator().await.unwrap_err();
        assert!(matches!(err, AutomationError::Driver(_)));
    }
}
