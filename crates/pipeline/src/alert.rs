//! 메일 알림 디스패처 -- 비차단 배칭과 발송 간격 제한
//!
//! 트리거 라인이 도착하면 전송 워커를 하나 띄우고, 배칭 윈도우 동안
//! 도착하는 후속 라인을 같은 메일에 모읍니다. 메인 루프와 워커는
//! 비차단 바이트 채널 하나로만 연결되므로, 느린 MTA나 포화된 채널이
//! 로그 수집을 멈추게 할 수 없습니다. 채널이 끊기거나 가득 차면
//! 핸들을 그냥 버립니다 (보내지 못한 바이트는 재전송하지 않음).
//!
//! 전송 워커는 sendmail 서브프로세스를 띄워 메시지 한 통을 구성해
//! 표준 입력으로 넘기고, 윈도우가 끝나면 스스로 종료합니다. 발송
//! 실패는 전부 경고로만 보고됩니다.

use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::PipelineConfig;

/// 워커로 향하는 라인 채널 용량
const CHANNEL_CAPACITY: usize = 256;

/// 메일 알림 디스패처
///
/// 메인 루프가 소유하며, 라이브 채널 핸들과 마지막 발송 시각만
/// 기억합니다. 한 번에 최대 한 개의 워커/채널 쌍만 라이브입니다.
pub struct AlertDispatcher {
    address: String,
    log_name: String,
    sendmail: String,
    min_interval: Duration,
    batch_window: Duration,
    tx: Option<mpsc::Sender<Bytes>>,
    last_spawn: Option<Instant>,
    spawned_count: u64,
    suppressed_count: u64,
}

impl AlertDispatcher {
    /// 파이프라인 설정에서 디스패처를 만듭니다.
    ///
    /// 알림 주소가 설정되어 있지 않으면 None을 돌려줍니다.
    pub fn from_config(config: &PipelineConfig) -> Option<Self> {
        let address = config.email.clone()?;
        Some(Self {
            address,
            log_name: config.name.clone(),
            sendmail: config.sendmail.clone(),
            min_interval: Duration::from_secs(config.min_email_interval_secs),
            batch_window: Duration::from_secs(config.batch_window_secs),
            tx: None,
            last_spawn: None,
            spawned_count: 0,
            suppressed_count: 0,
        })
    }

    /// 트리거 라인을 알림 경로로 전달합니다. 베스트 에포트입니다.
    ///
    /// 라이브 채널이 있으면 비차단 전송을 시도하고, 실패하면 핸들을
    /// 버린 뒤 새 워커 생성을 검토합니다. 마지막 발송으로부터 최소
    /// 간격이 지나지 않았으면 이 라인은 알림에서만 빠집니다 (파일
    /// 기록에는 영향 없음).
    pub fn notify(&mut self, line: &[u8]) {
        let mut line = Bytes::copy_from_slice(line);

        if let Some(tx) = &self.tx {
            match tx.try_send(line) {
                Ok(()) => return,
                Err(e) => {
                    // 채널 포화 또는 워커 종료: 핸들을 버리고 아래의
                    // 새 워커 경로로 넘어갑니다
                    tracing::debug!("alert channel gone; discarding handle");
                    self.tx = None;
                    line = match e {
                        mpsc::error::TrySendError::Full(line)
                        | mpsc::error::TrySendError::Closed(line) => line,
                    };
                }
            }
        }

        if let Some(last) = self.last_spawn {
            if last.elapsed() < self.min_interval {
                self.suppressed_count += 1;
                metrics::counter!(logwheel_core::metrics::ALERT_LINES_SUPPRESSED_TOTAL)
                    .increment(1);
                tracing::debug!("alert suppressed by minimum send interval");
                return;
            }
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker = DeliveryWorker {
            address: self.address.clone(),
            log_name: self.log_name.clone(),
            sendmail: self.sendmail.clone(),
            window: self.batch_window,
        };
        tokio::spawn(worker.deliver(line, rx));

        self.tx = Some(tx);
        self.last_spawn = Some(Instant::now());
        self.spawned_count += 1;
        metrics::counter!(logwheel_core::metrics::ALERT_WORKERS_SPAWNED_TOTAL).increment(1);
    }

    /// 지금까지 생성한 전송 워커 수
    pub fn spawned_count(&self) -> u64 {
        self.spawned_count
    }

    /// 최소 간격 제한으로 억제된 라인 수
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed_count
    }

    /// 라이브 채널 핸들이 있는지 여부
    pub fn has_live_channel(&self) -> bool {
        self.tx.is_some()
    }
}

/// 전송 워커 -- 메일 한 통을 구성하여 MTA에 넘깁니다.
///
/// 디스패처가 `tokio::spawn`으로 띄우며, 메인 루프와는 수신 채널
/// 하나로만 연결됩니다. 윈도우 만료나 채널 닫힘 중 먼저 오는 쪽에서
/// 메시지를 마무리하고 종료합니다.
struct DeliveryWorker {
    address: String,
    log_name: String,
    sendmail: String,
    window: Duration,
}

impl DeliveryWorker {
    async fn deliver(self, trigger: Bytes, mut rx: mpsc::Receiver<Bytes>) {
        // 윈도우는 트리거 시점부터 셉니다
        let deadline = Instant::now() + self.window;

        let mut child = match Command::new(&self.sendmail)
            .arg(&self.address)
            .env_clear()
            .env("PATH", "/bin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    sendmail = %self.sendmail,
                    error = %e,
                    "cannot spawn mail transfer agent"
                );
                return;
            }
        };
        let Some(mut stdin) = child.stdin.take() else {
            tracing::warn!(sendmail = %self.sendmail, "mail transfer agent has no stdin");
            return;
        };

        let mut body = Vec::with_capacity(trigger.len() + 128);
        body.extend_from_slice(
            format!(
                "Subject: error logged to {} on {}\nTo: {}\n\n",
                self.log_name,
                hostname(),
                self.address
            )
            .as_bytes(),
        );
        escape_into(&trigger, &mut body);

        let mut write_failed = false;
        if let Err(e) = stdin.write_all(&body).await {
            tracing::warn!(error = %e, "mail write failed");
            write_failed = true;
        }

        // 윈도우 안에 도착하는 후속 라인을 같은 메일에 덧붙입니다
        while !write_failed {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(chunk)) => {
                    body.clear();
                    escape_into(&chunk, &mut body);
                    if let Err(e) = stdin.write_all(&body).await {
                        tracing::warn!(error = %e, "mail write failed");
                        write_failed = true;
                    }
                }
                // 송신측이 핸들을 버렸거나 윈도우가 끝났습니다
                Ok(None) => break,
                Err(_) => break,
            }
        }
        drop(rx);

        // stdin을 닫아 메시지를 마무리하고 자식을 회수합니다
        drop(stdin);
        match child.wait().await {
            Ok(status) if !status.success() => {
                tracing::warn!(%status, "mail transfer agent exited with failure");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "waiting for mail transfer agent failed"),
        }
    }
}

/// 로컬 호스트명 (조회 실패 시 "localhost")
fn hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_owned())
}

/// 로그 바이트를 메일 본문용으로 이스케이프하여 `out`에 덧붙입니다.
///
/// 개행은 그대로 두고, 탭과 캐리지 리턴은 `\t`/`\r`로, 그 밖의
/// 비출력 바이트는 `\xHH` 16진수로 렌더링합니다.
pub fn escape_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        match b {
            b'\n' => out.push(b'\n'),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\r' => out.extend_from_slice(b"\\r"),
            0x20..=0x7e => out.push(b),
            other => {
                out.extend_from_slice(format!("\\x{other:02x}").as_bytes());
            }
        }
    }
}
