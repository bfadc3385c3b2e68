//! 파이프라인 드라이버 -- 라인 단위 전체 흐름을 관리합니다.
//!
//! 입력 스트림에서 한 줄씩 읽어 룰 갱신 확인, 분류, 로테이션, 파일
//! 기록, 알림 전달을 순서대로 수행합니다. 드라이버 자체는 단일
//! 태스크로 동기적으로 동작하며, 알림 전송 워커만이 별도 태스크로
//! 실행됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! reader -> refresh rules -> classify -> [drop] loop
//!                                     -> reopen -> write -> [pass] notify
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::alert::AlertDispatcher;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::rotate::{DiagTarget, Rotator, unix_now};
use crate::rule::{Action, RuleEngine};

/// 라인 파이프라인
///
/// 활성 룰 체인, 로테이션 상태, 알림 채널을 소유합니다. 공유 가변
/// 상태가 없으므로 락도 없습니다.
///
/// # 사용 예시
/// ```ignore
/// use logwheel_pipeline::{LogwheelPipeline, LogwheelPipelineBuilder};
///
/// let mut pipeline = LogwheelPipelineBuilder::new()
///     .config(config)
///     .build()?;
///
/// let stdin = tokio::io::BufReader::new(tokio::io::stdin());
/// pipeline.run(stdin).await?;
/// ```
pub struct LogwheelPipeline {
    /// 룰 엔진. 룰 파일이 설정되지 않으면 None (모든 라인 통과)
    rules: Option<RuleEngine>,
    /// 로테이션 스케줄러
    rotator: Rotator,
    /// 알림 디스패처. 수신 주소가 없으면 None
    alert: Option<AlertDispatcher>,
    /// 읽어 들인 라인 수
    processed_count: u64,
    /// drop 룰로 버린 라인 수
    dropped_count: u64,
    /// 알림 경로에 전달한 라인 수
    alerted_count: u64,
}

impl LogwheelPipeline {
    /// 입력 스트림이 끝날 때까지 라인을 처리합니다.
    ///
    /// 종료 조건은 둘뿐입니다: 깨끗한 EOF(`Ok`)와 복구 불가능한 읽기
    /// 에러(`Err`). 그 밖의 모든 에러는 내부에서 보고하고 계속
    /// 진행합니다.
    pub async fn run<R>(&mut self, mut reader: R) -> Result<(), PipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        // 원본과 같이 첫 라인을 읽기 전에 파일과 룰을 준비합니다
        self.rotator.reopen(unix_now());
        if let Some(rules) = &mut self.rules {
            rules.refresh();
        }

        let mut line: Vec<u8> = Vec::with_capacity(1024);
        loop {
            line.clear();
            let n = reader.read_until(b'\n', &mut line).await?;
            if n == 0 {
                break;
            }
            self.process_line(&mut line);
        }

        tracing::debug!(
            processed = self.processed_count,
            dropped = self.dropped_count,
            alerted = self.alerted_count,
            "input stream ended"
        );
        Ok(())
    }

    /// 한 라인을 분류하고 기록/알림 경로로 보냅니다.
    ///
    /// 분류는 읽은 그대로의 라인(종결자 포함)에 대해 수행하고, 기록
    /// 직전에만 빠진 종결자를 보충합니다. 스트림 끝의 미종결 라인도
    /// 하나의 라인으로 취급됩니다.
    fn process_line(&mut self, line: &mut Vec<u8>) {
        self.processed_count += 1;
        metrics::counter!(logwheel_core::metrics::LINES_READ_TOTAL).increment(1);

        if let Some(rules) = &mut self.rules {
            rules.refresh();
        }
        let action = match &self.rules {
            Some(rules) => rules.action_for(line),
            None => Action::Pass,
        };

        if !action.writes_file() {
            self.dropped_count += 1;
            metrics::counter!(logwheel_core::metrics::LINES_DROPPED_TOTAL).increment(1);
            return;
        }

        self.rotator.reopen(unix_now());
        if line.last() != Some(&b'\n') {
            line.push(b'\n');
        }
        self.rotator.write_line(line);

        if action.sends_email() {
            if let Some(alert) = &mut self.alert {
                alert.notify(line);
                self.alerted_count += 1;
            }
        }
    }

    /// 읽어 들인 라인 수
    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    /// drop 룰로 버린 라인 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }

    /// 알림 경로에 전달한 라인 수
    pub fn alerted_count(&self) -> u64 {
        self.alerted_count
    }

    /// 활성 룰 체인의 명시적 룰 수
    pub fn rule_count(&self) -> usize {
        self.rules.as_ref().map_or(0, RuleEngine::rule_count)
    }

    /// 현재 열려 있는 출력 파일 경로
    pub fn current_output(&self) -> Option<&std::path::Path> {
        self.rotator.current_path()
    }
}

/// 파이프라인 빌더
///
/// 설정을 검증하고 구성 요소를 조립합니다. 소유자 해석 실패 같은
/// 치명적 시작 에러는 여기서 반환됩니다.
#[derive(Default)]
pub struct LogwheelPipelineBuilder {
    config: PipelineConfig,
    diag: DiagTarget,
}

impl LogwheelPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            diag: DiagTarget::new(),
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 진단 출력 대상을 공유합니다.
    ///
    /// CLI가 tracing writer와 같은 대상을 넘겨주면 비치명적 에러가
    /// 현재 로그 파일로 향합니다.
    pub fn diag_target(mut self, diag: DiagTarget) -> Self {
        self.diag = diag;
        self
    }

    /// 파이프라인을 빌드합니다.
    pub fn build(self) -> Result<LogwheelPipeline, PipelineError> {
        self.config.validate()?;

        let rotator = Rotator::from_config(&self.config, self.diag)?;
        let rules = self.config.rules_path.as_ref().map(RuleEngine::new);
        let alert = AlertDispatcher::from_config(&self.config);

        Ok(LogwheelPipeline {
            rules,
            rotator,
            alert,
            processed_count: 0,
            dropped_count: 0,
            alerted_count: 0,
        })
    }
}
