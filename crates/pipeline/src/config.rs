//! 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`LogwheelConfig`](logwheel_core::config::LogwheelConfig)에서
//! 파생되어 파이프라인이 실제로 사용하는 평탄화된 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logwheel_core::config::LogwheelConfig;
//! use logwheel_pipeline::config::PipelineConfig;
//!
//! let core_config = LogwheelConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use logwheel_core::config::LogwheelConfig;
use logwheel_core::types::{FileMode, OwnerSpec};

use crate::error::PipelineError;

/// 파이프라인 설정
///
/// core 설정의 output/alert/rules 섹션을 드라이버가 소비하기 좋은
/// 형태로 평탄화한 것입니다.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 출력 파일 기본 이름 (접미어가 붙기 전, 필수)
    pub name: String,
    /// 로테이션 간격 (초). 0이면 로테이션 없음
    pub interval_secs: u64,
    /// 로테이션 시 `name` → 현재 파일 심볼릭 링크 갱신 여부
    pub make_symlink: bool,
    /// 파일명 접미어의 strftime 형식
    pub format: String,
    /// 출력 파일 생성 모드
    pub mode: FileMode,
    /// 출력 파일 소유자
    pub owner: Option<OwnerSpec>,
    /// 알림 수신 주소. None이면 알림 비활성화
    pub email: Option<String>,
    /// 메일 발송 최소 간격 (초)
    pub min_email_interval_secs: u64,
    /// 배칭 윈도우 (초)
    pub batch_window_secs: u64,
    /// 메일 전송 명령 경로
    pub sendmail: String,
    /// 룰 파일 경로. None이면 모든 라인 통과
    pub rules_path: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_core(&LogwheelConfig::default())
    }
}

impl PipelineConfig {
    /// core 설정에서 파이프라인 설정을 만듭니다.
    pub fn from_core(core: &LogwheelConfig) -> Self {
        Self {
            name: core.output.name.clone(),
            interval_secs: core.output.interval_secs,
            make_symlink: core.output.make_symlink,
            format: core.output.format.clone(),
            mode: core.output.mode,
            owner: core.output.owner.clone(),
            email: core.alert.address.clone(),
            min_email_interval_secs: core.alert.min_interval_secs,
            batch_window_secs: core.alert.batch_window_secs,
            sendmail: core.alert.sendmail.clone(),
            rules_path: core.rules.path.clone(),
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.name.is_empty() {
            return Err(PipelineError::Config {
                field: "name".to_owned(),
                reason: "output name is required".to_owned(),
            });
        }

        if self.format.is_empty() {
            return Err(PipelineError::Config {
                field: "format".to_owned(),
                reason: "suffix format must not be empty".to_owned(),
            });
        }

        if self.batch_window_secs == 0 {
            return Err(PipelineError::Config {
                field: "batch_window_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.email.is_some() && self.sendmail.is_empty() {
            return Err(PipelineError::Config {
                field: "sendmail".to_owned(),
                reason: "sendmail path must not be empty when alerting is enabled".to_owned(),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
///
/// 테스트와 라이브러리 사용자가 core 설정을 거치지 않고 파이프라인
/// 설정을 조립할 때 사용합니다.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 출력 파일 기본 이름을 설정합니다.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// 로테이션 간격(초)을 설정합니다.
    pub fn interval_secs(mut self, secs: u64) -> Self {
        self.config.interval_secs = secs;
        self
    }

    /// 심볼릭 링크 갱신 여부를 설정합니다.
    pub fn make_symlink(mut self, make: bool) -> Self {
        self.config.make_symlink = make;
        self
    }

    /// 접미어 형식을 설정합니다.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.config.format = format.into();
        self
    }

    /// 출력 파일 모드를 설정합니다.
    pub fn mode(mut self, mode: FileMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// 출력 파일 소유자를 설정합니다.
    pub fn owner(mut self, owner: OwnerSpec) -> Self {
        self.config.owner = Some(owner);
        self
    }

    /// 알림 수신 주소를 설정합니다.
    pub fn email(mut self, address: impl Into<String>) -> Self {
        self.config.email = Some(address.into());
        self
    }

    /// 메일 발송 최소 간격(초)을 설정합니다.
    pub fn min_email_interval_secs(mut self, secs: u64) -> Self {
        self.config.min_email_interval_secs = secs;
        self
    }

    /// 배칭 윈도우(초)를 설정합니다.
    pub fn batch_window_secs(mut self, secs: u64) -> Self {
        self.config.batch_window_secs = secs;
        self
    }

    /// 메일 전송 명령 경로를 설정합니다.
    pub fn sendmail(mut self, path: impl Into<String>) -> Self {
        self.config.sendmail = path.into();
        self
    }

    /// 룰 파일 경로를 설정합니다.
    pub fn rules_path(mut self, path: impl Into<String>) -> Self {
        self.config.rules_path = Some(path.into());
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
