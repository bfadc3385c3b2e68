//! 설정 관리 — logwheel.toml 파싱 및 런타임 설정
//!
//! [`LogwheelConfig`]는 도구 전체의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, `logwheel-cli`에서 적용)
//! 2. 환경변수 (`LOGWHEEL_ALERT_SENDMAIL=/usr/lib/sendmail` 형식)
//! 3. 설정 파일 (`logwheel.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logwheel_core::error::LogwheelError> {
//! use logwheel_core::config::LogwheelConfig;
//!
//! let mut config = LogwheelConfig::from_file("logwheel.toml").await?;
//! config.apply_env_overrides();
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LogwheelError};
use crate::types::{FileMode, OwnerSpec};

/// Logwheel 통합 설정
///
/// `logwheel.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogwheelConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 출력 파일/로테이션 설정
    #[serde(default)]
    pub output: OutputConfig,
    /// 메일 알림 설정
    #[serde(default)]
    pub alert: AlertConfig,
    /// 필터 룰 설정
    #[serde(default)]
    pub rules: RulesConfig,
}

impl LogwheelConfig {
    /// TOML 파일에서 설정을 로드합니다.
    ///
    /// 환경변수와 CLI 오버라이드는 호출자가 이후에 적용합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogwheelError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogwheelError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogwheelError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogwheelError> {
        toml::from_str(toml_str).map_err(|e| {
            LogwheelError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGWHEEL_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        override_string(&mut self.general.log_level, "LOGWHEEL_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGWHEEL_GENERAL_LOG_FORMAT");
        override_string(&mut self.output.format, "LOGWHEEL_OUTPUT_FORMAT");
        override_string(&mut self.alert.sendmail, "LOGWHEEL_ALERT_SENDMAIL");
        override_u64(
            &mut self.alert.min_interval_secs,
            "LOGWHEEL_ALERT_MIN_INTERVAL_SECS",
        );
        override_u64(
            &mut self.alert.batch_window_secs,
            "LOGWHEEL_ALERT_BATCH_WINDOW_SECS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 여기서 거부되는 값은 전부 치명적 시작 에러입니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MAX_BATCH_WINDOW_SECS: u64 = 3600;

        if self.output.name.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.name".to_owned(),
                reason: "output name is required".to_owned(),
            });
        }

        if self.output.format.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "output.format".to_owned(),
                reason: "suffix format must not be empty".to_owned(),
            });
        }

        match self.general.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "general.log_format".to_owned(),
                    reason: format!("unknown log format '{other}' (expected 'pretty' or 'json')"),
                });
            }
        }

        if self.alert.batch_window_secs == 0 || self.alert.batch_window_secs > MAX_BATCH_WINDOW_SECS
        {
            return Err(ConfigError::InvalidValue {
                field: "alert.batch_window_secs".to_owned(),
                reason: format!("must be 1-{MAX_BATCH_WINDOW_SECS}"),
            });
        }

        if self.alert.sendmail.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "alert.sendmail".to_owned(),
                reason: "sendmail path must not be empty".to_owned(),
            });
        }

        if self.alert.address.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::InvalidValue {
                field: "alert.address".to_owned(),
                reason: "alert address must not be empty".to_owned(),
            });
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 출력 형식 (pretty, json)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 출력 파일/로테이션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// 출력 파일 기본 이름 (필수)
    pub name: String,
    /// 로테이션 간격 (초). 0이면 로테이션 없음
    pub interval_secs: u64,
    /// 로테이션 시 `name` → 현재 파일 심볼릭 링크 갱신 여부
    pub make_symlink: bool,
    /// 파일명 접미어의 strftime 형식 (기본: `.` + epoch 초)
    pub format: String,
    /// 출력 파일 생성 모드
    pub mode: FileMode,
    /// 출력 파일 소유자 (`user[:group]`, 생략 가능)
    pub owner: Option<OwnerSpec>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            interval_secs: 86_400,
            make_symlink: false,
            format: ".%s".to_owned(),
            mode: FileMode::default(),
            owner: None,
        }
    }
}

/// 메일 알림 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// 수신 주소. 설정된 경우에만 알림이 활성화됩니다
    pub address: Option<String>,
    /// 메일 발송 최소 간격 (초)
    pub min_interval_secs: u64,
    /// 한 통에 후속 라인을 모으는 배칭 윈도우 (초)
    pub batch_window_secs: u64,
    /// 메일 전송 명령 경로
    pub sendmail: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            address: None,
            min_interval_secs: 1800,
            batch_window_secs: 5,
            sendmail: "/usr/sbin/sendmail".to_owned(),
        }
    }
}

/// 필터 룰 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// 룰 파일 경로. 생략하면 모든 라인이 통과합니다
    pub path: Option<String>,
}

/// 간격 문자열을 초 단위로 해석합니다.
///
/// `NUMBER [UNIT]` 형식이며 UNIT은 seconds, minutes, hours, days,
/// weeks 또는 그 약어입니다 (첫 글자만 봅니다). UNIT이 없으면 초로
/// 간주합니다. `0`은 로테이션 비활성화를 뜻하는 유효한 값입니다.
pub fn parse_interval(s: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        field: "output.interval".to_owned(),
        reason: format!("'{s}' is not a valid interval"),
    };

    let trimmed = s.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(digits_end);
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let multiplier = match unit.trim().chars().next() {
        None => 1,
        Some(c) => match c.to_ascii_lowercase() {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            'w' => 7 * 86_400,
            _ => return Err(invalid()),
        },
    };

    value.checked_mul(multiplier).ok_or_else(invalid)
}

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

fn override_u64(target: &mut u64, var: &str) {
    if let Ok(value) = std::env::var(var) {
        match value.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, %value, "ignoring non-numeric environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named() -> LogwheelConfig {
        let mut config = LogwheelConfig::default();
        config.output.name = "/var/log/app".to_owned();
        config
    }

    #[test]
    fn default_config_with_name_is_valid() {
        named().validate().unwrap();
    }

    #[test]
    fn missing_name_is_fatal() {
        let config = LogwheelConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_values_match_documented_defaults() {
        let config = LogwheelConfig::default();
        assert_eq!(config.output.format, ".%s");
        assert_eq!(config.output.mode.bits(), 0o640);
        assert_eq!(config.alert.min_interval_secs, 1800);
        assert_eq!(config.alert.batch_window_secs, 5);
        assert_eq!(config.alert.sendmail, "/usr/sbin/sendmail");
    }

    #[test]
    fn parse_toml_sections() {
        let config = LogwheelConfig::parse(
            r#"
[general]
log_level = "debug"

[output]
name = "/var/log/web/errors"
interval_secs = 3600
make_symlink = true
mode = "0644"
owner = "www-data:adm"

[alert]
address = "ops@example.org"
min_interval_secs = 600

[rules]
path = "/etc/logwheel/rules"
"#,
        )
        .unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.output.name, "/var/log/web/errors");
        assert_eq!(config.output.interval_secs, 3600);
        assert!(config.output.make_symlink);
        assert_eq!(config.output.mode.bits(), 0o644);
        assert_eq!(config.output.owner.as_ref().unwrap().user, "www-data");
        assert_eq!(config.alert.address.as_deref(), Some("ops@example.org"));
        assert_eq!(config.alert.min_interval_secs, 600);
        assert_eq!(config.rules.path.as_deref(), Some("/etc/logwheel/rules"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_rejects_bad_mode() {
        let result = LogwheelConfig::parse("[output]\nname = \"/l\"\nmode = \"99x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_bad_log_format() {
        let mut config = named();
        config.general.log_format = "xml".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch_window() {
        let mut config = named();
        config.alert.batch_window_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_address() {
        let mut config = named();
        config.alert.address = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn interval_plain_seconds() {
        assert_eq!(parse_interval("600").unwrap(), 600);
        assert_eq!(parse_interval("  42  ").unwrap(), 42);
    }

    #[test]
    fn interval_zero_disables_rotation() {
        assert_eq!(parse_interval("0").unwrap(), 0);
    }

    #[test]
    fn interval_units() {
        assert_eq!(parse_interval("10 seconds").unwrap(), 10);
        assert_eq!(parse_interval("10 minutes").unwrap(), 600);
        assert_eq!(parse_interval("2h").unwrap(), 7200);
        assert_eq!(parse_interval("1 day").unwrap(), 86_400);
        assert_eq!(parse_interval("2 weeks").unwrap(), 1_209_600);
        // 모호하지 않은 약어: 첫 글자만 봅니다
        assert_eq!(parse_interval("5 min").unwrap(), 300);
    }

    #[test]
    fn interval_rejects_garbage() {
        assert!(parse_interval("").is_err());
        assert!(parse_interval("ten minutes").is_err());
        assert!(parse_interval("10 fortnights").is_err());
        assert!(parse_interval("-5").is_err());
    }

    #[test]
    fn interval_rejects_overflow() {
        assert!(parse_interval("99999999999999999999").is_err());
        assert!(parse_interval("18446744073709551615 weeks").is_err());
    }

    #[test]
    fn env_override_applies() {
        // 고유한 변수명을 사용하므로 테스트 간 간섭이 없습니다
        unsafe {
            std::env::set_var("LOGWHEEL_ALERT_SENDMAIL", "/usr/lib/sendmail");
        }
        let mut config = named();
        config.apply_env_overrides();
        assert_eq!(config.alert.sendmail, "/usr/lib/sendmail");
        unsafe {
            std::env::remove_var("LOGWHEEL_ALERT_SENDMAIL");
        }
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let result = LogwheelConfig::from_file("/nonexistent/logwheel.toml").await;
        assert!(matches!(
            result,
            Err(LogwheelError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logwheel.toml");
        std::fs::write(&path, "[output]\nname = \"/var/log/app\"\n").unwrap();
        let config = LogwheelConfig::from_file(&path).await.unwrap();
        assert_eq!(config.output.name, "/var/log/app");
    }
}
