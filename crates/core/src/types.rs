//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 출력 파일 생성 모드 (8진수)
///
/// 설정 파일과 CLI에서는 `"0640"` 같은 8진수 문자열로 표기합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileMode(u32);

impl FileMode {
    /// 모드 비트를 반환합니다.
    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for FileMode {
    fn default() -> Self {
        FileMode(0o640)
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

impl FromStr for FileMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("0o");
        let bits = u32::from_str_radix(digits, 8).map_err(|_| ConfigError::InvalidValue {
            field: "output.mode".to_owned(),
            reason: format!("'{s}' is not an octal file mode"),
        })?;
        if bits > 0o7777 {
            return Err(ConfigError::InvalidValue {
                field: "output.mode".to_owned(),
                reason: format!("'{s}' exceeds 07777"),
            });
        }
        Ok(FileMode(bits))
    }
}

impl TryFrom<String> for FileMode {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FileMode> for String {
    fn from(mode: FileMode) -> Self {
        mode.to_string()
    }
}

/// 출력 파일 소유자 지정
///
/// `user` 또는 `user:group` 형식입니다. 이름 대신 숫자 uid/gid도
/// 허용되며, 실제 해석은 파이프라인 구성 시점에 수행됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerSpec {
    /// 사용자 이름 또는 숫자 uid
    pub user: String,
    /// 그룹 이름 또는 숫자 gid (생략 시 그룹 미변경)
    pub group: Option<String>,
}

impl fmt::Display for OwnerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}:{}", self.user, group),
            None => write!(f, "{}", self.user),
        }
    }
}

impl FromStr for OwnerSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (user, group) = match s.split_once(':') {
            Some((user, group)) => (user, Some(group)),
            None => (s, None),
        };
        if user.is_empty() || group.is_some_and(str::is_empty) {
            return Err(ConfigError::InvalidValue {
                field: "output.owner".to_owned(),
                reason: format!("'{s}' is not a 'user[:group]' spec"),
            });
        }
        Ok(OwnerSpec {
            user: user.to_owned(),
            group: group.map(str::to_owned),
        })
    }
}

impl TryFrom<String> for OwnerSpec {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<OwnerSpec> for String {
    fn from(owner: OwnerSpec) -> Self {
        owner.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_0640() {
        assert_eq!(FileMode::default().bits(), 0o640);
    }

    #[test]
    fn mode_parses_octal() {
        let mode: FileMode = "0644".parse().unwrap();
        assert_eq!(mode.bits(), 0o644);
        let mode: FileMode = "600".parse().unwrap();
        assert_eq!(mode.bits(), 0o600);
    }

    #[test]
    fn mode_rejects_non_octal() {
        assert!("abc".parse::<FileMode>().is_err());
        assert!("0999".parse::<FileMode>().is_err());
        assert!("".parse::<FileMode>().is_err());
    }

    #[test]
    fn mode_rejects_out_of_range() {
        assert!("17777".parse::<FileMode>().is_err());
    }

    #[test]
    fn mode_display_roundtrip() {
        let mode: FileMode = "0640".parse().unwrap();
        assert_eq!(mode.to_string(), "0640");
    }

    #[test]
    fn owner_user_only() {
        let owner: OwnerSpec = "syslog".parse().unwrap();
        assert_eq!(owner.user, "syslog");
        assert!(owner.group.is_none());
    }

    #[test]
    fn owner_user_and_group() {
        let owner: OwnerSpec = "syslog:adm".parse().unwrap();
        assert_eq!(owner.user, "syslog");
        assert_eq!(owner.group.as_deref(), Some("adm"));
    }

    #[test]
    fn owner_numeric_ids_accepted() {
        let owner: OwnerSpec = "1000:1000".parse().unwrap();
        assert_eq!(owner.user, "1000");
    }

    #[test]
    fn owner_rejects_empty_parts() {
        assert!("".parse::<OwnerSpec>().is_err());
        assert!(":adm".parse::<OwnerSpec>().is_err());
        assert!("syslog:".parse::<OwnerSpec>().is_err());
    }
}
