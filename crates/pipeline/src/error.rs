//! 파이프라인 에러 타입
//!
//! [`PipelineError`]는 파이프라인 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<PipelineError> for LogwheelError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use logwheel_core::error::LogwheelError;

/// 파이프라인 도메인 에러
///
/// 룰 컴파일, 로테이션, 알림 전송, 설정 검증 등 파이프라인 내부의
/// 에러 상황을 포괄합니다. 대부분은 경고로 보고된 뒤 처리에 계속
/// 진행하며, 드라이버 밖으로 전파되는 것은 치명적 경우뿐입니다.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 룰 파일을 열거나 읽을 수 없음
    #[error("rule file error: {path}: {reason}")]
    RuleFile {
        /// 문제가 된 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// include 순환 감지
    #[error("cyclic include: {path}")]
    CyclicInclude {
        /// 순환을 일으킨 파일 경로
        path: String,
    },

    /// include 중첩 깊이 초과
    #[error("include depth exceeded at {path} (max {max})")]
    IncludeDepth {
        /// 한도를 넘긴 include 대상 경로
        path: String,
        /// 허용 최대 깊이
        max: usize,
    },

    /// 로테이션 실패 (파일명 생성, 열기 등)
    #[error("rotation error: {path}: {reason}")]
    Rotate {
        /// 대상 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러 (입력 스트림 읽기 실패 등)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PipelineError> for LogwheelError {
    fn from(err: PipelineError) -> Self {
        LogwheelError::Pipeline(err.to_string())
    }
}
