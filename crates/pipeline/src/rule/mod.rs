//! 필터 룰 엔진 -- 텍스트 룰 파일 기반 라인 분류
//!
//! 룰 파일을 컴파일하여 라인별로 pass / passnoemail / drop을 결정하고,
//! 구성 파일(include 포함)의 변경을 지문으로 감지하여 다음 라인부터
//! 새 체인을 적용합니다.
//!
//! # 룰 파일 형식
//! ```text
//! # 주석과 빈 줄은 무시
//! include common.rules
//! drop .*heartbeat ok.*
//! passnoemail ^INFO
//! pass .*
//! ```
//!
//! 여러 룰이 매칭되면 (include 펼침 기준) 마지막에 선언된 룰이
//! 적용됩니다. 파일 맨 앞에 암묵적 `pass .*`가 있는 것으로 봅니다.
//!
//! # 아키텍처
//! - [`RuleEngine`]: 활성 체인 보관, 변경 감지와 교체 코디네이터
//! - [`loader`]: 파일 읽기, include 펼침, 패턴 컴파일
//! - [`matcher`]: 마지막 선언 우선 평가
//! - [`types`]: 룰 데이터 구조와 파일 지문

pub mod loader;
pub mod matcher;
pub mod types;

pub use loader::{Directive, MAX_INCLUDE_DEPTH, RuleLoader};
pub use types::{Action, Fingerprint, Rule, RuleSet};

use std::path::PathBuf;

/// 룰 엔진 -- 활성 룰 체인과 그 변경 감지를 관리합니다.
///
/// 드라이버는 입력 라인마다 [`refresh`](RuleEngine::refresh)를 호출한 뒤
/// [`action_for`](RuleEngine::action_for)로 라인을 분류합니다. 활성
/// 체인은 통째로만 교체되며, 재컴파일에 실패하면 기존 체인이 그대로
/// 유지됩니다.
pub struct RuleEngine {
    /// 루트 룰 파일 경로
    root: PathBuf,
    /// 활성 체인. 최초 컴파일 전이나 루트 파일이 없으면 None
    active: Option<RuleSet>,
    /// 재컴파일 횟수
    recompile_count: u64,
}

impl RuleEngine {
    /// 새 엔진을 만듭니다. 최초 컴파일은 첫 `refresh` 호출에서
    /// 수행됩니다.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            active: None,
            recompile_count: 0,
        }
    }

    /// 구성 파일의 변경 여부를 확인하고 필요하면 재컴파일합니다.
    ///
    /// 활성 체인이 없으면 무조건 컴파일을 시도합니다. 있으면 기여한
    /// 모든 파일을 stat하여 지문이 하나라도 다를 때만 루트부터 다시
    /// 컴파일합니다. 실패 시 기존 체인을 유지하고 경고만 남기므로,
    /// 편집 중 일시적으로 깨진 룰 파일이 파이프라인을 멈추지 않습니다.
    pub fn refresh(&mut self) {
        if let Some(active) = &self.active {
            let stale = active.sources.iter().any(|(path, recorded)| {
                Fingerprint::of(path)
                    .map(|current| current != *recorded)
                    .unwrap_or(true)
            });
            if !stale {
                return;
            }
        }

        match RuleLoader::compile(&self.root) {
            Ok(set) => {
                self.recompile_count += 1;
                metrics::counter!(logwheel_core::metrics::RULES_RECOMPILED_TOTAL).increment(1);
                tracing::debug!(
                    path = %self.root.display(),
                    rules = set.len(),
                    files = set.source_count(),
                    "rule chain compiled"
                );
                self.active = Some(set);
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.root.display(),
                    error = %e,
                    "rule compilation failed; keeping previous chain"
                );
            }
        }
    }

    /// 라인에 적용할 액션을 결정합니다.
    ///
    /// 활성 체인이 없으면 암묵적 기본 룰에 따라 모든 라인을
    /// 통과시킵니다.
    pub fn action_for(&self, line: &[u8]) -> Action {
        match &self.active {
            Some(set) => set.action_for(line),
            None => Action::Pass,
        }
    }

    /// 활성 체인의 명시적 룰 수
    pub fn rule_count(&self) -> usize {
        self.active.as_ref().map_or(0, RuleSet::len)
    }

    /// 지금까지 수행한 (재)컴파일 횟수
    pub fn recompile_count(&self) -> u64 {
        self.recompile_count
    }

    /// 활성 체인이 있는지 여부
    pub fn is_loaded(&self) -> bool {
        self.active.is_some()
    }
}
