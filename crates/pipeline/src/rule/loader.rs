//! 룰 파일 로더 -- 텍스트 룰 파일을 컴파일합니다.
//!
//! 한 줄에 하나의 지시어를 갖는 형식을 해석합니다:
//! 빈 줄과 `#` 주석은 무시, `include <path>`는 대상 파일을 그 위치에
//! 텍스트로 펼친 것과 동일하게 처리, 나머지는 `<keyword> <pattern>`
//! 룰입니다. 개별 룰의 문법 오류나 패턴 컴파일 실패는 경고 로그를
//! 남기고 그 룰만 건너뜁니다. 파일 자체를 열 수 없으면 컴파일 전체가
//! 실패합니다.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::bytes::Regex;

use crate::error::PipelineError;

use super::types::{Action, Fingerprint, Rule, RuleSet};

/// include 중첩 허용 최대 깊이
pub const MAX_INCLUDE_DEPTH: usize = 16;

/// 룰 파일의 한 줄을 해석한 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// 다른 룰 파일을 그 자리에 펼침
    Include(PathBuf),
    /// 필터 룰 (패턴은 아직 컴파일 전)
    Rule {
        /// 매칭 시 액션
        action: Action,
        /// 정규식 패턴 원문
        pattern: String,
    },
}

/// 룰 파일 로더
pub struct RuleLoader;

impl RuleLoader {
    /// 루트 룰 파일과 그 include 전체를 컴파일합니다.
    ///
    /// # Errors
    /// - 루트 또는 include된 파일을 열거나 읽을 수 없는 경우
    /// - include 순환이 감지된 경우
    /// - include 중첩 깊이가 [`MAX_INCLUDE_DEPTH`]를 넘는 경우
    pub fn compile(root: impl AsRef<Path>) -> Result<RuleSet, PipelineError> {
        let mut set = RuleSet::default();
        let mut stack = Vec::new();
        Self::compile_into(root.as_ref(), &mut set, &mut stack, 0)?;
        Ok(set)
    }

    fn compile_into(
        path: &Path,
        set: &mut RuleSet,
        stack: &mut Vec<PathBuf>,
        depth: usize,
    ) -> Result<(), PipelineError> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(PipelineError::IncludeDepth {
                path: path.display().to_string(),
                max: MAX_INCLUDE_DEPTH,
            });
        }

        // 순환 감지는 현재 include 체인에 대해서만 수행합니다.
        // 같은 파일을 서로 다른 지점에서 두 번 include하는 것은
        // 텍스트 펼침 의미상 유효합니다.
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if stack.contains(&canonical) {
            return Err(PipelineError::CyclicInclude {
                path: path.display().to_string(),
            });
        }

        let rule_file_error = |reason: String| PipelineError::RuleFile {
            path: path.display().to_string(),
            reason,
        };

        let mut file = fs::File::open(path).map_err(|e| rule_file_error(e.to_string()))?;
        let metadata = file
            .metadata()
            .map_err(|e| rule_file_error(e.to_string()))?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| rule_file_error(e.to_string()))?;
        drop(file);

        set.sources
            .push((path.to_path_buf(), Fingerprint::from_metadata(&metadata)));

        stack.push(canonical);
        for (index, raw_line) in content.lines().enumerate() {
            let lineno = index + 1;
            match Self::parse_line(raw_line) {
                Ok(None) => {}
                Ok(Some(Directive::Include(target))) => {
                    let target = if target.is_absolute() {
                        target
                    } else {
                        // 상대 경로는 include하는 파일 기준으로 해석합니다
                        path.parent().unwrap_or(Path::new(".")).join(target)
                    };
                    let result = Self::compile_into(&target, set, stack, depth + 1);
                    if result.is_err() {
                        stack.pop();
                        return result;
                    }
                }
                Ok(Some(Directive::Rule { action, pattern })) => match Regex::new(&pattern) {
                    Ok(compiled) => set.rules.push(Rule {
                        action,
                        pattern: compiled,
                        source: path.to_path_buf(),
                        line: lineno,
                    }),
                    Err(e) => tracing::warn!(
                        path = %path.display(),
                        line = lineno,
                        error = %e,
                        "error in regex; ignoring rule"
                    ),
                },
                Err(reason) => tracing::warn!(
                    path = %path.display(),
                    line = lineno,
                    %reason,
                    "syntax error; ignoring rule"
                ),
            }
        }
        stack.pop();

        Ok(())
    }

    /// 룰 파일의 한 줄을 해석합니다.
    ///
    /// 빈 줄이나 주석이면 `Ok(None)`, 지시어면 `Ok(Some(_))`,
    /// 문법 오류면 사유를 담은 `Err`를 반환합니다.
    pub fn parse_line(line: &str) -> Result<Option<Directive>, String> {
        let trimmed = line.trim_start_matches([' ', '\t']);
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        // 키워드 뒤에는 반드시 공백이 와야 합니다
        let Some((keyword, rest)) = trimmed.split_once([' ', '\t']) else {
            return Err(format!("bad keyword '{trimmed}'"));
        };
        let rest = rest.trim_start_matches([' ', '\t']);

        if keyword == "include" {
            let target = rest.trim_end();
            if target.is_empty() {
                return Err("include without a path".to_owned());
            }
            return Ok(Some(Directive::Include(PathBuf::from(target))));
        }

        match Action::from_keyword(keyword) {
            Some(action) => Ok(Some(Directive::Rule {
                action,
                pattern: rest.to_owned(),
            })),
            None => Err(format!("bad keyword '{keyword}'")),
        }
    }
}
