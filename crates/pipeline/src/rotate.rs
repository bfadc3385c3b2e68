//! 로테이션 스케줄러 -- 시간 버킷 계산과 출력 파일 관리
//!
//! 벽시계를 간격 단위 버킷으로 나누어 현재 버킷에 해당하는 파일을
//! 열어 둡니다. 버킷이 바뀌면 새 파일을 열고, 설정에 따라 `name` →
//! 현재 파일 심볼릭 링크를 원자적으로 갱신합니다. 로테이션 실패는
//! 전부 비치명적이며 기존 디스크립터를 계속 사용합니다.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{Local, TimeZone};
use uuid::Uuid;

use logwheel_core::types::OwnerSpec;

use crate::config::PipelineConfig;
use crate::error::PipelineError;

/// 임시 심볼릭 링크 이름 충돌 시 재시도 횟수
const SYMLINK_NAME_RETRIES: usize = 8;

/// 현재 Unix 시각 (초)
pub(crate) fn unix_now() -> i64 {
    Local::now().timestamp()
}

/// `now`가 속한 로테이션 버킷의 시작 시각을 구합니다.
///
/// 버킷 시작은 항상 `interval`의 배수입니다. `interval`이 0이면
/// 로테이션이 비활성화된 것이므로 `now`를 그대로 돌려주며, 이때
/// 버킷 경계는 [`Rotator`]가 첫 파일을 연 시각에 고정되어 프로세스
/// 수명 내내 바뀌지 않습니다. (0으로 나머지 연산을 하지 않도록
/// 명시적으로 분기합니다.)
pub fn select_bucket(now: i64, interval: i64) -> i64 {
    if interval <= 0 {
        now
    } else {
        now - now.rem_euclid(interval)
    }
}

/// 진단 출력 대상 -- 현재 열려 있는 출력 파일 핸들 공유
///
/// 비치명적 에러는 열려 있는 로그 파일이 있으면 그 파일로, 없으면
/// 표준 에러로 보고됩니다. 로테이터가 새 파일을 열 때마다 이 대상을
/// 갱신하고, CLI의 tracing writer가 읽어 갑니다.
#[derive(Clone, Default)]
pub struct DiagTarget(Arc<Mutex<Option<File>>>);

impl DiagTarget {
    /// 빈 대상(표준 에러로 폴백)을 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 현재 대상 파일을 교체합니다.
    pub fn set(&self, file: Option<File>) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = file;
        }
    }

    /// 쓰기용으로 복제한 파일 핸들을 돌려줍니다. 대상이 없으면 None.
    pub fn for_write(&self) -> Option<File> {
        self.0
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().and_then(|file| file.try_clone().ok()))
    }
}

/// 해석된 소유자 (uid/gid)
#[derive(Debug, Clone, Copy)]
struct ResolvedOwner {
    uid: Option<u32>,
    gid: Option<u32>,
}

/// `user[:group]` 지정을 uid/gid로 해석합니다.
///
/// 이름 해석 실패는 치명적 시작 에러입니다. 그룹이 생략되면 그룹은
/// 변경하지 않습니다.
fn resolve_owner(spec: &OwnerSpec) -> Result<ResolvedOwner, PipelineError> {
    let config_error = |reason: String| PipelineError::Config {
        field: "owner".to_owned(),
        reason,
    };

    let uid = if spec.user.bytes().all(|b| b.is_ascii_digit()) {
        spec.user
            .parse()
            .map_err(|_| config_error(format!("'{}' is not a valid uid", spec.user)))?
    } else {
        nix::unistd::User::from_name(&spec.user)
            .map_err(|e| config_error(format!("user lookup failed: {e}")))?
            .ok_or_else(|| config_error(format!("unknown user '{}'", spec.user)))?
            .uid
            .as_raw()
    };

    let gid = match &spec.group {
        None => None,
        Some(group) if group.bytes().all(|b| b.is_ascii_digit()) => Some(
            group
                .parse()
                .map_err(|_| config_error(format!("'{group}' is not a valid gid")))?,
        ),
        Some(group) => Some(
            nix::unistd::Group::from_name(group)
                .map_err(|e| config_error(format!("group lookup failed: {e}")))?
                .ok_or_else(|| config_error(format!("unknown group '{group}'")))?
                .gid
                .as_raw(),
        ),
    };

    Ok(ResolvedOwner {
        uid: Some(uid),
        gid,
    })
}

/// 로테이션 스케줄러
///
/// 현재 버킷의 출력 파일 디스크립터를 소유합니다. 드라이버가 기록
/// 직전마다 [`reopen`](Rotator::reopen)을 호출하며, 버킷이 그대로면
/// 시스템 콜 없이 즉시 반환합니다.
pub struct Rotator {
    name: PathBuf,
    interval: i64,
    format: String,
    make_symlink: bool,
    mode: u32,
    owner: Option<ResolvedOwner>,
    diag: DiagTarget,
    file: Option<File>,
    bucket_start: i64,
    current_path: Option<PathBuf>,
    rotation_count: u64,
}

impl Rotator {
    /// 파이프라인 설정에서 로테이터를 만듭니다.
    ///
    /// 소유자 지정의 해석 실패와 표현 불가능한 간격은 여기서 치명적
    /// 에러로 보고됩니다.
    pub fn from_config(config: &PipelineConfig, diag: DiagTarget) -> Result<Self, PipelineError> {
        let interval = i64::try_from(config.interval_secs).map_err(|_| PipelineError::Config {
            field: "interval_secs".to_owned(),
            reason: format!("{} does not fit in a time offset", config.interval_secs),
        })?;
        let owner = config.owner.as_ref().map(resolve_owner).transpose()?;

        Ok(Self {
            name: PathBuf::from(&config.name),
            interval,
            format: config.format.clone(),
            make_symlink: config.make_symlink,
            mode: config.mode.bits(),
            owner,
            diag,
            file: None,
            bucket_start: 0,
            current_path: None,
            rotation_count: 0,
        })
    }

    /// 현재 버킷에 맞는 파일이 열려 있도록 보장합니다.
    ///
    /// 버킷이 바뀌지 않았고 파일이 이미 열려 있으면 아무것도 하지
    /// 않습니다. 새 파일 열기에 실패하면 경고를 남기고 기존
    /// 디스크립터를 유지합니다.
    pub fn reopen(&mut self, now: i64) {
        let bucket = select_bucket(now, self.interval);
        if self.file.is_some() && (self.interval == 0 || bucket == self.bucket_start) {
            return;
        }

        let path = match self.target_path(bucket) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "cannot format log file name; keeping previous file");
                return;
            }
        };

        match self.open_target(&path) {
            Ok(file) => {
                self.diag.set(file.try_clone().ok());
                self.file = Some(file);
                self.bucket_start = bucket;
                self.rotation_count += 1;
                metrics::counter!(logwheel_core::metrics::ROTATIONS_TOTAL).increment(1);
                tracing::debug!(path = %path.display(), bucket, "opened log file");
                if self.make_symlink {
                    self.install_symlink(&path);
                }
                self.current_path = Some(path);
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "cannot open log file; keeping previous file"
                );
            }
        }
    }

    /// 버킷 시작 시각에 접미어 형식을 적용한 대상 경로를 만듭니다.
    fn target_path(&self, bucket: i64) -> Result<PathBuf, PipelineError> {
        let rotate_error = |reason: String| PipelineError::Rotate {
            path: self.name.display().to_string(),
            reason,
        };

        let bucket_time = Local
            .timestamp_opt(bucket, 0)
            .single()
            .ok_or_else(|| rotate_error(format!("bucket {bucket} is not a representable time")))?;

        let mut suffix = String::new();
        write!(suffix, "{}", bucket_time.format(&self.format))
            .map_err(|_| rotate_error(format!("invalid suffix format '{}'", self.format)))?;

        let mut target = self.name.clone().into_os_string();
        target.push(&suffix);
        Ok(PathBuf::from(target))
    }

    /// 대상 파일을 추가 모드로 열고 소유자를 적용합니다.
    fn open_target(&self, path: &Path) -> std::io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;

        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .mode(self.mode)
            .custom_flags(libc::O_SYNC)
            .open(path)?;

        if let Some(owner) = self.owner {
            // chown 실패는 비치명적입니다 (루트가 아닐 때 등)
            if let Err(e) = std::os::unix::fs::fchown(&file, owner.uid, owner.gid) {
                tracing::warn!(path = %path.display(), error = %e, "chown failed");
            }
        }

        Ok(file)
    }

    /// `name` → 현재 파일 심볼릭 링크를 원자적으로 설치합니다.
    ///
    /// symlink(2)는 기존 파일을 덮어쓸 수 없으므로 임시 이름으로 만든
    /// 뒤 rename으로 교체합니다. 링크 대상은 같은 디렉토리 안의
    /// 상대 경로(베이스 이름)입니다.
    fn install_symlink(&self, target: &Path) {
        let Some(basename) = target.file_name() else {
            return;
        };

        for _ in 0..SYMLINK_NAME_RETRIES {
            let mut temp = self.name.clone().into_os_string();
            temp.push(format!(".{}", Uuid::new_v4().simple()));
            let temp = PathBuf::from(temp);

            match std::os::unix::fs::symlink(basename, &temp) {
                Ok(()) => {
                    if let Err(e) = std::fs::rename(&temp, &self.name) {
                        tracing::warn!(
                            link = %self.name.display(),
                            error = %e,
                            "symlink rename failed"
                        );
                        let _ = std::fs::remove_file(&temp);
                    }
                    return;
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    tracing::warn!(
                        link = %self.name.display(),
                        error = %e,
                        "symlink creation failed"
                    );
                    return;
                }
            }
        }

        tracing::warn!(link = %self.name.display(), "could not find a free temporary link name");
    }

    /// 라인을 현재 파일에 덧붙입니다.
    ///
    /// 파일이 열려 있지 않으면 라인은 소실됩니다. 쓰기 에러(디스크
    /// 가득 참 등)는 재시도해도 소용없으므로 정책상 무시합니다.
    pub fn write_line(&mut self, line: &[u8]) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.write_all(line);
            metrics::counter!(logwheel_core::metrics::LINES_WRITTEN_TOTAL).increment(1);
        }
    }

    /// 파일이 열려 있는지 여부
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// 현재 열려 있는 파일의 경로
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// 현재 버킷의 시작 시각
    pub fn bucket_start(&self) -> i64 {
        self.bucket_start
    }

    /// 지금까지 새 파일을 연 횟수
    pub fn rotation_count(&self) -> u64 {
        self.rotation_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfigBuilder;

    fn rotator(name: &Path, interval_secs: u64) -> Rotator {
        let config = PipelineConfigBuilder::new()
            .name(name.to_str().unwrap())
            .interval_secs(interval_secs)
            .build()
            .unwrap();
        Rotator::from_config(&config, DiagTarget::new()).unwrap()
    }

    #[test]
    fn bucket_is_multiple_of_interval() {
        assert_eq!(select_bucket(1_000_000_013, 60), 999_999_960);
        assert_eq!(select_bucket(1_000_000_013, 60) % 60, 0);
        assert_eq!(select_bucket(7199, 3600), 3600);
        assert_eq!(select_bucket(7200, 3600), 7200);
    }

    #[test]
    fn bucket_is_idempotent_within_interval() {
        let start = select_bucket(1_000_000_000, 600);
        for offset in 0..600 {
            assert_eq!(select_bucket(start + offset, 600), start);
        }
        assert_eq!(select_bucket(start + 600, 600), start + 600);
    }

    #[test]
    fn zero_interval_is_guarded() {
        // 0으로 나머지 연산을 하지 않고 now를 그대로 돌려줍니다
        assert_eq!(select_bucket(12345, 0), 12345);
    }

    #[test]
    fn default_suffix_is_epoch_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let mut rot = rotator(&name, 100);
        rot.reopen(1_000_000_000);

        let expected = dir.path().join("app.1000000000");
        assert_eq!(rot.current_path(), Some(expected.as_path()));
        assert!(expected.exists());
    }

    #[test]
    fn reopen_is_noop_within_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let mut rot = rotator(&name, 600);

        rot.reopen(1_000_000_000);
        let first = rot.current_path().unwrap().to_path_buf();
        // 같은 버킷은 [999999600, 1000000200) 구간입니다
        rot.reopen(1_000_000_199);
        assert_eq!(rot.current_path(), Some(first.as_path()));
        assert_eq!(rot.rotation_count(), 1);
    }

    #[test]
    fn reopen_advances_at_bucket_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let mut rot = rotator(&name, 600);

        rot.reopen(1_000_000_000);
        rot.reopen(1_000_000_200);
        assert_eq!(rot.rotation_count(), 2);
        assert_eq!(
            rot.current_path(),
            Some(dir.path().join("app.1000000200").as_path())
        );
        assert!(dir.path().join("app.999999600").exists());
    }

    #[test]
    fn zero_interval_keeps_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let mut rot = rotator(&name, 0);

        rot.reopen(1_000_000_000);
        let first = rot.current_path().unwrap().to_path_buf();
        // 아무리 시간이 흘러도 같은 파일을 유지합니다
        rot.reopen(2_000_000_000);
        assert_eq!(rot.current_path(), Some(first.as_path()));
        assert_eq!(rot.rotation_count(), 1);
    }

    #[test]
    fn calendar_format_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let config = PipelineConfigBuilder::new()
            .name(name.to_str().unwrap())
            .interval_secs(86_400)
            .format("-%Y%m%d")
            .build()
            .unwrap();
        let mut rot = Rotator::from_config(&config, DiagTarget::new()).unwrap();
        rot.reopen(1_000_000_000);

        let path = rot.current_path().unwrap();
        let file_name = path.file_name().unwrap().to_str().unwrap();
        // 로컬 타임존에 따라 날짜는 다를 수 있지만 형식은 고정입니다
        assert!(file_name.starts_with("app-200109"), "got {file_name}");
    }

    #[test]
    fn open_failure_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("subdir").join("app");
        let mut rot = rotator(&name, 60);
        // 부모 디렉토리가 없으므로 열기에 실패하지만 패닉하지 않습니다
        rot.reopen(1_000_000_000);
        assert!(!rot.is_open());

        std::fs::create_dir(dir.path().join("subdir")).unwrap();
        rot.reopen(1_000_000_001);
        assert!(rot.is_open());
    }

    #[test]
    fn write_line_appends() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let mut rot = rotator(&name, 0);
        rot.reopen(1_000_000_000);
        rot.write_line(b"first\n");
        rot.write_line(b"second\n");

        let content = std::fs::read(rot.current_path().unwrap()).unwrap();
        assert_eq!(content, b"first\nsecond\n");
    }

    #[test]
    fn write_line_without_open_file_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("missing").join("app");
        let mut rot = rotator(&name, 0);
        rot.reopen(1_000_000_000);
        rot.write_line(b"lost\n");
    }

    #[test]
    fn created_file_has_configured_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let config = PipelineConfigBuilder::new()
            .name(name.to_str().unwrap())
            .interval_secs(0)
            .mode("0600".parse().unwrap())
            .build()
            .unwrap();
        let mut rot = Rotator::from_config(&config, DiagTarget::new()).unwrap();
        rot.reopen(1_000_000_000);

        let metadata = std::fs::metadata(rot.current_path().unwrap()).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o7777, 0o600);
    }

    #[test]
    fn symlink_points_at_basename() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let config = PipelineConfigBuilder::new()
            .name(name.to_str().unwrap())
            .interval_secs(600)
            .make_symlink(true)
            .build()
            .unwrap();
        let mut rot = Rotator::from_config(&config, DiagTarget::new()).unwrap();

        rot.reopen(1_000_000_000);
        let link = std::fs::read_link(&name).unwrap();
        assert_eq!(link, PathBuf::from("app.999999600"));

        // 다음 버킷에서 링크가 새 파일로 교체됩니다
        rot.reopen(1_000_000_200);
        let link = std::fs::read_link(&name).unwrap();
        assert_eq!(link, PathBuf::from("app.1000000200"));
    }

    #[test]
    fn bad_format_is_nonfatal() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let config = PipelineConfigBuilder::new()
            .name(name.to_str().unwrap())
            .interval_secs(60)
            .format(".%Q")
            .build()
            .unwrap();
        let mut rot = Rotator::from_config(&config, DiagTarget::new()).unwrap();
        rot.reopen(1_000_000_000);
        assert!(!rot.is_open());
    }

    #[test]
    fn numeric_owner_resolves_without_lookup() {
        let spec: OwnerSpec = "12345:54321".parse().unwrap();
        let resolved = resolve_owner(&spec).unwrap();
        assert_eq!(resolved.uid, Some(12345));
        assert_eq!(resolved.gid, Some(54321));
    }

    #[test]
    fn unknown_owner_is_fatal() {
        let spec: OwnerSpec = "no-such-user-logwheel".parse().unwrap();
        assert!(resolve_owner(&spec).is_err());
    }

    #[test]
    fn diag_target_tracks_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir.path().join("app");
        let diag = DiagTarget::new();
        assert!(diag.for_write().is_none());

        let config = PipelineConfigBuilder::new()
            .name(name.to_str().unwrap())
            .interval_secs(0)
            .build()
            .unwrap();
        let mut rot = Rotator::from_config(&config, diag.clone()).unwrap();
        rot.reopen(1_000_000_000);
        assert!(diag.for_write().is_some());
    }
}
