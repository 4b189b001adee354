//! 应用配置模块

use crate::core::task::TaskKind;
use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "seedboxsync.json";
/// 指定配置文件的环境变量
pub const CONFIG_ENV: &str = "SEEDBOXSYNC_CONF";

/// 完整配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub seedbox: SeedboxConfig,
    pub local: LocalConfig,
    pub pid: PidConfig,
    pub log: crate::logging::LogConfig,
}

/// 远程 seedbox 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedboxConfig {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    /// 目前支持 sftp / webdav / local
    pub protocol: String,
    /// WebDAV 地址，未设置时由 host/port 推导
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// 上传后 chmod（八进制字符串，false 表示禁用）
    #[serde(deserialize_with = "deserialize_chmod")]
    pub chmod: Option<String>,
    pub tmp_path: String,
    pub watch_path: String,
    pub finished_path: String,
    /// 下载时从远程路径中去掉的前缀，通常与 finished_path 相同
    pub prefixed_path: String,
    pub part_suffix: String,
    /// 排除规则（正则），空字符串表示不排除
    pub exclude_syncing: String,
}

impl Default for SeedboxConfig {
    fn default() -> Self {
        Self {
            host: "my-seedbox.ltd".to_string(),
            port: 22,
            login: "me".to_string(),
            password: "p4sw0rd".to_string(),
            protocol: "sftp".to_string(),
            endpoint: None,
            chmod: Some("0o777".to_string()),
            tmp_path: "/tmp".to_string(),
            watch_path: "/watch".to_string(),
            finished_path: "/files".to_string(),
            prefixed_path: "/files".to_string(),
            part_suffix: ".part".to_string(),
            exclude_syncing: String::new(),
        }
    }
}

/// 本地环境配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    pub watch_path: PathBuf,
    pub download_path: PathBuf,
    pub db_file: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            watch_path: PathBuf::from("~/watch"),
            download_path: PathBuf::from("~/Download/"),
            db_file: PathBuf::from("~/.config/seedboxsync/seedboxsync.db"),
        }
    }
}

/// 锁文件配置，防止同一任务重复运行
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PidConfig {
    pub blackhole_path: PathBuf,
    pub download_path: PathBuf,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            blackhole_path: PathBuf::from("~/.config/seedboxsync/lock/blackhole.pid"),
            download_path: PathBuf::from("~/.config/seedboxsync/lock/download.pid"),
        }
    }
}

impl PidConfig {
    pub fn path_for(&self, kind: TaskKind) -> &Path {
        match kind {
            TaskKind::Blackhole => &self.blackhole_path,
            TaskKind::Download => &self.download_path,
        }
    }
}

/// chmod 可以写成字符串、false 或 null
fn deserialize_chmod<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null | serde_json::Value::Bool(false) => Ok(None),
        serde_json::Value::String(s) if s.eq_ignore_ascii_case("false") || s.is_empty() => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s)),
        serde_json::Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!("invalid chmod: {}", other))),
    }
}

impl SeedboxConfig {
    /// 解析 chmod 八进制值
    pub fn chmod_mode(&self) -> Result<Option<u32>, ConfigError> {
        let Some(raw) = self.chmod.as_deref() else {
            return Ok(None);
        };
        let digits = raw
            .strip_prefix("0o")
            .or_else(|| raw.strip_prefix("0O"))
            .unwrap_or(raw);
        u32::from_str_radix(digits, 8)
            .ok()
            .filter(|mode| *mode <= 0o7777)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidChmod(raw.to_string()))
    }

    /// 编译排除规则
    pub fn exclude_regex(&self) -> Result<Option<Regex>, ConfigError> {
        if self.exclude_syncing.is_empty() {
            return Ok(None);
        }
        Regex::new(&self.exclude_syncing)
            .map(Some)
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: self.exclude_syncing.clone(),
                source,
            })
    }

    /// WebDAV 地址
    pub fn webdav_endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}:{}", self.host, self.port))
    }
}

impl AppConfig {
    /// 按搜索顺序加载配置文件
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => Self::locate()?,
        };
        Self::load_from(&path)
    }

    /// 搜索顺序: $SEEDBOXSYNC_CONF, ~/.config/seedboxsync, ~/.seedboxsync, /etc/seedboxsync
    fn locate() -> Result<PathBuf, ConfigError> {
        let mut candidates = Vec::new();
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let env_path = PathBuf::from(env_path);
            if env_path.is_dir() {
                candidates.push(env_path.join(CONFIG_FILE_NAME));
            } else {
                candidates.push(env_path);
            }
        }
        if let Some(config_dir) = crate::dirs::config_dir() {
            candidates.push(config_dir.join("seedboxsync").join(CONFIG_FILE_NAME));
        }
        if let Some(home) = crate::dirs::home_dir() {
            candidates.push(home.join(".seedboxsync").join(CONFIG_FILE_NAME));
        }
        candidates.push(PathBuf::from("/etc/seedboxsync").join(CONFIG_FILE_NAME));

        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            return Ok(found.clone());
        }
        Err(ConfigError::NotFound {
            searched: candidates,
        })
    }

    /// 从指定文件加载并校验
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AppConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Invalid {
                path: path.to_path_buf(),
                source,
            })?;
        config.expand_paths();
        config.validate()?;
        tracing::debug!("加载配置: {:?}", path);
        Ok(config)
    }

    fn expand_paths(&mut self) {
        for path in [
            &mut self.local.watch_path,
            &mut self.local.download_path,
            &mut self.local.db_file,
            &mut self.pid.blackhole_path,
            &mut self.pid.download_path,
        ] {
            *path = expand_home(path);
        }
        for path in [&mut self.log.blackhole_file, &mut self.log.download_file]
            .into_iter()
            .flatten()
        {
            *path = expand_home(path);
        }
    }

    /// 校验必填项、chmod 和正则
    pub fn validate(&self) -> Result<(), ConfigError> {
        let seedbox = &self.seedbox;
        if seedbox.protocol.is_empty() {
            return Err(ConfigError::MissingKey("seedbox.protocol"));
        }
        if seedbox.protocol != "local" {
            if seedbox.host.is_empty() {
                return Err(ConfigError::MissingKey("seedbox.host"));
            }
            if seedbox.login.is_empty() {
                return Err(ConfigError::MissingKey("seedbox.login"));
            }
        }
        let required = [
            (seedbox.tmp_path.is_empty(), "seedbox.tmp_path"),
            (seedbox.watch_path.is_empty(), "seedbox.watch_path"),
            (seedbox.finished_path.is_empty(), "seedbox.finished_path"),
            (self.local.watch_path.as_os_str().is_empty(), "local.watch_path"),
            (self.local.download_path.as_os_str().is_empty(), "local.download_path"),
            (self.local.db_file.as_os_str().is_empty(), "local.db_file"),
            (self.pid.blackhole_path.as_os_str().is_empty(), "pid.blackhole_path"),
            (self.pid.download_path.as_os_str().is_empty(), "pid.download_path"),
        ];
        if let Some((_, key)) = required.iter().find(|(missing, _)| *missing) {
            return Err(ConfigError::MissingKey(*key));
        }
        seedbox.chmod_mode()?;
        seedbox.exclude_regex()?;
        Ok(())
    }
}

/// 展开路径开头的 ~
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => crate::dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chmod_parsing() {
        let mut seedbox = SeedboxConfig::default();
        assert_eq!(seedbox.chmod_mode().unwrap(), Some(0o777));

        seedbox.chmod = Some("0644".to_string());
        assert_eq!(seedbox.chmod_mode().unwrap(), Some(0o644));

        seedbox.chmod = Some("755".to_string());
        assert_eq!(seedbox.chmod_mode().unwrap(), Some(0o755));

        seedbox.chmod = None;
        assert_eq!(seedbox.chmod_mode().unwrap(), None);

        seedbox.chmod = Some("0o999".to_string());
        assert!(seedbox.chmod_mode().is_err());
    }

    #[test]
    fn test_chmod_false_disables() {
        let config: AppConfig = serde_json::from_str(r#"{"seedbox": {"chmod": false}}"#).unwrap();
        assert_eq!(config.seedbox.chmod, None);

        let config: AppConfig = serde_json::from_str(r#"{"seedbox": {"chmod": "false"}}"#).unwrap();
        assert_eq!(config.seedbox.chmod, None);
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config: AppConfig =
            serde_json::from_str(r#"{"seedbox": {"host": "box.example"}}"#).unwrap();
        assert_eq!(config.seedbox.host, "box.example");
        assert_eq!(config.seedbox.port, 22);
        assert_eq!(config.seedbox.part_suffix, ".part");
        assert_eq!(config.seedbox.finished_path, "/files");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_regex_is_configuration_error() {
        let mut config = AppConfig::default();
        config.seedbox.exclude_syncing = "(unclosed".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_missing_host_rejected_for_remote_protocol() {
        let mut config = AppConfig::default();
        config.seedbox.host.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingKey("seedbox.host"))
        ));

        config.seedbox.protocol = "local".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load_from(&dir.path().join("nope.json"));
        assert!(matches!(result, Err(ConfigError::Unreadable { .. })));
    }

    #[test]
    fn test_serialized_config_loads_with_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = AppConfig::default();
        config.local.watch_path = dir.path().join("watch");
        fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.local.watch_path, dir.path().join("watch"));
        assert!(!loaded.local.db_file.starts_with("~"));
    }
}
