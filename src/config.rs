//! 运行时配置
//!
//! 通过 [`EnvAdapter`] 读取变量，读不到就使用默认值。
//! 启动时构造一次，之后据此选择后端实现。

use std::collections::HashMap;
use std::path::PathBuf;

use quickbus_shared::{STORAGE_TOKEN_KEY, STORAGE_USER_KEY};

use crate::error::{AuthError, AuthResult};

pub const VAR_AUTH_MODE: &str = "QUICKBUS_AUTH_MODE";
pub const VAR_API_BASE: &str = "QUICKBUS_API_BASE";
pub const VAR_MANAGED_URL: &str = "QUICKBUS_MANAGED_URL";
pub const VAR_MANAGED_ANON_KEY: &str = "QUICKBUS_MANAGED_ANON_KEY";
pub const VAR_TOKEN_KEY: &str = "QUICKBUS_TOKEN_KEY";
pub const VAR_USER_KEY: &str = "QUICKBUS_USER_KEY";
pub const VAR_STORE_PATH: &str = "QUICKBUS_STORE_PATH";

/// 命令行工具保存会话的默认文件
pub const DEFAULT_STORE_PATH: &str = ".quickbus-session.json";

// =========================================================
// 抽象环境变量接口
// =========================================================

pub trait EnvAdapter {
    fn var(&self, name: &str) -> Option<String>;
}

/// 进程环境变量
pub struct ProcessEnv;

impl EnvAdapter for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// 基于 HashMap 的环境（测试与嵌入场景）
#[derive(Debug, Default, Clone)]
pub struct MapEnv(pub HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }
}

impl EnvAdapter for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

// =========================================================
// 配置结构
// =========================================================

/// 后端集成模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// `POST {base}/auth/login`，Bearer token
    #[default]
    Credential,
    /// 外部认证服务托管会话
    Managed,
    /// 离线演示后端
    Demo,
}

impl BackendMode {
    pub fn parse(raw: &str) -> AuthResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "credential" | "token" => Ok(BackendMode::Credential),
            "managed" | "supabase" => Ok(BackendMode::Managed),
            "demo" | "mock" => Ok(BackendMode::Demo),
            other => Err(AuthError::config_missing(format!(
                "unknown auth mode '{}'",
                other
            ))
            .in_op_with("config.parse", VAR_AUTH_MODE)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub mode: BackendMode,
    /// REST 后端基地址，已去掉末尾的 `/`
    pub api_base: Option<String>,
    pub managed_url: Option<String>,
    pub managed_anon_key: Option<String>,
    pub token_key: String,
    pub user_key: String,
    /// 仅命令行工具使用；浏览器端存储在 LocalStorage
    pub store_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::default(),
            api_base: None,
            managed_url: None,
            managed_anon_key: None,
            token_key: STORAGE_TOKEN_KEY.to_string(),
            user_key: STORAGE_USER_KEY.to_string(),
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl AuthConfig {
    /// 从环境读取配置。只有模式名写错会返回错误。
    pub fn from_env<E: EnvAdapter>(env: &E) -> AuthResult<Self> {
        let mode = match non_empty(env.var(VAR_AUTH_MODE)) {
            Some(raw) => BackendMode::parse(&raw)?,
            None => BackendMode::default(),
        };

        Ok(Self {
            mode,
            api_base: non_empty(env.var(VAR_API_BASE)).map(trim_base),
            managed_url: non_empty(env.var(VAR_MANAGED_URL)).map(trim_base),
            managed_anon_key: non_empty(env.var(VAR_MANAGED_ANON_KEY)),
            token_key: non_empty(env.var(VAR_TOKEN_KEY))
                .unwrap_or_else(|| STORAGE_TOKEN_KEY.to_string()),
            user_key: non_empty(env.var(VAR_USER_KEY))
                .unwrap_or_else(|| STORAGE_USER_KEY.to_string()),
            store_path: non_empty(env.var(VAR_STORE_PATH))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
        })
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = Some(trim_base(base.to_string()));
        self
    }

    pub fn with_mode(mut self, mode: BackendMode) -> Self {
        self.mode = mode;
        self
    }

    /// 协作方（CRUD 页面）需要的基地址，缺失时是用户可见错误
    pub fn require_api_base(&self) -> AuthResult<&str> {
        self.api_base.as_deref().ok_or_else(|| {
            AuthError::config_missing("backend base address is not configured")
                .in_op_with("config.require", VAR_API_BASE)
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn trim_base(base: String) -> String {
    base.trim().trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorKind;

    #[test]
    fn test_defaults_when_env_is_empty() {
        let config = AuthConfig::from_env(&MapEnv::new()).unwrap();
        assert_eq!(config, AuthConfig::default());
        assert_eq!(config.token_key, "quickbus_token");
        assert_eq!(config.user_key, "quickbus_user");
        assert_eq!(config.mode, BackendMode::Credential);
    }

    #[test]
    fn test_reads_all_vars() {
        let env = MapEnv::new()
            .with(VAR_AUTH_MODE, "Managed")
            .with(VAR_API_BASE, "https://api.quickbus.test/")
            .with(VAR_MANAGED_URL, "https://project.supabase.test")
            .with(VAR_MANAGED_ANON_KEY, "anon")
            .with(VAR_TOKEN_KEY, "tk")
            .with(VAR_USER_KEY, "uk")
            .with(VAR_STORE_PATH, "/tmp/qb.json");
        let config = AuthConfig::from_env(&env).unwrap();
        assert_eq!(config.mode, BackendMode::Managed);
        assert_eq!(config.api_base.as_deref(), Some("https://api.quickbus.test"));
        assert_eq!(config.managed_anon_key.as_deref(), Some("anon"));
        assert_eq!(config.token_key, "tk");
        assert_eq!(config.user_key, "uk");
        assert_eq!(config.store_path, PathBuf::from("/tmp/qb.json"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let env = MapEnv::new().with(VAR_TOKEN_KEY, "  ").with(VAR_API_BASE, "");
        let config = AuthConfig::from_env(&env).unwrap();
        assert_eq!(config.token_key, STORAGE_TOKEN_KEY);
        assert!(config.api_base.is_none());
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let env = MapEnv::new().with(VAR_AUTH_MODE, "ldap");
        let err = AuthConfig::from_env(&env).unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::ConfigurationMissing);
    }

    #[test]
    fn test_require_api_base() {
        let err = AuthConfig::default().require_api_base().unwrap_err();
        assert!(err.kind.is_user_visible());

        let config = AuthConfig::default().with_api_base("http://localhost:8080/");
        assert_eq!(config.require_api_base().unwrap(), "http://localhost:8080");
    }
}
