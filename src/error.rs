use std::fmt;

use serde::{Deserialize, Serialize};

// =========================================================
// 错误类别
// =========================================================

/// 认证核心的错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthErrorKind {
    /// 后端明确拒绝（凭据错误等）
    Rejected,
    /// 网络不可达、后端无响应或未配置后端地址
    Transport,
    /// 后端声称成功但响应结构不可用
    MalformedResponse,
    /// 持久化数据损坏
    CorruptState,
    /// 协作方必需的配置缺失（如后端基地址）
    ConfigurationMissing,
    /// 本地存储读写失败
    Storage,
    /// 内部故障（如后端实现 panic）
    Internal,
}

impl AuthErrorKind {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthErrorKind::Rejected => "AUTH_REJECTED",
            AuthErrorKind::Transport => "TRANSPORT_FAILURE",
            AuthErrorKind::MalformedResponse => "MALFORMED_RESPONSE",
            AuthErrorKind::CorruptState => "CORRUPT_PERSISTED_STATE",
            AuthErrorKind::ConfigurationMissing => "CONFIGURATION_MISSING",
            AuthErrorKind::Storage => "STORAGE_ERROR",
            AuthErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// 是否应当直接展示给用户
    pub fn is_user_visible(&self) -> bool {
        matches!(self, AuthErrorKind::ConfigurationMissing)
    }
}

// =========================================================
// 错误上下文追踪
// =========================================================

/// 结构化的错误追踪片段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSpan {
    /// 操作名称，如 "backend.authenticate", "session_store.save"
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl fmt::Display for ErrorSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        if let Some(detail) = &self.detail {
            write!(f, "({})", detail)?;
        }
        Ok(())
    }
}

// =========================================================
// 核心错误类型
// =========================================================

#[derive(Debug, thiserror::Error)]
#[error("[{}] {}{}", .kind.error_code(), .message, render_spans(.spans))]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    spans: Vec<ErrorSpan>,
}

fn render_spans(spans: &[ErrorSpan]) -> String {
    if spans.is_empty() {
        return String::new();
    }
    let trace: Vec<String> = spans.iter().map(ToString::to_string).collect();
    format!(" | trace: {}", trace.join(" -> "))
}

impl AuthError {
    pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            spans: Vec::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Rejected, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Transport, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::MalformedResponse, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::CorruptState, message)
    }

    pub fn config_missing(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::ConfigurationMissing, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Storage, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(AuthErrorKind::Internal, message)
    }

    /// 添加操作追踪
    pub fn in_op(mut self, operation: impl Into<String>) -> Self {
        self.spans.push(ErrorSpan {
            operation: operation.into(),
            detail: None,
        });
        self
    }

    /// 添加操作追踪（带细节）
    pub fn in_op_with(mut self, operation: impl Into<String>, detail: impl Into<String>) -> Self {
        self.spans.push(ErrorSpan {
            operation: operation.into(),
            detail: Some(detail.into()),
        });
        self
    }

    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn error_code(&self) -> &'static str {
        self.kind.error_code()
    }

    pub fn spans(&self) -> &[ErrorSpan] {
        &self.spans
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

// =========================================================
// 类型转换
// =========================================================

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::malformed(e.to_string()).with_source(e)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::transport(e.to_string()).with_source(e)
    }
}
