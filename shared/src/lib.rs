use serde::{Deserialize, Serialize};
use std::fmt;

pub mod protocol;

// =========================================================
// 常量定义 (Constants)
// =========================================================

/// 持久化凭据 (token) 的存储键
pub const STORAGE_TOKEN_KEY: &str = "quickbus_token";
/// 持久化用户记录 (JSON) 的存储键
pub const STORAGE_USER_KEY: &str = "quickbus_user";
pub const HEADER_AUTHORIZATION: &str = "Authorization";

// =========================================================
// 领域模型 (Domain Models)
// =========================================================

/// 角色，封闭集合
///
/// 后端未给出或给出集合外的值时，一律落到权限最低的 `Operator`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    Admin,
    Staff,
    Operator,
}

impl Role {
    /// 权限最低的角色
    pub const LEAST_PRIVILEGED: Role = Role::Operator;

    /// 宽松解析：大小写与首尾空白不敏感，未知值回落到最低权限
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "staff" => Role::Staff,
            "operator" => Role::Operator,
            _ => Self::LEAST_PRIVILEGED,
        }
    }

    /// 同上，但接受缺失值
    pub fn from_claim(raw: Option<&str>) -> Self {
        raw.map(Self::parse_lenient)
            .unwrap_or(Self::LEAST_PRIVILEGED)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Operator => "operator",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::LEAST_PRIVILEGED
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        Role::parse_lenient(&raw)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 凭据的表现形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Bearer token（凭据/令牌模式）
    #[default]
    Bearer,
    /// 外部认证服务签发的会话句柄（托管会话模式）
    Handle,
}

/// 不透明凭据：二者只有一个处于激活状态，取决于后端集成模式
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Bearer(String),
    Handle(String),
}

impl Credential {
    pub fn new(kind: CredentialKind, secret: String) -> Self {
        match kind {
            CredentialKind::Bearer => Credential::Bearer(secret),
            CredentialKind::Handle => Credential::Handle(secret),
        }
    }

    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::Bearer(_) => CredentialKind::Bearer,
            Credential::Handle(_) => CredentialKind::Handle,
        }
    }

    /// 原始凭据字符串
    pub fn secret(&self) -> &str {
        match self {
            Credential::Bearer(s) | Credential::Handle(s) => s,
        }
    }

    /// `Authorization` 头的值。两种形式都以 Bearer 方式携带。
    pub fn authorization_value(&self) -> String {
        format!("Bearer {}", self.secret())
    }
}

// 避免凭据通过 Debug 输出进日志
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Bearer(_) => f.write_str("Bearer(***)"),
            Credential::Handle(_) => f.write_str("Handle(***)"),
        }
    }
}

/// 当前已认证身份的规范化记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// 后端签发的主体标识
    pub identity: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub credential: Credential,
}

impl Session {
    /// 拆成持久化的两部分：凭据字符串 + 用户记录
    pub fn to_parts(&self) -> (String, UserRecord) {
        let record = UserRecord {
            id: self.identity.clone(),
            name: self.display_name.clone(),
            email: self.email.clone(),
            role: self.role,
            credential_kind: self.credential.kind(),
        };
        (self.credential.secret().to_string(), record)
    }

    pub fn from_parts(secret: String, record: UserRecord) -> Self {
        Self {
            identity: record.id,
            display_name: record.name,
            email: record.email,
            role: record.role,
            credential: Credential::new(record.credential_kind, secret),
        }
    }

    /// 用于界面显示的名称，缺省时使用 identity
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.identity)
    }
}

/// Session 去掉凭据后的部分，以 JSON 形式落盘
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub credential_kind: CredentialKind,
}

impl UserRecord {
    /// 结构可解析但内容不可用（空 identity）同样视为损坏
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty()
    }
}
