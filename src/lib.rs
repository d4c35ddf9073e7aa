//! QuickBus 管理后台的认证会话层
//!
//! - [`controller::AuthSessionController`]：会话状态的唯一来源
//! - [`session_store::SessionStore`]：会话的持久化
//! - [`guard::decide`]：受保护页面的纯函数守卫
//! - [`backend`]：三种后端接入方式，启动时按 [`config::AuthConfig`] 选择一种

pub mod api;
pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod guard;
pub mod request;
pub mod route;
pub mod session_store;
pub mod storage;

pub use api::AdminApi;
pub use backend::{SessionBackend, build_backend};
pub use config::{AuthConfig, BackendMode};
pub use controller::{AuthSessionController, SessionState};
pub use error::{AuthError, AuthErrorKind, AuthResult};
pub use guard::{Navigation, RouteDecision, decide};
pub use route::AppRoute;
pub use session_store::SessionStore;
pub use storage::{KeyValueStore, MemoryStore};

pub use quickbus_shared::{Credential, CredentialKind, Role, Session, UserRecord};
