//! 后端会话服务抽象
//!
//! 三种集成方式实现同一个 [`SessionBackend`] 接口，启动时按配置选择一次，
//! 控制器只依赖这个 trait，不按模式分支。

use async_trait::async_trait;
use futures::channel::mpsc::UnboundedReceiver;
use quickbus_shared::Session;

use crate::config::{AuthConfig, BackendMode};
use crate::error::AuthResult;
use crate::request::HttpClient;

mod credential;
mod demo;
mod managed;

pub use credential::CredentialBackend;
pub use demo::{DEMO_PASSWORD, DEMO_USERNAME, DemoBackend};
pub use managed::ManagedBackend;

/// 后端推送的会话变化通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Session),
    /// 携带被结束的会话，订阅方据此判断是否与自己持有的会话相关
    SignedOut(Session),
}

/// 启动时对后端自身会话信号的查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurrentSession {
    /// 后端没有自己的会话信号，以本地存储为准
    Unsupported,
    /// 后端确认存在有效会话
    Active(Session),
    /// 后端确认没有会话
    Absent,
}

#[async_trait(?Send)]
pub trait SessionBackend {
    /// 用于日志
    fn name(&self) -> &'static str;

    /// 用账号和密码换取会话。
    ///
    /// 凭据错误返回 `Rejected`，网络问题返回 `Transport`，
    /// 声称成功但结构不可用返回 `MalformedResponse`。
    async fn authenticate(&self, principal: &str, secret: &str) -> AuthResult<Session>;

    /// 通知后端结束会话。`session` 为控制器当时持有的会话（可能没有）。
    async fn terminate(&self, session: Option<&Session>) -> AuthResult<()>;

    /// 启动时查询后端自身的当前会话
    async fn current_session(&self, _stored: Option<&Session>) -> AuthResult<CurrentSession> {
        Ok(CurrentSession::Unsupported)
    }

    /// 订阅会话变化通知。不推送通知的后端返回 `None`。
    fn subscribe(&self) -> Option<UnboundedReceiver<SessionEvent>> {
        None
    }
}

/// 按配置构造后端
pub fn build_backend<C>(config: &AuthConfig, client: C) -> Box<dyn SessionBackend>
where
    C: HttpClient + 'static,
{
    match config.mode {
        BackendMode::Credential => Box::new(CredentialBackend::new(client, config.api_base.clone())),
        BackendMode::Managed => Box::new(ManagedBackend::new(
            client,
            config.managed_url.clone(),
            config.managed_anon_key.clone(),
        )),
        BackendMode::Demo => Box::new(DemoBackend::new()),
    }
}
