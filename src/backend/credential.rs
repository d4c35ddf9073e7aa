use async_trait::async_trait;
use quickbus_shared::Session;
use quickbus_shared::protocol::{ApiRequest, EnvelopeRejection, LoginEnvelope, LoginRequest};

use super::SessionBackend;
use crate::error::{AuthError, AuthResult};
use crate::request::{HttpClient, HttpRequest};

/// 凭据/令牌模式：`POST {base}/auth/login`，成功后拿到 Bearer token。
///
/// 该模式没有服务端注销接口，也没有"当前会话"查询，
/// 启动时完全以本地存储为准。
pub struct CredentialBackend<C> {
    client: C,
    base_url: Option<String>,
}

impl<C: HttpClient> CredentialBackend<C> {
    pub fn new(client: C, base_url: Option<String>) -> Self {
        let base_url = base_url.map(|b| b.trim_end_matches('/').to_string());
        Self { client, base_url }
    }

    fn login_url(&self) -> AuthResult<String> {
        // 未配置地址按传输失败处理
        let base = self.base_url.as_deref().ok_or_else(|| {
            AuthError::transport("backend base address is not configured")
                .in_op("credential.login_url")
        })?;
        Ok(format!("{}{}", base, LoginRequest::PATH))
    }
}

#[async_trait(?Send)]
impl<C: HttpClient> SessionBackend for CredentialBackend<C> {
    fn name(&self) -> &'static str {
        "credential"
    }

    async fn authenticate(&self, principal: &str, secret: &str) -> AuthResult<Session> {
        let url = self.login_url()?;
        let body = LoginRequest {
            username: principal.to_string(),
            password: secret.to_string(),
        };
        let req = HttpRequest::new(&url, LoginRequest::METHOD).with_json(&body)?;

        let resp = self
            .client
            .send(req)
            .await
            .map_err(|e| e.in_op("credential.authenticate"))?;

        let envelope: LoginEnvelope = match resp.json() {
            Ok(envelope) => envelope,
            Err(e) if resp.is_success() => return Err(e.in_op("credential.authenticate")),
            Err(_) => return Err(status_error(resp.status)),
        };

        // 信封声称成功但 HTTP 状态不对，不信任
        if envelope.is_success() && !resp.is_success() {
            return Err(AuthError::malformed(format!(
                "success envelope with HTTP status {}",
                resp.status
            ))
            .in_op("credential.authenticate"));
        }

        envelope.into_session().map_err(|rejection| match rejection {
            EnvelopeRejection::Refused(message) => AuthError::rejected(
                message.unwrap_or_else(|| "credentials rejected".to_string()),
            ),
            EnvelopeRejection::Malformed(what) => {
                AuthError::malformed(what).in_op("credential.authenticate")
            }
        })
    }

    async fn terminate(&self, _session: Option<&Session>) -> AuthResult<()> {
        tracing::debug!("credential backend has no remote sign-out");
        Ok(())
    }
}

/// 无法解析出信封时按 HTTP 状态归类
fn status_error(status: u16) -> AuthError {
    let err = match status {
        401 | 403 => AuthError::rejected(format!("backend refused login ({})", status)),
        _ => AuthError::transport(format!("backend answered HTTP {}", status)),
    };
    err.in_op("credential.authenticate")
}
