use std::rc::Rc;

use quickbus_shared::protocol::ApiRequest;
use serde_json::Value;

use crate::config::AuthConfig;
use crate::controller::AuthSessionController;
use crate::error::{AuthError, AuthResult};
use crate::request::{HttpClient, HttpMethod, HttpRequest};
use crate::storage::KeyValueStore;
use quickbus_shared::HEADER_AUTHORIZATION;

/// 后台业务接口的授权客户端
///
/// 每次调用都从控制器取当前会话的凭据，未登录时不发请求。
pub struct AdminApi<C, S> {
    client: C,
    base_url: String,
    controller: Rc<AuthSessionController<S>>,
}

impl<C: HttpClient, S: KeyValueStore> AdminApi<C, S> {
    /// 没有配置后端地址时返回 `ConfigurationMissing`
    pub fn new(
        config: &AuthConfig,
        client: C,
        controller: Rc<AuthSessionController<S>>,
    ) -> AuthResult<Self> {
        let base_url = config.require_api_base()?.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            base_url,
            controller,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// 调用一个业务接口。
    ///
    /// 401 报告为 `Rejected`，由界面决定是否调用 `logout()`；其他非 2xx 为 `Transport`。
    pub async fn call<R: ApiRequest>(&self, request: &R) -> AuthResult<R::Response> {
        let authorization = self.controller.authorization().ok_or_else(|| {
            AuthError::rejected("not signed in").in_op_with("admin_api.call", R::PATH)
        })?;

        let url = self.url(R::PATH);
        let mut req = HttpRequest::new(&url, R::METHOD)
            .with_header(HEADER_AUTHORIZATION, &authorization)
            .with_header("Accept", "application/json");
        if R::METHOD != HttpMethod::Get {
            req = req.with_json(request)?;
        }

        let resp = self
            .client
            .send(req)
            .await
            .map_err(|e| e.in_op_with("admin_api.call", R::PATH))?;

        match resp.status {
            401 => {
                tracing::info!(path = R::PATH, "admin call rejected, session no longer valid");
                Err(AuthError::rejected("session rejected by backend")
                    .in_op_with("admin_api.call", R::PATH))
            }
            status if !resp.is_success() => Err(AuthError::transport(format!(
                "backend answered HTTP {}",
                status
            ))
            .in_op_with("admin_api.call", R::PATH)),
            _ if resp.body.trim().is_empty() => serde_json::from_value(Value::Null)
                .map_err(|e| AuthError::from(e).in_op_with("admin_api.decode", R::PATH)),
            _ => resp
                .json()
                .map_err(|e| e.in_op_with("admin_api.decode", R::PATH)),
        }
    }
}
