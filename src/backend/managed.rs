//! 托管会话模式
//!
//! 外部认证服务（GoTrue / Supabase Auth 的 REST 接口）签发并吊销自己的会话，
//! 这里把它的会话对象归一化为内部的 [`Session`]，并把变化以
//! [`SessionEvent`] 推送给订阅者。
//!
//! 角色只取 `app_metadata.role`：这是服务端写入的声明，
//! `user_metadata` 可以被用户自己修改，不能作为授权依据。

use std::cell::RefCell;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use quickbus_shared::protocol::HttpMethod;
use quickbus_shared::{Credential, CredentialKind, Role, Session};
use serde::{Deserialize, Serialize};

use super::{CurrentSession, SessionBackend, SessionEvent};
use crate::error::{AuthError, AuthResult};
use crate::request::{HttpClient, HttpRequest, HttpResponse};

const PATH_TOKEN: &str = "/auth/v1/token?grant_type=password";
const PATH_USER: &str = "/auth/v1/user";
const PATH_LOGOUT: &str = "/auth/v1/logout";
const HEADER_API_KEY: &str = "apikey";

// =========================================================
// 协议结构
// =========================================================

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<RemoteUser>,
}

#[derive(Deserialize)]
struct RemoteUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Metadata,
    #[serde(default)]
    app_metadata: Metadata,
}

#[derive(Deserialize, Default)]
struct Metadata {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Deserialize, Default)]
struct RemoteError {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl RemoteUser {
    fn into_session(self, access_token: String) -> AuthResult<Session> {
        if self.id.trim().is_empty() {
            return Err(AuthError::malformed("user without id").in_op("managed.normalize"));
        }
        let display_name = self.user_metadata.name.or(self.user_metadata.full_name);
        Ok(Session {
            identity: self.id,
            display_name,
            email: self.email,
            role: Role::from_claim(self.app_metadata.role.as_deref()),
            credential: Credential::Handle(access_token),
        })
    }
}

// =========================================================
// 后端实现
// =========================================================

pub struct ManagedBackend<C> {
    client: C,
    url: Option<String>,
    anon_key: Option<String>,
    /// 本端建立且尚未撤销的会话，最后一个是当前会话
    active: RefCell<Vec<Session>>,
    listeners: RefCell<Vec<UnboundedSender<SessionEvent>>>,
}

impl<C: HttpClient> ManagedBackend<C> {
    pub fn new(client: C, url: Option<String>, anon_key: Option<String>) -> Self {
        Self {
            client,
            url: url.map(|u| u.trim_end_matches('/').to_string()),
            anon_key,
            active: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
        }
    }

    fn request(&self, path: &str, method: HttpMethod) -> AuthResult<HttpRequest> {
        let base = self.url.as_deref().ok_or_else(|| {
            AuthError::transport("managed auth service address is not configured")
                .in_op("managed.request")
        })?;
        let mut req = HttpRequest::new(&format!("{}{}", base, path), method);
        if let Some(key) = &self.anon_key {
            req = req.with_header(HEADER_API_KEY, key);
        }
        Ok(req)
    }

    fn emit(&self, event: SessionEvent) {
        self.listeners
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    /// 用已有的访问令牌向服务确认用户
    async fn fetch_user(&self, access_token: &str) -> AuthResult<Option<Session>> {
        let req = self
            .request(PATH_USER, HttpMethod::Get)?
            .with_bearer(access_token);
        let resp = self
            .client
            .send(req)
            .await
            .map_err(|e| e.in_op("managed.fetch_user"))?;

        match resp.status {
            200 => {
                let user: RemoteUser = resp.json().map_err(|e| e.in_op("managed.fetch_user"))?;
                user.into_session(access_token.to_string()).map(Some)
            }
            401 | 403 => Ok(None),
            status => Err(AuthError::transport(format!("auth service answered HTTP {}", status))
                .in_op("managed.fetch_user")),
        }
    }
}

fn remote_error(resp: &HttpResponse) -> AuthError {
    let detail: RemoteError = resp.json().unwrap_or_default();
    let message = detail
        .error_description
        .or(detail.msg)
        .unwrap_or_else(|| format!("auth service answered HTTP {}", resp.status));
    match resp.status {
        400 | 401 | 403 | 422 => AuthError::rejected(message),
        _ => AuthError::transport(message),
    }
}

#[async_trait(?Send)]
impl<C: HttpClient> SessionBackend for ManagedBackend<C> {
    fn name(&self) -> &'static str {
        "managed"
    }

    async fn authenticate(&self, principal: &str, secret: &str) -> AuthResult<Session> {
        let grant = PasswordGrant {
            email: principal,
            password: secret,
        };
        let req = self.request(PATH_TOKEN, HttpMethod::Post)?.with_json(&grant)?;
        let resp = self
            .client
            .send(req)
            .await
            .map_err(|e| e.in_op("managed.authenticate"))?;

        if !resp.is_success() {
            return Err(remote_error(&resp).in_op("managed.authenticate"));
        }

        let token: TokenResponse = resp.json().map_err(|e| e.in_op("managed.authenticate"))?;
        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::malformed("missing access_token").in_op("managed.authenticate"))?;
        let user = token
            .user
            .ok_or_else(|| AuthError::malformed("missing user").in_op("managed.authenticate"))?;
        let session = user.into_session(access_token)?;

        self.active.borrow_mut().push(session.clone());
        self.emit(SessionEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn terminate(&self, session: Option<&Session>) -> AuthResult<()> {
        let target = match session {
            Some(session) => Some(session.clone()),
            None => self.active.borrow().last().cloned(),
        };
        let Some(target) = target else {
            return Ok(());
        };
        let token = target.credential.secret().to_string();

        // 本地先清掉，远端失败也不影响；只撤销指定的那个会话
        self.active.borrow_mut().retain(|s| *s != target);
        self.emit(SessionEvent::SignedOut(target));

        let req = self.request(PATH_LOGOUT, HttpMethod::Post)?.with_bearer(&token);
        let resp = self
            .client
            .send(req)
            .await
            .map_err(|e| e.in_op("managed.terminate"))?;
        // 令牌已失效时服务返回 401，结果一样
        if resp.is_success() || resp.status == 401 {
            Ok(())
        } else {
            Err(remote_error(&resp).in_op("managed.terminate"))
        }
    }

    async fn current_session(&self, stored: Option<&Session>) -> AuthResult<CurrentSession> {
        let current = self.active.borrow().last().cloned();
        if let Some(session) = current {
            return Ok(CurrentSession::Active(session));
        }

        let handle = stored
            .filter(|s| s.credential.kind() == CredentialKind::Handle)
            .map(|s| s.credential.secret().to_string());
        let Some(handle) = handle else {
            return Ok(CurrentSession::Absent);
        };

        match self.fetch_user(&handle).await? {
            Some(session) => {
                self.active.borrow_mut().push(session.clone());
                Ok(CurrentSession::Active(session))
            }
            None => Ok(CurrentSession::Absent),
        }
    }

    fn subscribe(&self) -> Option<UnboundedReceiver<SessionEvent>> {
        let (tx, rx) = mpsc::unbounded();
        self.listeners.borrow_mut().push(tx);
        Some(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorKind;
    use crate::request::MockHttpClient;
    use futures::{FutureExt, StreamExt};
    use serde_json::json;

    const URL: &str = "https://project.supabase.test";

    fn backend(client: MockHttpClient) -> ManagedBackend<MockHttpClient> {
        ManagedBackend::new(client, Some(URL.to_string()), Some("anon-key".to_string()))
    }

    fn token_url() -> String {
        format!("{}{}", URL, PATH_TOKEN)
    }

    fn user_json(role: Option<&str>) -> serde_json::Value {
        json!({
            "id": "5f1c",
            "email": "ops@quickbus.com",
            "user_metadata": { "full_name": "Ops Lead", "role": "admin" },
            "app_metadata": { "role": role },
        })
    }

    fn stored_handle(token: &str) -> Session {
        Session {
            identity: "5f1c".into(),
            display_name: None,
            email: None,
            role: Role::Operator,
            credential: Credential::Handle(token.into()),
        }
    }

    #[tokio::test]
    async fn test_sign_in_normalizes_and_notifies() {
        let client = MockHttpClient::new();
        client.mock_response(
            &token_url(),
            200,
            json!({ "access_token": "at-1", "user": user_json(Some("staff")) }),
        );
        let backend = backend(client);
        let mut events = backend.subscribe().unwrap();

        let session = backend.authenticate("ops@quickbus.com", "pw").await.unwrap();
        assert_eq!(session.identity, "5f1c");
        assert_eq!(session.display_name.as_deref(), Some("Ops Lead"));
        assert_eq!(session.role, Role::Staff);
        assert_eq!(session.credential, Credential::Handle("at-1".into()));

        assert_eq!(
            events.next().now_or_never(),
            Some(Some(SessionEvent::SignedIn(session.clone())))
        );

        let reqs = backend.client.requests.borrow();
        assert_eq!(reqs[0].2.get("apikey").unwrap(), "anon-key");
    }

    #[tokio::test]
    async fn test_role_ignores_user_editable_metadata() {
        let client = MockHttpClient::new();
        client.mock_response(
            &token_url(),
            200,
            json!({ "access_token": "at-1", "user": user_json(None) }),
        );
        let session = backend(client).authenticate("ops@quickbus.com", "pw").await.unwrap();
        assert_eq!(session.role, Role::Operator);
    }

    #[tokio::test]
    async fn test_bad_password_is_rejected() {
        let client = MockHttpClient::new();
        client.mock_response(
            &token_url(),
            400,
            json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" }),
        );
        let err = backend(client).authenticate("ops@quickbus.com", "nope").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::Rejected);
        assert!(err.message.contains("Invalid login credentials"));
    }

    #[tokio::test]
    async fn test_missing_user_is_malformed() {
        let client = MockHttpClient::new();
        client.mock_response(&token_url(), 200, json!({ "access_token": "at-1" }));
        let err = backend(client).authenticate("a@b", "pw").await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_current_session_validates_stored_handle() {
        let client = MockHttpClient::new();
        client.mock_response(&format!("{}{}", URL, PATH_USER), 200, user_json(Some("admin")));
        let backend = backend(client);

        let result = backend
            .current_session(Some(&stored_handle("at-9")))
            .await
            .unwrap();
        let CurrentSession::Active(session) = result else {
            panic!("expected active session");
        };
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.credential, Credential::Handle("at-9".into()));

        let reqs = backend.client.requests.borrow();
        assert_eq!(reqs[0].2.get("Authorization").unwrap(), "Bearer at-9");
    }

    #[tokio::test]
    async fn test_current_session_expired_handle_is_absent() {
        let client = MockHttpClient::new();
        client.mock_response(&format!("{}{}", URL, PATH_USER), 401, json!({ "msg": "expired" }));
        let result = backend(client)
            .current_session(Some(&stored_handle("old")))
            .await
            .unwrap();
        assert_eq!(result, CurrentSession::Absent);
    }

    #[tokio::test]
    async fn test_current_session_without_handle_skips_network() {
        let backend = backend(MockHttpClient::new());
        assert_eq!(backend.current_session(None).await.unwrap(), CurrentSession::Absent);
        assert_eq!(backend.client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_terminate_clears_and_notifies_even_when_unreachable() {
        let client = MockHttpClient::new();
        client.mock_response(
            &token_url(),
            200,
            json!({ "access_token": "at-1", "user": user_json(Some("admin")) }),
        );
        client.mock_unreachable(&format!("{}{}", URL, PATH_LOGOUT));
        let backend = backend(client);
        let mut events = backend.subscribe().unwrap();
        let session = backend.authenticate("a@b", "pw").await.unwrap();
        let _ = events.next().now_or_never();

        let err = backend.terminate(None).await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::Transport);
        assert_eq!(
            events.next().now_or_never(),
            Some(Some(SessionEvent::SignedOut(session)))
        );
        assert_eq!(backend.current_session(None).await.unwrap(), CurrentSession::Absent);
    }

    #[tokio::test]
    async fn test_revoking_older_session_keeps_newer_one() {
        let client = MockHttpClient::new();
        client.mock_response(
            &token_url(),
            200,
            json!({ "access_token": "at-new", "user": user_json(Some("staff")) }),
        );
        client.mock_response(&format!("{}{}", URL, PATH_LOGOUT), 204, json!(null));
        let backend = backend(client);
        let newer = backend.authenticate("a@b", "pw").await.unwrap();

        // 旧的登录后返回
        backend.client.mock_response(
            &token_url(),
            200,
            json!({ "access_token": "at-old", "user": user_json(Some("staff")) }),
        );
        let older = backend.authenticate("a@b", "pw").await.unwrap();

        backend.terminate(Some(&older)).await.unwrap();
        assert_eq!(
            backend.current_session(None).await.unwrap(),
            CurrentSession::Active(newer)
        );
        let reqs = backend.client.requests.borrow();
        assert_eq!(reqs[2].2.get("Authorization").unwrap(), "Bearer at-old");
    }

    #[tokio::test]
    async fn test_terminate_without_session_is_noop() {
        let backend = backend(MockHttpClient::new());
        backend.terminate(None).await.unwrap();
        assert_eq!(backend.client.request_count(), 0);
    }
}
