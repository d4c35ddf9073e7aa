use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::rc::Rc;

use quickbus_shared::HEADER_AUTHORIZATION;
pub use quickbus_shared::protocol::HttpMethod;

use crate::error::{AuthError, AuthResult};

#[cfg(test)]
use std::cell::RefCell;

// =========================================================
// 核心抽象层 (HTTP Interface Abstraction)
// =========================================================

/// 通用 HTTP 请求结构
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(url: &str, method: HttpMethod) -> Self {
        Self {
            url: url.to_string(),
            method,
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header(HEADER_AUTHORIZATION, &format!("Bearer {}", token))
    }

    /// 序列化为 JSON 作为请求体，同时设置 Content-Type
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> AuthResult<Self> {
        let encoded = serde_json::to_string(body)
            .map_err(|e| AuthError::internal(e.to_string()).in_op("http.encode_body"))?;
        self.body = Some(encoded);
        Ok(self.with_header("Content-Type", "application/json"))
    }
}

/// 通用 HTTP 响应结构
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> AuthResult<T> {
        serde_json::from_str(&self.body).map_err(|e| AuthError::from(e).in_op("http.decode_body"))
    }
}

/// HTTP 客户端特性
///
/// 浏览器端的 future 不是 Send 的，因此统一使用 `?Send`。
#[async_trait::async_trait(?Send)]
pub trait HttpClient {
    async fn send(&self, req: HttpRequest) -> AuthResult<HttpResponse>;
}

/// 共享句柄，多个组件可以共用同一个客户端
#[async_trait::async_trait(?Send)]
impl<T: HttpClient + ?Sized> HttpClient for Rc<T> {
    async fn send(&self, req: HttpRequest) -> AuthResult<HttpResponse> {
        (**self).send(req).await
    }
}

// =========================================================
// 实现层: reqwest 客户端
// =========================================================

#[derive(Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait(?Send)]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, req: HttpRequest) -> AuthResult<HttpResponse> {
        let method = match req.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self.client.request(method, &req.url);

        for (k, v) in req.headers {
            builder = builder.header(k, v);
        }

        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| AuthError::from(e).in_op_with("http.send", req.url.clone()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::from(e).in_op_with("http.read_body", req.url))?;

        Ok(HttpResponse { status, body })
    }
}

// =========================================================
// 测试工具: MockHttpClient
// =========================================================

#[cfg(test)]
pub struct MockHttpClient {
    // URL -> (Status, Response Body)
    responses: RefCell<HashMap<String, (u16, String)>>,
    // 这些 URL 模拟网络不可达
    unreachable: RefCell<Vec<String>>,
    // 记录发出的请求 (URL, Method, Headers, Body)
    pub requests: RefCell<Vec<(String, HttpMethod, HashMap<String, String>, Option<String>)>>,
}

#[cfg(test)]
impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            responses: RefCell::new(HashMap::new()),
            unreachable: RefCell::new(Vec::new()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn mock_response(&self, url: &str, status: u16, body: serde_json::Value) {
        self.responses
            .borrow_mut()
            .insert(url.to_string(), (status, body.to_string()));
    }

    pub fn mock_raw(&self, url: &str, status: u16, body: &str) {
        self.responses
            .borrow_mut()
            .insert(url.to_string(), (status, body.to_string()));
    }

    pub fn mock_unreachable(&self, url: &str) {
        self.unreachable.borrow_mut().push(url.to_string());
    }

    pub fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

#[cfg(test)]
#[async_trait::async_trait(?Send)]
impl HttpClient for MockHttpClient {
    async fn send(&self, req: HttpRequest) -> AuthResult<HttpResponse> {
        self.requests.borrow_mut().push((
            req.url.clone(),
            req.method,
            req.headers.clone(),
            req.body.clone(),
        ));

        if self.unreachable.borrow().contains(&req.url) {
            return Err(AuthError::transport("connection refused").in_op_with("http.send", req.url));
        }

        let responses = self.responses.borrow();
        if let Some((status, body)) = responses.get(&req.url) {
            Ok(HttpResponse {
                status: *status,
                body: body.clone(),
            })
        } else {
            Ok(HttpResponse {
                status: 404,
                body: "Not Found".to_string(),
            })
        }
    }
}
