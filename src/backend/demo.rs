use async_trait::async_trait;
use quickbus_shared::{Credential, Role, Session};

use super::SessionBackend;
use crate::error::{AuthError, AuthResult};

pub const DEMO_USERNAME: &str = "admin";
pub const DEMO_PASSWORD: &str = "admin123";

/// 离线演示后端，只接受一组固定账号
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoBackend;

impl DemoBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl SessionBackend for DemoBackend {
    fn name(&self) -> &'static str {
        "demo"
    }

    async fn authenticate(&self, principal: &str, secret: &str) -> AuthResult<Session> {
        if principal != DEMO_USERNAME || secret != DEMO_PASSWORD {
            return Err(AuthError::rejected(format!(
                "invalid credentials, try {}/{}",
                DEMO_USERNAME, DEMO_PASSWORD
            )));
        }

        let token = format!("mock-jwt-token-{}", uuid::Uuid::new_v4().simple());
        Ok(Session {
            identity: "1".to_string(),
            display_name: Some(DEMO_USERNAME.to_string()),
            email: Some("admin@quickbus.com".to_string()),
            role: Role::Admin,
            credential: Credential::Bearer(token),
        })
    }

    async fn terminate(&self, _session: Option<&Session>) -> AuthResult<()> {
        Ok(())
    }
}
