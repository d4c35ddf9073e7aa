use crate::{Credential, Role, Session};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// HTTP Methods for API Requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

/// A trait that defines the request-response relationship and metadata for an API endpoint.
pub trait ApiRequest: Serialize {
    /// The response type returned by this request.
    type Response: DeserializeOwned;
    /// The URL path (or suffix).
    const PATH: &'static str;
    /// The HTTP method.
    const METHOD: HttpMethod;
}

// =========================================================
// Token-mode login
// =========================================================

pub const STATUS_SUCCESS: &str = "SUCCESS";

/// `POST {base}/auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl ApiRequest for LoginRequest {
    type Response = LoginEnvelope;
    const PATH: &'static str = "/auth/login";
    const METHOD: HttpMethod = HttpMethod::Post;
}

/// Response envelope shared by the token-mode REST backend.
///
/// Every field is optional so that a half-formed body still parses and can
/// be rejected by [`LoginEnvelope::into_session`] instead of failing serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginEnvelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<LoginData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_role: Option<String>,
}

/// Why an envelope could not be turned into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeRejection {
    /// The backend said no (`status != SUCCESS` or `statusCode != 200`).
    Refused(Option<String>),
    /// Success was claimed but the payload is unusable.
    Malformed(&'static str),
}

impl LoginEnvelope {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(STATUS_SUCCESS) && self.status_code == Some(200)
    }

    /// Normalize the envelope into the internal session shape.
    pub fn into_session(self) -> Result<Session, EnvelopeRejection> {
        if !self.is_success() {
            return Err(EnvelopeRejection::Refused(self.message));
        }
        let data = self.data.ok_or(EnvelopeRejection::Malformed("missing data"))?;

        let token = non_blank(data.token).ok_or(EnvelopeRejection::Malformed("missing token"))?;
        let identity =
            non_blank(data.user_name).ok_or(EnvelopeRejection::Malformed("missing userName"))?;

        Ok(Session {
            identity,
            display_name: non_blank(data.name),
            email: non_blank(data.email),
            role: Role::from_claim(data.user_role.as_deref()),
            credential: Credential::Bearer(token),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> LoginEnvelope {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_success_envelope_normalizes() {
        let env = parse(
            r#"{"status":"SUCCESS","statusCode":200,
                "data":{"token":"abc","userName":"admin","userRole":"admin"}}"#,
        );
        let session = env.into_session().unwrap();
        assert_eq!(session.identity, "admin");
        assert_eq!(session.role, Role::Admin);
        assert_eq!(session.credential, Credential::Bearer("abc".into()));
        assert!(session.display_name.is_none());
        assert!(session.email.is_none());
    }

    #[test]
    fn test_failure_envelope_is_refused() {
        let env = parse(r#"{"status":"FAILURE","statusCode":401,"message":"bad"}"#);
        assert_eq!(
            env.into_session(),
            Err(EnvelopeRejection::Refused(Some("bad".into())))
        );
    }

    #[test]
    fn test_success_status_with_wrong_code_is_refused() {
        let env = parse(r#"{"status":"SUCCESS","statusCode":500,"data":{"token":"t","userName":"a"}}"#);
        assert!(matches!(env.into_session(), Err(EnvelopeRejection::Refused(_))));
    }

    #[test]
    fn test_blank_token_is_malformed() {
        let env = parse(r#"{"status":"SUCCESS","statusCode":200,"data":{"token":"","userName":"a"}}"#);
        assert_eq!(
            env.into_session(),
            Err(EnvelopeRejection::Malformed("missing token"))
        );
    }

    #[test]
    fn test_missing_role_defaults_to_operator() {
        let env = parse(
            r#"{"status":"SUCCESS","statusCode":200,
                "data":{"token":"t","userName":"a","name":"Ann","email":"a@x"}}"#,
        );
        let session = env.into_session().unwrap();
        assert_eq!(session.role, Role::Operator);
        assert_eq!(session.display_name.as_deref(), Some("Ann"));
        assert_eq!(session.email.as_deref(), Some("a@x"));
    }
}
