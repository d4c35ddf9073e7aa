//! 会话持久化
//!
//! 会话拆成两个键存放：一个只放凭据字符串，一个放 JSON 编码的用户记录。
//! 只看凭据键即可做"是否登录过"的快速检查，无需反序列化整条记录。

use quickbus_shared::{Session, UserRecord};

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::storage::KeyValueStore;

pub struct SessionStore<S> {
    store: S,
    token_key: String,
    user_key: String,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S, config: &AuthConfig) -> Self {
        Self::with_keys(store, &config.token_key, &config.user_key)
    }

    pub fn with_keys(store: S, token_key: &str, user_key: &str) -> Self {
        Self {
            store,
            token_key: token_key.to_string(),
            user_key: user_key.to_string(),
        }
    }

    /// 写入会话。
    ///
    /// 要么两个键都写成功，要么都不留下：先写用户记录，再写凭据，
    /// 凭据写失败时回滚用户记录。失败只记录日志，不向调用方抛出。
    pub fn save(&self, session: &Session) {
        if let Err(e) = self.write_both(session) {
            tracing::error!(error = %e, identity = %session.identity, "failed to persist session");
            self.clear();
        }
    }

    fn write_both(&self, session: &Session) -> AuthResult<()> {
        let (secret, record) = session.to_parts();
        let encoded = serde_json::to_string(&record)
            .map_err(|e| AuthError::internal(e.to_string()).in_op("session_store.encode"))?;

        self.store
            .set(&self.user_key, &encoded)
            .map_err(|e| e.in_op("session_store.save"))?;
        self.store
            .set(&self.token_key, &secret)
            .map_err(|e| e.in_op("session_store.save"))
    }

    /// 只检查凭据键是否存在
    pub fn has_credential(&self) -> bool {
        self.store
            .get(&self.token_key)
            .is_some_and(|t| !t.is_empty())
    }

    /// 读取会话。
    ///
    /// 两个键都不存在返回 `None`。只剩一个键、用户记录无法解析或内容不可用，
    /// 都按损坏处理：清掉两个键并返回 `None`。
    pub fn load(&self) -> Option<Session> {
        let token = self.store.get(&self.token_key);
        let user = self.store.get(&self.user_key);

        match (token, user) {
            (None, None) => None,
            (Some(token), Some(user)) => match decode(token, &user) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(error = %e, "stored session is corrupt, clearing");
                    self.clear();
                    None
                }
            },
            _ => {
                tracing::warn!("stored session is incomplete, clearing");
                self.clear();
                None
            }
        }
    }

    /// 删除两个键，幂等
    pub fn clear(&self) {
        for key in [&self.token_key, &self.user_key] {
            if let Err(e) = self.store.remove(key) {
                tracing::error!(error = %e, key = %key, "failed to remove session key");
            }
        }
    }
}

fn decode(token: String, user: &str) -> AuthResult<Session> {
    if token.is_empty() {
        return Err(AuthError::corrupt("empty credential").in_op("session_store.load"));
    }
    let record: UserRecord = serde_json::from_str(user).map_err(|e| {
        AuthError::corrupt(e.to_string())
            .with_source(e)
            .in_op("session_store.load")
    })?;
    if !record.is_well_formed() {
        return Err(AuthError::corrupt("user record has no identity").in_op("session_store.load"));
    }
    Ok(Session::from_parts(token, record))
}
