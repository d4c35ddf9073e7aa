//! 认证会话控制器
//!
//! "当前是否有人登录、登录者是谁"的唯一来源，也是唯一允许调用后端认证服务、
//! 唯一允许写 [`SessionStore`] 的组件。
//!
//! 状态机：`Initializing -> {Authenticated, Unauthenticated}`，
//! 初始化每个控制器只执行一次，之后不会再回到 `Initializing`。
//!
//! 并发模型是单线程协作式：挂起点只有初始化读取、登录请求和注销请求。
//! 登录与注销竞争时注销优先：注销在发起时立即生效，并在发起和结束时各推进一次
//! `logout_epoch`。登录返回时只要与任何一次注销在时间上有重叠，结果就被丢弃。

use std::cell::RefCell;
use std::panic::AssertUnwindSafe;

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::lock::Mutex;
use futures::{FutureExt, StreamExt};
use quickbus_shared::Session;

use crate::backend::{CurrentSession, SessionBackend, SessionEvent};
use crate::error::AuthErrorKind;
use crate::session_store::SessionStore;
use crate::storage::KeyValueStore;

/// 等待后端回显的被丢弃会话上限
const MAX_DISCARDED: usize = 8;

/// 对外发布的会话状态
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Initializing,
    Unauthenticated,
    Authenticated(Session),
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        matches!(self, SessionState::Initializing)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

struct Inner {
    state: SessionState,
    initialized: bool,
    /// 注销发起和结束时各加一；登录返回时比对，不一致说明期间发生过注销
    logout_epoch: u64,
    /// 尚未结束的注销数量
    logouts_in_flight: u32,
    /// 每次发起登录加一；只有最后发起的登录可以落地
    login_seq: u64,
    /// 被丢弃的登录结果，后端随后推送的对应 `SignedIn` 不再生效
    discarded: Vec<Session>,
    /// 后端是否推送通知
    subscribed: bool,
}

pub struct AuthSessionController<S> {
    store: SessionStore<S>,
    backend: Box<dyn SessionBackend>,
    inner: RefCell<Inner>,
    /// 保证初始化只跑一次，并让初始化期间的登录/注销排队
    init_gate: Mutex<()>,
    events: RefCell<Option<UnboundedReceiver<SessionEvent>>>,
    watchers: RefCell<Vec<UnboundedSender<SessionState>>>,
}

impl<S: KeyValueStore> AuthSessionController<S> {
    /// 创建控制器，初始状态为 `Initializing`。
    ///
    /// 进程启动时构造一次，通过引用或 `Rc` 交给使用方。
    pub fn new(store: SessionStore<S>, backend: Box<dyn SessionBackend>) -> Self {
        Self {
            store,
            backend,
            inner: RefCell::new(Inner {
                state: SessionState::Initializing,
                initialized: false,
                logout_epoch: 0,
                logouts_in_flight: 0,
                login_seq: 0,
                discarded: Vec::new(),
                subscribed: false,
            }),
            init_gate: Mutex::new(()),
            events: RefCell::new(None),
            watchers: RefCell::new(Vec::new()),
        }
    }

    /// 当前状态快照
    pub fn state(&self) -> SessionState {
        self.inner.borrow().state.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.borrow().state.is_loading()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.inner.borrow().state.session().cloned()
    }

    /// 当前会话的 `Authorization` 头值，未登录时为 `None`
    pub fn authorization(&self) -> Option<String> {
        self.inner
            .borrow()
            .state
            .session()
            .map(|s| s.credential.authorization_value())
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// 订阅状态变化。接收端会先收到一次当前状态。
    pub fn watch(&self) -> UnboundedReceiver<SessionState> {
        let (tx, rx) = mpsc::unbounded();
        let _ = tx.unbounded_send(self.state());
        self.watchers.borrow_mut().push(tx);
        rx
    }

    fn publish(&self) {
        let state = self.state();
        self.watchers
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(state.clone()).is_ok());
    }

    /// 记录被丢弃的登录结果，只保留最近的几条
    fn remember_discarded(&self, session: &Session) {
        let mut inner = self.inner.borrow_mut();
        if !inner.subscribed {
            return;
        }
        if inner.discarded.len() >= MAX_DISCARDED {
            inner.discarded.remove(0);
        }
        inner.discarded.push(session.clone());
    }

    fn set_state(&self, state: SessionState) {
        self.inner.borrow_mut().state = state;
        self.publish();
    }

    // =========================================================
    // 初始化
    // =========================================================

    /// 执行唯一一次初始化。重复调用直接返回当前状态。
    pub async fn initialize(&self) -> SessionState {
        let _gate = self.init_gate.lock().await;
        if self.inner.borrow().initialized {
            return self.state();
        }

        // 先订阅再查询，避免漏掉订阅建立之前产生的会话
        if let Some(rx) = self.backend.subscribe() {
            *self.events.borrow_mut() = Some(rx);
            self.inner.borrow_mut().subscribed = true;
        }

        let stored = self.store.load();
        let resolved = match self.backend.current_session(stored.as_ref()).await {
            Ok(CurrentSession::Unsupported) => stored.clone(),
            Ok(CurrentSession::Active(session)) => Some(session),
            Ok(CurrentSession::Absent) => None,
            Err(e) => {
                // 暂时连不上认证服务时沿用本地记录
                tracing::warn!(error = %e, backend = self.backend.name(), "current-session check failed");
                stored.clone()
            }
        };

        // 让存储与内存一致
        match &resolved {
            Some(session) if stored.as_ref() != Some(session) => self.store.save(session),
            Some(_) => {}
            None => self.store.clear(),
        }

        let state = match resolved {
            Some(session) => {
                tracing::info!(identity = %session.identity, role = %session.role, "session restored");
                SessionState::Authenticated(session)
            }
            None => SessionState::Unauthenticated,
        };

        self.inner.borrow_mut().initialized = true;
        self.set_state(state);
        self.state()
    }

    async fn ensure_initialized(&self) {
        if !self.inner.borrow().initialized {
            self.initialize().await;
        }
    }

    // =========================================================
    // 登录 / 注销
    // =========================================================

    /// 登录。
    ///
    /// 每次调用恰好请求后端一次（空账号或空密码在本地直接拒绝）。
    /// 任何失败都只返回 `false`，不会留下部分状态。
    /// 如果请求期间发生了注销，或者之后又发起了新的登录，本次结果被丢弃。
    pub async fn login(&self, principal: &str, secret: &str) -> bool {
        self.ensure_initialized().await;

        if principal.trim().is_empty() || secret.is_empty() {
            tracing::debug!("login with empty credentials ignored");
            return false;
        }

        let (epoch, seq) = {
            let mut inner = self.inner.borrow_mut();
            inner.login_seq += 1;
            (inner.logout_epoch, inner.login_seq)
        };

        let outcome = AssertUnwindSafe(self.backend.authenticate(principal, secret))
            .catch_unwind()
            .await;

        let session = match outcome {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                match e.kind {
                    AuthErrorKind::Rejected => {
                        tracing::info!(principal = %principal, "login rejected by backend")
                    }
                    _ => tracing::warn!(error = %e, backend = self.backend.name(), "login failed"),
                }
                return false;
            }
            Err(_) => {
                tracing::error!(backend = self.backend.name(), "backend panicked during login");
                return false;
            }
        };

        let (logged_out, superseded) = {
            let inner = self.inner.borrow();
            (
                inner.logout_epoch != epoch || inner.logouts_in_flight > 0,
                inner.login_seq != seq,
            )
        };

        if logged_out || superseded {
            if logged_out {
                tracing::info!(identity = %session.identity, "discarding login that completed after logout");
            } else {
                tracing::info!(identity = %session.identity, "discarding login superseded by a newer attempt");
            }
            self.remember_discarded(&session);
            // 后端可能已经建立了会话，撤销掉
            if let Err(e) = self.backend.terminate(Some(&session)).await {
                tracing::warn!(error = %e, "failed to revoke discarded session");
            }
            return false;
        }

        self.store.save(&session);
        tracing::info!(identity = %session.identity, role = %session.role, "logged in");
        self.set_state(SessionState::Authenticated(session));
        true
    }

    /// 注销。
    ///
    /// 本地状态立即变为 `Unauthenticated` 并清空存储，然后才通知后端；
    /// 后端失败不影响结果。未登录时调用也是安全的。
    pub async fn logout(&self) {
        self.ensure_initialized().await;

        let in_flight = LogoutInFlight::begin(&self.inner);
        let previous = std::mem::replace(
            &mut self.inner.borrow_mut().state,
            SessionState::Unauthenticated,
        );
        self.store.clear();
        self.publish();

        let session = match previous {
            SessionState::Authenticated(session) => {
                tracing::info!(identity = %session.identity, "logged out");
                Some(session)
            }
            _ => None,
        };

        let outcome = AssertUnwindSafe(self.backend.terminate(session.as_ref()))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(error = %e, backend = self.backend.name(), "backend sign-out failed")
            }
            Err(_) => tracing::error!(backend = self.backend.name(), "backend panicked during sign-out"),
        }
        drop(in_flight);
    }

    // =========================================================
    // 后端通知
    // =========================================================

    /// 处理一条后端推送的会话变化
    pub fn apply_event(&self, event: SessionEvent) {
        if !self.inner.borrow().initialized {
            tracing::debug!("backend event before initialization ignored");
            return;
        }
        match event {
            SessionEvent::SignedIn(session) => {
                {
                    let mut inner = self.inner.borrow_mut();
                    if let Some(pos) = inner.discarded.iter().position(|s| *s == session) {
                        inner.discarded.remove(pos);
                        return;
                    }
                    if inner.state.session() == Some(&session) {
                        return;
                    }
                }
                self.store.save(&session);
                tracing::info!(identity = %session.identity, "session established by backend");
                self.set_state(SessionState::Authenticated(session));
            }
            SessionEvent::SignedOut(session) => {
                {
                    let mut inner = self.inner.borrow_mut();
                    // 被丢弃的会话撤销完成，不会再有它的通知
                    inner.discarded.retain(|s| *s != session);
                    if inner.state.session() != Some(&session) {
                        return;
                    }
                }
                self.store.clear();
                tracing::info!("session ended by backend");
                self.set_state(SessionState::Unauthenticated);
            }
        }
    }

    /// 按顺序处理所有已到达的后端通知，不等待。返回处理的条数。
    pub fn sync_backend_events(&self) -> usize {
        let mut pending = Vec::new();
        if let Some(rx) = self.events.borrow_mut().as_mut() {
            while let Some(Some(event)) = rx.next().now_or_never() {
                pending.push(event);
            }
        }
        let count = pending.len();
        for event in pending {
            self.apply_event(event);
        }
        count
    }

    /// 持续镜像后端通知，直到后端关闭通道。
    ///
    /// 会取走订阅的接收端，之后 [`sync_backend_events`](Self::sync_backend_events) 不再生效。
    pub async fn run_backend_events(&self) {
        self.ensure_initialized().await;
        let Some(mut rx) = self.events.borrow_mut().take() else {
            return;
        };
        while let Some(event) = rx.next().await {
            self.apply_event(event);
        }
        tracing::debug!("backend event stream closed");
    }
}

/// 标记一次进行中的注销。注销结束、失败或被取消时都会在 drop 时收尾。
struct LogoutInFlight<'a> {
    inner: &'a RefCell<Inner>,
}

impl<'a> LogoutInFlight<'a> {
    fn begin(inner: &'a RefCell<Inner>) -> Self {
        {
            let mut inner = inner.borrow_mut();
            inner.logout_epoch += 1;
            inner.logouts_in_flight += 1;
        }
        Self { inner }
    }
}

impl Drop for LogoutInFlight<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.borrow_mut();
        inner.logout_epoch += 1;
        inner.logouts_in_flight = inner.logouts_in_flight.saturating_sub(1);
    }
}
