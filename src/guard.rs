//! 路由守卫
//!
//! 纯函数：同样的会话状态永远得到同样的结论，没有副作用。
//! 表现层据此决定渲染、跳转登录还是等待初始化。

use crate::controller::SessionState;
use crate::route::AppRoute;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    RedirectToLogin,
    /// 初始化尚未完成：既不渲染受保护内容，也不跳转，避免刷新时闪到登录页
    AwaitInitialization,
}

/// 受保护页面的守卫判断
pub fn decide(state: &SessionState) -> RouteDecision {
    match state {
        SessionState::Initializing => RouteDecision::AwaitInitialization,
        SessionState::Authenticated(_) => RouteDecision::Render,
        SessionState::Unauthenticated => RouteDecision::RedirectToLogin,
    }
}

/// 结合页面表的导航结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Render(AppRoute),
    Redirect(AppRoute),
    Await,
}

/// 导航流程：请求 -> 守卫 -> 渲染或重定向
///
/// 受保护页面按 [`decide`] 处理；登录页对已认证用户重定向到控制面板，
/// 初始化期间同样等待，以免把正在恢复会话的用户留在登录页。
pub fn resolve(target: AppRoute, state: &SessionState) -> Navigation {
    if target.requires_auth() {
        return match decide(state) {
            RouteDecision::Render => Navigation::Render(target),
            RouteDecision::RedirectToLogin => Navigation::Redirect(AppRoute::auth_failure_redirect()),
            RouteDecision::AwaitInitialization => Navigation::Await,
        };
    }

    match state {
        SessionState::Initializing => Navigation::Await,
        SessionState::Authenticated(_) if target.should_redirect_when_authenticated() => {
            Navigation::Redirect(AppRoute::auth_success_redirect())
        }
        _ => Navigation::Render(target),
    }
}

/// 按 URL path 导航
pub fn resolve_path(path: &str, state: &SessionState) -> Navigation {
    resolve(AppRoute::from_path(path), state)
}
