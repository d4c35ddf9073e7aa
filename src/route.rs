//! 路由定义模块 - 领域模型
//!
//! 纯业务逻辑，不依赖 DOM。定义后台的所有页面及其属性。

use std::fmt::Display;

/// 后台页面
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AppRoute {
    /// 登录页
    #[default]
    Login,
    Dashboard,
    /// 线路管理
    Routes,
    /// 车辆管理
    Buses,
    /// 票务监控
    Tickets,
    Reports,
    NotFound,
}

impl AppRoute {
    /// 侧边栏导航顺序
    pub const NAVIGATION: [AppRoute; 5] = [
        AppRoute::Dashboard,
        AppRoute::Routes,
        AppRoute::Buses,
        AppRoute::Tickets,
        AppRoute::Reports,
    ];

    /// 将 URL path 解析为路由，`/` 指向控制面板
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" | "/dashboard" => Self::Dashboard,
            "/login" => Self::Login,
            "/routes" => Self::Routes,
            "/buses" => Self::Buses,
            "/tickets" => Self::Tickets,
            "/reports" => Self::Reports,
            _ => Self::NotFound,
        }
    }

    pub fn to_path(&self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Dashboard => "/dashboard",
            Self::Routes => "/routes",
            Self::Buses => "/buses",
            Self::Tickets => "/tickets",
            Self::Reports => "/reports",
            Self::NotFound => "/404",
        }
    }

    /// 页头标题
    pub fn title(&self) -> &'static str {
        match self {
            Self::Login => "Sign In",
            Self::Dashboard => "Dashboard",
            Self::Routes => "Route Management",
            Self::Buses => "Bus Management",
            Self::Tickets => "Ticket Monitor",
            Self::Reports => "Reports",
            Self::NotFound => "QuickBus Admin",
        }
    }

    /// 除登录页外全部需要认证。未知路径同样挂在受保护的布局下。
    pub fn requires_auth(&self) -> bool {
        !matches!(self, Self::Login)
    }

    /// 已认证用户访问时应当离开的页面
    pub fn should_redirect_when_authenticated(&self) -> bool {
        matches!(self, Self::Login)
    }

    pub fn auth_failure_redirect() -> Self {
        Self::Login
    }

    pub fn auth_success_redirect() -> Self {
        Self::Dashboard
    }
}

impl Display for AppRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_path())
    }
}
