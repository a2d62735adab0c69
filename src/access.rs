//! Role-based page filtering.
//!
//! A user may open a page when their role set intersects the page's
//! `access_privilege_role` set, or when they hold the `admin` role. A user
//! without any role set sees nothing (fail closed).

use serde::Serialize;

use crate::config::AppPage;

pub const ADMIN_ROLE: &str = "admin";

/// Whether a user with `roles` may open `page`.
pub fn can_access(roles: Option<&[String]>, page: &AppPage) -> bool {
    let Some(roles) = roles else {
        return false;
    };
    if roles.iter().any(|r| r == ADMIN_ROLE) {
        return true;
    }
    roles
        .iter()
        .any(|r| page.access_privilege_role.iter().any(|allowed| allowed == r))
}

/// Every page the user may open, in configuration order.
pub fn accessible_pages<'a>(roles: Option<&[String]>, pages: &'a [AppPage]) -> Vec<&'a AppPage> {
    pages.iter().filter(|p| can_access(roles, p)).collect()
}

/// A navigation entry, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct NavEntry {
    pub title: String,
    pub slug: String,
    pub icon: String,
    pub description: String,
}

/// Navigation for a user: the home entry followed by their accessible apps.
pub fn navigation(roles: Option<&[String]>, pages: &[AppPage]) -> Vec<NavEntry> {
    let mut nav = vec![NavEntry {
        title: "Apps".to_string(),
        slug: "home".to_string(),
        icon: ":material/home:".to_string(),
        description: "Applications available to you".to_string(),
    }];
    nav.extend(accessible_pages(roles, pages).into_iter().map(|p| NavEntry {
        title: p.name.clone(),
        slug: p.page.clone(),
        icon: p.icon.clone(),
        description: p.description.clone(),
    }));
    nav
}
