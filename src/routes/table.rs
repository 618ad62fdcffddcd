//! Lookup Router: one canonical, ordered table of path patterns.
//!
//! Paths are matched without their leading `/`. The first matching pattern wins; a path no
//! pattern accepts is `NotFound`. Patterns keep their historical regex form so existing
//! links keep resolving.

use crate::error::{AppError, ConfigError};
use regex::Regex;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteName {
    Index,
    Books,
    BookDetail,
    Authors,
    AuthorDetail,
    MyBorrowed,
    RenewBookLibrarian,
    AuthorCreate,
    AuthorUpdate,
    AuthorDelete,
}

impl RouteName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteName::Index => "index",
            RouteName::Books => "books",
            RouteName::BookDetail => "book-detail",
            RouteName::Authors => "authors",
            RouteName::AuthorDetail => "author-detail",
            RouteName::MyBorrowed => "my-borrowed",
            RouteName::RenewBookLibrarian => "renew-book-librarian",
            RouteName::AuthorCreate => "author_create",
            RouteName::AuthorUpdate => "author_update",
            RouteName::AuthorDelete => "author_delete",
        }
    }
}

impl fmt::Display for RouteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table order is match order.
const PATTERNS: &[(RouteName, &str)] = &[
    (RouteName::Index, r"^$"),
    (RouteName::Books, r"^books/$"),
    (RouteName::BookDetail, r"^book/(?P<pk>\d+)$"),
    (RouteName::Authors, r"^authors/$"),
    (RouteName::AuthorDetail, r"^author/(?P<pk>\d+)$"),
    (RouteName::MyBorrowed, r"^mybooks/$"),
    (RouteName::RenewBookLibrarian, r"^book/(?P<pk>[-\w]+)/renew/$"),
    (RouteName::AuthorCreate, r"^author/create/$"),
    (RouteName::AuthorUpdate, r"^author/(?P<pk>\d+)/update/$"),
    (RouteName::AuthorDelete, r"^author/(?P<pk>\d+)/delete/$"),
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatch {
    pub name: RouteName,
    /// The `pk` path parameter, when the pattern binds one.
    pub pk: Option<String>,
}

struct Route {
    name: RouteName,
    regex: Regex,
}

pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Result<Self, ConfigError> {
        let routes = PATTERNS
            .iter()
            .map(|(name, pattern)| {
                Regex::new(pattern)
                    .map(|regex| Route { name: *name, regex })
                    .map_err(|source| ConfigError::RoutePattern {
                        name: name.as_str(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RouteTable { routes })
    }

    /// Match a request path. Percent-escapes are decoded first; a path that does not decode
    /// to UTF-8 matches nothing.
    pub fn resolve(&self, path: &str) -> Result<RouteMatch, AppError> {
        let decoded = urlencoding::decode(path).map_err(|_| AppError::NotFound(format!("no route for {}", path)))?;
        let rel = decoded.strip_prefix('/').unwrap_or(&*decoded);
        self.routes
            .iter()
            .find_map(|route| {
                route.regex.captures(rel).map(|caps| RouteMatch {
                    name: route.name,
                    pk: caps.name("pk").map(|m| m.as_str().to_string()),
                })
            })
            .ok_or_else(|| AppError::NotFound(format!("no route for /{}", rel)))
    }

    pub fn names(&self) -> impl Iterator<Item = RouteName> + '_ {
        self.routes.iter().map(|r| r.name)
    }

    pub fn pattern(&self, name: RouteName) -> Option<&str> {
        self.routes.iter().find(|r| r.name == name).map(|r| r.regex.as_str())
    }
}

/// Build the path for a named route. `pk` is required by routes that bind one.
pub fn reverse(name: RouteName, pk: Option<&str>) -> String {
    let pk = pk.unwrap_or_default();
    match name {
        RouteName::Index => "/".to_string(),
        RouteName::Books => "/books/".to_string(),
        RouteName::BookDetail => format!("/book/{}", pk),
        RouteName::Authors => "/authors/".to_string(),
        RouteName::AuthorDetail => format!("/author/{}", pk),
        RouteName::MyBorrowed => "/mybooks/".to_string(),
        RouteName::RenewBookLibrarian => format!("/book/{}/renew/", pk),
        RouteName::AuthorCreate => "/author/create/".to_string(),
        RouteName::AuthorUpdate => format!("/author/{}/update/", pk),
        RouteName::AuthorDelete => format!("/author/{}/delete/", pk),
    }
}
