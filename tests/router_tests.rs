use brisk::app::Context;
use brisk::config::RouteSettings;
use brisk::dispatcher::{action, route_middleware, Target};
use brisk::router::{GroupSpec, Route, Router};
use brisk::FrameworkError;
use http::Method;
use std::sync::Arc;

fn ok(_ctx: &mut Context<'_>) -> brisk::Flow {
    Ok(())
}

fn patterns(router: &Router, method: &Method, path: &str) -> Vec<String> {
    router
        .get_matched_routes(method, path, "localhost", false)
        .iter()
        .map(|r| r.pattern().to_string())
        .collect()
}

#[test]
fn test_first_match_wins_by_default() {
    let mut router = Router::default();
    router.get("/users/:id", ok).unwrap();
    router.get("/users/new", ok).unwrap();
    assert_eq!(patterns(&router, &Method::GET, "/users/new"), vec!["/users/:id"]);
}

#[test]
fn test_match_all_collects_every_candidate() {
    let mut router = Router::new(RouteSettings {
        case_sensitive: true,
        match_all: true,
    });
    router.get("/users/:id", ok).unwrap();
    router.get("/users/new", ok).unwrap();
    router.post("/users/new", ok).unwrap();
    assert_eq!(
        patterns(&router, &Method::GET, "/users/new"),
        vec!["/users/:id", "/users/new"]
    );
}

#[test]
fn test_get_registers_head_and_any_accepts_everything() {
    let mut router = Router::default();
    router.get("/page", ok).unwrap();
    router.any("/anything", ok).unwrap();
    assert_eq!(patterns(&router, &Method::HEAD, "/page").len(), 1);
    assert!(patterns(&router, &Method::POST, "/page").is_empty());
    assert_eq!(patterns(&router, &Method::DELETE, "/anything").len(), 1);
    assert_eq!(patterns(&router, &Method::PATCH, "/anything").len(), 1);
}

#[test]
fn test_matched_routes_are_cached() {
    let mut router = Router::default();
    router.get("/a/:x", ok).unwrap();
    let first = router.get_matched_routes(&Method::GET, "/a/1", "localhost", false);
    let second = router.get_matched_routes(&Method::GET, "/a/1", "localhost", false);
    assert!(Arc::ptr_eq(&first, &second));

    let reloaded = router.get_matched_routes(&Method::GET, "/a/1", "localhost", true);
    assert!(!Arc::ptr_eq(&first, &reloaded));
    assert_eq!(reloaded.len(), 1);

    let other = router.get_matched_routes(&Method::GET, "/a/2", "localhost", false);
    assert!(!Arc::ptr_eq(&reloaded, &other));
}

#[test]
fn test_cache_invalidated_by_new_routes() {
    let mut router = Router::new(RouteSettings {
        case_sensitive: true,
        match_all: true,
    });
    router.get("/a", ok).unwrap();
    let before = router.get_matched_routes(&Method::GET, "/a", "localhost", false);
    router.get("/a", ok).unwrap();
    let after = router.get_matched_routes(&Method::GET, "/a", "localhost", false);
    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 2);
}

#[test]
fn test_optional_segment() {
    let mut router = Router::default();
    router.get("/posts(/:id)", ok).unwrap();
    let route = Arc::clone(&router.routes()[0]);
    assert!(route.matches("/posts"));
    assert!(route.matches("/posts/42"));
    assert_eq!(route.captures("/posts/42").unwrap().get("id"), Some("42"));
    assert_eq!(route.captures("/posts").unwrap().get("id"), None);
}

#[test]
fn test_url_for_round_trip() {
    let mut router = Router::default();
    router
        .get("/archive/:year(/:month(/:day))", ok)
        .unwrap()
        .name("archive")
        .unwrap();

    let url = router
        .url_for("archive", &[("year", "2024"), ("month", "05")])
        .unwrap();
    assert_eq!(url, "/archive/2024/05");

    let route = router.get_named_route("archive").unwrap();
    let params = route.captures(&url).unwrap();
    assert_eq!(params.get("year"), Some("2024"));
    assert_eq!(params.get("month"), Some("05"));
    assert_eq!(params.get("day"), None);

    assert_eq!(
        router.url_for("missing", &[]),
        Err(FrameworkError::UnknownRoute("missing".into()))
    );
}

#[test]
fn test_url_for_prefers_longer_names() {
    let mut router = Router::default();
    router.get("/:id/:identity", ok).unwrap().name("ids").unwrap();
    let url = router
        .url_for("ids", &[("id", "1"), ("identity", "me")])
        .unwrap();
    assert_eq!(url, "/1/me");
}

#[test]
fn test_duplicate_route_name() {
    let mut router = Router::default();
    router.get("/a", ok).unwrap().name("home").unwrap();
    let err = router.get("/b", ok).unwrap().name("home").err().unwrap();
    assert_eq!(err, FrameworkError::DuplicateRouteName("home".into()));
    assert!(router.has_named_route("home"));
    assert_eq!(router.get_named_route("home").unwrap().pattern(), "/a");
}

#[test]
fn test_nested_groups() {
    let mut router = Router::default();
    let outer = route_middleware(|_ctx: &mut Context<'_>, _route| Ok(()));
    let inner = route_middleware(|_ctx: &mut Context<'_>, _route| Ok(()));
    router
        .group(
            GroupSpec::prefix("/api").namespace("Api"),
            vec![outer],
            |router| {
                router.group(
                    GroupSpec::prefix("/v1").domain(":tenant.example.com"),
                    vec![inner],
                    |router| {
                        let _users = router.get("/users", ok)?.middleware(|_ctx, _route| Ok(()));
                        Ok(())
                    },
                )?;
                router.get("/status", ok)?;
                Ok(())
            },
        )
        .unwrap();
    router.get("/outside", ok).unwrap();

    assert_eq!(router.group_depth(), 0);
    let users = &router.routes()[0];
    assert_eq!(users.pattern(), "/api/v1/users");
    assert_eq!(users.domain(), Some(":tenant.example.com"));
    assert_eq!(users.namespace(), Some("Api"));
    assert_eq!(users.middleware().len(), 3);

    let status = &router.routes()[1];
    assert_eq!(status.pattern(), "/api/status");
    assert_eq!(status.domain(), None);
    assert_eq!(status.namespace(), Some("Api"));
    assert_eq!(status.middleware().len(), 1);

    let outside = &router.routes()[2];
    assert_eq!(outside.namespace(), None);
    assert!(outside.middleware().is_empty());
}

#[test]
fn test_domain_constraint_and_captures() {
    let mut router = Router::default();
    router.group(GroupSpec::prefix("").domain(":tenant.example.com"), vec![], |router| {
        router.get("/dashboard", ok)?;
        Ok(())
    })
    .unwrap();

    assert!(router
        .get_matched_routes(&Method::GET, "/dashboard", "other.org", false)
        .is_empty());
    let matched = router.get_matched_routes(&Method::GET, "/dashboard", "Acme.Example.com", false);
    assert_eq!(matched.len(), 1);
    let params = matched[0]
        .match_request("/dashboard", "acme.example.com")
        .unwrap();
    assert_eq!(params.get("tenant"), Some("acme"));
}

#[test]
fn test_group_closed_on_error() {
    let mut router = Router::default();
    let result = router.group("/broken", vec![], |router| {
        router.get("/x", ok)?.conditions([("x", "(")])?;
        Ok(())
    });
    assert!(matches!(result, Err(FrameworkError::InvalidCondition { .. })));
    assert_eq!(router.group_depth(), 0);
}

#[test]
fn test_case_insensitive_router() {
    let mut router = Router::new(RouteSettings {
        case_sensitive: false,
        match_all: false,
    });
    router.get("/About", ok).unwrap();
    assert_eq!(patterns(&router, &Method::GET, "/about").len(), 1);
}

#[test]
fn test_unbalanced_patterns_rejected_at_registration() {
    let mut router = Router::default();
    for pattern in ["/a(", "/a)", "/users)", "/a((/:b)"] {
        let err = router.get(pattern, ok).err();
        assert!(
            matches!(err, Some(FrameworkError::InvalidPattern { .. })),
            "{pattern} should be rejected"
        );
    }
    assert!(router.is_empty());
}

#[test]
fn test_condition_clashing_with_pattern_rejected() {
    let mut router = Router::default();
    let result = router
        .get("/:id/:slug", ok)
        .unwrap()
        .conditions([("slug", r"(?P<p0>[a-z]+)")])
        .map(|_| ());
    assert!(matches!(result, Err(FrameworkError::InvalidPattern { .. })));

    // the route keeps its previous, working matcher
    assert_eq!(patterns(&router, &Method::GET, "/7/hello").len(), 1);
    assert!(router.routes()[0].conditions().is_empty());
}

#[test]
fn test_bad_domain_rejected() {
    let mut router = Router::default();
    let result = router.get("/", ok).unwrap().domain("(:tenant.example.com").map(|_| ());
    assert!(matches!(result, Err(FrameworkError::InvalidPattern { .. })));
    assert_eq!(router.routes()[0].domain(), None);

    let result = router.group(GroupSpec::prefix("").domain(":a).example.com"), vec![], |router| {
        router.get("/in-group", ok)?;
        Ok(())
    });
    assert!(matches!(result, Err(FrameworkError::InvalidPattern { .. })));
    assert_eq!(router.len(), 1);
}

#[test]
fn test_empty_method_set_rejected() {
    let mut router = Router::default();
    let err = router.map(&[], "/x", ok).err();
    assert_eq!(err, Some(FrameworkError::NoMethods("/x".into())));

    let bare = Route::new("/y", Target::Callable(action(ok)));
    let err = router.add_route(bare).err();
    assert_eq!(err, Some(FrameworkError::NoMethods("/y".into())));
    assert!(router.is_empty());

    router.any("/z", ok).unwrap();
    assert!(router.routes()[0].accepts_any_method());
    assert!(router.routes()[0].methods().is_empty());
    assert_eq!(patterns(&router, &Method::PATCH, "/z"), vec!["/z"]);
}

#[test]
fn test_path_conditions_leave_domain_alone() {
    let mut router = Router::default();
    router
        .get("/:id", ok)
        .unwrap()
        .domain(":id.example.com")
        .unwrap()
        .conditions([("id", r"\d+")])
        .unwrap();
    let matched = router.get_matched_routes(&Method::GET, "/42", "acme.example.com", false);
    assert_eq!(matched.len(), 1);

    router
        .get("/tenant", ok)
        .unwrap()
        .domain(":id.example.org")
        .unwrap()
        .domain_conditions([("id", "[a-z]+")])
        .unwrap();
    assert_eq!(patterns_on(&router, "/tenant", "acme.example.org"), vec!["/tenant"]);
    assert!(patterns_on(&router, "/tenant", "42.example.org").is_empty());
}

fn patterns_on(router: &Router, path: &str, host: &str) -> Vec<String> {
    router
        .get_matched_routes(&Method::GET, path, host, false)
        .iter()
        .map(|r| r.pattern().to_string())
        .collect()
}
