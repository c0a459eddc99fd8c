use std::collections::BTreeMap;

use super::core::strip_unfilled;
use super::route::CompiledPattern;
use super::{Route, Router};
use crate::app::Context;
use crate::dispatcher::{action, Target};
use crate::error::FrameworkError;
use http::Method;

fn compile(pattern: &str) -> CompiledPattern {
    CompiledPattern::compile(pattern, true, "[^/]+", &BTreeMap::new()).unwrap()
}

fn noop() -> Target {
    Target::Callable(action(|_ctx: &mut Context<'_>| Ok(())))
}

#[test]
fn test_root_path() {
    let re = compile("/");
    assert!(re.is_match("/"));
    assert!(!re.is_match("/x"));
}

#[test]
fn test_named_segment() {
    let re = compile("/items/:id");
    let params = re.captures("/items/123").unwrap();
    assert_eq!(params.get("id"), Some("123"));
    assert!(!re.is_match("/items/123/extra"));
    assert!(!re.is_match("/items/"));
}

#[test]
fn test_optional_segment() {
    let re = compile("/posts(/:id)");
    assert!(re.is_match("/posts"));
    assert_eq!(re.captures("/posts/9").unwrap().get("id"), Some("9"));
    assert!(re.captures("/posts").unwrap().get("id").is_none());
}

#[test]
fn test_nested_optional_segments() {
    let re = compile("/archive(/:year(/:month))");
    assert!(re.is_match("/archive"));
    assert!(re.is_match("/archive/2024"));
    let params = re.captures("/archive/2024/05").unwrap();
    assert_eq!(params.get("year"), Some("2024"));
    assert_eq!(params.get("month"), Some("05"));
}

#[test]
fn test_greedy_segment() {
    let re = compile("/files/:path+");
    let params = re.captures("/files/a/b/c.txt").unwrap();
    assert_eq!(params.get("path"), Some("a/b/c.txt"));
    assert_eq!(params.segments("path"), vec!["a", "b", "c.txt"]);
}

#[test]
fn test_literal_metacharacters_are_escaped() {
    let re = compile("/report.json");
    assert!(re.is_match("/report.json"));
    assert!(!re.is_match("/reportxjson"));
    let re = compile("/a+b/:id");
    assert!(re.is_match("/a+b/1"));
    assert!(!re.is_match("/aab/1"));
}

#[test]
fn test_trailing_slash_optional() {
    let re = compile("/users/");
    assert!(re.is_match("/users"));
    assert!(re.is_match("/users/"));
}

#[test]
fn test_case_insensitive_flag() {
    let re = CompiledPattern::compile("/Users/:id", false, "[^/]+", &BTreeMap::new()).unwrap();
    assert!(re.is_match("/users/1"));
    assert!(!compile("/Users/:id").is_match("/users/1"));
}

#[test]
fn test_captures_are_url_decoded() {
    let re = compile("/tags/:tag");
    assert_eq!(re.captures("/tags/rust%20lang").unwrap().get("tag"), Some("rust lang"));
}

#[test]
fn test_unbalanced_patterns_are_rejected() {
    assert!(CompiledPattern::compile("/a(/:b", true, "[^/]+", &BTreeMap::new()).is_err());
    assert!(CompiledPattern::compile("/a)/b", true, "[^/]+", &BTreeMap::new()).is_err());
}

#[test]
fn test_conditions_constrain_segments() {
    let mut route = Route::new("/posts/:id", noop());
    route.via(&[Method::GET]);
    route.set_conditions([("id", r"\d+")]).unwrap();
    assert!(route.matches("/posts/42"));
    assert!(!route.matches("/posts/latest"));
    assert!(route.set_conditions([("id", "(")]).is_err());
}

#[test]
fn test_condition_with_own_groups_keeps_param_order() {
    let mut route = Route::new("/:kind/:id", noop());
    route.set_conditions([("kind", "(post|page)s")]).unwrap();
    let params = route.captures("/posts/3").unwrap();
    assert_eq!(params.get("kind"), Some("posts"));
    assert_eq!(params.get("id"), Some("3"));
}

#[test]
fn test_domain_captures_merge_with_path() {
    let mut route = Route::new("/dashboard/:tab", noop());
    route.set_domain(Some(":account.example.com".to_string()));
    assert!(route.supports_domain("acme.example.com"));
    assert!(!route.supports_domain("example.org"));
    let params = route.match_request("/dashboard/billing", "ACME.example.com").unwrap();
    assert_eq!(params.get("account"), Some("ACME"));
    assert_eq!(params.get("tab"), Some("billing"));
}

#[test]
fn test_method_support() {
    let mut route = Route::new("/", noop());
    route.via_names(&["get", "Post"]);
    assert!(route.supports_http_method(&Method::GET));
    assert!(route.supports_method_name("post"));
    assert!(!route.supports_http_method(&Method::DELETE));
    route.via_names(&["any"]);
    assert!(route.supports_http_method(&Method::DELETE));
    assert!(route.method_names().contains(&"ANY".to_string()));
}

#[test]
fn test_set_pattern_recompiles() {
    let mut route = Route::new("/old", noop());
    assert!(route.matches("/old"));
    route.set_pattern("/new");
    assert!(!route.matches("/old"));
    assert!(route.matches("/new"));
}

#[test]
fn test_strip_unfilled_remnants() {
    assert_eq!(strip_unfilled("/posts(/:id)"), "/posts");
    assert_eq!(strip_unfilled("/archive(/2024(/:month))"), "/archive/2024");
    assert_eq!(strip_unfilled("/archive(/2024(/05))"), "/archive/2024/05");
    assert_eq!(strip_unfilled("/plain"), "/plain");
}

#[test]
fn test_route_table_lists_routes() {
    let mut router = Router::default();
    router
        .get("/posts/:id", |_ctx: &mut Context<'_>| Ok(()))
        .unwrap()
        .name("post")
        .unwrap();
    let table = router.route_table();
    assert_eq!(table.len(), 1);
    assert!(table[0].contains("GET|HEAD"));
    assert!(table[0].contains("/posts/:id"));
    assert!(table[0].contains("[post]"));
}

#[test]
fn test_compile_reports_bad_patterns() {
    assert!(Route::new("/posts(/:id)", noop()).compile().is_ok());
    assert!(matches!(
        Route::new("/a)", noop()).compile(),
        Err(FrameworkError::InvalidPattern { .. })
    ));

    let mut route = Route::new("/h", noop());
    route.set_domain(Some("(:sub.example.com".to_string()));
    assert!(route.compile().is_err());
}

#[test]
fn test_domain_conditions_are_separate() {
    let mut route = Route::new("/:id", noop());
    route.set_domain(Some(":id.example.com".to_string()));
    route.set_conditions([("id", r"\d+")]).unwrap();
    assert!(route.supports_domain("acme.example.com"));

    route.set_domain_conditions([("id", r"\d+")]).unwrap();
    assert!(!route.supports_domain("acme.example.com"));
    assert!(route.supports_domain("7.example.com"));
}
