mod common;

use brisk::app::hooks::{AFTER, AFTER_DISPATCH, AFTER_ROUTER, BEFORE, BEFORE_DISPATCH, BEFORE_ROUTER};
use brisk::app::{Context, EtagKind};
use brisk::router::GroupSpec;
use brisk::server::Environment;
use brisk::{Flow, FrameworkError};
use common::{console, test_app, test_config};
use http::Method;
use serde_json::json;
use std::sync::{Arc, Mutex};

type Trail = Arc<Mutex<Vec<String>>>;

fn record(trail: &Trail, entry: &str) {
    trail.lock().unwrap().push(entry.to_string());
}

fn entries(trail: &Trail) -> Vec<String> {
    trail.lock().unwrap().clone()
}

#[test]
fn test_hooks_run_in_lifecycle_order() {
    let mut app = test_app();
    let trail: Trail = Arc::default();
    for name in [BEFORE, BEFORE_ROUTER, BEFORE_DISPATCH, AFTER_DISPATCH, AFTER_ROUTER, AFTER] {
        let t = Arc::clone(&trail);
        app.hook(name, move |_ctx| {
            record(&t, name);
            Ok(())
        });
    }
    let t = Arc::clone(&trail);
    app.get("/", move |_ctx: &mut Context<'_>| {
        record(&t, "action");
        Ok(())
    })
    .unwrap();

    let response = app.run(console("GET", "/"));
    assert_eq!(response.status, 200);
    assert_eq!(
        entries(&trail),
        vec![
            "before",
            "before.router",
            "before.dispatch",
            "action",
            "after.dispatch",
            "after.router",
            "after"
        ]
    );
}

#[test]
fn test_hook_priorities() {
    let mut app = test_app();
    let trail: Trail = Arc::default();
    for (priority, label) in [(20, "late"), (1, "early"), (10, "default")] {
        let t = Arc::clone(&trail);
        app.hook_with_priority(BEFORE, priority, move |_ctx| {
            record(&t, label);
            Ok(())
        });
    }
    let _ = app.run(console("GET", "/"));
    assert_eq!(entries(&trail), vec!["early", "default", "late"]);
}

#[test]
fn test_pass_moves_to_next_route() {
    let mut app = test_app();
    app.router_mut().set_match_all(true);
    let trail: Trail = Arc::default();

    let t = Arc::clone(&trail);
    app.hook(AFTER_DISPATCH, move |ctx| {
        let pattern = ctx.current_route().map(|r| r.pattern().to_string()).unwrap_or_default();
        record(&t, &format!("after {pattern}"));
        Ok(())
    });
    let t = Arc::clone(&trail);
    app.get("/items/:id", move |ctx: &mut Context<'_>| -> Flow {
        record(&t, "first");
        ctx.response_mut().write("partial ");
        ctx.pass()
    })
    .unwrap();
    let t = Arc::clone(&trail);
    app.get("/items/:id", move |ctx: &mut Context<'_>| {
        record(&t, "second");
        let id = ctx.param("id").unwrap_or_default().to_string();
        ctx.response_mut().write(&format!("item {id}"));
        Ok(())
    })
    .unwrap();

    let response = app.run(console("GET", "/items/9"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "partial item 9");
    assert_eq!(entries(&trail), vec!["first", "second", "after /items/:id"]);
}

#[test]
fn test_declining_action_tries_next_route() {
    let mut app = test_app();
    app.router_mut().set_match_all(true);
    app.get("/x", |_ctx: &mut Context<'_>| Ok(false)).unwrap();
    app.get("/x", |ctx: &mut Context<'_>| {
        ctx.response_mut().write("second");
        Ok(true)
    })
    .unwrap();
    assert_eq!(app.run(console("GET", "/x")).body, "second");
}

#[test]
fn test_everything_passes_gives_404() {
    let mut app = test_app();
    app.get("/x", |ctx: &mut Context<'_>| -> Flow { ctx.pass() }).unwrap();
    let response = app.run(console("GET", "/x"));
    assert_eq!(response.status, 404);
    assert!(response.body.contains("404 Page Not Found"));
}

#[test]
fn test_default_not_found() {
    let app = test_app();
    let response = app.run(console("GET", "/nowhere"));
    assert_eq!(response.status, 404);
    assert_eq!(response.header("Content-Type"), Some("text/html"));
}

#[test]
fn test_custom_not_found() {
    let mut app = test_app();
    app.not_found(|ctx| {
        ctx.response_mut().write("custom missing");
        Ok(())
    });
    let response = app.run(console("GET", "/nowhere"));
    assert_eq!(response.status, 404);
    assert_eq!(response.body, "custom missing");
}

#[test]
fn test_stop_keeps_response_and_skips_after_router() {
    let mut app = test_app();
    let trail: Trail = Arc::default();
    let t = Arc::clone(&trail);
    app.hook(AFTER_ROUTER, move |_ctx| {
        record(&t, "after.router");
        Ok(())
    });
    let t = Arc::clone(&trail);
    app.hook(AFTER, move |_ctx| {
        record(&t, "after");
        Ok(())
    });
    app.get("/teapot", |ctx: &mut Context<'_>| -> Flow { ctx.halt(418, "short and stout") }).unwrap();

    let response = app.run(console("GET", "/teapot"));
    assert_eq!(response.status, 418);
    assert_eq!(response.body, "short and stout");
    assert_eq!(entries(&trail), vec!["after"]);
}

#[test]
fn test_stop_in_before_hook_skips_routing() {
    let mut app = test_app();
    app.hook(BEFORE, |ctx| ctx.halt(503, "maintenance"));
    app.get("/", |ctx: &mut Context<'_>| {
        ctx.response_mut().write("never");
        Ok(())
    })
    .unwrap();
    let response = app.run(console("GET", "/"));
    assert_eq!(response.status, 503);
    assert_eq!(response.body, "maintenance");
}

#[test]
fn test_fault_renders_generic_page() {
    let mut app = test_app();
    app.get("/boom", |ctx: &mut Context<'_>| -> Flow {
        ctx.error(anyhow::anyhow!("database unreachable"))
    })
    .unwrap();
    let response = app.run(console("GET", "/boom"));
    assert_eq!(response.status, 500);
    assert!(response.body.contains("Application Error"));
    assert!(!response.body.contains("database unreachable"));
}

#[test]
fn test_fault_renders_debug_page() {
    let mut config = test_config();
    config.debug = true;
    let mut app = brisk::Application::new(config);
    app.get("/boom", |_ctx: &mut Context<'_>| -> Flow {
        Err(anyhow::anyhow!("database <unreachable>").into())
    })
    .unwrap();
    let response = app.run(console("GET", "/boom"));
    assert_eq!(response.status, 500);
    assert!(response.body.contains("database &lt;unreachable&gt;"));
}

#[test]
fn test_panic_becomes_500() {
    let mut config = test_config();
    config.debug = true;
    let mut app = brisk::Application::new(config);
    app.get("/panic", |_ctx: &mut Context<'_>| -> Flow { panic!("kaboom") }).unwrap();
    let response = app.run(console("GET", "/panic"));
    assert_eq!(response.status, 500);
    assert!(response.body.contains("kaboom"));
    assert!(response.body.contains("dispatcher_tests.rs"));

    // the application keeps serving afterwards
    app.get("/ok", |_ctx: &mut Context<'_>| Ok(())).unwrap();
    assert_eq!(app.run(console("GET", "/ok")).status, 200);
}

#[test]
fn test_custom_error_handler() {
    let mut app = test_app();
    app.error(|_ctx, report| format!("sorry: {}", report.kind));
    app.get("/boom", |_ctx: &mut Context<'_>| -> Flow {
        Err(anyhow::anyhow!("nope").into())
    })
    .unwrap();
    let response = app.run(console("GET", "/boom"));
    assert_eq!(response.status, 500);
    assert_eq!(response.body, "sorry: Error");
}

#[test]
fn test_stray_pass_is_a_fault() {
    let mut app = test_app();
    app.hook(BEFORE_ROUTER, |ctx| ctx.pass());
    let response = app.run(console("GET", "/"));
    assert_eq!(response.status, 500);
}

#[test]
fn test_head_request_has_empty_body() {
    let mut app = test_app();
    app.get("/page", |ctx: &mut Context<'_>| {
        ctx.response_mut().write("content");
        Ok(())
    })
    .unwrap();
    let response = app.run(console("HEAD", "/page"));
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

#[test]
fn test_controller_actions_resolve_through_namespace() {
    let mut app = test_app();
    app.register_action("Admin\\Users@index", |ctx: &mut Context<'_>| {
        let template = ctx.default_template().unwrap_or_default();
        ctx.response_mut().write(&template);
        Ok(())
    })
    .unwrap();
    app.group(GroupSpec::prefix("/admin").namespace("Admin"), vec![], |router| {
        router.get_to("/users", "Users@index")?.name("admin.users")?;
        router.get_to("/missing", "Users@missing")?.name("admin.missing")?;
        Ok(())
    })
    .unwrap();

    let response = app.run(console("GET", "/admin/users"));
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "users.index");

    assert_eq!(app.run(console("GET", "/admin/missing")).status, 500);
}

#[test]
fn test_invalid_action_reference() {
    let mut app = test_app();
    let err = app.map_to(&[Method::GET], "/x", "NoAction").err().unwrap();
    assert_eq!(err, FrameworkError::InvalidActionReference("NoAction".into()));
}

#[test]
fn test_redirect_to_named_route_under_mount_point() {
    let mut app = test_app();
    app.get("/users/:id", |_ctx: &mut Context<'_>| Ok(()))
        .unwrap()
        .name("user")
        .unwrap();
    app.post("/users", |ctx: &mut Context<'_>| -> Flow {
        ctx.redirect_to("user", &[("id", "12")], 303)
    })
    .unwrap();

    let env = Environment::mock("POST", "/users")
        .with_script_name("/app")
        .with_interface(brisk::server::Interface::Console);
    let response = app.run(env);
    assert_eq!(response.status, 303);
    assert_eq!(response.header("Location"), Some("/app/users/12"));
}

#[test]
fn test_etag_short_circuits_with_304() {
    let mut app = test_app();
    app.get("/doc", |ctx: &mut Context<'_>| -> Flow {
        ctx.etag("v1", EtagKind::Strong)?;
        ctx.response_mut().write("document");
        Ok(())
    })
    .unwrap();

    let fresh = app.run(console("GET", "/doc"));
    assert_eq!(fresh.status, 200);
    assert_eq!(fresh.header("ETag"), Some("\"v1\""));

    let cached = app.run(console("GET", "/doc").with_header("If-None-Match", "\"v1\""));
    assert_eq!(cached.status, 304);
    assert!(cached.body.is_empty());
    assert!(cached.header("Content-Type").is_none());
}

#[test]
fn test_configure_mode() {
    let mut config = test_config();
    config.mode = "development".into();
    let mut app = brisk::Application::new(config);
    app.configure_mode("production", |app| {
        app.get("/prod", |_ctx: &mut Context<'_>| Ok(())).unwrap();
    });
    app.configure_mode("development", |app| {
        app.get("/dev", |_ctx: &mut Context<'_>| Ok(())).unwrap();
    });
    assert_eq!(app.router().len(), 1);
    assert_eq!(app.router().routes()[0].pattern(), "/dev");
}

#[test]
fn test_render_merges_shared_view_data() {
    let views = brisk::view::MemoryTemplates::new().with("page", "{{ site }}: {{ title }}");
    let mut app = test_app().with_view(views);
    app.view_data_mut().set("site", "brisk");
    app.get("/", |ctx: &mut Context<'_>| ctx.render("page", json!({ "title": "Home" }))).unwrap();
    let response = app.run(console("GET", "/"));
    assert_eq!(response.body, "brisk: Home");
}

#[test]
fn test_route_middleware_runs_before_action() {
    let mut app = test_app();
    let _guarded = app.get("/guarded", |ctx: &mut Context<'_>| {
        ctx.response_mut().write("secret");
        Ok(())
    })
    .unwrap()
    .middleware(|ctx, _route| {
        if ctx.env().header("Authorization").is_none() {
            return ctx.halt(401, "unauthorized");
        }
        Ok(())
    });
    assert_eq!(app.run(console("GET", "/guarded")).status, 401);
    let ok = app.run(console("GET", "/guarded").with_header("Authorization", "token"));
    assert_eq!(ok.body, "secret");
}
