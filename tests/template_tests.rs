// ABOUTME: Integration tests for the template surface over a live shared context
// ABOUTME: Covers ctx access, helpers, typed renders, and error reporting

use serde_json::json;

use weft::{SharedContext, TemplateError};

fn shared() -> SharedContext {
    let shared = SharedContext::new();
    shared.set_input("project-name", json!("data-pipeline"));
    shared.set_input("project_name", json!("data-pipeline"));
    shared.set_input("replicas", json!("3"));
    shared.set_env("HOME", "/home/ci");
    shared
}

#[test]
fn test_render_input_and_env() {
    let shared = shared();
    assert_eq!(
        shared.render("building {ctx.input.project_name}").unwrap(),
        "building data-pipeline"
    );
    assert_eq!(shared.render("{ctx.env.HOME}/work").unwrap(), "/home/ci/work");
}

#[test]
fn test_render_case_helpers() {
    let shared = shared();
    assert_eq!(
        shared
            .render("{to_pascal_case(ctx.input.project_name)}")
            .unwrap(),
        "DataPipeline"
    );
    assert_eq!(
        shared
            .render("{to_snake_case(ctx.input.project_name)}")
            .unwrap(),
        "data_pipeline"
    );
    assert_eq!(
        shared
            .render("{double_quote(ctx.input.project_name)}")
            .unwrap(),
        "\"data-pipeline\""
    );
}

#[test]
fn test_render_xcom_peek() {
    let shared = shared();
    shared.xcom("build").push(json!("artifact-v3"));
    assert_eq!(
        shared.render("deploying {ctx.xcom.build.peek()}").unwrap(),
        "deploying artifact-v3"
    );
}

#[test]
fn test_typed_renders() {
    let shared = shared();
    assert_eq!(shared.render_int("{ctx.input.replicas}").unwrap(), 3);
    assert!((shared.render_float("{ctx.input.replicas}").unwrap() - 3.0).abs() < f64::EPSILON);
    assert!(shared.render_bool("{to_boolean('on')}").unwrap());
}

#[test]
fn test_typed_render_failures() {
    let shared = shared();
    assert!(matches!(
        shared.render_int("{ctx.input.project_name}"),
        Err(TemplateError::TypeError { .. })
    ));
    assert!(matches!(
        shared.render_bool("{ctx.input.project_name}"),
        Err(TemplateError::TypeError { .. })
    ));
}

#[test]
fn test_render_error_names_template_and_cause() {
    let shared = shared();
    let err = shared.render("{ctx.input.missing}").unwrap_err();
    let message = err.to_string();
    assert!(message.contains("{ctx.input.missing}"));
    assert!(message.contains("project-name") || message.contains("project_name"));
}

#[test]
fn test_concatenation_and_literals() {
    let shared = shared();
    assert_eq!(
        shared
            .render("{'v' + ctx.input.replicas + '-final'}")
            .unwrap(),
        "v3-final"
    );
    assert_eq!(shared.render("{{not + rendered}}").unwrap(), "{not + rendered}");
}
