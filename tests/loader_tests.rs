use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use lamb::config;
use lamb::{render, EngineError, Value};

// The loader reads its configuration from process environment variables, so
// tests must not interleave.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

fn create_temp_dir(prefix: &str) -> PathBuf {
    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("lamb-it-{prefix}-{}-{id}", std::process::id()));
    fs::create_dir_all(&dir).expect("temp dir creation should succeed");
    dir
}

fn write_template(base: &Path, name: &str, source: &str) {
    let mut path = base.to_path_buf();
    for part in name.split('.') {
        path.push(part);
    }
    path.set_extension("lamb.html");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("template dir creation should succeed");
    }
    fs::write(path, source).expect("template write should succeed");
}

fn render_from(base: &Path, name: &str, vars: HashMap<String, Value>) -> Result<String, EngineError> {
    std::env::set_var(config::BASE_DIR_VAR, base);
    let mut buf = Vec::new();
    render(name, vars, &mut buf)?;
    Ok(String::from_utf8(buf).expect("rendered output should be utf-8"))
}

fn wait_for_file(path: &Path) {
    for _ in 0..200 {
        if path.exists() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("file {} never appeared", path.display());
}

#[test]
fn renders_a_template_with_caller_vars() {
    let _guard = lock_env();
    let dir = create_temp_dir("vars");
    write_template(&dir, "greet", "hello {? who ?}");

    let mut vars = HashMap::new();
    vars.insert("who".to_string(), Value::Str("world".to_string()));

    let out = render_from(&dir, "greet", vars).expect("render should succeed");
    assert_eq!(out, "hello world");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn dotted_names_resolve_into_subdirectories() {
    let _guard = lock_env();
    let dir = create_temp_dir("dotted");
    write_template(&dir, "pages.home.index", "home");

    let out = render_from(&dir, "pages.home.index", HashMap::new()).expect("render should succeed");
    assert_eq!(out, "home");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn include_passes_explicit_arguments() {
    let _guard = lock_env();
    let dir = create_temp_dir("include");
    write_template(&dir, "row", "<li>{? name ?}</li>");
    write_template(
        &dir,
        "list",
        "{? include(\"row\", {\"name\": \"a\"}) ?}{? include(\"row\", {\"name\": \"b\"}) ?}",
    );

    let out = render_from(&dir, "list", HashMap::new()).expect("render should succeed");
    assert_eq!(out, "<li>a</li><li>b</li>");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn include_arguments_may_use_caller_bindings() {
    let _guard = lock_env();
    let dir = create_temp_dir("include-expr");
    write_template(&dir, "row", "<li>{? n ?}</li>");
    write_template(
        &dir,
        "list",
        "{? var x = 2 ?}{? include(\"row\", {\"n\": x + 1}) ?}",
    );

    let out = render_from(&dir, "list", HashMap::new()).expect("render should succeed");
    assert_eq!(out, "<li>3</li>");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn included_template_sees_only_its_arguments() {
    let _guard = lock_env();
    let dir = create_temp_dir("include-isolated");
    write_template(&dir, "leaky", "{? secret ?}");
    write_template(&dir, "page", "{? var secret = 1 ?}{? include(\"leaky\") ?}");

    let err = render_from(&dir, "page", HashMap::new()).expect_err("render should fail");
    assert!(
        err.to_string().contains("identifier not found: secret"),
        "got {err}"
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn extends_substitutes_the_captured_section() {
    let _guard = lock_env();
    let dir = create_temp_dir("extends");
    write_template(
        &dir,
        "layout",
        "<html>{? define(\"body\") ?}default{? end ?}</html>",
    );
    write_template(
        &dir,
        "child",
        "{? extends(\"layout\") ?}{? section(\"body\") ?}hello{? endsection ?}",
    );

    let out = render_from(&dir, "child", HashMap::new()).expect("render should succeed");
    assert_eq!(out, "<html>hello</html>");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn define_renders_its_default_without_a_child() {
    let _guard = lock_env();
    let dir = create_temp_dir("define-default");
    write_template(
        &dir,
        "layout",
        "<html>{? define(\"body\") ?}default{? end ?}</html>",
    );

    let out = render_from(&dir, "layout", HashMap::new()).expect("render should succeed");
    assert_eq!(out, "<html>default</html>");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn child_variables_are_visible_to_the_parent_render() {
    let _guard = lock_env();
    let dir = create_temp_dir("extends-vars");
    write_template(&dir, "layout", "<title>{? title ?}</title>");
    write_template(
        &dir,
        "child",
        "{? extends(\"layout\") ?}{? var title = \"home\" ?}",
    );

    let out = render_from(&dir, "child", HashMap::new()).expect("render should succeed");
    assert_eq!(out, "<title>home</title>");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn unconsumed_section_fails_the_render() {
    let _guard = lock_env();
    let dir = create_temp_dir("unconsumed");
    write_template(
        &dir,
        "layout",
        "<html>{? define(\"body\") ?}default{? end ?}</html>",
    );
    write_template(
        &dir,
        "child",
        "{? extends(\"layout\") ?}\
         {? section(\"body\") ?}hello{? endsection ?}\
         {? section(\"extra\") ?}lost{? endsection ?}",
    );

    let err = render_from(&dir, "child", HashMap::new()).expect_err("render should fail");
    assert!(
        err.to_string().contains("section extra does not exist"),
        "got {err}"
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn chained_extends_is_rejected() {
    let _guard = lock_env();
    let dir = create_temp_dir("chained-extends");
    write_template(&dir, "grandparent", "top");
    write_template(&dir, "parent", "{? extends(\"grandparent\") ?}");
    write_template(&dir, "child", "{? extends(\"parent\") ?}");

    let err = render_from(&dir, "child", HashMap::new()).expect_err("render should fail");
    assert!(
        err.to_string().contains("nested extends are not allowed"),
        "got {err}"
    );

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_template_fails_with_its_path() {
    let _guard = lock_env();
    let dir = create_temp_dir("missing");

    let err = render_from(&dir, "nope", HashMap::new()).expect_err("render should fail");
    let message = err.to_string();
    assert!(message.contains("failed to read"), "got {message}");
    assert!(message.contains("nope.lamb.html"), "got {message}");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn template_names_cannot_escape_the_base_directory() {
    let _guard = lock_env();
    let dir = create_temp_dir("escape");

    for name in ["../secrets", "a/b", "a..b", "", "a\\b"] {
        let err = render_from(&dir, name, HashMap::new()).expect_err("render should fail");
        assert!(
            err.to_string().contains("invalid template name"),
            "name {name:?} got {err}"
        );
    }

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn parse_errors_abort_with_the_first_message() {
    let _guard = lock_env();
    let dir = create_temp_dir("parse-error");
    write_template(&dir, "broken", "{? var ?}");

    let err = render_from(&dir, "broken", HashMap::new()).expect_err("render should fail");
    let message = err.to_string();
    assert!(message.contains("broken.lamb.html"), "got {message}");
    assert!(message.contains("expected next token to be IDENT"), "got {message}");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn eval_errors_carry_the_file_name() {
    let _guard = lock_env();
    let dir = create_temp_dir("eval-error");
    write_template(&dir, "broken", "{? nope ?}");

    let err = render_from(&dir, "broken", HashMap::new()).expect_err("render should fail");
    let message = err.to_string();
    assert!(message.contains("broken.lamb.html"), "got {message}");
    assert!(message.contains("identifier not found: nope"), "got {message}");

    let _ = fs::remove_dir_all(dir);
}

#[test]
fn fresh_cache_entry_skips_the_template_source() {
    let _guard = lock_env();
    let dir = create_temp_dir("cache-fresh");
    let cache_dir = create_temp_dir("cache-fresh-store");
    std::env::set_var(config::CACHE_DIR_VAR, &cache_dir);
    std::env::set_var(config::CACHE_TIME_VAR, "5m");

    write_template(&dir, "page", "cached {? 1 + 1 ?}");

    let mut vars = HashMap::new();
    vars.insert("__cache".to_string(), Value::Str("all".to_string()));

    let first = render_from(&dir, "page", vars.clone()).expect("render should succeed");
    assert_eq!(first, "cached 2");

    wait_for_file(&cache_dir.join("page"));

    // The source is gone; only the cache can serve the second render.
    let _ = fs::remove_dir_all(&dir);

    let second = render_from(&dir, "page", vars).expect("render should succeed");
    assert_eq!(second, first);

    let _ = fs::remove_dir_all(cache_dir);
}

#[test]
fn expired_cache_entry_is_dropped_and_rerendered() {
    let _guard = lock_env();
    let dir = create_temp_dir("cache-expired");
    let cache_dir = create_temp_dir("cache-expired-store");
    std::env::set_var(config::CACHE_DIR_VAR, &cache_dir);
    std::env::set_var(config::CACHE_TIME_VAR, "1ns");

    write_template(&dir, "page", "v1");

    let mut vars = HashMap::new();
    vars.insert("__cache".to_string(), Value::Str("all".to_string()));

    let first = render_from(&dir, "page", vars.clone()).expect("render should succeed");
    assert_eq!(first, "v1");

    wait_for_file(&cache_dir.join("page"));
    thread::sleep(Duration::from_millis(20));

    write_template(&dir, "page", "v2");

    let second = render_from(&dir, "page", vars).expect("render should succeed");
    assert_eq!(second, "v2");

    let _ = fs::remove_dir_all(dir);
    let _ = fs::remove_dir_all(cache_dir);
}

#[test]
fn renders_without_caching_when_cache_var_is_absent() {
    let _guard = lock_env();
    let dir = create_temp_dir("no-cache");
    let cache_dir = create_temp_dir("no-cache-store");
    std::env::set_var(config::CACHE_DIR_VAR, &cache_dir);
    std::env::set_var(config::CACHE_TIME_VAR, "5m");

    write_template(&dir, "page", "plain");

    let out = render_from(&dir, "page", HashMap::new()).expect("render should succeed");
    assert_eq!(out, "plain");

    thread::sleep(Duration::from_millis(50));
    assert!(!cache_dir.join("page").exists());

    let _ = fs::remove_dir_all(dir);
    let _ = fs::remove_dir_all(cache_dir);
}
