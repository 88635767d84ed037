//! Structural rules for `tripwise-core`

use architectural_enforcement::{core_src_dir, find_violations, production_sources, Violation};

fn report(rule: &str, violations: &[Violation]) {
    let listing: Vec<String> = violations.iter().map(ToString::to_string).collect();
    assert!(
        violations.is_empty(),
        "{rule}:\n{}",
        listing.join("\n")
    );
}

#[test]
fn test_sources_found() {
    let files = production_sources(&core_src_dir());
    assert!(files.iter().any(|f| f.path.ends_with("lib.rs")));
    assert!(files.iter().any(|f| f.is_under("cache")));
}

#[test]
fn test_no_unwrap_outside_tests() {
    let files = production_sources(&core_src_dir());
    report(
        "unwrap() in production code",
        &find_violations(&files, ".unwrap()", |_| false),
    );
    report(
        "expect() in production code",
        &find_violations(&files, ".expect(", |_| false),
    );
}

#[test]
fn test_no_sleep_in_production_code() {
    let files = production_sources(&core_src_dir());
    report(
        "thread sleep in production code",
        &find_violations(&files, "thread::sleep", |_| false),
    );
    report(
        "timer sleep in production code",
        &find_violations(&files, "time::sleep", |_| false),
    );
}

#[test]
fn test_logging_goes_through_tracing() {
    let files = production_sources(&core_src_dir());
    report("println! in core", &find_violations(&files, "println!", |_| false));
    report("eprintln! in core", &find_violations(&files, "eprintln!", |_| false));
}

#[test]
fn test_http_client_confined_to_transport() {
    let files = production_sources(&core_src_dir());
    report(
        "reqwest outside the HTTP transport",
        &find_violations(&files, "reqwest::", |f| f.path.ends_with("backend/http.rs")),
    );
}

#[test]
fn test_cache_internals_stay_private() {
    let files = production_sources(&core_src_dir());
    let outside_cache = |f: &architectural_enforcement::SourceFile| f.is_under("cache");
    for internal in ["cache::store", "cache::key", "cache::state"] {
        report(
            &format!("{internal} used outside the cache module"),
            &find_violations(&files, internal, outside_cache),
        );
    }
}
