use std::sync::Arc;
use std::thread;

use reqhound::config::{FilterMode, TaskConfig};
use reqhound::filter::{Filter, SimpleFilter, build_filter, is_ignored_by_keyword};
use reqhound::model::{Method, Request, RequestOptions};

fn get(url: &str) -> Request {
    Request::new(Method::Get, url).unwrap()
}

fn passed(filter: &dyn Filter, urls: &[String]) -> usize {
    urls.iter().filter(|u| !filter.do_filter(&get(u))).count()
}

#[test]
fn test_exact_dedup_is_idempotent() {
    let config = TaskConfig::default();
    for mode in [FilterMode::Simple, FilterMode::Smart, FilterMode::Strict] {
        let filter = build_filter(mode, Some("h"), &config);
        let post = Request::with_options(
            Method::Post,
            "http://h/login",
            RequestOptions {
                headers: Default::default(),
                post_data: "user=a".into(),
            },
        )
        .unwrap();
        assert!(!filter.do_filter(&post), "{mode}");
        assert!(filter.do_filter(&post.clone()), "{mode}");
    }
}

#[test]
fn test_host_scope_with_default_ports() {
    let http = SimpleFilter::new(Some("example.com:80"));
    assert!(!http.do_filter(&get("http://example.com/")));
    assert!(http.do_filter(&get("https://example.com/")));

    let https = SimpleFilter::new(Some("example.com:443"));
    assert!(!https.do_filter(&get("https://example.com/")));
    assert!(https.do_filter(&get("http://example.com/")));
}

#[test]
fn test_static_suffix_rule() {
    let config = TaskConfig::default();
    for mode in [FilterMode::Simple, FilterMode::Smart] {
        let filter = build_filter(mode, None, &config);
        assert!(filter.do_filter(&get("http://h/logo.png")), "{mode}");
        assert!(!filter.do_filter(&get("http://h/logo")), "{mode}");
        assert!(!filter.do_filter(&get("http://h/dir.png/")), "{mode}");
    }
}

#[test]
fn test_structural_bound_strict_not_above_smart() {
    let config = TaskConfig::default();
    let urls = (0..40)
        .map(|i| format!("http://h/list?sort=v{i}&dir=up"))
        .collect::<Vec<_>>();

    let smart = passed(build_filter(FilterMode::Smart, None, &config).as_ref(), &urls);
    let strict = passed(build_filter(FilterMode::Strict, None, &config).as_ref(), &urls);
    let simple = passed(build_filter(FilterMode::Simple, None, &config).as_ref(), &urls);

    assert_eq!(simple, 40);
    assert_eq!(smart, config.smart_bucket_limit);
    assert_eq!(strict, config.strict_bucket_limit);
    assert!(strict <= smart);
}

#[test]
fn test_strict_collapses_inner_path_segments() {
    let config = TaskConfig::default();
    let urls = ["alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi"]
        .iter()
        .map(|name| format!("http://h/user/{name}/profile"))
        .collect::<Vec<_>>();

    let strict = passed(build_filter(FilterMode::Strict, None, &config).as_ref(), &urls);
    let smart = passed(build_filter(FilterMode::Smart, None, &config).as_ref(), &urls);

    assert_eq!(strict, config.strict_bucket_limit);
    assert_eq!(smart, urls.len());
}

#[test]
fn test_volatile_values_collapse() {
    let config = TaskConfig::default();
    let filter = build_filter(FilterMode::Smart, None, &config);
    let urls = (1000..1050)
        .map(|i| format!("http://h/item?id={i}"))
        .collect::<Vec<_>>();
    assert_eq!(passed(filter.as_ref(), &urls), 1);
}

#[test]
fn test_shared_filter_across_threads() {
    let config = TaskConfig::default();
    let filter = build_filter(FilterMode::Simple, Some("h"), &config);
    let kept = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let handles = (0..8)
        .map(|_| {
            let filter = filter.clone();
            let kept = kept.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    if !filter.do_filter(&get(&format!("http://h/page/{i}"))) {
                        kept.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(kept.load(std::sync::atomic::Ordering::SeqCst), 50);
}

#[test]
fn test_keyword_ignore_is_case_insensitive() {
    let keywords = vec!["logout".to_string(), String::new()];
    assert!(is_ignored_by_keyword(&get("http://h/User/LogOut?x=1"), &keywords));
    assert!(!is_ignored_by_keyword(&get("http://h/profile"), &keywords));
}
