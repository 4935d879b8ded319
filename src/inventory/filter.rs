// Host filters
//
// Every combinator returns a fresh predicate and never captures mutable
// state, so a filter can be reused across as many `Inventory::filter`
// calls as needed.

use std::sync::Arc;

use regex::Regex;
use serde_yaml::Value;

use super::Host;
use crate::output::errors::SharedError;

/// A pure predicate over a host
pub type FilterFunc = Arc<dyn Fn(&Host) -> bool + Send + Sync>;

/// Turn a closure into a `FilterFunc`
pub fn filter_fn<F>(f: F) -> FilterFunc
where
    F: Fn(&Host) -> bool + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Hosts whose hostname equals `hostname`
pub fn with_hostname(hostname: impl Into<String>) -> FilterFunc {
    let hostname = hostname.into();
    filter_fn(move |host| host.hostname == hostname)
}

/// Hosts whose hostname matches `pattern`
pub fn with_hostname_matching(pattern: Regex) -> FilterFunc {
    filter_fn(move |host| pattern.is_match(&host.hostname))
}

/// Hosts on the given platform
pub fn with_platform(platform: impl Into<String>) -> FilterFunc {
    let platform = platform.into();
    filter_fn(move |host| host.platform == platform)
}

/// Hosts carrying `key` in their data bag with exactly `value`
pub fn with_data(key: impl Into<String>, value: Value) -> FilterFunc {
    let key = key.into();
    filter_fn(move |host| host.get_data(&key) == Some(&value))
}

/// Hosts whose last task left an error
pub fn errored() -> FilterFunc {
    filter_fn(|host| host.err().is_some())
}

/// Hosts whose last error is this very error instance
pub fn with_error(err: SharedError) -> FilterFunc {
    filter_fn(move |host| host.err().is_some_and(|e| Arc::ptr_eq(&e, &err)))
}

/// Inverse of `f`
pub fn not(f: FilterFunc) -> FilterFunc {
    filter_fn(move |host| !f(host))
}

/// True when every filter passes; an empty list never passes
pub fn and(filters: Vec<FilterFunc>) -> FilterFunc {
    filter_fn(move |host| !filters.is_empty() && filters.iter().all(|f| f(host)))
}

/// True when at least one filter passes
pub fn or(filters: Vec<FilterFunc>) -> FilterFunc {
    filter_fn(move |host| filters.iter().any(|f| f(host)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::Inventory;
    use crate::output::errors::ArmadaError;
    use pretty_assertions::assert_eq;

    fn test_inventory() -> (Inventory, SharedError, SharedError) {
        let inv: Inventory = ["dev1", "dev2", "dev3", "dev4"]
            .into_iter()
            .map(|n| {
                let platform = if n == "dev3" { "junos" } else { "linux" };
                (n.to_string(), Host::new(n).with_platform(platform))
            })
            .collect();

        let err1: SharedError = Arc::new(ArmadaError::task("an error"));
        let err2: SharedError = Arc::new(ArmadaError::task("another error"));
        inv.get_host("dev2").unwrap().set_err(Some(err1.clone()));
        inv.get_host("dev4").unwrap().set_err(Some(err2.clone()));

        (inv, err1, err2)
    }

    fn keys(inv: &Inventory) -> Vec<&str> {
        inv.sorted_keys()
    }

    #[test]
    fn test_filters() {
        let (inv, err1, _) = test_inventory();
        let other: SharedError = Arc::new(ArmadaError::task("an error"));

        let cases: Vec<(&str, FilterFunc, Vec<&str>)> = vec![
            ("successful", not(errored()), vec!["dev1", "dev3"]),
            ("errored", errored(), vec!["dev2", "dev4"]),
            ("with_error", with_error(err1.clone()), vec!["dev2"]),
            (
                "without_error",
                not(with_error(err1.clone())),
                vec!["dev1", "dev3", "dev4"],
            ),
            ("same_text_other_error", with_error(other), vec![]),
            ("and_empty", and(vec![]), vec![]),
            (
                "and_pass",
                and(vec![with_hostname("dev1"), not(errored())]),
                vec!["dev1"],
            ),
            (
                "and_failed",
                and(vec![with_hostname("dev2"), not(errored())]),
                vec![],
            ),
            ("or_empty", or(vec![]), vec![]),
            (
                "or_pass",
                or(vec![with_hostname("dev1"), errored()]),
                vec!["dev1", "dev2", "dev4"],
            ),
            (
                "or_failed",
                or(vec![with_hostname("dev5"), with_platform("ios")]),
                vec![],
            ),
            ("platform", with_platform("junos"), vec!["dev3"]),
            (
                "regex",
                with_hostname_matching(Regex::new(r"^dev[12]$").unwrap()),
                vec!["dev1", "dev2"],
            ),
        ];

        for (name, filter, expected) in cases {
            let filtered = inv.filter(&filter);
            assert_eq!(keys(&filtered), expected, "case {}", name);
            assert!(filtered.host_count() <= inv.host_count());
            assert!(filtered.hosts.values().all(|h| filter(h)), "case {}", name);
        }

        assert_eq!(inv.host_count(), 4);
    }

    #[test]
    fn test_empty_combinators_never_match() {
        let host = Host::new("anything");
        assert!(!and(vec![])(&host));
        assert!(!or(vec![])(&host));
        assert!(not(and(vec![]))(&host));
    }

    #[test]
    fn test_with_data() {
        let mut inv = Inventory::new();
        inv.add_host(
            "edge1",
            Host::new("edge1").with_data("role", Value::String("edge".to_string())),
        );
        inv.add_host("core1", Host::new("core1"));

        let filtered = inv.filter(&with_data("role", Value::String("edge".to_string())));
        assert_eq!(keys(&filtered), vec!["edge1"]);
    }

    #[test]
    fn test_filters_are_reusable() {
        let (inv, _, _) = test_inventory();
        let f = and(vec![not(errored()), with_platform("linux")]);

        let first = inv.filter(&f);
        let second = inv.filter(&f);
        let nested = first.filter(&f);

        assert_eq!(keys(&first), vec!["dev1"]);
        assert_eq!(keys(&second), keys(&first));
        assert_eq!(keys(&nested), keys(&first));
    }
}
