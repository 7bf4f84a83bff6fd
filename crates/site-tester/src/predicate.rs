//! Predicates and the evaluator that contains their failures.
//!
//! Predicates run against untrusted remote content. Whatever they do (return
//! an error, panic, produce a non-boolean) the evaluator degrades it to a
//! failed verdict and never lets it reach the orchestrator.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::document::Document;

/// Caller-supplied predicate over a parsed JSON response.
pub type JsonPredicate = Arc<dyn Fn(&Value) -> anyhow::Result<bool> + Send + Sync>;

/// Caller-supplied predicate over a rendered document snapshot.
pub type DocumentPredicate = Arc<dyn Fn(&Document) -> anyhow::Result<bool> + Send + Sync>;

/// Test applied to an API response body.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiTest {
    /// Every assertion must hold.
    Expect(Vec<JsonAssertion>),
    #[serde(skip)]
    Native(JsonPredicate),
}

impl ApiTest {
    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&Value) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Native(Arc::new(f))
    }

    pub fn check(&self, json: &Value) -> anyhow::Result<bool> {
        match self {
            Self::Expect(assertions) => Ok(assertions.iter().all(|a| a.holds(json))),
            Self::Native(f) => f(json),
        }
    }
}

impl fmt::Debug for ApiTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expect(assertions) => f.debug_tuple("Expect").field(assertions).finish(),
            Self::Native(_) => write!(f, "Native(..)"),
        }
    }
}

/// `pointer` (RFC 6901) must resolve; if `equals` is set the value must match
/// it, otherwise the value must be truthy.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonAssertion {
    pub pointer: String,
    #[serde(default)]
    pub equals: Option<Value>,
}

impl JsonAssertion {
    pub fn holds(&self, json: &Value) -> bool {
        match (json.pointer(&self.pointer), &self.equals) {
            (Some(found), Some(expected)) => found == expected,
            (Some(found), None) => truthy(found),
            (None, _) => false,
        }
    }
}

/// JavaScript truthiness for JSON values.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Test applied to a rendered page.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteTest {
    /// JavaScript expression evaluated in the page; may return a promise.
    /// Passes only when it yields exactly `true`.
    Script(String),
    Selector(SelectorTest),
    #[serde(skip)]
    Native(DocumentPredicate),
}

impl SiteTest {
    pub fn script(expression: impl Into<String>) -> Self {
        Self::Script(expression.into())
    }

    pub fn native<F>(f: F) -> Self
    where
        F: Fn(&Document) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::Native(Arc::new(f))
    }

    /// Evaluate against a snapshot. `Script` tests run in the page and are
    /// rejected here.
    pub fn check(&self, doc: &Document) -> anyhow::Result<bool> {
        match self {
            Self::Selector(test) => test.check(doc),
            Self::Native(f) => f(doc),
            Self::Script(_) => anyhow::bail!("script predicates run inside the page"),
        }
    }
}

impl fmt::Debug for SiteTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script(s) => f.debug_tuple("Script").field(s).finish(),
            Self::Selector(t) => f.debug_tuple("Selector").field(t).finish(),
            Self::Native(_) => write!(f, "Native(..)"),
        }
    }
}

/// Takes the elements matching `css`, keeps those whose inner HTML contains
/// `contains` (if set), and compares the first one's inner HTML to `equals`.
/// Without `equals` the test passes when any element remains.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectorTest {
    pub css: String,
    #[serde(default)]
    pub contains: Option<String>,
    #[serde(default)]
    pub equals: Option<String>,
}

impl SelectorTest {
    pub fn check(&self, doc: &Document) -> anyhow::Result<bool> {
        let mut matches = doc.select_inner_html(&self.css)?;
        if let Some(needle) = &self.contains {
            matches.retain(|html| html.contains(needle.as_str()));
        }
        Ok(match &self.equals {
            Some(expected) => matches.first() == Some(expected),
            None => !matches.is_empty(),
        })
    }
}

/// Outcome of running one predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Passed,
    /// The predicate ran and returned false.
    Rejected,
    /// The predicate failed to produce a boolean.
    Errored(String),
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    fn from_bool(passed: bool) -> Self {
        if passed {
            Self::Passed
        } else {
            Self::Rejected
        }
    }
}

/// Run `test` against `payload`, containing errors and panics.
pub fn evaluate<P: ?Sized>(payload: &P, test: impl FnOnce(&P) -> anyhow::Result<bool>) -> Evaluation {
    match catch_unwind(AssertUnwindSafe(|| test(payload))) {
        Ok(Ok(passed)) => Evaluation::from_bool(passed),
        Ok(Err(e)) => {
            tracing::warn!("predicate returned an error: {e:#}");
            Evaluation::Errored(format!("{e:#}"))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!("predicate panicked: {message}");
            Evaluation::Errored(format!("predicate panicked: {message}"))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Wrap a predicate expression so the page reports `true`, `false`, or the
/// thrown error's message as a string.
pub fn wrap_script(expression: &str) -> String {
    format!(
        "(async () => {{ try {{ return (await ({expression})) === true; }} \
         catch (e) {{ return 'predicate threw: ' + String(e && e.message ? e.message : e); }} }})()"
    )
}

/// Interpret the value a wrapped script predicate produced.
pub fn coerce_js(value: &Value) -> Evaluation {
    match value {
        Value::Bool(true) => Evaluation::Passed,
        Value::String(message) => Evaluation::Errored(message.clone()),
        _ => Evaluation::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluate_passes_through_bool() {
        assert_eq!(evaluate(&json!({"ok": true}), |j| Ok(j["ok"] == true)), Evaluation::Passed);
        assert_eq!(evaluate(&json!({"ok": 1}), |j| Ok(j["ok"] == true)), Evaluation::Rejected);
    }

    #[test]
    fn test_evaluate_contains_error() {
        let outcome = evaluate(&json!(null), |_| anyhow::bail!("no such field"));
        assert!(!outcome.passed());
        assert!(matches!(outcome, Evaluation::Errored(ref m) if m.contains("no such field")));
    }

    #[test]
    fn test_evaluate_contains_panic() {
        let outcome = evaluate(&json!([]), |j: &Value| {
            let items = j.as_array().unwrap();
            Ok(items[3].is_null())
        });
        assert!(matches!(outcome, Evaluation::Errored(ref m) if m.contains("panicked")));
    }

    #[test]
    fn test_json_assertions() {
        let body = json!({"ok": true, "data": {"items": [1, 2]}, "msg": ""});
        let test: ApiTest = serde_json::from_value(json!({
            "expect": [
                {"pointer": "/ok", "equals": true},
                {"pointer": "/data/items/1", "equals": 2},
                {"pointer": "/data"}
            ]
        }))
        .unwrap();
        assert!(test.check(&body).unwrap());

        let missing = JsonAssertion { pointer: "/nope".into(), equals: None };
        assert!(!missing.holds(&body));
        let falsy = JsonAssertion { pointer: "/msg".into(), equals: None };
        assert!(!falsy.holds(&body));
    }

    #[test]
    fn test_truthy() {
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(null)));
        assert!(truthy(&json!([])));
        assert!(truthy(&json!(-1.5)));
    }

    #[test]
    fn test_selector_test_first_match_after_filter() {
        let doc = Document::parse(
            "https://www.sadab.se/",
            "<h2>Welcome</h2><h2>Extreme Flexibility</h2><h2>Flexible pricing</h2>",
        );
        let test = SelectorTest {
            css: "h2".into(),
            contains: Some("Flex".into()),
            equals: Some("Extreme Flexibility".into()),
        };
        assert!(test.check(&doc).unwrap());

        let wrong = SelectorTest { equals: Some("Flexible pricing".into()), ..test.clone() };
        assert!(!wrong.check(&doc).unwrap());

        let exists = SelectorTest { css: "h3".into(), contains: None, equals: None };
        assert!(!exists.check(&doc).unwrap());
    }

    #[test]
    fn test_site_test_deserializes_tagged() {
        let script: SiteTest = serde_json::from_value(json!({"script": "document.title === 'Y'"})).unwrap();
        assert!(matches!(script, SiteTest::Script(ref s) if s.contains("document.title")));

        let selector: SiteTest =
            serde_json::from_value(json!({"selector": {"css": "title", "equals": "Y"}})).unwrap();
        assert!(matches!(selector, SiteTest::Selector(_)));
    }

    #[test]
    fn test_script_predicate_rejected_outside_page() {
        let doc = Document::parse("https://y/", "<title>Y</title>");
        assert!(SiteTest::script("true").check(&doc).is_err());
    }

    #[test]
    fn test_coerce_js_only_true_passes() {
        assert_eq!(coerce_js(&json!(true)), Evaluation::Passed);
        assert_eq!(coerce_js(&json!(false)), Evaluation::Rejected);
        assert_eq!(coerce_js(&json!(1)), Evaluation::Rejected);
        assert_eq!(coerce_js(&json!(null)), Evaluation::Rejected);
        assert!(matches!(coerce_js(&json!("predicate threw: x")), Evaluation::Errored(_)));
    }

    #[test]
    fn test_wrap_script_embeds_expression() {
        let wrapped = wrap_script("document.title === 'Y'");
        assert!(wrapped.contains("(await (document.title === 'Y')) === true"));
        assert!(wrapped.starts_with("(async () =>"));
    }
}
