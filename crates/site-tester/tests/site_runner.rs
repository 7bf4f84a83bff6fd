//! Site check runner tests against a scripted renderer on a paused clock.

mod common;

use common::{LoadBehavior, ScriptedRenderer};
use serde_json::json;
use site_tester::polyfill;
use site_tester::progress::{self, ProgressEmitter, ProgressEventKind, SiteStage};
use site_tester::{
    render_site, run_site_check, CheckContext, HttpClient, NoopRenderer, Renderer, RunOptions,
    SiteCheck, SiteTest, Treat, Verdict,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUNDLE: &str = r#"<script defer src="/build/bundle.js"></script>"#;

fn sadab_markup() -> String {
    format!(
        "<html><head><title>Sadab</title>\n\
         <script async src=\"https://www.googletagmanager.com/gtag/js\"></script>\n\
         {BUNDLE}\n\
         <script>\nwindow.dataLayer = [];\n</script>\n\
         </head><body><h2>Extreme Flexibility</h2></body></html>"
    )
}

async fn render_with(
    renderer: &dyn Renderer,
    options: &RunOptions,
    check: &SiteCheck,
    markup: &str,
) -> site_tester::ChannelResult {
    let http = HttpClient::new(options.request_timeout);
    let progress = ProgressEmitter::disabled();
    let ctx = CheckContext {
        http: &http,
        renderer,
        options,
        progress: &progress,
        index: 0,
    };
    render_site(&ctx, check, markup.to_string()).await
}

#[tokio::test(start_paused = true)]
async fn zero_wait_evaluates_immediately_after_load() {
    let renderer = ScriptedRenderer::new(LoadBehavior::After(Duration::from_millis(700)));
    let check = SiteCheck::new("https://y/").with_test(SiteTest::script("document.title === 'Y'"));

    let result = render_with(&renderer, &RunOptions::default(), &check, "<title>Y</title>").await;
    assert_eq!(result.verdict, Verdict::Passed);

    renderer.recorded(|r| {
        assert_eq!(r.js_calls.len(), 1);
        assert_eq!(r.js_calls[0].1.duration_since(r.loaded_at[0]), Duration::ZERO);
    });
}

#[tokio::test(start_paused = true)]
async fn grace_wait_delays_evaluation() {
    let renderer = ScriptedRenderer::new(LoadBehavior::After(Duration::from_millis(300)));
    let wait = Duration::from_secs(2);
    let check = SiteCheck::new("https://y/")
        .with_wait(wait)
        .with_test(SiteTest::native(|doc| Ok(doc.title().as_deref() == Some("Y"))));

    let result = render_with(&renderer, &RunOptions::default(), &check, "<title>Y</title>").await;
    assert_eq!(result.verdict, Verdict::Passed);

    renderer.recorded(|r| {
        assert_eq!(r.html_reads.len(), 1);
        assert!(r.html_reads[0].duration_since(r.loaded_at[0]) >= wait);
    });
}

#[tokio::test(start_paused = true)]
async fn hung_load_hits_the_watchdog() {
    let renderer = ScriptedRenderer::new(LoadBehavior::Hang);
    let options = RunOptions {
        load_timeout: Duration::from_secs(5),
        ..RunOptions::default()
    };
    let check = SiteCheck::new("https://y/").with_test(SiteTest::script("true"));

    let result = render_with(&renderer, &options, &check, "<script>for(;;){}</script>").await;
    assert_eq!(result.verdict, Verdict::Failed);
    let error = result.error.unwrap();
    assert!(error.starts_with("rendering:"), "{error}");
    assert!(error.contains("5000ms"), "{error}");

    renderer.recorded(|r| {
        assert!(r.js_calls.is_empty());
        assert_eq!(r.closed, 1);
    });
}

#[tokio::test(start_paused = true)]
async fn failed_navigation_fails_at_rendering() {
    let renderer = ScriptedRenderer::new(LoadBehavior::Fail);
    let check = SiteCheck::new("https://y/");
    let result = render_with(&renderer, &RunOptions::default(), &check, "").await;
    assert_eq!(result.verdict, Verdict::Failed);
    assert!(result.error.unwrap().contains("ERR_NAME_NOT_RESOLVED"));
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_script_predicate_hits_the_watchdog() {
    let renderer = ScriptedRenderer::instant().stall_scripts();
    let options = RunOptions {
        load_timeout: Duration::from_secs(3),
        ..RunOptions::default()
    };
    let check = SiteCheck::new("https://y/").with_test(SiteTest::script("true"));

    let result = render_with(&renderer, &options, &check, "<p></p>").await;
    assert_eq!(result.verdict, Verdict::Failed);
    let error = result.error.unwrap();
    assert!(error.starts_with("evaluating:"), "{error}");
    assert!(error.contains("timed out after 3000ms"), "{error}");
    assert_eq!(renderer.active_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_snapshot_read_hits_the_watchdog() {
    let renderer = ScriptedRenderer::instant().stall_snapshot();
    let options = RunOptions {
        load_timeout: Duration::from_secs(3),
        ..RunOptions::default()
    };
    let check = SiteCheck::new("https://y/")
        .with_test(SiteTest::native(|doc| Ok(doc.title().is_some())));

    let result = render_with(&renderer, &options, &check, "<title>Y</title>").await;
    assert_eq!(result.verdict, Verdict::Failed);
    let error = result.error.unwrap();
    assert!(error.starts_with("evaluating:"), "{error}");
    assert!(error.contains("timed out after 3000ms"), "{error}");
    renderer.recorded(|r| {
        assert_eq!(r.html_reads.len(), 1);
        assert_eq!(r.closed, 1);
    });
}

#[tokio::test(start_paused = true)]
async fn site_without_test_fails() {
    let renderer = ScriptedRenderer::instant();
    let check = SiteCheck::new("https://y/");
    let result = render_with(&renderer, &RunOptions::default(), &check, "<title>Y</title>").await;
    assert_eq!(result.verdict, Verdict::Failed);
    assert_eq!(result.error.as_deref(), Some("evaluating: site block has no test"));
    renderer.recorded(|r| {
        assert_eq!(r.loads.len(), 1);
        assert_eq!(r.closed, 1);
    });
}

#[tokio::test(start_paused = true)]
async fn polyfill_installed_before_load() {
    let renderer = ScriptedRenderer::instant();
    let check = SiteCheck::new("https://y/").with_test(SiteTest::script("true"));
    let result = render_with(&renderer, &RunOptions::default(), &check, "<p></p>").await;
    assert_eq!(result.verdict, Verdict::Passed);

    renderer.recorded(|r| {
        assert_eq!(r.init_scripts, vec![polyfill::MATCH_MEDIA.to_string()]);
        assert_eq!(r.loads.len(), 1);
        assert_eq!(r.loads[0].0, "https://y/");
    });
}

#[tokio::test(start_paused = true)]
async fn throwing_predicates_fail_cleanly() {
    let renderer = ScriptedRenderer::instant();
    let check = SiteCheck::new("https://y/")
        .with_test(SiteTest::native(|_| anyhow::bail!("Cannot read properties of undefined")));
    let result = render_with(&renderer, &RunOptions::default(), &check, "<p></p>").await;
    assert_eq!(result.verdict, Verdict::Failed);
    assert!(result.error.unwrap().contains("Cannot read properties"));

    let thrown = ScriptedRenderer::instant().with_js_result(json!("predicate threw: x is not defined"));
    let check = SiteCheck::new("https://y/").with_test(SiteTest::script("x.y"));
    let result = render_with(&thrown, &RunOptions::default(), &check, "<p></p>").await;
    assert_eq!(result.verdict, Verdict::Failed);
    assert!(result.error.unwrap().contains("x is not defined"));

    let panicking = SiteCheck::new("https://y/")
        .with_test(SiteTest::native(|doc| Ok(doc.select_text("h1")?[0].is_empty())));
    let result = render_with(&renderer, &RunOptions::default(), &panicking, "<p></p>").await;
    assert_eq!(result.verdict, Verdict::Failed);
    assert!(result.error.unwrap().contains("panicked"));

    let truthy = ScriptedRenderer::instant().with_js_result(json!(1));
    let result = render_with(&truthy, &RunOptions::default(), &check, "<p></p>").await;
    assert_eq!(result.verdict, Verdict::Failed);
}

#[tokio::test(start_paused = true)]
async fn treat_runs_once_before_render_and_only_allowed_script_executes() {
    let renderer = ScriptedRenderer::instant();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let strip = Treat::strip_scripts([BUNDLE]);
    let check = SiteCheck::new("https://www.sadab.se/")
        .with_treat(Treat::native(move |markup| {
            counter.fetch_add(1, Ordering::SeqCst);
            strip.apply(markup)
        }))
        .with_test(SiteTest::Selector(site_tester::SelectorTest {
            css: "h2".into(),
            contains: Some("Flex".into()),
            equals: Some("Extreme Flexibility".into()),
        }));

    let result = render_with(&renderer, &RunOptions::default(), &check, &sadab_markup()).await;
    assert_eq!(result.verdict, Verdict::Passed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    renderer.recorded(|r| {
        assert_eq!(r.executed_scripts, vec!["/build/bundle.js".to_string()]);
        assert!(!r.loads[0].1.contains("dataLayer"));
    });
}

#[tokio::test]
async fn fetch_failure_fails_before_rendering() {
    let renderer = ScriptedRenderer::instant();
    let options = RunOptions::default();
    let http = HttpClient::new(options.request_timeout);
    let progress = ProgressEmitter::disabled();
    let ctx = CheckContext {
        http: &http,
        renderer: &renderer,
        options: &options,
        progress: &progress,
        index: 0,
    };

    let result = run_site_check(&ctx, &SiteCheck::new("http://127.0.0.1:1/")).await;
    assert_eq!(result.verdict, Verdict::Failed);
    assert!(result.error.unwrap().starts_with("fetching:"));
    assert_eq!(renderer.recorded(|r| r.opened), 0);
}

#[tokio::test]
async fn stages_are_emitted_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<title>Y</title>"))
        .mount(&server)
        .await;

    let renderer = ScriptedRenderer::instant();
    let options = RunOptions::default();
    let http = HttpClient::new(options.request_timeout);
    let (tx, mut rx) = progress::channel();
    let progress = ProgressEmitter::new(Some(tx), "run");
    let ctx = CheckContext {
        http: &http,
        renderer: &renderer,
        options: &options,
        progress: &progress,
        index: 3,
    };

    let check = SiteCheck::new(server.uri())
        .with_treat(Treat::strip_scripts(Vec::<String>::new()))
        .with_wait(Duration::from_millis(10))
        .with_test(SiteTest::script("true"));
    let result = run_site_check(&ctx, &check).await;
    assert_eq!(result.verdict, Verdict::Passed);

    let mut stages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ProgressEventKind::StageEntered { index, stage, .. } = event.event {
            assert_eq!(index, 3);
            stages.push(stage);
        }
    }
    assert_eq!(
        stages,
        vec![
            SiteStage::Fetching,
            SiteStage::Transforming,
            SiteStage::Rendering,
            SiteStage::Waiting,
            SiteStage::Evaluating,
            SiteStage::Done,
        ]
    );
}

#[tokio::test]
async fn missing_browser_fails_at_rendering() {
    let options = RunOptions::default();
    let check = SiteCheck::new("https://y/");
    let result = render_with(&NoopRenderer, &options, &check, "<p></p>").await;
    assert_eq!(result.verdict, Verdict::Failed);
    assert!(result.error.unwrap().starts_with("rendering: browser not available"));
}
