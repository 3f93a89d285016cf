//! End-to-end tests for the format router.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serde_json::json;
use tdf_config::{Config, Format};
use tdf_router::{
    Classifier, ConvertError, DeploymentDescriptor, DeploymentKind, FlatPipeline, FormatRouter,
    OutputFormat, Payload, Pipeline, PipelineError, UrlPatternClassifier, rollout_bucket,
};
use tdf_renderer::{
    FLATTENED_MARKER, InlinePlugin, InlineSpan, Mark, Node, NodeKind, Registry, RenderContext,
    RenderError,
};
use tracing_subscriber::EnvFilter;

const CLOUD: &str = "https://acme.atlassian.net";
const SERVER: &str = "https://jira.corp.example";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn router() -> FormatRouter {
    init_tracing();
    FormatRouter::new(&Config::default())
}

fn tree(payload: &Payload) -> &Node {
    payload.as_tree().expect("tree payload")
}

fn list_depth(node: &Node) -> usize {
    let own = usize::from(matches!(
        node.kind,
        NodeKind::BulletList | NodeKind::OrderedList
    ));
    own + node.content.iter().map(list_depth).max().unwrap_or(0)
}

/// Flat pipeline that counts its invocations.
struct CountingFlat {
    inner: FlatPipeline,
    calls: Arc<AtomicUsize>,
}

impl Pipeline for CountingFlat {
    fn format(&self) -> OutputFormat {
        OutputFormat::Flat
    }

    fn convert(&self, text: &str) -> Result<Payload, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.convert(text)
    }
}

/// Pipeline that always fails with the given format.
struct Failing(OutputFormat);

impl Pipeline for Failing {
    fn format(&self) -> OutputFormat {
        self.0
    }

    fn convert(&self, _text: &str) -> Result<Payload, PipelineError> {
        Err(PipelineError::Failed(format!("{} tier offline", self.0)))
    }
}

/// Classifier that counts its invocations.
struct CountingClassifier {
    inner: UrlPatternClassifier,
    calls: Arc<AtomicUsize>,
}

impl Classifier for CountingClassifier {
    fn classify(&self, base_url: &str) -> DeploymentDescriptor {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.classify(base_url)
    }
}

/// Inline plugin whose renderer panics on `BOOM`.
struct Exploding;

impl InlinePlugin for Exploding {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn find(&self, text: &str) -> Option<InlineSpan> {
        let start = text.find("BOOM")?;
        Some(InlineSpan::new(start, start + 4))
    }

    fn render(
        &self,
        _span: &InlineSpan,
        _ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        panic!("plugin bug")
    }
}

/// Inline plugin reporting a span that starts one byte into the run.
struct OffByOne;

impl InlinePlugin for OffByOne {
    fn name(&self) -> &'static str {
        "off-by-one"
    }

    fn find(&self, text: &str) -> Option<InlineSpan> {
        (text.len() > 1).then(|| InlineSpan::new(1, text.len()))
    }

    fn render(
        &self,
        _span: &InlineSpan,
        _ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        Ok(Some(Node::text("replaced")))
    }
}

/// Inline plugin producing a status node without its required attributes.
struct BareStatus;

impl InlinePlugin for BareStatus {
    fn name(&self) -> &'static str {
        "bare-status"
    }

    fn find(&self, text: &str) -> Option<InlineSpan> {
        let start = text.find("!!")?;
        Some(InlineSpan::new(start, start + 2))
    }

    fn render(
        &self,
        _span: &InlineSpan,
        _ctx: &mut RenderContext,
    ) -> Result<Option<Node>, RenderError> {
        Ok(Some(Node::new(NodeKind::Status)))
    }
}

#[test]
fn test_cloud_gets_tree_server_gets_flat() {
    let router = router();

    let cloud = router.convert("**Done**", CLOUD, None);
    assert_eq!(cloud.format, OutputFormat::Tree);
    assert_eq!(cloud.deployment_kind, DeploymentKind::Cloud);
    assert!(!cloud.rollout_applied);

    let server = router.convert("**Done**", SERVER, None);
    assert_eq!(server.format, OutputFormat::Flat);
    assert_eq!(server.deployment_kind, DeploymentKind::Server);
    assert_eq!(server.payload, Payload::Flat("*Done*".to_owned()));

    let unknown = router.convert("**Done**", "", None);
    assert_eq!(unknown.format, OutputFormat::Flat);
    assert_eq!(unknown.deployment_kind, DeploymentKind::Unknown);
}

#[test]
fn test_repeated_conversion_is_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = FormatRouter::builder(&Config::default())
        .with_flat_pipeline(CountingFlat {
            inner: FlatPipeline::default(),
            calls: Arc::clone(&calls),
        })
        .build();

    let first = router.convert("# Title", SERVER, None);
    let second = router.convert("# Title", SERVER, None);

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = router.cache().stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    assert!((router.metrics().cache_hit_rate - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_override_is_part_of_cache_key() {
    let router = router();

    let auto = router.convert("text", CLOUD, None);
    let flat = router.convert("text", CLOUD, Some(OutputFormat::Flat));

    assert_eq!(auto.format, OutputFormat::Tree);
    assert_eq!(flat.format, OutputFormat::Flat);
    assert!(!flat.rollout_applied);
    assert_eq!(router.cache().len(), 2);
}

#[test]
fn test_colon_in_url_does_not_share_cache_entry() {
    let router = router();

    let first = router.convert("b:c", "https://a.test", None);
    let second = router.convert("c", "https://a.test:b", None);

    assert_eq!(first.payload, Payload::Flat("b:c".to_owned()));
    assert_eq!(second.payload, Payload::Flat("c".to_owned()));
    let stats = router.cache().stats();
    assert_eq!((stats.hits, stats.misses, stats.entries), (0, 2, 2));
}

#[test]
fn test_link_without_target_stays_tree() {
    let router = router();

    let result = router.convert("see [docs]() for more", CLOUD, None);

    assert_eq!(result.format, OutputFormat::Tree);
    assert_eq!(
        tree(&result.payload).content[0].content,
        vec![Node::text("see docs for more")]
    );
    assert_eq!(router.metrics().fallback_counts.flat, 0);
}

#[test]
fn test_panicking_plugin_keeps_source_text() {
    init_tracing();
    let router = FormatRouter::builder(&Config::default())
        .with_registry(Registry::builtin().with_inline(Exploding))
        .build();

    let result = router.convert("a BOOM :status[ok] b", CLOUD, None);

    assert_eq!(result.format, OutputFormat::Tree);
    let kinds: Vec<_> = tree(&result.payload).content[0]
        .content
        .iter()
        .map(|node| node.kind)
        .collect();
    assert_eq!(kinds, [NodeKind::Text, NodeKind::Status, NodeKind::Text]);
    assert_eq!(tree(&result.payload).content[0].content[0], Node::text("a BOOM "));
    let metrics = router.metrics();
    assert_eq!(metrics.fallback_counts.flat, 0);
    assert_eq!(metrics.last_error, None);

    let flat = router.convert("a BOOM b", SERVER, None);
    assert_eq!(flat.payload, Payload::Flat("a BOOM b".to_owned()));
}

#[test]
fn test_misaligned_plugin_span_is_ignored() {
    init_tracing();
    let router = FormatRouter::builder(&Config::default())
        .with_registry(Registry::empty().with_inline(OffByOne))
        .build();

    let result = router.convert("é plain", CLOUD, None);
    assert_eq!(result.format, OutputFormat::Tree);
    assert_eq!(
        tree(&result.payload).content[0].content,
        vec![Node::text("é plain")]
    );

    let flat = router.convert("é plain", SERVER, None);
    assert_eq!(flat.payload, Payload::Flat("é plain".to_owned()));
}

#[test]
fn test_invalid_tree_falls_back_to_flat() {
    init_tracing();
    let router = FormatRouter::builder(&Config::default())
        .with_registry(Registry::empty().with_inline(BareStatus))
        .build();

    let result = router.convert("oops !!", CLOUD, None);

    assert_eq!(result.format, OutputFormat::Flat);
    assert_eq!(result.payload, Payload::Flat("oops !!".to_owned()));
    let metrics = router.metrics();
    assert_eq!(metrics.fallback_counts.flat, 1);
    let last_error = metrics.last_error.unwrap_or_default();
    assert!(
        last_error.starts_with("schema validation failed"),
        "{last_error}"
    );
}

#[test]
fn test_many_unterminated_blocks_and_emoji() {
    let router = router();
    let started = Instant::now();

    let openers = ":::panel\n".repeat(20_000);
    let result = router.convert(&openers, CLOUD, None);
    assert_eq!(result.format, OutputFormat::Tree);
    assert_eq!(tree(&result.payload).content.len(), 20_000);

    let emoji = ":rocket: ".repeat(20_000);
    let result = router.convert(&emoji, CLOUD, None);
    assert_eq!(result.format, OutputFormat::Tree);
    assert_eq!(tree(&result.payload).count(NodeKind::Emoji), 20_000);

    assert!(
        started.elapsed() < Duration::from_secs(30),
        "took {:?}",
        started.elapsed()
    );
}

#[test]
fn test_deployment_cache_is_bounded() {
    init_tracing();
    let mut config = Config::default();
    config.deployment.capacity = 4;
    let router = FormatRouter::new(&config);

    for i in 0..20 {
        router.classify(&format!("https://tenant{i}.atlassian.net"));
    }

    assert_eq!(router.deployments().len(), 4);
    assert_eq!(router.deployments().capacity(), 4);
}

#[test]
fn test_marks_survive_conversion() {
    let result = router().convert("**bold** and *italic*", CLOUD, None);
    let doc = tree(&result.payload);

    assert_eq!(
        doc.content,
        vec![Node::paragraph(vec![
            Node::marked_text("bold", vec![Mark::Strong]),
            Node::text(" and "),
            Node::marked_text("italic", vec![Mark::Em]),
        ])]
    );
}

#[test]
fn test_large_table_truncated() {
    let mut text = String::from("| name | value |\n|---|---|\n");
    for i in 0..60 {
        text.push_str(&format!("| row{i} | {i} |\n"));
    }

    let result = router().convert(&text, CLOUD, None);
    let doc = tree(&result.payload);

    assert_eq!(doc.count(NodeKind::TableRow), 50);
    let notice = doc.content.last().expect("notice paragraph");
    assert_eq!(notice.kind, NodeKind::Paragraph);
    assert!(notice.plain_text().contains("11 more table rows"));
}

#[test]
fn test_deep_list_flattened() {
    let mut text = String::new();
    for level in 0..12 {
        text.push_str(&"  ".repeat(level));
        text.push_str(&format!("- level{level}\n"));
    }

    let result = router().convert(&text, CLOUD, None);
    let doc = tree(&result.payload);

    assert_eq!(list_depth(doc), 10);
    assert!(doc.plain_text().contains(&format!("{FLATTENED_MARKER}level11")));
}

#[test]
fn test_invalid_panel_type_still_renders() {
    let result = router().convert(":::panel type=danger\nCareful\n:::\n", CLOUD, None);

    assert_eq!(result.format, OutputFormat::Tree);
    let panel = &tree(&result.payload).content[0];
    assert_eq!(panel.kind, NodeKind::Panel);
    assert_eq!(panel.attr_str("panelType"), Some("info"));
}

#[test]
fn test_tree_failure_falls_back_to_flat() {
    init_tracing();
    let router = FormatRouter::builder(&Config::default())
        .with_tree_pipeline(Failing(OutputFormat::Tree))
        .build();

    let result = router.convert("## Notes", CLOUD, None);

    assert_eq!(result.format, OutputFormat::Flat);
    assert_eq!(result.payload, Payload::Flat("h2. Notes".to_owned()));
    assert_eq!(result.deployment_kind, DeploymentKind::Cloud);
    let metrics = router.metrics();
    assert_eq!(metrics.fallback_counts.flat, 1);
    assert_eq!(metrics.fallback_counts.plain_text, 0);
    assert_eq!(metrics.last_error.as_deref(), Some("tree tier offline"));
}

#[test]
fn test_total_failure_returns_input() {
    init_tracing();
    let router = FormatRouter::builder(&Config::default())
        .with_tree_pipeline(Failing(OutputFormat::Tree))
        .with_flat_pipeline(Failing(OutputFormat::Flat))
        .build();
    let text = "**raw** _input_\n\n| kept |";

    let result = router.convert(text, CLOUD, None);

    assert_eq!(result.format, OutputFormat::Flat);
    assert_eq!(result.payload, Payload::Flat(text.to_owned()));
    let counts = router.metrics().fallback_counts;
    assert_eq!((counts.flat, counts.plain_text), (1, 1));
}

#[test]
fn test_classification_cached_per_url() {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = FormatRouter::builder(&Config::default())
        .with_classifier(CountingClassifier {
            inner: UrlPatternClassifier::default(),
            calls: Arc::clone(&calls),
        })
        .build();

    router.convert("one", CLOUD, None);
    router.convert("two", CLOUD, None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    router.convert("one", SERVER, None);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(router.deployments().len(), 2);
}

#[test]
fn test_expired_classification_is_recomputed() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut config = Config::default();
    config.deployment.ttl_secs = 0;
    let router = FormatRouter::builder(&config)
        .with_classifier(CountingClassifier {
            inner: UrlPatternClassifier::default(),
            calls: Arc::clone(&calls),
        })
        .build();

    router.classify(CLOUD);
    router.classify(CLOUD);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_concurrent_conversions() {
    let router = router();
    let inputs: Vec<String> = (0..8).map(|i| format!("# Doc {i}\n\n**item** {i}")).collect();
    let urls = [CLOUD, SERVER];

    let results: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|t| {
                let router = &router;
                let inputs = &inputs;
                s.spawn(move || {
                    (0..50)
                        .map(|n| {
                            let text = &inputs[(t + n) % inputs.len()];
                            let url = urls[n % urls.len()];
                            (text.clone(), url, router.convert(text, url, None))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("worker panicked"))
            .collect()
    });

    let distinct: HashSet<_> = results.iter().map(|(text, url, _)| (text, *url)).collect();
    assert_eq!(router.cache().len(), distinct.len());
    assert_eq!(router.cache().stats().misses, distinct.len() as u64);

    let fresh = FormatRouter::new(&Config::default());
    for (text, url, result) in &results {
        assert_eq!(result, &fresh.convert(text, url, None));
    }
    assert_eq!(router.metrics().conversions, results.len() as u64);
}

#[test]
fn test_force_format_rollout() {
    let mut config = Config::default();
    config.rollout.force_format = Some(Format::Tree);
    let router = FormatRouter::new(&config);

    let server = router.convert("text", SERVER, None);
    assert_eq!(server.format, OutputFormat::Tree);
    assert!(server.rollout_applied);

    // Forcing the format a deployment already gets is not a rollout
    let cloud = router.convert("text", CLOUD, None);
    assert_eq!(cloud.format, OutputFormat::Tree);
    assert!(!cloud.rollout_applied);

    let overridden = router.convert("text", SERVER, Some(OutputFormat::Flat));
    assert_eq!(overridden.format, OutputFormat::Flat);
    assert!(!overridden.rollout_applied);
}

#[test]
fn test_host_rollout() {
    let mut config = Config::default();
    config
        .rollout
        .hosts
        .insert("acme.atlassian.net".to_owned(), Format::Flat);
    let router = FormatRouter::new(&config);

    let pinned = router.convert("text", CLOUD, None);
    assert_eq!(pinned.format, OutputFormat::Flat);
    assert!(pinned.rollout_applied);

    let other = router.convert("text", "https://other.atlassian.net", None);
    assert_eq!(other.format, OutputFormat::Tree);
    assert!(!other.rollout_applied);
}

#[test]
fn test_percentage_rollout() {
    let hosts: Vec<String> = (0..40).map(|i| format!("wiki{i}.corp.example")).collect();

    for percent in [0, 30, 100] {
        let mut config = Config::default();
        config.rollout.server_tree_percent = percent;
        let router = FormatRouter::new(&config);

        for host in &hosts {
            let result = router.convert("text", &format!("https://{host}"), None);
            let enrolled = rollout_bucket(host) < percent;
            assert_eq!(result.rollout_applied, enrolled, "{host} at {percent}%");
            let expected = if enrolled {
                OutputFormat::Tree
            } else {
                OutputFormat::Flat
            };
            assert_eq!(result.format, expected, "{host} at {percent}%");
        }

        // Cloud hosts never take part in the server rollout
        assert!(!router.convert("text", CLOUD, None).rollout_applied);
    }
}

#[test]
fn test_invalid_utf8_rejected() {
    let router = router();

    let err = router.convert_bytes(&[b'o', b'k', 0xff, 0xfe], CLOUD, None).unwrap_err();

    assert!(matches!(err, ConvertError::InvalidUtf8(_)));
    assert!(router.cache().is_empty());
    let metrics = router.metrics();
    assert_eq!(metrics.failures, 1);
    assert_eq!(metrics.conversions, 0);
    assert_eq!(metrics.last_error.as_deref(), Some("input is not valid UTF-8"));

    let ok = router.convert_bytes("# Fine".as_bytes(), SERVER, None).unwrap();
    assert_eq!(ok.payload, Payload::Flat("h1. Fine".to_owned()));
}

#[test]
fn test_result_and_metrics_json() {
    let router = router();
    let result = router.convert("hi", CLOUD, None);

    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        json!({
            "format": "tree",
            "payload": {
                "type": "doc",
                "version": 1,
                "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "hi"}]}
                ]
            },
            "deploymentKind": "cloud",
            "rolloutApplied": false
        })
    );

    let metrics = serde_json::to_value(router.metrics()).unwrap();
    assert_eq!(metrics["conversions"], json!(1));
    assert_eq!(metrics["fallbackCounts"], json!({"flat": 0, "plainText": 0}));
    assert_eq!(metrics["lastError"], json!(null));

    router.reset_metrics();
    assert_eq!(router.metrics().conversions, 0);
}
