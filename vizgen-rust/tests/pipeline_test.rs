use std::{path::Path, sync::Arc};
use viz_completion::{
    completion_test::{MockGenerateResult, MockLanguageModel},
    LanguageModelError, ModelResponse,
};
use vizgen::{
    EntryKind, JsonFileRegistry, Registry, RegistryEntry, RegistryStore, ResolveKind,
    ResolveRequest, ResolveResponse, ResolveSource, SynthesisMode, ValidationError, Visualizer,
    VisualizerParams, VizError,
};

fn store(dir: &Path) -> Arc<JsonFileRegistry> {
    Arc::new(JsonFileRegistry::new(dir.join("registry").join("registry.json")))
}

fn params(dir: &Path) -> VisualizerParams {
    VisualizerParams::new(store(dir))
        .output_dir(dir.join("generated"))
        .url_prefix("app/modules/ai_visualizer/generated")
}

fn generated_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir.join("generated")) else {
        return Vec::new();
    };
    let mut names = entries
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    names.sort();
    names
}

fn registry_bytes(dir: &Path) -> Option<Vec<u8>> {
    std::fs::read(dir.join("registry").join("registry.json")).ok()
}

#[tokio::test]
async fn normal_distribution_prompt_without_model_generates_then_hits() {
    let dir = tempfile::tempdir().unwrap();
    let visualizer = params(dir.path()).build().unwrap();

    let response = visualizer
        .resolve_or_generate(ResolveRequest::new("正态分布 mu=0 sigma=2"))
        .await
        .unwrap();
    assert_eq!(response.kind, ResolveKind::Generated);
    assert_eq!(response.source, ResolveSource::Generator);
    assert!(response
        .url
        .starts_with("app/modules/ai_visualizer/generated/viz_normal_distribution_"));
    assert!(response.url.ends_with(".html"));

    let files = generated_files(dir.path());
    assert_eq!(files.len(), 1);
    let markup = std::fs::read_to_string(dir.path().join("generated").join(&files[0])).unwrap();
    assert!(markup.contains("<title>标准正态分布</title>"));
    assert!(markup.contains("Plotly.newPlot("));

    let registry = store(dir.path()).load().await;
    let entry = registry.get("normal_distribution").unwrap();
    assert_eq!(entry.title(), "标准正态分布");
    assert_eq!(entry.aliases(), ["正态分布 mu=0 sigma=2".to_string()]);
    assert_eq!(entry.kind, Some(EntryKind::Generated));
    assert_eq!(entry.module.as_deref(), Some("ai_visualizer"));
    assert_eq!(entry.url.as_deref(), Some(response.url.as_str()));

    let before = registry_bytes(dir.path());
    let hit = visualizer
        .resolve_or_generate(ResolveRequest::new("  正态分布 MU=0 sigma=2 "))
        .await
        .unwrap();
    assert_eq!(
        hit,
        ResolveResponse {
            kind: ResolveKind::Existing,
            url: response.url.clone(),
            source: ResolveSource::Registry,
        }
    );
    assert_eq!(registry_bytes(dir.path()), before);
    assert_eq!(generated_files(dir.path()).len(), 1);
}

#[tokio::test]
async fn repeated_hits_on_curated_entry_do_not_touch_registry() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let mut registry = Registry::default();
    registry.upsert(
        RegistryEntry::new("laplace_expansion")
            .with_title("拉普拉斯展开")
            .with_aliases(["行列式展开", "laplace expansion"])
            .with_url("app/modules/laplace/index.html")
            .with_kind(EntryKind::Curated),
    );
    store.save(&registry).await.unwrap();
    let before = registry_bytes(dir.path());

    let visualizer = params(dir.path()).build().unwrap();
    for prompt in ["Laplace Expansion demo", "行列式展开", "拉普拉斯展开 可视化"] {
        let response = visualizer
            .resolve_or_generate(ResolveRequest::new(prompt))
            .await
            .unwrap();
        assert_eq!(response.kind, ResolveKind::Existing, "{prompt}");
        assert_eq!(response.url, "app/modules/laplace/index.html");
    }
    assert_eq!(registry_bytes(dir.path()), before);
    assert!(generated_files(dir.path()).is_empty());
}

#[tokio::test]
async fn disallowed_chart_type_is_rejected_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(MockGenerateResult::text(
        r#"{"concept":"normal_distribution","chart_type":"pie3d","library":"plotly","params":{},"title":"Pie"}"#,
    ));
    let visualizer = params(dir.path()).model(model.clone()).build().unwrap();

    let err = visualizer
        .resolve_or_generate(ResolveRequest::new("a 3d pie of something"))
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    assert!(matches!(
        err,
        VizError::Validation(ValidationError::NotAllowed { field: "chart_type", ref value }) if value == "pie3d"
    ));
    assert!(generated_files(dir.path()).is_empty());
    assert_eq!(registry_bytes(dir.path()), None);
}

#[tokio::test]
async fn oversized_poisson_rate_is_a_client_error() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(MockGenerateResult::text(
        r#"{"concept":"poisson_distribution","chart_type":"pmf","library":"plotly","params":{"lambda":1e20},"title":"P"}"#,
    ));
    let visualizer = params(dir.path()).model(model.clone()).build().unwrap();

    let err = visualizer
        .resolve_or_generate(ResolveRequest::new("poisson with a huge rate"))
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    assert!(matches!(
        err,
        VizError::Validation(ValidationError::InvalidParam { ref name, .. }) if name == "lambda"
    ));
    assert!(generated_files(dir.path()).is_empty());
    assert_eq!(registry_bytes(dir.path()), None);
}

#[tokio::test]
async fn completion_spec_with_hints_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(ModelResponse::from_text(
        "Sure!\n{\"concept\":\"binomial_distribution\",\"chart_type\":\"bar\",\"library\":\"plotly\",\"params\":{\"n\":10,\"p\":0.3},\"title\":\"抛硬币十次\"}\n",
    ));
    let visualizer = params(dir.path())
        .model(model.clone())
        .temperature(0.2)
        .build()
        .unwrap();

    let response = visualizer
        .resolve_or_generate(ResolveRequest {
            prompt: "抛十次硬币正面次数".to_string(),
            viz_type: Some("bar".to_string()),
            complexity: Some("自动".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(response.kind, ResolveKind::Generated);

    let inputs = model.tracked_generate_inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].temperature, Some(0.2));
    let sent = serde_json::to_string(&inputs[0].messages).unwrap();
    assert!(sent.contains("抛十次硬币正面次数"));
    assert!(sent.contains("bar"));
    assert!(!sent.contains("自动"));

    let registry = store(dir.path()).load().await;
    assert_eq!(registry.get("binomial_distribution").unwrap().title(), "抛硬币十次");
}

#[tokio::test]
async fn failing_completion_falls_back_to_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(MockGenerateResult::error(
        LanguageModelError::MissingCredentials("OPENAI_API_KEY"),
    ));
    let visualizer = params(dir.path()).model(model.clone()).build().unwrap();

    let response = visualizer
        .resolve_or_generate(ResolveRequest::new("泊松分布的直观演示"))
        .await
        .unwrap();
    assert_eq!(response.kind, ResolveKind::Generated);
    assert_eq!(model.pending_results(), 0);

    let registry = store(dir.path()).load().await;
    assert_eq!(registry.get("poisson_distribution").unwrap().title(), "泊松分布 PMF");
}

#[tokio::test]
async fn unextractable_prompt_reports_every_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let model = Arc::new(MockLanguageModel::new());
    model.enqueue_generate(MockGenerateResult::text("I cannot help with that."));
    let visualizer = params(dir.path()).model(model).build().unwrap();

    let err = visualizer
        .resolve_or_generate(ResolveRequest::new("draw me a cat please"))
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    let message = err.to_string();
    assert!(message.contains("completion"), "{message}");
    assert!(message.contains("keyword"), "{message}");
    assert_eq!(registry_bytes(dir.path()), None);
}

#[tokio::test]
async fn short_prompts_are_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let visualizer = params(dir.path()).build().unwrap();
    let err = visualizer
        .resolve_or_generate(ResolveRequest::new("  正态 "))
        .await
        .unwrap_err();
    assert!(matches!(err, VizError::InvalidRequest(_)));
    assert!(err.is_client_error());
}

#[tokio::test]
async fn program_mode_persists_executed_figure() {
    let dir = tempfile::tempdir().unwrap();
    let visualizer: Visualizer = params(dir.path())
        .synthesis_mode(SynthesisMode::Program)
        .build()
        .unwrap();

    let response = visualizer
        .resolve_or_generate(ResolveRequest::new("uniform distribution on [0, 1]"))
        .await
        .unwrap();
    assert!(response.url.contains("viz_uniform_distribution_"));

    let files = generated_files(dir.path());
    assert_eq!(files.len(), 1);
    let markup = std::fs::read_to_string(dir.path().join("generated").join(&files[0])).unwrap();
    assert!(markup.contains("Fallback Line Chart"));
}

#[tokio::test]
async fn query_filters_by_title_and_alias() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(dir.path());
    let mut registry = Registry::default();
    registry.upsert(RegistryEntry::new("a").with_title("Normal PDF").with_aliases(["高斯"]));
    registry.upsert(RegistryEntry::new("b").with_title("Poisson PMF"));
    store.save(&registry).await.unwrap();

    let visualizer = params(dir.path()).build().unwrap();
    let ids = |entries: Vec<RegistryEntry>| entries.into_iter().map(|e| e.id).collect::<Vec<_>>();
    assert_eq!(ids(visualizer.query(Some("normal pdf")).await), ["a"]);
    assert_eq!(ids(visualizer.query(Some("高斯")).await), ["a"]);
    assert_eq!(ids(visualizer.query(None).await), ["a", "b"]);
}
