use chrono::{Local, TimeZone};
use serde_json::{json, Value};
use std::sync::Arc;
use vizgen::{
    Artifact, ArtifactMeta, EntryKind, JsonFileRegistry, Persister, RegistryEntry, RegistryStore,
};

const CURATED: &str = r#"{
  "version": 2,
  "concepts": [
    {
      "id": "laplace_expansion",
      "title": "拉普拉斯展开",
      "aliases": ["行列式展开"],
      "module": "laplace",
      "url": "app/modules/laplace/index.html",
      "type": "curated",
      "thumbnail": "laplace.png"
    },
    {
      "id": "bare_entry"
    }
  ]
}"#;

#[tokio::test]
async fn curated_registry_round_trips_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(&path, CURATED).unwrap();
    let store = JsonFileRegistry::new(&path);

    let registry = store.load().await;
    assert_eq!(registry.concepts.len(), 2);
    assert_eq!(
        registry.get("laplace_expansion").unwrap().kind,
        Some(EntryKind::Curated)
    );
    store.save(&registry).await.unwrap();

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let original: Value = serde_json::from_str(CURATED).unwrap();
    assert_eq!(written, original);
    assert!(std::fs::read_to_string(&path).unwrap().contains("拉普拉斯展开"));
}

#[tokio::test]
async fn missing_or_malformed_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    let store = JsonFileRegistry::new(&path);
    assert!(store.load().await.concepts.is_empty());

    std::fs::write(&path, "{ not json").unwrap();
    assert!(store.load().await.concepts.is_empty());

    store
        .upsert(RegistryEntry::new("normal_distribution").with_title("标准正态分布"))
        .await
        .unwrap();
    assert_eq!(store.load().await.concepts.len(), 1);
}

#[tokio::test]
async fn upsert_replaces_by_id_and_keeps_other_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(&path, CURATED).unwrap();
    let store = JsonFileRegistry::new(&path);

    store
        .upsert(
            RegistryEntry::new("laplace_expansion")
                .with_url("app/modules/ai_visualizer/generated/viz_laplace_expansion_20240101_000000.html"),
        )
        .await
        .unwrap();

    let registry = store.load().await;
    assert_eq!(registry.concepts.len(), 2);
    let entry = registry.get("laplace_expansion").unwrap();
    assert_eq!(
        entry.url.as_deref(),
        Some("app/modules/ai_visualizer/generated/viz_laplace_expansion_20240101_000000.html")
    );
    assert_eq!(entry.title(), "拉普拉斯展开");
    assert_eq!(entry.extra["thumbnail"], json!("laplace.png"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_upserts_are_all_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileRegistry::new(dir.path().join("registry.json")).with_max_attempts(50));

    let tasks = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .upsert(RegistryEntry::new(format!("concept_{i}")).with_title(format!("Concept {i}")))
                    .await
            })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let registry = store.load().await;
    assert_eq!(registry.concepts.len(), 16);
    for i in 0..16 {
        assert!(registry.get(&format!("concept_{i}")).is_some());
    }
}

#[tokio::test]
async fn persister_suffixes_same_second_collisions() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileRegistry::new(dir.path().join("registry.json")));
    let persister = Persister::new(
        dir.path().join("generated"),
        "app/modules/ai_visualizer/generated/",
        "ai_visualizer",
        store.clone(),
    );
    let at = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let first = Artifact::new("<html>one</html>", "Normal Distribution").with_created_at(at);
    let second = Artifact::new("<html>two</html>", "Normal Distribution").with_created_at(at);
    let meta = |prompt: &str| ArtifactMeta {
        id: "normal_distribution".to_string(),
        title: "标准正态分布".to_string(),
        prompt: prompt.to_string(),
    };

    let a = persister.persist(&first, meta("正态分布")).await.unwrap();
    let b = persister.persist(&second, meta("高斯分布")).await.unwrap();

    assert_eq!(
        a.url,
        "app/modules/ai_visualizer/generated/viz_normal_distribution_20240501_120000.html"
    );
    assert_eq!(
        b.url,
        "app/modules/ai_visualizer/generated/viz_normal_distribution_20240501_120000_2.html"
    );
    let generated = dir.path().join("generated");
    assert_eq!(
        std::fs::read_to_string(generated.join("viz_normal_distribution_20240501_120000.html"))
            .unwrap(),
        "<html>one</html>"
    );
    assert_eq!(
        std::fs::read_to_string(generated.join("viz_normal_distribution_20240501_120000_2.html"))
            .unwrap(),
        "<html>two</html>"
    );

    assert_eq!(b.aliases, ["正态分布", "高斯分布"]);
    let registry = store.load().await;
    assert_eq!(registry.concepts.len(), 1);
    let entry = registry.get("normal_distribution").unwrap();
    assert_eq!(entry.url.as_deref(), Some(b.url.as_str()));
    assert_eq!(entry.kind, Some(EntryKind::Generated));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_persists_of_one_concept_keep_every_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonFileRegistry::new(dir.path().join("registry.json")).with_max_attempts(50));
    let persister = Persister::new(dir.path().join("generated"), "", "ai_visualizer", store.clone());
    let at = Local.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

    let tasks = (0..12)
        .map(|i| {
            let persister = persister.clone();
            tokio::spawn(async move {
                let artifact =
                    Artifact::new(format!("<html>{i}</html>"), "Poisson").with_created_at(at);
                let meta = ArtifactMeta {
                    id: "poisson_distribution".to_string(),
                    title: "泊松分布".to_string(),
                    prompt: format!("poisson prompt {i}"),
                };
                persister.persist(&artifact, meta).await
            })
        })
        .collect::<Vec<_>>();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let registry = store.load().await;
    assert_eq!(registry.concepts.len(), 1);
    let mut aliases = registry.get("poisson_distribution").unwrap().aliases().to_vec();
    aliases.sort();
    let mut expected = (0..12).map(|i| format!("poisson prompt {i}")).collect::<Vec<_>>();
    expected.sort();
    assert_eq!(aliases, expected);
}

#[tokio::test]
async fn upsert_with_sees_the_current_entry() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileRegistry::new(dir.path().join("registry.json"));
    store
        .upsert(RegistryEntry::new("a").with_title("A").with_aliases(["first"]))
        .await
        .unwrap();

    let stored = store
        .upsert_with("a", &|existing| {
            let mut aliases = existing.unwrap().aliases().to_vec();
            aliases.push("second".to_string());
            RegistryEntry::new("ignored").with_aliases(aliases)
        })
        .await
        .unwrap();

    assert_eq!(stored.id, "a");
    assert_eq!(stored.title(), "A");
    assert_eq!(stored.aliases(), ["first", "second"]);
    assert_eq!(store.load().await.get("a"), Some(&stored));
}
