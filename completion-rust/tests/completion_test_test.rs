use viz_completion::{
    completion_test::{MockGenerateResult, MockLanguageModel},
    LanguageModel, LanguageModelError, LanguageModelInput, ModelResponse, Part,
};

#[tokio::test]
async fn replays_replies_in_order_and_records_inputs() {
    let model = MockLanguageModel::new().with_model_id("scripted");
    model
        .enqueue_generate(ModelResponse::from_text("first"))
        .enqueue_generate(LanguageModelError::Refusal("no".to_string()))
        .enqueue_generate(MockGenerateResult::text("third"));

    let first = model
        .generate(LanguageModelInput::single_turn("system", "one"))
        .await
        .unwrap();
    assert_eq!(first.content, vec![Part::text("first")]);

    let err = model
        .generate(LanguageModelInput::single_turn("system", "two"))
        .await
        .unwrap_err();
    assert!(matches!(err, LanguageModelError::Refusal(reason) if reason == "no"));

    let third = model
        .generate(LanguageModelInput::single_turn("system", "three"))
        .await
        .unwrap();
    assert_eq!(third.text(), "third");

    assert_eq!(model.model_id(), "scripted");
    assert_eq!(model.tracked_generate_inputs().len(), 3);
    assert_eq!(
        model.last_input().and_then(|input| input.system_prompt),
        Some("system".to_string())
    );
    assert_eq!(model.pending_results(), 0);
}

#[tokio::test]
async fn exhausted_script_is_an_invariant_error() {
    let model = MockLanguageModel::default();

    let err = model
        .generate(LanguageModelInput::default())
        .await
        .unwrap_err();

    assert!(matches!(err, LanguageModelError::Invariant("mock", _)));
    assert_eq!(model.tracked_generate_inputs().len(), 1);
}
