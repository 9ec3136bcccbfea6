//! End-to-end turns through the retrieval loop with scripted ports.

use futures::StreamExt;
use ragloop_agent::testing::{
    knowledge_snippets, ScriptedClassifier, ScriptedGenerator, StaticRetriever, StaticWebSearcher,
};
use ragloop_agent::{
    Evidence, GenerationChunk, GenerationTask, Message, Node, RagLoop, TaskKind, TurnEvent,
    TurnOutcome,
};
use ragloop_core::{AppError, ErrorKind, LoopConfig};
use std::sync::Arc;

struct Harness {
    classifier: Arc<ScriptedClassifier>,
    generator: Arc<ScriptedGenerator>,
    knowledge: Arc<StaticRetriever>,
    web: Arc<StaticWebSearcher>,
    rag: RagLoop,
}

fn harness(
    classifier: ScriptedClassifier,
    generator: ScriptedGenerator,
    knowledge: StaticRetriever,
    web: StaticWebSearcher,
) -> Harness {
    let classifier = Arc::new(classifier);
    let generator = Arc::new(generator);
    let knowledge = Arc::new(knowledge);
    let web = Arc::new(web);
    let rag = RagLoop::new(
        classifier.clone(),
        generator.clone(),
        knowledge.clone(),
        web.clone(),
    );

    Harness {
        classifier,
        generator,
        knowledge,
        web,
        rag,
    }
}

fn happy_classifier() -> ScriptedClassifier {
    ScriptedClassifier::new()
        .always(TaskKind::Route, "vectorstore")
        .always(TaskKind::GradeDocument, "yes")
        .always(TaskKind::GradeGroundedness, "yes")
        .always(TaskKind::GradeUsefulness, "yes")
}

/// Transitions seen and the turn's error, if any.
async fn run(rag: &RagLoop, question: &str) -> (Vec<Node>, Option<AppError>) {
    let mut stream = rag.run_turn(question, vec![]);
    let mut nodes = vec![Node::Start];

    while let Some(event) = stream.next().await {
        match event {
            Ok(TurnEvent::StateTransition { to, .. }) => nodes.push(to),
            Ok(_) => {}
            Err(e) => return (nodes, Some(e)),
        }
    }
    (nodes, None)
}

#[tokio::test]
async fn test_blank_question_rejected_before_routing() {
    let h = harness(
        happy_classifier(),
        ScriptedGenerator::new().answers(["unused"]),
        StaticRetriever::new(knowledge_snippets(3)),
        StaticWebSearcher::new(vec![]),
    );

    for question in ["", "   ", "\n\t"] {
        let (nodes, error) = run(&h.rag, question).await;
        assert_eq!(nodes, vec![Node::Start]);
        assert_eq!(error.unwrap().kind(), ErrorKind::Validation);
    }

    assert_eq!(h.classifier.total_calls(), 0);
    assert!(h.generator.calls().is_empty());
    assert!(h.knowledge.calls().is_empty());
    assert!(h.web.calls().is_empty());
}

#[tokio::test]
async fn test_knowledge_question_uses_relevant_snippets_in_order() {
    let relevant = [1, 4, 7, 9];
    let labels: Vec<&str> = (0..15)
        .map(|i| if relevant.contains(&i) { "yes" } else { "no" })
        .collect();

    let h = harness(
        ScriptedClassifier::new()
            .always(TaskKind::Route, "vectorstore")
            .script(TaskKind::GradeDocument, labels)
            .always(TaskKind::GradeGroundedness, "yes")
            .always(TaskKind::GradeUsefulness, "yes"),
        ScriptedGenerator::new().answers(["Prompt engineering steers model behaviour."]),
        StaticRetriever::new(knowledge_snippets(20)),
        StaticWebSearcher::new(vec![]),
    );

    let outcome = TurnOutcome::collect(h.rag.run_turn("What is prompt engineering?", vec![]))
        .await
        .unwrap();

    assert_eq!(
        outcome.trace,
        vec![
            Node::Start,
            Node::Route,
            Node::Retrieve,
            Node::GradeDocs,
            Node::Generate,
            Node::GradeGen,
            Node::Done
        ]
    );
    assert_eq!(outcome.response, "Prompt engineering steers model behaviour.");
    assert_eq!(outcome.rewrites, 0);
    assert_eq!(outcome.regenerations, 0);

    assert_eq!(
        h.knowledge.calls(),
        vec![("What is prompt engineering?".to_string(), 15)]
    );
    assert_eq!(h.classifier.calls(TaskKind::GradeDocument).len(), 15);

    let generation = &h.generator.calls()[0];
    assert_eq!(generation.task, GenerationTask::Answer);
    assert_eq!(
        generation.variable("documents"),
        "snippet 1\n\n---\n\nsnippet 4\n\n---\n\nsnippet 7\n\n---\n\nsnippet 9"
    );

    let groundedness = h.classifier.calls(TaskKind::GradeGroundedness);
    assert_eq!(groundedness[0]["documents"], generation.variable("documents"));
    assert!(h.web.calls().is_empty());
}

#[tokio::test]
async fn test_web_question_skips_document_grading() {
    let h = harness(
        happy_classifier().always(TaskKind::Route, "web_search"),
        ScriptedGenerator::new().answers(["Rust 1.80 was released in July 2024."]),
        StaticRetriever::new(knowledge_snippets(5)),
        StaticWebSearcher::new(vec![Evidence::web(
            "Rust 1.80 shipped LazyLock.\nReleased July 25, 2024.",
        )]),
    );

    let outcome = TurnOutcome::collect(h.rag.run_turn("Latest Rust release?", vec![]))
        .await
        .unwrap();

    assert_eq!(
        outcome.trace,
        vec![
            Node::Start,
            Node::Route,
            Node::WebSearch,
            Node::Generate,
            Node::GradeGen,
            Node::Done
        ]
    );
    assert_eq!(h.web.calls(), vec![("Latest Rust release?".to_string(), 3)]);
    assert!(h.knowledge.calls().is_empty());
    assert!(h.classifier.calls(TaskKind::GradeDocument).is_empty());
    assert!(h.generator.calls()[0]
        .variable("documents")
        .contains("LazyLock"));
}

#[tokio::test]
async fn test_empty_web_results_still_generate() {
    let h = harness(
        happy_classifier().always(TaskKind::Route, "web_search"),
        ScriptedGenerator::new(),
        StaticRetriever::new(vec![]),
        StaticWebSearcher::new(vec![]),
    );

    let (nodes, error) = run(&h.rag, "Anything new?").await;
    assert!(error.is_none());
    assert_eq!(nodes[2], Node::WebSearch);
    assert_eq!(nodes[3], Node::Generate);
}

#[tokio::test]
async fn test_rewrite_recovers_from_irrelevant_evidence() {
    let h = harness(
        happy_classifier().script(TaskKind::GradeDocument, ["no", "no", "no"]),
        ScriptedGenerator::new()
            .rewrites(["What is prompt engineering for language models?"])
            .answers(["It is the craft of instructing models."]),
        StaticRetriever::new(knowledge_snippets(3)),
        StaticWebSearcher::new(vec![]),
    );

    let outcome = TurnOutcome::collect(h.rag.run_turn("prompting?", vec![]))
        .await
        .unwrap();

    assert_eq!(outcome.rewrites, 1);
    assert_eq!(outcome.visits(Node::Rewrite), 1);
    assert_eq!(outcome.visits(Node::Retrieve), 2);

    let queries: Vec<String> = h.knowledge.calls().into_iter().map(|(q, _)| q).collect();
    assert_eq!(
        queries,
        vec![
            "prompting?".to_string(),
            "What is prompt engineering for language models?".to_string()
        ]
    );

    let answer_calls: Vec<_> = h
        .generator
        .calls()
        .into_iter()
        .filter(|c| c.task == GenerationTask::Answer)
        .collect();
    assert_eq!(
        answer_calls[0].variable("question"),
        "What is prompt engineering for language models?"
    );

    // the conversation keeps what the user actually asked
    assert_eq!(outcome.history[0], Message::user("prompting?"));
    assert!(h.web.calls().is_empty());
}

#[tokio::test]
async fn test_empty_evidence_exhausts_rewrites() {
    let h = harness(
        happy_classifier().always(TaskKind::GradeDocument, "no"),
        ScriptedGenerator::new(),
        StaticRetriever::new(knowledge_snippets(3)),
        StaticWebSearcher::new(vec![]),
    );

    let (nodes, error) = run(&h.rag, "unanswerable").await;

    assert!(matches!(
        error,
        Some(AppError::EmptyEvidenceExhausted { attempts: 3 })
    ));
    assert_eq!(nodes.iter().filter(|n| **n == Node::Rewrite).count(), 3);
    assert_eq!(nodes.iter().filter(|n| **n == Node::Retrieve).count(), 4);
    assert!(!nodes.contains(&Node::Generate));
    assert_eq!(h.generator.calls_for(GenerationTask::Rewrite), 3);
    assert_eq!(h.generator.calls_for(GenerationTask::Answer), 0);
    assert!(h.web.calls().is_empty());
}

#[tokio::test]
async fn test_ungrounded_generation_exhausts_regenerations() {
    let h = harness(
        happy_classifier().always(TaskKind::GradeGroundedness, "no"),
        ScriptedGenerator::new(),
        StaticRetriever::new(knowledge_snippets(2)),
        StaticWebSearcher::new(vec![]),
    );

    let (nodes, error) = run(&h.rag, "q").await;

    assert!(matches!(
        error,
        Some(AppError::UngroundedRegenerationExhausted { attempts: 3 })
    ));
    assert_eq!(h.generator.calls_for(GenerationTask::Answer), 4);
    assert_eq!(nodes.iter().filter(|n| **n == Node::GradeGen).count(), 4);
    assert!(h.classifier.calls(TaskKind::GradeUsefulness).is_empty());
    assert!(!nodes.contains(&Node::Rewrite));
}

#[tokio::test]
async fn test_unhelpful_answers_exhaust_rewrites() {
    let h = harness(
        happy_classifier().always(TaskKind::GradeUsefulness, "no"),
        ScriptedGenerator::new(),
        StaticRetriever::new(knowledge_snippets(2)),
        StaticWebSearcher::new(vec![]),
    );

    let (nodes, error) = run(&h.rag, "q").await;

    assert!(matches!(
        error,
        Some(AppError::UnhelpfulAnswerExhausted { attempts: 3 })
    ));
    assert_eq!(nodes.iter().filter(|n| **n == Node::Rewrite).count(), 3);
    assert_eq!(h.generator.calls_for(GenerationTask::Answer), 4);
    assert!(h.web.calls().is_empty());
}

#[tokio::test]
async fn test_worst_case_turn_terminates_within_caps() {
    // every round regenerates to the cap, then is judged unhelpful
    let round = ["no", "no", "no", "yes"];
    let groundedness: Vec<&str> = round.iter().copied().cycle().take(16).collect();

    let h = harness(
        happy_classifier()
            .script(TaskKind::GradeGroundedness, groundedness)
            .always(TaskKind::GradeUsefulness, "no"),
        ScriptedGenerator::new(),
        StaticRetriever::new(knowledge_snippets(2)),
        StaticWebSearcher::new(vec![]),
    );
    let limits = *h.rag.limits();

    let (nodes, error) = run(&h.rag, "q").await;

    assert!(matches!(
        error,
        Some(AppError::UnhelpfulAnswerExhausted { attempts: 3 })
    ));

    let rounds = (limits.max_rewrites + 1) as usize;
    let generations_per_round = (limits.max_regenerations + 1) as usize;
    assert_eq!(
        h.generator.calls_for(GenerationTask::Answer),
        rounds * generations_per_round
    );

    // START, ROUTE, then per round RETRIEVE, GRADE_DOCS, the generate/grade
    // pairs and a REWRITE (except after the last round)
    let bound = 2 + rounds * (2 + 2 * generations_per_round) + (rounds - 1);
    assert!(nodes.len() <= bound, "{} transitions > {}", nodes.len(), bound);
}

#[tokio::test]
async fn test_routing_is_deterministic() {
    let h = harness(
        happy_classifier(),
        ScriptedGenerator::new(),
        StaticRetriever::new(knowledge_snippets(3)),
        StaticWebSearcher::new(vec![]),
    );

    let (first, _) = run(&h.rag, "What are agents?").await;
    let (second, _) = run(&h.rag.clone(), "What are agents?").await;

    assert_eq!(first, second);
    let routes = h.classifier.calls(TaskKind::Route);
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0], routes[1]);
}

#[tokio::test]
async fn test_unknown_route_label_is_ambiguous() {
    let h = harness(
        happy_classifier().always(TaskKind::Route, "maybe both"),
        ScriptedGenerator::new(),
        StaticRetriever::new(knowledge_snippets(3)),
        StaticWebSearcher::new(vec![]),
    );

    let (nodes, error) = run(&h.rag, "q").await;

    let error = error.unwrap();
    assert_eq!(error.kind(), ErrorKind::ClassificationAmbiguous);
    assert!(error.to_string().contains("maybe both"));
    assert_eq!(nodes, vec![Node::Start, Node::Route]);
    assert!(h.knowledge.calls().is_empty());
    assert!(h.web.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_grade_label_is_ambiguous() {
    let h = harness(
        happy_classifier().always(TaskKind::GradeDocument, "somewhat"),
        ScriptedGenerator::new(),
        StaticRetriever::new(knowledge_snippets(3)),
        StaticWebSearcher::new(vec![]),
    );

    let (_, error) = run(&h.rag, "q").await;
    assert_eq!(error.unwrap().kind(), ErrorKind::ClassificationAmbiguous);
}

#[tokio::test]
async fn test_retriever_failure_is_upstream_unavailable() {
    let h = harness(
        happy_classifier(),
        ScriptedGenerator::new(),
        StaticRetriever::failing("index locked"),
        StaticWebSearcher::new(vec![]),
    );

    let (nodes, error) = run(&h.rag, "q").await;

    let error = error.unwrap();
    assert_eq!(error.kind(), ErrorKind::UpstreamUnavailable);
    assert!(error.to_string().contains("index locked"));
    assert_eq!(nodes.last(), Some(&Node::Retrieve));
    assert_eq!(h.generator.calls().len(), 0);
}

#[tokio::test]
async fn test_stalled_generator_times_out() {
    let h = harness(
        happy_classifier(),
        ScriptedGenerator::new().stalling(),
        StaticRetriever::new(knowledge_snippets(1)),
        StaticWebSearcher::new(vec![]),
    );
    let rag = h.rag.clone().with_limits(LoopConfig {
        call_timeout_secs: 1,
        ..LoopConfig::default()
    });

    let (nodes, error) = run(&rag, "q").await;

    assert_eq!(error.unwrap().kind(), ErrorKind::UpstreamUnavailable);
    assert_eq!(nodes.last(), Some(&Node::Generate));
}

#[tokio::test]
async fn test_thoughts_stream_before_answer_and_join_history() {
    let h = harness(
        happy_classifier(),
        ScriptedGenerator::new().answer_chunks(vec![
            GenerationChunk::Thought("The snippets mention ".to_string()),
            GenerationChunk::Thought("planning.".to_string()),
            GenerationChunk::Answer("Agents ".to_string()),
            GenerationChunk::Answer("plan.".to_string()),
        ]),
        StaticRetriever::new(knowledge_snippets(2)),
        StaticWebSearcher::new(vec![]),
    );
    let prior = vec![Message::user("Hi"), Message::response("Hello!")];

    let events: Vec<TurnEvent> = h
        .rag
        .run_turn("How do agents work?", prior.clone())
        .map(|e| e.unwrap())
        .collect()
        .await;

    let last_thought = events
        .iter()
        .rposition(|e| matches!(e, TurnEvent::ThoughtChunk { .. }))
        .unwrap();
    let first_answer = events
        .iter()
        .position(|e| matches!(e, TurnEvent::AnswerChunk { .. }))
        .unwrap();
    assert!(last_thought < first_answer);

    let Some(TurnEvent::Completed(completion)) = events.last() else {
        panic!("turn did not complete: {:?}", events.last());
    };
    assert_eq!(completion.response, Message::response("Agents plan."));
    assert_eq!(
        completion.history,
        vec![
            Message::user("Hi"),
            Message::response("Hello!"),
            Message::user("How do agents work?"),
            Message::thought("The snippets mention planning."),
            Message::response("Agents plan."),
        ]
    );

    assert_eq!(h.generator.calls()[0].history, prior);
}

#[tokio::test]
async fn test_regeneration_is_announced_before_new_chunks() {
    let h = harness(
        happy_classifier().script(TaskKind::GradeGroundedness, ["no", "yes"]),
        ScriptedGenerator::new().answers(["made up", "grounded"]),
        StaticRetriever::new(knowledge_snippets(2)),
        StaticWebSearcher::new(vec![]),
    );

    let events: Vec<TurnEvent> = h
        .rag
        .run_turn("q", vec![])
        .map(|e| e.unwrap())
        .collect()
        .await;

    let regenerate = events
        .iter()
        .position(|e| {
            *e == TurnEvent::StateTransition {
                from: Node::GradeGen,
                to: Node::Generate,
            }
        })
        .unwrap();
    let chunks_after: String = events[regenerate..]
        .iter()
        .filter_map(|e| match e {
            TurnEvent::AnswerChunk { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks_after, "grounded");

    let Some(TurnEvent::Completed(completion)) = events.last() else {
        panic!("turn did not complete");
    };
    assert_eq!(completion.response.content, "grounded");
    assert_eq!(completion.regenerations, 1);
}
