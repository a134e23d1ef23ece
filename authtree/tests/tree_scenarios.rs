//! End-to-end evaluations through the public engine API.
//!
//! Every exchange hands the checkpoint through its JSON encoding, the way a
//! caller persisting it between requests would.

use std::sync::Arc;

use serde_json::{Value, json};

use authtree::core::action::{Action, SINGLE_OUTCOME, Webhook};
use authtree::core::callback::Callback;
use authtree::core::context::RequestMetadata;
use authtree::core::document::JsonDocument;
use authtree::core::error::EngineError;
use authtree::core::executor::ExecutorLimits;
use authtree::core::hooks::SessionHookRegistry;
use authtree::core::inner_tree::INNER_TREE_TYPE;
use authtree::core::page::PAGE_TYPE;
use authtree::core::registry::NodeRegistry;
use authtree::core::state::{Outcome, TreeResult, TreeState, decode_checkpoint, encode_checkpoint};
use authtree::core::tree::{AuthTree, FALSE_DECISION, TRUE_DECISION, TreeLookup, TreeRepository};
use authtree::core::validation::validate_repository;
use authtree::test_support::{FnNode, TestEngine, answer, prompt_node};

fn exchange(
    engine: &TestEngine,
    tree: &str,
    state: &TreeState,
    callbacks: Vec<Callback>,
) -> TreeResult {
    let restored = decode_checkpoint(&encode_checkpoint(state).expect("encode")).expect("decode");
    engine
        .executor
        .process(&engine.tree(tree), &restored, callbacks, &RequestMetadata::default())
        .expect("exchange")
}

fn prompt_of(callback: &Callback) -> Option<&str> {
    callback.output.get("prompt").and_then(Value::as_str)
}

/// Page [X, Y]: X's callback, then Y's, then the page's outcome.
#[test]
fn page_presents_children_in_turn() {
    let tree = AuthTree::builder("root", "paged")
        .entry("page")
        .node(
            "page",
            PAGE_TYPE,
            json!({"children": [
                {"id": "x", "nodeType": "ask-x", "displayName": "X"},
                {"id": "y", "nodeType": "ask-y", "displayName": "Y"}
            ]}),
        )
        .edge("page", SINGLE_OUTCOME, TRUE_DECISION)
        .build();
    let engine = TestEngine::builder()
        .node("ask-x", prompt_node("x"))
        .node("ask-y", prompt_node("y"))
        .tree(tree)
        .build();

    let first = exchange(&engine, "paged", &TreeState::default(), Vec::new());
    assert_eq!(first.outcome, Outcome::NeedInput);
    assert_eq!(first.callbacks.len(), 1);
    assert_eq!(prompt_of(&first.callbacks[0]), Some("x"));

    let second = exchange(&engine, "paged", &first.state, vec![answer(&first.callbacks[0], "1")]);
    assert_eq!(second.outcome, Outcome::NeedInput);
    assert_eq!(second.callbacks.len(), 1);
    assert_eq!(prompt_of(&second.callbacks[0]), Some("y"));

    let third = exchange(&engine, "paged", &second.state, vec![answer(&second.callbacks[0], "2")]);
    assert_eq!(third.outcome, Outcome::True);
    let expected = JsonDocument::new().with("x", "1").with("y", "2");
    assert_eq!(third.state.shared_state, expected);
}

fn removal_engine() -> TestEngine {
    let outer = AuthTree::builder("root", "outer")
        .entry("seed")
        .node("seed", "seed", Value::Null)
        .node("sub", INNER_TREE_TYPE, json!({"tree": "inner"}))
        .edge("seed", SINGLE_OUTCOME, "sub")
        .edge("sub", "true", TRUE_DECISION)
        .edge("sub", "false", FALSE_DECISION)
        .build();
    let inner = AuthTree::builder("root", "inner")
        .entry("otp")
        .node("otp", "ask-otp", Value::Null)
        .node("finish", "finish", Value::Null)
        .edge("otp", SINGLE_OUTCOME, "finish")
        .edge("finish", SINGLE_OUTCOME, TRUE_DECISION)
        .build();

    TestEngine::builder()
        .node(
            "seed",
            FnNode::single(|ctx| {
                Ok(Action::goto(SINGLE_OUTCOME)
                    .with_shared_state(ctx.shared_state.with("username", "alice"))
                    .put_session_property("legacy", "1"))
            }),
        )
        .node("ask-otp", prompt_node("otp"))
        .node(
            "finish",
            FnNode::single(|ctx| {
                Ok(Action::goto(SINGLE_OUTCOME)
                    .with_shared_state(ctx.shared_state.with("mfa", true))
                    .remove_session_property("legacy")
                    .add_webhook(Webhook {
                        name: "mfa-complete".to_string(),
                        data: Value::Null,
                    }))
            }),
        )
        .tree(outer)
        .tree(inner)
        .build()
}

/// Inner tree state merges outward and a removal inside is a removal outside.
#[test]
fn inner_tree_merges_state_and_removals() {
    let engine = removal_engine();

    let first = exchange(&engine, "outer", &TreeState::default(), Vec::new());
    assert_eq!(first.outcome, Outcome::NeedInput);
    assert_eq!(first.state.current_node_id.as_deref(), Some("sub"));
    assert!(first.state.shared_state.keys().any(|key| key.starts_with("__authtree.innerTree.")));

    let done = exchange(&engine, "outer", &first.state, vec![answer(&first.callbacks[0], "42")]);
    assert_eq!(done.outcome, Outcome::True);
    let expected = JsonDocument::new()
        .with("username", "alice")
        .with("otp", "42")
        .with("mfa", true);
    assert_eq!(done.state.shared_state, expected);
    assert_eq!(done.state.session_properties.get("legacy"), Some(&None));
    assert_eq!(done.state.resolved_session_properties().count(), 0);
    assert_eq!(done.state.webhooks.len(), 1);

    let session = SessionHookRegistry::default()
        .finalize_session(&done, &RequestMetadata::default())
        .expect("finalize")
        .expect("session");
    assert!(!session.properties.contains_key("legacy"));
}

/// A tree that evaluates itself is stopped by the depth guard.
#[test]
fn self_nesting_tree_hits_depth_limit() {
    let tree = AuthTree::builder("root", "again")
        .entry("sub")
        .node("sub", INNER_TREE_TYPE, json!({"tree": "again"}))
        .edge("sub", "true", TRUE_DECISION)
        .edge("sub", "false", FALSE_DECISION)
        .build();
    let engine = TestEngine::builder()
        .tree(tree)
        .limits(ExecutorLimits {
            max_steps: 16,
            max_depth: 3,
        })
        .build();

    let err = engine
        .executor
        .process(&engine.tree("again"), &TreeState::default(), Vec::new(), &RequestMetadata::default())
        .expect_err("depth limit");
    assert!(matches!(err, EngineError::Node { .. }));
    assert!(err.to_string().contains("inner tree depth 4 exceeds maximum 3"), "{err}");

    let mut trees = TreeRepository::new();
    trees.insert(engine.tree("again").as_ref().clone());
    let lookup: Arc<dyn TreeLookup> = Arc::new(trees.clone());
    let factory = NodeRegistry::with_builtins().into_factory(lookup);
    let violations = validate_repository(&trees, &factory);
    assert_eq!(violations, vec!["inner tree cycle: root/again -> root/again".to_string()]);
}

/// Checkpoints survive encoding with side effects intact.
#[test]
fn checkpoint_keeps_side_effects_across_exchanges() {
    let engine = removal_engine();
    let first = exchange(&engine, "outer", &TreeState::default(), Vec::new());
    let encoded = encode_checkpoint(&first.state).expect("encode");
    let decoded = decode_checkpoint(&encoded).expect("decode");
    assert_eq!(decoded, first.state);
    assert_eq!(decoded.session_properties.get("legacy"), Some(&Some("1".to_string())));
}

/// Inner-tree nodes sharing an id at every nesting level keep separate
/// checkpoints, so the innermost prompt resumes through both levels.
#[test]
fn nested_inner_trees_with_same_node_id_resume() {
    let nested = |name: &str, target: &str| {
        AuthTree::builder("root", name)
            .entry("sub")
            .node("sub", INNER_TREE_TYPE, json!({"tree": target}))
            .edge("sub", "true", TRUE_DECISION)
            .edge("sub", "false", FALSE_DECISION)
            .build()
    };
    let leaf = AuthTree::builder("root", "leaf")
        .entry("ask")
        .node("ask", "ask-code", Value::Null)
        .edge("ask", SINGLE_OUTCOME, TRUE_DECISION)
        .build();
    let engine = TestEngine::builder()
        .node("ask-code", prompt_node("code"))
        .tree(nested("outer", "middle"))
        .tree(nested("middle", "leaf"))
        .tree(leaf)
        .build();

    let first = exchange(&engine, "outer", &TreeState::default(), Vec::new());
    assert_eq!(first.outcome, Outcome::NeedInput);
    let shared = &first.state.shared_state;
    assert!(shared.contains_key("__authtree.innerTree.root/outer/sub"));
    assert!(shared.contains_key("__authtree.innerTree.root/middle/sub"));

    let done = exchange(&engine, "outer", &first.state, vec![answer(&first.callbacks[0], "42")]);
    assert_eq!(done.outcome, Outcome::True);
    assert_eq!(done.state.shared_state, JsonDocument::new().with("code", "42"));
}

/// A page parked by a `suspend` child continues there after an out-of-band
/// resume instead of prompting its first child again.
#[test]
fn suspended_page_resumes_out_of_band() {
    let tree = AuthTree::builder("root", "confirm")
        .entry("page")
        .node(
            "page",
            PAGE_TYPE,
            json!({"children": [
                {"id": "user", "nodeType": "collector", "config": {"key": "username"}},
                {"id": "wait", "nodeType": "suspend", "config": {"seconds": 60}}
            ]}),
        )
        .edge("page", SINGLE_OUTCOME, TRUE_DECISION)
        .build();
    let engine = TestEngine::builder().tree(tree).build();

    let first = exchange(&engine, "confirm", &TreeState::default(), Vec::new());
    let parked = exchange(&engine, "confirm", &first.state, vec![answer(&first.callbacks[0], "alice")]);
    assert_eq!(parked.outcome, Outcome::NeedInput);
    assert_eq!(parked.callbacks[0].kind, "TextOutputCallback");
    assert_eq!(parked.suspend_duration, Some(std::time::Duration::from_secs(60)));

    let restored = decode_checkpoint(&encode_checkpoint(&parked.state).expect("encode")).expect("decode");
    let resumed = engine
        .executor
        .resume_suspended(&engine.tree("confirm"), &restored, &RequestMetadata::default())
        .expect("resume");
    assert_eq!(resumed.outcome, Outcome::True);
    assert_eq!(resumed.state.shared_state, JsonDocument::new().with("username", "alice"));
}
