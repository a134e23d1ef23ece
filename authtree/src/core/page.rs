//! Page node: several child nodes presented as one suspend/resume unit.
//!
//! Between exchanges the page remembers which child issued which callback in
//! shared state under `__authtree.page.<realm>/<tree>/<node id>`, as an object
//! mapping the callback id to the child index. Answers are routed back through
//! that map, and an out-of-band resume restarts at the child that parked.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::action::{Action, ActionKind};
use crate::core::callback::Callback;
use crate::core::context::TreeContext;
use crate::core::error::{ConfigError, NodeError};
use crate::core::node::{Node, NodeKind};
use crate::core::registry::BuildContext;
use crate::core::tree::{NodeSpec, TreeId};

pub const PAGE_TYPE: &str = "page";
const STATE_NAMESPACE: &str = "page";

/// Callback id → index of the child that issued it.
type CallbackMap = BTreeMap<u32, usize>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageConfig {
    children: Vec<PageChildConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageChildConfig {
    id: String,
    node_type: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    config: Value,
}

struct PageChild {
    id: String,
    node: Arc<dyn Node>,
}

pub struct PageNode {
    node_id: String,
    state_key: String,
    children: Vec<PageChild>,
    outcomes: Vec<String>,
}

impl PageNode {
    /// Build a page from already-instantiated children, enforcing the page rules:
    /// at least one child, no composite children, and only the last child may
    /// declare more than one outcome.
    pub fn new(
        owner: &TreeId,
        node_id: impl Into<String>,
        children: Vec<(String, Arc<dyn Node>)>,
    ) -> Result<Self, ConfigError> {
        let node_id = node_id.into();
        let state_key = owner.state_key(STATE_NAMESPACE, &node_id);
        if children.is_empty() {
            return Err(ConfigError::EmptyPage { page_id: node_id });
        }
        let last = children.len() - 1;
        for (index, (child_id, child)) in children.iter().enumerate() {
            let kind = child.kind();
            if kind != NodeKind::Primitive {
                return Err(ConfigError::IllegalPageChild {
                    page_id: node_id,
                    child_id: child_id.clone(),
                    kind: kind.as_str(),
                });
            }
            let outcomes = child.outcomes().len();
            if index < last && outcomes > 1 {
                return Err(ConfigError::MultiOutcomeChildNotLast {
                    page_id: node_id,
                    child_id: child_id.clone(),
                    outcomes,
                });
            }
        }
        let outcomes = children[last].1.outcomes();
        Ok(Self {
            node_id,
            state_key,
            children: children
                .into_iter()
                .map(|(id, node)| PageChild { id, node })
                .collect(),
            outcomes,
        })
    }

    pub fn from_spec(spec: &NodeSpec<'_>, build: &BuildContext<'_>) -> Result<Self, ConfigError> {
        let config: PageConfig = serde_json::from_value(spec.config.clone())
            .map_err(|err| ConfigError::invalid(spec.node_id, err.to_string()))?;
        let mut children = Vec::with_capacity(config.children.len());
        for child in &config.children {
            let child_spec = NodeSpec {
                node_id: &child.id,
                node_type: &child.node_type,
                display_name: &child.display_name,
                tree: spec.tree,
                config: &child.config,
            };
            children.push((child.id.clone(), build.factory.create_node(&child_spec)?));
        }
        Self::new(spec.tree, spec.node_id, children)
    }

    pub fn state_key(&self) -> &str {
        &self.state_key
    }

    fn invalid_state(&self, message: &str) -> NodeError {
        NodeError::InvalidState {
            key: self.state_key.clone(),
            message: message.to_string(),
        }
    }

    fn read_callback_map(&self, raw: &Value) -> Result<CallbackMap, NodeError> {
        let invalid = |message: &str| self.invalid_state(message);
        let object = raw.as_object().ok_or_else(|| invalid("expected an object"))?;
        let mut map = CallbackMap::new();
        for (id, child) in object {
            let id: u32 = id.parse().map_err(|_| invalid("callback ids must be integers"))?;
            let child = child
                .as_u64()
                .and_then(|child| usize::try_from(child).ok())
                .filter(|child| *child < self.children.len())
                .ok_or_else(|| invalid("child index out of range"))?;
            map.insert(id, child);
        }
        Ok(map)
    }
}

fn write_callback_map(map: &CallbackMap) -> Value {
    let object: Map<String, Value> = map
        .iter()
        .map(|(id, child)| (id.to_string(), Value::from(*child as u64)))
        .collect();
    Value::Object(object)
}

/// Next free callback id: one past the largest id still in use. `None` once
/// the id space is exhausted.
fn next_callback_id(map: &CallbackMap) -> Option<u32> {
    map.keys().next_back().map_or(Some(0), |max| max.checked_add(1))
}

impl Node for PageNode {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError> {
        let key = self.state_key.as_str();
        let stored = match context.shared_state.get(key) {
            Some(raw) => Some(self.read_callback_map(raw)?),
            None => None,
        };

        let mut map = CallbackMap::new();
        let mut answers: BTreeMap<usize, Vec<Callback>> = BTreeMap::new();
        let mut start = 0;
        let mut parked = BTreeSet::new();
        let resuming = context.has_callbacks() || context.resuming_after_suspend;
        if let (Some(stored), true) = (stored, resuming) {
            for callback in &context.callbacks {
                match callback.id.and_then(|id| stored.get(&id)) {
                    Some(&child) => answers.entry(child).or_default().push(callback.clone()),
                    None => warn!(
                        page_id = %self.node_id,
                        callback_id = ?callback.id,
                        "ignoring callback not issued by this page"
                    ),
                }
            }
            start = stored.values().copied().min().unwrap_or(0);
            if context.resuming_after_suspend {
                parked = stored.values().copied().collect();
            }
            map = stored;
        }

        let mut shared = context.shared_state.without(key);
        let mut transient = context.transient_state.clone();
        let mut merged = Action::goto(String::new());
        let mut outbound: Vec<Callback> = Vec::new();
        let mut last_outcome = None;

        for (index, child) in self.children.iter().enumerate().skip(start) {
            let child_answers = answers.remove(&index).unwrap_or_default();
            // Once this pass has callbacks to send, only children answering in
            // the same round trip still run.
            if !outbound.is_empty() && child_answers.is_empty() {
                break;
            }

            let mut child_context =
                context.child(&child.id, shared.clone(), transient.clone(), child_answers);
            // Only the children that parked the page see the out-of-band resume.
            child_context.resuming_after_suspend = parked.contains(&index);
            let action = child.node.process(&child_context).inspect_err(|err| {
                warn!(page_id = %self.node_id, child_id = %child.id, error = %err, "page child failed");
            })?;

            if let Some(next) = &action.shared_state {
                shared = next.clone();
            }
            if let Some(next) = &action.transient_state {
                transient = next.clone();
            }
            merged.session_properties.extend(action.session_properties);
            merged.webhooks.extend(action.webhooks);
            merged.session_hooks.extend(action.session_hooks);
            if action.identity.is_some() {
                merged.identity = action.identity;
            }

            map.retain(|_, issued_by| *issued_by != index);
            match action.kind {
                ActionKind::Suspend { callbacks } => {
                    if callbacks.is_empty() {
                        return Err(NodeError::message(format!(
                            "page child '{}' suspended without callbacks",
                            child.id
                        )));
                    }
                    let mut next_id = next_callback_id(&map);
                    for callback in callbacks {
                        let id = next_id.ok_or_else(|| self.invalid_state("callback ids exhausted"))?;
                        map.insert(id, index);
                        outbound.push(callback.with_id(id));
                        next_id = id.checked_add(1);
                    }
                    if action.suspend_duration.is_some() {
                        merged.suspend_duration = action.suspend_duration;
                    }
                    debug!(page_id = %self.node_id, child_id = %child.id, "page child needs input");
                }
                ActionKind::Goto { outcome } => {
                    debug!(page_id = %self.node_id, child_id = %child.id, %outcome, "page child resolved");
                    last_outcome = Some(outcome);
                }
            }
        }

        if outbound.is_empty() {
            let outcome = last_outcome.ok_or_else(|| {
                NodeError::message(format!("page '{}' resolved no child outcome", self.node_id))
            })?;
            merged.kind = ActionKind::Goto { outcome };
            merged.suspend_duration = None;
            return Ok(merged.with_shared_state(shared).with_transient_state(transient));
        }

        merged.kind = ActionKind::Suspend { callbacks: outbound };
        Ok(merged
            .with_shared_state(shared.with(key, write_callback_map(&map)))
            .with_transient_state(transient))
    }

    fn outcomes(&self) -> Vec<String> {
        self.outcomes.clone()
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::action::{SINGLE_OUTCOME, TRUE_OUTCOME};
    use crate::core::context::RequestMetadata;
    use crate::core::document::JsonDocument;
    use crate::test_support::{FnNode, TestEngine, answer, prompt_node};
    use serde_json::json;

    fn owner() -> TreeId {
        TreeId::new("root", "login")
    }

    fn xy_page() -> PageNode {
        PageNode::new(
            &owner(),
            "page",
            vec![
                ("x".to_string(), Arc::new(prompt_node("x")) as Arc<dyn Node>),
                ("y".to_string(), Arc::new(prompt_node("y")) as Arc<dyn Node>),
            ],
        )
        .expect("page")
    }

    fn run(
        engine: &TestEngine,
        page: &PageNode,
        shared: JsonDocument,
        callbacks: Vec<Callback>,
    ) -> Action {
        let request = RequestMetadata::default();
        let context = TreeContext::new(&engine.executor, &request, "page", 0)
            .with_state(shared, JsonDocument::new())
            .with_callbacks(callbacks);
        page.process(&context).expect("process page")
    }

    /// X's callback first, then Y's, then Y's outcome.
    #[test]
    fn children_are_presented_one_after_another() {
        let engine = TestEngine::builder().build();
        let page = xy_page();

        let first = run(&engine, &page, JsonDocument::new(), Vec::new());
        assert_eq!(first.callbacks().len(), 1);
        assert_eq!(first.callbacks()[0].output.get("prompt"), Some(&json!("x")));
        assert_eq!(first.callbacks()[0].id, Some(0));
        let shared = first.shared_state.clone().expect("shared");
        assert_eq!(shared.get(page.state_key()), Some(&json!({"0": 0})));

        let second = run(&engine, &page, shared, vec![answer(&first.callbacks()[0], "vx")]);
        assert_eq!(second.callbacks().len(), 1);
        assert_eq!(second.callbacks()[0].output.get("prompt"), Some(&json!("y")));
        let shared = second.shared_state.clone().expect("shared");
        assert_eq!(shared.get_str("x"), Some("vx"));
        assert_eq!(shared.get(page.state_key()), Some(&json!({"0": 1})));

        let third = run(&engine, &page, shared, vec![answer(&second.callbacks()[0], "vy")]);
        assert_eq!(third.outcome(), Some(SINGLE_OUTCOME));
        let shared = third.shared_state.expect("shared");
        assert_eq!(shared.get_str("y"), Some("vy"));
        assert!(!shared.contains_key(page.state_key()));
    }

    /// Re-presenting the same unanswered callbacks reuses the same ids.
    #[test]
    fn resuspension_is_idempotent() {
        let engine = TestEngine::builder().build();
        let page = xy_page();

        let first = run(&engine, &page, JsonDocument::new(), Vec::new());
        let again = run(&engine, &page, JsonDocument::new(), Vec::new());
        assert_eq!(first.shared_state, again.shared_state);

        let shared = first.shared_state.clone().expect("shared");
        let unanswered = first.callbacks().to_vec();
        let resubmitted = run(&engine, &page, shared.clone(), unanswered.clone());
        let resubmitted_again = run(&engine, &page, shared, unanswered);
        assert_eq!(resubmitted.shared_state, first.shared_state);
        assert_eq!(resubmitted.shared_state, resubmitted_again.shared_state);
        assert_eq!(resubmitted.callbacks()[0].id, Some(0));
    }

    /// A child issuing several callbacks gets consecutive ids from `max + 1`.
    #[test]
    fn callback_ids_allocate_from_max_plus_one() {
        let mut map = CallbackMap::new();
        assert_eq!(next_callback_id(&map), Some(0));
        map.insert(0, 0);
        map.insert(4, 1);
        assert_eq!(next_callback_id(&map), Some(5));

        let engine = TestEngine::builder().build();
        let pair = FnNode::single(|ctx| {
            if ctx.has_callbacks() {
                return Ok(Action::goto(SINGLE_OUTCOME));
            }
            Ok(Action::suspend(vec![
                Callback::new("NameCallback"),
                Callback::new("PasswordCallback"),
            ]))
        });
        let page = PageNode::new(&owner(), "p", vec![("pair".to_string(), Arc::new(pair) as Arc<dyn Node>)])
            .expect("page");
        let action = run(&engine, &page, JsonDocument::new(), Vec::new());
        let ids: Vec<_> = action.callbacks().iter().map(|cb| cb.id).collect();
        assert_eq!(ids, vec![Some(0), Some(1)]);
        assert_eq!(
            action.shared_state.expect("shared").get(page.state_key()),
            Some(&json!({"0": 0, "1": 0}))
        );
    }

    #[test]
    fn resolved_children_effects_are_merged() {
        let engine = TestEngine::builder().build();
        let setter = FnNode::single(|ctx| {
            Ok(Action::goto(SINGLE_OUTCOME)
                .with_shared_state(ctx.shared_state.with("step", 1))
                .put_session_property("amr", "pwd"))
        });
        let decider = FnNode::new(vec!["true", "false"], |ctx| {
            Ok(Action::goto_bool(ctx.shared_state.get("step") == Some(&json!(1))))
        });
        let page = PageNode::new(
            &owner(),
            "p",
            vec![
                ("set".to_string(), Arc::new(setter) as Arc<dyn Node>),
                ("decide".to_string(), Arc::new(decider) as Arc<dyn Node>),
            ],
        )
        .expect("page");
        assert_eq!(page.outcomes(), vec!["true".to_string(), "false".to_string()]);

        let action = run(&engine, &page, JsonDocument::new(), Vec::new());
        assert_eq!(action.outcome(), Some(TRUE_OUTCOME));
        assert_eq!(action.session_properties.len(), 1);
    }

    #[test]
    fn multi_outcome_child_must_be_last() {
        let decider = Arc::new(FnNode::new(vec!["true", "false"], |_| Ok(Action::goto_bool(true)))) as Arc<dyn Node>;
        let single = Arc::new(FnNode::single(|_| Ok(Action::goto(SINGLE_OUTCOME)))) as Arc<dyn Node>;
        let err = PageNode::new(
            &owner(),
            "p",
            vec![("d".to_string(), decider), ("s".to_string(), single)],
        )
        .err()
        .expect("invalid page");
        assert!(matches!(err, ConfigError::MultiOutcomeChildNotLast { ref child_id, .. } if child_id == "d"));
    }

    #[test]
    fn nested_pages_are_rejected() {
        let inner = Arc::new(xy_page()) as Arc<dyn Node>;
        let err = PageNode::new(&owner(), "outer", vec![("inner".to_string(), inner)])
            .err()
            .expect("nested page");
        assert!(matches!(err, ConfigError::IllegalPageChild { kind: "page", .. }));
        assert!(matches!(
            PageNode::new(&owner(), "empty", Vec::new()),
            Err(ConfigError::EmptyPage { .. })
        ));
    }

    #[test]
    fn tampered_callback_map_is_rejected() {
        let engine = TestEngine::builder().build();
        let page = xy_page();
        let request = RequestMetadata::default();
        let shared = JsonDocument::new().with(page.state_key(), json!({"0": 9}));
        let context = TreeContext::new(&engine.executor, &request, "page", 0)
            .with_state(shared, JsonDocument::new())
            .with_callbacks(vec![Callback::new("NameCallback").with_id(0).answered("v")]);
        let err = page.process(&context).err().expect("tampered");
        assert!(matches!(err, NodeError::InvalidState { .. }));
    }

    #[test]
    fn exhausted_callback_ids_are_rejected() {
        let engine = TestEngine::builder().build();
        let page = xy_page();
        let request = RequestMetadata::default();
        let shared = JsonDocument::new().with(page.state_key(), json!({"0": 0, "4294967295": 1}));
        let unanswered = Callback::new("NameCallback").with_id(0);
        let context = TreeContext::new(&engine.executor, &request, "page", 0)
            .with_state(shared, JsonDocument::new())
            .with_callbacks(vec![unanswered]);
        let err = page.process(&context).err().expect("no ids left");
        assert!(
            matches!(err, NodeError::InvalidState { ref message, .. } if message == "callback ids exhausted"),
            "{err}"
        );
    }

    /// A page parked by its second child resumes there, not at the first child.
    #[test]
    fn out_of_band_resume_continues_at_parked_child() {
        let engine = TestEngine::builder().build();
        let park = FnNode::single(|ctx| {
            if ctx.resuming_after_suspend {
                return Ok(Action::goto(SINGLE_OUTCOME)
                    .with_shared_state(ctx.shared_state.with("confirmed", true)));
            }
            Ok(Action::suspend(vec![Callback::new("TextOutputCallback")])
                .with_suspend_duration(std::time::Duration::from_secs(60)))
        });
        let page = PageNode::new(
            &owner(),
            "p",
            vec![
                ("user".to_string(), Arc::new(prompt_node("username")) as Arc<dyn Node>),
                ("park".to_string(), Arc::new(park) as Arc<dyn Node>),
            ],
        )
        .expect("page");

        let first = run(&engine, &page, JsonDocument::new(), Vec::new());
        let shared = first.shared_state.clone().expect("shared");
        let parked = run(&engine, &page, shared, vec![answer(&first.callbacks()[0], "alice")]);
        assert_eq!(parked.callbacks()[0].kind, "TextOutputCallback");
        assert_eq!(parked.suspend_duration, Some(std::time::Duration::from_secs(60)));

        let request = RequestMetadata::default();
        let mut context = TreeContext::new(&engine.executor, &request, "p", 0)
            .with_state(parked.shared_state.clone().expect("shared"), JsonDocument::new());
        context.resuming_after_suspend = true;
        let resumed = page.process(&context).expect("resume");
        assert_eq!(resumed.outcome(), Some(SINGLE_OUTCOME));
        let shared = resumed.shared_state.expect("shared");
        assert_eq!(shared.get_str("username"), Some("alice"));
        assert_eq!(shared.get("confirmed"), Some(&json!(true)));
        assert!(!shared.contains_key(page.state_key()));
    }

    #[test]
    fn from_spec_builds_children_through_factory() {
        let engine = TestEngine::builder().build();
        let tree = crate::core::tree::TreeId::new("root", "t");
        let config = json!({
            "children": [
                {"id": "user", "nodeType": "collector", "displayName": "User", "config": {"key": "username"}},
                {"id": "pass", "nodeType": "collector", "config": {"key": "password", "callbackType": "PasswordCallback", "transient": true}}
            ]
        });
        let spec = NodeSpec {
            node_id: "login-page",
            node_type: PAGE_TYPE,
            display_name: "Login",
            tree: &tree,
            config: &config,
        };
        let node = engine.executor.factory().create_node(&spec).expect("page");
        assert_eq!(node.kind(), NodeKind::Page);
        assert_eq!(node.outcomes(), vec![SINGLE_OUTCOME.to_string()]);
    }
}
