use std::time::Duration;

use serde::Deserialize;

use crate::core::action::{Action, SINGLE_OUTCOME};
use crate::core::callback::Callback;
use crate::core::context::TreeContext;
use crate::core::error::{ConfigError, NodeError};
use crate::core::node::Node;
use crate::core::tree::NodeSpec;

use super::parse_config;

pub const SUSPEND_TYPE: &str = "suspend";

#[derive(Debug, Deserialize)]
struct SuspendConfig {
    seconds: u64,
    #[serde(default)]
    message: Option<String>,
}

/// Parks the whole tree until an out-of-band event resumes it (an emailed
/// link, a push approval). Answers submitted meanwhile do not advance it.
pub struct SuspendNode {
    duration: Duration,
    message: String,
}

impl SuspendNode {
    pub fn from_spec(spec: &NodeSpec<'_>) -> Result<Self, ConfigError> {
        let config: SuspendConfig = parse_config(spec)?;
        if config.seconds == 0 {
            return Err(ConfigError::invalid(spec.node_id, "seconds must be > 0"));
        }
        Ok(Self {
            duration: Duration::from_secs(config.seconds),
            message: config
                .message
                .unwrap_or_else(|| "Waiting for confirmation".to_string()),
        })
    }
}

impl Node for SuspendNode {
    fn process(&self, context: &TreeContext<'_>) -> Result<Action, NodeError> {
        if context.resuming_after_suspend {
            return Ok(Action::goto(SINGLE_OUTCOME));
        }
        let notice = Callback::new("TextOutputCallback").with_output("message", self.message.as_str());
        Ok(Action::suspend(vec![notice]).with_suspend_duration(self.duration))
    }

    fn outcomes(&self) -> Vec<String> {
        vec![SINGLE_OUTCOME.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::RequestMetadata;
    use crate::core::tree::TreeId;
    use crate::test_support::TestEngine;
    use serde_json::json;

    #[test]
    fn parks_until_resumed_out_of_band() {
        let engine = TestEngine::builder().build();
        let request = RequestMetadata::default();
        let tree = TreeId::new("root", "t");
        let config = json!({"seconds": 300, "message": "Check your inbox"});
        let node = SuspendNode::from_spec(&NodeSpec {
            node_id: "wait",
            node_type: SUSPEND_TYPE,
            display_name: "Wait",
            tree: &tree,
            config: &config,
        })
        .expect("node");

        let parked = node
            .process(&TreeContext::new(&engine.executor, &request, "wait", 0))
            .expect("park");
        assert_eq!(parked.suspend_duration, Some(Duration::from_secs(300)));
        let answered = vec![parked.callbacks()[0].clone().answered("ok")];

        let still = node
            .process(&TreeContext::new(&engine.executor, &request, "wait", 0).with_callbacks(answered))
            .expect("still parked");
        assert!(still.is_suspend());

        let mut context = TreeContext::new(&engine.executor, &request, "wait", 0);
        context.resuming_after_suspend = true;
        assert_eq!(node.process(&context).expect("resume").outcome(), Some(SINGLE_OUTCOME));
    }
}
