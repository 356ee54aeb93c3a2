//! Built-in player actions
//!
//! Each built-in takes exactly one named parameter. A valid invocation is
//! forwarded to the engine as `{action, <param>: value}` and echoed back to
//! the client; the engine confirms the effect later through the sync loop.

use playctl_common::{ActionInvocation, ActionResult, Fields};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

use super::{ActionRegistry, Registration};
use crate::engine::PlayerEngine;

/// Name and validator of an action's single parameter
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub param: &'static str,
    pub validate: fn(&Value) -> bool,
}

impl ParamSpec {
    /// Value of this parameter in `invocation`, if present and valid
    pub fn extract<'a>(&self, invocation: &'a ActionInvocation) -> Option<&'a Value> {
        invocation
            .param(self.param)
            .filter(|value| (self.validate)(value))
    }
}

/// Built-in action table
pub const BUILTIN_ACTIONS: &[(&str, ParamSpec)] = &[
    (
        "setRepeatMode",
        ParamSpec {
            param: "mode",
            validate: is_integer,
        },
    ),
    (
        "setShuffleMode",
        ParamSpec {
            param: "shuffle",
            validate: Value::is_boolean,
        },
    ),
    (
        "seek",
        ParamSpec {
            param: "time",
            validate: Value::is_number,
        },
    ),
    (
        "volume",
        ParamSpec {
            param: "volume",
            validate: is_volume,
        },
    ),
    (
        "playNext",
        ParamSpec {
            param: "itemId",
            validate: is_item_id,
        },
    ),
    (
        "addToQueue",
        ParamSpec {
            param: "itemId",
            validate: is_item_id,
        },
    ),
];

fn is_integer(value: &Value) -> bool {
    value.is_i64() || value.is_u64()
}

/// Absolute level in 0-100, or a signed relative step such as `"+5"`
fn is_volume(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().map_or(false, |v| (0.0..=100.0).contains(&v)),
        Value::String(s) => is_relative_step(s),
        _ => false,
    }
}

/// `^[+-]\d+$`
fn is_relative_step(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some('+') | Some('-'))
        && !chars.as_str().is_empty()
        && chars.all(|c| c.is_ascii_digit())
}

fn is_item_id(value: &Value) -> bool {
    value.as_str().map_or(false, |s| !s.is_empty())
}

impl ActionRegistry {
    /// Registry preloaded with the built-in actions.
    ///
    /// Valid commands go to `engine`; `nudge` wakes the sync loop so the
    /// effect shows up without waiting for the next poll.
    pub fn with_builtins(engine: Arc<dyn PlayerEngine>, nudge: Arc<Notify>) -> Arc<Self> {
        let registry = Self::new();
        for (name, spec) in BUILTIN_ACTIONS {
            // Built-ins live as long as the registry
            let _ = registry.register_builtin(name, *spec, Arc::clone(&engine), Arc::clone(&nudge));
        }
        registry
    }

    /// Register a single-parameter command that is forwarded to `engine`
    pub fn register_builtin(
        self: &Arc<Self>,
        name: &str,
        spec: ParamSpec,
        engine: Arc<dyn PlayerEngine>,
        nudge: Arc<Notify>,
    ) -> Registration {
        self.register_fn(name, move |invocation| {
            let Some(value) = spec.extract(&invocation) else {
                debug!("Rejected {}: invalid {}", invocation.action, spec.param);
                return ActionResult::failed();
            };

            let command =
                ActionInvocation::new(invocation.action.as_str()).with_param(spec.param, value.clone());
            engine.send_command(&command);
            nudge.notify_one();

            let mut response = Fields::new();
            response.insert("type".into(), Value::from("ok"));
            response.extend(command.to_fields());
            ActionResult::ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, PlayerSnapshot};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEngine {
        commands: Mutex<Vec<ActionInvocation>>,
    }

    #[async_trait]
    impl PlayerEngine for RecordingEngine {
        fn send_command(&self, command: &ActionInvocation) {
            self.commands.lock().unwrap().push(command.clone());
        }

        async fn invoke(&self, invocation: &ActionInvocation) -> Result<Value, EngineError> {
            Err(EngineError::NotFound(invocation.action.clone()))
        }

        async fn snapshot(&self) -> Result<PlayerSnapshot, EngineError> {
            Ok(PlayerSnapshot::default())
        }
    }

    fn setup() -> (Arc<ActionRegistry>, Arc<RecordingEngine>) {
        let engine = Arc::new(RecordingEngine::default());
        let registry = ActionRegistry::with_builtins(engine.clone(), Arc::new(Notify::new()));
        (registry, engine)
    }

    async fn run(registry: &ActionRegistry, action: &str, param: &str, value: Value) -> ActionResult {
        let invocation = ActionInvocation::new(action).with_param(param, value);
        registry.dispatch(&invocation).await.unwrap()
    }

    #[tokio::test]
    async fn test_volume_validation() {
        let (registry, engine) = setup();

        assert!(!run(&registry, "volume", "volume", json!(150)).await.success);
        assert!(run(&registry, "volume", "volume", json!("+5")).await.success);
        assert!(run(&registry, "volume", "volume", json!(50)).await.success);
        assert!(!run(&registry, "volume", "volume", json!("5")).await.success);
        assert!(!run(&registry, "volume", "volume", json!("+")).await.success);
        assert!(!run(&registry, "volume", "volume", json!("+5.5")).await.success);

        assert_eq!(engine.commands.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_success_echoes_param() {
        let (registry, engine) = setup();

        let result = run(&registry, "volume", "volume", json!("+10")).await;
        assert_eq!(
            Value::Object(result.response.unwrap()),
            json!({"type": "ok", "action": "volume", "volume": "+10"})
        );

        let commands = engine.commands.lock().unwrap();
        assert_eq!(
            Value::Object(commands[0].to_fields()),
            json!({"action": "volume", "volume": "+10"})
        );
    }

    #[tokio::test]
    async fn test_extra_params_not_forwarded() {
        let (registry, engine) = setup();
        let invocation = ActionInvocation::new("seek")
            .with_param("time", 3.5)
            .with_param("junk", true);
        assert!(registry.dispatch(&invocation).await.unwrap().success);

        let commands = engine.commands.lock().unwrap();
        assert_eq!(commands[0].params.len(), 1);
    }

    #[tokio::test]
    async fn test_param_validators() {
        let (registry, _engine) = setup();

        assert!(run(&registry, "setRepeatMode", "mode", json!(2)).await.success);
        assert!(!run(&registry, "setRepeatMode", "mode", json!(1.5)).await.success);
        assert!(run(&registry, "setShuffleMode", "shuffle", json!(true)).await.success);
        assert!(!run(&registry, "setShuffleMode", "shuffle", json!(1)).await.success);
        assert!(run(&registry, "seek", "time", json!(0)).await.success);
        assert!(!run(&registry, "seek", "time", json!("10")).await.success);
        assert!(run(&registry, "playNext", "itemId", json!("abc")).await.success);
        assert!(!run(&registry, "addToQueue", "itemId", json!("")).await.success);

        let missing = registry.dispatch(&ActionInvocation::new("seek")).await.unwrap();
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn test_builtin_can_be_overridden() {
        let (registry, _engine) = setup();
        registry.register_fn("volume", |_| ActionResult::done());

        let result = run(&registry, "volume", "volume", json!(500)).await;
        assert!(result.success);
        assert!(result.response.is_none());
    }

    #[test]
    fn test_relative_step_pattern() {
        assert!(is_relative_step("+0"));
        assert!(is_relative_step("-15"));
        assert!(!is_relative_step("15"));
        assert!(!is_relative_step("+1a"));
        assert!(!is_relative_step(""));
    }
}
