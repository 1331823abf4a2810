//! Runtime construction: one script host per instance.

use crate::config::{BindingSpec, RuntimeConfig};
use crate::engine::{ScriptEngine, RUNTIME_PRELUDE};
use crate::error::ExecuteError;
use crate::events::HandlerRegistry;
use crate::net::HttpClient;
use crate::shim;
use crate::state::{BindingInstance, HostLogger, HostState, ScriptLogForwarder};
use crate::timers::TimerQueue;
use outpost_platform::Platform;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

/// A script host: one engine context, one event registry, and the bindings
/// named by its configuration.
///
/// A runtime dispatches one invocation at a time; the `&mut self` receivers
/// on the `execute_*` entry points are the serialization gate, so concurrent
/// callers serialize at the borrow. The engine context is single-threaded
/// and the type is deliberately not `Send`.
pub struct Runtime {
    pub(crate) engine: ScriptEngine,
    pub(crate) state: Rc<RefCell<HostState>>,
}

impl Runtime {
    /// Build a runtime over a platform facade and a binding specification.
    pub fn new(
        platform: Arc<dyn Platform>,
        bindings: BindingSpec,
        config: RuntimeConfig,
    ) -> Result<Self, ExecuteError> {
        Self::with_logger(platform, bindings, config, Arc::new(ScriptLogForwarder))
    }

    /// [`Runtime::new`] with a custom sink for script `console.*` output.
    pub fn with_logger(
        platform: Arc<dyn Platform>,
        bindings: BindingSpec,
        config: RuntimeConfig,
        logger: Arc<dyn HostLogger>,
    ) -> Result<Self, ExecuteError> {
        let mut engine = ScriptEngine::new()?;
        let http = if config.allow_outbound {
            Some(HttpClient::new().map_err(ExecuteError::Engine)?)
        } else {
            None
        };
        let instances = bindings
            .entries()
            .iter()
            .map(|(name, target)| BindingInstance {
                name: name.clone(),
                target: target.clone(),
            })
            .collect();
        let state = Rc::new(RefCell::new(HostState {
            platform,
            registry: HandlerRegistry::default(),
            timers: TimerQueue::default(),
            invocation: None,
            logger,
            http,
            started: Instant::now(),
            config,
            bindings: instances,
        }));

        shim::install_host_namespace(engine.context(), &state)
            .map_err(|error| ExecuteError::Engine(error.to_string()))?;
        engine
            .eval(RUNTIME_PRELUDE, "outpost://prelude")
            .map_err(|error| ExecuteError::Engine(error.to_string()))?;

        let mut runtime = Self { engine, state };
        runtime.install_binding_globals()?;
        Ok(runtime)
    }

    /// Compile and evaluate a script's top level (handler registration).
    pub fn load_script(&mut self, source: &str, name: &str) -> Result<(), ExecuteError> {
        self.engine.eval(source, name)?;
        self.engine.run_jobs();
        Ok(())
    }

    fn install_binding_globals(&mut self) -> Result<(), ExecuteError> {
        let manifest = shim::binding_manifest(&self.state);
        let argument = self
            .engine
            .json_to_value(&manifest)
            .map_err(|error| ExecuteError::Engine(error.to_string()))?;
        self.engine
            .call_global("__outpost_install_bindings", &[argument])
            .map_err(|error| ExecuteError::Engine(error.to_string()))?;
        Ok(())
    }
}
