//! Dispatcher doubles: a recording dispatcher driven by its plan and a
//! `mockall` mock for expectation-based tests.

use std::sync::{Arc, Mutex};

use mockall::mock;

use crate::dispatcher::{Dispatcher, DispatcherError, DispatcherPlan, ModulePlan, ModuleSummary};

use super::services::{FactoryState, lock};

/// Address reported by the recording dispatcher.
pub const DISPATCH_ADDRESS: &str = "127.0.0.1:8080";

mock! {
    pub Dispatcher {}
    impl Dispatcher for Dispatcher {
        fn start(
            &mut self,
            api_host: &str,
            api_port: u16,
            grpc_apis: &[String],
        ) -> Result<(), DispatcherError>;
        fn quit(&mut self) -> Result<(), DispatcherError>;
        fn get_hostname(
            &self,
            module: &str,
            version: &str,
            instance: Option<u32>,
        ) -> Result<String, DispatcherError>;
        fn get_default_version(&self, module: &str) -> Result<String, DispatcherError>;
        fn get_module_by_name(&self, module: &str) -> Result<ModuleSummary, DispatcherError>;
        fn modules(&self) -> Vec<ModuleSummary>;
        fn dispatch_address(&self) -> String;
    }
}

/// Dispatcher that serves fixed addresses derived from module order.
///
/// Module `n` balances at port `9000 + n`; its instance `i` is at
/// `9100 + 10 * n + i`.
pub(super) struct RecordingDispatcher {
    plan: DispatcherPlan,
    state: Arc<Mutex<FactoryState>>,
}

impl RecordingDispatcher {
    pub(super) fn new(plan: DispatcherPlan, state: Arc<Mutex<FactoryState>>) -> Self {
        Self { plan, state }
    }

    fn find(&self, module: &str) -> Result<(usize, &ModulePlan), DispatcherError> {
        self.plan
            .modules
            .iter()
            .enumerate()
            .find(|(_, plan)| plan.name == module)
            .ok_or_else(|| DispatcherError::ModuleNotFound {
                module: module.to_owned(),
            })
    }

    fn summary(index: usize, plan: &ModulePlan) -> ModuleSummary {
        ModuleSummary {
            name: plan.name.clone(),
            version: plan.version.clone(),
            runtime: plan.runtime.clone(),
            threadsafe: plan.threadsafe,
            max_instances: plan.max_instances,
            balanced_address: format!("127.0.0.1:{}", 9000 + index),
            instance_addresses: (0..plan.manual_instances.unwrap_or(0))
                .map(|instance| instance_address(index, instance))
                .collect(),
        }
    }
}

fn instance_address(index: usize, instance: u32) -> String {
    format!("127.0.0.1:{}", 9100 + 10 * index + instance as usize)
}

impl Dispatcher for RecordingDispatcher {
    fn start(
        &mut self,
        _api_host: &str,
        api_port: u16,
        _grpc_apis: &[String],
    ) -> Result<(), DispatcherError> {
        let mut state = lock(&self.state);
        state.calls.push("start dispatcher".to_owned());
        state.dispatcher_api_port = Some(api_port);
        if state.dispatcher_start_fails {
            return Err(DispatcherError::PortExhausted {
                name: "front".to_owned(),
                base: self.plan.port,
            });
        }
        Ok(())
    }

    fn quit(&mut self) -> Result<(), DispatcherError> {
        lock(&self.state).calls.push("quit dispatcher".to_owned());
        Ok(())
    }

    fn get_hostname(
        &self,
        module: &str,
        version: &str,
        instance: Option<u32>,
    ) -> Result<String, DispatcherError> {
        let (index, plan) = self.find(module)?;
        if plan.version != version {
            return Err(DispatcherError::VersionNotFound {
                module: module.to_owned(),
                version: version.to_owned(),
            });
        }
        match instance {
            None => Ok(format!("127.0.0.1:{}", 9000 + index)),
            Some(instance) if instance < plan.manual_instances.unwrap_or(0) => {
                Ok(instance_address(index, instance))
            }
            Some(instance) => Err(DispatcherError::InstanceNotFound {
                module: module.to_owned(),
                instance,
            }),
        }
    }

    fn get_default_version(&self, module: &str) -> Result<String, DispatcherError> {
        self.find(module).map(|(_, plan)| plan.version.clone())
    }

    fn get_module_by_name(&self, module: &str) -> Result<ModuleSummary, DispatcherError> {
        self.find(module)
            .map(|(index, plan)| Self::summary(index, plan))
    }

    fn modules(&self) -> Vec<ModuleSummary> {
        self.plan
            .modules
            .iter()
            .enumerate()
            .map(|(index, plan)| Self::summary(index, plan))
            .collect()
    }

    fn dispatch_address(&self) -> String {
        DISPATCH_ADDRESS.to_owned()
    }
}
