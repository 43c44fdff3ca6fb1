//! 插件注册表。
//!
//! # 设计背景（Why）
//! - 插件可能在启动阶段从多个线程注册，但执行顺序必须可复现；
//! - 注册表是显式构造、按引用传递的对象，而不是进程级全局表。
//!
//! # 契约说明（What）
//! - 全序键为 `(阶段升序, 优先级降序, 注册序号升序)`，注册序号在写锁内分配，
//!   因此并发注册的结果也是确定的；
//! - 注册只追加；[`PluginRegistry::seal`] 之后拒绝再注册，并校验 `follows()` 依赖。

use std::{cmp::Reverse, collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use prism_core::CoreError;
use tracing::debug;

use crate::{ConversionPlugin, Phase};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OrderKey {
    phase: Phase,
    priority: Reverse<i32>,
    sequence: u64,
}

#[derive(Default)]
struct RegistryState {
    entries: BTreeMap<OrderKey, Arc<dyn ConversionPlugin>>,
    next_sequence: u64,
    sealed: bool,
}

/// 注册信息快照，用于诊断与测试。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub phase: Phase,
    pub priority: i32,
    pub sequence: u64,
}

#[derive(Default)]
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册插件；封存后或插件名重复时返回 [`CoreError::Registry`]。
    pub fn register(&self, plugin: Arc<dyn ConversionPlugin>) -> Result<(), CoreError> {
        let mut state = self.state.write();
        if state.sealed {
            return Err(registry_error(format!(
                "registry is sealed, cannot register `{}`",
                plugin.name()
            )));
        }
        if state.entries.values().any(|existing| existing.name() == plugin.name()) {
            return Err(registry_error(format!(
                "plugin `{}` is already registered",
                plugin.name()
            )));
        }
        let key = OrderKey {
            phase: plugin.phase(),
            priority: Reverse(plugin.priority()),
            sequence: state.next_sequence,
        };
        state.next_sequence += 1;
        debug!(
            plugin = plugin.name(),
            phase = %key.phase,
            priority = plugin.priority(),
            sequence = key.sequence,
            "plugin registered"
        );
        state.entries.insert(key, plugin);
        Ok(())
    }

    /// 校验依赖并封存；重复调用是幂等的。
    ///
    /// 每个 `follows()` 目标必须已注册，且在全序中严格排在依赖方之前。
    pub fn seal(&self) -> Result<(), CoreError> {
        let mut state = self.state.write();
        if state.sealed {
            return Ok(());
        }
        for (key, plugin) in &state.entries {
            for target in plugin.follows() {
                let position = state
                    .entries
                    .iter()
                    .find(|(_, candidate)| candidate.name() == *target)
                    .map(|(target_key, _)| *target_key);
                match position {
                    None => {
                        return Err(registry_error(format!(
                            "`{}` follows unknown plugin `{target}`",
                            plugin.name()
                        )));
                    }
                    Some(target_key) if target_key >= *key => {
                        return Err(registry_error(format!(
                            "`{}` follows `{target}`, which is ordered after it",
                            plugin.name()
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
        state.sealed = true;
        debug!(plugins = state.entries.len(), "plugin registry sealed");
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.state.read().sealed
    }

    /// 按执行顺序的插件快照。
    pub fn plugins(&self) -> Vec<Arc<dyn ConversionPlugin>> {
        self.state.read().entries.values().cloned().collect()
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.state
            .read()
            .entries
            .iter()
            .map(|(key, plugin)| Registration {
                name: plugin.name().to_owned(),
                phase: key.phase,
                priority: key.priority.0,
                sequence: key.sequence,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

fn registry_error(detail: String) -> CoreError {
    CoreError::Registry { detail }
}

#[cfg(test)]
mod tests {
    use prism_core::Element;

    use super::*;
    use crate::ConversionExecutor;

    struct Named {
        name: &'static str,
        phase: Phase,
        priority: i32,
        follows: &'static [&'static str],
    }

    impl ConversionPlugin for Named {
        fn name(&self) -> &str {
            self.name
        }

        fn phase(&self) -> Phase {
            self.phase
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn follows(&self) -> &[&'static str] {
            self.follows
        }

        fn consume(&self, _: &Arc<Element>, _: &ConversionExecutor) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn plugin(name: &'static str, phase: Phase, priority: i32, follows: &'static [&'static str]) -> Arc<dyn ConversionPlugin> {
        Arc::new(Named {
            name,
            phase,
            priority,
            follows,
        })
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let registry = PluginRegistry::new();
        for name in ["first", "second", "third"] {
            registry
                .register(plugin(name, Phase::StructuralParse, 0, &[]))
                .expect("注册成功");
        }
        let names: Vec<String> = registry.registrations().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn sealing_rejects_late_registration() {
        let registry = PluginRegistry::new();
        registry.seal().expect("空注册表可以封存");
        let err = registry
            .register(plugin("late", Phase::Correlation, 0, &[]))
            .expect_err("封存后不可注册");
        assert_eq!(err.code(), "pipeline.registry");
    }

    #[test]
    fn follows_targets_must_exist_and_come_first() {
        let registry = PluginRegistry::new();
        registry.register(plugin("json", Phase::ContentEnrichment, 0, &["http"])).expect("注册成功");
        registry.register(plugin("http", Phase::StructuralParse, 0, &[])).expect("注册成功");
        registry.seal().expect("依赖位于更早阶段");

        let inverted = PluginRegistry::new();
        inverted.register(plugin("a", Phase::StructuralParse, 5, &["b"])).expect("注册成功");
        inverted.register(plugin("b", Phase::StructuralParse, 1, &[])).expect("注册成功");
        assert!(inverted.seal().is_err());
        assert!(!inverted.is_sealed());

        let dangling = PluginRegistry::new();
        dangling.register(plugin("a", Phase::StructuralParse, 0, &["ghost"])).expect("注册成功");
        assert!(dangling.seal().is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = PluginRegistry::new();
        registry.register(plugin("http", Phase::StructuralParse, 0, &[])).expect("注册成功");
        assert!(registry.register(plugin("http", Phase::Correlation, 0, &[])).is_err());
        assert_eq!(registry.len(), 1);
    }
}
