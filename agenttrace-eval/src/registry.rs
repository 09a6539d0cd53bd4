use std::sync::Arc;

use agenttrace_core::traits::Evaluator;
use dashmap::DashMap;
use once_cell::sync::Lazy;

/// Process-wide evaluator registry keyed by `namespace.name` (spec.md §4.4
/// "Evaluator contract": "Evaluators are grouped in a process-wide registry
/// keyed by `namespace.name`"). A single `Lazy<EvaluatorRegistry>` backs the
/// whole process; individual `AuditLog`/`Runner` instances borrow from it
/// rather than owning their own copy, matching the spec's "process-wide"
/// wording literally.
pub struct EvaluatorRegistry {
    evaluators: DashMap<String, Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    fn new() -> Self {
        Self { evaluators: DashMap::new() }
    }

    pub fn register(&self, namespace: &str, evaluator: Arc<dyn Evaluator>) {
        self.evaluators.insert(format!("{namespace}.{}", evaluator.name()), evaluator);
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn Evaluator>> {
        self.evaluators.get(key).map(|e| e.clone())
    }

    pub fn all(&self) -> Vec<Arc<dyn Evaluator>> {
        self.evaluators.iter().map(|e| e.value().clone()).collect()
    }

    pub fn resolve(&self, names: &[String]) -> Vec<Arc<dyn Evaluator>> {
        if names.is_empty() {
            return self.all();
        }
        names.iter().filter_map(|n| self.get(n)).collect()
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

pub static REGISTRY: Lazy<EvaluatorRegistry> = Lazy::new(EvaluatorRegistry::new);

#[cfg(test)]
mod tests {
    use super::*;
    use agenttrace_core::domain::eval::EvalResult;
    use agenttrace_core::domain::trace::Trace;
    use agenttrace_core::error::Result;
    use async_trait::async_trait;

    struct StubEvaluator(&'static str);

    #[async_trait]
    impl Evaluator for StubEvaluator {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "stub"
        }
        async fn evaluate(&self, _trace: &Trace) -> Result<EvalResult> {
            unreachable!()
        }
    }

    #[test]
    fn resolve_empty_list_returns_everything() {
        let registry = EvaluatorRegistry::new();
        registry.register("test_ns", Arc::new(StubEvaluator("alpha")));
        registry.register("test_ns", Arc::new(StubEvaluator("beta")));
        assert_eq!(registry.resolve(&[]).len(), 2);
    }

    #[test]
    fn resolve_filters_unknown_names() {
        let registry = EvaluatorRegistry::new();
        registry.register("test_ns", Arc::new(StubEvaluator("alpha")));
        let resolved = registry.resolve(&["test_ns.alpha".to_string(), "missing.x".to_string()]);
        assert_eq!(resolved.len(), 1);
    }
}
