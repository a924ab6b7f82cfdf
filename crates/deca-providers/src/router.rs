//! Priority-ordered, capability-gated provider selection with fallback.

use std::sync::Arc;

use tracing::{info, warn};

use crate::types::{satisfies, ExecRequest, ExecResult, FallbackInfo, Provider};

pub struct ProviderRouter {
    providers: Vec<Arc<dyn Provider>>,
    priority: Vec<String>,
}

impl ProviderRouter {
    /// `priority` orders candidates by name; registered providers not named
    /// in it are appended in registration order.
    pub fn new(providers: Vec<Arc<dyn Provider>>, priority: Vec<String>) -> Self {
        Self {
            providers,
            priority,
        }
    }

    /// All registered providers, for `/capabilities` and `/providers`.
    pub fn all(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// Candidate list for a request.
    ///
    /// An explicitly pinned provider yields a single-element list, or an
    /// empty one when the name is unknown. Otherwise providers are ordered by
    /// the priority list and filtered by the request's capability needs.
    pub fn select(&self, req: &ExecRequest) -> Vec<Arc<dyn Provider>> {
        if let Some(name) = &req.provider {
            return self
                .providers
                .iter()
                .find(|p| p.name() == name)
                .cloned()
                .into_iter()
                .collect();
        }

        let mut ordered: Vec<Arc<dyn Provider>> = Vec::new();
        for name in &self.priority {
            if let Some(p) = self.providers.iter().find(|p| p.name() == name) {
                ordered.push(Arc::clone(p));
            }
        }
        for p in &self.providers {
            if !ordered.iter().any(|o| o.name() == p.name()) {
                ordered.push(Arc::clone(p));
            }
        }

        ordered
            .into_iter()
            .filter(|p| satisfies(&p.capabilities(), req))
            .collect()
    }

    /// Execute with fallback: walk the candidate list, skip providers whose
    /// availability probe fails, return the first result. The result is
    /// decorated with the winner's name and the fallback trail.
    pub async fn exec(&self, req: &ExecRequest) -> ExecResult {
        let candidates = self.select(req);
        if candidates.is_empty() {
            warn!(provider = ?req.provider, "no provider matches request");
            return ExecResult::no_provider(Vec::new());
        }

        let mut attempted: Vec<String> = Vec::new();
        for provider in &candidates {
            if !provider.is_available().await {
                info!(provider = provider.name(), "provider unavailable, falling through");
                attempted.push(provider.name().to_string());
                continue;
            }

            let mut result = provider.exec(req).await;
            result.provider = provider.name().to_string();
            let used = !attempted.is_empty();
            result.fallback = Some(FallbackInfo {
                used,
                reason: used.then(|| format!("{} unavailable", attempted.join(", "))),
                attempted: attempted.clone(),
            });
            return result;
        }

        warn!(attempted = ?attempted, "all providers unavailable");
        ExecResult::no_provider(attempted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capabilities, Isolation};
    use async_trait::async_trait;

    struct FakeProvider {
        name: &'static str,
        available: bool,
        caps: Capabilities,
    }

    fn fake(name: &'static str, available: bool) -> Arc<dyn Provider> {
        fake_with_caps(
            name,
            available,
            Capabilities {
                isolation: Isolation::Process,
                networking: true,
                workspace: true,
            },
        )
    }

    fn fake_with_caps(
        name: &'static str,
        available: bool,
        caps: Capabilities,
    ) -> Arc<dyn Provider> {
        Arc::new(FakeProvider {
            name,
            available,
            caps,
        })
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }
        fn capabilities(&self) -> Capabilities {
            self.caps
        }
        async fn is_available(&self) -> bool {
            self.available
        }
        async fn exec(&self, _req: &ExecRequest) -> ExecResult {
            ExecResult {
                success: true,
                exit_code: Some(0),
                stdout: format!("ran on {}", self.name),
                stderr: String::new(),
                elapsed_ms: 1,
                provider: String::new(),
                fallback: None,
            }
        }
    }

    fn priority() -> Vec<String> {
        vec!["codex".into(), "native".into()]
    }

    fn req(command: &str) -> ExecRequest {
        ExecRequest {
            command: command.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn falls_back_past_unavailable_provider() {
        let router = ProviderRouter::new(
            vec![
                fake("codex", false),
                fake("native", true),
            ],
            priority(),
        );
        let result = router.exec(&req("echo")).await;
        assert!(result.success);
        assert_eq!(result.provider, "native");
        let fallback = result.fallback.unwrap();
        assert!(fallback.used);
        assert_eq!(fallback.attempted, vec!["codex"]);
    }

    #[tokio::test]
    async fn first_choice_reports_no_fallback() {
        let router = ProviderRouter::new(
            vec![
                fake("codex", true),
                fake("native", true),
            ],
            priority(),
        );
        let result = router.exec(&req("echo")).await;
        assert_eq!(result.provider, "codex");
        assert!(!result.fallback.unwrap().used);
    }

    #[tokio::test]
    async fn pinned_provider_bypasses_priority() {
        let router = ProviderRouter::new(
            vec![
                fake("codex", true),
                fake("native", true),
            ],
            priority(),
        );
        let mut r = req("echo");
        r.provider = Some("native".into());
        let result = router.exec(&r).await;
        assert_eq!(result.provider, "native");
    }

    #[tokio::test]
    async fn unknown_pinned_provider_fails() {
        let router = ProviderRouter::new(vec![fake("native", true)], priority());
        let mut r = req("echo");
        r.provider = Some("mystery".into());
        let result = router.exec(&r).await;
        assert!(!result.success);
        assert_eq!(result.stderr, "no_provider_available");
    }

    #[tokio::test]
    async fn all_unavailable_yields_synthetic_failure() {
        let router = ProviderRouter::new(
            vec![
                fake("codex", false),
                fake("native", false),
            ],
            priority(),
        );
        let result = router.exec(&req("echo")).await;
        assert!(!result.success);
        assert_eq!(result.stderr, "no_provider_available");
        assert_eq!(
            result.fallback.unwrap().attempted,
            vec!["codex", "native"]
        );
    }

    #[tokio::test]
    async fn capability_needs_filter_candidates() {
        let no_net = fake_with_caps(
            "codex",
            true,
            Capabilities {
                isolation: Isolation::Process,
                networking: false,
                workspace: true,
            },
        );
        let router = ProviderRouter::new(
            vec![no_net, fake("native", true)],
            priority(),
        );
        let mut r = req("curl example.com");
        r.needs_network = true;
        let result = router.exec(&r).await;
        assert_eq!(result.provider, "native");
        // codex was filtered out, not "attempted".
        assert!(!result.fallback.unwrap().used);
    }
}
