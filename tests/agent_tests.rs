//! Integration tests for the agent pipeline
//!
//! These tests drive the session and orchestrator against a stub content
//! service. Tests that execute Python return early when no `python3` is on
//! PATH; the live API test is marked #[ignore].

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use yt_agent::agent::{
    AgentConfig, AgentOrchestrator, AgentSession, AgentState, AutoApprove, CodeSource, ContentHash,
    LlmCapability, EXECUTION_SKIPPED, OFFLINE_MARKER,
};
use yt_agent::gemini::{
    CachedContent, ContentService, CreateCachedContentRequest, GeminiError, GenerateContentRequest,
};
use yt_agent::knowledge::KnowledgeBaseLoader;
use yt_agent::sandbox::SandboxExecutor;

/// Stub service that answers every generation with a fixed reply
#[derive(Default)]
struct StubService {
    reply: String,
    listing: Vec<CachedContent>,
    /// Fail generation with HTTP 500
    fail_generation: bool,
    /// Report any cached reference as missing
    reject_cached: bool,
    requests: Mutex<Vec<GenerateContentRequest>>,
    created: Mutex<Vec<CreateCachedContentRequest>>,
    list_calls: Mutex<usize>,
}

impl StubService {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::default()
        }
    }

    fn requests(&self) -> Vec<GenerateContentRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentService for StubService {
    async fn generate_content(
        &self,
        _model: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, GeminiError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.reject_cached && request.cached_content.is_some() {
            return Err(GeminiError::CacheNotFound("CachedContent not found".to_string()));
        }
        if self.fail_generation {
            return Err(GeminiError::Status {
                code: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(self.reply.clone())
    }

    async fn list_cached_contents(&self) -> Result<Vec<CachedContent>, GeminiError> {
        *self.list_calls.lock().unwrap() += 1;
        Ok(self.listing.clone())
    }

    async fn create_cached_content(
        &self,
        request: &CreateCachedContentRequest,
    ) -> Result<CachedContent, GeminiError> {
        self.created.lock().unwrap().push(request.clone());
        Ok(CachedContent {
            name: "cachedContents/created".to_string(),
            display_name: request.display_name.clone(),
            model: request.model.clone(),
            expire_time: None,
        })
    }
}

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn test_config(root: &Path) -> AgentConfig {
    AgentConfig {
        knowledge_base_dir: root.join("knowledge_base"),
        history_file: root.join("history.log"),
        ..AgentConfig::default()
    }
}

/// Write a knowledge document of roughly `chars` characters
fn write_doc(root: &Path, name: &str, chars: usize) {
    let dir = root.join("knowledge_base");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(name), "SlicePlot ".repeat(chars / 10)).unwrap();
}

async fn connected(config: AgentConfig, service: &Arc<StubService>) -> AgentOrchestrator {
    let service: Arc<dyn ContentService> = service.clone();
    let capability = LlmCapability::Connected(service);
    AgentOrchestrator::new(AgentSession::with_capability(config, capability).await)
}

/// Empty knowledge base, stub reply, real execution, one history record
#[tokio::test]
async fn test_end_to_end_inline_generation_and_execution() {
    if !python_available() {
        eprintln!("python3 not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let service = Arc::new(StubService::replying("```python\nprint(1+1)\n```"));
    let agent = connected(config.clone(), &service).await;

    assert!(agent.session().context().is_empty());
    assert!(agent.session().cache_handle().await.is_none());
    assert_eq!(*service.list_calls.lock().unwrap(), 0);

    let report = agent.run("add one and one", true).await;

    let requests = service.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].cached_content.is_none());
    assert!(requests[0].contents[0].text().contains("CONTEXT:\n\n\nUSER REQUEST:\nadd one and one"));

    assert_eq!(report.generation.code, "print(1+1)");
    assert_eq!(report.generation.source, CodeSource::Model);
    let execution = report.execution.as_ref().unwrap();
    assert_eq!(execution.stdout, "2\n");
    assert_eq!(execution.stderr, "");
    assert!(execution.exception.is_none());
    assert!(report.success);
    assert_eq!(report.state, AgentState::Completed);

    let history = std::fs::read_to_string(&config.history_file).unwrap();
    assert_eq!(history.matches("--- Interaction ").count(), 1);
    assert!(history.contains("success: true"));
}

#[tokio::test]
async fn test_degraded_mode_without_credential() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let capability = LlmCapability::resolve(&config, |_| None);
    assert!(!capability.is_connected());

    let agent = AgentOrchestrator::new(AgentSession::with_capability(config, capability).await);
    let outcome = agent.generate("list available fields").await;

    assert!(!outcome.code.trim().is_empty());
    assert!(outcome.code.contains(OFFLINE_MARKER));
    assert_eq!(outcome.source, CodeSource::Placeholder);
    assert_eq!(outcome.state, AgentState::CodeReady);
    assert!(!outcome.used_cache);
}

#[tokio::test]
async fn test_reuses_existing_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "slices.md", 1500);
    let config = test_config(dir.path());

    let context = KnowledgeBaseLoader::new(&config.knowledge_base_dir).load();
    let service = Arc::new(StubService {
        reply: "```python\nimport yt\n```".to_string(),
        listing: vec![CachedContent {
            name: "cachedContents/existing".to_string(),
            display_name: ContentHash::of(&context).display_name(),
            model: "models/gemini-2.0-flash-001".to_string(),
            expire_time: None,
        }],
        ..StubService::default()
    });

    let agent = connected(config, &service).await;
    let handle = agent.session().cache_handle().await.unwrap();
    assert_eq!(handle.remote_id, "cachedContents/existing");
    assert!(service.created.lock().unwrap().is_empty());

    let outcome = agent.generate("make a slice plot").await;
    assert!(outcome.used_cache);
    assert_eq!(outcome.code, "import yt");

    let requests = service.requests();
    assert_eq!(requests[0].cached_content.as_deref(), Some("cachedContents/existing"));
    assert!(!requests[0].contents[0].text().contains("SlicePlot"));
}

#[tokio::test]
async fn test_creates_cache_only_above_threshold() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "slices.md", 1500);
    let service = Arc::new(StubService::replying("print('ok')"));
    let agent = connected(test_config(dir.path()), &service).await;

    let handle = agent.session().cache_handle().await.unwrap();
    assert_eq!(handle.remote_id, "cachedContents/created");
    let created = service.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].ttl, "7200s");
    assert!(created[0].display_name.starts_with("yt-agent-kb-"));

    let small = tempfile::tempdir().unwrap();
    write_doc(small.path(), "tiny.md", 100);
    let service = Arc::new(StubService::replying("print('ok')"));
    let agent = connected(test_config(small.path()), &service).await;

    assert!(agent.session().cache_handle().await.is_none());
    assert!(service.created.lock().unwrap().is_empty());
    assert!(!agent.generate("q").await.used_cache);
}

#[tokio::test]
async fn test_missing_cache_falls_back_to_inline_context() {
    let dir = tempfile::tempdir().unwrap();
    write_doc(dir.path(), "slices.md", 1500);
    let service = Arc::new(StubService {
        reply: "```python\nprint('inline')\n```".to_string(),
        reject_cached: true,
        ..StubService::default()
    });
    let agent = connected(test_config(dir.path()), &service).await;
    assert!(agent.session().cache_handle().await.is_some());

    let outcome = agent.generate("make a slice plot").await;
    assert_eq!(outcome.source, CodeSource::Model);
    assert_eq!(outcome.code, "print('inline')");
    assert!(!outcome.used_cache);

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].cached_content.is_some());
    assert!(requests[1].cached_content.is_none());
    assert!(requests[1].contents[0].text().contains("SlicePlot"));

    // The handle is gone for the rest of the session
    assert!(agent.session().cache_handle().await.is_none());
    agent.generate("again").await;
    assert_eq!(service.requests().len(), 3);
    assert!(service.requests()[2].cached_content.is_none());
}

#[tokio::test]
async fn test_generation_failure_never_executes() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let service = Arc::new(StubService {
        fail_generation: true,
        ..StubService::default()
    });
    let agent = connected(config.clone(), &service).await;

    let report = agent.run("plot density", true).await;
    assert_eq!(report.generation.state, AgentState::GenerationFailed);
    assert_eq!(report.generation.source, CodeSource::ErrorComment);
    assert!(report.generation.code.starts_with("# Error generating code:"));
    assert!(!report.executed());
    assert!(!report.success);
    assert_eq!(report.output_log, EXECUTION_SKIPPED);

    let history = std::fs::read_to_string(&config.history_file).unwrap();
    assert!(history.contains("success: false"));
    assert!(history.contains("# Error generating code:"));
}

#[tokio::test]
async fn test_unapproved_code_is_logged_but_not_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let service = Arc::new(StubService::replying("```\ntouch should_not_exist\n```"));
    let agent = connected(config.clone(), &service)
        .await
        .with_executor(SandboxExecutor::shell());

    let report = agent.run("create a file", false).await;
    assert!(!report.executed());
    assert_eq!(report.output_log, EXECUTION_SKIPPED);
    assert!(!Path::new("should_not_exist").exists());

    let history = std::fs::read_to_string(&config.history_file).unwrap();
    assert!(history.contains("query: create a file"));
}

#[tokio::test]
async fn test_gate_approval_runs_code() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(StubService::replying("```sh\necho approved\n```"));
    let agent = connected(test_config(dir.path()), &service)
        .await
        .with_executor(SandboxExecutor::shell())
        .with_gate(AutoApprove);

    let report = agent.run("say approved", false).await;
    assert!(report.success);
    assert_eq!(report.execution.unwrap().stdout, "approved\n");
}

#[tokio::test]
async fn test_execution_fault_is_reported() {
    if !python_available() {
        eprintln!("python3 not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let service = Arc::new(StubService::replying("```python\nprint('before')\n1/0\n```"));
    let agent = connected(config.clone(), &service).await;

    let report = agent.run("divide by zero", true).await;
    assert!(!report.success);
    let execution = report.execution.unwrap();
    assert_eq!(execution.stdout, "before\n");
    assert!(execution.stderr.contains("ZeroDivisionError"));
    assert!(report.output_log.contains("EXCEPTION:\nZeroDivisionError"));

    let history = std::fs::read_to_string(&config.history_file).unwrap();
    assert!(history.contains("success: false"));
}

/// Live round trip against the Generative Language API
#[tokio::test]
#[ignore = "Requires GOOGLE_API_KEY and network access"]
async fn test_live_generation() {
    let dir = tempfile::tempdir().unwrap();
    let session = AgentSession::establish(test_config(dir.path())).await;
    assert!(session.capability().is_connected());

    let agent = AgentOrchestrator::new(session);
    let outcome = agent.generate("print the yt version").await;
    assert_eq!(outcome.source, CodeSource::Model);
    assert!(!outcome.code.is_empty());
}
