mod common;

use agentic_eval::model::{Severity, Stage, ToolFinding};
use agentic_eval::reasoning::{RetryPolicy, RetryingClient};
use agentic_eval::retrieval::GuidelineIndex;
use agentic_eval::{Orchestrator, ReasoningError};
use common::{registry, write, FnClient, Role, StubTool, CLEAN_VERDICT};
use std::sync::Arc;

const SQL_CONCAT: &str = r#"import sqlite3


def find_user(conn, user_id):
    query = "SELECT * FROM users WHERE id = '" + user_id + "'"
    return conn.execute(query).fetchall()
"#;

const SQL_VERDICT: &str = r#"```json
{
  "verified_violations": [
    {
      "line": 5,
      "message": "SQL injection through string concatenation",
      "proof_quote": "\"SELECT * FROM users WHERE id = '\" + user_id + \"'\"",
      "reasoning": "user_id is concatenated into the query text and executed unescaped",
      "severity": "Critical",
      "fix_suggestion": "conn.execute(\"SELECT * FROM users WHERE id = ?\", (user_id,))"
    }
  ],
  "analysis_summary": "Injectable query."
}
```"#;

#[tokio::test]
async fn test_sql_concatenation_scores_85() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "users.py", SQL_CONCAT);
    let client = FnClient::new(|role, _| match role {
        Role::Detective => Ok(
            r#"[{"line": 5, "issue": "query built by string concatenation", "type": "Security"}]"#
                .to_string(),
        ),
        _ => Ok(SQL_VERDICT.to_string()),
    });

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), client.clone());
    let results = orchestrator.run(vec![file]).await;
    let result = &results[0];

    assert_eq!(result.score, Some(85));
    assert_eq!(result.stage, Stage::Reported);
    assert_eq!(result.violations.len(), 1);
    let violation = &result.violations[0];
    assert_eq!(violation.severity, Severity::Critical);
    assert_eq!(
        violation.proof_quote,
        r#""SELECT * FROM users WHERE id = '" + user_id + "'""#
    );
    assert!(SQL_CONCAT.contains(&violation.proof_quote));

    // The judge saw the detective's candidate
    let judge_payload = &client.requests(Role::Judge)[0];
    assert!(judge_payload.contains("query built by string concatenation"));
}

#[tokio::test]
async fn test_clean_file_scores_100() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "clean.py", "def add(a, b):\n    return a + b\n");

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), FnClient::clean());
    let result = orchestrator.evaluate(&file).await;
    assert_eq!(result.score, Some(100));
    assert!(result.violations.is_empty());
    assert!(!result.judge_degraded);
    assert_eq!(result.summary, "No issues.");
}

#[tokio::test]
async fn test_retrieval_is_optional() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "db.py", "import sqlite3\nconn = sqlite3.connect(':memory:')\n");
    let index = GuidelineIndex::from_documents([
        "## Database rules\nAlways use parameterized queries for database access.",
        "## Logging rules\nUse the logging module.",
    ]);

    let with_rag = FnClient::clean();
    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), with_rag.clone())
        .with_retriever(Arc::new(index));
    assert_eq!(orchestrator.evaluate(&file).await.score, Some(100));
    assert!(with_rag.requests(Role::Detective)[0].contains("Always use parameterized queries"));

    let without_rag = FnClient::clean();
    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), without_rag.clone())
        .without_retrieval();
    let result = orchestrator.evaluate(&file).await;
    assert_eq!(result.score, Some(100));
    assert!(result.error.is_none());
    let payload = &without_rag.requests(Role::Detective)[0];
    assert!(payload.contains("Retrieval disabled or no matching guidelines"));
}

#[tokio::test]
async fn test_unreadable_file_does_not_affect_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let first = write(dir.path(), "a.py", "x = 1\n");
    let missing = dir.path().join("gone.py");
    let last = write(dir.path(), "c.py", "y = 2\n");

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), FnClient::clean())
        .with_workers(3);
    let results = orchestrator
        .run(vec![first.clone(), missing.clone(), last.clone()])
        .await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].file, first);
    assert_eq!(results[1].file, missing);
    assert_eq!(results[2].file, last);
    assert_eq!(results.iter().filter(|r| r.is_failed()).count(), 1);
    assert!(results[1].error.as_deref().unwrap().starts_with("Cannot read file"));
    assert_eq!(results[1].score, None);
    assert_eq!(results[0].score, Some(100));
    assert_eq!(results[2].score, Some(100));
}

#[tokio::test]
async fn test_retry_bound_then_degrade() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "slow.py", "x = 1\n");
    let transport = FnClient::new(|_, _| Err(ReasoningError::Timeout));
    let client = Arc::new(RetryingClient::new(transport.clone(), RetryPolicy::immediate(3)));

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), client);
    let result = orchestrator.evaluate(&file).await;

    // max_retries + 1 attempts per stage, two stages
    assert_eq!(transport.calls(), 8);
    assert_eq!(result.score, Some(100));
    assert!(result.judge_degraded);
    assert!(result.violations.is_empty());
    assert!(result.notes.iter().any(|n| n.starts_with("detective: backend unavailable")));
}

#[tokio::test]
async fn test_failing_tool_keeps_other_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "busy.py", "def handle(x):\n    return x\n");
    let client = FnClient::clean();
    let tools = vec![
        StubTool::findings(
            "pylint",
            vec![ToolFinding::new(1, "warning", "W0612", "Unused variable 'y'")],
        ),
        StubTool::failing("bandit", "'bandit' CLI not found. Install it to enable Bandit."),
        StubTool::complexity("radon", 21),
    ];

    let orchestrator = Orchestrator::new(registry(tools), client.clone());
    let result = orchestrator.evaluate(&file).await;

    assert_eq!(result.score, Some(95));
    assert!(result.notes.iter().any(|n| n.starts_with("tool bandit:")));
    let judge_payload = &client.requests(Role::Judge)[0];
    assert!(judge_payload.contains("Unused variable 'y'"));
    let detective_payload = &client.requests(Role::Detective)[0];
    assert!(detective_payload.contains("Error: 'bandit' CLI not found"));
}

#[tokio::test]
async fn test_judge_degrades_after_failed_repair() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "messy.py", "def handle(x):\n    return x\n");
    let client = FnClient::new(|role, _| match role {
        Role::Detective => Ok("[]".to_string()),
        Role::Judge => Ok("Looks fine to me!".to_string()),
        Role::Repair => Ok("Sorry, I cannot help.".to_string()),
    });

    let orchestrator = Orchestrator::new(
        registry(vec![StubTool::complexity("radon", 16)]),
        client.clone(),
    );
    let result = orchestrator.evaluate(&file).await;

    assert!(result.judge_degraded);
    assert!(result.violations.is_empty());
    // Complexity penalty still applies
    assert_eq!(result.score, Some(95));
    assert_eq!(client.requests(Role::Repair).len(), 1);
    assert!(result.notes.iter().any(|n| n.contains("repair failed")));
}

#[tokio::test]
async fn test_refiner_repairs_judge_json() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "users.py", SQL_CONCAT);
    let client = FnClient::new(|role, _| match role {
        Role::Detective => Ok("[]".to_string()),
        Role::Judge => Ok("{\"verified_violations\": [ {\"line\": 5 ".to_string()),
        Role::Repair => Ok(SQL_VERDICT.to_string()),
    });

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), client);
    let result = orchestrator.evaluate(&file).await;
    assert!(!result.judge_degraded);
    assert_eq!(result.score, Some(85));
}

#[tokio::test]
async fn test_fabricated_quote_never_survives() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "clean.py", "def add(a, b):\n    return a + b\n");
    let client = FnClient::new(|role, _| match role {
        Role::Detective => Ok("[]".to_string()),
        _ => Ok(r#"{"verified_violations": [
            {"line": 2, "message": "eval", "proof_quote": "eval(user_input)",
             "reasoning": "arbitrary code execution", "severity": "Critical"},
            {"line": 2, "message": "odd", "proof_quote": "return a + b",
             "reasoning": "fine really", "severity": "Blocker"}
        ], "analysis_summary": "x"}"#
            .to_string()),
    });

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), client);
    let result = orchestrator.evaluate(&file).await;
    assert_eq!(result.score, Some(100));
    assert!(result.violations.is_empty());
    assert_eq!(
        result
            .notes
            .iter()
            .filter(|n| n.starts_with("judge: dropped violation"))
            .count(),
        2
    );
}

#[tokio::test]
async fn test_results_follow_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<_> = (0..12)
        .map(|i| write(dir.path(), &format!("m{:02}.py", 11 - i), "x = 1\n"))
        .collect();

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), FnClient::clean())
        .with_workers(4);
    let results = orchestrator.run(files.clone()).await;
    let order: Vec<_> = results.iter().map(|r| r.file.clone()).collect();
    assert_eq!(order, files);
    assert!(results.iter().all(|r| r.stage == Stage::Reported));
}

#[tokio::test]
async fn test_language_override_forces_profile() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(dir.path(), "Program.txt", "class Program { static void Main() {} }\n");
    let client = FnClient::new(|role, _| match role {
        Role::Detective => Ok("[]".to_string()),
        _ => Ok(CLEAN_VERDICT.to_string()),
    });

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), client.clone())
        .with_language(Some("csharp".to_string()));
    let result = orchestrator.evaluate(&file).await;
    assert_eq!(result.language, "csharp");
    assert_eq!(result.score, Some(100));
    assert!(client.requests(Role::Judge)[0].contains("```csharp"));
}

#[tokio::test]
async fn test_salvaged_verdict_keeps_typographic_quote() {
    let dir = tempfile::tempdir().unwrap();
    let file = write(
        dir.path(),
        "greet.py",
        "def greet(name):\n    print(\"It\u{2019}s \" + name)\n",
    );
    // Trailing comma forces the salvage path
    let verdict = "{\"verified_violations\": [{\"line\": 2, \"message\": \"Concatenated output\", \
        \"proof_quote\": \"print(\\\"It\u{2019}s \\\" + name)\", \
        \"reasoning\": \"string built by concatenation instead of formatting\", \
        \"severity\": \"Minor\"},], \"analysis_summary\": \"Style.\"}";
    let client = FnClient::new(move |role, _| match role {
        Role::Detective => Ok("[]".to_string()),
        _ => Ok(verdict.to_string()),
    });

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), client.clone());
    let result = orchestrator.evaluate(&file).await;
    assert_eq!(result.violations.len(), 1, "{:?}", result.notes);
    assert_eq!(result.violations[0].proof_quote, "print(\"It\u{2019}s \" + name)");
    assert_eq!(result.score, Some(98));
    assert!(client.requests(Role::Repair).is_empty());
}

#[tokio::test]
async fn test_legacy_encoded_file_is_scored() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("legacy.py");
    std::fs::write(&file, b"# caf\xe9\nx = 1\n").unwrap();

    let orchestrator = Orchestrator::new(registry(vec![StubTool::clean("lint")]), FnClient::clean());
    let result = orchestrator.evaluate(&file).await;
    assert_eq!(result.score, Some(100));
    assert_eq!(result.stage, Stage::Scored);
    assert!(result.notes.iter().any(|n| n.contains("invalid UTF-8")));
}
