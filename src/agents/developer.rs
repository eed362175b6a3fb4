use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::base::{array_field, has_truthy, is_success, str_field, task_kind, Agent, AgentContext, AgentCore};
use super::errors::{AgentError, AgentResult};
use super::prompts::{library, PromptTemplate};
use crate::domain::agent::AgentRole;

const RESPONSE_TIME_LIMIT_MS: f64 = 200.0;
const MEMORY_LIMIT_MB: f64 = 100.0;
const CPU_LIMIT_PERCENT: f64 = 80.0;
const LONG_FILE_LINES: usize = 400;
const LONG_LINE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    Python,
    JavaScript,
    TypeScript,
    Java,
    Go,
    Rust,
}

impl CodeLanguage {
    /// Unknown names fall back to Python
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "javascript" | "js" => Self::JavaScript,
            "typescript" | "ts" => Self::TypeScript,
            "java" => Self::Java,
            "go" | "golang" => Self::Go,
            "rust" => Self::Rust,
            _ => Self::Python,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::JavaScript => "js",
            Self::TypeScript => "ts",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rs",
        }
    }

    pub fn test_command(&self) -> &'static str {
        match self {
            Self::Python => "python -m pytest --tb=short",
            Self::JavaScript | Self::TypeScript => "npm test",
            Self::Java => "mvn test",
            Self::Go => "go test ./...",
            Self::Rust => "cargo test",
        }
    }

    pub fn test_framework(&self) -> &'static str {
        match self {
            Self::Python => "pytest",
            Self::JavaScript | Self::TypeScript => "jest",
            Self::Java => "junit",
            Self::Go => "go test",
            Self::Rust => "cargo test",
        }
    }

    fn comment(&self) -> &'static str {
        match self {
            Self::Python => "#",
            _ => "//",
        }
    }
}

/// A file the developer would write, kept in memory instead of touching disk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedFile {
    pub path: String,
    pub kind: String,
    pub content: String,
}

impl PlannedFile {
    fn new(path: String, kind: &str, content: String) -> Self {
        Self {
            path,
            kind: kind.to_string(),
            content,
        }
    }
}

/// Lowercase, underscore separated name usable in file paths
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "feature".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Directories created for a new project
pub fn project_directories(language: CodeLanguage) -> Vec<&'static str> {
    match language {
        CodeLanguage::Python => vec!["src", "tests", "docs", "scripts", "config", ".github/workflows"],
        _ => vec!["src", "tests", "docs"],
    }
}

fn project_files(language: CodeLanguage, name: &str, description: &str) -> Vec<PlannedFile> {
    let readme = PlannedFile::new("README.md".into(), "documentation", format!("# {name}\n\n{description}\n"));
    let mut files = match language {
        CodeLanguage::Python => vec![
            PlannedFile::new(
                "requirements.txt".into(),
                "dependencies",
                "pytest>=7.0.0\nblack>=22.0.0\nisort>=5.0.0\n".into(),
            ),
            PlannedFile::new(
                "pyproject.toml".into(),
                "config",
                "[tool.black]\nline-length = 100\n".into(),
            ),
            PlannedFile::new(".gitignore".into(), "config", "__pycache__/\n*.pyc\n.venv/\n".into()),
        ],
        CodeLanguage::Rust => vec![
            PlannedFile::new(
                "Cargo.toml".into(),
                "dependencies",
                format!("[package]\nname = \"{}\"\nversion = \"0.1.0\"\nedition = \"2021\"\n", slug(name)),
            ),
            PlannedFile::new(".gitignore".into(), "config", "/target\n".into()),
        ],
        CodeLanguage::JavaScript | CodeLanguage::TypeScript => vec![
            PlannedFile::new(
                "package.json".into(),
                "dependencies",
                format!("{{\n  \"name\": \"{}\",\n  \"scripts\": {{ \"test\": \"jest\" }}\n}}\n", slug(name)),
            ),
            PlannedFile::new(".gitignore".into(), "config", "node_modules/\n".into()),
        ],
        CodeLanguage::Java | CodeLanguage::Go => vec![],
    };
    files.push(readme);
    files
}

fn source_stub(language: CodeLanguage, name: &str, kind: &str, description: &str) -> String {
    let c = language.comment();
    format!("{c} {name} {kind}\n{c} {description}\n")
}

fn test_cases() -> [&'static str; 4] {
    ["test_initialization", "test_main_functionality", "test_error_handling", "test_edge_cases"]
}

/// Root cause guessed from keywords in a bug description
pub fn likely_root_cause(description: &str) -> &'static str {
    let text = description.to_lowercase();
    if text.contains("null") || text.contains("none") || text.contains("nil") {
        "Missing null check before use"
    } else if text.contains("timeout") || text.contains("hang") {
        "Blocking call without a timeout"
    } else if text.contains("race") || text.contains("concurren") {
        "Unsynchronized shared state"
    } else {
        "Logic error in request handling"
    }
}

/// Developer: implementation plans, fixes and tests as in-memory file manifests
pub struct DeveloperAgent {
    core: AgentCore,
    default_language: CodeLanguage,
    history: Vec<Value>,
}

impl DeveloperAgent {
    pub fn new(core: AgentCore) -> Self {
        Self {
            core,
            default_language: CodeLanguage::Python,
            history: Vec::new(),
        }
    }

    pub fn with_id(id: &str, context_max_tokens: usize) -> Self {
        Self::new(AgentCore::new(id, AgentRole::Developer, "deepseek", context_max_tokens))
    }

    pub fn with_language(mut self, language: CodeLanguage) -> Self {
        self.default_language = language;
        self
    }

    /// Summaries of completed work, newest last
    pub fn history(&self) -> &[Value] {
        &self.history
    }

    fn language(&self, task: &Value) -> CodeLanguage {
        task.get("language")
            .and_then(Value::as_str)
            .map(CodeLanguage::parse)
            .unwrap_or(self.default_language)
    }

    fn record(&mut self, kind: &str, summary: Value) {
        self.history.push(json!({
            "kind": kind,
            "summary": summary,
            "completed_at": Utc::now().to_rfc3339(),
        }));
    }

    fn implement_feature(&mut self, task: &Value) -> Value {
        let spec = task.get("feature_specification").cloned().unwrap_or_else(|| json!({}));
        let name = slug(str_field(&spec, "name", "feature"));
        let description = str_field(&spec, "description", "");
        let language = self.language(task);
        let ext = language.extension();
        info!(feature = %name, ?language, "Implementing feature");

        let mut files_to_create = vec![
            (format!("src/{name}.{ext}"), "implementation"),
            (format!("src/models/{name}_model.{ext}"), "model"),
        ];
        if spec.get("api").and_then(Value::as_bool).unwrap_or(false) {
            files_to_create.push((format!("src/api/{name}_routes.{ext}"), "api_endpoint"));
        }

        let generated: Vec<PlannedFile> = files_to_create
            .iter()
            .map(|(path, kind)| PlannedFile::new(path.clone(), kind, source_stub(language, &name, kind, description)))
            .collect();

        let mut tests = Vec::new();
        if task.get("include_tests").and_then(Value::as_bool).unwrap_or(true) {
            tests.push(PlannedFile::new(
                format!("tests/test_{name}.{ext}"),
                "unit_test",
                test_cases().join("\n"),
            ));
            if files_to_create.iter().any(|(_, kind)| kind.contains("api")) {
                tests.push(PlannedFile::new(
                    format!("tests/integration/test_{name}_api.{ext}"),
                    "integration_test",
                    ["test_api_endpoints", "test_request_validation", "test_response_format"].join("\n"),
                ));
            }
        }

        let plan = json!({
            "approach": "incremental_development",
            "files_to_create": files_to_create
                .iter()
                .map(|(path, kind)| json!({"path": path, "type": kind}))
                .collect::<Vec<_>>(),
            "tests_to_write": tests.iter().map(|t| &t.path).collect::<Vec<_>>(),
            "estimated_complexity": if files_to_create.len() > 2 { "high" } else { "medium" },
            "implementation_order": ["models", "core_logic", "api_endpoints", "tests"],
        });

        let result = json!({
            "feature_name": name,
            "language": language,
            "implementation_plan": plan,
            "generated_files": generated,
            "test_files": tests,
            "test_results": task.get("test_results").cloned().unwrap_or_else(|| json!({})),
            "documentation": {
                "feature_overview": description,
                "testing_instructions": language.test_command(),
            },
        });
        self.record("implementation", json!({"feature": name, "files": generated.len()}));

        json!({"status": "success", "implementation": result})
    }

    fn fix_bug(&mut self, task: &Value) -> Value {
        let report = task.get("bug_report").cloned().unwrap_or_else(|| json!({}));
        let title = str_field(&report, "title", "Unknown Bug");
        let description = str_field(&report, "description", title);
        let language = self.language(task);
        info!(bug = title, "Fixing bug");

        let root_cause = likely_root_cause(description);
        let fixed_files: Vec<Value> = array_field(&report, "affected_files")
            .iter()
            .filter_map(Value::as_str)
            .map(|path| json!({"path": path, "changes": ["Add input validation", "Handle the failing case explicitly"]}))
            .collect();
        if fixed_files.is_empty() {
            warn!(bug = title, "Bug report names no affected files");
        }

        let regression = PlannedFile::new(
            format!("tests/test_{}_regression.{}", slug(title), language.extension()),
            "regression_test",
            format!("{} reproduces: {description}", language.comment()),
        );
        let test_results = task.get("test_results").cloned().unwrap_or_else(|| json!({}));
        let passed = test_results.get("passed").and_then(Value::as_bool).unwrap_or(false);

        let fix = json!({
            "bug_title": title,
            "root_cause": {
                "root_cause": root_cause,
                "severity": str_field(&report, "severity", "medium"),
            },
            "fix_strategy": "Add input validation and improve error handling",
            "fixed_files": fixed_files,
            "regression_tests": [regression],
            "test_results": test_results,
            "verification": {
                "fixed": passed,
                "verification_method": "automated_tests",
                "confidence": if passed { "high" } else { "low" },
            },
        });
        self.record("bug_fix", json!({"bug": title, "verified": passed}));

        json!({"status": "success", "bug_fix": fix})
    }

    fn write_tests(&mut self, task: &Value) -> Value {
        let language = self.language(task);
        let framework = str_field(task, "framework", language.test_framework());
        let sources: Vec<&str> = array_field(task, "code_files").iter().filter_map(Value::as_str).collect();
        info!(count = sources.len(), framework, "Writing tests");

        let created: Vec<Value> = sources
            .iter()
            .map(|source| {
                let stem = source
                    .rsplit('/')
                    .next()
                    .and_then(|file| file.split('.').next())
                    .unwrap_or("module");
                let cases = test_cases();
                json!({
                    "source_file": source,
                    "test_file": format!("tests/test_{stem}.{}", language.extension()),
                    "test_cases": cases,
                    "test_cases_count": cases.len(),
                })
            })
            .collect();
        let total: u64 = created.iter().filter_map(|c| c["test_cases_count"].as_u64()).sum();
        self.record("test_writing", json!({"files": created.len()}));

        json!({
            "status": "success",
            "test_writing": {
                "framework": framework,
                "test_files_created": created,
                "total_test_cases": total,
                "run_command": language.test_command(),
            },
        })
    }

    fn refactor_code(&self, task: &Value) -> Value {
        let files = array_field(task, "files");
        let goals: Vec<&str> = match task.get("goals").and_then(Value::as_array) {
            Some(list) => list.iter().filter_map(Value::as_str).collect(),
            None => vec!["readability"],
        };

        let techniques: Vec<&str> = goals
            .iter()
            .map(|goal| match *goal {
                "performance" => "Remove redundant work in hot paths",
                "testability" => "Inject dependencies through constructors",
                "duplication" => "Extract shared helpers",
                _ => "Extract functions and rename for intent",
            })
            .collect();
        let plan: Vec<Value> = files
            .iter()
            .map(|file| {
                let path = file.as_str().unwrap_or_else(|| str_field(file, "path", "unknown"));
                json!({"file": path, "techniques": techniques, "behaviour_preserving": true})
            })
            .collect();

        json!({
            "status": "success",
            "refactoring": {
                "plan": plan,
                "goals": goals,
                "risk": if files.len() > 10 { "high" } else { "low" },
                "requires_regression_run": true,
            },
        })
    }

    fn code_review(&self, task: &Value) -> Value {
        let files = array_field(task, "files");
        let mut issues = Vec::new();

        for file in files {
            let path = str_field(file, "path", "unknown");
            let content = str_field(file, "content", "");
            let lines: Vec<&str> = content.lines().collect();

            if lines.len() > LONG_FILE_LINES {
                issues.push(json!({"file": path, "severity": "medium", "issue": "File is long enough to split"}));
            }
            for (no, line) in lines.iter().enumerate() {
                if line.chars().count() > LONG_LINE_CHARS {
                    issues.push(json!({"file": path, "line": no + 1, "severity": "low", "issue": "Line too long"}));
                }
                if line.contains("TODO") || line.contains("FIXME") {
                    issues.push(json!({"file": path, "line": no + 1, "severity": "low", "issue": "Unresolved marker"}));
                }
                if line.contains("password =") || line.contains("secret =") {
                    issues.push(json!({"file": path, "line": no + 1, "severity": "high", "issue": "Possible hardcoded credential"}));
                }
            }
        }

        let blocking = issues.iter().any(|i| i["severity"] == "high");
        let score = (10.0 - 0.5 * issues.len() as f64).max(0.0);

        json!({
            "status": "success",
            "code_review": {
                "files_reviewed": files.len(),
                "issues": issues,
                "score": score,
                "approved": !blocking,
            },
        })
    }

    fn optimize_performance(&self, task: &Value) -> Value {
        let metrics = task.get("metrics").cloned().unwrap_or_else(|| json!({}));
        let metric = |key: &str| metrics.get(key).and_then(Value::as_f64);
        let mut findings = Vec::new();

        if let Some(ms) = metric("response_time_ms").filter(|ms| *ms > RESPONSE_TIME_LIMIT_MS) {
            findings.push(json!({
                "metric": "response_time_ms",
                "value": ms,
                "limit": RESPONSE_TIME_LIMIT_MS,
                "suggestion": "Cache repeated queries and add indexes for slow lookups",
            }));
        }
        if let Some(mb) = metric("memory_mb").filter(|mb| *mb > MEMORY_LIMIT_MB) {
            findings.push(json!({
                "metric": "memory_mb",
                "value": mb,
                "limit": MEMORY_LIMIT_MB,
                "suggestion": "Stream large payloads instead of buffering them",
            }));
        }
        if let Some(cpu) = metric("cpu_percent").filter(|cpu| *cpu > CPU_LIMIT_PERCENT) {
            findings.push(json!({
                "metric": "cpu_percent",
                "value": cpu,
                "limit": CPU_LIMIT_PERCENT,
                "suggestion": "Profile hot loops and move heavy work off the request path",
            }));
        }

        json!({
            "status": "success",
            "performance_optimization": {
                "within_limits": findings.is_empty(),
                "findings": findings,
            },
        })
    }

    fn setup_project(&mut self, task: &Value, ctx: &AgentContext) -> Value {
        let config = task.get("project_config").cloned().unwrap_or_else(|| json!({}));
        let name = str_field(&config, "name", "New Project");
        let language = self.language(task);
        let path = str_field(task, "project_path", "./new_project");
        info!(project = name, ?language, path, "Setting up project");

        let files = project_files(language, name, str_field(&config, "description", "Project description"));
        self.record("project_setup", json!({"project": name, "project_id": ctx.project_id}));

        json!({
            "status": "success",
            "project_setup": {
                "project_path": path,
                "language": language,
                "directories_created": project_directories(language),
                "files_created": files,
                "test_command": language.test_command(),
                "next_steps": [
                    "Set up continuous integration",
                    "Add comprehensive tests",
                    "Configure code quality tools",
                    "Set up deployment pipeline",
                ],
            },
        })
    }

    fn run_tests(&self, task: &Value) -> Value {
        let language = self.language(task);
        let command = language.test_command();

        // results are reported by whoever ran the command
        let run = match task.get("results") {
            Some(results) => {
                let total = results.get("total").and_then(Value::as_u64).unwrap_or(0);
                let failed = results.get("failed").and_then(Value::as_u64).unwrap_or(0);
                json!({
                    "command": command,
                    "executed": true,
                    "passed": failed == 0 && total > 0,
                    "total_tests": total,
                    "passed_tests": total.saturating_sub(failed),
                    "failed_tests": failed,
                })
            }
            None => json!({"command": command, "executed": false, "passed": false}),
        };

        json!({"status": "success", "test_run": run})
    }

    fn deploy_code(&mut self, task: &Value) -> AgentResult<Value> {
        let environment = str_field(task, "environment", "staging");
        let tests_passed = task.get("tests_passed").and_then(Value::as_bool).unwrap_or(false);
        if environment == "production" && !tests_passed {
            return Err(AgentError::InvalidInput(
                "production deploys require a passing test run".into(),
            ));
        }

        let steps = ["build", "test", "package", "deploy", "verify"];
        self.record("deployment", json!({"environment": environment}));
        info!(environment, "Deployment planned");

        Ok(json!({
            "status": "success",
            "deployment": {
                "environment": environment,
                "version": str_field(task, "version", "0.1.0"),
                "steps": steps,
                "rollback_plan": "Redeploy the previous tagged build",
                "tests_passed": tests_passed,
            },
        }))
    }
}

#[async_trait]
impl Agent for DeveloperAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process_task(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value> {
        let kind = task_kind(task, "implement_feature");
        info!(agent_id = %self.core.id(), task_type = kind, "Processing developer task");

        match kind {
            "implement_feature" => Ok(self.implement_feature(task)),
            "fix_bug" => Ok(self.fix_bug(task)),
            "write_tests" => Ok(self.write_tests(task)),
            "refactor_code" => Ok(self.refactor_code(task)),
            "code_review" => Ok(self.code_review(task)),
            "optimize_performance" => Ok(self.optimize_performance(task)),
            "setup_project" => Ok(self.setup_project(task, ctx)),
            "run_tests" => Ok(self.run_tests(task)),
            "deploy_code" => self.deploy_code(task),
            other => Err(AgentError::UnsupportedTask {
                role: AgentRole::Developer,
                task_type: other.to_string(),
            }),
        }
    }

    fn validate_output(&self, output: &Value) -> bool {
        if !is_success(output) {
            return false;
        }
        if let Some(implementation) = output.get("implementation") {
            return has_truthy(implementation, "generated_files") && has_truthy(implementation, "implementation_plan");
        }
        if let Some(fix) = output.get("bug_fix") {
            return has_truthy(fix, "fixed_files") && has_truthy(fix, "root_cause");
        }
        if let Some(tests) = output.get("test_writing") {
            return has_truthy(tests, "test_files_created");
        }
        true
    }

    fn prompt_template(&self) -> PromptTemplate {
        library::developer()
    }
}
