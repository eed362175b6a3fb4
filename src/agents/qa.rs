use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use super::base::{array_field, has_truthy, is_success, str_field, task_kind, Agent, AgentContext, AgentCore};
use super::errors::{AgentError, AgentResult};
use super::prompts::{library, PromptTemplate};
use crate::domain::agent::AgentRole;

const SUPPORTED_BROWSERS: [&str; 3] = ["chrome", "firefox", "safari"];
const MINUTES_PER_TEST_FILE: usize = 2;

/// Release gates a build must clear
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityGates {
    pub test_coverage: f64,
    /// Bugs per thousand lines
    pub bug_density: f64,
    pub test_pass_rate: f64,
    pub performance_score: f64,
}

impl Default for QualityGates {
    fn default() -> Self {
        Self {
            test_coverage: 80.0,
            bug_density: 0.1,
            test_pass_rate: 95.0,
            performance_score: 85.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceThresholds {
    pub response_time_ms: f64,
    pub memory_mb: f64,
    pub cpu_percent: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            response_time_ms: 200.0,
            memory_mb: 100.0,
            cpu_percent: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Unit,
    Integration,
    E2e,
    Api,
    Performance,
}

impl TestType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "unit" => Some(Self::Unit),
            "integration" => Some(Self::Integration),
            "e2e" => Some(Self::E2e),
            "api" => Some(Self::Api),
            "performance" => Some(Self::Performance),
            _ => None,
        }
    }
}

/// Passed over total as a percentage, zero when nothing ran
pub fn pass_rate(passed: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    }
}

pub fn quality_score(pass_rate: f64, coverage: f64) -> f64 {
    pass_rate * 0.6 + coverage * 0.4
}

fn gate(value: f64, threshold: f64, higher_is_better: bool) -> Value {
    let passed = if higher_is_better { value >= threshold } else { value <= threshold };
    json!({"value": value, "threshold": threshold, "passed": passed})
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
struct RunTotals {
    total_tests: u64,
    passed: u64,
    failed: u64,
    skipped: u64,
    execution_time: f64,
}

/// Quality assurance: suites, execution results, gates and bug tracking
pub struct QaAgent {
    core: AgentCore,
    gates: QualityGates,
    thresholds: PerformanceThresholds,
    test_suites: BTreeMap<String, Value>,
    executions: BTreeMap<String, Value>,
    bugs: BTreeMap<String, Value>,
}

impl QaAgent {
    pub fn new(core: AgentCore) -> Self {
        Self {
            core,
            gates: QualityGates::default(),
            thresholds: PerformanceThresholds::default(),
            test_suites: BTreeMap::new(),
            executions: BTreeMap::new(),
            bugs: BTreeMap::new(),
        }
    }

    pub fn with_id(id: &str, context_max_tokens: usize) -> Self {
        Self::new(AgentCore::new(id, AgentRole::Qa, "qwen-72b", context_max_tokens))
    }

    pub fn gates(&self) -> QualityGates {
        self.gates
    }

    pub fn test_suite(&self, suite_id: &str) -> Option<&Value> {
        self.test_suites.get(suite_id)
    }

    pub fn execution(&self, execution_id: &str) -> Option<&Value> {
        self.executions.get(execution_id)
    }

    pub fn open_bugs(&self) -> Vec<&Value> {
        self.bugs.values().filter(|b| str_field(b, "status", "open") != "closed").collect()
    }

    fn evaluate_gates(&self, pass_rate: f64, coverage: f64) -> Value {
        json!({
            "test_pass_rate": gate(pass_rate, self.gates.test_pass_rate, true),
            "test_coverage": gate(coverage, self.gates.test_coverage, true),
        })
    }

    fn create_test_suite(&mut self, task: &Value, ctx: &AgentContext) -> Value {
        let types: Vec<TestType> = match task.get("test_types").and_then(Value::as_array) {
            Some(list) => list.iter().filter_map(Value::as_str).filter_map(TestType::parse).collect(),
            None => vec![TestType::Unit, TestType::Integration],
        };
        let modules: Vec<String> = match task.get("modules").and_then(Value::as_array) {
            Some(list) => list.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            None => vec!["auth".into(), "api".into(), "models".into()],
        };
        let journeys = array_field(task, "requirements").len().max(1);
        info!(types = types.len(), modules = modules.len(), "Creating test suite");

        let mut files: Vec<String> = Vec::new();
        for kind in &types {
            match kind {
                TestType::Unit => files.extend(modules.iter().map(|m| format!("tests/unit/test_{m}.py"))),
                TestType::Integration => {
                    files.extend(modules.iter().map(|m| format!("tests/integration/test_{m}_integration.py")))
                }
                TestType::E2e => files.extend((1..=journeys).map(|i| format!("tests/e2e/test_journey_{i}.py"))),
                TestType::Api => files.push("tests/api/test_endpoints.py".into()),
                TestType::Performance => files.push("tests/performance/load_profile.json".into()),
            }
        }

        let suite_id = format!("suite-{:03}", self.test_suites.len() + 1);
        let strategy = json!({
            "approach": "risk_based_testing",
            "priorities": ["critical_paths", "user_journeys", "edge_cases"],
            "test_pyramid": {"unit_tests": 70, "integration_tests": 20, "e2e_tests": 10},
            "tools": ["pytest", "selenium", "artillery"],
        });
        self.test_suites.insert(
            suite_id.clone(),
            json!({
                "id": suite_id,
                "project_id": ctx.project_id,
                "test_types": types,
                "test_files": files,
                "test_strategy": strategy,
                "created_at": Utc::now().to_rfc3339(),
            }),
        );

        json!({
            "status": "success",
            "test_suite": {
                "suite_id": suite_id,
                "test_files_created": files.len(),
                "test_files": files,
                "test_types_covered": types,
                "test_strategy": strategy,
                "estimated_execution_time": files.len() * MINUTES_PER_TEST_FILE,
                "coverage_targets": {"overall": 80, "unit": 90, "integration": 70, "critical_paths": 95},
            },
        })
    }

    /// Aggregates per-type statistics supplied by the test runner
    fn run_tests(&mut self, task: &Value) -> Value {
        let detailed = task.get("results").and_then(Value::as_object).cloned().unwrap_or_default();
        let coverage = task.get("coverage").and_then(Value::as_f64).unwrap_or(0.0);

        let mut totals = RunTotals::default();
        for stats in detailed.values() {
            let count = |key: &str| stats.get(key).and_then(Value::as_u64).unwrap_or(0);
            totals.total_tests += count("total");
            totals.passed += count("passed");
            totals.failed += count("failed");
            totals.skipped += count("skipped");
            totals.execution_time += stats.get("execution_time").and_then(Value::as_f64).unwrap_or(0.0);
        }

        let rate = pass_rate(totals.passed, totals.total_tests);
        let gates = self.evaluate_gates(rate, coverage);
        let mut recommendations = Vec::new();
        if rate < self.gates.test_pass_rate {
            recommendations.push("Improve test stability: some tests are failing");
        }
        if coverage < self.gates.test_coverage {
            recommendations.push("Increase test coverage to meet the 80% threshold");
        }

        let execution_id = format!("exec-{:03}", self.executions.len() + 1);
        let mut overall = json!(totals);
        if let Some(map) = overall.as_object_mut() {
            map.insert("coverage".into(), json!(coverage));
            map.insert("pass_rate".into(), json!(rate));
        }
        info!(%execution_id, pass_rate = rate, coverage, "Recorded test execution");

        self.executions.insert(
            execution_id.clone(),
            json!({
                "execution_id": execution_id,
                "suite_id": task.get("suite_id").cloned().unwrap_or(Value::Null),
                "overall_results": overall,
                "coverage": coverage,
                "quality_gates": gates,
                "executed_at": Utc::now().to_rfc3339(),
            }),
        );

        json!({
            "status": "success",
            "test_execution": {
                "execution_id": execution_id,
                "overall_results": overall,
                "detailed_results": detailed,
                "quality_gates": gates,
                "recommendations": recommendations,
            },
        })
    }

    fn ui_testing(&self, task: &Value) -> AgentResult<Value> {
        let app_url = str_field(task, "app_url", "http://localhost:3000");
        let browser = str_field(task, "browser", "chrome");
        if !SUPPORTED_BROWSERS.contains(&browser) {
            return Err(AgentError::InvalidInput(format!("unsupported browser '{browser}'")));
        }

        let scenarios = array_field(task, "test_scenarios");
        let scripts: Vec<Value> = scenarios
            .iter()
            .enumerate()
            .map(|(i, scenario)| {
                let name = scenario
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| str_field(scenario, "name", &format!("scenario_{}", i + 1)).to_string());
                json!({
                    "scenario": name,
                    "steps": ["open_page", "interact", "assert_visible"],
                    "browser": browser,
                })
            })
            .collect();
        let failed: Vec<&str> = scenarios
            .iter()
            .filter(|s| s.get("passed").and_then(Value::as_bool) == Some(false))
            .map(|s| str_field(s, "name", "unnamed"))
            .collect();

        Ok(json!({
            "status": "success",
            "ui_testing": {
                "app_url": app_url,
                "browser": browser,
                "scenarios_tested": scenarios.len(),
                "scripts": scripts,
                "analysis": {
                    "passed_tests": scenarios.len() - failed.len(),
                    "failed_tests": failed.len(),
                    "failed_scenarios": failed,
                },
            },
        }))
    }

    fn api_testing(&self, task: &Value) -> Value {
        let base_url = str_field(task, "api_base_url", "http://localhost:8000");
        let endpoints = task
            .pointer("/api_specification/endpoints")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        let mut cases = Vec::new();
        for endpoint in endpoints {
            let method = str_field(endpoint, "method", "GET").to_uppercase();
            let path = str_field(endpoint, "path", "/");
            cases.push(json!({"method": method, "path": path, "case": "happy_path", "expect_status": 200}));
            cases.push(json!({"method": method, "path": path, "case": "unauthorized", "expect_status": 401}));
            if method == "POST" || method == "PUT" {
                cases.push(json!({"method": method, "path": path, "case": "invalid_body", "expect_status": 422}));
            }
        }

        let responses = array_field(task, "responses");
        let compliant = responses
            .iter()
            .filter(|r| {
                let status = r.get("status").and_then(Value::as_u64).unwrap_or(500);
                let latency = r.get("response_time_ms").and_then(Value::as_f64).unwrap_or(f64::MAX);
                status < 400 && latency <= self.thresholds.response_time_ms
            })
            .count();
        let compliance = if responses.is_empty() {
            0.0
        } else {
            compliant as f64 / responses.len() as f64
        };

        json!({
            "status": "success",
            "api_testing": {
                "api_base_url": base_url,
                "test_cases_planned": cases.len(),
                "test_cases": cases,
                "responses_checked": responses.len(),
                "compliance_score": compliance,
            },
        })
    }

    fn performance_testing(&self, task: &Value) -> Value {
        let measurements = task.get("measurements").cloned().unwrap_or_else(|| json!({}));
        let limits = [
            ("response_time_ms", self.thresholds.response_time_ms),
            ("memory_mb", self.thresholds.memory_mb),
            ("cpu_percent", self.thresholds.cpu_percent),
        ];

        let mut passed = Map::new();
        for (metric, limit) in limits {
            if let Some(value) = measurements.get(metric).and_then(Value::as_f64) {
                passed.insert(metric.to_string(), json!(value <= limit));
            }
        }
        let score = if passed.is_empty() {
            0.0
        } else {
            passed.values().filter(|v| **v == true).count() as f64 / passed.len() as f64 * 100.0
        };

        json!({
            "status": "success",
            "performance_testing": {
                "target_url": str_field(task, "target_url", "http://localhost:8000"),
                "load_profile": task
                    .get("load_profile")
                    .cloned()
                    .unwrap_or_else(|| json!({"users": 100, "duration": "5m", "ramp_up": "1m"})),
                "thresholds": self.thresholds,
                "passed_thresholds": passed,
                "performance_score": score,
                "gate": gate(score, self.gates.performance_score, true),
            },
        })
    }

    fn security_testing(&self, task: &Value) -> Value {
        let findings = array_field(task, "findings");
        let count = |severity: &str| findings.iter().filter(|f| str_field(f, "severity", "low") == severity).count();
        let (critical, high) = (count("critical"), count("high"));
        let risk = if critical > 0 {
            "critical"
        } else if high > 0 {
            "high"
        } else if findings.is_empty() {
            "low"
        } else {
            "medium"
        };

        json!({
            "status": "success",
            "security_testing": {
                "checks": [
                    "injection",
                    "broken_authentication",
                    "sensitive_data_exposure",
                    "cross_site_scripting",
                    "security_misconfiguration",
                ],
                "findings": findings,
                "critical_findings": critical,
                "high_findings": high,
                "risk_level": risk,
                "passed": critical == 0 && high == 0,
            },
        })
    }

    fn generate_test_report(&self, task: &Value) -> Value {
        let execution_id = task.get("execution_id").and_then(Value::as_str);
        let data = execution_id.and_then(|id| self.executions.get(id));

        let overall = data.map(|d| d["overall_results"].clone()).unwrap_or_else(|| json!({}));
        let total = overall.get("total_tests").and_then(Value::as_u64).unwrap_or(0);
        let passed = overall.get("passed").and_then(Value::as_u64).unwrap_or(0);
        let failed = overall.get("failed").and_then(Value::as_u64).unwrap_or(0);
        let coverage = data.and_then(|d| d["coverage"].as_f64()).unwrap_or(0.0);
        let rate = pass_rate(passed, total);

        let html = format!(
            "<!DOCTYPE html>\n<html><head><title>Test Report</title></head><body>\n\
             <h1>Test Execution Report</h1>\n<p>Total Tests: {total}</p>\n<p>Passed: {passed}</p>\n\
             <p>Failed: {failed}</p>\n<p>Coverage: {coverage}%</p>\n</body></html>\n"
        );
        let metrics = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "test_execution": overall,
            "quality_gates": data.map(|d| d["quality_gates"].clone()).unwrap_or(Value::Null),
        });

        json!({
            "status": "success",
            "test_report": {
                "execution_id": execution_id,
                "report_files": [
                    {"path": "test_reports/test_report.html", "content": html},
                    {"path": "test_reports/metrics.json", "content": metrics.to_string()},
                ],
                "summary": {
                    "total_tests": total,
                    "pass_rate": rate,
                    "coverage": coverage,
                    "quality_score": quality_score(rate, coverage),
                },
            },
        })
    }

    fn analyze_quality(&self, task: &Value) -> Value {
        let number = |key: &str| task.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        let kloc = number("lines_of_code") / 1000.0;
        let density = if kloc > 0.0 { number("bug_count") / kloc } else { 0.0 };
        let coverage = number("coverage");
        let rate = number("pass_rate");
        let performance = number("performance_score");

        let gates = json!({
            "test_coverage": gate(coverage, self.gates.test_coverage, true),
            "bug_density": gate(density, self.gates.bug_density, false),
            "test_pass_rate": gate(rate, self.gates.test_pass_rate, true),
            "performance_score": gate(performance, self.gates.performance_score, true),
        });
        let failing: Vec<&String> = gates
            .as_object()
            .map(|g| g.iter().filter(|(_, v)| v["passed"] == false).map(|(k, _)| k).collect())
            .unwrap_or_default();

        json!({
            "status": "success",
            "quality_analysis": {
                "bug_density": density,
                "quality_score": quality_score(rate, coverage),
                "gates": gates,
                "failing_gates": failing,
                "release_ready": failing.is_empty(),
            },
        })
    }

    fn track_bugs(&mut self, task: &Value) -> Value {
        let mut created = Vec::new();
        let mut updated = Vec::new();

        for bug in array_field(task, "bugs") {
            match bug.get("id").and_then(Value::as_str).filter(|id| self.bugs.contains_key(*id)) {
                Some(id) => {
                    if let Some(Value::Object(existing)) = self.bugs.get_mut(id) {
                        if let Value::Object(changes) = bug {
                            for (key, value) in changes {
                                existing.insert(key.clone(), value.clone());
                            }
                        }
                        existing.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
                    }
                    updated.push(id.to_string());
                }
                None => {
                    let id = format!("BUG-{:03}", self.bugs.len() + 1);
                    self.bugs.insert(
                        id.clone(),
                        json!({
                            "id": id,
                            "title": str_field(bug, "title", "Untitled bug"),
                            "severity": str_field(bug, "severity", "medium"),
                            "status": str_field(bug, "status", "open"),
                            "reported_at": Utc::now().to_rfc3339(),
                        }),
                    );
                    created.push(id);
                }
            }
        }

        let mut by_severity: BTreeMap<&str, usize> = BTreeMap::new();
        for bug in self.bugs.values() {
            *by_severity.entry(str_field(bug, "severity", "medium")).or_insert(0) += 1;
        }

        json!({
            "status": "success",
            "bug_tracking": {
                "created": created,
                "updated": updated,
                "total_bugs": self.bugs.len(),
                "open_bugs": self.open_bugs().len(),
                "by_severity": by_severity,
            },
        })
    }
}

#[async_trait]
impl Agent for QaAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process_task(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value> {
        let kind = task_kind(task, "run_tests");
        info!(agent_id = %self.core.id(), task_type = kind, "Processing QA task");

        match kind {
            "create_test_suite" => Ok(self.create_test_suite(task, ctx)),
            "run_tests" => Ok(self.run_tests(task)),
            "ui_testing" => self.ui_testing(task),
            "api_testing" => Ok(self.api_testing(task)),
            "performance_testing" => Ok(self.performance_testing(task)),
            "security_testing" => Ok(self.security_testing(task)),
            "generate_test_report" => Ok(self.generate_test_report(task)),
            "analyze_quality" => Ok(self.analyze_quality(task)),
            "track_bugs" => Ok(self.track_bugs(task)),
            other => Err(AgentError::UnsupportedTask {
                role: AgentRole::Qa,
                task_type: other.to_string(),
            }),
        }
    }

    fn validate_output(&self, output: &Value) -> bool {
        if !is_success(output) {
            return false;
        }
        if let Some(suite) = output.get("test_suite") {
            return has_truthy(suite, "test_files_created") && has_truthy(suite, "test_strategy");
        }
        if let Some(execution) = output.get("test_execution") {
            return has_truthy(execution, "overall_results") && has_truthy(execution, "detailed_results");
        }
        if let Some(report) = output.get("test_report") {
            return has_truthy(report, "summary") && has_truthy(report, "report_files");
        }
        true
    }

    fn prompt_template(&self) -> PromptTemplate {
        library::qa()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qa() -> QaAgent {
        QaAgent::with_id("qa-001", 8000)
    }

    fn ctx() -> AgentContext {
        AgentContext::for_project("proj-1")
    }

    #[test]
    fn quality_score_weights_pass_rate_over_coverage() {
        assert!((quality_score(100.0, 50.0) - 80.0).abs() < 1e-9);
        assert_eq!(pass_rate(0, 0), 0.0);
        assert!((pass_rate(19, 20) - 95.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn default_suite_covers_unit_and_integration() {
        let mut agent = qa();
        let out = agent
            .process_task(&json!({"type": "create_test_suite"}), &ctx())
            .await
            .unwrap();

        assert!(agent.validate_output(&out));
        let suite = &out["test_suite"];
        assert_eq!(suite["suite_id"], "suite-001");
        assert_eq!(suite["test_files_created"], 6);
        assert_eq!(suite["estimated_execution_time"], 12);
        assert_eq!(suite["coverage_targets"]["critical_paths"], 95);
        assert!(agent.test_suite("suite-001").is_some());
    }

    #[tokio::test]
    async fn execution_feeds_the_report() {
        let mut agent = qa();
        let run = agent
            .process_task(
                &json!({
                    "type": "run_tests",
                    "results": {
                        "unit": {"total": 18, "passed": 18, "failed": 0},
                        "integration": {"total": 2, "passed": 1, "failed": 1},
                    },
                    "coverage": 85.0,
                }),
                &ctx(),
            )
            .await
            .unwrap();

        assert!(agent.validate_output(&run));
        let execution = &run["test_execution"];
        assert_eq!(execution["execution_id"], "exec-001");
        assert_eq!(execution["overall_results"]["total_tests"], 20);
        assert_eq!(execution["quality_gates"]["test_pass_rate"]["passed"], true);
        assert_eq!(execution["quality_gates"]["test_coverage"]["passed"], true);

        let report = agent
            .process_task(&json!({"type": "generate_test_report", "execution_id": "exec-001"}), &ctx())
            .await
            .unwrap();
        assert!(agent.validate_output(&report));
        let summary = &report["test_report"]["summary"];
        assert_eq!(summary["total_tests"], 20);
        // 0.6 * 95 + 0.4 * 85
        assert!((summary["quality_score"].as_f64().unwrap() - 91.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_run_fails_validation() {
        let mut agent = qa();
        let out = agent.process_task(&json!({"type": "run_tests"}), &ctx()).await.unwrap();
        assert!(!agent.validate_output(&out));
    }

    #[tokio::test]
    async fn unknown_browsers_are_rejected() {
        let mut agent = qa();
        let err = agent
            .process_task(&json!({"type": "ui_testing", "browser": "lynx"}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[test]
    fn ui_analysis_counts_failed_scenarios() {
        let agent = qa();
        let out = agent
            .ui_testing(&json!({"test_scenarios": ["login", {"name": "checkout", "passed": false}]}))
            .unwrap();
        assert_eq!(out["ui_testing"]["analysis"]["failed_tests"], 1);
        assert_eq!(out["ui_testing"]["scripts"][0]["scenario"], "login");
    }

    #[test]
    fn api_cases_cover_auth_and_bodies() {
        let agent = qa();
        let out = agent.api_testing(&json!({
            "api_specification": {"endpoints": [{"method": "get", "path": "/a"}, {"method": "POST", "path": "/b"}]},
            "responses": [
                {"status": 200, "response_time_ms": 120.0},
                {"status": 200, "response_time_ms": 450.0},
            ],
        }));
        assert_eq!(out["api_testing"]["test_cases_planned"], 5);
        assert_eq!(out["api_testing"]["compliance_score"], 0.5);
    }

    #[test]
    fn performance_thresholds_are_checked() {
        let agent = qa();
        let out = agent.performance_testing(&json!({
            "measurements": {"response_time_ms": 150.0, "memory_mb": 140.0, "cpu_percent": 60.0},
        }));
        let perf = &out["performance_testing"];
        assert_eq!(perf["passed_thresholds"]["memory_mb"], false);
        assert_eq!(perf["gate"]["passed"], false);
    }

    #[test]
    fn security_risk_follows_worst_finding() {
        let agent = qa();
        let out = agent.security_testing(&json!({"findings": [{"severity": "low"}, {"severity": "high"}]}));
        assert_eq!(out["security_testing"]["risk_level"], "high");
        assert_eq!(out["security_testing"]["passed"], false);
    }

    #[test]
    fn quality_analysis_lists_failing_gates() {
        let agent = qa();
        let out = agent.analyze_quality(&json!({
            "lines_of_code": 10000,
            "bug_count": 5,
            "coverage": 90.0,
            "pass_rate": 99.0,
            "performance_score": 70.0,
        }));
        let analysis = &out["quality_analysis"];
        assert_eq!(analysis["failing_gates"], json!(["bug_density", "performance_score"]));
        assert_eq!(analysis["release_ready"], false);
    }

    #[tokio::test]
    async fn bugs_are_created_then_closed() {
        let mut agent = qa();
        agent
            .process_task(
                &json!({"type": "track_bugs", "bugs": [{"title": "Crash", "severity": "high"}, {"title": "Typo"}]}),
                &ctx(),
            )
            .await
            .unwrap();
        let out = agent
            .process_task(&json!({"type": "track_bugs", "bugs": [{"id": "BUG-001", "status": "closed"}]}), &ctx())
            .await
            .unwrap();

        let tracking = &out["bug_tracking"];
        assert_eq!(tracking["updated"], json!(["BUG-001"]));
        assert_eq!(tracking["total_bugs"], 2);
        assert_eq!(tracking["open_bugs"], 1);
        assert_eq!(tracking["by_severity"]["high"], 1);
    }
}
