// Prompt templates handed to the language model for each role
//
// Templates are versioned so recorded outputs can be traced back to the
// exact wording that produced them.

use serde::Serialize;
use std::collections::HashMap;

/// Prompt template structure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptTemplate {
    pub name: String,
    pub version: String,
    pub system: String,
    pub user_template: String,
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        system: impl Into<String>,
        user_template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            system: system.into(),
            user_template: user_template.into(),
        }
    }

    /// Render the user template, replacing each `{{name}}` with its value
    ///
    /// Placeholders without a value are left in place.
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        let mut rendered = String::with_capacity(self.user_template.len());
        let mut rest = self.user_template.as_str();

        while let Some(start) = rest.find("{{") {
            rendered.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = after[..end].trim();
                    match variables.get(key) {
                        Some(value) => rendered.push_str(value),
                        None => rendered.push_str(&rest[start..start + end + 4]),
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    rendered.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        rendered.push_str(rest);
        rendered
    }

    /// Names of the placeholders the user template expects
    pub fn variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.user_template.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else { break };
            let name = after[..end].trim().to_string();
            if !names.contains(&name) {
                names.push(name);
            }
            rest = &after[end + 2..];
        }
        names
    }
}

pub mod library {
    use super::PromptTemplate;

    const TASK_FRAME: &str = "Current context: {{context}}\nTask: {{task}}";

    pub fn manager() -> PromptTemplate {
        PromptTemplate::new(
            "manager",
            "You coordinate a software team: assign work, validate deliverables, \
             resolve conflicts and plan sprints.",
            TASK_FRAME,
        )
    }

    pub fn product_manager() -> PromptTemplate {
        PromptTemplate::new(
            "product_manager",
            "You turn stakeholder input into structured requirements, user stories \
             with acceptance criteria, and a prioritized roadmap.",
            TASK_FRAME,
        )
    }

    pub fn architect() -> PromptTemplate {
        PromptTemplate::new(
            "architect",
            "You design system architecture, select technology, define module and \
             API boundaries and record decisions.",
            TASK_FRAME,
        )
    }

    pub fn developer() -> PromptTemplate {
        PromptTemplate::new(
            "developer",
            "You implement features, fix bugs and write tests. Describe every file \
             you would create or change.",
            format!("{TASK_FRAME}\nLanguage: {{{{language}}}}"),
        )
    }

    pub fn qa() -> PromptTemplate {
        PromptTemplate::new(
            "qa",
            "You plan and evaluate testing: suites, execution results, quality \
             gates and bug tracking.",
            TASK_FRAME,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn render_substitutes_known_variables() {
        let template = library::manager();
        let rendered = template.render(&vars(&[("context", "sprint 1"), ("task", "plan")]));
        assert_eq!(rendered, "Current context: sprint 1\nTask: plan");
    }

    #[test]
    fn render_keeps_unknown_placeholders() {
        let template = PromptTemplate::new("t", "s", "Hello {{ name }} from {{place}}");
        let rendered = template.render(&vars(&[("name", "QA")]));
        assert_eq!(rendered, "Hello QA from {{place}}");
    }

    #[test]
    fn render_tolerates_unterminated_placeholder() {
        let template = PromptTemplate::new("t", "s", "Broken {{tail");
        assert_eq!(template.render(&HashMap::new()), "Broken {{tail");
    }

    #[test]
    fn developer_template_asks_for_language() {
        let template = library::developer();
        assert_eq!(template.variables(), vec!["context", "task", "language"]);
    }
}
