use serde::{Deserialize, Deserializer, Serialize};

use crate::agent::normalize::CreatedPage;

// ---------------------------------------------------------------------------
// Planner output
// ---------------------------------------------------------------------------

/// Category of a planned task. Only `Execution` and `Organization` tasks are
/// expected to write to the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Annotation,
    Analysis,
    Organization,
    Planning,
    Execution,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskKind::Annotation => "annotation",
            TaskKind::Analysis => "analysis",
            TaskKind::Organization => "organization",
            TaskKind::Planning => "planning",
            TaskKind::Execution => "execution",
        };
        f.write_str(name)
    }
}

/// One unit of work from the planner. Read-only during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "taskId")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub description: String,
    /// 1 (lowest) to 5 (highest). Anything else is rejected on deserialize.
    #[serde(deserialize_with = "deserialize_priority")]
    pub priority: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_data: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
}

fn deserialize_priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let priority = u8::deserialize(deserializer)?;
    if (1..=5).contains(&priority) {
        Ok(priority)
    } else {
        Err(serde::de::Error::custom(format!(
            "priority must be between 1 and 5, got {priority}"
        )))
    }
}

// ---------------------------------------------------------------------------
// Run inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnerProfile {
    pub learner_id: String,
    pub competency_level: String,
    pub learning_goal: String,
    pub preferred_style: String,
}

impl Default for LearnerProfile {
    fn default() -> Self {
        Self {
            learner_id: "default-learner".into(),
            competency_level: "中等".into(),
            learning_goal: "巩固知识点".into(),
            preferred_style: "讲解+计划".into(),
        }
    }
}

/// Structured OCR of the uploaded image. Empty for text-only queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OcrResult {
    pub original_path: String,
    pub plain_text: String,
    pub markdown_text: String,
    pub table_data: Vec<serde_json::Value>,
    pub spans: Vec<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// State of one run across its tasks.
///
/// Only [`ExecutionState::apply_outcome`] mutates the progress fields, so the
/// index, contents and pages always move together.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    pub tasks: Vec<Task>,
    pub learner_profile: LearnerProfile,
    pub ocr_result: OcrResult,
    pub user_query: Option<String>,
    current_task_index: usize,
    generated_contents: Vec<String>,
    created_pages: Vec<CreatedPage>,
}

impl ExecutionState {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    pub fn with_learner_profile(mut self, profile: LearnerProfile) -> Self {
        self.learner_profile = profile;
        self
    }

    pub fn with_ocr_result(mut self, ocr: OcrResult) -> Self {
        self.ocr_result = ocr;
        self
    }

    pub fn with_user_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.user_query = (!query.trim().is_empty()).then_some(query);
        self
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.tasks.get(self.current_task_index)
    }

    pub fn current_task_index(&self) -> usize {
        self.current_task_index
    }

    pub fn generated_contents(&self) -> &[String] {
        &self.generated_contents
    }

    pub fn created_pages(&self) -> &[CreatedPage] {
        &self.created_pages
    }

    pub fn is_complete(&self) -> bool {
        self.current_task_index >= self.tasks.len()
    }

    /// Record a finished task: append its content, merge its pages and move
    /// to the next task.
    pub fn apply_outcome(&mut self, content: String, pages: Vec<CreatedPage>) {
        self.generated_contents.push(content);
        self.created_pages.extend(pages);
        self.current_task_index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: &str, kind: TaskKind) -> Task {
        Task {
            id: id.into(),
            kind,
            description: format!("do {id}"),
            priority: 3,
            due_date: None,
            estimated_duration: None,
            input_data: Vec::new(),
            output_format: None,
        }
    }

    #[test]
    fn task_deserializes_from_planner_json() {
        let task: Task = serde_json::from_value(json!({
            "taskId": "T1",
            "type": "execution",
            "description": "Create a note page for linear functions",
            "priority": 5,
            "dueDate": "2025-11-25T10:00:00Z",
            "estimatedDuration": "30min",
            "inputData": ["OCR paragraph 1", "learner profile"],
            "outputFormat": "Notion page"
        }))
        .unwrap();
        assert_eq!(task.id, "T1");
        assert_eq!(task.kind, TaskKind::Execution);
        assert_eq!(task.priority, 5);
        assert_eq!(task.due_date.as_deref(), Some("2025-11-25T10:00:00Z"));
        assert_eq!(task.input_data.len(), 2);
    }

    #[test]
    fn task_optional_fields_default() {
        let task: Task = serde_json::from_value(json!({
            "taskId": "T2", "type": "analysis", "description": "d", "priority": 1
        }))
        .unwrap();
        assert!(task.due_date.is_none());
        assert!(task.input_data.is_empty());
        let back = serde_json::to_value(&task).unwrap();
        assert!(back.get("dueDate").is_none());
        assert_eq!(back["type"], "analysis");
    }

    #[test]
    fn unknown_task_kind_is_rejected() {
        let result: Result<Task, _> = serde_json::from_value(json!({
            "taskId": "T3", "type": "dancing", "description": "d", "priority": 1
        }));
        assert!(result.is_err());
    }

    #[test]
    fn priority_outside_one_to_five_is_rejected() {
        for priority in [0, 6, 200] {
            let err = serde_json::from_value::<Task>(json!({
                "taskId": "T4", "type": "planning", "description": "d", "priority": priority
            }))
            .unwrap_err();
            assert!(err.to_string().contains("priority"), "error: {err}");
        }
        let task: Task = serde_json::from_value(json!({
            "taskId": "T4", "type": "planning", "description": "d", "priority": 3
        }))
        .unwrap();
        assert_eq!(task.priority, 3);
    }

    #[test]
    fn learner_profile_fills_defaults() {
        let profile: LearnerProfile =
            serde_json::from_value(json!({"learnerId": "stu-7"})).unwrap();
        assert_eq!(profile.learner_id, "stu-7");
        assert_eq!(profile.competency_level, "中等");
        assert_eq!(profile.learning_goal, "巩固知识点");
        assert_eq!(profile.preferred_style, "讲解+计划");
    }

    #[test]
    fn empty_ocr_result_is_valid() {
        let ocr: OcrResult = serde_json::from_value(json!({})).unwrap();
        assert_eq!(ocr, OcrResult::default());
    }

    #[test]
    fn apply_outcome_advances_once_and_merges_pages() {
        let mut state = ExecutionState::new(vec![
            task("T1", TaskKind::Analysis),
            task("T2", TaskKind::Execution),
        ]);
        assert_eq!(state.current_task().map(|t| t.id.as_str()), Some("T1"));

        state.apply_outcome("analysis".into(), vec![]);
        assert_eq!(state.current_task_index(), 1);
        assert!(!state.is_complete());

        state.apply_outcome(
            "page made".into(),
            vec![CreatedPage {
                id: "p1".into(),
                url: None,
            }],
        );
        assert!(state.is_complete());
        assert!(state.current_task().is_none());
        assert_eq!(state.generated_contents(), ["analysis", "page made"]);
        assert_eq!(state.created_pages().len(), 1);
    }

    #[test]
    fn blank_user_query_is_dropped() {
        let state = ExecutionState::new(vec![]).with_user_query("   ");
        assert!(state.user_query.is_none());
        assert!(state.is_complete());
    }
}
