use crate::workflow::types::TaskKind;

/// Corrective instruction sent when the model claims an action it did not
/// perform.
pub const CORRECTION_PROMPT: &str = "SYSTEM ERROR: No tool call detected. \n\n\
You just said you took action, but you didn't invoke the function. \n\n\
STOP explaining. \n\n\
INVOKE the function 'notion_create_page' (or 'notion_append_content') with the JSON arguments immediately.";

const COMPLETION_MARKERS: &[&str] = &["Task execution completed", "任务完成"];
const ACTION_CLAIMS: &[&str] = &["已创建", "已写入", "调用工具", "notion_create_page"];

/// Classification of a model response that carried no tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The model reported completion explicitly.
    Final,
    /// The model narrated an action without performing it.
    NeedsCorrection,
    /// Plain answer; the task is done.
    Done,
}

/// Decides whether a tool-call-free response ends the task.
pub trait CompletionDetector: Send + Sync {
    fn classify(&self, content: &str, kind: TaskKind, pages_created: usize) -> Verdict;

    /// Message appended to the transcript on [`Verdict::NeedsCorrection`].
    fn correction(&self) -> &str {
        CORRECTION_PROMPT
    }
}

/// Marker-based detector.
///
/// Completion markers win over action claims. Action claims only count for
/// tasks that are expected to write to the workspace, and only while nothing
/// has been created yet; once a page exists the model may be describing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicDetector;

impl CompletionDetector for HeuristicDetector {
    fn classify(&self, content: &str, kind: TaskKind, pages_created: usize) -> Verdict {
        if content.trim().starts_with('✅') || COMPLETION_MARKERS.iter().any(|m| content.contains(m))
        {
            return Verdict::Final;
        }

        let acts = matches!(kind, TaskKind::Execution | TaskKind::Organization);
        if acts && pages_created == 0 && ACTION_CLAIMS.iter().any(|c| content.contains(c)) {
            Verdict::NeedsCorrection
        } else {
            Verdict::Done
        }
    }
}
