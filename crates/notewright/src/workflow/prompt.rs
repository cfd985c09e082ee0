//! Prompts for the execution phase.
//!
//! The per-task prompt is rendered from a read-only view of the run state;
//! nothing here mutates [`ExecutionState`].

use std::fmt::Write as _;

use crate::workflow::types::{ExecutionState, OcrResult, Task};

const TABLE_PREVIEW_ROWS: usize = 5;
const SPAN_PREVIEW_COUNT: usize = 10;

pub const EXECUTION_SYSTEM_PROMPT: &str = "\
## Role
You are a K-12 and university tutor who keeps meticulous study notes and has full access to the learner's Notion workspace.
You carry out one task from a plan that has already been broken down. Do not split it further or return new tasks.
Output must be ready for teaching or self-study without further editing, and must cite its sources (OCR line ranges or Notion pages).

## Principles
1. Think briefly if needed, but deliver the core output (the notes themselves) through tool calls, never as chat text.
2. When the task asks to write to Notion or create a note, call `notion_create_page` or `notion_append_content` and pass the content as the `content` argument.
   If a call fails, retry once; if it fails again, state the reason in one short sentence.
3. Support every conclusion with evidence, e.g. `(source: OCR lines 3-5)` or `(source: Notion page \"...\")`.
4. Before creating a page, call `notion_search` to check whether a related page already exists.
5. Page content must not contain task metadata (priority, type, due date). Only educational content: headings, key points, worked examples.

## Tools
- `notion_create_page`: needs `parentPageId`, `title`, `content`; optional `icon`, `cover`.
  Rewrite and structure the OCR text as Markdown with headings, lists and emphasis. Never paste it verbatim.
- `notion_append_content`: needs `pageId`, `content`; optional `position` (`append` | `prepend`).
  Start appended content with `> Updated: <ISO time>`.
- `notion_search`, `notion_retrieve_page`: look up pages and their ids.

## Procedure
1. Read the task description. If it lists numbered steps, follow them in order.
2. Decide whether the task touches Notion. If it does not (pure analysis or annotation), answer directly with sources.
3. Otherwise make sure required ids are known; search for missing ones first.
4. Call the write tool. A successful result contains `ID:` and `URL:`; if either is missing, treat the call as failed and retry once.
5. After success, report in a single line: `✅ T<n> done → <page title> <URL>`.
";

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn json_preview(values: &[serde_json::Value], limit: usize) -> String {
    let head = &values[..values.len().min(limit)];
    serde_json::to_string(head).unwrap_or_else(|_| "[]".into())
}

fn render_task(task: &Task) -> String {
    format!(
        "<task>\nType: {}\nDescription: {}\nPriority: {}\nDue: {}\n</task>",
        task.kind,
        task.description,
        task.priority,
        task.due_date.as_deref().unwrap_or("not set"),
    )
}

fn render_ocr(ocr: &OcrResult) -> String {
    format!(
        "<ocr-plain>\n{}\n</ocr-plain>\n\n<ocr-markdown>\n{}\n</ocr-markdown>\n\n\
         <ocr-table>\n{}\n</ocr-table>\n\n<ocr-spans>\n{}\n</ocr-spans>",
        ocr.plain_text,
        ocr.markdown_text,
        json_preview(&ocr.table_data, TABLE_PREVIEW_ROWS),
        json_preview(&ocr.spans, SPAN_PREVIEW_COUNT),
    )
}

/// Render the user prompt for `task`.
///
/// Earlier task results are included as previews of at most
/// `preview_chars` characters each.
pub fn build_task_prompt(state: &ExecutionState, task: &Task, preview_chars: usize) -> String {
    let mut sections: Vec<String> = vec![format!("Current task:\n\n{}", render_task(task))];

    let previous = state.generated_contents();
    if !previous.is_empty() {
        let results = previous
            .iter()
            .enumerate()
            .map(|(i, content)| {
                format!("[Task {} Result]: {}...", i + 1, preview(content, preview_chars))
            })
            .collect::<Vec<_>>()
            .join("\n---\n");
        sections.push(format!("Previous execution results:\n{results}"));
    }

    let profile = &state.learner_profile;
    sections.push(format!(
        "Context:\n\n<learner>\nID: {}\nLevel: {}\nGoal: {}\nPreference: {}\n</learner>",
        profile.learner_id,
        profile.competency_level,
        profile.learning_goal,
        profile.preferred_style,
    ));

    let mut rules = String::from("Important:\n");
    let _ = writeln!(
        rules,
        "1. The learner id ({}) is a user id, not a Notion page id. Never use it as a page id.",
        profile.learner_id
    );
    rules.push_str(
        "2. Before creating any page, call 'notion_search' to find a valid parent page id:\n\
         \x20  - first search for \"sophie\" and use its id as 'parentPageId' if found;\n\
         \x20  - then \"Learning Dashboard\";\n\
         \x20  - then \"Notes\" or \"Page\";\n\
         \x20  - if nothing matches, search for an empty string to find any available page.\n\
         3. Do not simulate tool calls. Invoke the tools, or report why you cannot.",
    );
    sections.push(rules);

    if let Some(query) = &state.user_query {
        sections.push(format!("<user-query>\n{query}\n</user-query>"));
    }
    sections.push(render_ocr(&state.ocr_result));
    sections.push(
        "Carry out the task now.\n\
         1. If the task is to create a note or page, you MUST call 'notion_create_page'.\n\
         2. Do not write the content in the chat; pass it as the tool's 'content' argument.\n\
         3. Organize knowledge points internally, then pass the organized text to the tool."
            .to_string(),
    );

    sections.join("\n\n")
}
