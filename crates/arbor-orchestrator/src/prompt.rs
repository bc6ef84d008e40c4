//! Prompt builders for the implement and review agents
//!
//! Prompts are self-contained: the agent receives everything it needs in one
//! message, including feedback recovered from commit history on retries. No
//! conversation state exists between steps.

use arbor_core::TaskNode;

/// Build the prompt for an implement attempt
///
/// Feedback (prior rejection and test-failure text recovered from history)
/// is included verbatim so the retry can address the exact complaints.
pub fn build_implement_prompt(
    task: &TaskNode,
    attempt: usize,
    max_retries: usize,
    feedback: &str,
) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "# IMPLEMENT {} - Attempt {} of {}\n\n",
        task.id,
        attempt + 1,
        max_retries
    ));

    prompt.push_str("## TASK\n\n");
    prompt.push_str(&format!("**{}**\n\n", task.name));
    if !task.description.is_empty() {
        prompt.push_str(&task.description);
        prompt.push_str("\n\n");
    }

    if !feedback.is_empty() {
        prompt.push_str("## FEEDBACK FROM PREVIOUS ATTEMPTS\n\n");
        prompt.push_str("Address every point below before anything else:\n\n");
        prompt.push_str(feedback);
        prompt.push_str("\n\n");
    }

    prompt.push_str("## OBJECTIVE\n\n");
    prompt.push_str("1. Implement the task described above in the working directory\n");
    prompt.push_str("2. Keep the change focused; do not touch unrelated code\n");
    prompt.push_str("3. Make sure the task's declared tests pass before finishing\n");

    prompt
}

/// Build the prompt for a review pass
///
/// `approval_instruction` comes from the active approval policy so the
/// reviewer knows how to signal a positive verdict.
pub fn build_review_prompt(task: &TaskNode, diff_stat: &str, approval_instruction: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("# REVIEW {}\n\n", task.id));

    prompt.push_str("## TASK\n\n");
    prompt.push_str(&format!("**{}**\n\n", task.name));
    if !task.description.is_empty() {
        prompt.push_str(&task.description);
        prompt.push_str("\n\n");
    }

    prompt.push_str("## CHANGES UNDER REVIEW\n\n");
    if diff_stat.trim().is_empty() {
        prompt.push_str("(no file changes recorded)\n\n");
    } else {
        prompt.push_str("```\n");
        prompt.push_str(diff_stat.trim_end());
        prompt.push_str("\n```\n\n");
    }

    prompt.push_str("## VERDICT\n\n");
    prompt.push_str("Judge whether the changes implement the task correctly and completely.\n");
    prompt.push_str(approval_instruction);
    prompt.push('\n');
    prompt.push_str("Otherwise, list every defect that must be fixed before approval.\n");

    prompt
}
