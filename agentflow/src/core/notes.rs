//! Text fed back into an agent's conversation between planning calls.

use std::fmt::Write;

use crate::core::task::Task;

/// Summary of the tasks a workflow has already finished, or `None` if empty.
pub fn completed_summary(completed: &[Task]) -> Option<String> {
    if completed.is_empty() {
        return None;
    }
    let mut buf = String::from("=== Previously Completed Tasks ===\n");
    for task in completed {
        let _ = writeln!(buf, "- {}:", task.title());
        let _ = writeln!(buf, "  Description: {}", task.description());
        if let Some(result) = task.result() {
            let _ = writeln!(buf, "  Result: {result}");
        }
    }
    buf.push_str("=== End Completed Tasks ===\n");
    Some(buf)
}

pub fn tool_result_note(tool_name: &str, result: &str) -> String {
    format!("=== Tool Execution Result ===\nTool: {tool_name}\nResult:\n{result}\n=== End Result ===\n")
}

pub fn subordinate_result_note(agent_name: &str, result: &str) -> String {
    format!(
        "=== Agent Execution Result ===\nAgent: {agent_name}\nResult:\n{result}\n=== End Result ===\n"
    )
}

pub fn delegation_refused_note(agent_name: &str, reason: &str) -> String {
    format!("=== Delegation Refused ===\nAgent: {agent_name}\nReason: {reason}\n=== End Delegation ===\n")
}

pub fn tool_follow_up(tool_name: &str) -> String {
    format!("Process the results of {tool_name} execution")
}

pub fn subordinate_follow_up(agent_name: &str) -> String {
    format!("Process the results returned by the {agent_name} agent")
}

/// Re-prompt after a response that could not be parsed.
pub fn correction_prompt(error: &str) -> String {
    format!(
        "Your previous response could not be parsed: {error}\n\
         Return only a valid JSON object with `activity` and a non-empty `tasks` array, \
         following the response schema. Do not include explanations or markdown."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn empty_history_has_no_summary() {
        assert_eq!(completed_summary(&[]), None);
    }

    #[test]
    fn summary_lists_results_of_completions_only() {
        let completed = vec![
            Task::tool("List files", "List the target dir", "ls", Map::new()).expect("tool"),
            Task::completion("Report", "Final report", "three files").expect("completion"),
        ];
        let summary = completed_summary(&completed).expect("summary");

        assert!(summary.starts_with("=== Previously Completed Tasks ==="));
        assert!(summary.contains("- List files:\n  Description: List the target dir\n"));
        assert!(summary.contains("  Result: three files\n"));
        assert_eq!(summary.matches("Result:").count(), 1);
    }

    #[test]
    fn notes_carry_name_and_result() {
        let note = subordinate_result_note("text_analyzer", "summary text");
        assert!(note.contains("Agent: text_analyzer"));
        assert!(note.contains("summary text"));
        assert!(tool_result_note("ls", "a.txt").contains("Tool: ls\nResult:\na.txt"));
    }
}
