//! Prompt assets for the summary agent.

const INCIDENT_MONITOR_PROMPT: &str = include_str!("../prompts/incident_monitor.md");
const SUMMARY_TASK_TEMPLATE: &str = include_str!("../prompts/summary_task.md");

pub fn incident_monitor_prompt() -> &'static str {
    INCIDENT_MONITOR_PROMPT
}

/// Fills `{summary_count}` and `{channel_id}` in the per-tick task template.
pub fn render_summary_task(summary_count: u64, channel_id: &str) -> String {
    SUMMARY_TASK_TEMPLATE
        .replace("{summary_count}", &summary_count.to_string())
        .replace("{channel_id}", channel_id)
}
