//! Terminal formatting for records and process events.

use colored::{ColoredString, Colorize};
use pk_protocol::ipc::ProcessEvent;
use pk_protocol::process_models::{ProcessRecord, ProcessState};
use uuid::Uuid;

pub fn state_label(state: ProcessState) -> ColoredString {
    let label = state.as_str();
    match state {
        ProcessState::Start => label.normal(),
        ProcessState::InProgress => label.cyan(),
        ProcessState::Pause => label.yellow(),
        ProcessState::Cancel => label.magenta(),
        ProcessState::Error => label.red(),
        ProcessState::Done => label.green(),
    }
}

/// `<id>  <type>  <state>  step <n>`
pub fn record_line(record: &ProcessRecord) -> String {
    format!(
        "{}  {}  {}  step {}",
        record.id,
        record.process_type.bold(),
        state_label(record.state),
        record.step
    )
}

pub fn event_line(id: Uuid, name: &str, event: &ProcessEvent) -> String {
    let prefix = format!("[{}]", short_id(id)).dimmed();
    let detail = match event {
        ProcessEvent::Start { record } => format!("{} {}", "start".bold(), record.process_type),
        ProcessEvent::TaskBefore { record } => format!("step {} ...", record.step),
        ProcessEvent::Task { record, step } => match step {
            Some(step) => format!("step {step} {}", "ok".green()),
            None => format!("step {} {}", record.step.saturating_sub(1), "ok".green()),
        },
        ProcessEvent::TaskEvent { args, .. } => {
            let args = serde_json::to_string(args).unwrap_or_default();
            format!("{} {}", name.blue(), args)
        }
        ProcessEvent::Pause { .. } => "pause".yellow().to_string(),
        ProcessEvent::Resume { .. } => "resume".green().to_string(),
        ProcessEvent::Cancel { .. } => "cancel".magenta().to_string(),
        ProcessEvent::Error { error, record } => {
            format!("{} at step {}: {error}", "error".red().bold(), record.step)
        }
        ProcessEvent::Done => "done".green().bold().to_string(),
    };
    format!("{prefix} {detail}")
}

fn short_id(id: Uuid) -> String {
    id.simple().to_string().chars().take(8).collect()
}
