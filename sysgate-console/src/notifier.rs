use sysgate_gatekeeper::{Notice, NoticeLevel, Notifier, PendingDecision};

/// Prints notices and approval prompts on stdout.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        println!("{}", format_notice(&notice));
    }

    fn prompt(&self, decision: Option<&PendingDecision>) {
        match decision {
            Some(decision) => println!("{}", render_case(decision)),
            None => println!("-- prompt closed --"),
        }
    }
}

fn format_notice(notice: &Notice) -> String {
    let tag = match notice.level {
        NoticeLevel::Success => "ok",
        NoticeLevel::Info => "info",
        NoticeLevel::Warning => "warn",
        NoticeLevel::Error => "error",
    };
    match &notice.description {
        Some(description) => format!("[{tag}] {}: {description}", notice.title),
        None => format!("[{tag}] {}", notice.title),
    }
}

pub fn render_case(decision: &PendingDecision) -> String {
    let payload = &decision.payload;
    let rows = [
        ("Gate", Some(payload.gate_name()).filter(|name| !name.is_empty())),
        ("Name", payload.subject_name()),
        ("Detected plate", payload.detected_plate.as_deref()),
        ("Registered plate", payload.registered_plate()),
        ("Time in", payload.time_in()),
        ("Time out", payload.time_out()),
        ("Photo in", payload.picture_in()),
        ("Photo out", payload.picture_out()),
    ];

    let mut out = format!("== Approval required: {} ==", decision.subject);
    for (label, value) in rows {
        out.push_str(&format!("\n  {label:<17} {}", value.unwrap_or("-")));
    }
    out.push_str("\n  approve | reject | dismiss");
    out
}
