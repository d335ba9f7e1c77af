//! Property-based tests for the listing grammar and response framing.
//!
//! Uses proptest to verify:
//! 1. Any task list survives render → parse with names, days and flags intact.
//! 2. Arbitrary text never panics the snapshot parser.
//! 3. The frame accumulator yields the same payload however the stream is chunked.
//! 4. Every encoded command parses back to the same verb and task fields.

use chrono::NaiveDate;
use proptest::prelude::*;
use taskline_proto::codec::{self, FrameAccumulator};
use taskline_proto::command::Command;
use taskline_proto::snapshot;
use taskline_proto::task::Task;

/// Strategy for days within the 8-digit wire range.
fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (1000i32..9999, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default())
}

/// Strategy for names the grammar can carry: no line breaks, no `|END`,
/// no leading/trailing whitespace, at least one visible character.
fn arb_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9 ,.!'-]{0,30}[A-Za-z0-9]"
}

fn arb_task() -> impl Strategy<Value = Task> {
    (arb_name(), arb_date(), any::<bool>()).prop_map(|(name, date, completed)| {
        Task::new(&name, date)
            .map(|t| t.with_completed(completed))
            .unwrap_or_else(|_| unreachable!("strategy never yields blank names"))
    })
}

fn fields(tasks: &[Task]) -> Vec<(String, NaiveDate, bool)> {
    let mut out: Vec<_> = tasks
        .iter()
        .map(|t| (t.name().to_string(), t.date(), t.completed()))
        .collect();
    out.sort();
    out
}

proptest! {
    #[test]
    fn render_then_parse_preserves_tasks(tasks in prop::collection::vec(arb_task(), 0..20)) {
        let parsed = snapshot::parse(&snapshot::render(&tasks));
        prop_assert!(parsed.anomalies.is_empty());
        prop_assert_eq!(fields(&parsed.tasks), fields(&tasks));
    }

    #[test]
    fn parse_never_panics(text in "\\PC{0,512}") {
        let parsed = snapshot::parse(&text);
        prop_assert!(parsed.tasks.iter().all(|t| !t.name().is_empty()));
    }

    #[test]
    fn framing_is_chunking_invariant(
        payload in "[^|]{0,200}",
        cuts in prop::collection::vec(1usize..16, 0..32),
    ) {
        let wire = codec::frame(&payload);
        let bytes = wire.as_bytes();
        let mut acc = FrameAccumulator::new();
        let mut pos = 0;
        let mut frame = None;
        for cut in cuts.iter().copied().chain(std::iter::repeat(1)) {
            if pos >= bytes.len() {
                break;
            }
            let end = (pos + cut).min(bytes.len());
            frame = acc.push(&bytes[pos..end]);
            pos = end;
            if frame.is_some() {
                break;
            }
        }
        let frame = frame.unwrap_or_else(|| acc.finish());
        prop_assert!(frame.terminated);
        prop_assert_eq!(frame.payload, payload);
    }

    #[test]
    fn encoded_commands_parse_back(task in arb_task(), verb in 0u8..3) {
        let command = match verb {
            0 => Command::Add(task.clone()),
            1 => Command::Update(task.clone()),
            _ => Command::Delete(task.clone()),
        };
        let parsed = Command::parse(&command.encode());
        prop_assert!(parsed.is_ok());
        let parsed = parsed.unwrap_or(Command::GetAll);
        prop_assert_eq!(parsed.verb(), command.verb());
        let back = parsed.task().cloned();
        prop_assert!(back.is_some());
        if let Some(back) = back {
            prop_assert_eq!(back.name(), task.name());
            prop_assert_eq!(back.date(), task.date());
            prop_assert_eq!(back.completed(), task.completed());
        }
    }
}
