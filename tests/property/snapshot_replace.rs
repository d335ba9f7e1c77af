//! Property-based tests for applying listing snapshots to the local store.
//!
//! Uses proptest to verify:
//! 1. Applying S1 then S2 leaves exactly S2's records, whatever S1 and the
//!    prior local state were.
//! 2. Applying the same snapshot twice equals applying it once.
//! 3. Every record installed from a snapshot is confirmed.

use chrono::NaiveDate;
use proptest::prelude::*;
use taskline::store::TaskStore;
use taskline_proto::snapshot;
use taskline_proto::task::{PendingKind, Task};

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (1970i32..2100, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default())
}

fn arb_pending() -> impl Strategy<Value = PendingKind> {
    prop_oneof![
        Just(PendingKind::None),
        Just(PendingKind::UncommittedCreate),
        Just(PendingKind::UncommittedDelete),
    ]
}

fn arb_task() -> impl Strategy<Value = Task> {
    (
        "[A-Za-z][A-Za-z0-9 ]{0,20}[A-Za-z0-9]",
        arb_date(),
        any::<bool>(),
        arb_pending(),
    )
        .prop_map(|(name, date, completed, pending)| {
            Task::new(&name, date)
                .map(|t| t.with_completed(completed).with_pending(pending))
                .unwrap_or_else(|_| unreachable!("strategy never yields blank names"))
        })
}

/// A listing payload: either a rendered task list or loosely shaped text.
fn arb_payload() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::collection::vec(arb_task(), 0..12).prop_map(|tasks| snapshot::render(&tasks)),
        prop::collection::vec(
            prop_oneof![
                "DATE,[0-9]{7,8}",
                "[A-Za-z ]{0,12},(true|false|TRUE|x)",
                "[ -~]{0,20}",
            ],
            0..10,
        )
        .prop_map(|lines| lines.join("\r\n")),
    ]
}

type Fields = Vec<(String, NaiveDate, bool, PendingKind)>;

/// Record contents without the timestamp, which a fresh parse always bumps.
fn fields(store: &TaskStore) -> Fields {
    store
        .all()
        .iter()
        .map(|t| (t.name().to_string(), t.date(), t.completed(), t.pending_kind()))
        .collect()
}

fn apply(store: &mut TaskStore, payload: &str) {
    store.replace_all(snapshot::parse(payload).tasks);
}

proptest! {
    #[test]
    fn second_snapshot_wins(
        local in prop::collection::vec(arb_task(), 0..8),
        s1 in arb_payload(),
        s2 in arb_payload(),
    ) {
        let mut store = TaskStore::in_memory();
        for task in local {
            store.upsert(task);
        }
        apply(&mut store, &s1);
        apply(&mut store, &s2);

        let mut fresh = TaskStore::in_memory();
        apply(&mut fresh, &s2);
        prop_assert_eq!(fields(&store), fields(&fresh));
    }

    #[test]
    fn resync_is_idempotent(payload in arb_payload()) {
        let mut once = TaskStore::in_memory();
        apply(&mut once, &payload);

        let mut twice = TaskStore::in_memory();
        apply(&mut twice, &payload);
        apply(&mut twice, &payload);
        prop_assert_eq!(fields(&once), fields(&twice));
    }

    #[test]
    fn snapshot_records_are_confirmed(payload in arb_payload()) {
        let mut store = TaskStore::in_memory();
        apply(&mut store, &payload);
        prop_assert!(store.pending().next().is_none());
    }
}
