use mission_core::{ApprovalStatus, ApprovalType, Decision};
use mission_store::{FileStore, NewApproval, ResolveOutcome};
use tempfile::tempdir;

fn request(content: &str) -> NewApproval {
    NewApproval {
        kind: ApprovalType::GitPush,
        content: content.to_string(),
        requested_by: Some("CodeEx".to_string()),
        tool_id: Some("t3".to_string()),
        session_key: None,
    }
}

#[test]
fn approval_resolves_exactly_once() {
    let tmp = tempdir().expect("tempdir");
    let store = FileStore::open(tmp.path()).expect("open store");

    let created = store
        .create_approval(request("git push origin main"))
        .expect("create approval");
    assert_eq!(created.status, ApprovalStatus::Pending);
    assert!(created.resolved_at.is_none());

    let resolved = match store
        .resolve_approval(&created.id, Decision::Approve)
        .expect("resolve")
    {
        ResolveOutcome::Resolved(item) => item,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(resolved.status, ApprovalStatus::Approved);
    assert!(resolved.resolved_at.is_some());

    match store
        .resolve_approval(&created.id, Decision::Reject)
        .expect("second resolve")
    {
        ResolveOutcome::AlreadyResolved(item) => assert_eq!(item.status, ApprovalStatus::Approved),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let stored = store
        .list_approvals(false)
        .expect("list")
        .into_iter()
        .find(|a| a.id == created.id)
        .expect("approval exists");
    assert_eq!(stored.status, ApprovalStatus::Approved);
}

#[test]
fn resolved_at_is_set_iff_not_pending() {
    let tmp = tempdir().expect("tempdir");
    let store = FileStore::open(tmp.path()).expect("open store");
    let a = store.create_approval(request("one")).expect("create");
    let _b = store.create_approval(request("two")).expect("create");
    store
        .resolve_approval(&a.id, Decision::Reject)
        .expect("reject");

    for item in store.list_approvals(false).expect("list") {
        assert_eq!(item.resolved_at.is_some(), item.status != ApprovalStatus::Pending);
    }
    let pending = store.list_approvals(true).expect("pending");
    assert_eq!(pending.len(), 1);
    assert!(pending.iter().all(|a| a.is_pending()));
}

#[test]
fn unknown_approval_is_not_found() {
    let store = FileStore::in_memory();
    assert_eq!(
        store
            .resolve_approval("abc", Decision::Approve)
            .expect("resolve"),
        ResolveOutcome::NotFound
    );
}
