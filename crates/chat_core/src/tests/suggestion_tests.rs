use super::*;
use shared::domain::MemberId;

fn directory() -> MemberDirectory {
    let mut directory = MemberDirectory::new();
    directory.upsert(Member::new("m1", "Alice Tran"));
    directory.upsert(Member::new("m2", "Albert Cho"));
    directory.upsert(Member::new("me", "Alan Self"));
    directory.set_self_id(MemberId::from("me"));
    directory
}

fn typed(text: &str) -> ComposeDraft {
    let mut draft = ComposeDraft::default();
    draft.set_text(text, text.len());
    draft
}

#[test]
fn detects_query_between_at_and_caret() {
    let query = detect_mention_query("hello @Ali", 10).expect("query");
    assert_eq!(query.trigger, 6);
    assert_eq!(query.text, "Ali");

    assert_eq!(detect_mention_query("hello @", 7).expect("query").text, "");
    assert!(detect_mention_query("hello @Ali ce", 13).is_none());
    assert!(detect_mention_query("hello world", 11).is_none());
    assert!(detect_mention_query("mail \\@Ali", 10).is_none());
    assert!(detect_mention_query("caret before @Ali", 3).is_none());
}

#[test]
fn scenario_a_enter_applies_selected_candidate() {
    let mut directory = MemberDirectory::new();
    directory.upsert(Member::new("m1", "Alice Tran"));
    let mut engine = SuggestionEngine::new();
    let mut draft = typed("hello @A");

    let ticket = engine.on_input(&draft).expect("ticket");
    assert!(matches!(engine.state(), SuggestionState::Querying(_)));
    assert!(engine.on_debounce(ticket, &directory));
    assert_eq!(engine.candidates().len(), 1);
    assert_eq!(engine.selected().map(|m| m.id.as_str()), Some("m1"));

    let outcome = engine.on_key(ComposeKey::Enter, &mut draft);
    assert!(matches!(outcome, KeyOutcome::Applied(ref m) if m.id.as_str() == "m1"));
    assert_eq!(draft.text, "hello @Alice Tran ");
    assert_eq!(draft.caret, draft.text.len());
    assert_eq!(draft.bindings.get("Alice Tran"), Some(&MemberId::from("m1")));
    assert_eq!(engine.state(), &SuggestionState::Idle);
}

#[test]
fn search_excludes_self() {
    let directory = directory();
    let mut engine = SuggestionEngine::new();
    let ticket = engine.on_input(&typed("@Al")).expect("ticket");
    engine.on_debounce(ticket, &directory);
    let ids: Vec<_> = engine.candidates().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

#[test]
fn arrows_cycle_selection() {
    let directory = directory();
    let mut engine = SuggestionEngine::new();
    let mut draft = typed("@Al");
    let ticket = engine.on_input(&draft).expect("ticket");
    engine.on_debounce(ticket, &directory);

    assert_eq!(
        engine.on_key(ComposeKey::ArrowUp, &mut draft),
        KeyOutcome::Moved { selected: 1 }
    );
    assert_eq!(
        engine.on_key(ComposeKey::ArrowDown, &mut draft),
        KeyOutcome::Moved { selected: 0 }
    );
    assert_eq!(
        engine.on_key(ComposeKey::ArrowDown, &mut draft),
        KeyOutcome::Moved { selected: 1 }
    );

    engine.on_key(ComposeKey::Tab, &mut draft);
    assert_eq!(draft.text, "@Albert Cho ");
}

#[test]
fn stale_ticket_is_ignored() {
    let directory = directory();
    let mut engine = SuggestionEngine::new();
    let first = engine.on_input(&typed("@A")).expect("ticket");
    let second = engine.on_input(&typed("@Al")).expect("ticket");

    assert!(!engine.on_debounce(first, &directory));
    assert!(matches!(engine.state(), SuggestionState::Querying(q) if q.text == "Al"));
    assert!(engine.on_debounce(second, &directory));
}

#[test]
fn no_results_stays_querying() {
    let directory = directory();
    let mut engine = SuggestionEngine::new();
    let ticket = engine.on_input(&typed("@zzz")).expect("ticket");
    assert!(!engine.on_debounce(ticket, &directory));
    assert!(matches!(engine.state(), SuggestionState::Querying(_)));
    assert!(engine.candidates().is_empty());
}

#[test]
fn escape_dismisses_without_applying() {
    let directory = directory();
    let mut engine = SuggestionEngine::new();
    let mut draft = typed("hi @Al");
    let ticket = engine.on_input(&draft).expect("ticket");
    engine.on_debounce(ticket, &directory);

    assert_eq!(engine.on_key(ComposeKey::Escape, &mut draft), KeyOutcome::Dismissed);
    assert_eq!(draft.text, "hi @Al");
    assert!(draft.bindings.is_empty());
    assert_eq!(
        engine.on_key(ComposeKey::Enter, &mut draft),
        KeyOutcome::NotHandled
    );
}

#[test]
fn keystroke_while_open_returns_to_querying() {
    let directory = directory();
    let mut engine = SuggestionEngine::new();
    let ticket = engine.on_input(&typed("@Al")).expect("ticket");
    engine.on_debounce(ticket, &directory);
    assert!(engine.is_open());

    assert!(engine.on_input(&typed("@Ali")).is_some());
    assert!(matches!(engine.state(), SuggestionState::Querying(_)));

    assert!(engine.on_input(&typed("@Ali ")).is_none());
    assert_eq!(engine.state(), &SuggestionState::Idle);
}

#[test]
fn apply_mid_buffer_keeps_trailing_text() {
    let mut engine = SuggestionEngine::new();
    let mut draft = ComposeDraft::default();
    draft.set_text("see @Al about it", 7);

    assert!(engine.apply(&Member::new("m1", "Alice Tran"), &mut draft));
    assert_eq!(draft.text, "see @Alice Tran  about it");
    assert_eq!(draft.caret, "see @Alice Tran ".len());
}

#[test]
fn set_text_prunes_stale_bindings() {
    let mut draft = typed("hello @Alice Tran ");
    draft.bindings.insert("Alice Tran", MemberId::from("m1"));
    draft.set_text("hello @Alice Tra", 16);
    assert!(draft.bindings.is_empty());
}

#[tokio::test(start_paused = true)]
async fn debouncer_runs_only_latest_task() {
    let fired = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));
    let mut debouncer = Debouncer::new(DEFAULT_DEBOUNCE);

    for label in ["first", "second"] {
        let fired = fired.clone();
        debouncer.schedule(async move {
            fired.lock().await.push(label);
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    tokio::time::sleep(DEFAULT_DEBOUNCE * 2).await;

    assert_eq!(*fired.lock().await, vec!["second"]);
}
