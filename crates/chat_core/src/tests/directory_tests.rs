use super::*;

fn seeded() -> MemberDirectory {
    let mut directory = MemberDirectory::new();
    directory.upsert(Member::new("m1", "Alice Tran").with_email("alice@school.test"));
    directory.upsert(Member::new("m2", "Bob Ng").with_email("bob@school.test"));
    directory.upsert(Member::new("m3", "Carla Diaz").with_email("carla@school.test"));
    directory
}

#[test]
fn upsert_inserts_once_per_id() {
    let mut directory = seeded();
    assert!(!directory.upsert(Member::new("m1", "Alice Tran")));
    assert_eq!(directory.len(), 3);
}

#[test]
fn placeholder_name_is_upgraded_by_roster_entry() {
    let mut directory = MemberDirectory::new();
    directory.upsert(Member::new("m9", PLACEHOLDER_NAME));
    assert!(directory.upsert(Member::new("m9", "Dana Wu").with_avatar("avatars/dana.png")));

    let member = directory.resolve_by_id(&MemberId::from("m9")).expect("member");
    assert_eq!(member.display_name, "Dana Wu");
    assert_eq!(member.avatar_ref.as_deref(), Some("avatars/dana.png"));
}

#[test]
fn real_name_is_never_downgraded() {
    let mut directory = seeded();
    for name in ["", "   ", PLACEHOLDER_NAME, "m1", "Someone Else"] {
        directory.upsert(Member::new("m1", name));
    }
    let member = directory.resolve_by_id(&MemberId::from("m1")).expect("member");
    assert_eq!(member.display_name, "Alice Tran");
}

#[test]
fn existing_avatar_and_email_are_kept() {
    let mut directory = MemberDirectory::new();
    directory.upsert(
        Member::new("m1", "Alice Tran")
            .with_email("alice@school.test")
            .with_avatar("a.png"),
    );
    directory.upsert(Member::new("m1", "Alice Tran"));
    directory.upsert(Member::new("m1", "Alice Tran").with_avatar("b.png").with_email("other@x"));

    let member = directory.resolve_by_id(&MemberId::from("m1")).expect("member");
    assert_eq!(member.avatar_ref.as_deref(), Some("a.png"));
    assert_eq!(member.email, "alice@school.test");
}

#[test]
fn history_author_without_name_becomes_placeholder() {
    let entry = HistoryEntry {
        id: "x1".into(),
        author_id: "m7".into(),
        author_display_name: String::new(),
        author_avatar_ref: None,
        body: "hi".into(),
        created_at: "2024-01-01T00:00:00Z".parse().expect("timestamp"),
        local_id: None,
    };
    let member = Member::from(&entry);
    assert_eq!(member.display_name, PLACEHOLDER_NAME);
    assert!(member.has_placeholder_name());
}

#[test]
fn search_matches_name_or_email_case_insensitively() {
    let directory = seeded();
    let by_name: Vec<_> = directory.search("tRAN", false).into_iter().map(|m| m.id).collect();
    assert_eq!(by_name, vec![MemberId::from("m1")]);

    let by_email: Vec<_> = directory.search("bob@", false).into_iter().map(|m| m.id).collect();
    assert_eq!(by_email, vec![MemberId::from("m2")]);
}

#[test]
fn empty_query_returns_first_page_in_insertion_order() {
    let mut directory = MemberDirectory::new();
    for idx in 0..12 {
        directory.upsert(Member::new(format!("m{idx}"), format!("Student {idx}")));
    }
    let page = directory.search("", false);
    assert_eq!(page.len(), SEARCH_PAGE_SIZE);
    assert_eq!(page[0].id, MemberId::from("m0"));
    assert_eq!(page[7].id, MemberId::from("m7"));
}

#[test]
fn search_can_exclude_self() {
    let mut directory = seeded();
    directory.set_self_id(MemberId::from("m2"));

    let with_self = directory.search("", false);
    assert!(with_self.iter().any(|m| m.id.as_str() == "m2"));

    let without_self = directory.search("", true);
    assert_eq!(without_self.len(), 2);
    assert!(without_self.iter().all(|m| m.id.as_str() != "m2"));
}
