//! Integration tests for contact merging and search.

mod common;

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use common::{CancellingSource, FakeApi, remote_contact, standalone_fetcher};
use mailroom_core::{
    AddressBook, ContactManager, ContactOrigin, CoreConfig, ExecutionContext,
    InMemoryContactSource, LocalContact, MergedContact, NewContact,
};

fn local(identifier: &str, given: &str, family: &str, emails: &[&str]) -> LocalContact {
    LocalContact {
        identifier: identifier.into(),
        given_name: given.into(),
        family_name: family.into(),
        emails: emails.iter().map(ToString::to_string).collect(),
    }
}

struct Setup {
    contacts: ContactManager,
    api: Arc<FakeApi>,
    device: Arc<InMemoryContactSource>,
}

fn setup(config: &CoreConfig) -> Setup {
    let api = FakeApi::new();
    let device = Arc::new(InMemoryContactSource::default());
    let contacts = ContactManager::new(config, standalone_fetcher(1, Arc::clone(&api)), device.clone());
    Setup {
        contacts,
        api,
        device,
    }
}

fn address_book(id: i64, is_default: bool) -> AddressBook {
    AddressBook {
        id,
        uuid: format!("book-{id}"),
        name: format!("Book {id}"),
        is_default,
        groups: vec![],
    }
}

#[tokio::test]
async fn test_same_identity_merges_into_one_row() {
    let s = setup(&CoreConfig::in_memory());
    s.api.set_contacts(vec![remote_contact("r1", "A X", &["a@x.com"])]);
    s.device.set_contacts(vec![local("l1", "A", "X", &["a@x.com"])]);

    s.contacts.update_contact_db().await.unwrap();

    let merged = s.contacts.merged_contacts().await.unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, MergedContact::compute_id("a@x.com", "A X"));
    assert!(matches!(merged[0].origin, ContactOrigin::Both { .. }));
    assert_eq!(merged[0].remote().unwrap().id, "r1");
    assert_eq!(merged[0].local().unwrap().identifier, "l1");
}

#[tokio::test]
async fn test_different_names_stay_separate() {
    let s = setup(&CoreConfig::in_memory());
    s.api.set_contacts(vec![remote_contact("r1", "Alice", &["a@x.com"])]);
    s.device.set_contacts(vec![local("l1", "Alicia", "", &["a@x.com"])]);

    s.contacts.update_contact_db().await.unwrap();

    let merged = s.contacts.merged_contacts().await.unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(s.contacts.contacts_with_email("A@X.COM").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_vanished_contacts_are_deleted() {
    let s = setup(&CoreConfig::in_memory());
    s.api.set_contacts(vec![
        remote_contact("r1", "Ann", &["ann@x.com"]),
        remote_contact("r2", "Bob", &["bob@x.com"]),
    ]);
    s.device.set_contacts(vec![local("l1", "Cy", "", &["cy@x.com"])]);
    s.contacts.update_contact_db().await.unwrap();
    assert_eq!(s.contacts.merged_contacts().await.unwrap().len(), 3);

    s.api.set_contacts(vec![remote_contact("r1", "Ann", &["ann@x.com"])]);
    s.device.set_contacts(vec![]);
    s.contacts.update_contact_db().await.unwrap();

    let merged = s.contacts.merged_contacts().await.unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].email, "ann@x.com");
}

#[tokio::test]
async fn test_merge_is_idempotent() {
    let s = setup(&CoreConfig::in_memory());
    s.api.set_contacts(vec![
        remote_contact("r1", "Ann", &["ann@x.com", "ann@y.com"]),
        remote_contact("r2", "Bob", &["bob@x.com"]),
    ]);
    s.device
        .set_contacts(vec![local("l1", "Bob", "", &["bob@x.com"]), local("l2", "Cy", "", &["cy@x.com"])]);

    s.contacts.update_contact_db().await.unwrap();
    let mut first = s.contacts.merged_contacts().await.unwrap();
    s.contacts.update_contact_db().await.unwrap();
    let mut second = s.contacts.merged_contacts().await.unwrap();

    first.sort_by(|a, b| a.id.cmp(&b.id));
    second.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[tokio::test]
async fn test_extension_does_not_merge() {
    let s = setup(&CoreConfig::in_memory().with_context(ExecutionContext::Extension));
    s.api.set_contacts(vec![remote_contact("r1", "Ann", &["ann@x.com"])]);

    s.contacts.update_contact_db().await.unwrap();

    assert!(s.contacts.merged_contacts().await.unwrap().is_empty());
    assert_eq!(s.api.contacts_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_refresh_is_throttled() {
    let s = setup(&CoreConfig::in_memory());
    s.api.address_books.lock().unwrap().push(address_book(1, true));

    assert!(s.contacts.refresh_contacts_and_address_books_if_needed().await.unwrap());
    assert!(!s.contacts.refresh_contacts_and_address_books_if_needed().await.unwrap());
    assert_eq!(s.api.contacts_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_address_book_failure_still_merges() {
    let s = setup(&CoreConfig::in_memory());
    s.api.fail_address_books.store(true, Ordering::SeqCst);
    s.api.set_contacts(vec![remote_contact("r1", "Ann", &["ann@x.com"])]);

    assert!(s.contacts.refresh_contacts_and_address_books().await.is_err());
    assert_eq!(s.contacts.merged_contacts().await.unwrap().len(), 1);

    // A failed refresh is not remembered, so the next call retries.
    s.api.fail_address_books.store(false, Ordering::SeqCst);
    assert!(s.contacts.refresh_contacts_and_address_books_if_needed().await.unwrap());
}

#[tokio::test]
async fn test_cancelled_merge_deletes_nothing() {
    let api = FakeApi::new();
    let device = Arc::new(CancellingSource {
        inner: InMemoryContactSource::default(),
        target: Mutex::new(None),
    });
    let contacts = Arc::new(ContactManager::new(
        &CoreConfig::in_memory(),
        standalone_fetcher(1, Arc::clone(&api)),
        device.clone(),
    ));

    api.set_contacts(vec![remote_contact("r1", "Ann", &["ann@x.com"])]);
    device
        .inner
        .set_contacts(vec![local("l1", "Cy", "", &["cy@x.com"])]);
    contacts.update_contact_db().await.unwrap();
    assert_eq!(contacts.merged_contacts().await.unwrap().len(), 2);

    api.set_contacts(vec![]);
    device.inner.set_contacts(vec![]);
    *device.target.lock().unwrap() = Some(Arc::clone(&contacts));
    contacts.update_contact_db().await.unwrap();

    assert_eq!(contacts.merged_contacts().await.unwrap().len(), 2);
    assert!(!contacts.is_merging());
    device.target.lock().unwrap().take();
}

#[tokio::test]
async fn test_search_ignores_case_and_accents() {
    let s = setup(&CoreConfig::in_memory());
    s.api.set_contacts(vec![
        remote_contact("r1", "Émile Zola", &["emile@x.com"]),
        remote_contact("r2", "Zoé Durand", &["zoe@x.com"]),
        remote_contact("r3", "Bob", &["bob@x.com"]),
    ]);
    s.contacts.update_contact_db().await.unwrap();

    let found = s.contacts.search_contacts("EMILE", None, None).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Émile Zola");

    let found = s.contacts.search_contacts("zoe", None, None).await.unwrap();
    assert_eq!(found.len(), 1);

    let found = s.contacts.search_contacts("X.COM", None, None).await.unwrap();
    assert_eq!(found.len(), 3);
}

#[tokio::test]
async fn test_search_sorts_before_limiting() {
    let s = setup(&CoreConfig::in_memory());
    s.api.set_contacts(vec![
        remote_contact("r1", "Carol", &["carol@x.com"]),
        remote_contact("r2", "Alice", &["alice@x.com"]),
        remote_contact("r3", "Bob", &["bob@x.com"]),
    ]);
    s.contacts.update_contact_db().await.unwrap();

    let by_name = |a: &MergedContact, b: &MergedContact| -> CmpOrdering { a.name.cmp(&b.name) };
    let found = s
        .contacts
        .search_contacts("x.com", Some(2), Some(&by_name))
        .await
        .unwrap();
    let names: Vec<_> = found.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Alice", "Bob"]);

    let found = s.contacts.search_contacts("x.com", Some(1), None).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_device_search() {
    let s = setup(&CoreConfig::in_memory());
    s.device.set_contacts(vec![
        local("l1", "Hélène", "Martin", &["helene@x.com"]),
        local("l2", "Paul", "", &["paul@y.com"]),
        local("l3", "Anne", "Helm", &[]),
    ]);

    let found = s.contacts.search_device_contacts("hel", None, None).await.unwrap();
    let ids: Vec<_> = found.iter().map(|c| c.identifier.as_str()).collect();
    assert_eq!(ids, ["l1", "l3"]);

    let found = s.contacts.search_device_contacts("y.com", Some(5), None).await.unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn test_group_search_and_default_book() {
    let s = setup(&CoreConfig::in_memory());
    let mut personal = address_book(1, false);
    personal.groups = vec![mailroom_core::GroupContact {
        id: 7,
        name: "Équipe".into(),
        address_book_id: 1,
    }];
    *s.api.address_books.lock().unwrap() = vec![personal, address_book(2, true)];

    s.contacts.refresh_address_books().await.unwrap();

    let groups = s.contacts.search_group_contacts("equipe", None, None).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].id, 7);
    assert_eq!(s.contacts.default_address_book().await.unwrap().unwrap().id, 2);
}

#[tokio::test]
async fn test_add_contact_merges_it() {
    let s = setup(&CoreConfig::in_memory());
    let book = address_book(1, true);
    s.contacts
        .add_contact(
            &NewContact {
                email: "new@x.com".into(),
                name: "Newcomer".into(),
            },
            &book,
        )
        .await
        .unwrap();

    let found = s.contacts.contacts_with_email("new@x.com").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].remote().unwrap().address_book_id, Some(1));
}
