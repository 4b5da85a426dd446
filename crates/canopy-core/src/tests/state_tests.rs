use std::collections::BTreeMap;
use std::sync::atomic::AtomicUsize;

use super::*;
use crate::component::component;
use crate::document::MemoryDocument;
use crate::node::Ui;
use crate::platform::InlineSpawner;
use crate::storage::{BrowserStorage, MemoryStorage};
use crate::text::text;

fn dispatcher() -> Dispatcher {
    Dispatcher::builder()
        .with_spawner(Arc::new(InlineSpawner))
        .build()
}

#[derive(Default)]
struct Reader {
    value: String,
    enabled: bool,
    changes: Arc<AtomicUsize>,
}

impl Component for Reader {
    fn render(&self) -> Ui {
        text(&self.value)
    }

    fn on_mount(&mut self, ctx: &mut Context<'_>) {
        self.enabled = true;
        let changes = Arc::clone(&self.changes);
        ctx.observe_state("greeting")
            .expect("mounted component")
            .while_active(|reader: &Reader| reader.enabled)
            .on_change(move |_| {
                changes.fetch_add(1, Ordering::SeqCst);
            })
            .value(|reader: &mut Reader, value: String| reader.value = value);
    }
}

fn mount_reader() -> (Arc<MemoryDocument>, Dispatcher, Arc<AtomicUsize>) {
    let document = Arc::new(MemoryDocument::new());
    let dispatcher = Dispatcher::builder()
        .with_document(document.clone())
        .with_spawner(Arc::new(InlineSpawner))
        .build();
    let changes = Arc::new(AtomicUsize::new(0));
    dispatcher.mount(component(Reader {
        changes: Arc::clone(&changes),
        ..Reader::default()
    }));
    dispatcher.consume();
    (document, dispatcher, changes)
}

fn body(document: &MemoryDocument, dispatcher: &Dispatcher) -> String {
    document.markup(dispatcher.body_handle().unwrap())
}

#[test]
fn set_then_get() {
    let dispatcher = dispatcher();
    dispatcher
        .set_state("user", &vec!["ada", "grace"], StateOptions::default())
        .unwrap();

    let users: Option<Vec<String>> = dispatcher.get_state("user").unwrap();
    assert_eq!(users, Some(vec!["ada".to_owned(), "grace".to_owned()]));
    assert_eq!(dispatcher.get_state::<u32>("missing").unwrap(), None);
}

#[test]
fn decoding_into_the_wrong_type_fails() {
    let dispatcher = dispatcher();
    dispatcher
        .set_state("count", &"three", StateOptions::default())
        .unwrap();

    let err = dispatcher.get_state::<u32>("count").unwrap_err();
    assert!(matches!(err, StateError::Decode { ref key, .. } if key == "count"));
}

#[test]
fn unencodable_values_are_rejected() {
    let dispatcher = dispatcher();
    let mut value = BTreeMap::new();
    value.insert((1_u8, 2_u8), 3_u8);

    let err = dispatcher
        .set_state("grid", &value, StateOptions::default())
        .unwrap_err();
    assert!(matches!(err, StateError::Encode { .. }));
    assert_eq!(dispatcher.get_state::<u8>("grid").unwrap(), None);
}

#[test]
fn expired_values_read_as_missing() {
    let dispatcher = dispatcher();
    dispatcher
        .set_state("flash", &1, StateOptions::default().expires_in(Duration::ZERO))
        .unwrap();
    dispatcher
        .set_state("kept", &2, StateOptions::default().expires_in(Duration::from_secs(60)))
        .unwrap();

    assert_eq!(dispatcher.get_state::<i32>("flash").unwrap(), None);
    assert_eq!(dispatcher.get_state::<i32>("kept").unwrap(), Some(2));
}

#[test]
fn persisted_values_survive_the_dispatcher() {
    let storage = Arc::new(MemoryStorage::new());
    let first = Dispatcher::builder()
        .with_local_storage(storage.clone())
        .build();
    first
        .set_state("theme", &"dark", StateOptions::default().persist())
        .unwrap();
    first.close();
    assert_eq!(first.get_state::<String>("theme").unwrap().as_deref(), Some("dark"));

    let second = Dispatcher::builder()
        .with_local_storage(storage.clone())
        .build();
    assert_eq!(
        second.get_state::<String>("theme").unwrap().as_deref(),
        Some("dark")
    );

    second.del_state("theme");
    assert_eq!(storage.get_json("theme"), None);
    assert_eq!(second.get_state::<String>("theme").unwrap(), None);
}

#[test]
fn expired_persisted_values_are_dropped_from_storage() {
    let storage = Arc::new(MemoryStorage::new());
    let persisted = PersistedState {
        value: serde_json::json!("old"),
        expires_at_ms: Some(1),
    };
    storage
        .set_json("stale", serde_json::to_string(&persisted).unwrap())
        .unwrap();
    let dispatcher = Dispatcher::builder()
        .with_local_storage(storage.clone())
        .build();

    assert_eq!(dispatcher.get_state::<String>("stale").unwrap(), None);
    assert!(storage.is_empty());
}

#[test]
fn unpersisted_values_stay_in_memory() {
    let storage = Arc::new(MemoryStorage::new());
    let dispatcher = Dispatcher::builder()
        .with_local_storage(storage.clone())
        .build();

    dispatcher
        .set_state("draft", &"x", StateOptions::default())
        .unwrap();

    assert!(storage.is_empty());
}

#[test]
fn observers_receive_new_values() {
    let (document, dispatcher, changes) = mount_reader();
    assert_eq!(dispatcher.observer_count("greeting"), 1);

    dispatcher
        .set_state("greeting", &"hi", StateOptions::default())
        .unwrap();
    dispatcher.consume();
    assert_eq!(body(&document, &dispatcher), "<body>hi</body>");

    dispatcher
        .set_state("greeting", &"hello", StateOptions::default())
        .unwrap();
    dispatcher.consume();
    assert_eq!(body(&document, &dispatcher), "<body>hello</body>");
    assert_eq!(changes.load(Ordering::SeqCst), 2);
}

#[test]
fn existing_value_is_delivered_on_observe() {
    let document = Arc::new(MemoryDocument::new());
    let dispatcher = Dispatcher::builder()
        .with_document(document.clone())
        .with_spawner(Arc::new(InlineSpawner))
        .build();
    dispatcher
        .set_state("greeting", &"early", StateOptions::default())
        .unwrap();

    dispatcher.mount(component(Reader::default()));
    dispatcher.consume();

    assert_eq!(body(&document, &dispatcher), "<body>early</body>");
}

#[test]
fn observer_stops_once_inactive() {
    let (document, dispatcher, _) = mount_reader();
    dispatcher.update(dispatcher.root(), |ctx| {
        ctx.component_mut::<Reader>().unwrap().enabled = false;
    });
    dispatcher.consume();

    dispatcher
        .set_state("greeting", &"ignored", StateOptions::default())
        .unwrap();
    dispatcher.consume();

    assert_eq!(body(&document, &dispatcher), "<body></body>");
    assert_eq!(dispatcher.observer_count("greeting"), 0);
}

#[test]
fn observers_of_dismounted_nodes_are_pruned() {
    let (document, dispatcher, changes) = mount_reader();
    dispatcher.mount(text("other"));
    dispatcher.consume();

    dispatcher
        .set_state("greeting", &"late", StateOptions::default())
        .unwrap();
    dispatcher.consume();

    assert_eq!(body(&document, &dispatcher), "<body>other</body>");
    assert_eq!(dispatcher.observer_count("greeting"), 0);
    assert_eq!(changes.load(Ordering::SeqCst), 0);
}

#[test]
fn deleting_state_drops_its_observers() {
    let (_, dispatcher, _) = mount_reader();
    dispatcher
        .set_state("greeting", &"hi", StateOptions::default())
        .unwrap();

    dispatcher.del_state("greeting");

    assert_eq!(dispatcher.observer_count("greeting"), 0);
    assert_eq!(dispatcher.get_state::<String>("greeting").unwrap(), None);
}

#[test]
fn mismatched_binding_is_logged_not_fatal() {
    let (document, dispatcher, changes) = mount_reader();
    dispatcher
        .set_state("greeting", &42, StateOptions::default())
        .unwrap();
    dispatcher.consume();

    assert_eq!(body(&document, &dispatcher), "<body></body>");
    assert_eq!(changes.load(Ordering::SeqCst), 1);
    assert_eq!(dispatcher.observer_count("greeting"), 1);
}
