//! End-to-end propagation through the essential operations

use std::sync::Arc;

use essential_operations::letter_number_cipher::{
    self, ALPHABET_TOO_SHORT_MESSAGE, CONTROL_ALPHABET, CONTROL_LETTERS, CONTROL_NUMBERS,
    CONTROL_SEPARATOR, OUT_OF_RANGE_MESSAGE,
};
use essential_operations::word_counter::{self, CONTROL_CHARACTER_COUNT, CONTROL_LINE_COUNT, CONTROL_TEXT, CONTROL_WORD_COUNT};
use essential_operations::EXTENSION_ID;
use operation_engine::{
    ControlValue, EngineError, GraphStore, InMemoryGraphStore, IssueLevel, NodeStatus, OperationRegistry,
    PropagationEngine, VecEventSink,
};

struct Fixture {
    engine: PropagationEngine,
    store: Arc<InMemoryGraphStore>,
}

impl Fixture {
    fn value(&self, node_id: &str, control: &str) -> ControlValue {
        self.store.node(node_id).unwrap().values[control].clone()
    }
}

async fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = Arc::new(InMemoryGraphStore::default());
    let engine = PropagationEngine::new(
        Arc::new(OperationRegistry::new()),
        store.clone(),
        Arc::new(VecEventSink::new()),
    );
    let reports = engine.register_builtins().await;
    assert!(reports
        .iter()
        .any(|report| report.extension_id == EXTENSION_ID && report.outcome.is_ok()));
    Fixture { engine, store }
}

#[tokio::test]
async fn test_builtins_are_registered_once() {
    let f = fixture().await;
    let registry = f.engine.registry();
    assert_eq!(
        registry.extension_operations(EXTENSION_ID),
        vec![letter_number_cipher::OPERATION_NAME, word_counter::OPERATION_NAME]
    );

    // Activation happens at most once per extension id
    let again = f.engine.register_builtins().await;
    assert!(again
        .iter()
        .filter(|report| report.extension_id == EXTENSION_ID)
        .all(|report| report.outcome.is_err()));
    assert!(registry.has_operation(word_counter::OPERATION_NAME));
}

#[tokio::test]
async fn test_cipher_round_trip() {
    let f = fixture().await;
    f.engine.add_node("cipher", letter_number_cipher::OPERATION_NAME).unwrap();

    let report = f.engine.edit_control("cipher", CONTROL_LETTERS, "hello".into()).await.unwrap();
    assert_eq!(report.applied, vec!["cipher"]);
    assert_eq!(f.value("cipher", CONTROL_NUMBERS), ControlValue::from("8 5 12 12 15"));

    f.engine.edit_control("cipher", CONTROL_NUMBERS, "23 15 18 12 4".into()).await.unwrap();
    assert_eq!(f.value("cipher", CONTROL_LETTERS), ControlValue::from("world"));

    // Changing the separator re-encodes because letters still outrank numbers
    f.engine.edit_control("cipher", CONTROL_LETTERS, "abc".into()).await.unwrap();
    f.engine.edit_control("cipher", CONTROL_SEPARATOR, ",".into()).await.unwrap();
    assert_eq!(f.value("cipher", CONTROL_NUMBERS), ControlValue::from("1,2,3"));
}

#[tokio::test]
async fn test_short_alphabet_faults_node() {
    let f = fixture().await;
    f.engine.add_node("cipher", letter_number_cipher::OPERATION_NAME).unwrap();
    let before = f.value("cipher", CONTROL_NUMBERS);

    let report = f.engine.edit_control("cipher", CONTROL_ALPHABET, "a".into()).await.unwrap();
    assert_eq!(report.faulted, vec!["cipher"]);
    assert_eq!(f.value("cipher", CONTROL_NUMBERS), before);

    let state = f.engine.node_state("cipher");
    assert_eq!(state.status, NodeStatus::Faulted);
    assert_eq!(state.issues.len(), 1);
    assert_eq!(state.issues[0].level, IssueLevel::Error);
    assert_eq!(state.issues[0].control_name.as_deref(), Some(CONTROL_ALPHABET));
    assert_eq!(state.issues[0].message, ALPHABET_TOO_SHORT_MESSAGE);
}

#[tokio::test]
async fn test_out_of_range_numbers_warn() {
    let f = fixture().await;
    f.engine.add_node("cipher", letter_number_cipher::OPERATION_NAME).unwrap();

    f.engine.edit_control("cipher", CONTROL_NUMBERS, "0 27".into()).await.unwrap();
    assert_eq!(f.value("cipher", CONTROL_LETTERS), ControlValue::from(""));

    let state = f.engine.node_state("cipher");
    assert_eq!(state.status, NodeStatus::Idle);
    assert_eq!(state.issues.len(), 1);
    assert_eq!(state.issues[0].level, IssueLevel::Warn);
    assert_eq!(state.issues[0].control_name.as_deref(), Some(CONTROL_NUMBERS));
    assert_eq!(state.issues[0].message, OUT_OF_RANGE_MESSAGE);
}

#[tokio::test]
async fn test_word_counter() {
    let f = fixture().await;
    f.engine.add_node("counter", word_counter::OPERATION_NAME).unwrap();
    assert_eq!(f.value("counter", CONTROL_CHARACTER_COUNT), ControlValue::Integer(44));
    assert_eq!(f.value("counter", CONTROL_WORD_COUNT), ControlValue::Integer(9));
    assert_eq!(f.value("counter", CONTROL_LINE_COUNT), ControlValue::Integer(1));

    f.engine.edit_control("counter", CONTROL_TEXT, "Hello\r\nworld".into()).await.unwrap();
    assert_eq!(f.value("counter", CONTROL_CHARACTER_COUNT), ControlValue::Integer(12));
    assert_eq!(f.value("counter", CONTROL_WORD_COUNT), ControlValue::Integer(2));
    assert_eq!(f.value("counter", CONTROL_LINE_COUNT), ControlValue::Integer(2));

    assert!(matches!(
        f.engine.edit_control("counter", CONTROL_WORD_COUNT, ControlValue::Integer(1)).await,
        Err(EngineError::ReadOnlyControl { .. })
    ));
}

#[tokio::test]
async fn test_cipher_feeds_counter() {
    let f = fixture().await;
    f.engine.add_node("cipher", letter_number_cipher::OPERATION_NAME).unwrap();
    f.engine.add_node("counter", word_counter::OPERATION_NAME).unwrap();
    f.engine.connect("cipher", CONTROL_NUMBERS, "counter", CONTROL_TEXT).await.unwrap();
    assert_eq!(f.value("counter", CONTROL_WORD_COUNT), ControlValue::Integer(26));

    let report = f.engine.edit_control("cipher", CONTROL_LETTERS, "abc".into()).await.unwrap();
    assert_eq!(report.applied, vec!["cipher", "counter"]);
    assert_eq!(f.value("counter", CONTROL_TEXT), ControlValue::from("1 2 3"));
    assert_eq!(f.value("counter", CONTROL_CHARACTER_COUNT), ControlValue::Integer(5));
    assert_eq!(f.value("counter", CONTROL_WORD_COUNT), ControlValue::Integer(3));

    // A faulted cipher leaves the counter untouched
    let report = f.engine.edit_control("cipher", CONTROL_SEPARATOR, "".into()).await.unwrap();
    assert_eq!(report.evaluated, vec!["cipher"]);
    assert_eq!(f.value("counter", CONTROL_TEXT), ControlValue::from("1 2 3"));
}
