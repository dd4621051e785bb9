mod common;

use std::sync::Arc;

use session_marshal::acceptor::ClassFilterAcceptor;
use session_marshal::error::MarshalError;
use session_marshal::marshaller::{inspect, Marshaller};
use session_marshal::object::FactRef;
use session_marshal::session::{KnowledgeBase, StatefulSession, Value};
use session_marshal::strategy::Strategy;

use common::{Connection, Order, Person};

#[test]
fn objects_come_back_equal_but_not_identical() {
    let kbase = Arc::new(common::knowledge_base());
    let mut session = StatefulSession::new(Arc::clone(&kbase));
    let alice: FactRef = Arc::new(Person::new("Alice", 31));
    let handle = session.insert(Arc::clone(&alice));
    session.insert_into("orders", Arc::new(Order { id: 7, total: 1250 }));

    let mut marshaller = Marshaller::new(Arc::clone(&kbase));
    let mut bytes = Vec::new();
    marshaller.marshal(&session, &mut bytes).unwrap();
    let restored = marshaller.unmarshal(bytes.as_slice(), kbase).unwrap();

    assert_eq!(restored.fact_count(), 2);
    let person = restored.object(handle).unwrap();
    assert!(!Arc::ptr_eq(person, &alice));
    assert_eq!(person.downcast_ref::<Person>(), Some(&Person::new("Alice", 31)));
    let order = restored
        .fact_handles()
        .find(|fact| fact.entry_point() == "orders")
        .unwrap();
    assert_eq!(order.object().downcast_ref::<Order>(), Some(&Order { id: 7, total: 1250 }));
}

#[test]
fn payload_is_the_objects_own_encoding() {
    let kbase = Arc::new(common::knowledge_base());
    let mut session = StatefulSession::new(Arc::clone(&kbase));
    session.insert(Arc::new(Person::new("Alice", 31)));
    let mut bytes = Vec::new();
    Marshaller::new(Arc::clone(&kbase)).marshal(&session, &mut bytes).unwrap();

    let summary = inspect(bytes.as_slice()).unwrap();
    let payload = &summary.slots[0].payload;
    let json = br#"{"name":"Alice","age":31}"#;
    assert_eq!(&payload[..4], (json.len() as u32).to_be_bytes().as_slice());
    assert_eq!(&payload[4..], json.as_slice());
}

#[test]
fn session_state_survives_the_round_trip() {
    let kbase = Arc::new(common::knowledge_base());
    let mut session = StatefulSession::new(Arc::clone(&kbase));
    session.advance_time(5_000);
    let alice = session.insert(Arc::new(Person::new("Alice", 31)));
    let bob = session.insert(Arc::new(Person::new("Bob", 40)));
    session.update(bob, Arc::new(Person::new("Bob", 41))).unwrap();
    session.set_focus("audit");
    session.activate("greet", &[alice]).unwrap();
    session.activate("audit", &[alice, bob]).unwrap();
    let instance = session
        .start_process(
            "onboarding",
            vec![
                ("approved".to_owned(), Value::Bool(true)),
                ("attempts".to_owned(), Value::Int(3)),
                ("note".to_owned(), Value::Text("first pass".to_owned())),
                ("owner".to_owned(), Value::Null),
            ],
        )
        .unwrap();
    session.move_token(instance, 1, 2).unwrap();

    let mut marshaller = Marshaller::new(Arc::clone(&kbase));
    let mut bytes = Vec::new();
    marshaller.marshal(&session, &mut bytes).unwrap();
    let mut restored = marshaller.unmarshal(bytes.as_slice(), Arc::clone(&kbase)).unwrap();

    assert_eq!(restored.current_time(), 5_000);
    assert_eq!(restored.agenda().focus(), "audit");
    assert_eq!(restored.agenda().focus_stack(), ["audit".to_owned()]);
    let next = restored.agenda().next_activation().unwrap();
    assert_eq!(next.rule(), "greet");
    assert_eq!(next.handles(), &[alice]);
    assert_eq!(restored.agenda().activations().len(), 2);

    let bob_handle = restored.fact_handles().find(|f| f.id() == bob).unwrap();
    assert_eq!(bob_handle.recency(), 3);
    assert_eq!(bob_handle.object().downcast_ref::<Person>().unwrap().age, 41);

    let process = restored.process_instance(instance).unwrap();
    assert_eq!(process.active_nodes(), &[2]);
    assert!(matches!(process.variable("approved"), Some(Value::Bool(true))));
    assert!(matches!(process.variable("attempts"), Some(Value::Int(3))));
    assert!(matches!(process.variable("note"), Some(Value::Text(t)) if t == "first pass"));
    assert!(matches!(process.variable("owner"), Some(Value::Null)));

    // counters carry over, so new ids do not collide with restored ones
    let carol = restored.insert(Arc::new(Person::new("Carol", 25)));
    assert_eq!(carol, bob + 1);
    let second = restored.start_process("onboarding", Vec::new()).unwrap();
    assert_eq!(second, instance + 1);
}

#[test]
fn unregistered_type_tag_fails_class_resolution() {
    let kbase = Arc::new(common::knowledge_base());
    let mut session = StatefulSession::new(Arc::clone(&kbase));
    session.insert(Arc::new(Order { id: 1, total: 10 }));
    let mut marshaller = Marshaller::new(Arc::clone(&kbase));
    let mut bytes = Vec::new();
    marshaller.marshal(&session, &mut bytes).unwrap();

    let bare = Arc::new(KnowledgeBase::new("acme"));
    assert!(matches!(
        marshaller.unmarshal(bytes.as_slice(), bare),
        Err(MarshalError::ClassResolution { type_tag }) if type_tag == "com.shop.Order"
    ));
}

#[test]
fn opaque_object_cannot_go_by_content() {
    let kbase = Arc::new(common::knowledge_base());
    let mut session = StatefulSession::new(Arc::clone(&kbase));
    session.insert(Arc::new(Person::new("Alice", 31)));
    session.insert(Arc::new(Connection { peer: "db01".to_owned() }));
    let mut marshaller = Marshaller::with_strategies(
        Arc::clone(&kbase),
        vec![Strategy::content(ClassFilterAcceptor::accept_all())],
    );
    let mut bytes = Vec::new();
    assert!(matches!(
        marshaller.marshal(&session, &mut bytes),
        Err(MarshalError::UnsupportedObject { type_name }) if type_name == "org.acme.net.Connection"
    ));
    assert!(bytes.is_empty());
}
