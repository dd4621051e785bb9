mod common;

use std::sync::Arc;

use session_marshal::acceptor::ClassFilterAcceptor;
use session_marshal::calendar::WeeklyCalendar;
use session_marshal::chain::StrategyChain;
use session_marshal::error::{MarshalError, Result};
use session_marshal::marshaller::{inspect, Marshaller};
use session_marshal::object::FactRef;
use session_marshal::session::{KnowledgeBase, StatefulSession};
use session_marshal::strategy::{ObjectMarshallingStrategy, ReadContext, Strategy, StrategyKind};
use session_marshal::stream::{ObjectOutput, PayloadInput};

use common::{Order, Person};

fn acceptor(patterns: &[&str]) -> ClassFilterAcceptor {
    ClassFilterAcceptor::new(patterns).unwrap()
}

#[test]
fn earlier_entry_wins_over_later_catch_all() {
    let chain = StrategyChain::new(vec![
        Strategy::content(acceptor(&["org.acme.*"])),
        Strategy::identity(ClassFilterAcceptor::accept_all()),
    ]);
    assert_eq!(chain.resolve("org.acme.model.Person").unwrap(), 0);
    assert_eq!(chain.resolve("com.shop.Order").unwrap(), 1);
}

#[test]
fn unaccepted_type_is_an_error() {
    let chain = StrategyChain::new(vec![Strategy::content(acceptor(&["org.acme.*"]))]);
    assert!(matches!(
        chain.resolve("com.shop.Order"),
        Err(MarshalError::NoStrategyAccepted { type_name }) if type_name == "com.shop.Order"
    ));
}

#[test]
fn slots_record_the_entry_that_wrote_them() {
    let kbase = Arc::new(common::knowledge_base());
    let mut session = StatefulSession::new(Arc::clone(&kbase));
    session.insert(Arc::new(Person::new("Alice", 31)));
    session.add_calendar("weekdays", Arc::new(WeeklyCalendar::weekend())).unwrap();
    let mut marshaller = Marshaller::with_strategies(
        Arc::clone(&kbase),
        vec![
            Strategy::content(acceptor(&["org.acme.*"])),
            Strategy::identity(ClassFilterAcceptor::accept_all()),
        ],
    );
    let mut bytes = Vec::new();
    marshaller.marshal(&session, &mut bytes).unwrap();

    let summary = inspect(bytes.as_slice()).unwrap();
    let entries: Vec<(&str, u32)> = summary
        .slots
        .iter()
        .map(|slot| (slot.type_tag.as_str(), slot.chain_index))
        .collect();
    assert_eq!(
        entries,
        vec![
            ("org.acme.model.Person", 0),
            ("session_marshal.calendar.WeeklyCalendar", 1),
        ]
    );
    let identity = marshaller.chain().entry(1).unwrap().as_identity().unwrap();
    assert_eq!(identity.table().len(), 1, "only the calendar went by identity");
}

#[test]
fn missing_catch_all_leaves_output_untouched() {
    let kbase = Arc::new(common::knowledge_base());
    let mut session = StatefulSession::new(Arc::clone(&kbase));
    session.insert(Arc::new(Person::new("Alice", 31)));
    session.insert(Arc::new(Order { id: 7, total: 1250 }));
    let mut marshaller =
        Marshaller::with_strategies(Arc::clone(&kbase), vec![Strategy::content(acceptor(&["org.acme.*"]))]);
    let mut bytes = Vec::new();
    let result = marshaller.marshal(&session, &mut bytes);
    assert!(matches!(result, Err(MarshalError::NoStrategyAccepted { .. })));
    assert!(bytes.is_empty());
}

#[test]
fn unknown_chain_entry_is_reported() {
    let chain = StrategyChain::default();
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.entry(0).unwrap().kind(), StrategyKind::Content);
    assert!(matches!(
        chain.entry(3),
        Err(MarshalError::UnknownChainEntry { index: 3, len: 1 })
    ));
}

#[test]
fn fingerprint_follows_structure_only() {
    let build = |first: &str, second: &str| {
        StrategyChain::new(vec![
            Strategy::identity(acceptor(&[first])),
            Strategy::content(acceptor(&[second])),
        ])
    };
    assert_eq!(
        build("org.acme.*", "*.*").fingerprint(),
        build("org.acme.*", "*.*").fingerprint()
    );
    assert_ne!(
        build("org.acme.*", "*.*").fingerprint(),
        build("org.acme.net.*", "*.*").fingerprint()
    );
    let swapped = StrategyChain::new(vec![
        Strategy::content(acceptor(&["org.acme.*"])),
        Strategy::identity(acceptor(&["*.*"])),
    ]);
    assert_ne!(build("org.acme.*", "*.*").fingerprint(), swapped.fingerprint());
}

#[test]
fn identity_table_contents_do_not_change_the_fingerprint() {
    let mut chain = StrategyChain::new(vec![Strategy::identity(ClassFilterAcceptor::accept_all())]);
    let before = chain.fingerprint();
    let order: session_marshal::object::FactRef = Arc::new(Order { id: 1, total: 0 });
    chain
        .entry_mut(0)
        .unwrap()
        .as_identity_mut()
        .unwrap()
        .register(&order)
        .unwrap();
    assert_eq!(chain.fingerprint(), before);
}

/// Writes orders as `id:total` text, without going through the type registry.
#[derive(Debug)]
struct OrderLineStrategy {
    acceptor: ClassFilterAcceptor,
}

impl OrderLineStrategy {
    fn new() -> Self {
        Self {
            acceptor: ClassFilterAcceptor::new(["com.shop.Order"]).unwrap(),
        }
    }
}

impl ObjectMarshallingStrategy for OrderLineStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Custom("order-line".to_owned())
    }
    fn acceptor(&self) -> &ClassFilterAcceptor {
        &self.acceptor
    }
    fn write(&mut self, object: &FactRef, out: &mut ObjectOutput) -> Result<()> {
        let order = object
            .downcast_ref::<Order>()
            .ok_or_else(|| MarshalError::UnsupportedObject {
                type_name: object.type_name().to_owned(),
            })?;
        out.write_str(&format!("{}:{}", order.id, order.total))
    }
    fn read(&mut self, input: &mut PayloadInput<'_>, _context: &ReadContext<'_>) -> Result<FactRef> {
        let line = input.read_str()?;
        let (id, total) = line
            .split_once(':')
            .ok_or_else(|| MarshalError::corrupt(format!("bad order line {line}")))?;
        let order = Order {
            id: id.parse().map_err(|_| MarshalError::corrupt("bad order id"))?,
            total: total.parse().map_err(|_| MarshalError::corrupt("bad order total"))?,
        };
        Ok(Arc::new(order))
    }
}

#[test]
fn user_strategy_takes_part_in_the_chain() {
    let kbase = Arc::new(common::knowledge_base());
    let mut session = StatefulSession::new(Arc::clone(&kbase));
    session.insert(Arc::new(Order { id: 7, total: 1250 }));
    session.insert(Arc::new(Person::new("Alice", 31)));
    let mut marshaller = Marshaller::with_strategies(
        Arc::clone(&kbase),
        vec![
            Strategy::custom(OrderLineStrategy::new()),
            Strategy::content(ClassFilterAcceptor::accept_all()),
        ],
    );
    assert_eq!(marshaller.chain().entry(0).unwrap().kind().to_string(), "custom:order-line");

    let mut bytes = Vec::new();
    marshaller.marshal(&session, &mut bytes).unwrap();
    let summary = inspect(bytes.as_slice()).unwrap();
    assert_eq!(summary.slots[0].type_tag, "com.shop.Order");
    assert_eq!(summary.slots[0].chain_index, 0);
    assert_eq!(&summary.slots[0].payload[4..], b"7:1250");

    // orders do not need a registered decoder on the way back
    let mut people_only = KnowledgeBase::new("acme");
    people_only.register_type::<Person>();
    let restored = marshaller.unmarshal(bytes.as_slice(), Arc::new(people_only)).unwrap();
    let orders: Vec<&Order> = restored
        .fact_handles()
        .filter_map(|fact| fact.object().downcast_ref::<Order>())
        .collect();
    assert_eq!(orders, vec![&Order { id: 7, total: 1250 }]);
}

#[test]
fn user_strategy_kind_is_part_of_the_fingerprint() {
    let custom = StrategyChain::new(vec![
        Strategy::custom(OrderLineStrategy::new()),
        Strategy::content(ClassFilterAcceptor::accept_all()),
    ]);
    let content = StrategyChain::new(vec![
        Strategy::content(acceptor(&["com.shop.Order"])),
        Strategy::content(ClassFilterAcceptor::accept_all()),
    ]);
    assert_ne!(custom.fingerprint(), content.fingerprint());
}
