use session_marshal::acceptor::{ClassFilterAcceptor, ACCEPT_ALL};
use session_marshal::error::MarshalError;

#[test]
fn package_wildcard_covers_nested_packages() {
    let acceptor = ClassFilterAcceptor::new(["org.domain.pkg1.*"]).unwrap();
    assert!(acceptor.accepts("org.domain.pkg1.Person"));
    assert!(acceptor.accepts("org.domain.pkg1.sub.Order"));
    assert!(!acceptor.accepts("org.domain.pkg2.Person"));
    assert!(!acceptor.accepts("org.domain.pkg1"), "the package itself is not a type under it");
    assert!(!acceptor.accepts("org.domain.pkg10.Person"));
}

#[test]
fn exact_name_matches_only_itself() {
    let acceptor = ClassFilterAcceptor::new(["org.acme.Person"]).unwrap();
    assert!(acceptor.accepts("org.acme.Person"));
    assert!(!acceptor.accepts("org.acme.PersonX"));
    assert!(!acceptor.accepts("orgXacme.Person"), "dots are literal");
}

#[test]
fn accept_all_takes_anything() {
    let acceptor = ClassFilterAcceptor::accept_all();
    assert!(acceptor.accepts("org.acme.Person"));
    assert!(acceptor.accepts("Person"));
    assert_eq!(acceptor.patterns().collect::<Vec<_>>(), vec![ACCEPT_ALL]);
    assert!(ClassFilterAcceptor::new(["*"]).unwrap().accepts("x::y::Z"));
}

#[test]
fn first_matching_pattern_wins() {
    let acceptor = ClassFilterAcceptor::new(["org.acme.Person", "org.acme.*", "*.*"]).unwrap();
    assert_eq!(acceptor.matching_pattern("org.acme.Person"), Some("org.acme.Person"));
    assert_eq!(acceptor.matching_pattern("org.acme.Order"), Some("org.acme.*"));
    assert_eq!(acceptor.matching_pattern("com.shop.Order"), Some("*.*"));
}

#[test]
fn rust_paths_work_like_class_names() {
    let acceptor = ClassFilterAcceptor::new(["my_app::model::*"]).unwrap();
    assert!(acceptor.accepts("my_app::model::Person"));
    assert!(!acceptor.accepts("my_app::view::Person"));
}

#[test]
fn empty_pattern_list_rejects_everything() {
    let acceptor = ClassFilterAcceptor::new(Vec::<String>::new()).unwrap();
    assert!(!acceptor.accepts("org.acme.Person"));
}

#[test]
fn malformed_patterns_are_reported() {
    for pattern in ["", "org.*.Person", "org acme.*", "*.Person"] {
        match ClassFilterAcceptor::new([pattern]) {
            Err(MarshalError::MalformedPattern { pattern: reported, .. }) => assert_eq!(reported, pattern),
            other => panic!("expected malformed pattern for {:?}, got {:?}", pattern, other),
        }
    }
}

#[test]
fn regex_metacharacters_are_not_interpreted() {
    let acceptor = ClassFilterAcceptor::new(["org.acme.Person+"]).unwrap();
    assert!(acceptor.accepts("org.acme.Person+"));
    assert!(!acceptor.accepts("org.acme.Personnn"));
}
