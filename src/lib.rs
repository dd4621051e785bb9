//! Session marshalling – snapshots of a rule engine session with pluggable
//! handling of the user objects inside it.
//!
//! A [`session::StatefulSession`] holds facts, an agenda, process instances,
//! calendars and timers. Most of that state belongs to the engine and is
//! written directly. The user objects embedded in it (facts, process
//! variables, calendars) are opaque to the engine, so each one is handed to
//! the first strategy of a [`chain::StrategyChain`] whose acceptor takes the
//! object's type name:
//! * [`strategy::IdentityStrategy`] writes a stable integer and keeps the
//!   object in a table; it only works where that table is available again.
//! * [`strategy::ContentStrategy`] writes the object's own byte form and
//!   rebuilds it through the [`object::TypeRegistry`] of the knowledge base.
//! * Anything else implements [`strategy::ObjectMarshallingStrategy`].
//!
//! Acceptors are built from class-name patterns such as `org.acme.*`, see
//! [`acceptor::ClassFilterAcceptor`].
//!
//! ## Modules
//! * [`error`] – The [`error::MarshalError`] taxonomy.
//! * [`settings`] – Layered [`settings::MarshallerConfig`].
//! * [`stream`] – Length-prefixed big-endian primitives.
//! * [`object`] – [`object::Fact`], [`object::Externalizable`] and the [`fact!`] macro.
//! * [`acceptor`], [`strategy`], [`chain`] – Deciding who writes an object and how.
//! * [`session`], [`calendar`] – The state being snapshotted.
//! * [`marshaller`] – Writing and reading snapshots.
//! * [`provider`] – [`provider::MarshallerFactory`] and the process-wide provider behind it.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use session_marshal::fact;
//! use session_marshal::error::Result;
//! use session_marshal::object::{decode_json, encode_json, Externalizable};
//! use session_marshal::provider::MarshallerFactory;
//! use session_marshal::session::{KnowledgeBase, StatefulSession};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Person { name: String }
//! impl Externalizable for Person {
//!     const TYPE_NAME: &'static str = "org.acme.Person";
//!     fn encode(&self) -> Result<Vec<u8>> { encode_json(self) }
//!     fn decode(bytes: &[u8]) -> Result<Self> { decode_json(bytes) }
//! }
//! fact!(Person);
//!
//! let mut kbase = KnowledgeBase::new("people");
//! kbase.register_type::<Person>();
//! let kbase = Arc::new(kbase);
//!
//! let mut session = StatefulSession::new(Arc::clone(&kbase));
//! session.insert(Arc::new(Person { name: "Alice".into() }));
//!
//! let mut marshaller = MarshallerFactory::new_marshaller(Arc::clone(&kbase)).unwrap();
//! let mut snapshot = Vec::new();
//! marshaller.marshal(&session, &mut snapshot).unwrap();
//! let restored = marshaller.unmarshal(snapshot.as_slice(), kbase).unwrap();
//! assert_eq!(restored.fact_count(), 1);
//! ```

pub mod acceptor;
pub mod calendar;
pub mod chain;
pub mod error;
pub mod marshaller;
pub mod object;
pub mod provider;
pub mod session;
pub mod settings;
pub mod strategy;
pub mod stream;

pub use acceptor::ClassFilterAcceptor;
pub use error::{MarshalError, Result};
pub use marshaller::Marshaller;
pub use provider::MarshallerFactory;
pub use strategy::{ObjectMarshallingStrategy, Strategy};
