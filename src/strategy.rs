//! Strategies turn an accepted user object into a payload and back.
//!
//! Two strategies are built in. [`IdentityStrategy`] writes a small integer
//! that stands for the object and keeps the object itself in a table, so the
//! reading side must already know the object (typically the same process, or
//! one seeded with the same table). [`ContentStrategy`] writes the object's
//! own byte form and rebuilds it from the knowledge base's type registry.
//!
//! Further strategies implement [`ObjectMarshallingStrategy`] and join a chain
//! as [`Strategy::Custom`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// used to keep the one-to-one mapping between objects and their assigned ids
use bimap::BiMap;

use crate::acceptor::ClassFilterAcceptor;
use crate::error::{MarshalError, Result};
use crate::object::FactRef;
use crate::session::KnowledgeBase;
use crate::stream::{ObjectOutput, PayloadInput};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Identity,
    Content,
    Custom(String),
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StrategyKind::Identity => write!(f, "identity"),
            StrategyKind::Content => write!(f, "content"),
            StrategyKind::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

/// What a strategy knows about the slot it is reading.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    pub type_tag: &'a str,
    pub knowledge_base: &'a KnowledgeBase,
}

pub trait ObjectMarshallingStrategy: Send + fmt::Debug {
    fn kind(&self) -> StrategyKind;
    fn acceptor(&self) -> &ClassFilterAcceptor;
    fn accept(&self, type_name: &str) -> bool {
        self.acceptor().accepts(type_name)
    }
    fn write(&mut self, object: &FactRef, out: &mut ObjectOutput) -> Result<()>;
    fn read(&mut self, input: &mut PayloadInput<'_>, context: &ReadContext<'_>) -> Result<FactRef>;
}

// ------------- ObjectKey -------------
/// Compares and hashes by allocation, not by value.
#[derive(Debug, Clone)]
pub struct ObjectKey(FactRef);

impl ObjectKey {
    pub fn new(object: &FactRef) -> Self {
        Self(Arc::clone(object))
    }
    fn address(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
    pub fn object(&self) -> &FactRef {
        &self.0
    }
}
impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}
impl Eq for ObjectKey {}
impl Hash for ObjectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

// ------------- IdentityTable -------------
/// Ids are handed out from `base` upwards and are never reused, not even
/// after [`IdentityTable::clear`].
#[derive(Debug, Clone)]
pub struct IdentityTable {
    kept: BiMap<ObjectKey, u32>,
    base: u32,
    next_id: u32,
}

impl IdentityTable {
    pub fn new(base: u32) -> Self {
        Self {
            kept: BiMap::new(),
            base,
            next_id: base,
        }
    }
    pub fn id_of(&self, object: &FactRef) -> Option<u32> {
        self.kept.get_by_left(&ObjectKey::new(object)).copied()
    }
    pub fn object(&self, id: u32) -> Option<&FactRef> {
        self.kept.get_by_right(&id).map(ObjectKey::object)
    }
    /// Returns the object's id, assigning the next one if it has none yet.
    pub fn register(&mut self, object: &FactRef) -> Result<u32> {
        let key = ObjectKey::new(object);
        if let Some(id) = self.kept.get_by_left(&key) {
            return Ok(*id);
        }
        let id = self.next_id;
        self.next_id = id
            .checked_add(1)
            .ok_or_else(|| MarshalError::Invariant("identity ids exhausted".to_owned()))?;
        self.kept.insert(key, id);
        Ok(id)
    }
    pub fn base(&self) -> u32 {
        self.base
    }
    pub fn next_id(&self) -> u32 {
        self.next_id
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    pub fn clear(&mut self) {
        self.kept.clear();
    }
}

impl Default for IdentityTable {
    fn default() -> Self {
        Self::new(0)
    }
}

// ------------- IdentityStrategy -------------
/// Not synchronized: confine an instance to one marshal/unmarshal at a time.
#[derive(Debug, Clone)]
pub struct IdentityStrategy {
    acceptor: ClassFilterAcceptor,
    table: IdentityTable,
}

impl IdentityStrategy {
    pub fn new(acceptor: ClassFilterAcceptor) -> Self {
        Self::with_table(acceptor, IdentityTable::default())
    }
    pub fn with_table(acceptor: ClassFilterAcceptor, table: IdentityTable) -> Self {
        Self { acceptor, table }
    }
    pub fn register(&mut self, object: &FactRef) -> Result<u32> {
        self.table.register(object)
    }
    pub fn table(&self) -> &IdentityTable {
        &self.table
    }
    pub fn reset(&mut self) {
        self.table.clear();
    }
}

impl ObjectMarshallingStrategy for IdentityStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Identity
    }
    fn acceptor(&self) -> &ClassFilterAcceptor {
        &self.acceptor
    }
    fn write(&mut self, object: &FactRef, out: &mut ObjectOutput) -> Result<()> {
        let id = self.table.register(object)?;
        out.write_u32(id);
        Ok(())
    }
    fn read(&mut self, input: &mut PayloadInput<'_>, _context: &ReadContext<'_>) -> Result<FactRef> {
        let id = input.read_u32()?;
        self.table
            .object(id)
            .cloned()
            .ok_or(MarshalError::UnresolvedIdentity(id))
    }
}

// ------------- ContentStrategy -------------
#[derive(Debug, Clone, Default)]
pub struct ContentStrategy {
    acceptor: ClassFilterAcceptor,
}

impl ContentStrategy {
    pub fn new(acceptor: ClassFilterAcceptor) -> Self {
        Self { acceptor }
    }
}

impl ObjectMarshallingStrategy for ContentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Content
    }
    fn acceptor(&self) -> &ClassFilterAcceptor {
        &self.acceptor
    }
    fn write(&mut self, object: &FactRef, out: &mut ObjectOutput) -> Result<()> {
        let bytes = object
            .externalize()
            .ok_or_else(|| MarshalError::UnsupportedObject {
                type_name: object.type_name().to_owned(),
            })??;
        out.write_bytes(&bytes)
    }
    fn read(&mut self, input: &mut PayloadInput<'_>, context: &ReadContext<'_>) -> Result<FactRef> {
        let bytes = input.read_bytes()?;
        context.knowledge_base.types().decode(context.type_tag, &bytes)
    }
}

// ------------- Strategy -------------
#[derive(Debug)]
pub enum Strategy {
    Identity(IdentityStrategy),
    Content(ContentStrategy),
    Custom(Box<dyn ObjectMarshallingStrategy>),
}

impl Strategy {
    pub fn identity(acceptor: ClassFilterAcceptor) -> Self {
        Strategy::Identity(IdentityStrategy::new(acceptor))
    }
    pub fn content(acceptor: ClassFilterAcceptor) -> Self {
        Strategy::Content(ContentStrategy::new(acceptor))
    }
    pub fn custom<S: ObjectMarshallingStrategy + 'static>(strategy: S) -> Self {
        Strategy::Custom(Box::new(strategy))
    }
    pub fn as_identity(&self) -> Option<&IdentityStrategy> {
        match self {
            Strategy::Identity(strategy) => Some(strategy),
            _ => None,
        }
    }
    pub fn as_identity_mut(&mut self) -> Option<&mut IdentityStrategy> {
        match self {
            Strategy::Identity(strategy) => Some(strategy),
            _ => None,
        }
    }
    fn inner(&self) -> &dyn ObjectMarshallingStrategy {
        match self {
            Strategy::Identity(strategy) => strategy,
            Strategy::Content(strategy) => strategy,
            Strategy::Custom(strategy) => &**strategy,
        }
    }
    fn inner_mut(&mut self) -> &mut dyn ObjectMarshallingStrategy {
        match self {
            Strategy::Identity(strategy) => strategy,
            Strategy::Content(strategy) => strategy,
            Strategy::Custom(strategy) => &mut **strategy,
        }
    }
}

impl ObjectMarshallingStrategy for Strategy {
    fn kind(&self) -> StrategyKind {
        self.inner().kind()
    }
    fn acceptor(&self) -> &ClassFilterAcceptor {
        self.inner().acceptor()
    }
    fn accept(&self, type_name: &str) -> bool {
        self.inner().accept(type_name)
    }
    fn write(&mut self, object: &FactRef, out: &mut ObjectOutput) -> Result<()> {
        self.inner_mut().write(object, out)
    }
    fn read(&mut self, input: &mut PayloadInput<'_>, context: &ReadContext<'_>) -> Result<FactRef> {
        self.inner_mut().read(input, context)
    }
}

impl From<IdentityStrategy> for Strategy {
    fn from(strategy: IdentityStrategy) -> Self {
        Strategy::Identity(strategy)
    }
}
impl From<ContentStrategy> for Strategy {
    fn from(strategy: ContentStrategy) -> Self {
        Strategy::Content(strategy)
    }
}
