#![allow(dead_code)]

use serde::{Deserialize, Serialize};

use session_marshal::error::Result;
use session_marshal::fact;
use session_marshal::object::{decode_json, encode_json, Externalizable};
use session_marshal::session::{KnowledgeBase, ProcessDefinition, RuleDefinition};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: u32,
}

impl Person {
    pub fn new(name: &str, age: u32) -> Self {
        Self {
            name: name.to_owned(),
            age,
        }
    }
}

impl Externalizable for Person {
    const TYPE_NAME: &'static str = "org.acme.model.Person";
    fn encode(&self) -> Result<Vec<u8>> {
        encode_json(self)
    }
    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_json(bytes)
    }
}
fact!(Person);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub total: i64,
}

impl Externalizable for Order {
    const TYPE_NAME: &'static str = "com.shop.Order";
    fn encode(&self) -> Result<Vec<u8>> {
        encode_json(self)
    }
    fn decode(bytes: &[u8]) -> Result<Self> {
        decode_json(bytes)
    }
}
fact!(Order);

/// Lives outside the process and has no byte form.
#[derive(Debug)]
pub struct Connection {
    pub peer: String,
}
fact!(Connection, opaque = "org.acme.net.Connection");

pub fn knowledge_base() -> KnowledgeBase {
    let mut kbase = KnowledgeBase::new("acme");
    kbase.add_rule(RuleDefinition::new("greet").with_salience(10));
    kbase.add_rule(RuleDefinition::new("audit").in_group("audit"));
    kbase.add_process(ProcessDefinition::new("onboarding", "Onboarding", vec![1, 2, 3]));
    kbase.register_type::<Person>();
    kbase.register_type::<Order>();
    kbase
}
