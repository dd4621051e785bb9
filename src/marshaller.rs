//! Session snapshots.
//!
//! A snapshot is laid out as
//!
//! ```text
//! "KSNP" | u16 version | [u8; 32] chain fingerprint | i64 clock
//! u32 skeleton length | skeleton
//! u32 slot count | (str type tag | u32 chain index | u32 length | payload)*
//! ```
//!
//! The skeleton carries everything the session owns directly (handles,
//! agenda, process instances, calendars, timers) and refers to user objects by
//! slot number. Each slot records which chain entry wrote it; on the way back
//! the entry at that index of the *reading* marshaller's chain reads it, so the
//! two chains have to agree. The fingerprint lets us catch the structural
//! part of a disagreement up front.
//!
//! Writing is all or nothing: the whole snapshot is assembled in memory and
//! only handed to the output once every object has been written.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chain::{Fingerprint, StrategyChain};
use crate::error::{MarshalError, Result};
use crate::object::FactRef;
use crate::session::{
    Activation, Agenda, Counters, FactHandle, KnowledgeBase, ProcessInstance, ProcessState,
    StatefulSession, TimerEntry, TimerTarget, Value,
};
use crate::settings::MarshallerConfig;
use crate::strategy::{ObjectMarshallingStrategy, ReadContext, Strategy};
use crate::stream::{ObjectInput, ObjectOutput};

pub const MAGIC: [u8; 4] = *b"KSNP";
pub const FORMAT_VERSION: u16 = 1;

const VALUE_NULL: u8 = 0;
const VALUE_BOOL: u8 = 1;
const VALUE_INT: u8 = 2;
const VALUE_TEXT: u8 = 3;
const VALUE_OBJECT: u8 = 4;

const TARGET_RULE: u8 = 0;
const TARGET_PROCESS_NODE: u8 = 1;

// ------------- Header -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub version: u16,
    pub fingerprint: Fingerprint,
    pub clock: i64,
}

fn write_header(out: &mut ObjectOutput, header: &SnapshotHeader) {
    out.write_raw(&MAGIC);
    out.write_u16(header.version);
    out.write_raw(&header.fingerprint);
    out.write_i64(header.clock);
}

fn read_header<R: Read>(input: &mut ObjectInput<R>) -> Result<SnapshotHeader> {
    if input.read_array::<4>()? != MAGIC {
        return Err(MarshalError::corrupt("not a session snapshot"));
    }
    let version = input.read_u16()?;
    if version != FORMAT_VERSION {
        warn!(found = version, supported = FORMAT_VERSION, "unsupported snapshot version");
        return Err(MarshalError::VersionMismatch {
            found: version,
            supported: FORMAT_VERSION,
        });
    }
    Ok(SnapshotHeader {
        version,
        fingerprint: input.read_array()?,
        clock: input.read_i64()?,
    })
}

// ------------- Slots -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub type_tag: String,
    pub chain_index: u32,
    pub payload: Vec<u8>,
}

struct SlotWriter<'c> {
    chain: &'c mut StrategyChain,
    slots: Vec<Slot>,
    limit: u32,
}

impl SlotWriter<'_> {
    fn write_object(&mut self, object: &FactRef) -> Result<u32> {
        let type_name = object.type_name();
        let index = self.chain.resolve(type_name)?;
        let mut payload = ObjectOutput::with_limit(self.limit);
        self.chain.entry_mut(index)?.write(object, &mut payload)?;
        let slot = u32::try_from(self.slots.len())
            .map_err(|_| MarshalError::Serialization("too many object slots".to_owned()))?;
        let chain_index = u32::try_from(index)
            .map_err(|_| MarshalError::Serialization(format!("chain index {index} exceeds u32")))?;
        self.slots.push(Slot {
            type_tag: type_name.to_owned(),
            chain_index,
            payload: payload.into_inner(),
        });
        Ok(slot)
    }
}

// ------------- Marshaller -------------
/// Not synchronized: `marshal` and `unmarshal` take `&mut self` because
/// identity strategies in the chain mutate their tables. Share an instance
/// between threads behind a `Mutex`, or give each thread its own.
#[derive(Debug)]
pub struct Marshaller {
    knowledge_base: Arc<KnowledgeBase>,
    chain: StrategyChain,
    config: MarshallerConfig,
}

impl Marshaller {
    /// Content strategy for everything.
    pub fn new(knowledge_base: Arc<KnowledgeBase>) -> Self {
        Self::with_chain(knowledge_base, StrategyChain::default(), MarshallerConfig::default())
    }
    /// Strategies are consulted in the order given.
    pub fn with_strategies(knowledge_base: Arc<KnowledgeBase>, strategies: Vec<Strategy>) -> Self {
        Self::with_chain(
            knowledge_base,
            StrategyChain::new(strategies),
            MarshallerConfig::default(),
        )
    }
    pub fn with_chain(
        knowledge_base: Arc<KnowledgeBase>,
        chain: StrategyChain,
        config: MarshallerConfig,
    ) -> Self {
        Self {
            knowledge_base,
            chain,
            config,
        }
    }
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge_base
    }
    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }
    pub fn chain_mut(&mut self) -> &mut StrategyChain {
        &mut self.chain
    }
    pub fn config(&self) -> &MarshallerConfig {
        &self.config
    }

    /// Nothing is written to `output` unless the whole session was encoded.
    /// Every length in the snapshot is held to `max_payload_bytes`, the same
    /// limit `unmarshal` applies.
    pub fn marshal<W: Write>(&mut self, session: &StatefulSession, output: &mut W) -> Result<()> {
        if session.knowledge_base().name() != self.knowledge_base.name() {
            warn!(
                session = session.knowledge_base().name(),
                marshaller = self.knowledge_base.name(),
                "marshalling a session of a different knowledge base"
            );
        }
        let fingerprint = self.chain.fingerprint();
        let limit = self.config.max_payload_bytes;
        let mut slots = SlotWriter {
            chain: &mut self.chain,
            slots: Vec::new(),
            limit,
        };
        let mut skeleton = ObjectOutput::with_limit(limit);
        write_skeleton(session, &mut skeleton, &mut slots)?;
        let slots = slots.slots;

        let mut out = ObjectOutput::with_limit(limit);
        write_header(
            &mut out,
            &SnapshotHeader {
                version: FORMAT_VERSION,
                fingerprint,
                clock: session.current_time(),
            },
        );
        out.write_bytes(skeleton.as_slice())?;
        out.write_len(slots.len())?;
        for slot in &slots {
            out.write_str(&slot.type_tag)?;
            out.write_u32(slot.chain_index);
            out.write_bytes(&slot.payload)?;
        }
        output.write_all(out.as_slice())?;
        output.flush()?;
        info!(
            facts = session.fact_count(),
            slots = slots.len(),
            bytes = out.len(),
            "session marshalled"
        );
        Ok(())
    }

    /// Rebuilds a session bound to `knowledge_base`. Slots are read through
    /// this marshaller's chain at the indices recorded in the stream.
    pub fn unmarshal<R: Read>(
        &mut self,
        input: R,
        knowledge_base: Arc<KnowledgeBase>,
    ) -> Result<StatefulSession> {
        let limit = self.config.max_payload_bytes;
        let mut input = ObjectInput::with_limit(input, limit);
        let header = read_header(&mut input)?;
        if self.config.verify_chain_fingerprint && header.fingerprint != self.chain.fingerprint() {
            warn!("snapshot was written with a different strategy chain");
            return Err(MarshalError::ChainMismatch);
        }
        let skeleton = input.read_bytes()?;
        let slot_count = input.read_len()?;
        let mut objects = Vec::with_capacity(slot_count.min(1024));
        for slot in 0..slot_count {
            let type_tag = input.read_str()?;
            let index = input.read_u32()? as usize;
            let payload = input.read_bytes()?;
            let context = ReadContext {
                type_tag: &type_tag,
                knowledge_base: knowledge_base.as_ref(),
            };
            let mut payload_input = ObjectInput::with_limit(payload.as_slice(), limit);
            let object = self.chain.entry_mut(index)?.read(&mut payload_input, &context)?;
            if payload_input.remaining() != 0 {
                return Err(MarshalError::corrupt(format!("slot {slot} has trailing bytes")));
            }
            if object.type_name() != type_tag {
                return Err(MarshalError::corrupt(format!(
                    "slot {slot} recorded {type_tag} but resolved to {}",
                    object.type_name()
                )));
            }
            debug!(slot, index, type_tag = type_tag.as_str(), "object slot read");
            objects.push(object);
        }
        let mut reader = SkeletonReader {
            input: ObjectInput::with_limit(skeleton.as_slice(), limit),
            objects: objects.as_slice(),
        };
        let session = reader.read_session(knowledge_base, header.clock)?;
        if reader.input.remaining() != 0 {
            return Err(MarshalError::corrupt("skeleton has trailing bytes"));
        }
        info!(facts = session.fact_count(), slots = objects.len(), "session unmarshalled");
        Ok(session)
    }
}

// ------------- Skeleton -------------
fn write_skeleton(session: &StatefulSession, out: &mut ObjectOutput, slots: &mut SlotWriter) -> Result<()> {
    out.write_str(session.knowledge_base().name())?;
    let counters = session.counters;
    for counter in [
        counters.handle,
        counters.recency,
        counters.activation,
        counters.instance,
        counters.timer,
    ] {
        out.write_u64(counter);
    }

    out.write_len(session.facts.len())?;
    for fact in session.facts.values() {
        out.write_u64(fact.id);
        out.write_u64(fact.recency);
        out.write_str(&fact.entry_point)?;
        out.write_u32(slots.write_object(&fact.object)?);
    }

    let agenda = &session.agenda;
    out.write_len(agenda.focus_stack.len())?;
    for group in &agenda.focus_stack {
        out.write_str(group)?;
    }
    out.write_len(agenda.activations.len())?;
    for activation in &agenda.activations {
        out.write_u64(activation.number);
        out.write_str(&activation.rule)?;
        out.write_i32(activation.salience);
        out.write_len(activation.handles.len())?;
        for handle in &activation.handles {
            out.write_u64(*handle);
        }
    }

    out.write_len(session.processes.len())?;
    for process in session.processes.values() {
        out.write_u64(process.id);
        out.write_str(&process.process_id)?;
        out.write_u8(process.state.code());
        out.write_len(process.active_nodes.len())?;
        for node in &process.active_nodes {
            out.write_u64(*node);
        }
        out.write_len(process.variables.len())?;
        for (name, value) in &process.variables {
            out.write_str(name)?;
            write_value(value, out, slots)?;
        }
    }

    out.write_len(session.calendars.len())?;
    for (name, calendar) in &session.calendars {
        out.write_str(name)?;
        out.write_u32(slots.write_object(calendar)?);
    }

    out.write_len(session.timers.len())?;
    for timer in session.timers.values() {
        out.write_u64(timer.id);
        match &timer.target {
            TimerTarget::Rule(rule) => {
                out.write_u8(TARGET_RULE);
                out.write_str(rule)?;
            }
            TimerTarget::ProcessNode { instance, node } => {
                out.write_u8(TARGET_PROCESS_NODE);
                out.write_u64(*instance);
                out.write_u64(*node);
            }
        }
        out.write_i64(timer.next_fire);
        out.write_bool(timer.period.is_some());
        if let Some(period) = timer.period {
            out.write_i64(period);
        }
        out.write_bool(timer.calendar.is_some());
        if let Some(calendar) = &timer.calendar {
            out.write_str(calendar)?;
        }
    }
    Ok(())
}

fn write_value(value: &Value, out: &mut ObjectOutput, slots: &mut SlotWriter) -> Result<()> {
    match value {
        Value::Null => out.write_u8(VALUE_NULL),
        Value::Bool(flag) => {
            out.write_u8(VALUE_BOOL);
            out.write_bool(*flag);
        }
        Value::Int(number) => {
            out.write_u8(VALUE_INT);
            out.write_i64(*number);
        }
        Value::Text(text) => {
            out.write_u8(VALUE_TEXT);
            out.write_str(text)?;
        }
        Value::Object(object) => {
            out.write_u8(VALUE_OBJECT);
            out.write_u32(slots.write_object(object)?);
        }
    }
    Ok(())
}

struct SkeletonReader<'a> {
    input: ObjectInput<&'a [u8]>,
    objects: &'a [FactRef],
}

impl SkeletonReader<'_> {
    fn object(&mut self) -> Result<FactRef> {
        let slot = self.input.read_u32()?;
        self.objects
            .get(slot as usize)
            .cloned()
            .ok_or_else(|| MarshalError::corrupt(format!("reference to missing slot {slot}")))
    }

    fn read_session(&mut self, knowledge_base: Arc<KnowledgeBase>, clock: i64) -> Result<StatefulSession> {
        let written_for = self.input.read_str()?;
        if written_for != knowledge_base.name() {
            warn!(
                snapshot = written_for.as_str(),
                knowledge_base = knowledge_base.name(),
                "restoring against a different knowledge base"
            );
        }
        let counters = Counters {
            handle: self.input.read_u64()?,
            recency: self.input.read_u64()?,
            activation: self.input.read_u64()?,
            instance: self.input.read_u64()?,
            timer: self.input.read_u64()?,
        };

        let mut facts = BTreeMap::new();
        for _ in 0..self.input.read_len()? {
            let id = self.input.read_u64()?;
            let recency = self.input.read_u64()?;
            let entry_point = self.input.read_str()?;
            let object = self.object()?;
            facts.insert(
                id,
                FactHandle {
                    id,
                    recency,
                    entry_point,
                    object,
                },
            );
        }

        let mut agenda = Agenda::default();
        for _ in 0..self.input.read_len()? {
            agenda.focus_stack.push(self.input.read_str()?);
        }
        for _ in 0..self.input.read_len()? {
            let number = self.input.read_u64()?;
            let rule = self.input.read_str()?;
            let salience = self.input.read_i32()?;
            let mut handles = Vec::new();
            for _ in 0..self.input.read_len()? {
                handles.push(self.input.read_u64()?);
            }
            if knowledge_base.rule(&rule).is_none() {
                return Err(MarshalError::UnknownDefinition(format!("rule {rule}")));
            }
            if let Some(missing) = handles.iter().find(|h| !facts.contains_key(*h)) {
                return Err(MarshalError::corrupt(format!(
                    "activation {number} refers to missing fact handle {missing}"
                )));
            }
            agenda.activations.push(Activation {
                number,
                rule,
                salience,
                handles,
            });
        }

        let mut processes = BTreeMap::new();
        for _ in 0..self.input.read_len()? {
            let id = self.input.read_u64()?;
            let process_id = self.input.read_str()?;
            let code = self.input.read_u8()?;
            let state = ProcessState::from_code(code)
                .ok_or_else(|| MarshalError::corrupt(format!("unknown process state {code}")))?;
            let mut active_nodes = Vec::new();
            for _ in 0..self.input.read_len()? {
                active_nodes.push(self.input.read_u64()?);
            }
            let mut variables = BTreeMap::new();
            for _ in 0..self.input.read_len()? {
                let name = self.input.read_str()?;
                let value = self.read_value()?;
                variables.insert(name, value);
            }
            if knowledge_base.process(&process_id).is_none() {
                return Err(MarshalError::UnknownDefinition(format!("process {process_id}")));
            }
            processes.insert(
                id,
                ProcessInstance {
                    id,
                    process_id,
                    state,
                    active_nodes,
                    variables,
                },
            );
        }

        let mut calendars = BTreeMap::new();
        for _ in 0..self.input.read_len()? {
            let name = self.input.read_str()?;
            let calendar = self.object()?;
            if calendar.as_calendar().is_none() {
                return Err(MarshalError::corrupt(format!(
                    "calendar {name} restored as {}",
                    calendar.type_name()
                )));
            }
            calendars.insert(name, calendar);
        }

        let mut timers = BTreeMap::new();
        for _ in 0..self.input.read_len()? {
            let id = self.input.read_u64()?;
            let target = match self.input.read_u8()? {
                TARGET_RULE => {
                    let rule = self.input.read_str()?;
                    if knowledge_base.rule(&rule).is_none() {
                        return Err(MarshalError::UnknownDefinition(format!("rule {rule}")));
                    }
                    TimerTarget::Rule(rule)
                }
                TARGET_PROCESS_NODE => {
                    let instance = self.input.read_u64()?;
                    let node = self.input.read_u64()?;
                    if !processes.contains_key(&instance) {
                        return Err(MarshalError::corrupt(format!(
                            "timer {id} refers to missing process instance {instance}"
                        )));
                    }
                    TimerTarget::ProcessNode { instance, node }
                }
                other => return Err(MarshalError::corrupt(format!("unknown timer target {other}"))),
            };
            let next_fire = self.input.read_i64()?;
            let period = if self.input.read_bool()? {
                let period = self.input.read_i64()?;
                if period <= 0 {
                    return Err(MarshalError::corrupt(format!(
                        "timer {id} has non-positive period {period}"
                    )));
                }
                Some(period)
            } else {
                None
            };
            let calendar = if self.input.read_bool()? {
                let name = self.input.read_str()?;
                if !calendars.contains_key(&name) {
                    return Err(MarshalError::corrupt(format!(
                        "timer {id} refers to missing calendar {name}"
                    )));
                }
                Some(name)
            } else {
                None
            };
            timers.insert(
                id,
                TimerEntry {
                    id,
                    target,
                    next_fire,
                    period,
                    calendar,
                },
            );
        }

        Ok(StatefulSession {
            knowledge_base,
            clock,
            counters,
            facts,
            agenda,
            processes,
            calendars,
            timers,
        })
    }

    fn read_value(&mut self) -> Result<Value> {
        Ok(match self.input.read_u8()? {
            VALUE_NULL => Value::Null,
            VALUE_BOOL => Value::Bool(self.input.read_bool()?),
            VALUE_INT => Value::Int(self.input.read_i64()?),
            VALUE_TEXT => Value::Text(self.input.read_str()?),
            VALUE_OBJECT => Value::Object(self.object()?),
            other => return Err(MarshalError::corrupt(format!("unknown value tag {other}"))),
        })
    }
}

// ------------- Inspection -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub header: SnapshotHeader,
    pub skeleton_len: usize,
    pub slots: Vec<Slot>,
}

/// Reads the header and the slot table without resolving anything.
pub fn inspect<R: Read>(input: R) -> Result<SnapshotSummary> {
    let mut input = ObjectInput::new(input);
    let header = read_header(&mut input)?;
    let skeleton_len = input.read_bytes()?.len();
    let slot_count = input.read_len()?;
    let mut slots = Vec::with_capacity(slot_count.min(1024));
    for _ in 0..slot_count {
        slots.push(Slot {
            type_tag: input.read_str()?,
            chain_index: input.read_u32()?,
            payload: input.read_bytes()?,
        });
    }
    Ok(SnapshotSummary {
        header,
        skeleton_len,
        slots,
    })
}
