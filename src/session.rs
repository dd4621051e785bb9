//! The session state the marshaller reads from and writes into.
//!
//! A [`KnowledgeBase`] holds the static side: rule and process definitions and
//! the [`TypeRegistry`] that resolves content type tags. It is shared, never
//! serialized, and supplied again when a snapshot is restored.
//!
//! A [`StatefulSession`] holds the runtime side: facts in working memory, the
//! agenda, process instances, calendars and timers. Rule evaluation itself
//! lives elsewhere; this module only keeps the state consistent (handles refer
//! to live facts, activations and instances refer to known definitions).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::calendar::{Calendar, HolidayCalendar, WeeklyCalendar};
use crate::error::{MarshalError, Result};
use crate::object::{Externalizable, FactRef, TypeRegistry};

pub type FactHandleId = u64;
pub const DEFAULT_ENTRY_POINT: &str = "DEFAULT";
pub const MAIN_AGENDA_GROUP: &str = "MAIN";
/// Upper bound on the triggers one periodic timer reports per `due_timers` call.
pub const MAX_CATCH_UP: u32 = 1024;

// ------------- Definitions -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDefinition {
    name: String,
    agenda_group: String,
    salience: i32,
}

impl RuleDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            agenda_group: MAIN_AGENDA_GROUP.to_owned(),
            salience: 0,
        }
    }
    pub fn in_group(mut self, agenda_group: &str) -> Self {
        self.agenda_group = agenda_group.to_owned();
        self
    }
    pub fn with_salience(mut self, salience: i32) -> Self {
        self.salience = salience;
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn agenda_group(&self) -> &str {
        &self.agenda_group
    }
    pub fn salience(&self) -> i32 {
        self.salience
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDefinition {
    id: String,
    name: String,
    nodes: Vec<u64>,
}

impl ProcessDefinition {
    /// The first node is where new instances start.
    pub fn new(id: &str, name: &str, nodes: Vec<u64>) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            nodes,
        }
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn nodes(&self) -> &[u64] {
        &self.nodes
    }
    pub fn has_node(&self, node: u64) -> bool {
        self.nodes.contains(&node)
    }
}

// ------------- KnowledgeBase -------------
#[derive(Debug)]
pub struct KnowledgeBase {
    name: String,
    rules: HashMap<String, RuleDefinition>,
    processes: HashMap<String, ProcessDefinition>,
    types: TypeRegistry,
}

impl KnowledgeBase {
    /// Calendar types are registered up front.
    pub fn new(name: &str) -> Self {
        let mut types = TypeRegistry::new();
        types.register::<WeeklyCalendar>();
        types.register::<HolidayCalendar>();
        Self {
            name: name.to_owned(),
            rules: HashMap::new(),
            processes: HashMap::new(),
            types,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// Returns true if a rule with the same name was replaced.
    pub fn add_rule(&mut self, rule: RuleDefinition) -> bool {
        self.rules.insert(rule.name.clone(), rule).is_some()
    }
    pub fn add_process(&mut self, process: ProcessDefinition) -> bool {
        self.processes.insert(process.id.clone(), process).is_some()
    }
    pub fn register_type<T: Externalizable>(&mut self) -> bool {
        self.types.register::<T>()
    }
    pub fn rule(&self, name: &str) -> Option<&RuleDefinition> {
        self.rules.get(name)
    }
    pub fn process(&self, id: &str) -> Option<&ProcessDefinition> {
        self.processes.get(id)
    }
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }
    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }
}

// ------------- Working memory -------------
#[derive(Debug, Clone)]
pub struct FactHandle {
    pub(crate) id: FactHandleId,
    pub(crate) recency: u64,
    pub(crate) entry_point: String,
    pub(crate) object: FactRef,
}

impl FactHandle {
    pub fn id(&self) -> FactHandleId {
        self.id
    }
    pub fn recency(&self) -> u64 {
        self.recency
    }
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
    pub fn object(&self) -> &FactRef {
        &self.object
    }
}

// ------------- Agenda -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub(crate) number: u64,
    pub(crate) rule: String,
    pub(crate) salience: i32,
    pub(crate) handles: Vec<FactHandleId>,
}

impl Activation {
    pub fn number(&self) -> u64 {
        self.number
    }
    pub fn rule(&self) -> &str {
        &self.rule
    }
    pub fn salience(&self) -> i32 {
        self.salience
    }
    pub fn handles(&self) -> &[FactHandleId] {
        &self.handles
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Agenda {
    pub(crate) focus_stack: Vec<String>,
    pub(crate) activations: Vec<Activation>,
}

impl Agenda {
    pub fn focus_stack(&self) -> &[String] {
        &self.focus_stack
    }
    pub fn focus(&self) -> &str {
        self.focus_stack
            .last()
            .map(String::as_str)
            .unwrap_or(MAIN_AGENDA_GROUP)
    }
    pub fn activations(&self) -> &[Activation] {
        &self.activations
    }
    /// Highest salience first, then oldest.
    pub fn next_activation(&self) -> Option<&Activation> {
        self.activations
            .iter()
            .max_by(|a, b| a.salience.cmp(&b.salience).then(b.number.cmp(&a.number)))
    }
}

// ------------- Processes -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Pending,
    Active,
    Completed,
    Aborted,
    Suspended,
}

impl ProcessState {
    pub fn code(self) -> u8 {
        match self {
            ProcessState::Pending => 0,
            ProcessState::Active => 1,
            ProcessState::Completed => 2,
            ProcessState::Aborted => 3,
            ProcessState::Suspended => 4,
        }
    }
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ProcessState::Pending),
            1 => Some(ProcessState::Active),
            2 => Some(ProcessState::Completed),
            3 => Some(ProcessState::Aborted),
            4 => Some(ProcessState::Suspended),
            _ => None,
        }
    }
}

/// A process variable. Objects go through the strategy chain when marshalled.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Object(FactRef),
}

impl Value {
    pub fn as_object(&self) -> Option<&FactRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessInstance {
    pub(crate) id: u64,
    pub(crate) process_id: String,
    pub(crate) state: ProcessState,
    pub(crate) active_nodes: Vec<u64>,
    pub(crate) variables: BTreeMap<String, Value>,
}

impl ProcessInstance {
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn process_id(&self) -> &str {
        &self.process_id
    }
    pub fn state(&self) -> ProcessState {
        self.state
    }
    pub fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }
    pub fn active_nodes(&self) -> &[u64] {
        &self.active_nodes
    }
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.variables.iter().map(|(name, value)| (name.as_str(), value))
    }
    pub fn set_variable(&mut self, name: &str, value: Value) -> Option<Value> {
        self.variables.insert(name.to_owned(), value)
    }
}

// ------------- Timers -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTarget {
    Rule(String),
    ProcessNode { instance: u64, node: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEntry {
    pub(crate) id: u64,
    pub(crate) target: TimerTarget,
    pub(crate) next_fire: i64,
    pub(crate) period: Option<i64>,
    pub(crate) calendar: Option<String>,
}

impl TimerEntry {
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn target(&self) -> &TimerTarget {
        &self.target
    }
    pub fn next_fire(&self) -> i64 {
        self.next_fire
    }
    pub fn period(&self) -> Option<i64> {
        self.period
    }
    pub fn calendar(&self) -> Option<&str> {
        self.calendar.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFiring {
    pub timer: u64,
    pub target: TimerTarget,
    pub at: i64,
}

// ------------- StatefulSession -------------
#[derive(Debug)]
pub struct StatefulSession {
    pub(crate) knowledge_base: Arc<KnowledgeBase>,
    pub(crate) clock: i64,
    pub(crate) counters: Counters,
    pub(crate) facts: BTreeMap<FactHandleId, FactHandle>,
    pub(crate) agenda: Agenda,
    pub(crate) processes: BTreeMap<u64, ProcessInstance>,
    pub(crate) calendars: BTreeMap<String, FactRef>,
    pub(crate) timers: BTreeMap<u64, TimerEntry>,
}

/// Id generators, persisted so restored sessions keep handing out fresh ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counters {
    pub(crate) handle: u64,
    pub(crate) recency: u64,
    pub(crate) activation: u64,
    pub(crate) instance: u64,
    pub(crate) timer: u64,
}

fn next(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

impl StatefulSession {
    pub fn new(knowledge_base: Arc<KnowledgeBase>) -> Self {
        Self {
            knowledge_base,
            clock: 0,
            counters: Counters::default(),
            facts: BTreeMap::new(),
            agenda: Agenda::default(),
            processes: BTreeMap::new(),
            calendars: BTreeMap::new(),
            timers: BTreeMap::new(),
        }
    }
    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge_base
    }
    pub fn current_time(&self) -> i64 {
        self.clock
    }
    /// Saturates at the ends of the `i64` range.
    pub fn advance_time(&mut self, millis: i64) -> i64 {
        self.clock = self.clock.saturating_add(millis);
        self.clock
    }

    // working memory
    pub fn insert(&mut self, object: FactRef) -> FactHandleId {
        self.insert_into(DEFAULT_ENTRY_POINT, object)
    }
    pub fn insert_into(&mut self, entry_point: &str, object: FactRef) -> FactHandleId {
        let id = next(&mut self.counters.handle);
        let recency = next(&mut self.counters.recency);
        self.facts.insert(
            id,
            FactHandle {
                id,
                recency,
                entry_point: entry_point.to_owned(),
                object,
            },
        );
        id
    }
    pub fn update(&mut self, handle: FactHandleId, object: FactRef) -> Result<()> {
        let recency = next(&mut self.counters.recency);
        let fact = self
            .facts
            .get_mut(&handle)
            .ok_or_else(|| MarshalError::InvalidSession(format!("no fact handle {handle}")))?;
        fact.object = object;
        fact.recency = recency;
        Ok(())
    }
    /// Also cancels every activation that referenced the fact.
    pub fn retract(&mut self, handle: FactHandleId) -> Option<FactRef> {
        let fact = self.facts.remove(&handle)?;
        self.agenda
            .activations
            .retain(|activation| !activation.handles.contains(&handle));
        Some(fact.object)
    }
    pub fn object(&self, handle: FactHandleId) -> Option<&FactRef> {
        self.facts.get(&handle).map(FactHandle::object)
    }
    pub fn fact_handles(&self) -> impl Iterator<Item = &FactHandle> {
        self.facts.values()
    }
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    // agenda
    pub fn agenda(&self) -> &Agenda {
        &self.agenda
    }
    pub fn set_focus(&mut self, agenda_group: &str) {
        if self.agenda.focus() != agenda_group {
            self.agenda.focus_stack.push(agenda_group.to_owned());
        }
    }
    pub fn activate(&mut self, rule: &str, handles: &[FactHandleId]) -> Result<u64> {
        let salience = self
            .knowledge_base
            .rule(rule)
            .map(RuleDefinition::salience)
            .ok_or_else(|| MarshalError::UnknownDefinition(format!("rule {rule}")))?;
        if let Some(missing) = handles.iter().find(|h| !self.facts.contains_key(*h)) {
            return Err(MarshalError::InvalidSession(format!("no fact handle {missing}")));
        }
        let number = next(&mut self.counters.activation);
        self.agenda.activations.push(Activation {
            number,
            rule: rule.to_owned(),
            salience,
            handles: handles.to_vec(),
        });
        Ok(number)
    }
    pub fn cancel_activation(&mut self, number: u64) -> bool {
        let before = self.agenda.activations.len();
        self.agenda.activations.retain(|a| a.number != number);
        self.agenda.activations.len() != before
    }

    // processes
    pub fn start_process(&mut self, process_id: &str, variables: Vec<(String, Value)>) -> Result<u64> {
        let definition = self
            .knowledge_base
            .process(process_id)
            .ok_or_else(|| MarshalError::UnknownDefinition(format!("process {process_id}")))?;
        let active_nodes = definition.nodes().first().copied().into_iter().collect();
        let id = next(&mut self.counters.instance);
        self.processes.insert(
            id,
            ProcessInstance {
                id,
                process_id: process_id.to_owned(),
                state: ProcessState::Active,
                active_nodes,
                variables: variables.into_iter().collect(),
            },
        );
        Ok(id)
    }
    pub fn process_instance(&self, id: u64) -> Option<&ProcessInstance> {
        self.processes.get(&id)
    }
    pub fn process_instance_mut(&mut self, id: u64) -> Option<&mut ProcessInstance> {
        self.processes.get_mut(&id)
    }
    pub fn process_instances(&self) -> impl Iterator<Item = &ProcessInstance> {
        self.processes.values()
    }
    /// Moves an instance's token from one node to another of the same process.
    pub fn move_token(&mut self, instance: u64, from: u64, to: u64) -> Result<()> {
        let process = self
            .processes
            .get_mut(&instance)
            .ok_or_else(|| MarshalError::InvalidSession(format!("no process instance {instance}")))?;
        let definition = self
            .knowledge_base
            .process(&process.process_id)
            .ok_or_else(|| MarshalError::UnknownDefinition(format!("process {}", process.process_id)))?;
        if !definition.has_node(to) {
            return Err(MarshalError::InvalidSession(format!(
                "process {} has no node {to}",
                process.process_id
            )));
        }
        let position = process
            .active_nodes
            .iter()
            .position(|node| *node == from)
            .ok_or_else(|| MarshalError::InvalidSession(format!("node {from} is not active")))?;
        process.active_nodes[position] = to;
        Ok(())
    }

    // calendars and timers
    pub fn add_calendar(&mut self, name: &str, calendar: FactRef) -> Result<()> {
        if calendar.as_calendar().is_none() {
            return Err(MarshalError::InvalidSession(format!(
                "{} is not a calendar",
                calendar.type_name()
            )));
        }
        self.calendars.insert(name.to_owned(), calendar);
        Ok(())
    }
    pub fn calendar(&self, name: &str) -> Option<&dyn Calendar> {
        self.calendars.get(name).and_then(|c| c.as_calendar())
    }
    pub fn calendar_names(&self) -> impl Iterator<Item = &str> {
        self.calendars.keys().map(String::as_str)
    }
    pub fn schedule_timer(
        &mut self,
        target: TimerTarget,
        first_fire: i64,
        period: Option<i64>,
        calendar: Option<&str>,
    ) -> Result<u64> {
        match &target {
            TimerTarget::Rule(rule) if self.knowledge_base.rule(rule).is_none() => {
                return Err(MarshalError::UnknownDefinition(format!("rule {rule}")));
            }
            TimerTarget::ProcessNode { instance, .. } if !self.processes.contains_key(instance) => {
                return Err(MarshalError::InvalidSession(format!("no process instance {instance}")));
            }
            _ => {}
        }
        if let Some(name) = calendar {
            if !self.calendars.contains_key(name) {
                return Err(MarshalError::InvalidSession(format!("no calendar {name}")));
            }
        }
        if matches!(period, Some(p) if p <= 0) {
            return Err(MarshalError::InvalidSession("timer period must be positive".to_owned()));
        }
        let id = next(&mut self.counters.timer);
        self.timers.insert(
            id,
            TimerEntry {
                id,
                target,
                next_fire: first_fire,
                period,
                calendar: calendar.map(str::to_owned),
            },
        );
        Ok(id)
    }
    pub fn cancel_timer(&mut self, id: u64) -> bool {
        self.timers.remove(&id).is_some()
    }
    pub fn timers(&self) -> impl Iterator<Item = &TimerEntry> {
        self.timers.values()
    }
    /// Advances the clock to `now` and returns the triggers at or before it
    /// that their calendar includes. Excluded triggers are skipped, not deferred.
    /// A periodic timer reports at most [`MAX_CATCH_UP`] triggers per call, the
    /// most recent ones; older missed triggers are dropped. One-shot timers, and
    /// periodic ones whose next trigger would pass `i64::MAX`, are removed.
    pub fn due_timers(&mut self, now: i64) -> Vec<TimerFiring> {
        if now > self.clock {
            self.clock = now;
        }
        let mut firings = Vec::new();
        let mut expired = Vec::new();
        for timer in self.timers.values_mut() {
            if timer.next_fire > now {
                continue;
            }
            let calendar = timer
                .calendar
                .as_ref()
                .and_then(|name| self.calendars.get(name))
                .and_then(|c| c.as_calendar());
            let included = |at: i64| calendar.is_none_or(|c| c.is_time_included(at));
            let mut fire = |timer: &TimerEntry| {
                if included(timer.next_fire) {
                    firings.push(TimerFiring {
                        timer: timer.id,
                        target: timer.target.clone(),
                        at: timer.next_fire,
                    });
                }
            };
            match timer.period {
                Some(period) if period > 0 => {
                    let period = i128::from(period);
                    let due = (i128::from(now) - i128::from(timer.next_fire)) / period + 1;
                    let dropped = due - i128::from(MAX_CATCH_UP);
                    if dropped > 0 {
                        // stays at or below `now`
                        let caught_up = i128::from(timer.next_fire) + dropped * period;
                        timer.next_fire = i64::try_from(caught_up).unwrap_or(now);
                    }
                    loop {
                        fire(timer);
                        let next = i128::from(timer.next_fire) + period;
                        match i64::try_from(next) {
                            Ok(next) => timer.next_fire = next,
                            Err(_) => {
                                expired.push(timer.id);
                                break;
                            }
                        }
                        if timer.next_fire > now {
                            break;
                        }
                    }
                }
                _ => {
                    fire(timer);
                    expired.push(timer.id);
                }
            }
        }
        for id in expired {
            self.timers.remove(&id);
        }
        firings.sort_by_key(|f| (f.at, f.timer));
        firings
    }
}
